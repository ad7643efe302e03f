//! Main CLI application for the worker/task assignment solver

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use task_assignment::{
    config::{CliOverrides, Settings},
    scheduling::{
        solve_batch, AssignmentProblem, ProblemInstance, SchedulingError, Solution,
        SolutionValidator, SolveOutcome,
    },
    utils::{ColorOutput, SolutionFormatter},
};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "task_assignment")]
#[command(about = "Worker/Task Assignment Constraint Solver")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one or more assignment instances
    Solve {
        /// Configuration file path
        #[arg(short, long, default_value = "config/default.yaml")]
        config: PathBuf,

        /// Instance file (overrides config); repeat to solve several in parallel
        #[arg(short, long)]
        instance: Vec<PathBuf>,

        /// Maximum solutions to find (overrides config)
        #[arg(short, long)]
        max_solutions: Option<usize>,

        /// Time budget in seconds, 0 for none (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Search node budget (overrides config)
        #[arg(long)]
        node_limit: Option<u64>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Create example configuration and instance files
    Setup {
        /// Directory to create files in
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,

        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Check a saved solution against an instance
    Validate {
        /// Instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Solution file (JSON)
        #[arg(short, long)]
        solution: PathBuf,
    },

    /// Report model size and a feasibility estimate without searching
    Analyze {
        /// Instance file
        #[arg(short, long)]
        instance: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Solve { verbose: true, .. });
    init_tracing(verbose);

    match cli.command {
        Commands::Solve {
            config,
            instance,
            max_solutions,
            timeout,
            node_limit,
            output,
            verbose,
        } => {
            let overrides = CliOverrides {
                instance_file: instance.first().cloned(),
                max_solutions,
                timeout_seconds: timeout,
                node_limit,
                output_dir: output,
            };
            if instance.len() > 1 {
                batch_command(config, &instance, overrides)
            } else {
                solve_command(config, overrides, verbose)
            }
        }
        Commands::Setup { directory, force } => setup_command(directory, force),
        Commands::Validate { instance, solution } => validate_command(instance, solution),
        Commands::Analyze { instance } => analyze_command(instance),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_settings(config_path: &Path, overrides: &CliOverrides) -> Result<Settings> {
    let mut settings = if config_path.exists() {
        Settings::from_file(&config_path.to_path_buf())
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        println!(
            "{}",
            ColorOutput::warning(&format!(
                "Config file {} not found, using defaults",
                config_path.display()
            ))
        );
        Settings::default()
    };

    settings.merge_with_cli(overrides);
    settings
        .validate()
        .context("Configuration validation failed")?;
    Ok(settings)
}

fn solve_command(config_path: PathBuf, overrides: CliOverrides, verbose: bool) -> Result<()> {
    println!("{}", ColorOutput::info("Starting assignment solver"));

    let settings = load_settings(&config_path, &overrides)?;

    if verbose {
        println!("Configuration:");
        println!("  Instance file: {}", settings.input.instance_file.display());
        println!("  Max solutions: {}", settings.solver.max_solutions);
        println!("  Timeout: {}s", settings.solver.timeout_seconds);
        if let Some(nodes) = settings.solver.node_limit {
            println!("  Node limit: {}", nodes);
        }
        println!("  Output dir: {}", settings.output.output_directory.display());
        println!();
    }

    let instance = ProblemInstance::from_file(&settings.input.instance_file)?;
    let start_time = Instant::now();
    let mut problem =
        AssignmentProblem::new(instance.clone()).context("Failed to build assignment model")?;

    if verbose {
        println!("{}", problem.model_statistics());
        println!("{}", problem.estimate_feasibility());
    }

    println!("{}", ColorOutput::info("Propagating constraints and searching..."));
    let termination = settings.solver.termination();
    let solutions = match problem.solve_multiple(settings.solver.max_solutions, termination) {
        Ok(solutions) => solutions,
        Err(SchedulingError::Aborted { nodes }) => {
            println!(
                "{}",
                ColorOutput::warning(&format!(
                    "Search stopped after {} nodes before any solution was found",
                    nodes
                ))
            );
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to solve assignment problem"),
    };

    let total_time = start_time.elapsed();

    if solutions.is_empty() {
        println!("{}", ColorOutput::error("No assignment satisfies all constraints"));
        return Ok(());
    }

    println!(
        "{}",
        ColorOutput::success(&format!(
            "Found {} solution(s) in {:.3}s",
            solutions.len(),
            total_time.as_secs_f64()
        ))
    );

    println!("\n{}", SolutionFormatter::format_solution_summary(&solutions));
    if solutions.len() <= 3 {
        for (i, solution) in solutions.iter().enumerate() {
            println!("\n{}", ColorOutput::info(&format!("Solution {}:", i + 1)));
            println!("{}", SolutionFormatter::format_solution(solution, &instance));
        }
    }

    println!("\n{}", ColorOutput::info("Saving solutions..."));
    SolutionFormatter::save_solutions(
        &solutions,
        &instance,
        &settings.output.output_directory,
        &settings.output.format,
    )
    .context("Failed to save solutions")?;

    println!(
        "{}",
        ColorOutput::success(&format!(
            "Solutions saved to {}",
            settings.output.output_directory.display()
        ))
    );

    Ok(())
}

fn batch_command(
    config_path: PathBuf,
    instances: &[PathBuf],
    overrides: CliOverrides,
) -> Result<()> {
    println!(
        "{}",
        ColorOutput::info(&format!("Solving {} instances in parallel", instances.len()))
    );

    let settings = load_settings(&config_path, &overrides)?;
    let loaded = instances
        .iter()
        .map(ProblemInstance::from_file)
        .collect::<Result<Vec<_>>>()?;

    let start_time = Instant::now();
    let results = solve_batch(&loaded, || settings.solver.termination());

    for (path, result) in instances.iter().zip(&results) {
        let line = match result {
            Ok(SolveOutcome::Solved(solution)) => ColorOutput::success(&format!(
                "{}: solved ({} assignments, {} nodes)",
                path.display(),
                solution.metadata.total_assignments,
                solution.metadata.nodes_explored
            )),
            Ok(SolveOutcome::Infeasible) => {
                ColorOutput::error(&format!("{}: infeasible", path.display()))
            }
            Err(e) => ColorOutput::warning(&format!("{}: {}", path.display(), e)),
        };
        println!("{}", line);
    }

    println!("Total time: {:.3}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn setup_command(directory: PathBuf, force: bool) -> Result<()> {
    println!("{}", ColorOutput::info("Setting up project structure..."));

    let config_dir = directory.join("config");
    let instance_dir = directory.join("instances");
    let output_dir = directory.join("output/solutions");

    for dir in [&config_dir, &instance_dir, &output_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let config_path = config_dir.join("default.yaml");
    if !config_path.exists() || force {
        Settings::default()
            .to_file(&config_path)
            .context("Failed to create default configuration")?;
        println!("Created: {}", config_path.display());
    } else {
        println!("Skipped: {} (already exists)", config_path.display());
    }

    let demo = ProblemInstance::default();
    let infeasible = ProblemInstance {
        workers: 1,
        tasks: 2,
        capacity_per_worker: 2,
        horizon: 12,
        worker_availability: vec![1],
        task_duration: vec![5, 5],
        task_deadline: vec![5, 5],
    };

    for (name, instance) in [("demo.yaml", demo), ("infeasible.yaml", infeasible)] {
        let path = instance_dir.join(name);
        if !path.exists() || force {
            instance.to_file(&path)?;
            println!("Created: {}", path.display());
        } else {
            println!("Skipped: {} (already exists)", path.display());
        }
    }

    println!("\n{}", ColorOutput::success("Setup complete!"));
    println!("\nNext steps:");
    println!("1. Edit configuration files in {}", config_dir.display());
    println!("2. Add your instances to {}", instance_dir.display());
    println!("3. Run: cargo run -- solve --config config/default.yaml");

    Ok(())
}

fn validate_command(instance_path: PathBuf, solution_path: PathBuf) -> Result<()> {
    println!("{}", ColorOutput::info("Validating solution..."));

    let instance = ProblemInstance::from_file(&instance_path)?;
    let solution = Solution::load_from_file(&solution_path)
        .with_context(|| format!("Failed to load solution from {}", solution_path.display()))?;

    let validator = SolutionValidator::new(instance)
        .with_context(|| format!("Invalid instance in {}", instance_path.display()))?;
    let result = validator.validate(&solution.assignment);

    println!("{}", result);
    print!("{}", SolutionFormatter::format_assignments(&solution.assignment));

    if result.is_valid {
        println!("{}", ColorOutput::success("Solution is valid!"));
    } else {
        println!("{}", ColorOutput::error("Solution is invalid"));
        if let Some(error) = result.error_message {
            println!("Error: {}", error);
        }
    }

    Ok(())
}

fn analyze_command(instance_path: PathBuf) -> Result<()> {
    println!("{}", ColorOutput::info("Analyzing instance..."));

    let instance = ProblemInstance::from_file(&instance_path)?;

    println!("Instance ({} workers x {} tasks):", instance.workers, instance.tasks);
    println!("  Capacity per worker: {}", instance.capacity_per_worker);
    println!("  Horizon: {}", instance.horizon);
    println!("  Availability: {:?}", instance.worker_availability);
    println!("  Durations: {:?}", instance.task_duration);
    println!("  Deadlines: {:?}", instance.task_deadline);
    println!();

    let problem = AssignmentProblem::new(instance).context("Failed to build model for analysis")?;
    println!("{}", problem.model_statistics());
    println!("{}", problem.estimate_feasibility());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "task_assignment",
            "solve",
            "--config",
            "test.yaml",
            "--instance",
            "a.yaml",
            "--instance",
            "b.json",
            "--node-limit",
            "500",
        ]);

        match cli.map(|c| c.command) {
            Ok(Commands::Solve {
                instance,
                node_limit,
                ..
            }) => {
                assert_eq!(instance.len(), 2);
                assert_eq!(node_limit, Some(500));
            }
            _ => panic!("expected solve command"),
        }
    }

    #[test]
    fn test_setup_command() {
        let temp_dir = tempdir().unwrap();
        setup_command(temp_dir.path().to_path_buf(), false).unwrap();

        assert!(temp_dir.path().join("config/default.yaml").exists());
        let demo = ProblemInstance::from_file(temp_dir.path().join("instances/demo.yaml")).unwrap();
        assert_eq!(demo, ProblemInstance::default());
        assert!(temp_dir.path().join("instances/infeasible.yaml").exists());
    }

    #[test]
    fn test_validate_and_analyze_commands() {
        let temp_dir = tempdir().unwrap();
        setup_command(temp_dir.path().to_path_buf(), false).unwrap();
        let instance_path = temp_dir.path().join("instances/demo.yaml");

        let mut problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let outcome = problem.solve(task_assignment::csp::Indefinite).unwrap();
        let solution_path = temp_dir.path().join("solution.json");
        outcome.solution().unwrap().save_to_file(&solution_path).unwrap();

        assert!(validate_command(instance_path.clone(), solution_path).is_ok());
        assert!(analyze_command(instance_path).is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_input() {
        let temp_dir = tempdir().unwrap();
        let solution_path = temp_dir.path().join("solution.json");
        let matrix = task_assignment::scheduling::AssignmentMatrix::new(5, 5);
        Solution::new(matrix, 0, std::time::Duration::ZERO, 0, 0)
            .save_to_file(&solution_path)
            .unwrap();

        // Five workers but only four availabilities
        let instance_path = temp_dir.path().join("bad.yaml");
        ProblemInstance {
            workers: 5,
            ..ProblemInstance::default()
        }
        .to_file(&instance_path)
        .unwrap();
        let err = validate_command(instance_path, solution_path.clone()).unwrap_err();
        assert!(err.to_string().contains("Invalid instance"));

        // A solution whose cell vector is shorter than its dimensions
        let instance_path = temp_dir.path().join("demo.yaml");
        ProblemInstance::default().to_file(&instance_path).unwrap();
        let json = r#"{"assignment":{"workers":4,"tasks":5,"cells":[]},"metadata":
            {"id":"sol_0","index":0,"workload":[],"coverage":[],"total_assignments":0,
             "nodes_explored":0,"backtracks":0}}"#;
        std::fs::write(&solution_path, json).unwrap();
        assert!(validate_command(instance_path, solution_path).is_err());
    }
}
