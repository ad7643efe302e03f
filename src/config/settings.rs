//! Configuration settings for the assignment solver

use crate::csp::{Combined, NodeLimit, TimeLimit};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub input: InputConfig,
    pub solver: SolverConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub instance_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_solutions: usize,
    /// Wall-clock budget per instance; 0 disables it
    pub timeout_seconds: u64,
    #[serde(default)]
    pub node_limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub output_directory: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    Json,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: InputConfig {
                instance_file: PathBuf::from("instances/demo.yaml"),
            },
            solver: SolverConfig {
                max_solutions: 1,
                timeout_seconds: 300,
                node_limit: None,
            },
            output: OutputConfig {
                format: OutputFormat::Text,
                output_directory: PathBuf::from("output/solutions"),
            },
        }
    }
}

impl SolverConfig {
    /// Termination condition built from the configured limits.
    ///
    /// The time budget starts counting when this is called.
    pub fn termination(&self) -> Combined {
        let mut termination = Combined::new();
        if self.timeout_seconds > 0 {
            let budget = Duration::from_secs(self.timeout_seconds);
            termination = termination.with(TimeLimit::new(budget));
        }
        if let Some(nodes) = self.node_limit {
            termination = termination.with(NodeLimit::new(nodes));
        }
        termination
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Save settings to a YAML file
    pub fn to_file(&self, path: &PathBuf) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize settings")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.solver.max_solutions == 0 {
            anyhow::bail!("Maximum solutions must be positive");
        }

        if self.solver.node_limit == Some(0) {
            anyhow::bail!("Node limit must be positive when set");
        }

        if !self.input.instance_file.exists() {
            anyhow::bail!(
                "Instance file does not exist: {}",
                self.input.instance_file.display()
            );
        }

        Ok(())
    }

    /// Merge settings with command line overrides
    pub fn merge_with_cli(&mut self, cli_overrides: &CliOverrides) {
        if let Some(ref instance_file) = cli_overrides.instance_file {
            self.input.instance_file = instance_file.clone();
        }
        if let Some(max_solutions) = cli_overrides.max_solutions {
            self.solver.max_solutions = max_solutions;
        }
        if let Some(timeout_seconds) = cli_overrides.timeout_seconds {
            self.solver.timeout_seconds = timeout_seconds;
        }
        if let Some(node_limit) = cli_overrides.node_limit {
            self.solver.node_limit = Some(node_limit);
        }
        if let Some(ref output_dir) = cli_overrides.output_dir {
            self.output.output_directory = output_dir.clone();
        }
    }
}

/// Command line overrides for settings
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub instance_file: Option<PathBuf>,
    pub max_solutions: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub node_limit: Option<u64>,
    pub output_dir: Option<PathBuf>,
}
