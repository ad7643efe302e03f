//! Output helpers shared by the CLI

pub mod display;

pub use display::{Color, ColorOutput, SolutionFormatter};
