//! Execution Engine Module
//!
//! Runs one submission end to end and streams what happens as `RunEvent`s.

pub mod executor;
pub mod heuristic;

use serde::{Deserialize, Serialize};

use crate::workspace::SourceFile;

pub use executor::{ExecutionEngine, ProcessExit};
pub use heuristic::InputWaitDetector;

/// A submission to compile and run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub files: Vec<SourceFile>,
    /// Accepted for the caller's convenience; the engine never feeds these
    /// to the program on its own.
    #[serde(default)]
    pub initial_stdin_inputs: Vec<String>,
}

impl RunRequest {
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self {
            files,
            initial_stdin_inputs: Vec::new(),
        }
    }
}
