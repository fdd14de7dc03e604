// Interactive code runner: compiles a submitted C++ bundle, runs it, and
// streams its console I/O to the caller while accepting input on demand.

// Declare modules
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod session;
pub mod toolchain;
pub mod workspace;

pub use config::RunnerConfig;
pub use engine::{ExecutionEngine, RunRequest};
pub use error::{RunnerError, RunnerResult};
pub use gateway::serve;
pub use session::{RunEvent, SessionManager};
