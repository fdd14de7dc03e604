//! Session Management Module
//!
//! - Concurrent session registry (DashMap), injected rather than global
//! - Event protocol with a single terminal event per stream
//! - Input delivery into running programs

pub mod events;
pub mod manager;
pub mod state;

pub use events::{RunEvent, SessionEventEmitter};
pub use manager::SessionManager;
pub use state::{InputSink, SessionInfo, SessionState, SessionStatus};
