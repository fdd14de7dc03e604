//! Toolchain Module
//!
//! Locates a native C++ compiler on the host and drives it to build a
//! session workspace into a runnable binary.

pub mod build;
pub mod locator;

pub use build::{BuildOutcome, BuildStage};
pub use locator::{Toolchain, ToolchainFlavor, ToolchainLocator};
