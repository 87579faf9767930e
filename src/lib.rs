//! Mimic – interpreter and cooperative scheduler for input-automation scripts
//!
//! This crate implements the replay half of a record/replay tool:
//! - A line-oriented script language parsed into an immutable [`Program`]
//! - Labels with repeat quotas, success/failure branches and jumps
//! - Parallel threads joined by the main script
//! - Timer, condition and preempting priority triggers
//! - State machines driven by the outcome of perception checks
//! - Narrow capability traits for input injection, image search and OCR

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Capability traits implemented by input, vision and text providers
pub mod capability;
/// Engine configuration and playback options
pub mod config;
/// Sessions, schedulers and run reports
pub mod engine;
/// Script language: tokenizer, builder and program model
pub mod script;

// Re-export key types for convenience
pub use capability::Capabilities;
pub use config::{EngineConfig, PlaybackOptions, Repeat};
pub use engine::{RunReport, RunStatus, Session, SessionControl, run, run_realtime};
pub use script::{LoadError, Program, load_script, parse_program};

/// Current version of the Mimic engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
