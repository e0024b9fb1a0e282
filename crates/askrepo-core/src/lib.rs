//! Configuration, preflight, answer composition, and the `read` / `ask` workflows.

pub mod answer;
pub mod config;
pub mod preflight;
pub mod workflow;

pub use config::Config;
pub use workflow::{Answer, AskOptions, ReadOutcome, ReadReport, run_ask, run_read};
