// Library surface for the binary, headless tests and offline analysis.
pub mod analysis;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod event_log;
pub mod export;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod remote;
pub mod runtime;
pub mod sentences;
pub mod session;
pub mod status;
pub mod storage;
pub mod telemetry;
pub mod timer;

pub use error::{Error, Result};
