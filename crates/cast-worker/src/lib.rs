//! Lecture capture worker.
//!
//! This crate provides:
//! - Jobs made of cancelable actions (capture, transcode, post-processing)
//! - The runner owning in-flight jobs and the draining state
//! - Registration and heartbeats against the control plane
//! - The inbound RPC server

pub mod action;
pub mod actions;
pub mod cancel;
pub mod config;
pub mod context;
pub mod control_plane;
pub mod diagnostics;
pub mod error;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod runner;
pub mod server;
pub mod shutdown;
pub mod table;

pub use action::{Action, ActionHandler};
pub use actions::{ActionFactory, StoragePaths};
pub use config::{LogFormat, WorkerConfig};
pub use context::{Directories, JobContext};
pub use control_plane::{ControlPlane, HttpControlPlane};
pub use error::{WorkerError, WorkerResult};
pub use job::Job;
pub use logging::JobLogger;
pub use runner::Runner;
pub use server::{create_router, AppState};
