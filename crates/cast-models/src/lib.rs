//! Shared data models for the lecture-capture worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job and action identities
//! - Stream versions
//! - Control-channel request/response bodies and their routes

pub mod action;
pub mod job;
pub mod rpc;
pub mod stream;

// Re-export common types
pub use action::{ActionType, ParseActionTypeError};
pub use job::{JobId, JobState};
pub use rpc::{
    Ack, ErrorBody, HeartbeatRequest, PublishRequest, RegisterRequest, SelfStreamRequest,
    SelfStreamResponse, StreamEndRequest, StreamRequest, StreamResponse, TranscodingRequest,
    TranscodingResponse, WorkerStatus,
};
pub use stream::StreamVersion;
