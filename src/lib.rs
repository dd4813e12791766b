pub mod acquire;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod redact;
pub mod storage;
pub mod transcribe;
pub mod video;
