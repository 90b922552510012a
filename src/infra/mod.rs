//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod http;
pub mod llm;
pub mod storage;
pub mod telemetry;
