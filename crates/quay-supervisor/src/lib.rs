//! Quay Supervisor - Process supervision capability
//!
//! The deployment engine never spawns processes itself. It talks to a
//! [`ProcessSupervisor`], a narrow capability covering start, stop, restart,
//! describe, removal and per-process log subscription.
//!
//! Two implementations ship with the crate:
//!
//! - [`NativeSupervisor`]: spawns OS processes with `tokio::process`
//! - [`InMemorySupervisor`]: records intents for tests and development

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod logs;
pub mod memory;
pub mod native;
pub mod supervisor;

// Re-exports
pub use error::{Result, SupervisorError};
pub use logs::{LogHub, LogLine, LogStream};
pub use memory::{InMemorySupervisor, SupervisorCall};
pub use native::{NativeSupervisor, NativeSupervisorConfig};
pub use supervisor::{ProcessDescription, ProcessHandle, ProcessSpec, ProcessSupervisor};
