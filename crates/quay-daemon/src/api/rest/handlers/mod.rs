//! API request handlers

mod events;
mod health;
mod logs;
mod releases;
mod runtime;
mod services;

pub use events::*;
pub use health::*;
pub use logs::*;
pub use releases::*;
pub use runtime::*;
pub use services::*;
