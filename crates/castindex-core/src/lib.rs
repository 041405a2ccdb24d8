//! Castindex Core - Domain types shared by the transcript indexing pipeline.

mod error;
mod retry;
mod types;

pub use error::{Error, Result};
pub use retry::RetryPolicy;
pub use types::*;
