//! Database operations.

pub mod episodes;
pub mod import;
pub mod lookup;
pub mod shows;
pub mod stats;
