pub mod config;
pub mod job;
pub mod row;

pub use config::BackfillConfig;
pub use job::*;
pub use row::*;
