pub mod config;
pub mod constants;
pub mod dependency;
pub mod error;
pub mod ids;
pub mod model;
pub mod normalize;
pub mod query;
pub mod time;

pub use error::{Result, ZipfluxError};
