pub mod dependency;
pub mod simple;
pub mod span;
pub mod v1;
