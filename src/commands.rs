pub mod analyze;
pub mod fetch;
