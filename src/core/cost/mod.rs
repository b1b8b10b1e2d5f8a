pub mod pipeline;
pub mod query;
