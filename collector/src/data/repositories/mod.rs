//! Database repositories: span inserts and cost aggregation queries

pub mod pipelines;
pub mod spans;
pub mod trending;
