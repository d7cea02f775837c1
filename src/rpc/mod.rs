pub mod classify;
pub mod client;
pub mod pool;
pub mod query;
pub mod rate_limit;
pub mod types;
