pub mod aggregator;
pub mod backend;
pub mod backends;
pub mod context;
pub mod display;
pub mod executor;
pub mod filter;
pub mod node;
pub mod partition;
pub mod pool;
pub mod queue;
pub mod report;
pub mod result;
pub mod summary;
