mod job;
mod pool;
mod stats;
#[cfg(test)]
mod tests;

pub use job::Job;
pub use pool::WorkerPool;
pub use stats::{WorkloadSnapshot, WorkloadStats};
