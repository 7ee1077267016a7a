//! Concrete [`Backend`](crate::backend::Backend) implementations.

pub mod pool;

pub use pool::PooledBackend;
