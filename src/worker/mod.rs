//! Background execution for provider I/O

pub mod pool;

pub use pool::TaskPool;
