//! Concurrency simulator.
//!
//! Runs small register-machine threads under a cooperative round-robin
//! scheduler, and generates the instruction sequences for spin locks, queues,
//! mutexes, semaphores and condition variables built on `cas`.

pub mod scheduler;
pub mod sync;
pub mod utils;
pub mod virtual_machine;
