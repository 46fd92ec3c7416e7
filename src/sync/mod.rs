//! Synchronization primitive code generators.
//!
//! Nothing here runs at simulation time. Each primitive is a fixed
//! assignment of memory cells plus functions that append instruction
//! sequences to a [`CodeBuilder`]. Every invariant (mutual exclusion, FIFO
//! wake order, permit accounting) is upheld by the emitted code alone, with
//! `cas` as the only atomic step.
//!
//! Generators take the scratch registers they may clobber as arguments.
//! Primitives that block release their own spin lock before `blk`.
//!
//! # Example
//!
//! ```
//! use interleave::sync::{CodeBuilder, Mutex};
//! use interleave::virtual_machine::program::ThreadId;
//!
//! let mtx = Mutex::at(20, 4);
//! let mut code = CodeBuilder::new();
//! mtx.lock(&mut code, ThreadId(0), 3, 4);
//! code.prs("inside");
//! mtx.unlock(&mut code, 3, 4);
//! let program = code.finish().unwrap();
//! assert!(program.len() > 0);
//! ```

mod builder;
mod cond;
mod mutex;
mod queue;
mod semaphore;
mod spinlock;

pub use builder::CodeBuilder;
pub use cond::Cond;
pub use mutex::Mutex;
pub use queue::{EMPTY, FULL, Queue};
pub use semaphore::Semaphore;
pub use spinlock::SpinLock;
