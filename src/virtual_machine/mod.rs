//! Register machine shared by every simulated thread.
//!
//! # Architecture
//!
//! - **Registers**: a small per-thread file of `i64` registers, zeroed at admission
//! - **Memory**: one flat array of `i64` cells shared by all threads
//! - **Atomicity**: `cas` is the only atomic read-modify-write
//! - **Suspension**: `yld` ends a turn, `blk` parks the thread until a `pst`
//!
//! # Modules
//!
//! - [`assembler`]: Instruction text, thread sections and diagnostics
//! - [`errors`]: Host-side errors and per-instruction faults
//! - [`isa`]: Instruction table, `Instruction` and `Target`
//! - [`program`]: Thread ids and label-checked programs
//! - [`vm`]: Memory, registers and the single-step executor

pub mod assembler;
pub mod errors;
pub mod isa;
pub mod program;
pub mod vm;
