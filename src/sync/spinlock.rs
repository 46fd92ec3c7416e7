use crate::sync::builder::CodeBuilder;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::isa::Target;
use crate::virtual_machine::vm::Memory;

/// Spin lock on one cell: `0` free, `1` taken.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpinLock {
    pub lock: usize,
}

impl SpinLock {
    pub const fn at(lock: usize) -> Self {
        Self { lock }
    }

    pub const fn footprint(&self) -> usize {
        1
    }

    /// Marks the lock free.
    pub fn seed(&self, memory: &mut Memory) -> Result<(), Fault> {
        memory.set(self.lock, 0)
    }

    /// Busy-waits on `cas` until the lock is taken. Clobbers `t`.
    ///
    /// Never gives up the turn; only safe when the holder cannot be starved,
    /// otherwise use [`SpinLock::lock_yielding`].
    pub fn lock(&self, code: &mut CodeBuilder, t: u8) {
        code.cas(t, self.lock).btr(t, Target::rel(-1));
    }

    /// One `cas` attempt; `t` is `0` if the lock was taken.
    pub fn try_lock(&self, code: &mut CodeBuilder, t: u8) {
        code.cas(t, self.lock);
    }

    /// Like [`SpinLock::lock`], but yields the turn after each failed attempt.
    pub fn lock_yielding(&self, code: &mut CodeBuilder, t: u8) {
        code.cas(t, self.lock)
            .bfs(t, Target::rel(3))
            .yld()
            .br(Target::rel(-3));
    }

    /// Releases the lock. Clobbers `t`.
    pub fn unlock(&self, code: &mut CodeBuilder, t: u8) {
        code.imm(t, 0).sto(t, self.lock);
    }
}
