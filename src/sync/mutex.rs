use crate::sync::builder::CodeBuilder;
use crate::sync::queue::Queue;
use crate::sync::spinlock::SpinLock;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::program::ThreadId;
use crate::virtual_machine::vm::Memory;

/// Blocking mutex.
///
/// Layout from `addr`: spin lock cell, held cell, then a FIFO wait queue of
/// thread ids. The held cell is `1` while any thread owns the mutex.
/// Ownership passes directly from the unlocking thread to the oldest waiter
/// without clearing held, so a woken thread never re-checks it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mutex {
    pub lock: SpinLock,
    pub held: usize,
    pub queue: Queue,
}

impl Mutex {
    /// Mutex at `addr` whose wait queue holds up to `capacity` threads.
    pub const fn at(addr: usize, capacity: usize) -> Self {
        Self {
            lock: SpinLock::at(addr),
            held: addr + 1,
            queue: Queue::contiguous(addr + 2, capacity),
        }
    }

    pub const fn footprint(&self) -> usize {
        2 + self.queue.footprint()
    }

    /// Unlocked, not held, no waiters.
    pub fn seed(&self, memory: &mut Memory) -> Result<(), Fault> {
        self.lock.seed(memory)?;
        memory.set(self.held, 0)?;
        self.queue.seed(memory)
    }

    /// Acquires the mutex for thread `tid`, blocking if it is held.
    /// Clobbers `t0` and `t1`.
    ///
    /// With the wait queue full the thread yields and starts over instead of
    /// enqueueing.
    pub fn lock(&self, code: &mut CodeBuilder, tid: ThreadId, t0: u8, t1: u8) {
        let retry = code.fresh_label("mtx_lock_retry");
        let slow = code.fresh_label("mtx_lock_slow");
        let full = code.fresh_label("mtx_lock_full");
        let end = code.fresh_label("mtx_lock_end");

        code.lab(retry.clone());
        self.lock.lock_yielding(code, t0);
        code.cas(t0, self.held).btr(t0, slow.as_str());

        // Fast path: held was free and is now ours.
        self.lock.unlock(code, t0);
        code.br(end.as_str());

        code.lab(slow);
        self.queue.space(code, t1, t0);
        code.bfs(t1, full.as_str());
        code.imm_thread(t1, tid);
        self.queue.enqueue(code, t1, t0);
        self.lock.unlock(code, t0);
        code.blk().br(end.as_str());

        code.lab(full);
        self.lock.unlock(code, t0);
        code.yld().br(retry.as_str());

        // Woken by the previous owner; held was never cleared.
        code.lab(end);
    }

    /// One attempt at taking the held cell; `t` is `0` on success.
    pub fn try_lock(&self, code: &mut CodeBuilder, t: u8) {
        code.cas(t, self.held);
    }

    /// Releases the mutex, handing it to the oldest waiter if there is one.
    /// Clobbers `t0` and `t1`.
    pub fn unlock(&self, code: &mut CodeBuilder, t0: u8, t1: u8) {
        let empty = code.fresh_label("mtx_unlock_empty");
        let end = code.fresh_label("mtx_unlock_end");

        self.lock.lock_yielding(code, t0);
        self.queue.length(code, t1, t0);
        code.bfs(t1, empty.as_str());

        self.queue.dequeue(code, t1, t0);
        self.lock.unlock(code, t0);
        code.pst(t1).br(end.as_str());

        code.lab(empty);
        code.imm(t0, 0).sto(t0, self.held);
        self.lock.unlock(code, t0);
        code.lab(end);
    }
}
