use crate::sync::builder::CodeBuilder;
use crate::sync::mutex::Mutex;
use crate::sync::queue::Queue;
use crate::sync::spinlock::SpinLock;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::program::ThreadId;
use crate::virtual_machine::vm::Memory;

/// Condition variable, used together with a [`Mutex`] the caller holds.
///
/// Layout from `addr`: spin lock cell, then a FIFO wait queue of thread ids.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cond {
    pub lock: SpinLock,
    pub queue: Queue,
}

impl Cond {
    /// Condition variable at `addr` whose wait queue holds up to `capacity`
    /// threads.
    pub const fn at(addr: usize, capacity: usize) -> Self {
        Self {
            lock: SpinLock::at(addr),
            queue: Queue::contiguous(addr + 1, capacity),
        }
    }

    pub const fn footprint(&self) -> usize {
        1 + self.queue.footprint()
    }

    pub fn seed(&self, memory: &mut Memory) -> Result<(), Fault> {
        self.lock.seed(memory)?;
        self.queue.seed(memory)
    }

    /// Waits for a signal. `mutex` must be held by `tid`; it is released
    /// while waiting and held again when this returns. Clobbers `t0` and `t1`.
    ///
    /// Releasing the mutex and blocking are separate steps. A signal landing
    /// between them leaves a pending wake that the `blk` consumes.
    ///
    /// With the wait queue full the thread releases the mutex, yields and
    /// returns without a signal. Callers re-check their condition in a loop.
    pub fn wait(&self, code: &mut CodeBuilder, mutex: &Mutex, tid: ThreadId, t0: u8, t1: u8) {
        let full = code.fresh_label("cond_wait_full");
        let relock = code.fresh_label("cond_wait_relock");

        self.lock.lock_yielding(code, t0);
        self.queue.space(code, t1, t0);
        code.bfs(t1, full.as_str());
        code.imm_thread(t0, tid);
        self.queue.enqueue(code, t0, t1);
        self.lock.unlock(code, t0);

        mutex.unlock(code, t0, t1);
        code.blk().br(relock.as_str());

        code.lab(full);
        self.lock.unlock(code, t0);
        mutex.unlock(code, t0, t1);
        code.yld();

        code.lab(relock);
        mutex.lock(code, tid, t0, t1);
    }

    /// Wakes the oldest waiter, if any. Clobbers `t0` and `t1`.
    pub fn signal(&self, code: &mut CodeBuilder, t0: u8, t1: u8) {
        let empty = code.fresh_label("cond_signal_empty");
        let end = code.fresh_label("cond_signal_end");

        self.lock.lock_yielding(code, t0);
        self.queue.length(code, t0, t1);
        code.bfs(t0, empty.as_str());

        self.queue.dequeue(code, t1, t0);
        self.lock.unlock(code, t0);
        code.pst(t1).br(end.as_str());

        code.lab(empty);
        self.lock.unlock(code, t0);
        code.lab(end);
    }

    /// Wakes every waiter. Clobbers `t0` and `t1`.
    pub fn broadcast(&self, code: &mut CodeBuilder, t0: u8, t1: u8) {
        let next = code.fresh_label("cond_broadcast_next");
        let done = code.fresh_label("cond_broadcast_done");

        self.lock.lock_yielding(code, t0);
        code.lab(next.as_str());
        self.queue.length(code, t0, t1);
        code.bfs(t0, done.as_str());
        self.queue.dequeue(code, t1, t0);
        code.pst(t1).br(next.as_str());

        code.lab(done);
        self.lock.unlock(code, t0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_seed() {
        let c = Cond::at(0, 6);
        assert_eq!(c.lock.lock, 0);
        assert_eq!(c.queue.head, 1);
        assert_eq!(c.queue.tail, 2);
        assert_eq!(c.queue.beg, 3);
        assert_eq!(c.queue.len, 7);
        assert_eq!(c.footprint(), 10);

        let mut memory = Memory::new(10);
        c.seed(&mut memory).unwrap();
        assert_eq!(&memory.as_slice()[..3], &[0, 3, 3]);
    }

    #[test]
    fn wait_relocks_with_callers_id() {
        let c = Cond::at(0, 6);
        let m = Mutex::at(10, 4);
        let mut code = CodeBuilder::new();
        c.wait(&mut code, &m, ThreadId(7), 0, 1);
        let ids: Vec<String> = code
            .instructions()
            .iter()
            .map(|i| i.to_string())
            .filter(|s| s.starts_with("imm") && s.ends_with(", 7"))
            .collect();
        // Once to enqueue on the condition, once if the re-lock takes the slow path.
        assert_eq!(ids, vec!["imm 0, 7", "imm 1, 7"]);
        assert!(code.finish().is_ok());
    }
}
