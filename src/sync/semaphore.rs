use crate::sync::builder::CodeBuilder;
use crate::sync::queue::Queue;
use crate::sync::spinlock::SpinLock;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::program::ThreadId;
use crate::virtual_machine::vm::Memory;

/// Counting semaphore.
///
/// Layout from `addr`: spin lock cell, value cell, then a FIFO wait queue of
/// thread ids. `post` to a waiting thread hands the permit over directly and
/// leaves the value unchanged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Semaphore {
    pub lock: SpinLock,
    pub value: usize,
    pub queue: Queue,
}

impl Semaphore {
    /// Semaphore at `addr` whose wait queue holds up to `capacity` threads.
    pub const fn at(addr: usize, capacity: usize) -> Self {
        Self {
            lock: SpinLock::at(addr),
            value: addr + 1,
            queue: Queue::contiguous(addr + 2, capacity),
        }
    }

    pub const fn footprint(&self) -> usize {
        2 + self.queue.footprint()
    }

    /// Unlocked, `permits` available, no waiters.
    pub fn seed(&self, memory: &mut Memory, permits: i64) -> Result<(), Fault> {
        self.lock.seed(memory)?;
        memory.set(self.value, permits)?;
        self.queue.seed(memory)
    }

    /// Takes a permit for thread `tid`, blocking while none is available.
    /// Clobbers `t0` and `t1`. A waiter that finds the queue full yields and
    /// tries again.
    pub fn wait(&self, code: &mut CodeBuilder, tid: ThreadId, t0: u8, t1: u8) {
        let retry = code.fresh_label("sem_wait_retry");
        let slow = code.fresh_label("sem_wait_slow");
        let full = code.fresh_label("sem_wait_full");
        let end = code.fresh_label("sem_wait_end");

        code.lab(retry.clone());
        self.lock.lock_yielding(code, t0);
        code.lod(t0, self.value).bfs(t0, slow.as_str());

        code.sbi(t0, 1).sto(t0, self.value);
        self.lock.unlock(code, t0);
        code.br(end.as_str());

        code.lab(slow);
        self.queue.space(code, t1, t0);
        code.bfs(t1, full.as_str());
        code.imm_thread(t1, tid);
        self.queue.enqueue(code, t1, t0);
        // Release before blocking so posters can get in.
        self.lock.unlock(code, t0);
        code.blk().br(end.as_str());

        code.lab(full);
        self.lock.unlock(code, t0);
        code.yld().br(retry.as_str());

        code.lab(end);
    }

    /// Returns a permit: wakes the oldest waiter, or increments the value if
    /// nobody waits. Clobbers `t0` and `t1`.
    pub fn post(&self, code: &mut CodeBuilder, t0: u8, t1: u8) {
        let empty = code.fresh_label("sem_post_empty");
        let end = code.fresh_label("sem_post_end");

        self.lock.lock_yielding(code, t0);
        self.queue.length(code, t1, t0);
        code.bfs(t1, empty.as_str());

        self.queue.dequeue(code, t1, t0);
        self.lock.unlock(code, t0);
        code.pst(t1).br(end.as_str());

        code.lab(empty);
        code.lod(t0, self.value).adi(t0, 1).sto(t0, self.value);
        self.lock.unlock(code, t0);
        code.lab(end);
    }

    /// Reads the current value into `t`, without locking.
    pub fn load_value(&self, code: &mut CodeBuilder, t: u8) {
        code.lod(t, self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_seed() {
        let s = Semaphore::at(10, 2);
        assert_eq!(s.lock.lock, 10);
        assert_eq!(s.value, 11);
        assert_eq!(s.queue.head, 12);
        assert_eq!(s.queue.beg, 14);
        assert_eq!(s.footprint(), 7);

        let mut memory = Memory::new(20);
        s.seed(&mut memory, 2).unwrap();
        assert_eq!(&memory.as_slice()[10..17], &[0, 2, 14, 14, 0, 0, 0]);
    }

    #[test]
    fn load_value_is_a_single_load() {
        let mut code = CodeBuilder::new();
        Semaphore::at(10, 2).load_value(&mut code, 3);
        assert_eq!(code.instructions().len(), 1);
        assert_eq!(code.instructions()[0].to_string(), "lod 3, 11");
    }
}
