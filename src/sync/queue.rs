use crate::sync::builder::CodeBuilder;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::isa::Target;
use crate::virtual_machine::vm::Memory;

/// Fault label raised by [`Queue::enqueue`] on a full queue.
pub const FULL: &str = "inqueue-on-full";
/// Fault label raised by [`Queue::dequeue`] on an empty queue.
pub const EMPTY: &str = "dequeue-on-empty";

/// Bounded circular queue of integers.
///
/// Layout: `head` and `tail` cells hold absolute addresses into the ring
/// `[beg, beg + len)`. The queue is empty when `head == tail`; one ring cell
/// always stays unused, so it holds at most `len - 1` items.
///
/// The generated code does no locking of its own. Callers serialize access,
/// normally with the spin lock of the primitive that owns the queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Queue {
    pub head: usize,
    pub tail: usize,
    pub beg: usize,
    pub len: usize,
}

impl Queue {
    /// Queue with `head`/`tail` at `addr`, `addr + 1` and its ring elsewhere.
    pub const fn at(addr: usize, beg: usize, len: usize) -> Self {
        Self {
            head: addr,
            tail: addr + 1,
            beg,
            len,
        }
    }

    /// Queue whose ring directly follows its `head`/`tail` cells.
    pub const fn contiguous(addr: usize, capacity: usize) -> Self {
        Self::at(addr, addr + 2, capacity + 1)
    }

    /// Maximum number of queued items.
    pub const fn capacity(&self) -> usize {
        self.len.saturating_sub(1)
    }

    /// Cells used: the two indices plus the ring.
    pub const fn footprint(&self) -> usize {
        2 + self.len
    }

    /// Resets the queue to empty.
    pub fn seed(&self, memory: &mut Memory) -> Result<(), Fault> {
        memory.set(self.head, cell(self.beg))?;
        memory.set(self.tail, cell(self.beg))
    }

    /// Advances the ring pointer in `t` by one, wrapping at the end.
    ///
    /// There is no modulo instruction: subtract the end, test for zero, then
    /// rebias.
    fn advance(&self, code: &mut CodeBuilder, t: u8) {
        code.adi(t, 1)
            .sbi(t, cell(self.beg + self.len))
            .bfs(t, Target::rel(2))
            .adi(t, cell(self.len))
            .adi(t, cell(self.beg));
    }

    /// `reg = tail - head`. Zero exactly when the queue is empty; once the
    /// ring has wrapped the difference may be negative. Clobbers `t0`.
    pub fn length(&self, code: &mut CodeBuilder, reg: u8, t0: u8) {
        code.lod(t0, self.head).lod(reg, self.tail).sub(reg, t0);
    }

    /// `reg = head - next(tail)`. Zero exactly when the queue is full.
    /// Clobbers `t0`.
    pub fn space(&self, code: &mut CodeBuilder, reg: u8, t0: u8) {
        code.lod(t0, self.tail);
        self.advance(code, t0);
        code.lod(reg, self.head).sub(reg, t0);
    }

    /// Appends the value in `reg`. Clobbers `reg` and `t0`.
    ///
    /// On a full queue raises `inqueue-on-full` and leaves the queue as it
    /// was. The value is written into the spare ring cell before the check,
    /// which is harmless because that cell never holds an item.
    pub fn enqueue(&self, code: &mut CodeBuilder, reg: u8, t0: u8) {
        code.lod(t0, self.tail).str(reg, t0);
        self.advance(code, t0);
        code.lod(reg, self.head)
            .sub(reg, t0)
            .btr(reg, Target::rel(3))
            .err(FULL)
            .br(Target::rel(2))
            .sto(t0, self.tail);
    }

    /// Removes the oldest item into `reg`. Clobbers `t0`.
    ///
    /// On an empty queue raises `dequeue-on-empty`, leaves the queue as it
    /// was and sets `reg` to `0`.
    pub fn dequeue(&self, code: &mut CodeBuilder, reg: u8, t0: u8) {
        self.length(code, reg, t0);
        code.btr(reg, Target::rel(3))
            .err(EMPTY)
            .br(Target::rel(8))
            .ldr(reg, t0);
        self.advance(code, t0);
        code.sto(t0, self.head);
    }
}

/// Address or size as a memory cell value.
fn cell(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
