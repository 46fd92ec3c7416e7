//! Cooperative round-robin scheduler.
//!
//! Exactly one thread runs at a time. Each sweep takes a snapshot of the ready
//! set in thread-id order and gives every thread in it one turn of at most
//! `quota` instructions. A turn ends early on `yld`, `blk`, a fault under a
//! non-continuing policy, or when the thread runs off the end of its program.
//!
//! # Block/wake race
//!
//! `pst` on a blocked thread moves it back to ready. `pst` on any other thread
//! leaves a pending wake; when that thread later executes `blk`, it consumes
//! the pending wake and stays ready instead of blocking. A wake issued between
//! a thread's decision to block and its `blk` is therefore never lost.

pub mod config;
pub mod trace;

pub use config::{FaultPolicy, SchedulerConfig};
pub use trace::{Event, LogSink, NullSink, RecordingSink, Sink};

use crate::virtual_machine::assembler::Workload;
use crate::virtual_machine::errors::{Fault, VMError};
use crate::virtual_machine::program::{Program, ThreadId};
use crate::virtual_machine::vm::{Executor, Frame, Memory, Signal};
use crate::{debug, error, warn};
use std::collections::{BTreeMap, BTreeSet};

/// A logical thread: its program and private frame.
#[derive(Clone, Debug)]
pub struct Thread {
    pub id: ThreadId,
    pub program: Program,
    pub frame: Frame,
}

impl Thread {
    fn finished(&self) -> bool {
        self.frame.pc >= self.program.len()
    }
}

/// Why [`Scheduler::run`] returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Halt {
    /// No thread is ready. Threads still blocked are deadlocked.
    Idle,
    /// `max_rounds` sweeps ran with threads still ready.
    RoundLimit,
}

/// Summary of a completed run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunReport {
    /// Sweeps executed since the scheduler was built.
    pub rounds: usize,
    pub halt: Halt,
    /// Threads that exited or were terminated, in the order they left.
    pub finished: Vec<ThreadId>,
    /// Threads still blocked when the run stopped.
    pub blocked: Vec<ThreadId>,
    /// Faults raised during the run.
    pub faults: usize,
}

impl RunReport {
    /// Returns `true` if the run stopped with threads waiting on a wake that
    /// can no longer come.
    pub fn deadlocked(&self) -> bool {
        self.halt == Halt::Idle && !self.blocked.is_empty()
    }
}

/// How a turn left the thread.
enum TurnOutcome {
    Ready,
    Blocked,
    Exited,
    Terminated,
    Aborted { pc: usize, fault: Fault },
}

/// Owns shared memory and every thread, and drives them turn by turn.
pub struct Scheduler<S: Sink = LogSink> {
    config: SchedulerConfig,
    memory: Memory,
    ready: BTreeMap<ThreadId, Thread>,
    blocked: BTreeMap<ThreadId, Thread>,
    pending_wake: BTreeSet<ThreadId>,
    sink: S,
    rounds: usize,
    finished: Vec<ThreadId>,
    faults: usize,
}

impl Scheduler<LogSink> {
    /// Creates a scheduler with every thread ready and memory zeroed.
    pub fn new<I>(config: SchedulerConfig, threads: I) -> Result<Self, VMError>
    where
        I: IntoIterator<Item = (ThreadId, Program)>,
    {
        Self::with_init(config, threads, |_, _| {})
    }

    /// Creates a scheduler, running `init` once before any thread is admitted.
    ///
    /// `init` gets the zeroed memory and the tunables. Memory is resized and
    /// frames are sized from the tunables as `init` leaves them.
    pub fn with_init<I, F>(
        mut config: SchedulerConfig,
        threads: I,
        init: F,
    ) -> Result<Self, VMError>
    where
        I: IntoIterator<Item = (ThreadId, Program)>,
        F: FnOnce(&mut Memory, &mut SchedulerConfig),
    {
        config.validate()?;
        let mut memory = Memory::new(config.memory_size);
        init(&mut memory, &mut config);
        config.validate()?;
        memory.resize(config.memory_size);

        let mut ready = BTreeMap::new();
        for (id, program) in threads {
            let thread = Thread {
                id,
                program,
                frame: Frame::new(config.register_count),
            };
            if ready.insert(id, thread).is_some() {
                return Err(VMError::DuplicateThread { thread: id });
            }
        }

        Ok(Self {
            config,
            memory,
            ready,
            blocked: BTreeMap::new(),
            pending_wake: BTreeSet::new(),
            sink: LogSink,
            rounds: 0,
            finished: Vec::new(),
            faults: 0,
        })
    }

    /// Creates a scheduler from an assembled program file, writing its
    /// memory seeds before the first sweep.
    pub fn from_workload(config: SchedulerConfig, workload: Workload) -> Result<Self, VMError> {
        let Workload { threads, memory } = workload;
        let mut seeded = Ok(());
        let scheduler = Self::with_init(config, threads, |mem, _| {
            for (addr, value) in memory {
                if let Err(fault) = mem.set(addr, value) {
                    seeded = Err(VMError::InvalidConfig {
                        reason: format!("memory seed: {fault}"),
                    });
                    return;
                }
            }
        })?;
        seeded.map(|()| scheduler)
    }
}

impl<S: Sink> Scheduler<S> {
    /// Replaces the event sink.
    pub fn with_sink<T: Sink>(self, sink: T) -> Scheduler<T> {
        Scheduler {
            config: self.config,
            memory: self.memory,
            ready: self.ready,
            blocked: self.blocked,
            pending_wake: self.pending_wake,
            sink,
            rounds: self.rounds,
            finished: self.finished,
            faults: self.faults,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Sweeps executed so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn ready_ids(&self) -> Vec<ThreadId> {
        self.ready.keys().copied().collect()
    }

    pub fn blocked_ids(&self) -> Vec<ThreadId> {
        self.blocked.keys().copied().collect()
    }

    pub fn is_ready(&self, id: ThreadId) -> bool {
        self.ready.contains_key(&id)
    }

    pub fn is_blocked(&self, id: ThreadId) -> bool {
        self.blocked.contains_key(&id)
    }

    pub fn has_pending_wake(&self, id: ThreadId) -> bool {
        self.pending_wake.contains(&id)
    }

    /// Frame of a thread that is still ready or blocked.
    pub fn frame(&self, id: ThreadId) -> Option<&Frame> {
        self.ready
            .get(&id)
            .or_else(|| self.blocked.get(&id))
            .map(|thread| &thread.frame)
    }

    /// Runs sweeps until no thread is ready or the round limit is reached.
    ///
    /// Returns [`VMError::Aborted`] if a fault occurs under
    /// [`FaultPolicy::Abort`].
    pub fn run(&mut self) -> Result<RunReport, VMError> {
        loop {
            if self.ready.is_empty() {
                return Ok(self.report(Halt::Idle));
            }
            if self.config.max_rounds.is_some_and(|max| self.rounds >= max) {
                debug!("round limit of {} reached", self.rounds);
                return Ok(self.report(Halt::RoundLimit));
            }
            self.step_round()?;
        }
    }

    /// Runs one sweep: one turn for every thread ready at its start.
    ///
    /// Threads woken during the sweep get their turn in the next one.
    pub fn step_round(&mut self) -> Result<(), VMError> {
        let snapshot: Vec<ThreadId> = self.ready.keys().copied().collect();
        self.rounds += 1;
        for id in snapshot {
            let Some(mut thread) = self.ready.remove(&id) else {
                continue;
            };

            match self.run_turn(&mut thread) {
                TurnOutcome::Ready => {
                    self.ready.insert(id, thread);
                }
                TurnOutcome::Blocked => {
                    self.blocked.insert(id, thread);
                }
                TurnOutcome::Exited => {
                    self.pending_wake.remove(&id);
                    self.sink.record(Event::Exited { thread: id });
                    self.finished.push(id);
                }
                TurnOutcome::Terminated => {
                    self.pending_wake.remove(&id);
                    self.sink.record(Event::Terminated { thread: id });
                    self.finished.push(id);
                }
                TurnOutcome::Aborted { pc, fault } => {
                    self.ready.insert(id, thread);
                    error!("thread {id} aborted the run at pc {pc}: {fault}");
                    return Err(VMError::Aborted {
                        thread: id,
                        pc,
                        fault,
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs one thread for up to `quota` instructions.
    fn run_turn(&mut self, thread: &mut Thread) -> TurnOutcome {
        let id = thread.id;
        let quota = self.config.quota;
        let wants_steps = self.sink.wants_steps();
        let mut executed = 0;

        let outcome = loop {
            if thread.finished() {
                break TurnOutcome::Exited;
            }
            if executed == quota {
                break TurnOutcome::Ready;
            }

            let pc = thread.frame.pc;
            if wants_steps {
                if let Some(instruction) = thread.program.get(pc) {
                    self.sink.record(Event::Step {
                        thread: id,
                        pc,
                        instruction: instruction.clone(),
                    });
                }
            }

            let signal = Executor::new(&thread.program, &mut thread.frame, &mut self.memory).step();
            executed += 1;

            match signal {
                Signal::Continue => {}
                Signal::Print(output) => self.sink.record(Event::Print { thread: id, output }),
                Signal::Post(target) => self.wake(id, target),
                Signal::Yield => {
                    self.sink.record(Event::Yielded { thread: id });
                    break TurnOutcome::Ready;
                }
                Signal::Block => {
                    if self.pending_wake.remove(&id) {
                        self.sink.record(Event::WakeConsumed { thread: id });
                        break TurnOutcome::Ready;
                    }
                    self.sink.record(Event::Blocked { thread: id });
                    break TurnOutcome::Blocked;
                }
                Signal::Exit => break TurnOutcome::Exited,
                Signal::Fault(fault) => {
                    self.faults += 1;
                    warn!("thread {id} faulted at pc {pc}: {fault}");
                    self.sink.record(Event::Fault {
                        thread: id,
                        pc,
                        fault: fault.clone(),
                    });
                    match self.config.fault_policy {
                        FaultPolicy::Continue => {}
                        FaultPolicy::Terminate => break TurnOutcome::Terminated,
                        FaultPolicy::Abort => break TurnOutcome::Aborted { pc, fault },
                    }
                }
            }
        };

        self.sink.record(Event::TurnEnd {
            thread: id,
            executed,
        });
        outcome
    }

    /// Delivers a `pst` from `by` to `target`.
    ///
    /// The running thread is out of the ready set for its turn, so `by` counts
    /// as live. A wake for a thread that finished or never existed is dropped.
    fn wake(&mut self, by: ThreadId, target: ThreadId) {
        if let Some(thread) = self.blocked.remove(&target) {
            self.ready.insert(target, thread);
            self.sink.record(Event::Woken { by, thread: target });
        } else if target == by || self.ready.contains_key(&target) {
            self.pending_wake.insert(target);
            self.sink.record(Event::WakeDeferred { by, thread: target });
        } else {
            self.sink.record(Event::WakeDropped { by, thread: target });
        }
    }

    fn report(&self, halt: Halt) -> RunReport {
        let report = RunReport {
            rounds: self.rounds,
            halt,
            finished: self.finished.clone(),
            blocked: self.blocked_ids(),
            faults: self.faults,
        };
        if report.deadlocked() {
            debug!(
                "{} thread(s) still blocked with nothing ready",
                report.blocked.len()
            );
        }
        report
    }
}
