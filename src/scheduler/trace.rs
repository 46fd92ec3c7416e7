//! Scheduling events and the sinks that observe them.
//!
//! The scheduler reports everything observable through a [`Sink`]: program
//! output from `prt`/`prs`, block and wake bookkeeping, faults and thread
//! exits. Nothing in the core reads these back.

use crate::utils::log::{self, Level};
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::ThreadId;
use crate::virtual_machine::vm::Output;
use crate::{debug, info, trace};

/// One observable scheduling event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// About to execute `instruction` at `pc`. Only sent when the sink asks.
    Step {
        thread: ThreadId,
        pc: usize,
        instruction: Instruction,
    },
    /// Output of `prt` or `prs`.
    Print { thread: ThreadId, output: Output },
    /// The thread executed `yld`.
    Yielded { thread: ThreadId },
    /// The thread executed `blk` with no wake pending and left the ready set.
    Blocked { thread: ThreadId },
    /// The thread executed `blk` and consumed a wake that arrived earlier.
    WakeConsumed { thread: ThreadId },
    /// `pst` moved a blocked thread back to ready.
    Woken { by: ThreadId, thread: ThreadId },
    /// `pst` found the target not blocked and left a pending wake.
    WakeDeferred { by: ThreadId, thread: ThreadId },
    /// `pst` named a thread that has finished or does not exist.
    WakeDropped { by: ThreadId, thread: ThreadId },
    /// An instruction faulted.
    Fault {
        thread: ThreadId,
        pc: usize,
        fault: Fault,
    },
    /// The thread ran past its last instruction.
    Exited { thread: ThreadId },
    /// The thread was removed after a fault.
    Terminated { thread: ThreadId },
    /// End of the thread's turn.
    TurnEnd { thread: ThreadId, executed: usize },
}

/// Receiver of scheduling events.
pub trait Sink {
    fn record(&mut self, event: Event);

    /// Whether the scheduler should build [`Event::Step`] events.
    fn wants_steps(&self) -> bool {
        false
    }
}

/// Sink that writes events through the crate logger.
///
/// Prints go to `info`, scheduling bookkeeping to `debug` and per-step
/// instruction traces to `trace`. Faults are logged by the scheduler itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn record(&mut self, event: Event) {
        match event {
            Event::Step {
                thread,
                pc,
                instruction,
            } => trace!("[{thread}] {pc:>4}  {instruction}"),
            Event::Print { thread, output } => info!("[{thread}] {output}"),
            Event::Yielded { thread } => debug!("thread {thread} yields"),
            Event::Blocked { thread } => debug!("thread {thread} blocks"),
            Event::WakeConsumed { thread } => {
                debug!("thread {thread} consumed a pending wake and stays ready")
            }
            Event::Woken { by, thread } => debug!("thread {by} wakes thread {thread}"),
            Event::WakeDeferred { by, thread } => {
                debug!("thread {by} leaves a pending wake for thread {thread}")
            }
            Event::WakeDropped { by, thread } => {
                debug!("thread {by} posts to thread {thread}, which is gone")
            }
            Event::Fault { .. } => {}
            Event::Exited { thread } => debug!("thread {thread} exits"),
            Event::Terminated { thread } => debug!("thread {thread} terminated after fault"),
            Event::TurnEnd { thread, executed } => {
                debug!("thread {thread}: {executed} instruction(s) this turn")
            }
        }
    }

    fn wants_steps(&self) -> bool {
        log::enabled(Level::Trace)
    }
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn record(&mut self, _event: Event) {}
}

/// Sink that keeps every event in memory, for tests and tooling.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    events: Vec<Event>,
    steps: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also capture [`Event::Step`] for every executed instruction.
    pub fn with_steps() -> Self {
        Self {
            events: Vec::new(),
            steps: true,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Every printed output in order, tagged with the printing thread.
    pub fn prints(&self) -> Vec<(ThreadId, Output)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Print { thread, output } => Some((*thread, output.clone())),
                _ => None,
            })
            .collect()
    }

    /// Values printed with `prt`, in order, by any thread.
    pub fn printed_values(&self) -> Vec<i64> {
        self.prints()
            .into_iter()
            .filter_map(|(_, output)| match output {
                Output::Value(v) => Some(v),
                Output::Text(_) => None,
            })
            .collect()
    }

    /// Every fault in order.
    pub fn faults(&self) -> Vec<(ThreadId, Fault)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Fault { thread, fault, .. } => Some((*thread, fault.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|&event| pred(event)).count()
    }

    /// Events of one thread, in order.
    pub fn events_of(&self, id: ThreadId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|event| event.thread() == id)
            .collect()
    }
}

impl Sink for RecordingSink {
    fn record(&mut self, event: Event) {
        self.events.push(event);
    }

    fn wants_steps(&self) -> bool {
        self.steps
    }
}

impl Event {
    /// The thread the event is about (the target, for wakes).
    pub fn thread(&self) -> ThreadId {
        match self {
            Event::Step { thread, .. }
            | Event::Print { thread, .. }
            | Event::Yielded { thread }
            | Event::Blocked { thread }
            | Event::WakeConsumed { thread }
            | Event::Woken { thread, .. }
            | Event::WakeDeferred { thread, .. }
            | Event::WakeDropped { thread, .. }
            | Event::Fault { thread, .. }
            | Event::Exited { thread }
            | Event::Terminated { thread }
            | Event::TurnEnd { thread, .. } => *thread,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_queries() {
        let mut sink = RecordingSink::new();
        sink.record(Event::Print {
            thread: ThreadId(0),
            output: Output::Value(123),
        });
        sink.record(Event::Print {
            thread: ThreadId(1),
            output: Output::Text("done".to_string()),
        });
        sink.record(Event::Woken {
            by: ThreadId(0),
            thread: ThreadId(1),
        });
        sink.record(Event::Fault {
            thread: ThreadId(1),
            pc: 4,
            fault: Fault::Raised {
                label: "dequeue-on-empty".to_string(),
            },
        });

        assert_eq!(sink.printed_values(), vec![123]);
        assert_eq!(sink.prints().len(), 2);
        assert_eq!(sink.faults().len(), 1);
        assert_eq!(sink.events_of(ThreadId(1)).len(), 3);
        assert_eq!(sink.count(|e| matches!(e, Event::Woken { .. })), 1);
        assert!(!sink.wants_steps());
        assert!(RecordingSink::with_steps().wants_steps());
    }

    #[test]
    fn log_sink_skips_steps_under_test() {
        assert!(!LogSink.wants_steps());
    }
}
