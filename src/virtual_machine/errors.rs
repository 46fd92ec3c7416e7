use crate::virtual_machine::program::ThreadId;

/// Errors raised while assembling programs, configuring or running a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VMError {
    /// Wrong number of operands for an instruction.
    #[error("{instruction} expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Operand text does not fit the operand kind the instruction expects.
    #[error("{instruction}: expected {expected}, got `{operand}`")]
    InvalidOperand {
        instruction: String,
        operand: String,
        expected: &'static str,
    },
    /// Tokenizer failure (e.g. an unterminated string literal).
    #[error("line {line}:{offset}: {message}")]
    ParseError {
        line: usize,
        offset: usize,
        message: &'static str,
    },
    /// Assembly error with line and column context.
    #[error("line {line}:{offset}: {message}")]
    AssemblyError {
        line: usize,
        offset: usize,
        message: String,
    },
    /// Label defined more than once in one thread.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Jump to a label that no `lab` instruction defines.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
    /// Two threads share an id.
    #[error("duplicate thread id: {thread}")]
    DuplicateThread { thread: ThreadId },
    /// Unrecognized `[ ... ]` section marker in a program file.
    #[error("unknown section: [ {name} ]")]
    UnknownSection { name: String },
    /// Scheduler tunables out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
    /// File I/O error while loading a program.
    #[error("io error on {path}: {message}")]
    IoError { path: String, message: String },
    /// A fault stopped the run under the fail-fast policy.
    #[error("thread {thread} aborted at pc {pc}: {fault}")]
    Aborted {
        thread: ThreadId,
        pc: usize,
        fault: Fault,
    },
}

/// Faults raised by a single instruction step.
///
/// A fault never touches memory or another thread's frame; the scheduler
/// decides what happens to the faulting thread.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    /// Unrecognized opcode.
    #[error("undefined instruction: {text}")]
    UndefinedInstruction { text: String },
    /// Primitive-level fault raised by `err` (e.g. `inqueue-on-full`).
    #[error("primitive fault: {label}")]
    Raised { label: String },
    /// Memory access outside the allocated cells.
    #[error("address {address} out of bounds (memory size {size})")]
    AddressOutOfBounds { address: i64, size: usize },
    /// Register index exceeds the register file size.
    #[error("register {index} out of bounds ({available} available)")]
    RegisterOutOfBounds { index: u8, available: usize },
    /// Relative jump landing before the first instruction.
    #[error("jump from pc {pc} by {offset} leaves the program")]
    InvalidJump { pc: usize, offset: i64 },
    /// Jump to a label missing from the thread's label table.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_messages() {
        let fault = Fault::Raised {
            label: "inqueue-on-full".to_string(),
        };
        assert_eq!(fault.to_string(), "primitive fault: inqueue-on-full");

        let fault = Fault::AddressOutOfBounds {
            address: -1,
            size: 50,
        };
        assert_eq!(
            fault.to_string(),
            "address -1 out of bounds (memory size 50)"
        );
    }

    #[test]
    fn aborted_message_includes_fault() {
        let err = VMError::Aborted {
            thread: ThreadId(3),
            pc: 7,
            fault: Fault::UndefinedInstruction {
                text: "nop".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "thread 3 aborted at pc 7: undefined instruction: nop"
        );
    }
}
