//! Single-step instruction executor.
//!
//! The executor runs exactly one instruction of one thread against shared
//! memory and reports what the scheduler should do next through a [`Signal`].
//! It never decides scheduling itself. All arithmetic uses wrapping semantics
//! to prevent overflow panics.

mod memory;
mod registers;

pub use memory::Memory;
pub use registers::Registers;

use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::isa::{Instruction, Target};
use crate::virtual_machine::program::{Program, ThreadId};

/// Observable output of `prt` and `prs`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Output {
    /// Register value printed by `prt`.
    Value(i64),
    /// Text printed by `prs`.
    Text(String),
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Value(v) => write!(f, "{v}"),
            Output::Text(t) => f.write_str(t),
        }
    }
}

/// Result of one instruction step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Signal {
    /// Keep running this turn.
    Continue,
    /// End the turn; the thread stays ready.
    Yield,
    /// End the turn and ask to be moved to the blocked set.
    Block,
    /// Wake the named thread, then keep running.
    Post(ThreadId),
    /// Emit output, then keep running.
    Print(Output),
    /// The program counter is past the last instruction.
    Exit,
    /// The instruction faulted. The pc has already moved past it.
    Fault(Fault),
}

/// A thread's program counter plus its private register file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub pc: usize,
    pub registers: Registers,
}

impl Frame {
    pub fn new(register_count: usize) -> Self {
        Self {
            pc: 0,
            registers: Registers::new(register_count),
        }
    }
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident ),* $(,)? ) ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant { $( $field ),* } => {
                    $vm.$handler($( exec_vm!(@read $field, $kind) ),*)
                }
            )*
            Instruction::Undefined { text } => Err(Fault::UndefinedInstruction {
                text: text.clone(),
            }),
        }
    }};

    (@read $field:ident, Reg) => { *$field };
    (@read $field:ident, Imm) => { *$field };
    (@read $field:ident, Addr) => { *$field };
    (@read $field:ident, Target) => { $field };
    (@read $field:ident, Name) => { $field.as_str() };
    (@read $field:ident, Text) => { $field.as_str() };
}

/// Executes instructions of one thread against shared memory.
///
/// Borrowing the frame and memory for the length of a turn keeps other
/// threads' frames out of reach while this one runs.
pub struct Executor<'a> {
    program: &'a Program,
    frame: &'a mut Frame,
    memory: &'a mut Memory,
    /// Index of the instruction being executed.
    current: usize,
}

impl<'a> Executor<'a> {
    pub fn new(program: &'a Program, frame: &'a mut Frame, memory: &'a mut Memory) -> Self {
        let current = frame.pc;
        Self {
            program,
            frame,
            memory,
            current,
        }
    }

    /// Returns `true` once the pc has run past the last instruction.
    pub fn finished(&self) -> bool {
        self.frame.pc >= self.program.len()
    }

    /// Executes the instruction at the current pc.
    ///
    /// The pc advances by one before the handler runs, so jumps overwrite it
    /// and faults leave it pointing at the next instruction.
    pub fn step(&mut self) -> Signal {
        let program = self.program;
        let pc = self.frame.pc;
        let Some(instr) = program.get(pc) else {
            return Signal::Exit;
        };

        self.current = pc;
        self.frame.pc = pc + 1;
        match self.exec(instr) {
            Ok(signal) => signal,
            Err(fault) => {
                self.frame.pc = pc + 1;
                Signal::Fault(fault)
            }
        }
    }

    fn exec(&mut self, instruction: &'a Instruction) -> Result<Signal, Fault> {
        exec_vm! {
            vm = self,
            instr = instruction,
            {
                // Register arithmetic
                Imm => op_imm(rd: Reg, imm: Imm),
                Add => op_add(rd: Reg, rs: Reg),
                Sub => op_sub(rd: Reg, rs: Reg),
                Adi => op_adi(rd: Reg, imm: Imm),
                Sbi => op_sbi(rd: Reg, imm: Imm),
                // Memory
                Lod => op_lod(rd: Reg, addr: Addr),
                Sto => op_sto(rs: Reg, addr: Addr),
                Ldr => op_ldr(rd: Reg, ra: Reg),
                Str => op_str(rs: Reg, ra: Reg),
                Cas => op_cas(rd: Reg, addr: Addr),
                // Control flow
                Br => op_br(target: Target),
                Btr => op_btr(rs: Reg, target: Target),
                Bfs => op_bfs(rs: Reg, target: Target),
                Lab => op_lab(name: Name),
                // Scheduling
                Yld => op_yld(),
                Blk => op_blk(),
                Pst => op_pst(rs: Reg),
                // Observation and faults
                Prt => op_prt(rs: Reg),
                Prs => op_prs(text: Text),
                Err => op_err(label: Name),
            }
        }
    }

    fn op_imm(&mut self, rd: u8, imm: i64) -> Result<Signal, Fault> {
        self.frame.registers.set(rd, imm)?;
        Ok(Signal::Continue)
    }

    fn op_add(&mut self, rd: u8, rs: u8) -> Result<Signal, Fault> {
        let a = self.frame.registers.get(rd)?;
        let b = self.frame.registers.get(rs)?;
        self.frame.registers.set(rd, a.wrapping_add(b))?;
        Ok(Signal::Continue)
    }

    fn op_sub(&mut self, rd: u8, rs: u8) -> Result<Signal, Fault> {
        let a = self.frame.registers.get(rd)?;
        let b = self.frame.registers.get(rs)?;
        self.frame.registers.set(rd, a.wrapping_sub(b))?;
        Ok(Signal::Continue)
    }

    fn op_adi(&mut self, rd: u8, imm: i64) -> Result<Signal, Fault> {
        let a = self.frame.registers.get(rd)?;
        self.frame.registers.set(rd, a.wrapping_add(imm))?;
        Ok(Signal::Continue)
    }

    fn op_sbi(&mut self, rd: u8, imm: i64) -> Result<Signal, Fault> {
        let a = self.frame.registers.get(rd)?;
        self.frame.registers.set(rd, a.wrapping_sub(imm))?;
        Ok(Signal::Continue)
    }

    fn op_lod(&mut self, rd: u8, addr: usize) -> Result<Signal, Fault> {
        let value = self.memory.get(addr)?;
        self.frame.registers.set(rd, value)?;
        Ok(Signal::Continue)
    }

    fn op_sto(&mut self, rs: u8, addr: usize) -> Result<Signal, Fault> {
        let value = self.frame.registers.get(rs)?;
        self.memory.set(addr, value)?;
        Ok(Signal::Continue)
    }

    fn op_ldr(&mut self, rd: u8, ra: u8) -> Result<Signal, Fault> {
        let addr = self.memory.address(self.frame.registers.get(ra)?)?;
        let value = self.memory.get(addr)?;
        self.frame.registers.set(rd, value)?;
        Ok(Signal::Continue)
    }

    fn op_str(&mut self, rs: u8, ra: u8) -> Result<Signal, Fault> {
        let addr = self.memory.address(self.frame.registers.get(ra)?)?;
        let value = self.frame.registers.get(rs)?;
        self.memory.set(addr, value)?;
        Ok(Signal::Continue)
    }

    fn op_cas(&mut self, rd: u8, addr: usize) -> Result<Signal, Fault> {
        // Check the destination first so a bad register cannot leave the cell set.
        self.frame.registers.get(rd)?;
        let old = self.memory.test_and_set(addr)?;
        self.frame.registers.set(rd, old)?;
        Ok(Signal::Continue)
    }

    /// Resolves `target` against the executing instruction and moves the pc.
    fn jump(&mut self, target: &Target) -> Result<(), Fault> {
        self.frame.pc = match target {
            Target::Absolute(index) => *index,
            Target::Relative(offset) => {
                let dest = (self.current as i64).wrapping_add(*offset);
                usize::try_from(dest).map_err(|_| Fault::InvalidJump {
                    pc: self.current,
                    offset: *offset,
                })?
            }
            Target::Label(name) => {
                self.program
                    .label(name)
                    .ok_or_else(|| Fault::UndefinedLabel {
                        label: name.clone(),
                    })?
            }
        };
        Ok(())
    }

    fn op_br(&mut self, target: &Target) -> Result<Signal, Fault> {
        self.jump(target)?;
        Ok(Signal::Continue)
    }

    fn op_btr(&mut self, rs: u8, target: &Target) -> Result<Signal, Fault> {
        if self.frame.registers.get(rs)? != 0 {
            self.jump(target)?;
        }
        Ok(Signal::Continue)
    }

    fn op_bfs(&mut self, rs: u8, target: &Target) -> Result<Signal, Fault> {
        if self.frame.registers.get(rs)? == 0 {
            self.jump(target)?;
        }
        Ok(Signal::Continue)
    }

    fn op_lab(&mut self, _name: &str) -> Result<Signal, Fault> {
        Ok(Signal::Continue)
    }

    fn op_yld(&mut self) -> Result<Signal, Fault> {
        Ok(Signal::Yield)
    }

    fn op_blk(&mut self) -> Result<Signal, Fault> {
        Ok(Signal::Block)
    }

    fn op_pst(&mut self, rs: u8) -> Result<Signal, Fault> {
        let target = self.frame.registers.get(rs)?;
        Ok(Signal::Post(ThreadId(target)))
    }

    fn op_prt(&mut self, rs: u8) -> Result<Signal, Fault> {
        let value = self.frame.registers.get(rs)?;
        Ok(Signal::Print(Output::Value(value)))
    }

    fn op_prs(&mut self, text: &str) -> Result<Signal, Fault> {
        Ok(Signal::Print(Output::Text(text.to_string())))
    }

    fn op_err(&mut self, label: &str) -> Result<Signal, Fault> {
        Err(Fault::Raised {
            label: label.to_string(),
        })
    }
}

#[cfg(test)]
mod tests;
