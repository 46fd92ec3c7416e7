//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and invokes a callback macro for code
//! generation, so the executor's enum and the assembler's parser are generated
//! from one list.
//!
//! This module generates:
//! - The closed [`Instruction`] enum, one struct variant per opcode
//! - [`Instruction::mnemonic`]
//! - `Display`, rendering an instruction back into its text form
//!
//! # Operand kinds
//!
//! - `Reg`: register index (`u8`)
//! - `Imm`: signed immediate (`i64`)
//! - `Addr`: memory address (`usize`)
//! - `Target`: jump target, see [`Target`]
//! - `Name`: bare identifier (label names, fault labels)
//! - `Text`: free text for `prs`

use std::fmt;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Register arithmetic
            // =========================
            /// IMM rd, v ; rd = v
            Imm, "imm" => [rd: Reg, imm: Imm],
            /// ADD rd, rs ; rd = rd + rs
            Add, "add" => [rd: Reg, rs: Reg],
            /// SUB rd, rs ; rd = rd - rs
            Sub, "sub" => [rd: Reg, rs: Reg],
            /// ADI rd, v ; rd = rd + v
            Adi, "adi" => [rd: Reg, imm: Imm],
            /// SBI rd, v ; rd = rd - v
            Sbi, "sbi" => [rd: Reg, imm: Imm],
            // =========================
            // Memory
            // =========================
            /// LOD rd, addr ; rd = mem[addr]
            Lod, "lod" => [rd: Reg, addr: Addr],
            /// STO rs, addr ; mem[addr] = rs
            Sto, "sto" => [rs: Reg, addr: Addr],
            /// LDR rd, ra ; rd = mem[ra]
            Ldr, "ldr" => [rd: Reg, ra: Reg],
            /// STR rs, ra ; mem[ra] = rs
            Str, "str" => [rs: Reg, ra: Reg],
            /// CAS rd, addr ; rd = mem[addr]; if it was 0, mem[addr] = 1 (one indivisible step)
            Cas, "cas" => [rd: Reg, addr: Addr],
            // =========================
            // Control flow
            // =========================
            /// BR target ; pc = target
            Br, "br" => [target: Target],
            /// BTR rs, target ; if rs != 0 then pc = target
            Btr, "btr" => [rs: Reg, target: Target],
            /// BFS rs, target ; if rs == 0 then pc = target
            Bfs, "bfs" => [rs: Reg, target: Target],
            /// LAB name ; label anchor, no-op when executed
            Lab, "lab" => [name: Name],
            // =========================
            // Scheduling
            // =========================
            /// YLD ; end this turn, stay ready
            Yld, "yld" => [],
            /// BLK ; ask to move from ready to blocked
            Blk, "blk" => [],
            /// PST rs ; wake the thread whose id is in rs
            Pst, "pst" => [rs: Reg],
            // =========================
            // Observation and faults
            // =========================
            /// PRT rs ; print the value of rs
            Prt, "prt" => [rs: Reg],
            /// PRS text ; print text
            Prs, "prs" => [text: Text],
            /// ERR label ; raise a primitive-level fault
            Err, "err" => [label: Name],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// A single VM instruction. Immutable once a program is built.
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name {
                    $( $field: $crate::define_instructions!(@ty $kind) ),*
                },
            )*
            /// Unrecognized opcode; faults when executed.
            Undefined { text: String },
        }

        impl Instruction {
            /// Returns the assembly mnemonic for this instruction.
            pub fn mnemonic(&self) -> &str {
                match self {
                    $( Instruction::$name { .. } => $mnemonic, )*
                    Instruction::Undefined { text } => {
                        text.split_whitespace().next().unwrap_or("")
                    }
                }
            }
        }

        impl ::std::fmt::Display for Instruction {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $(
                        Instruction::$name { $( $field ),* } => {
                            f.write_str($mnemonic)?;
                            #[allow(unused_mut, unused_assignments)]
                            let mut _sep = " ";
                            $(
                                f.write_str(_sep)?;
                                $crate::define_instructions!(@fmt f, $kind, $field)?;
                                _sep = ", ";
                            )*
                            Ok(())
                        }
                    )*
                    Instruction::Undefined { text } => f.write_str(text),
                }
            }
        }
    };

    // ---------- types ----------
    (@ty Reg)    => { u8 };
    (@ty Imm)    => { i64 };
    (@ty Addr)   => { usize };
    (@ty Target) => { $crate::virtual_machine::isa::Target };
    (@ty Name)   => { String };
    (@ty Text)   => { String };

    // ---------- rendering ----------
    (@fmt $f:ident, Text, $v:ident) => {
        if $v.is_empty() || $v.contains(char::is_whitespace) {
            write!($f, "\"{}\"", $v)
        } else {
            $f.write_str($v)
        }
    };

    (@fmt $f:ident, $kind:ident, $v:ident) => {
        write!($f, "{}", $v)
    };
}

for_each_instruction!(define_instructions);

/// Jump target of `br`, `btr` and `bfs`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Target {
    /// Absolute instruction index.
    Absolute(usize),
    /// Signed offset from the jumping instruction (`:+N`, `:-N`).
    Relative(i64),
    /// Symbolic label, resolved through the thread's label table.
    Label(String),
}

impl Target {
    /// Shorthand for [`Target::Relative`].
    pub const fn rel(offset: i64) -> Self {
        Target::Relative(offset)
    }

    /// Shorthand for [`Target::Absolute`].
    pub const fn abs(index: usize) -> Self {
        Target::Absolute(index)
    }

    /// Returns the label name if this target is symbolic.
    pub fn label(&self) -> Option<&str> {
        match self {
            Target::Label(name) => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for Target {
    fn from(label: &str) -> Self {
        Target::Label(label.to_string())
    }
}

impl From<String> for Target {
    fn from(label: String) -> Self {
        Target::Label(label)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Absolute(index) => write!(f, "{index}"),
            Target::Relative(offset) => write!(f, ":{offset:+}"),
            Target::Label(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics() {
        assert_eq!(Instruction::Yld {}.mnemonic(), "yld");
        assert_eq!(Instruction::Cas { rd: 0, addr: 4 }.mnemonic(), "cas");
        assert_eq!(
            Instruction::Undefined {
                text: "nop 1".to_string()
            }
            .mnemonic(),
            "nop"
        );
    }

    #[test]
    fn display_renders_text_form() {
        assert_eq!(Instruction::Imm { rd: 0, imm: -1 }.to_string(), "imm 0, -1");
        assert_eq!(Instruction::Blk {}.to_string(), "blk");
        assert_eq!(
            Instruction::Btr {
                rs: 4,
                target: Target::rel(-1)
            }
            .to_string(),
            "btr 4, :-1"
        );
        assert_eq!(
            Instruction::Bfs {
                rs: 2,
                target: Target::rel(3)
            }
            .to_string(),
            "bfs 2, :+3"
        );
        assert_eq!(
            Instruction::Br {
                target: Target::from("mtx_lock_end.0")
            }
            .to_string(),
            "br mtx_lock_end.0"
        );
    }

    #[test]
    fn display_quotes_text_with_spaces() {
        let prs = Instruction::Prs {
            text: "hello world".to_string(),
        };
        assert_eq!(prs.to_string(), "prs \"hello world\"");
        let prs = Instruction::Prs {
            text: "posted".to_string(),
        };
        assert_eq!(prs.to_string(), "prs posted");
    }

    #[test]
    fn target_label_accessor() {
        assert_eq!(Target::from("top").label(), Some("top"));
        assert_eq!(Target::abs(3).label(), None);
    }
}
