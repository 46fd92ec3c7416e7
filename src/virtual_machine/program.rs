//! Per-thread program representation.
//!
//! A [`Program`] is an ordered instruction list plus its label table. Labels
//! are collected from `lab` instructions once, when the program is built, and
//! every symbolic jump target is checked against the table before anything
//! runs.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, Target};
use std::collections::HashMap;
use std::fmt;

/// Identity of a logical thread. `pst` names its target by this value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ThreadId(pub i64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ThreadId {
    fn from(id: i64) -> Self {
        ThreadId(id)
    }
}

/// Instruction list with a precomputed label table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
}

impl Program {
    /// Builds a program, collecting labels and checking jump targets.
    ///
    /// Returns [`VMError::DuplicateLabel`] if a name is anchored twice and
    /// [`VMError::UndefinedLabel`] if a jump names a label that does not exist.
    pub fn new(instructions: Vec<Instruction>) -> Result<Self, VMError> {
        let mut labels = HashMap::new();
        for (index, instr) in instructions.iter().enumerate() {
            if let Instruction::Lab { name } = instr {
                if labels.insert(name.clone(), index).is_some() {
                    return Err(VMError::DuplicateLabel {
                        label: name.clone(),
                    });
                }
            }
        }

        for instr in &instructions {
            let target = match instr {
                Instruction::Br { target }
                | Instruction::Btr { target, .. }
                | Instruction::Bfs { target, .. } => target,
                _ => continue,
            };
            if let Target::Label(name) = target {
                if !labels.contains_key(name) {
                    return Err(VMError::UndefinedLabel {
                        label: name.clone(),
                    });
                }
            }
        }

        Ok(Self {
            instructions,
            labels,
        })
    }

    /// Returns the instruction at `pc`, or `None` past the end.
    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    /// Resolves a label to the index of its `lab` instruction.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Number of instructions, labels included.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "{index:>4}  {instr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab(name: &str) -> Instruction {
        Instruction::Lab {
            name: name.to_string(),
        }
    }

    #[test]
    fn label_table_points_at_lab_instruction() {
        let program = Program::new(vec![
            Instruction::Imm { rd: 0, imm: 1 },
            lab("top"),
            Instruction::Br {
                target: Target::from("top"),
            },
        ])
        .unwrap();
        assert_eq!(program.label("top"), Some(1));
        assert_eq!(program.label("missing"), None);
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn duplicate_label_rejected() {
        let err = Program::new(vec![lab("a"), lab("a")]).unwrap_err();
        assert_eq!(
            err,
            VMError::DuplicateLabel {
                label: "a".to_string()
            }
        );
    }

    #[test]
    fn undefined_label_rejected() {
        let err = Program::new(vec![Instruction::Bfs {
            rs: 0,
            target: Target::from("nowhere"),
        }])
        .unwrap_err();
        assert_eq!(
            err,
            VMError::UndefinedLabel {
                label: "nowhere".to_string()
            }
        );
    }

    #[test]
    fn numeric_targets_need_no_label() {
        let program = Program::new(vec![
            Instruction::Br {
                target: Target::abs(40),
            },
            Instruction::Br {
                target: Target::rel(-1),
            },
        ]);
        assert!(program.is_ok());
    }

    #[test]
    fn display_lists_instructions() {
        let program = Program::new(vec![Instruction::Yld {}, Instruction::Pst { rs: 1 }]).unwrap();
        assert_eq!(program.to_string(), "   0  yld\n   1  pst 1\n");
    }
}
