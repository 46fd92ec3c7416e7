use crate::virtual_machine::assembler::parse_fragment;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, Target};
use crate::virtual_machine::program::{Program, ThreadId};

/// Accumulates one thread's instruction stream.
///
/// Primitive generators append their fragments here and take branch labels
/// from [`CodeBuilder::fresh_label`], so the same operation can be inlined
/// any number of times in one thread. Label names depend only on emission
/// order, which keeps programs and traces identical across runs.
#[derive(Clone, Debug, Default)]
pub struct CodeBuilder {
    code: Vec<Instruction>,
    next_label: usize,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a label name not handed out before by this builder.
    pub fn fresh_label(&mut self, stem: &str) -> String {
        let label = format!("{stem}.{}", self.next_label);
        self.next_label += 1;
        label
    }

    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        self.code.push(instr);
        self
    }

    /// Appends instructions written in assembly text.
    pub fn asm(&mut self, source: &str) -> Result<&mut Self, VMError> {
        self.code.extend(parse_fragment(source)?);
        Ok(self)
    }

    pub fn imm(&mut self, rd: u8, imm: i64) -> &mut Self {
        self.emit(Instruction::Imm { rd, imm })
    }

    pub fn add(&mut self, rd: u8, rs: u8) -> &mut Self {
        self.emit(Instruction::Add { rd, rs })
    }

    pub fn sub(&mut self, rd: u8, rs: u8) -> &mut Self {
        self.emit(Instruction::Sub { rd, rs })
    }

    pub fn adi(&mut self, rd: u8, imm: i64) -> &mut Self {
        self.emit(Instruction::Adi { rd, imm })
    }

    pub fn sbi(&mut self, rd: u8, imm: i64) -> &mut Self {
        self.emit(Instruction::Sbi { rd, imm })
    }

    pub fn lod(&mut self, rd: u8, addr: usize) -> &mut Self {
        self.emit(Instruction::Lod { rd, addr })
    }

    pub fn sto(&mut self, rs: u8, addr: usize) -> &mut Self {
        self.emit(Instruction::Sto { rs, addr })
    }

    pub fn ldr(&mut self, rd: u8, ra: u8) -> &mut Self {
        self.emit(Instruction::Ldr { rd, ra })
    }

    pub fn str(&mut self, rs: u8, ra: u8) -> &mut Self {
        self.emit(Instruction::Str { rs, ra })
    }

    pub fn cas(&mut self, rd: u8, addr: usize) -> &mut Self {
        self.emit(Instruction::Cas { rd, addr })
    }

    pub fn br(&mut self, target: impl Into<Target>) -> &mut Self {
        self.emit(Instruction::Br {
            target: target.into(),
        })
    }

    pub fn btr(&mut self, rs: u8, target: impl Into<Target>) -> &mut Self {
        self.emit(Instruction::Btr {
            rs,
            target: target.into(),
        })
    }

    pub fn bfs(&mut self, rs: u8, target: impl Into<Target>) -> &mut Self {
        self.emit(Instruction::Bfs {
            rs,
            target: target.into(),
        })
    }

    pub fn lab(&mut self, name: impl Into<String>) -> &mut Self {
        self.emit(Instruction::Lab { name: name.into() })
    }

    pub fn yld(&mut self) -> &mut Self {
        self.emit(Instruction::Yld {})
    }

    pub fn blk(&mut self) -> &mut Self {
        self.emit(Instruction::Blk {})
    }

    pub fn pst(&mut self, rs: u8) -> &mut Self {
        self.emit(Instruction::Pst { rs })
    }

    pub fn prt(&mut self, rs: u8) -> &mut Self {
        self.emit(Instruction::Prt { rs })
    }

    pub fn prs(&mut self, text: impl Into<String>) -> &mut Self {
        self.emit(Instruction::Prs { text: text.into() })
    }

    pub fn err(&mut self, label: impl Into<String>) -> &mut Self {
        self.emit(Instruction::Err {
            label: label.into(),
        })
    }

    /// Loads a thread id as an immediate.
    pub fn imm_thread(&mut self, rd: u8, id: ThreadId) -> &mut Self {
        self.imm(rd, id.0)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    /// Builds the program, checking label uniqueness and jump targets.
    pub fn finish(self) -> Result<Program, VMError> {
        Program::new(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_labels_are_unique_and_deterministic() {
        let mut a = CodeBuilder::new();
        let mut b = CodeBuilder::new();
        let first: Vec<String> = (0..3).map(|_| a.fresh_label("mtx_lock_end")).collect();
        let second: Vec<String> = (0..3).map(|_| b.fresh_label("mtx_lock_end")).collect();
        assert_eq!(first, vec!["mtx_lock_end.0", "mtx_lock_end.1", "mtx_lock_end.2"]);
        assert_eq!(first, second);
        assert_ne!(a.fresh_label("x"), a.fresh_label("x"));
    }

    #[test]
    fn chained_emission_renders_in_order() {
        let mut code = CodeBuilder::new();
        code.imm(0, 123).sto(0, 0).cas(4, 4).btr(4, Target::rel(-1)).yld();
        let text: Vec<String> = code.instructions().iter().map(|i| i.to_string()).collect();
        assert_eq!(
            text,
            vec!["imm 0, 123", "sto 0, 0", "cas 4, 4", "btr 4, :-1", "yld"]
        );
    }

    #[test]
    fn asm_fragments_may_jump_to_later_labels() {
        let mut code = CodeBuilder::new();
        code.asm("lod 0, 49\nbtr 0, success").unwrap();
        code.prs("waiting").lab("success");
        let program = code.finish().unwrap();
        assert_eq!(program.label("success"), Some(3));
    }

    #[test]
    fn finish_rejects_dangling_label() {
        let mut code = CodeBuilder::new();
        code.br("nowhere");
        assert!(matches!(
            code.finish(),
            Err(VMError::UndefinedLabel { .. })
        ));
    }
}
