use crate::virtual_machine::errors::Fault;

/// Register file owned by one thread's frame.
///
/// Holds `count` integer registers, all starting at zero.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Registers {
    regs: Vec<i64>,
}

impl Registers {
    /// Creates a new register file with `count` registers.
    pub fn new(count: usize) -> Self {
        Self {
            regs: vec![0; count],
        }
    }

    /// Returns the value in register `idx`.
    ///
    /// Returns [`Fault::RegisterOutOfBounds`] if `idx` is out of bounds.
    pub fn get(&self, idx: u8) -> Result<i64, Fault> {
        self.regs
            .get(idx as usize)
            .copied()
            .ok_or(Fault::RegisterOutOfBounds {
                index: idx,
                available: self.regs.len(),
            })
    }

    /// Stores a value into register `idx`.
    ///
    /// Returns [`Fault::RegisterOutOfBounds`] if `idx` is out of bounds.
    pub fn set(&mut self, idx: u8, v: i64) -> Result<(), Fault> {
        let available = self.regs.len();
        let slot = self
            .regs
            .get_mut(idx as usize)
            .ok_or(Fault::RegisterOutOfBounds {
                index: idx,
                available,
            })?;
        *slot = v;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.regs
    }
}
