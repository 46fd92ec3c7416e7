use crate::virtual_machine::errors::Fault;

/// Flat integer memory shared by every thread of a scheduler.
///
/// The size is fixed at construction; there is no growth. Addresses that
/// come from register values are checked with [`Memory::address`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Memory {
    cells: Vec<i64>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![0; size],
        }
    }

    /// Converts a register value into a checked address.
    pub fn address(&self, value: i64) -> Result<usize, Fault> {
        usize::try_from(value)
            .ok()
            .filter(|addr| *addr < self.cells.len())
            .ok_or(Fault::AddressOutOfBounds {
                address: value,
                size: self.cells.len(),
            })
    }

    fn out_of_bounds(&self, addr: usize) -> Fault {
        Fault::AddressOutOfBounds {
            address: i64::try_from(addr).unwrap_or(i64::MAX),
            size: self.cells.len(),
        }
    }

    pub fn get(&self, addr: usize) -> Result<i64, Fault> {
        self.cells
            .get(addr)
            .copied()
            .ok_or_else(|| self.out_of_bounds(addr))
    }

    pub fn set(&mut self, addr: usize, value: i64) -> Result<(), Fault> {
        match self.cells.get_mut(addr) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(self.out_of_bounds(addr)),
        }
    }

    /// Test-and-set: returns the old value and writes `1` if it was `0`.
    ///
    /// Runs as one step; no other thread observes the cell in between.
    pub fn test_and_set(&mut self, addr: usize) -> Result<i64, Fault> {
        let old = self.get(addr)?;
        if old == 0 {
            self.set(addr, 1)?;
        }
        Ok(old)
    }

    /// Grows with zeroed cells or truncates to `size`.
    pub fn resize(&mut self, size: usize) {
        self.cells.resize(size, 0);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.cells
    }
}
