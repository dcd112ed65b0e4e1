//! # Identifier Pool
//!
//! Small unique integer identifiers, shared by threads and devices. A
//! handle that carries an identifier can be checked against the live
//! descriptor, so a stale handle is detected once the identifier is gone.
//!
//! Identifiers start at 1; 0 never names a live object.

use crate::{ExecError, ExecResult};
use alloc::vec::Vec;

const WORD_BITS: u32 = u64::BITS;

/// Bitmap identifier allocator
#[derive(Debug)]
pub struct IdPool {
    /// Bit `n` set = identifier `n + 1` in use
    words: Vec<u64>,
    capacity: u32,
    in_use: u32,
}

impl IdPool {
    /// Create a pool handing out identifiers `1..=capacity`
    pub fn new(capacity: u32) -> ExecResult<Self> {
        let word_count = capacity.div_ceil(WORD_BITS) as usize;
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| ExecError::OutOfResources)?;
        words.resize(word_count, 0);

        Ok(Self {
            words,
            capacity,
            in_use: 0,
        })
    }

    /// Allocate the lowest free identifier
    pub fn allocate(&mut self) -> ExecResult<u32> {
        for (index, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = word.trailing_ones();
            let id = index as u32 * WORD_BITS + bit + 1;
            if id > self.capacity {
                break;
            }
            *word |= 1 << bit;
            self.in_use += 1;
            return Ok(id);
        }

        log::warn!("[ids] identifier pool exhausted ({} in use)", self.in_use);
        Err(ExecError::OutOfResources)
    }

    /// Return an identifier to the pool
    pub fn release(&mut self, id: u32) -> ExecResult<()> {
        let (index, mask) = self.locate(id)?;
        if self.words[index] & mask == 0 {
            return Err(ExecError::NoSuchEntity);
        }
        self.words[index] &= !mask;
        self.in_use -= 1;
        Ok(())
    }

    /// Check whether an identifier is currently allocated
    pub fn is_allocated(&self, id: u32) -> bool {
        self.locate(id)
            .map(|(index, mask)| self.words[index] & mask != 0)
            .unwrap_or(false)
    }

    /// Number of identifiers in use
    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    /// Pool capacity
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn locate(&self, id: u32) -> ExecResult<(usize, u64)> {
        if id == 0 || id > self.capacity {
            return Err(ExecError::InvalidArgument);
        }
        let bit = id - 1;
        Ok(((bit / WORD_BITS) as usize, 1u64 << (bit % WORD_BITS)))
    }
}
