//! Growable per-connection byte buffer.
//!
//! Storage is kept fully initialised up to its capacity so sockets and
//! files can read straight into the free tail. Two cursors split it:
//!
//! ```text
//! 0 ........ read ........ write ........ capacity
//! | consumed |   pending   |     spare     |
//! ```

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer capacity of {max} bytes exceeded")]
    CapacityExceeded { max: usize },
}

#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    read: usize,
    write: usize,
    max_capacity: usize,
}

impl Buffer {
    /// Creates a buffer with `initial` bytes of storage that may grow up to
    /// `max_capacity` bytes.
    pub fn new(initial: usize, max_capacity: usize) -> Self {
        let initial = initial.clamp(1, max_capacity.max(1));
        Self {
            data: vec![0; initial],
            read: 0,
            write: 0,
            max_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Bytes produced but not yet drained.
    pub fn pending(&self) -> &[u8] {
        &self.data[self.read..self.write]
    }

    /// Everything produced since the last reset, drained or not.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.write]
    }

    pub fn is_drained(&self) -> bool {
        self.read == self.write
    }

    /// Copies `bytes` behind the produced region, growing if needed.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.ensure_spare(bytes.len())?;
        self.data[self.write..self.write + bytes.len()].copy_from_slice(bytes);
        self.write += bytes.len();
        Ok(())
    }

    /// Returns the free tail of the buffer, growing first when there is
    /// none left. Follow up with [`Buffer::produce`].
    pub fn spare_mut(&mut self) -> Result<&mut [u8], BufferError> {
        self.ensure_spare(1)?;
        Ok(&mut self.data[self.write..])
    }

    /// Marks `n` bytes of the spare region as produced.
    pub fn produce(&mut self, n: usize) {
        assert!(self.write + n <= self.data.len(), "produce past capacity");
        self.write += n;
    }

    /// Advances the read cursor after `n` bytes were written out.
    pub fn drain(&mut self, n: usize) {
        assert!(self.read + n <= self.write, "drain past produced bytes");
        self.read += n;
    }

    /// Rewinds both cursors. Storage is kept.
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    fn ensure_spare(&mut self, needed: usize) -> Result<(), BufferError> {
        let required = self.write + needed;
        if required <= self.data.len() {
            return Ok(());
        }
        if required > self.max_capacity {
            return Err(BufferError::CapacityExceeded {
                max: self.max_capacity,
            });
        }

        let mut capacity = self.data.len().max(1);
        while capacity < required {
            capacity *= 2;
        }
        self.data.resize(capacity.min(self.max_capacity), 0);
        Ok(())
    }
}
