//! Fixed-capacity receive buffer reused across reads.

/// Default receive buffer capacity in bytes.
pub const DEFAULT_RX_BUFFER_SIZE: usize = 4096;

/// A fixed-capacity byte buffer plus a valid-length marker.
///
/// Owned by exactly one receive loop. Each iteration calls [`clear`](Self::clear),
/// refills it with [`fill_with`](Self::fill_with), and lends
/// [`as_slice`](Self::as_slice) to listeners for the duration of one dispatch.
/// Bytes past the valid length are never exposed, so a short read never leaks
/// the tail of a longer earlier one.
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl ReceiveBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes from the last fill.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reset the valid length to zero. The storage is not zeroed.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Hand the whole storage to `fill` and record how many bytes it wrote.
    ///
    /// A count larger than the capacity is clamped. On error the buffer stays
    /// empty.
    pub fn fill_with<E>(
        &mut self,
        fill: impl FnOnce(&mut [u8]) -> Result<usize, E>,
    ) -> Result<usize, E> {
        self.len = 0;
        let n = fill(&mut self.data[..])?;
        self.len = n.min(self.data.len());
        Ok(self.len)
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RX_BUFFER_SIZE)
    }
}
