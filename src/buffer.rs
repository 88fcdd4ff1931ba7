//! Growable octet buffer used by every transform stage (spec.md §4.1).
//!
//! The C original hands out a raw pointer from `data()` that stays valid
//! until the next mutation. A `&[u8]` borrowed from `Buffer::data` gives the
//! same guarantee for free via the borrow checker, so there is no separate
//! "invalidate on realloc" bookkeeping to get wrong here.

/// A growable byte buffer owned by a transform or by the caller's result
/// slot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
        }
    }

    /// Appends bytes to the end of the buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Replaces the buffer's contents wholesale.
    pub fn set_data(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
    }

    /// Removes `n` bytes from the head, shifting the remainder to the
    /// front. `n` is clamped to the current size.
    pub fn remove_head(&mut self, n: usize) {
        let n = n.min(self.data.len());
        self.data.drain(0..n);
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Takes the buffer's contents, leaving it empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_size() {
        let mut buf = Buffer::new();
        buf.append(b"hello");
        buf.append(b", world");
        assert_eq!(buf.size(), 12);
        assert_eq!(buf.data(), b"hello, world");
    }

    #[test]
    fn set_data_replaces_contents() {
        let mut buf = Buffer::new();
        buf.append(b"stale");
        buf.set_data(b"fresh");
        assert_eq!(buf.data(), b"fresh");
    }

    #[test]
    fn remove_head_shifts_remainder() {
        let mut buf = Buffer::new();
        buf.append(b"0123456789");
        buf.remove_head(4);
        assert_eq!(buf.data(), b"456789");
        assert_eq!(buf.size(), 6);
    }

    #[test]
    fn remove_head_clamps_past_end() {
        let mut buf = Buffer::new();
        buf.append(b"abc");
        buf.remove_head(100);
        assert!(buf.is_empty());
    }

    #[test]
    fn take_empties_the_buffer() {
        let mut buf = Buffer::new();
        buf.append(b"payload");
        let taken = buf.take();
        assert_eq!(taken, b"payload");
        assert!(buf.is_empty());
    }
}
