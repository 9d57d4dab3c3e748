use bytes::{Bytes, BytesMut};

use crate::error::{Result, TranscodeError};

/// Byte queue holding decoded audio until a whole encoder frame is available.
///
/// Bytes leave strictly in the order they were written, and a read of `n`
/// bytes only succeeds while at least `n` are buffered.
#[derive(Debug, Default)]
pub struct AudioFifo {
    buf: BytesMut,
}

impl AudioFifo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` to the tail.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Remove and return the first `n` bytes, or `None` if fewer are buffered.
    pub fn read(&mut self, n: usize) -> Option<Bytes> {
        if self.buf.len() < n {
            return None;
        }
        Some(self.buf.split_to(n).freeze())
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Make room for `additional` more bytes ahead of a write.
    ///
    /// Sizes past `isize::MAX` are refused instead of reaching the allocator.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        match self.buf.len().checked_add(additional) {
            Some(total) if total <= isize::MAX as usize => {
                self.buf.reserve(additional);
                Ok(())
            }
            _ => Err(TranscodeError::allocation(format!(
                "audio fifo: cannot hold {} more bytes",
                additional
            ))),
        }
    }

    /// Drop everything buffered, returning how many bytes were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_grows_by_exact_count() {
        let mut fifo = AudioFifo::new();
        for n in [0usize, 1, 7, 4096] {
            let before = fifo.size();
            fifo.write(&vec![0xAB; n]);
            assert_eq!(fifo.size(), before + n);
        }
    }

    #[test]
    fn test_read_in_write_order() {
        let mut fifo = AudioFifo::new();
        fifo.write(&[1, 2, 3]);
        fifo.write(&[4, 5]);
        assert_eq!(fifo.read(2).as_deref(), Some(&[1u8, 2][..]));
        assert_eq!(fifo.size(), 3);
        assert_eq!(fifo.read(3).as_deref(), Some(&[3u8, 4, 5][..]));
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_short_read_is_refused() {
        let mut fifo = AudioFifo::new();
        fifo.write(&[9; 10]);
        assert_eq!(fifo.read(11), None);
        assert_eq!(fifo.size(), 10);
    }

    #[test]
    fn test_frame_sized_reads_leave_remainder() {
        let frame = 4096;
        for total in [0usize, 100, 4096, 4097, 3 * 4096 + 17] {
            let mut fifo = AudioFifo::new();
            fifo.write(&vec![1; total]);
            let mut frames = 0;
            while let Some(chunk) = fifo.read(frame) {
                assert_eq!(chunk.len(), frame);
                frames += 1;
            }
            assert_eq!(frames, total / frame);
            assert_eq!(fifo.size(), total % frame);
        }
    }

    #[test]
    fn test_reserve_keeps_contents() {
        let mut fifo = AudioFifo::new();
        fifo.write(&[1, 2, 3]);
        fifo.reserve(1 << 16).unwrap();
        fifo.write(&[4]);
        assert_eq!(fifo.read(4).as_deref(), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(fifo.clear(), 0);
    }

    #[test]
    fn test_reserve_reports_allocation_failure() {
        let mut fifo = AudioFifo::new();
        let err = fifo.reserve(usize::MAX).unwrap_err();
        assert!(matches!(err, TranscodeError::Allocation(_)));
    }
}
