//! The incremental read adapter: a [`Buffer`] backed by a [`StreamSource`]
//! tops up its window on demand instead of requiring the whole payload to
//! be resident up front.

use super::Buffer;
use crate::error::{Error, Result};
use std::fmt::Debug;

/// External collaborator producing bytes on demand (§6.1). Implementations
/// must not retain references to the destination slice past the call.
pub trait StreamSource: Debug {
    /// Reads at most `max_length` bytes into `destination`, returning the
    /// number of bytes read. `0` means end-of-stream.
    fn read_into(&mut self, destination: &mut [u8], max_length: usize) -> Result<usize>;
}

impl Buffer {
    /// Wraps a [`StreamSource`] in a fresh, empty buffer.
    pub fn from_stream(stream: impl StreamSource + 'static) -> Self {
        Buffer::with_stream(Box::new(stream))
    }

    /// Guarantees `self.remaining() >= min_fill`, growing the backing store
    /// and pulling from the attached stream source as needed. No-op if the
    /// buffer isn't stream-backed and already satisfies `min_fill`.
    pub fn fill_buffer(&mut self, min_fill: usize) -> Result<()> {
        if self.remaining() >= min_fill {
            return Ok(());
        }
        let Some(mut stream) = self.stream.take() else {
            return Err(Error::bounds(self.reader_index, min_fill, self.writer_index));
        };
        let missing = min_fill - self.remaining();
        let result = self.fill_from(stream.as_mut(), missing);
        self.stream = Some(stream);
        result
    }

    /// Compacts already-consumed bytes to the front of the backing store,
    /// releasing capacity once the live region drops below a quarter of
    /// what's currently allocated.
    pub fn shrink_buffer(&mut self) {
        if self.reader_index == 0 {
            return;
        }
        let consumed = self.reader_index;
        let prior_capacity = self.capacity();
        let vec = self.data.to_owned_mut();
        vec.drain(0..consumed);
        self.writer_index -= consumed;
        self.reader_index = 0;
        if vec.len() < prior_capacity / 4 {
            vec.shrink_to_fit();
        }
    }

    /// Moves the read cursor back by `n` bytes within the current window.
    pub fn unread(&mut self, n: usize) -> Result<()> {
        if n > self.reader_index {
            return Err(Error::RefError(format!(
                "unread({n}) would move the reader cursor below zero (currently at {})",
                self.reader_index
            )));
        }
        self.reader_index -= n;
        Ok(())
    }

    /// Moves the read cursor to an absolute position within the current
    /// window.
    pub fn rewind(&mut self, to: usize) -> Result<()> {
        if to > self.writer_index {
            return Err(Error::bounds(to, 0, self.writer_index));
        }
        self.reader_index = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct ChunkedSource {
        chunks: Vec<Vec<u8>>,
    }

    impl StreamSource for ChunkedSource {
        fn read_into(&mut self, destination: &mut [u8], max_length: usize) -> Result<usize> {
            let Some(chunk) = self.chunks.first() else { return Ok(0) };
            let n = chunk.len().min(max_length).min(destination.len());
            destination[..n].copy_from_slice(&chunk[..n]);
            if n == chunk.len() {
                self.chunks.remove(0);
            } else {
                self.chunks[0] = chunk[n..].to_vec();
            }
            Ok(n)
        }
    }

    #[test]
    fn fill_buffer_tops_up_across_multiple_chunks() {
        let source = ChunkedSource { chunks: vec![vec![1, 2], vec![3, 4, 5]] };
        let mut buf = Buffer::from_stream(source);
        buf.fill_buffer(5).unwrap();
        assert_eq!(buf.remaining(), 5);
        assert_eq!(buf.read_bytes(5).unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn unread_rejects_moving_below_zero() {
        let mut buf = Buffer::new();
        buf.write_fixed_u8(1);
        buf.read_fixed_u8().unwrap();
        assert!(buf.unread(2).is_err());
        assert!(buf.unread(1).is_ok());
    }

    #[test]
    fn shrink_buffer_compacts_consumed_prefix() {
        let mut buf = Buffer::new();
        for i in 0..200u8 {
            buf.write_fixed_u8(i);
        }
        buf.skip(190).unwrap();
        buf.shrink_buffer();
        assert_eq!(buf.reader_index(), 0);
        assert_eq!(buf.remaining(), 10);
        assert_eq!(buf.read_fixed_u8().unwrap(), 190);
    }
}
