//! Bounded views into a shared frame buffer

use std::ops::Range;

use bytes::Bytes;

use crate::error::SanityError;

/// A (buffer, offset, end) view handed from one layer to the next.
///
/// `end` is the bound the enclosing layer declared (for example the IPv4
/// total length), which may be shorter than the frame when the link layer
/// padded it. Nothing past `end` is ever visible through the cursor.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a Bytes,
    offset: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    /// Cursor over the whole buffer
    pub fn new(buf: &'a Bytes) -> Self {
        Cursor {
            buf,
            offset: 0,
            end: buf.len(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.end - self.offset
    }

    /// Everything between the offset and the bound
    pub fn bytes(&self) -> &'a [u8] {
        &self.buf[self.offset..self.end]
    }

    /// The first `len` bytes, or `Truncated` if fewer remain
    pub fn header(&self, len: usize) -> Result<&'a [u8], SanityError> {
        if self.remaining() < len {
            return Err(SanityError::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        Ok(&self.buf[self.offset..self.offset + len])
    }

    /// Zero-copy slice relative to the offset, clamped to the bound
    pub fn slice(&self, range: Range<usize>) -> Bytes {
        let start = (self.offset + range.start).min(self.end);
        let end = (self.offset + range.end).min(self.end).max(start);
        self.buf.slice(start..end)
    }

    /// Cursor positioned `len` bytes further, never past the bound
    pub fn advance(&self, len: usize) -> Cursor<'a> {
        Cursor {
            offset: (self.offset + len).min(self.end),
            ..*self
        }
    }

    /// Cursor whose bound is `len` bytes after the offset
    pub fn limit(&self, len: usize) -> Result<Cursor<'a>, SanityError> {
        if len > self.remaining() {
            return Err(SanityError::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        Ok(Cursor {
            end: self.offset + len,
            ..*self
        })
    }

    /// Absolute byte range still visible
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bounds() {
        let buf = Bytes::from_static(&[1, 2, 3, 4, 5]);
        let cursor = Cursor::new(&buf).advance(2);
        assert_eq!(cursor.header(3).unwrap(), &[3, 4, 5]);
        assert_eq!(
            cursor.header(4),
            Err(SanityError::Truncated {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_limit_hides_padding() {
        let buf = Bytes::from_static(&[1, 2, 3, 4, 5, 0, 0]);
        let cursor = Cursor::new(&buf).advance(1).limit(4).unwrap();
        assert_eq!(cursor.bytes(), &[2, 3, 4, 5]);
        assert_eq!(cursor.advance(10).remaining(), 0);
        assert_eq!(&cursor.slice(1..10)[..], &[3, 4, 5]);
        assert!(cursor.limit(5).is_err());
    }
}
