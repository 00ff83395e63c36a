//! A fixed-capacity `core::fmt::Write` sink.
//!
//! The core is built without an allocator, so every formatted line (decoder
//! fallback text, console-echo lines) is assembled into a caller-owned
//! byte buffer rather than a `String`.

use core::fmt;
use core::str;

pub struct LineBuf<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> LineBuf<'a> {
    pub fn new(buf: &'a mut [u8]) -> LineBuf<'a> {
        LineBuf { buf, len: 0 }
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII is ever written through `write_str`/`write_fmt` in this
        // crate, so the slice is always valid UTF-8.
        str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    /// Consume the buffer, handing back the written prefix with the
    /// backing slice's own lifetime rather than one borrowed from `self`.
    /// Lets a decoder callback write into a caller-owned `&'a mut [u8; N]`
    /// and still return a `&'a str` slice of it.
    pub fn into_str(self) -> &'a str {
        let LineBuf { buf, len } = self;
        str::from_utf8(&buf[..len]).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<'a> fmt::Write for LineBuf<'a> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = self.buf.len() - self.len;
        let take = remaining.min(s.len());
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        // Silently truncate on overflow rather than erroring: a clipped
        // diagnostic line is better than a dropped one.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn writes_formatted_text_into_the_backing_buffer() {
        let mut storage = [0u8; 32];
        let mut line = LineBuf::new(&mut storage);
        write!(line, "{}:{}", 7, "Warning").unwrap();
        assert_eq!(line.as_str(), "7:Warning");
    }

    #[test]
    fn truncates_instead_of_overflowing() {
        let mut storage = [0u8; 4];
        let mut line = LineBuf::new(&mut storage);
        write!(line, "abcdefgh").unwrap();
        assert_eq!(line.as_str(), "abcd");
    }
}
