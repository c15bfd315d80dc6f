use bytes::{BufMut, BytesMut};

/// Application data carried behind the header. Without explicit fill data, the payload is
///  `size` zero bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Payload {
    size: usize,
    fill: Option<Vec<u8>>,
}

impl Payload {
    pub fn zeroed(size: usize) -> Payload {
        Payload { size, fill: None }
    }

    /// the string's bytes followed by a terminating NUL
    pub fn nul_terminated(s: &str) -> Payload {
        let mut fill = Vec::with_capacity(s.len() + 1);
        fill.extend_from_slice(s.as_bytes());
        fill.push(0);
        Payload::from_fill(fill)
    }

    pub fn from_byte(b: u8, size: usize) -> Payload {
        Payload::from_fill(vec![b; size])
    }

    /// `pattern` repeated until `size` bytes are filled, the last copy possibly cut short
    pub fn from_pattern(pattern: &[u8], size: usize) -> Payload {
        if pattern.is_empty() {
            return Payload::zeroed(size);
        }
        let fill = pattern.iter()
            .copied()
            .cycle()
            .take(size)
            .collect();
        Payload::from_fill(fill)
    }

    fn from_fill(fill: Vec<u8>) -> Payload {
        Payload {
            size: fill.len(),
            fill: Some(fill),
        }
    }

    /// Explicitly combines a declared size with fill data. The two must agree when the payload
    ///  is written, otherwise that is a programming error.
    pub fn with_fill(size: usize, fill: Vec<u8>) -> Payload {
        Payload { size, fill: Some(fill) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fill(&self) -> Option<&[u8]> {
        self.fill.as_deref()
    }

    /// Appends the payload to `buf`.
    ///
    /// Panics if fill data was configured with a length different from the declared size.
    pub fn write(&self, buf: &mut BytesMut) {
        match &self.fill {
            Some(fill) => {
                assert_eq!(fill.len(), self.size, "payload fill has {} bytes, but the packet size is {}", fill.len(), self.size);
                buf.put_slice(fill);
            }
            None => buf.put_bytes(0, self.size),
        }
    }
}
