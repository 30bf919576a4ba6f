use byteorder::{ByteOrder, LittleEndian};

/// A tuple is an opaque run of bytes here; the value system that interprets
/// them lives above the storage engine. On the wire a tuple is its length
/// followed by its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    data: Vec<u8>,
}

impl Tuple {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialized width: 4-byte length prefix plus the payload
    pub fn serialized_size(&self) -> usize {
        4 + self.data.len()
    }

    pub fn serialize_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.data.len() as u32);
        buf[4..4 + self.data.len()].copy_from_slice(&self.data);
    }

    /// Parse a length-prefixed tuple. Returns None when the buffer is too
    /// short for the prefix or the payload it promises.
    pub fn deserialize_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < 4 {
            return None;
        }
        let len = LittleEndian::read_u32(&buf[0..4]) as usize;
        if buf.len() < 4 + len {
            return None;
        }
        Some(Self {
            data: buf[4..4 + len].to_vec(),
        })
    }
}
