use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::Rid;

/// A fixed-width value that can live in a hash block page slot.
///
/// Keys and values are packed side by side in the page's mapping array, so
/// each type declares its encoded width and reads/writes itself at a given
/// position. Encodings are little-endian like every other on-disk layout.
pub trait Storable: Copy {
    const SIZE: usize;

    fn write_to(&self, buf: &mut [u8]);
    fn read_from(buf: &[u8]) -> Self;
}

impl Storable for i32 {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn read_from(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl Storable for u32 {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn read_from(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl Storable for i64 {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn read_from(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl Storable for u64 {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn read_from(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl Storable for Rid {
    const SIZE: usize = Rid::SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..Self::SIZE].copy_from_slice(&self.to_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Rid::from_bytes(buf)
    }
}
