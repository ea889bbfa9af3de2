//! Flat, byte-addressable physical memory behind a small bus interface.

use std::fmt::Debug;
use thiserror::Error;

macro_rules! access_fns {
    ( $( $read_fn:ident, $write_fn:ident => $u:ident ),* $(,)? ) => {
        $(
            /// Reads a little-endian value at `address`. The address need not be aligned.
            fn $read_fn(&self, address: u64) -> Result<$u, MemoryError> {
                let mut buf = [0u8; std::mem::size_of::<$u>()];
                self.read(address, &mut buf)?;
                Ok($u::from_le_bytes(buf))
            }

            /// Writes `value` in little-endian byte order at `address`. The address need not be
            /// aligned.
            fn $write_fn(&mut self, address: u64, value: $u) -> Result<(), MemoryError> {
                self.write(address, &value.to_le_bytes())
            }
        )*
    };
}

/// Physical memory as seen by a hart.
///
/// All values are serialized in little-endian byte order. Accesses can be made for any
/// `(address, size)` pair; implementations decide which ones they accept and must report the
/// others as a [`MemoryError`] rather than panic.
///
/// The hart performs no locking of its own. When several harts share one backing store, the
/// host is responsible for serializing their accesses.
pub trait Bus: Debug {
    /// Number of addressable bytes, starting at address `0`.
    fn size(&self) -> u64;

    /// Reads `buf.len()` bytes starting at `address` into `buf`.
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Writes `buf` to memory starting at `address`.
    fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), MemoryError>;

    /// Returns `true` if all `size` bytes at `address` exist.
    fn contains(&self, address: u64, size: u64) -> bool {
        address
            .checked_add(size)
            .is_some_and(|end| end <= self.size())
    }

    fn read_u8(&self, address: u64) -> Result<u8, MemoryError> {
        let mut buf = [0u8];
        self.read(address, &mut buf)?;
        Ok(buf[0])
    }

    fn write_u8(&mut self, address: u64, value: u8) -> Result<(), MemoryError> {
        self.write(address, &[value])
    }

    access_fns! {
        read_u16, write_u16 => u16,
        read_u32, write_u32 => u32,
        read_u64, write_u64 => u64,
    }
}

impl<T: Bus + ?Sized> Bus for &mut T {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), MemoryError> {
        (**self).write(address, buf)
    }
}

impl<T: Bus + ?Sized> Bus for Box<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), MemoryError> {
        (**self).write(address, buf)
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum MemoryError {
    #[error("access of {size} bytes at {address:#x} is out of bounds")]
    OutOfBounds { address: u64, size: u64 },
}

/// A flat byte array of configurable size, starting at physical address `0`.
#[derive(Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl Memory {
    /// Creates a zero-filled memory of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn range(&self, address: u64, size: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let error = MemoryError::OutOfBounds {
            address,
            size: size as u64,
        };
        let start = usize::try_from(address).map_err(|_| error.clone())?;
        let end = start.checked_add(size).ok_or_else(|| error.clone())?;
        if end > self.bytes.len() {
            return Err(error);
        }
        Ok(start..end)
    }
}

impl Bus for Memory {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(address, buf.len())?;
        self.bytes[range].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_round_trip() {
        let mut memory = Memory::new(16);
        memory.write_u32(4, 0x1122_3344).unwrap();
        assert_eq!(memory.as_slice()[4..8], [0x44, 0x33, 0x22, 0x11]);
        assert_eq!(memory.read_u16(5).unwrap(), 0x2233);
        memory.write_u64(8, u64::MAX).unwrap();
        assert_eq!(memory.read_u8(15).unwrap(), 0xff);
    }

    #[test]
    fn out_of_bounds_is_reported() {
        let mut memory = Memory::new(16);
        assert_eq!(
            memory.read_u32(14),
            Err(MemoryError::OutOfBounds {
                address: 14,
                size: 4
            })
        );
        assert!(memory.write_u8(16, 0).is_err());
        assert!(memory.read_u64(u64::MAX - 2).is_err());
        assert!(memory.contains(8, 8));
        assert!(!memory.contains(9, 8));
        assert!(!memory.contains(u64::MAX, 2));
    }

    #[test]
    fn borrowed_bus_forwards() {
        let mut memory = Memory::new(8);
        {
            let mut bus: &mut Memory = &mut memory;
            Bus::write_u16(&mut bus, 0, 0xbeef).unwrap();
        }
        assert_eq!(memory.read_u16(0).unwrap(), 0xbeef);
    }
}
