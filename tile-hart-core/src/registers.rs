//! Integer, floating-point and vector register files.

use core::fmt;
use std::fmt::Formatter;

/// The number of registers in each register file (indices start at `0`).
pub const LEN: u8 = 32;

/// A RISC-V hart's general purpose registers.
///
/// There are 32 `x` registers, named `x0` up to `x31`, plus the program counter. Values are held
/// as `u64`; an RV32 hart keeps them sign-extended from bit 31 (see [`crate::Xlen::canonical`]).
///
/// > Register x0 is hardwired with all bits equal to 0. General purpose registers x1–x31 hold
/// > values that various instructions interpret as a collection of Boolean values, or as two’s
/// > complement signed binary integers or unsigned binary integers.
///
/// It is not possible to get a mutable reference to an `x` register, since that would allow
/// unchecked writes to register `x0`.
#[derive(Debug, Clone)]
pub struct Registers {
    x_registers: [u64; LEN as usize],
    pc: u64,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Registers {
    /// Returns a fresh set of all-zero registers.
    pub fn new(initial_pc: u64) -> Self {
        Self {
            x_registers: [0; LEN as usize],
            pc: initial_pc,
        }
    }

    /// Returns the value of an `x` register.
    pub fn x(&self, specifier: Specifier) -> u64 {
        self.x_registers[usize::from(specifier)]
    }

    /// Sets the value of an `x` register.
    ///
    /// Writes to register `x0` are ignored.
    pub fn set_x(&mut self, specifier: Specifier, value: u64) {
        self.replace_x(specifier, value);
    }

    /// Replaces the value of an `x` register, returning its old value.
    ///
    /// Writes to register `x0` are ignored.
    pub fn replace_x(&mut self, specifier: Specifier, value: u64) -> u64 {
        if specifier.0 == 0 {
            0 // Ignore writes to register `x0`
        } else {
            std::mem::replace(&mut self.x_registers[specifier.0 as usize], value)
        }
    }

    /// Returns the value of the `pc` register.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Returns a mutable reference to the `pc` register value.
    pub fn pc_mut(&mut self) -> &mut u64 {
        &mut self.pc
    }
}

/// A register specifier. Can take values in the range `0..LEN`.
///
/// The same specifier type indexes the `x`, `f` and `v` register files.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `x0`, a.k.a. register `zero`, always returns `0` on read, and ignores any writes.
    pub const X0: Self = Specifier(0);
    /// Return address (`ra`).
    pub const RA: Self = Specifier(1);
    /// Stack pointer (`sp`).
    pub const SP: Self = Specifier(2);
    /// First argument / return value register (`a0`).
    pub const A0: Self = Specifier(10);
    /// Second argument / return value register (`a1`).
    pub const A1: Self = Specifier(11);

    /// Create a register specifier from its index, returning `None` if `index > 31`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < 32).then_some(Self(index))
    }

    /// Convert a 5-bit value into a register specifier.
    /// Panics if the value doesn't fit in 5 bits (`0..=31`).
    pub fn from_u5(value_u5: u8) -> Self {
        const_assert_eq!(LEN, 32);
        if value_u5 > 31 {
            panic!("out of range u5 used");
        }
        Self(value_u5)
    }

    /// Return an iterator over all register specifier, starting at x0 up to x31.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..32).map(Self)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        value.0 as u32
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Canonical quiet NaN of each floating-point format.
pub mod canonical_nan {
    pub const HALF: u16 = 0x7e00;
    pub const SINGLE: u32 = 0x7fc0_0000;
    pub const DOUBLE: u64 = 0x7ff8_0000_0000_0000;
}

/// The `f` register file.
///
/// Registers are 64 bits wide. Narrower values are NaN-boxed: all bits above the value are ones.
/// Reading a narrower value from a register that is not properly boxed yields the canonical NaN
/// of that format.
#[derive(Debug, Clone, Default)]
pub struct FpRegisters {
    f_registers: [u64; LEN as usize],
}

impl FpRegisters {
    pub fn raw(&self, specifier: Specifier) -> u64 {
        self.f_registers[usize::from(specifier)]
    }

    pub fn set_raw(&mut self, specifier: Specifier, value: u64) {
        self.f_registers[usize::from(specifier)] = value;
    }

    /// Replaces the raw register bits, returning the old ones.
    pub fn replace_raw(&mut self, specifier: Specifier, value: u64) -> u64 {
        std::mem::replace(&mut self.f_registers[usize::from(specifier)], value)
    }

    pub fn half(&self, specifier: Specifier) -> u16 {
        let raw = self.raw(specifier);
        if raw >> 16 == u64::MAX >> 16 {
            raw as u16
        } else {
            canonical_nan::HALF
        }
    }

    pub fn set_half(&mut self, specifier: Specifier, value: u16) {
        self.set_raw(specifier, value as u64 | !0xffff);
    }

    pub fn single(&self, specifier: Specifier) -> u32 {
        let raw = self.raw(specifier);
        if raw >> 32 == 0xffff_ffff {
            raw as u32
        } else {
            canonical_nan::SINGLE
        }
    }

    pub fn set_single(&mut self, specifier: Specifier, value: u32) {
        self.set_raw(specifier, value as u64 | 0xffff_ffff_0000_0000);
    }

    pub fn double(&self, specifier: Specifier) -> u64 {
        self.raw(specifier)
    }

    pub fn set_double(&mut self, specifier: Specifier, value: u64) {
        self.set_raw(specifier, value);
    }
}

/// The `v` register file: 32 registers of `VLEN` bits stored as one contiguous little-endian byte
/// array, so that a register group of `LMUL` registers is a contiguous slice.
#[derive(Debug, Clone)]
pub struct VectorRegisters {
    vlenb: usize,
    bytes: Vec<u8>,
}

impl VectorRegisters {
    /// Creates a zeroed register file of registers `vlen` bits wide.
    ///
    /// Panics if `vlen` is not a power of two of at least 64 bits.
    pub fn new(vlen: u32) -> Self {
        if !vlen.is_power_of_two() || vlen < 64 {
            panic!("unsupported VLEN {vlen}");
        }
        let vlenb = vlen as usize / 8;
        Self {
            vlenb,
            bytes: vec![0; vlenb * LEN as usize],
        }
    }

    /// Size of a single register in bytes.
    pub fn vlenb(&self) -> usize {
        self.vlenb
    }

    /// Reads element `index` of width `width` bytes from the group starting at `base`, zero
    /// extended.
    ///
    /// Panics if the element lies outside the register file.
    pub fn element(&self, base: Specifier, index: usize, width: usize) -> u64 {
        let offset = usize::from(base) * self.vlenb + index * width;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(&self.bytes[offset..offset + width]);
        u64::from_le_bytes(buf)
    }

    /// Writes the low `width` bytes of `value` to element `index` of the group starting at `base`.
    pub fn set_element(&mut self, base: Specifier, index: usize, width: usize, value: u64) {
        let offset = usize::from(base) * self.vlenb + index * width;
        self.bytes[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
    }

    /// Returns bit `index` of the mask held in register `register`.
    pub fn mask_bit(&self, register: Specifier, index: usize) -> bool {
        let byte = self.bytes[usize::from(register) * self.vlenb + index / 8];
        (byte >> (index % 8)) & 1 == 1
    }

    pub fn set_mask_bit(&mut self, register: Specifier, index: usize, value: bool) {
        let byte = &mut self.bytes[usize::from(register) * self.vlenb + index / 8];
        if value {
            *byte |= 1 << (index % 8);
        } else {
            *byte &= !(1 << (index % 8));
        }
    }

    /// Bytes of `count` whole registers starting at `base`.
    pub fn registers(&self, base: Specifier, count: usize) -> &[u8] {
        let offset = usize::from(base) * self.vlenb;
        &self.bytes[offset..offset + count * self.vlenb]
    }

    pub fn registers_mut(&mut self, base: Specifier, count: usize) -> &mut [u8] {
        let offset = usize::from(base) * self.vlenb;
        &mut self.bytes[offset..offset + count * self.vlenb]
    }

    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        const_assert!(LEN > 1);
        assert_eq!(Specifier::A0, Specifier::from_u5(10));
    }

    #[test]
    fn test_write_to_zero() {
        let mut registers = Registers::default();
        assert_eq!(0, registers.x(Specifier::X0));
        assert_eq!(0, registers.pc());
        registers.set_x(Specifier::X0, 0xDEADBEEF);
        assert_eq!(0, registers.x(Specifier::X0));
        assert_eq!(0, registers.pc());
    }

    #[test]
    fn test_write_to_pc() {
        let mut registers = Registers::default();
        *registers.pc_mut() = 0xDEADBEEF;
        assert_eq!(0xDEADBEEF, registers.pc());
        assert_eq!(0, registers.x(Specifier::X0));
    }

    #[test]
    fn test_replace_x() {
        let mut registers = Registers::default();
        assert_eq!(0, registers.replace_x(Specifier::X0, 0));
        for i in 1..LEN {
            assert_eq!(0, registers.replace_x(Specifier::from_u5(i), i as u64));
        }
        for i in 1..LEN {
            assert_eq!(
                i as u64,
                registers.replace_x(Specifier::from_u5(i), i as u64 + 1)
            );
        }
        assert_eq!(0, registers.x(Specifier::X0));
    }

    #[test]
    fn fp_values_are_nan_boxed() {
        let mut f = FpRegisters::default();
        let f1 = Specifier::from_u5(1);
        f.set_single(f1, 0x3f80_0000);
        assert_eq!(f.raw(f1), 0xffff_ffff_3f80_0000);
        assert_eq!(f.single(f1), 0x3f80_0000);
        // A boxed single is not a valid boxed half.
        assert_eq!(f.half(f1), canonical_nan::HALF);

        f.set_double(f1, 0x3ff0_0000_0000_0000);
        assert_eq!(f.single(f1), canonical_nan::SINGLE);

        f.set_half(f1, 0x3c00);
        assert_eq!(f.half(f1), 0x3c00);
        assert_eq!(f.single(f1), 0xffff_3c00);
    }

    #[test]
    fn vector_elements_span_register_groups() {
        let mut v = VectorRegisters::new(128);
        let v2 = Specifier::from_u5(2);
        // Element 4 of 32-bit width lives in v3.
        v.set_element(v2, 4, 4, 0x1234_5678);
        assert_eq!(v.element(Specifier::from_u5(3), 0, 4), 0x1234_5678);
        assert_eq!(v.element(v2, 4, 4), 0x1234_5678);
        assert_eq!(v.element(v2, 8, 2), 0x5678);

        v.set_mask_bit(Specifier::from_u5(0), 9, true);
        assert!(v.mask_bit(Specifier::from_u5(0), 9));
        assert_eq!(v.registers(Specifier::from_u5(0), 1)[1], 0b10);
    }
}
