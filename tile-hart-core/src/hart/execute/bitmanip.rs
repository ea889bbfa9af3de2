//! Bit-manipulation instructions: the ratified Zba/Zbb/Zbc/Zbs groups and the draft
//! Zbe/Zbf/Zbp/Zbr/Zbt groups.
//!
//! None of them touch memory or raise exceptions once decoded, so every operation is a pure
//! function of its sources and the register width.

use super::ExecutionResult;
use crate::catalog::InstructionId;
use crate::decode::DecodedInstruction;
use crate::hart::Hart;
use crate::memory::Bus;
use crate::registers::Specifier;

impl<B: Bus> Hart<B> {
    pub(super) fn execute_bitmanip(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        use InstructionId as I;

        let bits = self.xlen.bits();
        let mask = self.xlen.mask();
        let x = |register: u32| self.registers.x(Specifier::from_u5(register as u8));
        let rs1 = x(di.op1()) & mask;
        // Register-register forms read rs2; immediate forms carry the immediate in op2 instead.
        let rs2 = || x(di.op2()) & mask;
        let imm = di.op2() as u64;
        let rs3 = || x(di.op3()) & mask;

        let value = match di.id() {
            I::Clz => clz(rs1, bits),
            I::Ctz => ctz(rs1, bits),
            I::Cpop => rs1.count_ones() as u64,
            I::Clzw => clz(rs1 & 0xffff_ffff, 32),
            I::Ctzw => ctz(rs1, 32),
            I::Cpopw => (rs1 as u32).count_ones() as u64,
            I::SextB => rs1 as u8 as i8 as i64 as u64,
            I::SextH => rs1 as u16 as i16 as i64 as u64,
            I::Rev8 => grev(rs1, (bits - 8) as u64, bits),
            I::OrcB => gorc(rs1, 7, bits),
            I::Crc32B => crc32(rs1, 8, CRC32_POLY, bits),
            I::Crc32H => crc32(rs1, 16, CRC32_POLY, bits),
            I::Crc32W => crc32(rs1, 32, CRC32_POLY, bits),
            I::Crc32D => crc32(rs1, 64, CRC32_POLY, bits),
            I::Crc32cB => crc32(rs1, 8, CRC32C_POLY, bits),
            I::Crc32cH => crc32(rs1, 16, CRC32C_POLY, bits),
            I::Crc32cW => crc32(rs1, 32, CRC32C_POLY, bits),
            I::Crc32cD => crc32(rs1, 64, CRC32C_POLY, bits),
            I::Bmatflip => bmatflip(rs1),

            // Signed comparisons need the canonical, sign-extended values.
            I::Min => (x(di.op1()) as i64).min(x(di.op2()) as i64) as u64,
            I::Max => (x(di.op1()) as i64).max(x(di.op2()) as i64) as u64,
            I::Minu => rs1.min(rs2()),
            I::Maxu => rs1.max(rs2()),
            I::Andn => rs1 & !rs2(),
            I::Orn => rs1 | !rs2(),
            I::Xnor => !(rs1 ^ rs2()),
            I::Rol => rotate_left(rs1, rs2(), bits),
            I::Ror => rotate_right(rs1, rs2(), bits),
            I::Rolw => rotate_left(rs1, rs2(), 32),
            I::Rorw => rotate_right(rs1, rs2(), 32),
            I::Pack => pack(rs1, rs2(), bits),
            I::Packu => pack(rs1 >> (bits / 2), rs2() >> (bits / 2), bits),
            I::Packh => rs1 & 0xff | (rs2() & 0xff) << 8,
            I::Packw => pack(rs1, rs2(), 32),
            I::Packuw => pack(rs1 >> 16, rs2() >> 16, 32),
            I::Grev => grev(rs1, rs2(), bits),
            I::Grevw => grev(rs1, rs2(), 32),
            I::Gorc => gorc(rs1, rs2(), bits),
            I::Gorcw => gorc(rs1, rs2(), 32),
            I::Shfl => shfl(rs1, rs2(), bits),
            I::Unshfl => unshfl(rs1, rs2(), bits),
            I::Shflw => shfl(rs1, rs2(), 32),
            I::Unshflw => unshfl(rs1, rs2(), 32),
            I::XpermN => xperm(rs1, rs2(), 2, bits),
            I::XpermB => xperm(rs1, rs2(), 3, bits),
            I::XpermH => xperm(rs1, rs2(), 4, bits),
            I::XpermW => xperm(rs1, rs2(), 5, bits),
            I::Bset => rs1 | 1 << (rs2() & (bits as u64 - 1)),
            I::Bclr => rs1 & !(1 << (rs2() & (bits as u64 - 1))),
            I::Binv => rs1 ^ 1 << (rs2() & (bits as u64 - 1)),
            I::Bext => rs1 >> (rs2() & (bits as u64 - 1)) & 1,
            I::Bcompress => bcompress(rs1, rs2(), bits),
            I::Bdecompress => bdecompress(rs1, rs2(), bits),
            I::Bcompressw => bcompress(rs1, rs2(), 32),
            I::Bdecompressw => bdecompress(rs1, rs2(), 32),
            I::Bfp => bfp(rs1, rs2(), bits),
            I::Bfpw => bfp(rs1, rs2(), 32),
            I::Clmul => clmul(rs1, rs2(), bits),
            I::Clmulh => clmulh(rs1, rs2(), bits),
            I::Clmulr => clmulr(rs1, rs2(), bits),
            I::Sh1add => (rs1 << 1).wrapping_add(rs2()),
            I::Sh2add => (rs1 << 2).wrapping_add(rs2()),
            I::Sh3add => (rs1 << 3).wrapping_add(rs2()),
            I::Sh1addUw => ((rs1 & 0xffff_ffff) << 1).wrapping_add(rs2()),
            I::Sh2addUw => ((rs1 & 0xffff_ffff) << 2).wrapping_add(rs2()),
            I::Sh3addUw => ((rs1 & 0xffff_ffff) << 3).wrapping_add(rs2()),
            I::AddUw => (rs1 & 0xffff_ffff).wrapping_add(rs2()),
            I::Bmator => bmat(rs1, rs2(), |row, column| (row & column) != 0),
            I::Bmatxor => bmat(rs1, rs2(), |row, column| (row & column).count_ones() & 1 == 1),

            I::Rori => rotate_right(rs1, imm, bits),
            I::Roriw => rotate_right(rs1, imm, 32),
            I::Grevi => grev(rs1, imm, bits),
            I::Greviw => grev(rs1, imm, 32),
            I::Gorci => gorc(rs1, imm, bits),
            I::Gorciw => gorc(rs1, imm, 32),
            I::Shfli => shfl(rs1, imm, bits),
            I::Unshfli => unshfl(rs1, imm, bits),
            I::Bseti => rs1 | 1 << imm,
            I::Bclri => rs1 & !(1 << imm),
            I::Binvi => rs1 ^ 1 << imm,
            I::Bexti => rs1 >> imm & 1,
            I::SlliUw => (rs1 & 0xffff_ffff) << imm,

            I::Cmix => rs1 & rs2() | rs3() & !rs2(),
            I::Cmov => {
                if rs2() != 0 {
                    rs1
                } else {
                    rs3()
                }
            }
            I::Fsl => funnel_left(rs1, rs3(), rs2(), bits),
            I::Fsr => funnel_right(rs1, rs3(), rs2(), bits),
            I::Fslw => funnel_left(rs1, rs3(), rs2(), 32),
            I::Fsrw => funnel_right(rs1, rs3(), rs2(), 32),
            // The immediate forms carry rs3 in op2 and the shift amount in op3.
            I::Fsri => funnel_right(rs1, rs2(), di.op3() as u64, bits),
            I::Fsriw => funnel_right(rs1, rs2(), di.op3() as u64, 32),
            id => unreachable!("{id} is not a bit-manipulation instruction"),
        };
        let value = if bits == 64 && is_word_op(di.id()) {
            value as u32 as i32 as i64 as u64
        } else {
            value
        };
        self.write_x(di.reg(0), value);
        Ok(())
    }
}

/// `*w` forms operate on the low word and sign-extend the result.
fn is_word_op(id: InstructionId) -> bool {
    use InstructionId as I;

    matches!(
        id,
        I::Clzw
            | I::Ctzw
            | I::Cpopw
            | I::Rolw
            | I::Rorw
            | I::Roriw
            | I::Packw
            | I::Packuw
            | I::Grevw
            | I::Greviw
            | I::Gorcw
            | I::Gorciw
            | I::Shflw
            | I::Unshflw
            | I::Bcompressw
            | I::Bdecompressw
            | I::Bfpw
            | I::Fslw
            | I::Fsrw
            | I::Fsriw
    )
}

const CRC32_POLY: u64 = 0xedb8_8320;
const CRC32C_POLY: u64 = 0x82f6_3b78;

fn width_mask(bits: u32) -> u64 {
    if bits == 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

fn clz(value: u64, bits: u32) -> u64 {
    ((value & width_mask(bits)).leading_zeros() - (64 - bits)) as u64
}

fn ctz(value: u64, bits: u32) -> u64 {
    (value & width_mask(bits)).trailing_zeros().min(bits) as u64
}

fn rotate_left(value: u64, amount: u64, bits: u32) -> u64 {
    let amount = (amount & (bits as u64 - 1)) as u32;
    match bits {
        32 => (value as u32).rotate_left(amount) as u64,
        _ => value.rotate_left(amount),
    }
}

fn rotate_right(value: u64, amount: u64, bits: u32) -> u64 {
    let amount = (amount & (bits as u64 - 1)) as u32;
    match bits {
        32 => (value as u32).rotate_right(amount) as u64,
        _ => value.rotate_right(amount),
    }
}

/// Concatenates the low halves of `low` and `high`.
fn pack(low: u64, high: u64, bits: u32) -> u64 {
    let half = bits / 2;
    let half_mask = width_mask(half);
    (low & half_mask | (high & half_mask) << half) & width_mask(bits)
}

const GREV_MASKS: [u64; 6] = [
    0x5555_5555_5555_5555,
    0x3333_3333_3333_3333,
    0x0f0f_0f0f_0f0f_0f0f,
    0x00ff_00ff_00ff_00ff,
    0x0000_ffff_0000_ffff,
    0x0000_0000_ffff_ffff,
];

/// Generalized reverse: stage `i` swaps adjacent blocks of `2^i` bits when bit `i` of `control`
/// is set.
fn grev(value: u64, control: u64, bits: u32) -> u64 {
    let control = control & (bits as u64 - 1);
    let mut x = value & width_mask(bits);
    for (stage, mask) in GREV_MASKS.iter().enumerate() {
        if control >> stage & 1 == 1 {
            let shift = 1 << stage;
            x = (x & mask) << shift | (x & !mask) >> shift;
        }
    }
    x & width_mask(bits)
}

/// Generalized OR-combine, the OR of all [`grev`] results selected by `control`.
fn gorc(value: u64, control: u64, bits: u32) -> u64 {
    let control = control & (bits as u64 - 1);
    let mut x = value & width_mask(bits);
    for (stage, mask) in GREV_MASKS.iter().enumerate() {
        if control >> stage & 1 == 1 {
            let shift = 1 << stage;
            x |= (x & mask) << shift | (x & !mask) >> shift;
        }
    }
    x & width_mask(bits)
}

/// `(left mask, right mask)` of each shuffle stage, indexed by stage.
const SHUFFLE_MASKS: [(u64, u64); 5] = [
    (0x4444_4444_4444_4444, 0x2222_2222_2222_2222),
    (0x3030_3030_3030_3030, 0x0c0c_0c0c_0c0c_0c0c),
    (0x0f00_0f00_0f00_0f00, 0x00f0_00f0_00f0_00f0),
    (0x00ff_0000_00ff_0000, 0x0000_ff00_0000_ff00),
    (0x0000_ffff_0000_0000, 0x0000_0000_ffff_0000),
];

fn shuffle_stage(value: u64, stage: usize) -> u64 {
    let (left, right) = SHUFFLE_MASKS[stage];
    let shift = 1 << stage;
    value & !(left | right) | (value << shift) & left | (value >> shift) & right
}

/// Generalized shuffle: the stages run from the widest to the narrowest.
fn shfl(value: u64, control: u64, bits: u32) -> u64 {
    let control = control & (bits as u64 / 2 - 1);
    let stages = bits.trailing_zeros() as usize - 1;
    let mut x = value & width_mask(bits);
    for stage in (0..stages).rev() {
        if control >> stage & 1 == 1 {
            x = shuffle_stage(x, stage);
        }
    }
    x & width_mask(bits)
}

/// Inverse of [`shfl`]: the same stages, narrowest first.
fn unshfl(value: u64, control: u64, bits: u32) -> u64 {
    let control = control & (bits as u64 / 2 - 1);
    let stages = bits.trailing_zeros() as usize - 1;
    let mut x = value & width_mask(bits);
    for stage in 0..stages {
        if control >> stage & 1 == 1 {
            x = shuffle_stage(x, stage);
        }
    }
    x & width_mask(bits)
}

/// Crossbar permutation: each `2^size_log2`-bit lane of `indices` selects a lane of `value`.
/// Out-of-range indices select zero.
fn xperm(value: u64, indices: u64, size_log2: u32, bits: u32) -> u64 {
    let size = 1u32 << size_log2;
    let lane_mask = width_mask(size);
    let mut result = 0;
    for i in (0..bits).step_by(size as usize) {
        let position = (indices >> i & lane_mask) << size_log2;
        if position < bits as u64 {
            result |= (value >> position & lane_mask) << i;
        }
    }
    result
}

/// Gathers the bits of `value` selected by `mask` into the low bits of the result.
fn bcompress(value: u64, mask: u64, bits: u32) -> u64 {
    let mut result = 0;
    let mut j = 0;
    for i in 0..bits {
        if mask >> i & 1 == 1 {
            result |= (value >> i & 1) << j;
            j += 1;
        }
    }
    result
}

/// Scatters the low bits of `value` to the positions selected by `mask`.
fn bdecompress(value: u64, mask: u64, bits: u32) -> u64 {
    let mut result = 0;
    let mut j = 0;
    for i in 0..bits {
        if mask >> i & 1 == 1 {
            result |= (value >> j & 1) << i;
            j += 1;
        }
    }
    result
}

/// Bit-field place. The upper half of `config` holds the field length and offset, the lower
/// half holds the data.
fn bfp(value: u64, config: u64, bits: u32) -> u64 {
    let mut cfg = config >> (bits / 2);
    if cfg >> 30 == 2 {
        cfg >>= 16;
    }
    let len = (cfg >> 8) & (bits as u64 / 2 - 1);
    let offset = cfg & (bits as u64 - 1);
    let len = if len == 0 { bits as u64 / 2 } else { len };
    let field = width_mask(len as u32) << offset;
    let data = config << offset;
    (data & field | value & !field) & width_mask(bits)
}

fn clmul(a: u64, b: u64, bits: u32) -> u64 {
    let mut result = 0u64;
    for i in 0..bits {
        if b >> i & 1 == 1 {
            result ^= a << i;
        }
    }
    result & width_mask(bits)
}

fn clmulh(a: u64, b: u64, bits: u32) -> u64 {
    let mut result = 0u64;
    for i in 1..bits {
        if b >> i & 1 == 1 {
            result ^= a >> (bits - i);
        }
    }
    result
}

fn clmulr(a: u64, b: u64, bits: u32) -> u64 {
    let mut result = 0u64;
    for i in 0..bits {
        if b >> i & 1 == 1 {
            result ^= a >> (bits - i - 1);
        }
    }
    result
}

/// Reflected CRC over the low `nbits` of `value`, one bit per step.
fn crc32(value: u64, nbits: u32, poly: u64, bits: u32) -> u64 {
    let mut x = value & width_mask(bits);
    for _ in 0..nbits {
        x = x >> 1 ^ (poly & (x & 1).wrapping_neg());
    }
    x
}

/// Transposes the 8x8 bit matrix held in `value`, one row per byte.
fn bmatflip(value: u64) -> u64 {
    let mut result = 0;
    for row in 0..8 {
        for column in 0..8 {
            result |= (value >> (row * 8 + column) & 1) << (column * 8 + row);
        }
    }
    result
}

/// 8x8 bit-matrix product: result bit `(i, j)` combines row `i` of `a` with column `j` of `b`.
fn bmat<F>(a: u64, b: u64, combine: F) -> u64
where
    F: Fn(u8, u8) -> bool,
{
    let columns = bmatflip(b);
    let mut result = 0;
    for i in 0..64 {
        let row = (a >> (i / 8 * 8)) as u8;
        let column = (columns >> (i % 8 * 8)) as u8;
        if combine(row, column) {
            result |= 1 << i;
        }
    }
    result
}

/// Funnel shift left of the `2 * bits` concatenation `high:low`.
fn funnel_left(high: u64, low: u64, amount: u64, bits: u32) -> u64 {
    let bits = bits as u64;
    let mask = width_mask(bits as u32);
    let mut shamt = amount & (2 * bits - 1);
    let (mut a, mut b) = (high & mask, low & mask);
    if shamt >= bits {
        shamt -= bits;
        std::mem::swap(&mut a, &mut b);
    }
    if shamt == 0 {
        a
    } else {
        (a << shamt | b >> (bits - shamt)) & mask
    }
}

/// Funnel shift right of the `2 * bits` concatenation `low:high`.
fn funnel_right(high: u64, low: u64, amount: u64, bits: u32) -> u64 {
    let bits = bits as u64;
    let mask = width_mask(bits as u32);
    let mut shamt = amount & (2 * bits - 1);
    let (mut a, mut b) = (high & mask, low & mask);
    if shamt >= bits {
        shamt -= bits;
        std::mem::swap(&mut a, &mut b);
    }
    if shamt == 0 {
        a
    } else {
        (a >> shamt | b << (bits - shamt)) & mask
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{hart, hart_with, retire, x};
    use super::*;
    use crate::hart::Config;
    use crate::Xlen;

    #[test]
    fn counting() {
        assert_eq!(clz(1, 32), 31);
        assert_eq!(clz(0, 64), 64);
        assert_eq!(ctz(0, 32), 32);
        assert_eq!(ctz(0x8000_0000_0000_0000, 64), 63);
    }

    #[test]
    fn generalized_reverse_and_or_combine() {
        // rev8
        assert_eq!(grev(0x1122_3344, 24, 32), 0x4433_2211);
        // rev (bit reverse)
        assert_eq!(grev(1, 31, 32), 0x8000_0000);
        // orc.b
        assert_eq!(gorc(0x0001_0200_0000_0003, 7, 64), 0x00ff_ff00_0000_00ff);
    }

    #[test]
    fn shuffle_round_trip_is_zip() {
        // zip on 32 bits interleaves the halves.
        assert_eq!(shfl(0x0000_ffff, 15, 32), 0x5555_5555);
        assert_eq!(unshfl(0x5555_5555, 15, 32), 0x0000_ffff);
    }

    #[test]
    fn compress_and_decompress() {
        assert_eq!(bcompress(0b1010_1100, 0b1111_0000, 32), 0b1010);
        assert_eq!(bdecompress(0b1010, 0b1111_0000, 32), 0b1010_0000);
    }

    #[test]
    fn carryless_multiply() {
        assert_eq!(clmul(0b101, 0b11, 32), 0b1111);
        assert_eq!(clmulh(0x8000_0000, 2, 32), 1);
        assert_eq!(clmulr(0x8000_0000, 1, 32), 1);
    }

    #[test]
    fn crc_of_zero_byte() {
        assert_eq!(crc32(0, 8, CRC32_POLY, 32), 0);
        // A single set bit shifted out once is folded in as the polynomial.
        assert_eq!(crc32(1, 1, CRC32_POLY, 32), CRC32_POLY);
    }

    #[test]
    fn funnel_shifts() {
        assert_eq!(funnel_left(0x8000_0001, 0xf000_0000, 4, 32), 0x0000_001f);
        assert_eq!(funnel_right(0x0000_0010, 0x0000_000f, 4, 32), 0xf000_0001);
        // Shift amounts of XLEN and above swap the operands.
        assert_eq!(funnel_left(1, 2, 32, 32), 2);
    }

    #[test]
    fn bit_matrix_transpose_is_involution() {
        let value = 0x0123_4567_89ab_cdef;
        assert_eq!(bmatflip(bmatflip(value)), value);
        // The identity matrix is neutral.
        let identity = 0x8040_2010_0804_0201;
        assert_eq!(bmat(value, identity, |r, c| (r & c).count_ones() & 1 == 1), value);
    }

    #[test]
    fn executes_through_the_hart() {
        // andn x3, x1, x2; cpop x4, x1; rori x5, x1, 4; sh2add x6, x2, x1
        let mut hart = hart(&[0x4020_f1b3, 0x6020_9213, 0x6040_d293, 0x2011_4333]);
        hart.registers_mut().set_x(x(1), 0xf0f0);
        hart.registers_mut().set_x(x(2), 0xff00);
        for _ in 0..4 {
            retire(&mut hart);
        }
        let regs = hart.registers();
        assert_eq!(regs.x(x(3)), 0x00f0);
        assert_eq!(regs.x(x(4)), 8);
        assert_eq!(regs.x(x(5)), 0x0f0f);
        assert_eq!(regs.x(x(6)), 0xff00 * 4 + 0xf0f0);
    }

    #[test]
    fn word_forms_sign_extend_on_rv64() {
        // rolw x2, x1, x3
        let mut hart = hart_with(
            &[0x6030_913b],
            Config {
                xlen: Xlen::Rv64,
                ..Config::default()
            },
        );
        hart.registers_mut().set_x(x(1), 0x4000_0000);
        hart.registers_mut().set_x(x(3), 1);
        retire(&mut hart);
        assert_eq!(hart.registers().x(x(2)), 0xffff_ffff_8000_0000);
    }
}
