//! IEEE 754 binary floating-point arithmetic on raw bit patterns.
//!
//! Single and double precision are computed by `softfp`, which reads the rounding mode and reports
//! exception flags through the two hook functions below. Half precision is widened to double
//! precision, computed there with round-to-odd and narrowed once, which rounds exactly like a
//! native binary16 operation. Every NaN result is the canonical NaN.

use std::cell::Cell;
use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Neg, Sub};

use softfp::{F32, F64};

/// Accrued exception flag bits, in `fflags` layout.
pub mod flags {
    /// Inexact.
    pub const NX: u8 = 1 << 0;
    /// Underflow.
    pub const UF: u8 = 1 << 1;
    /// Overflow.
    pub const OF: u8 = 1 << 2;
    /// Divide by zero.
    pub const DZ: u8 = 1 << 3;
    /// Invalid operation.
    pub const NV: u8 = 1 << 4;
}

use flags::{NV, NX, OF, UF};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RoundingMode {
    /// Round to nearest, ties to even.
    Rne = 0,
    /// Round towards zero.
    Rtz = 1,
    /// Round down (towards negative infinity).
    Rdn = 2,
    /// Round up (towards positive infinity).
    Rup = 3,
    /// Round to nearest, ties to max magnitude.
    Rmm = 4,
}

impl RoundingMode {
    /// Converts a 3-bit `rm`/`frm` value. Values 5 to 7 have no static rounding mode.
    pub fn from_u3(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Rne,
            1 => Self::Rtz,
            2 => Self::Rdn,
            3 => Self::Rup,
            4 => Self::Rmm,
            _ => return None,
        })
    }
}

thread_local! {
    static ROUNDING_MODE: Cell<u32> = const { Cell::new(RoundingMode::Rne as u32) };
    static ACCRUED: Cell<u8> = const { Cell::new(0) };
}

#[no_mangle]
fn softfp_get_rounding_mode() -> softfp::RoundingMode {
    let rm = ROUNDING_MODE.with(Cell::get);
    match rm.try_into() {
        Ok(mode) => mode,
        Err(_) => unreachable!("rounding mode {rm} is never installed"),
    }
}

#[no_mangle]
fn softfp_set_exception_flags(flags: softfp::ExceptionFlags) {
    ACCRUED.with(|accrued| accrued.set(accrued.get() | flags.bits() as u8));
}

/// Runs `op` with `rm` installed and returns its value with the flags it raised.
fn rounded<T>(rm: RoundingMode, op: impl FnOnce() -> T) -> (T, u8) {
    ROUNDING_MODE.with(|mode| mode.set(rm as u32));
    ACCRUED.with(|accrued| accrued.set(0));
    let value = op();
    (value, ACCRUED.with(Cell::take))
}

/// Target of a float to integer conversion.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IntFormat {
    I32,
    U32,
    I64,
    U64,
}

/// The `softfp` types, seen through one interface.
trait Native:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + PartialEq
    + PartialOrd
{
    fn from_raw(bits: u64) -> Self;
    fn raw(self) -> u64;
    fn sqrt(self) -> Self;
    fn fma(a: Self, b: Self, c: Self) -> Self;
    fn minimum(a: Self, b: Self) -> Self;
    fn maximum(a: Self, b: Self) -> Self;
    /// Converts to an integer, sign-extending 32-bit signed results.
    fn to_integer(self, target: IntFormat) -> u64;
    fn from_integer(value: u64, signed: bool) -> Self;
    /// Index of the `fclass` bit.
    fn class(self) -> u32;
}

macro_rules! native {
    ($ty:ident, $bits:ty) => {
        impl Native for $ty {
            fn from_raw(bits: u64) -> Self {
                $ty::new(bits as $bits)
            }

            fn raw(self) -> u64 {
                self.0 as u64
            }

            fn sqrt(self) -> Self {
                self.square_root()
            }

            fn fma(a: Self, b: Self, c: Self) -> Self {
                $ty::fused_multiply_add(a, b, c)
            }

            fn minimum(a: Self, b: Self) -> Self {
                $ty::min(a, b)
            }

            fn maximum(a: Self, b: Self) -> Self {
                $ty::max(a, b)
            }

            fn to_integer(self, target: IntFormat) -> u64 {
                match target {
                    IntFormat::I32 => self.convert_to_sint::<u32>() as i32 as i64 as u64,
                    IntFormat::U32 => self.convert_to_uint::<u32>() as u64,
                    IntFormat::I64 => self.convert_to_sint::<u64>(),
                    IntFormat::U64 => self.convert_to_uint::<u64>(),
                }
            }

            fn from_integer(value: u64, signed: bool) -> Self {
                if signed {
                    $ty::convert_from_sint::<u64>(value)
                } else {
                    $ty::convert_from_uint::<u64>(value)
                }
            }

            fn class(self) -> u32 {
                self.classify() as u32
            }
        }
    };
}

native!(F32, u32);
native!(F64, u64);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
    Fma,
    Min,
    Max,
}

impl Op {
    fn apply<T: Native>(self, [a, b, c]: [u64; 3]) -> u64 {
        let (a, b, c) = (T::from_raw(a), T::from_raw(b), T::from_raw(c));
        let result = match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
            Op::Sqrt => a.sqrt(),
            Op::Fma => T::fma(a, b, c),
            Op::Min => T::minimum(a, b),
            Op::Max => T::maximum(a, b),
        };
        result.raw()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Relation {
    Eq,
    Lt,
    Le,
}

impl Relation {
    fn holds<T: Native>(self, a: T, b: T) -> bool {
        match self {
            Relation::Eq => a == b,
            Relation::Lt => a < b,
            Relation::Le => a <= b,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Precision {
    Half,
    Single,
    Double,
}

/// A binary interchange format.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Format {
    precision: Precision,
    exp_bits: u32,
    frac_bits: u32,
}

impl Format {
    pub const HALF: Self = Self {
        precision: Precision::Half,
        exp_bits: 5,
        frac_bits: 10,
    };
    pub const SINGLE: Self = Self {
        precision: Precision::Single,
        exp_bits: 8,
        frac_bits: 23,
    };
    pub const DOUBLE: Self = Self {
        precision: Precision::Double,
        exp_bits: 11,
        frac_bits: 52,
    };

    /// Returns the format of elements `width` bits wide, if there is one.
    pub fn of_width(width: u32) -> Option<Self> {
        match width {
            16 => Some(Self::HALF),
            32 => Some(Self::SINGLE),
            64 => Some(Self::DOUBLE),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        1 + self.exp_bits + self.frac_bits
    }

    fn mask(self) -> u64 {
        u64::MAX >> (64 - self.bits())
    }

    fn bias(self) -> i32 {
        (1 << (self.exp_bits - 1)) - 1
    }

    fn emin(self) -> i32 {
        1 - self.bias()
    }

    fn max_exp_field(self) -> u64 {
        (1 << self.exp_bits) - 1
    }

    pub fn sign_mask(self) -> u64 {
        1 << (self.bits() - 1)
    }

    fn frac_mask(self) -> u64 {
        (1 << self.frac_bits) - 1
    }

    fn sign_bit(self, sign: bool) -> u64 {
        if sign {
            self.sign_mask()
        } else {
            0
        }
    }

    fn exp_field(self, a: u64) -> u64 {
        (a >> self.frac_bits) & self.max_exp_field()
    }

    pub fn canonical_nan(self) -> u64 {
        self.max_exp_field() << self.frac_bits | 1 << (self.frac_bits - 1)
    }

    pub fn infinity(self, sign: bool) -> u64 {
        self.sign_bit(sign) | self.max_exp_field() << self.frac_bits
    }

    pub fn zero(self, sign: bool) -> u64 {
        self.sign_bit(sign)
    }

    fn max_finite(self, sign: bool) -> u64 {
        self.sign_bit(sign) | (self.max_exp_field() - 1) << self.frac_bits | self.frac_mask()
    }

    pub fn is_nan(self, a: u64) -> bool {
        self.exp_field(a) == self.max_exp_field() && a & self.frac_mask() != 0
    }

    pub fn is_signaling_nan(self, a: u64) -> bool {
        self.is_nan(a) && a >> (self.frac_bits - 1) & 1 == 0
    }

    pub fn is_negative(self, a: u64) -> bool {
        a & self.sign_mask() != 0
    }

    fn magnitude(self, a: u64) -> u64 {
        a & self.mask() & !self.sign_mask()
    }

    fn canonicalize(self, a: u64) -> u64 {
        if self.is_nan(a) {
            self.canonical_nan()
        } else {
            a & self.mask()
        }
    }

    /// Evaluates `op` in this format under `rm`.
    fn compute(self, op: Op, operands: [u64; 3], rm: RoundingMode) -> (u64, u8) {
        let (bits, fl) = match self.precision {
            Precision::Single => rounded(rm, || op.apply::<F32>(operands)),
            Precision::Double => rounded(rm, || op.apply::<F64>(operands)),
            Precision::Half => {
                let wide = operands.map(widen_half);
                narrow_odd(rounded(RoundingMode::Rtz, || op.apply::<F64>(wide)), rm)
            }
        };
        (self.canonicalize(bits), fl)
    }

    pub fn add(self, a: u64, b: u64, rm: RoundingMode) -> (u64, u8) {
        self.compute(Op::Add, [a, b, 0], rm)
    }

    pub fn sub(self, a: u64, b: u64, rm: RoundingMode) -> (u64, u8) {
        self.compute(Op::Sub, [a, b, 0], rm)
    }

    pub fn mul(self, a: u64, b: u64, rm: RoundingMode) -> (u64, u8) {
        self.compute(Op::Mul, [a, b, 0], rm)
    }

    pub fn div(self, a: u64, b: u64, rm: RoundingMode) -> (u64, u8) {
        self.compute(Op::Div, [a, b, 0], rm)
    }

    pub fn sqrt(self, a: u64, rm: RoundingMode) -> (u64, u8) {
        self.compute(Op::Sqrt, [a, 0, 0], rm)
    }

    /// Computes `a * b + c` with a single rounding.
    pub fn fma(self, a: u64, b: u64, c: u64, rm: RoundingMode) -> (u64, u8) {
        let (value, fl) = self.compute(Op::Fma, [a, b, c], rm);
        let infinity = self.infinity(false);
        let (a, b) = (self.magnitude(a), self.magnitude(b));
        // inf * 0 is invalid even when the addend is a quiet NaN.
        if (a == infinity && b == 0) || (a == 0 && b == infinity) {
            return (value, fl | NV);
        }
        (value, fl)
    }

    pub fn to_int(self, a: u64, target: IntFormat, rm: RoundingMode) -> (u64, u8) {
        match self.precision {
            Precision::Single => rounded(rm, || F32::from_raw(a).to_integer(target)),
            Precision::Double => rounded(rm, || F64::from_raw(a).to_integer(target)),
            Precision::Half => rounded(rm, || F64::from_raw(widen_half(a)).to_integer(target)),
        }
    }

    /// Converts an integer. `value` is interpreted as two's complement when `signed`.
    pub fn from_int(self, value: u64, signed: bool, rm: RoundingMode) -> (u64, u8) {
        match self.precision {
            Precision::Single => rounded(rm, || F32::from_integer(value, signed).raw()),
            Precision::Double => rounded(rm, || F64::from_integer(value, signed).raw()),
            Precision::Half => narrow_odd(
                rounded(RoundingMode::Rtz, || F64::from_integer(value, signed).raw()),
                rm,
            ),
        }
    }

    /// Converts `a` from this format to `target`.
    pub fn convert(self, a: u64, target: Format, rm: RoundingMode) -> (u64, u8) {
        if self.is_nan(a) {
            let fl = if self.is_signaling_nan(a) { NV } else { 0 };
            return (target.canonical_nan(), fl);
        }
        match (self.precision, target.precision) {
            (Precision::Single, Precision::Double) => rounded(rm, || {
                let wide: F64 = F32::from_raw(a).convert_format();
                wide.raw()
            }),
            (Precision::Double, Precision::Single) => rounded(rm, || {
                let narrow: F32 = F64::from_raw(a).convert_format();
                narrow.raw()
            }),
            (Precision::Half, Precision::Single) => rounded(rm, || {
                let narrow: F32 = F64::from_raw(widen_half(a)).convert_format();
                narrow.raw()
            }),
            (Precision::Half, Precision::Double) => (widen_half(a), 0),
            (Precision::Single, Precision::Half) => {
                let (wide, fl) = Format::SINGLE.convert(a, Format::DOUBLE, rm);
                let (narrow, narrow_fl) = narrow_half(wide, rm);
                (narrow, fl | narrow_fl)
            }
            (Precision::Double, Precision::Half) => narrow_half(a, rm),
            (Precision::Half, Precision::Half)
            | (Precision::Single, Precision::Single)
            | (Precision::Double, Precision::Double) => (a & self.mask(), 0),
        }
    }

    fn compare(self, relation: Relation, a: u64, b: u64) -> (bool, u8) {
        let invalid = match relation {
            Relation::Eq => self.is_signaling_nan(a) || self.is_signaling_nan(b),
            Relation::Lt | Relation::Le => self.is_nan(a) || self.is_nan(b),
        };
        let (holds, fl) = rounded(RoundingMode::Rne, || match self.precision {
            Precision::Single => relation.holds(F32::from_raw(a), F32::from_raw(b)),
            Precision::Double => relation.holds(F64::from_raw(a), F64::from_raw(b)),
            Precision::Half => relation.holds(
                F64::from_raw(widen_half(a)),
                F64::from_raw(widen_half(b)),
            ),
        });
        (holds, if invalid { fl | NV } else { fl })
    }

    /// Quiet equality: only signaling NaNs raise the invalid flag.
    pub fn eq(self, a: u64, b: u64) -> (bool, u8) {
        self.compare(Relation::Eq, a, b)
    }

    /// Signaling less-than: any NaN raises the invalid flag.
    pub fn lt(self, a: u64, b: u64) -> (bool, u8) {
        self.compare(Relation::Lt, a, b)
    }

    /// Signaling less-than-or-equal.
    pub fn le(self, a: u64, b: u64) -> (bool, u8) {
        self.compare(Relation::Le, a, b)
    }

    /// `minimumNumber`: a NaN operand is ignored unless both are NaN.
    pub fn min(self, a: u64, b: u64) -> (u64, u8) {
        self.min_max(Op::Min, a, b)
    }

    pub fn max(self, a: u64, b: u64) -> (u64, u8) {
        self.min_max(Op::Max, a, b)
    }

    fn min_max(self, op: Op, a: u64, b: u64) -> (u64, u8) {
        let (value, fl) = self.compute(op, [a, b, 0], RoundingMode::Rne);
        if self.is_signaling_nan(a) || self.is_signaling_nan(b) {
            return (value, fl | NV);
        }
        (value, fl)
    }

    /// Returns the `fclass` mask of `a`.
    pub fn classify(self, a: u64) -> u64 {
        let bit = match self.precision {
            Precision::Single => F32::from_raw(a).class(),
            Precision::Double => F64::from_raw(a).class(),
            Precision::Half => self.class_bits(a),
        };
        1 << bit
    }

    fn class_bits(self, a: u64) -> u32 {
        let negative = self.is_negative(a);
        let pick = |neg: u32, pos: u32| if negative { neg } else { pos };
        let exp = self.exp_field(a);
        let fraction = a & self.frac_mask() != 0;
        if exp == self.max_exp_field() {
            match (fraction, self.is_signaling_nan(a)) {
                (false, _) => pick(0, 7),
                (true, true) => 8,
                (true, false) => 9,
            }
        } else if exp == 0 {
            if fraction {
                pick(2, 5)
            } else {
                pick(3, 4)
            }
        } else {
            pick(1, 6)
        }
    }

    /// Rounds `sig * 2^exp` to this format. Tininess is detected after rounding.
    fn round_pack(self, sign: bool, exp: i32, sig: u128, rm: RoundingMode) -> (u64, u8) {
        if sig == 0 {
            return (self.zero(sign), 0);
        }
        let f = self.frac_bits as i32;
        let len = 128 - sig.leading_zeros() as i32;
        // Exponent of the leading one.
        let e = exp + len - 1;
        let mut lsb = (e - f).max(self.emin() - f);
        let (mut kept, inexact) = round_shift(sig, lsb - exp, sign, rm);
        if kept >> (f + 1) != 0 {
            kept >>= 1;
            lsb += 1;
        }

        let mut fl = 0;
        if inexact {
            fl |= NX;
            if e < self.emin() {
                // Tiny unless rounding with unbounded exponent range reaches the smallest normal.
                let (unbounded, _) = round_shift(sig, e - f - exp, sign, rm);
                if !(e == self.emin() - 1 && unbounded >> (f + 1) != 0) {
                    fl |= UF;
                }
            }
        }

        let hidden = 1u128 << f;
        if kept < hidden {
            return (self.sign_bit(sign) | kept as u64, fl);
        }
        let biased = lsb + f + self.bias();
        if biased >= self.max_exp_field() as i32 {
            let to_infinity = match rm {
                RoundingMode::Rne | RoundingMode::Rmm => true,
                RoundingMode::Rtz => false,
                RoundingMode::Rdn => sign,
                RoundingMode::Rup => !sign,
            };
            let value = if to_infinity {
                self.infinity(sign)
            } else {
                self.max_finite(sign)
            };
            return (value, fl | OF | NX);
        }
        (
            self.sign_bit(sign) | (biased as u64) << self.frac_bits | (kept - hidden) as u64,
            fl,
        )
    }
}

/// Widens binary16 bits to the binary64 bits of the same value. Signaling NaNs stay signaling.
fn widen_half(a: u64) -> u64 {
    let sign = (a >> 15 & 1) << 63;
    let exp = a >> 10 & 0x1f;
    let frac = a & 0x3ff;
    match (exp, frac) {
        (0, 0) => sign,
        (0, _) => {
            // `frac * 2^-24`, renormalised.
            let top = 63 - frac.leading_zeros() as u64;
            let fraction = (frac << (52 - top)) & Format::DOUBLE.frac_mask();
            sign | (top + 1023 - 24) << 52 | fraction
        }
        (0x1f, _) => sign | 0x7ff << 52 | frac << 42,
        _ => sign | (exp + 1023 - 15) << 52 | frac << 42,
    }
}

/// Rounds binary64 bits to binary16.
fn narrow_half(a: u64, rm: RoundingMode) -> (u64, u8) {
    let (double, half) = (Format::DOUBLE, Format::HALF);
    let sign = double.is_negative(a);
    let exp = double.exp_field(a) as i32;
    let frac = a & double.frac_mask();
    if double.is_nan(a) {
        let fl = if double.is_signaling_nan(a) { NV } else { 0 };
        return (half.canonical_nan(), fl);
    }
    match exp {
        0x7ff => (half.infinity(sign), 0),
        0 if frac == 0 => (half.zero(sign), 0),
        0 => half.round_pack(sign, -1074, frac as u128, rm),
        _ => half.round_pack(sign, exp - 1075, (frac | 1 << 52) as u128, rm),
    }
}

/// Narrows a binary64 result computed with round-towards-zero. Forcing the lsb of an inexact
/// result gives round-to-odd, which binary16 rounding then cannot double-round.
fn narrow_odd((wide, fl): (u64, u8), rm: RoundingMode) -> (u64, u8) {
    let odd = if fl & NX != 0 && !Format::DOUBLE.is_nan(wide) {
        wide | 1
    } else {
        wide
    };
    let (narrow, narrow_fl) = narrow_half(odd, rm);
    (narrow, fl & !NX | narrow_fl)
}

/// Shifts `sig` right by `shift` bits, rounding according to `rm`. Returns the rounded value and
/// whether any non-zero bits were lost.
fn round_shift(sig: u128, shift: i32, sign: bool, rm: RoundingMode) -> (u128, bool) {
    if shift <= 0 {
        return (sig << (-shift) as u32, false);
    }
    let (kept, remainder, lost) = if shift >= 128 {
        let remainder = if shift == 128 {
            sig.cmp(&(1 << 127))
        } else {
            Ordering::Less
        };
        (0, remainder, sig != 0)
    } else {
        let rem = sig & ((1 << shift) - 1);
        (sig >> shift, rem.cmp(&(1 << (shift - 1))), rem != 0)
    };
    if !lost {
        return (kept, false);
    }
    let round_up = match rm {
        RoundingMode::Rne => {
            remainder == Ordering::Greater || (remainder == Ordering::Equal && kept & 1 == 1)
        }
        RoundingMode::Rtz => false,
        RoundingMode::Rdn => sign,
        RoundingMode::Rup => !sign,
        RoundingMode::Rmm => remainder != Ordering::Less,
    };
    (kept + round_up as u128, true)
}

#[cfg(test)]
mod tests {
    use super::flags::*;
    use super::*;

    const RNE: RoundingMode = RoundingMode::Rne;
    const S: Format = Format::SINGLE;
    const D: Format = Format::DOUBLE;
    const H: Format = Format::HALF;

    fn s(v: f32) -> u64 {
        v.to_bits() as u64
    }

    fn d(v: f64) -> u64 {
        v.to_bits()
    }

    #[test]
    fn basic_arithmetic_matches_host() {
        assert_eq!(S.add(s(1.5), s(2.25), RNE), (s(3.75), 0));
        assert_eq!(D.add(d(0.1), d(0.2), RNE), (d(0.1 + 0.2), NX));
        assert_eq!(D.sub(d(1.0), d(1.0), RNE), (d(0.0), 0));
        assert_eq!(D.sub(d(1.0), d(1.0), RoundingMode::Rdn), (d(-0.0), 0));
        assert_eq!(D.mul(d(1.1), d(3.3), RNE).0, d(1.1 * 3.3));
        assert_eq!(D.div(d(1.0), d(3.0), RNE), (d(1.0 / 3.0), NX));
        assert_eq!(D.sqrt(d(2.0), RNE), (d(2f64.sqrt()), NX));
        assert_eq!(S.sqrt(s(16.0), RNE), (s(4.0), 0));
        assert_eq!(
            D.fma(d(0.1), d(10.0), d(-1.0), RNE).0,
            d(0.1f64.mul_add(10.0, -1.0))
        );
        assert_eq!(D.add(d(1e300), d(-1e-300), RNE), (d(1e300), NX));
    }

    #[test]
    fn directed_rounding() {
        let third_down = S.div(s(1.0), s(3.0), RoundingMode::Rtz).0;
        let third_up = S.div(s(1.0), s(3.0), RoundingMode::Rup).0;
        assert_eq!(third_up, third_down + 1);
        let neg_third = S.div(s(-1.0), s(3.0), RoundingMode::Rdn).0;
        assert_eq!(neg_third, third_up | 0x8000_0000);
    }

    #[test]
    fn overflow_and_underflow() {
        assert_eq!(S.mul(s(f32::MAX), s(2.0), RNE), (s(f32::INFINITY), OF | NX));
        assert_eq!(S.mul(s(f32::MAX), s(2.0), RoundingMode::Rtz), (s(f32::MAX), OF | NX));
        // Exact subnormal results do not underflow.
        assert_eq!(
            S.div(s(f32::MIN_POSITIVE), s(2.0), RNE),
            (s(f32::MIN_POSITIVE / 2.0), 0)
        );
        let (tiny, fl) = S.mul(s(1e-30), s(1e-15), RNE);
        assert_eq!(tiny, s(1e-30 * 1e-15));
        assert_eq!(fl, UF | NX);
        assert_eq!(S.div(s(1.0), s(0.0), RNE), (s(f32::INFINITY), DZ));
    }

    #[test]
    fn invalid_operations() {
        let nan = S.canonical_nan();
        assert_eq!(nan, 0x7fc0_0000);
        assert_eq!(S.add(s(f32::INFINITY), s(f32::NEG_INFINITY), RNE), (nan, NV));
        assert_eq!(S.mul(s(0.0), s(f32::INFINITY), RNE), (nan, NV));
        assert_eq!(S.sqrt(s(-1.0), RNE), (nan, NV));
        assert_eq!(S.add(0x7f80_0001, s(1.0), RNE), (nan, NV));
        assert_eq!(S.add(0xffc0_1234, s(1.0), RNE), (nan, 0));
        assert_eq!(S.fma(s(0.0), s(f32::INFINITY), nan, RNE), (nan, NV));
    }

    #[test]
    fn conversions() {
        assert_eq!(S.convert(s(1.0), H, RNE), (0x3c00, 0));
        assert_eq!(S.convert(s(65520.0), H, RNE), (0x7c00, OF | NX));
        assert_eq!(H.convert(0x3555, D, RNE), (d(0.333251953125), 0));
        assert_eq!(D.convert(d(0.1), S, RNE), (s(0.1), NX));
        assert_eq!(D.convert(0x7ff0_0000_0000_0001, S, RNE), (0x7fc0_0000, NV));

        assert_eq!(S.from_int(-3i64 as u64, true, RNE), (s(-3.0), 0));
        assert_eq!(S.from_int(u64::MAX, false, RNE), (s(1.8446744e19), NX));
        assert_eq!(D.from_int(1 << 53 | 1, false, RNE), (d(9007199254740992.0), NX));
    }

    #[test]
    fn float_to_integer() {
        assert_eq!(S.to_int(s(-1.5), IntFormat::I32, RNE), (-2i64 as u64, NX));
        assert_eq!(S.to_int(s(2.5), IntFormat::I32, RNE), (2, NX));
        assert_eq!(S.to_int(s(2.5), IntFormat::I32, RoundingMode::Rmm), (3, NX));
        assert_eq!(S.to_int(s(3e9), IntFormat::I32, RNE), (i32::MAX as u64, NV));
        assert_eq!(S.to_int(s(3e9), IntFormat::U32, RNE), (3_000_000_000, 0));
        assert_eq!(S.to_int(S.canonical_nan(), IntFormat::I64, RNE), (i64::MAX as u64, NV));
        assert_eq!(S.to_int(s(-1.0), IntFormat::U32, RNE), (0, NV));
        assert_eq!(S.to_int(s(-0.5), IntFormat::U64, RoundingMode::Rtz), (0, NX));
        assert_eq!(D.to_int(d(-1e30), IntFormat::I64, RNE), (i64::MIN as u64, NV));
    }

    #[test]
    fn comparisons_and_min_max() {
        let snan = 0x7f80_0001;
        let qnan = S.canonical_nan();
        assert_eq!(S.eq(s(1.0), s(1.0)), (true, 0));
        assert_eq!(S.eq(s(0.0), s(-0.0)), (true, 0));
        assert_eq!(S.eq(qnan, s(1.0)), (false, 0));
        assert_eq!(S.eq(snan, s(1.0)), (false, NV));
        assert_eq!(S.lt(qnan, s(1.0)), (false, NV));
        assert_eq!(S.lt(s(-2.0), s(1.0)), (true, 0));
        assert_eq!(S.le(s(-0.0), s(0.0)), (true, 0));

        assert_eq!(S.min(s(0.0), s(-0.0)), (s(-0.0), 0));
        assert_eq!(S.max(s(0.0), s(-0.0)), (s(0.0), 0));
        assert_eq!(S.min(qnan, s(3.0)), (s(3.0), 0));
        assert_eq!(S.max(snan, s(3.0)), (s(3.0), NV));
        assert_eq!(S.max(snan, qnan), (qnan, NV));
        assert_eq!(S.min(s(-5.0), s(3.0)), (s(-5.0), 0));
    }

    #[test]
    fn classify() {
        assert_eq!(S.classify(s(f32::NEG_INFINITY)), 1 << 0);
        assert_eq!(S.classify(s(-1.0)), 1 << 1);
        assert_eq!(S.classify(0x8000_0001), 1 << 2);
        assert_eq!(S.classify(s(-0.0)), 1 << 3);
        assert_eq!(S.classify(s(0.0)), 1 << 4);
        assert_eq!(S.classify(1), 1 << 5);
        assert_eq!(D.classify(d(1.0)), 1 << 6);
        assert_eq!(H.classify(0x7c00), 1 << 7);
        assert_eq!(S.classify(0x7f80_0001), 1 << 8);
        assert_eq!(S.classify(0x7fc0_0000), 1 << 9);
    }

    #[test]
    fn half_precision_rounds_once() {
        let one = 0x3c00;
        // 2^-11 is exactly half an ulp of 1.0.
        let half_ulp = 0x1000;
        assert_eq!(H.add(one, half_ulp, RNE), (one, NX));
        assert_eq!(H.add(one, half_ulp, RoundingMode::Rmm), (0x3c01, NX));
        assert_eq!(H.add(one, half_ulp, RoundingMode::Rup), (0x3c01, NX));
        assert_eq!(H.add(one, 0x0001, RoundingMode::Rup), (0x3c01, NX));
        assert_eq!(H.add(one, 0x0001, RNE), (one, NX));
        assert_eq!(H.mul(0x3c00, 0x4000, RNE), (0x4000, 0));

        assert_eq!(H.from_int(2049, false, RNE), (0x6800, NX));
        assert_eq!(H.from_int(2051, false, RNE), (0x6802, NX));
        assert_eq!(H.from_int(-2i64 as u64, true, RNE), (0xc000, 0));
        assert_eq!(H.to_int(0x3e00, IntFormat::I32, RNE), (2, NX));
        assert_eq!(H.sqrt(0x4400, RNE), (0x4000, 0));
        assert_eq!(H.mul(0x7bff, 0x4000, RNE), (0x7c00, OF | NX));
    }

    #[test]
    fn half_precision_nans() {
        let nan = H.canonical_nan();
        assert_eq!(nan, 0x7e00);
        assert_eq!(H.add(0x7c01, 0x3c00, RNE), (nan, NV));
        assert_eq!(H.min(0x7e00, 0x3c00), (0x3c00, 0));
        assert_eq!(H.eq(0x7c01, 0x7c01), (false, NV));
        assert_eq!(H.lt(0xbc00, 0x3c00), (true, 0));
        assert_eq!(H.convert(0x7c01, S, RNE), (S.canonical_nan(), NV));
        assert_eq!(H.classify(0x7c01), 1 << 8);
        assert_eq!(H.classify(0x8001), 1 << 2);
    }

    #[test]
    fn flags_are_per_operation() {
        assert_eq!(D.div(d(1.0), d(3.0), RNE).1, NX);
        assert_eq!(D.add(d(1.0), d(1.0), RNE), (d(2.0), 0));
        assert_eq!(S.div(s(1.0), s(3.0), RoundingMode::Rup).1, NX);
        // The previous directed mode does not leak into the next operation.
        assert_eq!(S.div(s(1.0), s(3.0), RNE).0, s(1.0 / 3.0));
    }
}
