//! Floating-point forms of the V extension.
//!
//! Element formats follow `SEW`: 16 bits (with Zfh), 32 or 64. Vector floating-point
//! instructions always round with the dynamic rounding mode in `frm`, except for the explicit
//! round-towards-zero and round-to-odd conversions.

use super::vector::{mask, sext, Shape, Source, V0};
use super::{illegal, ExecutionResult};
use crate::catalog::{InstructionId, OperandType};
use crate::cause::Exception;
use crate::decode::DecodedInstruction;
use crate::float::{flags, Format, IntFormat, RoundingMode};
use crate::hart::Hart;
use crate::memory::Bus;

/// Element type of a conversion.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Kind {
    Float,
    Signed,
    Unsigned,
}

/// Converts a float to an integer of `bits` bits, saturating like the scalar conversions do.
fn float_to_int(
    format: Format,
    value: u64,
    bits: u32,
    signed: bool,
    rm: RoundingMode,
) -> (u64, u8) {
    let target = match (bits > 32, signed) {
        (false, true) => IntFormat::I32,
        (false, false) => IntFormat::U32,
        (true, true) => IntFormat::I64,
        (true, false) => IntFormat::U64,
    };
    let (result, fflags) = format.to_int(value, target, rm);
    if bits >= 32 {
        return (result & mask(bits), fflags);
    }
    if signed {
        let wide = result as u32 as i32 as i64;
        let clamped = wide.clamp(-(1 << (bits - 1)), (1 << (bits - 1)) - 1);
        if clamped != wide {
            return (clamped as u64 & mask(bits), flags::NV);
        }
        (wide as u64 & mask(bits), fflags)
    } else {
        let wide = result as u32 as u64;
        if wide > mask(bits) {
            return (mask(bits), flags::NV);
        }
        (wide, fflags)
    }
}

/// Converts an integer element of `bits` bits to a float.
fn int_to_float(
    format: Format,
    value: u64,
    bits: u32,
    signed: bool,
    rm: RoundingMode,
) -> (u64, u8) {
    let value = if signed { sext(value, bits) as u64 } else { value };
    format.from_int(value, signed, rm)
}

/// Rounds with round-to-odd: truncate, then force the lsb of an inexact result.
fn convert_round_to_odd(source: Format, value: u64, target: Format) -> (u64, u8) {
    let (result, fflags) = source.convert(value, target, RoundingMode::Rtz);
    if fflags & flags::NX != 0 && !target.is_nan(result) {
        (result | 1, fflags)
    } else {
        (result, fflags)
    }
}

impl<B: Bus> Hart<B> {
    pub(super) fn execute_vector_fp(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        use InstructionId as I;

        let s = self.shape();
        // Integer sources may be narrower than any floating-point format.
        match di.id() {
            I::VfwcvtFXuV => return self.vf_convert(di, s, Kind::Unsigned, Kind::Float, 1, None),
            I::VfwcvtFXV => return self.vf_convert(di, s, Kind::Signed, Kind::Float, 1, None),
            _ => {}
        }
        let format = self.element_format(di, s.sew)?;
        match di.id() {
            I::VfaddVv | I::VfaddVf => self.vf_binary(di, s, |a, b, rm| format.add(a, b, rm)),
            I::VfsubVv | I::VfsubVf => self.vf_binary(di, s, |a, b, rm| format.sub(a, b, rm)),
            I::VfrsubVf => self.vf_binary(di, s, |a, b, rm| format.sub(b, a, rm)),
            I::VfmulVv | I::VfmulVf => self.vf_binary(di, s, |a, b, rm| format.mul(a, b, rm)),
            I::VfdivVv | I::VfdivVf => self.vf_binary(di, s, |a, b, rm| format.div(a, b, rm)),
            I::VfrdivVf => self.vf_binary(di, s, |a, b, rm| format.div(b, a, rm)),
            I::VfminVv | I::VfminVf => self.vf_binary(di, s, |a, b, _| format.min(a, b)),
            I::VfmaxVv | I::VfmaxVf => self.vf_binary(di, s, |a, b, _| format.max(a, b)),
            I::VfsgnjVv | I::VfsgnjVf => {
                let sign = format.sign_mask();
                self.vf_binary(di, s, |a, b, _| (a & !sign | b & sign, 0))
            }
            I::VfsgnjnVv | I::VfsgnjnVf => {
                let sign = format.sign_mask();
                self.vf_binary(di, s, |a, b, _| (a & !sign | !b & sign, 0))
            }
            I::VfsgnjxVv | I::VfsgnjxVf => {
                let sign = format.sign_mask();
                self.vf_binary(di, s, |a, b, _| (a ^ b & sign, 0))
            }

            I::VfmaccVv | I::VfmaccVf => {
                self.vf_mac(di, s, |d, a, b, _, rm| format.fma(a, b, d, rm))
            }
            I::VfnmaccVv | I::VfnmaccVf => {
                self.vf_mac(di, s, |d, a, b, neg, rm| format.fma(a ^ neg, b, d ^ neg, rm))
            }
            I::VfmsacVv | I::VfmsacVf => {
                self.vf_mac(di, s, |d, a, b, neg, rm| format.fma(a, b, d ^ neg, rm))
            }
            I::VfnmsacVv | I::VfnmsacVf => {
                self.vf_mac(di, s, |d, a, b, neg, rm| format.fma(a ^ neg, b, d, rm))
            }
            I::VfmaddVv | I::VfmaddVf => {
                self.vf_mac(di, s, |d, a, b, _, rm| format.fma(a, d, b, rm))
            }
            I::VfnmaddVv | I::VfnmaddVf => {
                self.vf_mac(di, s, |d, a, b, neg, rm| format.fma(a ^ neg, d, b ^ neg, rm))
            }
            I::VfmsubVv | I::VfmsubVf => {
                self.vf_mac(di, s, |d, a, b, neg, rm| format.fma(a, d, b ^ neg, rm))
            }
            I::VfnmsubVv | I::VfnmsubVf => {
                self.vf_mac(di, s, |d, a, b, neg, rm| format.fma(a ^ neg, d, b, rm))
            }

            I::VfwaddVv | I::VfwaddVf => self.vf_widen(di, s, false, |w, a, b, rm| w.add(a, b, rm)),
            I::VfwaddWv | I::VfwaddWf => self.vf_widen(di, s, true, |w, a, b, rm| w.add(a, b, rm)),
            I::VfwsubVv | I::VfwsubVf => self.vf_widen(di, s, false, |w, a, b, rm| w.sub(a, b, rm)),
            I::VfwsubWv | I::VfwsubWf => self.vf_widen(di, s, true, |w, a, b, rm| w.sub(a, b, rm)),
            I::VfwmulVv | I::VfwmulVf => self.vf_widen(di, s, false, |w, a, b, rm| w.mul(a, b, rm)),
            I::VfwmaccVv | I::VfwmaccVf => self.vf_widen_mac(di, s, false, false),
            I::VfwnmaccVv | I::VfwnmaccVf => self.vf_widen_mac(di, s, true, true),
            I::VfwmsacVv | I::VfwmsacVf => self.vf_widen_mac(di, s, false, true),
            I::VfwnmsacVv | I::VfwnmsacVf => self.vf_widen_mac(di, s, true, false),

            I::VmfeqVv | I::VmfeqVf => self.vf_compare(di, s, |a, b| format.eq(a, b)),
            I::VmfneVv | I::VmfneVf => self.vf_compare(di, s, |a, b| {
                let (equal, fflags) = format.eq(a, b);
                (!equal, fflags)
            }),
            I::VmfltVv | I::VmfltVf => self.vf_compare(di, s, |a, b| format.lt(a, b)),
            I::VmfleVv | I::VmfleVf => self.vf_compare(di, s, |a, b| format.le(a, b)),
            I::VmfgtVf => self.vf_compare(di, s, |a, b| format.lt(b, a)),
            I::VmfgeVf => self.vf_compare(di, s, |a, b| format.le(b, a)),

            I::VfredusumVs | I::VfredosumVs => {
                self.vf_reduce(di, s, false, |acc, b, rm| format.add(acc, b, rm))
            }
            I::VfredminVs => self.vf_reduce(di, s, false, |acc, b, _| format.min(acc, b)),
            I::VfredmaxVs => self.vf_reduce(di, s, false, |acc, b, _| format.max(acc, b)),
            I::VfwredusumVs | I::VfwredosumVs => self.vf_reduce(di, s, true, |acc, b, rm| {
                let wide = Format::of_width(2 * s.sew).unwrap_or(Format::DOUBLE);
                let (b, convert_flags) = format.convert(b, wide, rm);
                let (sum, add_flags) = wide.add(acc, b, rm);
                (sum, convert_flags | add_flags)
            }),

            I::VfsqrtV => self.vf_unary(di, s, |a, rm| format.sqrt(a, rm)),
            I::VfclassV => self.vf_unary(di, s, |a, _| (format.classify(a), 0)),
            I::VfcvtXuFV => self.vf_convert(di, s, Kind::Float, Kind::Unsigned, 0, None),
            I::VfcvtXFV => self.vf_convert(di, s, Kind::Float, Kind::Signed, 0, None),
            I::VfcvtFXuV => self.vf_convert(di, s, Kind::Unsigned, Kind::Float, 0, None),
            I::VfcvtFXV => self.vf_convert(di, s, Kind::Signed, Kind::Float, 0, None),
            I::VfcvtRtzXuFV => {
                self.vf_convert(di, s, Kind::Float, Kind::Unsigned, 0, Some(RoundingMode::Rtz))
            }
            I::VfcvtRtzXFV => {
                self.vf_convert(di, s, Kind::Float, Kind::Signed, 0, Some(RoundingMode::Rtz))
            }
            I::VfwcvtXuFV => self.vf_convert(di, s, Kind::Float, Kind::Unsigned, 1, None),
            I::VfwcvtXFV => self.vf_convert(di, s, Kind::Float, Kind::Signed, 1, None),
            I::VfwcvtFFV => self.vf_convert(di, s, Kind::Float, Kind::Float, 1, None),
            I::VfwcvtRtzXuFV => {
                self.vf_convert(di, s, Kind::Float, Kind::Unsigned, 1, Some(RoundingMode::Rtz))
            }
            I::VfwcvtRtzXFV => {
                self.vf_convert(di, s, Kind::Float, Kind::Signed, 1, Some(RoundingMode::Rtz))
            }
            I::VfncvtXuFW => self.vf_convert(di, s, Kind::Float, Kind::Unsigned, -1, None),
            I::VfncvtXFW => self.vf_convert(di, s, Kind::Float, Kind::Signed, -1, None),
            I::VfncvtFXuW => self.vf_convert(di, s, Kind::Unsigned, Kind::Float, -1, None),
            I::VfncvtFXW => self.vf_convert(di, s, Kind::Signed, Kind::Float, -1, None),
            I::VfncvtFFW => self.vf_convert(di, s, Kind::Float, Kind::Float, -1, None),
            I::VfncvtRodFFW => self.vf_narrow_round_to_odd(di, s),
            I::VfncvtRtzXuFW => {
                self.vf_convert(di, s, Kind::Float, Kind::Unsigned, -1, Some(RoundingMode::Rtz))
            }
            I::VfncvtRtzXFW => {
                self.vf_convert(di, s, Kind::Float, Kind::Signed, -1, Some(RoundingMode::Rtz))
            }

            I::VfmvFS => {
                let value = self.vregs.element(di.reg(1), 0, s.width());
                self.write_f(di.reg(0), format, value);
                Ok(())
            }
            I::VfmvSF => {
                if s.vstart < s.vl {
                    let value = self.read_f(di.reg(1), format);
                    self.vregs.set_element(di.reg(0), 0, s.width(), value);
                }
                Ok(())
            }
            I::VfmvVF => {
                let dest = di.reg(0);
                self.check_group(di, dest, s.lmul_log2)?;
                let value = self.read_f(di.reg(1), format);
                for i in s.vstart..s.vl {
                    self.vregs.set_element(dest, i, s.width(), value);
                }
                Ok(())
            }
            I::VfmergeVfm => {
                let (dest, src) = (di.reg(0), di.reg(1));
                self.check_group(di, dest, s.lmul_log2)?;
                self.check_group(di, src, s.lmul_log2)?;
                if dest == V0 {
                    return Err(illegal(di));
                }
                let value = self.read_f(di.reg(2), format);
                for i in s.vstart..s.vl {
                    if !self.vregs.mask_bit(V0, i) {
                        let element = self.vregs.element(src, i, s.width());
                        self.vregs.set_element(dest, i, s.width(), element);
                    } else {
                        self.vregs.set_element(dest, i, s.width(), value);
                    }
                }
                Ok(())
            }
            I::Vfslide1upVf => {
                let value = self.read_f(di.reg(2), format);
                self.v_slide1_up(di, s, value)
            }
            I::Vfslide1downVf => {
                let value = self.read_f(di.reg(2), format);
                self.v_slide1_down(di, s, value)
            }
            id => unreachable!("{id} is not a vector floating-point instruction"),
        }
    }

    /// Floating-point format of elements `bits` wide, if the hart supports it.
    fn element_format(&self, di: &DecodedInstruction, bits: u32) -> Result<Format, Exception> {
        match Format::of_width(bits) {
            Some(Format::HALF) if !self.config.extensions.zfh => Err(illegal(di)),
            Some(format) => Ok(format),
            None => Err(illegal(di)),
        }
    }

    fn dynamic_rounding_mode(&self, di: &DecodedInstruction) -> Result<RoundingMode, Exception> {
        RoundingMode::from_u3(self.fcsr.frm).ok_or_else(|| illegal(di))
    }

    /// Second source of a `.vv`/`.vf` form: a vector group or the unboxed scalar `f[rs1]`.
    fn fp_source(
        &self,
        di: &DecodedInstruction,
        index: usize,
        bits: u32,
        lmul_log2: i32,
    ) -> Result<Source, Exception> {
        if di.descriptor().operand(index).map(|operand| operand.kind) == Some(OperandType::FpReg) {
            let format = self.element_format(di, bits)?;
            Ok(Source::Scalar(self.read_f(di.reg(index), format)))
        } else {
            self.source(di, index, bits, lmul_log2)
        }
    }

    fn vf_binary<F>(&mut self, di: &DecodedInstruction, s: Shape, mut op: F) -> ExecutionResult
    where
        F: FnMut(u64, u64, RoundingMode) -> (u64, u8),
    {
        let rm = self.dynamic_rounding_mode(di)?;
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src2, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let src1 = self.fp_source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        let mut accrued = 0;
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let a = self.vregs.element(src2, i, width);
            let b = self.read_source(src1, i, width);
            let (value, fflags) = op(a, b, rm);
            accrued |= fflags;
            self.vregs.set_element(dest, i, width, value);
        }
        self.accrue(accrued);
        Ok(())
    }

    /// Fused multiply-add family. `op` receives `vd[i]`, the `vs1`/`f[rs1]` operand, `vs2[i]`,
    /// the sign mask used for negation and the rounding mode.
    fn vf_mac<F>(&mut self, di: &DecodedInstruction, s: Shape, mut op: F) -> ExecutionResult
    where
        F: FnMut(u64, u64, u64, u64, RoundingMode) -> (u64, u8),
    {
        let rm = self.dynamic_rounding_mode(di)?;
        let (dest, src2) = (di.reg(0), di.reg(2));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src2, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let src1 = self.fp_source(di, 1, s.sew, s.lmul_log2)?;
        let width = s.width();
        let negate = 1u64 << (s.sew - 1);
        let mut accrued = 0;
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let d = self.vregs.element(dest, i, width);
            let a = self.read_source(src1, i, width);
            let b = self.vregs.element(src2, i, width);
            let (value, fflags) = op(d, a, b, negate, rm);
            accrued |= fflags;
            self.vregs.set_element(dest, i, width, value);
        }
        self.accrue(accrued);
        Ok(())
    }

    /// Widening binary arithmetic: both sources are widened exactly, then `op` runs in the wide
    /// format. `vs2` is already wide when `wide_source`.
    fn vf_widen<F>(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        wide_source: bool,
        mut op: F,
    ) -> ExecutionResult
    where
        F: FnMut(Format, u64, u64, RoundingMode) -> (u64, u8),
    {
        let rm = self.dynamic_rounding_mode(di)?;
        let narrow = self.element_format(di, s.sew)?;
        let (wide_bits, wide_lmul) = self.widened(di, s, true)?;
        let wide = self.element_format(di, wide_bits)?;
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, wide_lmul)?;
        self.check_group(di, src2, if wide_source { wide_lmul } else { s.lmul_log2 })?;
        self.check_mask_overlap(di, dest)?;
        let src1 = self.fp_source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        let mut accrued = 0;
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let a = if wide_source {
                self.vregs.element(src2, i, 2 * width)
            } else {
                let (a, fflags) = narrow.convert(self.vregs.element(src2, i, width), wide, rm);
                accrued |= fflags;
                a
            };
            let (b, fflags) = narrow.convert(self.read_source(src1, i, width), wide, rm);
            let (value, op_flags) = op(wide, a, b, rm);
            accrued |= fflags | op_flags;
            self.vregs.set_element(dest, i, 2 * width, value);
        }
        self.accrue(accrued);
        Ok(())
    }

    /// `vfwmacc` and relatives: `vd = ±(a * b) ± vd` in the wide format.
    fn vf_widen_mac(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        negate_product: bool,
        negate_addend: bool,
    ) -> ExecutionResult {
        let rm = self.dynamic_rounding_mode(di)?;
        let narrow = self.element_format(di, s.sew)?;
        let (wide_bits, wide_lmul) = self.widened(di, s, true)?;
        let wide = self.element_format(di, wide_bits)?;
        let (dest, src2) = (di.reg(0), di.reg(2));
        self.check_group(di, dest, wide_lmul)?;
        self.check_group(di, src2, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let src1 = self.fp_source(di, 1, s.sew, s.lmul_log2)?;
        let width = s.width();
        let sign = wide.sign_mask();
        let mut accrued = 0;
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let (a, a_flags) = narrow.convert(self.read_source(src1, i, width), wide, rm);
            let (b, b_flags) = narrow.convert(self.vregs.element(src2, i, width), wide, rm);
            let mut d = self.vregs.element(dest, i, 2 * width);
            let a = if negate_product { a ^ sign } else { a };
            if negate_addend {
                d ^= sign;
            }
            let (value, fflags) = wide.fma(a, b, d, rm);
            accrued |= a_flags | b_flags | fflags;
            self.vregs.set_element(dest, i, 2 * width, value);
        }
        self.accrue(accrued);
        Ok(())
    }

    fn vf_compare<F>(&mut self, di: &DecodedInstruction, s: Shape, op: F) -> ExecutionResult
    where
        F: Fn(u64, u64) -> (bool, u8),
    {
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, src2, s.lmul_log2)?;
        let src1 = self.fp_source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        let mut accrued = 0;
        let mut out = Vec::with_capacity(s.vl);
        for i in s.vstart..s.vl {
            if self.is_active(di, i) {
                let a = self.vregs.element(src2, i, width);
                let b = self.read_source(src1, i, width);
                let (bit, fflags) = op(a, b);
                accrued |= fflags;
                out.push((i, bit));
            }
        }
        for (i, bit) in out {
            self.vregs.set_mask_bit(dest, i, bit);
        }
        self.accrue(accrued);
        Ok(())
    }

    /// Reductions in element order. The accumulator is twice the element width when `wide`.
    fn vf_reduce<F>(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        wide: bool,
        op: F,
    ) -> ExecutionResult
    where
        F: Fn(u64, u64, RoundingMode) -> (u64, u8),
    {
        if s.vstart != 0 {
            return Err(illegal(di));
        }
        let rm = self.dynamic_rounding_mode(di)?;
        let (acc_bits, _) = self.widened(di, s, wide)?;
        self.element_format(di, acc_bits)?;
        let (dest, src2, src1) = (di.reg(0), di.reg(1), di.reg(2));
        self.check_group(di, src2, s.lmul_log2)?;
        if s.vl == 0 {
            return Ok(());
        }
        let acc_width = acc_bits as usize / 8;
        let mut acc = self.vregs.element(src1, 0, acc_width);
        let mut accrued = 0;
        for i in 0..s.vl {
            if self.is_active(di, i) {
                let (value, fflags) = op(acc, self.vregs.element(src2, i, s.width()), rm);
                acc = value;
                accrued |= fflags;
            }
        }
        self.vregs.set_element(dest, 0, acc_width, acc);
        self.accrue(accrued);
        Ok(())
    }

    fn vf_unary<F>(&mut self, di: &DecodedInstruction, s: Shape, op: F) -> ExecutionResult
    where
        F: Fn(u64, RoundingMode) -> (u64, u8),
    {
        let rm = self.dynamic_rounding_mode(di)?;
        let (dest, src) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let mut accrued = 0;
        for i in s.vstart..s.vl {
            if self.is_active(di, i) {
                let (value, fflags) = op(self.vregs.element(src, i, s.width()), rm);
                accrued |= fflags;
                self.vregs.set_element(dest, i, s.width(), value & mask(s.sew));
            }
        }
        self.accrue(accrued);
        Ok(())
    }

    /// Single-width (`scale = 0`), widening (`1`) and narrowing (`-1`) conversions.
    fn vf_convert(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        from: Kind,
        to: Kind,
        scale: i32,
        static_rm: Option<RoundingMode>,
    ) -> ExecutionResult {
        let rm = match static_rm {
            Some(rm) => rm,
            None => self.dynamic_rounding_mode(di)?,
        };
        let (_, wide_lmul) = self.widened(di, s, scale != 0)?;
        let (src_bits, src_lmul, dest_bits, dest_lmul) = match scale {
            0 => (s.sew, s.lmul_log2, s.sew, s.lmul_log2),
            1 => (s.sew, s.lmul_log2, 2 * s.sew, wide_lmul),
            _ => (2 * s.sew, wide_lmul, s.sew, s.lmul_log2),
        };
        let src_format = match from {
            Kind::Float => Some(self.element_format(di, src_bits)?),
            _ => None,
        };
        let dest_format = match to {
            Kind::Float => Some(self.element_format(di, dest_bits)?),
            _ => None,
        };
        let (dest, src) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, dest_lmul)?;
        self.check_group(di, src, src_lmul)?;
        self.check_mask_overlap(di, dest)?;
        let (src_width, dest_width) = (src_bits as usize / 8, dest_bits as usize / 8);
        let mut accrued = 0;
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let value = self.vregs.element(src, i, src_width);
            let (result, fflags) = match (src_format, dest_format) {
                (Some(source), Some(target)) => source.convert(value, target, rm),
                (Some(source), None) => {
                    float_to_int(source, value, dest_bits, to == Kind::Signed, rm)
                }
                (None, Some(target)) => {
                    int_to_float(target, value, src_bits, from == Kind::Signed, rm)
                }
                (None, None) => panic!("integer to integer conversion"),
            };
            accrued |= fflags;
            self.vregs.set_element(dest, i, dest_width, result & mask(dest_bits));
        }
        self.accrue(accrued);
        Ok(())
    }

    /// `vfncvt.rod.f.f.w`
    fn vf_narrow_round_to_odd(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        let (wide_bits, wide_lmul) = self.widened(di, s, true)?;
        let narrow = self.element_format(di, s.sew)?;
        let wide = self.element_format(di, wide_bits)?;
        let (dest, src) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src, wide_lmul)?;
        self.check_mask_overlap(di, dest)?;
        let mut accrued = 0;
        for i in s.vstart..s.vl {
            if self.is_active(di, i) {
                let value = self.vregs.element(src, i, 2 * s.width());
                let (result, fflags) = convert_round_to_odd(wide, value, narrow);
                accrued |= fflags;
                self.vregs.set_element(dest, i, s.width(), result);
            }
        }
        self.accrue(accrued);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{hart, retire_n, x};
    use super::super::vector::test_util::*;
    use crate::csr;
    use crate::float::flags;
    use crate::hart::Hart;
    use crate::memory::Memory;
    use crate::registers::Specifier;

    const ONE: u64 = 0x3f80_0000;
    const TWO: u64 = 0x4000_0000;
    const THREE: u64 = 0x4040_0000;

    fn r(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    fn fill(hart: &mut Hart<Memory>, register: u8, width: usize, values: &[u64]) {
        for (i, value) in values.iter().enumerate() {
            hart.vector_registers_mut().set_element(r(register), i, width, *value);
        }
    }

    fn element(hart: &Hart<Memory>, register: u8, index: usize, width: usize) -> u64 {
        hart.vector_registers().element(r(register), index, width)
    }

    #[test]
    fn vector_add_and_scalar_multiply_accumulate() {
        // vfadd.vv v1, v2, v3; vfmacc.vf v1, f1, v2
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            opv(0x00, false, 2, 3, OPFVV, 1),
            opv(0x2c, false, 2, 1, OPFVF, 1),
        ]);
        hart.registers_mut().set_x(x(1), 2);
        hart.fp_registers_mut().set_single(r(1), TWO as u32);
        fill(&mut hart, 2, 4, &[ONE, TWO]);
        fill(&mut hart, 3, 4, &[TWO, ONE]);
        retire_n(&mut hart, 3);
        // (1 + 2) + 2 * 1 = 5, (2 + 1) + 2 * 2 = 7
        assert_eq!(element(&hart, 1, 0, 4), 0x40a0_0000);
        assert_eq!(element(&hart, 1, 1, 4), 0x40e0_0000);
        assert_eq!(element(&hart, 3, 0, 4), TWO);
    }

    #[test]
    fn compare_against_scalar() {
        // vmflt.vf v4, v2, f1
        let mut hart = hart(&[vsetvli(0, 1, vtype(32, 0)), opv(0x1b, false, 2, 1, OPFVF, 4)]);
        hart.registers_mut().set_x(x(1), 3);
        hart.fp_registers_mut().set_single(r(1), TWO as u32);
        fill(&mut hart, 2, 4, &[ONE, THREE, 0x7fc0_0000]);
        retire_n(&mut hart, 2);
        let vregs = hart.vector_registers();
        let bits: Vec<bool> = (0..3).map(|i| vregs.mask_bit(r(4), i)).collect();
        assert_eq!(bits, [true, false, false]);
        // flt on a quiet NaN is an invalid operation
        assert_eq!(hart.read_csr(csr::FFLAGS), Ok(flags::NV as u64));
    }

    #[test]
    fn widening_conversion_and_ordered_reduction() {
        // vfwcvt.f.f.v v4, v2; vfredosum.vs v6, v2, v3
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            opv(0x12, false, 2, 0x0c, OPFVV, 4),
            opv(0x03, false, 2, 3, OPFVV, 6),
        ]);
        hart.registers_mut().set_x(x(1), 2);
        fill(&mut hart, 2, 4, &[ONE, TWO]);
        fill(&mut hart, 3, 4, &[THREE]);
        retire_n(&mut hart, 3);
        assert_eq!(element(&hart, 4, 0, 8), 0x3ff0_0000_0000_0000);
        assert_eq!(element(&hart, 4, 1, 8), 0x4000_0000_0000_0000);
        // 3 + 1 + 2
        assert_eq!(element(&hart, 6, 0, 4), 0x40c0_0000);
    }

    #[test]
    fn integer_conversions_saturate() {
        // vfcvt.rtz.x.f.v v1, v2; vfncvt.xu.f.w v3, v4 at SEW = 16
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            opv(0x12, false, 2, 0x07, OPFVV, 1),
            vsetvli(0, 1, vtype(16, 0)),
            opv(0x12, false, 4, 0x10, OPFVV, 3),
        ]);
        hart.registers_mut().set_x(x(1), 2);
        // -2.5, 1e10
        fill(&mut hart, 2, 4, &[0xc020_0000, 0x5015_02f9]);
        // 3.0, 100000.0
        fill(&mut hart, 4, 4, &[THREE, 0x47c3_5000]);
        retire_n(&mut hart, 4);
        assert_eq!(element(&hart, 1, 0, 4), (-2i32) as u32 as u64);
        assert_eq!(element(&hart, 1, 1, 4), 0x7fff_ffff);
        assert_eq!(element(&hart, 3, 0, 2), 3);
        assert_eq!(element(&hart, 3, 1, 2), 0xffff);
    }

    #[test]
    fn scalar_moves_box_and_unbox() {
        // vfmv.s.f v1, f1; vfmv.f.s f2, v1
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            opv(0x10, false, 0, 1, OPFVF, 1),
            opv(0x10, false, 1, 0, OPFVV, 2),
        ]);
        hart.registers_mut().set_x(x(1), 1);
        hart.fp_registers_mut().set_single(r(1), THREE as u32);
        retire_n(&mut hart, 3);
        assert_eq!(element(&hart, 1, 0, 4), THREE);
        assert_eq!(hart.fp_registers().raw(r(2)), 0xffff_ffff_4040_0000);
    }
}
