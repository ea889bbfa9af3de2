//! The V extension: configuration, integer and fixed-point arithmetic, mask and permutation
//! instructions. Floating-point forms live in `vector_fp`, memory forms in `vector_mem`.
//!
//! Elements are held zero-extended in `u64` values and sign-extended on demand. Inactive and tail
//! elements are always left undisturbed, which every `vta`/`vma` setting allows.

use log::trace;

use super::{illegal, ExecutionResult};
use crate::catalog::{InstructionId, OperandType};
use crate::cause::Exception;
use crate::decode::DecodedInstruction;
use crate::hart::{ExtensionContextStatus, Hart};
use crate::memory::Bus;
use crate::registers::Specifier;

/// The mask register.
pub(super) const V0: Specifier = Specifier::X0;

/// The vector configuration an instruction executes under.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct Shape {
    /// Selected element width in bits.
    pub sew: u32,
    pub lmul_log2: i32,
    pub vl: usize,
    pub vstart: usize,
    pub vlmax: usize,
}

impl Shape {
    /// Selected element width in bytes.
    pub fn width(&self) -> usize {
        self.sew as usize / 8
    }
}

/// Second source operand of an arithmetic instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum Source {
    Vector(Specifier),
    /// A scalar register or immediate, already truncated to the element width.
    Scalar(u64),
}

/// All-ones value of `bits` bits.
pub(super) fn mask(bits: u32) -> u64 {
    u64::MAX >> (64 - bits)
}

/// Sign-extends the low `bits` bits of `value`.
pub(super) fn sext(value: u64, bits: u32) -> i64 {
    ((value << (64 - bits)) as i64) >> (64 - bits)
}

/// `value >> shift`, rounded according to the fixed-point rounding mode `vxrm`.
///
/// > The rounding mode is applied to the bits shifted out: rnu adds the most significant discarded
/// > bit, rne rounds to even, rdn truncates and rod jams the discarded bits into the lsb.
pub(super) fn round_shift(value: i128, shift: u32, vxrm: u8) -> i128 {
    if shift == 0 {
        return value;
    }
    let bits = value as u128;
    let half = (bits >> (shift - 1)) & 1;
    let below_half = shift > 1 && bits & ((1u128 << (shift - 1)) - 1) != 0;
    let discarded = bits & ((1u128 << shift) - 1) != 0;
    let lsb = (bits >> shift) & 1;
    let increment = match vxrm {
        0 => half,
        1 => half & (below_half as u128 | lsb),
        2 => 0,
        _ => (lsb == 0 && discarded) as u128,
    };
    (value >> shift) + increment as i128
}

/// Clamps `value` to a signed `bits`-bit integer, reporting whether it saturated.
fn saturate_signed(value: i128, bits: u32) -> (u64, bool) {
    let max = (1i128 << (bits - 1)) - 1;
    let min = -(1i128 << (bits - 1));
    let clamped = value.clamp(min, max);
    (clamped as u64 & mask(bits), clamped != value)
}

fn saturate_unsigned(value: i128, bits: u32) -> (u64, bool) {
    let max = mask(bits) as i128;
    let clamped = value.clamp(0, max);
    (clamped as u64, clamped != value)
}

fn divu(a: u64, b: u64, bits: u32) -> u64 {
    if b == 0 {
        mask(bits)
    } else {
        a / b
    }
}

fn remu(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        a % b
    }
}

fn div(a: u64, b: u64, bits: u32) -> u64 {
    let (a, b) = (sext(a, bits), sext(b, bits));
    if b == 0 {
        u64::MAX
    } else if a == sext(1 << (bits - 1), bits) && b == -1 {
        a as u64
    } else {
        (a / b) as u64
    }
}

fn rem(a: u64, b: u64, bits: u32) -> u64 {
    let (a, b) = (sext(a, bits), sext(b, bits));
    if b == 0 {
        a as u64
    } else if b == -1 {
        0
    } else {
        (a % b) as u64
    }
}

/// Part of the vector engine an instruction belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum VectorUnit {
    /// `vsetvli`, `vsetivli` and `vsetvl`.
    Config,
    /// `vmv<nr>r.v`.
    WholeMove,
    /// Whole-register loads and stores.
    WholeMemory,
    /// Element loads and stores, including mask and segment accesses.
    Memory,
    Float,
    Integer,
}

impl<B: Bus> Hart<B> {
    pub(super) fn execute_vector(
        &mut self,
        di: &DecodedInstruction,
        unit: VectorUnit,
    ) -> ExecutionResult {
        if self.status.vs() == ExtensionContextStatus::Off {
            return Err(illegal(di));
        }
        // Configuration and whole-register instructions do not depend on vtype.
        let needs_vtype = matches!(
            unit,
            VectorUnit::Memory | VectorUnit::Float | VectorUnit::Integer
        );
        if needs_vtype && self.vector.vill {
            return Err(illegal(di));
        }
        match unit {
            VectorUnit::Config => self.vset(di)?,
            VectorUnit::WholeMove => self.vmv_whole(di)?,
            VectorUnit::WholeMemory | VectorUnit::Memory => self.execute_vector_memory(di)?,
            VectorUnit::Float => {
                if self.status.fs() == ExtensionContextStatus::Off {
                    return Err(illegal(di));
                }
                self.execute_vector_fp(di)?
            }
            VectorUnit::Integer => self.execute_vector_integer(di)?,
        }
        self.vector.vstart = 0;
        self.status.set_vs(ExtensionContextStatus::Dirty);
        Ok(())
    }

    /// The active configuration.
    pub(super) fn shape(&self) -> Shape {
        let sew = self.vector.sew();
        let lmul_log2 = self.vector.lmul_log2();
        Shape {
            sew,
            lmul_log2,
            vl: self.vector.vl as usize,
            vstart: self.vector.vstart as usize,
            vlmax: self.vlmax(sew, lmul_log2),
        }
    }

    /// > VLMAX = LMUL*VLEN/SEW
    pub(super) fn vlmax(&self, sew: u32, lmul_log2: i32) -> usize {
        let vlen = self.vregs.vlenb() * 8;
        if lmul_log2 >= 0 {
            (vlen << lmul_log2) / sew as usize
        } else {
            (vlen >> -lmul_log2) / sew as usize
        }
    }

    /// Checks that `register` can start a group of `2^emul_log2` registers.
    pub(super) fn check_group(
        &self,
        di: &DecodedInstruction,
        register: Specifier,
        emul_log2: i32,
    ) -> ExecutionResult {
        if !(-3..=3).contains(&emul_log2) {
            return Err(illegal(di));
        }
        if emul_log2 > 0 && u8::from(register) % (1 << emul_log2) != 0 {
            return Err(illegal(di));
        }
        Ok(())
    }

    /// > The destination vector register group for a masked vector instruction cannot overlap
    /// > the source mask register (v0), unless the destination vector register is being written
    /// > with a mask value.
    pub(super) fn check_mask_overlap(
        &self,
        di: &DecodedInstruction,
        dest: Specifier,
    ) -> ExecutionResult {
        if di.masked() && dest == V0 {
            Err(illegal(di))
        } else {
            Ok(())
        }
    }

    pub(super) fn is_active(&self, di: &DecodedInstruction, index: usize) -> bool {
        !di.masked() || self.vregs.mask_bit(V0, index)
    }

    /// Operand `index` of `di` as an arithmetic source with elements `bits` wide occupying
    /// groups of `2^emul_log2` registers.
    pub(super) fn source(
        &self,
        di: &DecodedInstruction,
        index: usize,
        bits: u32,
        emul_log2: i32,
    ) -> Result<Source, Exception> {
        let kind = di.descriptor().operand(index).map(|operand| operand.kind);
        match kind {
            Some(OperandType::VecReg) => {
                let register = di.reg(index);
                self.check_group(di, register, emul_log2)?;
                Ok(Source::Vector(register))
            }
            Some(OperandType::IntReg) => {
                let value = self.xlen.canonical(self.registers.x(di.reg(index)));
                Ok(Source::Scalar(value & mask(bits)))
            }
            Some(OperandType::Immediate) => {
                Ok(Source::Scalar(di.imm(index) as i64 as u64 & mask(bits)))
            }
            Some(OperandType::FpReg | OperandType::CsReg) | None => Err(illegal(di)),
        }
    }

    pub(super) fn read_source(&self, source: Source, index: usize, width: usize) -> u64 {
        match source {
            Source::Vector(register) => self.vregs.element(register, index, width),
            Source::Scalar(value) => value,
        }
    }

    /// `vsetvli`, `vsetivli` and `vsetvl`.
    ///
    /// > The vsetvl{i} instructions set the vtype and vl CSRs based on their arguments, and write
    /// > the new value of vl into rd.
    fn vset(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        use InstructionId as I;

        let (dest, src) = (di.reg(0), di.reg(1));
        let vtype = match di.id() {
            I::Vsetvl => self.registers.x(di.reg(2)) & self.xlen.mask(),
            _ => di.op2() as u64,
        };
        let sew_field = (vtype >> 3) & 0b111;
        let vlmul = vtype & 0b111;
        let reserved = vtype >> 8 != 0;
        let lmul_log2 = if vlmul >= 4 { vlmul as i32 - 8 } else { vlmul as i32 };
        let sew = 8u32 << sew_field.min(3);
        let elen = self.config.elen;
        let vill = reserved
            || sew_field > 3
            || vlmul == 4
            || sew > elen
            || (lmul_log2 < 0 && sew > elen >> -lmul_log2);

        if vill {
            trace!("vtype {vtype:#x} is not supported");
            self.vector.vill = true;
            self.vector.vtype = 0;
            self.vector.vl = 0;
        } else {
            let vlmax = self.vlmax(sew, lmul_log2) as u64;
            let avl = match di.id() {
                I::Vsetivli => di.op1() as u64,
                _ if src != Specifier::X0 => self.registers.x(src) & self.xlen.mask(),
                _ if dest != Specifier::X0 => u64::MAX,
                _ => self.vector.vl,
            };
            self.vector.vill = false;
            self.vector.vtype = vtype;
            self.vector.vl = avl.min(vlmax);
        }
        self.write_x(dest, self.vector.vl);
        Ok(())
    }

    /// `vmv<nr>r.v`
    fn vmv_whole(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        use InstructionId as I;

        let count = match di.id() {
            I::Vmv1rV => 1,
            I::Vmv2rV => 2,
            I::Vmv4rV => 4,
            I::Vmv8rV => 8,
            id => unreachable!("{id} is not a whole-register move"),
        };
        let (dest, src) = (di.reg(0), di.reg(1));
        let log2 = u32::trailing_zeros(count) as i32;
        self.check_group(di, dest, log2)?;
        self.check_group(di, src, log2)?;
        let bytes = self.vregs.registers(src, count as usize).to_vec();
        self.vregs.registers_mut(dest, count as usize).copy_from_slice(&bytes);
        Ok(())
    }

    fn execute_vector_integer(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        use InstructionId as I;

        let s = self.shape();
        let sew = s.sew;
        let vxrm = self.vector.vxrm;
        let mut sat = false;
        let result = match di.id() {
            I::VaddVv | I::VaddVx | I::VaddVi => self.v_binary(di, s, |a, b| a.wrapping_add(b)),
            I::VsubVv | I::VsubVx => self.v_binary(di, s, |a, b| a.wrapping_sub(b)),
            I::VrsubVx | I::VrsubVi => self.v_binary(di, s, |a, b| b.wrapping_sub(a)),
            I::VandVv | I::VandVx | I::VandVi => self.v_binary(di, s, |a, b| a & b),
            I::VorVv | I::VorVx | I::VorVi => self.v_binary(di, s, |a, b| a | b),
            I::VxorVv | I::VxorVx | I::VxorVi => self.v_binary(di, s, |a, b| a ^ b),
            I::VsllVv | I::VsllVx | I::VsllVi => {
                self.v_binary(di, s, |a, b| a << (b & (sew as u64 - 1)))
            }
            I::VsrlVv | I::VsrlVx | I::VsrlVi => {
                self.v_binary(di, s, |a, b| a >> (b & (sew as u64 - 1)))
            }
            I::VsraVv | I::VsraVx | I::VsraVi => {
                self.v_binary(di, s, |a, b| (sext(a, sew) >> (b & (sew as u64 - 1))) as u64)
            }
            I::VminuVv | I::VminuVx => self.v_binary(di, s, u64::min),
            I::VmaxuVv | I::VmaxuVx => self.v_binary(di, s, u64::max),
            I::VminVv | I::VminVx => {
                self.v_binary(di, s, |a, b| sext(a, sew).min(sext(b, sew)) as u64)
            }
            I::VmaxVv | I::VmaxVx => {
                self.v_binary(di, s, |a, b| sext(a, sew).max(sext(b, sew)) as u64)
            }
            I::VmulVv | I::VmulVx => self.v_binary(di, s, u64::wrapping_mul),
            I::VmulhVv | I::VmulhVx => self.v_binary(di, s, |a, b| {
                ((sext(a, sew) as i128 * sext(b, sew) as i128) >> sew) as u64
            }),
            I::VmulhuVv | I::VmulhuVx => {
                self.v_binary(di, s, |a, b| ((a as u128 * b as u128) >> sew) as u64)
            }
            I::VmulhsuVv | I::VmulhsuVx => {
                self.v_binary(di, s, |a, b| ((sext(a, sew) as i128 * b as i128) >> sew) as u64)
            }
            I::VdivuVv | I::VdivuVx => self.v_binary(di, s, |a, b| divu(a, b, sew)),
            I::VdivVv | I::VdivVx => self.v_binary(di, s, |a, b| div(a, b, sew)),
            I::VremuVv | I::VremuVx => self.v_binary(di, s, remu),
            I::VremVv | I::VremVx => self.v_binary(di, s, |a, b| rem(a, b, sew)),

            I::VsadduVv | I::VsadduVx | I::VsadduVi => self.v_binary(di, s, |a, b| {
                let (value, saturated) = saturate_unsigned(a as i128 + b as i128, sew);
                sat |= saturated;
                value
            }),
            I::VsaddVv | I::VsaddVx | I::VsaddVi => self.v_binary(di, s, |a, b| {
                let sum = sext(a, sew) as i128 + sext(b, sew) as i128;
                let (value, saturated) = saturate_signed(sum, sew);
                sat |= saturated;
                value
            }),
            I::VssubuVv | I::VssubuVx => self.v_binary(di, s, |a, b| {
                let (value, saturated) = saturate_unsigned(a as i128 - b as i128, sew);
                sat |= saturated;
                value
            }),
            I::VssubVv | I::VssubVx => self.v_binary(di, s, |a, b| {
                let difference = sext(a, sew) as i128 - sext(b, sew) as i128;
                let (value, saturated) = saturate_signed(difference, sew);
                sat |= saturated;
                value
            }),
            I::VaadduVv | I::VaadduVx => {
                self.v_binary(di, s, |a, b| round_shift(a as i128 + b as i128, 1, vxrm) as u64)
            }
            I::VaaddVv | I::VaaddVx => self.v_binary(di, s, |a, b| {
                round_shift(sext(a, sew) as i128 + sext(b, sew) as i128, 1, vxrm) as u64
            }),
            I::VasubuVv | I::VasubuVx => {
                self.v_binary(di, s, |a, b| round_shift(a as i128 - b as i128, 1, vxrm) as u64)
            }
            I::VasubVv | I::VasubVx => self.v_binary(di, s, |a, b| {
                round_shift(sext(a, sew) as i128 - sext(b, sew) as i128, 1, vxrm) as u64
            }),
            // > vsmul: signed saturating and rounding fractional multiply
            I::VsmulVv | I::VsmulVx => self.v_binary(di, s, |a, b| {
                let product = sext(a, sew) as i128 * sext(b, sew) as i128;
                let (value, saturated) = saturate_signed(round_shift(product, sew - 1, vxrm), sew);
                sat |= saturated;
                value
            }),
            I::VssrlVv | I::VssrlVx | I::VssrlVi => self.v_binary(di, s, |a, b| {
                round_shift(a as i128, (b & (sew as u64 - 1)) as u32, vxrm) as u64
            }),
            I::VssraVv | I::VssraVx | I::VssraVi => self.v_binary(di, s, |a, b| {
                round_shift(sext(a, sew) as i128, (b & (sew as u64 - 1)) as u32, vxrm) as u64
            }),

            I::VmaccVv | I::VmaccVx => {
                self.v_mac(di, s, false, |d, a, b| a.wrapping_mul(b).wrapping_add(d))
            }
            I::VnmsacVv | I::VnmsacVx => {
                self.v_mac(di, s, false, |d, a, b| d.wrapping_sub(a.wrapping_mul(b)))
            }
            I::VmaddVv | I::VmaddVx => {
                self.v_mac(di, s, false, |d, a, b| a.wrapping_mul(d).wrapping_add(b))
            }
            I::VnmsubVv | I::VnmsubVx => {
                self.v_mac(di, s, false, |d, a, b| b.wrapping_sub(a.wrapping_mul(d)))
            }

            I::VadcVvm | I::VadcVxm | I::VadcVim => self.v_carry(di, s, |a, b, c| {
                a.wrapping_add(b).wrapping_add(c as u64)
            }),
            I::VsbcVvm | I::VsbcVxm => self.v_carry(di, s, |a, b, c| {
                a.wrapping_sub(b).wrapping_sub(c as u64)
            }),
            I::VmadcVvm | I::VmadcVxm | I::VmadcVim => self.v_carry_out(di, s, |a, b, c| {
                a as u128 + b as u128 + c as u128 > mask(sew) as u128
            }),
            I::VmsbcVvm | I::VmsbcVxm => {
                self.v_carry_out(di, s, |a, b, c| (a as u128) < b as u128 + c as u128)
            }
            I::VmergeVvm | I::VmergeVxm | I::VmergeVim => self.v_merge(di, s),
            I::VmvVV | I::VmvVX | I::VmvVI => self.v_move(di, s),

            I::VmseqVv | I::VmseqVx | I::VmseqVi => self.v_compare(di, s, |a, b| a == b),
            I::VmsneVv | I::VmsneVx | I::VmsneVi => self.v_compare(di, s, |a, b| a != b),
            I::VmsltuVv | I::VmsltuVx => self.v_compare(di, s, |a, b| a < b),
            I::VmsltVv | I::VmsltVx => self.v_compare(di, s, |a, b| sext(a, sew) < sext(b, sew)),
            I::VmsleuVv | I::VmsleuVx | I::VmsleuVi => self.v_compare(di, s, |a, b| a <= b),
            I::VmsleVv | I::VmsleVx | I::VmsleVi => {
                self.v_compare(di, s, |a, b| sext(a, sew) <= sext(b, sew))
            }
            I::VmsgtuVx | I::VmsgtuVi => self.v_compare(di, s, |a, b| a > b),
            I::VmsgtVx | I::VmsgtVi => self.v_compare(di, s, |a, b| sext(a, sew) > sext(b, sew)),

            I::VwadduVv | I::VwadduVx => self.v_widen(di, s, false, |a, b| a + b),
            I::VwadduWv | I::VwadduWx => self.v_widen(di, s, true, |a, b| a.wrapping_add(b)),
            I::VwsubuVv | I::VwsubuVx => self.v_widen(di, s, false, u64::wrapping_sub),
            I::VwsubuWv | I::VwsubuWx => self.v_widen(di, s, true, u64::wrapping_sub),
            I::VwaddVv | I::VwaddVx => {
                self.v_widen(di, s, false, |a, b| (sext(a, sew) + sext(b, sew)) as u64)
            }
            I::VwaddWv | I::VwaddWx => self.v_widen(di, s, true, |a, b| {
                sext(a, 2 * sew).wrapping_add(sext(b, sew)) as u64
            }),
            I::VwsubVv | I::VwsubVx => {
                self.v_widen(di, s, false, |a, b| (sext(a, sew) - sext(b, sew)) as u64)
            }
            I::VwsubWv | I::VwsubWx => self.v_widen(di, s, true, |a, b| {
                sext(a, 2 * sew).wrapping_sub(sext(b, sew)) as u64
            }),
            I::VwmuluVv | I::VwmuluVx => self.v_widen(di, s, false, |a, b| a.wrapping_mul(b)),
            I::VwmulVv | I::VwmulVx => {
                self.v_widen(di, s, false, |a, b| sext(a, sew).wrapping_mul(sext(b, sew)) as u64)
            }
            I::VwmulsuVv | I::VwmulsuVx => {
                self.v_widen(di, s, false, |a, b| sext(a, sew).wrapping_mul(b as i64) as u64)
            }
            I::VwmaccuVv | I::VwmaccuVx => {
                self.v_mac(di, s, true, |d, a, b| d.wrapping_add(a.wrapping_mul(b)))
            }
            I::VwmaccVv | I::VwmaccVx => self.v_mac(di, s, true, |d, a, b| {
                d.wrapping_add(sext(a, sew).wrapping_mul(sext(b, sew)) as u64)
            }),
            I::VwmaccsuVv | I::VwmaccsuVx => self.v_mac(di, s, true, |d, a, b| {
                d.wrapping_add(sext(a, sew).wrapping_mul(b as i64) as u64)
            }),
            I::VwmaccusVx => self.v_mac(di, s, true, |d, a, b| {
                d.wrapping_add((a as i64).wrapping_mul(sext(b, sew)) as u64)
            }),

            I::VnsrlWv | I::VnsrlWx | I::VnsrlWi => {
                self.v_narrow(di, s, |a, b| a >> (b & (2 * sew as u64 - 1)))
            }
            I::VnsraWv | I::VnsraWx | I::VnsraWi => {
                self.v_narrow(di, s, |a, b| (sext(a, 2 * sew) >> (b & (2 * sew as u64 - 1))) as u64)
            }
            I::VnclipuWv | I::VnclipuWx | I::VnclipuWi => self.v_narrow(di, s, |a, b| {
                let shifted = round_shift(a as i128, (b & (2 * sew as u64 - 1)) as u32, vxrm);
                let (value, saturated) = saturate_unsigned(shifted, sew);
                sat |= saturated;
                value
            }),
            I::VnclipWv | I::VnclipWx | I::VnclipWi => self.v_narrow(di, s, |a, b| {
                let shift = (b & (2 * sew as u64 - 1)) as u32;
                let shifted = round_shift(sext(a, 2 * sew) as i128, shift, vxrm);
                let (value, saturated) = saturate_signed(shifted, sew);
                sat |= saturated;
                value
            }),

            I::VzextVf2 => self.v_extend(di, s, 2, false),
            I::VzextVf4 => self.v_extend(di, s, 4, false),
            I::VzextVf8 => self.v_extend(di, s, 8, false),
            I::VsextVf2 => self.v_extend(di, s, 2, true),
            I::VsextVf4 => self.v_extend(di, s, 4, true),
            I::VsextVf8 => self.v_extend(di, s, 8, true),

            I::VredsumVs => self.v_reduce(di, s, false, |acc, b| acc.wrapping_add(b)),
            I::VredandVs => self.v_reduce(di, s, false, |acc, b| acc & b),
            I::VredorVs => self.v_reduce(di, s, false, |acc, b| acc | b),
            I::VredxorVs => self.v_reduce(di, s, false, |acc, b| acc ^ b),
            I::VredminuVs => self.v_reduce(di, s, false, u64::min),
            I::VredmaxuVs => self.v_reduce(di, s, false, u64::max),
            I::VredminVs => {
                self.v_reduce(di, s, false, |acc, b| sext(acc, sew).min(sext(b, sew)) as u64)
            }
            I::VredmaxVs => {
                self.v_reduce(di, s, false, |acc, b| sext(acc, sew).max(sext(b, sew)) as u64)
            }
            I::VwredsumuVs => self.v_reduce(di, s, true, |acc, b| acc.wrapping_add(b)),
            I::VwredsumVs => {
                self.v_reduce(di, s, true, |acc, b| acc.wrapping_add(sext(b, sew) as u64))
            }

            I::VmandMm => self.v_mask_logical(di, s, |a, b| a & b),
            I::VmnandMm => self.v_mask_logical(di, s, |a, b| !(a & b)),
            I::VmandnMm => self.v_mask_logical(di, s, |a, b| a & !b),
            I::VmxorMm => self.v_mask_logical(di, s, |a, b| a ^ b),
            I::VmorMm => self.v_mask_logical(di, s, |a, b| a | b),
            I::VmnorMm => self.v_mask_logical(di, s, |a, b| !(a | b)),
            I::VmornMm => self.v_mask_logical(di, s, |a, b| a | !b),
            I::VmxnorMm => self.v_mask_logical(di, s, |a, b| !(a ^ b)),
            I::VcpopM => self.vcpop(di, s),
            I::VfirstM => self.vfirst(di, s),
            I::VmsbfM | I::VmsifM | I::VmsofM => self.v_set_first(di, s),
            I::ViotaM => self.viota(di, s),
            I::VidV => self.vid(di, s),
            I::VmvXS => {
                let value = sext(self.vregs.element(di.reg(1), 0, s.width()), sew);
                self.write_x(di.reg(0), value as u64);
                Ok(())
            }
            I::VmvSX => {
                if s.vstart < s.vl {
                    let value = self.registers.x(di.reg(1)) & mask(sew);
                    self.vregs.set_element(di.reg(0), 0, s.width(), value);
                }
                Ok(())
            }

            I::VslideupVx | I::VslideupVi => self.v_slide_up(di, s),
            I::VslidedownVx | I::VslidedownVi => self.v_slide_down(di, s),
            I::Vslide1upVx => {
                let value = self.registers.x(di.reg(2)) & mask(sew);
                self.v_slide1_up(di, s, value)
            }
            I::Vslide1downVx => {
                let value = self.registers.x(di.reg(2)) & mask(sew);
                self.v_slide1_down(di, s, value)
            }
            I::VrgatherVv | I::VrgatherVx | I::VrgatherVi => self.v_gather(di, s, sew),
            I::Vrgatherei16Vv => self.v_gather(di, s, 16),
            I::VcompressVm => self.vcompress(di, s),
            id => unreachable!("{id} is not a vector integer instruction"),
        };
        if sat {
            self.vector.vxsat = true;
        }
        result
    }

    /// `vd[i] = op(vs2[i], src[i])` over the active body elements.
    fn v_binary<F>(&mut self, di: &DecodedInstruction, s: Shape, mut op: F) -> ExecutionResult
    where
        F: FnMut(u64, u64) -> u64,
    {
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src2, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let src1 = self.source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let a = self.vregs.element(src2, i, width);
            let b = self.read_source(src1, i, width);
            self.vregs.set_element(dest, i, width, op(a, b) & mask(s.sew));
        }
        Ok(())
    }

    /// Multiply-accumulate: `vd[i] = op(vd[i], src[i], vs2[i])`, where the destination is twice
    /// as wide as the sources when `wide`.
    fn v_mac<F>(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        wide: bool,
        mut op: F,
    ) -> ExecutionResult
    where
        F: FnMut(u64, u64, u64) -> u64,
    {
        let (dest_bits, dest_lmul) = self.widened(di, s, wide)?;
        let (dest, src2) = (di.reg(0), di.reg(2));
        self.check_group(di, dest, dest_lmul)?;
        self.check_group(di, src2, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let src1 = self.source(di, 1, s.sew, s.lmul_log2)?;
        let (width, dest_width) = (s.width(), dest_bits as usize / 8);
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let d = self.vregs.element(dest, i, dest_width);
            let a = self.read_source(src1, i, width);
            let b = self.vregs.element(src2, i, width);
            self.vregs.set_element(dest, i, dest_width, op(d, a, b) & mask(dest_bits));
        }
        Ok(())
    }

    /// Width and group size of a destination that is widened when `wide`.
    pub(super) fn widened(
        &self,
        di: &DecodedInstruction,
        s: Shape,
        wide: bool,
    ) -> Result<(u32, i32), Exception> {
        if !wide {
            return Ok((s.sew, s.lmul_log2));
        }
        if 2 * s.sew > self.config.elen || s.lmul_log2 >= 3 {
            return Err(illegal(di));
        }
        Ok((2 * s.sew, s.lmul_log2 + 1))
    }

    /// Widening arithmetic: `vd[i] = op(vs2[i], src[i])` at twice the element width. `vs2` is
    /// wide as well when `wide_source`.
    fn v_widen<F>(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        wide_source: bool,
        mut op: F,
    ) -> ExecutionResult
    where
        F: FnMut(u64, u64) -> u64,
    {
        let (dest_bits, dest_lmul) = self.widened(di, s, true)?;
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, dest_lmul)?;
        let (src2_width, src2_lmul) = if wide_source {
            (2 * s.width(), dest_lmul)
        } else {
            (s.width(), s.lmul_log2)
        };
        self.check_group(di, src2, src2_lmul)?;
        self.check_mask_overlap(di, dest)?;
        let src1 = self.source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let a = self.vregs.element(src2, i, src2_width);
            let b = self.read_source(src1, i, width);
            self.vregs.set_element(dest, i, 2 * width, op(a, b) & mask(dest_bits));
        }
        Ok(())
    }

    /// Narrowing: `vd[i] = op(vs2[i], src[i])` with `vs2` twice the element width.
    fn v_narrow<F>(&mut self, di: &DecodedInstruction, s: Shape, mut op: F) -> ExecutionResult
    where
        F: FnMut(u64, u64) -> u64,
    {
        let (_, wide_lmul) = self.widened(di, s, true)?;
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src2, wide_lmul)?;
        self.check_mask_overlap(di, dest)?;
        let src1 = self.source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let a = self.vregs.element(src2, i, 2 * width);
            let b = self.read_source(src1, i, width);
            self.vregs.set_element(dest, i, width, op(a, b) & mask(s.sew));
        }
        Ok(())
    }

    /// `vadc`/`vsbc`: `vd[i] = op(vs2[i], src[i], v0[i])` for every body element.
    fn v_carry<F>(&mut self, di: &DecodedInstruction, s: Shape, op: F) -> ExecutionResult
    where
        F: Fn(u64, u64, bool) -> u64,
    {
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src2, s.lmul_log2)?;
        if dest == V0 {
            return Err(illegal(di));
        }
        let src1 = self.source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        for i in s.vstart..s.vl {
            let a = self.vregs.element(src2, i, width);
            let b = self.read_source(src1, i, width);
            let carry = self.vregs.mask_bit(V0, i);
            self.vregs.set_element(dest, i, width, op(a, b, carry) & mask(s.sew));
        }
        Ok(())
    }

    /// `vmadc`/`vmsbc`: writes the carry or borrow out of every body element as a mask. The
    /// carry in is `v0[i]` for the `vm=0` encodings and zero otherwise.
    fn v_carry_out<F>(&mut self, di: &DecodedInstruction, s: Shape, op: F) -> ExecutionResult
    where
        F: Fn(u64, u64, bool) -> bool,
    {
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, src2, s.lmul_log2)?;
        let src1 = self.source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        let mut out = Vec::with_capacity(s.vl);
        for i in s.vstart..s.vl {
            let a = self.vregs.element(src2, i, width);
            let b = self.read_source(src1, i, width);
            let carry = di.masked() && self.vregs.mask_bit(V0, i);
            out.push(op(a, b, carry));
        }
        for (i, bit) in (s.vstart..s.vl).zip(out) {
            self.vregs.set_mask_bit(dest, i, bit);
        }
        Ok(())
    }

    /// Integer compares write one mask bit per active element.
    fn v_compare<F>(&mut self, di: &DecodedInstruction, s: Shape, op: F) -> ExecutionResult
    where
        F: Fn(u64, u64) -> bool,
    {
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, src2, s.lmul_log2)?;
        let src1 = self.source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        // The destination may overlap the sources, so all results are computed first.
        let mut out = Vec::with_capacity(s.vl);
        for i in s.vstart..s.vl {
            if self.is_active(di, i) {
                let a = self.vregs.element(src2, i, width);
                let b = self.read_source(src1, i, width);
                out.push((i, op(a, b)));
            }
        }
        for (i, bit) in out {
            self.vregs.set_mask_bit(dest, i, bit);
        }
        Ok(())
    }

    /// > vmerge: vd[i] = v0.mask[i] ? src1[i] : vs2[i]
    fn v_merge(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src2, s.lmul_log2)?;
        if dest == V0 {
            return Err(illegal(di));
        }
        let src1 = self.source(di, 2, s.sew, s.lmul_log2)?;
        let width = s.width();
        for i in s.vstart..s.vl {
            let value = if self.vregs.mask_bit(V0, i) {
                self.read_source(src1, i, width)
            } else {
                self.vregs.element(src2, i, width)
            };
            self.vregs.set_element(dest, i, width, value);
        }
        Ok(())
    }

    /// `vmv.v.v`, `vmv.v.x` and `vmv.v.i`.
    fn v_move(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        let dest = di.reg(0);
        self.check_group(di, dest, s.lmul_log2)?;
        let src = self.source(di, 1, s.sew, s.lmul_log2)?;
        let width = s.width();
        for i in s.vstart..s.vl {
            let value = self.read_source(src, i, width);
            self.vregs.set_element(dest, i, width, value);
        }
        Ok(())
    }

    /// `vzext.vf<factor>`/`vsext.vf<factor>`
    fn v_extend(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        factor: u32,
        signed: bool,
    ) -> ExecutionResult {
        let src_bits = s.sew / factor;
        let src_lmul = s.lmul_log2 - factor.trailing_zeros() as i32;
        if src_bits < 8 || src_lmul < -3 {
            return Err(illegal(di));
        }
        let (dest, src) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src, src_lmul)?;
        self.check_mask_overlap(di, dest)?;
        let (width, src_width) = (s.width(), src_bits as usize / 8);
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let value = self.vregs.element(src, i, src_width);
            let value = if signed {
                sext(value, src_bits) as u64 & mask(s.sew)
            } else {
                value
            };
            self.vregs.set_element(dest, i, width, value);
        }
        Ok(())
    }

    /// Reductions: `vd[0] = op(... op(vs1[0], vs2[0]) ..., vs2[vl-1])` over the active
    /// elements. When `wide`, the scalars are twice the element width and `op` receives the
    /// zero-extended element.
    fn v_reduce<F>(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        wide: bool,
        op: F,
    ) -> ExecutionResult
    where
        F: Fn(u64, u64) -> u64,
    {
        // > Vector reduction operations raise an illegal instruction exception if vstart is
        // > non-zero.
        if s.vstart != 0 {
            return Err(illegal(di));
        }
        let (acc_bits, _) = self.widened(di, s, wide)?;
        let (dest, src2, src1) = (di.reg(0), di.reg(1), di.reg(2));
        self.check_group(di, src2, s.lmul_log2)?;
        if s.vl == 0 {
            return Ok(());
        }
        let acc_width = acc_bits as usize / 8;
        let mut acc = self.vregs.element(src1, 0, acc_width);
        for i in 0..s.vl {
            if self.is_active(di, i) {
                acc = op(acc, self.vregs.element(src2, i, s.width())) & mask(acc_bits);
            }
        }
        self.vregs.set_element(dest, 0, acc_width, acc);
        Ok(())
    }

    /// Mask-register logical instructions, which are never masked.
    fn v_mask_logical<F>(&mut self, di: &DecodedInstruction, s: Shape, op: F) -> ExecutionResult
    where
        F: Fn(bool, bool) -> bool,
    {
        let (dest, src2, src1) = (di.reg(0), di.reg(1), di.reg(2));
        for i in s.vstart..s.vl {
            let value = op(self.vregs.mask_bit(src2, i), self.vregs.mask_bit(src1, i));
            self.vregs.set_mask_bit(dest, i, value);
        }
        Ok(())
    }

    /// > The source operand is a single vector register holding mask register values.
    /// > The vcpop.m instruction counts the number of mask elements of the active elements of
    /// > the vector source mask register that have the value 1 and writes the result to a
    /// > scalar x register.
    fn vcpop(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        if s.vstart != 0 {
            return Err(illegal(di));
        }
        let src = di.reg(1);
        let count = (0..s.vl)
            .filter(|&i| self.is_active(di, i) && self.vregs.mask_bit(src, i))
            .count();
        self.write_x(di.reg(0), count as u64);
        Ok(())
    }

    /// `vfirst.m` writes the index of the first active set bit, or -1.
    fn vfirst(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        if s.vstart != 0 {
            return Err(illegal(di));
        }
        let src = di.reg(1);
        let first = (0..s.vl).find(|&i| self.is_active(di, i) && self.vregs.mask_bit(src, i));
        self.write_x(di.reg(0), first.map_or(u64::MAX, |i| i as u64));
        Ok(())
    }

    /// `vmsbf.m`, `vmsif.m` and `vmsof.m`: set-before-first, set-including-first and
    /// set-only-first.
    fn v_set_first(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        use InstructionId as I;

        let (dest, src) = (di.reg(0), di.reg(1));
        if s.vstart != 0 || dest == src {
            return Err(illegal(di));
        }
        self.check_mask_overlap(di, dest)?;
        let mut found = false;
        for i in 0..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let set = self.vregs.mask_bit(src, i);
            let value = match di.id() {
                I::VmsbfM => !found && !set,
                I::VmsifM => !found,
                _ => !found && set,
            };
            found |= set;
            self.vregs.set_mask_bit(dest, i, value);
        }
        Ok(())
    }

    /// `viota.m` writes to each active element the number of set source bits among the active
    /// elements before it.
    fn viota(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        let (dest, src) = (di.reg(0), di.reg(1));
        if s.vstart != 0 {
            return Err(illegal(di));
        }
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let width = s.width();
        let mut count = 0u64;
        for i in 0..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let set = self.vregs.mask_bit(src, i);
            self.vregs.set_element(dest, i, width, count & mask(s.sew));
            count += set as u64;
        }
        Ok(())
    }

    fn vid(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        let dest = di.reg(0);
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        for i in s.vstart..s.vl {
            if self.is_active(di, i) {
                self.vregs.set_element(dest, i, s.width(), i as u64 & mask(s.sew));
            }
        }
        Ok(())
    }

    /// Scalar offset of a slide, from `x[rs1]` or the unsigned immediate.
    fn slide_offset(&self, di: &DecodedInstruction) -> usize {
        let offset = match di.descriptor().operand(2).map(|operand| operand.kind) {
            Some(OperandType::IntReg) => self.registers.x(di.reg(2)) & self.xlen.mask(),
            _ => di.op2() as u64,
        };
        usize::try_from(offset).unwrap_or(usize::MAX)
    }

    /// > vslideup: vd[i+OFFSET] = vs2[i]
    fn v_slide_up(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        let (dest, src) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        if dest == src {
            return Err(illegal(di));
        }
        let offset = self.slide_offset(di);
        let width = s.width();
        for i in s.vstart.max(offset)..s.vl {
            if self.is_active(di, i) {
                let value = self.vregs.element(src, i - offset, width);
                self.vregs.set_element(dest, i, width, value);
            }
        }
        Ok(())
    }

    /// > vslidedown: vd[i] = vs2[i+OFFSET], reading zero past VLMAX
    fn v_slide_down(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        let (dest, src) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let offset = self.slide_offset(di);
        let width = s.width();
        let mut out = Vec::with_capacity(s.vl);
        for i in s.vstart..s.vl {
            if self.is_active(di, i) {
                let value = match i.checked_add(offset) {
                    Some(index) if index < s.vlmax => self.vregs.element(src, index, width),
                    _ => 0,
                };
                out.push((i, value));
            }
        }
        for (i, value) in out {
            self.vregs.set_element(dest, i, width, value);
        }
        Ok(())
    }

    /// `vslide1up`: `vd[0] = value`, `vd[i] = vs2[i-1]`.
    pub(super) fn v_slide1_up(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        value: u64,
    ) -> ExecutionResult {
        let (dest, src) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        if dest == src {
            return Err(illegal(di));
        }
        let width = s.width();
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let element = if i == 0 {
                value
            } else {
                self.vregs.element(src, i - 1, width)
            };
            self.vregs.set_element(dest, i, width, element);
        }
        Ok(())
    }

    /// `vslide1down`: `vd[i] = vs2[i+1]`, `vd[vl-1] = value`.
    pub(super) fn v_slide1_down(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        value: u64,
    ) -> ExecutionResult {
        let (dest, src) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let width = s.width();
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let element = if i + 1 == s.vl {
                value
            } else {
                self.vregs.element(src, i + 1, width)
            };
            self.vregs.set_element(dest, i, width, element);
        }
        Ok(())
    }

    /// `vrgather` and `vrgatherei16`, with indices `index_bits` wide.
    ///
    /// > vrgather.vv: vd[i] = (vs1[i] >= VLMAX) ? 0 : vs2[vs1[i]]
    fn v_gather(&mut self, di: &DecodedInstruction, s: Shape, index_bits: u32) -> ExecutionResult {
        let (dest, src2) = (di.reg(0), di.reg(1));
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src2, s.lmul_log2)?;
        self.check_mask_overlap(di, dest)?;
        let index_lmul =
            s.lmul_log2 + index_bits.trailing_zeros() as i32 - s.sew.trailing_zeros() as i32;
        let indices = self.source(di, 2, index_bits, index_lmul)?;
        if dest == src2 || indices == Source::Vector(dest) {
            return Err(illegal(di));
        }
        let width = s.width();
        for i in s.vstart..s.vl {
            if !self.is_active(di, i) {
                continue;
            }
            let index = match indices {
                Source::Vector(register) => {
                    self.vregs.element(register, i, index_bits as usize / 8)
                }
                Source::Scalar(_) => self.slide_offset(di) as u64,
            };
            let value = if index < s.vlmax as u64 {
                self.vregs.element(src2, index as usize, width)
            } else {
                0
            };
            self.vregs.set_element(dest, i, width, value);
        }
        Ok(())
    }

    /// > vcompress: pack the elements of vs2 selected by the mask vs1 into the start of vd.
    fn vcompress(&mut self, di: &DecodedInstruction, s: Shape) -> ExecutionResult {
        let (dest, src2, selector) = (di.reg(0), di.reg(1), di.reg(2));
        if s.vstart != 0 || dest == src2 || dest == selector {
            return Err(illegal(di));
        }
        self.check_group(di, dest, s.lmul_log2)?;
        self.check_group(di, src2, s.lmul_log2)?;
        let width = s.width();
        let mut packed = 0;
        for i in 0..s.vl {
            if self.vregs.mask_bit(selector, i) {
                let value = self.vregs.element(src2, i, width);
                self.vregs.set_element(dest, packed, width, value);
                packed += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(super) mod test_util {
    //! Encoders for vector test programs.

    /// An `OP-V` encoding. `masked` clears the `vm` bit.
    pub fn opv(funct6: u32, masked: bool, vs2: u32, vs1: u32, funct3: u32, vd: u32) -> u32 {
        let vm = !masked as u32;
        funct6 << 26 | vm << 25 | vs2 << 20 | vs1 << 15 | funct3 << 12 | vd << 7 | 0x57
    }

    /// `vsetvli rd, rs1, vtypei`
    pub fn vsetvli(rd: u32, rs1: u32, vtypei: u32) -> u32 {
        vtypei << 20 | rs1 << 15 | 0b111 << 12 | rd << 7 | 0x57
    }

    /// `vtypei` for `sew` bits and `LMUL = 2^lmul_log2`.
    pub fn vtype(sew: u32, lmul_log2: i32) -> u32 {
        (sew / 8).trailing_zeros() << 3 | (lmul_log2 as u32 & 0b111)
    }

    pub const OPIVV: u32 = 0;
    pub const OPFVV: u32 = 1;
    pub const OPMVV: u32 = 2;
    pub const OPIVI: u32 = 3;
    pub const OPIVX: u32 = 4;
    pub const OPFVF: u32 = 5;
    pub const OPMVX: u32 = 6;
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{hart, hart_with, retire, retire_n, x};
    use super::test_util::*;
    use super::{round_shift, V0};
    use crate::cause::ExceptionCause;
    use crate::csr;
    use crate::hart::{Config, Hart, StepOutcome};
    use crate::memory::Memory;
    use crate::registers::Specifier;
    use crate::Xlen;

    fn v(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    fn fill(hart: &mut Hart<Memory>, register: u8, width: usize, values: &[u64]) {
        for (i, value) in values.iter().enumerate() {
            hart.vector_registers_mut().set_element(v(register), i, width, *value);
        }
    }

    fn elements(hart: &Hart<Memory>, register: u8, width: usize, count: usize) -> Vec<u64> {
        (0..count)
            .map(|i| hart.vector_registers().element(v(register), i, width))
            .collect()
    }

    fn assert_illegal(hart: &mut Hart<Memory>) {
        let outcome = hart.step().unwrap();
        let illegal = ExceptionCause::IllegalInstruction;
        assert!(
            matches!(outcome, StepOutcome::Exception(e) if e.cause == illegal),
            "got {outcome:?}"
        );
    }

    #[test]
    fn fixed_point_rounding_modes() {
        // 0b1011 >> 2 = 0b10 with discarded 0b11
        assert_eq!(round_shift(0b1011, 2, 0), 0b11);
        assert_eq!(round_shift(0b1011, 2, 1), 0b11);
        assert_eq!(round_shift(0b1011, 2, 2), 0b10);
        assert_eq!(round_shift(0b1011, 2, 3), 0b11);
        // exactly half, even result
        assert_eq!(round_shift(0b1010, 2, 1), 0b10);
        assert_eq!(round_shift(-3, 1, 0), -1);
    }

    #[test]
    fn vsetvli_clamps_to_vlmax() {
        let mut hart = hart(&[
            vsetvli(1, 2, vtype(32, 0)),
            vsetvli(3, 0, vtype(8, 1)),
            vsetvli(4, 2, vtype(64, -1)),
        ]);
        hart.registers_mut().set_x(x(2), 100);
        retire_n(&mut hart, 3);
        // VLEN = 128
        assert_eq!(hart.registers().x(x(1)), 4);
        assert_eq!(hart.registers().x(x(3)), 32);
        // SEW = 64 with LMUL = 1/2 exceeds ELEN * LMUL
        assert_eq!(hart.registers().x(x(4)), 0);
        assert_eq!(hart.read_csr(csr::VTYPE), Ok(1 << 31));
    }

    #[test]
    fn vill_makes_arithmetic_illegal() {
        let mut hart = hart(&[opv(0x00, false, 2, 3, OPIVV, 1)]);
        assert_illegal(&mut hart);
    }

    #[test]
    fn masked_add_leaves_inactive_elements() {
        let mut hart = hart(&[vsetvli(0, 1, vtype(32, 0)), opv(0x00, true, 2, 3, OPIVV, 1)]);
        hart.registers_mut().set_x(x(1), 4);
        fill(&mut hart, 1, 4, &[9, 9, 9, 9]);
        fill(&mut hart, 2, 4, &[1, 2, 3, 0xffff_ffff]);
        fill(&mut hart, 3, 4, &[10, 20, 30, 1]);
        hart.vector_registers_mut().set_mask_bit(V0, 0, true);
        hart.vector_registers_mut().set_mask_bit(V0, 3, true);
        retire_n(&mut hart, 2);
        assert_eq!(elements(&hart, 1, 4, 4), [11, 9, 9, 0]);
    }

    #[test]
    fn scalar_and_immediate_operands() {
        // vrsub.vx v1, v2, x5; vadd.vi v3, v2, -1; vsll.vi v4, v2, 3
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(16, 0)),
            opv(0x03, false, 2, 5, OPIVX, 1),
            opv(0x00, false, 2, 0x1f, OPIVI, 3),
            opv(0x25, false, 2, 3, OPIVI, 4),
        ]);
        hart.registers_mut().set_x(x(1), 2);
        hart.registers_mut().set_x(x(5), 100);
        fill(&mut hart, 2, 2, &[1, 0]);
        retire_n(&mut hart, 4);
        assert_eq!(elements(&hart, 1, 2, 2), [99, 100]);
        assert_eq!(elements(&hart, 3, 2, 2), [0, 0xffff]);
        assert_eq!(elements(&hart, 4, 2, 2), [8, 0]);
    }

    #[test]
    fn saturating_add_sets_vxsat() {
        // vsaddu.vv v1, v2, v3
        let mut hart = hart(&[vsetvli(0, 1, vtype(8, 0)), opv(0x20, false, 2, 3, OPIVV, 1)]);
        hart.registers_mut().set_x(x(1), 2);
        fill(&mut hart, 2, 1, &[200, 1]);
        fill(&mut hart, 3, 1, &[100, 2]);
        retire_n(&mut hart, 2);
        assert_eq!(elements(&hart, 1, 1, 2), [255, 3]);
        assert_eq!(hart.read_csr(csr::VXSAT), Ok(1));
    }

    #[test]
    fn widening_multiply_accumulate() {
        // vwmacc.vx v2, x5, v1
        let mut hart = hart(&[vsetvli(0, 1, vtype(8, 0)), opv(0x3d, false, 1, 5, OPMVX, 2)]);
        hart.registers_mut().set_x(x(1), 2);
        hart.registers_mut().set_x(x(5), (-3i64) as u64);
        fill(&mut hart, 1, 1, &[4, 0xff]);
        fill(&mut hart, 2, 2, &[100, 100]);
        retire_n(&mut hart, 2);
        assert_eq!(elements(&hart, 2, 2, 2), [88, 103]);
    }

    #[test]
    fn widening_destination_must_be_aligned() {
        // vwaddu.vv v3, v4, v5 with LMUL = 1 needs an even destination
        let mut hart = hart(&[vsetvli(0, 1, vtype(8, 0)), opv(0x30, false, 4, 5, OPMVV, 3)]);
        hart.registers_mut().set_x(x(1), 4);
        retire(&mut hart);
        assert_illegal(&mut hart);
    }

    #[test]
    fn narrowing_clip() {
        // vnclipu.wi v1, v2, 4
        let mut hart = hart(&[vsetvli(0, 1, vtype(8, 0)), opv(0x2e, false, 2, 4, OPIVI, 1)]);
        hart.registers_mut().set_x(x(1), 2);
        fill(&mut hart, 2, 2, &[0x0128, 0x1000]);
        retire_n(&mut hart, 2);
        // 0x128 >> 4 rounds up to 0x13, 0x1000 >> 4 saturates
        assert_eq!(elements(&hart, 1, 1, 2), [0x13, 0xff]);
        assert_eq!(hart.read_csr(csr::VXSAT), Ok(1));
    }

    #[test]
    fn compare_and_mask_ops() {
        // vmslt.vx v1, v2, x5; vcpop.m x6, v1; vfirst.m x7, v1; vmnot via vmnand.mm v3, v1, v1
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            opv(0x1b, false, 2, 5, OPIVX, 1),
            opv(0x10, false, 1, 0x10, OPMVV, 6),
            opv(0x10, false, 1, 0x11, OPMVV, 7),
            opv(0x1d, false, 1, 1, OPMVV, 3),
        ]);
        hart.registers_mut().set_x(x(1), 4);
        hart.registers_mut().set_x(x(5), 0);
        fill(&mut hart, 2, 4, &[5, 0xffff_ffff, 0, 0x8000_0000]);
        retire_n(&mut hart, 5);
        let vregs = hart.vector_registers();
        let bits: Vec<bool> = (0..4).map(|i| vregs.mask_bit(v(1), i)).collect();
        assert_eq!(bits, [false, true, false, true]);
        assert_eq!(hart.registers().x(x(6)), 2);
        assert_eq!(hart.registers().x(x(7)), 1);
        let inverted: Vec<bool> = (0..4).map(|i| vregs.mask_bit(v(3), i)).collect();
        assert_eq!(inverted, [true, false, true, false]);
    }

    #[test]
    fn reduction_and_scalar_moves() {
        // vredsum.vs v1, v2, v3; vmv.x.s x6, v1; vmv.s.x v4, x5
        let mut hart = hart_with(
            &[
                vsetvli(0, 1, vtype(16, 0)),
                opv(0x00, false, 2, 3, OPMVV, 1),
                opv(0x10, false, 1, 0, OPMVV, 6),
                opv(0x10, false, 0, 5, OPMVX, 4),
            ],
            Config {
                xlen: Xlen::Rv64,
                ..Config::default()
            },
        );
        hart.registers_mut().set_x(x(1), 3);
        hart.registers_mut().set_x(x(5), 0x1_2345);
        fill(&mut hart, 2, 2, &[1, 2, 0xfffd]);
        fill(&mut hart, 3, 2, &[0xfff0]);
        retire_n(&mut hart, 4);
        assert_eq!(elements(&hart, 1, 2, 1), [0xfff0]);
        assert_eq!(hart.registers().x(x(6)), 0xffff_ffff_ffff_fff0);
        assert_eq!(elements(&hart, 4, 2, 1), [0x2345]);
    }

    #[test]
    fn slides_and_gather() {
        // vslideup.vi v1, v2, 1; vslidedown.vx v3, v2, x5; vrgather.vv v4, v2, v5
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            opv(0x0e, false, 2, 1, OPIVI, 1),
            opv(0x0f, false, 2, 5, OPIVX, 3),
            opv(0x0c, false, 2, 5, OPIVV, 4),
        ]);
        hart.registers_mut().set_x(x(1), 4);
        hart.registers_mut().set_x(x(5), 2);
        fill(&mut hart, 1, 4, &[7, 7, 7, 7]);
        fill(&mut hart, 2, 4, &[10, 11, 12, 13]);
        fill(&mut hart, 5, 4, &[3, 0, 9, 1]);
        retire_n(&mut hart, 4);
        assert_eq!(elements(&hart, 1, 4, 4), [7, 10, 11, 12]);
        assert_eq!(elements(&hart, 3, 4, 4), [12, 13, 0, 0]);
        assert_eq!(elements(&hart, 4, 4, 4), [13, 10, 0, 11]);
    }

    #[test]
    fn compress_iota_and_id() {
        // vcompress.vm v1, v2, v3; viota.m v4, v3; vid.v v5
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(8, 0)),
            opv(0x17, false, 2, 3, OPMVV, 1),
            opv(0x14, false, 3, 0x10, OPMVV, 4),
            opv(0x14, false, 0, 0x11, OPMVV, 5),
        ]);
        hart.registers_mut().set_x(x(1), 4);
        fill(&mut hart, 2, 1, &[1, 2, 3, 4]);
        fill(&mut hart, 3, 1, &[0b1010]);
        retire_n(&mut hart, 4);
        assert_eq!(elements(&hart, 1, 1, 2), [2, 4]);
        assert_eq!(elements(&hart, 4, 1, 4), [0, 0, 1, 1]);
        assert_eq!(elements(&hart, 5, 1, 4), [0, 1, 2, 3]);
    }

    #[test]
    fn extension_and_whole_register_move() {
        // vsext.vf2 v2, v1; vmv2r.v v4, v2
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(16, 0)),
            opv(0x12, false, 1, 7, OPMVV, 2),
            opv(0x27, false, 2, 1, OPIVI, 4),
        ]);
        hart.registers_mut().set_x(x(1), 2);
        fill(&mut hart, 1, 1, &[0x80, 0x7f]);
        retire_n(&mut hart, 3);
        assert_eq!(elements(&hart, 2, 2, 2), [0xff80, 0x007f]);
        assert_eq!(elements(&hart, 4, 2, 2), [0xff80, 0x007f]);
    }

    #[test]
    fn vector_state_off_is_illegal() {
        let mut hart = hart(&[vsetvli(1, 0, vtype(8, 0))]);
        hart.write_csr(csr::MSTATUS, 0, 0b11 << 9).unwrap();
        assert_illegal(&mut hart);
    }

    #[test]
    fn execution_marks_vector_state_dirty() {
        let mut hart = hart(&[vsetvli(1, 0, vtype(8, 0))]);
        retire(&mut hart);
        assert_eq!(hart.read_csr(csr::MSTATUS).unwrap() >> 9 & 0b11, 3);
    }
}
