//! The F, D and Zfh extensions.
//!
//! Values narrower than 64 bits are NaN-boxed in the `f` registers. Reading an improperly boxed
//! value yields the canonical NaN of the format, see [`crate::registers::FpRegisters`].

use super::{illegal, ExecutionResult, TrackedLoad};
use crate::catalog::InstructionId;
use crate::cause::Exception;
use crate::decode::DecodedInstruction;
use crate::float::{Format, IntFormat, RoundingMode};
use crate::hart::{ExtensionContextStatus, Hart};
use crate::memory::Bus;
use crate::registers::Specifier;

impl<B: Bus> Hart<B> {
    pub(super) fn execute_fp(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        use InstructionId as I;

        // > If the FS field is set to Off, any instruction that attempts to read or write the
        // > floating-point state will cause an illegal instruction exception.
        if self.status.fs() == ExtensionContextStatus::Off {
            return Err(illegal(di));
        }
        let id = di.id();
        let format = format_of(id);
        let (r0, r1, r2) = (di.reg(0), di.reg(1), di.reg(2));

        match id {
            I::Flw | I::Fld | I::Flh => self.fp_load(r0, r1, di.imm(2), format),
            I::Fsw | I::Fsd | I::Fsh => self.fp_store(r0, r1, di.imm(2), format),

            I::FmaddS | I::FmaddD | I::FmaddH => self.fp_fused(di, format, false, false),
            I::FmsubS | I::FmsubD | I::FmsubH => self.fp_fused(di, format, false, true),
            I::FnmsubS | I::FnmsubD | I::FnmsubH => self.fp_fused(di, format, true, false),
            I::FnmaddS | I::FnmaddD | I::FnmaddH => self.fp_fused(di, format, true, true),

            I::FaddS | I::FaddD | I::FaddH => self.fp_arithmetic(di, format, Format::add),
            I::FsubS | I::FsubD | I::FsubH => self.fp_arithmetic(di, format, Format::sub),
            I::FmulS | I::FmulD | I::FmulH => self.fp_arithmetic(di, format, Format::mul),
            I::FdivS | I::FdivD | I::FdivH => self.fp_arithmetic(di, format, Format::div),
            I::FsqrtS | I::FsqrtD | I::FsqrtH => {
                let rm = self.rounding_mode(di)?;
                let (value, flags) = format.sqrt(self.read_f(r1, format), rm);
                self.accrue(flags);
                self.write_f(r0, format, value);
                Ok(())
            }

            I::FsgnjS | I::FsgnjD | I::FsgnjH => self.fp_sign_inject(r0, r1, r2, format, |_, b| b),
            I::FsgnjnS | I::FsgnjnD | I::FsgnjnH => {
                self.fp_sign_inject(r0, r1, r2, format, |_, b| !b)
            }
            I::FsgnjxS | I::FsgnjxD | I::FsgnjxH => {
                self.fp_sign_inject(r0, r1, r2, format, |a, b| a ^ b)
            }
            I::FminS | I::FminD | I::FminH => self.fp_min_max(r0, r1, r2, format, Format::min),
            I::FmaxS | I::FmaxD | I::FmaxH => self.fp_min_max(r0, r1, r2, format, Format::max),

            I::FcvtWS | I::FcvtWD | I::FcvtWH => self.fp_to_int(di, format, IntFormat::I32),
            I::FcvtWuS | I::FcvtWuD | I::FcvtWuH => self.fp_to_int(di, format, IntFormat::U32),
            I::FcvtLS | I::FcvtLD | I::FcvtLH => self.fp_to_int(di, format, IntFormat::I64),
            I::FcvtLuS | I::FcvtLuD | I::FcvtLuH => self.fp_to_int(di, format, IntFormat::U64),
            I::FcvtSW | I::FcvtDW | I::FcvtHW => {
                let value = self.registers.x(r1) as u32 as i32 as i64 as u64;
                self.fp_from_int(di, format, value, true)
            }
            I::FcvtSWu | I::FcvtDWu | I::FcvtHWu => {
                let value = self.registers.x(r1) & 0xffff_ffff;
                self.fp_from_int(di, format, value, false)
            }
            I::FcvtSL | I::FcvtDL | I::FcvtHL => {
                let value = self.registers.x(r1);
                self.fp_from_int(di, format, value, true)
            }
            I::FcvtSLu | I::FcvtDLu | I::FcvtHLu => {
                let value = self.registers.x(r1);
                self.fp_from_int(di, format, value, false)
            }

            // > FMV.X.W moves the single-precision value in floating-point register rs1
            // > represented in IEEE 754-2008 encoding to the lower 32 bits of integer register rd.
            // > The bits are not modified in the transfer, and in particular, the payloads of
            // > non-canonical NaNs are preserved. For RV64, the higher 32 bits of the destination
            // > register are filled with copies of the floating-point number's sign bit.
            I::FmvXW | I::FmvXD | I::FmvXH => {
                let raw = self.fregs.raw(r1);
                let value = match format.bits() {
                    16 => raw as u16 as i16 as i64 as u64,
                    32 => raw as u32 as i32 as i64 as u64,
                    _ => raw,
                };
                self.write_x(r0, value);
                Ok(())
            }
            I::FmvWX | I::FmvDX | I::FmvHX => {
                let value = self.registers.x(r1);
                self.write_f(r0, format, value);
                Ok(())
            }

            I::FeqS | I::FeqD | I::FeqH => self.fp_compare(r0, r1, r2, format, Format::eq),
            I::FltS | I::FltD | I::FltH => self.fp_compare(r0, r1, r2, format, Format::lt),
            I::FleS | I::FleD | I::FleH => self.fp_compare(r0, r1, r2, format, Format::le),
            I::FclassS | I::FclassD | I::FclassH => {
                let class = format.classify(self.read_f(r1, format));
                self.write_x(r0, class);
                Ok(())
            }

            I::FcvtSD => self.fp_convert(di, Format::DOUBLE, Format::SINGLE),
            I::FcvtDS => self.fp_convert(di, Format::SINGLE, Format::DOUBLE),
            I::FcvtSH => self.fp_convert(di, Format::HALF, Format::SINGLE),
            I::FcvtHS => self.fp_convert(di, Format::SINGLE, Format::HALF),
            I::FcvtDH => self.fp_convert(di, Format::HALF, Format::DOUBLE),
            I::FcvtHD => self.fp_convert(di, Format::DOUBLE, Format::HALF),
            id => unreachable!("{id} is not a scalar floating-point instruction"),
        }
    }

    /// Rounding mode of an instruction with an `rm` field. The dynamic mode `7` selects `frm`,
    /// which must then hold a valid mode.
    pub(super) fn rounding_mode(&self, di: &DecodedInstruction) -> Result<RoundingMode, Exception> {
        let field = di.rounding_mode_field() as u8;
        let rm = if field == 7 { self.fcsr.frm } else { field };
        RoundingMode::from_u3(rm).ok_or_else(|| illegal(di))
    }

    /// Reads `f[specifier]` as a value of `format`, unboxing narrower values.
    pub(super) fn read_f(&self, specifier: Specifier, format: Format) -> u64 {
        match format.bits() {
            16 => self.fregs.half(specifier) as u64,
            32 => self.fregs.single(specifier) as u64,
            _ => self.fregs.double(specifier),
        }
    }

    /// Writes a value of `format` to `f[specifier]`, NaN-boxing narrower values, and marks the
    /// floating-point state dirty.
    pub(super) fn write_f(&mut self, specifier: Specifier, format: Format, value: u64) {
        match format.bits() {
            16 => self.fregs.set_half(specifier, value as u16),
            32 => self.fregs.set_single(specifier, value as u32),
            _ => self.fregs.set_double(specifier, value),
        }
        self.status.set_fs(ExtensionContextStatus::Dirty);
    }

    /// Accumulates exception flags into `fflags`.
    pub(super) fn accrue(&mut self, flags: u8) {
        if flags != 0 {
            self.fcsr.fflags |= flags;
            self.status.set_fs(ExtensionContextStatus::Dirty);
        }
    }

    /// > The FLW instruction loads a single-precision floating-point value from memory into
    /// > floating-point register rd.
    fn fp_load(
        &mut self,
        dest: Specifier,
        base: Specifier,
        offset: i32,
        format: Format,
    ) -> ExecutionResult {
        let address = self.effective_address(base, offset);
        let size = format.bits() as u64 / 8;
        let value = self.load(address, size, false)?;
        let previous = self.fregs.raw(dest);
        self.write_f(dest, format, value);
        self.track_load(
            base,
            TrackedLoad {
                dest,
                fp: true,
                address,
                size,
                previous,
                wide: false,
            },
        );
        Ok(())
    }

    /// > FSW stores a single-precision value from floating-point register rs2 to memory.
    ///
    /// The stored bits are the raw low bits of the register, boxed or not.
    fn fp_store(
        &mut self,
        src: Specifier,
        base: Specifier,
        offset: i32,
        format: Format,
    ) -> ExecutionResult {
        let address = self.effective_address(base, offset);
        let size = format.bits() as u64 / 8;
        let value = self.fregs.raw(src);
        self.store(address, size, value, false)
    }

    /// Executes one of the fused multiply-add family: `(-1)^negate_product * rs1 * rs2 +
    /// (-1)^negate_addend * rs3`.
    fn fp_fused(
        &mut self,
        di: &DecodedInstruction,
        format: Format,
        negate_product: bool,
        negate_addend: bool,
    ) -> ExecutionResult {
        let rm = self.rounding_mode(di)?;
        let sign = format.sign_mask();
        let mut a = self.read_f(di.reg(1), format);
        let b = self.read_f(di.reg(2), format);
        let mut c = self.read_f(Specifier::from_u5(di.op3() as u8), format);
        if negate_product {
            a ^= sign;
        }
        if negate_addend {
            c ^= sign;
        }
        let (value, flags) = format.fma(a, b, c, rm);
        self.accrue(flags);
        self.write_f(di.reg(0), format, value);
        Ok(())
    }

    fn fp_arithmetic<F>(
        &mut self,
        di: &DecodedInstruction,
        format: Format,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(Format, u64, u64, RoundingMode) -> (u64, u8),
    {
        let rm = self.rounding_mode(di)?;
        let a = self.read_f(di.reg(1), format);
        let b = self.read_f(di.reg(2), format);
        let (value, flags) = op(format, a, b, rm);
        self.accrue(flags);
        self.write_f(di.reg(0), format, value);
        Ok(())
    }

    /// `sign` receives the signs of rs1 and rs2 and returns the sign of the result.
    ///
    /// > Sign-injection instructions do not set floating-point exception flags, nor do they
    /// > canonicalize NaNs.
    fn fp_sign_inject<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        format: Format,
        sign: F,
    ) -> ExecutionResult
    where
        F: FnOnce(bool, bool) -> bool,
    {
        let sign_mask = format.sign_mask();
        let a = self.read_f(src1, format);
        let b = self.read_f(src2, format);
        let negative = sign(a & sign_mask != 0, b & sign_mask != 0);
        let value = a & !sign_mask | if negative { sign_mask } else { 0 };
        self.write_f(dest, format, value);
        Ok(())
    }

    fn fp_min_max<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        format: Format,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(Format, u64, u64) -> (u64, u8),
    {
        let (value, flags) = op(format, self.read_f(src1, format), self.read_f(src2, format));
        self.accrue(flags);
        self.write_f(dest, format, value);
        Ok(())
    }

    fn fp_compare<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        format: Format,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(Format, u64, u64) -> (bool, u8),
    {
        let (result, flags) = op(format, self.read_f(src1, format), self.read_f(src2, format));
        self.accrue(flags);
        self.write_x(dest, result as u64);
        Ok(())
    }

    /// > FCVT.W.S or FCVT.L.S converts a floating-point number in floating-point register rs1 to
    /// > a signed 32-bit or 64-bit integer, respectively, in integer register rd.
    ///
    /// 32-bit results are sign-extended, the unsigned ones included.
    fn fp_to_int(
        &mut self,
        di: &DecodedInstruction,
        format: Format,
        target: IntFormat,
    ) -> ExecutionResult {
        let rm = self.rounding_mode(di)?;
        let (value, flags) = format.to_int(self.read_f(di.reg(1), format), target, rm);
        let value = match target {
            IntFormat::I32 | IntFormat::U32 => value as u32 as i32 as i64 as u64,
            IntFormat::I64 | IntFormat::U64 => value,
        };
        self.accrue(flags);
        self.write_x(di.reg(0), value);
        Ok(())
    }

    fn fp_from_int(
        &mut self,
        di: &DecodedInstruction,
        format: Format,
        value: u64,
        signed: bool,
    ) -> ExecutionResult {
        let rm = self.rounding_mode(di)?;
        let (value, flags) = format.from_int(value, signed, rm);
        self.accrue(flags);
        self.write_f(di.reg(0), format, value);
        Ok(())
    }

    fn fp_convert(
        &mut self,
        di: &DecodedInstruction,
        source: Format,
        target: Format,
    ) -> ExecutionResult {
        let rm = self.rounding_mode(di)?;
        let (value, flags) = source.convert(self.read_f(di.reg(1), source), target, rm);
        self.accrue(flags);
        self.write_f(di.reg(0), target, value);
        Ok(())
    }
}

/// Operand format of a scalar floating-point instruction. Conversions between formats are
/// handled by their callers.
fn format_of(id: InstructionId) -> Format {
    use InstructionId as I;

    match id {
        I::Fld
        | I::Fsd
        | I::FmaddD
        | I::FmsubD
        | I::FnmsubD
        | I::FnmaddD
        | I::FaddD
        | I::FsubD
        | I::FmulD
        | I::FdivD
        | I::FsqrtD
        | I::FsgnjD
        | I::FsgnjnD
        | I::FsgnjxD
        | I::FminD
        | I::FmaxD
        | I::FcvtWD
        | I::FcvtDW
        | I::FcvtWuD
        | I::FcvtDWu
        | I::FcvtLD
        | I::FcvtDL
        | I::FcvtLuD
        | I::FcvtDLu
        | I::FmvXD
        | I::FmvDX
        | I::FeqD
        | I::FltD
        | I::FleD
        | I::FclassD => Format::DOUBLE,
        I::Flh
        | I::Fsh
        | I::FmaddH
        | I::FmsubH
        | I::FnmsubH
        | I::FnmaddH
        | I::FaddH
        | I::FsubH
        | I::FmulH
        | I::FdivH
        | I::FsqrtH
        | I::FsgnjH
        | I::FsgnjnH
        | I::FsgnjxH
        | I::FminH
        | I::FmaxH
        | I::FcvtWH
        | I::FcvtHW
        | I::FcvtWuH
        | I::FcvtHWu
        | I::FcvtLH
        | I::FcvtHL
        | I::FcvtLuH
        | I::FcvtHLu
        | I::FmvXH
        | I::FmvHX
        | I::FeqH
        | I::FltH
        | I::FleH
        | I::FclassH => Format::HALF,
        _ => Format::SINGLE,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{hart, hart_with, retire, retire_n, x};
    use crate::cause::ExceptionCause;
    use crate::csr;
    use crate::float::flags;
    use crate::hart::{Config, StepOutcome};
    use crate::memory::Bus;
    use crate::registers::Specifier;
    use crate::Xlen;

    const ONE: u32 = 0x3f80_0000;
    const TWO: u32 = 0x4000_0000;
    const THREE: u32 = 0x4040_0000;

    fn f(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    #[test]
    fn add_and_fused_multiply_add() {
        // fadd.s f3, f1, f2; fmadd.s f5, f1, f2, f3
        let mut hart = hart(&[0x0020_81d3, 0x1820_82c3]);
        hart.fp_registers_mut().set_single(f(1), ONE);
        hart.fp_registers_mut().set_single(f(2), TWO);
        retire_n(&mut hart, 2);
        assert_eq!(hart.fp_registers().single(f(3)), THREE);
        // 1 * 2 + 3
        assert_eq!(hart.fp_registers().single(f(5)), 0x40a0_0000);
        assert_eq!(hart.fp_registers().raw(f(5)) >> 32, 0xffff_ffff);
        assert_eq!(hart.read_csr(csr::MSTATUS).unwrap() >> 13 & 0b11, 3);
    }

    #[test]
    fn division_by_zero_accrues_flag() {
        // fdiv.s f3, f1, f2
        let mut hart = hart(&[0x1820_81d3]);
        hart.fp_registers_mut().set_single(f(1), ONE);
        hart.fp_registers_mut().set_single(f(2), 0);
        retire(&mut hart);
        assert_eq!(hart.fp_registers().single(f(3)), 0x7f80_0000);
        assert_eq!(hart.read_csr(csr::FFLAGS), Ok(flags::DZ as u64));
    }

    #[test]
    fn improperly_boxed_operand_reads_as_nan() {
        // fadd.s f3, f1, f2
        let mut hart = hart(&[0x0020_81d3]);
        hart.fp_registers_mut().set_raw(f(1), ONE as u64);
        hart.fp_registers_mut().set_single(f(2), ONE);
        retire(&mut hart);
        assert_eq!(hart.fp_registers().single(f(3)), 0x7fc0_0000);
    }

    #[test]
    fn conversions_saturate_and_flag() {
        // fcvt.w.s x5, f1, rtz
        let mut hart = hart(&[0xc000_92d3]);
        hart.fp_registers_mut().set_single(f(1), 0x7fc0_0000);
        retire(&mut hart);
        assert_eq!(hart.registers().x(x(5)), 0x7fff_ffff);
        assert_eq!(hart.read_csr(csr::FFLAGS), Ok(flags::NV as u64));
    }

    #[test]
    fn move_and_compare() {
        // fmv.x.w x6, f1; feq.s x7, f1, f2
        let mut hart = hart_with(
            &[0xe000_8353, 0xa020_a3d3],
            Config {
                xlen: Xlen::Rv64,
                ..Config::default()
            },
        );
        hart.fp_registers_mut().set_single(f(1), 0xbf80_0000);
        hart.fp_registers_mut().set_single(f(2), 0xbf80_0000);
        retire_n(&mut hart, 2);
        assert_eq!(hart.registers().x(x(6)), 0xffff_ffff_bf80_0000);
        assert_eq!(hart.registers().x(x(7)), 1);
    }

    #[test]
    fn load_store_and_widen() {
        // flw f4, 0x100(x0); fsw f4, 0x104(x0); fcvt.d.s f6, f4
        let mut hart = hart(&[0x1000_2207, 0x1040_2227, 0x4202_0353]);
        hart.bus_mut().write_u32(0x100, ONE).unwrap();
        retire_n(&mut hart, 3);
        assert_eq!(hart.fp_registers().single(f(4)), ONE);
        assert_eq!(hart.bus().read_u32(0x104), Ok(ONE));
        assert_eq!(hart.fp_registers().double(f(6)), 0x3ff0_0000_0000_0000);
    }

    #[test]
    fn invalid_dynamic_rounding_mode_is_illegal() {
        // fadd.s f3, f1, f2, dyn
        let mut hart = hart(&[0x0020_f1d3]);
        hart.write_csr(csr::FRM, 5, u64::MAX).unwrap();
        let outcome = hart.step().unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Exception(e) if e.cause == ExceptionCause::IllegalInstruction
        ));
    }

    #[test]
    fn fp_state_off_is_illegal() {
        // fadd.s f3, f1, f2
        let mut hart = hart(&[0x0020_81d3]);
        hart.write_csr(csr::MSTATUS, 0, 0b11 << 13).unwrap();
        let outcome = hart.step().unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Exception(e) if e.cause == ExceptionCause::IllegalInstruction
        ));
    }
}
