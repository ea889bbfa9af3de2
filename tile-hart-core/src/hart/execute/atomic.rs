//! The A extension: load-reserved/store-conditional and atomic memory operations.

use log::trace;

use super::ExecutionResult;
use crate::catalog::InstructionId;
use crate::decode::DecodedInstruction;
use crate::hart::mmu::Access;
use crate::hart::Hart;
use crate::memory::Bus;
use crate::registers::Specifier;

impl<B: Bus> Hart<B> {
    pub(super) fn execute_atomic(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        use InstructionId as I;

        let (dest, base, src) = (di.reg(0), di.reg(1), di.reg(2));
        let size = di.descriptor().data_size() as u64;
        match di.id() {
            I::LrW | I::LrD => self.lr(dest, base, size),
            I::ScW | I::ScD => self.sc(dest, base, src, size),
            I::AmoswapW | I::AmoswapD => self.amo(dest, base, src, size, |_, s| s),
            I::AmoaddW | I::AmoaddD => self.amo(dest, base, src, size, u64::wrapping_add),
            I::AmoxorW | I::AmoxorD => self.amo(dest, base, src, size, |m, s| m ^ s),
            I::AmoandW | I::AmoandD => self.amo(dest, base, src, size, |m, s| m & s),
            I::AmoorW | I::AmoorD => self.amo(dest, base, src, size, |m, s| m | s),
            I::AmominW | I::AmominD => {
                self.amo(dest, base, src, size, |m, s| (m as i64).min(s as i64) as u64)
            }
            I::AmomaxW | I::AmomaxD => {
                self.amo(dest, base, src, size, |m, s| (m as i64).max(s as i64) as u64)
            }
            // Operands are sign-extended words on both sides, which keeps the unsigned order.
            I::AmominuW | I::AmominuD => self.amo(dest, base, src, size, u64::min),
            I::AmomaxuW | I::AmomaxuD => self.amo(dest, base, src, size, u64::max),
            id => unreachable!("{id} is not an atomic instruction"),
        }
    }

    /// Executes an `lr.w`/`lr.d` instruction.
    ///
    /// > LR.W loads a word from the address in rs1, places the sign-extended value in rd, and
    /// > registers a reservation set, a set of bytes that subsumes the bytes in the addressed word.
    fn lr(&mut self, dest: Specifier, base: Specifier, size: u64) -> ExecutionResult {
        let address = self.xlen.address(self.registers.x(base));
        let physical = self.resolve_atomic(address, size, Access::Load)?;
        let value = self.read_physical(physical, size);
        self.reserve(physical.address, size);
        self.write_x(dest, sign_extend(value, size));
        Ok(())
    }

    /// Executes an `sc.w`/`sc.d` instruction.
    ///
    /// > SC.W conditionally writes a word in rs2 to the address in rs1: the SC.W succeeds only if
    /// > the reservation is still valid and the reservation set contains the bytes being written.
    /// > If the SC.W succeeds, the instruction writes the word in rs2 to memory, and it writes
    /// > zero to rd. If the SC.W fails, the instruction does not write to memory, and it writes a
    /// > nonzero value to rd. Regardless of success or failure, executing an SC.W instruction
    /// > invalidates any reservation held by this hart.
    fn sc(
        &mut self,
        dest: Specifier,
        base: Specifier,
        src: Specifier,
        size: u64,
    ) -> ExecutionResult {
        let address = self.xlen.address(self.registers.x(base));
        let physical = self.resolve_atomic(address, size, Access::Store)?;
        let reserved = self.reservation.take().is_some_and(|reservation| {
            reservation.address <= physical.address
                && physical.address + size <= reservation.address + reservation.size
        });
        if reserved {
            let value = self.registers.x(src);
            self.write_physical(physical, size, value);
            self.after_store(address, physical, size);
            self.write_x(dest, 0);
        } else {
            trace!("sc at {address:#x} failed, no matching reservation");
            self.write_x(dest, 1);
        }
        Ok(())
    }

    /// Executes an atomic memory operation: loads the value at `[base]` into `dest` and stores
    /// `op(loaded, src)` back.
    ///
    /// > For RV64, 32-bit AMOs always sign-extend the value placed in rd, and ignore the upper 32
    /// > bits of the original value of rs2.
    fn amo<F>(
        &mut self,
        dest: Specifier,
        base: Specifier,
        src: Specifier,
        size: u64,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u64, u64) -> u64,
    {
        let address = self.xlen.address(self.registers.x(base));
        let physical = self.resolve_atomic(address, size, Access::Amo)?;
        let loaded = sign_extend(self.read_physical(physical, size), size);
        let operand = sign_extend(self.registers.x(src), size);
        self.write_physical(physical, size, op(loaded, operand));
        self.after_store(address, physical, size);
        self.write_x(dest, loaded);
        Ok(())
    }
}

fn sign_extend(value: u64, size: u64) -> u64 {
    match size {
        4 => value as u32 as i32 as i64 as u64,
        8 => value,
        _ => panic!("atomic access of {size} bytes"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{hart, hart_with, retire, retire_n, x};
    use crate::cause::ExceptionCause;
    use crate::hart::{Config, StepOutcome};
    use crate::memory::Bus;
    use crate::Xlen;

    #[test]
    fn lr_sc_pair_succeeds_once() {
        // lr.w x2, (x1); sc.w x3, x4, (x1); sc.w x5, x4, (x1)
        let mut hart = hart(&[0x1000_a12f, 0x1840_a1af, 0x1840_a2af]);
        hart.registers_mut().set_x(x(1), 0x800);
        hart.registers_mut().set_x(x(4), 0x1234);
        hart.bus_mut().write_u32(0x800, 0xffff_fff0).unwrap();
        retire_n(&mut hart, 3);
        let regs = hart.registers();
        assert_eq!(regs.x(x(2)), 0xffff_ffff_ffff_fff0);
        assert_eq!(regs.x(x(3)), 0);
        assert_eq!(regs.x(x(5)), 1);
        assert_eq!(hart.bus().read_u32(0x800), Ok(0x1234));
    }

    #[test]
    fn store_between_lr_and_sc_breaks_reservation() {
        // lr.w x2, (x1); sw x0, 0(x1); sc.w x3, x4, (x1)
        let mut hart = hart(&[0x1000_a12f, 0x0000_a023, 0x1840_a1af]);
        hart.registers_mut().set_x(x(1), 0x800);
        hart.registers_mut().set_x(x(4), 0x1234);
        retire_n(&mut hart, 3);
        assert_eq!(hart.registers().x(x(3)), 1);
        assert_eq!(hart.bus().read_u32(0x800), Ok(0));
    }

    #[test]
    fn amo_returns_old_value() {
        // amoadd.w x2, x3, (x1); amomaxu.w x4, x5, (x1)
        let mut hart = hart(&[0x0030_a12f, 0xe050_a22f]);
        hart.registers_mut().set_x(x(1), 0x800);
        hart.registers_mut().set_x(x(3), 5);
        hart.registers_mut().set_x(x(5), u64::MAX);
        hart.bus_mut().write_u32(0x800, 10).unwrap();
        retire_n(&mut hart, 2);
        assert_eq!(hart.registers().x(x(2)), 10);
        assert_eq!(hart.registers().x(x(4)), 15);
        assert_eq!(hart.bus().read_u32(0x800), Ok(0xffff_ffff));
    }

    #[test]
    fn word_amo_on_rv64_sign_extends() {
        // amomin.w x2, x3, (x1)
        let mut hart = hart_with(
            &[0x8030_a12f],
            Config {
                xlen: Xlen::Rv64,
                ..Config::default()
            },
        );
        hart.registers_mut().set_x(x(1), 0x800);
        hart.registers_mut().set_x(x(3), 0x1_0000_0001);
        hart.bus_mut().write_u32(0x800, 0x8000_0000).unwrap();
        retire(&mut hart);
        assert_eq!(hart.registers().x(x(2)), 0xffff_ffff_8000_0000);
        assert_eq!(hart.bus().read_u32(0x800), Ok(0x8000_0000));
    }

    #[test]
    fn misaligned_amo_faults() {
        // amoswap.w x2, x3, (x1)
        let mut hart = hart(&[0x0830_a12f]);
        hart.registers_mut().set_x(x(1), 0x802);
        let outcome = hart.step().unwrap();
        let StepOutcome::Exception(exception) = outcome else {
            panic!("expected an exception, got {outcome:?}");
        };
        assert_eq!(exception.cause, ExceptionCause::StoreOrAmoAddressMisaligned);
        assert_eq!(exception.tval, 0x802);
    }
}
