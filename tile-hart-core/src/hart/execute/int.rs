//! Base integer instructions (RV32I/RV64I), the M extension, system instructions and the custom
//! wide load/store.

use log::trace;

use super::{illegal, Completion, ExecutionResult, TrackedLoad};
use crate::cause::{Exception, ExceptionCause};
use crate::csr::CsrSpecifier;
use crate::decode::DecodedInstruction;
use crate::hart::{DebugCause, Hart};
use crate::memory::Bus;
use crate::registers::Specifier;
use crate::PrivilegeLevel;

impl<B: Bus> Hart<B> {
    /// Executes a `lui` instruction.
    ///
    /// Corresponds to the assembly instruction `lui dest immediate`.
    ///
    /// > LUI (load upper immediate) is used to build 32-bit constants and uses the U-type format.
    /// > LUI places the U-immediate value in the top 20 bits of the destination register rd,
    /// > filling in the lowest 12 bits with zeros.
    pub(super) fn lui(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        self.write_x(dest, (immediate & !0xfff) as i64 as u64);
        Ok(())
    }

    /// Executes an `auipc` instruction.
    ///
    /// Corresponds to the assembly instruction `auipc dest immediate`.
    ///
    /// > AUIPC (add upper immediate to pc) is used to build pc-relative addresses and uses the
    /// > U-type format. AUIPC forms a 32-bit offset from the 20-bit U-immediate, filling in the
    /// > lowest 12 bits with zeros, adds this offset to the address of the AUIPC instruction, then
    /// > places the result in register rd.
    pub(super) fn auipc(&mut self, dest: Specifier, pc: u64, immediate: i32) -> ExecutionResult {
        self.write_x(dest, pc.wrapping_add_signed((immediate & !0xfff) as i64));
        Ok(())
    }

    /// Executes a `jal` instruction.
    ///
    /// > The jump and link (JAL) instruction uses the J-type format, where the J-immediate encodes
    /// > a signed offset in multiples of 2 bytes. The offset is sign-extended and added to the
    /// > address of the jump instruction to form the jump target address.
    pub(super) fn jal(&mut self, dest: Specifier, pc: u64, offset: i32) -> ExecutionResult {
        let target = pc.wrapping_add_signed(offset as i64);
        self.jump(dest, target)
    }

    /// Executes a `jalr` instruction.
    ///
    /// > The target address is obtained by adding the sign-extended 12-bit I-immediate to the
    /// > register rs1, then setting the least-significant bit of the result to zero.
    ///
    /// A target with the builtin bit set does not jump: it requests the builtin whose id is the
    /// target without that bit. Id `0` ends the run. Any other id completes as a call that has
    /// already returned: `dest` receives the return address and execution continues at `ra`.
    pub(super) fn jalr(
        &mut self,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    ) -> Result<Completion, Exception> {
        let target = self.effective_address(base, offset) & !1;
        if let Some(bit) = self.config.builtin_bit {
            if target & (1 << bit) != 0 {
                let id = target & !(1 << bit);
                if id == 0 {
                    trace!("Builtin 0 reached, finishing");
                    return Ok(Completion::Finished);
                }
                let return_address = self.registers.pc();
                self.write_x(dest, return_address);
                self.set_pc(self.registers.x(Specifier::RA));
                trace!("Builtin {id} called, resuming at {:#x}", self.registers.pc());
                return Ok(Completion::Builtin(id));
            }
        }
        self.jump(dest, target)?;
        Ok(Completion::Retired)
    }

    pub(super) fn beq(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        pc: u64,
        offset: i32,
    ) -> ExecutionResult {
        self.cond_branch(src1, src2, pc, offset, |s1, s2| s1 == s2)
    }

    pub(super) fn bne(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        pc: u64,
        offset: i32,
    ) -> ExecutionResult {
        self.cond_branch(src1, src2, pc, offset, |s1, s2| s1 != s2)
    }

    pub(super) fn blt(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        pc: u64,
        offset: i32,
    ) -> ExecutionResult {
        self.cond_branch(src1, src2, pc, offset, |s1, s2| (s1 as i64) < (s2 as i64))
    }

    pub(super) fn bge(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        pc: u64,
        offset: i32,
    ) -> ExecutionResult {
        self.cond_branch(src1, src2, pc, offset, |s1, s2| (s1 as i64) >= (s2 as i64))
    }

    // Canonical RV32 values are sign-extended, which preserves the unsigned order as well.
    pub(super) fn bltu(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        pc: u64,
        offset: i32,
    ) -> ExecutionResult {
        self.cond_branch(src1, src2, pc, offset, |s1, s2| s1 < s2)
    }

    pub(super) fn bgeu(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        pc: u64,
        offset: i32,
    ) -> ExecutionResult {
        self.cond_branch(src1, src2, pc, offset, |s1, s2| s1 >= s2)
    }

    /// Executes a `lb` instruction.
    ///
    /// > The LW instruction loads a 32-bit value from memory into rd. LH loads a 16-bit value from
    /// > memory, then sign-extends to 32-bits before storing in rd. LHU loads a 16-bit value from
    /// > memory but then zero extends to 32-bits before storing in rd. LB and LBU are defined
    /// > analogously for 8-bit values.
    pub(super) fn lb(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, 1, |v| v as u8 as i8 as i64 as u64)
    }

    pub(super) fn lh(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, 2, |v| v as u16 as i16 as i64 as u64)
    }

    pub(super) fn lw(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, 4, |v| v as u32 as i32 as i64 as u64)
    }

    pub(super) fn lbu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, 1, |v| v)
    }

    pub(super) fn lhu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, 2, |v| v)
    }

    pub(super) fn lwu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, 4, |v| v)
    }

    pub(super) fn ld(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, 8, |v| v)
    }

    /// Executes a `sb` instruction.
    ///
    /// > The SW, SH, and SB instructions store 32-bit, 16-bit, and 8-bit values from the low bits
    /// > of register rs2 to memory.
    pub(super) fn sb(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, 1)
    }

    pub(super) fn sh(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, 2)
    }

    pub(super) fn sw(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, 4)
    }

    pub(super) fn sd(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, 8)
    }

    /// Executes an `addi` instruction.
    ///
    /// Corresponds to the assembly instruction `addi dest src immediate`.
    ///
    /// > ADDI adds the sign-extended 12-bit immediate to register rs1. Arithmetic overflow is
    /// > ignored and the result is simply the low XLEN bits of the result. ADDI rd, rs1, 0 is used
    /// > to implement the MV rd, rs1 assembler pseudoinstruction.
    pub(super) fn addi(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    ) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s.wrapping_add(imm))
    }

    /// Executes a `slti` instruction.
    ///
    /// > SLTI (set less than immediate) places the value 1 in register rd if register rs1 is less
    /// > than the sign-extended immediate when both are treated as signed numbers, else 0 is
    /// > written to rd.
    pub(super) fn slti(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    ) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| ((s as i64) < (imm as i64)) as u64)
    }

    /// Executes a `sltiu` instruction.
    ///
    /// > SLTIU is similar but compares the values as unsigned numbers (i.e., the immediate is first
    /// > sign-extended to XLEN bits then treated as an unsigned number).
    pub(super) fn sltiu(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    ) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| (s < imm) as u64)
    }

    pub(super) fn xori(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    ) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s ^ imm)
    }

    pub(super) fn ori(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    ) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s | imm)
    }

    pub(super) fn andi(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    ) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s & imm)
    }

    /// Executes a `slli` instruction.
    ///
    /// > SLLI is a logical left shift (zeros are shifted into the lower bits); SRLI is a logical
    /// > right shift (zeros are shifted into the upper bits); and SRAI is an arithmetic right shift
    /// > (the original sign bit is copied into the vacated upper bits).
    pub(super) fn slli(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt, _| s << shamt)
    }

    pub(super) fn srli(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt, mask| (s & mask) >> shamt)
    }

    pub(super) fn srai(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt, _| ((s as i64) >> shamt) as u64)
    }

    /// Executes an `add` instruction.
    ///
    /// > ADD performs the addition of rs1 and rs2. SUB performs the subtraction of rs2 from rs1.
    /// > Overflows are ignored and the low XLEN bits of results are written to the destination rd.
    pub(super) fn add(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_add(s2))
    }

    pub(super) fn sub(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_sub(s2))
    }

    /// Executes a `sll` instruction.
    ///
    /// > SLL, SRL, and SRA perform logical left, logical right, and arithmetic right shifts on the
    /// > value in register rs1 by the shift amount held in the lower 5 bits of register rs2.
    ///
    /// On RV64 the lower 6 bits are used.
    pub(super) fn sll(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let shamt = (self.registers.x(src2) & self.xlen.shamt_mask()) as u32;
        self.reg_shamt_op(dest, src1, shamt, |s, shamt, _| s << shamt)
    }

    pub(super) fn srl(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let shamt = (self.registers.x(src2) & self.xlen.shamt_mask()) as u32;
        self.reg_shamt_op(dest, src1, shamt, |s, shamt, mask| (s & mask) >> shamt)
    }

    pub(super) fn sra(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let shamt = (self.registers.x(src2) & self.xlen.shamt_mask()) as u32;
        self.reg_shamt_op(dest, src1, shamt, |s, shamt, _| ((s as i64) >> shamt) as u64)
    }

    /// Executes a `slt` instruction.
    ///
    /// > SLT and SLTU perform signed and unsigned compares respectively, writing 1 to rd if
    /// > rs1 < rs2, 0 otherwise.
    pub(super) fn slt(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| ((s1 as i64) < (s2 as i64)) as u64)
    }

    pub(super) fn sltu(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| (s1 < s2) as u64)
    }

    pub(super) fn xor(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 ^ s2)
    }

    pub(super) fn or(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 | s2)
    }

    pub(super) fn and(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 & s2)
    }

    /// Executes an `addiw` instruction.
    ///
    /// > ADDIW is an RV64I instruction that adds the sign-extended 12-bit immediate to register
    /// > rs1 and produces the proper sign-extension of a 32-bit result in rd.
    pub(super) fn addiw(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    ) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| word(s.wrapping_add(imm)))
    }

    pub(super) fn slliw(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt, _| word(s << shamt))
    }

    pub(super) fn srliw(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt, _| word((s as u32 >> shamt) as u64))
    }

    pub(super) fn sraiw(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt, _| ((s as i32) >> shamt) as i64 as u64)
    }

    pub(super) fn addw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| word(s1.wrapping_add(s2)))
    }

    pub(super) fn subw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| word(s1.wrapping_sub(s2)))
    }

    pub(super) fn sllw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| word(s1 << (s2 & 0x1f)))
    }

    pub(super) fn srlw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| word((s1 as u32 >> (s2 & 0x1f)) as u64))
    }

    pub(super) fn sraw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| ((s1 as i32) >> (s2 & 0x1f)) as i64 as u64)
    }

    /// Executes a `mul` instruction.
    ///
    /// > MUL performs an XLEN-bit×XLEN-bit multiplication of rs1 by rs2 and places the lower XLEN
    /// > bits in the destination register. MULH, MULHU, and MULHSU perform the same multiplication
    /// > but return the upper XLEN bits of the full 2×XLEN-bit product, for signed×signed,
    /// > unsigned×unsigned, and signed rs1×unsigned rs2 multiplication, respectively.
    pub(super) fn mul(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_mul(s2))
    }

    pub(super) fn mulh(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let bits = self.xlen.bits();
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i64 as i128 * s2 as i64 as i128) >> bits) as u64
        })
    }

    pub(super) fn mulhsu(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let (bits, mask) = (self.xlen.bits(), self.xlen.mask());
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i64 as i128 * (s2 & mask) as i128) >> bits) as u64
        })
    }

    pub(super) fn mulhu(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let (bits, mask) = (self.xlen.bits(), self.xlen.mask());
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            (((s1 & mask) as u128 * (s2 & mask) as u128) >> bits) as u64
        })
    }

    pub(super) fn mulw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| word(s1.wrapping_mul(s2)))
    }

    /// Executes a `div` instruction.
    ///
    /// > The quotient of division by zero has all bits set, and the remainder of division by
    /// > zero equals the dividend. Signed division overflow occurs only when the most-negative
    /// > integer is divided by −1. The quotient of a signed division with overflow is equal to the
    /// > dividend, and the remainder is zero.
    pub(super) fn div(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| signed_div(s1 as i64, s2 as i64) as u64)
    }

    pub(super) fn divu(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let mask = self.xlen.mask();
        self.reg_reg_op(dest, src1, src2, |s1, s2| unsigned_div(s1 & mask, s2 & mask))
    }

    pub(super) fn rem(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| signed_rem(s1 as i64, s2 as i64) as u64)
    }

    pub(super) fn remu(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let mask = self.xlen.mask();
        self.reg_reg_op(dest, src1, src2, |s1, s2| unsigned_rem(s1 & mask, s2 & mask))
    }

    pub(super) fn divw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            word(signed_div(s1 as i32 as i64, s2 as i32 as i64) as u64)
        })
    }

    pub(super) fn divuw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            word(unsigned_div(s1 as u32 as u64, s2 as u32 as u64))
        })
    }

    pub(super) fn remw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            word(signed_rem(s1 as i32 as i64, s2 as i32 as i64) as u64)
        })
    }

    pub(super) fn remuw(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            word(unsigned_rem(s1 as u32 as u64, s2 as u32 as u64))
        })
    }

    /// Executes a `fence.i` instruction by dropping every cached decode.
    ///
    /// > The FENCE.I instruction is used to synchronize the instruction and data streams.
    pub(super) fn fence_i(&mut self) -> ExecutionResult {
        self.decode_cache.clear();
        Ok(())
    }

    /// Executes an `ecall` instruction.
    ///
    /// > The ECALL instruction is used to make a request to the supporting execution environment.
    pub(super) fn ecall(&mut self) -> ExecutionResult {
        let cause = match self.privilege {
            PrivilegeLevel::User => ExceptionCause::EnvironmentCallFromUMode,
            PrivilegeLevel::Supervisor => ExceptionCause::EnvironmentCallFromSMode,
            PrivilegeLevel::Machine => ExceptionCause::EnvironmentCallFromMMode,
        };
        Err(Exception::new(cause, 0))
    }

    /// Executes an `ebreak` instruction: enters debug mode if dcsr asks for it at the current
    /// privilege level, otherwise raises a breakpoint exception.
    pub(super) fn ebreak(&mut self, pc: u64) -> Result<Completion, Exception> {
        if self.debug.ebreak_enters_debug(self.privilege) {
            self.debug.enter(DebugCause::Ebreak, pc, self.privilege);
            return Ok(Completion::DebugHalt);
        }
        Err(Exception::new(ExceptionCause::Breakpoint, pc))
    }

    /// Executes an `mret` instruction, which is only legal in M-mode.
    pub(super) fn mret(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        if self.privilege < PrivilegeLevel::Machine {
            return Err(illegal(di));
        }
        self.return_from_machine_trap();
        Ok(())
    }

    /// Executes an `sret` instruction.
    ///
    /// > When TSR=1, attempts to execute SRET while executing in S-mode will raise an illegal
    /// > instruction exception.
    pub(super) fn sret(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        let denied = match self.privilege {
            PrivilegeLevel::User => true,
            PrivilegeLevel::Supervisor => self.status.tsr(),
            PrivilegeLevel::Machine => false,
        };
        if denied {
            return Err(illegal(di));
        }
        self.return_from_supervisor_trap();
        Ok(())
    }

    /// Executes a `wfi` instruction. Execution is synchronous and interrupts are checked before
    /// every instruction, so waiting is a no-op.
    ///
    /// > When TW=1, then if WFI is executed in any less-privileged mode, and it does not complete
    /// > within an implementation-specific, bounded time limit, the WFI instruction causes an
    /// > illegal instruction exception.
    pub(super) fn wfi(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        if self.privilege < PrivilegeLevel::Machine && self.status.tw() {
            return Err(illegal(di));
        }
        Ok(())
    }

    /// Executes an `sfence.vma` instruction.
    ///
    /// > If rs1=x0 and rs2=x0, the fence orders all reads and writes made to any level of the
    /// > page tables, for all address spaces.
    ///
    /// > When TVM=1, attempts to read or write the satp CSR or execute an SFENCE.VMA or SINVAL.VMA
    /// > instruction while executing in S-mode will raise an illegal instruction exception.
    pub(super) fn sfence_vma(
        &mut self,
        di: &DecodedInstruction,
        vaddr: Specifier,
        asid: Specifier,
    ) -> ExecutionResult {
        let denied = match self.privilege {
            PrivilegeLevel::User => true,
            PrivilegeLevel::Supervisor => self.status.tvm(),
            PrivilegeLevel::Machine => false,
        };
        if denied {
            return Err(illegal(di));
        }
        let address = (vaddr != Specifier::X0).then(|| self.xlen.address(self.registers.x(vaddr)));
        let asid = (asid != Specifier::X0).then(|| self.registers.x(asid) as u16);
        self.vm.flush(address, asid);
        self.decode_cache.clear();
        Ok(())
    }

    /// Executes a `csrrw`/`csrrwi` instruction.
    ///
    /// > If rd=x0, then the instruction shall not read the CSR and shall not cause any of the side
    /// > effects that might occur on a CSR read.
    pub(super) fn csrrw(
        &mut self,
        di: &DecodedInstruction,
        dest: Specifier,
        value: u64,
        specifier: u32,
    ) -> ExecutionResult {
        let specifier = specifier as CsrSpecifier;
        let old = if dest == Specifier::X0 {
            None
        } else {
            Some(self.read_csr(specifier).map_err(|_| illegal(di))?)
        };
        self.write_csr(specifier, value, u64::MAX)
            .map_err(|_| illegal(di))?;
        if let Some(old) = old {
            self.write_x(dest, old);
        }
        Ok(())
    }

    /// Executes a `csrrs`/`csrrsi` instruction. Without a source (`x0` or a zero immediate) the
    /// CSR is only read.
    pub(super) fn csrrs(
        &mut self,
        di: &DecodedInstruction,
        dest: Specifier,
        write: bool,
        bits: u64,
        specifier: u32,
    ) -> ExecutionResult {
        self.csr_read_modify(di, dest, write.then_some((u64::MAX, bits)), specifier)
    }

    pub(super) fn csrrc(
        &mut self,
        di: &DecodedInstruction,
        dest: Specifier,
        write: bool,
        bits: u64,
        specifier: u32,
    ) -> ExecutionResult {
        self.csr_read_modify(di, dest, write.then_some((0, bits)), specifier)
    }

    /// Executes a `load64` instruction: an 8-byte load whose low word goes to `dest` and whose
    /// high word goes to MDBHD.
    pub(super) fn load64(
        &mut self,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    ) -> ExecutionResult {
        let address = self.effective_address(base, offset);
        let value = self.load(address, 8, true)?;
        let previous = self.mdbhd << 32 | self.registers.x(dest) & 0xffff_ffff;
        self.write_x(dest, value as u32 as i32 as i64 as u64);
        self.mdbhd = value >> 32;
        self.track_load(
            base,
            TrackedLoad {
                dest,
                fp: false,
                address,
                size: 8,
                previous,
                wide: true,
            },
        );
        Ok(())
    }

    /// Executes a `store64` instruction: stores the low word of `src` with MDBHD as high word.
    pub(super) fn store64(
        &mut self,
        src: Specifier,
        base: Specifier,
        offset: i32,
    ) -> ExecutionResult {
        let address = self.effective_address(base, offset);
        let value = self.mdbhd << 32 | self.registers.x(src) & 0xffff_ffff;
        self.store(address, 8, value, true)
    }

    fn csr_read_modify(
        &mut self,
        di: &DecodedInstruction,
        dest: Specifier,
        write: Option<(u64, u64)>,
        specifier: u32,
    ) -> ExecutionResult {
        let specifier = specifier as CsrSpecifier;
        let old = self.read_csr(specifier).map_err(|_| illegal(di))?;
        if let Some((value, mask)) = write {
            self.write_csr(specifier, value, mask)
                .map_err(|_| illegal(di))?;
        }
        self.write_x(dest, old);
        Ok(())
    }

    /// Jumps to `target`, writing the address of the next instruction to `dest`.
    fn jump(&mut self, dest: Specifier, target: u64) -> ExecutionResult {
        let target = self.xlen.address(target);
        self.check_jump_target(target)?;
        let return_address = self.registers.pc();
        self.write_x(dest, return_address);
        self.set_pc(target);
        Ok(())
    }

    /// > The conditional branch instructions will generate an instruction-address-misaligned
    /// > exception if the target address is not aligned to a four-byte boundary and the branch
    /// > condition evaluates to true.
    ///
    /// With compressed instructions enabled two-byte alignment suffices.
    fn check_jump_target(&self, target: u64) -> ExecutionResult {
        let alignment = if self.config.extensions.c { 2 } else { 4 };
        if target % alignment != 0 {
            return Err(Exception::new(ExceptionCause::InstructionAddressMisaligned, target));
        }
        Ok(())
    }

    // Takes the branch if `predicate` returns `true`.
    fn cond_branch<P>(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        pc: u64,
        offset: i32,
        predicate: P,
    ) -> ExecutionResult
    where
        P: FnOnce(u64, u64) -> bool,
    {
        if predicate(self.registers.x(src1), self.registers.x(src2)) {
            let target = self.xlen.address(pc.wrapping_add_signed(offset as i64));
            self.check_jump_target(target)?;
            self.set_pc(target);
        }
        Ok(())
    }

    #[inline]
    fn reg_imm_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u64, u64) -> u64,
    {
        let value = op(self.registers.x(src), immediate as i64 as u64);
        self.write_x(dest, value);
        Ok(())
    }

    /// `op` receives the source, the shift amount and the register width mask.
    #[inline]
    fn reg_shamt_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shamt: u32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u64, u32, u64) -> u64,
    {
        if shamt as u64 > self.xlen.shamt_mask() {
            panic!("shift amount {shamt} out of range for {}", self.xlen);
        }
        let value = op(self.registers.x(src), shamt, self.xlen.mask());
        self.write_x(dest, value);
        Ok(())
    }

    #[inline]
    fn reg_reg_op<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u64, u64) -> u64,
    {
        let value = op(self.registers.x(src1), self.registers.x(src2));
        self.write_x(dest, value);
        Ok(())
    }

    #[inline]
    fn load_op<F>(
        &mut self,
        dest: Specifier,
        base: Specifier,
        offset: i32,
        size: u64,
        extend: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u64) -> u64,
    {
        let address = self.effective_address(base, offset);
        let value = self.load(address, size, false)?;
        let previous = self.registers.x(dest);
        self.write_x(dest, extend(value));
        self.track_load(
            base,
            TrackedLoad {
                dest,
                fp: false,
                address,
                size,
                previous,
                wide: false,
            },
        );
        Ok(())
    }

    #[inline]
    fn store_op(
        &mut self,
        src: Specifier,
        base: Specifier,
        offset: i32,
        size: u64,
    ) -> ExecutionResult {
        let address = self.effective_address(base, offset);
        let value = self.registers.x(src);
        self.store(address, size, value, false)
    }
}

/// Sign-extends the low word of `value`.
fn word(value: u64) -> u64 {
    value as u32 as i32 as i64 as u64
}

fn signed_div(dividend: i64, divisor: i64) -> i64 {
    if divisor == 0 {
        -1
    } else {
        dividend.wrapping_div(divisor)
    }
}

fn signed_rem(dividend: i64, divisor: i64) -> i64 {
    if divisor == 0 {
        dividend
    } else {
        dividend.wrapping_rem(divisor)
    }
}

fn unsigned_div(dividend: u64, divisor: u64) -> u64 {
    dividend.checked_div(divisor).unwrap_or(u64::MAX)
}

fn unsigned_rem(dividend: u64, divisor: u64) -> u64 {
    if divisor == 0 {
        dividend
    } else {
        dividend % divisor
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{hart, hart_with, retire, retire_n, x};
    use crate::cause::ExceptionCause;
    use crate::csr;
    use crate::decode::Extensions;
    use crate::hart::{Config, StepOutcome};
    use crate::memory::Bus;
    use crate::{PrivilegeLevel, Xlen};

    fn rv64() -> Config {
        Config {
            xlen: Xlen::Rv64,
            ..Config::default()
        }
    }

    #[test]
    fn arithmetic_wraps_at_register_width() {
        // addi x1, x0, -1; srli x2, x1, 1; addi x3, x1, 1; sltu x4, x0, x1; slt x5, x1, x0
        let mut hart = hart(&[0xfff0_0093, 0x0010_d113, 0x0010_8193, 0x0010_3233, 0x0000_a2b3]);
        retire_n(&mut hart, 5);
        let regs = hart.registers();
        assert_eq!(regs.x(x(1)), u64::MAX);
        // The logical shift sees the 32-bit value.
        assert_eq!(regs.x(x(2)), 0x7fff_ffff);
        assert_eq!(regs.x(x(3)), 0);
        assert_eq!(regs.x(x(4)), 1);
        assert_eq!(regs.x(x(5)), 1);
    }

    #[test]
    fn word_operations_sign_extend() {
        // lui x1, 0x80000; addiw x2, x1, -1; sraiw x3, x1, 4; srliw x4, x1, 4
        let mut hart = hart_with(&[0x8000_00b7, 0xfff0_811b, 0x4040_d19b, 0x0040_d21b], rv64());
        retire_n(&mut hart, 4);
        let regs = hart.registers();
        assert_eq!(regs.x(x(1)), 0xffff_ffff_8000_0000);
        assert_eq!(regs.x(x(2)), 0x7fff_ffff);
        assert_eq!(regs.x(x(3)), 0xffff_ffff_f800_0000);
        assert_eq!(regs.x(x(4)), 0x0800_0000);
    }

    #[test]
    fn division_corner_cases() {
        // div x3, x1, x2; rem x4, x1, x2; divu x5, x1, x0; remu x6, x1, x0
        let mut hart = hart(&[0x0220_c1b3, 0x0220_e233, 0x0200_d2b3, 0x0200_f333]);
        hart.registers_mut().set_x(x(1), 0xffff_ffff_8000_0000);
        hart.registers_mut().set_x(x(2), u64::MAX);
        retire_n(&mut hart, 4);
        let regs = hart.registers();
        assert_eq!(regs.x(x(3)), 0xffff_ffff_8000_0000);
        assert_eq!(regs.x(x(4)), 0);
        assert_eq!(regs.x(x(5)), u64::MAX);
        assert_eq!(regs.x(x(6)), 0xffff_ffff_8000_0000);
    }

    #[test]
    fn high_multiplication() {
        // mulh x3, x1, x2; mulhu x4, x1, x2; mulhsu x5, x1, x2
        let mut hart = hart(&[0x0220_91b3, 0x0220_b233, 0x0220_a2b3]);
        hart.registers_mut().set_x(x(1), u64::MAX);
        hart.registers_mut().set_x(x(2), u64::MAX);
        retire_n(&mut hart, 3);
        let regs = hart.registers();
        assert_eq!(regs.x(x(3)), 0);
        assert_eq!(regs.x(x(4)), 0xffff_ffff_ffff_fffe);
        assert_eq!(regs.x(x(5)), u64::MAX);
    }

    #[test]
    fn jumps_and_branches() {
        // jal x1, 8; (skipped); beq x0, x0, -4 → back to the skipped slot: addi x2, x0, 5
        let mut hart = hart(&[0x0080_00ef, 0x0050_0113, 0xfe00_0ee3]);
        retire(&mut hart);
        assert_eq!(hart.pc(), 8);
        assert_eq!(hart.registers().x(x(1)), 4);
        retire(&mut hart);
        assert_eq!(hart.pc(), 4);
        retire(&mut hart);
        assert_eq!(hart.registers().x(x(2)), 5);
    }

    #[test]
    fn misaligned_jump_target_without_compressed() {
        // jal x0, 6
        let mut hart = hart_with(
            &[0x0060_006f],
            Config {
                extensions: Extensions {
                    c: false,
                    ..Extensions::all()
                },
                ..Config::default()
            },
        );
        hart.write_csr(csr::MTVEC, 0x100, u64::MAX).unwrap();
        let outcome = hart.step().unwrap();
        let StepOutcome::Exception(exception) = outcome else {
            panic!("expected an exception, got {outcome:?}");
        };
        assert_eq!(exception.cause, ExceptionCause::InstructionAddressMisaligned);
        assert_eq!(exception.tval, 6);
        assert_eq!(hart.read_csr(csr::MEPC), Ok(0));
    }

    #[test]
    fn loads_extend_by_width() {
        // lb x1, 0x100(x0); lbu x2, 0x100(x0); lh x3, 0x100(x0); sw x3, 0x104(x0)
        let mut hart = hart(&[0x1000_0083, 0x1000_4103, 0x1000_1183, 0x1030_2223]);
        hart.bus_mut().write_u16(0x100, 0x8081).unwrap();
        retire_n(&mut hart, 4);
        let regs = hart.registers();
        assert_eq!(regs.x(x(1)), 0xffff_ffff_ffff_ff81);
        assert_eq!(regs.x(x(2)), 0x81);
        assert_eq!(regs.x(x(3)), 0xffff_ffff_ffff_8081);
        assert_eq!(hart.bus().read_u32(0x104), Ok(0xffff_8081));
    }

    #[test]
    fn csr_instructions() {
        // csrrw x1, mscratch, x2; csrrs x3, mscratch, x0; csrrci x4, mscratch, 1
        let mut hart = hart(&[0x3401_10f3, 0x3400_21f3, 0x3400_f273]);
        hart.registers_mut().set_x(x(2), 0x55);
        retire_n(&mut hart, 3);
        let regs = hart.registers();
        assert_eq!(regs.x(x(1)), 0);
        assert_eq!(regs.x(x(3)), 0x55);
        assert_eq!(regs.x(x(4)), 0x55);
        assert_eq!(hart.read_csr(csr::MSCRATCH), Ok(0x54));
    }

    #[test]
    fn csr_write_to_read_only_is_illegal() {
        // csrrw x0, mhartid, x1
        let mut hart = hart(&[0xf140_9073]);
        let outcome = hart.step().unwrap();
        let StepOutcome::Exception(exception) = outcome else {
            panic!("expected an exception, got {outcome:?}");
        };
        assert_eq!(exception.cause, ExceptionCause::IllegalInstruction);
        assert_eq!(exception.tval, 0xf140_9073);
    }

    #[test]
    fn ecall_cause_follows_privilege() {
        // ecall
        let mut hart = hart(&[0x0000_0073]);
        hart.privilege = PrivilegeLevel::User;
        let outcome = hart.step().unwrap();
        let StepOutcome::Exception(exception) = outcome else {
            panic!("expected an exception, got {outcome:?}");
        };
        assert_eq!(exception.cause, ExceptionCause::EnvironmentCallFromUMode);
        assert_eq!(hart.privilege(), PrivilegeLevel::Machine);
    }

    #[test]
    fn ebreak_enters_debug_mode_when_enabled() {
        // ebreak
        let mut hart = hart(&[0x0010_0073]);
        hart.debug.write_dcsr(1 << 15, 1 << 15);
        assert_eq!(hart.step(), Ok(StepOutcome::DebugHalt));
        assert!(hart.is_debug_mode());
        assert_eq!(hart.debug.dpc, 0);
        assert_eq!(hart.retired(), 0);
    }

    #[test]
    fn mret_restores_privilege() {
        // mret
        let mut hart = hart(&[0x3020_0073]);
        hart.write_csr(csr::MEPC, 0x40, u64::MAX).unwrap();
        // MPP = U, MPIE = 1
        hart.write_csr(csr::MSTATUS, 1 << 7, 0b11 << 11 | 1 << 7).unwrap();
        retire(&mut hart);
        assert_eq!(hart.pc(), 0x40);
        assert_eq!(hart.privilege(), PrivilegeLevel::User);
    }

    #[test]
    fn delegation_never_raises_above_supervisor() {
        let mut hart = hart(&[0]);
        hart.write_csr(csr::MEDELEG, 1 << 2, u64::MAX).unwrap();
        hart.write_csr(csr::STVEC, 0x80, u64::MAX).unwrap();
        hart.privilege = PrivilegeLevel::User;
        assert!(matches!(hart.step(), Ok(StepOutcome::Exception(_))));
        assert_eq!(hart.privilege(), PrivilegeLevel::Supervisor);
        assert_eq!(hart.pc(), 0x80);

        // Delegation does not apply to traps taken in M-mode.
        hart.set_pc(0);
        hart.privilege = PrivilegeLevel::Machine;
        assert!(matches!(hart.step(), Ok(StepOutcome::Exception(_))));
        assert_eq!(hart.privilege(), PrivilegeLevel::Machine);
        assert_eq!(hart.pc(), 0);
    }

    #[test]
    fn wfi_traps_under_timeout_wait() {
        // wfi
        let mut hart = hart(&[0x1050_0073]);
        hart.write_csr(csr::MSTATUS, 1 << 21, 1 << 21).unwrap();
        // M-mode is never affected.
        retire(&mut hart);
        hart.set_pc(0);
        hart.privilege = PrivilegeLevel::Supervisor;
        let outcome = hart.step().unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Exception(e) if e.cause == ExceptionCause::IllegalInstruction
        ));
    }

    #[test]
    fn wide_load_and_store_use_mdbhd() {
        // lui x1, 0x8; load64 x2, 0(x1); store64 x2, 8(x1)
        let mut hart = hart_with(
            &[0x0000_80b7, 0x0000_b10b, 0x0020_b42b],
            Config {
                enable_wide_ld_st: true,
                ..Config::default()
            },
        );
        hart.bus_mut().write_u64(0x8000, 0x1122_3344_8899_aabb).unwrap();
        retire_n(&mut hart, 3);
        assert_eq!(hart.registers().x(x(2)), 0xffff_ffff_8899_aabb);
        assert_eq!(hart.read_csr(csr::MDBHD), Ok(0x1122_3344));
        assert_eq!(hart.bus().read_u64(0x8008), Ok(0x1122_3344_8899_aabb));
    }
}
