//! The execution engine: carries out the semantics of one decoded instruction on a [`Hart`].
//!
//! When an instruction starts executing, the pc already points past it. An instruction that
//! transfers control overwrites the pc; an instruction that raises an exception leaves the rest
//! of the architectural state untouched, and the caller restores the pc before taking the trap.

mod atomic;
mod bitmanip;
mod fp;
mod int;
mod vector;
mod vector_fp;
mod vector_mem;

use super::Hart;
use crate::catalog::InstructionId;
use crate::cause::Exception;
use crate::decode::DecodedInstruction;
use crate::load_queue::LoadQueueEntry;
use crate::memory::Bus;
use crate::registers::Specifier;
use vector::VectorUnit;

/// How an instruction that did not raise an exception completed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum Completion {
    Retired,
    /// An indirect jump into the builtin-dispatch encoding with the given non-zero id.
    Builtin(u64),
    /// An indirect jump into the builtin-dispatch encoding with id `0`.
    Finished,
    /// An `ebreak` halted the hart in debug mode.
    DebugHalt,
}

/// Result of an instruction that retires whenever it does not raise an exception.
pub(super) type ExecutionResult = Result<(), Exception>;

/// Illegal-instruction exception for `di`. Compressed encodings report only their 16 bits.
pub(super) fn illegal(di: &DecodedInstruction) -> Exception {
    let raw = if di.is_compressed() {
        di.raw() & 0xffff
    } else {
        di.raw()
    };
    Exception::illegal_instruction(raw)
}

impl<B: Bus> Hart<B> {
    /// Executes `di`, whose encoding was fetched from `di.address()`.
    pub(super) fn execute(&mut self, di: &DecodedInstruction) -> Result<Completion, Exception> {
        let result = match engine(di.id()) {
            Engine::Integer => return self.execute_integer(di),
            Engine::Atomic => self.execute_atomic(di),
            Engine::Float => self.execute_fp(di),
            Engine::BitManip => self.execute_bitmanip(di),
            Engine::Vector(unit) => self.execute_vector(di, unit),
        };
        result.map(|()| Completion::Retired)
    }

    /// Base integer, multiply/divide, system and custom instructions.
    fn execute_integer(&mut self, di: &DecodedInstruction) -> Result<Completion, Exception> {
        use InstructionId as I;

        let address = di.address();
        let (r0, r1, r2) = (di.reg(0), di.reg(1), di.reg(2));
        let result = match di.id() {
            I::Illegal => Err(illegal(di)),
            I::Lui => self.lui(r0, di.imm(1)),
            I::Auipc => self.auipc(r0, address, di.imm(1)),
            I::Jal => self.jal(r0, address, di.imm(1)),
            I::Jalr => return self.jalr(r0, r1, di.imm(2)),
            I::Beq => self.beq(r0, r1, address, di.imm(2)),
            I::Bne => self.bne(r0, r1, address, di.imm(2)),
            I::Blt => self.blt(r0, r1, address, di.imm(2)),
            I::Bge => self.bge(r0, r1, address, di.imm(2)),
            I::Bltu => self.bltu(r0, r1, address, di.imm(2)),
            I::Bgeu => self.bgeu(r0, r1, address, di.imm(2)),
            I::Lb => self.lb(r0, r1, di.imm(2)),
            I::Lh => self.lh(r0, r1, di.imm(2)),
            I::Lw => self.lw(r0, r1, di.imm(2)),
            I::Lbu => self.lbu(r0, r1, di.imm(2)),
            I::Lhu => self.lhu(r0, r1, di.imm(2)),
            I::Lwu => self.lwu(r0, r1, di.imm(2)),
            I::Ld => self.ld(r0, r1, di.imm(2)),
            I::Sb => self.sb(r0, r1, di.imm(2)),
            I::Sh => self.sh(r0, r1, di.imm(2)),
            I::Sw => self.sw(r0, r1, di.imm(2)),
            I::Sd => self.sd(r0, r1, di.imm(2)),
            I::Addi => self.addi(r0, r1, di.imm(2)),
            I::Slti => self.slti(r0, r1, di.imm(2)),
            I::Sltiu => self.sltiu(r0, r1, di.imm(2)),
            I::Xori => self.xori(r0, r1, di.imm(2)),
            I::Ori => self.ori(r0, r1, di.imm(2)),
            I::Andi => self.andi(r0, r1, di.imm(2)),
            I::Slli => self.slli(r0, r1, di.op2()),
            I::Srli => self.srli(r0, r1, di.op2()),
            I::Srai => self.srai(r0, r1, di.op2()),
            I::Add => self.add(r0, r1, r2),
            I::Sub => self.sub(r0, r1, r2),
            I::Sll => self.sll(r0, r1, r2),
            I::Slt => self.slt(r0, r1, r2),
            I::Sltu => self.sltu(r0, r1, r2),
            I::Xor => self.xor(r0, r1, r2),
            I::Srl => self.srl(r0, r1, r2),
            I::Sra => self.sra(r0, r1, r2),
            I::Or => self.or(r0, r1, r2),
            I::And => self.and(r0, r1, r2),
            I::Fence => Ok(()),
            I::FenceI => self.fence_i(),
            I::Ecall => self.ecall(),
            I::Ebreak => return self.ebreak(address),
            I::Uret => Err(illegal(di)),
            I::Sret => self.sret(di),
            I::Mret => self.mret(di),
            I::Wfi => self.wfi(di),
            I::SfenceVma => self.sfence_vma(di, r0, r1),
            I::Csrrw => self.csrrw(di, r0, self.registers.x(r1), di.op2()),
            I::Csrrs => self.csrrs(di, r0, r1 != Specifier::X0, self.registers.x(r1), di.op2()),
            I::Csrrc => self.csrrc(di, r0, r1 != Specifier::X0, self.registers.x(r1), di.op2()),
            I::Csrrwi => self.csrrw(di, r0, di.op1() as u64, di.op2()),
            I::Csrrsi => self.csrrs(di, r0, di.op1() != 0, di.op1() as u64, di.op2()),
            I::Csrrci => self.csrrc(di, r0, di.op1() != 0, di.op1() as u64, di.op2()),
            I::Addiw => self.addiw(r0, r1, di.imm(2)),
            I::Slliw => self.slliw(r0, r1, di.op2()),
            I::Srliw => self.srliw(r0, r1, di.op2()),
            I::Sraiw => self.sraiw(r0, r1, di.op2()),
            I::Addw => self.addw(r0, r1, r2),
            I::Subw => self.subw(r0, r1, r2),
            I::Sllw => self.sllw(r0, r1, r2),
            I::Srlw => self.srlw(r0, r1, r2),
            I::Sraw => self.sraw(r0, r1, r2),
            I::Mul => self.mul(r0, r1, r2),
            I::Mulh => self.mulh(r0, r1, r2),
            I::Mulhsu => self.mulhsu(r0, r1, r2),
            I::Mulhu => self.mulhu(r0, r1, r2),
            I::Mulw => self.mulw(r0, r1, r2),
            I::Div => self.div(r0, r1, r2),
            I::Divu => self.divu(r0, r1, r2),
            I::Rem => self.rem(r0, r1, r2),
            I::Remu => self.remu(r0, r1, r2),
            I::Divw => self.divw(r0, r1, r2),
            I::Divuw => self.divuw(r0, r1, r2),
            I::Remw => self.remw(r0, r1, r2),
            I::Remuw => self.remuw(r0, r1, r2),
            I::Load64 => self.load64(r0, r1, di.imm(2)),
            I::Store64 => self.store64(r0, r1, di.imm(2)),
            I::Bbarrier => Ok(()),
            id => unreachable!("{id} is not an integer instruction"),
        };
        result.map(|()| Completion::Retired)
    }

    /// Writes an `x` register, keeping the value canonical for the register width.
    pub(super) fn write_x(&mut self, dest: Specifier, value: u64) {
        self.registers.set_x(dest, self.xlen.canonical(value));
    }

    /// Effective address of a `base + offset` access.
    pub(super) fn effective_address(&self, base: Specifier, offset: i32) -> u64 {
        self.xlen
            .address(self.registers.x(base).wrapping_add_signed(offset as i64))
    }

    /// Updates the load queue after a scalar load from `address` into `dest` retired.
    ///
    /// The base register has been read, so a pending load into it must have finished. The load
    /// is tracked only when it targets external memory, whose bus errors arrive later.
    pub(super) fn track_load(&mut self, base: Specifier, load: TrackedLoad) {
        if !self.config.load_queue_enabled {
            return;
        }
        self.load_queue.remove(base.into(), false);
        let register: u8 = load.dest.into();
        if self.regions.is_external(load.address) && (load.fp || register != 0) {
            let tag = self.counters.cycles();
            self.load_queue.put(LoadQueueEntry::new(
                load.size,
                load.address,
                register,
                load.fp,
                load.previous,
                load.wide,
                tag,
            ));
        } else {
            self.load_queue.invalidate(register, load.fp);
        }
    }
}

/// A retired load, as recorded by [`Hart::track_load`].
#[derive(Debug, Copy, Clone)]
pub(super) struct TrackedLoad {
    pub dest: Specifier,
    pub fp: bool,
    pub address: u64,
    pub size: u64,
    /// Destination value before the load.
    pub previous: u64,
    pub wide: bool,
}

/// The engine that carries out an instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Engine {
    /// Base integer, multiply/divide, system and custom instructions.
    Integer,
    Atomic,
    Float,
    BitManip,
    Vector(VectorUnit),
}

/// Routes `id` to the engine that carries it out.
fn engine(id: InstructionId) -> Engine {
    use InstructionId as I;

    match id {
        I::Illegal
        | I::Lui
        | I::Auipc
        | I::Jal
        | I::Jalr
        | I::Beq
        | I::Bne
        | I::Blt
        | I::Bge
        | I::Bltu
        | I::Bgeu
        | I::Lb
        | I::Lh
        | I::Lw
        | I::Lbu
        | I::Lhu
        | I::Lwu
        | I::Ld
        | I::Sb
        | I::Sh
        | I::Sw
        | I::Sd
        | I::Addi
        | I::Slti
        | I::Sltiu
        | I::Xori
        | I::Ori
        | I::Andi
        | I::Slli
        | I::Srli
        | I::Srai
        | I::Add
        | I::Sub
        | I::Sll
        | I::Slt
        | I::Sltu
        | I::Xor
        | I::Srl
        | I::Sra
        | I::Or
        | I::And
        | I::Fence
        | I::FenceI
        | I::Ecall
        | I::Ebreak
        | I::Uret
        | I::Sret
        | I::Mret
        | I::Wfi
        | I::SfenceVma
        | I::Csrrw
        | I::Csrrs
        | I::Csrrc
        | I::Csrrwi
        | I::Csrrsi
        | I::Csrrci
        | I::Addiw
        | I::Slliw
        | I::Srliw
        | I::Sraiw
        | I::Addw
        | I::Subw
        | I::Sllw
        | I::Srlw
        | I::Sraw
        | I::Mul
        | I::Mulh
        | I::Mulhsu
        | I::Mulhu
        | I::Mulw
        | I::Div
        | I::Divu
        | I::Rem
        | I::Remu
        | I::Divw
        | I::Divuw
        | I::Remw
        | I::Remuw
        | I::Load64
        | I::Store64
        | I::Bbarrier => Engine::Integer,
        I::LrW
        | I::ScW
        | I::AmoswapW
        | I::AmoaddW
        | I::AmoxorW
        | I::AmoandW
        | I::AmoorW
        | I::AmominW
        | I::AmomaxW
        | I::AmominuW
        | I::AmomaxuW
        | I::LrD
        | I::ScD
        | I::AmoswapD
        | I::AmoaddD
        | I::AmoxorD
        | I::AmoandD
        | I::AmoorD
        | I::AmominD
        | I::AmomaxD
        | I::AmominuD
        | I::AmomaxuD => Engine::Atomic,
        I::Flw
        | I::Fsw
        | I::FmaddS
        | I::FmsubS
        | I::FnmsubS
        | I::FnmaddS
        | I::FaddS
        | I::FsubS
        | I::FmulS
        | I::FdivS
        | I::FsqrtS
        | I::FsgnjS
        | I::FsgnjnS
        | I::FsgnjxS
        | I::FminS
        | I::FmaxS
        | I::FcvtWS
        | I::FcvtSW
        | I::FcvtWuS
        | I::FcvtSWu
        | I::FcvtLS
        | I::FcvtSL
        | I::FcvtLuS
        | I::FcvtSLu
        | I::FmvXW
        | I::FmvWX
        | I::FeqS
        | I::FltS
        | I::FleS
        | I::FclassS
        | I::Fld
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
        | I::FclassD
        | I::Flh
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
        | I::FclassH
        | I::FcvtSD
        | I::FcvtDS
        | I::FcvtSH
        | I::FcvtHS
        | I::FcvtDH
        | I::FcvtHD => Engine::Float,
        I::Clz
        | I::Ctz
        | I::Cpop
        | I::Clzw
        | I::Ctzw
        | I::Cpopw
        | I::SextB
        | I::SextH
        | I::Rev8
        | I::OrcB
        | I::Crc32B
        | I::Crc32H
        | I::Crc32W
        | I::Crc32D
        | I::Crc32cB
        | I::Crc32cH
        | I::Crc32cW
        | I::Crc32cD
        | I::Bmatflip
        | I::Min
        | I::Max
        | I::Minu
        | I::Maxu
        | I::Andn
        | I::Orn
        | I::Xnor
        | I::Rol
        | I::Ror
        | I::Rolw
        | I::Rorw
        | I::Pack
        | I::Packh
        | I::Packu
        | I::Packw
        | I::Packuw
        | I::Grev
        | I::Grevw
        | I::Gorc
        | I::Gorcw
        | I::Shfl
        | I::Unshfl
        | I::Shflw
        | I::Unshflw
        | I::XpermN
        | I::XpermB
        | I::XpermH
        | I::XpermW
        | I::Bset
        | I::Bclr
        | I::Binv
        | I::Bext
        | I::Bcompress
        | I::Bdecompress
        | I::Bcompressw
        | I::Bdecompressw
        | I::Bfp
        | I::Bfpw
        | I::Clmul
        | I::Clmulh
        | I::Clmulr
        | I::Sh1add
        | I::Sh2add
        | I::Sh3add
        | I::Sh1addUw
        | I::Sh2addUw
        | I::Sh3addUw
        | I::AddUw
        | I::Bmator
        | I::Bmatxor
        | I::Rori
        | I::Roriw
        | I::Grevi
        | I::Greviw
        | I::Gorci
        | I::Gorciw
        | I::Shfli
        | I::Unshfli
        | I::Bseti
        | I::Bclri
        | I::Binvi
        | I::Bexti
        | I::SlliUw
        | I::Cmix
        | I::Cmov
        | I::Fsl
        | I::Fsr
        | I::Fslw
        | I::Fsrw
        | I::Fsri
        | I::Fsriw => Engine::BitManip,
        I::Vsetvli
        | I::Vsetivli
        | I::Vsetvl => Engine::Vector(VectorUnit::Config),
        I::VaddVv
        | I::VaddVx
        | I::VaddVi
        | I::VandVv
        | I::VandVx
        | I::VandVi
        | I::VorVv
        | I::VorVx
        | I::VorVi
        | I::VxorVv
        | I::VxorVx
        | I::VxorVi
        | I::VsllVv
        | I::VsllVx
        | I::VsllVi
        | I::VsrlVv
        | I::VsrlVx
        | I::VsrlVi
        | I::VsraVv
        | I::VsraVx
        | I::VsraVi
        | I::VsadduVv
        | I::VsadduVx
        | I::VsadduVi
        | I::VsaddVv
        | I::VsaddVx
        | I::VsaddVi
        | I::VssrlVv
        | I::VssrlVx
        | I::VssrlVi
        | I::VssraVv
        | I::VssraVx
        | I::VssraVi
        | I::VrgatherVv
        | I::VrgatherVx
        | I::VrgatherVi
        | I::VsubVv
        | I::VsubVx
        | I::VminuVv
        | I::VminuVx
        | I::VminVv
        | I::VminVx
        | I::VmaxuVv
        | I::VmaxuVx
        | I::VmaxVv
        | I::VmaxVx
        | I::VssubuVv
        | I::VssubuVx
        | I::VssubVv
        | I::VssubVx
        | I::VaadduVv
        | I::VaadduVx
        | I::VaaddVv
        | I::VaaddVx
        | I::VasubuVv
        | I::VasubuVx
        | I::VasubVv
        | I::VasubVx
        | I::VsmulVv
        | I::VsmulVx
        | I::VrsubVx
        | I::VrsubVi
        | I::Vrgatherei16Vv
        | I::VmulVv
        | I::VmulVx
        | I::VmulhVv
        | I::VmulhVx
        | I::VmulhuVv
        | I::VmulhuVx
        | I::VmulhsuVv
        | I::VmulhsuVx
        | I::VdivuVv
        | I::VdivuVx
        | I::VdivVv
        | I::VdivVx
        | I::VremuVv
        | I::VremuVx
        | I::VremVv
        | I::VremVx
        | I::VmaccVv
        | I::VmaccVx
        | I::VnmsacVv
        | I::VnmsacVx
        | I::VmaddVv
        | I::VmaddVx
        | I::VnmsubVv
        | I::VnmsubVx
        | I::VadcVvm
        | I::VadcVxm
        | I::VadcVim
        | I::VmadcVvm
        | I::VmadcVxm
        | I::VmadcVim
        | I::VsbcVvm
        | I::VsbcVxm
        | I::VmsbcVvm
        | I::VmsbcVxm
        | I::VmergeVvm
        | I::VmergeVxm
        | I::VmergeVim
        | I::VmvVV
        | I::VmvVX
        | I::VmvVI
        | I::VmseqVv
        | I::VmseqVx
        | I::VmseqVi
        | I::VmsneVv
        | I::VmsneVx
        | I::VmsneVi
        | I::VmsleuVv
        | I::VmsleuVx
        | I::VmsleuVi
        | I::VmsleVv
        | I::VmsleVx
        | I::VmsleVi
        | I::VmsltuVv
        | I::VmsltuVx
        | I::VmsltVv
        | I::VmsltVx
        | I::VmsgtuVx
        | I::VmsgtuVi
        | I::VmsgtVx
        | I::VmsgtVi
        | I::VwadduVv
        | I::VwadduVx
        | I::VwadduWv
        | I::VwadduWx
        | I::VwaddVv
        | I::VwaddVx
        | I::VwaddWv
        | I::VwaddWx
        | I::VwsubuVv
        | I::VwsubuVx
        | I::VwsubuWv
        | I::VwsubuWx
        | I::VwsubVv
        | I::VwsubVx
        | I::VwsubWv
        | I::VwsubWx
        | I::VwmuluVv
        | I::VwmuluVx
        | I::VwmulsuVv
        | I::VwmulsuVx
        | I::VwmulVv
        | I::VwmulVx
        | I::VwmaccuVv
        | I::VwmaccuVx
        | I::VwmaccVv
        | I::VwmaccVx
        | I::VwmaccsuVv
        | I::VwmaccsuVx
        | I::VwmaccusVx
        | I::VnsrlWv
        | I::VnsrlWx
        | I::VnsrlWi
        | I::VnsraWv
        | I::VnsraWx
        | I::VnsraWi
        | I::VnclipuWv
        | I::VnclipuWx
        | I::VnclipuWi
        | I::VnclipWv
        | I::VnclipWx
        | I::VnclipWi
        | I::VredsumVs
        | I::VredandVs
        | I::VredorVs
        | I::VredxorVs
        | I::VredminuVs
        | I::VredminVs
        | I::VredmaxuVs
        | I::VredmaxVs
        | I::VwredsumuVs
        | I::VwredsumVs
        | I::VmandMm
        | I::VmnandMm
        | I::VmandnMm
        | I::VmxorMm
        | I::VmorMm
        | I::VmnorMm
        | I::VmornMm
        | I::VmxnorMm
        | I::VcpopM
        | I::VfirstM
        | I::VmsbfM
        | I::VmsofM
        | I::VmsifM
        | I::ViotaM
        | I::VidV
        | I::VzextVf2
        | I::VzextVf4
        | I::VzextVf8
        | I::VsextVf2
        | I::VsextVf4
        | I::VsextVf8
        | I::VmvXS
        | I::VmvSX
        | I::VslideupVx
        | I::VslideupVi
        | I::VslidedownVx
        | I::VslidedownVi
        | I::Vslide1upVx
        | I::Vslide1downVx
        | I::VcompressVm => Engine::Vector(VectorUnit::Integer),
        I::Vmv1rV
        | I::Vmv2rV
        | I::Vmv4rV
        | I::Vmv8rV => Engine::Vector(VectorUnit::WholeMove),
        I::VfmvFS
        | I::VfmvSF
        | I::Vfslide1upVf
        | I::Vfslide1downVf
        | I::VfaddVv
        | I::VfaddVf
        | I::VfsubVv
        | I::VfsubVf
        | I::VfmulVv
        | I::VfmulVf
        | I::VfdivVv
        | I::VfdivVf
        | I::VfrdivVf
        | I::VfrsubVf
        | I::VfminVv
        | I::VfminVf
        | I::VfmaxVv
        | I::VfmaxVf
        | I::VfsgnjVv
        | I::VfsgnjVf
        | I::VfsgnjnVv
        | I::VfsgnjnVf
        | I::VfsgnjxVv
        | I::VfsgnjxVf
        | I::VfmaccVv
        | I::VfmaccVf
        | I::VfnmaccVv
        | I::VfnmaccVf
        | I::VfmsacVv
        | I::VfmsacVf
        | I::VfnmsacVv
        | I::VfnmsacVf
        | I::VfmaddVv
        | I::VfmaddVf
        | I::VfnmaddVv
        | I::VfnmaddVf
        | I::VfmsubVv
        | I::VfmsubVf
        | I::VfnmsubVv
        | I::VfnmsubVf
        | I::VfsqrtV
        | I::VfclassV
        | I::VfmergeVfm
        | I::VfmvVF
        | I::VmfeqVv
        | I::VmfeqVf
        | I::VmfneVv
        | I::VmfneVf
        | I::VmfltVv
        | I::VmfltVf
        | I::VmfleVv
        | I::VmfleVf
        | I::VmfgtVf
        | I::VmfgeVf
        | I::VfredusumVs
        | I::VfredosumVs
        | I::VfredminVs
        | I::VfredmaxVs
        | I::VfwredusumVs
        | I::VfwredosumVs
        | I::VfwaddVv
        | I::VfwaddVf
        | I::VfwaddWv
        | I::VfwaddWf
        | I::VfwsubVv
        | I::VfwsubVf
        | I::VfwsubWv
        | I::VfwsubWf
        | I::VfwmulVv
        | I::VfwmulVf
        | I::VfwmaccVv
        | I::VfwmaccVf
        | I::VfwnmaccVv
        | I::VfwnmaccVf
        | I::VfwmsacVv
        | I::VfwmsacVf
        | I::VfwnmsacVv
        | I::VfwnmsacVf
        | I::VfcvtXuFV
        | I::VfcvtXFV
        | I::VfcvtFXuV
        | I::VfcvtFXV
        | I::VfcvtRtzXuFV
        | I::VfcvtRtzXFV
        | I::VfwcvtXuFV
        | I::VfwcvtXFV
        | I::VfwcvtFXuV
        | I::VfwcvtFXV
        | I::VfwcvtFFV
        | I::VfwcvtRtzXuFV
        | I::VfwcvtRtzXFV
        | I::VfncvtXuFW
        | I::VfncvtXFW
        | I::VfncvtFXuW
        | I::VfncvtFXW
        | I::VfncvtFFW
        | I::VfncvtRodFFW
        | I::VfncvtRtzXuFW
        | I::VfncvtRtzXFW => Engine::Vector(VectorUnit::Float),
        I::Vle8V
        | I::Vse8V
        | I::Vlse8V
        | I::Vsse8V
        | I::Vluxei8V
        | I::Vloxei8V
        | I::Vsuxei8V
        | I::Vsoxei8V
        | I::Vle8ffV
        | I::Vle16V
        | I::Vse16V
        | I::Vlse16V
        | I::Vsse16V
        | I::Vluxei16V
        | I::Vloxei16V
        | I::Vsuxei16V
        | I::Vsoxei16V
        | I::Vle16ffV
        | I::Vle32V
        | I::Vse32V
        | I::Vlse32V
        | I::Vsse32V
        | I::Vluxei32V
        | I::Vloxei32V
        | I::Vsuxei32V
        | I::Vsoxei32V
        | I::Vle32ffV
        | I::Vle64V
        | I::Vse64V
        | I::Vlse64V
        | I::Vsse64V
        | I::Vluxei64V
        | I::Vloxei64V
        | I::Vsuxei64V
        | I::Vsoxei64V
        | I::Vle64ffV
        | I::VlmV
        | I::VsmV => Engine::Vector(VectorUnit::Memory),
        I::Vlre8V
        | I::Vlre16V
        | I::Vlre32V
        | I::Vlre64V
        | I::VsrV => Engine::Vector(VectorUnit::WholeMemory),
    }
}

#[cfg(test)]
pub(super) mod test_util {
    //! Shared helpers for the execution engine tests.

    use crate::hart::{Config, Hart, StepOutcome};
    use crate::memory::{Bus, Memory};
    use crate::registers::Specifier;

    pub fn hart_with(program: &[u32], config: Config) -> Hart<Memory> {
        let mut memory = Memory::new(0x1_0000);
        for (i, word) in program.iter().enumerate() {
            memory.write_u32(i as u64 * 4, *word).unwrap();
        }
        Hart::new(memory, config)
    }

    pub fn hart(program: &[u32]) -> Hart<Memory> {
        hart_with(program, Config::default())
    }

    pub fn x(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    /// Steps once, asserting that the instruction retired.
    pub fn retire(hart: &mut Hart<Memory>) {
        let outcome = hart.step().unwrap();
        assert_eq!(outcome, StepOutcome::Retired, "at pc {:#x}", hart.pc());
    }

    /// Steps `count` times, asserting that every instruction retired.
    pub fn retire_n(hart: &mut Hart<Memory>, count: usize) {
        for _ in 0..count {
            retire(hart);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{engine, Engine, VectorUnit};
    use crate::catalog::InstructionId;

    #[test]
    fn every_instruction_routes_to_the_engine_of_its_category() {
        for &id in InstructionId::ALL {
            let d = id.descriptor();
            match engine(id) {
                Engine::Integer => assert!(
                    !d.is_vector() && !d.is_fp() && !d.is_bit_manip() && !d.is_atomic(),
                    "{id}"
                ),
                Engine::Atomic => assert!(d.is_atomic() && !d.is_vector(), "{id}"),
                Engine::Float => assert!(d.is_fp() && !d.is_vector(), "{id}"),
                Engine::BitManip => assert!(d.is_bit_manip() && !d.is_fp(), "{id}"),
                Engine::Vector(unit) => {
                    assert!(d.is_vector(), "{id}");
                    match unit {
                        VectorUnit::Memory | VectorUnit::WholeMemory => {
                            assert!(d.is_load() || d.is_store(), "{id}")
                        }
                        VectorUnit::Float => assert!(d.is_fp(), "{id}"),
                        VectorUnit::Config | VectorUnit::WholeMove | VectorUnit::Integer => {
                            assert!(!d.is_load() && !d.is_store() && !d.is_fp(), "{id}")
                        }
                    }
                }
            }
        }
    }
}
