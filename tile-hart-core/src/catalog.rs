//! Static description of every instruction the hart knows about.
//!
//! Each [`InstructionId`] maps to exactly one [`InstructionDescriptor`] holding the mnemonic, the
//! operand kinds (with their read/write direction) and a set of category flags. The table is
//! immutable for the lifetime of the process and is consulted by the decoder, the execution
//! engine and any statistics or trace code.

use std::fmt;

/// Kind of value an operand slot of a decoded instruction refers to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OperandType {
    IntReg,
    FpReg,
    VecReg,
    CsReg,
    Immediate,
}

/// Direction in which an operand is accessed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OperandMode {
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Operand {
    pub kind: OperandType,
    pub mode: OperandMode,
}

impl Operand {
    const fn new(kind: OperandType, mode: OperandMode) -> Self {
        Self { kind, mode }
    }

    pub fn is_read(self) -> bool {
        matches!(self.mode, OperandMode::Read | OperandMode::ReadWrite)
    }

    pub fn is_write(self) -> bool {
        matches!(self.mode, OperandMode::Write | OperandMode::ReadWrite)
    }
}

/// Category flags of an [`InstructionDescriptor`].
pub mod flags {
    pub const BRANCH: u32 = 1 << 0;
    pub const COND_BRANCH: u32 = 1 << 1;
    pub const BRANCH_TO_REG: u32 = 1 << 2;
    pub const LOAD: u32 = 1 << 3;
    pub const STORE: u32 = 1 << 4;
    pub const ATOMIC: u32 = 1 << 5;
    pub const MULTIPLY: u32 = 1 << 6;
    pub const DIVIDE: u32 = 1 << 7;
    pub const FP: u32 = 1 << 8;
    pub const CSR: u32 = 1 << 9;
    pub const VECTOR: u32 = 1 << 10;
    pub const UNSIGNED: u32 = 1 << 11;
    pub const BIT_MANIP: u32 = 1 << 12;
    pub const ROUNDING_MODE: u32 = 1 << 13;

    /// Bits 24..=31 hold the size in bytes of the data accessed by loads and stores.
    pub const SIZE_SHIFT: u32 = 24;

    pub const fn size(bytes: u32) -> u32 {
        bytes << SIZE_SHIFT
    }

    const_assert!(ROUNDING_MODE < (1 << SIZE_SHIFT));
}

mod shape {
    use super::Operand;
    use super::OperandMode::{Read, ReadWrite, Write};
    use super::OperandType::{CsReg, FpReg, Immediate, IntReg, VecReg};

    const XW: Operand = Operand::new(IntReg, Write);
    const XR: Operand = Operand::new(IntReg, Read);
    const FW: Operand = Operand::new(FpReg, Write);
    const FR: Operand = Operand::new(FpReg, Read);
    const VW: Operand = Operand::new(VecReg, Write);
    const VR: Operand = Operand::new(VecReg, Read);
    const VRW: Operand = Operand::new(VecReg, ReadWrite);
    const CSR: Operand = Operand::new(CsReg, ReadWrite);
    const IMM: Operand = Operand::new(Immediate, Read);

    pub const NONE: &[Operand] = &[];
    pub const RD_IMM: &[Operand] = &[XW, IMM];
    pub const RD_RS1: &[Operand] = &[XW, XR];
    pub const RD_RS1_IMM: &[Operand] = &[XW, XR, IMM];
    pub const RD_RS1_RS2: &[Operand] = &[XW, XR, XR];
    pub const RD_RS1_RS2_RS3: &[Operand] = &[XW, XR, XR, XR];
    pub const RD_RS1_RS3_IMM: &[Operand] = &[XW, XR, XR, IMM];
    pub const RS1_RS2: &[Operand] = &[XR, XR];
    pub const BRANCH_SHAPE: &[Operand] = &[XR, XR, IMM];
    /// Stores list the data register first, then the base register and offset.
    pub const STORE_SHAPE: &[Operand] = &[XR, XR, IMM];
    pub const FENCE_SHAPE: &[Operand] = &[IMM, IMM];
    pub const CSR_REG: &[Operand] = &[XW, XR, CSR];
    pub const CSR_IMM: &[Operand] = &[XW, IMM, CSR];
    pub const LR_SHAPE: &[Operand] = &[XW, XR];
    pub const AMO_SHAPE: &[Operand] = &[XW, XR, XR];
    pub const FP_LOAD: &[Operand] = &[FW, XR, IMM];
    pub const FP_STORE: &[Operand] = &[FR, XR, IMM];
    pub const F_RR: &[Operand] = &[FW, FR];
    pub const F_RRR: &[Operand] = &[FW, FR, FR];
    pub const F_R4: &[Operand] = &[FW, FR, FR, FR];
    pub const X_F: &[Operand] = &[XW, FR];
    pub const X_FF: &[Operand] = &[XW, FR, FR];
    pub const F_X: &[Operand] = &[FW, XR];
    pub const VSETVLI_SHAPE: &[Operand] = &[XW, XR, IMM];
    pub const VSETIVLI_SHAPE: &[Operand] = &[XW, IMM, IMM];
    pub const V_VV: &[Operand] = &[VW, VR, VR];
    pub const V_VX: &[Operand] = &[VW, VR, XR];
    pub const V_VI: &[Operand] = &[VW, VR, IMM];
    pub const V_VF: &[Operand] = &[VW, VR, FR];
    /// Multiply-accumulate forms read the destination and list the scalar/vs1 source first.
    pub const V_MAC_VV: &[Operand] = &[VRW, VR, VR];
    pub const V_MAC_VX: &[Operand] = &[VRW, XR, VR];
    pub const V_MAC_VF: &[Operand] = &[VRW, FR, VR];
    pub const V_V: &[Operand] = &[VW, VR];
    pub const V_X: &[Operand] = &[VW, XR];
    pub const V_I: &[Operand] = &[VW, IMM];
    pub const V_F: &[Operand] = &[VW, FR];
    pub const V_ONLY: &[Operand] = &[VW];
    pub const X_V: &[Operand] = &[XW, VR];
    pub const F_V: &[Operand] = &[FW, VR];
    pub const V_LOAD: &[Operand] = &[VW, XR];
    pub const V_LOAD_STRIDED: &[Operand] = &[VW, XR, XR];
    pub const V_LOAD_INDEXED: &[Operand] = &[VW, XR, VR];
    pub const V_STORE: &[Operand] = &[VR, XR];
    pub const V_STORE_STRIDED: &[Operand] = &[VR, XR, XR];
    pub const V_STORE_INDEXED: &[Operand] = &[VR, XR, VR];
}

/// Immutable catalog entry of one instruction.
#[derive(Debug)]
pub struct InstructionDescriptor {
    id: InstructionId,
    mnemonic: &'static str,
    operands: &'static [Operand],
    flags: u32,
}

impl InstructionDescriptor {
    pub fn id(&self) -> InstructionId {
        self.id
    }

    pub fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    pub fn operands(&self) -> &'static [Operand] {
        self.operands
    }

    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Returns the kind and direction of operand slot `i`, or `None` if the instruction has fewer
    /// operands.
    pub fn operand(&self, i: usize) -> Option<Operand> {
        self.operands.get(i).copied()
    }

    fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn is_branch(&self) -> bool {
        self.has(flags::BRANCH)
    }

    pub fn is_conditional_branch(&self) -> bool {
        self.has(flags::COND_BRANCH)
    }

    pub fn is_branch_to_register(&self) -> bool {
        self.has(flags::BRANCH_TO_REG)
    }

    pub fn is_load(&self) -> bool {
        self.has(flags::LOAD)
    }

    pub fn is_store(&self) -> bool {
        self.has(flags::STORE)
    }

    pub fn is_atomic(&self) -> bool {
        self.has(flags::ATOMIC)
    }

    pub fn is_multiply(&self) -> bool {
        self.has(flags::MULTIPLY)
    }

    pub fn is_divide(&self) -> bool {
        self.has(flags::DIVIDE)
    }

    pub fn is_fp(&self) -> bool {
        self.has(flags::FP)
    }

    pub fn is_csr(&self) -> bool {
        self.has(flags::CSR)
    }

    pub fn is_vector(&self) -> bool {
        self.has(flags::VECTOR)
    }

    pub fn is_unsigned(&self) -> bool {
        self.has(flags::UNSIGNED)
    }

    pub fn is_bit_manip(&self) -> bool {
        self.has(flags::BIT_MANIP)
    }

    pub fn has_rounding_mode(&self) -> bool {
        self.has(flags::ROUNDING_MODE)
    }

    /// Size in bytes of the memory data accessed by a load or store, `0` for everything else.
    ///
    /// For vector memory instructions this is the element width of the encoding.
    pub fn data_size(&self) -> u32 {
        self.flags >> flags::SIZE_SHIFT
    }
}

macro_rules! catalog {
    ($($id:ident => $mnemonic:literal, $shape:ident, $flags:expr;)*) => {
        /// Identifier of every instruction known to the hart.
        ///
        /// Compressed instructions decode to the identifier of their 32-bit equivalent.
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[repr(u16)]
        pub enum InstructionId {
            $($id,)*
        }

        impl InstructionId {
            /// Every identifier, in catalog order.
            pub const ALL: &'static [InstructionId] = &[$(InstructionId::$id,)*];
        }

        static CATALOG: &[InstructionDescriptor] = &[
            $(InstructionDescriptor {
                id: InstructionId::$id,
                mnemonic: $mnemonic,
                operands: shape::$shape,
                flags: $flags,
            },)*
        ];
    };
}

use flags::*;

catalog! {
    Illegal => "illegal", NONE, 0;
    Lui => "lui", RD_IMM, 0;
    Auipc => "auipc", RD_IMM, 0;
    Jal => "jal", RD_IMM, BRANCH;
    Jalr => "jalr", RD_RS1_IMM, BRANCH | BRANCH_TO_REG;
    Beq => "beq", BRANCH_SHAPE, BRANCH | COND_BRANCH;
    Bne => "bne", BRANCH_SHAPE, BRANCH | COND_BRANCH;
    Blt => "blt", BRANCH_SHAPE, BRANCH | COND_BRANCH;
    Bge => "bge", BRANCH_SHAPE, BRANCH | COND_BRANCH;
    Bltu => "bltu", BRANCH_SHAPE, BRANCH | COND_BRANCH | UNSIGNED;
    Bgeu => "bgeu", BRANCH_SHAPE, BRANCH | COND_BRANCH | UNSIGNED;
    Lb => "lb", RD_RS1_IMM, LOAD | size(1);
    Lh => "lh", RD_RS1_IMM, LOAD | size(2);
    Lw => "lw", RD_RS1_IMM, LOAD | size(4);
    Lbu => "lbu", RD_RS1_IMM, LOAD | size(1) | UNSIGNED;
    Lhu => "lhu", RD_RS1_IMM, LOAD | size(2) | UNSIGNED;
    Lwu => "lwu", RD_RS1_IMM, LOAD | size(4) | UNSIGNED;
    Ld => "ld", RD_RS1_IMM, LOAD | size(8);
    Sb => "sb", STORE_SHAPE, STORE | size(1);
    Sh => "sh", STORE_SHAPE, STORE | size(2);
    Sw => "sw", STORE_SHAPE, STORE | size(4);
    Sd => "sd", STORE_SHAPE, STORE | size(8);
    Addi => "addi", RD_RS1_IMM, 0;
    Slti => "slti", RD_RS1_IMM, 0;
    Sltiu => "sltiu", RD_RS1_IMM, UNSIGNED;
    Xori => "xori", RD_RS1_IMM, 0;
    Ori => "ori", RD_RS1_IMM, 0;
    Andi => "andi", RD_RS1_IMM, 0;
    Slli => "slli", RD_RS1_IMM, 0;
    Srli => "srli", RD_RS1_IMM, 0;
    Srai => "srai", RD_RS1_IMM, 0;
    Add => "add", RD_RS1_RS2, 0;
    Sub => "sub", RD_RS1_RS2, 0;
    Sll => "sll", RD_RS1_RS2, 0;
    Slt => "slt", RD_RS1_RS2, 0;
    Sltu => "sltu", RD_RS1_RS2, UNSIGNED;
    Xor => "xor", RD_RS1_RS2, 0;
    Srl => "srl", RD_RS1_RS2, 0;
    Sra => "sra", RD_RS1_RS2, 0;
    Or => "or", RD_RS1_RS2, 0;
    And => "and", RD_RS1_RS2, 0;
    Fence => "fence", FENCE_SHAPE, 0;
    FenceI => "fence.i", NONE, 0;
    Ecall => "ecall", NONE, 0;
    Ebreak => "ebreak", NONE, 0;
    Uret => "uret", NONE, 0;
    Sret => "sret", NONE, 0;
    Mret => "mret", NONE, 0;
    Wfi => "wfi", NONE, 0;
    SfenceVma => "sfence.vma", RS1_RS2, 0;
    Csrrw => "csrrw", CSR_REG, CSR;
    Csrrs => "csrrs", CSR_REG, CSR;
    Csrrc => "csrrc", CSR_REG, CSR;
    Csrrwi => "csrrwi", CSR_IMM, CSR;
    Csrrsi => "csrrsi", CSR_IMM, CSR;
    Csrrci => "csrrci", CSR_IMM, CSR;
    Addiw => "addiw", RD_RS1_IMM, 0;
    Slliw => "slliw", RD_RS1_IMM, 0;
    Srliw => "srliw", RD_RS1_IMM, 0;
    Sraiw => "sraiw", RD_RS1_IMM, 0;
    Addw => "addw", RD_RS1_RS2, 0;
    Subw => "subw", RD_RS1_RS2, 0;
    Sllw => "sllw", RD_RS1_RS2, 0;
    Srlw => "srlw", RD_RS1_RS2, 0;
    Sraw => "sraw", RD_RS1_RS2, 0;
    Mul => "mul", RD_RS1_RS2, MULTIPLY;
    Mulh => "mulh", RD_RS1_RS2, MULTIPLY;
    Mulhsu => "mulhsu", RD_RS1_RS2, MULTIPLY;
    Mulhu => "mulhu", RD_RS1_RS2, MULTIPLY | UNSIGNED;
    Mulw => "mulw", RD_RS1_RS2, MULTIPLY;
    Div => "div", RD_RS1_RS2, DIVIDE;
    Divu => "divu", RD_RS1_RS2, DIVIDE | UNSIGNED;
    Rem => "rem", RD_RS1_RS2, DIVIDE;
    Remu => "remu", RD_RS1_RS2, DIVIDE | UNSIGNED;
    Divw => "divw", RD_RS1_RS2, DIVIDE;
    Divuw => "divuw", RD_RS1_RS2, DIVIDE | UNSIGNED;
    Remw => "remw", RD_RS1_RS2, DIVIDE;
    Remuw => "remuw", RD_RS1_RS2, DIVIDE | UNSIGNED;
    LrW => "lr.w", LR_SHAPE, LOAD | ATOMIC | size(4);
    ScW => "sc.w", AMO_SHAPE, STORE | ATOMIC | size(4);
    AmoswapW => "amoswap.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4);
    AmoaddW => "amoadd.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4);
    AmoxorW => "amoxor.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4);
    AmoandW => "amoand.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4);
    AmoorW => "amoor.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4);
    AmominW => "amomin.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4);
    AmomaxW => "amomax.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4);
    AmominuW => "amominu.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4) | UNSIGNED;
    AmomaxuW => "amomaxu.w", AMO_SHAPE, LOAD | STORE | ATOMIC | size(4) | UNSIGNED;
    LrD => "lr.d", LR_SHAPE, LOAD | ATOMIC | size(8);
    ScD => "sc.d", AMO_SHAPE, STORE | ATOMIC | size(8);
    AmoswapD => "amoswap.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8);
    AmoaddD => "amoadd.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8);
    AmoxorD => "amoxor.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8);
    AmoandD => "amoand.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8);
    AmoorD => "amoor.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8);
    AmominD => "amomin.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8);
    AmomaxD => "amomax.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8);
    AmominuD => "amominu.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8) | UNSIGNED;
    AmomaxuD => "amomaxu.d", AMO_SHAPE, LOAD | STORE | ATOMIC | size(8) | UNSIGNED;
    Flw => "flw", FP_LOAD, LOAD | FP | size(4);
    Fsw => "fsw", FP_STORE, STORE | FP | size(4);
    FmaddS => "fmadd.s", F_R4, FP | ROUNDING_MODE;
    FmsubS => "fmsub.s", F_R4, FP | ROUNDING_MODE;
    FnmsubS => "fnmsub.s", F_R4, FP | ROUNDING_MODE;
    FnmaddS => "fnmadd.s", F_R4, FP | ROUNDING_MODE;
    FaddS => "fadd.s", F_RRR, FP | ROUNDING_MODE;
    FsubS => "fsub.s", F_RRR, FP | ROUNDING_MODE;
    FmulS => "fmul.s", F_RRR, FP | ROUNDING_MODE;
    FdivS => "fdiv.s", F_RRR, FP | DIVIDE | ROUNDING_MODE;
    FsqrtS => "fsqrt.s", F_RR, FP | ROUNDING_MODE;
    FsgnjS => "fsgnj.s", F_RRR, FP;
    FsgnjnS => "fsgnjn.s", F_RRR, FP;
    FsgnjxS => "fsgnjx.s", F_RRR, FP;
    FminS => "fmin.s", F_RRR, FP;
    FmaxS => "fmax.s", F_RRR, FP;
    FcvtWS => "fcvt.w.s", X_F, FP | ROUNDING_MODE;
    FcvtSW => "fcvt.s.w", F_X, FP | ROUNDING_MODE;
    FcvtWuS => "fcvt.wu.s", X_F, FP | ROUNDING_MODE | UNSIGNED;
    FcvtSWu => "fcvt.s.wu", F_X, FP | ROUNDING_MODE | UNSIGNED;
    FcvtLS => "fcvt.l.s", X_F, FP | ROUNDING_MODE;
    FcvtSL => "fcvt.s.l", F_X, FP | ROUNDING_MODE;
    FcvtLuS => "fcvt.lu.s", X_F, FP | ROUNDING_MODE | UNSIGNED;
    FcvtSLu => "fcvt.s.lu", F_X, FP | ROUNDING_MODE | UNSIGNED;
    FmvXW => "fmv.x.w", X_F, FP;
    FmvWX => "fmv.w.x", F_X, FP;
    FeqS => "feq.s", X_FF, FP;
    FltS => "flt.s", X_FF, FP;
    FleS => "fle.s", X_FF, FP;
    FclassS => "fclass.s", X_F, FP;
    Fld => "fld", FP_LOAD, LOAD | FP | size(8);
    Fsd => "fsd", FP_STORE, STORE | FP | size(8);
    FmaddD => "fmadd.d", F_R4, FP | ROUNDING_MODE;
    FmsubD => "fmsub.d", F_R4, FP | ROUNDING_MODE;
    FnmsubD => "fnmsub.d", F_R4, FP | ROUNDING_MODE;
    FnmaddD => "fnmadd.d", F_R4, FP | ROUNDING_MODE;
    FaddD => "fadd.d", F_RRR, FP | ROUNDING_MODE;
    FsubD => "fsub.d", F_RRR, FP | ROUNDING_MODE;
    FmulD => "fmul.d", F_RRR, FP | ROUNDING_MODE;
    FdivD => "fdiv.d", F_RRR, FP | DIVIDE | ROUNDING_MODE;
    FsqrtD => "fsqrt.d", F_RR, FP | ROUNDING_MODE;
    FsgnjD => "fsgnj.d", F_RRR, FP;
    FsgnjnD => "fsgnjn.d", F_RRR, FP;
    FsgnjxD => "fsgnjx.d", F_RRR, FP;
    FminD => "fmin.d", F_RRR, FP;
    FmaxD => "fmax.d", F_RRR, FP;
    FcvtWD => "fcvt.w.d", X_F, FP | ROUNDING_MODE;
    FcvtDW => "fcvt.d.w", F_X, FP | ROUNDING_MODE;
    FcvtWuD => "fcvt.wu.d", X_F, FP | ROUNDING_MODE | UNSIGNED;
    FcvtDWu => "fcvt.d.wu", F_X, FP | ROUNDING_MODE | UNSIGNED;
    FcvtLD => "fcvt.l.d", X_F, FP | ROUNDING_MODE;
    FcvtDL => "fcvt.d.l", F_X, FP | ROUNDING_MODE;
    FcvtLuD => "fcvt.lu.d", X_F, FP | ROUNDING_MODE | UNSIGNED;
    FcvtDLu => "fcvt.d.lu", F_X, FP | ROUNDING_MODE | UNSIGNED;
    FmvXD => "fmv.x.d", X_F, FP;
    FmvDX => "fmv.d.x", F_X, FP;
    FeqD => "feq.d", X_FF, FP;
    FltD => "flt.d", X_FF, FP;
    FleD => "fle.d", X_FF, FP;
    FclassD => "fclass.d", X_F, FP;
    Flh => "flh", FP_LOAD, LOAD | FP | size(2);
    Fsh => "fsh", FP_STORE, STORE | FP | size(2);
    FmaddH => "fmadd.h", F_R4, FP | ROUNDING_MODE;
    FmsubH => "fmsub.h", F_R4, FP | ROUNDING_MODE;
    FnmsubH => "fnmsub.h", F_R4, FP | ROUNDING_MODE;
    FnmaddH => "fnmadd.h", F_R4, FP | ROUNDING_MODE;
    FaddH => "fadd.h", F_RRR, FP | ROUNDING_MODE;
    FsubH => "fsub.h", F_RRR, FP | ROUNDING_MODE;
    FmulH => "fmul.h", F_RRR, FP | ROUNDING_MODE;
    FdivH => "fdiv.h", F_RRR, FP | DIVIDE | ROUNDING_MODE;
    FsqrtH => "fsqrt.h", F_RR, FP | ROUNDING_MODE;
    FsgnjH => "fsgnj.h", F_RRR, FP;
    FsgnjnH => "fsgnjn.h", F_RRR, FP;
    FsgnjxH => "fsgnjx.h", F_RRR, FP;
    FminH => "fmin.h", F_RRR, FP;
    FmaxH => "fmax.h", F_RRR, FP;
    FcvtWH => "fcvt.w.h", X_F, FP | ROUNDING_MODE;
    FcvtHW => "fcvt.h.w", F_X, FP | ROUNDING_MODE;
    FcvtWuH => "fcvt.wu.h", X_F, FP | ROUNDING_MODE | UNSIGNED;
    FcvtHWu => "fcvt.h.wu", F_X, FP | ROUNDING_MODE | UNSIGNED;
    FcvtLH => "fcvt.l.h", X_F, FP | ROUNDING_MODE;
    FcvtHL => "fcvt.h.l", F_X, FP | ROUNDING_MODE;
    FcvtLuH => "fcvt.lu.h", X_F, FP | ROUNDING_MODE | UNSIGNED;
    FcvtHLu => "fcvt.h.lu", F_X, FP | ROUNDING_MODE | UNSIGNED;
    FmvXH => "fmv.x.h", X_F, FP;
    FmvHX => "fmv.h.x", F_X, FP;
    FeqH => "feq.h", X_FF, FP;
    FltH => "flt.h", X_FF, FP;
    FleH => "fle.h", X_FF, FP;
    FclassH => "fclass.h", X_F, FP;
    FcvtSD => "fcvt.s.d", F_RR, FP | ROUNDING_MODE;
    FcvtDS => "fcvt.d.s", F_RR, FP | ROUNDING_MODE;
    FcvtSH => "fcvt.s.h", F_RR, FP | ROUNDING_MODE;
    FcvtHS => "fcvt.h.s", F_RR, FP | ROUNDING_MODE;
    FcvtDH => "fcvt.d.h", F_RR, FP | ROUNDING_MODE;
    FcvtHD => "fcvt.h.d", F_RR, FP | ROUNDING_MODE;
    Clz => "clz", RD_RS1, BIT_MANIP;
    Ctz => "ctz", RD_RS1, BIT_MANIP;
    Cpop => "cpop", RD_RS1, BIT_MANIP;
    Clzw => "clzw", RD_RS1, BIT_MANIP;
    Ctzw => "ctzw", RD_RS1, BIT_MANIP;
    Cpopw => "cpopw", RD_RS1, BIT_MANIP;
    SextB => "sext.b", RD_RS1, BIT_MANIP;
    SextH => "sext.h", RD_RS1, BIT_MANIP;
    Rev8 => "rev8", RD_RS1, BIT_MANIP;
    OrcB => "orc.b", RD_RS1, BIT_MANIP;
    Crc32B => "crc32.b", RD_RS1, BIT_MANIP;
    Crc32H => "crc32.h", RD_RS1, BIT_MANIP;
    Crc32W => "crc32.w", RD_RS1, BIT_MANIP;
    Crc32D => "crc32.d", RD_RS1, BIT_MANIP;
    Crc32cB => "crc32c.b", RD_RS1, BIT_MANIP;
    Crc32cH => "crc32c.h", RD_RS1, BIT_MANIP;
    Crc32cW => "crc32c.w", RD_RS1, BIT_MANIP;
    Crc32cD => "crc32c.d", RD_RS1, BIT_MANIP;
    Bmatflip => "bmatflip", RD_RS1, BIT_MANIP;
    Min => "min", RD_RS1_RS2, BIT_MANIP;
    Max => "max", RD_RS1_RS2, BIT_MANIP;
    Minu => "minu", RD_RS1_RS2, BIT_MANIP | UNSIGNED;
    Maxu => "maxu", RD_RS1_RS2, BIT_MANIP | UNSIGNED;
    Andn => "andn", RD_RS1_RS2, BIT_MANIP;
    Orn => "orn", RD_RS1_RS2, BIT_MANIP;
    Xnor => "xnor", RD_RS1_RS2, BIT_MANIP;
    Rol => "rol", RD_RS1_RS2, BIT_MANIP;
    Ror => "ror", RD_RS1_RS2, BIT_MANIP;
    Rolw => "rolw", RD_RS1_RS2, BIT_MANIP;
    Rorw => "rorw", RD_RS1_RS2, BIT_MANIP;
    Pack => "pack", RD_RS1_RS2, BIT_MANIP;
    Packh => "packh", RD_RS1_RS2, BIT_MANIP;
    Packu => "packu", RD_RS1_RS2, BIT_MANIP;
    Packw => "packw", RD_RS1_RS2, BIT_MANIP;
    Packuw => "packuw", RD_RS1_RS2, BIT_MANIP;
    Grev => "grev", RD_RS1_RS2, BIT_MANIP;
    Grevw => "grevw", RD_RS1_RS2, BIT_MANIP;
    Gorc => "gorc", RD_RS1_RS2, BIT_MANIP;
    Gorcw => "gorcw", RD_RS1_RS2, BIT_MANIP;
    Shfl => "shfl", RD_RS1_RS2, BIT_MANIP;
    Unshfl => "unshfl", RD_RS1_RS2, BIT_MANIP;
    Shflw => "shflw", RD_RS1_RS2, BIT_MANIP;
    Unshflw => "unshflw", RD_RS1_RS2, BIT_MANIP;
    XpermN => "xperm.n", RD_RS1_RS2, BIT_MANIP;
    XpermB => "xperm.b", RD_RS1_RS2, BIT_MANIP;
    XpermH => "xperm.h", RD_RS1_RS2, BIT_MANIP;
    XpermW => "xperm.w", RD_RS1_RS2, BIT_MANIP;
    Bset => "bset", RD_RS1_RS2, BIT_MANIP;
    Bclr => "bclr", RD_RS1_RS2, BIT_MANIP;
    Binv => "binv", RD_RS1_RS2, BIT_MANIP;
    Bext => "bext", RD_RS1_RS2, BIT_MANIP;
    Bcompress => "bcompress", RD_RS1_RS2, BIT_MANIP;
    Bdecompress => "bdecompress", RD_RS1_RS2, BIT_MANIP;
    Bcompressw => "bcompressw", RD_RS1_RS2, BIT_MANIP;
    Bdecompressw => "bdecompressw", RD_RS1_RS2, BIT_MANIP;
    Bfp => "bfp", RD_RS1_RS2, BIT_MANIP;
    Bfpw => "bfpw", RD_RS1_RS2, BIT_MANIP;
    Clmul => "clmul", RD_RS1_RS2, BIT_MANIP;
    Clmulh => "clmulh", RD_RS1_RS2, BIT_MANIP;
    Clmulr => "clmulr", RD_RS1_RS2, BIT_MANIP;
    Sh1add => "sh1add", RD_RS1_RS2, BIT_MANIP;
    Sh2add => "sh2add", RD_RS1_RS2, BIT_MANIP;
    Sh3add => "sh3add", RD_RS1_RS2, BIT_MANIP;
    Sh1addUw => "sh1add.uw", RD_RS1_RS2, BIT_MANIP;
    Sh2addUw => "sh2add.uw", RD_RS1_RS2, BIT_MANIP;
    Sh3addUw => "sh3add.uw", RD_RS1_RS2, BIT_MANIP;
    AddUw => "add.uw", RD_RS1_RS2, BIT_MANIP;
    Bmator => "bmator", RD_RS1_RS2, BIT_MANIP;
    Bmatxor => "bmatxor", RD_RS1_RS2, BIT_MANIP;
    Rori => "rori", RD_RS1_IMM, BIT_MANIP;
    Roriw => "roriw", RD_RS1_IMM, BIT_MANIP;
    Grevi => "grevi", RD_RS1_IMM, BIT_MANIP;
    Greviw => "greviw", RD_RS1_IMM, BIT_MANIP;
    Gorci => "gorci", RD_RS1_IMM, BIT_MANIP;
    Gorciw => "gorciw", RD_RS1_IMM, BIT_MANIP;
    Shfli => "shfli", RD_RS1_IMM, BIT_MANIP;
    Unshfli => "unshfli", RD_RS1_IMM, BIT_MANIP;
    Bseti => "bseti", RD_RS1_IMM, BIT_MANIP;
    Bclri => "bclri", RD_RS1_IMM, BIT_MANIP;
    Binvi => "binvi", RD_RS1_IMM, BIT_MANIP;
    Bexti => "bexti", RD_RS1_IMM, BIT_MANIP;
    SlliUw => "slli.uw", RD_RS1_IMM, BIT_MANIP;
    Cmix => "cmix", RD_RS1_RS2_RS3, BIT_MANIP;
    Cmov => "cmov", RD_RS1_RS2_RS3, BIT_MANIP;
    Fsl => "fsl", RD_RS1_RS2_RS3, BIT_MANIP;
    Fsr => "fsr", RD_RS1_RS2_RS3, BIT_MANIP;
    Fslw => "fslw", RD_RS1_RS2_RS3, BIT_MANIP;
    Fsrw => "fsrw", RD_RS1_RS2_RS3, BIT_MANIP;
    Fsri => "fsri", RD_RS1_RS3_IMM, BIT_MANIP;
    Fsriw => "fsriw", RD_RS1_RS3_IMM, BIT_MANIP;
    Load64 => "load64", RD_RS1_IMM, LOAD | size(8);
    Store64 => "store64", STORE_SHAPE, STORE | size(8);
    Bbarrier => "bbarrier", NONE, 0;
    Vsetvli => "vsetvli", VSETVLI_SHAPE, VECTOR;
    Vsetivli => "vsetivli", VSETIVLI_SHAPE, VECTOR;
    Vsetvl => "vsetvl", RD_RS1_RS2, VECTOR;
    VaddVv => "vadd.vv", V_VV, VECTOR;
    VaddVx => "vadd.vx", V_VX, VECTOR;
    VaddVi => "vadd.vi", V_VI, VECTOR;
    VandVv => "vand.vv", V_VV, VECTOR;
    VandVx => "vand.vx", V_VX, VECTOR;
    VandVi => "vand.vi", V_VI, VECTOR;
    VorVv => "vor.vv", V_VV, VECTOR;
    VorVx => "vor.vx", V_VX, VECTOR;
    VorVi => "vor.vi", V_VI, VECTOR;
    VxorVv => "vxor.vv", V_VV, VECTOR;
    VxorVx => "vxor.vx", V_VX, VECTOR;
    VxorVi => "vxor.vi", V_VI, VECTOR;
    VsllVv => "vsll.vv", V_VV, VECTOR;
    VsllVx => "vsll.vx", V_VX, VECTOR;
    VsllVi => "vsll.vi", V_VI, VECTOR;
    VsrlVv => "vsrl.vv", V_VV, VECTOR;
    VsrlVx => "vsrl.vx", V_VX, VECTOR;
    VsrlVi => "vsrl.vi", V_VI, VECTOR;
    VsraVv => "vsra.vv", V_VV, VECTOR;
    VsraVx => "vsra.vx", V_VX, VECTOR;
    VsraVi => "vsra.vi", V_VI, VECTOR;
    VsadduVv => "vsaddu.vv", V_VV, VECTOR;
    VsadduVx => "vsaddu.vx", V_VX, VECTOR;
    VsadduVi => "vsaddu.vi", V_VI, VECTOR;
    VsaddVv => "vsadd.vv", V_VV, VECTOR;
    VsaddVx => "vsadd.vx", V_VX, VECTOR;
    VsaddVi => "vsadd.vi", V_VI, VECTOR;
    VssrlVv => "vssrl.vv", V_VV, VECTOR;
    VssrlVx => "vssrl.vx", V_VX, VECTOR;
    VssrlVi => "vssrl.vi", V_VI, VECTOR;
    VssraVv => "vssra.vv", V_VV, VECTOR;
    VssraVx => "vssra.vx", V_VX, VECTOR;
    VssraVi => "vssra.vi", V_VI, VECTOR;
    VrgatherVv => "vrgather.vv", V_VV, VECTOR;
    VrgatherVx => "vrgather.vx", V_VX, VECTOR;
    VrgatherVi => "vrgather.vi", V_VI, VECTOR;
    VsubVv => "vsub.vv", V_VV, VECTOR;
    VsubVx => "vsub.vx", V_VX, VECTOR;
    VminuVv => "vminu.vv", V_VV, VECTOR;
    VminuVx => "vminu.vx", V_VX, VECTOR;
    VminVv => "vmin.vv", V_VV, VECTOR;
    VminVx => "vmin.vx", V_VX, VECTOR;
    VmaxuVv => "vmaxu.vv", V_VV, VECTOR;
    VmaxuVx => "vmaxu.vx", V_VX, VECTOR;
    VmaxVv => "vmax.vv", V_VV, VECTOR;
    VmaxVx => "vmax.vx", V_VX, VECTOR;
    VssubuVv => "vssubu.vv", V_VV, VECTOR;
    VssubuVx => "vssubu.vx", V_VX, VECTOR;
    VssubVv => "vssub.vv", V_VV, VECTOR;
    VssubVx => "vssub.vx", V_VX, VECTOR;
    VaadduVv => "vaaddu.vv", V_VV, VECTOR;
    VaadduVx => "vaaddu.vx", V_VX, VECTOR;
    VaaddVv => "vaadd.vv", V_VV, VECTOR;
    VaaddVx => "vaadd.vx", V_VX, VECTOR;
    VasubuVv => "vasubu.vv", V_VV, VECTOR;
    VasubuVx => "vasubu.vx", V_VX, VECTOR;
    VasubVv => "vasub.vv", V_VV, VECTOR;
    VasubVx => "vasub.vx", V_VX, VECTOR;
    VsmulVv => "vsmul.vv", V_VV, VECTOR;
    VsmulVx => "vsmul.vx", V_VX, VECTOR;
    VrsubVx => "vrsub.vx", V_VX, VECTOR;
    VrsubVi => "vrsub.vi", V_VI, VECTOR;
    Vrgatherei16Vv => "vrgatherei16.vv", V_VV, VECTOR;
    VmulVv => "vmul.vv", V_VV, VECTOR | MULTIPLY;
    VmulVx => "vmul.vx", V_VX, VECTOR | MULTIPLY;
    VmulhVv => "vmulh.vv", V_VV, VECTOR | MULTIPLY;
    VmulhVx => "vmulh.vx", V_VX, VECTOR | MULTIPLY;
    VmulhuVv => "vmulhu.vv", V_VV, VECTOR | MULTIPLY;
    VmulhuVx => "vmulhu.vx", V_VX, VECTOR | MULTIPLY;
    VmulhsuVv => "vmulhsu.vv", V_VV, VECTOR | MULTIPLY;
    VmulhsuVx => "vmulhsu.vx", V_VX, VECTOR | MULTIPLY;
    VdivuVv => "vdivu.vv", V_VV, VECTOR | DIVIDE;
    VdivuVx => "vdivu.vx", V_VX, VECTOR | DIVIDE;
    VdivVv => "vdiv.vv", V_VV, VECTOR | DIVIDE;
    VdivVx => "vdiv.vx", V_VX, VECTOR | DIVIDE;
    VremuVv => "vremu.vv", V_VV, VECTOR | DIVIDE;
    VremuVx => "vremu.vx", V_VX, VECTOR | DIVIDE;
    VremVv => "vrem.vv", V_VV, VECTOR | DIVIDE;
    VremVx => "vrem.vx", V_VX, VECTOR | DIVIDE;
    VmaccVv => "vmacc.vv", V_MAC_VV, VECTOR | MULTIPLY;
    VmaccVx => "vmacc.vx", V_MAC_VX, VECTOR | MULTIPLY;
    VnmsacVv => "vnmsac.vv", V_MAC_VV, VECTOR | MULTIPLY;
    VnmsacVx => "vnmsac.vx", V_MAC_VX, VECTOR | MULTIPLY;
    VmaddVv => "vmadd.vv", V_MAC_VV, VECTOR | MULTIPLY;
    VmaddVx => "vmadd.vx", V_MAC_VX, VECTOR | MULTIPLY;
    VnmsubVv => "vnmsub.vv", V_MAC_VV, VECTOR | MULTIPLY;
    VnmsubVx => "vnmsub.vx", V_MAC_VX, VECTOR | MULTIPLY;
    VadcVvm => "vadc.vvm", V_VV, VECTOR;
    VadcVxm => "vadc.vxm", V_VX, VECTOR;
    VadcVim => "vadc.vim", V_VI, VECTOR;
    VmadcVvm => "vmadc.vvm", V_VV, VECTOR;
    VmadcVxm => "vmadc.vxm", V_VX, VECTOR;
    VmadcVim => "vmadc.vim", V_VI, VECTOR;
    VsbcVvm => "vsbc.vvm", V_VV, VECTOR;
    VsbcVxm => "vsbc.vxm", V_VX, VECTOR;
    VmsbcVvm => "vmsbc.vvm", V_VV, VECTOR;
    VmsbcVxm => "vmsbc.vxm", V_VX, VECTOR;
    VmergeVvm => "vmerge.vvm", V_VV, VECTOR;
    VmergeVxm => "vmerge.vxm", V_VX, VECTOR;
    VmergeVim => "vmerge.vim", V_VI, VECTOR;
    VmvVV => "vmv.v.v", V_V, VECTOR;
    VmvVX => "vmv.v.x", V_X, VECTOR;
    VmvVI => "vmv.v.i", V_I, VECTOR;
    Vmv1rV => "vmv1r.v", V_V, VECTOR;
    Vmv2rV => "vmv2r.v", V_V, VECTOR;
    Vmv4rV => "vmv4r.v", V_V, VECTOR;
    Vmv8rV => "vmv8r.v", V_V, VECTOR;
    VmseqVv => "vmseq.vv", V_VV, VECTOR;
    VmseqVx => "vmseq.vx", V_VX, VECTOR;
    VmseqVi => "vmseq.vi", V_VI, VECTOR;
    VmsneVv => "vmsne.vv", V_VV, VECTOR;
    VmsneVx => "vmsne.vx", V_VX, VECTOR;
    VmsneVi => "vmsne.vi", V_VI, VECTOR;
    VmsleuVv => "vmsleu.vv", V_VV, VECTOR;
    VmsleuVx => "vmsleu.vx", V_VX, VECTOR;
    VmsleuVi => "vmsleu.vi", V_VI, VECTOR;
    VmsleVv => "vmsle.vv", V_VV, VECTOR;
    VmsleVx => "vmsle.vx", V_VX, VECTOR;
    VmsleVi => "vmsle.vi", V_VI, VECTOR;
    VmsltuVv => "vmsltu.vv", V_VV, VECTOR;
    VmsltuVx => "vmsltu.vx", V_VX, VECTOR;
    VmsltVv => "vmslt.vv", V_VV, VECTOR;
    VmsltVx => "vmslt.vx", V_VX, VECTOR;
    VmsgtuVx => "vmsgtu.vx", V_VX, VECTOR;
    VmsgtuVi => "vmsgtu.vi", V_VI, VECTOR;
    VmsgtVx => "vmsgt.vx", V_VX, VECTOR;
    VmsgtVi => "vmsgt.vi", V_VI, VECTOR;
    VwadduVv => "vwaddu.vv", V_VV, VECTOR;
    VwadduVx => "vwaddu.vx", V_VX, VECTOR;
    VwadduWv => "vwaddu.wv", V_VV, VECTOR;
    VwadduWx => "vwaddu.wx", V_VX, VECTOR;
    VwaddVv => "vwadd.vv", V_VV, VECTOR;
    VwaddVx => "vwadd.vx", V_VX, VECTOR;
    VwaddWv => "vwadd.wv", V_VV, VECTOR;
    VwaddWx => "vwadd.wx", V_VX, VECTOR;
    VwsubuVv => "vwsubu.vv", V_VV, VECTOR;
    VwsubuVx => "vwsubu.vx", V_VX, VECTOR;
    VwsubuWv => "vwsubu.wv", V_VV, VECTOR;
    VwsubuWx => "vwsubu.wx", V_VX, VECTOR;
    VwsubVv => "vwsub.vv", V_VV, VECTOR;
    VwsubVx => "vwsub.vx", V_VX, VECTOR;
    VwsubWv => "vwsub.wv", V_VV, VECTOR;
    VwsubWx => "vwsub.wx", V_VX, VECTOR;
    VwmuluVv => "vwmulu.vv", V_VV, VECTOR | MULTIPLY;
    VwmuluVx => "vwmulu.vx", V_VX, VECTOR | MULTIPLY;
    VwmulsuVv => "vwmulsu.vv", V_VV, VECTOR | MULTIPLY;
    VwmulsuVx => "vwmulsu.vx", V_VX, VECTOR | MULTIPLY;
    VwmulVv => "vwmul.vv", V_VV, VECTOR | MULTIPLY;
    VwmulVx => "vwmul.vx", V_VX, VECTOR | MULTIPLY;
    VwmaccuVv => "vwmaccu.vv", V_MAC_VV, VECTOR | MULTIPLY;
    VwmaccuVx => "vwmaccu.vx", V_MAC_VX, VECTOR | MULTIPLY;
    VwmaccVv => "vwmacc.vv", V_MAC_VV, VECTOR | MULTIPLY;
    VwmaccVx => "vwmacc.vx", V_MAC_VX, VECTOR | MULTIPLY;
    VwmaccsuVv => "vwmaccsu.vv", V_MAC_VV, VECTOR | MULTIPLY;
    VwmaccsuVx => "vwmaccsu.vx", V_MAC_VX, VECTOR | MULTIPLY;
    VwmaccusVx => "vwmaccus.vx", V_MAC_VX, VECTOR | MULTIPLY;
    VnsrlWv => "vnsrl.wv", V_VV, VECTOR;
    VnsrlWx => "vnsrl.wx", V_VX, VECTOR;
    VnsrlWi => "vnsrl.wi", V_VI, VECTOR;
    VnsraWv => "vnsra.wv", V_VV, VECTOR;
    VnsraWx => "vnsra.wx", V_VX, VECTOR;
    VnsraWi => "vnsra.wi", V_VI, VECTOR;
    VnclipuWv => "vnclipu.wv", V_VV, VECTOR;
    VnclipuWx => "vnclipu.wx", V_VX, VECTOR;
    VnclipuWi => "vnclipu.wi", V_VI, VECTOR;
    VnclipWv => "vnclip.wv", V_VV, VECTOR;
    VnclipWx => "vnclip.wx", V_VX, VECTOR;
    VnclipWi => "vnclip.wi", V_VI, VECTOR;
    VredsumVs => "vredsum.vs", V_VV, VECTOR;
    VredandVs => "vredand.vs", V_VV, VECTOR;
    VredorVs => "vredor.vs", V_VV, VECTOR;
    VredxorVs => "vredxor.vs", V_VV, VECTOR;
    VredminuVs => "vredminu.vs", V_VV, VECTOR;
    VredminVs => "vredmin.vs", V_VV, VECTOR;
    VredmaxuVs => "vredmaxu.vs", V_VV, VECTOR;
    VredmaxVs => "vredmax.vs", V_VV, VECTOR;
    VwredsumuVs => "vwredsumu.vs", V_VV, VECTOR;
    VwredsumVs => "vwredsum.vs", V_VV, VECTOR;
    VmandMm => "vmand.mm", V_VV, VECTOR;
    VmnandMm => "vmnand.mm", V_VV, VECTOR;
    VmandnMm => "vmandn.mm", V_VV, VECTOR;
    VmxorMm => "vmxor.mm", V_VV, VECTOR;
    VmorMm => "vmor.mm", V_VV, VECTOR;
    VmnorMm => "vmnor.mm", V_VV, VECTOR;
    VmornMm => "vmorn.mm", V_VV, VECTOR;
    VmxnorMm => "vmxnor.mm", V_VV, VECTOR;
    VcpopM => "vcpop.m", X_V, VECTOR;
    VfirstM => "vfirst.m", X_V, VECTOR;
    VmsbfM => "vmsbf.m", V_V, VECTOR;
    VmsofM => "vmsof.m", V_V, VECTOR;
    VmsifM => "vmsif.m", V_V, VECTOR;
    ViotaM => "viota.m", V_V, VECTOR;
    VidV => "vid.v", V_ONLY, VECTOR;
    VzextVf2 => "vzext.vf2", V_V, VECTOR;
    VzextVf4 => "vzext.vf4", V_V, VECTOR;
    VzextVf8 => "vzext.vf8", V_V, VECTOR;
    VsextVf2 => "vsext.vf2", V_V, VECTOR;
    VsextVf4 => "vsext.vf4", V_V, VECTOR;
    VsextVf8 => "vsext.vf8", V_V, VECTOR;
    VmvXS => "vmv.x.s", X_V, VECTOR;
    VmvSX => "vmv.s.x", V_X, VECTOR;
    VfmvFS => "vfmv.f.s", F_V, VECTOR | FP;
    VfmvSF => "vfmv.s.f", V_F, VECTOR | FP;
    VslideupVx => "vslideup.vx", V_VX, VECTOR;
    VslideupVi => "vslideup.vi", V_VI, VECTOR;
    VslidedownVx => "vslidedown.vx", V_VX, VECTOR;
    VslidedownVi => "vslidedown.vi", V_VI, VECTOR;
    Vslide1upVx => "vslide1up.vx", V_VX, VECTOR;
    Vslide1downVx => "vslide1down.vx", V_VX, VECTOR;
    VcompressVm => "vcompress.vm", V_VV, VECTOR;
    Vfslide1upVf => "vfslide1up.vf", V_VF, VECTOR | FP;
    Vfslide1downVf => "vfslide1down.vf", V_VF, VECTOR | FP;
    VfaddVv => "vfadd.vv", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfaddVf => "vfadd.vf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfsubVv => "vfsub.vv", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfsubVf => "vfsub.vf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfmulVv => "vfmul.vv", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfmulVf => "vfmul.vf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfdivVv => "vfdiv.vv", V_VV, VECTOR | FP | DIVIDE | ROUNDING_MODE;
    VfdivVf => "vfdiv.vf", V_VF, VECTOR | FP | DIVIDE | ROUNDING_MODE;
    VfrdivVf => "vfrdiv.vf", V_VF, VECTOR | FP | DIVIDE | ROUNDING_MODE;
    VfrsubVf => "vfrsub.vf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfminVv => "vfmin.vv", V_VV, VECTOR | FP;
    VfminVf => "vfmin.vf", V_VF, VECTOR | FP;
    VfmaxVv => "vfmax.vv", V_VV, VECTOR | FP;
    VfmaxVf => "vfmax.vf", V_VF, VECTOR | FP;
    VfsgnjVv => "vfsgnj.vv", V_VV, VECTOR | FP;
    VfsgnjVf => "vfsgnj.vf", V_VF, VECTOR | FP;
    VfsgnjnVv => "vfsgnjn.vv", V_VV, VECTOR | FP;
    VfsgnjnVf => "vfsgnjn.vf", V_VF, VECTOR | FP;
    VfsgnjxVv => "vfsgnjx.vv", V_VV, VECTOR | FP;
    VfsgnjxVf => "vfsgnjx.vf", V_VF, VECTOR | FP;
    VfmaccVv => "vfmacc.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfmaccVf => "vfmacc.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfnmaccVv => "vfnmacc.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfnmaccVf => "vfnmacc.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfmsacVv => "vfmsac.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfmsacVf => "vfmsac.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfnmsacVv => "vfnmsac.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfnmsacVf => "vfnmsac.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfmaddVv => "vfmadd.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfmaddVf => "vfmadd.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfnmaddVv => "vfnmadd.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfnmaddVf => "vfnmadd.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfmsubVv => "vfmsub.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfmsubVf => "vfmsub.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfnmsubVv => "vfnmsub.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfnmsubVf => "vfnmsub.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfsqrtV => "vfsqrt.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfclassV => "vfclass.v", V_V, VECTOR | FP;
    VfmergeVfm => "vfmerge.vfm", V_VF, VECTOR | FP;
    VfmvVF => "vfmv.v.f", V_F, VECTOR | FP;
    VmfeqVv => "vmfeq.vv", V_VV, VECTOR | FP;
    VmfeqVf => "vmfeq.vf", V_VF, VECTOR | FP;
    VmfneVv => "vmfne.vv", V_VV, VECTOR | FP;
    VmfneVf => "vmfne.vf", V_VF, VECTOR | FP;
    VmfltVv => "vmflt.vv", V_VV, VECTOR | FP;
    VmfltVf => "vmflt.vf", V_VF, VECTOR | FP;
    VmfleVv => "vmfle.vv", V_VV, VECTOR | FP;
    VmfleVf => "vmfle.vf", V_VF, VECTOR | FP;
    VmfgtVf => "vmfgt.vf", V_VF, VECTOR | FP;
    VmfgeVf => "vmfge.vf", V_VF, VECTOR | FP;
    VfredusumVs => "vfredusum.vs", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfredosumVs => "vfredosum.vs", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfredminVs => "vfredmin.vs", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfredmaxVs => "vfredmax.vs", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfwredusumVs => "vfwredusum.vs", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfwredosumVs => "vfwredosum.vs", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfwaddVv => "vfwadd.vv", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfwaddVf => "vfwadd.vf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfwaddWv => "vfwadd.wv", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfwaddWf => "vfwadd.wf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfwsubVv => "vfwsub.vv", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfwsubVf => "vfwsub.vf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfwsubWv => "vfwsub.wv", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfwsubWf => "vfwsub.wf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfwmulVv => "vfwmul.vv", V_VV, VECTOR | FP | ROUNDING_MODE;
    VfwmulVf => "vfwmul.vf", V_VF, VECTOR | FP | ROUNDING_MODE;
    VfwmaccVv => "vfwmacc.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfwmaccVf => "vfwmacc.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfwnmaccVv => "vfwnmacc.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfwnmaccVf => "vfwnmacc.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfwmsacVv => "vfwmsac.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfwmsacVf => "vfwmsac.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfwnmsacVv => "vfwnmsac.vv", V_MAC_VV, VECTOR | FP | ROUNDING_MODE;
    VfwnmsacVf => "vfwnmsac.vf", V_MAC_VF, VECTOR | FP | ROUNDING_MODE;
    VfcvtXuFV => "vfcvt.xu.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfcvtXFV => "vfcvt.x.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfcvtFXuV => "vfcvt.f.xu.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfcvtFXV => "vfcvt.f.x.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfcvtRtzXuFV => "vfcvt.rtz.xu.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfcvtRtzXFV => "vfcvt.rtz.x.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfwcvtXuFV => "vfwcvt.xu.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfwcvtXFV => "vfwcvt.x.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfwcvtFXuV => "vfwcvt.f.xu.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfwcvtFXV => "vfwcvt.f.x.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfwcvtFFV => "vfwcvt.f.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfwcvtRtzXuFV => "vfwcvt.rtz.xu.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfwcvtRtzXFV => "vfwcvt.rtz.x.f.v", V_V, VECTOR | FP | ROUNDING_MODE;
    VfncvtXuFW => "vfncvt.xu.f.w", V_V, VECTOR | FP | ROUNDING_MODE;
    VfncvtXFW => "vfncvt.x.f.w", V_V, VECTOR | FP | ROUNDING_MODE;
    VfncvtFXuW => "vfncvt.f.xu.w", V_V, VECTOR | FP | ROUNDING_MODE;
    VfncvtFXW => "vfncvt.f.x.w", V_V, VECTOR | FP | ROUNDING_MODE;
    VfncvtFFW => "vfncvt.f.f.w", V_V, VECTOR | FP | ROUNDING_MODE;
    VfncvtRodFFW => "vfncvt.rod.f.f.w", V_V, VECTOR | FP | ROUNDING_MODE;
    VfncvtRtzXuFW => "vfncvt.rtz.xu.f.w", V_V, VECTOR | FP | ROUNDING_MODE;
    VfncvtRtzXFW => "vfncvt.rtz.x.f.w", V_V, VECTOR | FP | ROUNDING_MODE;
    Vle8V => "vle8.v", V_LOAD, VECTOR | LOAD | size(1);
    Vse8V => "vse8.v", V_STORE, VECTOR | STORE | size(1);
    Vlse8V => "vlse8.v", V_LOAD_STRIDED, VECTOR | LOAD | size(1);
    Vsse8V => "vsse8.v", V_STORE_STRIDED, VECTOR | STORE | size(1);
    Vluxei8V => "vluxei8.v", V_LOAD_INDEXED, VECTOR | LOAD | size(1);
    Vloxei8V => "vloxei8.v", V_LOAD_INDEXED, VECTOR | LOAD | size(1);
    Vsuxei8V => "vsuxei8.v", V_STORE_INDEXED, VECTOR | STORE | size(1);
    Vsoxei8V => "vsoxei8.v", V_STORE_INDEXED, VECTOR | STORE | size(1);
    Vle8ffV => "vle8ff.v", V_LOAD, VECTOR | LOAD | size(1);
    Vlre8V => "vlre8.v", V_LOAD, VECTOR | LOAD | size(1);
    Vle16V => "vle16.v", V_LOAD, VECTOR | LOAD | size(2);
    Vse16V => "vse16.v", V_STORE, VECTOR | STORE | size(2);
    Vlse16V => "vlse16.v", V_LOAD_STRIDED, VECTOR | LOAD | size(2);
    Vsse16V => "vsse16.v", V_STORE_STRIDED, VECTOR | STORE | size(2);
    Vluxei16V => "vluxei16.v", V_LOAD_INDEXED, VECTOR | LOAD | size(2);
    Vloxei16V => "vloxei16.v", V_LOAD_INDEXED, VECTOR | LOAD | size(2);
    Vsuxei16V => "vsuxei16.v", V_STORE_INDEXED, VECTOR | STORE | size(2);
    Vsoxei16V => "vsoxei16.v", V_STORE_INDEXED, VECTOR | STORE | size(2);
    Vle16ffV => "vle16ff.v", V_LOAD, VECTOR | LOAD | size(2);
    Vlre16V => "vlre16.v", V_LOAD, VECTOR | LOAD | size(2);
    Vle32V => "vle32.v", V_LOAD, VECTOR | LOAD | size(4);
    Vse32V => "vse32.v", V_STORE, VECTOR | STORE | size(4);
    Vlse32V => "vlse32.v", V_LOAD_STRIDED, VECTOR | LOAD | size(4);
    Vsse32V => "vsse32.v", V_STORE_STRIDED, VECTOR | STORE | size(4);
    Vluxei32V => "vluxei32.v", V_LOAD_INDEXED, VECTOR | LOAD | size(4);
    Vloxei32V => "vloxei32.v", V_LOAD_INDEXED, VECTOR | LOAD | size(4);
    Vsuxei32V => "vsuxei32.v", V_STORE_INDEXED, VECTOR | STORE | size(4);
    Vsoxei32V => "vsoxei32.v", V_STORE_INDEXED, VECTOR | STORE | size(4);
    Vle32ffV => "vle32ff.v", V_LOAD, VECTOR | LOAD | size(4);
    Vlre32V => "vlre32.v", V_LOAD, VECTOR | LOAD | size(4);
    Vle64V => "vle64.v", V_LOAD, VECTOR | LOAD | size(8);
    Vse64V => "vse64.v", V_STORE, VECTOR | STORE | size(8);
    Vlse64V => "vlse64.v", V_LOAD_STRIDED, VECTOR | LOAD | size(8);
    Vsse64V => "vsse64.v", V_STORE_STRIDED, VECTOR | STORE | size(8);
    Vluxei64V => "vluxei64.v", V_LOAD_INDEXED, VECTOR | LOAD | size(8);
    Vloxei64V => "vloxei64.v", V_LOAD_INDEXED, VECTOR | LOAD | size(8);
    Vsuxei64V => "vsuxei64.v", V_STORE_INDEXED, VECTOR | STORE | size(8);
    Vsoxei64V => "vsoxei64.v", V_STORE_INDEXED, VECTOR | STORE | size(8);
    Vle64ffV => "vle64ff.v", V_LOAD, VECTOR | LOAD | size(8);
    Vlre64V => "vlre64.v", V_LOAD, VECTOR | LOAD | size(8);
    VsrV => "vsr.v", V_STORE, VECTOR | STORE | size(1);
    VlmV => "vlm.v", V_LOAD, VECTOR | LOAD | size(1);
    VsmV => "vsm.v", V_STORE, VECTOR | STORE | size(1);
}

impl InstructionId {
    /// Returns the catalog entry of this identifier.
    pub fn descriptor(self) -> &'static InstructionDescriptor {
        &CATALOG[self as usize]
    }

    pub fn mnemonic(self) -> &'static str {
        self.descriptor().mnemonic
    }

    pub fn is_illegal(self) -> bool {
        self == InstructionId::Illegal
    }

    /// Looks up an identifier by its mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        CATALOG
            .iter()
            .find(|descriptor| descriptor.mnemonic == mnemonic)
            .map(|descriptor| descriptor.id)
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_indexed_by_id() {
        assert_eq!(CATALOG.len(), InstructionId::ALL.len());
        for (index, id) in InstructionId::ALL.iter().enumerate() {
            assert_eq!(*id as usize, index);
            assert_eq!(id.descriptor().id(), *id);
        }
    }

    #[test]
    fn mnemonics_are_unique() {
        for id in InstructionId::ALL {
            assert_eq!(InstructionId::from_mnemonic(id.mnemonic()), Some(*id));
        }
    }

    #[test]
    fn flags_and_operands() {
        let lw = InstructionId::Lw.descriptor();
        assert!(lw.is_load());
        assert!(!lw.is_store());
        assert_eq!(lw.data_size(), 4);
        assert_eq!(lw.operand(0).map(|op| op.kind), Some(OperandType::IntReg));
        assert!(lw.operand(0).is_some_and(Operand::is_write));
        assert_eq!(lw.operand(3), None);

        let bltu = InstructionId::Bltu.descriptor();
        assert!(bltu.is_conditional_branch() && bltu.is_unsigned());
        assert!(InstructionId::Jalr.descriptor().is_branch_to_register());
        assert!(InstructionId::AmoaddD.descriptor().is_atomic());
        assert!(InstructionId::FdivD.descriptor().is_divide());
        assert!(InstructionId::FaddS.descriptor().has_rounding_mode());
        assert!(InstructionId::Csrrw.descriptor().is_csr());
        assert!(InstructionId::VaddVv.descriptor().is_vector());
        assert_eq!(InstructionId::Vle16V.descriptor().data_size(), 2);

        let vmacc = InstructionId::VmaccVx.descriptor();
        assert_eq!(vmacc.operand(0).map(|op| op.mode), Some(OperandMode::ReadWrite));
        assert_eq!(vmacc.operand(1).map(|op| op.kind), Some(OperandType::IntReg));
    }
}
