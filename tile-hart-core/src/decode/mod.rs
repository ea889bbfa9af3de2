//! Instruction decoding.
//!
//! Decoding is a pure function from a raw 16/32-bit encoding to an [`InstructionId`] plus up to
//! four operand values. It never fails: an unmatched encoding, or one whose extension is disabled,
//! decodes to [`InstructionId::Illegal`], which the execution engine handles like any other
//! instruction.
//!
//! Operand conventions:
//! - register operands hold the register number;
//! - immediates are stored as the bits of a sign-extended `i32` (`lui`/`auipc` hold the already
//!   shifted value);
//! - stores list the data register first, then the base register and the offset;
//! - vector instructions list `vd, vs2, vs1/rs1/imm`, except multiply-accumulate forms which list
//!   `vd, vs1/rs1, vs2`, following the assembly syntax of those instructions.

mod compressed;
mod fp;
mod vector;

use crate::catalog::{InstructionDescriptor, InstructionId};
use crate::registers::Specifier;
use crate::Xlen;
use std::fmt;

use InstructionId as I;

/// Extension switches consulted by the decoder (and by the hart for `misa`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Extensions {
    pub m: bool,
    pub a: bool,
    pub f: bool,
    pub d: bool,
    pub zfh: bool,
    pub c: bool,
    pub v: bool,
    pub zba: bool,
    pub zbb: bool,
    pub zbc: bool,
    pub zbs: bool,
    pub zbe: bool,
    pub zbf: bool,
    pub zbp: bool,
    pub zbr: bool,
    pub zbt: bool,
    pub s: bool,
    pub u: bool,
}

impl Default for Extensions {
    fn default() -> Self {
        Self::all()
    }
}

impl Extensions {
    /// Every supported extension enabled.
    pub fn all() -> Self {
        Self {
            m: true,
            a: true,
            f: true,
            d: true,
            zfh: true,
            c: true,
            v: true,
            zba: true,
            zbb: true,
            zbc: true,
            zbs: true,
            zbe: true,
            zbf: true,
            zbp: true,
            zbr: true,
            zbt: true,
            s: true,
            u: true,
        }
    }

    /// Only the base integer ISA with machine mode.
    pub fn none() -> Self {
        Self {
            m: false,
            a: false,
            f: false,
            d: false,
            zfh: false,
            c: false,
            v: false,
            zba: false,
            zbb: false,
            zbc: false,
            zbs: false,
            zbe: false,
            zbf: false,
            zbp: false,
            zbr: false,
            zbt: false,
            s: false,
            u: false,
        }
    }

    /// Value of the extension bits of `misa`.
    pub fn misa_bits(&self) -> u64 {
        let letter = |enabled: bool, c: u8| (enabled as u64) << (c - b'A');
        letter(true, b'I')
            | letter(self.m, b'M')
            | letter(self.a, b'A')
            | letter(self.f, b'F')
            | letter(self.d, b'D')
            | letter(self.c, b'C')
            | letter(self.v, b'V')
            | letter(self.s, b'S')
            | letter(self.u, b'U')
            | letter(
                self.zba || self.zbb || self.zbc || self.zbs || self.zbp || self.zbr || self.zbt,
                b'B',
            )
    }
}

/// An instruction produced by the [`Decoder`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DecodedInstruction {
    address: u64,
    physical_address: u64,
    raw: u32,
    size: u8,
    id: InstructionId,
    ops: [u32; 4],
    masked: bool,
    field_count: u8,
}

impl DecodedInstruction {
    /// Virtual address the instruction was fetched from.
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn physical_address(&self) -> u64 {
        self.physical_address
    }

    /// Raw encoding; only the low 16 bits are meaningful for compressed instructions.
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Size of the encoding in bytes, `2` or `4`.
    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn is_compressed(&self) -> bool {
        self.size == 2
    }

    pub fn id(&self) -> InstructionId {
        self.id
    }

    pub fn descriptor(&self) -> &'static InstructionDescriptor {
        self.id.descriptor()
    }

    pub fn op(&self, i: usize) -> u32 {
        self.ops[i]
    }

    pub fn op0(&self) -> u32 {
        self.ops[0]
    }

    pub fn op1(&self) -> u32 {
        self.ops[1]
    }

    pub fn op2(&self) -> u32 {
        self.ops[2]
    }

    pub fn op3(&self) -> u32 {
        self.ops[3]
    }

    /// Operand `i` interpreted as a signed immediate.
    pub fn imm(&self, i: usize) -> i32 {
        self.ops[i] as i32
    }

    /// Operand `i` interpreted as a register specifier.
    pub fn reg(&self, i: usize) -> Specifier {
        Specifier::from_u5((self.ops[i] & 0x1f) as u8)
    }

    /// `true` if a vector instruction is masked by `v0` (`vm` bit clear).
    pub fn masked(&self) -> bool {
        self.masked
    }

    /// Number of fields of a segment load/store, or register count of a whole-register access.
    pub fn field_count(&self) -> u8 {
        self.field_count
    }

    /// Value of the `rm` field of floating-point encodings.
    pub fn rounding_mode_field(&self) -> u32 {
        (self.raw >> 12) & 0b111
    }

    #[cfg(test)]
    pub(crate) fn relocate(&mut self, address: u64, physical_address: u64) {
        self.address = address;
        self.physical_address = physical_address;
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {}", self.address, self.id)?;
        for (i, operand) in self.descriptor().operands().iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            match operand.kind {
                crate::catalog::OperandType::IntReg => write!(f, "{sep}x{}", self.ops[i])?,
                crate::catalog::OperandType::FpReg => write!(f, "{sep}f{}", self.ops[i])?,
                crate::catalog::OperandType::VecReg => write!(f, "{sep}v{}", self.ops[i])?,
                crate::catalog::OperandType::CsReg => write!(f, "{sep}{:#x}", self.ops[i])?,
                crate::catalog::OperandType::Immediate => write!(f, "{sep}{}", self.imm(i))?,
            }
        }
        Ok(())
    }
}

/// Intermediate decode result before it is attached to an address.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Decoded {
    pub id: InstructionId,
    pub ops: [u32; 4],
    pub masked: bool,
    pub field_count: u8,
}

impl Decoded {
    pub fn new(id: InstructionId, op0: u32, op1: u32, op2: u32) -> Self {
        Self {
            id,
            ops: [op0, op1, op2, 0],
            masked: false,
            field_count: 1,
        }
    }

    pub fn illegal() -> Self {
        Self::new(I::Illegal, 0, 0, 0)
    }

    pub fn with_op3(mut self, op3: u32) -> Self {
        self.ops[3] = op3;
        self
    }

    pub fn with_mask(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    pub fn with_field_count(mut self, field_count: u8) -> Self {
        self.field_count = field_count;
        self
    }

    /// Turns the result into an illegal instruction unless `enabled`.
    pub fn gated(self, enabled: bool) -> Self {
        if enabled {
            self
        } else {
            Self::illegal()
        }
    }
}

pub(crate) mod fields {
    //! Bit-field extraction for 32-bit encodings.

    pub fn rd(inst: u32) -> u32 {
        (inst >> 7) & 0x1f
    }

    pub fn rs1(inst: u32) -> u32 {
        (inst >> 15) & 0x1f
    }

    pub fn rs2(inst: u32) -> u32 {
        (inst >> 20) & 0x1f
    }

    pub fn rs3(inst: u32) -> u32 {
        inst >> 27
    }

    pub fn funct3(inst: u32) -> u32 {
        (inst >> 12) & 0b111
    }

    pub fn funct7(inst: u32) -> u32 {
        inst >> 25
    }

    pub fn i_imm(inst: u32) -> i32 {
        (inst as i32) >> 20
    }

    pub fn s_imm(inst: u32) -> i32 {
        (((inst as i32) >> 25) << 5) | ((inst >> 7) & 0x1f) as i32
    }

    pub fn b_imm(inst: u32) -> i32 {
        let imm = ((inst >> 31) << 12)
            | (((inst >> 7) & 1) << 11)
            | (((inst >> 25) & 0x3f) << 5)
            | (((inst >> 8) & 0xf) << 1);
        ((imm << 19) as i32) >> 19
    }

    pub fn u_imm(inst: u32) -> i32 {
        (inst & 0xffff_f000) as i32
    }

    pub fn j_imm(inst: u32) -> i32 {
        let imm = ((inst >> 31) << 20)
            | (((inst >> 12) & 0xff) << 12)
            | (((inst >> 20) & 1) << 11)
            | (((inst >> 21) & 0x3ff) << 1);
        ((imm << 11) as i32) >> 11
    }
}

use fields::*;

/// Decoder for one hart configuration.
#[derive(Debug, Copy, Clone)]
pub struct Decoder {
    xlen: Xlen,
    ext: Extensions,
    wide_ld_st: bool,
    bbarrier: bool,
}

impl Decoder {
    pub fn new(xlen: Xlen, ext: Extensions) -> Self {
        Self {
            xlen,
            ext,
            wide_ld_st: false,
            bbarrier: false,
        }
    }

    /// Enables the custom `load64`/`store64` and `bbarrier` encodings.
    pub fn with_custom(mut self, wide_ld_st: bool, bbarrier: bool) -> Self {
        self.wide_ld_st = wide_ld_st;
        self.bbarrier = bbarrier;
        self
    }

    pub fn xlen(&self) -> Xlen {
        self.xlen
    }

    pub fn extensions(&self) -> &Extensions {
        &self.ext
    }

    fn rv64(&self) -> bool {
        self.xlen.is_rv64()
    }

    /// Decodes `raw` as if fetched from address `0`.
    pub fn decode(&self, raw: u32) -> DecodedInstruction {
        self.decode_at(0, 0, raw)
    }

    /// Decodes `raw` fetched from virtual `address` (physical `physical_address`).
    pub fn decode_at(&self, address: u64, physical_address: u64, raw: u32) -> DecodedInstruction {
        let (decoded, size, raw) = if raw & 0b11 == 0b11 {
            (self.decode32(raw), 4, raw)
        } else {
            let half = raw & 0xffff;
            (compressed::decode(self, half as u16), 2, half)
        };
        DecodedInstruction {
            address,
            physical_address,
            raw,
            size,
            id: decoded.id,
            ops: decoded.ops,
            masked: decoded.masked,
            field_count: decoded.field_count,
        }
    }

    pub(crate) fn decode32(&self, inst: u32) -> Decoded {
        let rd = rd(inst);
        let rs1 = rs1(inst);
        let rs2 = rs2(inst);
        let f3 = funct3(inst);
        let rv64 = self.rv64();

        match (inst >> 2) & 0x1f {
            0b00000 => {
                let id = match f3 {
                    0 => I::Lb,
                    1 => I::Lh,
                    2 => I::Lw,
                    3 if rv64 => I::Ld,
                    4 => I::Lbu,
                    5 => I::Lhu,
                    6 if rv64 => I::Lwu,
                    _ => return Decoded::illegal(),
                };
                Decoded::new(id, rd, rs1, i_imm(inst) as u32)
            }
            0b00001 => match f3 {
                1 => Decoded::new(I::Flh, rd, rs1, i_imm(inst) as u32).gated(self.ext.zfh),
                2 => Decoded::new(I::Flw, rd, rs1, i_imm(inst) as u32).gated(self.ext.f),
                3 => Decoded::new(I::Fld, rd, rs1, i_imm(inst) as u32).gated(self.ext.d),
                0 | 5 | 6 | 7 if self.ext.v => vector::decode_load(inst),
                _ => Decoded::illegal(),
            },
            0b00010 => {
                if f3 == 3 && self.wide_ld_st {
                    Decoded::new(I::Load64, rd, rs1, i_imm(inst) as u32)
                } else if f3 == 0 && self.bbarrier && i_imm(inst) == 0xff {
                    Decoded::new(I::Bbarrier, 0, 0, 0)
                } else {
                    Decoded::illegal()
                }
            }
            0b00011 => match f3 {
                0 => Decoded::new(I::Fence, (inst >> 24) & 0xf, (inst >> 20) & 0xf, 0),
                1 => Decoded::new(I::FenceI, 0, 0, 0),
                _ => Decoded::illegal(),
            },
            0b00100 => self.decode_op_imm(inst),
            0b00101 => Decoded::new(I::Auipc, rd, u_imm(inst) as u32, 0),
            0b00110 if rv64 => self.decode_op_imm32(inst),
            0b01000 => {
                let id = match f3 {
                    0 => I::Sb,
                    1 => I::Sh,
                    2 => I::Sw,
                    3 if rv64 => I::Sd,
                    _ => return Decoded::illegal(),
                };
                Decoded::new(id, rs2, rs1, s_imm(inst) as u32)
            }
            0b01001 => match f3 {
                1 => Decoded::new(I::Fsh, rs2, rs1, s_imm(inst) as u32).gated(self.ext.zfh),
                2 => Decoded::new(I::Fsw, rs2, rs1, s_imm(inst) as u32).gated(self.ext.f),
                3 => Decoded::new(I::Fsd, rs2, rs1, s_imm(inst) as u32).gated(self.ext.d),
                0 | 5 | 6 | 7 if self.ext.v => vector::decode_store(inst),
                _ => Decoded::illegal(),
            },
            0b01010 => {
                if f3 == 3 && self.wide_ld_st {
                    Decoded::new(I::Store64, rs2, rs1, s_imm(inst) as u32)
                } else {
                    Decoded::illegal()
                }
            }
            0b01011 if self.ext.a => self.decode_amo(inst),
            0b01100 => self.decode_op(inst),
            0b01101 => Decoded::new(I::Lui, rd, u_imm(inst) as u32, 0),
            0b01110 if rv64 => self.decode_op32(inst),
            0b10000..=0b10011 => fp::decode_fused(self, inst),
            0b10100 => fp::decode(self, inst),
            0b10101 if self.ext.v => vector::decode(self, inst),
            0b11000 => {
                let id = match f3 {
                    0 => I::Beq,
                    1 => I::Bne,
                    4 => I::Blt,
                    5 => I::Bge,
                    6 => I::Bltu,
                    7 => I::Bgeu,
                    _ => return Decoded::illegal(),
                };
                Decoded::new(id, rs1, rs2, b_imm(inst) as u32)
            }
            0b11001 if f3 == 0 => Decoded::new(I::Jalr, rd, rs1, i_imm(inst) as u32),
            0b11011 => Decoded::new(I::Jal, rd, j_imm(inst) as u32, 0),
            0b11100 => self.decode_system(inst),
            _ => Decoded::illegal(),
        }
    }

    fn decode_op_imm(&self, inst: u32) -> Decoded {
        let rd = rd(inst);
        let rs1 = rs1(inst);
        let imm = i_imm(inst) as u32;
        let ext = &self.ext;
        match funct3(inst) {
            0 => Decoded::new(I::Addi, rd, rs1, imm),
            2 => Decoded::new(I::Slti, rd, rs1, imm),
            3 => Decoded::new(I::Sltiu, rd, rs1, imm),
            4 => Decoded::new(I::Xori, rd, rs1, imm),
            6 => Decoded::new(I::Ori, rd, rs1, imm),
            7 => Decoded::new(I::Andi, rd, rs1, imm),
            f3 => {
                // Shift-like group: bits 31..26 select the operation, the rest is a shift amount.
                // On RV32 bit 25 would be shamt[5], which is reserved.
                if !self.rv64() && (inst >> 25) & 1 == 1 {
                    return Decoded::illegal();
                }
                let f6 = inst >> 26;
                let shamt = (inst >> 20) & self.xlen.shamt_mask() as u32;
                let xlen = self.xlen.bits();
                if f3 == 1 {
                    match f6 {
                        0x00 => Decoded::new(I::Slli, rd, rs1, shamt),
                        0x18 => self.decode_unary(inst),
                        0x0a => Decoded::new(I::Bseti, rd, rs1, shamt).gated(ext.zbs),
                        0x12 => Decoded::new(I::Bclri, rd, rs1, shamt).gated(ext.zbs),
                        0x1a => Decoded::new(I::Binvi, rd, rs1, shamt).gated(ext.zbs),
                        0x02 => {
                            let amount = (inst >> 20) & (xlen / 2 - 1);
                            if amount != (inst >> 20) & 0x1f {
                                return Decoded::illegal();
                            }
                            Decoded::new(I::Shfli, rd, rs1, amount).gated(ext.zbp)
                        }
                        _ => Decoded::illegal(),
                    }
                } else if f6 & 1 == 1 {
                    Decoded::new(I::Fsri, rd, rs1, rs3(inst))
                        .with_op3(shamt)
                        .gated(ext.zbt)
                } else {
                    match f6 {
                        0x00 => Decoded::new(I::Srli, rd, rs1, shamt),
                        0x10 => Decoded::new(I::Srai, rd, rs1, shamt),
                        0x18 => Decoded::new(I::Rori, rd, rs1, shamt).gated(ext.zbb || ext.zbp),
                        0x1a if shamt == xlen - 8 => {
                            Decoded::new(I::Rev8, rd, rs1, 0).gated(ext.zbb || ext.zbp)
                        }
                        0x1a => Decoded::new(I::Grevi, rd, rs1, shamt).gated(ext.zbp),
                        0x0a if shamt == 7 => {
                            Decoded::new(I::OrcB, rd, rs1, 0).gated(ext.zbb || ext.zbp)
                        }
                        0x0a => Decoded::new(I::Gorci, rd, rs1, shamt).gated(ext.zbp),
                        0x12 => Decoded::new(I::Bexti, rd, rs1, shamt).gated(ext.zbs),
                        0x02 => {
                            let amount = (inst >> 20) & (xlen / 2 - 1);
                            if amount != (inst >> 20) & 0x1f {
                                return Decoded::illegal();
                            }
                            Decoded::new(I::Unshfli, rd, rs1, amount).gated(ext.zbp)
                        }
                        _ => Decoded::illegal(),
                    }
                }
            }
        }
    }

    /// Single-source bit-manipulation operations selected by the `rs2` field.
    fn decode_unary(&self, inst: u32) -> Decoded {
        let rd = rd(inst);
        let rs1 = rs1(inst);
        let ext = &self.ext;
        let rv64 = self.rv64();
        if (inst >> 25) & 1 == 1 {
            return Decoded::illegal();
        }
        let (id, enabled) = match rs2(inst) {
            0x00 => (I::Clz, ext.zbb),
            0x01 => (I::Ctz, ext.zbb),
            0x02 => (I::Cpop, ext.zbb),
            0x03 => (I::Bmatflip, ext.zbp && rv64),
            0x04 => (I::SextB, ext.zbb),
            0x05 => (I::SextH, ext.zbb),
            0x10 => (I::Crc32B, ext.zbr),
            0x11 => (I::Crc32H, ext.zbr),
            0x12 => (I::Crc32W, ext.zbr),
            0x13 => (I::Crc32D, ext.zbr && rv64),
            0x18 => (I::Crc32cB, ext.zbr),
            0x19 => (I::Crc32cH, ext.zbr),
            0x1a => (I::Crc32cW, ext.zbr),
            0x1b => (I::Crc32cD, ext.zbr && rv64),
            _ => return Decoded::illegal(),
        };
        Decoded::new(id, rd, rs1, 0).gated(enabled)
    }

    fn decode_op_imm32(&self, inst: u32) -> Decoded {
        let rd = rd(inst);
        let rs1 = rs1(inst);
        let f7 = funct7(inst);
        let shamt = rs2(inst);
        let ext = &self.ext;
        match funct3(inst) {
            0 => Decoded::new(I::Addiw, rd, rs1, i_imm(inst) as u32),
            1 => match f7 {
                0x00 => Decoded::new(I::Slliw, rd, rs1, shamt),
                0x04 | 0x05 => {
                    Decoded::new(I::SlliUw, rd, rs1, (inst >> 20) & 0x3f).gated(ext.zba)
                }
                0x30 => {
                    let id = match rs2(inst) {
                        0 => I::Clzw,
                        1 => I::Ctzw,
                        2 => I::Cpopw,
                        _ => return Decoded::illegal(),
                    };
                    Decoded::new(id, rd, rs1, 0).gated(ext.zbb)
                }
                _ => Decoded::illegal(),
            },
            5 => match f7 {
                0x00 => Decoded::new(I::Srliw, rd, rs1, shamt),
                0x20 => Decoded::new(I::Sraiw, rd, rs1, shamt),
                0x30 => Decoded::new(I::Roriw, rd, rs1, shamt).gated(ext.zbb || ext.zbp),
                0x34 => Decoded::new(I::Greviw, rd, rs1, shamt).gated(ext.zbp),
                0x14 => Decoded::new(I::Gorciw, rd, rs1, shamt).gated(ext.zbp),
                _ if f7 & 0b11 == 0b10 => Decoded::new(I::Fsriw, rd, rs1, rs3(inst))
                    .with_op3(shamt)
                    .gated(ext.zbt),
                _ => Decoded::illegal(),
            },
            _ => Decoded::illegal(),
        }
    }

    fn decode_op(&self, inst: u32) -> Decoded {
        let rd = rd(inst);
        let rs1 = rs1(inst);
        let rs2 = rs2(inst);
        let f3 = funct3(inst);
        let f7 = funct7(inst);
        let ext = &self.ext;
        let rv64 = self.rv64();

        if f7 & 0b11 == 0b11 || f7 & 0b11 == 0b10 {
            let id = match (f7 & 0b11, f3) {
                (0b11, 1) => I::Cmix,
                (0b11, 5) => I::Cmov,
                (0b10, 1) => I::Fsl,
                (0b10, 5) => I::Fsr,
                _ => return Decoded::illegal(),
            };
            return Decoded::new(id, rd, rs1, rs2)
                .with_op3(rs3(inst))
                .gated(ext.zbt);
        }

        let (id, enabled) = match (f7, f3) {
            (0x00, 0) => (I::Add, true),
            (0x20, 0) => (I::Sub, true),
            (0x00, 1) => (I::Sll, true),
            (0x00, 2) => (I::Slt, true),
            (0x00, 3) => (I::Sltu, true),
            (0x00, 4) => (I::Xor, true),
            (0x00, 5) => (I::Srl, true),
            (0x20, 5) => (I::Sra, true),
            (0x00, 6) => (I::Or, true),
            (0x00, 7) => (I::And, true),
            (0x01, 0) => (I::Mul, ext.m),
            (0x01, 1) => (I::Mulh, ext.m),
            (0x01, 2) => (I::Mulhsu, ext.m),
            (0x01, 3) => (I::Mulhu, ext.m),
            (0x01, 4) => (I::Div, ext.m),
            (0x01, 5) => (I::Divu, ext.m),
            (0x01, 6) => (I::Rem, ext.m),
            (0x01, 7) => (I::Remu, ext.m),
            (0x20, 7) => (I::Andn, ext.zbb || ext.zbp),
            (0x20, 6) => (I::Orn, ext.zbb || ext.zbp),
            (0x20, 4) => (I::Xnor, ext.zbb || ext.zbp),
            (0x30, 1) => (I::Rol, ext.zbb || ext.zbp),
            (0x30, 5) => (I::Ror, ext.zbb || ext.zbp),
            (0x14, 1) => (I::Bset, ext.zbs),
            (0x24, 1) => (I::Bclr, ext.zbs),
            (0x34, 1) => (I::Binv, ext.zbs),
            (0x24, 5) => (I::Bext, ext.zbs),
            (0x14, 5) => (I::Gorc, ext.zbp),
            (0x34, 5) => (I::Grev, ext.zbp),
            (0x04, 1) => (I::Shfl, ext.zbp),
            (0x04, 5) => (I::Unshfl, ext.zbp),
            (0x14, 2) => (I::XpermN, ext.zbp),
            (0x14, 4) => (I::XpermB, ext.zbp),
            (0x14, 6) => (I::XpermH, ext.zbp),
            (0x14, 0) => (I::XpermW, ext.zbp && rv64),
            (0x04, 6) => (I::Bcompress, ext.zbe),
            (0x24, 6) => (I::Bdecompress, ext.zbe),
            (0x24, 7) => (I::Bfp, ext.zbf),
            // `pack rd, rs1, x0` is `zext.h` on RV32.
            (0x04, 4) => (
                I::Pack,
                ext.zbe || ext.zbf || ext.zbp || (ext.zbb && !rv64 && rs2 == 0),
            ),
            (0x24, 4) => (I::Packu, ext.zbp),
            (0x04, 7) => (I::Packh, ext.zbe || ext.zbf || ext.zbp),
            (0x05, 4) => (I::Min, ext.zbb),
            (0x05, 5) => (I::Minu, ext.zbb),
            (0x05, 6) => (I::Max, ext.zbb),
            (0x05, 7) => (I::Maxu, ext.zbb),
            (0x05, 1) => (I::Clmul, ext.zbc),
            (0x05, 2) => (I::Clmulr, ext.zbc),
            (0x05, 3) => (I::Clmulh, ext.zbc),
            (0x10, 2) => (I::Sh1add, ext.zba),
            (0x10, 4) => (I::Sh2add, ext.zba),
            (0x10, 6) => (I::Sh3add, ext.zba),
            (0x04, 3) => (I::Bmator, ext.zbp && rv64),
            (0x24, 3) => (I::Bmatxor, ext.zbp && rv64),
            _ => return Decoded::illegal(),
        };
        Decoded::new(id, rd, rs1, rs2).gated(enabled)
    }

    fn decode_op32(&self, inst: u32) -> Decoded {
        let rd = rd(inst);
        let rs1 = rs1(inst);
        let rs2 = rs2(inst);
        let f3 = funct3(inst);
        let f7 = funct7(inst);
        let ext = &self.ext;

        if f7 & 0b11 == 0b10 {
            let id = match f3 {
                1 => I::Fslw,
                5 => I::Fsrw,
                _ => return Decoded::illegal(),
            };
            return Decoded::new(id, rd, rs1, rs2)
                .with_op3(rs3(inst))
                .gated(ext.zbt);
        }

        let (id, enabled) = match (f7, f3) {
            (0x00, 0) => (I::Addw, true),
            (0x20, 0) => (I::Subw, true),
            (0x00, 1) => (I::Sllw, true),
            (0x00, 5) => (I::Srlw, true),
            (0x20, 5) => (I::Sraw, true),
            (0x01, 0) => (I::Mulw, ext.m),
            (0x01, 4) => (I::Divw, ext.m),
            (0x01, 5) => (I::Divuw, ext.m),
            (0x01, 6) => (I::Remw, ext.m),
            (0x01, 7) => (I::Remuw, ext.m),
            (0x04, 0) => (I::AddUw, ext.zba),
            (0x10, 2) => (I::Sh1addUw, ext.zba),
            (0x10, 4) => (I::Sh2addUw, ext.zba),
            (0x10, 6) => (I::Sh3addUw, ext.zba),
            (0x30, 1) => (I::Rolw, ext.zbb || ext.zbp),
            (0x30, 5) => (I::Rorw, ext.zbb || ext.zbp),
            // `packw rd, rs1, x0` is `zext.h` on RV64.
            (0x04, 4) => (
                I::Packw,
                ext.zbe || ext.zbf || ext.zbp || (ext.zbb && rs2 == 0),
            ),
            (0x24, 4) => (I::Packuw, ext.zbp),
            (0x04, 1) => (I::Shflw, ext.zbp),
            (0x04, 5) => (I::Unshflw, ext.zbp),
            (0x04, 6) => (I::Bcompressw, ext.zbe),
            (0x24, 6) => (I::Bdecompressw, ext.zbe),
            (0x24, 7) => (I::Bfpw, ext.zbf),
            (0x14, 5) => (I::Gorcw, ext.zbp),
            (0x34, 5) => (I::Grevw, ext.zbp),
            _ => return Decoded::illegal(),
        };
        Decoded::new(id, rd, rs1, rs2).gated(enabled)
    }

    fn decode_amo(&self, inst: u32) -> Decoded {
        let rd = rd(inst);
        let rs1 = rs1(inst);
        let rs2 = rs2(inst);
        let double = match funct3(inst) {
            2 => false,
            3 if self.rv64() => true,
            _ => return Decoded::illegal(),
        };
        let pick = |w: InstructionId, d: InstructionId| if double { d } else { w };
        let id = match inst >> 27 {
            0x02 if rs2 == 0 => return Decoded::new(pick(I::LrW, I::LrD), rd, rs1, 0),
            0x03 => pick(I::ScW, I::ScD),
            0x01 => pick(I::AmoswapW, I::AmoswapD),
            0x00 => pick(I::AmoaddW, I::AmoaddD),
            0x04 => pick(I::AmoxorW, I::AmoxorD),
            0x0c => pick(I::AmoandW, I::AmoandD),
            0x08 => pick(I::AmoorW, I::AmoorD),
            0x10 => pick(I::AmominW, I::AmominD),
            0x14 => pick(I::AmomaxW, I::AmomaxD),
            0x18 => pick(I::AmominuW, I::AmominuD),
            0x1c => pick(I::AmomaxuW, I::AmomaxuD),
            _ => return Decoded::illegal(),
        };
        Decoded::new(id, rd, rs1, rs2)
    }

    fn decode_system(&self, inst: u32) -> Decoded {
        let rd = rd(inst);
        let rs1 = rs1(inst);
        let csr = inst >> 20;
        match funct3(inst) {
            0 => {
                if funct7(inst) == 0x09 && rd == 0 {
                    return Decoded::new(I::SfenceVma, rs1, rs2(inst), 0).gated(self.ext.s);
                }
                if rd != 0 || rs1 != 0 {
                    return Decoded::illegal();
                }
                match csr {
                    0x000 => Decoded::new(I::Ecall, 0, 0, 0),
                    0x001 => Decoded::new(I::Ebreak, 0, 0, 0),
                    0x002 => Decoded::new(I::Uret, 0, 0, 0),
                    0x102 => Decoded::new(I::Sret, 0, 0, 0).gated(self.ext.s),
                    0x302 => Decoded::new(I::Mret, 0, 0, 0),
                    0x105 => Decoded::new(I::Wfi, 0, 0, 0),
                    _ => Decoded::illegal(),
                }
            }
            1 => Decoded::new(I::Csrrw, rd, rs1, csr),
            2 => Decoded::new(I::Csrrs, rd, rs1, csr),
            3 => Decoded::new(I::Csrrc, rd, rs1, csr),
            5 => Decoded::new(I::Csrrwi, rd, rs1, csr),
            6 => Decoded::new(I::Csrrsi, rd, rs1, csr),
            7 => Decoded::new(I::Csrrci, rd, rs1, csr),
            _ => Decoded::illegal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rv32() -> Decoder {
        Decoder::new(Xlen::Rv32, Extensions::all())
    }

    fn rv64() -> Decoder {
        Decoder::new(Xlen::Rv64, Extensions::all())
    }

    #[test]
    fn nop_decodes_to_addi() {
        let di = rv32().decode(0x0000_0013);
        assert_eq!(di.id(), InstructionId::Addi);
        assert_eq!((di.op0(), di.op1(), di.op2()), (0, 0, 0));
        assert_eq!(di.size(), 4);
    }

    #[test]
    fn immediates_are_sign_extended() {
        // addi x1, x2, -1
        let di = rv32().decode(0xfff1_0093);
        assert_eq!(di.id(), InstructionId::Addi);
        assert_eq!((di.op0(), di.op1(), di.imm(2)), (1, 2, -1));
        // sw x5, -4(x2)
        let di = rv32().decode(0xfe51_2e23);
        assert_eq!(di.id(), InstructionId::Sw);
        assert_eq!((di.op0(), di.op1(), di.imm(2)), (5, 2, -4));
        // beq x1, x2, -8
        let di = rv32().decode(0xfe20_8ce3);
        assert_eq!(di.id(), InstructionId::Beq);
        assert_eq!(di.imm(2), -8);
        // jal x1, 2048
        let di = rv32().decode(0x0010_00ef);
        assert_eq!(di.id(), InstructionId::Jal);
        assert_eq!(di.imm(1), 2048);
        // lui x5, 0x80000
        let di = rv32().decode(0x8000_02b7);
        assert_eq!(di.id(), InstructionId::Lui);
        assert_eq!(di.op1(), 0x8000_0000);
    }

    #[test]
    fn rv64_only_encodings_are_illegal_on_rv32() {
        // ld x1, 0(x2)
        assert_eq!(rv32().decode(0x0001_3083).id(), InstructionId::Illegal);
        assert_eq!(rv64().decode(0x0001_3083).id(), InstructionId::Ld);
        // addiw x1, x1, 1
        assert_eq!(rv32().decode(0x0010_809b).id(), InstructionId::Illegal);
        assert_eq!(rv64().decode(0x0010_809b).id(), InstructionId::Addiw);
        // slli x1, x1, 32 needs a 6-bit shift amount
        assert_eq!(rv32().decode(0x0200_9093).id(), InstructionId::Illegal);
        let di = rv64().decode(0x0200_9093);
        assert_eq!((di.id(), di.op2()), (InstructionId::Slli, 32));
    }

    #[test]
    fn disabled_extensions_decode_illegal() {
        let base = Decoder::new(Xlen::Rv32, Extensions::none());
        // mul x1, x2, x3
        assert_eq!(base.decode(0x0231_00b3).id(), InstructionId::Illegal);
        assert_eq!(rv32().decode(0x0231_00b3).id(), InstructionId::Mul);
        // fadd.s f1, f2, f3
        assert_eq!(base.decode(0x0031_70d3).id(), InstructionId::Illegal);
        assert_eq!(rv32().decode(0x0031_70d3).id(), InstructionId::FaddS);
    }

    #[test]
    fn system_and_csr() {
        assert_eq!(rv32().decode(0x0000_0073).id(), InstructionId::Ecall);
        assert_eq!(rv32().decode(0x0010_0073).id(), InstructionId::Ebreak);
        assert_eq!(rv32().decode(0x3020_0073).id(), InstructionId::Mret);
        assert_eq!(rv32().decode(0x1050_0073).id(), InstructionId::Wfi);
        // csrrw x1, mscratch, x2
        let di = rv32().decode(0x3401_10f3);
        assert_eq!(di.id(), InstructionId::Csrrw);
        assert_eq!((di.op0(), di.op1(), di.op2()), (1, 2, 0x340));
    }

    #[test]
    fn bitmanip_encodings() {
        // clz x1, x2
        assert_eq!(rv32().decode(0x6001_1093).id(), InstructionId::Clz);
        // rev8 x1, x2 on RV32 and RV64
        assert_eq!(rv32().decode(0x6981_5093).id(), InstructionId::Rev8);
        assert_eq!(rv64().decode(0x6b81_5093).id(), InstructionId::Rev8);
        // orc.b x1, x2
        assert_eq!(rv32().decode(0x2871_5093).id(), InstructionId::OrcB);
        // andn x1, x2, x3
        assert_eq!(rv32().decode(0x4031_70b3).id(), InstructionId::Andn);
        // sh2add x1, x2, x3
        assert_eq!(rv32().decode(0x2031_40b3).id(), InstructionId::Sh2add);
        // cmov x1, x2, x3, x4
        let di = rv32().decode(0x2631_50b3);
        assert_eq!(di.id(), InstructionId::Cmov);
        assert_eq!(di.op3(), 4);
    }

    #[test]
    fn custom_encodings_are_gated() {
        // load64 x1, 0(x2)
        let raw = 0x0001_308b;
        assert_eq!(rv32().decode(raw).id(), InstructionId::Illegal);
        let custom = rv32().with_custom(true, true);
        assert_eq!(custom.decode(raw).id(), InstructionId::Load64);
        // bbarrier
        assert_eq!(custom.decode(0x0ff0_000b).id(), InstructionId::Bbarrier);
    }

    #[test]
    fn decode_is_total() {
        let decoder = rv64();
        let mut state = 0x1234_5678u32;
        for _ in 0..200_000 {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let di = decoder.decode(state);
            assert!(di.descriptor().operand_count() <= 4);
        }
        for half in 0..=u16::MAX {
            decoder.decode(half as u32);
        }
    }
}
