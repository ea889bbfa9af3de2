//! Decoder for the 16-bit compressed (C extension) encodings.
//!
//! Every compressed instruction decodes to the identifier of its 32-bit equivalent, with the
//! implied operands (`x0`, `x1`, `x2`, the duplicated destination) made explicit.

use super::{Decoded, Decoder};
use crate::catalog::InstructionId as I;

fn bit(c: u32, n: u32) -> u32 {
    (c >> n) & 1
}

fn bits(c: u32, hi: u32, lo: u32) -> u32 {
    (c >> lo) & ((1 << (hi - lo + 1)) - 1)
}

fn sign_extend(value: u32, width: u32) -> u32 {
    let shift = 32 - width;
    (((value << shift) as i32) >> shift) as u32
}

/// Register encoded in a 3-bit field (`x8..=x15`).
fn creg(c: u32, lo: u32) -> u32 {
    8 + bits(c, lo + 2, lo)
}

fn imm6(c: u32) -> u32 {
    sign_extend((bit(c, 12) << 5) | bits(c, 6, 2), 6)
}

fn shamt6(c: u32) -> u32 {
    (bit(c, 12) << 5) | bits(c, 6, 2)
}

fn lw_offset(c: u32) -> u32 {
    (bits(c, 12, 10) << 3) | (bit(c, 6) << 2) | (bit(c, 5) << 6)
}

fn ld_offset(c: u32) -> u32 {
    (bits(c, 12, 10) << 3) | (bits(c, 6, 5) << 6)
}

fn lwsp_offset(c: u32) -> u32 {
    (bit(c, 12) << 5) | (bits(c, 6, 4) << 2) | (bits(c, 3, 2) << 6)
}

fn ldsp_offset(c: u32) -> u32 {
    (bit(c, 12) << 5) | (bits(c, 6, 5) << 3) | (bits(c, 4, 2) << 6)
}

fn swsp_offset(c: u32) -> u32 {
    (bits(c, 12, 9) << 2) | (bits(c, 8, 7) << 6)
}

fn sdsp_offset(c: u32) -> u32 {
    (bits(c, 12, 10) << 3) | (bits(c, 9, 7) << 6)
}

fn j_offset(c: u32) -> u32 {
    let offset = (bit(c, 12) << 11)
        | (bit(c, 11) << 4)
        | (bits(c, 10, 9) << 8)
        | (bit(c, 8) << 10)
        | (bit(c, 7) << 6)
        | (bit(c, 6) << 7)
        | (bits(c, 5, 3) << 1)
        | (bit(c, 2) << 5);
    sign_extend(offset, 12)
}

fn b_offset(c: u32) -> u32 {
    let offset = (bit(c, 12) << 8)
        | (bits(c, 11, 10) << 3)
        | (bits(c, 6, 5) << 6)
        | (bits(c, 4, 3) << 1)
        | (bit(c, 2) << 5);
    sign_extend(offset, 9)
}

pub(super) fn decode(decoder: &Decoder, inst: u16) -> Decoded {
    let ext = decoder.ext;
    if !ext.c {
        return Decoded::illegal();
    }
    let rv64 = decoder.rv64();
    let c = inst as u32;
    let f3 = bits(c, 15, 13);
    let rd = bits(c, 11, 7);
    let rs2 = bits(c, 6, 2);

    match (c & 0b11, f3) {
        (0b00, 0) => {
            let imm = (bits(c, 12, 11) << 4)
                | (bits(c, 10, 7) << 6)
                | (bit(c, 6) << 2)
                | (bit(c, 5) << 3);
            if imm == 0 {
                return Decoded::illegal();
            }
            Decoded::new(I::Addi, creg(c, 2), 2, imm)
        }
        (0b00, 1) => Decoded::new(I::Fld, creg(c, 2), creg(c, 7), ld_offset(c)).gated(ext.d),
        (0b00, 2) => Decoded::new(I::Lw, creg(c, 2), creg(c, 7), lw_offset(c)),
        (0b00, 3) if rv64 => Decoded::new(I::Ld, creg(c, 2), creg(c, 7), ld_offset(c)),
        (0b00, 3) => Decoded::new(I::Flw, creg(c, 2), creg(c, 7), lw_offset(c)).gated(ext.f),
        (0b00, 5) => Decoded::new(I::Fsd, creg(c, 2), creg(c, 7), ld_offset(c)).gated(ext.d),
        (0b00, 6) => Decoded::new(I::Sw, creg(c, 2), creg(c, 7), lw_offset(c)),
        (0b00, 7) if rv64 => Decoded::new(I::Sd, creg(c, 2), creg(c, 7), ld_offset(c)),
        (0b00, 7) => Decoded::new(I::Fsw, creg(c, 2), creg(c, 7), lw_offset(c)).gated(ext.f),

        (0b01, 0) => Decoded::new(I::Addi, rd, rd, imm6(c)),
        (0b01, 1) if rv64 => {
            if rd == 0 {
                return Decoded::illegal();
            }
            Decoded::new(I::Addiw, rd, rd, imm6(c))
        }
        (0b01, 1) => Decoded::new(I::Jal, 1, j_offset(c), 0),
        (0b01, 2) => Decoded::new(I::Addi, rd, 0, imm6(c)),
        (0b01, 3) if rd == 2 => {
            let imm = (bit(c, 12) << 9)
                | (bit(c, 6) << 4)
                | (bit(c, 5) << 6)
                | (bits(c, 4, 3) << 7)
                | (bit(c, 2) << 5);
            if imm == 0 {
                return Decoded::illegal();
            }
            Decoded::new(I::Addi, 2, 2, sign_extend(imm, 10))
        }
        (0b01, 3) => {
            let imm = (bit(c, 12) << 17) | (bits(c, 6, 2) << 12);
            if imm == 0 {
                return Decoded::illegal();
            }
            Decoded::new(I::Lui, rd, sign_extend(imm, 18), 0)
        }
        (0b01, 4) => {
            let rd = creg(c, 7);
            match bits(c, 11, 10) {
                0 | 1 if !rv64 && bit(c, 12) == 1 => Decoded::illegal(),
                0 => Decoded::new(I::Srli, rd, rd, shamt6(c)),
                1 => Decoded::new(I::Srai, rd, rd, shamt6(c)),
                2 => Decoded::new(I::Andi, rd, rd, imm6(c)),
                _ => {
                    let rs2 = creg(c, 2);
                    let id = match (bit(c, 12), bits(c, 6, 5)) {
                        (0, 0) => I::Sub,
                        (0, 1) => I::Xor,
                        (0, 2) => I::Or,
                        (0, 3) => I::And,
                        (1, 0) if rv64 => I::Subw,
                        (1, 1) if rv64 => I::Addw,
                        _ => return Decoded::illegal(),
                    };
                    Decoded::new(id, rd, rd, rs2)
                }
            }
        }
        (0b01, 5) => Decoded::new(I::Jal, 0, j_offset(c), 0),
        (0b01, 6) => Decoded::new(I::Beq, creg(c, 7), 0, b_offset(c)),
        (0b01, 7) => Decoded::new(I::Bne, creg(c, 7), 0, b_offset(c)),

        (0b10, 0) => {
            if !rv64 && bit(c, 12) == 1 {
                return Decoded::illegal();
            }
            Decoded::new(I::Slli, rd, rd, shamt6(c))
        }
        (0b10, 1) => Decoded::new(I::Fld, rd, 2, ldsp_offset(c)).gated(ext.d),
        (0b10, 2) => {
            if rd == 0 {
                return Decoded::illegal();
            }
            Decoded::new(I::Lw, rd, 2, lwsp_offset(c))
        }
        (0b10, 3) if rv64 => {
            if rd == 0 {
                return Decoded::illegal();
            }
            Decoded::new(I::Ld, rd, 2, ldsp_offset(c))
        }
        (0b10, 3) => Decoded::new(I::Flw, rd, 2, lwsp_offset(c)).gated(ext.f),
        (0b10, 4) => match (bit(c, 12), rd, rs2) {
            (0, 0, 0) => Decoded::illegal(),
            (0, rs1, 0) => Decoded::new(I::Jalr, 0, rs1, 0),
            (0, rd, rs2) => Decoded::new(I::Add, rd, 0, rs2),
            (_, 0, 0) => Decoded::new(I::Ebreak, 0, 0, 0),
            (_, rs1, 0) => Decoded::new(I::Jalr, 1, rs1, 0),
            (_, rd, rs2) => Decoded::new(I::Add, rd, rd, rs2),
        },
        (0b10, 5) => Decoded::new(I::Fsd, rs2, 2, sdsp_offset(c)).gated(ext.d),
        (0b10, 6) => Decoded::new(I::Sw, rs2, 2, swsp_offset(c)),
        (0b10, 7) if rv64 => Decoded::new(I::Sd, rs2, 2, sdsp_offset(c)),
        (0b10, 7) => Decoded::new(I::Fsw, rs2, 2, swsp_offset(c)).gated(ext.f),
        _ => Decoded::illegal(),
    }
}

mod encode {
    //! Minimal 32-bit encoders used to expand compressed instructions.

    pub fn r(opcode: u32, f3: u32, f7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
        (f7 << 25) | (rs2 << 20) | (rs1 << 15) | (f3 << 12) | (rd << 7) | opcode
    }

    pub fn i(opcode: u32, f3: u32, rd: u32, rs1: u32, imm: u32) -> u32 {
        ((imm & 0xfff) << 20) | (rs1 << 15) | (f3 << 12) | (rd << 7) | opcode
    }

    pub fn s(opcode: u32, f3: u32, rs2: u32, rs1: u32, imm: u32) -> u32 {
        (((imm >> 5) & 0x7f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (f3 << 12)
            | ((imm & 0x1f) << 7)
            | opcode
    }

    pub fn b(f3: u32, rs1: u32, rs2: u32, imm: u32) -> u32 {
        (((imm >> 12) & 1) << 31)
            | (((imm >> 5) & 0x3f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (f3 << 12)
            | (((imm >> 1) & 0xf) << 8)
            | (((imm >> 11) & 1) << 7)
            | 0x63
    }

    pub fn u(opcode: u32, rd: u32, value: u32) -> u32 {
        (value & 0xffff_f000) | (rd << 7) | opcode
    }

    pub fn j(rd: u32, imm: u32) -> u32 {
        (((imm >> 20) & 1) << 31)
            | (((imm >> 1) & 0x3ff) << 21)
            | (((imm >> 11) & 1) << 20)
            | (((imm >> 12) & 0xff) << 12)
            | (rd << 7)
            | 0x6f
    }
}

impl Decoder {
    /// Returns the 32-bit encoding equivalent to the compressed instruction `inst`, or `None` if
    /// `inst` is not a legal compressed instruction for this decoder.
    pub fn expand_compressed(&self, inst: u16) -> Option<u32> {
        if inst & 0b11 == 0b11 {
            return None;
        }
        let d = decode(self, inst);
        let [a, b, c, _] = d.ops;
        let expanded = match d.id {
            I::Addi => encode::i(0x13, 0, a, b, c),
            I::Addiw => encode::i(0x1b, 0, a, b, c),
            I::Andi => encode::i(0x13, 7, a, b, c),
            I::Slli => encode::i(0x13, 1, a, b, c),
            I::Srli => encode::i(0x13, 5, a, b, c),
            I::Srai => encode::i(0x13, 5, a, b, c | 0x400),
            I::Lw => encode::i(0x03, 2, a, b, c),
            I::Ld => encode::i(0x03, 3, a, b, c),
            I::Flw => encode::i(0x07, 2, a, b, c),
            I::Fld => encode::i(0x07, 3, a, b, c),
            I::Sw => encode::s(0x23, 2, a, b, c),
            I::Sd => encode::s(0x23, 3, a, b, c),
            I::Fsw => encode::s(0x27, 2, a, b, c),
            I::Fsd => encode::s(0x27, 3, a, b, c),
            I::Lui => encode::u(0x37, a, b),
            I::Jal => encode::j(a, b),
            I::Jalr => encode::i(0x67, 0, a, b, 0),
            I::Beq => encode::b(0, a, b, c),
            I::Bne => encode::b(1, a, b, c),
            I::Add => encode::r(0x33, 0, 0x00, a, b, c),
            I::Sub => encode::r(0x33, 0, 0x20, a, b, c),
            I::Xor => encode::r(0x33, 4, 0x00, a, b, c),
            I::Or => encode::r(0x33, 6, 0x00, a, b, c),
            I::And => encode::r(0x33, 7, 0x00, a, b, c),
            I::Addw => encode::r(0x3b, 0, 0x00, a, b, c),
            I::Subw => encode::r(0x3b, 0, 0x20, a, b, c),
            I::Ebreak => 0x0010_0073,
            _ => return None,
        };
        Some(expanded)
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::InstructionId;
    use crate::decode::{Decoder, Extensions};
    use crate::Xlen;

    #[test]
    fn common_compressed_forms() {
        let decoder = Decoder::new(Xlen::Rv32, Extensions::all());
        // c.addi x1, -1
        let di = decoder.decode(0x10fd);
        assert_eq!(di.id(), InstructionId::Addi);
        assert_eq!((di.op0(), di.op1(), di.imm(2)), (1, 1, -1));
        assert_eq!(di.size(), 2);
        // c.li x10, 5
        let di = decoder.decode(0x4515);
        assert_eq!(di.id(), InstructionId::Addi);
        assert_eq!((di.op0(), di.op1(), di.imm(2)), (10, 0, 5));
        // c.mv x10, x11
        let di = decoder.decode(0x852e);
        assert_eq!(di.id(), InstructionId::Add);
        assert_eq!((di.op0(), di.op1(), di.op2()), (10, 0, 11));
        // c.jr ra
        let di = decoder.decode(0x8082);
        assert_eq!(di.id(), InstructionId::Jalr);
        assert_eq!((di.op0(), di.op1(), di.op2()), (0, 1, 0));
        // c.lwsp x8, 12(sp)
        let di = decoder.decode(0x4432);
        assert_eq!(di.id(), InstructionId::Lw);
        assert_eq!((di.op0(), di.op1(), di.op2()), (8, 2, 12));
        // c.ebreak
        assert_eq!(decoder.decode(0x9002).id(), InstructionId::Ebreak);
    }

    #[test]
    fn reserved_compressed_encodings() {
        let decoder = Decoder::new(Xlen::Rv32, Extensions::all());
        assert_eq!(decoder.decode(0x0000).id(), InstructionId::Illegal);
        // c.lwsp with rd == 0
        assert_eq!(decoder.decode(0x4002).id(), InstructionId::Illegal);
        // c.slli with shamt[5] set on RV32
        assert_eq!(decoder.decode(0x1082).id(), InstructionId::Illegal);
        let rv64 = Decoder::new(Xlen::Rv64, Extensions::all());
        assert_eq!(rv64.decode(0x1082).id(), InstructionId::Slli);
    }

    #[test]
    fn disabled_c_extension() {
        let ext = Extensions {
            c: false,
            ..Extensions::all()
        };
        let decoder = Decoder::new(Xlen::Rv32, ext);
        assert_eq!(decoder.decode(0x4515).id(), InstructionId::Illegal);
        assert_eq!(decoder.expand_compressed(0x4515), None);
    }

    #[test]
    fn expansion_round_trips() {
        for xlen in [Xlen::Rv32, Xlen::Rv64] {
            let decoder = Decoder::new(xlen, Extensions::all());
            for inst in 0..=u16::MAX {
                if inst & 0b11 == 0b11 {
                    continue;
                }
                let compressed = decoder.decode(inst as u32);
                if compressed.id() == InstructionId::Illegal {
                    continue;
                }
                let expanded = decoder
                    .expand_compressed(inst)
                    .unwrap_or_else(|| panic!("{inst:#06x} has no expansion"));
                let full = decoder.decode(expanded);
                assert_eq!(full.id(), compressed.id(), "{inst:#06x}");
                for i in 0..3 {
                    assert_eq!(full.op(i), compressed.op(i), "{inst:#06x} operand {i}");
                }
            }
        }
    }
}
