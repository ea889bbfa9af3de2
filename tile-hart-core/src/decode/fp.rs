//! Floating-point opcode space (`OP-FP` and the fused multiply-add opcodes).
//!
//! The two low bits of `funct7` select the format: `0` single, `1` double, `2` half.

use super::fields::{funct3, funct7, rd, rs1, rs2, rs3};
use super::{Decoded, Decoder};
use crate::catalog::InstructionId as I;
use crate::catalog::InstructionId;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Format {
    Single,
    Double,
    Half,
}

impl Format {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Single),
            1 => Some(Self::Double),
            2 => Some(Self::Half),
            _ => None,
        }
    }

    fn enabled(self, decoder: &Decoder) -> bool {
        match self {
            Format::Single => decoder.ext.f,
            Format::Double => decoder.ext.d,
            Format::Half => decoder.ext.zfh,
        }
    }

    fn pick(self, s: InstructionId, d: InstructionId, h: InstructionId) -> InstructionId {
        match self {
            Format::Single => s,
            Format::Double => d,
            Format::Half => h,
        }
    }
}

fn valid_rounding_mode(inst: u32) -> bool {
    !matches!(funct3(inst), 5 | 6)
}

/// `fmadd`, `fmsub`, `fnmsub` and `fnmadd`.
pub(super) fn decode_fused(decoder: &Decoder, inst: u32) -> Decoded {
    let Some(format) = Format::from_bits((inst >> 25) & 0b11) else {
        return Decoded::illegal();
    };
    if !format.enabled(decoder) || !valid_rounding_mode(inst) {
        return Decoded::illegal();
    }
    let id = match (inst >> 2) & 0b11 {
        0 => format.pick(I::FmaddS, I::FmaddD, I::FmaddH),
        1 => format.pick(I::FmsubS, I::FmsubD, I::FmsubH),
        2 => format.pick(I::FnmsubS, I::FnmsubD, I::FnmsubH),
        _ => format.pick(I::FnmaddS, I::FnmaddD, I::FnmaddH),
    };
    Decoded::new(id, rd(inst), rs1(inst), rs2(inst)).with_op3(rs3(inst))
}

pub(super) fn decode(decoder: &Decoder, inst: u32) -> Decoded {
    let f7 = funct7(inst);
    let f3 = funct3(inst);
    let rd = rd(inst);
    let rs1 = rs1(inst);
    let rs2 = rs2(inst);
    let rv64 = decoder.rv64();

    let Some(format) = Format::from_bits(f7 & 0b11) else {
        return Decoded::illegal();
    };
    if !format.enabled(decoder) {
        return Decoded::illegal();
    }

    let rounded = |s, d, h| {
        if valid_rounding_mode(inst) {
            Decoded::new(format.pick(s, d, h), rd, rs1, rs2)
        } else {
            Decoded::illegal()
        }
    };

    match f7 >> 2 {
        0x00 => rounded(I::FaddS, I::FaddD, I::FaddH),
        0x01 => rounded(I::FsubS, I::FsubD, I::FsubH),
        0x02 => rounded(I::FmulS, I::FmulD, I::FmulH),
        0x03 => rounded(I::FdivS, I::FdivD, I::FdivH),
        0x0b if rs2 == 0 => rounded(I::FsqrtS, I::FsqrtD, I::FsqrtH),
        0x04 => {
            let id = match f3 {
                0 => format.pick(I::FsgnjS, I::FsgnjD, I::FsgnjH),
                1 => format.pick(I::FsgnjnS, I::FsgnjnD, I::FsgnjnH),
                2 => format.pick(I::FsgnjxS, I::FsgnjxD, I::FsgnjxH),
                _ => return Decoded::illegal(),
            };
            Decoded::new(id, rd, rs1, rs2)
        }
        0x05 => {
            let id = match f3 {
                0 => format.pick(I::FminS, I::FminD, I::FminH),
                1 => format.pick(I::FmaxS, I::FmaxD, I::FmaxH),
                _ => return Decoded::illegal(),
            };
            Decoded::new(id, rd, rs1, rs2)
        }
        0x08 => {
            // Conversion between formats: `fmt` is the destination, `rs2` the source format.
            let Some(source) = Format::from_bits(rs2) else {
                return Decoded::illegal();
            };
            if !source.enabled(decoder) || !valid_rounding_mode(inst) {
                return Decoded::illegal();
            }
            let id = match (format, source) {
                (Format::Single, Format::Double) => I::FcvtSD,
                (Format::Double, Format::Single) => I::FcvtDS,
                (Format::Single, Format::Half) => I::FcvtSH,
                (Format::Half, Format::Single) => I::FcvtHS,
                (Format::Double, Format::Half) => I::FcvtDH,
                (Format::Half, Format::Double) => I::FcvtHD,
                _ => return Decoded::illegal(),
            };
            Decoded::new(id, rd, rs1, 0)
        }
        0x14 => {
            let id = match f3 {
                2 => format.pick(I::FeqS, I::FeqD, I::FeqH),
                1 => format.pick(I::FltS, I::FltD, I::FltH),
                0 => format.pick(I::FleS, I::FleD, I::FleH),
                _ => return Decoded::illegal(),
            };
            Decoded::new(id, rd, rs1, rs2)
        }
        0x18 => {
            let id = match rs2 {
                0 => format.pick(I::FcvtWS, I::FcvtWD, I::FcvtWH),
                1 => format.pick(I::FcvtWuS, I::FcvtWuD, I::FcvtWuH),
                2 if rv64 => format.pick(I::FcvtLS, I::FcvtLD, I::FcvtLH),
                3 if rv64 => format.pick(I::FcvtLuS, I::FcvtLuD, I::FcvtLuH),
                _ => return Decoded::illegal(),
            };
            if !valid_rounding_mode(inst) {
                return Decoded::illegal();
            }
            Decoded::new(id, rd, rs1, 0)
        }
        0x1a => {
            let id = match rs2 {
                0 => format.pick(I::FcvtSW, I::FcvtDW, I::FcvtHW),
                1 => format.pick(I::FcvtSWu, I::FcvtDWu, I::FcvtHWu),
                2 if rv64 => format.pick(I::FcvtSL, I::FcvtDL, I::FcvtHL),
                3 if rv64 => format.pick(I::FcvtSLu, I::FcvtDLu, I::FcvtHLu),
                _ => return Decoded::illegal(),
            };
            if !valid_rounding_mode(inst) {
                return Decoded::illegal();
            }
            Decoded::new(id, rd, rs1, 0)
        }
        0x1c if rs2 == 0 => match f3 {
            0 if format != Format::Double || rv64 => {
                Decoded::new(format.pick(I::FmvXW, I::FmvXD, I::FmvXH), rd, rs1, 0)
            }
            1 => Decoded::new(format.pick(I::FclassS, I::FclassD, I::FclassH), rd, rs1, 0),
            _ => Decoded::illegal(),
        },
        0x1e if rs2 == 0 && f3 == 0 && (format != Format::Double || rv64) => {
            Decoded::new(format.pick(I::FmvWX, I::FmvDX, I::FmvHX), rd, rs1, 0)
        }
        _ => Decoded::illegal(),
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::InstructionId;
    use crate::decode::{Decoder, Extensions};
    use crate::Xlen;

    #[test]
    fn formats_and_gating() {
        let all = Decoder::new(Xlen::Rv64, Extensions::all());
        // fadd.d f1, f2, f3, dyn
        assert_eq!(all.decode(0x0231_70d3).id(), InstructionId::FaddD);
        // fadd.h f1, f2, f3, dyn
        assert_eq!(all.decode(0x0431_70d3).id(), InstructionId::FaddH);
        let no_zfh = Decoder::new(
            Xlen::Rv64,
            Extensions {
                zfh: false,
                ..Extensions::all()
            },
        );
        assert_eq!(no_zfh.decode(0x0431_70d3).id(), InstructionId::Illegal);
        // reserved rounding mode 5
        assert_eq!(all.decode(0x0031_50d3).id(), InstructionId::Illegal);
    }

    #[test]
    fn conversions_and_moves() {
        let rv32 = Decoder::new(Xlen::Rv32, Extensions::all());
        let rv64 = Decoder::new(Xlen::Rv64, Extensions::all());
        // fcvt.s.d f1, f2
        let di = rv32.decode(0x4011_70d3);
        assert_eq!(di.id(), InstructionId::FcvtSD);
        assert_eq!((di.op0(), di.op1()), (1, 2));
        // fcvt.l.s x1, f2 only exists on RV64
        assert_eq!(rv32.decode(0xc021_70d3).id(), InstructionId::Illegal);
        assert_eq!(rv64.decode(0xc021_70d3).id(), InstructionId::FcvtLS);
        // fmv.x.d only exists on RV64
        assert_eq!(rv32.decode(0xe201_00d3).id(), InstructionId::Illegal);
        assert_eq!(rv64.decode(0xe201_00d3).id(), InstructionId::FmvXD);
        // fmadd.s f1, f2, f3, f4
        let di = rv32.decode(0x2031_70c3);
        assert_eq!(di.id(), InstructionId::FmaddS);
        assert_eq!(di.op3(), 4);
    }
}
