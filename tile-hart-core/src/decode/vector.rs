//! Vector opcode space (`OP-V`) and the vector forms of `LOAD-FP`/`STORE-FP`.
//!
//! Arithmetic instructions are selected by the 6-bit `funct6` field within each of the seven
//! operand categories encoded in `funct3`. Operands follow the assembly order of each
//! instruction: `vd, vs2, vs1` for most forms, but `vd, vs1, vs2` (or `vd, rs1, vs2`) for the
//! multiply-accumulate family.

use super::fields::{funct3, rd, rs1, rs2};
use super::{Decoded, Decoder};
use crate::catalog::InstructionId as I;
use crate::catalog::InstructionId;

fn simm5(value: u32) -> u32 {
    (((value << 27) as i32) >> 27) as u32
}

/// Operand category of an `OP-V` encoding.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Category {
    Ivv,
    Fvv,
    Mvv,
    Ivi,
    Ivx,
    Fvf,
    Mvx,
}

struct Fields {
    f6: u32,
    vd: u32,
    vs1: u32,
    vs2: u32,
    masked: bool,
}

impl Fields {
    fn new(inst: u32) -> Self {
        Self {
            f6: inst >> 26,
            vd: rd(inst),
            vs1: rs1(inst),
            vs2: rs2(inst),
            masked: (inst >> 25) & 1 == 0,
        }
    }

    /// `vd, vs2, src`
    fn binary(&self, id: InstructionId, src: u32) -> Decoded {
        Decoded::new(id, self.vd, self.vs2, src).with_mask(self.masked)
    }

    /// `vd, src, vs2`
    fn mac(&self, id: InstructionId, src: u32) -> Decoded {
        Decoded::new(id, self.vd, src, self.vs2).with_mask(self.masked)
    }

    /// `vd, vs2`
    fn unary(&self, id: InstructionId) -> Decoded {
        Decoded::new(id, self.vd, self.vs2, 0).with_mask(self.masked)
    }

    /// Instructions that only exist in their unmasked form.
    fn unmasked(&self, decoded: Decoded) -> Decoded {
        decoded.gated(!self.masked)
    }
}

pub(super) fn decode(_decoder: &Decoder, inst: u32) -> Decoded {
    let category = match funct3(inst) {
        0 => Category::Ivv,
        1 => Category::Fvv,
        2 => Category::Mvv,
        3 => Category::Ivi,
        4 => Category::Ivx,
        5 => Category::Fvf,
        6 => Category::Mvx,
        _ => return decode_config(inst),
    };
    let fields = Fields::new(inst);
    match category {
        Category::Ivv | Category::Ivx | Category::Ivi => decode_integer(category, &fields),
        Category::Mvv => decode_mvv(&fields),
        Category::Mvx => decode_mvx(&fields),
        Category::Fvv => decode_fvv(&fields),
        Category::Fvf => decode_fvf(&fields),
    }
}

fn decode_config(inst: u32) -> Decoded {
    let rd = rd(inst);
    let rs1 = rs1(inst);
    if inst >> 31 == 0 {
        Decoded::new(I::Vsetvli, rd, rs1, (inst >> 20) & 0x7ff)
    } else if inst >> 30 == 0b11 {
        Decoded::new(I::Vsetivli, rd, rs1, (inst >> 20) & 0x3ff)
    } else if inst >> 25 == 0b100_0000 {
        Decoded::new(I::Vsetvl, rd, rs1, rs2(inst))
    } else {
        Decoded::illegal()
    }
}

/// `OPIVV`, `OPIVX` and `OPIVI`, which share one `funct6` table.
fn decode_integer(category: Category, f: &Fields) -> Decoded {
    use Category::{Ivi, Ivv, Ivx};

    // Shifts, slides, gathers and register moves take an unsigned immediate.
    let unsigned_imm = matches!(f.f6, 0x0c | 0x0e | 0x0f | 0x25 | 0x27..=0x2f);
    let src = match category {
        Ivi if !unsigned_imm => simm5(f.vs1),
        _ => f.vs1,
    };
    let pick = |vv: Option<InstructionId>, vx: Option<InstructionId>, vi: Option<InstructionId>| {
        match category {
            Ivv => vv,
            Ivx => vx,
            _ => vi,
        }
    };

    let id = match f.f6 {
        0x00 => pick(Some(I::VaddVv), Some(I::VaddVx), Some(I::VaddVi)),
        0x02 => pick(Some(I::VsubVv), Some(I::VsubVx), None),
        0x03 => pick(None, Some(I::VrsubVx), Some(I::VrsubVi)),
        0x04 => pick(Some(I::VminuVv), Some(I::VminuVx), None),
        0x05 => pick(Some(I::VminVv), Some(I::VminVx), None),
        0x06 => pick(Some(I::VmaxuVv), Some(I::VmaxuVx), None),
        0x07 => pick(Some(I::VmaxVv), Some(I::VmaxVx), None),
        0x09 => pick(Some(I::VandVv), Some(I::VandVx), Some(I::VandVi)),
        0x0a => pick(Some(I::VorVv), Some(I::VorVx), Some(I::VorVi)),
        0x0b => pick(Some(I::VxorVv), Some(I::VxorVx), Some(I::VxorVi)),
        0x0c => pick(Some(I::VrgatherVv), Some(I::VrgatherVx), Some(I::VrgatherVi)),
        0x0e => pick(Some(I::Vrgatherei16Vv), Some(I::VslideupVx), Some(I::VslideupVi)),
        0x0f => pick(None, Some(I::VslidedownVx), Some(I::VslidedownVi)),
        0x10 => {
            let id = pick(Some(I::VadcVvm), Some(I::VadcVxm), Some(I::VadcVim));
            return id.map_or_else(Decoded::illegal, |id| f.binary(id, src).gated(f.masked));
        }
        0x11 => pick(Some(I::VmadcVvm), Some(I::VmadcVxm), Some(I::VmadcVim)),
        0x12 => {
            let id = pick(Some(I::VsbcVvm), Some(I::VsbcVxm), None);
            return id.map_or_else(Decoded::illegal, |id| f.binary(id, src).gated(f.masked));
        }
        0x13 => pick(Some(I::VmsbcVvm), Some(I::VmsbcVxm), None),
        0x17 => {
            if f.masked {
                let id = pick(Some(I::VmergeVvm), Some(I::VmergeVxm), Some(I::VmergeVim));
                return id.map_or_else(Decoded::illegal, |id| f.binary(id, src));
            }
            if f.vs2 != 0 {
                return Decoded::illegal();
            }
            let id = match category {
                Ivv => I::VmvVV,
                Ivx => I::VmvVX,
                _ => I::VmvVI,
            };
            return Decoded::new(id, f.vd, src, 0);
        }
        0x18 => pick(Some(I::VmseqVv), Some(I::VmseqVx), Some(I::VmseqVi)),
        0x19 => pick(Some(I::VmsneVv), Some(I::VmsneVx), Some(I::VmsneVi)),
        0x1a => pick(Some(I::VmsltuVv), Some(I::VmsltuVx), None),
        0x1b => pick(Some(I::VmsltVv), Some(I::VmsltVx), None),
        0x1c => pick(Some(I::VmsleuVv), Some(I::VmsleuVx), Some(I::VmsleuVi)),
        0x1d => pick(Some(I::VmsleVv), Some(I::VmsleVx), Some(I::VmsleVi)),
        0x1e => pick(None, Some(I::VmsgtuVx), Some(I::VmsgtuVi)),
        0x1f => pick(None, Some(I::VmsgtVx), Some(I::VmsgtVi)),
        0x20 => pick(Some(I::VsadduVv), Some(I::VsadduVx), Some(I::VsadduVi)),
        0x21 => pick(Some(I::VsaddVv), Some(I::VsaddVx), Some(I::VsaddVi)),
        0x22 => pick(Some(I::VssubuVv), Some(I::VssubuVx), None),
        0x23 => pick(Some(I::VssubVv), Some(I::VssubVx), None),
        0x25 => pick(Some(I::VsllVv), Some(I::VsllVx), Some(I::VsllVi)),
        0x27 if category == Ivi => {
            let id = match f.vs1 {
                0 => I::Vmv1rV,
                1 => I::Vmv2rV,
                3 => I::Vmv4rV,
                7 => I::Vmv8rV,
                _ => return Decoded::illegal(),
            };
            return f.unmasked(Decoded::new(id, f.vd, f.vs2, 0));
        }
        0x27 => pick(Some(I::VsmulVv), Some(I::VsmulVx), None),
        0x28 => pick(Some(I::VsrlVv), Some(I::VsrlVx), Some(I::VsrlVi)),
        0x29 => pick(Some(I::VsraVv), Some(I::VsraVx), Some(I::VsraVi)),
        0x2a => pick(Some(I::VssrlVv), Some(I::VssrlVx), Some(I::VssrlVi)),
        0x2b => pick(Some(I::VssraVv), Some(I::VssraVx), Some(I::VssraVi)),
        0x2c => pick(Some(I::VnsrlWv), Some(I::VnsrlWx), Some(I::VnsrlWi)),
        0x2d => pick(Some(I::VnsraWv), Some(I::VnsraWx), Some(I::VnsraWi)),
        0x2e => pick(Some(I::VnclipuWv), Some(I::VnclipuWx), Some(I::VnclipuWi)),
        0x2f => pick(Some(I::VnclipWv), Some(I::VnclipWx), Some(I::VnclipWi)),
        0x30 => pick(Some(I::VwredsumuVs), None, None),
        0x31 => pick(Some(I::VwredsumVs), None, None),
        _ => None,
    };
    id.map_or_else(Decoded::illegal, |id| f.binary(id, src))
}

fn decode_mvv(f: &Fields) -> Decoded {
    let id = match f.f6 {
        0x00 => I::VredsumVs,
        0x01 => I::VredandVs,
        0x02 => I::VredorVs,
        0x03 => I::VredxorVs,
        0x04 => I::VredminuVs,
        0x05 => I::VredminVs,
        0x06 => I::VredmaxuVs,
        0x07 => I::VredmaxVs,
        0x08 => I::VaadduVv,
        0x09 => I::VaaddVv,
        0x0a => I::VasubuVv,
        0x0b => I::VasubVv,
        0x10 => {
            return match f.vs1 {
                0x00 => f.unmasked(Decoded::new(I::VmvXS, f.vd, f.vs2, 0)),
                0x10 => f.unary(I::VcpopM),
                0x11 => f.unary(I::VfirstM),
                _ => Decoded::illegal(),
            }
        }
        0x12 => {
            let id = match f.vs1 {
                2 => I::VzextVf8,
                3 => I::VsextVf8,
                4 => I::VzextVf4,
                5 => I::VsextVf4,
                6 => I::VzextVf2,
                7 => I::VsextVf2,
                _ => return Decoded::illegal(),
            };
            return f.unary(id);
        }
        0x14 => {
            return match f.vs1 {
                0x01 => f.unary(I::VmsbfM),
                0x02 => f.unary(I::VmsofM),
                0x03 => f.unary(I::VmsifM),
                0x10 => f.unary(I::ViotaM),
                0x11 if f.vs2 == 0 => Decoded::new(I::VidV, f.vd, 0, 0).with_mask(f.masked),
                _ => Decoded::illegal(),
            }
        }
        0x17 => return f.unmasked(f.binary(I::VcompressVm, f.vs1)),
        0x18..=0x1f => {
            let id = match f.f6 {
                0x18 => I::VmandnMm,
                0x19 => I::VmandMm,
                0x1a => I::VmorMm,
                0x1b => I::VmxorMm,
                0x1c => I::VmornMm,
                0x1d => I::VmnandMm,
                0x1e => I::VmnorMm,
                _ => I::VmxnorMm,
            };
            return f.unmasked(f.binary(id, f.vs1));
        }
        0x20 => I::VdivuVv,
        0x21 => I::VdivVv,
        0x22 => I::VremuVv,
        0x23 => I::VremVv,
        0x24 => I::VmulhuVv,
        0x25 => I::VmulVv,
        0x26 => I::VmulhsuVv,
        0x27 => I::VmulhVv,
        0x29 => return f.mac(I::VmaddVv, f.vs1),
        0x2b => return f.mac(I::VnmsubVv, f.vs1),
        0x2d => return f.mac(I::VmaccVv, f.vs1),
        0x2f => return f.mac(I::VnmsacVv, f.vs1),
        0x30 => I::VwadduVv,
        0x31 => I::VwaddVv,
        0x32 => I::VwsubuVv,
        0x33 => I::VwsubVv,
        0x34 => I::VwadduWv,
        0x35 => I::VwaddWv,
        0x36 => I::VwsubuWv,
        0x37 => I::VwsubWv,
        0x38 => I::VwmuluVv,
        0x3a => I::VwmulsuVv,
        0x3b => I::VwmulVv,
        0x3c => return f.mac(I::VwmaccuVv, f.vs1),
        0x3d => return f.mac(I::VwmaccVv, f.vs1),
        0x3f => return f.mac(I::VwmaccsuVv, f.vs1),
        _ => return Decoded::illegal(),
    };
    f.binary(id, f.vs1)
}

fn decode_mvx(f: &Fields) -> Decoded {
    let rs1 = f.vs1;
    let id = match f.f6 {
        0x08 => I::VaadduVx,
        0x09 => I::VaaddVx,
        0x0a => I::VasubuVx,
        0x0b => I::VasubVx,
        0x0e => I::Vslide1upVx,
        0x0f => I::Vslide1downVx,
        0x10 if f.vs2 == 0 => return f.unmasked(Decoded::new(I::VmvSX, f.vd, rs1, 0)),
        0x20 => I::VdivuVx,
        0x21 => I::VdivVx,
        0x22 => I::VremuVx,
        0x23 => I::VremVx,
        0x24 => I::VmulhuVx,
        0x25 => I::VmulVx,
        0x26 => I::VmulhsuVx,
        0x27 => I::VmulhVx,
        0x29 => return f.mac(I::VmaddVx, rs1),
        0x2b => return f.mac(I::VnmsubVx, rs1),
        0x2d => return f.mac(I::VmaccVx, rs1),
        0x2f => return f.mac(I::VnmsacVx, rs1),
        0x30 => I::VwadduVx,
        0x31 => I::VwaddVx,
        0x32 => I::VwsubuVx,
        0x33 => I::VwsubVx,
        0x34 => I::VwadduWx,
        0x35 => I::VwaddWx,
        0x36 => I::VwsubuWx,
        0x37 => I::VwsubWx,
        0x38 => I::VwmuluVx,
        0x3a => I::VwmulsuVx,
        0x3b => I::VwmulVx,
        0x3c => return f.mac(I::VwmaccuVx, rs1),
        0x3d => return f.mac(I::VwmaccVx, rs1),
        0x3e => return f.mac(I::VwmaccusVx, rs1),
        0x3f => return f.mac(I::VwmaccsuVx, rs1),
        _ => return Decoded::illegal(),
    };
    f.binary(id, rs1)
}

fn decode_fvv(f: &Fields) -> Decoded {
    let id = match f.f6 {
        0x00 => I::VfaddVv,
        0x01 => I::VfredusumVs,
        0x02 => I::VfsubVv,
        0x03 => I::VfredosumVs,
        0x04 => I::VfminVv,
        0x05 => I::VfredminVs,
        0x06 => I::VfmaxVv,
        0x07 => I::VfredmaxVs,
        0x08 => I::VfsgnjVv,
        0x09 => I::VfsgnjnVv,
        0x0a => I::VfsgnjxVv,
        0x10 if f.vs1 == 0 => return f.unmasked(Decoded::new(I::VfmvFS, f.vd, f.vs2, 0)),
        0x12 => {
            let id = match f.vs1 {
                0x00 => I::VfcvtXuFV,
                0x01 => I::VfcvtXFV,
                0x02 => I::VfcvtFXuV,
                0x03 => I::VfcvtFXV,
                0x06 => I::VfcvtRtzXuFV,
                0x07 => I::VfcvtRtzXFV,
                0x08 => I::VfwcvtXuFV,
                0x09 => I::VfwcvtXFV,
                0x0a => I::VfwcvtFXuV,
                0x0b => I::VfwcvtFXV,
                0x0c => I::VfwcvtFFV,
                0x0e => I::VfwcvtRtzXuFV,
                0x0f => I::VfwcvtRtzXFV,
                0x10 => I::VfncvtXuFW,
                0x11 => I::VfncvtXFW,
                0x12 => I::VfncvtFXuW,
                0x13 => I::VfncvtFXW,
                0x14 => I::VfncvtFFW,
                0x15 => I::VfncvtRodFFW,
                0x16 => I::VfncvtRtzXuFW,
                0x17 => I::VfncvtRtzXFW,
                _ => return Decoded::illegal(),
            };
            return f.unary(id);
        }
        0x13 => {
            return match f.vs1 {
                0x00 => f.unary(I::VfsqrtV),
                0x10 => f.unary(I::VfclassV),
                _ => Decoded::illegal(),
            }
        }
        0x18 => I::VmfeqVv,
        0x19 => I::VmfleVv,
        0x1b => I::VmfltVv,
        0x1c => I::VmfneVv,
        0x20 => I::VfdivVv,
        0x24 => I::VfmulVv,
        0x28 => return f.mac(I::VfmaddVv, f.vs1),
        0x29 => return f.mac(I::VfnmaddVv, f.vs1),
        0x2a => return f.mac(I::VfmsubVv, f.vs1),
        0x2b => return f.mac(I::VfnmsubVv, f.vs1),
        0x2c => return f.mac(I::VfmaccVv, f.vs1),
        0x2d => return f.mac(I::VfnmaccVv, f.vs1),
        0x2e => return f.mac(I::VfmsacVv, f.vs1),
        0x2f => return f.mac(I::VfnmsacVv, f.vs1),
        0x30 => I::VfwaddVv,
        0x31 => I::VfwredusumVs,
        0x32 => I::VfwsubVv,
        0x33 => I::VfwredosumVs,
        0x34 => I::VfwaddWv,
        0x36 => I::VfwsubWv,
        0x38 => I::VfwmulVv,
        0x3c => return f.mac(I::VfwmaccVv, f.vs1),
        0x3d => return f.mac(I::VfwnmaccVv, f.vs1),
        0x3e => return f.mac(I::VfwmsacVv, f.vs1),
        0x3f => return f.mac(I::VfwnmsacVv, f.vs1),
        _ => return Decoded::illegal(),
    };
    f.binary(id, f.vs1)
}

fn decode_fvf(f: &Fields) -> Decoded {
    let rs1 = f.vs1;
    let id = match f.f6 {
        0x00 => I::VfaddVf,
        0x02 => I::VfsubVf,
        0x04 => I::VfminVf,
        0x06 => I::VfmaxVf,
        0x08 => I::VfsgnjVf,
        0x09 => I::VfsgnjnVf,
        0x0a => I::VfsgnjxVf,
        0x0e => I::Vfslide1upVf,
        0x0f => I::Vfslide1downVf,
        0x10 if f.vs2 == 0 => return f.unmasked(Decoded::new(I::VfmvSF, f.vd, rs1, 0)),
        0x17 if f.masked => I::VfmergeVfm,
        0x17 if f.vs2 == 0 => return Decoded::new(I::VfmvVF, f.vd, rs1, 0),
        0x18 => I::VmfeqVf,
        0x19 => I::VmfleVf,
        0x1b => I::VmfltVf,
        0x1c => I::VmfneVf,
        0x1d => I::VmfgtVf,
        0x1f => I::VmfgeVf,
        0x20 => I::VfdivVf,
        0x21 => I::VfrdivVf,
        0x24 => I::VfmulVf,
        0x27 => I::VfrsubVf,
        0x28 => return f.mac(I::VfmaddVf, rs1),
        0x29 => return f.mac(I::VfnmaddVf, rs1),
        0x2a => return f.mac(I::VfmsubVf, rs1),
        0x2b => return f.mac(I::VfnmsubVf, rs1),
        0x2c => return f.mac(I::VfmaccVf, rs1),
        0x2d => return f.mac(I::VfnmaccVf, rs1),
        0x2e => return f.mac(I::VfmsacVf, rs1),
        0x2f => return f.mac(I::VfnmsacVf, rs1),
        0x30 => I::VfwaddVf,
        0x32 => I::VfwsubVf,
        0x34 => I::VfwaddWf,
        0x36 => I::VfwsubWf,
        0x38 => I::VfwmulVf,
        0x3c => return f.mac(I::VfwmaccVf, rs1),
        0x3d => return f.mac(I::VfwnmaccVf, rs1),
        0x3e => return f.mac(I::VfwmsacVf, rs1),
        0x3f => return f.mac(I::VfwnmsacVf, rs1),
        _ => return Decoded::illegal(),
    };
    f.binary(id, rs1)
}

/// Element width index (0 = 8 bits .. 3 = 64 bits) encoded in the `width` field.
fn element_width(inst: u32) -> Option<usize> {
    match funct3(inst) {
        0 => Some(0),
        5 => Some(1),
        6 => Some(2),
        7 => Some(3),
        _ => None,
    }
}

fn whole_register_count(nf: u32) -> bool {
    matches!(nf, 1 | 2 | 4 | 8)
}

pub(super) fn decode_load(inst: u32) -> Decoded {
    let Some(width) = element_width(inst) else {
        return Decoded::illegal();
    };
    if (inst >> 28) & 1 == 1 {
        return Decoded::illegal();
    }
    let f = Fields::new(inst);
    let nf = (inst >> 29) + 1;
    let pick = |ids: [InstructionId; 4]| ids[width];
    let decoded = match (inst >> 26) & 0b11 {
        0 => match f.vs2 {
            0x00 => Decoded::new(pick([I::Vle8V, I::Vle16V, I::Vle32V, I::Vle64V]), f.vd, f.vs1, 0),
            0x08 if whole_register_count(nf) && !f.masked => {
                let id = pick([I::Vlre8V, I::Vlre16V, I::Vlre32V, I::Vlre64V]);
                return Decoded::new(id, f.vd, f.vs1, 0).with_field_count(nf as u8);
            }
            0x0b if width == 0 && nf == 1 && !f.masked => {
                return Decoded::new(I::VlmV, f.vd, f.vs1, 0);
            }
            0x10 => {
                let id = pick([I::Vle8ffV, I::Vle16ffV, I::Vle32ffV, I::Vle64ffV]);
                Decoded::new(id, f.vd, f.vs1, 0)
            }
            _ => return Decoded::illegal(),
        },
        1 => {
            let id = pick([I::Vluxei8V, I::Vluxei16V, I::Vluxei32V, I::Vluxei64V]);
            Decoded::new(id, f.vd, f.vs1, f.vs2)
        }
        2 => {
            let id = pick([I::Vlse8V, I::Vlse16V, I::Vlse32V, I::Vlse64V]);
            Decoded::new(id, f.vd, f.vs1, f.vs2)
        }
        _ => {
            let id = pick([I::Vloxei8V, I::Vloxei16V, I::Vloxei32V, I::Vloxei64V]);
            Decoded::new(id, f.vd, f.vs1, f.vs2)
        }
    };
    decoded.with_mask(f.masked).with_field_count(nf as u8)
}

pub(super) fn decode_store(inst: u32) -> Decoded {
    let Some(width) = element_width(inst) else {
        return Decoded::illegal();
    };
    if (inst >> 28) & 1 == 1 {
        return Decoded::illegal();
    }
    let f = Fields::new(inst);
    let nf = (inst >> 29) + 1;
    let pick = |ids: [InstructionId; 4]| ids[width];
    let decoded = match (inst >> 26) & 0b11 {
        0 => match f.vs2 {
            0x00 => Decoded::new(pick([I::Vse8V, I::Vse16V, I::Vse32V, I::Vse64V]), f.vd, f.vs1, 0),
            0x08 if width == 0 && whole_register_count(nf) && !f.masked => {
                return Decoded::new(I::VsrV, f.vd, f.vs1, 0).with_field_count(nf as u8);
            }
            0x0b if width == 0 && nf == 1 && !f.masked => {
                return Decoded::new(I::VsmV, f.vd, f.vs1, 0);
            }
            _ => return Decoded::illegal(),
        },
        1 => {
            let id = pick([I::Vsuxei8V, I::Vsuxei16V, I::Vsuxei32V, I::Vsuxei64V]);
            Decoded::new(id, f.vd, f.vs1, f.vs2)
        }
        2 => {
            let id = pick([I::Vsse8V, I::Vsse16V, I::Vsse32V, I::Vsse64V]);
            Decoded::new(id, f.vd, f.vs1, f.vs2)
        }
        _ => {
            let id = pick([I::Vsoxei8V, I::Vsoxei16V, I::Vsoxei32V, I::Vsoxei64V]);
            Decoded::new(id, f.vd, f.vs1, f.vs2)
        }
    };
    decoded.with_mask(f.masked).with_field_count(nf as u8)
}

#[cfg(test)]
mod tests {
    use crate::catalog::InstructionId;
    use crate::decode::{Decoder, Extensions};
    use crate::Xlen;

    fn decoder() -> Decoder {
        Decoder::new(Xlen::Rv32, Extensions::all())
    }

    #[test]
    fn arithmetic_operand_order() {
        // vadd.vv v1, v2, v3 (unmasked)
        let di = decoder().decode(0x0221_80d7);
        assert_eq!(di.id(), InstructionId::VaddVv);
        assert_eq!((di.op0(), di.op1(), di.op2()), (1, 2, 3));
        assert!(!di.masked());
        // vadd.vi v1, v2, -1, v0.t
        let di = decoder().decode(0x002f_b0d7);
        assert_eq!(di.id(), InstructionId::VaddVi);
        assert_eq!(di.imm(2), -1);
        assert!(di.masked());
    }

    #[test]
    fn multiply_accumulate_lists_vs1_first() {
        // vmacc.vv v1, v3, v2
        let di = decoder().decode(0xb621_a0d7);
        assert_eq!(di.id(), InstructionId::VmaccVv);
        assert_eq!((di.op0(), di.op1(), di.op2()), (1, 3, 2));
    }

    #[test]
    fn configuration() {
        // vsetvli x1, x2, e32,m1
        let di = decoder().decode(0x0101_70d7);
        assert_eq!(di.id(), InstructionId::Vsetvli);
        assert_eq!((di.op0(), di.op1(), di.op2()), (1, 2, 0x10));
        // vsetivli x1, 4, e8,m1
        let di = decoder().decode(0xc002_70d7);
        assert_eq!(di.id(), InstructionId::Vsetivli);
        assert_eq!(di.op1(), 4);
    }

    #[test]
    fn memory_forms() {
        // vle32.v v1, (x2)
        let di = decoder().decode(0x0201_6087);
        assert_eq!(di.id(), InstructionId::Vle32V);
        assert_eq!((di.op0(), di.op1(), di.field_count()), (1, 2, 1));
        // vlseg2e32.v v1, (x2)
        let di = decoder().decode(0x2201_6087);
        assert_eq!(di.id(), InstructionId::Vle32V);
        assert_eq!(di.field_count(), 2);
        // vl2re8.v v2, (x2)
        let di = decoder().decode(0x2281_0107);
        assert_eq!(di.id(), InstructionId::Vlre8V);
        assert_eq!(di.field_count(), 2);
        // vse8.v v1, (x2)
        let di = decoder().decode(0x0201_00a7);
        assert_eq!(di.id(), InstructionId::Vse8V);
        // mew set is reserved
        assert_eq!(decoder().decode(0x1201_6087).id(), InstructionId::Illegal);
    }

    #[test]
    fn vector_disabled() {
        let ext = Extensions {
            v: false,
            ..Extensions::all()
        };
        let decoder = Decoder::new(Xlen::Rv32, ext);
        assert_eq!(decoder.decode(0x0221_80d7).id(), InstructionId::Illegal);
        assert_eq!(decoder.decode(0x0201_6087).id(), InstructionId::Illegal);
    }
}
