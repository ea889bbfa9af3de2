//! Vector loads and stores: unit-stride, strided and indexed accesses with their segment forms,
//! fault-only-first loads, whole-register and mask accesses.
//!
//! Elements are accessed one at a time through the scalar data path, so every element gets the
//! full misalignment, translation and PMP treatment. An access that faults records the element
//! index in `vstart`.

use log::trace;

use super::vector::{Shape, V0};
use super::{illegal, ExecutionResult};
use crate::catalog::InstructionId;
use crate::cause::Exception;
use crate::decode::DecodedInstruction;
use crate::hart::Hart;
use crate::memory::Bus;
use crate::registers::Specifier;

/// How element addresses are formed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Addressing {
    /// Consecutive segments of `fields` elements.
    UnitStride,
    Strided(u64),
    /// Byte offsets taken from a vector of indices `index_bytes` wide.
    Indexed { indices: Specifier, index_bytes: usize },
}

/// Addressing form of an element access, as encoded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Element {
    UnitStride,
    FaultOnlyFirst,
    Strided,
    Indexed,
}

/// A vector memory access, resolved against the active configuration.
#[derive(Debug, Copy, Clone)]
struct Plan {
    addressing: Addressing,
    /// First register of the data group.
    data: Specifier,
    /// Data element width in bytes.
    width: usize,
    /// Registers per field, at least one.
    group: usize,
    fields: usize,
    /// Index one past the last body element.
    end: usize,
    masked: bool,
    fault_only_first: bool,
}

impl<B: Bus> Hart<B> {
    pub(super) fn execute_vector_memory(&mut self, di: &DecodedInstruction) -> ExecutionResult {
        use InstructionId as I;

        let descriptor = di.descriptor();
        let load = descriptor.is_load();
        let size = descriptor.data_size() as usize;
        let base = self.registers.x(di.reg(1));
        let s = self.shape();
        let plan = match di.id() {
            I::Vlre8V | I::Vlre16V | I::Vlre32V | I::Vlre64V | I::VsrV => {
                let count = di.field_count() as usize;
                self.check_group(di, di.reg(0), count.trailing_zeros() as i32)?;
                Plan {
                    addressing: Addressing::UnitStride,
                    data: di.reg(0),
                    width: size,
                    group: count,
                    fields: 1,
                    end: count * self.vregs.vlenb() / size,
                    masked: false,
                    fault_only_first: false,
                }
            }
            I::VlmV | I::VsmV => Plan {
                addressing: Addressing::UnitStride,
                data: di.reg(0),
                width: 1,
                group: 1,
                fields: 1,
                end: s.vl.div_ceil(8),
                masked: false,
                fault_only_first: false,
            },
            I::Vle8V
            | I::Vle16V
            | I::Vle32V
            | I::Vle64V
            | I::Vse8V
            | I::Vse16V
            | I::Vse32V
            | I::Vse64V => self.plan_element_access(di, s, size, Element::UnitStride)?,
            I::Vle8ffV | I::Vle16ffV | I::Vle32ffV | I::Vle64ffV => {
                self.plan_element_access(di, s, size, Element::FaultOnlyFirst)?
            }
            I::Vlse8V
            | I::Vlse16V
            | I::Vlse32V
            | I::Vlse64V
            | I::Vsse8V
            | I::Vsse16V
            | I::Vsse32V
            | I::Vsse64V => self.plan_element_access(di, s, size, Element::Strided)?,
            I::Vluxei8V
            | I::Vluxei16V
            | I::Vluxei32V
            | I::Vluxei64V
            | I::Vloxei8V
            | I::Vloxei16V
            | I::Vloxei32V
            | I::Vloxei64V
            | I::Vsuxei8V
            | I::Vsuxei16V
            | I::Vsuxei32V
            | I::Vsuxei64V
            | I::Vsoxei8V
            | I::Vsoxei16V
            | I::Vsoxei32V
            | I::Vsoxei64V => self.plan_element_access(di, s, size, Element::Indexed)?,
            id => unreachable!("{id} is not a vector memory instruction"),
        };
        if load {
            self.vector_load(di, s, base, plan)
        } else {
            self.vector_store(s, base, plan)
        }
    }

    /// Checks the register groups of an element access and plans it.
    ///
    /// > The effective vector register group multiplier (EMUL) is EMUL = (EEW/SEW)*LMUL.
    fn plan_element_access(
        &self,
        di: &DecodedInstruction,
        s: Shape,
        size: usize,
        element: Element,
    ) -> Result<Plan, Exception> {
        let indexed = element == Element::Indexed;
        let emul_log2 = |bytes: usize| {
            s.lmul_log2 + (bytes * 8).trailing_zeros() as i32 - s.sew.trailing_zeros() as i32
        };
        // Indexed accesses use the encoded width for the indices and SEW for the data.
        let (width, data_emul) = if indexed {
            let index_emul = emul_log2(size);
            self.check_group(di, di.reg(2), index_emul)?;
            (s.width(), s.lmul_log2)
        } else {
            (size, emul_log2(size))
        };
        if (width * 8) as u32 > self.config.elen {
            return Err(illegal(di));
        }
        self.check_group(di, di.reg(0), data_emul)?;
        let group = 1usize << data_emul.max(0);
        let fields = di.field_count() as usize;
        let data = di.reg(0);
        if group * fields > 8 || usize::from(data) + group * fields > 32 {
            return Err(illegal(di));
        }
        if di.descriptor().is_load() {
            self.check_mask_overlap(di, data)?;
        }
        let addressing = match element {
            Element::Indexed => Addressing::Indexed {
                indices: di.reg(2),
                index_bytes: size,
            },
            Element::Strided => Addressing::Strided(self.registers.x(di.reg(2))),
            Element::UnitStride | Element::FaultOnlyFirst => Addressing::UnitStride,
        };
        Ok(Plan {
            addressing,
            data,
            width,
            group,
            fields,
            end: s.vl,
            masked: di.masked(),
            fault_only_first: element == Element::FaultOnlyFirst,
        })
    }

    /// Virtual address of field `field` of element `index`.
    fn element_address(&self, base: u64, plan: &Plan, index: usize, field: usize) -> u64 {
        let width = plan.width as u64;
        let offset = match plan.addressing {
            Addressing::UnitStride => (index * plan.fields) as u64 * width,
            Addressing::Strided(stride) => (index as u64).wrapping_mul(stride),
            Addressing::Indexed {
                indices,
                index_bytes,
            } => self.vregs.element(indices, index, index_bytes),
        };
        let address = base
            .wrapping_add(offset)
            .wrapping_add(field as u64 * width);
        self.xlen.address(address)
    }

    /// Register group holding field `field`.
    fn field_register(plan: &Plan, field: usize) -> Specifier {
        Specifier::from_u5((usize::from(plan.data) + field * plan.group) as u8)
    }

    fn vector_load(
        &mut self,
        di: &DecodedInstruction,
        s: Shape,
        base: u64,
        plan: Plan,
    ) -> ExecutionResult {
        for i in s.vstart..plan.end {
            if plan.masked && !self.vregs.mask_bit(V0, i) {
                continue;
            }
            for field in 0..plan.fields {
                let address = self.element_address(base, &plan, i, field);
                match self.load(address, plan.width as u64, false) {
                    Ok(value) => {
                        let register = Self::field_register(&plan, field);
                        self.vregs.set_element(register, i, plan.width, value);
                    }
                    // > Fault-only-first: if an element other than element 0 raises an
                    // > exception, that element and all following elements are not processed
                    // > and vl is reduced to the element index.
                    Err(_) if plan.fault_only_first && i > 0 => {
                        trace!("{} trims vl to {i}", di.id());
                        self.vector.vl = i as u64;
                        return Ok(());
                    }
                    Err(exception) => {
                        self.vector.vstart = i as u64;
                        return Err(exception);
                    }
                }
            }
        }
        Ok(())
    }

    fn vector_store(&mut self, s: Shape, base: u64, plan: Plan) -> ExecutionResult {
        for i in s.vstart..plan.end {
            if plan.masked && !self.vregs.mask_bit(V0, i) {
                continue;
            }
            for field in 0..plan.fields {
                let address = self.element_address(base, &plan, i, field);
                let register = Self::field_register(&plan, field);
                let value = self.vregs.element(register, i, plan.width);
                if let Err(exception) = self.store(address, plan.width as u64, value, false) {
                    self.vector.vstart = i as u64;
                    return Err(exception);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{hart, retire, retire_n, x};
    use super::super::vector::test_util::{vsetvli, vtype};
    use crate::cause::ExceptionCause;
    use crate::csr;
    use crate::hart::{Hart, StepOutcome};
    use crate::memory::{Bus, Memory};
    use crate::registers::Specifier;

    const LOAD_FP: u32 = 0x07;
    const STORE_FP: u32 = 0x27;

    /// A vector `LOAD-FP`/`STORE-FP` encoding. `field` is `lumop`/`sumop`, `rs2` or `vs2`.
    fn vmem(
        opcode: u32,
        nf: u32,
        mop: u32,
        masked: bool,
        field: u32,
        rs1: u32,
        eew: u32,
        vd: u32,
    ) -> u32 {
        let width = match eew {
            8 => 0,
            16 => 5,
            32 => 6,
            _ => 7,
        };
        (nf - 1) << 29
            | mop << 26
            | (!masked as u32) << 25
            | field << 20
            | rs1 << 15
            | width << 12
            | vd << 7
            | opcode
    }

    fn v(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    fn elements(hart: &Hart<Memory>, register: u8, width: usize, count: usize) -> Vec<u64> {
        (0..count)
            .map(|i| hart.vector_registers().element(v(register), i, width))
            .collect()
    }

    fn write_words(hart: &mut Hart<Memory>, address: u64, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            hart.bus_mut().write_u32(address + 4 * i as u64, *word).unwrap();
        }
    }

    #[test]
    fn unit_stride_load_and_store() {
        // vle32.v v1, (x2); vse32.v v1, (x3)
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            vmem(LOAD_FP, 1, 0, false, 0, 2, 32, 1),
            vmem(STORE_FP, 1, 0, false, 0, 3, 32, 1),
        ]);
        hart.registers_mut().set_x(x(1), 3);
        hart.registers_mut().set_x(x(2), 0x100);
        hart.registers_mut().set_x(x(3), 0x200);
        write_words(&mut hart, 0x100, &[1, 2, 3, 4]);
        retire_n(&mut hart, 3);
        assert_eq!(elements(&hart, 1, 4, 4), [1, 2, 3, 0]);
        assert_eq!(hart.bus().read_u32(0x208), Ok(3));
        assert_eq!(hart.bus().read_u32(0x20c), Ok(0));
    }

    #[test]
    fn strided_and_indexed_loads() {
        // vlse32.v v1, (x2), x4; vluxei8.v v2, (x2), v3
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            vmem(LOAD_FP, 1, 2, false, 4, 2, 32, 1),
            vmem(LOAD_FP, 1, 1, false, 3, 2, 8, 2),
        ]);
        hart.registers_mut().set_x(x(1), 2);
        hart.registers_mut().set_x(x(2), 0x100);
        hart.registers_mut().set_x(x(4), 8);
        write_words(&mut hart, 0x100, &[10, 11, 12, 13]);
        hart.vector_registers_mut().set_element(v(3), 0, 1, 12);
        hart.vector_registers_mut().set_element(v(3), 1, 1, 4);
        retire_n(&mut hart, 3);
        assert_eq!(elements(&hart, 1, 4, 2), [10, 12]);
        assert_eq!(elements(&hart, 2, 4, 2), [13, 11]);
    }

    #[test]
    fn segment_load_deinterleaves_fields() {
        // vlseg2e16.v v4, (x2)
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(16, 0)),
            vmem(LOAD_FP, 2, 0, false, 0, 2, 16, 4),
        ]);
        hart.registers_mut().set_x(x(1), 2);
        hart.registers_mut().set_x(x(2), 0x100);
        write_words(&mut hart, 0x100, &[0x0002_0001, 0x0004_0003]);
        retire_n(&mut hart, 2);
        assert_eq!(elements(&hart, 4, 2, 2), [1, 3]);
        assert_eq!(elements(&hart, 5, 2, 2), [2, 4]);
    }

    #[test]
    fn faulting_element_sets_vstart() {
        // vle32.v v1, (x2) running off the end of memory
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            vmem(LOAD_FP, 1, 0, false, 0, 2, 32, 1),
        ]);
        hart.registers_mut().set_x(x(1), 4);
        hart.registers_mut().set_x(x(2), 0xfff8);
        retire(&mut hart);
        let outcome = hart.step().unwrap();
        let StepOutcome::Exception(exception) = outcome else {
            panic!("expected an exception, got {outcome:?}");
        };
        assert_eq!(exception.cause, ExceptionCause::LoadAccessFault);
        assert_eq!(exception.tval, 0x1_0000);
        assert_eq!(hart.read_csr(csr::VSTART), Ok(2));
    }

    #[test]
    fn fault_only_first_trims_vl() {
        // vle32ff.v v1, (x2)
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(32, 0)),
            vmem(LOAD_FP, 1, 0, false, 0x10, 2, 32, 1),
        ]);
        hart.registers_mut().set_x(x(1), 4);
        hart.registers_mut().set_x(x(2), 0xfff8);
        write_words(&mut hart, 0xfff8, &[5, 6]);
        retire_n(&mut hart, 2);
        assert_eq!(hart.read_csr(csr::VL), Ok(2));
        assert_eq!(elements(&hart, 1, 4, 2), [5, 6]);
    }

    #[test]
    fn whole_register_and_mask_accesses() {
        // vl2re8.v v2, (x2); vs1r.v v3, (x3); vlm.v v6, (x2)
        let mut hart = hart(&[
            vsetvli(0, 1, vtype(8, 0)),
            vmem(LOAD_FP, 2, 0, false, 0x08, 2, 8, 2),
            vmem(STORE_FP, 1, 0, false, 0x08, 3, 8, 3),
            vmem(LOAD_FP, 1, 0, false, 0x0b, 2, 8, 6),
        ]);
        hart.registers_mut().set_x(x(1), 9);
        hart.registers_mut().set_x(x(2), 0x100);
        hart.registers_mut().set_x(x(3), 0x300);
        let words: Vec<u32> = (0..8).map(|i| 0x0101_0101 * (i + 1)).collect();
        write_words(&mut hart, 0x100, &words);
        retire_n(&mut hart, 4);
        // VLEN = 128: v2 holds the first 16 bytes, v3 the next 16
        assert_eq!(elements(&hart, 3, 4, 1), [0x0505_0505]);
        assert_eq!(hart.bus().read_u32(0x30c), Ok(0x0808_0808));
        // vl = 9 loads two mask bytes
        assert_eq!(elements(&hart, 6, 1, 3), [0x01, 0x01, 0]);
    }
}
