//! Direct-mapped cache of decoded instructions keyed by virtual program counter.

use crate::decode::{DecodedInstruction, Decoder};
use log::trace;

/// Default number of slots.
pub const DEFAULT_SIZE: usize = 64 * 1024;

/// A fixed-size, direct-mapped decode cache.
///
/// A slot is indexed by `(pc >> 1) & mask`. A lookup hits only if the slot holds an instruction
/// decoded from the same virtual address *and* the same raw encoding, so a stale slot can never be
/// returned for modified code even if an invalidation was missed. A miss overwrites the slot.
#[derive(Debug, Clone)]
pub struct DecodeCache {
    slots: Vec<Option<DecodedInstruction>>,
    mask: u64,
}

impl Default for DecodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE)
    }
}

impl DecodeCache {
    /// Creates an empty cache with `size` slots.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a power of two.
    pub fn new(size: usize) -> Self {
        if !size.is_power_of_two() {
            panic!("decode cache size {size} is not a power of two");
        }
        Self {
            slots: vec![None; size],
            mask: size as u64 - 1,
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, pc: u64) -> usize {
        ((pc >> 1) & self.mask) as usize
    }

    /// Returns the cached instruction at `pc`, if any.
    pub fn lookup(&self, pc: u64) -> Option<&DecodedInstruction> {
        self.slots[self.index(pc)]
            .as_ref()
            .filter(|di| di.address() == pc)
    }

    /// Returns the instruction at `pc` decoded from `raw`, decoding and filling the slot on a miss.
    pub fn get_or_decode(
        &mut self,
        decoder: &Decoder,
        pc: u64,
        physical_pc: u64,
        raw: u32,
    ) -> DecodedInstruction {
        let index = self.index(pc);
        if let Some(di) = &self.slots[index] {
            if di.address() == pc && di.physical_address() == physical_pc && di.raw() == raw {
                return *di;
            }
        }
        trace!("Decode cache miss at {pc:#x} ({raw:#010x})");
        let di = decoder.decode_at(pc, physical_pc, raw);
        self.slots[index] = Some(di);
        di
    }

    /// Invalidates every slot holding an instruction that may overlap the `size` bytes at
    /// `address`. The window is widened by 3 bytes below so that a 4-byte instruction straddling
    /// the start is caught as well.
    pub fn invalidate(&mut self, address: u64, size: u64) {
        if size == 0 {
            return;
        }
        if size.saturating_add(3) / 2 >= self.slots.len() as u64 {
            self.clear();
            return;
        }
        let start = address.saturating_sub(3) & !1;
        let end = address.saturating_add(size - 1);
        let mut pc = start;
        while pc <= end {
            let index = self.index(pc);
            if self.slots[index].is_some_and(|di| di.address() == pc) {
                self.slots[index] = None;
            }
            pc += 2;
        }
    }

    /// Invalidates every slot, e.g. after an address-space change.
    pub fn clear(&mut self) {
        self.slots.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InstructionId;
    use crate::decode::Extensions;
    use crate::Xlen;

    fn decoder() -> Decoder {
        Decoder::new(Xlen::Rv32, Extensions::all())
    }

    #[test]
    fn hit_matches_fresh_decode() {
        let decoder = decoder();
        let mut cache = DecodeCache::new(16);
        let first = cache.get_or_decode(&decoder, 0x100, 0x100, 0x0010_0093);
        assert_eq!(cache.lookup(0x100), Some(&first));
        let again = cache.get_or_decode(&decoder, 0x100, 0x100, 0x0010_0093);
        assert_eq!(again, first);
        assert_eq!(again, {
            let mut fresh = decoder.decode(0x0010_0093);
            fresh.relocate(0x100, 0x100);
            fresh
        });
    }

    #[test]
    fn changed_encoding_is_redecoded() {
        let decoder = decoder();
        let mut cache = DecodeCache::new(16);
        cache.get_or_decode(&decoder, 0x100, 0x100, 0x0010_0093);
        let di = cache.get_or_decode(&decoder, 0x100, 0x100, 0x0000_0073);
        assert_eq!(di.id(), InstructionId::Ecall);
    }

    #[test]
    fn conflicting_pc_overwrites_slot() {
        let decoder = decoder();
        let mut cache = DecodeCache::new(16);
        cache.get_or_decode(&decoder, 0x100, 0x100, 0x0000_0013);
        // 0x120 maps to the same slot as 0x100 in a 16-slot cache.
        cache.get_or_decode(&decoder, 0x120, 0x120, 0x0000_0013);
        assert!(cache.lookup(0x100).is_none());
        assert!(cache.lookup(0x120).is_some());
    }

    #[test]
    fn invalidation_covers_overlapping_instructions() {
        let decoder = decoder();
        let mut cache = DecodeCache::new(64);
        for pc in [0x0fc, 0x100, 0x104, 0x108] {
            cache.get_or_decode(&decoder, pc, pc, 0x0000_0013);
        }
        // A 1-byte store at 0x102 overlaps the instruction at 0x100.
        cache.invalidate(0x102, 1);
        assert!(cache.lookup(0x0fc).is_some());
        assert!(cache.lookup(0x100).is_none());
        assert!(cache.lookup(0x104).is_some());
        assert!(cache.lookup(0x108).is_some());

        cache.invalidate(0x104, 4);
        assert!(cache.lookup(0x104).is_none());
        assert!(cache.lookup(0x108).is_some());

        cache.invalidate(0, 1 << 20);
        assert!(cache.lookup(0x108).is_none());
    }
}
