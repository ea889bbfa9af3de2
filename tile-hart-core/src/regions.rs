//! Physical memory attributes: coarse region classification and the misaligned-access decision
//! table.
//!
//! The address space is split into 16 equal regions selected by the top four address bits. Each
//! region may be marked idempotent and/or cacheable, and may contain local (tightly coupled)
//! memory or memory-mapped registers. Attribute override ranges take precedence over the
//! per-region flags.

use crate::cause::{ExceptionCause, SecondaryCause};
use crate::{AddressRange, Xlen};

/// Number of coarse regions.
pub const REGION_COUNT: usize = 16;

/// Attribute override for an explicit address range.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PmaOverride {
    pub range: AddressRange,
    pub idempotent: bool,
    pub cacheable: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RegionConfig {
    pub idempotent: [bool; REGION_COUNT],
    pub cacheable: [bool; REGION_COUNT],
    /// Local instruction/data memories (ICCM/DCCM style). Local memory is never external.
    pub local_memory: Vec<AddressRange>,
    /// Memory-mapped register ranges.
    pub memory_mapped: Vec<AddressRange>,
    /// Checked in order; the first matching entry wins.
    pub pma_overrides: Vec<PmaOverride>,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            idempotent: [true; REGION_COUNT],
            cacheable: [false; REGION_COUNT],
            local_memory: Vec::new(),
            memory_mapped: Vec::new(),
            pma_overrides: Vec::new(),
        }
    }
}

/// Kind of data access being classified.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DataAccess {
    Load,
    Store,
}

impl DataAccess {
    pub fn misaligned_cause(self) -> ExceptionCause {
        match self {
            DataAccess::Load => ExceptionCause::LoadAddressMisaligned,
            DataAccess::Store => ExceptionCause::StoreOrAmoAddressMisaligned,
        }
    }

    pub fn access_fault_cause(self) -> ExceptionCause {
        match self {
            DataAccess::Load => ExceptionCause::LoadAccessFault,
            DataAccess::Store => ExceptionCause::StoreOrAmoAccessFault,
        }
    }

    pub fn page_fault_cause(self) -> ExceptionCause {
        match self {
            DataAccess::Load => ExceptionCause::LoadPageFault,
            DataAccess::Store => ExceptionCause::StoreOrAmoPageFault,
        }
    }
}

/// Region classification for one hart.
#[derive(Debug, Clone)]
pub struct Regions {
    config: RegionConfig,
    xlen: Xlen,
}

impl Regions {
    pub fn new(xlen: Xlen, config: RegionConfig) -> Self {
        Self { config, xlen }
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// Index of the region holding `address`.
    pub fn region_of(&self, address: u64) -> usize {
        (self.xlen.address(address) >> (self.xlen.bits() - 4)) as usize
    }

    fn override_for(&self, address: u64) -> Option<&PmaOverride> {
        self.config
            .pma_overrides
            .iter()
            .find(|entry| entry.range.contains(address))
    }

    /// Returns `true` if `address` lies in a local memory.
    pub fn is_local(&self, address: u64) -> bool {
        self.config
            .local_memory
            .iter()
            .any(|range| range.contains(address))
    }

    fn region_has_local_memory(&self, region: usize) -> bool {
        self.config
            .local_memory
            .iter()
            .any(|range| self.region_of(range.start()) == region)
    }

    pub fn is_memory_mapped(&self, address: u64) -> bool {
        self.config
            .memory_mapped
            .iter()
            .any(|range| range.contains(address))
    }

    /// Returns `true` if repeated accesses to `address` have no side effects.
    pub fn is_idempotent(&self, address: u64) -> bool {
        if let Some(entry) = self.override_for(address) {
            return entry.idempotent;
        }
        let region = self.region_of(address);
        self.config.idempotent[region] || self.region_has_local_memory(region)
    }

    pub fn is_cacheable(&self, address: u64) -> bool {
        if let Some(entry) = self.override_for(address) {
            return entry.cacheable;
        }
        let region = self.region_of(address);
        self.config.cacheable[region] || self.region_has_local_memory(region)
    }

    /// Returns `true` if `address` is backed by external (bus) memory, i.e. neither local
    /// memory nor a memory-mapped register.
    pub fn is_external(&self, address: u64) -> bool {
        !self.is_local(address) && !self.is_memory_mapped(address)
    }

    /// Classifies a misaligned data access of `size` bytes at `address`.
    ///
    /// Returns `None` when the access may proceed, or the exception cause and secondary cause
    /// it raises. The checks are applied in a fixed order; the first one that applies decides:
    ///
    /// 1. a wide (64-bit custom) access is an access fault;
    /// 2. with misaligned data disabled, an address-misaligned exception;
    /// 3. a memory-mapped register (for loads: one that is not external) is an access fault;
    /// 4. a first and last byte in different regions is an access fault;
    /// 5. touching a non-idempotent region at either end is an access fault.
    pub fn misaligned_fault(
        &self,
        access: DataAccess,
        address: u64,
        size: u64,
        wide: bool,
        misaligned_ok: bool,
    ) -> Option<(ExceptionCause, SecondaryCause)> {
        let fault = |secondary| Some((access.access_fault_cause(), secondary));
        if wide {
            return fault(SecondaryCause::Acc64Bit);
        }
        if !misaligned_ok {
            return Some((access.misaligned_cause(), SecondaryCause::None));
        }
        let last = address.wrapping_add(size - 1);
        let mem_mapped = match access {
            DataAccess::Load => self.is_memory_mapped(address) && !self.is_external(address),
            DataAccess::Store => self.is_memory_mapped(address),
        };
        if mem_mapped {
            return fault(SecondaryCause::MemMapped);
        }
        if self.region_of(address) != self.region_of(last) {
            return fault(SecondaryCause::MisalRegionCross);
        }
        if !self.is_idempotent(address) || !self.is_idempotent(last) {
            return fault(SecondaryCause::MisalIo);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_range;

    fn regions() -> Regions {
        let mut config = RegionConfig::default();
        config.idempotent[0xf] = false;
        config.local_memory.push(address_range![0xf000_0000, 0xf000_ffff]);
        config.memory_mapped.push(address_range![0xe000_0000, 0xe000_0fff]);
        config.idempotent[0xe] = false;
        config.pma_overrides.push(PmaOverride {
            range: address_range![0x3000_0000, 0x3000_0fff],
            idempotent: false,
            cacheable: true,
        });
        Regions::new(Xlen::Rv32, config)
    }

    #[test]
    fn classification() {
        let regions = regions();
        assert_eq!(regions.region_of(0xf000_0004), 0xf);
        assert_eq!(regions.region_of(0xffff_ffff_8000_0000), 0x8);
        // Local memory makes its whole region idempotent.
        assert!(regions.is_idempotent(0xf800_0000));
        assert!(!regions.is_external(0xf000_0010));
        assert!(regions.is_external(0xf001_0000));
        assert!(!regions.is_external(0xe000_0010));
        assert!(!regions.is_idempotent(0x3000_0010));
        assert!(regions.is_cacheable(0x3000_0010));
        assert!(regions.is_idempotent(0x3000_1000));
        assert!(!regions.is_cacheable(0x3000_1000));
    }

    #[test]
    fn misaligned_decision_table() {
        let regions = regions();
        use DataAccess::{Load, Store};
        use ExceptionCause::*;
        assert_eq!(
            regions.misaligned_fault(Load, 0x1001, 4, true, true),
            Some((LoadAccessFault, SecondaryCause::Acc64Bit))
        );
        assert_eq!(
            regions.misaligned_fault(Store, 0x1001, 4, false, false),
            Some((StoreOrAmoAddressMisaligned, SecondaryCause::None))
        );
        assert_eq!(
            regions.misaligned_fault(Load, 0xe000_0001, 4, false, true),
            Some((LoadAccessFault, SecondaryCause::MemMapped))
        );
        assert_eq!(
            regions.misaligned_fault(Store, 0xe000_0001, 4, false, true),
            Some((StoreOrAmoAccessFault, SecondaryCause::MemMapped))
        );
        // Idempotent region 0 into idempotent region 1 still crosses a region boundary.
        assert_eq!(
            regions.misaligned_fault(Load, 0x0fff_fffe, 4, false, true),
            Some((LoadAccessFault, SecondaryCause::MisalRegionCross))
        );
        assert_eq!(
            regions.misaligned_fault(Load, 0x3000_0001, 4, false, true),
            Some((LoadAccessFault, SecondaryCause::MisalIo))
        );
        assert_eq!(
            regions.misaligned_fault(Store, 0x3000_0ffe, 4, false, true),
            Some((StoreOrAmoAccessFault, SecondaryCause::MisalIo))
        );
        assert_eq!(regions.misaligned_fault(Load, 0x1001, 4, false, true), None);
    }
}
