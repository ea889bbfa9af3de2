//! Physical memory protection.
//!
//! > PMP entries are described by an 8-bit configuration register and one MXLEN-bit address
//! > register. Some PMP settings additionally use the address register associated with the
//! > preceding PMP entry. Up to 64 PMP entries are supported.
//!
//! This implementation supports up to 16 entries. The configuration registers are stored as raw
//! bytes; the derived [`PmpRegion`] list is recomputed from scratch on every write.

use crate::{AddressRange, PrivilegeLevel, Xlen};
use bitvec::{field::BitField, order::Lsb0, view::BitView};
use log::debug;

/// Maximum number of PMP entries.
pub const MAX_ENTRIES: usize = 16;

mod idx {
    pub const R: usize = 0;
    pub const W: usize = 1;
    pub const X: usize = 2;
    pub const A: usize = 3;
    pub const L: usize = 7;
}

/// Address-matching mode of a PMP entry (the A field).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PmpType {
    Off,
    /// Top of range.
    Tor,
    /// Naturally aligned four-byte region.
    Na4,
    /// Naturally aligned power-of-two region, 8 bytes or larger.
    Napot,
}

impl PmpType {
    fn from_u2(value: u8) -> Self {
        match value {
            0 => Self::Off,
            1 => Self::Tor,
            2 => Self::Na4,
            3 => Self::Napot,
            _ => panic!("out of range u2 used"),
        }
    }
}

/// Kind of access checked against PMP.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PmpAccess {
    Read,
    Write,
    Execute,
}

/// A decoded, active PMP entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PmpRegion {
    pub index: usize,
    pub kind: PmpType,
    pub range: AddressRange,
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub locked: bool,
}

impl PmpRegion {
    fn allows(&self, access: PmpAccess) -> bool {
        match access {
            PmpAccess::Read => self.read,
            PmpAccess::Write => self.write,
            PmpAccess::Execute => self.execute,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pmp {
    xlen: Xlen,
    entries: usize,
    cfg: [u8; MAX_ENTRIES],
    addr: [u64; MAX_ENTRIES],
    /// Active regions in priority order (lowest index first).
    regions: Vec<PmpRegion>,
}

impl Pmp {
    /// Creates a PMP unit with `entries` implemented entries, all off.
    ///
    /// Panics if `entries` exceeds [`MAX_ENTRIES`].
    pub fn new(xlen: Xlen, entries: usize) -> Self {
        if entries > MAX_ENTRIES {
            panic!("at most {MAX_ENTRIES} PMP entries are supported, got {entries}");
        }
        Self {
            xlen,
            entries,
            cfg: [0; MAX_ENTRIES],
            addr: [0; MAX_ENTRIES],
            regions: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.cfg = [0; MAX_ENTRIES];
        self.addr = [0; MAX_ENTRIES];
        self.regions.clear();
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn regions(&self) -> &[PmpRegion] {
        &self.regions
    }

    /// Number of entries covered by one `pmpcfg` register.
    fn entries_per_cfg(&self) -> usize {
        self.xlen.bytes() as usize
    }

    /// Returns `true` if `pmpcfg<n>` exists. On RV64 only the even-numbered registers do.
    pub fn has_cfg_register(&self, n: usize) -> bool {
        n < 4 && (!self.xlen.is_rv64() || n % 2 == 0)
    }

    fn cfg_locked(&self, index: usize) -> bool {
        self.cfg[index].view_bits::<Lsb0>()[idx::L]
    }

    fn cfg_type(&self, index: usize) -> PmpType {
        PmpType::from_u2(self.cfg[index].view_bits::<Lsb0>()[idx::A..idx::A + 2].load_le())
    }

    /// Reads register `pmpcfg<n>`.
    pub fn read_pmpcfg(&self, n: usize) -> u64 {
        let first = n * 4;
        (0..self.entries_per_cfg())
            .map(|i| first + i)
            .filter(|&index| index < self.entries)
            .fold(0, |value, index| {
                value | (self.cfg[index] as u64) << ((index - first) * 8)
            })
    }

    /// Writes register `pmpcfg<n>`. Bytes of locked entries are left unchanged.
    ///
    /// > The R, W, and X fields form a collective WARL field for which the combinations with R=0
    /// > and W=1 are reserved.
    pub fn write_pmpcfg(&mut self, n: usize, value: u64, mask: u64) {
        let first = n * 4;
        let old = self.read_pmpcfg(n);
        let new = old & !mask | value & mask;
        for i in 0..self.entries_per_cfg() {
            let index = first + i;
            if index >= self.entries || self.cfg_locked(index) {
                continue;
            }
            let mut byte = (new >> (i * 8)) as u8;
            // Bits 5 and 6 are reserved and read as zero.
            byte &= 0b1001_1111;
            let bits = byte.view_bits_mut::<Lsb0>();
            if !bits[idx::R] && bits[idx::W] {
                bits.set(idx::W, false);
                bits.set(idx::X, false);
            }
            self.cfg[index] = byte;
        }
        self.update();
    }

    pub fn read_pmpaddr(&self, index: usize) -> u64 {
        if index >= self.entries {
            return 0;
        }
        self.addr[index]
    }

    /// Writes register `pmpaddr<index>`.
    ///
    /// > If PMP entry i is locked, writes to pmpicfg and pmpaddri are ignored. Additionally, if
    /// > PMP entry i is locked and pmpicfg.A is set to TOR, writes to pmpaddri-1 are ignored.
    pub fn write_pmpaddr(&mut self, index: usize, value: u64, mask: u64) {
        if index >= self.entries || self.cfg_locked(index) {
            return;
        }
        if index + 1 < self.entries
            && self.cfg_locked(index + 1)
            && self.cfg_type(index + 1) == PmpType::Tor
        {
            return;
        }
        let old = self.addr[index];
        let writable = match self.xlen {
            Xlen::Rv32 => 0xffff_ffff,
            Xlen::Rv64 => (1 << 54) - 1,
        };
        self.addr[index] = (old & !mask | value & mask) & writable;
        self.update();
    }

    /// Recomputes the region list from the configuration and address registers.
    fn update(&mut self) {
        self.regions.clear();
        for index in 0..self.entries {
            let cfg = self.cfg[index];
            let bits = cfg.view_bits::<Lsb0>();
            let kind = self.cfg_type(index);
            let range = match kind {
                PmpType::Off => continue,
                PmpType::Tor => {
                    let low = if index == 0 {
                        0
                    } else {
                        self.addr[index - 1] << 2
                    };
                    let high = self.addr[index] << 2;
                    if high == 0 || low >= high {
                        continue;
                    }
                    AddressRange::new(low, high - 1)
                }
                PmpType::Na4 => AddressRange::with_size(self.addr[index] << 2, 4),
                PmpType::Napot => {
                    let value = self.addr[index];
                    let ones = value.trailing_ones();
                    // pmpaddr holds at most 54 bits, so `ones` never reaches 64.
                    let base = (value >> ones << ones) << 2;
                    match 1u64.checked_shl(ones + 3) {
                        Some(size) => AddressRange::with_size(base, size),
                        None => Ok(AddressRange::full()),
                    }
                }
            };
            let Ok(range) = range else {
                continue;
            };
            self.regions.push(PmpRegion {
                index,
                kind,
                range,
                read: bits[idx::R],
                write: bits[idx::W],
                execute: bits[idx::X],
                locked: bits[idx::L],
            });
        }
        debug!("PMP updated, {} active regions", self.regions.len());
    }

    /// Returns `true` if an access of `size` bytes at physical `address` is permitted at
    /// `privilege`.
    ///
    /// > PMP entries are statically prioritized. The lowest-numbered PMP entry that matches any
    /// > byte of an access determines whether that access succeeds or fails. The matching PMP
    /// > entry must match all bytes of an access, or the access fails.
    ///
    /// > If no PMP entry matches an M-mode access, the access succeeds. If no PMP entry matches an
    /// > S-mode or U-mode access, but at least one PMP entry is implemented, the access fails.
    pub fn check(
        &self,
        address: u64,
        size: u64,
        access: PmpAccess,
        privilege: PrivilegeLevel,
    ) -> bool {
        let last = address.wrapping_add(size.max(1) - 1);
        let Ok(span) = AddressRange::new(address, last) else {
            return false;
        };
        match self.regions.iter().find(|region| region.range.overlaps(span)) {
            Some(region) => {
                if !region.range.contains_range(span) {
                    return false;
                }
                if privilege == PrivilegeLevel::Machine && !region.locked {
                    return true;
                }
                region.allows(access)
            }
            None => privilege == PrivilegeLevel::Machine || self.regions.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: u64 = 1;
    const W: u64 = 2;
    const X: u64 = 4;
    const TOR: u64 = 1 << 3;
    const NA4: u64 = 2 << 3;
    const NAPOT: u64 = 3 << 3;
    const L: u64 = 0x80;

    #[test]
    fn empty_pmp_allows_everything() {
        let pmp = Pmp::new(Xlen::Rv32, 16);
        assert!(pmp.check(0x1000, 4, PmpAccess::Write, PrivilegeLevel::User));
    }

    #[test]
    fn napot_and_na4_ranges() {
        let mut pmp = Pmp::new(Xlen::Rv32, 16);
        // 4 KiB at 0x8000_0000: base >> 2 | (size/8 - 1)
        pmp.write_pmpaddr(0, (0x8000_0000 >> 2) | 0x1ff, u64::MAX);
        pmp.write_pmpaddr(1, 0x100 >> 2, u64::MAX);
        pmp.write_pmpcfg(0, (NAPOT | R) | (NA4 | R | W) << 8, u64::MAX);
        assert_eq!(pmp.regions()[0].range, AddressRange::with_size(0x8000_0000, 0x1000).unwrap());
        assert_eq!(pmp.regions()[1].range, AddressRange::with_size(0x100, 4).unwrap());

        assert!(pmp.check(0x8000_0ffc, 4, PmpAccess::Read, PrivilegeLevel::User));
        assert!(!pmp.check(0x8000_0ffc, 4, PmpAccess::Write, PrivilegeLevel::User));
        // Straddles the end of the region.
        assert!(!pmp.check(0x8000_0ffe, 4, PmpAccess::Read, PrivilegeLevel::User));
        assert!(pmp.check(0x100, 4, PmpAccess::Write, PrivilegeLevel::Supervisor));
        // No match in S/U with active entries.
        assert!(!pmp.check(0x200, 4, PmpAccess::Read, PrivilegeLevel::User));
        // Unlocked entries don't constrain M-mode.
        assert!(pmp.check(0x8000_0000, 4, PmpAccess::Write, PrivilegeLevel::Machine));
    }

    #[test]
    fn tor_range_and_empty_tor() {
        let mut pmp = Pmp::new(Xlen::Rv32, 16);
        pmp.write_pmpaddr(0, 0x1000 >> 2, u64::MAX);
        pmp.write_pmpaddr(1, 0x2000 >> 2, u64::MAX);
        pmp.write_pmpcfg(0, (TOR | X) << 8, u64::MAX);
        assert_eq!(pmp.regions().len(), 1);
        assert_eq!(pmp.regions()[0].range, AddressRange::new(0x1000, 0x1fff).unwrap());
        assert!(pmp.check(0x1ffc, 4, PmpAccess::Execute, PrivilegeLevel::User));

        // TOR with a zero top is an empty range.
        let mut pmp = Pmp::new(Xlen::Rv32, 16);
        pmp.write_pmpcfg(0, TOR | R, u64::MAX);
        assert!(pmp.regions().is_empty());
    }

    #[test]
    fn lower_index_has_priority() {
        let mut pmp = Pmp::new(Xlen::Rv32, 16);
        pmp.write_pmpaddr(0, 0x1000 >> 2, u64::MAX);
        pmp.write_pmpaddr(1, (0x1000 >> 2) | 0x1ff, u64::MAX);
        pmp.write_pmpcfg(0, (NA4 | R) | (NAPOT | R | W | X) << 8, u64::MAX);
        assert!(!pmp.check(0x1000, 4, PmpAccess::Write, PrivilegeLevel::User));
        assert!(pmp.check(0x1004, 4, PmpAccess::Write, PrivilegeLevel::User));
    }

    #[test]
    fn reserved_permission_combination_is_cleared() {
        let mut pmp = Pmp::new(Xlen::Rv32, 16);
        pmp.write_pmpcfg(0, NA4 | W, u64::MAX);
        assert_eq!(pmp.read_pmpcfg(0), NA4);
    }

    #[test]
    fn locked_entries_ignore_writes_and_bind_machine_mode() {
        let mut pmp = Pmp::new(Xlen::Rv32, 16);
        pmp.write_pmpaddr(0, 0x1000 >> 2, u64::MAX);
        pmp.write_pmpaddr(1, 0x2000 >> 2, u64::MAX);
        pmp.write_pmpcfg(0, (TOR | R | L) << 8, u64::MAX);
        assert!(!pmp.check(0x1000, 4, PmpAccess::Write, PrivilegeLevel::Machine));

        pmp.write_pmpcfg(0, (TOR | R | W) << 8, u64::MAX);
        assert_eq!(pmp.read_pmpcfg(0) >> 8, TOR | R | L);
        pmp.write_pmpaddr(1, 0, u64::MAX);
        assert_eq!(pmp.read_pmpaddr(1), 0x2000 >> 2);
        // The address below a locked TOR entry is locked too.
        pmp.write_pmpaddr(0, 0, u64::MAX);
        assert_eq!(pmp.read_pmpaddr(0), 0x1000 >> 2);
    }

    #[test]
    fn rv64_cfg_registers() {
        let mut pmp = Pmp::new(Xlen::Rv64, 16);
        assert!(pmp.has_cfg_register(2));
        assert!(!pmp.has_cfg_register(1));
        pmp.write_pmpcfg(2, (NA4 | R) << 56, u64::MAX);
        assert_eq!(pmp.regions()[0].index, 15);
    }

    #[test]
    fn unimplemented_entries_read_zero() {
        let mut pmp = Pmp::new(Xlen::Rv32, 2);
        pmp.write_pmpcfg(0, u64::MAX, u64::MAX);
        assert_eq!(pmp.read_pmpcfg(0) >> 16, 0);
        pmp.write_pmpaddr(5, 0x123, u64::MAX);
        assert_eq!(pmp.read_pmpaddr(5), 0);
    }
}
