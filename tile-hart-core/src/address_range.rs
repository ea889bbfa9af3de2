use std::collections::Bound;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Range, RangeBounds, RangeInclusive};
use thiserror::Error;

/// A non-empty range in a 64-bit physical address space bounded inclusively below and above.
///
/// Enforces the invariant that `self.start() <= self.end()`. Used for PMP regions, local memories
/// and memory-mapped register windows.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AddressRange {
    start: u64,
    end: u64,
}

impl Default for AddressRange {
    fn default() -> Self {
        Self::full()
    }
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}

impl AddressRange {
    pub fn new(start: u64, end: u64) -> Result<Self, InvalidBoundsError> {
        (start <= end)
            .then_some(Self { start, end })
            .ok_or(InvalidBoundsError { start, end })
    }

    /// Creates the range `[start, start + size - 1]`, failing for empty or overflowing sizes.
    pub fn with_size(start: u64, size: u64) -> Result<Self, InvalidBoundsError> {
        match size.checked_sub(1).and_then(|delta| start.checked_add(delta)) {
            Some(end) => Ok(Self { start, end }),
            None => Err(InvalidBoundsError {
                start,
                end: start.wrapping_add(size),
            }),
        }
    }

    /// Create a new address range covering all possible addresses.
    pub fn full() -> Self {
        Self {
            start: 0,
            end: u64::MAX,
        }
    }

    pub fn start(self) -> u64 {
        self.start
    }

    pub fn end(self) -> u64 {
        self.end
    }

    /// Check if an address is contained within this address range.
    pub fn contains(self, address: u64) -> bool {
        self.start <= address && address <= self.end
    }

    /// Check if every address of `other` lies within this range.
    pub fn contains_range(self, other: Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Check if at least one address is shared with `other`.
    pub fn overlaps(self, other: Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns `self.end() - self.start()`, which is the size minus 1.
    pub fn delta(self) -> u64 {
        self.end - self.start
    }
}

impl TryFrom<RangeInclusive<u64>> for AddressRange {
    type Error = InvalidBoundsError;

    fn try_from(value: RangeInclusive<u64>) -> Result<Self, Self::Error> {
        Self::new(*value.start(), *value.end())
    }
}

impl TryFrom<Range<u64>> for AddressRange {
    type Error = InvalidBoundsError;

    fn try_from(value: Range<u64>) -> Result<Self, Self::Error> {
        match value.end.checked_sub(1) {
            Some(end) => Self::new(value.start, end),
            None => Err(InvalidBoundsError {
                start: value.start,
                end: value.end,
            }),
        }
    }
}

impl From<AddressRange> for RangeInclusive<u64> {
    fn from(value: AddressRange) -> Self {
        value.start..=value.end
    }
}

impl RangeBounds<u64> for AddressRange {
    fn start_bound(&self) -> Bound<&u64> {
        Bound::Included(&self.start)
    }

    fn end_bound(&self) -> Bound<&u64> {
        Bound::Included(&self.end)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("bounds [{start:#x}, {end:#x}] do not form a valid address range")]
pub struct InvalidBoundsError {
    start: u64,
    end: u64,
}

#[macro_export]
macro_rules! address_range {
    ($start:expr, $end:expr) => {
        $crate::address_range::AddressRange::new($start, $end).unwrap()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_ranges() {
        let range = AddressRange::with_size(0x1000, 0x100).unwrap();
        assert_eq!(range.end(), 0x10ff);
        assert!(AddressRange::with_size(0x1000, 0).is_err());
        assert!(AddressRange::with_size(u64::MAX, 2).is_err());
    }

    #[test]
    fn overlap_and_containment() {
        let a = address_range!(0x100, 0x1ff);
        let b = address_range!(0x1f0, 0x2ff);
        assert!(a.overlaps(b));
        assert!(!a.contains_range(b));
        assert!(a.contains_range(address_range!(0x100, 0x100)));
        assert!(!a.overlaps(address_range!(0x200, 0x300)));
        assert!(AddressRange::try_from(0x10..0x10).is_err());
    }
}
