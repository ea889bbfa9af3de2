use bitvec::{array::BitArray, field::BitField, order::Lsb0};

use crate::cause::InterruptCause;
use crate::PrivilegeLevel;

const fn bit(cause: InterruptCause) -> u32 {
    // `code` is not const, so repeat the small table here.
    match cause {
        InterruptCause::UserSoftware => 1 << 0,
        InterruptCause::SupervisorSoftware => 1 << 1,
        InterruptCause::MachineSoftware => 1 << 3,
        InterruptCause::UserTimer => 1 << 4,
        InterruptCause::SupervisorTimer => 1 << 5,
        InterruptCause::MachineTimer => 1 << 7,
        InterruptCause::UserExternal => 1 << 8,
        InterruptCause::SupervisorExternal => 1 << 9,
        InterruptCause::MachineExternal => 1 << 11,
        InterruptCause::MachineInternalTimer1 => 1 << 28,
        InterruptCause::MachineInternalTimer0 => 1 << 29,
        InterruptCause::MachineLocal => 1 << 30,
    }
}

#[allow(clippy::identity_op)]
const VALID_INTERRUPTS_MASK: u32 = 0
    | bit(InterruptCause::SupervisorSoftware)
    | bit(InterruptCause::MachineSoftware)
    | bit(InterruptCause::SupervisorTimer)
    | bit(InterruptCause::MachineTimer)
    | bit(InterruptCause::SupervisorExternal)
    | bit(InterruptCause::MachineExternal)
    | bit(InterruptCause::MachineInternalTimer1)
    | bit(InterruptCause::MachineInternalTimer0)
    | bit(InterruptCause::MachineLocal);

const DELEGATABLE_INTERRUPTS_MASK: u32 = bit(InterruptCause::SupervisorSoftware)
    | bit(InterruptCause::SupervisorTimer)
    | bit(InterruptCause::SupervisorExternal);

const_assert_eq!(DELEGATABLE_INTERRUPTS_MASK & !VALID_INTERRUPTS_MASK, 0);

/// The mip, mie and mideleg registers, and their supervisor views sip and sie.
///
/// > An interrupt i will trap to M-mode (causing the privilege mode to change to M-mode) if all of
/// > the following are true: (a) either the current privilege mode is M and the MIE bit in the
/// > mstatus register is set, or the current privilege mode has less privilege than M-mode; (b)
/// > bit i is set in both mip and mie; and (c) if register mideleg exists, bit i is not set in
/// > mideleg.
#[derive(Debug, Clone)]
pub struct Interrupts {
    /// Bit `i` set means interrupt `i` is handled in S-mode when raised below M-mode.
    delegate: BitArray<[u32; 1], Lsb0>,
    mip: BitArray<[u32; 1], Lsb0>,
    mie: BitArray<[u32; 1], Lsb0>,
    supervisor: bool,
}

impl Interrupts {
    pub fn new(supervisor: bool) -> Self {
        Self {
            delegate: BitArray::new([0]),
            mip: BitArray::new([0]),
            mie: BitArray::new([0]),
            supervisor,
        }
    }

    fn valid_mask(&self) -> u32 {
        if self.supervisor {
            VALID_INTERRUPTS_MASK
        } else {
            VALID_INTERRUPTS_MASK & !DELEGATABLE_INTERRUPTS_MASK
        }
    }

    /// Sets or clears the pending bit of `cause`, as an external interrupt line would.
    ///
    /// Returns `false` if the interrupt is not implemented.
    pub fn set_pending(&mut self, cause: InterruptCause, pending: bool) -> bool {
        if bit(cause) & self.valid_mask() == 0 {
            return false;
        }
        self.mip.set(cause.code() as usize, pending);
        true
    }

    /// Returns the highest-priority interrupt that should be taken now, together with the
    /// privilege level that handles it.
    pub fn next(
        &self,
        privilege: PrivilegeLevel,
        mstatus_mie: bool,
        mstatus_sie: bool,
    ) -> Option<(InterruptCause, PrivilegeLevel)> {
        let ready = (self.mip & self.mie).load_le::<u32>();
        if ready == 0 {
            return None;
        }
        InterruptCause::PRIORITY.into_iter().find_map(|cause| {
            if ready & bit(cause) == 0 {
                return None;
            }
            if self.delegate[cause.code() as usize] {
                let enabled = privilege < PrivilegeLevel::Supervisor
                    || privilege == PrivilegeLevel::Supervisor && mstatus_sie;
                enabled.then_some((cause, PrivilegeLevel::Supervisor))
            } else {
                let enabled = privilege < PrivilegeLevel::Machine || mstatus_mie;
                enabled.then_some((cause, PrivilegeLevel::Machine))
            }
        })
    }

    pub fn read_mideleg(&self) -> u64 {
        self.delegate.load_le::<u32>() as u64
    }

    /// The mideleg register is **WARL**.
    pub fn write_mideleg(&mut self, value: u64, mask: u64) {
        if !self.supervisor {
            return;
        }
        let mask = mask as u32 & DELEGATABLE_INTERRUPTS_MASK;
        let old = self.delegate.load_le::<u32>();
        self.delegate.store_le(old & !mask | value as u32 & mask);
    }

    pub fn read_mip(&self) -> u64 {
        self.mip.load_le::<u32>() as u64
    }

    /// Only the supervisor bits are software-writable. The machine bits follow the interrupt
    /// lines driven by the host.
    pub fn write_mip(&mut self, value: u64, mask: u64) {
        let mask = mask as u32 & DELEGATABLE_INTERRUPTS_MASK & self.valid_mask();
        let old = self.mip.load_le::<u32>();
        self.mip.store_le(old & !mask | value as u32 & mask);
    }

    pub fn read_mie(&self) -> u64 {
        self.mie.load_le::<u32>() as u64
    }

    pub fn write_mie(&mut self, value: u64, mask: u64) {
        let mask = mask as u32 & self.valid_mask();
        let old = self.mie.load_le::<u32>();
        self.mie.store_le(old & !mask | value as u32 & mask);
    }

    pub fn read_sip(&self) -> u64 {
        (self.mip & self.delegate).load_le::<u32>() as u64
    }

    /// SEIP and STIP are read-only in sip.
    pub fn write_sip(&mut self, value: u64, mask: u64) {
        let delegated = self.delegate.load_le::<u32>();
        let mask = mask as u32 & bit(InterruptCause::SupervisorSoftware) & delegated;
        let old = self.mip.load_le::<u32>();
        self.mip.store_le(old & !mask | value as u32 & mask);
    }

    pub fn read_sie(&self) -> u64 {
        (self.mie & self.delegate).load_le::<u32>() as u64
    }

    pub fn write_sie(&mut self, value: u64, mask: u64) {
        // Masking with `delegate` already excludes the invalid bits.
        let mask = mask as u32 & self.delegate.load_le::<u32>();
        let old = self.mie.load_le::<u32>();
        self.mie.store_le(old & !mask | value as u32 & mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_interrupts_respect_global_enable() {
        let mut interrupts = Interrupts::new(true);
        interrupts.write_mie(u64::MAX, u64::MAX);
        assert!(interrupts.set_pending(InterruptCause::MachineTimer, true));
        assert_eq!(interrupts.next(PrivilegeLevel::Machine, false, false), None);
        assert_eq!(
            interrupts.next(PrivilegeLevel::Machine, true, false),
            Some((InterruptCause::MachineTimer, PrivilegeLevel::Machine))
        );
        // Always enabled from lower privilege levels.
        assert_eq!(
            interrupts.next(PrivilegeLevel::User, false, false),
            Some((InterruptCause::MachineTimer, PrivilegeLevel::Machine))
        );
    }

    #[test]
    fn priority_order() {
        let mut interrupts = Interrupts::new(true);
        interrupts.write_mie(u64::MAX, u64::MAX);
        interrupts.set_pending(InterruptCause::MachineTimer, true);
        interrupts.set_pending(InterruptCause::MachineInternalTimer0, true);
        interrupts.set_pending(InterruptCause::MachineLocal, true);
        assert_eq!(
            interrupts.next(PrivilegeLevel::Machine, true, false),
            Some((InterruptCause::MachineLocal, PrivilegeLevel::Machine))
        );
        interrupts.set_pending(InterruptCause::MachineExternal, true);
        assert_eq!(
            interrupts.next(PrivilegeLevel::Machine, true, false),
            Some((InterruptCause::MachineExternal, PrivilegeLevel::Machine))
        );
    }

    #[test]
    fn delegated_interrupts_are_not_taken_in_machine_mode() {
        let mut interrupts = Interrupts::new(true);
        interrupts.write_mideleg(u64::MAX, u64::MAX);
        assert_eq!(interrupts.read_mideleg(), 0x222);
        interrupts.write_sie(u64::MAX, u64::MAX);
        assert_eq!(interrupts.read_mie(), 0x222);
        interrupts.write_sip(u64::MAX, u64::MAX);
        assert_eq!(interrupts.read_sip(), 0x2);
        assert_eq!(interrupts.next(PrivilegeLevel::Machine, true, true), None);
        assert_eq!(interrupts.next(PrivilegeLevel::Supervisor, false, false), None);
        assert_eq!(
            interrupts.next(PrivilegeLevel::Supervisor, false, true),
            Some((InterruptCause::SupervisorSoftware, PrivilegeLevel::Supervisor))
        );
    }

    #[test]
    fn machine_bits_of_mip_are_read_only() {
        let mut interrupts = Interrupts::new(false);
        interrupts.write_mip(u64::MAX, u64::MAX);
        assert_eq!(interrupts.read_mip(), 0);
        assert!(!interrupts.set_pending(InterruptCause::SupervisorTimer, true));
        assert_eq!(interrupts.next(PrivilegeLevel::User, true, true), None);
    }
}
