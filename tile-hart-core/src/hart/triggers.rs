//! Address and instruction-count triggers selected through `tselect` and programmed through
//! `tdata1`..`tdata3`.
//!
//! Two trigger types are implemented. An address/data match trigger (`mcontrol`, type 2) compares
//! the pc of an instruction about to be fetched or the virtual address of a load or store against
//! `tdata2`. An instruction count trigger (`icount`, type 3) counts retired instructions down and
//! fires when the count reaches zero. Timing is always "before", `select` is always the address
//! and chaining is not supported, so those fields read as zero.

use bitvec::{field::BitField, order::Lsb0, view::BitView};

use crate::{PrivilegeLevel, Xlen};

/// Number of trigger slots selectable through tselect.
pub const TRIGGER_COUNT: usize = 4;

const TYPE_MCONTROL: u8 = 2;
const TYPE_ICOUNT: u8 = 3;

/// Bit indices into an `mcontrol` tdata1.
mod mcontrol {
    pub const LOAD: usize = 0;
    pub const STORE: usize = 1;
    pub const EXECUTE: usize = 2;
    pub const U: usize = 3;
    pub const S: usize = 4;
    pub const M: usize = 6;
    pub const MATCH: usize = 7;
    pub const ACTION: usize = 12;
    pub const HIT: usize = 20;
}

/// Bit indices into an `icount` tdata1.
mod icount {
    pub const ACTION: usize = 0;
    pub const U: usize = 6;
    pub const S: usize = 7;
    pub const M: usize = 9;
    pub const COUNT: usize = 10;
    pub const HIT: usize = 24;
}

/// What an address is used for when it is checked against the triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Execute,
    Load,
    Store,
    /// Atomic memory operations match both load and store triggers.
    Amo,
}

/// What the hart does when a trigger fires. Entering debug mode wins over a breakpoint when
/// several triggers fire together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TriggerAction {
    Breakpoint,
    EnterDebug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
    Equal,
    Napot,
    AtLeast,
    Below,
}

#[derive(Debug, Clone, Copy, Default)]
struct Trigger {
    tdata1: u64,
    tdata2: u64,
    tdata3: u64,
}

#[derive(Debug, Clone)]
pub struct Triggers {
    xlen: Xlen,
    tselect: u64,
    triggers: [Trigger; TRIGGER_COUNT],
    /// Action of an icount trigger that reached zero, taken before the next instruction.
    icount_fired: Option<TriggerAction>,
}

impl Triggers {
    pub fn new(xlen: Xlen) -> Self {
        let mut reset = Trigger::default();
        reset.set_kind(xlen, TYPE_MCONTROL);
        reset.set_maskmax(xlen);
        Self {
            xlen,
            tselect: 0,
            triggers: [reset; TRIGGER_COUNT],
            icount_fired: None,
        }
    }

    pub fn read_tselect(&self) -> u64 {
        self.tselect
    }

    /// Selecting a trigger that does not exist leaves tselect unchanged.
    pub fn write_tselect(&mut self, value: u64, mask: u64) {
        let value = self.tselect & !mask | value & mask;
        if (value as usize) < TRIGGER_COUNT {
            self.tselect = value;
        }
    }

    /// Reads tdata1, tdata2 or tdata3 (`n` = 0, 1 or 2) of the selected trigger.
    pub fn read_tdata(&self, n: usize) -> u64 {
        let trigger = &self.triggers[self.tselect as usize];
        match n {
            0 => trigger.tdata1,
            1 => trigger.tdata2,
            _ => trigger.tdata3,
        }
    }

    /// Writes tdata1, tdata2 or tdata3 of the selected trigger. A trigger owned by the debugger
    /// (dmode set) can only be changed from debug mode, and only debug mode may set dmode.
    pub fn write_tdata(&mut self, n: usize, value: u64, mask: u64, debug_mode: bool) {
        let xlen = self.xlen;
        let trigger = &mut self.triggers[self.tselect as usize];
        if trigger.dmode(xlen) && !debug_mode {
            return;
        }
        match n {
            0 => {
                let value = trigger.tdata1 & !mask | value & mask;
                trigger.tdata1 = legalize_tdata1(xlen, value, debug_mode);
            }
            1 => trigger.tdata2 = xlen.address(trigger.tdata2 & !mask | value & mask),
            _ => trigger.tdata3 = xlen.address(trigger.tdata3 & !mask | value & mask),
        }
    }

    /// Checks `address` against every enabled address trigger. Matching triggers get their hit
    /// bit set. A breakpoint trigger does not fire in M-mode while interrupts are disabled there,
    /// so that a handler cannot be re-entered through its own breakpoint.
    pub fn match_address(
        &mut self,
        event: TriggerEvent,
        address: u64,
        privilege: PrivilegeLevel,
        mie: bool,
    ) -> Option<TriggerAction> {
        let xlen = self.xlen;
        let mut fired = None;
        for trigger in &mut self.triggers {
            if trigger.kind(xlen) != TYPE_MCONTROL || !trigger.matches(xlen, event, address) {
                continue;
            }
            let bits = trigger.tdata1.view_bits::<Lsb0>();
            let enabled = match privilege {
                PrivilegeLevel::User => bits[mcontrol::U],
                PrivilegeLevel::Supervisor => bits[mcontrol::S],
                PrivilegeLevel::Machine => bits[mcontrol::M],
            };
            if !enabled {
                continue;
            }
            let action = action_of(bits[mcontrol::ACTION..mcontrol::ACTION + 4].load_le::<u8>());
            if action == TriggerAction::Breakpoint && privilege == PrivilegeLevel::Machine && !mie {
                continue;
            }
            trigger.tdata1.view_bits_mut::<Lsb0>().set(mcontrol::HIT, true);
            fired = fired.max(Some(action));
        }
        fired
    }

    /// Counts down every enabled icount trigger for an instruction retired at `privilege`. A
    /// trigger whose count reaches zero fires before the next instruction executes.
    pub fn count_retired(&mut self, privilege: PrivilegeLevel, mie: bool) {
        let xlen = self.xlen;
        for trigger in &mut self.triggers {
            if trigger.kind(xlen) != TYPE_ICOUNT {
                continue;
            }
            let bits = trigger.tdata1.view_bits_mut::<Lsb0>();
            let enabled = match privilege {
                PrivilegeLevel::User => bits[icount::U],
                PrivilegeLevel::Supervisor => bits[icount::S],
                PrivilegeLevel::Machine => bits[icount::M],
            };
            let count = bits[icount::COUNT..icount::HIT].load_le::<u16>();
            if !enabled || count == 0 {
                continue;
            }
            bits[icount::COUNT..icount::HIT].store_le(count - 1);
            if count > 1 {
                continue;
            }
            let action = action_of(bits[icount::ACTION..icount::ACTION + 6].load_le::<u8>());
            if action == TriggerAction::Breakpoint && privilege == PrivilegeLevel::Machine && !mie {
                continue;
            }
            bits.set(icount::HIT, true);
            self.icount_fired = self.icount_fired.max(Some(action));
        }
    }

    /// Takes the action of an icount trigger that fired after the previous instruction.
    pub fn take_icount_fired(&mut self) -> Option<TriggerAction> {
        self.icount_fired.take()
    }
}

impl Trigger {
    fn kind(&self, xlen: Xlen) -> u8 {
        let top = xlen.bits() as usize;
        self.tdata1.view_bits::<Lsb0>()[top - 4..top].load_le()
    }

    fn set_kind(&mut self, xlen: Xlen, kind: u8) {
        let top = xlen.bits() as usize;
        self.tdata1.view_bits_mut::<Lsb0>()[top - 4..top].store_le(kind);
    }

    fn dmode(&self, xlen: Xlen) -> bool {
        self.tdata1.view_bits::<Lsb0>()[xlen.bits() as usize - 5]
    }

    /// maskmax is read-only and advertises NAPOT ranges up to half the address space.
    fn set_maskmax(&mut self, xlen: Xlen) {
        let low = xlen.bits() as usize - 11;
        self.tdata1.view_bits_mut::<Lsb0>()[low..low + 6].store_le(xlen.bits() as u8 - 1);
    }

    fn matches(&self, xlen: Xlen, event: TriggerEvent, address: u64) -> bool {
        let bits = self.tdata1.view_bits::<Lsb0>();
        let wanted = match event {
            TriggerEvent::Execute => bits[mcontrol::EXECUTE],
            TriggerEvent::Load => bits[mcontrol::LOAD],
            TriggerEvent::Store => bits[mcontrol::STORE],
            TriggerEvent::Amo => bits[mcontrol::LOAD] || bits[mcontrol::STORE],
        };
        if !wanted {
            return false;
        }
        let address = xlen.address(address);
        let target = self.tdata2;
        match match_kind(bits[mcontrol::MATCH..mcontrol::MATCH + 4].load_le::<u8>()) {
            Some(MatchKind::Equal) => address == target,
            Some(MatchKind::Napot) => {
                let ones = target ^ target.wrapping_add(1);
                address | ones == target | ones
            }
            Some(MatchKind::AtLeast) => address >= target,
            Some(MatchKind::Below) => address < target,
            None => false,
        }
    }
}

fn match_kind(raw: u8) -> Option<MatchKind> {
    match raw {
        0 => Some(MatchKind::Equal),
        1 => Some(MatchKind::Napot),
        2 => Some(MatchKind::AtLeast),
        3 => Some(MatchKind::Below),
        _ => None,
    }
}

/// Legalized actions are 0 (breakpoint) or 1 (debug mode).
fn action_of(raw: u8) -> TriggerAction {
    if raw == 1 {
        TriggerAction::EnterDebug
    } else {
        TriggerAction::Breakpoint
    }
}

/// Keeps the implemented fields of a tdata1 write. Unsupported types disable the trigger, and
/// entering debug mode as action requires dmode, which only the debugger can set.
fn legalize_tdata1(xlen: Xlen, value: u64, debug_mode: bool) -> u64 {
    let top = xlen.bits() as usize;
    let bits = value.view_bits::<Lsb0>();
    let kind = bits[top - 4..top].load_le::<u8>();
    let dmode = debug_mode && bits[top - 5];

    let mut legal = Trigger::default();
    let out = legal.tdata1.view_bits_mut::<Lsb0>();
    match kind {
        TYPE_MCONTROL => {
            for bit in [
                mcontrol::LOAD,
                mcontrol::STORE,
                mcontrol::EXECUTE,
                mcontrol::U,
                mcontrol::S,
                mcontrol::M,
                mcontrol::HIT,
            ] {
                out.set(bit, bits[bit]);
            }
            let kind = bits[mcontrol::MATCH..mcontrol::MATCH + 4].load_le::<u8>();
            if match_kind(kind).is_some() {
                out[mcontrol::MATCH..mcontrol::MATCH + 4].store_le(kind);
            }
            let action = bits[mcontrol::ACTION..mcontrol::ACTION + 4].load_le::<u8>();
            if action == 1 && dmode {
                out[mcontrol::ACTION..mcontrol::ACTION + 4].store_le(1u8);
            }
            legal.set_maskmax(xlen);
        }
        TYPE_ICOUNT => {
            for bit in [icount::U, icount::S, icount::M, icount::HIT] {
                out.set(bit, bits[bit]);
            }
            let count = bits[icount::COUNT..icount::HIT].load_le::<u16>();
            out[icount::COUNT..icount::HIT].store_le(count);
            let action = bits[icount::ACTION..icount::ACTION + 6].load_le::<u8>();
            if action == 1 && dmode {
                out[icount::ACTION..icount::ACTION + 6].store_le(1u8);
            }
        }
        _ => return 0,
    }
    legal.set_kind(xlen, kind);
    legal.tdata1.view_bits_mut::<Lsb0>().set(top - 5, dmode);
    legal.tdata1
}

#[cfg(test)]
mod tests {
    use super::*;

    const RV32_MCONTROL: u64 = (TYPE_MCONTROL as u64) << 28;
    const RV32_ICOUNT: u64 = (TYPE_ICOUNT as u64) << 28;
    const DMODE_32: u64 = 1 << 27;

    fn select(triggers: &mut Triggers, n: u64, tdata1: u64, tdata2: u64, debug_mode: bool) {
        triggers.write_tselect(n, u64::MAX);
        triggers.write_tdata(1, tdata2, u64::MAX, debug_mode);
        triggers.write_tdata(0, tdata1, u64::MAX, debug_mode);
    }

    #[test]
    fn reset_advertises_address_triggers() {
        let triggers = Triggers::new(Xlen::Rv32);
        assert_eq!(triggers.read_tdata(0), RV32_MCONTROL | 31 << 21);
        let triggers = Triggers::new(Xlen::Rv64);
        assert_eq!(triggers.read_tdata(0) >> 60, TYPE_MCONTROL as u64);
        assert_eq!(triggers.read_tdata(0) >> 53 & 0x3f, 63);
    }

    #[test]
    fn tselect_and_tdata_are_per_trigger() {
        let mut triggers = Triggers::new(Xlen::Rv32);
        triggers.write_tselect(9, u64::MAX);
        assert_eq!(triggers.read_tselect(), 0);
        triggers.write_tselect(2, u64::MAX);
        triggers.write_tdata(1, 0xabc, u64::MAX, false);
        assert_eq!(triggers.read_tdata(1), 0xabc);
        triggers.write_tselect(0, u64::MAX);
        assert_eq!(triggers.read_tdata(1), 0);
    }

    #[test]
    fn tdata1_writes_are_legalized() {
        let mut triggers = Triggers::new(Xlen::Rv32);
        // Timing, select and chain are dropped, action 1 needs dmode.
        let value = RV32_MCONTROL | 1 << 18 | 1 << 19 | 1 << 11 | 1 << 12 | 0b100;
        triggers.write_tdata(0, value, u64::MAX, false);
        assert_eq!(triggers.read_tdata(0), RV32_MCONTROL | 31 << 21 | 0b100);
        // Unsupported types disable the trigger.
        triggers.write_tdata(0, 5 << 28, u64::MAX, false);
        assert_eq!(triggers.read_tdata(0), 0);
    }

    #[test]
    fn debugger_triggers_are_locked_outside_debug_mode() {
        let mut triggers = Triggers::new(Xlen::Rv32);
        triggers.write_tdata(0, RV32_MCONTROL | DMODE_32 | 1 << 12, u64::MAX, false);
        assert_eq!(triggers.read_tdata(0) & (DMODE_32 | 1 << 12), 0);

        triggers.write_tdata(0, RV32_MCONTROL | DMODE_32 | 1 << 12, u64::MAX, true);
        assert_eq!(triggers.read_tdata(0) & (DMODE_32 | 1 << 12), DMODE_32 | 1 << 12);
        triggers.write_tdata(1, 0x40, u64::MAX, false);
        assert_eq!(triggers.read_tdata(1), 0);
    }

    #[test]
    fn address_match_kinds() {
        let mut triggers = Triggers::new(Xlen::Rv32);
        let load_m = RV32_MCONTROL | 1 << mcontrol::M | 1 << mcontrol::LOAD;
        // NAPOT over 0x100..0x108.
        select(&mut triggers, 0, load_m | 1 << mcontrol::MATCH, 0x103, false);
        select(&mut triggers, 1, load_m | 2 << mcontrol::MATCH, 0x200, false);
        select(&mut triggers, 2, load_m | 3 << mcontrol::MATCH, 0x10, false);

        let mut hit = |event, address| {
            triggers.match_address(event, address, PrivilegeLevel::Machine, true)
        };
        let breakpoint = Some(TriggerAction::Breakpoint);
        assert_eq!(hit(TriggerEvent::Load, 0x104), breakpoint);
        assert_eq!(hit(TriggerEvent::Load, 0x108), None);
        assert_eq!(hit(TriggerEvent::Load, 0x300), breakpoint);
        assert_eq!(hit(TriggerEvent::Load, 0x8), breakpoint);
        assert_eq!(hit(TriggerEvent::Load, 0x80), None);
        assert_eq!(hit(TriggerEvent::Store, 0x104), None);
        assert_eq!(hit(TriggerEvent::Amo, 0x104), breakpoint);
        triggers.write_tselect(0, u64::MAX);
        assert_ne!(triggers.read_tdata(0) & 1 << mcontrol::HIT, 0);
    }

    #[test]
    fn address_match_respects_privilege_and_mie() {
        let mut triggers = Triggers::new(Xlen::Rv32);
        let tdata1 = RV32_MCONTROL | 1 << mcontrol::U | 1 << mcontrol::M | 1 << mcontrol::EXECUTE;
        select(&mut triggers, 0, tdata1, 0x80, false);
        let mut hit = |privilege, mie| {
            triggers.match_address(TriggerEvent::Execute, 0x80, privilege, mie)
        };
        assert_eq!(hit(PrivilegeLevel::Supervisor, true), None);
        assert_eq!(hit(PrivilegeLevel::Machine, false), None);
        assert_eq!(hit(PrivilegeLevel::User, false), Some(TriggerAction::Breakpoint));
    }

    #[test]
    fn debug_action_wins() {
        let mut triggers = Triggers::new(Xlen::Rv32);
        let store_m = RV32_MCONTROL | 1 << mcontrol::M | 1 << mcontrol::STORE;
        select(&mut triggers, 0, store_m, 0x40, false);
        select(&mut triggers, 1, store_m | DMODE_32 | 1 << mcontrol::ACTION, 0x40, true);
        assert_eq!(
            triggers.match_address(TriggerEvent::Store, 0x40, PrivilegeLevel::Machine, false),
            Some(TriggerAction::EnterDebug)
        );
    }

    #[test]
    fn icount_fires_when_the_count_runs_out() {
        let mut triggers = Triggers::new(Xlen::Rv32);
        select(&mut triggers, 0, RV32_ICOUNT | 2 << icount::COUNT | 1 << icount::U, 0, false);
        triggers.count_retired(PrivilegeLevel::Machine, true);
        assert_eq!(triggers.take_icount_fired(), None);
        triggers.count_retired(PrivilegeLevel::User, true);
        assert_eq!(triggers.take_icount_fired(), None);
        triggers.count_retired(PrivilegeLevel::User, true);
        assert_eq!(triggers.take_icount_fired(), Some(TriggerAction::Breakpoint));
        assert_eq!(triggers.read_tdata(0), RV32_ICOUNT | 1 << icount::HIT | 1 << icount::U);
        triggers.count_retired(PrivilegeLevel::User, true);
        assert_eq!(triggers.take_icount_fired(), None);
    }
}
