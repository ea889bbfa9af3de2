use bitvec::{field::BitField, order::Lsb0, view::BitView};

use crate::cause::ExceptionCause;

/// Trap setup registers of one privilege level pair (M and S).
#[derive(Debug, Clone)]
pub struct Control {
    pub mtvec: Tvec,
    pub medeleg: Medeleg,
    pub mcounteren: Counteren,
    pub mcountinhibit: Mcountinhibit,

    pub stvec: Tvec,
    pub scounteren: Counteren,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    pub fn new() -> Self {
        Self {
            mtvec: Tvec::new(),
            medeleg: Medeleg::new(),
            mcounteren: Counteren::new(),
            mcountinhibit: Mcountinhibit::new(),
            stvec: Tvec::new(),
            scounteren: Counteren::new(),
        }
    }
}

/// Trap Vector Base Address Register (mtvec and stvec).
///
/// > When MODE=Direct, all traps into machine mode cause the pc to be set to the address in the
/// > BASE field. When MODE=Vectored, all synchronous exceptions into machine mode cause the pc to
/// > be set to the address in the BASE field, whereas interrupts cause the pc to be set to the
/// > address in the BASE field plus four times the interrupt cause number.
#[derive(Debug, Clone)]
pub struct Tvec(u64);

impl Default for Tvec {
    fn default() -> Self {
        Self::new()
    }
}

impl Tvec {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn read(&self) -> u64 {
        self.0
    }

    pub fn write(&mut self, value: u64, mask: u64) {
        let new_value = self.0 & !mask | value & mask;
        // MODE values >= 2 are reserved. The register is WARL, so keep the old value.
        if new_value & 0b11 < 2 {
            self.0 = new_value;
        }
    }

    /// Returns the vector base address (stored in BASE field).
    pub fn base(&self) -> u64 {
        self.0.view_bits::<Lsb0>()[2..].load_le::<u64>() << 2
    }

    pub fn mode(&self) -> VectorMode {
        match self.0.view_bits::<Lsb0>()[0] {
            false => VectorMode::Direct,
            true => VectorMode::Vectored,
        }
    }

    /// Returns the handler address for a trap with the given interrupt code, or for an exception
    /// if `interrupt` is `None`.
    pub fn target(&self, interrupt: Option<u64>) -> u64 {
        match (self.mode(), interrupt) {
            (VectorMode::Vectored, Some(code)) => self.base().wrapping_add(4 * code),
            _ => self.base(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMode {
    Direct,
    Vectored,
}

/// The medeleg register is **WARL**.
///
/// Environment calls from M-mode can never be delegated.
#[derive(Debug, Clone)]
pub struct Medeleg(u64);

impl Default for Medeleg {
    fn default() -> Self {
        Self::new()
    }
}

impl Medeleg {
    #[allow(clippy::identity_op)]
    const DELEGATABLE_EXCEPTIONS_MASK: u64 = 0
        | (1 << 0) // instruction address misaligned
        | (1 << 1) // instruction access fault
        | (1 << 2) // illegal instruction
        | (1 << 3) // breakpoint
        | (1 << 4) // load address misaligned
        | (1 << 5) // load access fault
        | (1 << 6) // store/AMO address misaligned
        | (1 << 7) // store/AMO access fault
        | (1 << 8) // ecall from U
        | (1 << 9) // ecall from S
        | (1 << 12) // instruction page fault
        | (1 << 13) // load page fault
        | (1 << 15); // store/AMO page fault

    pub fn new() -> Self {
        Self(0)
    }

    pub fn read(&self) -> u64 {
        self.0
    }

    pub fn write(&mut self, value: u64, mask: u64) {
        let mask = mask & Self::DELEGATABLE_EXCEPTIONS_MASK;
        self.0 = self.0 & !mask | value & mask;
    }

    pub fn should_delegate(&self, cause: ExceptionCause) -> bool {
        self.0 & (1 << cause.code()) != 0
    }
}

/// Counter-Enable register (mcounteren and scounteren).
///
/// All fields of the register are **WARL**.
#[derive(Debug, Clone)]
pub struct Counteren(u32);

impl Default for Counteren {
    fn default() -> Self {
        Self::new()
    }
}

impl Counteren {
    pub fn new() -> Self {
        Self(0xFFFF_FFFF)
    }

    pub fn read(&self) -> u64 {
        self.0 as u64
    }

    pub fn write(&mut self, value: u64, mask: u64) {
        let (value, mask) = (value as u32, mask as u32);
        self.0 = self.0 & !mask | value & mask;
    }

    /// Returns `true` if counter `n` (0 = cycle, 1 = time, 2 = instret, 3.. = hpm) is enabled.
    pub fn enabled(&self, n: u8) -> bool {
        if n > 31 {
            panic!("invalid counter number: {n}");
        }
        self.0.view_bits::<Lsb0>()[n as usize]
    }
}

/// The mcountinhibit register is **WARL**.
#[derive(Debug, Clone)]
pub struct Mcountinhibit(u32);

impl Default for Mcountinhibit {
    fn default() -> Self {
        Self::new()
    }
}

impl Mcountinhibit {
    const CY: usize = 0;
    const IR: usize = 2;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn read(&self) -> u64 {
        self.0 as u64
    }

    pub fn write(&mut self, value: u64, mask: u64) {
        // Bit 1 (time) is read-only zero.
        let (value, mask) = (value as u32, mask as u32 & !0b10);
        self.0 = self.0 & !mask | value & mask;
    }

    pub fn cy(&self) -> bool {
        self.0.view_bits::<Lsb0>()[Self::CY]
    }

    pub fn ir(&self) -> bool {
        self.0.view_bits::<Lsb0>()[Self::IR]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_tvec_mode_is_ignored() {
        let mut tvec = Tvec::new();
        tvec.write(0x8000_0001, u64::MAX);
        assert_eq!(tvec.mode(), VectorMode::Vectored);
        tvec.write(0x4000_0002, u64::MAX);
        assert_eq!(tvec.read(), 0x8000_0001);
        assert_eq!(tvec.target(None), 0x8000_0000);
        assert_eq!(tvec.target(Some(7)), 0x8000_001c);
    }

    #[test]
    fn machine_ecall_is_never_delegated() {
        let mut medeleg = Medeleg::new();
        medeleg.write(u64::MAX, u64::MAX);
        assert!(!medeleg.should_delegate(ExceptionCause::EnvironmentCallFromMMode));
        assert!(medeleg.should_delegate(ExceptionCause::LoadPageFault));
    }

    #[test]
    fn time_cannot_be_inhibited() {
        let mut inhibit = Mcountinhibit::new();
        inhibit.write(0b111, u64::MAX);
        assert_eq!(inhibit.read(), 0b101);
        assert!(inhibit.cy() && inhibit.ir());
    }
}
