/// The hart's hardware counters.
///
/// > The cycle, instret, and hpmcountern CSRs are read-only shadows of mcycle, minstret, and
/// > mhpmcountern, respectively.
///
/// Only the raw counts are stored. `mcycle` and `minstret` are views over them, shifted by an
/// offset that CSR writes adjust. A CSR write replaces the value the instruction itself would
/// otherwise add, so the increment of the writing instruction is skipped.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    cycles: u64,
    retired: u64,
    cycle_offset: u64,
    instret_offset: u64,
    skip_next_mcycle_increment: bool,
    skip_next_minstret_increment: bool,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps taken since reset, regardless of CSR writes and inhibition.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Number of instructions retired since reset, regardless of CSR writes and inhibition.
    pub fn retired(&self) -> u64 {
        self.retired
    }

    /// Advances the cycle count. An inhibited or skipped increment leaves `mcycle` unchanged.
    pub fn increment_cycle(&mut self, inhibited: bool) {
        self.cycles = self.cycles.wrapping_add(1);
        if self.skip_next_mcycle_increment || inhibited {
            self.skip_next_mcycle_increment = false;
            self.cycle_offset = self.cycle_offset.wrapping_sub(1);
        }
    }

    pub fn increment_instret(&mut self, inhibited: bool) {
        self.retired = self.retired.wrapping_add(1);
        if self.skip_next_minstret_increment || inhibited {
            self.skip_next_minstret_increment = false;
            self.instret_offset = self.instret_offset.wrapping_sub(1);
        }
    }

    pub fn mcycle(&self) -> u64 {
        self.cycles.wrapping_add(self.cycle_offset)
    }

    pub fn minstret(&self) -> u64 {
        self.retired.wrapping_add(self.instret_offset)
    }

    /// Writes the bits of `mcycle` selected by `mask`.
    pub fn write_mcycle(&mut self, value: u64, mask: u64) {
        let new = self.mcycle() & !mask | value & mask;
        self.cycle_offset = new.wrapping_sub(self.cycles);
        self.skip_next_mcycle_increment = true;
    }

    pub fn write_minstret(&mut self, value: u64, mask: u64) {
        let new = self.minstret() & !mask | value & mask;
        self.instret_offset = new.wrapping_sub(self.retired);
        self.skip_next_minstret_increment = true;
    }
}
