//! The simulated hart: architectural state, the step/run loop and the host control surface.

mod control;
mod counters;
mod cs_registers;
mod debug;
mod execute;
mod interrupts;
mod mmu;
mod status;
mod trap;
mod triggers;

pub use cs_registers::CsrError;
pub use debug::DebugCause;
pub use status::ExtensionContextStatus;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, trace, warn};
use thiserror::Error;

use crate::catalog::OperandType;
use crate::cause::{Exception, ExceptionCause, InterruptCause, NmiCause, SecondaryCause};
use crate::decode::{DecodedInstruction, Decoder, Extensions};
use crate::decode_cache::{self, DecodeCache};
use crate::load_queue::{self, LoadQueue, LoadQueueError};
use crate::memory::Bus;
use crate::pmp::Pmp;
use crate::regions::{RegionConfig, Regions};
use crate::registers::{FpRegisters, Registers, Specifier, VectorRegisters};
use crate::vm::VirtualMemory;
use crate::{PrivilegeLevel, Xlen};
use control::Control;
use counters::Counters;
use debug::DebugState;
use execute::Completion;
use interrupts::Interrupts;
use status::Status;
use trap::Trap;
use triggers::{TriggerAction, TriggerEvent};

/// Static configuration of a [`Hart`]. It is not possible to change it after creation.
#[derive(Debug, Clone)]
pub struct Config {
    pub xlen: Xlen,
    pub extensions: Extensions,
    /// Width of a vector register in bits.
    pub vlen: u32,
    /// Largest supported vector element width in bits.
    pub elen: u32,
    /// Address to which the hart's pc register is reset.
    pub reset_pc: u64,
    /// Handler address of non-maskable interrupts.
    pub nmi_pc: u64,
    /// Value of `mhartid`.
    pub hart_id: u64,
    /// If `true`, misaligned data accesses are carried out (subject to the region rules).
    /// If `false`, they raise an address-misaligned exception.
    pub misaligned_data: bool,
    /// Number of decode cache slots, a power of two.
    pub decode_cache_size: usize,
    /// Track loads from external memory so a later bus error can be rolled back.
    pub load_queue_enabled: bool,
    pub load_queue_size: usize,
    /// Revert the destination register of a load when its bus error is reported.
    pub load_error_rollback: bool,
    /// Number of back-to-back illegal instructions after which running stops with an error.
    pub max_consecutive_illegal: u32,
    /// Decode the custom `load64`/`store64` instructions.
    pub enable_wide_ld_st: bool,
    /// Decode the custom `bbarrier` instruction.
    pub enable_bbarrier: bool,
    /// Bit of an indirect jump target that signals a builtin call. `None` disables the hook.
    pub builtin_bit: Option<u32>,
    /// Set page-table accessed/dirty bits in hardware instead of raising a page fault.
    pub vm_update_ad: bool,
    pub pmp_entries: usize,
    pub regions: RegionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xlen: Xlen::default(),
            extensions: Extensions::all(),
            vlen: 128,
            elen: 64,
            reset_pc: 0,
            nmi_pc: 0,
            hart_id: 0,
            misaligned_data: true,
            decode_cache_size: decode_cache::DEFAULT_SIZE,
            load_queue_enabled: false,
            load_queue_size: load_queue::DEFAULT_SIZE,
            load_error_rollback: false,
            max_consecutive_illegal: 64,
            enable_wide_ld_st: false,
            enable_bbarrier: false,
            builtin_bit: Some(30),
            vm_update_ad: true,
            pmp_entries: 16,
            regions: RegionConfig::default(),
        }
    }
}

/// The `fflags` and `frm` fields of `fcsr`.
#[derive(Debug, Clone, Default)]
pub struct FpControl {
    pub fflags: u8,
    pub frm: u8,
}

impl FpControl {
    pub fn write_fflags(&mut self, value: u64, mask: u64) {
        let fflags = self.fflags as u64 & !mask | value & mask;
        self.fflags = (fflags & 0x1f) as u8;
    }

    pub fn write_frm(&mut self, value: u64, mask: u64) {
        let frm = self.frm as u64 & !mask | value & mask;
        self.frm = (frm & 0b111) as u8;
    }
}

/// Vector configuration and fixed-point state.
#[derive(Debug, Clone)]
pub struct VectorState {
    pub vl: u64,
    /// `vtype` without the `vill` bit.
    pub vtype: u64,
    pub vill: bool,
    pub vstart: u64,
    pub vxrm: u8,
    pub vxsat: bool,
}

impl Default for VectorState {
    fn default() -> Self {
        Self {
            vl: 0,
            vtype: 0,
            vill: true,
            vstart: 0,
            vxrm: 0,
            vxsat: false,
        }
    }
}

impl VectorState {
    pub fn read_vtype(&self, xlen: Xlen) -> u64 {
        if self.vill {
            1 << (xlen.bits() - 1)
        } else {
            self.vtype
        }
    }

    /// Selected element width in bits.
    pub fn sew(&self) -> u32 {
        8 << ((self.vtype >> 3) & 0b111)
    }

    /// Base-2 logarithm of the register group multiplier, `-3..=3`.
    pub fn lmul_log2(&self) -> i32 {
        let vlmul = (self.vtype & 0b111) as i32;
        if vlmul >= 4 {
            vlmul - 8
        } else {
            vlmul
        }
    }
}

/// A host-forced access fault that the next matching access consumes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct ForcedFault {
    offset: u64,
    secondary: SecondaryCause,
    /// Value of the step counter when the fault was posted.
    posted_at: u64,
}

/// The address range reserved by the last `lr`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Reservation {
    address: u64,
    size: u64,
}

/// What a single [`Hart::step`] did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepOutcome {
    /// An instruction retired.
    Retired,
    /// The instruction raised an exception, which has been taken.
    Exception(Exception),
    Interrupt(InterruptCause),
    Nmi(NmiCause),
    /// An indirect jump to the builtin-dispatch encoding with the given non-zero id. The jump
    /// itself has completed: the pc points at the return address.
    Builtin(u64),
    /// An indirect jump to the builtin-dispatch encoding with id `0`.
    Finished,
    /// The hart is halted in debug mode.
    DebugHalt,
}

/// Why [`Hart::run`] returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RunStatus {
    Finished,
    LimitReached,
    Cancelled,
    /// A builtin call is waiting to be serviced. Running again resumes after the call.
    BuiltinCall(u64),
    DebugHalt,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum RunError {
    #[error("{count} consecutive illegal instructions, the last one at {pc:#x}")]
    ConsecutiveIllegal { count: u32, pc: u64 },
}

/// Cooperative cancellation of [`Hart::run`], polled once per instruction.
///
/// Clones share the same flag, so a token can be handed to another thread or a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A single RISC-V hart together with the memory it is attached to.
///
/// > From the perspective of software running in a given execution environment, a hart is a
/// > resource that autonomously fetches and executes RISC-V instructions within that execution
/// > environment.
///
/// All mutable simulation state lives here: the `x`, `f` and `v` register files, the CSR bank,
/// the privilege level, protection and translation state, the load queue and the host-injected
/// fault flags. Execution is fully synchronous; [`Self::step`] either delivers a pending
/// NMI/interrupt or fetches, decodes and executes exactly one instruction.
#[derive(Debug)]
pub struct Hart<B: Bus> {
    config: Config,
    xlen: Xlen,
    decoder: Decoder,
    decode_cache: DecodeCache,
    registers: Registers,
    fregs: FpRegisters,
    vregs: VectorRegisters,
    fcsr: FpControl,
    vector: VectorState,
    privilege: PrivilegeLevel,
    status: Status,
    control: Control,
    interrupts: Interrupts,
    counters: Counters,
    trap: Trap,
    debug: DebugState,
    pmp: Pmp,
    vm: VirtualMemory,
    regions: Regions,
    load_queue: LoadQueue,
    reservation: Option<Reservation>,
    pending_nmi: Option<NmiCause>,
    forced_data_fault: Option<ForcedFault>,
    forced_fetch_fault: Option<u64>,
    /// The breakpoint being raised comes from a trigger whose action enters debug mode.
    trigger_halt: bool,
    consecutive_illegal: u32,
    /// Latched address of the first bus error, see [`crate::csr::MDSEAC`].
    mdseac: u64,
    mdseac_locked: bool,
    /// Upper word of the last wide load, see [`crate::csr::MDBHD`].
    mdbhd: u64,
    bus: B,
}

impl<B: Bus> Hart<B> {
    pub fn new(bus: B, config: Config) -> Self {
        let xlen = config.xlen;
        let ext = config.extensions;
        let decoder = Decoder::new(xlen, ext)
            .with_custom(config.enable_wide_ld_st, config.enable_bbarrier);
        Self {
            xlen,
            decoder,
            decode_cache: DecodeCache::new(config.decode_cache_size),
            registers: Registers::new(config.reset_pc),
            fregs: FpRegisters::default(),
            vregs: VectorRegisters::new(config.vlen),
            fcsr: FpControl::default(),
            vector: VectorState::default(),
            privilege: PrivilegeLevel::Machine,
            status: Status::new(ext.s, ext.u, ext.f, ext.v),
            control: Control::new(),
            interrupts: Interrupts::new(ext.s),
            counters: Counters::new(),
            trap: Trap::new(ext.c),
            debug: DebugState::new(xlen),
            pmp: Pmp::new(xlen, config.pmp_entries),
            vm: VirtualMemory::new(xlen, config.vm_update_ad),
            regions: Regions::new(xlen, config.regions.clone()),
            load_queue: LoadQueue::new(config.load_queue_size),
            reservation: None,
            pending_nmi: None,
            forced_data_fault: None,
            forced_fetch_fault: None,
            trigger_halt: false,
            consecutive_illegal: 0,
            mdseac: 0,
            mdseac_locked: false,
            mdbhd: 0,
            bus,
            config,
        }
    }

    /// Force this hart to its reset state. Memory is left untouched.
    pub fn reset(&mut self) {
        let ext = self.config.extensions;
        self.registers = Registers::new(self.config.reset_pc);
        self.fregs = FpRegisters::default();
        self.vregs.reset();
        self.fcsr = FpControl::default();
        self.vector = VectorState::default();
        self.privilege = PrivilegeLevel::Machine;
        self.status = Status::new(ext.s, ext.u, ext.f, ext.v);
        self.control = Control::new();
        self.interrupts = Interrupts::new(ext.s);
        self.counters = Counters::new();
        self.trap = Trap::new(ext.c);
        self.debug = DebugState::new(self.xlen);
        self.pmp.reset();
        self.vm.reset();
        self.decode_cache.clear();
        self.load_queue.clear();
        self.reservation = None;
        self.pending_nmi = None;
        self.forced_data_fault = None;
        self.forced_fetch_fault = None;
        self.trigger_halt = false;
        self.consecutive_illegal = 0;
        self.mdseac = 0;
        self.mdseac_locked = false;
        self.mdbhd = 0;
        debug!("Hart {} reset, pc {:#x}", self.config.hart_id, self.config.reset_pc);
    }

    /// Provide a read-only view of this hart's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn xlen(&self) -> Xlen {
        self.xlen
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn fp_registers(&self) -> &FpRegisters {
        &self.fregs
    }

    pub fn fp_registers_mut(&mut self) -> &mut FpRegisters {
        &mut self.fregs
    }

    pub fn vector_registers(&self) -> &VectorRegisters {
        &self.vregs
    }

    pub fn vector_registers_mut(&mut self) -> &mut VectorRegisters {
        &mut self.vregs
    }

    pub fn pc(&self) -> u64 {
        self.registers.pc()
    }

    /// Sets the pc, truncated to the address width.
    pub fn set_pc(&mut self, pc: u64) {
        *self.registers.pc_mut() = self.xlen.address(pc);
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the memory behind the hart. Code written through this reference is not
    /// seen by the decode cache; see [`Self::invalidate_decode_cache`].
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn regions(&self) -> &Regions {
        &self.regions
    }

    pub fn load_queue(&self) -> &LoadQueue {
        &self.load_queue
    }

    /// Number of steps taken since reset.
    pub fn cycles(&self) -> u64 {
        self.counters.cycles()
    }

    /// Number of instructions retired since reset.
    pub fn retired(&self) -> u64 {
        self.counters.retired()
    }

    pub fn decode_cache(&self) -> &DecodeCache {
        &self.decode_cache
    }

    pub fn invalidate_decode_cache(&mut self, address: u64, size: u64) {
        self.decode_cache.invalidate(address, size);
    }

    pub fn flush_decode_cache(&mut self) {
        self.decode_cache.clear();
    }

    /// Decodes the instruction at `pc` without executing it, going through the decode cache.
    pub fn decode_at(&mut self, pc: u64) -> Result<DecodedInstruction, Exception> {
        let (raw, physical_pc) = self.fetch(pc)?;
        Ok(self
            .decode_cache
            .get_or_decode(&self.decoder, pc, physical_pc, raw))
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug.active
    }

    /// Leaves debug mode, resuming at `dpc` in the privilege level saved in `dcsr`.
    pub fn exit_debug_mode(&mut self) {
        if !self.debug.active {
            return;
        }
        self.debug.active = false;
        self.privilege = self.debug.prv();
        self.set_pc(self.debug.dpc);
        debug!("Left debug mode, resuming at {:#x} in {} mode", self.debug.dpc, self.privilege);
    }

    /// Executes one step.
    ///
    /// An icount trigger that ran out after the previous instruction acts first. Then a pending
    /// NMI is delivered, then the highest-priority enabled interrupt. Otherwise execute triggers
    /// are checked against pc, the instruction at pc is fetched and decoded, the pc is advanced
    /// past it, and the instruction executes; a handler that sets the pc itself overrides the
    /// advance. On an exception the pc is restored to the faulting instruction before the trap is
    /// taken.
    ///
    /// Returns an error only when the consecutive-illegal-instruction watchdog fires, in which
    /// case the illegal instruction is left untrapped at pc.
    pub fn step(&mut self) -> Result<StepOutcome, RunError> {
        if self.debug.active {
            return Ok(StepOutcome::DebugHalt);
        }
        self.counters.increment_cycle(self.control.mcountinhibit.cy());

        if let Some(action) = self.debug.triggers.take_icount_fired() {
            let pc = self.registers.pc();
            return Ok(self.take_trigger_action(action, pc));
        }

        if let Some(cause) = self.pending_nmi.take() {
            self.take_nmi(cause);
            return Ok(StepOutcome::Nmi(cause));
        }
        if let Some((cause, _)) = self
            .interrupts
            .next(self.privilege, self.status.mie(), self.status.sie())
        {
            self.take_trap(cause.into());
            return Ok(StepOutcome::Interrupt(cause));
        }

        let pc = self.registers.pc();
        let privilege = self.privilege;
        let mie = self.status.mie();
        if let Some(action) = self
            .debug
            .triggers
            .match_address(TriggerEvent::Execute, pc, privilege, mie)
        {
            self.consecutive_illegal = 0;
            return Ok(self.take_trigger_action(action, pc));
        }
        let di = match self.decode_at(pc) {
            Ok(di) => di,
            Err(exception) => {
                self.consecutive_illegal = 0;
                self.age_forced_fault();
                self.take_trap(exception.into());
                return Ok(StepOutcome::Exception(exception));
            }
        };
        self.set_pc(pc.wrapping_add(di.size() as u64));

        self.trigger_halt = false;
        match self.execute(&di) {
            Ok(completion) => {
                self.consecutive_illegal = 0;
                let outcome = match completion {
                    Completion::Retired => StepOutcome::Retired,
                    Completion::Builtin(id) => StepOutcome::Builtin(id),
                    Completion::Finished => StepOutcome::Finished,
                    Completion::DebugHalt => {
                        self.age_forced_fault();
                        return Ok(StepOutcome::DebugHalt);
                    }
                };
                if self.config.load_queue_enabled {
                    self.commit_load_queue(&di);
                }
                self.counters
                    .increment_instret(self.control.mcountinhibit.ir());
                self.debug.triggers.count_retired(privilege, self.status.mie());
                self.age_forced_fault();
                if self.debug.step() {
                    self.debug.enter(DebugCause::Step, self.registers.pc(), self.privilege);
                }
                Ok(outcome)
            }
            Err(exception) => {
                self.set_pc(pc);
                if exception.cause == ExceptionCause::IllegalInstruction {
                    self.consecutive_illegal += 1;
                    if self.consecutive_illegal > self.config.max_consecutive_illegal {
                        let count = self.consecutive_illegal;
                        error!(
                            "Stopping after {count} consecutive illegal instructions at {pc:#x}"
                        );
                        return Err(RunError::ConsecutiveIllegal { count, pc });
                    }
                } else {
                    self.consecutive_illegal = 0;
                }
                self.age_forced_fault();
                if std::mem::take(&mut self.trigger_halt) {
                    return Ok(self.take_trigger_action(TriggerAction::EnterDebug, pc));
                }
                self.take_trap(exception.into());
                if self.debug.step() {
                    self.debug.enter(DebugCause::Step, self.registers.pc(), self.privilege);
                }
                Ok(StepOutcome::Exception(exception))
            }
        }
    }

    /// Acts on a trigger that fired for the instruction at `pc`: either halts in debug mode with
    /// dpc at `pc`, or raises a breakpoint exception whose trap value is `pc`.
    fn take_trigger_action(&mut self, action: TriggerAction, pc: u64) -> StepOutcome {
        match action {
            TriggerAction::EnterDebug => {
                debug!("Trigger halted the hart at {pc:#x}");
                self.debug.enter(DebugCause::Trigger, pc, self.privilege);
                StepOutcome::DebugHalt
            }
            TriggerAction::Breakpoint => {
                let exception = Exception::new(ExceptionCause::Breakpoint, pc)
                    .with_secondary(SecondaryCause::TriggerHit);
                self.take_trap(exception.into());
                if self.debug.step() {
                    self.debug.enter(DebugCause::Step, self.registers.pc(), self.privilege);
                }
                StepOutcome::Exception(exception)
            }
        }
    }

    /// Steps until the program finishes, a builtin call needs servicing, `limit` steps have been
    /// taken, or `cancel` is set.
    pub fn run(&mut self, limit: Option<u64>, cancel: &CancelToken) -> Result<RunStatus, RunError> {
        let mut steps = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Ok(RunStatus::Cancelled);
            }
            if limit.is_some_and(|limit| steps >= limit) {
                return Ok(RunStatus::LimitReached);
            }
            steps += 1;
            match self.step()? {
                StepOutcome::Finished => return Ok(RunStatus::Finished),
                StepOutcome::Builtin(id) => return Ok(RunStatus::BuiltinCall(id)),
                StepOutcome::DebugHalt => return Ok(RunStatus::DebugHalt),
                StepOutcome::Retired
                | StepOutcome::Exception(_)
                | StepOutcome::Interrupt(_)
                | StepOutcome::Nmi(_) => {}
            }
        }
    }

    /// Drives an interrupt line. Returns `false` if the interrupt is not implemented.
    pub fn set_interrupt_pending(&mut self, cause: InterruptCause, pending: bool) -> bool {
        self.interrupts.set_pending(cause, pending)
    }

    /// Makes an NMI pending. It is delivered at the next instruction boundary, ahead of any
    /// interrupt. While one NMI is pending, later ones are dropped.
    pub fn set_pending_nmi(&mut self, cause: NmiCause) {
        if self.pending_nmi.is_none() {
            self.pending_nmi = Some(cause);
        }
        self.debug.set_nmip(true);
    }

    pub fn pending_nmi(&self) -> Option<NmiCause> {
        self.pending_nmi
    }

    /// Makes the next data access fail with an access fault carrying `secondary` as secondary
    /// cause and the access address plus `offset` as trap value.
    ///
    /// The fault is one-shot. If no data access consumes it by the instruction after next, it is
    /// dropped with a warning.
    pub fn post_data_access_fault(&mut self, offset: u64, secondary: SecondaryCause) {
        self.forced_data_fault = Some(ForcedFault {
            offset,
            secondary,
            posted_at: self.counters.cycles(),
        });
    }

    /// Makes the next instruction fetch fail with an access fault whose trap value is the pc plus
    /// `offset`.
    pub fn post_inst_access_fault(&mut self, offset: u64) {
        self.forced_fetch_fault = Some(offset);
    }

    /// Handles a bus error report for the load tagged `tag`.
    ///
    /// The address is latched in MDSEAC (unless already locked) and a load-exception NMI is made
    /// pending. With load-error rollback enabled the destination register of the matching load
    /// is reverted; a report matching zero or several loads is returned as an error and changes
    /// no register.
    pub fn apply_load_exception(&mut self, address: u64, tag: u64) -> Result<(), LoadQueueError> {
        if self.latch_mdseac(address) {
            self.set_pending_nmi(NmiCause::LoadException);
        }
        if !self.config.load_error_rollback {
            return Ok(());
        }
        if let Some(revert) = self.load_queue.apply_load_exception(address, tag)? {
            let register = Specifier::from_u5(revert.register);
            trace!("Reverting {register} to {:#x} after load error at {address:#x}", revert.value);
            if revert.fp {
                self.fregs.set_raw(register, revert.value);
            } else {
                self.registers.set_x(register, self.xlen.canonical(revert.value));
                if revert.wide {
                    self.mdbhd = revert.value >> 32;
                }
            }
        }
        Ok(())
    }

    /// Handles a bus error report for a store: latches MDSEAC (unless already locked) and makes
    /// a store-exception NMI pending.
    pub fn apply_store_exception(&mut self, address: u64) {
        if self.latch_mdseac(address) {
            self.set_pending_nmi(NmiCause::StoreException);
        }
    }

    /// Handles the completion report of the load tagged `tag`.
    pub fn apply_load_finished(&mut self, address: u64, tag: u64) {
        if self.config.load_error_rollback {
            self.load_queue.apply_load_finished(address, tag);
        }
    }

    fn latch_mdseac(&mut self, address: u64) -> bool {
        if self.mdseac_locked {
            return false;
        }
        self.mdseac = self.xlen.address(address);
        self.mdseac_locked = true;
        true
    }

    /// Drops a forced data fault that no access consumed within two steps.
    fn age_forced_fault(&mut self) {
        if let Some(fault) = self.forced_data_fault {
            if self.counters.cycles() > fault.posted_at + 1 {
                self.discard_forced_fault();
            }
        }
    }

    fn discard_forced_fault(&mut self) {
        if self.forced_data_fault.take().is_some() {
            warn!("Spurious exception command from test-bench.");
        }
    }

    /// Updates the load queue after `di` retired: a register read as a source must have finished
    /// loading, and a register overwritten by a non-load can no longer be reverted. Loads and
    /// atomics handle their own operands.
    fn commit_load_queue(&mut self, di: &DecodedInstruction) {
        let descriptor = di.descriptor();
        if descriptor.is_load() || descriptor.is_atomic() {
            return;
        }
        let registers = descriptor
            .operands()
            .iter()
            .enumerate()
            .filter_map(|(i, operand)| {
                let fp = match operand.kind {
                    OperandType::IntReg => false,
                    OperandType::FpReg => true,
                    _ => return None,
                };
                Some((di.op(i) as u8, fp, *operand))
            });
        for (register, fp, operand) in registers {
            if operand.is_read() {
                self.load_queue.remove(register, fp);
            }
            if operand.is_write() {
                self.load_queue.invalidate(register, fp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::InterruptCause;
    use crate::csr;
    use crate::memory::Memory;

    const ADDI_X0: u32 = 0x0000_0013;

    fn hart_with(program: &[u32], config: Config) -> Hart<Memory> {
        let mut memory = Memory::new(0x1_0000);
        for (i, word) in program.iter().enumerate() {
            memory.write_u32(i as u64 * 4, *word).unwrap();
        }
        Hart::new(memory, config)
    }

    fn hart(program: &[u32]) -> Hart<Memory> {
        hart_with(program, Config::default())
    }

    #[test]
    fn nop_only_advances_pc() {
        let mut hart = hart(&[ADDI_X0]);
        let before: Vec<u64> = Specifier::iter_all().map(|r| hart.registers().x(r)).collect();
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert_eq!(hart.pc(), 4);
        let after: Vec<u64> = Specifier::iter_all().map(|r| hart.registers().x(r)).collect();
        assert_eq!(before, after);
        assert_eq!(hart.retired(), 1);
    }

    #[test]
    fn builtin_zero_finishes_run() {
        // lui t0, 0x40000; jalr ra, 0(t0)
        let mut hart = hart(&[0x4000_02b7, 0x0002_80e7]);
        let before = hart.bus().as_slice().to_vec();
        assert_eq!(hart.run(None, &CancelToken::new()), Ok(RunStatus::Finished));
        assert_eq!(hart.bus().as_slice(), &before[..]);
    }

    #[test]
    fn builtin_call_resumes_at_return_address() {
        // lui t0, 0x40000; addi t0, t0, 5; jalr ra, 0(t0); addi x0, x0, 0
        let mut hart = hart(&[0x4000_02b7, 0x0052_8293, 0x0002_80e7, ADDI_X0]);
        assert_eq!(hart.run(None, &CancelToken::new()), Ok(RunStatus::BuiltinCall(5)));
        assert_eq!(hart.pc(), 12);
        assert_eq!(hart.registers().x(Specifier::RA), 12);
    }

    #[test]
    fn limit_and_cancellation() {
        let mut hart = hart(&[ADDI_X0; 16]);
        assert_eq!(hart.run(Some(3), &CancelToken::new()), Ok(RunStatus::LimitReached));
        assert_eq!(hart.pc(), 12);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(hart.run(None, &cancel), Ok(RunStatus::Cancelled));
        assert_eq!(hart.pc(), 12);
    }

    #[test]
    fn illegal_instruction_traps_without_side_effects() {
        let mut hart = hart(&[0xffff_ffff]);
        hart.write_csr(csr::MTVEC, 0x100, u64::MAX).unwrap();
        let outcome = hart.step().unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Exception(Exception::illegal_instruction(0xffff_ffff))
        );
        assert_eq!(hart.pc(), 0x100);
        assert_eq!(hart.read_csr(csr::MEPC), Ok(0));
        assert_eq!(hart.read_csr(csr::MCAUSE), Ok(2));
        assert_eq!(hart.read_csr(csr::MTVAL), Ok(0xffff_ffff));
        assert_eq!(hart.retired(), 0);
    }

    #[test]
    fn consecutive_illegal_watchdog() {
        // Illegal instructions everywhere, trap handler at 0: an endless trap loop.
        let mut hart = hart_with(
            &[0],
            Config {
                max_consecutive_illegal: 3,
                extensions: Extensions {
                    c: false,
                    ..Extensions::all()
                },
                ..Config::default()
            },
        );
        let result = hart.run(Some(100), &CancelToken::new());
        assert_eq!(result, Err(RunError::ConsecutiveIllegal { count: 4, pc: 0 }));
    }

    #[test]
    fn nmi_preempts_interrupts() {
        let mut hart = hart_with(
            &[ADDI_X0; 4],
            Config {
                nmi_pc: 0x8,
                ..Config::default()
            },
        );
        hart.write_csr(csr::MIE, u64::MAX, u64::MAX).unwrap();
        hart.write_csr(csr::MSTATUS, 0b1000, 0b1000).unwrap();
        hart.set_interrupt_pending(InterruptCause::MachineTimer, true);
        hart.set_pending_nmi(NmiCause::DoubleBitEcc);
        hart.set_pending_nmi(NmiCause::Unknown);
        assert_eq!(hart.step(), Ok(StepOutcome::Nmi(NmiCause::DoubleBitEcc)));
        assert_eq!(hart.pc(), 0x8);
        assert_eq!(hart.read_csr(csr::MCAUSE), Ok(NmiCause::DoubleBitEcc.code()));
        assert_eq!(hart.read_csr(csr::MSCAUSE), Ok(0));
        // MIE was cleared on entry, so the timer interrupt stays pending.
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
    }

    #[test]
    fn forced_data_fault_is_consumed_or_dropped() {
        // lw t0, 0x100(x0)
        let lw = 0x1000_2283;
        let mut hart = hart(&[lw, lw, ADDI_X0, ADDI_X0, ADDI_X0]);
        hart.write_csr(csr::MTVEC, 0x8, u64::MAX).unwrap();
        hart.post_data_access_fault(2, SecondaryCause::DoubleEcc);
        let outcome = hart.step().unwrap();
        let StepOutcome::Exception(exception) = outcome else {
            panic!("expected an exception, got {outcome:?}");
        };
        assert_eq!(exception.cause, ExceptionCause::LoadAccessFault);
        assert_eq!(exception.secondary, SecondaryCause::DoubleEcc);
        assert_eq!(exception.tval, 0x102);

        hart.post_data_access_fault(0, SecondaryCause::DoubleEcc);
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert!(hart.forced_data_fault.is_none());
    }

    #[test]
    fn forced_data_fault_dies_with_an_nmi() {
        // lw t0, 0x100(x0)
        let lw = 0x1000_2283;
        let mut hart = hart(&[lw, ADDI_X0, ADDI_X0]);
        hart.post_data_access_fault(0, SecondaryCause::DoubleEcc);
        hart.set_pending_nmi(NmiCause::Unknown);
        assert_eq!(hart.step(), Ok(StepOutcome::Nmi(NmiCause::Unknown)));
        assert!(hart.forced_data_fault.is_none());
    }

    #[test]
    fn forced_data_fault_dies_with_an_interrupt() {
        // lw t0, 0x100(x0)
        let lw = 0x1000_2283;
        let mut hart = hart(&[lw, ADDI_X0, ADDI_X0]);
        hart.write_csr(csr::MTVEC, 0x4, u64::MAX).unwrap();
        hart.write_csr(csr::MIE, u64::MAX, u64::MAX).unwrap();
        enable_machine_interrupts(&mut hart);
        hart.post_data_access_fault(0, SecondaryCause::DoubleEcc);
        hart.set_interrupt_pending(InterruptCause::MachineSoftware, true);
        assert_eq!(hart.step(), Ok(StepOutcome::Interrupt(InterruptCause::MachineSoftware)));
        assert!(hart.forced_data_fault.is_none());
        hart.set_interrupt_pending(InterruptCause::MachineSoftware, false);
        hart.set_pc(0);
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
    }

    #[test]
    fn forced_fetch_fault() {
        let mut hart = hart(&[ADDI_X0; 4]);
        hart.post_inst_access_fault(2);
        let outcome = hart.step().unwrap();
        let StepOutcome::Exception(exception) = outcome else {
            panic!("expected an exception, got {outcome:?}");
        };
        assert_eq!(exception.cause, ExceptionCause::InstructionAccessFault);
        assert_eq!(exception.tval, 2);
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
    }

    #[test]
    fn load_exception_reverts_destination() {
        let mut config = Config {
            load_queue_enabled: true,
            load_error_rollback: true,
            ..Config::default()
        };
        // Local memory at the bottom makes the code region non-external; the data at 0x8000 is
        // external.
        config
            .regions
            .local_memory
            .push(crate::address_range![0x0, 0xfff]);
        // addi t0, x0, 7; lw t0, 0(t1) with t1 = 0x8000 set below; addi x0, x0, 0
        let mut hart = hart_with(&[0x0070_0293, 0x0003_2283, ADDI_X0], config);
        hart.registers_mut().set_x(Specifier::new(6).unwrap(), 0x8000);
        hart.bus_mut().write_u32(0x8000, 0xdead).unwrap();
        hart.step().unwrap();
        hart.step().unwrap();
        let t0 = Specifier::new(5).unwrap();
        assert_eq!(hart.registers().x(t0), 0xdead);
        let tag = hart.load_queue().entries()[0].tag;
        hart.apply_load_exception(0x8000, tag).unwrap();
        assert_eq!(hart.registers().x(t0), 7);
        assert_eq!(hart.pending_nmi(), Some(NmiCause::LoadException));
        assert_eq!(hart.read_csr(csr::MDSEAC), Ok(0x8000));
        assert!(hart.apply_load_exception(0x8000, tag).is_err());
    }

    #[test]
    fn debug_step_halts_after_one_instruction() {
        let mut hart = hart(&[ADDI_X0; 4]);
        hart.debug.write_dcsr(1 << 2, 1 << 2);
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert!(hart.is_debug_mode());
        assert_eq!(hart.step(), Ok(StepOutcome::DebugHalt));
        hart.exit_debug_mode();
        assert_eq!(hart.pc(), 4);
    }

    #[test]
    fn misaligned_load_across_regions_faults() {
        let mut config = Config::default();
        config.regions.idempotent[1] = false;
        let mut memory = Memory::new(0x1000_0004);
        // lui x1, 0x10000; lw x2, -2(x1)
        memory.write_u32(0, 0x1000_00b7).unwrap();
        memory.write_u32(4, 0xffe0_a103).unwrap();
        let mut hart = Hart::new(memory, config);
        let x2 = Specifier::new(2).unwrap();
        hart.registers_mut().set_x(x2, 0x55);
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        let outcome = hart.step().unwrap();
        let StepOutcome::Exception(exception) = outcome else {
            panic!("expected an exception, got {outcome:?}");
        };
        assert_eq!(exception.cause, ExceptionCause::LoadAccessFault);
        assert_eq!(exception.secondary, SecondaryCause::MisalRegionCross);
        assert_eq!(exception.tval, 0x0fff_fffe);
        assert_eq!(hart.registers().x(x2), 0x55);
        assert_eq!(hart.read_csr(csr::MEPC), Ok(4));
    }

    const MCONTROL: u64 = 2 << 28;
    const MCONTROL_M: u64 = 1 << 6;

    fn trigger_breakpoint(tval: u64) -> StepOutcome {
        let exception = Exception::new(ExceptionCause::Breakpoint, tval);
        StepOutcome::Exception(exception.with_secondary(SecondaryCause::TriggerHit))
    }

    fn enable_machine_interrupts(hart: &mut Hart<Memory>) {
        hart.write_csr(csr::MSTATUS, 0b1000, 0b1000).unwrap();
    }

    #[test]
    fn execute_trigger_breaks_before_the_instruction() {
        let mut hart = hart(&[ADDI_X0; 4]);
        hart.write_csr(csr::MTVEC, 0x100, u64::MAX).unwrap();
        hart.write_csr(csr::TDATA2, 4, u64::MAX).unwrap();
        hart.write_csr(csr::TDATA1, MCONTROL | MCONTROL_M | 1 << 2, u64::MAX).unwrap();
        enable_machine_interrupts(&mut hart);
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert_eq!(hart.step(), Ok(trigger_breakpoint(4)));
        assert_eq!(hart.pc(), 0x100);
        assert_eq!(hart.read_csr(csr::MEPC), Ok(4));
        assert_eq!(hart.read_csr(csr::MCAUSE), Ok(3));
        assert_eq!(hart.retired(), 1);
        assert_ne!(hart.read_csr(csr::TDATA1).unwrap() & 1 << 20, 0);
    }

    #[test]
    fn machine_breakpoint_triggers_wait_for_mie() {
        let mut hart = hart(&[ADDI_X0; 4]);
        hart.write_csr(csr::TDATA2, 0, u64::MAX).unwrap();
        hart.write_csr(csr::TDATA1, MCONTROL | MCONTROL_M | 1 << 2, u64::MAX).unwrap();
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert_eq!(hart.read_csr(csr::TDATA1).unwrap() & 1 << 20, 0);
    }

    #[test]
    fn store_trigger_suppresses_the_store() {
        // addi t0, x0, 7; sw t0, 0x200(x0)
        let mut hart = hart(&[0x0070_0293, 0x2050_2023]);
        hart.write_csr(csr::TDATA2, 0x200, u64::MAX).unwrap();
        hart.write_csr(csr::TDATA1, MCONTROL | MCONTROL_M | 1 << 1, u64::MAX).unwrap();
        enable_machine_interrupts(&mut hart);
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert_eq!(hart.step(), Ok(trigger_breakpoint(0x200)));
        assert_eq!(hart.read_csr(csr::MEPC), Ok(4));
        assert_eq!(hart.read_csr(csr::MSCAUSE), Ok(1));
        assert_eq!(hart.bus().read_u32(0x200), Ok(0));
    }

    #[test]
    fn load_trigger_takes_priority_over_misalignment() {
        // lw t0, 0x101(x0)
        let mut hart = hart_with(
            &[0x1010_2283],
            Config {
                misaligned_data: false,
                ..Config::default()
            },
        );
        hart.write_csr(csr::TDATA2, 0x100, u64::MAX).unwrap();
        // Load, match when the address is at least tdata2.
        hart.write_csr(csr::TDATA1, MCONTROL | MCONTROL_M | 2 << 7 | 1, u64::MAX).unwrap();
        enable_machine_interrupts(&mut hart);
        assert_eq!(hart.step(), Ok(trigger_breakpoint(0x101)));
    }

    #[test]
    fn debugger_trigger_halts_the_hart() {
        let mut hart = hart(&[ADDI_X0; 4]);
        // Only the debugger can hand a trigger the debug-mode action.
        hart.debug.enter(DebugCause::HaltRequest, 0, PrivilegeLevel::Machine);
        hart.write_csr(csr::TDATA2, 0, u64::MAX).unwrap();
        hart.write_csr(csr::TDATA1, MCONTROL | 1 << 27 | 1 << 12 | MCONTROL_M | 1 << 2, u64::MAX)
            .unwrap();
        hart.exit_debug_mode();

        assert_eq!(hart.step(), Ok(StepOutcome::DebugHalt));
        assert!(hart.is_debug_mode());
        assert_eq!(hart.read_csr(csr::DCSR).unwrap() >> 6 & 0b111, DebugCause::Trigger as u64);
        assert_eq!(hart.read_csr(csr::DPC), Ok(0));
        assert_eq!(hart.retired(), 0);
        // Outside debug mode the trigger cannot be reprogrammed.
        hart.exit_debug_mode();
        hart.write_csr(csr::TDATA1, 0, u64::MAX).unwrap();
        assert_ne!(hart.read_csr(csr::TDATA1).unwrap() & 1 << 27, 0);
    }

    #[test]
    fn debugger_data_trigger_halts_at_the_access() {
        // addi t0, x0, 7; sw t0, 0x200(x0)
        let mut hart = hart(&[0x0070_0293, 0x2050_2023]);
        hart.debug.enter(DebugCause::HaltRequest, 0, PrivilegeLevel::Machine);
        hart.write_csr(csr::TDATA2, 0x200, u64::MAX).unwrap();
        hart.write_csr(csr::TDATA1, MCONTROL | 1 << 27 | 1 << 12 | MCONTROL_M | 1 << 1, u64::MAX)
            .unwrap();
        hart.exit_debug_mode();

        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert_eq!(hart.step(), Ok(StepOutcome::DebugHalt));
        assert_eq!(hart.read_csr(csr::DPC), Ok(4));
        assert_eq!(hart.bus().read_u32(0x200), Ok(0));
        assert!(!hart.trigger_halt);
    }

    #[test]
    fn icount_trigger_breaks_after_the_count() {
        let mut hart = hart(&[ADDI_X0; 4]);
        hart.write_csr(csr::MTVEC, 0x100, u64::MAX).unwrap();
        // icount, count 2, M-mode.
        hart.write_csr(csr::TDATA1, 3 << 28 | 2 << 10 | 1 << 9, u64::MAX).unwrap();
        enable_machine_interrupts(&mut hart);
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert_eq!(hart.step(), Ok(StepOutcome::Retired));
        assert_eq!(hart.step(), Ok(trigger_breakpoint(8)));
        assert_eq!(hart.read_csr(csr::MEPC), Ok(8));
        assert_eq!(hart.retired(), 2);
    }
}
