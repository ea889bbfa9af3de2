//! Builtin dispatch: running simulated code that calls out into host logic.
//!
//! Simulated code calls a builtin by jumping through `jalr` to an address with the builtin bit
//! set (see [`Config::builtin_bit`]). The remaining address bits are the builtin id, which the
//! host interprets against its own dispatch table. Id `0` means the program has finished; a
//! program started through [`BuiltinHost::run`] returns there because its initial `ra` holds
//! exactly that encoding.
//!
//! Arguments follow the integer calling convention: the first eight are in `a0`-`a7`, further
//! ones are words on the stack. Results go into `a0` and `a1`.
//!
//! [`Config::builtin_bit`]: crate::hart::Config::builtin_bit

use log::{debug, trace};
use thiserror::Error;

use crate::hart::{CancelToken, Hart, RunError, RunStatus};
use crate::memory::{Bus, MemoryError};
use crate::registers::Specifier;

/// Number of arguments passed in registers.
pub const REGISTER_ARGS: usize = 8;

/// Error type returned by builtin handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Where code and the local (stack) memory live in the flat memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BuiltinLayout {
    pub code_base: u64,
    pub code_size: u64,
    pub local_base: u64,
    pub local_size: u64,
}

impl BuiltinLayout {
    pub fn code_contains(&self, address: u64, size: u64) -> bool {
        address >= self.code_base
            && address
                .checked_add(size)
                .is_some_and(|end| end <= self.code_base + self.code_size)
    }

    /// Initial stack pointer: the last word of the local memory.
    pub fn initial_sp(&self) -> u64 {
        self.local_base + self.local_size - 4
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum LayoutError {
    #[error("code region {base:#x}+{size:#x} does not fit in {memory:#x} bytes of memory")]
    CodeOutOfMemory { base: u64, size: u64, memory: u64 },
    #[error("local region {base:#x}+{size:#x} does not fit in {memory:#x} bytes of memory")]
    LocalOutOfMemory { base: u64, size: u64, memory: u64 },
    #[error("local region must hold at least one word")]
    LocalTooSmall,
    #[error("no memory layout has been set")]
    NoLayout,
    #[error("code write of {size} bytes at {address:#x} falls outside the code region")]
    CodeWriteOutOfRange { address: u64, size: u64 },
    #[error("start pc {0:#x} is outside the code region")]
    StartOutsideCode(u64),
}

#[derive(Error, Debug)]
pub enum BuiltinError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("builtin {0} was called but no handler is installed")]
    NoHandler(u64),
    #[error("builtin {id} failed")]
    Handler {
        id: u64,
        #[source]
        source: HandlerError,
    },
}

/// Host logic servicing builtin calls.
///
/// The handler runs between two instructions. It may read and write the hart's registers and
/// memory, but must not step the hart.
pub trait BuiltinHandler<B: Bus> {
    fn call(&mut self, hart: &mut Hart<B>, id: u64) -> Result<(), HandlerError>;
}

impl<B, F> BuiltinHandler<B> for F
where
    B: Bus,
    F: FnMut(&mut Hart<B>, u64) -> Result<(), HandlerError>,
{
    fn call(&mut self, hart: &mut Hart<B>, id: u64) -> Result<(), HandlerError> {
        self(hart, id)
    }
}

/// A hart together with its builtin memory layout and handler.
pub struct BuiltinHost<B: Bus> {
    hart: Hart<B>,
    layout: Option<BuiltinLayout>,
    handler: Option<Box<dyn BuiltinHandler<B>>>,
}

impl<B: Bus> std::fmt::Debug for BuiltinHost<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinHost")
            .field("hart", &self.hart)
            .field("layout", &self.layout)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl<B: Bus> BuiltinHost<B> {
    pub fn new(hart: Hart<B>) -> Self {
        Self {
            hart,
            layout: None,
            handler: None,
        }
    }

    pub fn hart(&self) -> &Hart<B> {
        &self.hart
    }

    pub fn hart_mut(&mut self) -> &mut Hart<B> {
        &mut self.hart
    }

    pub fn into_hart(self) -> Hart<B> {
        self.hart
    }

    pub fn layout(&self) -> Option<BuiltinLayout> {
        self.layout
    }

    /// Sets the code and local memory regions. Both must lie within memory.
    pub fn set_memory_layout(&mut self, layout: BuiltinLayout) -> Result<(), LayoutError> {
        let memory = self.hart.bus().size();
        if !self.hart.bus().contains(layout.code_base, layout.code_size) {
            return Err(LayoutError::CodeOutOfMemory {
                base: layout.code_base,
                size: layout.code_size,
                memory,
            });
        }
        if !self.hart.bus().contains(layout.local_base, layout.local_size) {
            return Err(LayoutError::LocalOutOfMemory {
                base: layout.local_base,
                size: layout.local_size,
                memory,
            });
        }
        if layout.local_size < 4 {
            return Err(LayoutError::LocalTooSmall);
        }
        debug!(
            "Builtin layout: code {:#x}+{:#x}, local {:#x}+{:#x}",
            layout.code_base, layout.code_size, layout.local_base, layout.local_size
        );
        self.layout = Some(layout);
        Ok(())
    }

    pub fn set_handler(&mut self, handler: impl BuiltinHandler<B> + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Copies `bytes` into the code region at `address`, dropping stale decodes of that range.
    pub fn write_code(&mut self, address: u64, bytes: &[u8]) -> Result<(), LayoutError> {
        let layout = self.layout.ok_or(LayoutError::NoLayout)?;
        let size = bytes.len() as u64;
        let out_of_range = || LayoutError::CodeWriteOutOfRange { address, size };
        if !layout.code_contains(address, size) {
            return Err(out_of_range());
        }
        self.hart
            .bus_mut()
            .write(address, bytes)
            .map_err(|_| out_of_range())?;
        self.hart.invalidate_decode_cache(address, size);
        Ok(())
    }

    /// Starts the program at `start_pc` and runs it until it finishes, servicing builtin calls
    /// along the way.
    ///
    /// The stack pointer is set to the top word of local memory and `ra` to the finishing builtin,
    /// so that returning from the entry function ends the run.
    pub fn run(
        &mut self,
        start_pc: u64,
        limit: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<RunStatus, BuiltinError> {
        let layout = self.layout.ok_or(LayoutError::NoLayout)?;
        if !layout.code_contains(start_pc, 2) {
            return Err(LayoutError::StartOutsideCode(start_pc).into());
        }
        let xlen = self.hart.xlen();
        let finish = self
            .hart
            .config()
            .builtin_bit
            .map_or(0, |bit| xlen.canonical(1 << bit));
        let registers = self.hart.registers_mut();
        registers.set_x(Specifier::SP, xlen.canonical(layout.initial_sp()));
        registers.set_x(Specifier::RA, finish);
        self.hart.set_pc(start_pc);
        self.hart.flush_decode_cache();
        debug!("Starting at {start_pc:#x}");
        self.resume(limit, cancel)
    }

    /// Continues a run that stopped on the step limit or on cancellation.
    ///
    /// `limit` bounds the number of steps taken by this call, builtin calls included.
    pub fn resume(
        &mut self,
        limit: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<RunStatus, BuiltinError> {
        let start = self.hart.cycles();
        loop {
            let remaining = limit.map(|limit| limit.saturating_sub(self.hart.cycles() - start));
            match self.hart.run(remaining, cancel)? {
                RunStatus::BuiltinCall(id) => {
                    let handler = self.handler.as_mut().ok_or(BuiltinError::NoHandler(id))?;
                    trace!("Dispatching builtin {id}");
                    handler
                        .call(&mut self.hart, id)
                        .map_err(|source| BuiltinError::Handler { id, source })?;
                }
                status => return Ok(status),
            }
        }
    }
}

impl<B: Bus> Hart<B> {
    /// Reads builtin argument `index`.
    ///
    /// Arguments `0..8` are `a0`-`a7`. Later ones are words on the stack, argument 8 at `sp`.
    pub fn get_arg(&self, index: usize) -> Result<u64, MemoryError> {
        if index < REGISTER_ARGS {
            let register = Specifier::from_u5(u8::from(Specifier::A0) + index as u8);
            return Ok(self.registers().x(register));
        }
        let sp = self.registers().x(Specifier::SP);
        let address = self.xlen().address(sp.wrapping_add(4 * (index - REGISTER_ARGS) as u64));
        let word = self.bus().read_u32(address)?;
        Ok(self.xlen().canonical(u64::from(word)))
    }

    /// Writes builtin return value `index`, which must be `0` (`a0`) or `1` (`a1`).
    pub fn set_ret(&mut self, index: usize, value: u64) {
        let register = match index {
            0 => Specifier::A0,
            1 => Specifier::A1,
            _ => panic!("builtin return value {index} does not exist"),
        };
        let value = self.xlen().canonical(value);
        self.registers_mut().set_x(register, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hart::Config;
    use crate::memory::Memory;

    const LAYOUT: BuiltinLayout = BuiltinLayout {
        code_base: 0x100,
        code_size: 0x100,
        local_base: 0x8000,
        local_size: 0x1000,
    };

    fn host() -> BuiltinHost<Memory> {
        let mut host = BuiltinHost::new(Hart::new(Memory::new(0x1_0000), Config::default()));
        host.set_memory_layout(LAYOUT).unwrap();
        host
    }

    fn code(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn layout_must_fit_in_memory() {
        let mut host = BuiltinHost::new(Hart::new(Memory::new(0x1000), Config::default()));
        let layout = BuiltinLayout {
            local_base: 0xf00,
            local_size: 0x200,
            ..LAYOUT
        };
        assert!(matches!(
            host.set_memory_layout(layout),
            Err(LayoutError::LocalOutOfMemory { .. })
        ));
        assert_eq!(host.layout(), None);
        assert_eq!(host.write_code(0x100, &[0]), Err(LayoutError::NoLayout));
    }

    #[test]
    fn code_writes_stay_in_the_code_region() {
        let mut host = host();
        assert_eq!(
            host.write_code(0x1fe, &[0; 4]),
            Err(LayoutError::CodeWriteOutOfRange {
                address: 0x1fe,
                size: 4
            })
        );
        host.write_code(0x1fc, &[1, 2, 3, 4]).unwrap();
        assert_eq!(host.hart().bus().read_u32(0x1fc), Ok(0x0403_0201));
    }

    #[test]
    fn returning_from_entry_finishes() {
        let mut host = host();
        // ret
        host.write_code(0x100, &code(&[0x0000_8067])).unwrap();
        let status = host.run(0x100, None, &CancelToken::new()).unwrap();
        assert_eq!(status, RunStatus::Finished);
        assert_eq!(host.hart().registers().x(Specifier::SP), 0x8ffc);
    }

    #[test]
    fn handler_sees_arguments_and_sets_results() {
        let mut host = host();
        let program = [
            0x0070_0513, // addi a0, x0, 7
            0x4000_02b7, // lui t0, 0x40000
            0x0032_8293, // addi t0, t0, 3
            0x0002_80e7, // jalr ra, 0(t0)
            0x0015_0513, // addi a0, a0, 1
            0x4000_02b7, // lui t0, 0x40000
            0x0002_8067, // jalr x0, 0(t0)
        ];
        host.write_code(0x100, &code(&program)).unwrap();
        host.set_handler(|hart: &mut Hart<Memory>, id: u64| -> Result<(), HandlerError> {
            assert_eq!(id, 3);
            let arg = hart.get_arg(0)?;
            hart.set_ret(0, arg * 10);
            Ok(())
        });
        let status = host.run(0x100, None, &CancelToken::new()).unwrap();
        assert_eq!(status, RunStatus::Finished);
        assert_eq!(host.hart().registers().x(Specifier::A0), 71);
    }

    #[test]
    fn missing_handler_and_failing_handler_are_errors() {
        let mut host = host();
        // lui t0, 0x40000; addi t0, t0, 9; jalr ra, 0(t0)
        host.write_code(0x100, &code(&[0x4000_02b7, 0x0092_8293, 0x0002_80e7]))
            .unwrap();
        let cancel = CancelToken::new();
        assert!(matches!(
            host.run(0x100, None, &cancel),
            Err(BuiltinError::NoHandler(9))
        ));
        host.set_handler(|_: &mut Hart<Memory>, _: u64| -> Result<(), HandlerError> {
            Err("unsupported".into())
        });
        let error = host.run(0x100, None, &cancel).unwrap_err();
        assert!(matches!(error, BuiltinError::Handler { id: 9, .. }));
    }

    #[test]
    fn start_pc_must_be_in_code() {
        let mut host = host();
        let error = host.run(0x200, None, &CancelToken::new()).unwrap_err();
        assert!(matches!(
            error,
            BuiltinError::Layout(LayoutError::StartOutsideCode(0x200))
        ));
    }

    #[test]
    fn limit_spans_builtin_calls() {
        let mut host = host();
        // lui t0, 0x40000; addi t0, t0, 1; jalr ra, 0(t0); j 0
        let program = [0x4000_02b7, 0x0012_8293, 0x0002_80e7, 0x0000_006f];
        host.write_code(0x100, &code(&program)).unwrap();
        host.set_handler(|_: &mut Hart<Memory>, _: u64| -> Result<(), HandlerError> { Ok(()) });
        let status = host.run(0x100, Some(10), &CancelToken::new()).unwrap();
        assert_eq!(status, RunStatus::LimitReached);
        assert_eq!(host.hart().cycles(), 10);
    }

    #[test]
    fn stack_arguments_follow_register_arguments() {
        let mut hart = Hart::new(Memory::new(0x1000), Config::default());
        hart.registers_mut().set_x(Specifier::from_u5(17), 77);
        hart.registers_mut().set_x(Specifier::SP, 0x800);
        hart.bus_mut().write_u32(0x800, 8).unwrap();
        hart.bus_mut().write_u32(0x804, 0xffff_fff7).unwrap();
        assert_eq!(hart.get_arg(7), Ok(77));
        assert_eq!(hart.get_arg(8), Ok(8));
        assert_eq!(hart.get_arg(9), Ok(0xffff_ffff_ffff_fff7));
        hart.set_ret(1, 5);
        assert_eq!(hart.registers().x(Specifier::A1), 5);
    }

    #[test]
    #[should_panic(expected = "builtin return value 2 does not exist")]
    fn only_two_return_values() {
        let mut hart = Hart::new(Memory::new(0x100), Config::default());
        hart.set_ret(2, 0);
    }
}
