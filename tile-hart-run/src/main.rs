use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use log::{debug, info, warn};
use stderrlog::LogLevelNum;
use tile_hart_core::builtin::{BuiltinHost, BuiltinLayout, HandlerError};
use tile_hart_core::hart::{CancelToken, Config, Hart, RunStatus};
use tile_hart_core::memory::{Bus, Memory};
use tile_hart_core::Xlen;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Program to execute, an ELF file or a raw binary.
    binary: PathBuf,
    /// Load the file as a raw binary at the code base instead of parsing it as ELF.
    #[arg(long)]
    raw: bool,
    /// Simulate an RV64 hart instead of RV32.
    #[arg(long)]
    rv64: bool,
    /// Maximum number of steps to run.
    #[arg(long)]
    limit: Option<u64>,
    /// Stop the simulation after this many seconds of wall-clock time.
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long, default_value_t = 0x10_0000, value_parser = parse_number)]
    mem_size: u64,
    #[arg(long, default_value_t = 0, value_parser = parse_number)]
    code_base: u64,
    /// Size of the code region. Defaults to everything up to the local memory.
    #[arg(long, value_parser = parse_number)]
    code_size: Option<u64>,
    #[arg(long, default_value_t = 0xf_0000, value_parser = parse_number)]
    local_base: u64,
    #[arg(long, default_value_t = 0x1_0000, value_parser = parse_number)]
    local_size: u64,
    /// Entry point. Defaults to the ELF entry, or the code base for raw binaries.
    #[arg(long, value_parser = parse_number)]
    start: Option<u64>,
    /// Increase logging verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let verbosity = match args.verbose {
        0 => LogLevelNum::Warn,
        1 => LogLevelNum::Info,
        2 => LogLevelNum::Debug,
        _ => LogLevelNum::Trace,
    };
    if let Err(e) = stderrlog::new()
        .verbosity(verbosity)
        .modules([module_path!(), "tile_hart_core"])
        .init()
    {
        eprintln!("failed to initialise logging: {e}");
    }

    match run(&args) {
        Ok(RunStatus::Finished) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<RunStatus, Box<dyn Error>> {
    let file = fs::read(&args.binary)?;

    let config = Config {
        xlen: if args.rv64 { Xlen::Rv64 } else { Xlen::Rv32 },
        ..Config::default()
    };
    let memory = Memory::new(usize::try_from(args.mem_size)?);
    let mut host = BuiltinHost::new(Hart::new(memory, config));

    let code_size = args.code_size.unwrap_or_else(|| {
        if args.local_base > args.code_base {
            args.local_base - args.code_base
        } else {
            args.mem_size.saturating_sub(args.code_base)
        }
    });
    host.set_memory_layout(BuiltinLayout {
        code_base: args.code_base,
        code_size,
        local_base: args.local_base,
        local_size: args.local_size,
    })?;

    let entry = if args.raw {
        host.write_code(args.code_base, &file)?;
        args.code_base
    } else {
        load_elf(&mut host, &file)?
    };
    let start = args.start.unwrap_or(entry);

    host.set_handler(|hart: &mut Hart<Memory>, id: u64| -> Result<(), HandlerError> {
        warn!(
            "Unknown builtin {id} called from {:#x} (a0 = {:#x})",
            hart.pc(),
            hart.get_arg(0)?
        );
        Ok(())
    });

    info!("Running {} from {start:#x}", args.binary.display());
    let cancel = watchdog(args.timeout.map(Duration::from_secs));
    let status = host.run(start, args.limit, &cancel)?;
    if status == RunStatus::Cancelled {
        warn!("Timed out after {}s", args.timeout.unwrap_or_default());
    }
    let hart = host.hart();
    println!("status: {status:?}");
    println!("retired: {}", hart.retired());
    println!("pc: {:#x}", hart.pc());
    Ok(status)
}

/// Returns a token that is cancelled from a background thread once `timeout` has elapsed.
fn watchdog(timeout: Option<Duration>) -> CancelToken {
    let cancel = CancelToken::new();
    if let Some(timeout) = timeout {
        let token = cancel.clone();
        thread::spawn(move || {
            thread::sleep(timeout);
            token.cancel();
        });
    }
    cancel
}

/// Copies the loadable segments of an ELF image into memory and returns its entry point.
fn load_elf(host: &mut BuiltinHost<Memory>, image: &[u8]) -> Result<u64, Box<dyn Error>> {
    let elf = Elf::parse(image)?;
    for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
        let bytes = image
            .get(header.file_range())
            .ok_or("segment extends past the end of the file")?;
        debug!(
            "Loading segment [{:#010x}..{:#010x}] ({} bytes from file)",
            header.p_paddr,
            header.p_paddr + header.p_memsz,
            bytes.len()
        );
        let in_code = host
            .layout()
            .is_some_and(|layout| layout.code_contains(header.p_paddr, bytes.len() as u64));
        if in_code {
            host.write_code(header.p_paddr, bytes)?;
        } else {
            host.hart_mut().bus_mut().write(header.p_paddr, bytes)?;
        }
    }
    Ok(elf.entry)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn numbers_accept_hex_and_separators() {
        assert_eq!(parse_number("0x1_0000"), Ok(0x1_0000));
        assert_eq!(parse_number("4096"), Ok(4096));
        assert!(parse_number("0xg").is_err());
    }

    #[test]
    fn arguments_parse() {
        let args = Args::parse_from([
            "tile-hart-run",
            "--rv64",
            "-vv",
            "--limit",
            "100",
            "--timeout",
            "5",
            "prog.elf",
        ]);
        assert!(args.rv64);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.limit, Some(100));
        assert_eq!(args.timeout, Some(5));
        assert_eq!(args.local_base, 0xf_0000);
    }

    #[test]
    fn watchdog_cancels_after_the_timeout() {
        assert!(!watchdog(None).is_cancelled());
        let cancel = watchdog(Some(Duration::from_millis(10)));
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cancel.is_cancelled() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(cancel.is_cancelled());
    }
}
