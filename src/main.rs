//! byte-vm - CLI Entry Point
//!
//! Commands:
//! - `byte-vm run <sample>` - Run a built-in sample program
//! - `byte-vm debug <sample>` - Interactive debugger
//! - `byte-vm disasm <sample>` - Disassemble a sample
//! - `byte-vm list` - List the samples
//! - `byte-vm test` - Run every sample and check its result

use bytevm::cpu::{Cpu, CpuState, Registers};
use bytevm::program::samples::{self, Sample};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "byte-vm")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "A 256-byte teaching virtual machine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sample program until it halts
    Run {
        /// Name of the sample (see `list`)
        sample: String,
        /// Data cells to place at 0x00.., comma separated (decimal or 0x hex)
        #[arg(short, long, value_delimiter = ',', value_parser = parse_byte)]
        data: Vec<u8>,
        /// Maximum number of instructions to run
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Show trace output
        #[arg(short, long)]
        trace: bool,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive debugger
    Debug {
        /// Name of the sample to debug
        sample: String,
        /// Data cells to place at 0x00..
        #[arg(short, long, value_delimiter = ',', value_parser = parse_byte)]
        data: Vec<u8>,
    },
    /// Disassemble a sample
    Disasm {
        /// Name of the sample
        sample: String,
    },
    /// List the built-in samples
    List,
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();

    // The debugger owns the terminal, so it gets no log output.
    if !matches!(cli.command, Some(Commands::Debug { .. })) {
        init_logging();
    }

    match cli.command {
        Some(Commands::Run { sample, data, max_steps, trace, json }) => {
            run_sample(&sample, &data, max_steps, trace, json);
        }
        Some(Commands::Debug { sample, data }) => {
            debug_sample(&sample, &data);
        }
        Some(Commands::Disasm { sample }) => {
            disassemble_sample(&sample);
        }
        Some(Commands::List) => {
            list_samples();
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("byte-vm v0.1.0");
            println!("A 256-byte teaching virtual machine");
            println!();
            println!("Use --help for available commands");
            println!();
            list_samples();
        }
    }
}

/// Log filter used when `RUST_LOG` is unset. Faults are printed by the
/// commands themselves, so the engine's `warn!` stays quiet by default.
const DEFAULT_LOG_FILTER: &str = "error";

/// Initialize logging. `RUST_LOG` overrides the default filter, e.g.
/// `RUST_LOG=bytevm=trace` logs every executed instruction.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a byte given in decimal or with a `0x` prefix.
fn parse_byte(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

fn lookup(name: &str) -> &'static Sample {
    match samples::find(name) {
        Some(sample) => sample,
        None => {
            eprintln!("❌ Unknown sample '{}'. Use `list` to see the samples.", name);
            std::process::exit(1);
        }
    }
}

fn build_cpu(sample: &Sample, data: &[u8]) -> Cpu {
    match sample.image_with_data(data) {
        Ok(image) => Cpu::with_memory(image),
        Err(e) => {
            eprintln!("❌ Failed to build {}: {}", sample.name, e);
            std::process::exit(1);
        }
    }
}

/// Final state printed by `run --json`.
#[derive(Serialize)]
struct RunReport<'a> {
    sample: &'a str,
    state: CpuState,
    cycles: u64,
    registers: &'a Registers,
    data: &'a [u8],
    fault: Option<String>,
}

fn run_sample(name: &str, data: &[u8], max_steps: u64, trace: bool, json: bool) {
    use bytevm::program::disasm::disassemble_instruction;

    let sample = lookup(name);
    let mut cpu = build_cpu(sample, data);

    if !json {
        println!("🔧 Running: {} ({})", sample.name, sample.description);
        println!();
        println!("━━━ Execution ━━━");
    }

    let mut fault = None;
    while cpu.is_running() && cpu.cycles < max_steps {
        let pc = cpu.regs.pc;
        let bytes = cpu.mem.fetch(pc);

        match cpu.step() {
            Ok(_) => {
                if trace && !json {
                    println!("0x{:02X}: {:<32} r0={:02X} r1={:02X}",
                        pc, disassemble_instruction(pc, bytes), cpu.regs.gpr[0], cpu.regs.gpr[1]);
                }
            }
            Err(e) => {
                fault = Some(e);
                break;
            }
        }
    }

    if json {
        let report = RunReport {
            sample: sample.name,
            state: cpu.state,
            cycles: cpu.cycles,
            registers: &cpu.regs,
            data: cpu.mem.data(),
            fault: fault.as_ref().map(|e| e.to_string()),
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("❌ Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        let cells: Vec<String> = cpu.mem.data().iter().map(|b| format!("{:02X}", b)).collect();
        println!();
        println!("━━━ Result ━━━");
        println!("Cycles: {}", cpu.cycles);
        println!("State:  {:?}", cpu.state);
        println!("PC:     0x{:02X}", cpu.regs.pc);
        println!("r0:     0x{:02X} ({})", cpu.regs.gpr[0], cpu.regs.gpr[0]);
        println!("r1:     0x{:02X} ({})", cpu.regs.gpr[1], cpu.regs.gpr[1]);
        println!("Data:   {}", cells.join(" "));

        if cpu.is_running() {
            println!();
            println!("⚠️  Reached max steps limit ({}). Use --max-steps to increase.", max_steps);
        }
    }

    if let Some(e) = fault {
        eprintln!("❌ CPU fault: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "tui")]
fn debug_sample(name: &str, data: &[u8]) {
    use bytevm::run_debugger;

    let sample = lookup(name);
    let cpu = build_cpu(sample, data);

    if let Err(e) = run_debugger(cpu.mem) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_sample(_name: &str, _data: &[u8]) {
    eprintln!("❌ Built without the `tui` feature; the debugger is unavailable.");
    std::process::exit(1);
}

fn disassemble_sample(name: &str) {
    use bytevm::program::disassemble;

    let sample = lookup(name);
    let cpu = build_cpu(sample, &[]);

    println!("; {}: {}", sample.name, sample.description);
    print!("{}", disassemble(&cpu.mem));
}

fn list_samples() {
    println!("Samples:");
    for sample in samples::all() {
        println!("  {:<12} {}", sample.name, sample.description);
    }
}

fn run_self_test() {
    println!("━━━ byte-vm Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    for sample in samples::all() {
        print!("{}... ", sample.name);

        let mut cpu = build_cpu(sample, &[]);
        let outcome = cpu.run_limited(10_000);

        if cpu.is_running() {
            println!("✗ (did not finish)");
            failed += 1;
            continue;
        }

        match sample.check(&outcome, &cpu.mem) {
            Ok(()) => {
                println!("✓");
                passed += 1;
            }
            Err(e) => {
                println!("✗ ({})", e);
                failed += 1;
            }
        }
    }

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("42"), Ok(42));
        assert_eq!(parse_byte("0x2a"), Ok(42));
        assert_eq!(parse_byte(" 0XFF "), Ok(255));
        assert!(parse_byte("256").is_err());
        assert!(parse_byte("0xZZ").is_err());
    }

    #[test]
    fn test_default_log_filter() {
        assert_eq!(DEFAULT_LOG_FILTER, "error");
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_cli_parses_data_list() {
        let cli = Cli::try_parse_from(["byte-vm", "run", "sum", "--data", "1,0x02", "--json"]).unwrap();
        match cli.command {
            Some(Commands::Run { sample, data, max_steps, json, .. }) => {
                assert_eq!(sample, "sum");
                assert_eq!(data, vec![1, 2]);
                assert_eq!(max_steps, 10000);
                assert!(json);
            }
            _ => panic!("expected run command"),
        }
    }
}
