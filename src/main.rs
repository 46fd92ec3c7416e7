//! Runs a multi-thread program file under the cooperative scheduler.
//!
//! # Usage
//! ```text
//! interleave <file> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `file`: Program source with `[ thread N ]` and `[ memory ]` sections
//!
//! # Options
//! - `--quota <n>`: Instructions per turn (default 20)
//! - `--memory <n>`: Shared memory cells (default 50)
//! - `--registers <n>`: Registers per thread (default 5)
//! - `--on-fault <policy>`: `continue`, `terminate` or `abort`
//! - `--max-rounds <n>`: Stop after this many sweeps
//! - `--trace`: Log every executed instruction
//! - `--quiet`: Only log warnings and errors
//! - `--dump`: Print the assembled threads and memory seeds, then exit
//!
//! # Exit status
//! `0` when every thread finished, `2` on deadlock, `3` when the round limit
//! was hit, `1` on any error.

use interleave::scheduler::{FaultPolicy, Halt, Scheduler, SchedulerConfig};
use interleave::utils::log::{self, Level};
use interleave::virtual_machine::assembler::{Workload, assemble_file};
use interleave::virtual_machine::errors::VMError;
use interleave::{error, info, warn};
use std::env;
use std::process;
use std::str::FromStr;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut config = SchedulerConfig::default();
    let mut level = Level::Info;
    let mut dump = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ "--quota" => {
                config.quota = parse_value(&args, i, k);
                i += 2;
            }
            k @ "--memory" => {
                config.memory_size = parse_value(&args, i, k);
                i += 2;
            }
            k @ "--registers" => {
                config.register_count = parse_value(&args, i, k);
                i += 2;
            }
            k @ "--on-fault" => {
                config.fault_policy = parse_value::<FaultPolicy>(&args, i, k);
                i += 2;
            }
            k @ "--max-rounds" => {
                config.max_rounds = Some(parse_value(&args, i, k));
                i += 2;
            }
            "--trace" => {
                level = Level::Trace;
                i += 1;
            }
            "--quiet" => {
                level = Level::Warn;
                i += 1;
            }
            "--dump" => {
                dump = true;
                i += 1;
            }
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    log::set_max_level(level);

    let workload = match assemble_file(input_path) {
        Ok(workload) => workload,
        Err(e @ VMError::IoError { .. }) => {
            eprintln!("{e}");
            process::exit(1);
        }
        // Assembly diagnostics were already logged by the loader.
        Err(_) => process::exit(1),
    };

    if dump {
        print_workload(&workload);
        return;
    }

    let thread_count = workload.threads.len();
    let mut scheduler = match Scheduler::from_workload(config, workload) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    info!(
        "running {} thread(s) from {} (quota {}, policy {})",
        thread_count,
        input_path,
        scheduler.config().quota,
        scheduler.config().fault_policy
    );

    let report = match scheduler.run() {
        Ok(report) => report,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    info!(
        "{} round(s), {} finished, {} fault(s)",
        report.rounds,
        report.finished.len(),
        report.faults
    );

    if report.deadlocked() {
        let ids: Vec<String> = report.blocked.iter().map(|id| id.to_string()).collect();
        warn!("deadlock: thread(s) {} blocked forever", ids.join(", "));
        process::exit(2);
    }
    if report.halt == Halt::RoundLimit {
        warn!(
            "stopped after {} round(s) with thread(s) still ready",
            report.rounds
        );
        process::exit(3);
    }
}

/// Parses the value following option `args[i]`, exiting on failure.
fn parse_value<T: FromStr>(args: &[String], i: usize, option: &str) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("{option} requires an argument");
        process::exit(1);
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Invalid value for {option}: {raw}");
            process::exit(1);
        }
    }
}

fn print_workload(workload: &Workload) {
    for (id, program) in &workload.threads {
        println!("[ thread {id} ]");
        print!("{program}");
    }
    if !workload.memory.is_empty() {
        println!("[ memory ]");
        for (addr, value) in &workload.memory {
            println!("{addr:>4}  {value}");
        }
    }
}

const USAGE: &str = "\
Cooperative thread interleaving simulator

USAGE:
    {program} <file> [OPTIONS]

ARGS:
    <file>    Program source with [ thread N ] and [ memory ] sections

OPTIONS:
    --quota <n>           Instructions per turn (default 20)
    --memory <n>          Shared memory cells (default 50)
    --registers <n>       Registers per thread (default 5)
    --on-fault <policy>   continue | terminate | abort (default continue)
    --max-rounds <n>      Stop after this many scheduler sweeps
    --trace               Log every executed instruction
    --quiet               Only log warnings and errors
    --dump                Print the assembled program and exit
    -h, --help            Print this help message

EXIT STATUS:
    0 all threads finished, 1 error, 2 deadlock, 3 round limit reached

EXAMPLES:
    {program} counter.asm
    {program} counter.asm --quota 1 --trace
    {program} buffer.asm --on-fault abort --max-rounds 1000
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
