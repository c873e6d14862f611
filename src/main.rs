mod console;
mod debugger;
mod error;
mod isa;
mod kbd;
mod lc3;
mod loader;
mod memory;
mod trap;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use crate::console::StdConsole;
use crate::debugger::Debugger;
use crate::kbd::RawMode;
use crate::lc3::{Stop, Vm};
use crate::loader::Image;

/// LC-3 virtual machine
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Program images to load, in order. Later images overwrite earlier ones.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Stop in the debugger before the first instruction.
    #[arg(short, long)]
    debug: bool,

    /// Breakpoint address (hex, e.g. x3000). May be repeated.
    #[arg(short = 'b', long = "break", value_parser = parse_addr)]
    breakpoints: Vec<u16>,

    /// Address of the first instruction.
    #[arg(long, default_value = "x3000", value_parser = parse_addr)]
    start: u16,
}

fn parse_addr(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix(['x', 'X']))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address {}: {}", s, e))
}

fn run(args: &Args) -> error::Result<Stop> {
    let images = args
        .images
        .iter()
        .map(|path| Image::read_file(path))
        .collect::<error::Result<Vec<_>>>()?;

    let interrupt = Arc::new(AtomicBool::new(false));
    let mut vm = Vm::with_interrupt(StdConsole::new(interrupt.clone()), interrupt);

    let flag = vm.interrupt_flag();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    for image in &images {
        vm.load(image);
    }
    vm.pc = args.start;

    let _raw = RawMode::enter()?;
    if args.debug || !args.breakpoints.is_empty() {
        let mut dbg = Debugger::new(args.debug, args.breakpoints.iter().copied());
        vm.run_with(&mut dbg)
    } else {
        vm.run()
    }
}

fn exit_status(res: &error::Result<Stop>) -> u8 {
    match res {
        Ok(Stop::Halted)  => 0,
        Ok(Stop::Aborted) => 130,
        Err(_)            => 1,
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let res = run(&args);
    match &res {
        Ok(Stop::Halted)  => (),
        Ok(Stop::Aborted) => eprintln!(),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("lc3vm: {}", e);
        }
    }
    ExitCode::from(exit_status(&res))
}
