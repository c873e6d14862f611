// Interactive debugger
//
// st              print PC and COND
// pr              print all registers
// p R[0-7]        direct print
// p x[addr]
// p @R[0-7]       indirect print
// p @x[addr]
//
// b x[addr]       set breakpoint at addr
// d x[addr]       delete breakpoint at addr
// lb              list breakpoints
//
// l               list around pc
// l x[addr]       list around addr
// l x[from] x[to] list from addr to addr
//
// n               next
// c               continue
// q               quit
//
// An empty line repeats the previous command.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{char, one_of, space0, space1};
use nom::combinator::{all_consuming, map, map_res, opt, value};
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::console::Console;
use crate::error::Result;
use crate::isa::Instr;
use crate::lc3::{Control, Monitor, Vm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    Reg(u8),
    Addr(u16),
}

impl fmt::Display for Item {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Item::Reg(n)  => write!(fmt, "R{}", n),
            Item::Addr(a) => write!(fmt, "x{:04X}", a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Print(bool, Item),
    PrintRegisters,
    Break(u16),
    Delete(u16),
    ListBreak,
    List(Option<u16>, Option<u16>),
    Next,
    Status,
    Continue,
    Quit,
}

fn from_hex(input: &str) -> std::result::Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(input, 16)
}

fn hex_primary(i: &str) -> IResult<&str, u16> {
    map_res(take_while_m_n(1, 4, |c: char| c.is_ascii_hexdigit()), from_hex)(i)
}

// Address (hex - xXXXX)
fn addr(i: &str) -> IResult<&str, u16> {
    preceded(one_of("xX"), hex_primary)(i)
}

// Register (Rx)
fn regx(i: &str) -> IResult<&str, u8> {
    preceded(one_of("rR"), map(one_of("01234567"), |c| c as u8 - b'0'))(i)
}

fn item(i: &str) -> IResult<&str, Item> {
    alt((map(regx, Item::Reg), map(addr, Item::Addr)))(i)
}

fn print_cmd(i: &str) -> IResult<&str, Command> {
    map(
        preceded(pair(one_of("pP"), space1), pair(opt(char('@')), item)),
        |(at, it)| Command::Print(at.is_some(), it),
    )(i)
}

fn break_cmd(i: &str) -> IResult<&str, Command> {
    map(preceded(pair(one_of("bB"), space1), addr), Command::Break)(i)
}

fn delete_cmd(i: &str) -> IResult<&str, Command> {
    map(preceded(pair(one_of("dD"), space1), addr), Command::Delete)(i)
}

fn list_cmd(i: &str) -> IResult<&str, Command> {
    map(
        preceded(
            one_of("lL"),
            pair(opt(preceded(space1, addr)), opt(preceded(space1, addr))),
        ),
        |(from, to)| Command::List(from, to),
    )(i)
}

fn cmd(i: &str) -> IResult<&str, Command> {
    alt((
        value(Command::PrintRegisters, tag("pr")),
        print_cmd,
        value(Command::ListBreak, tag("lb")),
        list_cmd,
        value(Command::Status, tag("st")),
        break_cmd,
        delete_cmd,
        value(Command::Next, one_of("nN")),
        value(Command::Continue, one_of("cC")),
        value(Command::Quit, one_of("qQ")),
    ))(i)
}

pub fn parse(line: &str) -> Option<Command> {
    all_consuming(delimited(space0, cmd, space0))(line)
        .ok()
        .map(|(_, c)| c)
}

pub struct Debugger {
    rl:          Option<DefaultEditor>,
    breakpoints: BTreeSet<u16>,
    stepping:    bool,
    // breakpoint to pass over once after a continue
    skip:        Option<u16>,
    last:        Option<Command>,
}

impl Debugger {
    const LIST_BEFORE: u16 = 5;
    const LIST_AFTER:  u16 = 10;

    /// `stepping` stops before the first instruction.
    pub fn new(stepping: bool, breakpoints: impl IntoIterator<Item = u16>) -> Debugger {
        Debugger {
            rl: None,
            breakpoints: breakpoints.into_iter().collect(),
            stepping,
            skip: None,
            last: None,
        }
    }

    fn prompt<C: Console>(&mut self, vm: &mut Vm<C>) -> Result<Control> {
        let mut rl = match self.rl.take() {
            Some(rl) => rl,
            None     => DefaultEditor::new()?,
        };
        let res = self.prompt_with(&mut rl, vm);
        self.rl = Some(rl);
        res
    }

    fn prompt_with<C: Console>(&mut self, rl: &mut DefaultEditor, vm: &mut Vm<C>) -> Result<Control> {
        let mut out = std::io::stdout();
        self.show_current(vm, &mut out)?;
        loop {
            let line = match rl.readline("lc3db> ") {
                Ok(line)                        => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof)         => return Ok(Control::Stop),
                Err(e)                          => return Err(e.into()),
            };

            let command = if line.trim().is_empty() {
                match self.last.clone() {
                    Some(c) => c,
                    None    => continue,
                }
            } else {
                rl.add_history_entry(line.as_str())?;
                match parse(&line) {
                    Some(c) => c,
                    None    => {
                        writeln!(out, "unknown command: {}", line.trim())?;
                        continue;
                    }
                }
            };

            self.last = Some(command.clone());
            if let Some(ctl) = self.exec(&command, vm, &mut out)? {
                return Ok(ctl);
            }
        }
    }

    fn show_current<C: Console>(&self, vm: &Vm<C>, out: &mut impl Write) -> Result<()> {
        writeln!(out, "x{:04X}: {}", vm.pc, Instr(vm.mem.peek(vm.pc)))?;
        Ok(())
    }

    /// Run one command. Returns the decision for the run loop when the
    /// command ends the prompt.
    pub fn exec<C: Console>(&mut self, command: &Command, vm: &mut Vm<C>, out: &mut impl Write) -> Result<Option<Control>> {
        match *command {
            Command::Status => {
                writeln!(out, "PC   = x{:04X}", vm.pc)?;
                writeln!(out, "COND = {} ({:03b})", vm.cnd, vm.cnd.bits())?;
            }
            Command::PrintRegisters => {
                for i in 0..4 {
                    writeln!(out, "R{} = x{:04X}    R{} = x{:04X}", i, vm.reg[i], 4 + i, vm.reg[4 + i])?;
                }
                writeln!(out, "PC   = x{:04X}", vm.pc)?;
                writeln!(out, "       nzp")?;
                writeln!(out, "COND = {:03b}", vm.cnd.bits())?;
            }
            Command::Print(indirect, it) => {
                let val = match it {
                    Item::Reg(n)  => vm.reg[n as usize],
                    Item::Addr(a) => vm.mem.peek(a),
                };
                if indirect {
                    writeln!(out, "[{}] = [x{:04X}] = x{:04X}", it, val, vm.mem.peek(val))?;
                } else {
                    writeln!(out, "{} = x{:04X} ({})", it, val, val as i16)?;
                }
            }
            Command::Break(a) => {
                self.breakpoints.insert(a);
                writeln!(out, "breakpoint at x{:04X}", a)?;
            }
            Command::Delete(a) => {
                if self.breakpoints.remove(&a) {
                    writeln!(out, "deleted breakpoint at x{:04X}", a)?;
                } else {
                    writeln!(out, "no breakpoint at x{:04X}", a)?;
                }
            }
            Command::ListBreak => {
                for a in &self.breakpoints {
                    writeln!(out, "x{:04X}", a)?;
                }
            }
            Command::List(from, to) => {
                let (start, end) = match (from, to) {
                    (Some(a), Some(b)) => (a.min(b), a.max(b)),
                    (Some(a), None)    => self.window(a),
                    (None, _)          => self.window(vm.pc),
                };
                self.list(vm, start, end, out)?;
            }
            Command::Next => return Ok(Some(Control::Step)),
            Command::Continue => {
                self.stepping = false;
                self.skip = Some(vm.pc);
                return Ok(Some(Control::Step));
            }
            Command::Quit => return Ok(Some(Control::Stop)),
        }
        Ok(None)
    }

    fn window(&self, center: u16) -> (u16, u16) {
        (
            center.wrapping_sub(Debugger::LIST_BEFORE),
            center.wrapping_add(Debugger::LIST_AFTER),
        )
    }

    fn list<C: Console>(&self, vm: &Vm<C>, start: u16, end: u16, out: &mut impl Write) -> Result<()> {
        let count = end.wrapping_sub(start) as usize + 1;
        for n in 0..count {
            let a = start.wrapping_add(n as u16);
            let w = vm.mem.peek(a);
            let mark = if a == vm.pc { ">" } else if self.breakpoints.contains(&a) { "*" } else { " " };
            writeln!(out, "{} x{:04X}  x{:04X}  {}", mark, a, w, Instr(w))?;
        }
        Ok(())
    }

    fn should_stop(&mut self, pc: u16, interrupted: bool) -> bool {
        let skip = self.skip.take();
        if interrupted {
            self.stepping = true;
        } else if self.breakpoints.contains(&pc) && skip != Some(pc) {
            log::debug!("breakpoint at x{:04X}", pc);
            self.stepping = true;
        }
        self.stepping
    }
}

impl<C: Console> Monitor<C> for Debugger {
    fn before_step(&mut self, vm: &mut Vm<C>, interrupted: bool) -> Result<Control> {
        if !self.should_stop(vm.pc, interrupted) {
            return Ok(Control::Step);
        }
        self.prompt(vm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;
    use crate::isa::asm;

    fn run_cmd(dbg: &mut Debugger, vm: &mut Vm<BufferConsole>, line: &str) -> (Option<Control>, String) {
        let mut out = Vec::new();
        let command = parse(line).unwrap();
        let ctl = dbg.exec(&command, vm, &mut out).unwrap();
        (ctl, String::from_utf8(out).unwrap())
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse("st"), Some(Command::Status));
        assert_eq!(parse("pr"), Some(Command::PrintRegisters));
        assert_eq!(parse("p R3"), Some(Command::Print(false, Item::Reg(3))));
        assert_eq!(parse("p @x3000"), Some(Command::Print(true, Item::Addr(0x3000))));
        assert_eq!(parse("P  @r7"), Some(Command::Print(true, Item::Reg(7))));
        assert_eq!(parse("b x30a0"), Some(Command::Break(0x30A0)));
        assert_eq!(parse("d x30A0"), Some(Command::Delete(0x30A0)));
        assert_eq!(parse("lb"), Some(Command::ListBreak));
        assert_eq!(parse("l"), Some(Command::List(None, None)));
        assert_eq!(parse("l x3000"), Some(Command::List(Some(0x3000), None)));
        assert_eq!(parse("l x3000 x3004 "), Some(Command::List(Some(0x3000), Some(0x3004))));
        assert_eq!(parse(" n"), Some(Command::Next));
        assert_eq!(parse("c"), Some(Command::Continue));
        assert_eq!(parse("q"), Some(Command::Quit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(parse("p R8"), None);
        assert_eq!(parse("b 3000"), None);
        assert_eq!(parse("x12345"), None);
        assert_eq!(parse("next please"), None);
        assert_eq!(parse("l x3000 x3001 x3002"), None);
    }

    #[test]
    fn prints_registers_and_memory() {
        let mut vm = Vm::new(BufferConsole::default());
        let mut dbg = Debugger::new(true, []);
        vm.reg[2] = 0x4000;
        vm.mem.poke(0x4000, 0xFFFF);

        let (ctl, out) = run_cmd(&mut dbg, &mut vm, "p R2");
        assert!(ctl.is_none());
        assert_eq!(out, "R2 = x4000 (16384)\n");

        let (_, out) = run_cmd(&mut dbg, &mut vm, "p @R2");
        assert_eq!(out, "[R2] = [x4000] = xFFFF\n");

        let (_, out) = run_cmd(&mut dbg, &mut vm, "p x4000");
        assert_eq!(out, "x4000 = xFFFF (-1)\n");

        let (_, out) = run_cmd(&mut dbg, &mut vm, "st");
        assert_eq!(out, "PC   = x3000\nCOND = Z (010)\n");
    }

    #[test]
    fn lists_with_disassembly() {
        let mut vm = Vm::new(BufferConsole::default());
        vm.mem.load(0x3000, &[asm::addi(1, 1, 1), asm::halt()]);
        let mut dbg = Debugger::new(true, [0x3001]);

        let (_, out) = run_cmd(&mut dbg, &mut vm, "l x3000 x3001");
        assert_eq!(out, "> x3000  x1261  ADD R1, R1, #1\n* x3001  xF025  HALT\n");
    }

    #[test]
    fn list_accepts_reversed_range() {
        let mut vm = Vm::new(BufferConsole::default());
        let mut dbg = Debugger::new(true, []);
        let (_, out) = run_cmd(&mut dbg, &mut vm, "l x3001 x2FFF");
        assert_eq!(out.lines().count(), 3);
        assert!(out.lines().next().unwrap().contains("x2FFF"));
    }

    #[test]
    fn breakpoints_stop_and_continue_passes_once() {
        let mut vm = Vm::new(BufferConsole::default());
        let mut dbg = Debugger::new(false, []);
        run_cmd(&mut dbg, &mut vm, "b x3002");

        assert!(!dbg.should_stop(0x3000, false));
        assert!(dbg.should_stop(0x3002, false));

        vm.pc = 0x3002;
        let (ctl, _) = run_cmd(&mut dbg, &mut vm, "c");
        assert!(matches!(ctl, Some(Control::Step)));
        assert!(!dbg.should_stop(0x3002, false));
        assert!(!dbg.should_stop(0x3003, false));
        assert!(dbg.should_stop(0x3002, false));

        let (_, out) = run_cmd(&mut dbg, &mut vm, "d x3002");
        assert_eq!(out, "deleted breakpoint at x3002\n");
        let (_, out) = run_cmd(&mut dbg, &mut vm, "lb");
        assert!(out.is_empty());
    }

    #[test]
    fn interrupt_enters_stepping() {
        let mut dbg = Debugger::new(false, []);
        assert!(!dbg.should_stop(0x3000, false));
        assert!(dbg.should_stop(0x3000, true));
        assert!(dbg.should_stop(0x3001, false));
    }

    #[test]
    fn quit_stops_the_machine() {
        let mut vm = Vm::new(BufferConsole::default());
        let mut dbg = Debugger::new(true, []);
        let (ctl, _) = run_cmd(&mut dbg, &mut vm, "q");
        assert!(matches!(ctl, Some(Control::Stop)));
    }
}
