use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::console::Console;
use crate::error::{Error, Result};
use crate::isa::{Cond, Instr, Opcode};
use crate::loader::Image;
use crate::memory::Memory;

/// Why the run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// A HALT trap executed.
    Halted,
    /// Stopped from outside: Ctrl-C, or a quit from the debugger.
    Aborted,
}

pub enum Control {
    Step,
    Stop,
}

/// Hook run before every instruction. `interrupted` is true once per Ctrl-C.
pub trait Monitor<C: Console> {
    fn before_step(&mut self, vm: &mut Vm<C>, interrupted: bool) -> Result<Control>;
}

/// No debugger attached: an interrupt simply stops the machine.
pub struct Unmonitored;

impl<C: Console> Monitor<C> for Unmonitored {
    fn before_step(&mut self, _vm: &mut Vm<C>, interrupted: bool) -> Result<Control> {
        Ok(if interrupted { Control::Stop } else { Control::Step })
    }
}

pub struct Vm<C: Console> {
    pub mem:     Memory,
    pub reg:     [u16; 8],
    pub pc:      u16,
    pub cnd:     Cond,
    pub console: C,
    pub(crate) running:   bool,
    pub(crate) interrupt: Arc<AtomicBool>,
    // IN already showed its prompt before an interrupted wait
    pub(crate) in_prompted: bool,
}

impl<C: Console> Vm<C> {
    pub const PC_START: u16 = 0x3000;

    #[cfg(test)]
    pub fn new(console: C) -> Vm<C> {
        Vm::with_interrupt(console, Arc::new(AtomicBool::new(false)))
    }

    /// `interrupt` is shared with whoever can request a stop (the SIGINT handler).
    pub fn with_interrupt(console: C, interrupt: Arc<AtomicBool>) -> Vm<C> {
        Vm {
            mem:       Memory::new(),
            reg:       [0; 8],
            pc:        Self::PC_START,
            cnd:       Cond::Zro,
            console,
            running:   false,
            interrupt,
            in_prompted: false,
        }
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    pub fn load(&mut self, image: &Image) {
        image.load_into(&mut self.mem);
    }

    pub fn run(&mut self) -> Result<Stop> {
        self.run_with(&mut Unmonitored)
    }

    pub fn run_with<M: Monitor<C>>(&mut self, monitor: &mut M) -> Result<Stop> {
        log::info!("running from x{:04X}", self.pc);
        self.running = true;
        while self.running {
            let interrupted = self.interrupt.swap(false, Ordering::SeqCst);
            match monitor.before_step(self, interrupted)? {
                Control::Step => self.step()?,
                Control::Stop => {
                    self.running = false;
                    log::info!("stopped at x{:04X}", self.pc);
                    return Ok(Stop::Aborted);
                }
            }
        }
        log::info!("halted at x{:04X}", self.pc);
        Ok(Stop::Halted)
    }

    /// One fetch/decode/execute cycle. PC is bumped before the handler runs,
    /// so PC-relative operands are based on the following instruction.
    pub fn step(&mut self) -> Result<()> {
        let addr  = self.pc;
        let instr = Instr(self.mem.read(addr, &mut self.console)?);
        self.pc = self.pc.wrapping_add(1);
        log::trace!("x{:04X}: {}", addr, instr);

        match instr.opcode() {
            Opcode::Br   => self.br(instr),
            Opcode::Add  => self.add(instr),
            Opcode::Ld   => self.ld(instr)?,
            Opcode::St   => self.st(instr),
            Opcode::Jsr  => self.jsr(instr),
            Opcode::And  => self.and(instr),
            Opcode::Ldr  => self.ldr(instr)?,
            Opcode::Str  => self.str(instr),
            Opcode::Not  => self.not(instr),
            Opcode::Ldi  => self.ldi(instr)?,
            Opcode::Sti  => self.sti(instr)?,
            Opcode::Jmp  => self.jmp(instr),
            Opcode::Lea  => self.lea(instr),
            Opcode::Trap => self.trap(instr)?,
            op @ (Opcode::Rti | Opcode::Res) => {
                return Err(Error::IllegalOpcode { addr, opcode: op as u16 });
            }
        }
        Ok(())
    }

    pub fn update_flags(&mut self, r: usize) {
        self.cnd = Cond::of(self.reg[r]);
    }

    fn set_reg(&mut self, r: usize, val: u16) {
        self.reg[r] = val;
        self.update_flags(r);
    }

    // Instructions
    fn add_and(&mut self, i: Instr, op: fn(u16, u16) -> u16) {
        let op2 = match i.imm_mode() {
            true  => i.imm5(),
            false => self.reg[i.sr2()],
        };
        self.set_reg(i.dr(), op(self.reg[i.sr1()], op2));
    }

    fn add(&mut self, i: Instr) {
        self.add_and(i, u16::wrapping_add);
    }

    fn and(&mut self, i: Instr) {
        self.add_and(i, |x, y| x & y);
    }

    fn not(&mut self, i: Instr) {
        self.set_reg(i.dr(), !self.reg[i.sr1()]);
    }

    fn br(&mut self, i: Instr) {
        if i.nzp() & self.cnd.bits() != 0 {
            self.pc = self.pc.wrapping_add(i.pc_off9());
        }
    }

    fn jmp(&mut self, i: Instr) {
        self.pc = self.reg[i.sr1()];
    }

    fn jsr(&mut self, i: Instr) {
        // Read the base first: JSRR R7 jumps to the old R7.
        let target = match i.jsr_long() {
            true  => self.pc.wrapping_add(i.pc_off11()),
            false => self.reg[i.sr1()],
        };
        self.reg[7] = self.pc;
        self.pc = target;
    }

    fn pc_rel(&self, i: Instr) -> u16 {
        self.pc.wrapping_add(i.pc_off9())
    }

    fn base_rel(&self, i: Instr) -> u16 {
        self.reg[i.sr1()].wrapping_add(i.off6())
    }

    fn ld(&mut self, i: Instr) -> Result<()> {
        let addr = self.pc_rel(i);
        let val  = self.mem.read(addr, &mut self.console)?;
        self.set_reg(i.dr(), val);
        Ok(())
    }

    fn ldi(&mut self, i: Instr) -> Result<()> {
        let addr = self.pc_rel(i);
        let ptr  = self.mem.read(addr, &mut self.console)?;
        let val  = self.mem.read(ptr, &mut self.console)?;
        self.set_reg(i.dr(), val);
        Ok(())
    }

    fn ldr(&mut self, i: Instr) -> Result<()> {
        let addr = self.base_rel(i);
        let val  = self.mem.read(addr, &mut self.console)?;
        self.set_reg(i.dr(), val);
        Ok(())
    }

    fn lea(&mut self, i: Instr) {
        let addr = self.pc_rel(i);
        self.set_reg(i.dr(), addr);
    }

    fn st(&mut self, i: Instr) {
        let addr = self.pc_rel(i);
        self.mem.write(addr, self.reg[i.dr()]);
    }

    fn sti(&mut self, i: Instr) -> Result<()> {
        let addr = self.pc_rel(i);
        let ptr  = self.mem.read(addr, &mut self.console)?;
        self.mem.write(ptr, self.reg[i.dr()]);
        Ok(())
    }

    fn str(&mut self, i: Instr) {
        let addr = self.base_rel(i);
        self.mem.write(addr, self.reg[i.dr()]);
    }
}
