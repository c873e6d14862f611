// Built-in trap routines.

use std::sync::atomic::Ordering;

use crate::console::Console;
use crate::error::{Error, Result};
use crate::isa::{trap, Instr};
use crate::lc3::Vm;
use crate::memory::MEM_SIZE;

const IN_PROMPT: &[u8] = b"Enter a character: ";

impl<C: Console> Vm<C> {
    pub(crate) fn trap(&mut self, i: Instr) -> Result<()> {
        let vector = i.trapvect8();
        let addr   = self.pc.wrapping_sub(1);
        self.reg[7] = self.pc;
        log::debug!("x{:04X}: trap x{:02X}", addr, vector);

        match vector {
            trap::GETC  => self.trap_getc(),
            trap::OUT   => self.trap_out(),
            trap::PUTS  => self.trap_puts(),
            trap::IN    => self.trap_in(),
            trap::PUTSP => self.trap_putsp(),
            trap::HALT  => self.trap_halt(),
            _           => Err(Error::IllegalTrap { addr, vector }),
        }
    }

    /// Blocks for a key. An interrupted wait rewinds PC onto the TRAP so it
    /// runs again when execution resumes.
    fn wait_key(&mut self) -> Result<Option<u8>> {
        match self.console.read_key()? {
            Some(key) => Ok(Some(key)),
            None if self.interrupt.load(Ordering::SeqCst) => {
                self.pc = self.pc.wrapping_sub(1);
                Ok(None)
            }
            None => Err(Error::InputClosed),
        }
    }

    fn trap_getc(&mut self) -> Result<()> {
        if let Some(key) = self.wait_key()? {
            self.reg[0] = key as u16;
        }
        Ok(())
    }

    fn trap_out(&mut self) -> Result<()> {
        self.console.write(&[self.reg[0] as u8])
    }

    fn trap_in(&mut self) -> Result<()> {
        if !self.in_prompted {
            self.console.write(IN_PROMPT)?;
        }
        match self.wait_key()? {
            Some(key) => {
                self.in_prompted = false;
                self.console.write(&[key])?;
                self.reg[0] = key as u16;
            }
            None => self.in_prompted = true,
        }
        Ok(())
    }

    /// Words from R0 up to (not including) the first zero word.
    fn string_at_r0(&self) -> impl Iterator<Item = u16> + '_ {
        let base = self.reg[0];
        (0..MEM_SIZE)
            .map(move |n| self.mem.peek(base.wrapping_add(n as u16)))
            .take_while(|&w| w != 0)
    }

    fn trap_puts(&mut self) -> Result<()> {
        let s: Vec<u8> = self.string_at_r0()
            .map(|w| w as u8)
            .collect();
        self.console.write(&s)
    }

    fn trap_putsp(&mut self) -> Result<()> {
        let s: Vec<u8> = self.string_at_r0()
            .flat_map(|w| {
                let lo = (w & 0xFF) as u8;
                let hi = (w >> 8) as u8;
                if hi == 0 { vec![lo] } else { vec![lo, hi] }
            })
            .collect();
        self.console.write(&s)
    }

    fn trap_halt(&mut self) -> Result<()> {
        self.console.write(b"HALT\n")?;
        self.console.flush()?;
        self.running = false;
        Ok(())
    }
}
