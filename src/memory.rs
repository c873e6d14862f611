// Word-addressed main memory with keyboard registers mapped in.

use crate::console::Console;
use crate::error::Result;

pub const MEM_SIZE: usize = 1 + u16::MAX as usize;

pub const MMIO_KBSR: u16 = 0xFE00; // keyboard status
pub const MMIO_KBDR: u16 = 0xFE02; // keyboard data

const KBSR_READY: u16 = 1 << 15;

pub struct Memory {
    cells: Box<[u16]>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory { cells: vec![0; MEM_SIZE].into_boxed_slice() }
    }

    /// Plain load, no device side effects.
    pub fn peek(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    pub fn poke(&mut self, addr: u16, value: u16) {
        self.cells[addr as usize] = value;
    }

    /// Load as seen by a running program. Reading KBSR polls the console
    /// and, if a key is waiting, latches it into KBDR.
    pub fn read<C: Console>(&mut self, addr: u16, console: &mut C) -> Result<u16> {
        if addr == MMIO_KBSR {
            let key = match console.key_ready()? {
                true  => console.read_key()?,
                false => None,
            };
            match key {
                Some(key) => {
                    self.poke(MMIO_KBSR, KBSR_READY);
                    self.poke(MMIO_KBDR, key as u16);
                }
                // readable but nothing delivered (end of input, interrupt)
                None => self.poke(MMIO_KBSR, 0),
            }
        }
        Ok(self.peek(addr))
    }

    pub fn write(&mut self, addr: u16, value: u16) {
        self.poke(addr, value);
    }

    /// Copy `words` in starting at `origin`. Anything past xFFFF is dropped.
    pub fn load(&mut self, origin: u16, words: &[u16]) {
        let start = origin as usize;
        let n = words.len().min(MEM_SIZE - start);
        self.cells[start..start + n].copy_from_slice(&words[..n]);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}
