// Console capability the machine depends on for keyboard and display.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::poll::PollTimeout;

use crate::error::Result;
use crate::kbd;

pub trait Console {
    /// Non-blocking check for a waiting key.
    fn key_ready(&mut self) -> Result<bool>;

    /// Blocks until a key arrives. `None` means no key will come: either the
    /// input is exhausted or the wait was interrupted.
    fn read_key(&mut self) -> Result<Option<u8>>;

    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// The process terminal: stdin via `kbd`, stdout for display.
pub struct StdConsole {
    interrupt: Arc<AtomicBool>,
}

impl StdConsole {
    // How long a blocked read waits between checks of the interrupt flag.
    const POLL_MS: u16 = 100;

    pub fn new(interrupt: Arc<AtomicBool>) -> StdConsole {
        StdConsole { interrupt }
    }
}

impl Console for StdConsole {
    fn key_ready(&mut self) -> Result<bool> {
        kbd::check_input()
    }

    fn read_key(&mut self) -> Result<Option<u8>> {
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return Ok(None);
            }
            if kbd::wait_input(PollTimeout::from(StdConsole::POLL_MS))? {
                return kbd::getch();
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut out = std::io::stdout().lock();
        out.write_all(bytes)?;
        out.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// Scripted console: keys come from a queue, output is collected.
#[cfg(test)]
#[derive(Default)]
pub struct BufferConsole {
    pub input:  std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
}

#[cfg(test)]
impl BufferConsole {
    pub fn with_input(keys: &[u8]) -> BufferConsole {
        BufferConsole { input: keys.iter().copied().collect(), output: Vec::new() }
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[cfg(test)]
impl Console for BufferConsole {
    fn key_ready(&mut self) -> Result<bool> {
        Ok(!self.input.is_empty())
    }

    fn read_key(&mut self) -> Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
