use std::io::IsTerminal;
use std::os::fd::{AsFd, AsRawFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

use crate::error::Result;

/// Keeps stdin in non-canonical, no-echo mode for as long as it lives.
/// The saved settings are restored on drop, so every exit path (including
/// an unwinding panic) gives the user their terminal back.
pub struct RawMode {
    orig: Option<Termios>,
}

impl RawMode {
    pub fn enter() -> Result<RawMode> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return Ok(RawMode { orig: None });
        }

        let orig = termios::tcgetattr(stdin.as_fd())?;
        let mut term = orig.clone();
        // Unset canonical mode, so we get characters immediately
        term.local_flags.remove(LocalFlags::ICANON);
        // Disable local echo. ISIG stays on so Ctrl-C still raises SIGINT.
        term.local_flags.remove(LocalFlags::ECHO);
        termios::tcsetattr(stdin.as_fd(), SetArg::TCSADRAIN, &term)?;
        log::debug!("terminal switched to raw mode");

        Ok(RawMode { orig: Some(orig) })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Some(orig) = &self.orig {
            let stdin = std::io::stdin();
            match termios::tcsetattr(stdin.as_fd(), SetArg::TCSADRAIN, orig) {
                Ok(())  => log::debug!("terminal restored"),
                Err(e)  => log::error!("could not restore terminal settings: {}", e),
            }
        }
    }
}

/// Waits up to `timeout` for stdin to become readable. A signal arriving
/// while waiting counts as "nothing yet".
pub fn wait_input(timeout: PollTimeout) -> Result<bool> {
    let stdin = std::io::stdin();
    let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, timeout) {
        Ok(0)             => Ok(false),
        Ok(_)             => Ok(true),
        Err(Errno::EINTR) => Ok(false),
        Err(e)            => Err(e.into()),
    }
}

pub fn check_input() -> Result<bool> {
    wait_input(PollTimeout::ZERO)
}

/// Reads one byte straight from the stdin descriptor, bypassing std's
/// buffer so that `poll` stays an accurate readiness test.
pub fn getch() -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match nix::unistd::read(std::io::stdin().as_raw_fd(), &mut buf) {
            Ok(0)             => return Ok(None),
            Ok(_)             => return Ok(Some(buf[0])),
            Err(Errno::EINTR) => continue,
            Err(e)            => return Err(e.into()),
        }
    }
}
