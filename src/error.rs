use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("image file not found: {}", path.display())]
    ImageNotFound { path: PathBuf },

    #[error("image truncated: {len} bytes is not a whole number of words after the origin header")]
    ImageTruncated { len: usize },

    #[error("image too large: {words} words at x{origin:04X} run past xFFFF")]
    ImageTooLarge { origin: u16, words: usize },

    #[error("illegal opcode {opcode:#x} at x{addr:04X}")]
    IllegalOpcode { addr: u16, opcode: u16 },

    #[error("illegal trap vector x{vector:02X} at x{addr:04X}")]
    IllegalTrap { addr: u16, vector: u16 },

    #[error("console input closed while waiting for a key")]
    InputClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("terminal error: {0}")]
    Terminal(#[from] nix::Error),

    #[error("could not install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("debugger prompt: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

pub type Result<T> = std::result::Result<T, Error>;
