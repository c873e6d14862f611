// Program images: a big-endian origin word followed by big-endian words.

use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::memory::Memory;

// One past the highest address an image may fill. xFFFF is left to the machine.
const LOAD_LIMIT: usize = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    origin: u16,
    words:  Vec<u16>,
}

impl Image {
    pub fn origin(&self) -> u16 {
        self.origin
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn read(mut rd: impl Read) -> Result<Image> {
        let mut bytes = Vec::new();
        rd.read_to_end(&mut bytes)?;
        Image::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Image> {
        if bytes.len() < 2 || bytes.len() % 2 != 0 {
            return Err(Error::ImageTruncated { len: bytes.len() });
        }

        let origin = BigEndian::read_u16(&bytes[..2]);
        let body = &bytes[2..];
        let words = body.len() / 2;
        if origin as usize + words > LOAD_LIMIT {
            return Err(Error::ImageTooLarge { origin, words });
        }

        let mut image = Image { origin, words: vec![0; words] };
        BigEndian::read_u16_into(body, &mut image.words);
        Ok(image)
    }

    pub fn read_file(path: &Path) -> Result<Image> {
        let f = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ImageNotFound { path: path.to_path_buf() },
            _                            => Error::Io(e),
        })?;
        let image = Image::read(std::io::BufReader::new(f))?;
        log::info!("loaded {} @ x{:04X} ({} words)", path.display(), image.origin(), image.words().len());
        Ok(image)
    }

    pub fn load_into(&self, mem: &mut Memory) {
        mem.load(self.origin, &self.words);
    }
}
