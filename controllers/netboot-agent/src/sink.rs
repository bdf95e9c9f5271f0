//! Boot image output

use pxe_client::{ImageSink, NetbootError, SinkStatus};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes the downloaded image to a file, block by block.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes: u64,
}

impl FileSink {
    /// Create (or truncate) `path`
    pub fn create(path: &Path) -> std::io::Result<Self> {
        Ok(Self { path: path.to_path_buf(), writer: BufWriter::new(File::create(path)?), bytes: 0 })
    }

    /// Bytes written so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Throw away a partial image before the next attempt
    fn restart(&mut self) -> std::io::Result<()> {
        self.writer = BufWriter::new(File::create(&self.path)?);
        self.bytes = 0;
        Ok(())
    }
}

impl ImageSink for FileSink {
    fn accept(&mut self, data: &[u8], block: u32, eof: bool) -> Result<SinkStatus, NetbootError> {
        if block == 1 && self.bytes > 0 {
            self.restart()?;
        }
        self.writer.write_all(data)?;
        self.bytes += data.len() as u64;
        if !eof {
            return Ok(SinkStatus::More);
        }
        self.writer.flush()?;
        info!(path = %self.path.display(), bytes = self.bytes, "Boot image written");
        Ok(SinkStatus::Complete)
    }
}
