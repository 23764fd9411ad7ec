//! Broadcast log.
//!
//! Posted messages are appended to a file. Subscribers are answered with the
//! whole file, so the log doubles as the chat history.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BroadcastLog {
    path: PathBuf,
    writer: File,
}

impl BroadcastLog {
    /// Opens the log for appending. Existing messages are kept.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, message: &[u8]) -> io::Result<()> {
        self.writer.write_all(message)?;
        self.writer.flush()
    }

    /// Opens an independent reader positioned at the first message.
    pub fn reader(&self) -> io::Result<File> {
        File::open(&self.path)
    }
}
