//! Timestamped request logs.
//!
//! Every line is prefixed with the local time, e.g.
//! `[18/Oct/2026 14:03:59] 127.0.0.1:51234 "GET /index.html" 200`, and the
//! file is flushed after each line so entries survive a crash.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "[%d/%b/%Y %H:%M:%S] ";

#[derive(Debug)]
pub struct LogFile {
    file: File,
    path: PathBuf,
}

impl LogFile {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        let line = format!(
            "{}{}\n",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            args
        );
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }
}

/// The access log and the error log of one server.
#[derive(Debug)]
pub struct RequestLogs {
    access: LogFile,
    error: LogFile,
}

impl RequestLogs {
    pub fn open(access: impl AsRef<Path>, error: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            access: LogFile::open(access)?,
            error: LogFile::open(error)?,
        })
    }

    pub fn access(&mut self, args: fmt::Arguments<'_>) {
        Self::write(&mut self.access, args);
    }

    pub fn error(&mut self, args: fmt::Arguments<'_>) {
        Self::write(&mut self.error, args);
    }

    fn write(log: &mut LogFile, args: fmt::Arguments<'_>) {
        if let Err(e) = log.write_line(args) {
            tracing::warn!(path = %log.path().display(), error = %e, "Failed to write log line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_timestamped_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");

        let mut log = LogFile::open(&path).unwrap();
        log.write_line(format_args!("first {}", 1)).unwrap();
        drop(log);
        let mut log = LogFile::open(&path).unwrap();
        log.write_line(format_args!("second")).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] first 1"));
        assert!(lines[1].ends_with("] second"));
    }
}
