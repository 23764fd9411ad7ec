//! Everything a connection reaches outside its own socket: the document
//! tree, the request logs and the broadcast log.

use crate::access_log::RequestLogs;
use crate::broadcast::BroadcastLog;
use crate::config::Config;
use anyhow::Context;
use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug)]
pub struct Services {
    document_root: PathBuf,
    not_found_page: PathBuf,
    pub logs: RequestLogs,
    pub broadcast: BroadcastLog,
}

impl Services {
    pub fn open(cfg: &Config) -> anyhow::Result<Self> {
        let not_found_page = cfg.static_files.not_found_page.clone();
        if !not_found_page.is_file() {
            anyhow::bail!("error document {} does not exist", not_found_page.display());
        }

        let logs = RequestLogs::open(&cfg.logging.access_log, &cfg.logging.error_log)
            .context("opening request logs")?;
        let broadcast = BroadcastLog::open(&cfg.broadcast.log_path).with_context(|| {
            format!("opening broadcast log {}", cfg.broadcast.log_path.display())
        })?;

        Ok(Self {
            document_root: cfg.static_files.document_root.clone(),
            not_found_page,
            logs,
            broadcast,
        })
    }

    pub fn not_found_page(&self) -> &Path {
        &self.not_found_page
    }

    /// The document root with `url` appended verbatim.
    pub fn document_path(&self, url: &str) -> PathBuf {
        let mut path = OsString::from(self.document_root.as_os_str());
        path.push(url);
        PathBuf::from(path)
    }

    /// Opens the regular file `url` names below the document root.
    ///
    /// Urls with `..` segments are refused.
    pub fn open_document(&self, url: &str) -> io::Result<File> {
        if Path::new(url)
            .components()
            .any(|c| c == Component::ParentDir)
        {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "url leaves the document root",
            ));
        }

        let file = File::open(self.document_path(url))?;
        if !file.metadata()?.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a regular file"));
        }
        Ok(file)
    }

    pub fn open_not_found_page(&self) -> io::Result<File> {
        File::open(&self.not_found_page)
    }
}
