// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable retry spool for records the sink did not accept.
//!
//! The spool is a plain text file holding one serialized record per line:
//!
//! ```text
//! {"Timestamp":"2024-05-01T12:00:00Z","id":1}
//! {"Timestamp":"2024-05-01T12:00:03Z","id":2}
//! ```
//!
//! [`Spool::append`] adds a line at the end, [`Spool::drain_all`] reads every line and truncates
//! the file. Both run under the same lock, so an entry appended while a drain is in progress
//! lands either in the drained batch or in the file left behind, never in neither.
//!
//! # Durability
//!
//! Each append is flushed with `sync_data` before the lock is released. A crash in the middle
//! of an append can still leave a partial last line; it is returned by the next drain like any
//! other entry. Entries returned by a drain live only in memory until they are redelivered or
//! appended again.

use crate::errors::SpoolError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Owner of the spool file. All access to the file goes through this type.
#[derive(Debug)]
pub struct Spool {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Spool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Spool {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `payload` as one line, creating the file if needed.
    ///
    /// `payload` must not contain a newline; serialized JSON never does.
    pub async fn append(&self, payload: &[u8]) -> Result<(), SpoolError> {
        let _guard = self.lock.lock().await;

        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.write_error(e))?;
        file.write_all(&line)
            .await
            .map_err(|e| self.write_error(e))?;
        file.sync_data().await.map_err(|e| self.write_error(e))?;

        debug!("Spooled {} bytes to {}", payload.len(), self.path.display());
        Ok(())
    }

    /// Removes and returns every entry, oldest first.
    ///
    /// A missing file drains as empty. If the file cannot be read, or cannot be truncated after
    /// reading, an error is returned and the entries stay in the file. Once the truncate went
    /// through, the entries are returned even if syncing the emptied file fails.
    pub async fn drain_all(&self) -> Result<Vec<Vec<u8>>, SpoolError> {
        let _guard = self.lock.lock().await;

        let contents = match self.read_contents().await? {
            Some(contents) => contents,
            None => return Ok(Vec::new()),
        };
        let entries = split_entries(&contents);

        if !contents.is_empty() {
            let file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .await
                .map_err(|e| self.truncate_error(e))?;
            file.set_len(0).await.map_err(|e| self.truncate_error(e))?;
            // The file is already empty, so the entries must leave with the caller.
            if let Err(e) = file.sync_all().await {
                warn!(
                    "Failed to sync truncated spool {}, drained entries may be redelivered twice: {}",
                    self.path.display(),
                    e
                );
            }
        }

        debug!(
            "Drained {} entries from {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries)
    }

    /// Number of pending entries.
    pub async fn len(&self) -> Result<usize, SpoolError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .read_contents()
            .await?
            .map_or(0, |contents| split_entries(&contents).len()))
    }

    pub async fn is_empty(&self) -> Result<bool, SpoolError> {
        Ok(self.len().await? == 0)
    }

    // Callers must hold the lock.
    async fn read_contents(&self) -> Result<Option<Vec<u8>>, SpoolError> {
        match tokio::fs::read(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SpoolError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write_error(&self, source: std::io::Error) -> SpoolError {
        SpoolError::Write {
            path: self.path.clone(),
            source,
        }
    }

    fn truncate_error(&self, source: std::io::Error) -> SpoolError {
        SpoolError::Truncate {
            path: self.path.clone(),
            source,
        }
    }
}

/// Splits file contents into entries, dropping blank lines and a trailing `\r`.
fn split_entries(contents: &[u8]) -> Vec<Vec<u8>> {
    contents
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(<[u8]>::to_vec)
        .collect()
}
