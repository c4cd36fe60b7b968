// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Log tailing and sentinel matching.
//!
//! The supervised service exposes no health check, so readiness is inferred
//! from its log output: the file is sampled at a fixed interval from a
//! starting offset, split into complete lines, and each line is checked
//! against an ordered list of sentinel substrings.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Ordered list of sentinel substrings.
///
/// Within a line the sentinel with the lowest index wins.
#[derive(Debug, Clone)]
pub struct SentinelFinder {
    sentinels: Vec<String>,
}

impl SentinelFinder {
    /// Create a finder. Index 0 is conventionally the success pattern.
    pub fn new<I, S>(sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sentinels: sentinels.into_iter().map(Into::into).collect(),
        }
    }

    /// Index of the first sentinel contained in `line`.
    pub fn find(&self, line: &str) -> Option<usize> {
        self.sentinels.iter().position(|s| line.contains(s.as_str()))
    }

    /// The sentinel strings.
    pub fn sentinels(&self) -> &[String] {
        &self.sentinels
    }
}

/// A line that matched a sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelMatch {
    /// Index of the matched sentinel.
    pub index: usize,
    /// The whole matching line.
    pub line: String,
}

impl SentinelMatch {
    /// Parse the trailing whitespace-delimited token as a port.
    pub fn trailing_port(&self) -> Option<u16> {
        self.line.split_whitespace().last()?.parse().ok()
    }
}

/// Why tailing ended without a match.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// No sentinel appeared before the deadline.
    #[error("no sentinel within {0:?}")]
    Timeout(Duration),
    /// The caller lost interest.
    #[error("tailing interrupted")]
    Interrupted,
    /// The log file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Incremental reader of complete lines appended to a file.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    partial: Vec<u8>,
}

impl LogTailer {
    /// Tail `path` starting at byte `offset`.
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            partial: Vec::new(),
        }
    }

    /// Tail `path` from its current end (or from zero if it does not exist yet).
    pub async fn from_end(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let offset = current_len(&path).await?;
        Ok(Self::new(path, offset))
    }

    /// Byte offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read complete lines appended since the last call.
    ///
    /// A missing file yields nothing. A file shorter than the current offset
    /// is treated as truncated and re-read from the start.
    pub async fn read_lines(&mut self) -> std::io::Result<Vec<String>> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            debug!(path = %self.path.display(), "Log file truncated, rewinding");
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.read_to_end(&mut buf).await?;
        self.offset += buf.len() as u64;
        self.partial.extend_from_slice(&buf);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        Ok(lines)
    }

    /// Sample the file every `interval` until a line matches `finder`.
    ///
    /// `keep_going` is checked before every sample; returning `false` ends
    /// tailing with [`TailError::Interrupted`].
    pub async fn await_sentinel(
        &mut self,
        finder: &SentinelFinder,
        interval: Duration,
        timeout: Duration,
        keep_going: impl Fn() -> bool + Send,
    ) -> Result<SentinelMatch, TailError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !keep_going() {
                return Err(TailError::Interrupted);
            }
            for line in self.read_lines().await? {
                trace!(path = %self.path.display(), line = %line, "Log line");
                if let Some(index) = finder.find(&line) {
                    return Ok(SentinelMatch { index, line });
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TailError::Timeout(timeout));
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }
}

/// Current length of `path`, zero if it does not exist.
pub async fn current_len(path: &Path) -> std::io::Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}
