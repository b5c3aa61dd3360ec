//! Host directory: a line-oriented alias file.
//!
//! Each line has the form `alias username@address[:port]`. The file is an
//! append-only log: entries are never rewritten or deduplicated, and lookups
//! return the first line whose alias matches.
//!
//! Reads are forgiving. A directory that cannot be opened is treated as empty
//! and lines without exactly two whitespace-separated tokens are skipped.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{QsshError, Result};
use crate::types::{DEFAULT_SSH_PORT, HostDescriptor};

/// Alias file backed by a path on disk.
#[derive(Debug, Clone)]
pub struct HostDirectory {
    path: PathBuf,
}

impl HostDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up `alias`, scanning entries in file order.
    ///
    /// Returns [`QsshError::UnknownHost`] when no entry matches and
    /// [`QsshError::MalformedEntry`] when the first match has an unusable target.
    pub fn resolve(&self, alias: &str) -> Result<HostDescriptor> {
        for line in self.entries().iter() {
            let mut tokens = line.split_whitespace();
            let (Some(name), Some(target), None) = (tokens.next(), tokens.next(), tokens.next())
            else {
                continue;
            };

            if name != alias {
                continue;
            }

            debug!("Resolved alias {} to {}", alias, target);
            return parse_target(target).map_err(|reason| QsshError::MalformedEntry {
                alias: alias.to_string(),
                target: target.to_string(),
                reason,
            });
        }

        Err(QsshError::UnknownHost(alias.to_string()))
    }

    /// Append `alias target` to the end of the directory.
    ///
    /// Neither uniqueness nor the target's shape is checked.
    pub fn append(&self, alias: &str, target: &str) -> Result<()> {
        let to_error = |source: std::io::Error| QsshError::Directory {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(to_error)?;

        file.write_all(format!("{} {}\n", alias, target).as_bytes())
            .map_err(to_error)?;

        debug!("Appended {} to {}", alias, self.path.display());
        Ok(())
    }

    /// Raw entries in file order, for display.
    pub fn entries(&self) -> Entries<'_> {
        Entries { path: &self.path }
    }
}

/// Restartable view over the directory's lines.
///
/// Each call to [`Entries::iter`] reopens the file and streams it lazily.
#[derive(Debug, Clone, Copy)]
pub struct Entries<'a> {
    path: &'a Path,
}

impl Entries<'_> {
    pub fn iter(&self) -> EntryIter {
        let lines = match File::open(self.path) {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(e) => {
                debug!(
                    "Host directory {} unreadable, treating as empty: {}",
                    self.path.display(),
                    e
                );
                None
            }
        };
        EntryIter { lines }
    }
}

impl IntoIterator for &Entries<'_> {
    type Item = String;
    type IntoIter = EntryIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy line iterator; stops at the first read error.
pub struct EntryIter {
    lines: Option<Lines<BufReader<File>>>,
}

impl Iterator for EntryIter {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            match lines.next()? {
                Ok(line) => {
                    let line = line.trim_end_matches('\r');
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(line.to_string());
                }
                Err(e) => {
                    debug!("Stopped reading host directory: {}", e);
                    self.lines = None;
                    return None;
                }
            }
        }
    }
}

/// Parse `username@address[:port]` into a descriptor.
///
/// A remainder with more than one `:` is taken as a bare IPv6 address on the
/// default port.
pub fn parse_target(target: &str) -> Result<HostDescriptor, String> {
    let (username, remainder) = target
        .split_once('@')
        .ok_or_else(|| "missing '@'".to_string())?;

    let parts: Vec<&str> = remainder.split(':').collect();
    match parts.as_slice() {
        [address, port] => {
            let port = port
                .parse::<u16>()
                .map_err(|e| format!("invalid port number: {}", e))?;
            Ok(HostDescriptor::new(username, *address, port))
        }
        _ => Ok(HostDescriptor::new(username, remainder, DEFAULT_SSH_PORT)),
    }
}
