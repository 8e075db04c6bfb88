//! Merge of received items into the single artifact sent back.
//!
//! Items are ordered by name (byte-wise), never by arrival, so the same
//! uploads always produce the same artifact.  Each item contributes one
//! header line carrying its name, followed by its lines.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::lines::MemorySource;
use crate::receiver::ReceivedItem;

/// The merged artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    lines: Vec<String>,
}

impl Artifact {
    pub fn merge(items: &[ReceivedItem]) -> Self {
        let mut sorted: Vec<&ReceivedItem> = items.iter().collect();
        sorted.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        let total = sorted.iter().map(|i| i.lines.len() + 1).sum();
        let mut lines = Vec::with_capacity(total);
        for item in sorted {
            lines.push(item.name.clone());
            lines.extend(item.lines.iter().cloned());
        }
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Write the artifact as a text file, one line per row.
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for line in &self.lines {
            writeln!(out, "{line}")?;
        }
        out.flush()
    }

    /// The artifact as an item that can be scheduled for sending.
    pub fn to_source(&self, name: &str) -> MemorySource {
        MemorySource::new(name, self.lines.iter().cloned())
    }
}
