//! Named, ordered line sources and sinks.
//!
//! The protocol moves lines, not bytes.  A [`LineSource`] hands out the
//! lines of one item in order; a [`LineSink`] collects the lines of one
//! received item.  File-backed and in-memory implementations of both are
//! provided.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A named item that can be read line by line, from the start, repeatedly.
pub trait LineSource {
    /// Item name as it travels on the wire.
    fn name(&self) -> &str;

    /// Go back to the first line.
    fn rewind(&mut self) -> io::Result<()>;

    /// Next line without its terminator, or `None` at the end.
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Destination for the lines of one received item.
pub trait LineSink {
    fn append(&mut self, line: &str) -> io::Result<()>;

    /// Make everything appended so far durable.
    fn flush(&mut self) -> io::Result<()>;

    /// Close the sink and return every line it captured, in order.
    fn close(self) -> io::Result<Vec<String>>;
}

/// Opens a sink the first time an item name is seen.
pub trait SinkFactory {
    type Sink: LineSink;

    fn create(&mut self, item: &str) -> io::Result<Self::Sink>;
}

impl<S, F> SinkFactory for F
where
    S: LineSink,
    F: FnMut(&str) -> io::Result<S>,
{
    type Sink = S;

    fn create(&mut self, item: &str) -> io::Result<S> {
        self(item)
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// A text file read line by line.  The item name is the file name.
#[derive(Debug)]
pub struct FileSource {
    name: String,
    reader: BufReader<File>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let reader = BufReader::new(File::open(path)?);
        Ok(Self { name, reader })
    }
}

impl LineSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

/// A text file written one line at a time.
///
/// The appended lines are also kept in memory, so [`LineSink::close`]
/// returns them exactly as given rather than as re-read from disk.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: Vec<String>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            writer,
            lines: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSink for FileSink {
    fn append(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")?;
        self.lines.push(line.to_owned());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn close(mut self) -> io::Result<Vec<String>> {
        self.writer.flush()?;
        Ok(self.lines)
    }
}

/// Creates one [`FileSink`] per received item inside a directory.
#[derive(Debug, Clone)]
pub struct DirSinks {
    dir: PathBuf,
}

impl DirSinks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SinkFactory for DirSinks {
    type Sink = FileSink;

    fn create(&mut self, item: &str) -> io::Result<FileSink> {
        // Names come off the wire: never let one escape the directory.
        if item.is_empty()
            || item == "."
            || item == ".."
            || item.contains(['/', '\\'])
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing item name {item:?}"),
            ));
        }
        FileSink::create(self.dir.join(item))
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// An item held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    lines: Vec<String>,
    cursor: usize,
}

impl MemorySource {
    pub fn new<I, L>(name: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            name: name.into(),
            lines: lines.into_iter().map(Into::into).collect(),
            cursor: 0,
        }
    }
}

impl LineSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next_line(&mut self) -> io::Result<Option<String>> {
        let line = self.lines.get(self.cursor).cloned();
        if line.is_some() {
            self.cursor += 1;
        }
        Ok(line)
    }
}

/// Collects lines in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySink {
    lines: Vec<String>,
    /// Number of `flush` calls, handy for asserting durability points.
    pub flushes: usize,
}

impl LineSink for MemorySink {
    fn append(&mut self, line: &str) -> io::Result<()> {
        self.lines.push(line.to_owned());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn close(self) -> io::Result<Vec<String>> {
        Ok(self.lines)
    }
}

/// Factory for [`MemorySink`]s.
pub fn memory_sinks() -> impl FnMut(&str) -> io::Result<MemorySink> {
    |_item: &str| Ok(MemorySink::default())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn drain(source: &mut impl LineSource) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = source.next_line().unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn file_source_strips_terminators_and_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file_1.txt");
        fs::write(&path, "one\r\ntwo\n\nlast without newline").unwrap();

        let mut source = FileSource::open(&path).unwrap();
        assert_eq!(source.name(), "file_1.txt");
        let first = drain(&mut source);
        assert_eq!(first, vec!["one", "two", "", "last without newline"]);

        source.rewind().unwrap();
        assert_eq!(drain(&mut source), first);
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::open(dir.path().join("absent.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn file_sink_round_trips_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut sinks = DirSinks::new(dir.path());
        let mut sink = sinks.create("out.txt").unwrap();
        sink.append("alpha").unwrap();
        sink.append("").unwrap();
        sink.flush().unwrap();
        sink.append("gamma").unwrap();
        let path = sink.path().to_path_buf();

        assert_eq!(sink.close().unwrap(), vec!["alpha", "", "gamma"]);
        assert_eq!(fs::read_to_string(path).unwrap(), "alpha\n\ngamma\n");
    }

    #[test]
    fn file_sink_returns_lines_as_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::create(dir.path().join("cr.txt")).unwrap();
        sink.append("first\r").unwrap();
        sink.append("x\r").unwrap();
        assert_eq!(sink.close().unwrap(), vec!["first\r", "x\r"]);
    }

    #[test]
    fn dir_sinks_refuse_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut sinks = DirSinks::new(dir.path());
        for bad in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            assert!(sinks.create(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn memory_source_and_sink() {
        let mut source = MemorySource::new("m", ["x", "y"]);
        assert_eq!(drain(&mut source), vec!["x", "y"]);
        assert_eq!(source.next_line().unwrap(), None);

        let mut factory = memory_sinks();
        let mut sink = factory.create("m").unwrap();
        sink.append("x").unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.flushes, 1);
        assert_eq!(sink.close().unwrap(), vec!["x"]);
    }
}
