//! Output sinks for the emitter.
//!
//! An emitter owns exactly one sink for its whole lifetime. Files are
//! opened read-write because UltiGCode finalisation seeks back into the
//! first kilobyte to patch header placeholders; stdout cannot rewind,
//! so tag patching is logged and skipped there. The in-memory sink
//! renders the full stream into a buffer, which also makes it the
//! natural sink for tests.

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{info, warn};

/// Window at the start of the stream searched for header tags.
const TAG_WINDOW: usize = 1024;

/// Where emitted G-code bytes go.
pub struct Sink {
    kind: SinkKind,
    written: u64,
}

enum SinkKind {
    Stdout(io::Stdout),
    File(BufWriter<File>),
    Memory(Cursor<Vec<u8>>),
}

impl Sink {
    /// Standard output. Not rewindable: header tags stay unpatched.
    pub fn stdout() -> Self {
        Self {
            kind: SinkKind::Stdout(io::stdout()),
            written: 0,
        }
    }

    /// In-memory buffer, readable back through [`Sink::memory_contents`].
    pub fn memory() -> Self {
        Self {
            kind: SinkKind::Memory(Cursor::new(Vec::new())),
            written: 0,
        }
    }

    /// Create (or truncate) a file. Opened read-write so the header can
    /// be patched in place during finalisation.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            kind: SinkKind::File(BufWriter::new(file)),
            written: 0,
        })
    }

    /// Write a full buffer.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.kind {
            SinkKind::Stdout(out) => out.write_all(bytes)?,
            SinkKind::File(file) => file.write_all(bytes)?,
            SinkKind::Memory(buffer) => buffer.write_all(bytes)?,
        }
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flush buffered bytes through to the underlying stream.
    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.kind {
            SinkKind::Stdout(out) => out.flush(),
            SinkKind::File(file) => file.flush(),
            SinkKind::Memory(_) => Ok(()),
        }
    }

    /// Whether the sink supports seeking back into emitted output.
    pub fn rewindable(&self) -> bool {
        !matches!(self.kind, SinkKind::Stdout(_))
    }

    /// Total bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Rendered bytes of an in-memory sink.
    pub fn memory_contents(&self) -> Option<&[u8]> {
        match &self.kind {
            SinkKind::Memory(buffer) => Some(buffer.get_ref().as_slice()),
            _ => None,
        }
    }

    /// Replace `tag` with `value` inside the first kilobyte of output,
    /// blank-padding the rest of the tag, then restore the write
    /// position. Returns whether the tag was found.
    ///
    /// `value` must not be longer than the tag it replaces. On a
    /// non-rewindable sink the replacement is logged and skipped.
    pub fn patch_near_start(&mut self, tag: &str, value: &str) -> Result<bool> {
        if value.len() > tag.len() {
            return Err(Error::Config(format!(
                "replacement '{value}' longer than tag '{tag}'"
            )));
        }
        match &mut self.kind {
            SinkKind::Stdout(_) => {
                info!(tag, value, "sink not rewindable, header tag left in place");
                Ok(false)
            }
            SinkKind::File(file) => {
                file.flush()?;
                patch_stream(file.get_mut(), tag, value)
            }
            SinkKind::Memory(buffer) => patch_stream(buffer, tag, value),
        }
    }

    /// Log the size of the emitted stream, the way a slicer reports it
    /// at the end of a run.
    pub fn log_size(&self) {
        let bytes = self.written as f64;
        if bytes > 1024.0 * 1024.0 {
            info!("wrote {:5.1} MB", bytes / (1024.0 * 1024.0));
        } else if bytes > 1024.0 {
            info!("wrote {:5.1} kB", bytes / 1024.0);
        } else {
            info!("wrote {} bytes", self.written);
        }
    }
}

fn patch_stream<S: Read + Write + Seek>(stream: &mut S, tag: &str, value: &str) -> Result<bool> {
    let old_pos = stream.stream_position()?;
    stream.seek(SeekFrom::Start(0))?;

    let mut buffer = [0u8; TAG_WINDOW];
    let mut filled = 0;
    loop {
        let n = stream.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buffer.len() {
            break;
        }
    }

    let found = buffer[..filled]
        .windows(tag.len())
        .position(|window| window == tag.as_bytes());
    let Some(at) = found else {
        warn!(tag, window = TAG_WINDOW, "header tag not found near start of output");
        stream.seek(SeekFrom::Start(old_pos))?;
        return Ok(false);
    };

    buffer[at..at + tag.len()].fill(b' ');
    buffer[at..at + value.len()].copy_from_slice(value.as_bytes());

    stream.seek(SeekFrom::Start(0))?;
    stream.write_all(&buffer[..filled])?;
    stream.seek(SeekFrom::Start(old_pos))?;
    Ok(true)
}
