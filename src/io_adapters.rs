use std::io::{self, BufRead, BufReader, Cursor, Read, Result as IoResult, Write};
use std::sync::{Arc, Mutex};

/// The three streams a session reads from and writes to.
///
/// [`Default`] uses the process streams.
pub struct Streams {
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
    pub stdin: Box<dyn BufRead + Send>,
}

impl Streams {
    /// Streams backed by memory: reads `input`, and returns handles to the
    /// captured standard output and standard error.
    pub fn in_memory(input: impl Into<Vec<u8>>) -> (Self, MemWriter, MemWriter) {
        let stdout = MemWriter::new();
        let stderr = MemWriter::new();
        let streams = Self {
            stdout: Box::new(stdout.clone()),
            stderr: Box::new(stderr.clone()),
            stdin: Box::new(MemReader::new(input.into())),
        };
        (streams, stdout, stderr)
    }
}

impl Default for Streams {
    fn default() -> Self {
        Self {
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
            stdin: Box::new(BufReader::new(io::stdin())),
        }
    }
}

/// Memory-backed reader.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl BufRead for MemReader {
    fn fill_buf(&mut self) -> IoResult<&[u8]> {
        self.cursor.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.cursor.consume(amt);
    }
}

/// Memory-backed writer for capturing output.
///
/// Clones share the same buffer, so one clone can be handed to a session
/// while another is kept to inspect what was written.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        match self.buf.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }

    /// Drop everything written so far.
    pub fn clear(&self) {
        match self.buf.lock() {
            Ok(mut buf) => buf.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .map_err(|_| io::Error::other("output buffer poisoned"))?
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
