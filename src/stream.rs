// SPDX-License-Identifier: MIT
//! Console log stream owned by the telemetry pipeline.
//!
//! [`LogStream`] is the sink behind the console formatting layer. It is an
//! explicit, cloneable context object: the pipeline creates one, hands it to
//! `tracing_subscriber::fmt` as a [`MakeWriter`], and keeps a clone to flush,
//! rotate ([`LogStream::replace`]) or close it. There is no global stream.
//!
//! Each formatted event is buffered in its own writer and committed to the
//! sink in a single locked write when the writer is dropped, so concurrent
//! events never interleave. Records above the size cap are truncated at a
//! character boundary. Once the stream is closed, records are counted as
//! dropped and discarded; logging never fails because of the sink.
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Boxed sink type accepted by [`LogStream`].
pub type Sink = Box<dyn Write + Send>;

/// Counters describing what happened to committed records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Records written to the sink.
    pub records: u64,
    /// Records shortened to fit the size cap.
    pub truncated: u64,
    /// Records discarded because the stream was closed or the sink failed.
    pub dropped: u64,
}

struct Shared {
    sink: Mutex<Option<Sink>>,
    records: AtomicU64,
    truncated: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn commit(&self, mut record: Vec<u8>, max_record_bytes: usize) {
        if max_record_bytes > 0 && record.len() > max_record_bytes {
            truncate_record(&mut record, max_record_bytes);
            self.truncated.fetch_add(1, Ordering::Relaxed);
        }
        let mut sink = self.sink.lock();
        let written = match sink.as_mut() {
            Some(sink) => sink.write_all(&record).is_ok(),
            None => false,
        };
        let counter = if written { &self.records } else { &self.dropped };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cut `record` to at most `max` bytes, ending on a char boundary and a newline.
fn truncate_record(record: &mut Vec<u8>, max: usize) {
    let mut cut = max.saturating_sub(1);
    while cut > 0 && (record[cut] & 0xC0) == 0x80 {
        cut -= 1;
    }
    record.truncate(cut);
    record.push(b'\n');
}

/// Cloneable handle to a shared console sink.
#[derive(Clone)]
pub struct LogStream {
    shared: Arc<Shared>,
    max_record_bytes: usize,
}

impl LogStream {
    /// Wrap an arbitrary sink. No size cap is applied until
    /// [`with_max_record_bytes`](Self::with_max_record_bytes) is called.
    pub fn new<W>(sink: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                sink: Mutex::new(Some(Box::new(sink))),
                records: AtomicU64::new(0),
                truncated: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            max_record_bytes: 0,
        }
    }

    /// Stream writing to the process stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Cap each record at `max` bytes; `0` disables the cap.
    #[must_use]
    pub fn with_max_record_bytes(mut self, max: u64) -> Self {
        self.max_record_bytes = usize::try_from(max).unwrap_or(usize::MAX);
        self
    }

    /// Swap in a new sink and return the previous one, if the stream was open.
    /// The previous sink is returned unflushed.
    pub fn replace<W>(&self, sink: W) -> Option<Sink>
    where
        W: Write + Send + 'static,
    {
        self.shared.sink.lock().replace(Box::new(sink))
    }

    /// Flush and release the sink. Later records are dropped.
    ///
    /// # Errors
    /// Returns the sink's flush error; the stream is closed regardless.
    pub fn close(&self) -> io::Result<()> {
        let sink = self.shared.sink.lock().take();
        match sink {
            Some(mut sink) => sink.flush(),
            None => Ok(()),
        }
    }

    /// Whether [`close`](Self::close) has been called without a later `replace`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.sink.lock().is_none()
    }

    /// Flush the sink if the stream is open.
    ///
    /// # Errors
    /// Returns the sink's flush error.
    pub fn flush(&self) -> io::Result<()> {
        match self.shared.sink.lock().as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }

    /// Snapshot of the record counters.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            records: self.shared.records.load(Ordering::Relaxed),
            truncated: self.shared.truncated.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStream")
            .field("closed", &self.is_closed())
            .field("max_record_bytes", &self.max_record_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<'a> MakeWriter<'a> for LogStream {
    type Writer = LogStreamWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogStreamWriter {
            shared: Arc::clone(&self.shared),
            max_record_bytes: self.max_record_bytes,
            buffer: Vec::new(),
        }
    }
}

/// Per-event writer; commits its record when dropped.
pub struct LogStreamWriter {
    shared: Arc<Shared>,
    max_record_bytes: usize,
    buffer: Vec<u8>,
}

impl Write for LogStreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogStreamWriter {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let record = std::mem::take(&mut self.buffer);
        self.shared.commit(record, self.max_record_bytes);
    }
}
