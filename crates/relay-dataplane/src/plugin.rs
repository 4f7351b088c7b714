//! Input / Output contracts
//!
//! An [`Input`] yields one complete framed record per `read`; an [`Output`]
//! accepts one complete framed record per `write`. How the bytes reach the
//! wire (sniffer, file, socket) is the plugin's business.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use relay_common::{RecordId, RecordKind, Timestamp, LATENCY_UNKNOWN};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use crate::envelope::{frame, Header};

/// Record source
#[async_trait]
pub trait Input: Send {
    /// Next framed record, `Ok(None)` at end of stream
    async fn read(&mut self) -> io::Result<Option<Bytes>>;

    /// Name for logs and error reports
    fn name(&self) -> &str;
}

/// Record sink
///
/// Shared by every reading task, so writes take `&self`.
#[async_trait]
pub trait Output: Send + Sync {
    /// Write one framed record
    async fn write(&self, frame: Bytes) -> io::Result<()>;

    /// Name for logs and error reports
    fn name(&self) -> &str;
}

/// In-memory input fed through a channel (for testing and embedding)
pub struct MemoryInput {
    name: String,
    rx: mpsc::UnboundedReceiver<io::Result<Bytes>>,
}

/// Feeding side of a [`MemoryInput`]. Dropping it ends the stream.
#[derive(Clone)]
pub struct MemorySource {
    tx: mpsc::UnboundedSender<io::Result<Bytes>>,
}

impl MemoryInput {
    /// Create input and its feeding handle
    pub fn new(name: impl Into<String>) -> (Self, MemorySource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                rx,
            },
            MemorySource { tx },
        )
    }
}

#[async_trait]
impl Input for MemoryInput {
    async fn read(&mut self) -> io::Result<Option<Bytes>> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl MemorySource {
    /// Emit raw frame bytes. Returns `false` once the input is gone.
    pub fn emit_bytes(&self, frame: impl Into<Bytes>) -> bool {
        self.tx.send(Ok(frame.into())).is_ok()
    }

    /// Emit a GET request with a fresh id; returns that id
    pub fn emit_get(&self) -> RecordId {
        let id = RecordId::generate();
        let header = Header::full(RecordKind::Request, id, Timestamp::now(), LATENCY_UNKNOWN);
        self.emit_bytes(frame(&header, b"GET / HTTP/1.1\r\n\r\n"));
        id
    }

    /// Make the next read fail
    pub fn emit_error(&self, err: io::Error) -> bool {
        self.tx.send(Err(err)).is_ok()
    }
}

type WriteHook = Box<dyn Fn(&Bytes) + Send + Sync>;

/// In-memory output recording every frame it accepts
pub struct MemoryOutput {
    name: String,
    frames: Mutex<Vec<Bytes>>,
    on_write: Option<WriteHook>,
    failing: AtomicBool,
    notify: Notify,
}

impl MemoryOutput {
    /// Create output
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: Mutex::new(Vec::new()),
            on_write: None,
            failing: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Run `hook` on every accepted frame
    pub fn on_write<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.on_write = Some(Box::new(hook));
        self
    }

    /// Reject every write from now on
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Frames accepted so far
    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }

    /// Number of frames accepted so far
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` frames were accepted. Returns `false` on
    /// timeout.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> bool {
        let reached = async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(limit, reached).await.is_ok()
    }
}

#[async_trait]
impl Output for MemoryOutput {
    async fn write(&self, frame: Bytes) -> io::Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output rejected write"));
        }
        if let Some(hook) = &self.on_write {
            hook(&frame);
        }
        self.frames.lock().push(frame);
        self.notify.notify_waiters();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::decode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_input_stream() {
        let (mut input, source) = MemoryInput::new("mem");
        let id = source.emit_get();
        source.emit_error(io::Error::new(io::ErrorKind::Other, "boom"));
        drop(source);

        let first = input.read().await.unwrap().unwrap();
        assert_eq!(decode(&first).unwrap().header.id, id);
        assert!(input.read().await.is_err());
        assert!(input.read().await.unwrap().is_none());
        assert_eq!(input.name(), "mem");
    }

    #[tokio::test]
    async fn test_memory_output_records() {
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = seen.clone();
        let output = MemoryOutput::new("out").on_write(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        output.write(Bytes::from_static(b"one")).await.unwrap();
        output.write(Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(output.frames(), vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert_eq!(seen.load(Ordering::Relaxed), 2);
        assert!(output.wait_for(2, Duration::from_millis(10)).await);
        assert!(!output.wait_for(3, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_memory_output_failing() {
        let output = MemoryOutput::new("out");
        output.set_failing(true);
        assert!(output.write(Bytes::from_static(b"x")).await.is_err());
        assert!(output.is_empty());

        output.set_failing(false);
        assert!(output.write(Bytes::from_static(b"x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_write() {
        let output = Arc::new(MemoryOutput::new("out"));
        let writer = output.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.write(Bytes::from_static(b"late")).await.unwrap();
        });

        assert!(output.wait_for(1, Duration::from_secs(5)).await);
    }
}
