use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::collab::{ConnectTarget, Transport, TransportEvent};

const READ_CHUNK: usize = 64 * 1024;

/// Events tagged with the connection attempt that produced them.
type Tagged = (u64, TransportEvent);

/// A [`Transport`] over plain TCP, driven by tokio tasks.
///
/// Each `open` starts a new connection attempt. Events from an attempt
/// that has since been replaced are dropped by [`TransportEvents`].
#[derive(Debug)]
pub struct TcpTransport {
    events: mpsc::UnboundedSender<Tagged>,
    generation: Arc<AtomicU64>,
    writer: Option<mpsc::UnboundedSender<Bytes>>,
    task: Option<JoinHandle<()>>,
}

/// Receiving end for a [`TcpTransport`]'s events.
#[derive(Debug)]
pub struct TransportEvents {
    rx: mpsc::UnboundedReceiver<Tagged>,
    generation: Arc<AtomicU64>,
}

impl TransportEvents {
    /// Next event of the current connection attempt.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            let (generation, event) = self.rx.recv().await?;
            if generation == self.generation.load(Ordering::Acquire) {
                return Some(event);
            }
            debug!("dropping stale transport event {event:?}");
        }
    }
}

#[derive(Clone)]
struct EventSink {
    tx: mpsc::UnboundedSender<Tagged>,
    generation: u64,
}

impl EventSink {
    fn emit(&self, event: TransportEvent) {
        // Receiver gone means the client is shutting down.
        let _ = self.tx.send((self.generation, event));
    }
}

impl TcpTransport {
    pub fn new() -> (Self, TransportEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        (
            Self {
                events: tx,
                generation: Arc::clone(&generation),
                writer: None,
                task: None,
            },
            TransportEvents { rx, generation },
        )
    }

    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn sink(&self) -> EventSink {
        EventSink {
            tx: self.events.clone(),
            generation: self.generation.load(Ordering::Acquire),
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, target: &ConnectTarget, _protocols: &[&str]) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        let sink = self.sink();

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                sink.emit(TransportEvent::Closed {
                    code: None,
                    reason: format!("no async runtime: {e}"),
                });
                return;
            }
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = format!("{}:{}", target.host, target.port);
        self.writer = Some(tx);
        self.task = Some(handle.spawn(run_connection(addr, rx, sink)));
    }

    fn close(&mut self) {
        self.writer = None;
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                task.abort();
                self.sink().emit(TransportEvent::Closed {
                    code: Some(1000),
                    reason: String::new(),
                });
            }
        }
    }

    fn send(&mut self, frame: Bytes) {
        match &self.writer {
            Some(writer) => {
                if writer.send(frame).is_err() {
                    debug!("send after writer stopped");
                }
            }
            None => warn!("send on a closed transport"),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Tasks ────────────────────────────────────────────────────────

async fn run_connection(addr: String, outgoing: mpsc::UnboundedReceiver<Bytes>, sink: EventSink) {
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            sink.emit(TransportEvent::Closed {
                code: None,
                reason: e.to_string(),
            });
            return;
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!("cannot set TCP_NODELAY: {e}");
    }
    debug!("connected to {addr}");
    sink.emit(TransportEvent::Opened);

    let (reader, writer) = stream.into_split();

    // Writer task: engine -> network
    let writer_task = tokio::spawn(write_loop(writer, outgoing, sink.clone()));

    // Reader: network -> engine
    let reason = read_loop(reader, &sink).await;
    writer_task.abort();
    sink.emit(TransportEvent::Closed { code: None, reason });
}

async fn read_loop(mut reader: OwnedReadHalf, sink: &EventSink) -> String {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => return "connection closed by peer".to_owned(),
            Ok(_) => sink.emit(TransportEvent::Data(buf.split().freeze())),
            Err(e) => return e.to_string(),
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
    sink: EventSink,
) {
    while let Some(frame) = outgoing.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            sink.emit(TransportEvent::Error(e.to_string()));
            return;
        }
    }
    // Sender dropped: half-close so the peer sees EOF.
    let _ = writer.shutdown().await;
}
