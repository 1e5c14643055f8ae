use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::{Mutex, mpsc},
};

use crate::types::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressErrorKind {
    Closed,
    QueueClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressError {
    pub kind: IngressErrorKind,
    pub message: String,
}

impl IngressError {
    fn closed() -> Self {
        Self {
            kind: IngressErrorKind::Closed,
            message: "event ingress gate is closed".to_string(),
        }
    }

    fn queue_closed() -> Self {
        Self {
            kind: IngressErrorKind::QueueClosed,
            message: "event queue receiver is closed".to_string(),
        }
    }
}

impl fmt::Display for IngressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IngressError {}

/// Bounded producer side of the event queue. Once the gate is closed no
/// further events are accepted, so the loop can drain what is left.
#[derive(Clone)]
pub struct EventIngress {
    gate_open: Arc<AtomicBool>,
    send_lock: Arc<Mutex<()>>,
    tx: mpsc::Sender<Event>,
}

impl EventIngress {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self {
            gate_open: Arc::new(AtomicBool::new(true)),
            send_lock: Arc::new(Mutex::new(())),
            tx,
        }
    }

    pub fn is_open(&self) -> bool {
        self.gate_open.load(Ordering::Acquire)
    }

    pub async fn send(&self, event: Event) -> Result<(), IngressError> {
        let _guard = self.send_lock.lock().await;
        if !self.gate_open.load(Ordering::Acquire) {
            return Err(IngressError::closed());
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| IngressError::queue_closed())
    }

    pub async fn close_gate(&self) {
        let _guard = self.send_lock.lock().await;
        self.gate_open.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// Feeds NDJSON events into the ingress until EOF or the gate closes.
/// Malformed lines are logged and skipped.
pub async fn read_ndjson<R>(reader: R, ingress: &EventIngress) -> std::io::Result<ReadReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut report = ReadReport::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<Event>(trimmed) {
            Ok(event) => event,
            Err(err) => {
                report.rejected += 1;
                tracing::warn!(
                    target: "runtime",
                    line = line_no,
                    error = %err,
                    "event_line_rejected"
                );
                continue;
            }
        };

        if let Err(err) = ingress.send(event).await {
            tracing::info!(
                target: "runtime",
                line = line_no,
                reason = %err,
                "event_reading_stopped"
            );
            break;
        }
        report.accepted += 1;
    }

    Ok(report)
}
