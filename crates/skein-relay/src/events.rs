use serde::Serialize;
use skein_metrics::MetricsSnapshot;
use skein_protocol::{ClientId, Message};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// Emit a JSONL event to stdout (flushed immediately for piped output).
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

/// Seconds since the Unix epoch, as a string.
pub fn now_iso() -> String {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}s", d.as_secs())
}

// ── Lifecycle ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub mode: &'static str,
    pub addr: String,
    pub timestamp: String,
}

impl EventStarted {
    pub fn new(mode: &'static str, addr: impl ToString) -> Self {
        Self {
            event: "started",
            mode,
            addr: addr.to_string(),
            timestamp: now_iso(),
        }
    }
}

#[derive(Serialize)]
pub struct EventClient {
    pub event: &'static str,
    pub id: u32,
    pub elapsed_s: f64,
}

impl EventClient {
    pub fn connected(id: ClientId, elapsed_s: f64) -> Self {
        Self {
            event: "connected",
            id: id.get(),
            elapsed_s,
        }
    }

    pub fn disconnected(id: ClientId, elapsed_s: f64) -> Self {
        Self {
            event: "disconnected",
            id: id.get(),
            elapsed_s,
        }
    }
}

// ── Traffic ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventMessage {
    pub event: &'static str,
    pub name: String,
    pub sender: u32,
    pub size: usize,
    /// Payload decoded as UTF-8, lossily.
    pub text: String,
}

impl EventMessage {
    pub fn received(message: &Message) -> Self {
        Self {
            event: "message",
            name: message.event.clone(),
            sender: message.sender.get(),
            size: message.payload.len(),
            text: String::from_utf8_lossy(&message.payload).into_owned(),
        }
    }
}

#[derive(Serialize)]
pub struct EventClients {
    pub event: &'static str,
    pub ids: Vec<u32>,
}

impl EventClients {
    pub fn new(ids: &[ClientId]) -> Self {
        Self {
            event: "clients",
            ids: ids.iter().map(|id| id.get()).collect(),
        }
    }
}

// ── Summary ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventSummary {
    pub event: &'static str,
    pub elapsed_s: f64,
    pub metrics: MetricsSnapshot,
}

impl EventSummary {
    pub fn new(metrics: MetricsSnapshot, elapsed_s: f64) -> Self {
        Self {
            event: "summary",
            elapsed_s,
            metrics,
        }
    }
}
