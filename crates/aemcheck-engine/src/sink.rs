//! Operator-facing output.
//!
//! The engine never prints. Everything it has to say goes through an
//! [`OutputSink`] supplied by the embedding program, wrapped in a
//! [`Reporter`] that also mirrors each message into `tracing`.

use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostColor {
    #[default]
    Default,
    Green,
    Red,
    Yellow,
}

/// Rendering hints for host-channel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStyle {
    pub new_line: bool,
    pub color: HostColor,
}

impl HostStyle {
    pub const LINE: HostStyle = HostStyle { new_line: true, color: HostColor::Default };
    pub const INLINE: HostStyle = HostStyle { new_line: false, color: HostColor::Default };

    pub fn colored(color: HostColor) -> Self {
        Self { new_line: true, color }
    }

    pub fn inline_colored(color: HostColor) -> Self {
        Self { new_line: false, color }
    }
}

impl Default for HostStyle {
    fn default() -> Self {
        Self::LINE
    }
}

/// Four message classes. `error` also marks the run as failed for the
/// embedding shell.
pub trait OutputSink: Send + Sync {
    fn host(&self, message: &str, style: HostStyle);
    fn verbose(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

// ── Reporter ──────────────────────────────────────────────────────────────────

/// Cloneable handle the engine components share.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn OutputSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }

    pub fn host(&self, message: &str, style: HostStyle) {
        debug!(channel = "host", "{}", message);
        self.sink.host(message, style);
    }

    pub fn verbose(&self, message: &str) {
        debug!(channel = "verbose", "{}", message);
        self.sink.verbose(message);
    }

    pub fn warning(&self, message: &str) {
        warn!("{}", message);
        self.sink.warning(message);
    }

    pub fn error(&self, message: &str) {
        error!("{}", message);
        self.sink.error(message);
    }
}

// ── MemorySink ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMessage {
    Host { text: String, style: HostStyle },
    Verbose(String),
    Warning(String),
    Error(String),
}

/// Records every message in order. Used by tests and by embedders that
/// want to render the transcript themselves.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<SinkMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, message: SinkMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }

    pub fn messages(&self) -> Vec<SinkMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SinkMessage::Warning(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn verbose_lines(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SinkMessage::Verbose(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SinkMessage::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Host output as a terminal would show it.
    pub fn host_transcript(&self) -> String {
        let mut out = String::new();
        for m in self.messages() {
            if let SinkMessage::Host { text, style } = m {
                out.push_str(&text);
                if style.new_line {
                    out.push('\n');
                }
            }
        }
        out
    }
}

impl OutputSink for MemorySink {
    fn host(&self, message: &str, style: HostStyle) {
        self.record(SinkMessage::Host { text: message.to_string(), style });
    }

    fn verbose(&self, message: &str) {
        self.record(SinkMessage::Verbose(message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.record(SinkMessage::Warning(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.record(SinkMessage::Error(message.to_string()));
    }
}
