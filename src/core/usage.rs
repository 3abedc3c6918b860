//! Token-usage observation over outgoing SSE bytes
//!
//! A small line-level state machine that accumulates `data:` payloads under
//! an `event: message_delta` tag and decodes the `usage` object at the
//! blank-line event terminator. Purely observational: parse failures are
//! silent and never affect the byte stream.

use serde::Deserialize;
use tracing::debug;

/// Token counts reported by an upstream `message_delta` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    /// Prompt-side tokens
    #[serde(default)]
    pub input_tokens: Option<u64>,
    /// Completion-side tokens
    #[serde(default)]
    pub output_tokens: Option<u64>,
    /// Tokens served from prompt cache
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    /// Tokens written to prompt cache
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    #[serde(default)]
    usage: Option<TokenUsage>,
}

/// Incremental SSE scanner fed with raw outgoing chunks
#[derive(Debug, Default)]
pub struct UsageScanner {
    line_buf: Vec<u8>,
    current_event: Option<String>,
    data_buf: String,
    last_usage: Option<TokenUsage>,
}

impl UsageScanner {
    /// Fresh scanner for one response stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one outgoing chunk
    pub fn observe(&mut self, chunk: &[u8]) {
        for byte in chunk {
            if *byte == b'\n' {
                let line = std::mem::take(&mut self.line_buf);
                self.on_line(String::from_utf8_lossy(&line).trim_end_matches('\r'));
            } else {
                self.line_buf.push(*byte);
            }
        }
    }

    /// The most recent usage object decoded from the stream
    pub fn last_usage(&self) -> Option<&TokenUsage> {
        self.last_usage.as_ref()
    }

    fn on_line(&mut self, line: &str) {
        if line.is_empty() {
            self.flush_event();
        } else if let Some(event) = line.strip_prefix("event:") {
            self.current_event = Some(event.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            if !self.data_buf.is_empty() {
                self.data_buf.push('\n');
            }
            self.data_buf.push_str(data.trim_start());
        }
        // Comment lines (leading ':') and unknown fields fall through
    }

    fn flush_event(&mut self) {
        let event = self.current_event.take();
        let data = std::mem::take(&mut self.data_buf);

        if event.as_deref() != Some("message_delta") || data.is_empty() {
            return;
        }
        if let Ok(payload) = serde_json::from_str::<DeltaPayload>(&data) {
            if let Some(usage) = payload.usage {
                debug!(
                    input_tokens = ?usage.input_tokens,
                    output_tokens = ?usage.output_tokens,
                    "Observed token usage"
                );
                self.last_usage = Some(usage);
            }
        }
    }
}
