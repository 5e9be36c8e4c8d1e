//! SSE-framed envelope stream for an in-flight research turn.
//!
//! The run endpoint answers with a chunked `text/event-stream` body where
//! each frame's `event:` field names the channel (stream mode) and `data:`
//! carries one JSON payload. Frame extraction is a pure function over an
//! accumulating buffer so it can be tested without a socket.

use deepquery_feed::{ChannelKind, Envelope};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to agent stream: {0}")]
    Connect(#[source] reqwest::Error),
    #[error("agent stream rejected request ({status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("agent stream interrupted: {0}")]
    Read(#[source] reqwest::Error),
}

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Drain all complete frames (terminated by a blank line) from `buffer`,
/// leaving any partial trailing frame in place.
pub fn drain_frames(buffer: &mut String) -> Vec<SseFrame> {
    let mut frames = Vec::new();
    loop {
        let Some(end) = find_frame_end(buffer) else {
            break;
        };
        let raw: String = buffer.drain(..end.frame_len).collect();
        buffer.drain(..end.separator_len);
        if let Some(frame) = parse_frame(&raw) {
            frames.push(frame);
        }
    }
    frames
}

struct FrameEnd {
    frame_len: usize,
    separator_len: usize,
}

fn find_frame_end(buffer: &str) -> Option<FrameEnd> {
    // Frames are separated by a blank line; tolerate CRLF endings.
    let lf = buffer.find("\n\n").map(|pos| FrameEnd {
        frame_len: pos,
        separator_len: 2,
    });
    let crlf = buffer.find("\r\n\r\n").map(|pos| FrameEnd {
        frame_len: pos,
        separator_len: 4,
    });
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.frame_len <= b.frame_len { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
        // Comment lines (":keepalive") and "id:" fields are ignored.
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Convert a frame into a channel envelope. Frames for unknown channels or
/// with undecodable payloads are dropped.
pub fn frame_to_envelope(frame: &SseFrame) -> Option<Envelope> {
    let channel = ChannelKind::from_stream_mode(frame.event.as_deref()?)?;
    match serde_json::from_str(&frame.data) {
        Ok(body) => Some(Envelope::new(channel, body)),
        Err(err) => {
            debug!("dropping undecodable frame on {:?}: {err}", channel);
            None
        }
    }
}

/// The in-flight turn stream. Dropping it aborts the underlying request,
/// which is how turn cancellation reaches the transport.
pub struct TurnStream {
    response: reqwest::Response,
    buffer: String,
    pending: std::collections::VecDeque<SseFrame>,
    done: bool,
}

impl TurnStream {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
            pending: std::collections::VecDeque::new(),
            done: false,
        }
    }

    /// Next channel envelope, or `None` once the stream ends cleanly.
    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>, TransportError> {
        loop {
            while let Some(frame) = self.pending.pop_front() {
                if let Some(envelope) = frame_to_envelope(&frame) {
                    return Ok(Some(envelope));
                }
            }
            if self.done {
                return Ok(None);
            }
            match self.response.chunk().await.map_err(TransportError::Read)? {
                Some(bytes) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    self.pending.extend(drain_frames(&mut self.buffer));
                }
                None => {
                    self.done = true;
                    // Flush a final unterminated frame, if any.
                    if !self.buffer.trim().is_empty() {
                        let rest = std::mem::take(&mut self.buffer);
                        if let Some(frame) = parse_frame(&rest) {
                            self.pending.push_back(frame);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drain_extracts_complete_frames_and_keeps_partial() {
        let mut buffer = String::from(
            "event: custom\ndata: {\"step\":\"retrieve_start\"}\n\nevent: values\ndata: {\"a\"",
        );
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("custom"));
        assert_eq!(frames[0].data, "{\"step\":\"retrieve_start\"}");
        assert!(buffer.starts_with("event: values"));
    }

    #[test]
    fn drain_handles_crlf_and_multiline_data() {
        let mut buffer =
            String::from("event: updates\r\ndata: {\"a\":\r\ndata: 1}\r\n\r\n");
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"a\":\n1}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn comment_only_frames_are_dropped() {
        let mut buffer = String::from(": keepalive\n\nevent: custom\ndata: {}\n\n");
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("custom"));
    }

    #[test]
    fn frame_maps_to_channel_envelope() {
        let frame = SseFrame {
            event: Some("custom".to_string()),
            data: json!({"step": "reflect_start"}).to_string(),
        };
        let envelope = frame_to_envelope(&frame).unwrap();
        assert_eq!(envelope.channel, ChannelKind::Custom);
        assert_eq!(
            envelope.body.get("step").and_then(|v| v.as_str()),
            Some("reflect_start")
        );
    }

    #[test]
    fn unknown_channel_and_bad_json_are_dropped() {
        let unknown = SseFrame {
            event: Some("metadata".to_string()),
            data: "{}".to_string(),
        };
        assert!(frame_to_envelope(&unknown).is_none());

        let bad = SseFrame {
            event: Some("custom".to_string()),
            data: "{not json".to_string(),
        };
        assert!(frame_to_envelope(&bad).is_none());

        let eventless = SseFrame {
            event: None,
            data: "{}".to_string(),
        };
        assert!(frame_to_envelope(&eventless).is_none());
    }
}
