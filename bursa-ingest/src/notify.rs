//! Notification sink — labelled tabular payloads, chunked to a bounded
//! number of rows per message.
//!
//! The transport (chat webhook, mailer) is an external collaborator
//! behind `AlertSink`; this module only shapes the payload.

use chrono::NaiveDateTime;
use thiserror::Error;

use bursa_store::Frame;

/// Rows per message block.
pub const CHUNK_ROWS: usize = 20;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to post to {channel}: {detail}")]
    Post { channel: String, detail: String },
}

/// Message transport implemented by callers.
pub trait AlertSink {
    fn post(&self, channel: &str, text: &str) -> Result<(), NotifyError>;
}

/// Render one labelled frame into message blocks of at most
/// [`CHUNK_ROWS`] rows each.
pub fn make_blocks(label: &str, at: NaiveDateTime, frame: &Frame) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    while offset < frame.len() {
        let slice = frame.slice(offset, CHUNK_ROWS);
        blocks.push(format!(
            "*{}* @ {} SGT\n```{}```",
            label.to_uppercase(),
            at.format("%Y-%m-%d %H:%M:%S"),
            slice
        ));
        offset += CHUNK_ROWS;
    }
    blocks
}

/// Send every labelled frame through the sink, one post per block.
pub fn send_alert(
    sink: &dyn AlertSink,
    channel: &str,
    alerts: &[(String, Frame)],
    at: NaiveDateTime,
) -> Result<(), NotifyError> {
    for (label, frame) in alerts {
        for block in make_blocks(label, at, frame) {
            sink.post(channel, &block)?;
            log::info!(
                "sent alert {label} break size[{}] channel[{channel}]",
                frame.len()
            );
        }
    }
    Ok(())
}
