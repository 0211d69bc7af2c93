//! Structured JSON envelope

use super::ExportContext;
use crate::error::Result;
use crate::types::{ChannelSnapshot, ExportRequest, NormalizedMessage, Snowflake};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct Envelope<'a> {
    exported_at: DateTime<Utc>,
    request: &'a ExportRequest,
    channels: &'a [ChannelSnapshot],
    message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_files: Option<BTreeMap<Snowflake, &'a str>>,
    messages: &'a [NormalizedMessage],
}

/// Pretty-printed envelope with export metadata and the messages verbatim
///
/// In local mode the envelope also maps attachment ids to their bundle paths.
pub fn render(messages: &[NormalizedMessage], ctx: &ExportContext<'_>) -> Result<Vec<u8>> {
    let envelope = Envelope {
        exported_at: ctx.exported_at,
        request: ctx.request,
        channels: ctx.channels,
        message_count: messages.len(),
        attachment_files: ctx.local_paths.map(|paths| {
            paths
                .iter()
                .map(|(id, path)| (*id, path.as_str()))
                .collect()
        }),
        messages,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}
