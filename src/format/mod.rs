//! Export formatters
//!
//! One pure function per output format. All of them take the same
//! chronologically sorted message sequence and an [`ExportContext`].

pub mod csv;
pub mod html;
pub mod json;
pub mod text;

use crate::error::Result;
use crate::types::{
    ChannelSnapshot, EmojiRef, ExportFormat, ExportRequest, NormalizedMessage, ReactionSummary,
    Snowflake,
};
use chrono::{DateTime, FixedOffset, Local, Utc};
use std::collections::HashMap;

/// Timestamp layout used by every human-readable format
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything a formatter needs besides the messages
#[derive(Debug, Clone)]
pub struct ExportContext<'a> {
    /// Request that produced the messages
    pub request: &'a ExportRequest,
    /// Exported channels, in export order
    pub channels: &'a [ChannelSnapshot],
    /// Job start time
    pub exported_at: DateTime<Utc>,
    /// Offset used to localize timestamps
    pub offset: FixedOffset,
    /// Bundle paths of downloaded attachments; `Some` switches the hypertext
    /// formatter to local mode, where a missing entry means the download failed
    pub local_paths: Option<&'a HashMap<Snowflake, String>>,
}

impl<'a> ExportContext<'a> {
    /// Context stamped now, localized to the machine's offset
    pub fn new(request: &'a ExportRequest, channels: &'a [ChannelSnapshot]) -> Self {
        Self {
            request,
            channels,
            exported_at: Utc::now(),
            offset: *Local::now().offset(),
            local_paths: None,
        }
    }

    /// Use a fixed export time
    pub fn with_exported_at(mut self, exported_at: DateTime<Utc>) -> Self {
        self.exported_at = exported_at;
        self
    }

    /// Localize timestamps to `offset`
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Reference attachments by their bundle paths
    pub fn with_local_paths(mut self, paths: &'a HashMap<Snowflake, String>) -> Self {
        self.local_paths = Some(paths);
        self
    }

    /// Format `t` in the context's offset
    pub fn localize(&self, t: DateTime<Utc>) -> String {
        t.with_timezone(&self.offset)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }
}

/// A serialized export document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    /// Document bytes
    pub bytes: Vec<u8>,
    /// Media type
    pub mime: &'static str,
    /// File extension without dot
    pub extension: &'static str,
}

/// Serialize `messages` in `format`
pub fn render_document(
    format: ExportFormat,
    messages: &[NormalizedMessage],
    ctx: &ExportContext<'_>,
) -> Result<ExportDocument> {
    let bytes = match format {
        ExportFormat::Json => json::render(messages, ctx)?,
        ExportFormat::Csv => csv::render(messages, ctx).into_bytes(),
        ExportFormat::Txt => text::render(messages, ctx).into_bytes(),
        ExportFormat::Html => html::render(messages, ctx).into_bytes(),
    };
    tracing::debug!(
        format = %format,
        messages = messages.len(),
        bytes = bytes.len(),
        "Rendered export document"
    );
    Ok(ExportDocument {
        bytes,
        mime: format.mime_type(),
        extension: format.extension(),
    })
}

/// Emoji as shown in text: the character itself or `:name:` for custom emoji
pub(crate) fn emoji_label(emoji: &EmojiRef) -> String {
    match emoji.id {
        Some(_) => format!(":{}:", emoji.name),
        None => emoji.name.clone(),
    }
}

/// `👍 3, :party: 1`
pub(crate) fn reactions_line(reactions: &[ReactionSummary]) -> String {
    reactions
        .iter()
        .map(|r| format!("{} {}", emoji_label(&r.emoji), r.count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name shown for the author of a replied-to message
pub(crate) fn reply_author(message: &NormalizedMessage) -> Option<&str> {
    message
        .reply_to
        .as_ref()
        .map(|r| r.author_name.as_deref().unwrap_or("unknown"))
}

/// Document title scope: one channel's name or the channel count
pub(crate) fn scope_label(channels: &[ChannelSnapshot]) -> String {
    match channels {
        [single] => single.name.clone(),
        many => format!("{} channels", many.len()),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
pub(crate) mod fixtures {
    //! Messages shared by the formatter tests

    use crate::types::*;
    use chrono::{TimeZone, Utc};

    pub(crate) fn channel(id: u64, name: &str) -> ChannelSnapshot {
        ChannelSnapshot {
            id: Snowflake(id),
            name: name.to_string(),
            kind: ChannelKind::Standard,
        }
    }

    pub(crate) fn author(id: u64, name: &str) -> AuthorSnapshot {
        AuthorSnapshot {
            id: Snowflake(id),
            username: name.to_string(),
            discriminator: None,
            display_name: None,
            avatar: None,
        }
    }

    pub(crate) fn message(
        id: u64,
        channel: &ChannelSnapshot,
        author: &AuthorSnapshot,
        minute: u32,
        content: &str,
    ) -> NormalizedMessage {
        NormalizedMessage {
            id: Snowflake(id),
            content: content.to_string(),
            author: author.clone(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            edited_timestamp: None,
            channel: channel.clone(),
            attachments: Vec::new(),
            embeds: Vec::new(),
            reactions: Vec::new(),
            mentions: Vec::new(),
            reply_to: None,
        }
    }

    pub(crate) fn attachment(id: u64, filename: &str, content_type: Option<&str>) -> AttachmentDescriptor {
        AttachmentDescriptor {
            id: Snowflake(id),
            filename: filename.to_string(),
            url: format!("https://cdn.discordapp.com/attachments/1/{id}/{filename}"),
            size: 1536,
            content_type: content_type.map(str::to_string),
        }
    }

    pub(crate) fn reaction(name: &str, count: u32) -> ReactionSummary {
        ReactionSummary {
            emoji: EmojiRef {
                id: None,
                name: name.to_string(),
                animated: false,
            },
            count,
            users: Vec::new(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn localize_applies_offset() {
        let request = ExportRequest::channel(Snowflake(1));
        let ctx = ExportContext::new(&request, &[]).with_offset(FixedOffset::east_opt(3600).unwrap());
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(ctx.localize(t), "2024-03-02 00:30:00");
    }

    #[test]
    fn document_carries_format_metadata() {
        let request = ExportRequest::channel(Snowflake(1));
        let general = channel(1, "#general");
        let channels = [general.clone()];
        let ctx = ExportContext::new(&request, &channels);
        let messages = [message(5, &general, &author(2, "ana"), 0, "hi")];

        for format in [
            ExportFormat::Json,
            ExportFormat::Csv,
            ExportFormat::Txt,
            ExportFormat::Html,
        ] {
            let doc = render_document(format, &messages, &ctx).unwrap();
            assert_eq!(doc.extension, format.extension());
            assert_eq!(doc.mime, format.mime_type());
            assert!(!doc.bytes.is_empty());
        }
    }

    #[test]
    fn custom_emoji_use_colon_names() {
        let mut r = reaction("👍", 3);
        assert_eq!(reactions_line(std::slice::from_ref(&r)), "👍 3");
        r.emoji.id = Some(Snowflake(9));
        r.emoji.name = "party".into();
        assert_eq!(reactions_line(&[r]), ":party: 3");
    }
}
