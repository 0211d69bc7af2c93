//! Raw API records and their normalization
//!
//! Pages come back as untyped JSON. Each record is converted into a
//! [`NormalizedMessage`] here, and only here; a record that does not have the
//! expected shape fails with [`Error::MessageProcessing`] and is skipped by the caller.

use crate::error::{Error, Result};
use crate::types::{
    AttachmentDescriptor, AuthorSnapshot, ChannelSnapshot, EmojiRef, IncludeFlags, MentionRef,
    NormalizedMessage, REPLY_CONTENT_LIMIT, ReactionSummary, ReplyReference, Snowflake,
};
use crate::utils::truncate_chars;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawUser {
    id: Snowflake,
    #[serde(default)]
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    id: Snowflake,
    filename: String,
    url: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEmoji {
    #[serde(default)]
    id: Option<Snowflake>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    animated: bool,
}

#[derive(Debug, Deserialize)]
struct RawReaction {
    emoji: RawEmoji,
    #[serde(default)]
    count: u32,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    #[serde(default)]
    message_id: Option<Snowflake>,
}

/// Replied-to message as embedded by the API; may be partial
#[derive(Debug, Deserialize)]
struct RawReferencedMessage {
    #[serde(default)]
    id: Option<Snowflake>,
    #[serde(default)]
    author: Option<RawUser>,
    #[serde(default)]
    content: String,
}

/// Message record as returned by the messages endpoint
#[derive(Debug, Deserialize)]
struct RawMessage {
    id: Snowflake,
    #[serde(default)]
    content: String,
    author: RawUser,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    edited_timestamp: Option<String>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    embeds: Vec<serde_json::Value>,
    #[serde(default)]
    reactions: Vec<RawReaction>,
    #[serde(default)]
    mentions: Vec<RawUser>,
    #[serde(default)]
    message_reference: Option<RawReference>,
    #[serde(default)]
    referenced_message: Option<RawReferencedMessage>,
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl From<RawUser> for AuthorSnapshot {
    fn from(user: RawUser) -> Self {
        AuthorSnapshot {
            id: user.id,
            username: user.username,
            discriminator: user.discriminator,
            display_name: user.global_name.filter(|n| !n.is_empty()),
            avatar: user.avatar,
        }
    }
}

/// Convert one raw record into a normalized message
///
/// Reaction and embed payloads are dropped when their inclusion flag is off.
/// A missing or unparseable timestamp is derived from the message id.
pub fn normalize(
    record: serde_json::Value,
    channel: &ChannelSnapshot,
    include: &IncludeFlags,
) -> Result<NormalizedMessage> {
    let raw: RawMessage =
        serde_json::from_value(record).map_err(|e| Error::MessageProcessing(e.to_string()))?;

    let timestamp = parse_time(raw.timestamp.as_deref()).unwrap_or_else(|| raw.id.timestamp());
    let edited_timestamp = parse_time(raw.edited_timestamp.as_deref());

    let attachments = raw
        .attachments
        .into_iter()
        .map(|a| AttachmentDescriptor {
            id: a.id,
            filename: a.filename,
            url: a.url,
            size: a.size,
            content_type: a.content_type,
        })
        .collect();

    let reactions = if include.reactions {
        raw.reactions
            .into_iter()
            .map(|r| ReactionSummary {
                emoji: EmojiRef {
                    id: r.emoji.id,
                    name: r.emoji.name.unwrap_or_default(),
                    animated: r.emoji.animated,
                },
                count: r.count,
                users: Vec::new(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let embeds = if include.embeds { raw.embeds } else { Vec::new() };

    let mentions = raw
        .mentions
        .into_iter()
        .map(|u| MentionRef {
            id: u.id,
            username: u.username,
        })
        .collect();

    let reply_to = reply_reference(raw.message_reference, raw.referenced_message);

    Ok(NormalizedMessage {
        id: raw.id,
        content: raw.content,
        author: raw.author.into(),
        timestamp,
        edited_timestamp,
        channel: channel.clone(),
        attachments,
        embeds,
        reactions,
        mentions,
        reply_to,
    })
}

fn reply_reference(
    reference: Option<RawReference>,
    referenced: Option<RawReferencedMessage>,
) -> Option<ReplyReference> {
    let message_id = reference
        .and_then(|r| r.message_id)
        .or_else(|| referenced.as_ref().and_then(|m| m.id))?;

    let (author_id, author_name, content) = match referenced {
        Some(m) => {
            let (id, name) = match m.author {
                Some(a) => (Some(a.id), Some(a.username)),
                None => (None, None),
            };
            (id, name, truncate_chars(&m.content, REPLY_CONTENT_LIMIT))
        }
        None => (None, None, String::new()),
    };

    Some(ReplyReference {
        message_id,
        author_id,
        author_name,
        content,
    })
}
