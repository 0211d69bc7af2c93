//! Core types for chat-export

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;

/// Platform epoch for snowflake identifiers (2015-01-01T00:00:00Z) in milliseconds
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Platform identifier (channel, guild, user, message, attachment)
///
/// Serialized as a decimal string, accepted as either a string or a number.
/// Identifiers are time-ordered: a larger value was created later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(pub u64);

impl Snowflake {
    /// Create a new Snowflake
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Creation time encoded in the upper 42 bits
    pub fn timestamp(&self) -> DateTime<Utc> {
        let ms = (self.0 >> 22) as i64 + SNOWFLAKE_EPOCH_MS;
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Smallest identifier that could have been created at `t`
    ///
    /// Every id below it belongs to something created strictly before `t`.
    pub fn from_timestamp(t: DateTime<Utc>) -> Self {
        let ms = (t.timestamp_millis() - SNOWFLAKE_EPOCH_MS).max(0) as u64;
        Self(ms << 22)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for Snowflake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(Self(n)),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Output format of an export
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Structured envelope with metadata and messages
    Json,
    /// One quoted row per message
    Csv,
    /// Plain text transcript
    Txt,
    /// Self-contained styled document
    #[default]
    Html,
}

impl ExportFormat {
    /// File extension (without dot)
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
            ExportFormat::Html => "html",
        }
    }

    /// Media type of the serialized document
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Txt => "text/plain",
            ExportFormat::Html => "text/html",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "txt" | "text" => Ok(ExportFormat::Txt),
            "html" | "htm" => Ok(ExportFormat::Html),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Which channels an export covers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportScope {
    /// Explicit list of channels (usually one)
    Channels {
        /// Target channels, exported in this order
        channel_ids: Vec<Snowflake>,
    },
    /// Every channel of a server, resolved from the directory at run time
    Server {
        /// Server identifier
        guild_id: Snowflake,
    },
}

/// How the user filter treats its listed authors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Only listed authors are admitted
    Include,
    /// Everyone except listed authors is admitted
    Exclude,
}

/// Author filter applied during retrieval
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    /// Filter mode
    pub mode: FilterMode,
    /// Listed authors
    pub user_ids: HashSet<Snowflake>,
}

impl UserFilter {
    /// Admit only the given authors
    pub fn include(ids: impl IntoIterator<Item = Snowflake>) -> Self {
        Self {
            mode: FilterMode::Include,
            user_ids: ids.into_iter().collect(),
        }
    }

    /// Admit everyone but the given authors
    pub fn exclude(ids: impl IntoIterator<Item = Snowflake>) -> Self {
        Self {
            mode: FilterMode::Exclude,
            user_ids: ids.into_iter().collect(),
        }
    }

    /// Whether a message by `author` passes the filter
    pub fn admits(&self, author: Snowflake) -> bool {
        let listed = self.user_ids.contains(&author);
        match self.mode {
            FilterMode::Include => listed,
            FilterMode::Exclude => !listed,
        }
    }
}

/// Half-open time window `[start, end)`; either bound may be open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    /// Whether `t` lies inside the window
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| t >= start) && self.end.is_none_or(|end| t < end)
    }

    /// Whether `t` lies before the window start
    pub fn is_before_start(&self, t: DateTime<Utc>) -> bool {
        self.start.is_some_and(|start| t < start)
    }
}

/// Per-category inclusion flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeFlags {
    /// Attachment references, downloaded and bundled into an archive when set
    pub attachments: bool,
    /// Reaction summaries
    pub reactions: bool,
    /// Embed payloads
    pub embeds: bool,
}

impl Default for IncludeFlags {
    fn default() -> Self {
        Self {
            attachments: false,
            reactions: true,
            embeds: true,
        }
    }
}

/// Immutable configuration for one export run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Channels covered by the export
    pub scope: ExportScope,
    /// Optional time window
    #[serde(default)]
    pub date_window: DateWindow,
    /// Optional author filter
    #[serde(default)]
    pub user_filter: Option<UserFilter>,
    /// Per-channel message cap (0 = unbounded)
    ///
    /// History is read newest first and retrieval stops once the cap is
    /// reached, so a capped channel keeps its most recent `message_cap`
    /// matching messages (still returned oldest to newest).
    #[serde(default)]
    pub message_cap: usize,
    /// Inclusion flags
    #[serde(default)]
    pub include: IncludeFlags,
    /// Output format
    #[serde(default)]
    pub format: ExportFormat,
}

impl ExportRequest {
    /// Export a single channel with default options
    pub fn channel(channel_id: Snowflake) -> Self {
        Self::channels(vec![channel_id])
    }

    /// Export several channels with default options
    pub fn channels(channel_ids: Vec<Snowflake>) -> Self {
        Self {
            scope: ExportScope::Channels { channel_ids },
            date_window: DateWindow::default(),
            user_filter: None,
            message_cap: 0,
            include: IncludeFlags::default(),
            format: ExportFormat::default(),
        }
    }

    /// Export every channel of a server
    pub fn server(guild_id: Snowflake) -> Self {
        Self {
            scope: ExportScope::Server { guild_id },
            ..Self::channels(Vec::new())
        }
    }

    /// Seed format, cap and attachment flag from host settings
    pub fn with_settings(mut self, settings: &crate::config::ExportSettings) -> Self {
        self.format = settings.format;
        self.message_cap = settings.message_cap;
        self.include.attachments = settings.include_attachments;
        self
    }

    /// Set the output format
    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the message cap
    pub fn with_message_cap(mut self, cap: usize) -> Self {
        self.message_cap = cap;
        self
    }

    /// Set the date window
    pub fn with_date_window(mut self, window: DateWindow) -> Self {
        self.date_window = window;
        self
    }

    /// Set the author filter
    pub fn with_user_filter(mut self, filter: UserFilter) -> Self {
        self.user_filter = Some(filter);
        self
    }

    /// Set inclusion flags
    pub fn with_include(mut self, include: IncludeFlags) -> Self {
        self.include = include;
        self
    }

    /// Whether attachments are downloaded and bundled into an archive
    ///
    /// The archive holds the document in the requested format, rendered with
    /// local attachment paths, next to the `attachments/` folder.
    pub fn bundles_attachments(&self) -> bool {
        self.include.attachments
    }

    /// Whether a message passes the author and date filters
    pub fn admits(&self, message: &NormalizedMessage) -> bool {
        let author_ok = self
            .user_filter
            .as_ref()
            .is_none_or(|f| f.admits(message.author.id));
        author_ok && self.date_window.contains(message.timestamp)
    }
}

/// Kind of a channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Standard multi-user server channel
    #[default]
    Standard,
    /// One-to-one direct message
    DirectMessage,
    /// Group direct message
    GroupDm,
}

impl ChannelKind {
    /// Map the platform's numeric channel type
    pub fn from_api(kind: u8) -> Self {
        match kind {
            1 => ChannelKind::DirectMessage,
            3 => ChannelKind::GroupDm,
            _ => ChannelKind::Standard,
        }
    }
}

/// Author snapshot taken when the message was retrieved
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    /// User id
    pub id: Snowflake,
    /// Account handle
    pub username: String,
    /// Legacy discriminator ("0" or absent for migrated accounts)
    pub discriminator: Option<String>,
    /// Display name, when set
    pub display_name: Option<String>,
    /// Avatar hash
    pub avatar: Option<String>,
}

impl AuthorSnapshot {
    /// Name shown next to messages: display name, else handle
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    /// Handle including a legacy discriminator when present
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if !d.is_empty() && d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }
}

/// Owning-channel snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Channel id
    pub id: Snowflake,
    /// Display name (see [`crate::directory::display_name`])
    pub name: String,
    /// Channel kind
    pub kind: ChannelKind,
}

/// Attachment reference carried by a message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    /// Attachment id
    pub id: Snowflake,
    /// Original filename
    pub filename: String,
    /// Origin URL
    pub url: String,
    /// Declared size in bytes
    pub size: u64,
    /// Declared content type
    pub content_type: Option<String>,
}

/// Broad media category of an attachment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// Still or animated image
    Image,
    /// Video clip
    Video,
    /// Anything else
    Other,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "avif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv", "gifv"];

impl AttachmentDescriptor {
    /// Lower-cased extension of the original filename
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Media category, from the declared content type or the extension
    pub fn media_kind(&self) -> MediaKind {
        if let Some(ct) = self.content_type.as_deref() {
            if ct.starts_with("image/") {
                return MediaKind::Image;
            }
            if ct.starts_with("video/") {
                return MediaKind::Video;
            }
        }
        match self.extension().as_deref() {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => MediaKind::Image,
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }
}

/// Emoji used in a reaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiRef {
    /// Custom emoji id (absent for unicode emoji)
    pub id: Option<Snowflake>,
    /// Unicode character(s) or custom emoji name
    pub name: String,
    /// Animated custom emoji
    #[serde(default)]
    pub animated: bool,
}

/// Reaction count on a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    /// Emoji
    pub emoji: EmojiRef,
    /// Number of users who reacted
    pub count: u32,
    /// Reacting users; the message endpoint never returns them, so this stays empty
    pub users: Vec<Snowflake>,
}

/// Mentioned user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRef {
    /// User id
    pub id: Snowflake,
    /// Handle at retrieval time
    pub username: String,
}

/// Maximum characters of replied-to content kept on a message
pub const REPLY_CONTENT_LIMIT: usize = 100;

/// Reply context
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyReference {
    /// Replied-to message
    pub message_id: Snowflake,
    /// Author of the replied-to message, when the API included it
    pub author_id: Option<Snowflake>,
    /// Author handle, when the API included it
    pub author_name: Option<String>,
    /// Replied-to content truncated to [`REPLY_CONTENT_LIMIT`] characters
    pub content: String,
}

/// Canonical unit of export
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Message id
    pub id: Snowflake,
    /// Raw markup content
    pub content: String,
    /// Author snapshot
    pub author: AuthorSnapshot,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Last edit time
    pub edited_timestamp: Option<DateTime<Utc>>,
    /// Owning channel
    pub channel: ChannelSnapshot,
    /// Attachments
    pub attachments: Vec<AttachmentDescriptor>,
    /// Embed payloads, passed through untouched
    pub embeds: Vec<serde_json::Value>,
    /// Reactions
    pub reactions: Vec<ReactionSummary>,
    /// Mentioned users
    pub mentions: Vec<MentionRef>,
    /// Reply context
    pub reply_to: Option<ReplyReference>,
}

/// Observability snapshot published while an export runs
///
/// Overwritten on every step; only the latest value matters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportProgress {
    /// Label of the channel being processed
    pub channel_label: String,
    /// Channels finished so far
    pub channels_done: usize,
    /// Channels in the export
    pub channels_total: usize,
    /// Messages retained so far
    pub messages_done: usize,
    /// Expected message total, when bounded by a cap
    pub messages_total: Option<usize>,
    /// Free-text status line
    pub status: String,
}
