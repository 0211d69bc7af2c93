//! Read-only directory of channels, servers and users
//!
//! The host application owns this data; the engine only queries it by id.

use crate::types::{ChannelKind, Snowflake};
use std::collections::HashMap;

/// Channel metadata known to the host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Channel id
    pub id: Snowflake,
    /// Channel kind
    pub kind: ChannelKind,
    /// Stored name (server channels) or label (group conversations)
    pub name: Option<String>,
    /// Owning server, for server channels
    pub guild_id: Option<Snowflake>,
    /// Participants, for direct and group conversations
    pub recipients: Vec<Snowflake>,
}

/// User metadata known to the host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    /// User id
    pub id: Snowflake,
    /// Account handle
    pub username: String,
    /// Display name, when set
    pub display_name: Option<String>,
}

/// Synchronous lookup service
pub trait Directory: Send + Sync {
    /// Resolve a channel
    fn channel(&self, id: Snowflake) -> Option<ChannelInfo>;

    /// Exportable channels of a server, in display order
    fn guild_channels(&self, guild_id: Snowflake) -> Vec<ChannelInfo>;

    /// Resolve a user
    fn user(&self, id: Snowflake) -> Option<UserInfo>;

    /// The account performing the export
    fn current_user_id(&self) -> Option<Snowflake>;
}

/// Display name of a channel
///
/// - direct message: the other participant's handle
/// - group conversation: its stored label, else the participants' handles
/// - standard channel: `#name`
pub fn display_name(channel: &ChannelInfo, directory: &dyn Directory) -> String {
    match channel.kind {
        ChannelKind::DirectMessage => {
            let me = directory.current_user_id();
            channel
                .recipients
                .iter()
                .find(|id| Some(**id) != me)
                .and_then(|id| directory.user(*id))
                .map(|user| user.username)
                .unwrap_or_else(|| format!("DM {}", channel.id))
        }
        ChannelKind::GroupDm => match channel.name.as_deref() {
            Some(label) if !label.trim().is_empty() => label.to_string(),
            _ => {
                let names: Vec<String> = channel
                    .recipients
                    .iter()
                    .filter_map(|id| directory.user(*id))
                    .map(|user| user.username)
                    .collect();
                if names.is_empty() {
                    format!("Group {}", channel.id)
                } else {
                    names.join(", ")
                }
            }
        },
        ChannelKind::Standard => {
            format!("#{}", channel.name.as_deref().unwrap_or("unknown-channel"))
        }
    }
}

/// In-memory directory
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    channels: Vec<ChannelInfo>,
    users: HashMap<Snowflake, UserInfo>,
    current_user: Option<Snowflake>,
}

impl StaticDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel
    pub fn with_channel(mut self, channel: ChannelInfo) -> Self {
        self.channels.retain(|c| c.id != channel.id);
        self.channels.push(channel);
        self
    }

    /// Register a user
    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.users.insert(user.id, user);
        self
    }

    /// Set the exporting account
    pub fn with_current_user(mut self, id: Snowflake) -> Self {
        self.current_user = Some(id);
        self
    }
}

impl Directory for StaticDirectory {
    fn channel(&self, id: Snowflake) -> Option<ChannelInfo> {
        self.channels.iter().find(|c| c.id == id).cloned()
    }

    fn guild_channels(&self, guild_id: Snowflake) -> Vec<ChannelInfo> {
        self.channels
            .iter()
            .filter(|c| c.guild_id == Some(guild_id))
            .cloned()
            .collect()
    }

    fn user(&self, id: Snowflake) -> Option<UserInfo> {
        self.users.get(&id).cloned()
    }

    fn current_user_id(&self) -> Option<Snowflake> {
        self.current_user
    }
}
