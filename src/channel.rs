use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A Discord release track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Ptb,
    Canary,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Stable, Channel::Ptb, Channel::Canary];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Ptb => "ptb",
            Channel::Canary => "canary",
        }
    }

    /// Name of the executable inside an installation of this channel.
    pub fn binary_name(self) -> &'static str {
        match self {
            Channel::Stable => "Discord",
            Channel::Ptb => "DiscordPTB",
            Channel::Canary => "DiscordCanary",
        }
    }

    /// Desktop file shipped inside the release archive.
    pub fn desktop_file_name(self) -> &'static str {
        match self {
            Channel::Stable => "discord.desktop",
            Channel::Ptb => "discord-ptb.desktop",
            Channel::Canary => "discord-canary.desktop",
        }
    }

    /// Path segment appended to the download API; stable has none.
    pub fn api_segment(self) -> Option<&'static str> {
        match self {
            Channel::Stable => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown release channel \"{0}\" (expected stable, ptb or canary)")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Ok(Channel::Stable),
            "ptb" => Ok(Channel::Ptb),
            "canary" => Ok(Channel::Canary),
            _ => Err(UnknownChannel(s.to_string())),
        }
    }
}
