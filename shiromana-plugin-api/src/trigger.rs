//! Trigger tokens and trigger-spec parsing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pseudo-trigger fired once per module right after it becomes active.
pub const ON_LOAD: &str = "on_load";

/// Domain event kinds raised by the media library.
///
/// Tokens are plain strings on the wire; this enum names the ones the
/// library itself emits. Plugins may subscribe to any token, known or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    OnLoad,
    MediaAdd,
    MediaRemove,
    MediaModify,
    SetAdd,
    SetRemove,
    MediaAddToSet,
    MediaRemoveFromSet,
    GetMedia,
    Detailize,
    QueryMedia,
    QuerySet,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown trigger token: {0}")]
pub struct UnknownTrigger(pub String);

impl TriggerKind {
    pub const ALL: [TriggerKind; 12] = [
        Self::OnLoad,
        Self::MediaAdd,
        Self::MediaRemove,
        Self::MediaModify,
        Self::SetAdd,
        Self::SetRemove,
        Self::MediaAddToSet,
        Self::MediaRemoveFromSet,
        Self::GetMedia,
        Self::Detailize,
        Self::QueryMedia,
        Self::QuerySet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnLoad => ON_LOAD,
            Self::MediaAdd => "media_add",
            Self::MediaRemove => "media_remove",
            Self::MediaModify => "media_modify",
            Self::SetAdd => "set_add",
            Self::SetRemove => "set_remove",
            Self::MediaAddToSet => "media_add_to_set",
            Self::MediaRemoveFromSet => "media_remove_from_set",
            Self::GetMedia => "get_media",
            Self::Detailize => "detailize",
            Self::QueryMedia => "query_media",
            Self::QuerySet => "query_set",
        }
    }

    /// Whether an event of this kind must carry a media handle.
    pub fn requires_media(self) -> bool {
        matches!(
            self,
            Self::MediaAdd
                | Self::MediaRemove
                | Self::MediaModify
                | Self::MediaAddToSet
                | Self::MediaRemoveFromSet
                | Self::GetMedia
                | Self::Detailize
        )
    }
}

impl FromStr for TriggerKind {
    type Err = UnknownTrigger;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownTrigger(s.to_string()))
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of the string a plugin returns from `trigger()`.
///
/// Tokens are split on `,`, trimmed, and empty pieces dropped. Duplicates
/// keep their first position. Matching is case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    raw: String,
    tokens: Vec<String>,
}

impl TriggerSpec {
    pub fn parse(raw: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
        Self {
            raw: raw.to_string(),
            tokens,
        }
    }

    /// The string exactly as the plugin declared it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(","))
    }
}
