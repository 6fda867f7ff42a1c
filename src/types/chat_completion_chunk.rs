use serde::{Deserialize, Serialize};

/// Incremental content carried by one streamed choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// The new text, absent on role-only and finish events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A streamed choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// The increment for this choice.
    #[serde(default)]
    pub delta: Option<ChunkDelta>,

    /// Set on the final event of a choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One `data:` payload of a streamed chat completion.
///
/// Only the fields needed to pull out the content token are modelled; everything else the
/// endpoint sends is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Identifier shared by all chunks of one completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Streamed choices; only the first is read.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// The content token at `choices[0].delta.content`, if present.
    pub fn token(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.as_deref())
    }
}
