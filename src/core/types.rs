// Shared types for the annotation pipeline

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum stored description length, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 8000;

/// Marker appended to truncated descriptions.
const ELLIPSIS: &str = "...";

/// A model installed on the inference service.
///
/// Only `name` is interpreted by the pipeline; the remaining attributes are
/// passed through to the presentation layer as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

/// A generated description, length-normalized to [`MAX_DESCRIPTION_LEN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub text: String,
    pub truncated: bool,
}

impl Description {
    /// Bound `raw` to [`MAX_DESCRIPTION_LEN`] characters.
    ///
    /// Oversized text is cut to `MAX_DESCRIPTION_LEN - 3` characters plus a
    /// three-character ellipsis marker, so the stored text is exactly
    /// `MAX_DESCRIPTION_LEN` characters long. The cut lands on a `char`
    /// boundary, never inside a multi-byte code point.
    pub fn from_raw(raw: &str) -> Self {
        match raw.char_indices().nth(MAX_DESCRIPTION_LEN) {
            None => Self {
                text: raw.to_string(),
                truncated: false,
            },
            Some(_) => {
                let cut = raw
                    .char_indices()
                    .nth(MAX_DESCRIPTION_LEN - ELLIPSIS.len())
                    .map(|(i, _)| i)
                    .unwrap_or(raw.len());
                let mut text = raw[..cut].to_string();
                text.push_str(ELLIPSIS);
                Self {
                    text,
                    truncated: true,
                }
            }
        }
    }
}

/// Output of a single describe call: the raw model text and its bounded form.
#[derive(Debug, Clone)]
pub struct DescribeOutput {
    pub raw: String,
    pub description: Description,
}

impl DescribeOutput {
    pub fn from_raw(raw: String) -> Self {
        let description = Description::from_raw(&raw);
        Self { raw, description }
    }
}

/// Terminal and intermediate states of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Interrupted,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Interrupted)
    }
}

/// Read-only view of the orchestrator's batch state.
///
/// `results` keys are the image paths as displayed strings; `log` is the
/// full ordered status log (trimming to a display window is up to the
/// presentation layer).
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub total: usize,
    pub processed: usize,
    pub results: HashMap<String, Description>,
    pub log: Vec<String>,
}
