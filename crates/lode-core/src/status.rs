use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Per-file (and per-chunk) indexing state.
///
/// Transitions are monotone within one job: `Pending → Processing →
/// {Completed | Failed}`. Returning to `Pending` happens only through an
/// explicit reindex mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl IndexStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(CoreError::InvalidVariant {
                type_name: "IndexStatus",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle state of an index job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(CoreError::InvalidVariant {
                type_name: "JobStatus",
                value: s.to_string(),
            }),
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Processing | Self::Failed),
            Self::Processing => next.is_terminal(),
            Self::Completed | Self::Failed => false,
        }
    }
}

/// Whether an index job rebuilds everything or applies a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Create,
    Update,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            _ => Err(CoreError::InvalidVariant {
                type_name: "JobType",
                value: s.to_string(),
            }),
        }
    }
}

/// Which retrieval paths a search request exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Semantic,
    Fulltext,
    Hybrid,
}

impl SearchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Fulltext => "fulltext",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "semantic" => Ok(Self::Semantic),
            "fulltext" => Ok(Self::Fulltext),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(CoreError::InvalidVariant {
                type_name: "SearchType",
                value: s.to_string(),
            }),
        }
    }

    pub fn wants_semantic(self) -> bool {
        matches!(self, Self::Semantic | Self::Hybrid)
    }

    pub fn wants_fulltext(self) -> bool {
        matches!(self, Self::Fulltext | Self::Hybrid)
    }
}

/// Modality of the incoming query payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Voice,
    Image,
}

impl InputType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Image => "image",
        }
    }
}

/// Which retrieval path produced a result (both → `Hybrid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Fulltext,
    Hybrid,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Fulltext => "fulltext",
            Self::Hybrid => "hybrid",
        }
    }
}
