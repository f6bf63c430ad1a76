//! Error types for stack construction

use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Configuration value would produce a broken or over-broad resource
    E001InvalidInput,
    /// E002: Schedule expression rejected
    E002InvalidSchedule,
    /// E003: Two resources share a logical id
    E003DuplicateLogicalId,
    /// E004: A resource references something that is not in the template
    E004DanglingReference,
    /// E005: Asset file or directory missing or unreadable
    E005AssetUnavailable,
    /// E006: Asset could not be packaged
    E006AssetPackaging,
    /// E007: Template could not be rendered
    E007Serialization,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001InvalidInput => "E001",
            Self::E002InvalidSchedule => "E002",
            Self::E003DuplicateLogicalId => "E003",
            Self::E004DanglingReference => "E004",
            Self::E005AssetUnavailable => "E005",
            Self::E006AssetPackaging => "E006",
            Self::E007Serialization => "E007",
        }
    }
}

/// Errors raised while building or rendering the stack
#[derive(Debug, Error)]
pub enum StackError {
    #[error("[{code}] Invalid value for {field}: {reason}")]
    InvalidInput {
        code: &'static str,
        field: String,
        reason: String,
    },

    #[error("[{code}] Invalid schedule expression '{expression}': {reason}")]
    InvalidSchedule {
        code: &'static str,
        expression: String,
        reason: String,
    },

    #[error("[{code}] Duplicate logical id '{logical_id}'")]
    DuplicateLogicalId {
        code: &'static str,
        logical_id: String,
    },

    #[error("[{code}] '{from}' references '{target}', which is not defined in the template")]
    DanglingReference {
        code: &'static str,
        from: String,
        target: String,
    },

    #[error("[{code}] Asset '{}' is unavailable: {source}", .path.display())]
    AssetUnavailable {
        code: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{code}] Failed to package asset '{}': {reason}", .path.display())]
    AssetPackaging {
        code: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("[{code}] Failed to render template: {source}")]
    Serialization {
        code: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StackError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            code: ErrorCode::E001InvalidInput.as_str(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_schedule(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            code: ErrorCode::E002InvalidSchedule.as_str(),
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate_logical_id(logical_id: impl Into<String>) -> Self {
        Self::DuplicateLogicalId {
            code: ErrorCode::E003DuplicateLogicalId.as_str(),
            logical_id: logical_id.into(),
        }
    }

    pub fn dangling_reference(from: impl Into<String>, target: impl Into<String>) -> Self {
        Self::DanglingReference {
            code: ErrorCode::E004DanglingReference.as_str(),
            from: from.into(),
            target: target.into(),
        }
    }

    pub fn asset_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::AssetUnavailable {
            code: ErrorCode::E005AssetUnavailable.as_str(),
            path: path.into(),
            source,
        }
    }

    pub fn asset_packaging(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AssetPackaging {
            code: ErrorCode::E006AssetPackaging.as_str(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn serialization(source: serde_json::Error) -> Self {
        Self::Serialization {
            code: ErrorCode::E007Serialization.as_str(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { code, .. }
            | Self::InvalidSchedule { code, .. }
            | Self::DuplicateLogicalId { code, .. }
            | Self::DanglingReference { code, .. }
            | Self::AssetUnavailable { code, .. }
            | Self::AssetPackaging { code, .. }
            | Self::Serialization { code, .. } => code,
        }
    }
}

/// Result type alias for StackError
pub type Result<T> = std::result::Result<T, StackError>;
