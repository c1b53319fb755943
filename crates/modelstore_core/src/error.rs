//! Repository failure taxonomy and its external error mapping.
//!
//! # Responsibility
//! - Define `RepoError`, the only failure type returned by repository APIs.
//! - Map every failure to a stable `{code, messageKey, details}` triple.
//!
//! # Invariants
//! - `message_key` is derived from `code`: lower-cased, `_` replaced by `.`,
//!   prefixed with `error.`.
//! - Unclassified failures never expose internal diagnostic text externally.

use crate::model::element::ElementId;
use crate::model::validation::ValidationError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Key used to look up an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementRef {
    Id(ElementId),
    ReqId(String),
}

impl Display for ElementRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::ReqId(req_id) => write!(f, "reqId {req_id}"),
        }
    }
}

/// Why a mutation conflicted with stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Caller's version token is stale. `actual` is `None` if the element
    /// vanished mid-transaction.
    StaleVersion {
        id: ElementId,
        expected: i64,
        actual: Option<i64>,
    },
    /// Element still has children and the delete policy rejects that.
    HasChildren { id: ElementId, child_count: usize },
    /// Another element already uses this reference code.
    DuplicateReqId(String),
    /// Store-level constraint rejected the write.
    Constraint,
}

impl Display for ConflictReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleVersion {
                id,
                expected,
                actual: Some(actual),
            } => write!(
                f,
                "element {id} is at version {actual}, expected {expected}"
            ),
            Self::StaleVersion {
                id,
                expected,
                actual: None,
            } => write!(
                f,
                "element {id} was removed while expecting version {expected}"
            ),
            Self::HasChildren { id, child_count } => {
                write!(f, "element {id} still has {child_count} child element(s)")
            }
            Self::DuplicateReqId(req_id) => write!(f, "reqId {req_id} is already in use"),
            Self::Constraint => write!(f, "write conflicts with existing data"),
        }
    }
}

/// Classified repository failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    Validation(ValidationError),
    NotFound(ElementRef),
    Conflict(ConflictReason),
    /// Applying the parent would make `element_id` its own ancestor.
    Cycle {
        element_id: ElementId,
        parent_id: ElementId,
    },
    StoreUnavailable(String),
    /// Anything not classified above; text is for logs only.
    Unknown(String),
}

/// Failure kind without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Cycle,
    StoreUnavailable,
    Unknown,
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn not_found(id: ElementId) -> Self {
        Self::NotFound(ElementRef::Id(id))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::NotFound(key) => write!(f, "element not found: {key}"),
            Self::Conflict(reason) => write!(f, "conflict: {reason}"),
            Self::Cycle {
                element_id,
                parent_id,
            } => write!(
                f,
                "parent {parent_id} would make element {element_id} its own ancestor"
            ),
            Self::StoreUnavailable(message) => write!(f, "store unavailable: {message}"),
            Self::Unknown(message) => write!(f, "unexpected failure: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            StoreError::VersionConflict {
                id,
                expected: Some(expected),
                actual,
            } => Self::Conflict(ConflictReason::StaleVersion {
                id,
                expected,
                actual,
            }),
            StoreError::VersionConflict { expected: None, .. } | StoreError::Constraint(_) => {
                Self::Conflict(ConflictReason::Constraint)
            }
            other @ (StoreError::InvalidData(_) | StoreError::Backend(_)) => {
                Self::Unknown(other.to_string())
            }
        }
    }
}

/// Externally visible error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Conflict,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub const ALL: [Self; 5] = [
        Self::BadRequest,
        Self::NotFound,
        Self::Conflict,
        Self::ServiceUnavailable,
        Self::InternalError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Coarse origin of the failure: caller input, business rule, or system.
    pub fn category(self) -> &'static str {
        match self {
            Self::BadRequest | Self::NotFound => "CLIENT",
            Self::Conflict => "BUSINESS",
            Self::ServiceUnavailable | Self::InternalError => "SYSTEM",
        }
    }

    pub fn message_key(self) -> String {
        derive_message_key(self.as_str())
    }
}

/// `NOT_FOUND` -> `error.not.found`.
pub fn derive_message_key(code: &str) -> String {
    let normalized: String = code
        .chars()
        .map(|ch| match ch {
            '_' | '-' | ' ' | '.' => '.',
            other => other.to_ascii_lowercase(),
        })
        .collect();
    format!("error.{normalized}")
}

/// External error shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: String,
    pub message_key: String,
    pub details: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, details: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message_key: code.message_key(),
            details: details.into(),
        }
    }
}

impl From<&RepoError> for ApiError {
    fn from(value: &RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::new(ErrorCode::BadRequest, err.to_string()),
            RepoError::NotFound(key) => {
                Self::new(ErrorCode::NotFound, format!("element not found: {key}"))
            }
            RepoError::Conflict(reason) => Self::new(ErrorCode::Conflict, reason.to_string()),
            RepoError::Cycle {
                element_id,
                parent_id,
            } => Self::new(
                ErrorCode::BadRequest,
                format!("cyclic parent: {parent_id} is {element_id} or one of its descendants"),
            ),
            RepoError::StoreUnavailable(_) => Self::new(
                ErrorCode::ServiceUnavailable,
                "model store is temporarily unavailable",
            ),
            RepoError::Unknown(_) => Self::new(
                ErrorCode::InternalError,
                format!("{} failure", ErrorCode::InternalError.category().to_lowercase()),
            ),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        Self::from(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        derive_message_key, ApiError, ConflictReason, ElementRef, ErrorCode, ErrorKind, RepoError,
    };
    use crate::model::validation::ValidationError;
    use crate::store::StoreError;
    use uuid::Uuid;

    #[test]
    fn message_keys_follow_derivation_rule() {
        for code in ErrorCode::ALL {
            let expected = format!("error.{}", code.as_str().to_lowercase().replace('_', "."));
            assert_eq!(code.message_key(), expected);
        }
        assert_eq!(derive_message_key("NOT_FOUND"), "error.not.found");
        assert_eq!(
            derive_message_key("SERVICE_UNAVAILABLE"),
            "error.service.unavailable"
        );
    }

    #[test]
    fn each_kind_maps_to_its_code() {
        let id = Uuid::new_v4();
        let cases = [
            (
                RepoError::Validation(ValidationError::BlankName),
                ErrorCode::BadRequest,
            ),
            (RepoError::NotFound(ElementRef::Id(id)), ErrorCode::NotFound),
            (
                RepoError::Conflict(ConflictReason::HasChildren {
                    id,
                    child_count: 2,
                }),
                ErrorCode::Conflict,
            ),
            (
                RepoError::Cycle {
                    element_id: id,
                    parent_id: id,
                },
                ErrorCode::BadRequest,
            ),
            (
                RepoError::StoreUnavailable("busy".to_string()),
                ErrorCode::ServiceUnavailable,
            ),
            (
                RepoError::Unknown("boom".to_string()),
                ErrorCode::InternalError,
            ),
        ];
        for (error, code) in cases {
            let api = ApiError::from(&error);
            assert_eq!(api.code, code.as_str());
            assert_eq!(api.message_key, code.message_key());
        }
    }

    #[test]
    fn cycle_details_name_the_cyclic_parent() {
        let api = ApiError::from(RepoError::Cycle {
            element_id: Uuid::new_v4(),
            parent_id: Uuid::new_v4(),
        });
        assert!(api.details.starts_with("cyclic parent"));
    }

    #[test]
    fn internal_details_are_generic() {
        let api = ApiError::from(RepoError::Unknown(
            "no such table: model_elements at src/store/sqlite.rs:42".to_string(),
        ));
        assert_eq!(api.details, "system failure");
        assert!(!api.details.contains("model_elements"));

        let api = ApiError::from(RepoError::StoreUnavailable(
            "database is locked".to_string(),
        ));
        assert!(!api.details.contains("locked"));
    }

    #[test]
    fn store_errors_classify_into_taxonomy() {
        let id = Uuid::new_v4();
        let stale = RepoError::from(StoreError::VersionConflict {
            id,
            expected: Some(1),
            actual: Some(2),
        });
        assert_eq!(stale.kind(), ErrorKind::Conflict);
        assert_eq!(
            RepoError::from(StoreError::Unavailable("x".to_string())).kind(),
            ErrorKind::StoreUnavailable
        );
        assert_eq!(
            RepoError::from(StoreError::Backend("x".to_string())).kind(),
            ErrorKind::Unknown
        );
        assert_eq!(
            RepoError::from(StoreError::Constraint("UNIQUE".to_string())),
            RepoError::Conflict(ConflictReason::Constraint)
        );
    }

    #[test]
    fn api_error_serializes_camel_case() {
        let api = ApiError::new(ErrorCode::NotFound, "element not found");
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["messageKey"], "error.not.found");
        assert_eq!(json["details"], "element not found");
    }
}
