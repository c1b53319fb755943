//! Input validation errors shared by model, audit, and pagination code.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Caller input rejected before any store access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input carried a value for a field the server owns.
    ServerOwnedField(&'static str),
    /// Name is blank after trim.
    BlankName,
    /// Reference code is blank after trim.
    BlankReqId,
    /// Reference code contains characters outside the allowed token set.
    InvalidReqId(String),
    /// Actor is blank after trim.
    BlankActor,
    /// Update patch does not change any mutable field.
    EmptyPatch,
    /// Page index is negative.
    NegativePage(i64),
    /// Page size is zero or negative.
    NonPositivePageSize(i64),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerOwnedField(field) => {
                write!(f, "`{field}` is assigned by the server and must not be supplied")
            }
            Self::BlankName => write!(f, "name must not be blank"),
            Self::BlankReqId => write!(f, "reqId must not be blank"),
            Self::InvalidReqId(value) => write!(
                f,
                "reqId `{value}` must start with a letter or digit and contain only letters, digits, `.`, `_`, `:` or `-`"
            ),
            Self::BlankActor => write!(f, "actor must not be blank"),
            Self::EmptyPatch => write!(f, "update must change at least one of name, text, parentId"),
            Self::NegativePage(page) => write!(f, "page must be >= 0, got {page}"),
            Self::NonPositivePageSize(size) => write!(f, "size must be > 0, got {size}"),
        }
    }
}

impl Error for ValidationError {}
