//! Model element domain values and caller input shapes.
//!
//! # Responsibility
//! - Define `ModelElement`, the value returned by every repository read.
//! - Define `CreateElementInput` and `ElementPatch`, the shapes accepted from
//!   callers, plus their conversion into validated drafts.
//!
//! # Invariants
//! - `CreateElementInput`/`ElementPatch` never carry server-owned values past
//!   validation: any supplied id, audit field, or version is rejected.
//! - Names are trimmed and non-blank; reference codes are trimmed tokens.
//! - JSON uses camelCase field names to match the external contract.

use crate::model::validation::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Stable server-assigned element identifier.
pub type ElementId = Uuid;

static REQ_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]*$").expect("req id pattern is a valid regex")
});

/// Creation and modification provenance.
///
/// `created_at`/`created_by` never change after creation. Timestamps are Unix
/// epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStamp {
    pub created_at: i64,
    pub created_by: String,
    pub updated_at: i64,
    pub updated_by: String,
}

/// Canonical model element read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelElement {
    /// Server-assigned id.
    pub id: ElementId,
    /// External reference code, e.g. `REQ-1`.
    pub req_id: Option<String>,
    pub name: String,
    /// Free-form body text.
    pub text: String,
    /// Parent element id. `None` means root-level element.
    pub parent_id: Option<ElementId>,
    /// Child ids in sibling order.
    pub children: Vec<ElementId>,
    #[serde(flatten)]
    pub audit: AuditStamp,
    /// Optimistic-concurrency token, 1 after creation.
    pub version: i64,
}

/// Fields owned by the server that callers may mistakenly send.
///
/// Deserialized so that a transport layer can forward raw input unchanged and
/// still have these values rejected instead of silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerOwnedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl ServerOwnedFields {
    /// Fails on the first supplied server-owned field, in declaration order.
    pub fn ensure_absent(&self) -> Result<(), ValidationError> {
        let supplied = [
            ("id", self.id.is_some()),
            ("createdAt", self.created_at.is_some()),
            ("createdBy", self.created_by.is_some()),
            ("updatedAt", self.updated_at.is_some()),
            ("updatedBy", self.updated_by.is_some()),
            ("version", self.version.is_some()),
        ];
        match supplied.into_iter().find(|(_, present)| *present) {
            Some((field, _)) => Err(ValidationError::ServerOwnedField(field)),
            None => Ok(()),
        }
    }
}

/// Caller input for creating one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateElementInput {
    pub req_id: Option<String>,
    pub name: String,
    pub text: String,
    /// Optional initial parent. Must reference an existing element.
    pub parent_id: Option<ElementId>,
    #[serde(flatten)]
    pub server_owned: ServerOwnedFields,
}

impl CreateElementInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_req_id(mut self, req_id: impl Into<String>) -> Self {
        self.req_id = Some(req_id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_parent(mut self, parent_id: ElementId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Validates input and converts it into a server-side draft.
    ///
    /// # Errors
    /// - `ServerOwnedField` when id, audit fields, or version are supplied.
    /// - `BlankName`, `BlankReqId`, `InvalidReqId` for malformed values.
    pub fn into_draft(self) -> Result<NewElement, ValidationError> {
        self.server_owned.ensure_absent()?;
        Ok(NewElement {
            req_id: self.req_id.map(normalize_req_id).transpose()?,
            name: normalize_name(self.name)?,
            text: self.text,
            parent_id: self.parent_id,
        })
    }
}

/// Validated create input. Only constructed through `CreateElementInput`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewElement {
    pub req_id: Option<String>,
    pub name: String,
    pub text: String,
    pub parent_id: Option<ElementId>,
}

/// Partial update for the mutable fields of one element.
///
/// `parent_id` distinguishes three cases: absent (keep parent),
/// `null` / `Some(None)` (detach to root), and an id (move under it).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<ElementId>>,
    #[serde(flatten)]
    pub server_owned: ServerOwnedFields,
}

impl ElementPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn move_under(parent_id: ElementId) -> Self {
        Self {
            parent_id: Some(Some(parent_id)),
            ..Self::default()
        }
    }

    pub fn move_to_root() -> Self {
        Self {
            parent_id: Some(None),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Validates the patch and returns normalized changes.
    ///
    /// # Errors
    /// - `ServerOwnedField` when id, audit fields, or version are supplied.
    /// - `EmptyPatch` when no mutable field is present.
    /// - `BlankName` when a supplied name is blank.
    pub fn into_changes(self) -> Result<ElementChanges, ValidationError> {
        self.server_owned.ensure_absent()?;
        if self.name.is_none() && self.text.is_none() && self.parent_id.is_none() {
            return Err(ValidationError::EmptyPatch);
        }
        Ok(ElementChanges {
            name: self.name.map(normalize_name).transpose()?,
            text: self.text,
            parent_id: self.parent_id,
        })
    }
}

/// Validated update changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementChanges {
    pub name: Option<String>,
    pub text: Option<String>,
    pub parent_id: Option<Option<ElementId>>,
}

fn normalize_name(value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankName);
    }
    Ok(trimmed.to_string())
}

fn normalize_req_id(value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankReqId);
    }
    if !REQ_ID_PATTERN.is_match(trimmed) {
        return Err(ValidationError::InvalidReqId(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

// Present-but-null must stay distinguishable from absent.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::{CreateElementInput, ElementPatch, ModelElement};
    use crate::model::validation::ValidationError;
    use uuid::Uuid;

    #[test]
    fn create_input_rejects_each_server_owned_field() {
        let cases = [
            (r#"{"name":"n","id":"6f1c1d2a-1111-4c8e-9b1a-0a0a0a0a0a0a"}"#, "id"),
            (r#"{"name":"n","createdAt":1}"#, "createdAt"),
            (r#"{"name":"n","createdBy":"eve"}"#, "createdBy"),
            (r#"{"name":"n","updatedAt":1}"#, "updatedAt"),
            (r#"{"name":"n","updatedBy":"eve"}"#, "updatedBy"),
            (r#"{"name":"n","version":7}"#, "version"),
        ];
        for (json, field) in cases {
            let input: CreateElementInput = serde_json::from_str(json).unwrap();
            assert_eq!(
                input.into_draft().unwrap_err(),
                ValidationError::ServerOwnedField(field)
            );
        }
    }

    #[test]
    fn create_input_trims_name_and_req_id() {
        let draft = CreateElementInput::new("  Engine Thrust ")
            .with_req_id(" REQ-1 ")
            .into_draft()
            .unwrap();
        assert_eq!(draft.name, "Engine Thrust");
        assert_eq!(draft.req_id.as_deref(), Some("REQ-1"));
    }

    #[test]
    fn create_input_rejects_malformed_req_id() {
        let err = CreateElementInput::new("x")
            .with_req_id("REQ 1")
            .into_draft()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidReqId(value) if value == "REQ 1"));

        let err = CreateElementInput::new("x")
            .with_req_id("   ")
            .into_draft()
            .unwrap_err();
        assert_eq!(err, ValidationError::BlankReqId);
    }

    #[test]
    fn patch_parent_distinguishes_absent_null_and_value() {
        let absent: ElementPatch = serde_json::from_str(r#"{"name":"a"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let detach: ElementPatch = serde_json::from_str(r#"{"parentId":null}"#).unwrap();
        assert_eq!(detach.parent_id, Some(None));

        let id = Uuid::new_v4();
        let attach: ElementPatch =
            serde_json::from_str(&format!(r#"{{"parentId":"{id}"}}"#)).unwrap();
        assert_eq!(attach.parent_id, Some(Some(id)));
    }

    #[test]
    fn empty_patch_is_rejected() {
        let err = ElementPatch::default().into_changes().unwrap_err();
        assert_eq!(err, ValidationError::EmptyPatch);
    }

    #[test]
    fn patch_rejects_version_field() {
        let patch: ElementPatch = serde_json::from_str(r#"{"name":"a","version":3}"#).unwrap();
        assert_eq!(
            patch.into_changes().unwrap_err(),
            ValidationError::ServerOwnedField("version")
        );
    }

    #[test]
    fn element_json_uses_camel_case_and_flattened_audit() {
        let element = ModelElement {
            id: Uuid::new_v4(),
            req_id: Some("REQ-1".to_string()),
            name: "Engine Thrust".to_string(),
            text: "shall produce thrust".to_string(),
            parent_id: None,
            children: vec![Uuid::new_v4()],
            audit: super::AuditStamp {
                created_at: 10,
                created_by: "alice".to_string(),
                updated_at: 10,
                updated_by: "alice".to_string(),
            },
            version: 1,
        };

        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(value["reqId"], "REQ-1");
        assert_eq!(value["createdAt"], 10);
        assert_eq!(value["updatedBy"], "alice");
        assert!(value["parentId"].is_null());

        let decoded: ModelElement = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, element);
    }
}
