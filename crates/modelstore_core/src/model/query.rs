//! Listing filters and page read models.

use crate::model::element::{ElementId, ModelElement};
use serde::{Deserialize, Serialize};

/// Restricts a listing to one level of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "scope", content = "parentId")]
pub enum ParentScope {
    /// Root-level elements only.
    Roots,
    /// Direct children of one element.
    ChildrenOf(ElementId),
}

/// Listing filter. The default matches every element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementFilter {
    /// Case-insensitive substring over reqId, name, and text.
    pub keyword: Option<String>,
    pub parent: Option<ParentScope>,
}

impl ElementFilter {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            parent: None,
        }
    }

    pub fn roots() -> Self {
        Self {
            keyword: None,
            parent: Some(ParentScope::Roots),
        }
    }

    pub fn children_of(parent_id: ElementId) -> Self {
        Self {
            keyword: None,
            parent: Some(ParentScope::ChildrenOf(parent_id)),
        }
    }

    /// Returns the trimmed, lower-cased keyword, or `None` when blank.
    pub fn normalized_keyword(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase)
    }
}

/// Page metadata.
///
/// `has_next == (page + 1) * size < total` and `has_previous == page > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: i64,
    pub page: i64,
    pub size: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// One page of elements in stable creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsPage {
    pub items: Vec<ModelElement>,
    pub page_info: PageInfo,
}
