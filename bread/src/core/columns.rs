//! Browse-view column declarations.

use serde::{Deserialize, Serialize};

/// How a column participates in ordering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    /// Sort on the column's field spec when the storage layer accepts it.
    #[default]
    Auto,
    /// `false` disables sorting; `true` is the same as `Auto`.
    Enabled(bool),
    /// Sort on a different path than the one displayed.
    By(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub label: String,
    pub field: String,
    #[serde(default)]
    pub sort: SortSpec,
    /// Value computed at query time; not validated against the schema.
    #[serde(default)]
    pub annotation: bool,
}

impl Column {
    pub fn new(label: &str, field: &str) -> Self {
        Self {
            label: label.to_string(),
            field: field.to_string(),
            sort: SortSpec::Auto,
            annotation: false,
        }
    }

    pub fn unsortable(mut self) -> Self {
        self.sort = SortSpec::Enabled(false);
        self
    }

    pub fn sort_by(mut self, spec: &str) -> Self {
        self.sort = SortSpec::By(spec.to_string());
        self
    }

    /// Field spec handed to the storage layer when sorting on this column.
    pub fn sort_field(&self) -> Option<&str> {
        match &self.sort {
            SortSpec::Auto | SortSpec::Enabled(true) => Some(&self.field),
            SortSpec::Enabled(false) => None,
            SortSpec::By(spec) => Some(spec),
        }
    }
}
