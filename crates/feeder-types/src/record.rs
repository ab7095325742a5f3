//! Documents delivered to the search indexer.

use serde::{Deserialize, Serialize};

/// One item as the indexer receives it.
///
/// Serializes to `{"title": ..., "name": ..., "identifiers": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Title-like field of the item
    pub title: String,

    /// Surname of the item's first creator
    pub name: String,

    /// Comma-joined external identifiers (DOI first, then ISBN)
    pub identifiers: String,
}

impl IndexRecord {
    /// Build a record, joining the optional identifiers.
    pub fn new(
        title: impl Into<String>,
        name: impl Into<String>,
        doi: Option<&str>,
        isbn: Option<&str>,
    ) -> Self {
        Self {
            title: title.into(),
            name: name.into(),
            identifiers: join_identifiers(doi, isbn),
        }
    }
}

/// Join DOI and ISBN into the indexer's identifier list.
///
/// Missing and empty values are skipped; order is always DOI then ISBN.
pub fn join_identifiers(doi: Option<&str>, isbn: Option<&str>) -> String {
    [doi, isbn]
        .into_iter()
        .flatten()
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
