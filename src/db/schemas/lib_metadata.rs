//! Library metadata schema
//!
//! Cached size/item counters per library, maintained by backup tooling.
//! Not consulted for reference counting.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::LIBRARY_KEY;

/// Collection name for library metadata
pub const LIBRARY_METADATA_COLLECTION: &str = "library_metadata";

/// Library metadata document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LibraryMetadata {
    /// Library name
    pub library: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

/// Counter update applied with `$set`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LibraryCounters {
    pub size_bytes: Option<i64>,
    pub item_count: Option<i64>,
}

impl LibraryCounters {
    /// `$set` body for the counters present, stamped with the update time
    pub fn to_set_document(&self, now: DateTime) -> Document {
        let mut set = doc! { "updated_at": now };
        if let Some(size) = self.size_bytes {
            set.insert("size_bytes", size);
        }
        if let Some(count) = self.item_count {
            set.insert("item_count", count);
        }
        set
    }
}

/// Which libraries a metadata query addresses
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LibraryFilter {
    All,
    One(String),
    Many(Vec<String>),
}

impl LibraryFilter {
    pub fn to_query(&self) -> Document {
        match self {
            LibraryFilter::All => doc! {},
            LibraryFilter::One(name) => doc! { LIBRARY_KEY: name.as_str() },
            LibraryFilter::Many(names) => doc! { LIBRARY_KEY: { "$in": names.clone() } },
        }
    }

    pub fn matches(&self, library: &str) -> bool {
        match self {
            LibraryFilter::All => true,
            LibraryFilter::One(name) => name == library,
            LibraryFilter::Many(names) => names.iter().any(|n| n == library),
        }
    }
}

impl IntoIndexes for LibraryMetadata {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { LIBRARY_KEY: 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("library_metadata_unique".to_string())
                    .build(),
            ),
        )]
    }
}
