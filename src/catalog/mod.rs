//! Pattern catalog.
//!
//! A read-only list of [`PatternRecord`]s with lookup by id and category. The
//! built-in catalog is compiled into the binary from `data/patterns.json` and
//! parsed and checked once per process.

pub mod record;

pub use record::{Category, Participant, PatternRecord};

use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

const BUILTIN_PATTERNS: &str = include_str!("../../data/patterns.json");

static BUILTIN: OnceCell<Catalog> = OnceCell::new();

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate pattern id '{0}'")]
    DuplicateId(String),

    #[error("pattern '{id}' references unknown related pattern '{related}'")]
    DanglingReference { id: String, related: String },
}

#[derive(Debug, Clone)]
pub struct Catalog {
    records: Vec<PatternRecord>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// The embedded catalog.
    pub fn builtin() -> Result<&'static Catalog, CatalogError> {
        BUILTIN.get_or_try_init(|| Catalog::from_json(BUILTIN_PATTERNS))
    }

    /// Parse a JSON array of records and check it.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let records: Vec<PatternRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Build from records, rejecting duplicate ids and dangling references.
    pub fn from_records(records: Vec<PatternRecord>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            index.entry(record.id.clone()).or_insert(position);
        }

        let catalog = Self { records, index };
        catalog.verify_integrity()?;
        log::debug!("Loaded pattern catalog with {} records", catalog.len());
        Ok(catalog)
    }

    /// Check that ids are unique and every related id resolves.
    pub fn verify_integrity(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for record in &self.records {
            if !seen.insert(record.id.as_str()) {
                return Err(CatalogError::DuplicateId(record.id.clone()));
            }
        }

        for record in &self.records {
            if let Some(missing) = record
                .related_patterns
                .iter()
                .find(|related| !self.index.contains_key(related.as_str()))
            {
                return Err(CatalogError::DanglingReference {
                    id: record.id.clone(),
                    related: missing.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> Option<&PatternRecord> {
        self.index.get(id).map(|&position| &self.records[position])
    }

    /// Records in `category`, in catalog order.
    pub fn get_by_category(&self, category: Category) -> Vec<&PatternRecord> {
        self.records
            .iter()
            .filter(|record| record.category == category)
            .collect()
    }

    /// Like [`get_by_category`](Self::get_by_category), but an unknown name
    /// gives an empty list.
    pub fn get_by_category_name(&self, name: &str) -> Vec<&PatternRecord> {
        match name.parse::<Category>() {
            Ok(category) => self.get_by_category(category),
            Err(_) => Vec::new(),
        }
    }

    pub fn all(&self) -> &[PatternRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.id.as_str())
    }

    /// Resolved related records of `id`; empty for an unknown id.
    pub fn related(&self, id: &str) -> Vec<&PatternRecord> {
        self.get_by_id(id)
            .map(|record| {
                record
                    .related_patterns
                    .iter()
                    .filter_map(|related| self.get_by_id(related))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn search(&self, term: &str) -> Vec<&PatternRecord> {
        self.records
            .iter()
            .filter(|record| record.matches(term))
            .collect()
    }

    /// SHA256 of the canonical JSON form of every record, in catalog order.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for record in &self.records {
            let canonical = serde_json::to_string(record).unwrap_or_default();
            hasher.update(canonical.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}
