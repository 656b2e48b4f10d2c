//! Secondary index declarations.

use std::collections::BTreeSet;
use std::sync::Arc;

/// Whether an index value is expected to resolve to a single primary key.
///
/// Multiplicity is advisory: the layer maintains entries identically for
/// both and never enforces uniqueness. The tag exists so schema declarations
/// state their intent explicitly instead of encoding it in a boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Multiplicity {
    /// One primary key per index value.
    Unique,
    /// Many primary keys may share one index value.
    MultiValued,
}

/// A secondary index on a record field.
///
/// The index value set is derived from the record by the extraction function
/// at write time; entries are created and retracted inside the same
/// transaction as the primary write.
pub struct Index<R> {
    name: String,
    multiplicity: Multiplicity,
    extract: Arc<dyn Fn(&R) -> Vec<String> + Send + Sync>,
}

impl<R> Clone for Index<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            multiplicity: self.multiplicity,
            extract: self.extract.clone(),
        }
    }
}

impl<R> Index<R> {
    /// Declares a single-valued index whose value is extracted by `f`.
    pub fn unique(
        name: impl Into<String>,
        f: impl Fn(&R) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            multiplicity: Multiplicity::Unique,
            extract: Arc::new(move |record| vec![f(record)]),
        }
    }

    /// Declares a multi-valued index: each extracted value gets its own
    /// entry for the record.
    pub fn multi_valued(
        name: impl Into<String>,
        f: impl Fn(&R) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            multiplicity: Multiplicity::MultiValued,
            extract: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    /// Extracts the deduplicated value set for a record.
    pub(crate) fn values(&self, record: &R) -> BTreeSet<String> {
        (self.extract)(record).into_iter().collect()
    }
}
