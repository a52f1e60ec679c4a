//! Entity resolution: lookup names to stable identifiers.
//!
//! Every foreign reference of a candidate row (publisher, collection,
//! creators, languages, classification values, locations) is matched by exact
//! name within its lookup kind. Missing entities are created when the run
//! allows it, otherwise the field fails to resolve.

use std::collections::{BTreeMap, HashMap};

use rusqlite::Connection;
use shelfmark_catalog::columns::{COLUMNS, Field};
use shelfmark_catalog::types::{CreatorRole, LookupKind, NewLookup, RowIssue};
use shelfmark_db::operations::{self, OperationError};
use thiserror::Error;

use crate::normalize::CandidateBook;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{kind} '{name}' does not exist")]
    Missing { kind: LookupKind, name: String },
    #[error("Database error: {0}")]
    Db(#[from] OperationError),
}

/// Name → id cache for one run, per lookup kind and parent.
///
/// Inserts write through it. Anything rolled back must be followed by
/// [`LookupCache::invalidate`], since the cache may hold ids that no longer
/// exist.
#[derive(Debug, Default)]
pub struct LookupCache {
    entries: HashMap<(LookupKind, Option<i64>, String), i64>,
}

impl LookupCache {
    pub fn get(&self, kind: LookupKind, parent_id: Option<i64>, name: &str) -> Option<i64> {
        self.entries
            .get(&(kind, parent_id, name.to_string()))
            .copied()
    }

    pub fn insert(&mut self, kind: LookupKind, parent_id: Option<i64>, name: &str, id: i64) {
        self.entries.insert((kind, parent_id, name.to_string()), id);
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resolved reference. `id` is `None` only in dry-run mode, for an entity
/// that would be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedClassification {
    pub type_id: Option<i64>,
    pub values: Vec<ResolvedRef>,
}

/// The foreign references of one candidate row.
///
/// Absent or empty entries mean the row did not provide the field (or it
/// was left unset after a resolution failure).
#[derive(Debug, Clone, Default)]
pub struct ResolvedBook {
    pub publisher: Option<ResolvedRef>,
    pub collection: Option<ResolvedRef>,
    /// Primary language first.
    pub languages: Vec<ResolvedRef>,
    pub creators: BTreeMap<CreatorRole, Vec<ResolvedRef>>,
    pub classifications: BTreeMap<String, ResolvedClassification>,
    pub locations: Vec<ResolvedRef>,
    /// Resolution failures (errors) and skipped fields (warnings).
    pub issues: Vec<RowIssue>,
    /// Entities that would be created (dry run only).
    pub would_create: Vec<(LookupKind, String)>,
}

impl ResolvedBook {
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.level == shelfmark_catalog::types::IssueLevel::Error)
    }
}

/// Concrete ids of a resolved list. Pending entries are left out.
pub fn ids(refs: &[ResolvedRef]) -> Vec<i64> {
    refs.iter().filter_map(|r| r.id).collect()
}

/// Resolves lookup names against the database for one run.
pub struct EntityResolver {
    create_missing: bool,
    skip_unresolved: bool,
    dry_run: bool,
    cache: LookupCache,
}

impl EntityResolver {
    pub fn new(create_missing: bool, skip_unresolved: bool) -> Self {
        Self {
            create_missing,
            skip_unresolved,
            dry_run: false,
            cache: LookupCache::default(),
        }
    }

    /// A resolver that never writes; missing entities resolve as pending
    /// when creation is enabled.
    pub fn dry_run(create_missing: bool, skip_unresolved: bool) -> Self {
        Self {
            dry_run: true,
            ..Self::new(create_missing, skip_unresolved)
        }
    }

    /// Forget cached ids after a rollback.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    /// Resolve one name within a lookup kind.
    pub fn resolve(
        &mut self,
        conn: &Connection,
        kind: LookupKind,
        parent_id: Option<i64>,
        name: &str,
        iso_code: Option<&str>,
    ) -> Result<ResolvedRef, ResolveError> {
        let found = |id: Option<i64>| ResolvedRef {
            id,
            name: name.to_string(),
        };

        if kind.is_scoped() && parent_id.is_none() {
            // The parent is itself pending, so the child cannot exist yet.
            if self.dry_run && self.create_missing {
                return Ok(found(None));
            }
            return Err(ResolveError::Missing {
                kind,
                name: name.to_string(),
            });
        }

        if let Some(id) = self.cache.get(kind, parent_id, name) {
            return Ok(found(Some(id)));
        }
        if let Some(id) = operations::find_lookup(conn, kind, parent_id, name)? {
            self.cache.insert(kind, parent_id, name, id);
            return Ok(found(Some(id)));
        }
        if !self.create_missing {
            return Err(ResolveError::Missing {
                kind,
                name: name.to_string(),
            });
        }
        if self.dry_run {
            return Ok(found(None));
        }

        let id = operations::insert_lookup(
            conn,
            &NewLookup {
                kind,
                name,
                parent_id,
                iso_code,
            },
        )?;
        log::debug!("Created {} '{}' (id {})", kind, name, id);
        self.cache.insert(kind, parent_id, name, id);
        Ok(found(Some(id)))
    }

    /// Resolve every foreign reference of a candidate row.
    ///
    /// Only storage failures are returned as `Err`; unresolved names become
    /// row issues on the result.
    pub fn resolve_book(
        &mut self,
        conn: &Connection,
        candidate: &CandidateBook,
    ) -> Result<ResolvedBook, OperationError> {
        let mut out = ResolvedBook::default();
        let row = candidate.row;

        if let Some(name) = &candidate.publisher {
            out.publisher = self.field(
                conn,
                &mut out,
                row,
                header_of(Field::Publisher),
                LookupKind::Publisher,
                None,
                name,
                None,
            )?;
        }
        if let Some(name) = &candidate.collection {
            out.collection = self.field(
                conn,
                &mut out,
                row,
                header_of(Field::Collection),
                LookupKind::Collection,
                None,
                name,
                None,
            )?;
        }

        for (i, name) in candidate.language_names().iter().enumerate() {
            let primary = i == 0 && candidate.language.is_some();
            let (header, iso_code) = if primary {
                (header_of(Field::Language), candidate.language_code.as_deref())
            } else {
                (header_of(Field::AdditionalLanguages), None)
            };
            if let Some(r) = self.field(
                conn,
                &mut out,
                row,
                header,
                LookupKind::Language,
                None,
                name,
                iso_code,
            )? {
                out.languages.push(r);
            }
        }

        for (role, names) in &candidate.creators {
            let header = header_of(Field::Creators(*role));
            let mut refs = Vec::with_capacity(names.len());
            for name in names {
                if let Some(r) =
                    self.field(conn, &mut out, row, header, LookupKind::Creator, None, name, None)?
                {
                    refs.push(r);
                }
            }
            if !refs.is_empty() {
                out.creators.insert(*role, refs);
            }
        }

        for (type_name, values) in &candidate.classifications {
            let header = classification_header(type_name);
            let Some(type_ref) = self.field(
                conn,
                &mut out,
                row,
                header,
                LookupKind::ClassificationType,
                None,
                type_name,
                None,
            )?
            else {
                continue;
            };
            let mut refs = Vec::with_capacity(values.len());
            for value in values {
                if let Some(r) = self.field(
                    conn,
                    &mut out,
                    row,
                    header,
                    LookupKind::ClassificationValue,
                    Some(&type_ref),
                    value,
                    None,
                )? {
                    refs.push(r);
                }
            }
            if !refs.is_empty() {
                out.classifications.insert(
                    type_name.clone(),
                    ResolvedClassification {
                        type_id: type_ref.id,
                        values: refs,
                    },
                );
            }
        }

        for name in &candidate.locations {
            if let Some(r) = self.field(
                conn,
                &mut out,
                row,
                header_of(Field::Locations),
                LookupKind::Location,
                None,
                name,
                None,
            )? {
                out.locations.push(r);
            }
        }

        Ok(out)
    }

    /// Resolve one reference, turning a missing entity into a row issue.
    ///
    /// Pending entities under a parent are listed as `"<parent>: <name>"`,
    /// so equal names under different parents stay distinct.
    #[allow(clippy::too_many_arguments)]
    fn field(
        &mut self,
        conn: &Connection,
        out: &mut ResolvedBook,
        row: usize,
        header: &str,
        kind: LookupKind,
        parent: Option<&ResolvedRef>,
        name: &str,
        iso_code: Option<&str>,
    ) -> Result<Option<ResolvedRef>, OperationError> {
        match self.resolve(conn, kind, parent.and_then(|p| p.id), name, iso_code) {
            Ok(r) => {
                if r.id.is_none() {
                    let label = match parent {
                        Some(p) => format!("{}: {}", p.name, name),
                        None => name.to_string(),
                    };
                    if !out.would_create.iter().any(|(k, n)| *k == kind && *n == label) {
                        out.would_create.push((kind, label));
                    }
                }
                Ok(Some(r))
            }
            Err(ResolveError::Missing { kind, name }) => {
                let message = format!("{kind} '{name}' does not exist");
                if self.skip_unresolved {
                    out.issues.push(RowIssue::warning(
                        row,
                        Some(header),
                        format!("{message}; left unset"),
                    ));
                } else {
                    out.issues.push(RowIssue::error(row, Some(header), message));
                }
                Ok(None)
            }
            Err(ResolveError::Db(e)) => Err(e),
        }
    }
}

fn header_of(field: Field) -> &'static str {
    COLUMNS
        .iter()
        .find(|c| c.field == field)
        .map(|c| c.header)
        .unwrap_or("")
}

fn classification_header(type_name: &str) -> &'static str {
    COLUMNS
        .iter()
        .find(|c| matches!(c.field, Field::Classification(t) if t == type_name))
        .map(|c| c.header)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_is_scoped_by_kind_and_parent() {
        let mut cache = LookupCache::default();
        cache.insert(LookupKind::ClassificationValue, Some(1), "Novel", 10);
        assert_eq!(cache.get(LookupKind::ClassificationValue, Some(1), "Novel"), Some(10));
        assert_eq!(cache.get(LookupKind::ClassificationValue, Some(2), "Novel"), None);
        assert_eq!(cache.get(LookupKind::Publisher, None, "Novel"), None);
        cache.invalidate();
        assert!(cache.is_empty());
    }

    #[test]
    fn headers_exist_for_every_reference_field() {
        assert_eq!(header_of(Field::Publisher), "Publisher");
        assert_eq!(header_of(Field::Creators(CreatorRole::Editor)), "Editors");
        assert_eq!(classification_header("Keyword"), "Keywords");
    }
}
