//! Reconciliation planning: decide what each candidate row does and diff it
//! against the record it matches.
//!
//! Planning never writes. In preview mode the planner keeps an overlay of the
//! records earlier rows would have created or updated, so later rows sharing
//! an external key see them exactly as a real import would.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rusqlite::Connection;
use shelfmark_catalog::columns::{format_bool, join_list};
use shelfmark_catalog::types::{BookDetail, CreatorRole, FileKind, ImportMode};
use shelfmark_db::operations::{self, OperationError};

use crate::normalize::CandidateBook;
use crate::resolve::ResolvedBook;

// ── Field State ─────────────────────────────────────────────────────────────

/// A comparable rendering of one logical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Empty,
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("(empty)"),
            Self::Text(s) => f.write_str(s),
            Self::List(values) => f.write_str(&join_list(values)),
        }
    }
}

/// Logical field values of a book, keyed by field name.
///
/// Lookup references are compared by name, which is unique within a lookup
/// kind. Unordered sets (classifications, locations) are kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookState {
    fields: BTreeMap<String, FieldValue>,
}

pub fn creators_key(role: CreatorRole) -> String {
    format!("creators.{}", role.as_str())
}

pub fn classification_key(type_name: &str) -> String {
    format!("classifications.{type_name}")
}

pub fn files_key(kind: FileKind) -> String {
    format!("files.{}", kind.as_str())
}

fn text(value: impl ToString) -> FieldValue {
    FieldValue::Text(value.to_string())
}

fn opt_text<T: fmt::Display>(value: &Option<T>) -> FieldValue {
    value.as_ref().map_or(FieldValue::Empty, text)
}

fn list(values: Vec<String>) -> FieldValue {
    if values.is_empty() {
        FieldValue::Empty
    } else {
        FieldValue::List(values)
    }
}

impl BookState {
    /// State of a freshly created record before any row value is applied.
    pub fn defaults() -> Self {
        let mut state = Self::default();
        state.set("access_level", text("full"));
        state.set("is_active", text(format_bool(true)));
        state.set("is_featured", text(format_bool(false)));
        state.set("sort_order", text(0));
        state
    }

    /// Full state of a stored record.
    pub fn from_detail(detail: &BookDetail) -> Self {
        let book = &detail.book;
        let mut state = Self::default();
        state.set("internal_id", opt_text(&book.internal_id));
        state.set("palm_code", opt_text(&book.palm_code));
        state.set("title", text(&book.title));
        state.set("subtitle", opt_text(&book.subtitle));
        state.set("translated_title", opt_text(&book.translated_title));
        state.set("description", opt_text(&book.description));
        state.set("publication_year", opt_text(&book.publication_year));
        state.set("pages", opt_text(&book.pages));
        state.set("access_level", text(book.access_level.as_str()));
        state.set("is_active", text(format_bool(book.is_active)));
        state.set("is_featured", text(format_bool(book.is_featured)));
        state.set("sort_order", text(book.sort_order));
        state.set(
            "publisher",
            opt_text(&detail.publisher.as_ref().map(|p| p.name.clone())),
        );
        state.set(
            "collection",
            opt_text(&detail.collection.as_ref().map(|c| c.name.clone())),
        );
        state.set(
            "languages",
            list(detail.languages.iter().map(|l| l.name.clone()).collect()),
        );
        for role in CreatorRole::ALL {
            let names: Vec<_> = detail
                .creators_with_role(role)
                .map(|c| c.name.clone())
                .collect();
            if !names.is_empty() {
                state.set(&creators_key(role), list(names));
            }
        }
        let mut by_type: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for c in &detail.classifications {
            by_type.entry(c.type_name.as_str()).or_default().push(c.value.clone());
        }
        for (type_name, mut values) in by_type {
            values.sort();
            state.set(&classification_key(type_name), list(values));
        }
        let mut locations: Vec<_> = detail.locations.iter().map(|l| l.name.clone()).collect();
        locations.sort();
        state.set("locations", list(locations));
        for kind in FileKind::ALL {
            let names: Vec<_> = detail
                .files_of_kind(kind)
                .map(|f| f.filename.clone())
                .collect();
            if !names.is_empty() {
                state.set(&files_key(kind), list(names));
            }
        }
        for (key, value) in &book.extra_fields {
            state.set(&format!("extra.{key}"), text(value));
        }
        state
    }

    /// The fields a row provides. Blank cells are absent.
    pub fn from_candidate(candidate: &CandidateBook, resolved: &ResolvedBook) -> Self {
        let mut state = Self::default();
        let mut put = |key: &str, value: Option<FieldValue>| {
            if let Some(value) = value {
                state.set(key, value);
            }
        };
        put("internal_id", candidate.internal_id.as_ref().map(text));
        put("palm_code", candidate.palm_code.as_ref().map(text));
        put("title", candidate.title.as_ref().map(text));
        put("subtitle", candidate.subtitle.as_ref().map(text));
        put("translated_title", candidate.translated_title.as_ref().map(text));
        put("description", candidate.description.as_ref().map(text));
        put("publication_year", candidate.publication_year.map(text));
        put("pages", candidate.pages.map(text));
        put("access_level", candidate.access_level.map(|a| text(a.as_str())));
        put("is_active", candidate.is_active.map(|b| text(format_bool(b))));
        put("is_featured", candidate.is_featured.map(|b| text(format_bool(b))));
        put("sort_order", candidate.sort_order.map(text));
        put("publisher", resolved.publisher.as_ref().map(|r| text(&r.name)));
        put("collection", resolved.collection.as_ref().map(|r| text(&r.name)));

        if !resolved.languages.is_empty() {
            state.set(
                "languages",
                list(resolved.languages.iter().map(|r| r.name.clone()).collect()),
            );
        }
        for (role, refs) in &resolved.creators {
            state.set(
                &creators_key(*role),
                list(refs.iter().map(|r| r.name.clone()).collect()),
            );
        }
        for (type_name, classification) in &resolved.classifications {
            let mut values: Vec<_> = classification.values.iter().map(|r| r.name.clone()).collect();
            values.sort();
            state.set(&classification_key(type_name), list(values));
        }
        if !resolved.locations.is_empty() {
            let mut values: Vec<_> = resolved.locations.iter().map(|r| r.name.clone()).collect();
            values.sort();
            state.set("locations", list(values));
        }
        for (kind, names) in &candidate.files {
            if !names.is_empty() {
                state.set(&files_key(*kind), list(names.clone()));
            }
        }
        for (key, value) in &candidate.extra {
            state.set(&format!("extra.{key}"), text(value));
        }
        state
    }

    fn set(&mut self, key: &str, value: FieldValue) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> &FieldValue {
        self.fields.get(key).unwrap_or(&FieldValue::Empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overlay every field of `incoming`.
    pub fn apply(&mut self, incoming: &BookState) {
        for (key, value) in &incoming.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// One changed field of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub old: FieldValue,
    pub new: FieldValue,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.old, self.new)
    }
}

/// Fields of `incoming` whose value differs from `existing`.
pub fn diff(existing: &BookState, incoming: &BookState) -> Vec<FieldChange> {
    incoming
        .iter()
        .filter_map(|(key, new)| {
            let old = existing.get(key);
            (old != new).then(|| FieldChange {
                field: key.to_string(),
                old: old.clone(),
                new: new.clone(),
            })
        })
        .collect()
}

// ── Plans ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Skip,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Skip => "skip",
        }
    }
}

/// The mode/match decision table.
pub fn decide(mode: ImportMode, matched: bool) -> PlanAction {
    match (mode, matched) {
        (ImportMode::CreateOnly, false) => PlanAction::Create,
        (ImportMode::CreateOnly, true) => PlanAction::Skip,
        (ImportMode::UpdateOnly, false) => PlanAction::Skip,
        (ImportMode::UpdateOnly, true) => PlanAction::Update,
        (ImportMode::Upsert, false) => PlanAction::Create,
        (ImportMode::Upsert, true) => PlanAction::Update,
        (ImportMode::CreateDuplicates, _) => PlanAction::Create,
    }
}

/// The decision for one candidate row.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub row: usize,
    /// External key or title, for display.
    pub label: String,
    pub action: PlanAction,
    /// Stored record an update targets. `None` for creates, skips, and
    /// updates of a record created earlier in the same preview.
    pub target_id: Option<i64>,
    /// For updates, the diff. For creates, every provided field as new.
    pub changes: Vec<FieldChange>,
    pub skip_reason: Option<String>,
    /// Record state after the plan is applied.
    pub state: BookState,
}

/// The record a candidate row matched.
#[derive(Debug, Clone)]
pub struct Matched {
    pub book_id: Option<i64>,
    pub state: BookState,
    /// Stored detail; absent for matches against the preview overlay.
    pub detail: Option<BookDetail>,
}

struct OverlayEntry {
    book_id: Option<i64>,
    state: BookState,
}

/// Plans rows against the catalog for one run.
pub struct Planner {
    mode: ImportMode,
    preview: bool,
    overlay: Vec<OverlayEntry>,
    by_key: HashMap<String, usize>,
    by_book: HashMap<i64, usize>,
}

impl Planner {
    /// A planner for a real import: earlier rows are already in the database.
    pub fn new(mode: ImportMode) -> Self {
        Self {
            mode,
            preview: false,
            overlay: Vec::new(),
            by_key: HashMap::new(),
            by_book: HashMap::new(),
        }
    }

    /// A planner that remembers what earlier rows would have done.
    pub fn for_preview(mode: ImportMode) -> Self {
        Self {
            preview: true,
            ..Self::new(mode)
        }
    }

    pub fn mode(&self) -> ImportMode {
        self.mode
    }

    /// Find the active record a row reconciles to: by `internal_id`, then by
    /// `palm_code`. Duplicate mode never matches.
    pub fn find_match(
        &self,
        conn: &Connection,
        candidate: &CandidateBook,
    ) -> Result<Option<Matched>, OperationError> {
        if self.mode == ImportMode::CreateDuplicates {
            return Ok(None);
        }
        let keys = [
            ("internal_id", candidate.internal_id.as_deref()),
            ("palm_code", candidate.palm_code.as_deref()),
        ];
        for (key_name, value) in keys {
            let Some(value) = value else { continue };
            if let Some(&index) = self.by_key.get(&overlay_key(key_name, value)) {
                return Ok(Some(self.overlay_match(index)));
            }
            let book = if key_name == "internal_id" {
                operations::find_active_book_by_key(conn, Some(value), None)?
            } else {
                operations::find_active_book_by_key(conn, None, Some(value))?
            };
            let Some(book) = book else { continue };
            if let Some(&index) = self.by_book.get(&book.id) {
                return Ok(Some(self.overlay_match(index)));
            }
            let detail = operations::get_book_detail(conn, book.id)?.ok_or_else(|| {
                OperationError::NotFound {
                    entity_type: "book".to_string(),
                    id: book.id.to_string(),
                }
            })?;
            return Ok(Some(Matched {
                book_id: Some(book.id),
                state: BookState::from_detail(&detail),
                detail: Some(detail),
            }));
        }
        Ok(None)
    }

    fn overlay_match(&self, index: usize) -> Matched {
        let entry = &self.overlay[index];
        Matched {
            book_id: entry.book_id,
            state: entry.state.clone(),
            detail: None,
        }
    }

    /// Plan one row.
    pub fn plan(
        &self,
        candidate: &CandidateBook,
        resolved: &ResolvedBook,
        matched: Option<&Matched>,
    ) -> ImportPlan {
        let action = decide(self.mode, matched.is_some());
        let incoming = BookState::from_candidate(candidate, resolved);
        let mut plan = ImportPlan {
            row: candidate.row,
            label: candidate.label(),
            action,
            target_id: matched.and_then(|m| m.book_id),
            changes: Vec::new(),
            skip_reason: None,
            state: BookState::default(),
        };
        match (action, matched) {
            (PlanAction::Skip, Some(m)) => {
                plan.skip_reason = Some(format!(
                    "matches existing record{} ({} mode)",
                    m.book_id.map(|id| format!(" {id}")).unwrap_or_default(),
                    self.mode
                ));
                plan.state = m.state.clone();
            }
            (PlanAction::Skip, None) => {
                plan.skip_reason = Some(format!("no matching record ({} mode)", self.mode));
            }
            (PlanAction::Update, Some(m)) => {
                plan.changes = diff(&m.state, &incoming);
                plan.state = m.state.clone();
                plan.state.apply(&incoming);
            }
            _ => {
                plan.target_id = None;
                plan.changes = diff(&BookState::default(), &incoming);
                plan.state = BookState::defaults();
                plan.state.apply(&incoming);
            }
        }
        plan
    }

    /// Record a successfully planned row so later preview rows can match it.
    /// Does nothing outside preview mode.
    pub fn remember(&mut self, plan: &ImportPlan) {
        if !self.preview || plan.action == PlanAction::Skip {
            return;
        }
        let index = match plan.target_id.and_then(|id| self.by_book.get(&id).copied()) {
            Some(index) => {
                self.overlay[index].state = plan.state.clone();
                index
            }
            None if plan.action == PlanAction::Update && plan.target_id.is_none() => {
                // Update of a record pending from an earlier row.
                match self.find_pending(plan) {
                    Some(index) => {
                        self.overlay[index].state = plan.state.clone();
                        index
                    }
                    None => return,
                }
            }
            None => {
                self.overlay.push(OverlayEntry {
                    book_id: plan.target_id,
                    state: plan.state.clone(),
                });
                let index = self.overlay.len() - 1;
                if let Some(id) = plan.target_id {
                    self.by_book.insert(id, index);
                }
                index
            }
        };
        for key_name in ["internal_id", "palm_code"] {
            if let FieldValue::Text(value) = plan.state.get(key_name) {
                self.by_key
                    .entry(overlay_key(key_name, value))
                    .or_insert(index);
            }
        }
    }

    fn find_pending(&self, plan: &ImportPlan) -> Option<usize> {
        ["internal_id", "palm_code"].iter().find_map(|key_name| {
            match plan.state.get(key_name) {
                FieldValue::Text(value) => self.by_key.get(&overlay_key(key_name, value)).copied(),
                _ => None,
            }
        })
    }
}

fn overlay_key(key_name: &str, value: &str) -> String {
    format!("{key_name}:{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        use ImportMode::*;
        assert_eq!(decide(CreateOnly, false), PlanAction::Create);
        assert_eq!(decide(CreateOnly, true), PlanAction::Skip);
        assert_eq!(decide(UpdateOnly, false), PlanAction::Skip);
        assert_eq!(decide(UpdateOnly, true), PlanAction::Update);
        assert_eq!(decide(Upsert, false), PlanAction::Create);
        assert_eq!(decide(Upsert, true), PlanAction::Update);
        assert_eq!(decide(CreateDuplicates, false), PlanAction::Create);
        assert_eq!(decide(CreateDuplicates, true), PlanAction::Create);
    }

    #[test]
    fn diff_omits_unchanged_fields() {
        let mut existing = BookState::defaults();
        existing.set("title", text("Uno"));
        let mut incoming = BookState::default();
        incoming.set("title", text("Uno"));
        incoming.set("is_featured", text("true"));
        incoming.set("pages", text(120));

        let changes = diff(&existing, &incoming);
        let fields: Vec<_> = changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["is_featured", "pages"]);
        assert_eq!(changes[1].old, FieldValue::Empty);
        assert_eq!(changes[1].to_string(), "pages: (empty) -> 120");
    }

    #[test]
    fn preview_overlay_turns_repeat_keys_into_updates() {
        let conn = shelfmark_db::open_memory().unwrap();
        let mut planner = Planner::for_preview(ImportMode::Upsert);
        let first = CandidateBook {
            row: 2,
            internal_id: Some("TEST-000001".to_string()),
            title: Some("Original".to_string()),
            ..Default::default()
        };
        let matched = planner.find_match(&conn, &first).unwrap();
        assert!(matched.is_none());
        let plan = planner.plan(&first, &ResolvedBook::default(), None);
        assert_eq!(plan.action, PlanAction::Create);
        planner.remember(&plan);

        let second = CandidateBook {
            row: 3,
            title: Some("Changed".to_string()),
            ..first.clone()
        };
        let matched = planner.find_match(&conn, &second).unwrap().unwrap();
        let plan = planner.plan(&second, &ResolvedBook::default(), Some(&matched));
        assert_eq!(plan.action, PlanAction::Update);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].field, "title");
        planner.remember(&plan);

        let matched = planner.find_match(&conn, &second).unwrap().unwrap();
        assert_eq!(matched.state.get("title"), &text("Changed"));
    }
}
