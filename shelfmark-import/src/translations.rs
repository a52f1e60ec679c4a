//! Translation linking by shared translated title.
//!
//! Active books whose translated titles match after trimming and case folding
//! are treated as translations of one another, and each ordered pair gets a
//! "translated" edge. Two books that each carry exactly one language, and the
//! same one, are taken for duplicates rather than translations and left
//! unlinked. The pass checks for an existing edge before every insert, so
//! running it again on an unchanged catalog creates nothing.

use std::collections::BTreeMap;

use rusqlite::Connection;
use shelfmark_catalog::options::InferenceOptions;
use shelfmark_catalog::types::RelationshipType;
use shelfmark_db::queries::TranslationCandidate;
use shelfmark_db::{operations, queries};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Database error: {0}")]
    Db(#[from] operations::OperationError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Statistics from an inference run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InferenceStats {
    pub groups_processed: usize,
    pub relationships_created: usize,
    pub skipped_same_language: usize,
    pub already_linked: usize,
    /// Existing "translated" edges removed by `clear_existing`.
    pub cleared: usize,
    pub failed_groups: usize,
}

/// Detail for one title group (used for CLI output).
#[derive(Debug)]
pub struct GroupDetail {
    pub title: String,
    pub book_ids: Vec<i64>,
    pub created: usize,
}

/// Result of inference including stats and per-group details.
pub struct InferenceResult {
    pub stats: InferenceStats,
    pub details: Vec<GroupDetail>,
}

/// Group key for a translated title.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Whether a pair is a probable duplicate: both sides have exactly one
/// language, and it is the same. Books with several languages are never
/// excluded, even when their language sets are identical.
pub fn same_single_language(a: &TranslationCandidate, b: &TranslationCandidate) -> bool {
    a.language_ids.len() == 1 && b.language_ids.len() == 1 && a.language_ids == b.language_ids
}

/// Run translation inference over the whole catalog.
pub fn infer_translations(
    conn: &Connection,
    options: &InferenceOptions,
) -> Result<InferenceResult, InferenceError> {
    let mut stats = InferenceStats::default();
    let mut details = Vec::new();

    let mut groups: BTreeMap<String, Vec<TranslationCandidate>> = BTreeMap::new();
    for candidate in queries::translation_candidates(conn)? {
        groups
            .entry(normalize_title(&candidate.translated_title))
            .or_default()
            .push(candidate);
    }
    groups.retain(|_, members| members.len() >= 2);
    log::debug!("{} translated-title groups with two or more books", groups.len());

    // Wrap everything in a transaction (skipped for dry runs)
    if !options.dry_run {
        conn.execute_batch("BEGIN IMMEDIATE")?;
    }

    let result = infer_groups(conn, &groups, options, &mut stats, &mut details).and_then(|()| {
        if !options.dry_run {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    });

    match result {
        Ok(()) => {}
        Err(e) => {
            if !options.dry_run {
                let _ = conn.execute_batch("ROLLBACK");
            }
            return Err(e);
        }
    }

    Ok(InferenceResult { stats, details })
}

/// Clear old edges if asked, then process every group.
fn infer_groups(
    conn: &Connection,
    groups: &BTreeMap<String, Vec<TranslationCandidate>>,
    options: &InferenceOptions,
    stats: &mut InferenceStats,
    details: &mut Vec<GroupDetail>,
) -> Result<(), InferenceError> {
    if options.clear_existing {
        if options.dry_run {
            stats.cleared = queries::relationships_of_type(conn, RelationshipType::Translated)?.len();
        } else {
            stats.cleared =
                operations::delete_relationships_of_type(conn, RelationshipType::Translated)?;
        }
    }

    for (title, members) in groups {
        if !options.dry_run {
            conn.execute_batch("SAVEPOINT inference_group")?;
        }
        let mut group_stats = InferenceStats::default();
        match link_group(conn, members, options, &mut group_stats) {
            Ok(()) => {
                if !options.dry_run {
                    conn.execute_batch("RELEASE inference_group")?;
                }
                stats.groups_processed += 1;
                stats.relationships_created += group_stats.relationships_created;
                stats.skipped_same_language += group_stats.skipped_same_language;
                stats.already_linked += group_stats.already_linked;
                details.push(GroupDetail {
                    title: title.clone(),
                    book_ids: members.iter().map(|m| m.book_id).collect(),
                    created: group_stats.relationships_created,
                });
            }
            Err(e) => {
                if !options.dry_run {
                    conn.execute_batch("ROLLBACK TO inference_group; RELEASE inference_group")?;
                }
                log::warn!("Translation group '{}' failed: {}", title, e);
                stats.failed_groups += 1;
            }
        }
    }

    Ok(())
}

/// Link every ordered pair of one group.
fn link_group(
    conn: &Connection,
    members: &[TranslationCandidate],
    options: &InferenceOptions,
    stats: &mut InferenceStats,
) -> Result<(), InferenceError> {
    for a in members {
        for b in members {
            if a.book_id == b.book_id {
                continue;
            }
            if same_single_language(a, b) {
                stats.skipped_same_language += 1;
                continue;
            }
            // A dry run with clear_existing treats every old edge as gone.
            let exists = !(options.dry_run && options.clear_existing)
                && operations::relationship_exists(
                    conn,
                    a.book_id,
                    b.book_id,
                    RelationshipType::Translated,
                )?;
            if exists {
                stats.already_linked += 1;
                continue;
            }
            if !options.dry_run {
                let note = format!(
                    "Auto-detected translation: same translated title '{}'",
                    b.translated_title.trim()
                );
                operations::insert_relationship(
                    conn,
                    a.book_id,
                    b.book_id,
                    RelationshipType::Translated,
                    Some(&note),
                )?;
            }
            stats.relationships_created += 1;
        }
    }
    Ok(())
}
