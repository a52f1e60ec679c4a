//! SQLite persistence layer for the book catalog.
//!
//! Provides schema creation, CRUD operations, and query APIs
//! backed by SQLite (via rusqlite with bundled feature).

pub mod operations;
pub mod queries;
pub mod schema;

pub use operations::{
    OperationError, SeedError, SeedStats, delete_relationships_of_type,
    delete_unresolved_issues, find_active_book_by_key, find_lookup, finalize_import_run,
    get_book, get_book_detail, insert_book, insert_import_run, insert_lookup,
    insert_quality_issue, insert_relationship, language_iso_code, link_run_book,
    relationship_exists, resolve_issues_by_type, seed_from_catalog, set_book_classifications,
    set_book_creators, set_book_files, set_book_languages, set_book_locations,
    unresolved_issue_exists, update_book, upsert_classification_type, upsert_language,
};
pub use queries::{
    CatalogStats, DuplicateKeys, IssueFilter, RelationshipRow, TranslationCandidate,
    all_book_ids, catalog_stats, count_books, duplicate_key_counts, export_page,
    get_import_run, list_import_runs, list_issues, relationships_from, relationships_of_type,
    run_book_ids, translation_candidates, unresolved_issue_counts,
};
pub use rusqlite::Connection;
pub use schema::{SchemaError, open_database, open_memory};
