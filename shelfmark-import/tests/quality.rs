use shelfmark_catalog::options::{ImportOptions, QualityOptions, QualityScope};
use shelfmark_catalog::types::*;
use shelfmark_db::*;
use shelfmark_import::quality::{IssueDraft, RuleContext, run_rules};
use shelfmark_import::*;

fn lookup(conn: &Connection, kind: LookupKind, name: &str) -> i64 {
    if let Some(id) = find_lookup(conn, kind, None, name).unwrap() {
        return id;
    }
    insert_lookup(
        conn,
        &NewLookup {
            kind,
            name,
            parent_id: None,
            iso_code: None,
        },
    )
    .unwrap()
}

/// A book that passes every standard rule.
fn complete_book(conn: &Connection, internal_id: &str) -> i64 {
    let publisher = lookup(conn, LookupKind::Publisher, &format!("Editorial {internal_id}"));
    let id = insert_book(
        conn,
        &BookFields {
            internal_id: Some(internal_id.to_string()),
            publication_year: Some(1985),
            publisher_id: Some(publisher),
            ..BookFields::new("El amor en los tiempos del cólera")
        },
    )
    .unwrap();
    let author = lookup(conn, LookupKind::Creator, &format!("Autor {internal_id}"));
    set_book_creators(conn, id, CreatorRole::Author, &[author]).unwrap();
    let language = lookup(conn, LookupKind::Language, &format!("Lengua {internal_id}"));
    set_book_languages(conn, id, &[language]).unwrap();
    set_book_files(conn, id, FileKind::Pdf, &[format!("{internal_id}.pdf")]).unwrap();
    set_book_files(conn, id, FileKind::Thumbnail, &[format!("{internal_id}.jpg")]).unwrap();
    id
}

fn issue_types(conn: &Connection, book_id: i64) -> Vec<String> {
    let mut types: Vec<_> = list_issues(
        conn,
        &IssueFilter {
            book_id: Some(book_id),
            ..Default::default()
        },
    )
    .unwrap()
    .into_iter()
    .map(|i| i.issue_type)
    .collect();
    types.sort();
    types
}

fn check_all(conn: &Connection) -> QualityReport {
    run_quality_checks(conn, &QualityScope::All, &QualityOptions::default(), None, None).unwrap()
}

#[test]
fn complete_books_have_no_issues() {
    let conn = open_memory().unwrap();
    complete_book(&conn, "Q-1");

    let report = check_all(&conn);
    assert_eq!(report.total_checked, 1);
    assert_eq!(report.total_issues, 0);
}

#[test]
fn bare_book_reports_missing_fields() {
    let conn = open_memory().unwrap();
    let id = insert_book(&conn, &BookFields::new("Pedro Páramo")).unwrap();

    let report = check_all(&conn);
    assert_eq!(
        issue_types(&conn, id),
        vec![
            "missing_authors",
            "missing_language",
            "missing_publication_year",
            "missing_publisher",
            "missing_thumbnail",
            "no_pdf_file",
        ]
    );
    assert_eq!(report.count(Severity::Warning), 3);
    assert_eq!(report.count(Severity::Info), 3);
    assert!(!report.has_critical());
    assert_eq!(report.by_type.get("no_pdf_file"), Some(&1));
}

#[test]
fn blank_title_is_critical() {
    let conn = open_memory().unwrap();
    let id = complete_book(&conn, "Q-1");
    conn.execute("UPDATE books SET title = '  ' WHERE id = ?1", [id])
        .unwrap();

    let report = check_all(&conn);
    assert!(report.has_critical());
    assert_eq!(issue_types(&conn, id), vec!["missing_title"]);
}

#[test]
fn shared_keys_among_active_books_are_flagged() {
    let conn = open_memory().unwrap();
    let a = complete_book(&conn, "DUP-1");
    let b = complete_book(&conn, "DUP-1");
    conn.execute("UPDATE books SET palm_code = 'P-1' WHERE id IN (?1, ?2)", [a, b])
        .unwrap();
    let inactive = complete_book(&conn, "DUP-2");
    let other = complete_book(&conn, "DUP-2");
    conn.execute("UPDATE books SET is_active = 0 WHERE id = ?1", [inactive])
        .unwrap();

    let report = check_all(&conn);
    assert_eq!(report.by_type.get("duplicate_internal_id"), Some(&2));
    assert_eq!(report.by_type.get("duplicate_palm_code"), Some(&2));
    assert_eq!(
        issue_types(&conn, a),
        vec!["duplicate_internal_id", "duplicate_palm_code"]
    );
    assert!(issue_types(&conn, other).is_empty());
}

#[test]
fn implausible_years_are_flagged() {
    let conn = open_memory().unwrap();
    let early = complete_book(&conn, "Y-1");
    let future = complete_book(&conn, "Y-2");
    conn.execute("UPDATE books SET publication_year = 1200 WHERE id = ?1", [early])
        .unwrap();
    conn.execute("UPDATE books SET publication_year = 3000 WHERE id = ?1", [future])
        .unwrap();

    check_all(&conn);
    assert_eq!(issue_types(&conn, early), vec!["implausible_year"]);
    assert_eq!(issue_types(&conn, future), vec!["implausible_year"]);
}

#[test]
fn edges_to_inactive_books_are_orphans() {
    let conn = open_memory().unwrap();
    let a = complete_book(&conn, "R-1");
    let b = complete_book(&conn, "R-2");
    insert_relationship(&conn, a, b, RelationshipType::Edition, None).unwrap();
    conn.execute("UPDATE books SET is_active = 0 WHERE id = ?1", [b])
        .unwrap();

    check_all(&conn);
    assert_eq!(issue_types(&conn, a), vec!["orphan_relationship"]);
}

#[test]
fn referenced_files_are_checked_against_storage() {
    let conn = open_memory().unwrap();
    let media = tempfile::TempDir::new().unwrap();
    let id = complete_book(&conn, "F-1");
    std::fs::write(media.path().join("F-1.pdf"), b"%PDF-1.4").unwrap();
    let store = DirectoryFileStore::new(media.path());

    let report = run_quality_checks(
        &conn,
        &QualityScope::All,
        &QualityOptions::default(),
        Some(&store),
        None,
    )
    .unwrap();

    assert_eq!(issue_types(&conn, id), vec!["missing_file"]);
    assert_eq!(report.count(Severity::Critical), 1);
    let issue = &list_issues(&conn, &IssueFilter::default()).unwrap()[0];
    assert!(issue.message.contains("F-1.jpg"));
}

#[test]
fn rerunning_does_not_duplicate_issues() {
    let conn = open_memory().unwrap();
    insert_book(&conn, &BookFields::new("Pedro Páramo")).unwrap();

    let first = check_all(&conn);
    let second = check_all(&conn);
    assert_eq!(first.new_issues, 6);
    assert_eq!(second.total_issues, 6);
    assert_eq!(second.new_issues, 0);
    assert_eq!(list_issues(&conn, &IssueFilter::default()).unwrap().len(), 6);
}

#[test]
fn clear_existing_replaces_unresolved_issues_in_scope() {
    let conn = open_memory().unwrap();
    let a = insert_book(&conn, &BookFields::new("Uno")).unwrap();
    let b = insert_book(&conn, &BookFields::new("Dos")).unwrap();
    insert_quality_issue(&conn, a, "stale", Severity::Warning, "old finding").unwrap();
    insert_quality_issue(&conn, b, "stale", Severity::Warning, "old finding").unwrap();

    let report = run_quality_checks(
        &conn,
        &QualityScope::Books(vec![a]),
        &QualityOptions {
            clear_existing: true,
        },
        None,
        None,
    )
    .unwrap();

    assert_eq!(report.cleared, 1);
    assert_eq!(report.total_checked, 1);
    assert!(!issue_types(&conn, a).contains(&"stale".to_string()));
    assert_eq!(issue_types(&conn, b), vec!["stale"]);
}

#[test]
fn missing_books_in_scope_are_skipped() {
    let conn = open_memory().unwrap();
    complete_book(&conn, "S-1");

    let report = run_quality_checks(
        &conn,
        &QualityScope::Books(vec![1, 999]),
        &QualityOptions::default(),
        None,
        None,
    )
    .unwrap();
    assert_eq!(report.total_checked, 1);
    assert_eq!(report.skipped_records, 1);
}

#[test]
fn import_run_scope_checks_only_that_run() {
    let conn = open_memory().unwrap();
    insert_book(&conn, &BookFields::new("Anterior")).unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("books.csv");
    std::fs::write(&path, "Internal ID,Title\nI-1,Uno\nI-2,Dos\n").unwrap();
    let run = run_import(&conn, &path, &ImportOptions::default(), None).unwrap();

    let report = run_quality_checks(
        &conn,
        &QualityScope::ImportRun(run.id),
        &QualityOptions::default(),
        None,
        None,
    )
    .unwrap();
    assert_eq!(report.total_checked, 2);

    let err = run_quality_checks(
        &conn,
        &QualityScope::ImportRun(run.id + 100),
        &QualityOptions::default(),
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QualityError::RunNotFound(_)));
}

struct BrokenRule;

impl QualityRule for BrokenRule {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn check(
        &self,
        _ctx: &RuleContext<'_>,
        book: &BookDetail,
    ) -> Result<Vec<IssueDraft>, QualityError> {
        if book.book.title == "Dos" {
            return Err(std::io::Error::other("disk unavailable").into());
        }
        Ok(vec![IssueDraft::new("checked", Severity::Info, "seen")])
    }
}

#[test]
fn failing_rule_becomes_a_warning_and_the_sweep_continues() {
    let conn = open_memory().unwrap();
    let a = insert_book(&conn, &BookFields::new("Uno")).unwrap();
    let b = insert_book(&conn, &BookFields::new("Dos")).unwrap();
    let c = insert_book(&conn, &BookFields::new("Tres")).unwrap();
    let rules: Vec<Box<dyn QualityRule>> = vec![Box::new(BrokenRule)];

    let report = run_rules(
        &conn,
        &QualityScope::All,
        &QualityOptions::default(),
        None,
        &rules,
        None,
    )
    .unwrap();

    assert_eq!(report.total_checked, 3);
    assert_eq!(report.rule_failures, 1);
    assert_eq!(issue_types(&conn, a), vec!["checked"]);
    assert_eq!(issue_types(&conn, b), vec!["rule_failure"]);
    assert_eq!(issue_types(&conn, c), vec!["checked"]);
    let failure = &list_issues(
        &conn,
        &IssueFilter {
            book_id: Some(b),
            ..Default::default()
        },
    )
    .unwrap()[0];
    assert_eq!(failure.severity, Severity::Warning);
    assert!(failure.message.contains("broken"));
}

#[test]
fn resolving_issues_records_who_and_why() {
    let conn = open_memory().unwrap();
    insert_book(&conn, &BookFields::new("Uno")).unwrap();
    insert_book(&conn, &BookFields::new("Dos")).unwrap();
    check_all(&conn);

    let resolved = resolve_issues(&conn, "missing_thumbnail", "catalogadora", Some("sin portadas"))
        .unwrap();
    assert_eq!(resolved, 2);
    assert_eq!(resolve_issues(&conn, "missing_thumbnail", "catalogadora", None).unwrap(), 0);

    let issues = list_issues(
        &conn,
        &IssueFilter {
            issue_type: Some("missing_thumbnail".to_string()),
            include_resolved: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(issues.len(), 2);
    for issue in issues {
        assert!(issue.resolved);
        assert_eq!(issue.resolved_by.as_deref(), Some("catalogadora"));
        assert_eq!(issue.resolution_notes.as_deref(), Some("sin portadas"));
        assert!(issue.resolved_at.is_some());
    }

    // A resolved issue is recorded again if it still applies.
    let report = check_all(&conn);
    assert_eq!(report.new_issues, 2);
}

#[test]
fn unreadable_book_is_flagged_and_the_sweep_continues() {
    let conn = open_memory().unwrap();
    let bad = complete_book(&conn, "Q-1");
    let good = insert_book(&conn, &BookFields::new("Pedro Páramo")).unwrap();
    conn.execute("UPDATE books SET extra_fields = 'not json' WHERE id = ?1", [bad])
        .unwrap();

    let report = check_all(&conn);

    assert!(conn.is_autocommit());
    assert_eq!(report.total_checked, 2);
    assert_eq!(report.rule_failures, 1);
    assert_eq!(issue_types(&conn, bad), vec!["rule_failure"]);
    assert_eq!(issue_types(&conn, good).len(), 6);
    assert_eq!(report.by_type.get("rule_failure"), Some(&1));
}

#[test]
fn unrecordable_issue_does_not_stop_the_sweep() {
    let conn = open_memory().unwrap();
    let blocked = insert_book(&conn, &BookFields::new("Uno")).unwrap();
    let open = insert_book(&conn, &BookFields::new("Dos")).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER reject_issue BEFORE INSERT ON quality_issues WHEN NEW.book_id = {blocked}
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;"
    ))
    .unwrap();

    let report = check_all(&conn);

    assert!(conn.is_autocommit());
    assert_eq!(report.total_checked, 2);
    assert_eq!(report.rule_failures, 1);
    assert!(issue_types(&conn, blocked).is_empty());
    assert_eq!(issue_types(&conn, open).len(), 6);
}
