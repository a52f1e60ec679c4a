use shelfmark_catalog::types::*;
use shelfmark_db::*;

fn new_book(internal_id: &str, title: &str) -> BookFields {
    BookFields {
        internal_id: Some(internal_id.to_string()),
        ..BookFields::new(title)
    }
}

fn lookup(conn: &Connection, kind: LookupKind, name: &str) -> i64 {
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

#[test]
fn insert_and_get_book() {
    let conn = open_memory().unwrap();
    let mut fields = new_book("TEST-000001", "Cien años de soledad");
    fields.publication_year = Some(1967);
    fields.extra_fields.insert("Shelf".to_string(), "B3".to_string());
    let id = insert_book(&conn, &fields).unwrap();

    let book = get_book(&conn, id).unwrap().unwrap();
    assert_eq!(book.title, "Cien años de soledad");
    assert_eq!(book.publication_year, Some(1967));
    assert!(book.is_active);
    assert_eq!(book.access_level, AccessLevel::Full);
    assert_eq!(book.extra_fields.get("Shelf").map(String::as_str), Some("B3"));
    assert_eq!(BookFields::from(&book), fields);
}

#[test]
fn get_missing_book_is_none() {
    let conn = open_memory().unwrap();
    assert!(get_book(&conn, 42).unwrap().is_none());
    assert!(get_book_detail(&conn, 42).unwrap().is_none());
}

#[test]
fn update_book_overwrites_fields() {
    let conn = open_memory().unwrap();
    let id = insert_book(&conn, &new_book("TEST-000001", "Draft")).unwrap();
    let mut fields = new_book("TEST-000001", "Final");
    fields.is_featured = true;
    update_book(&conn, id, &fields).unwrap();

    let book = get_book(&conn, id).unwrap().unwrap();
    assert_eq!(book.title, "Final");
    assert!(book.is_featured);
}

#[test]
fn update_missing_book_is_not_found() {
    let conn = open_memory().unwrap();
    let err = update_book(&conn, 7, &BookFields::new("Nothing")).unwrap_err();
    assert!(matches!(err, OperationError::NotFound { .. }));
}

#[test]
fn key_lookup_prefers_internal_id_and_ignores_inactive() {
    let conn = open_memory().unwrap();
    let mut inactive = new_book("TEST-000001", "Retired");
    inactive.is_active = false;
    insert_book(&conn, &inactive).unwrap();

    let mut by_palm = BookFields::new("By palm code");
    by_palm.palm_code = Some("PALM-9".to_string());
    let palm_id = insert_book(&conn, &by_palm).unwrap();

    assert!(
        find_active_book_by_key(&conn, Some("TEST-000001"), None)
            .unwrap()
            .is_none()
    );
    let found = find_active_book_by_key(&conn, Some("UNKNOWN"), Some("PALM-9"))
        .unwrap()
        .unwrap();
    assert_eq!(found.id, palm_id);

    let active_id = insert_book(&conn, &new_book("TEST-000001", "Current")).unwrap();
    let found = find_active_book_by_key(&conn, Some("TEST-000001"), Some("PALM-9"))
        .unwrap()
        .unwrap();
    assert_eq!(found.id, active_id);
}

#[test]
fn lookups_are_case_sensitive_and_scoped() {
    let conn = open_memory().unwrap();
    let publisher = lookup(&conn, LookupKind::Publisher, "Norma");
    assert_eq!(
        find_lookup(&conn, LookupKind::Publisher, None, "Norma").unwrap(),
        Some(publisher)
    );
    assert_eq!(
        find_lookup(&conn, LookupKind::Publisher, None, "norma").unwrap(),
        None
    );

    let genre = lookup(&conn, LookupKind::ClassificationType, "Genre");
    let subject = lookup(&conn, LookupKind::ClassificationType, "Subject");
    let novel = insert_lookup(
        &conn,
        &NewLookup {
            kind: LookupKind::ClassificationValue,
            name: "Novel",
            parent_id: Some(genre),
            iso_code: None,
        },
    )
    .unwrap();
    assert_eq!(
        find_lookup(&conn, LookupKind::ClassificationValue, Some(genre), "Novel").unwrap(),
        Some(novel)
    );
    assert_eq!(
        find_lookup(&conn, LookupKind::ClassificationValue, Some(subject), "Novel").unwrap(),
        None
    );
    assert!(matches!(
        find_lookup(&conn, LookupKind::ClassificationValue, None, "Novel"),
        Err(OperationError::MissingParent)
    ));
}

#[test]
fn book_detail_collects_relations_in_order() {
    let conn = open_memory().unwrap();
    let id = insert_book(&conn, &new_book("TEST-000001", "Relations")).unwrap();
    let ana = lookup(&conn, LookupKind::Creator, "Ana");
    let luis = lookup(&conn, LookupKind::Creator, "Luis");
    let spanish = insert_lookup(
        &conn,
        &NewLookup {
            kind: LookupKind::Language,
            name: "Spanish",
            parent_id: None,
            iso_code: Some("es"),
        },
    )
    .unwrap();
    let english = lookup(&conn, LookupKind::Language, "English");
    let quito = lookup(&conn, LookupKind::Location, "Quito");

    set_book_creators(&conn, id, CreatorRole::Author, &[luis, ana]).unwrap();
    set_book_creators(&conn, id, CreatorRole::Illustrator, &[ana]).unwrap();
    set_book_languages(&conn, id, &[english, spanish]).unwrap();
    set_book_locations(&conn, id, &[quito]).unwrap();
    set_book_files(
        &conn,
        id,
        FileKind::Audio,
        &["b.mp3".to_string(), "a.mp3".to_string()],
    )
    .unwrap();

    let detail = get_book_detail(&conn, id).unwrap().unwrap();
    let authors: Vec<_> = detail
        .creators_with_role(CreatorRole::Author)
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(authors, vec!["Luis", "Ana"]);
    assert_eq!(detail.creators.len(), 3);
    assert_eq!(detail.languages[0].name, "English");
    assert!(detail.languages[0].is_primary);
    assert_eq!(detail.languages[1].iso_code.as_deref(), Some("es"));
    assert_eq!(detail.locations[0].name, "Quito");
    let audio: Vec<_> = detail
        .files_of_kind(FileKind::Audio)
        .map(|f| f.filename.as_str())
        .collect();
    assert_eq!(audio, vec!["b.mp3", "a.mp3"]);
}

#[test]
fn setting_one_classification_type_keeps_others() {
    let conn = open_memory().unwrap();
    let id = insert_book(&conn, &new_book("TEST-000001", "Tagged")).unwrap();
    let genre = upsert_classification_type(
        &conn,
        &ClassificationTypeSeed {
            name: "Genre".to_string(),
            description: None,
            values: vec!["Novel".to_string(), "Poetry".to_string()],
        },
    )
    .unwrap();
    let subject = upsert_classification_type(
        &conn,
        &ClassificationTypeSeed {
            name: "Subject".to_string(),
            description: None,
            values: vec!["History".to_string()],
        },
    )
    .unwrap();
    let novel = find_lookup(&conn, LookupKind::ClassificationValue, Some(genre), "Novel")
        .unwrap()
        .unwrap();
    let poetry = find_lookup(&conn, LookupKind::ClassificationValue, Some(genre), "Poetry")
        .unwrap()
        .unwrap();
    let history = find_lookup(&conn, LookupKind::ClassificationValue, Some(subject), "History")
        .unwrap()
        .unwrap();

    set_book_classifications(&conn, id, genre, &[novel]).unwrap();
    set_book_classifications(&conn, id, subject, &[history]).unwrap();
    set_book_classifications(&conn, id, genre, &[poetry]).unwrap();

    let detail = get_book_detail(&conn, id).unwrap().unwrap();
    let values: Vec<_> = detail
        .classifications
        .iter()
        .map(|c| (c.type_name.as_str(), c.value.as_str()))
        .collect();
    assert_eq!(values, vec![("Genre", "Poetry"), ("Subject", "History")]);
}

#[test]
fn relationship_insert_and_exists() {
    let conn = open_memory().unwrap();
    let a = insert_book(&conn, &new_book("A", "One")).unwrap();
    let b = insert_book(&conn, &new_book("B", "Two")).unwrap();

    assert!(!relationship_exists(&conn, a, b, RelationshipType::Translated).unwrap());
    insert_relationship(&conn, a, b, RelationshipType::Translated, Some("note")).unwrap();
    assert!(relationship_exists(&conn, a, b, RelationshipType::Translated).unwrap());
    assert!(!relationship_exists(&conn, b, a, RelationshipType::Translated).unwrap());
    assert!(!relationship_exists(&conn, a, b, RelationshipType::Series).unwrap());

    insert_relationship(&conn, a, b, RelationshipType::Series, None).unwrap();
    assert_eq!(
        delete_relationships_of_type(&conn, RelationshipType::Translated).unwrap(),
        1
    );
    assert!(relationship_exists(&conn, a, b, RelationshipType::Series).unwrap());
}

#[test]
fn finalized_run_cannot_be_finalized_again() {
    let conn = open_memory().unwrap();
    let id = insert_import_run(&conn, "books.csv", ImportMode::Upsert).unwrap();
    let mut run = get_import_run(&conn, id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);

    run.total_rows = 2;
    run.created = 2;
    run.processed = 2;
    run.success_rate = 100.0;
    run.status = RunStatus::Completed;
    run.finished_at = Some("2026-01-01T00:00:00Z".to_string());
    run.error_log.push(RowIssue::warning(2, Some("Pages"), "odd"));
    finalize_import_run(&conn, &run).unwrap();

    let stored = get_import_run(&conn, id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.created, 2);
    assert_eq!(stored.error_log.entries.len(), 1);

    run.status = RunStatus::Failed;
    assert!(matches!(
        finalize_import_run(&conn, &run),
        Err(OperationError::RunFinalized(_))
    ));
}

#[test]
fn run_links_keep_first_action() {
    let conn = open_memory().unwrap();
    let run = insert_import_run(&conn, "books.csv", ImportMode::Upsert).unwrap();
    let book = insert_book(&conn, &new_book("A", "One")).unwrap();
    link_run_book(&conn, run, book, RunAction::Created).unwrap();
    link_run_book(&conn, run, book, RunAction::Updated).unwrap();

    let action: String = conn
        .query_row(
            "SELECT action FROM import_run_books WHERE run_id = ?1",
            [run],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(action, "created");
    assert_eq!(run_book_ids(&conn, run).unwrap(), vec![book]);
}

#[test]
fn issues_resolve_by_type() {
    let conn = open_memory().unwrap();
    let book = insert_book(&conn, &new_book("A", "One")).unwrap();
    insert_quality_issue(&conn, book, "missing_authors", Severity::Warning, "No authors").unwrap();
    insert_quality_issue(&conn, book, "missing_publisher", Severity::Info, "No publisher").unwrap();

    assert!(unresolved_issue_exists(&conn, book, "missing_authors", "No authors").unwrap());
    let resolved = resolve_issues_by_type(&conn, "missing_authors", "maria", Some("ok")).unwrap();
    assert_eq!(resolved, 1);
    assert!(!unresolved_issue_exists(&conn, book, "missing_authors", "No authors").unwrap());

    // Resolved issues are kept; only unresolved ones are cleared.
    assert_eq!(delete_unresolved_issues(&conn, &[book]).unwrap(), 1);
    let all = list_issues(
        &conn,
        &IssueFilter {
            include_resolved: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].resolved);
    assert_eq!(all[0].resolved_by.as_deref(), Some("maria"));
}

#[test]
fn seeding_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let languages = dir.path().join("languages");
    let types = dir.path().join("classification_types");
    std::fs::create_dir_all(&languages).unwrap();
    std::fs::create_dir_all(&types).unwrap();
    std::fs::write(
        languages.join("main.yaml"),
        "- name: Spanish\n  iso_code: es\n- name: Quechua\n  iso_code: qu\n",
    )
    .unwrap();
    std::fs::write(
        types.join("genre.yaml"),
        "name: Genre\nvalues:\n  - Novel\n  - Poetry\n",
    )
    .unwrap();

    let conn = open_memory().unwrap();
    let stats = seed_from_catalog(&conn, dir.path()).unwrap();
    assert_eq!(stats.languages, 2);
    assert_eq!(stats.classification_types, 1);
    assert_eq!(stats.classification_values, 2);
    seed_from_catalog(&conn, dir.path()).unwrap();

    let stats = catalog_stats(&conn).unwrap();
    assert_eq!(stats.languages, 2);
    let values: i64 = conn
        .query_row("SELECT COUNT(*) FROM classification_values", [], |row| row.get(0))
        .unwrap();
    assert_eq!(values, 2);
}
