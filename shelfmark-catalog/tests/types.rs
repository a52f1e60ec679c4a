use shelfmark_catalog::*;

#[test]
fn import_mode_parses_aliases() {
    assert_eq!("upsert".parse::<ImportMode>(), Ok(ImportMode::Upsert));
    assert_eq!("create-only".parse::<ImportMode>(), Ok(ImportMode::CreateOnly));
    assert_eq!("UPDATE_ONLY".parse::<ImportMode>(), Ok(ImportMode::UpdateOnly));
    assert_eq!(
        "create_duplicates".parse::<ImportMode>(),
        Ok(ImportMode::CreateDuplicates)
    );
    assert!("merge".parse::<ImportMode>().is_err());
}

#[test]
fn access_level_parse_is_closed() {
    assert_eq!(AccessLevel::parse("Limited"), Some(AccessLevel::Limited));
    assert_eq!(AccessLevel::parse("public"), None);
    for level in AccessLevel::ALL {
        assert_eq!(AccessLevel::parse(level.as_str()), Some(level));
    }
}

#[test]
fn error_log_caps_entries_and_counts_the_rest() {
    let mut log = ErrorLog::default();
    for row in 0..ErrorLog::MAX_ENTRIES + 7 {
        log.push(RowIssue::error(row, None, "bad"));
    }
    assert_eq!(log.entries.len(), ErrorLog::MAX_ENTRIES);
    assert_eq!(log.remaining, 7);
    assert_eq!(log.len(), ErrorLog::MAX_ENTRIES + 7);
}

#[test]
fn new_book_fields_default_to_active_full_access() {
    let fields = BookFields::new("Popol Vuh");
    assert!(fields.is_active);
    assert!(!fields.is_featured);
    assert_eq!(fields.access_level, AccessLevel::Full);
    assert_eq!(fields.sort_order, 0);
}

#[test]
fn import_options_reject_unknown_keys() {
    let err = serde_yml::from_str::<ImportOptions>("mode: upsert\nturbo: true\n");
    assert!(err.is_err());
    let ok: ImportOptions = serde_yml::from_str("mode: create_only\n").unwrap();
    assert_eq!(ok.mode, ImportMode::CreateOnly);
    assert!(ok.skip_invalid_rows);
}

#[test]
fn row_issue_display_names_row_and_field() {
    let issue = RowIssue::error(4, Some("Publication Year"), "not a number: 'abc'");
    assert_eq!(issue.to_string(), "row 4 [Publication Year]: not a number: 'abc'");
}
