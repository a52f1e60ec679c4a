use chrono::NaiveDate;
use shelfmark_catalog::options::{Delimiter, ExportFilter, ExportOptions, ImportOptions};
use shelfmark_catalog::types::*;
use shelfmark_db::*;
use shelfmark_import::*;
use tempfile::TempDir;

const CATALOG: &str = "\
Internal ID,Palm Code,Title,Subtitle,Translated Title,Description,Publication Year,Pages,Access Level,Active,Featured,Sort Order,Publisher,Collection,Language,Language Code,Additional Languages,Authors,Illustrators,Genres,Keywords,Locations,PDF File,Thumbnail File,Audio Files
RT-1,P-1,Cien años de soledad,,One Hundred Years of Solitude,\"Macondo, \"\"la ciudad de los espejos\"\"\",1967,471,full,yes,yes,1,Sudamericana,Clásicos,Español,es,Quechua,Gabriel García Márquez,,Novela|Realismo mágico,familia|memoria,Colombia|Aracataca,rt1.pdf,rt1.jpg,rt1-a.mp3|rt1-b.mp3
RT-2,,Ficciones,Cuentos,Fictions,,1944,,limited,true,no,,Sur,Clásicos,Español,es,,Jorge Luis Borges,Xul Solar,Cuento,,Argentina,,,
RT-3,P-3,El Aleph,,,Relatos,1949,146,unavailable,1,0,3,Losada,,English,en,,Jorge Luis Borges|Norman Thomas di Giovanni,,,,,rt3.pdf,,
";

fn import_catalog(conn: &Connection, dir: &TempDir) {
    let path = dir.path().join("catalog.csv");
    std::fs::write(&path, CATALOG).unwrap();
    let options = ImportOptions {
        create_missing_relations: true,
        ..Default::default()
    };
    let run = run_import(conn, &path, &options, None).unwrap();
    assert_eq!(run.created, 3, "{:?}", run.error_log);
}

fn export_string(conn: &Connection, filter: &ExportFilter, options: &ExportOptions) -> String {
    let mut out = Vec::new();
    export_catalog(conn, &mut out, filter, options, None).unwrap();
    String::from_utf8(out).unwrap()
}

fn plain() -> ExportOptions {
    ExportOptions {
        include_bom: false,
        include_mapping_row: false,
        ..Default::default()
    }
}

fn exported_keys(text: &str) -> Vec<String> {
    text.lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn export_then_import_changes_nothing() {
    let conn = open_memory().unwrap();
    let dir = TempDir::new().unwrap();
    import_catalog(&conn, &dir);

    let path = dir.path().join("export.csv");
    let stats = export_to_path(
        &conn,
        &path,
        &ExportFilter::default(),
        &ExportOptions::default(),
        None,
    )
    .unwrap();
    assert_eq!(stats.records, 3);

    let preview = preview_import(&conn, &path, &ImportOptions::default()).unwrap();
    assert!(preview.validation.has_bom);
    assert!(preview.validation.has_mapping_row);
    assert_eq!(preview.stats.will_create, 0);
    assert_eq!(preview.stats.will_fail, 0);
    assert_eq!(preview.stats.will_update, 3);
    for plan in &preview.sample_updates {
        assert!(plan.changes.is_empty(), "row {}: {:?}", plan.row, plan.changes);
    }

    let run = run_import(&conn, &path, &ImportOptions::default(), None).unwrap();
    assert_eq!(run.created, 0);
    assert_eq!(run.failed, 0);
    assert_eq!(run.updated, 3);

    let again = dir.path().join("again.csv");
    export_to_path(&conn, &again, &ExportFilter::default(), &ExportOptions::default(), None)
        .unwrap();
    assert_eq!(
        std::fs::read(&path).unwrap(),
        std::fs::read(&again).unwrap()
    );
}

#[test]
fn rows_follow_the_column_layout() {
    let conn = open_memory().unwrap();
    let dir = TempDir::new().unwrap();
    import_catalog(&conn, &dir);

    let id = find_active_book_by_key(&conn, Some("RT-1"), None).unwrap().unwrap().id;
    let detail = get_book_detail(&conn, id).unwrap().unwrap();
    let row = export::book_row(&detail);
    let cell = |header: &str| {
        let index = export::header_row()
            .iter()
            .position(|h| *h == header)
            .unwrap();
        row[index].clone()
    };

    assert_eq!(cell("Language"), "Español");
    assert_eq!(cell("Language Code"), "es");
    assert_eq!(cell("Additional Languages"), "Quechua");
    assert_eq!(cell("Genres"), "Novela|Realismo mágico");
    assert_eq!(cell("Audio Files"), "rt1-a.mp3|rt1-b.mp3");
    assert_eq!(cell("Active"), "true");
    assert_eq!(cell("Access Level"), "full");
    assert_eq!(cell("Subjects"), "");
}

#[test]
fn bom_and_mapping_row_are_optional() {
    let conn = open_memory().unwrap();
    let dir = TempDir::new().unwrap();
    import_catalog(&conn, &dir);

    let full = export_string(&conn, &ExportFilter::default(), &ExportOptions::default());
    assert!(full.starts_with('\u{feff}'));
    let second_line = full.lines().nth(1).unwrap();
    assert!(second_line.starts_with("book.internal_id,book.palm_code"));

    let bare = export_string(&conn, &ExportFilter::default(), &plain());
    assert!(bare.starts_with("Internal ID,Palm Code,Title"));
    assert_eq!(exported_keys(&bare), vec!["RT-1", "RT-2", "RT-3"]);
}

#[test]
fn tab_delimiter() {
    let conn = open_memory().unwrap();
    let dir = TempDir::new().unwrap();
    import_catalog(&conn, &dir);

    let options = ExportOptions {
        delimiter: Delimiter::Tab,
        ..plain()
    };
    let text = export_string(&conn, &ExportFilter::default(), &options);
    assert!(text.starts_with("Internal ID\tPalm Code\tTitle"));
}

#[test]
fn filters_select_matching_books() {
    let conn = open_memory().unwrap();
    let dir = TempDir::new().unwrap();
    import_catalog(&conn, &dir);

    let keys = |filter: ExportFilter| exported_keys(&export_string(&conn, &filter, &plain()));

    assert_eq!(
        keys(ExportFilter {
            collection: Some("Clásicos".to_string()),
            ..Default::default()
        }),
        vec!["RT-1", "RT-2"]
    );
    assert_eq!(
        keys(ExportFilter {
            language: Some("en".to_string()),
            ..Default::default()
        }),
        vec!["RT-3"]
    );
    assert_eq!(
        keys(ExportFilter {
            access_level: Some(AccessLevel::Limited),
            ..Default::default()
        }),
        vec!["RT-2"]
    );
    assert_eq!(
        keys(ExportFilter {
            year_from: Some(1945),
            year_to: Some(1970),
            ..Default::default()
        }),
        vec!["RT-1", "RT-3"]
    );
    assert_eq!(
        keys(ExportFilter {
            featured: Some(true),
            ..Default::default()
        }),
        vec!["RT-1"]
    );
    assert!(
        keys(ExportFilter {
            created_to: NaiveDate::from_ymd_opt(2000, 1, 1),
            ..Default::default()
        })
        .is_empty()
    );
}

#[test]
fn pages_are_bounded_by_chunk_size() {
    let conn = open_memory().unwrap();
    for i in 1..=5 {
        insert_book(
            &conn,
            &BookFields {
                internal_id: Some(format!("C-{i}")),
                ..BookFields::new(format!("Libro {i}"))
            },
        )
        .unwrap();
    }

    let mut out = Vec::new();
    let options = ExportOptions {
        chunk_size: 2,
        ..plain()
    };
    let stats = export_catalog(&conn, &mut out, &ExportFilter::default(), &options, None).unwrap();
    assert_eq!(stats.records, 5);
    assert_eq!(stats.chunks, 3);
}

#[test]
fn invalid_options_are_rejected() {
    let conn = open_memory().unwrap();
    let mut out = Vec::new();

    let zero = ExportOptions {
        chunk_size: 0,
        ..Default::default()
    };
    let err = export_catalog(&conn, &mut out, &ExportFilter::default(), &zero, None).unwrap_err();
    assert!(matches!(err, ExportError::Options(_)));

    let inverted = ExportFilter {
        year_from: Some(2000),
        year_to: Some(1900),
        ..Default::default()
    };
    let err =
        export_catalog(&conn, &mut out, &inverted, &ExportOptions::default(), None).unwrap_err();
    assert!(matches!(err, ExportError::Options(_)));
}
