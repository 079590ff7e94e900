use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tmdb_harvest::{
    artifact::{
        apply_column, read_sheet, write_records, write_sheet, Cell, ReportRow, Sheet, SheetRow,
        COL_ID,
    },
    config::{Config, Verify},
    fetch::FetchError,
    record::{MediaKind, Record, RowId},
    verify::{dump_path, run_verify},
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn series(id: i64, name: &str, votes: u64) -> Record {
    Record::from_json(
        MediaKind::Series,
        &json!({"id": id, "name": name, "vote_count": votes, "vote_average": 8.1}),
    )
}

async fn mount(server: &MockServer, p: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

fn cfg_for(server: &MockServer) -> Config {
    let mut cfg = Config::default();
    cfg.verify = Verify {
        base_url: server.uri(),
        timeout_seconds: 2,
        success_delay_ms: 0,
        failure_delay_ms: 0,
        ..Verify::default()
    };
    cfg
}

#[tokio::test]
async fn outcomes_are_written_back_by_row() {
    let server = MockServer::start().await;
    mount(&server, "/embed/tv/1/1/1", 200).await;
    mount(&server, "/embed/tv/2/1/1", 404).await;
    mount(&server, "/embed/tv/3/1/1", 200).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("tv_by_rating.xlsx");
    let rows = ReportRow::ranked(vec![
        series(1, "Akira", 500),
        series(2, "Baki", 900),
        series(3, "Cowboy Bebop", 100),
    ]);
    write_records(&file, "Top 3", &rows).unwrap();

    let cfg = cfg_for(&server);
    let summary = run_verify(&cfg, &file, None, None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.success, 2);
    assert_eq!(summary.failed, 1);
    assert!((summary.success_rate - 66.666).abs() < 0.01);

    let sheet = read_sheet(&file).unwrap();
    let col = sheet.header.iter().position(|h| h == "MediaUrl").unwrap();
    assert_eq!(col, 9);
    assert_eq!(sheet.rows.len(), 3);
    for row in &sheet.rows {
        let value = row.cell(col).as_text().expect("outcome cell");
        match row.cell(COL_ID).as_i64_lenient() {
            2 => assert_eq!(value, "Not Found"),
            id => assert!(value.contains(&format!("/embed/tv/{id}/")), "{value}"),
        }
    }
    assert_eq!(sheet.rows[0].cell(2), &Cell::Text("Akira".into()));

    let dump = std::fs::read_to_string(dump_path(&file)).unwrap();
    assert!(dump.starts_with("Total: 3\nSuccess: 2\nFailed: 1\n"));
    assert!(dump.contains("Success Rate: 66.67%"));
    assert!(dump.contains("3: Not Found"));
    let order: Vec<usize> = ["\n2: ", "\n3: ", "\n4: "]
        .iter()
        .map(|l| dump.find(l).unwrap())
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]), "{dump}");
}

#[tokio::test]
async fn rerun_reuses_result_column_and_respects_cap() {
    let server = MockServer::start().await;
    mount(&server, "/embed/movie/10/", 404).await;
    mount(&server, "/embed/movie/20/", 200).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("A.xlsx");
    let rows = ReportRow::ranked(vec![
        Record::from_json(MediaKind::Movie, &json!({"id": 10, "title": "Akira", "vote_count": 10})),
        Record::from_json(MediaKind::Movie, &json!({"id": 20, "title": "Arrietty", "vote_count": 20})),
    ]);
    write_records(&file, "Data", &rows).unwrap();

    let cfg = cfg_for(&server);
    run_verify(&cfg, &file, None, None, CancellationToken::new())
        .await
        .unwrap();
    let summary = run_verify(&cfg, &file, Some(1), None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.success, 1);

    let sheet = read_sheet(&file).unwrap();
    assert_eq!(sheet.header.iter().filter(|h| *h == "MediaUrl").count(), 1);
    assert_eq!(sheet.rows[0].cell(9), &Cell::Text("Not Found".into()));
    assert!(sheet.rows[1].cell(9).as_text().unwrap().contains("/embed/movie/20/"));
}

#[tokio::test]
async fn non_numeric_cells_read_as_zero() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("other.xlsx");
    let rows = ReportRow::ranked(vec![Record::from_json(
        MediaKind::Movie,
        &json!({"title": "(500) Days"}),
    )]);
    write_records(&file, "Data", &rows).unwrap();

    let sheet = read_sheet(&file).unwrap();
    assert_eq!(sheet.rows[0].cell(5), &Cell::Text("N/A".into()));
    assert_eq!(sheet.rows[0].cell(5).as_i64_lenient(), 0);
    assert_eq!(sheet.rows[0].cell(8), &Cell::Text("No Poster".into()));
}

#[tokio::test]
async fn interrupt_mid_run_saves_processed_rows_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("B.xlsx");
    let movie = |id: i64, votes: u64| {
        Record::from_json(MediaKind::Movie, &json!({"id": id, "title": "Baki", "vote_count": votes}))
    };
    let rows = ReportRow::ranked(vec![movie(1, 10), movie(2, 30), movie(3, 20)]);
    write_records(&file, "Data", &rows).unwrap();

    let mut cfg = cfg_for(&server);
    cfg.verify.failure_delay_ms = 2000;
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let err = run_verify(&cfg, &file, None, None, token).await.unwrap_err();
    assert!(err.downcast_ref::<FetchError>().is_some_and(FetchError::is_cancelled));

    let sheet = read_sheet(&file).unwrap();
    let col = sheet.header.iter().position(|h| h == "MediaUrl").unwrap();
    let values: Vec<&Cell> = sheet.rows.iter().map(|r| r.cell(col)).collect();
    assert_eq!(
        values,
        vec![&Cell::Empty, &Cell::Text("Not Found".into()), &Cell::Empty]
    );

    let dump = std::fs::read_to_string(dump_path(&file)).unwrap();
    assert_eq!(
        dump,
        "Total: 1\nSuccess: 0\nFailed: 1\nSuccess Rate: 0.00%\n3: Not Found\n"
    );
}

#[test]
fn result_column_goes_after_unlabelled_cells() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.xlsx");
    let mut sheet = Sheet {
        name: "Data".into(),
        header: vec!["Rank".into(), "ID".into()],
        rows: vec![SheetRow {
            row_id: RowId(2),
            cells: vec![
                Cell::Number(1.0),
                Cell::Number(42.0),
                Cell::Empty,
                Cell::Text("note".into()),
            ],
        }],
    };

    let values = BTreeMap::from([(RowId(2), "Not Found".to_string())]);
    let col = apply_column(&mut sheet, "MediaUrl", &values);
    assert_eq!(col, 4);
    write_sheet(&file, &sheet).unwrap();

    let sheet = read_sheet(&file).unwrap();
    assert_eq!(sheet.header.iter().position(|h| h == "MediaUrl"), Some(4));
    assert_eq!(sheet.rows[0].cell(3), &Cell::Text("note".into()));
    assert_eq!(sheet.rows[0].cell(4), &Cell::Text("Not Found".into()));

    let mut sheet = sheet;
    assert_eq!(apply_column(&mut sheet, "MediaUrl", &values), 4);
    assert_eq!(sheet.header.len(), 5);
}
