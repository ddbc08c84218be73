use std::sync::Arc;

use ffid_ingest::activity;
use ffid_ingest::db::SqliteStorage;
use ffid_ingest::error::IngestError;
use ffid_ingest::ingest::IngestService;
use ffid_ingest::merge;
use ffid_ingest::sheet::CellValue;
use ffid_ingest::storage::{InMemoryStorage, Storage};
use ffid_ingest::types::{SessionPhase, TransactionUsageEntry, UploadStats};

const SESSION: &str = "FF-2026-0042";

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

/// A CDHDR export row: client, object, object value, doc number, username,
/// entry date, entry time, tcode.
fn header_row(doc_number: &str, tcode: &str) -> Vec<CellValue> {
    vec![
        text("100"),
        text("USER"),
        text("JSMITH"),
        text(doc_number),
        text("FF_JSMITH"),
        text("01.02.2026"),
        text("09:15:00"),
        text(tcode),
    ]
}

/// A CDPOS export row with the doc number at column 3 and detail fields after.
fn detail_row(doc_number: &str, table_name: &str, field_name: &str) -> Vec<CellValue> {
    vec![
        CellValue::Empty,
        CellValue::Empty,
        CellValue::Empty,
        text(doc_number),
        text(table_name),
        text("100JSMITH"),
        text(field_name),
        text("U"),
        text(""),
        text(""),
        text(""),
        text("64"),
        text("0"),
    ]
}

async fn storage_with_session() -> InMemoryStorage {
    let storage = InMemoryStorage::new();
    storage.create_session(SESSION).await.unwrap();
    storage
}

#[tokio::test]
async fn header_ingestion_creates_one_record_per_valid_row() -> anyhow::Result<()> {
    let storage = storage_with_session().await;

    let rows = vec![
        header_row("0000000001", "SU01"),
        header_row("", "SU01"), // empty doc number: skipped, not fatal
        header_row("0000000002", "PFCG"),
        header_row("0000000003", "SU01"),
    ];
    let created = merge::ingest_headers(&storage, SESSION, &rows).await?;
    assert_eq!(created, 3);

    let records = storage.change_docs_for_session(SESSION).await?;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.is_header_only()));
    assert_eq!(SessionPhase::classify(&records), SessionPhase::HeadersLoaded);
    Ok(())
}

#[tokio::test]
async fn merge_replaces_the_header_set_with_merged_records() -> anyhow::Result<()> {
    let storage = storage_with_session().await;

    let headers = vec![
        header_row("1", "SU01"),
        header_row("2", "PFCG"),
        header_row("3", "SM30"),
    ];
    merge::ingest_headers(&storage, SESSION, &headers).await?;

    // Two matching detail rows (doc 1 twice), one unmatched, one keyless
    let details = vec![
        detail_row("1", "USR02", "UFLAG"),
        detail_row("1", "USR02", "BNAME"),
        detail_row("9", "AGR_USERS", "AGR_NAME"),
        detail_row("", "USR02", "UFLAG"),
    ];
    let matched = merge::ingest_details(&storage, SESSION, &details).await?;
    assert_eq!(matched, 2);

    // Every loaded header-only record is retired, matched or not
    let records = storage.change_docs_for_session(SESSION).await?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.is_header_only()));
    assert!(records.iter().all(|r| r.doc_number == "1" && r.tcode == "SU01"));
    assert_eq!(SessionPhase::classify(&records), SessionPhase::Merged);
    Ok(())
}

#[tokio::test]
async fn merge_without_headers_fails_with_precondition() {
    let storage = storage_with_session().await;

    let err = merge::ingest_details(&storage, SESSION, &[detail_row("1", "USR02", "UFLAG")])
        .await
        .unwrap_err();
    match err {
        IngestError::PreconditionNotMet { hint, .. } => {
            assert!(hint.to_lowercase().contains("cdhdr"));
        }
        other => panic!("expected PreconditionNotMet, got: {other}"),
    }
}

#[tokio::test]
async fn merge_rerun_finds_no_header_only_matches() -> anyhow::Result<()> {
    // Documented idempotence gap: a second detail pass over the same file
    // yields zero matches because the header-only set is gone, and it must
    // not duplicate the merged records either.
    let storage = storage_with_session().await;

    merge::ingest_headers(&storage, SESSION, &[header_row("1", "SU01")]).await?;
    let details = vec![detail_row("1", "USR02", "UFLAG")];

    let first = merge::ingest_details(&storage, SESSION, &details).await?;
    assert_eq!(first, 1);

    let second = merge::ingest_details(&storage, SESSION, &details).await?;
    assert_eq!(second, 0);

    let records = storage.change_docs_for_session(SESSION).await?;
    assert_eq!(records.len(), 1);
    Ok(())
}

#[tokio::test]
async fn batching_flushes_do_not_lose_or_duplicate_records() -> anyhow::Result<()> {
    let storage = storage_with_session().await;

    // 2500 headers: two full batches plus a remainder flush
    let rows: Vec<_> = (1..=2500)
        .map(|n| header_row(&format!("{n:010}"), "FB01"))
        .collect();
    let created = merge::ingest_headers(&storage, SESSION, &rows).await?;
    assert_eq!(created, 2500);

    let records = storage.change_docs_for_session(SESSION).await?;
    assert_eq!(records.len(), 2500);

    // Merge 1200 matching detail rows: one full batch plus the final
    // commit_merge carrying the remainder and the retirement delete
    let details: Vec<_> = (1..=1200)
        .map(|n| detail_row(&format!("{n:010}"), "USR02", "UFLAG"))
        .collect();
    let matched = merge::ingest_details(&storage, SESSION, &details).await?;
    assert_eq!(matched, 1200);

    let records = storage.change_docs_for_session(SESSION).await?;
    assert_eq!(records.len(), 1200);
    assert!(records.iter().all(|r| !r.is_header_only()));
    Ok(())
}

#[tokio::test]
async fn stats_report_total_and_split_counts() -> anyhow::Result<()> {
    let storage = storage_with_session().await;

    merge::ingest_headers(
        &storage,
        SESSION,
        &[
            header_row("1", "SU01"),
            header_row("2", "SU01"),
            header_row("3", "SU01"),
        ],
    )
    .await?;
    merge::ingest_details(
        &storage,
        SESSION,
        &[
            detail_row("1", "USR02", "UFLAG"),
            detail_row("1", "USR02", "BNAME"),
            detail_row("2", "AGR_USERS", "AGR_NAME"),
        ],
    )
    .await?;
    // Re-create two header-only records alongside the merged ones
    merge::ingest_headers(
        &storage,
        SESSION,
        &[header_row("4", "SM30"), header_row("5", "SM30")],
    )
    .await?;

    let stats = merge::upload_stats(&storage, SESSION).await?;
    assert_eq!(
        stats,
        UploadStats {
            total_records: 5,
            with_detail: 3,
            only_header: 2,
        }
    );
    Ok(())
}

#[tokio::test]
async fn executed_set_round_trips_through_storage() -> anyhow::Result<()> {
    let storage = storage_with_session().await;

    // 17-column SM20 rows: source tcode at 10, message text at 12
    let sm20_row = |tcode: &str, message: &str| -> Vec<CellValue> {
        let mut row = vec![CellValue::Empty; 17];
        row[10] = text(tcode);
        row[12] = text(message);
        row
    };
    activity::ingest_activity_log(
        &storage,
        SESSION,
        &[
            sm20_row("S000", "Transaction FB01 started"),
            sm20_row("SESSION_MANAGER", "Main menu"),
            sm20_row("SE16N", "Report started"),
        ],
    )
    .await?;
    activity::ingest_usage_log(
        &storage,
        SESSION,
        &[vec![text("09:20:11"), text("fb01"), text("SAPMF05A")]],
    )
    .await?;

    let codes = activity::canonical_executed_set(&storage, SESSION).await?;
    assert_eq!(codes, vec!["FB01", "SE16N"]);
    Ok(())
}

#[tokio::test]
async fn service_rejects_unknown_sessions() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let service = IngestService::new(storage);

    let err = service.upload_stats("NO-SUCH-SESSION").await.unwrap_err();
    assert!(matches!(err, IngestError::NotFound(_)));

    let err = service.create_session("  ").await.unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
}

#[tokio::test]
async fn sqlite_storage_preserves_order_and_merge_atomicity() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = SqliteStorage::open(dir.path().join("ingest.db"))?;
    storage.create_session(SESSION).await?;

    // Duplicate doc numbers: first-seen must win after a storage round trip
    let mut first = header_row("42", "SU01");
    first[4] = text("FIRST");
    let mut second = header_row("42", "SU01");
    second[4] = text("SECOND");
    merge::ingest_headers(&storage, SESSION, &[first, second]).await?;

    let matched =
        merge::ingest_details(&storage, SESSION, &[detail_row("42", "USR02", "UFLAG")]).await?;
    assert_eq!(matched, 1);

    let records = storage.change_docs_for_session(SESSION).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].username, "FIRST");
    assert_eq!(records[0].table_name, "USR02");

    // Cleanup removes the session and its rows
    storage.delete_session(SESSION).await?;
    assert!(!storage.session_exists(SESSION).await?);
    let records = storage.change_docs_for_session(SESSION).await?;
    assert!(records.is_empty());
    Ok(())
}

#[tokio::test]
async fn sqlite_storage_keeps_log_uploads_order_independent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = SqliteStorage::open(dir.path().join("ingest.db"))?;
    storage.create_session(SESSION).await?;

    // Usage before activity: the canonical set ordering still puts
    // activity-sourced codes first
    let mut usage = vec![TransactionUsageEntry {
        id: None,
        session_id: SESSION.to_string(),
        time: "10:00:00".to_string(),
        tcode: "VA01".to_string(),
        program: "SAPMV45A".to_string(),
    }];
    storage.insert_usage_entries(&mut usage).await?;
    assert!(usage[0].id.is_some());

    let mut row = vec![CellValue::Empty; 17];
    row[10] = text("SE38");
    activity::ingest_activity_log(&storage, SESSION, &[row]).await?;

    let codes = activity::canonical_executed_set(&storage, SESSION).await?;
    assert_eq!(codes, vec!["SE38", "VA01"]);
    Ok(())
}
