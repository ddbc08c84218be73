//! Two-phase change-document merge: a header pass creates header-only
//! records, then a detail pass joins CDPOS rows against them by document
//! number and replaces the header set with fully merged records.

use crate::constants::BATCH_SIZE;
use crate::error::{IngestError, Result};
use crate::sheet::{text_at, CellValue};
use crate::storage::Storage;
use crate::types::{ChangeDocumentRecord, DetailFields, SessionPhase, UploadStats};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

// Fixed column positions of the CDHDR export (0-indexed, row 0 is the header)
const HDR_CLIENT: usize = 0;
const HDR_OBJECT: usize = 1;
const HDR_OBJECT_VALUE: usize = 2;
const HDR_DOC_NUMBER: usize = 3;
const HDR_USERNAME: usize = 4;
const HDR_ENTRY_DATE: usize = 5;
const HDR_ENTRY_TIME: usize = 6;
const HDR_TCODE: usize = 7;

// Fixed column positions of the CDPOS export
const POS_DOC_NUMBER: usize = 3;
const POS_TABLE_NAME: usize = 4;
const POS_TABLE_KEY: usize = 5;
const POS_FIELD_NAME: usize = 6;
const POS_CHANGE_INDICATOR: usize = 7;
const POS_TEXT_FLAG: usize = 8;
const POS_UNIT: usize = 9;
const POS_CURRENCY: usize = 10;
const POS_NEW_VALUE: usize = 11;
const POS_OLD_VALUE: usize = 12;

/// Header pass: creates one header-only record per row with a non-empty
/// document number, flushing in fixed-size batches. Rows missing the document
/// number are skipped and logged, never fatal. Returns the created count.
pub async fn ingest_headers(
    storage: &dyn Storage,
    session_id: &str,
    rows: &[Vec<CellValue>],
) -> Result<usize> {
    info!("Starting CDHDR header ingestion for session: {}", session_id);

    let mut batch: Vec<ChangeDocumentRecord> = Vec::with_capacity(BATCH_SIZE);
    let mut total_records = 0usize;

    for (row_num, row) in rows.iter().enumerate() {
        let doc_number = text_at(row, HDR_DOC_NUMBER);
        if doc_number.is_empty() {
            warn!("Skipping header row {} due to empty doc_number", row_num + 1);
            continue;
        }

        batch.push(ChangeDocumentRecord::header_only(
            session_id,
            text_at(row, HDR_CLIENT),
            text_at(row, HDR_OBJECT),
            text_at(row, HDR_OBJECT_VALUE),
            doc_number,
            text_at(row, HDR_USERNAME),
            text_at(row, HDR_ENTRY_DATE),
            text_at(row, HDR_ENTRY_TIME),
            text_at(row, HDR_TCODE),
        ));
        total_records += 1;

        if batch.len() >= BATCH_SIZE {
            storage.insert_change_docs(&mut batch).await?;
            debug!("Saved batch of {} header records", batch.len());
            batch.clear();
        }
    }

    if !batch.is_empty() {
        storage.insert_change_docs(&mut batch).await?;
        debug!("Saved final batch of {} header records", batch.len());
    }

    info!(
        "CDHDR ingestion completed for session {}. Records created: {}",
        session_id, total_records
    );
    Ok(total_records)
}

/// Detail pass: joins CDPOS rows against the session's header-only records by
/// document number, creating one merged record per matched row, then retires
/// the entire loaded header-only set. Returns the matched count.
///
/// The document-number lookup only ever points at the first header-only
/// record seen for a given number; later duplicates are never the join
/// source. Records already merged in a prior pass are not join candidates,
/// so re-running a detail file after a successful merge yields zero matches.
pub async fn ingest_details(
    storage: &dyn Storage,
    session_id: &str,
    rows: &[Vec<CellValue>],
) -> Result<usize> {
    info!("Starting CDPOS detail merge for session: {}", session_id);

    let existing = storage.change_docs_for_session(session_id).await?;
    info!(
        "Found {} existing change-document records for session {}",
        existing.len(),
        session_id
    );

    if SessionPhase::classify(&existing) == SessionPhase::Empty {
        return Err(IngestError::PreconditionNotMet {
            message: format!("No CDHDR data found for session {session_id}"),
            hint: "Please upload the CDHDR header file first".to_string(),
        });
    }

    let mut header_index: HashMap<&str, &ChangeDocumentRecord> = HashMap::new();
    let mut retired: Vec<Uuid> = Vec::new();
    for record in existing.iter().filter(|r| r.is_header_only()) {
        header_index
            .entry(record.doc_number.as_str())
            .or_insert(record);
        if let Some(id) = record.id {
            retired.push(id);
        }
    }
    info!(
        "Built lookup map with {} unique document numbers",
        header_index.len()
    );

    let mut batch: Vec<ChangeDocumentRecord> = Vec::with_capacity(BATCH_SIZE);
    let mut total_rows = 0usize;
    let mut matched_records = 0usize;

    for (row_num, row) in rows.iter().enumerate() {
        let doc_number = text_at(row, POS_DOC_NUMBER);
        if doc_number.is_empty() {
            warn!("Skipping detail row {} due to empty doc_number", row_num + 1);
            continue;
        }
        total_rows += 1;

        match header_index.get(doc_number.as_str()) {
            Some(header) => {
                batch.push(header.merged_with(DetailFields {
                    table_name: text_at(row, POS_TABLE_NAME),
                    table_key: text_at(row, POS_TABLE_KEY),
                    field_name: text_at(row, POS_FIELD_NAME),
                    change_indicator: text_at(row, POS_CHANGE_INDICATOR),
                    text_flag: text_at(row, POS_TEXT_FLAG),
                    unit: text_at(row, POS_UNIT),
                    currency: text_at(row, POS_CURRENCY),
                    new_value: text_at(row, POS_NEW_VALUE),
                    old_value: text_at(row, POS_OLD_VALUE),
                }));
                matched_records += 1;
            }
            None => {
                warn!("No matching header record for doc_number: {}", doc_number);
            }
        }

        if batch.len() >= BATCH_SIZE {
            storage.insert_change_docs(&mut batch).await?;
            debug!("Saved batch of {} merged records", batch.len());
            batch.clear();
        }
    }

    // Final flush and the retirement of the loaded header-only set commit
    // together; earlier full batches are already durable (no cross-batch
    // rollback).
    storage.commit_merge(&mut batch, &retired).await?;
    info!(
        "Retired {} header-only records for session {}",
        retired.len(),
        session_id
    );

    info!(
        "CDPOS merge completed for session {}. Rows processed: {}, matched and merged: {}",
        session_id, total_rows, matched_records
    );
    Ok(matched_records)
}

/// Summary counts over the session's change-document set. Pure read.
pub async fn upload_stats(storage: &dyn Storage, session_id: &str) -> Result<UploadStats> {
    let records = storage.change_docs_for_session(session_id).await?;
    let total = records.len() as u64;
    let with_detail = records.iter().filter(|r| !r.is_header_only()).count() as u64;
    Ok(UploadStats {
        total_records: total,
        with_detail,
        only_header: total - with_detail,
    })
}
