//! Activity-log normalization: merges the SM20 security audit log and the
//! transaction usage log into one canonical, deduplicated, noise-filtered
//! set of executed transaction codes.

use crate::constants::{is_excluded_tcode, LOGIN_FRAMEWORK_TCODE};
use crate::error::Result;
use crate::sheet::{date_at, text_at, time_at, CellValue};
use crate::storage::Storage;
use crate::types::{ActivityLogEntry, TransactionUsageEntry};
use std::collections::HashSet;
use tracing::info;

// Fixed 17-column SM20 export layout (0-indexed, row 0 is the header)
const SM20_SYSTEM: usize = 0;
const SM20_INSTANCE: usize = 1;
const SM20_DATE: usize = 2;
const SM20_TIME: usize = 3;
const SM20_CLIENT: usize = 4;
const SM20_EVENT: usize = 5;
const SM20_USERNAME: usize = 6;
const SM20_GROUP: usize = 7;
const SM20_TERMINAL: usize = 8;
const SM20_PEER: usize = 9;
const SM20_SOURCE_TCODE: usize = 10;
const SM20_PROGRAM: usize = 11;
const SM20_MESSAGE: usize = 12;
const SM20_NOTE: usize = 13;
const SM20_VARIABLE_1: usize = 14;
const SM20_VARIABLE_2: usize = 15;
const SM20_VARIABLE_3: usize = 16;

// Usage log layout: time, transaction code, program
const USAGE_TIME: usize = 0;
const USAGE_TCODE: usize = 1;
const USAGE_PROGRAM: usize = 2;

/// Stores the session's SM20 audit log rows. Returns the stored count.
pub async fn ingest_activity_log(
    storage: &dyn Storage,
    session_id: &str,
    rows: &[Vec<CellValue>],
) -> Result<usize> {
    info!("Uploading SM20 activity log for session: {}", session_id);

    let mut entries: Vec<ActivityLogEntry> = rows
        .iter()
        .map(|row| ActivityLogEntry {
            id: None,
            session_id: session_id.to_string(),
            sap_system: text_at(row, SM20_SYSTEM),
            instance: text_at(row, SM20_INSTANCE),
            entry_date: date_at(row, SM20_DATE),
            entry_time: time_at(row, SM20_TIME),
            client: text_at(row, SM20_CLIENT),
            event: text_at(row, SM20_EVENT),
            username: text_at(row, SM20_USERNAME),
            group_name: text_at(row, SM20_GROUP),
            terminal: text_at(row, SM20_TERMINAL),
            peer: text_at(row, SM20_PEER),
            source_tcode: text_at(row, SM20_SOURCE_TCODE),
            program: text_at(row, SM20_PROGRAM),
            message: text_at(row, SM20_MESSAGE),
            note: text_at(row, SM20_NOTE),
            variable_1: text_at(row, SM20_VARIABLE_1),
            variable_2: text_at(row, SM20_VARIABLE_2),
            variable_3: text_at(row, SM20_VARIABLE_3),
        })
        .collect();

    storage.insert_activity_entries(&mut entries).await?;
    info!("SM20 upload completed: {} records saved", entries.len());
    Ok(entries.len())
}

/// Stores the session's transaction usage log rows. Returns the stored count.
pub async fn ingest_usage_log(
    storage: &dyn Storage,
    session_id: &str,
    rows: &[Vec<CellValue>],
) -> Result<usize> {
    info!("Uploading transaction usage log for session: {}", session_id);

    let mut entries: Vec<TransactionUsageEntry> = rows
        .iter()
        .map(|row| TransactionUsageEntry {
            id: None,
            session_id: session_id.to_string(),
            time: time_at(row, USAGE_TIME),
            tcode: text_at(row, USAGE_TCODE),
            program: text_at(row, USAGE_PROGRAM),
        })
        .collect();

    storage.insert_usage_entries(&mut entries).await?;
    info!("Usage log upload completed: {} records saved", entries.len());
    Ok(entries.len())
}

/// Computes the canonical executed set for a session on demand; never stored.
pub async fn canonical_executed_set(
    storage: &dyn Storage,
    session_id: &str,
) -> Result<Vec<String>> {
    let activity = storage.activity_for_session(session_id).await?;
    let usage = storage.usage_for_session(session_id).await?;
    Ok(executed_set(&activity, &usage))
}

/// Distills both logs into an ordered set of uppercase business transaction
/// codes with system noise removed.
///
/// A login-framework (`S000`) entry contributes the transaction named in its
/// audit message ("Transaction FB01 started"), and only when the message
/// marks a real transaction start outside the session manager. Every other
/// activity entry contributes its source code, and every usage entry its
/// code, all subject to the fixed exclusion set. Order is first-seen,
/// activity entries before usage entries.
pub fn executed_set(
    activity: &[ActivityLogEntry],
    usage: &[TransactionUsageEntry],
) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    for entry in activity {
        let code = entry.source_tcode.trim().to_uppercase();
        if code == LOGIN_FRAMEWORK_TCODE {
            let message = entry.message.to_lowercase();
            if message.contains("transaction")
                && message.contains("started")
                && !message.contains("session_manager")
            {
                if let Some(named) = tcode_from_message(&entry.message) {
                    candidates.push(named);
                }
            }
            continue;
        }
        // Session-manager, kernel, housekeeping and empty codes fall out in
        // the final exclusion pass.
        candidates.push(code);
    }

    for entry in usage {
        candidates.push(entry.tcode.clone());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut result: Vec<String> = Vec::new();
    for raw in candidates {
        let canonical = raw.trim().to_uppercase();
        if is_excluded_tcode(&canonical) {
            continue;
        }
        if seen.insert(canonical.clone()) {
            result.push(canonical);
        }
    }
    result
}

/// Pulls the transaction code out of an audit message shaped like
/// "Transaction FB01 started": the token following the word "transaction".
fn tcode_from_message(message: &str) -> Option<String> {
    let mut tokens = message.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("transaction") {
            return tokens
                .next()
                .map(|t| t.trim_matches(|c: char| ".,;:'\"".contains(c)).to_string())
                .filter(|t| !t.is_empty());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sm20(source_tcode: &str, message: &str) -> ActivityLogEntry {
        ActivityLogEntry {
            id: None,
            session_id: "FF-1".into(),
            sap_system: "PRD".into(),
            instance: "prdapp01_PRD_00".into(),
            entry_date: "01.02.2026".into(),
            entry_time: "09:15:00".into(),
            client: "100".into(),
            event: "AU3".into(),
            username: "FF_JSMITH".into(),
            group_name: "".into(),
            terminal: "WS1234".into(),
            peer: "10.0.0.5".into(),
            source_tcode: source_tcode.into(),
            program: "".into(),
            message: message.into(),
            note: "".into(),
            variable_1: "".into(),
            variable_2: "".into(),
            variable_3: "".into(),
        }
    }

    fn usage(tcode: &str) -> TransactionUsageEntry {
        TransactionUsageEntry {
            id: None,
            session_id: "FF-1".into(),
            time: "09:20:11".into(),
            tcode: tcode.into(),
            program: "SAPMF05A".into(),
        }
    }

    #[test]
    fn canonical_set_folds_case_dedupes_and_drops_noise() {
        let activity = vec![
            sm20("S000", "Transaction FB01 started"),
            sm20("SESSION_MANAGER", "Main menu"),
            sm20("SE16N", "Report RK_SE16N started"),
            sm20("se16n", "Report RK_SE16N started"),
        ];
        let usage = vec![usage("FB01")];

        assert_eq!(executed_set(&activity, &usage), vec!["FB01", "SE16N"]);
    }

    #[test]
    fn login_framework_entries_need_a_started_message() {
        // Message lacks "started"
        let no_start = vec![sm20("S000", "Transaction FB01 attempted")];
        assert!(executed_set(&no_start, &[]).is_empty());

        // Message mentions the session manager even though it says started
        let manager = vec![sm20("S000", "Transaction SESSION_MANAGER started")];
        assert!(executed_set(&manager, &[]).is_empty());

        let good = vec![sm20("S000", "Transaction VA01 started")];
        assert_eq!(executed_set(&good, &[]), vec!["VA01"]);
    }

    #[test]
    fn kernel_housekeeping_and_empty_codes_are_excluded() {
        let activity = vec![
            sm20("SAPMSYST", "Logon successful"),
            sm20("RSRZLLG0", "Background job"),
            sm20("", "No source transaction"),
            sm20("FB03", "Document displayed"),
        ];
        assert_eq!(executed_set(&activity, &[]), vec!["FB03"]);
    }

    #[test]
    fn usage_codes_are_included_unconditionally_in_first_seen_order() {
        let activity = vec![sm20("SE38", "Report started")];
        let usage_rows = vec![usage("va01"), usage("SE38"), usage("VA01")];
        // Activity entries come before usage entries; duplicates collapse
        assert_eq!(
            executed_set(&activity, &usage_rows),
            vec!["SE38", "VA01"]
        );
    }

    #[test]
    fn message_tcode_extraction_tolerates_case_and_punctuation() {
        assert_eq!(
            tcode_from_message("transaction fb01 Started."),
            Some("fb01".to_string())
        );
        assert_eq!(tcode_from_message("nothing here"), None);
        assert_eq!(tcode_from_message("Transaction"), None);
    }
}
