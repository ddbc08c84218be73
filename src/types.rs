use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One SAP change-document row owned by a session.
///
/// A record is *header-only* (CDHDR data without its CDPOS item) exactly when
/// `table_name` is empty; the merge pass replaces header-only records with
/// merged ones that carry both halves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDocumentRecord {
    /// Assigned during persistence
    pub id: Option<Uuid>,
    pub session_id: String,

    // CDHDR fields
    pub client: String,
    pub object: String,
    pub object_value: String,
    pub doc_number: String,
    pub username: String,
    pub entry_date: String,
    pub entry_time: String,
    pub tcode: String,

    // CDPOS fields, empty on header-only records
    pub table_name: String,
    pub table_key: String,
    pub field_name: String,
    pub change_indicator: String,
    pub text_flag: String,
    pub unit: String,
    pub currency: String,
    pub new_value: String,
    pub old_value: String,
}

/// The CDPOS half of a change document, extracted from one detail row.
#[derive(Debug, Clone, Default)]
pub struct DetailFields {
    pub table_name: String,
    pub table_key: String,
    pub field_name: String,
    pub change_indicator: String,
    pub text_flag: String,
    pub unit: String,
    pub currency: String,
    pub new_value: String,
    pub old_value: String,
}

impl ChangeDocumentRecord {
    /// Creates a header-only record from CDHDR fields.
    #[allow(clippy::too_many_arguments)]
    pub fn header_only(
        session_id: &str,
        client: String,
        object: String,
        object_value: String,
        doc_number: String,
        username: String,
        entry_date: String,
        entry_time: String,
        tcode: String,
    ) -> Self {
        Self {
            id: None,
            session_id: session_id.to_string(),
            client,
            object,
            object_value,
            doc_number,
            username,
            entry_date,
            entry_time,
            tcode,
            table_name: String::new(),
            table_key: String::new(),
            field_name: String::new(),
            change_indicator: String::new(),
            text_flag: String::new(),
            unit: String::new(),
            currency: String::new(),
            new_value: String::new(),
            old_value: String::new(),
        }
    }

    pub fn is_header_only(&self) -> bool {
        self.table_name.is_empty()
    }

    /// Synthesizes a new merged record copying this record's header fields
    /// plus the given detail fields. The result carries no id yet.
    pub fn merged_with(&self, detail: DetailFields) -> Self {
        Self {
            id: None,
            session_id: self.session_id.clone(),
            client: self.client.clone(),
            object: self.object.clone(),
            object_value: self.object_value.clone(),
            doc_number: self.doc_number.clone(),
            username: self.username.clone(),
            entry_date: self.entry_date.clone(),
            entry_time: self.entry_time.clone(),
            tcode: self.tcode.clone(),
            table_name: detail.table_name,
            table_key: detail.table_key,
            field_name: detail.field_name,
            change_indicator: detail.change_indicator,
            text_flag: detail.text_flag,
            unit: detail.unit,
            currency: detail.currency,
            new_value: detail.new_value,
            old_value: detail.old_value,
        }
    }
}

/// One raw SM20 security audit log row. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Option<Uuid>,
    pub session_id: String,
    pub sap_system: String,
    pub instance: String,
    pub entry_date: String,
    pub entry_time: String,
    pub client: String,
    pub event: String,
    pub username: String,
    pub group_name: String,
    pub terminal: String,
    pub peer: String,
    pub source_tcode: String,
    pub program: String,
    pub message: String,
    pub note: String,
    pub variable_1: String,
    pub variable_2: String,
    pub variable_3: String,
}

/// One raw STAD/usage log row. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionUsageEntry {
    pub id: Option<Uuid>,
    pub session_id: String,
    pub time: String,
    pub tcode: String,
    pub program: String,
}

/// Where a session sits in the two-phase change-document protocol.
///
/// Header ingestion moves a session from `Empty` to `HeadersLoaded`; the
/// merge pass is valid from `HeadersLoaded`, re-enterable from `Merged`
/// (yielding zero matches), and rejected from `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Empty,
    HeadersLoaded,
    Merged,
}

impl SessionPhase {
    /// Classifies a session's change-document set. Derived from the data so
    /// the phase can never drift from what is actually stored.
    pub fn classify(records: &[ChangeDocumentRecord]) -> Self {
        if records.is_empty() {
            SessionPhase::Empty
        } else if records.iter().any(|r| r.is_header_only()) {
            SessionPhase::HeadersLoaded
        } else {
            SessionPhase::Merged
        }
    }
}

/// Summary counts over a session's change-document set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStats {
    pub total_records: u64,
    pub with_detail: u64,
    pub only_header: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(doc: &str) -> ChangeDocumentRecord {
        ChangeDocumentRecord::header_only(
            "FF-1",
            "100".into(),
            "USER".into(),
            "JSMITH".into(),
            doc.into(),
            "FF_JSMITH".into(),
            "01.02.2026".into(),
            "09:15:00".into(),
            "SU01".into(),
        )
    }

    #[test]
    fn header_only_iff_table_name_empty() {
        let h = header("0000000001");
        assert!(h.is_header_only());

        let merged = h.merged_with(DetailFields {
            table_name: "USR02".into(),
            field_name: "UFLAG".into(),
            old_value: "0".into(),
            new_value: "64".into(),
            ..DetailFields::default()
        });
        assert!(!merged.is_header_only());
        // Header fields are copied across
        assert_eq!(merged.doc_number, "0000000001");
        assert_eq!(merged.tcode, "SU01");
        assert!(merged.id.is_none());
    }

    #[test]
    fn phase_classification_follows_record_mix() {
        assert_eq!(SessionPhase::classify(&[]), SessionPhase::Empty);

        let h = header("1");
        assert_eq!(
            SessionPhase::classify(std::slice::from_ref(&h)),
            SessionPhase::HeadersLoaded
        );

        let merged = h.merged_with(DetailFields {
            table_name: "USR02".into(),
            ..DetailFields::default()
        });
        assert_eq!(
            SessionPhase::classify(&[merged.clone()]),
            SessionPhase::Merged
        );
        // Mixed sets are transient but classify as HeadersLoaded
        assert_eq!(
            SessionPhase::classify(&[h, merged]),
            SessionPhase::HeadersLoaded
        );
    }
}
