//! Named transaction-code policy constants shared across the codebase.
//! Adding a new system transaction to ignore should only ever touch this file.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Number of records buffered before a persistence flush during ingestion.
pub const BATCH_SIZE: usize = 1000;

// SAP system transaction codes that never count as business activity.

/// Login framework pseudo-transaction; its audit message may still name a
/// business transaction ("Transaction FB01 started").
pub const LOGIN_FRAMEWORK_TCODE: &str = "S000";
/// SAP Easy Access session manager.
pub const SESSION_MANAGER_TCODE: &str = "SESSION_MANAGER";
/// Kernel system program.
pub const SYSTEM_KERNEL_TCODE: &str = "SAPMSYST";
/// Batch/report housekeeping job.
pub const HOUSEKEEPING_TCODE: &str = "RSRZLLG0";

/// The fixed exclusion set applied as the final pass of canonicalization.
/// Codes are compared after trimming and uppercasing.
pub static EXCLUDED_TCODES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "",
        LOGIN_FRAMEWORK_TCODE,
        SESSION_MANAGER_TCODE,
        SYSTEM_KERNEL_TCODE,
        HOUSEKEEPING_TCODE,
    ])
});

/// Returns true when a canonicalized (trimmed, uppercased) transaction code
/// belongs to the fixed noise set.
pub fn is_excluded_tcode(canonical: &str) -> bool {
    EXCLUDED_TCODES.contains(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_set_covers_system_codes_and_empty() {
        assert!(is_excluded_tcode(""));
        assert!(is_excluded_tcode("S000"));
        assert!(is_excluded_tcode("SESSION_MANAGER"));
        assert!(is_excluded_tcode("SAPMSYST"));
        assert!(is_excluded_tcode("RSRZLLG0"));
        assert!(!is_excluded_tcode("SE16N"));
    }
}
