//! CLI subcommand implementations.
//!
//! Each command writes its human-readable output to the given writer so the
//! output can be snapshot-tested.

pub mod amend;
pub mod balance;
pub mod day;
pub mod diagnostics;
pub mod employees;
pub mod enroll;
pub mod recompute;
pub mod scan;
pub mod status;
pub mod util;

/// Formats a balance delta with an explicit sign, e.g. `+0:30`.
pub(crate) fn signed_hm(ms: i64) -> String {
    if ms > 0 {
        format!("+{}", tc_core::format_hm(ms))
    } else {
        tc_core::format_hm(ms)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_hm_marks_surplus() {
        assert_eq!(signed_hm(30 * 60_000), "+0:30");
        assert_eq!(signed_hm(0), "0:00");
        assert_eq!(signed_hm(-90 * 60_000), "-1:30");
    }
}
