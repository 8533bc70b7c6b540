use crate::date::QuizDate;
use crate::error::PipelineError;
use crate::store::QuestionStore;

/// How many consecutive days the finder probes before giving up.
pub const DEFAULT_PROBE_LIMIT: usize = 365;

/// Find the first calendar day at or after `start` with no committed
/// records, probing one day at a time with exactly one capacity check per
/// day. A day with any records is taken - there is no partial backfill.
///
/// The result is advisory: the commit path re-checks availability
/// immediately before writing, so a concurrent committer can still win
/// the date in between. When every probed day within `probe_limit` is
/// occupied the finder falls back to `start` and lets the commit-time
/// conflict check reject it; exhaustion itself is never an error.
///
/// # Errors
/// Propagates store read failures only.
pub fn find_open_date<S: QuestionStore + ?Sized>(
    store: &S,
    start: QuizDate,
    probe_limit: usize,
) -> Result<QuizDate, PipelineError> {
    let mut candidate = start;
    for _ in 0..probe_limit {
        if store.count_records_for_date(candidate)? == 0 {
            return Ok(candidate);
        }
        match candidate.next_day() {
            Some(next) => candidate = next,
            None => break,
        }
    }
    Ok(start)
}
