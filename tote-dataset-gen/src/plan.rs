/// Pick-sequence planning.
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("pick batch size must be positive")]
    ZeroBatch,
}

/// Computes the ordered batch-removal schedule for one regeneration.
///
/// Starting from `begin` live instances, the pile is photographed, then
/// `batch` instances are removed before each further shot until the count
/// reaches `end` exactly. The returned entries are the per-step removal
/// counts; the first entry is always 0 so the untouched pile is captured
/// before any pick happens.
///
/// Invariants: every entry is non-negative and `begin - sum == end`.
pub fn pick_sequence(begin: u32, end: u32, batch: u32) -> Result<Vec<u32>, PlanError> {
    if batch == 0 {
        return Err(PlanError::ZeroBatch);
    }
    if begin <= end {
        return Ok(vec![0]);
    }

    // Absolute counts: begin, begin, begin-batch, ... with a final entry
    // landing exactly on `end` even when the stride overshoots it.
    let mut counts: Vec<i64> = vec![begin as i64];
    let mut n = begin as i64;
    while n >= end as i64 {
        counts.push(n);
        n -= batch as i64;
    }
    if *counts.last().unwrap_or(&0) > end as i64 {
        counts.push(end as i64);
    }

    Ok(counts
        .windows(2)
        .map(|pair| (pair[0] - pair[1]).unsigned_abs() as u32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_when_begin_not_above_end() {
        assert_eq!(pick_sequence(5, 5, 3), Ok(vec![0]));
        assert_eq!(pick_sequence(2, 7, 3), Ok(vec![0]));
        assert_eq!(pick_sequence(0, 0, 1), Ok(vec![0]));
    }

    #[test]
    fn exact_stride_fit() {
        assert_eq!(pick_sequence(5, 0, 5), Ok(vec![0, 5]));
        assert_eq!(pick_sequence(6, 0, 3), Ok(vec![0, 3, 3]));
    }

    #[test]
    fn overshoot_lands_exactly_on_end() {
        assert_eq!(pick_sequence(7, 0, 3), Ok(vec![0, 3, 3, 1]));
        assert_eq!(pick_sequence(10, 0, 4), Ok(vec![0, 4, 4, 2]));
        assert_eq!(pick_sequence(30, 12, 5), Ok(vec![0, 5, 5, 5, 3]));
    }

    #[test]
    fn zero_batch_is_rejected() {
        assert_eq!(pick_sequence(5, 0, 0), Err(PlanError::ZeroBatch));
    }

    #[test]
    fn partial_sums_reconstruct_the_descent() {
        for (begin, end, batch) in [(30u32, 0u32, 5u32), (17, 3, 4), (1, 0, 9), (100, 99, 1)] {
            let plan = pick_sequence(begin, end, batch).unwrap();
            let total: u32 = plan.iter().sum();
            assert_eq!(begin - total, end, "plan({begin},{end},{batch})");
            assert_eq!(plan[0], 0);
            for k in &plan[1..] {
                assert!(*k > 0 && *k <= batch);
            }
        }
    }
}
