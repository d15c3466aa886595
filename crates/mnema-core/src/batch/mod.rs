//! Bounded-batch mutation primitive.
//!
//! Applies a patch across an unbounded set of records without blowing a
//! single invocation's time or row budget. The fetch selector MUST
//! exclude already-patched records (filter on the field the patch
//! changes) so pagination never revisits mutated rows.

use tracing::warn;

use crate::config::BatchLimits;

/// Result of a batched mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records patched across all iterations.
    pub processed: usize,
    /// Batch reads issued.
    pub iterations: usize,
    /// Whether the iteration ceiling stopped the loop. Partial
    /// completion, logged as an anomaly, never an error.
    pub hit_ceiling: bool,
}

/// Repeatedly fetch up to `max_per_batch` unpatched records and patch
/// each, until a fetch comes back empty or the iteration ceiling is
/// reached.
///
/// `fetch` receives the batch size and must return only records the
/// patch has not yet been applied to.
pub fn apply_batched<T, E, F, P>(
    mut fetch: F,
    mut patch: P,
    limits: &BatchLimits,
) -> Result<BatchOutcome, E>
where
    F: FnMut(usize) -> Result<Vec<T>, E>,
    P: FnMut(&T) -> Result<(), E>,
{
    let mut processed = 0usize;
    let mut iterations = 0usize;

    while iterations < limits.max_iterations {
        let batch = fetch(limits.max_per_batch)?;
        iterations += 1;

        if batch.is_empty() {
            return Ok(BatchOutcome {
                processed,
                iterations,
                hit_ceiling: false,
            });
        }

        for record in &batch {
            patch(record)?;
            processed += 1;
        }
    }

    warn!(
        processed,
        max_iterations = limits.max_iterations,
        "batched mutation stopped at the iteration ceiling with records possibly remaining"
    );

    Ok(BatchOutcome {
        processed,
        iterations,
        hit_ceiling: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    /// An in-memory record set where fetch excludes patched records,
    /// mirroring a selector that filters on the patched field.
    struct FakeTable {
        patched: Vec<bool>,
    }

    impl FakeTable {
        fn new(n: usize) -> Self {
            Self {
                patched: vec![false; n],
            }
        }

        fn fetch_unpatched(&self, limit: usize) -> Vec<usize> {
            self.patched
                .iter()
                .enumerate()
                .filter(|(_, done)| !**done)
                .map(|(i, _)| i)
                .take(limit)
                .collect()
        }
    }

    fn run(n: usize, limits: &BatchLimits) -> (BatchOutcome, usize, Vec<usize>) {
        let mut table = FakeTable::new(n);
        let mut reads = 0usize;
        let mut patch_order = Vec::new();

        // Split borrows through a RefCell so fetch and patch can both
        // touch the table, as the store closures do.
        let table_cell = std::cell::RefCell::new(&mut table);
        let reads_cell = std::cell::RefCell::new(&mut reads);

        let outcome = apply_batched::<usize, Infallible, _, _>(
            |limit| {
                **reads_cell.borrow_mut() += 1;
                Ok(table_cell.borrow().fetch_unpatched(limit))
            },
            |&index| {
                table_cell.borrow_mut().patched[index] = true;
                patch_order.push(index);
                Ok(())
            },
            limits,
        )
        .unwrap();

        (outcome, reads, patch_order)
    }

    #[test]
    fn test_batch_read_counts_match_record_counts() {
        let limits = BatchLimits::default();
        for n in [0usize, 12, 50, 75, 150] {
            let (outcome, reads, order) = run(n, &limits);
            let expected_reads = n.div_ceil(limits.max_per_batch) + 1;

            assert_eq!(outcome.processed, n, "N={}", n);
            assert_eq!(reads, expected_reads, "N={}", n);
            assert!(!outcome.hit_ceiling, "N={}", n);

            // Every record patched exactly once.
            let mut sorted = order.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), n, "N={}", n);
        }
    }

    #[test]
    fn test_iteration_ceiling_is_a_hard_stop() {
        let limits = BatchLimits {
            max_per_batch: 50,
            max_iterations: 100,
        };
        let n = limits.max_per_batch * limits.max_iterations;

        let (outcome, reads, order) = run(n, &limits);
        assert_eq!(outcome.processed, n);
        assert_eq!(reads, limits.max_iterations);
        assert!(outcome.hit_ceiling);
        assert_eq!(order.len(), n);
    }

    #[test]
    fn test_ceiling_never_processes_more() {
        let limits = BatchLimits {
            max_per_batch: 10,
            max_iterations: 3,
        };

        let (outcome, reads, _) = run(100, &limits);
        assert_eq!(outcome.processed, 30);
        assert_eq!(reads, 3);
        assert!(outcome.hit_ceiling);
    }

    #[test]
    fn test_fetch_error_propagates() {
        let limits = BatchLimits::default();
        let result = apply_batched::<usize, &str, _, _>(|_| Err("query failed"), |_| Ok(()), &limits);
        assert_eq!(result.unwrap_err(), "query failed");
    }
}
