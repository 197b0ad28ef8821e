//! Compatibility-based batching of ready operations (spec §4.G).
//!
//! Operations are grouped into batches that are internally compatible and
//! capacity-bounded. Compatibility is checked pairwise against each batch's
//! head (symmetric, non-transitive within a batch) rather than requiring
//! every pair in a batch to agree.

use specforge_queue::Operation;

pub const DEFAULT_BATCH_CAPACITY: usize = 50;

/// A compatible, capacity-bounded group of operations ready for dispatch.
pub type Batch<'a> = Vec<&'a Operation>;

/// Group `ops` (assumed already ordered priority-desc, timestamp-asc per
/// §4.I step 3) into batches of at most `capacity` operations each.
///
/// Within a batch, relative order matches input order. Batches are returned
/// in ascending submission-timestamp order of their first (head) operation.
#[must_use]
pub fn build_batches<'a>(ops: &[&'a Operation], capacity: usize) -> Vec<Batch<'a>> {
    let capacity = capacity.max(1);
    let mut batches: Vec<Batch<'a>> = Vec::new();

    for &op in ops {
        let mut placed = false;
        for batch in &mut batches {
            if batch.len() >= capacity {
                continue;
            }
            if compatible(batch[0], op) {
                batch.push(op);
                placed = true;
                break;
            }
        }
        if !placed {
            batches.push(vec![op]);
        }
    }

    batches.sort_by_key(|batch| batch[0].submitted_at);
    batches
}

/// Pairwise compatibility rule (§4.G): any pair on different specifications
/// is compatible; same-specification pairs are compatible only per the
/// operation type's disjoint-artifact rule.
#[must_use]
pub fn compatible(a: &Operation, b: &Operation) -> bool {
    match (a.spec_id(), b.spec_id()) {
        (Some(sa), Some(sb)) if sa == sb => a.operation_type.batch_compatible_with(&b.operation_type),
        _ => true,
    }
}
