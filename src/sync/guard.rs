/// Refuses absence-deletion batches at or above a size limit.
///
/// A degraded upstream that still answers with a well-formed but short list
/// would otherwise make every missing entitlement look removed.
#[derive(Debug, Clone, Copy)]
pub struct RemovalGuard {
    max_removals: usize,
}

/// Recorded when a batch is refused; the run still commits its other work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalVeto {
    pub candidates: usize,
    pub threshold: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuardDecision<T> {
    Approved(Vec<T>),
    Vetoed(RemovalVeto),
}

impl RemovalGuard {
    pub fn new(max_removals: usize) -> Self {
        Self { max_removals }
    }

    /// All or nothing: either every candidate is approved or none are.
    pub fn filter<T>(&self, candidates: Vec<T>) -> GuardDecision<T> {
        if !candidates.is_empty() && candidates.len() >= self.max_removals {
            GuardDecision::Vetoed(RemovalVeto {
                candidates: candidates.len(),
                threshold: self.max_removals,
            })
        } else {
            GuardDecision::Approved(candidates)
        }
    }
}
