//! Membership rules for filtered dashboard views.
//!
//! One pure predicate per dashboard decides whether a record belongs in that
//! view. Predicates are evaluated on every incoming event for every
//! subscribed view, so they must be cheap, side-effect free, and total --
//! including over partially populated records carried by events.

use crate::core::Record;

pub trait Membership: Send + Sync {
    fn belongs(&self, record: &Record) -> bool;
}

/// Every closure over a record is a membership rule.
impl<F> Membership for F
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    fn belongs(&self, record: &Record) -> bool {
        self(record)
    }
}

/// The unfiltered dashboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllRecords;

impl Membership for AllRecords {
    fn belongs(&self, _record: &Record) -> bool {
        true
    }
}

/// Conjunction of stage-status clauses, the shape every workflow dashboard
/// filter reduces to. Example: awaiting payment collection is
/// `installationStatus == "Completed" && paymentStatus != "Received"`.
///
/// A missing stage field fails `stage_is` and passes `stage_is_not`, which
/// keeps the predicate total over partial event payloads.
#[derive(Debug, Clone, Default)]
pub struct StagePredicate {
    required: Vec<(String, String)>,
    excluded: Vec<(String, String)>,
}

impl StagePredicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `stage == status`.
    pub fn stage_is(mut self, stage: impl Into<String>, status: impl Into<String>) -> Self {
        self.required.push((stage.into(), status.into()));
        self
    }

    /// Requires `stage != status`.
    pub fn stage_is_not(mut self, stage: impl Into<String>, status: impl Into<String>) -> Self {
        self.excluded.push((stage.into(), status.into()));
        self
    }
}

impl Membership for StagePredicate {
    fn belongs(&self, record: &Record) -> bool {
        self.required
            .iter()
            .all(|(stage, status)| record.stage(stage) == Some(status.as_str()))
            && self
                .excluded
                .iter()
                .all(|(stage, status)| record.stage(stage) != Some(status.as_str()))
    }
}
