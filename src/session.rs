//! Session state and the edit/submit lifecycle.
//!
//! [`SessionContext`] is the explicit per-session state object: actor
//! metadata for owner-reference rehydration and a sign-out flag that used to
//! be module-level global state in earlier frontends of this workflow --
//! keeping it on the session lets tests run independent sessions.
//!
//! [`EditSession`] owns one baseline/draft pair. The baseline is frozen at
//! edit start; the draft mutates freely and persists defensively; submit
//! computes the minimal dirty patch against the baseline and routes the
//! authoritative echo through the reconciler's normal upsert path.
//! Field-level last-writer-wins across clients is an accepted property of
//! that design, not a defect.

use log::{debug, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::channel::JoinRequest;
use crate::core::{Record, Result, SyncError};
use crate::diff::{DiffOptions, compute_dirty_with};
use crate::draft::{Draft, DraftStore};
use crate::notify::{NotificationGate, NotificationKind};
use crate::reconcile::Reconciler;
use crate::transport::Transport;

/// Locally known metadata of the signed-in actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorProfile {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl ActorProfile {
    pub fn join_request(&self) -> JoinRequest {
        JoinRequest {
            actor_id: self.id.clone(),
            role: self.role.clone(),
        }
    }
}

/// Explicit session state, one instance per signed-in client.
#[derive(Debug, Clone)]
pub struct SessionContext {
    actor: ActorProfile,
    signing_out: bool,
}

impl SessionContext {
    pub fn new(actor: ActorProfile) -> Self {
        Self {
            actor,
            signing_out: false,
        }
    }

    pub fn actor(&self) -> &ActorProfile {
        &self.actor
    }

    /// Flips the session into sign-out. Returns true only on the first
    /// call, so the "session expired" notification fires once even when
    /// several in-flight requests come back unauthorized together.
    pub fn begin_sign_out(&mut self) -> bool {
        if self.signing_out {
            return false;
        }
        self.signing_out = true;
        true
    }

    pub fn is_signing_out(&self) -> bool {
        self.signing_out
    }
}

/// Storage slot for the single in-flight creation draft.
pub const NEW_ORDER_SLOT: &str = "new-order";

/// One edit session: baseline snapshot, mutable draft, submit guard.
pub struct EditSession {
    correlation: Uuid,
    slot: String,
    baseline: Option<Record>,
    draft: Draft,
    diff_options: DiffOptions,
    in_flight: bool,
}

impl EditSession {
    /// Starts a new-record session in the shared creation slot.
    pub fn create() -> Self {
        Self {
            correlation: Uuid::new_v4(),
            slot: NEW_ORDER_SLOT.to_string(),
            baseline: None,
            draft: Draft::new(),
            diff_options: DiffOptions::default(),
            in_flight: false,
        }
    }

    /// Starts editing an existing record. The baseline snapshot is taken
    /// here and never mutated in place.
    pub fn edit(record: Record) -> Self {
        let draft = Draft::from_record(&record);
        Self {
            correlation: Uuid::new_v4(),
            slot: format!("edit.{}", record.id),
            baseline: Some(record),
            draft,
            diff_options: DiffOptions::default(),
            in_flight: false,
        }
    }

    /// Declares instant-typed fields for diffing (see [`DiffOptions`]).
    pub fn with_diff_options(mut self, options: DiffOptions) -> Self {
        self.diff_options = options;
        self
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn baseline(&self) -> Option<&Record> {
        self.baseline.as_ref()
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Seeds the draft from a previously persisted payload, letting an
    /// interrupted edit resume. Returns whether anything was restored.
    pub fn resume(&mut self, drafts: &DraftStore) -> Result<bool> {
        let Some(Value::Object(fields)) = drafts.restore(&self.slot)? else {
            return Ok(false);
        };
        debug!("resuming draft {} from slot '{}'", self.correlation, self.slot);
        self.draft.fields = fields;
        Ok(true)
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.draft.set_field(key, value);
    }

    pub fn set_transient(&mut self, key: impl Into<String>, value: Value) {
        self.draft.set_transient(key, value);
    }

    /// Schedules a debounced durable write of the current draft fields.
    pub fn persist_to(&self, drafts: &DraftStore) {
        drafts.persist(&self.slot, Value::Object(self.draft.fields.clone()));
    }

    /// The fields submit would send right now.
    pub fn dirty_fields(&self) -> Map<String, Value> {
        match &self.baseline {
            Some(baseline) => {
                compute_dirty_with(&baseline.fields, &self.draft.fields, &self.diff_options)
            }
            None => self.draft.fields.clone(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_fields().is_empty()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight
    }

    /// Discard policy: prompt before discarding a draft that differs from
    /// the state it started in. Prompting itself is the caller's concern.
    pub fn needs_confirmation(&self) -> bool {
        self.is_dirty()
    }

    /// Discards the draft and its stored payload without side effects on
    /// any view collection.
    pub fn discard(&mut self, drafts: &DraftStore) -> Result<()> {
        drafts.clear(&self.slot)?;
        self.draft = match &self.baseline {
            Some(baseline) => Draft::from_record(baseline),
            None => Draft::new(),
        };
        Ok(())
    }

    /// Submits the minimal dirty patch (or the whole payload for a new
    /// record) and reconciles the server's authoritative echo.
    ///
    /// While a submit is in flight the draft is frozen from further diff
    /// computation: a second attempt is rejected with
    /// [`SyncError::SubmitInFlight`], never interleaved. On any failure the
    /// draft and baseline are preserved unchanged so the user can retry
    /// without data loss.
    pub async fn submit(
        &mut self,
        transport: &dyn Transport,
        reconciler: &mut Reconciler,
        drafts: &DraftStore,
        gate: &NotificationGate,
    ) -> Result<Record> {
        self.try_begin_submit()?;
        let outcome = self.submit_inner(transport).await;
        self.finish_submit();

        match outcome {
            Ok(record) => {
                if let Err(err) = drafts.clear(&self.slot) {
                    // Reported, never blocks: the submit itself succeeded.
                    warn!("clearing draft slot '{}' failed: {err}", self.slot);
                }
                reconciler.apply_local(record.clone());
                self.baseline = Some(record.clone());
                self.draft = Draft::from_record(&record);
                gate.notify(NotificationKind::Success, "Order saved");
                Ok(record)
            }
            Err(err) => {
                self.report_failure(&err, reconciler, gate);
                Err(err)
            }
        }
    }

    async fn submit_inner(&self, transport: &dyn Transport) -> Result<Record> {
        match &self.baseline {
            None => transport.create(&self.draft.fields).await,
            Some(baseline) => {
                let dirty =
                    compute_dirty_with(&baseline.fields, &self.draft.fields, &self.diff_options);
                if dirty.is_empty() {
                    // Nothing changed; completing locally avoids an empty patch.
                    debug!("submit {} is a no-op", self.correlation);
                    return Ok(baseline.clone());
                }
                transport.patch(&baseline.id, &dirty).await
            }
        }
    }

    fn try_begin_submit(&mut self) -> Result<()> {
        if self.in_flight {
            return Err(SyncError::SubmitInFlight);
        }
        self.in_flight = true;
        Ok(())
    }

    fn finish_submit(&mut self) {
        self.in_flight = false;
    }

    fn report_failure(&self, err: &SyncError, reconciler: &mut Reconciler, gate: &NotificationGate) {
        if err.is_unauthorized() {
            if reconciler.session_mut().begin_sign_out() {
                gate.notify_keyed(
                    NotificationKind::Error,
                    "Your session has expired; please sign in again",
                    "session-expired",
                );
            }
            return;
        }
        gate.notify(NotificationKind::Error, &err.to_string());
    }
}
