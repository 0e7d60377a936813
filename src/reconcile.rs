//! Push-event reconciliation against subscribed dashboard views.
//!
//! Every inbound `record-event` is decoded at this boundary into a tagged
//! [`RecordEvent`], normalized, and applied to each subscribed
//! [`ViewCollection`] through its membership rule: delete or predicate
//! failure evicts, otherwise the record replaces its entry in place or is
//! prepended. Submit echoes go through [`Reconciler::apply_local`], which is
//! the exact same path, so local edits and remote events can never diverge
//! in the rules they apply.
//!
//! Malformed events are dropped individually and logged; they never abort
//! the stream or corrupt other entries.

use log::warn;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::record::extract_id;
use crate::core::{Record, RecordId, Result, SyncError};
use crate::session::SessionContext;
use crate::view::ViewCollection;
use crate::view::membership::Membership;

/// Tagged event operation. Anything else on the wire is rejected as
/// [`SyncError::UnknownOperation`], never silently defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOperation {
    Upsert,
    Delete,
}

/// A classified push event. `record` is always present for upserts and may
/// carry only the changed fields.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub operation: EventOperation,
    pub id: RecordId,
    pub record: Option<Record>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    operation: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    record: Option<Value>,
}

impl RecordEvent {
    /// Decodes and normalizes a raw wire payload.
    ///
    /// Id resolution prefers the record's own `_id`/`id` and falls back to
    /// the envelope `id`. An upsert without a record payload, or an event
    /// with no resolvable id, is malformed.
    pub fn from_wire(raw: Value, session: &SessionContext) -> Result<Self> {
        let wire: WireEvent = serde_json::from_value(raw)
            .map_err(|err| SyncError::MalformedEvent(err.to_string()))?;

        let operation = match wire.operation.as_str() {
            "upsert" => EventOperation::Upsert,
            "delete" => EventOperation::Delete,
            other => return Err(SyncError::UnknownOperation(other.to_string())),
        };

        let mut fields = match wire.record {
            Some(Value::Object(fields)) => Some(fields),
            Some(_) => {
                return Err(SyncError::MalformedEvent(
                    "event record is not an object".to_string(),
                ));
            }
            None => None,
        };

        let id = fields
            .as_mut()
            .and_then(extract_id)
            .or_else(|| wire.id.map(RecordId::new));
        let Some(id) = id else {
            return Err(SyncError::MalformedEvent(
                "event carries no resolvable id".to_string(),
            ));
        };

        let record = fields.map(|fields| {
            let mut record = Record::from_parts(id.clone(), fields);
            rehydrate_owner(&mut record, session);
            record
        });

        if operation == EventOperation::Upsert && record.is_none() {
            return Err(SyncError::MalformedEvent(
                "upsert event carries no record".to_string(),
            ));
        }

        Ok(Self {
            operation,
            id,
            record,
        })
    }

    pub fn upsert(record: Record) -> Self {
        Self {
            operation: EventOperation::Upsert,
            id: record.id.clone(),
            record: Some(record),
        }
    }

    pub fn delete(id: RecordId) -> Self {
        Self {
            operation: EventOperation::Delete,
            id,
            record: None,
        }
    }
}

/// Rehydrates a bare-id owner reference into the embedded display object
/// when it refers to the session's own actor.
///
/// Workaround for a server-side shape inconsistency: the initial fetch
/// embeds `createdBy` as an object, but push events for the actor's own
/// records can carry a bare id string.
fn rehydrate_owner(record: &mut Record, session: &SessionContext) {
    let actor = session.actor();
    let is_own_bare_id = matches!(
        record.field("createdBy"),
        Some(Value::String(owner)) if owner == &actor.id
    );
    if is_own_bare_id {
        record.set_field(
            "createdBy",
            json!({
                "_id": actor.id,
                "name": actor.name,
                "role": actor.role,
            }),
        );
    }
}

struct SubscribedView {
    name: String,
    membership: Box<dyn Membership>,
    collection: ViewCollection,
    stale: bool,
}

/// Applies the push stream to every subscribed view. Events are consumed
/// sequentially on one task; no two events for the same id are ever applied
/// out of relative arrival order within one reconciler.
pub struct Reconciler {
    session: SessionContext,
    views: Vec<SubscribedView>,
}

impl Reconciler {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            views: Vec::new(),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionContext {
        &mut self.session
    }

    /// Registers a dashboard view, seeded from its mount-time full fetch.
    pub fn subscribe(
        &mut self,
        name: impl Into<String>,
        membership: impl Membership + 'static,
        initial: impl IntoIterator<Item = Record>,
    ) {
        let name = name.into();
        self.unsubscribe(&name);
        self.views.push(SubscribedView {
            name,
            membership: Box::new(membership),
            collection: ViewCollection::from_records(initial),
            stale: false,
        });
    }

    /// Drops a view when it unmounts.
    pub fn unsubscribe(&mut self, name: &str) {
        self.views.retain(|view| view.name != name);
    }

    /// Entry point for raw push payloads. Malformed or unknown events are
    /// dropped here, logged as protocol violations, and never fatal.
    pub fn handle_wire(&mut self, raw: Value) {
        match RecordEvent::from_wire(raw, &self.session) {
            Ok(event) => self.handle(event),
            Err(err) => warn!("dropping push event: {err}"),
        }
    }

    /// Applies a classified event to every subscribed view.
    pub fn handle(&mut self, event: RecordEvent) {
        // from_wire never yields this shape; guard hand-built events.
        if event.operation == EventOperation::Upsert && event.record.is_none() {
            warn!("dropping upsert without record for id {}", event.id);
            return;
        }
        for view in &mut self.views {
            match event.operation {
                EventOperation::Delete => {
                    view.collection.evict(&event.id);
                }
                EventOperation::Upsert => {
                    let Some(record) = &event.record else { continue };
                    if view.membership.belongs(record) {
                        view.collection.upsert(record.clone());
                    } else {
                        view.collection.evict(&event.id);
                    }
                }
            }
        }
    }

    /// Routes a locally obtained authoritative record (a submit echo)
    /// through the same upsert/evict path as a push event.
    pub fn apply_local(&mut self, mut record: Record) {
        rehydrate_owner(&mut record, &self.session);
        self.handle(RecordEvent::upsert(record));
    }

    pub fn snapshot(&self, name: &str) -> Option<im::Vector<Record>> {
        self.view(name).map(|view| view.collection.snapshot())
    }

    pub fn sort_view<F>(&mut self, name: &str, cmp: F)
    where
        F: Fn(&Record, &Record) -> std::cmp::Ordering,
    {
        if let Some(view) = self.views.iter_mut().find(|view| view.name == name) {
            view.collection.sort_by(cmp);
        }
    }

    pub fn is_stale(&self, name: &str) -> bool {
        self.view(name).is_some_and(|view| view.stale)
    }

    /// Fail-soft degradation: views keep their last-known data but are
    /// flagged stale once the channel gives up reconnecting.
    pub fn mark_all_stale(&mut self) {
        for view in &mut self.views {
            view.stale = true;
        }
    }

    fn view(&self, name: &str) -> Option<&SubscribedView> {
        self.views.iter().find(|view| view.name == name)
    }
}

/// Convenience for building a bare upsert payload in the wire shape.
pub fn wire_upsert(record: &Record) -> Value {
    json!({"operation": "upsert", "record": record.to_value()})
}

/// Convenience for building a delete payload in the wire shape.
pub fn wire_delete(id: &RecordId) -> Value {
    json!({"operation": "delete", "id": id.to_string()})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ActorProfile;
    use serde_json::json;

    fn session() -> SessionContext {
        SessionContext::new(ActorProfile {
            id: "actor-1".to_string(),
            name: "Asha".to_string(),
            role: "sales".to_string(),
        })
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let raw = json!({"operation": "merge", "id": "1"});
        let err = RecordEvent::from_wire(raw, &session()).unwrap_err();
        assert!(matches!(err, SyncError::UnknownOperation(op) if op == "merge"));
    }

    #[test]
    fn test_missing_id_is_malformed() {
        let raw = json!({"operation": "upsert", "record": {"orderStatus": "Pending"}});
        assert!(matches!(
            RecordEvent::from_wire(raw, &session()),
            Err(SyncError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_envelope_id_is_fallback() {
        let raw = json!({
            "operation": "upsert",
            "id": "envelope-id",
            "record": {"orderStatus": "Pending"},
        });
        let event = RecordEvent::from_wire(raw, &session()).unwrap();
        assert_eq!(event.id, RecordId::new("envelope-id"));

        let raw = json!({
            "operation": "upsert",
            "id": "envelope-id",
            "record": {"_id": "record-id", "orderStatus": "Pending"},
        });
        let event = RecordEvent::from_wire(raw, &session()).unwrap();
        assert_eq!(event.id, RecordId::new("record-id"));
    }

    #[test]
    fn test_own_bare_owner_is_rehydrated() {
        let raw = json!({
            "operation": "upsert",
            "record": {"_id": "o-1", "createdBy": "actor-1"},
        });
        let event = RecordEvent::from_wire(raw, &session()).unwrap();
        let record = event.record.unwrap();
        assert_eq!(
            record.field("createdBy"),
            Some(&json!({"_id": "actor-1", "name": "Asha", "role": "sales"}))
        );
    }

    #[test]
    fn test_foreign_bare_owner_is_left_alone() {
        let raw = json!({
            "operation": "upsert",
            "record": {"_id": "o-1", "createdBy": "someone-else"},
        });
        let event = RecordEvent::from_wire(raw, &session()).unwrap();
        assert_eq!(
            event.record.unwrap().field("createdBy"),
            Some(&json!("someone-else"))
        );
    }

    #[test]
    fn test_delete_without_record_is_valid() {
        let raw = json!({"operation": "delete", "id": "o-9"});
        let event = RecordEvent::from_wire(raw, &session()).unwrap();
        assert_eq!(event.operation, EventOperation::Delete);
        assert!(event.record.is_none());
    }
}
