use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ordersync::{
    ActorProfile, AllRecords, DraftStore, EditSession, MemoryStorage, NotificationGate,
    NotificationKind, NotificationSurface, Record, RecordId, Reconciler, Result, SessionContext,
    SyncError, Transport,
};
use serde_json::{Map, Value, json};

#[derive(Default)]
struct MockTransport {
    responses: Mutex<VecDeque<Result<Record>>>,
    created: Mutex<Vec<Map<String, Value>>>,
    patched: Mutex<Vec<(RecordId, Map<String, Value>)>>,
}

impl MockTransport {
    fn respond_with(self, response: Result<Record>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(response);
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        Ok(Vec::new())
    }

    async fn create(&self, payload: &Map<String, Value>) -> Result<Record> {
        self.created.lock().unwrap().push(payload.clone());
        self.next_response()
    }

    async fn patch(&self, id: &RecordId, patch: &Map<String, Value>) -> Result<Record> {
        self.patched
            .lock()
            .unwrap()
            .push((id.clone(), patch.clone()));
        self.next_response()
    }
}

impl MockTransport {
    fn next_response(&self) -> Result<Record> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("transport called more often than scripted"))
    }
}

#[derive(Default)]
struct RecordingSurface {
    shown: Mutex<Vec<(NotificationKind, String)>>,
}

struct SurfaceHandle(Arc<RecordingSurface>);

impl NotificationSurface for SurfaceHandle {
    fn show(&self, kind: NotificationKind, message: &str) {
        self.0.shown.lock().unwrap().push((kind, message.to_string()));
    }
}

fn reconciler() -> Reconciler {
    let mut reconciler = Reconciler::new(SessionContext::new(ActorProfile {
        id: "actor-1".to_string(),
        name: "Asha".to_string(),
        role: "sales".to_string(),
    }));
    reconciler.subscribe("all", AllRecords, []);
    reconciler
}

fn baseline() -> Record {
    Record::from_value(json!({
        "_id": "o-1",
        "total": 100,
        "remarks": "",
    }))
    .unwrap()
}

fn fixture() -> (DraftStore, NotificationGate, Arc<RecordingSurface>) {
    let surface = Arc::new(RecordingSurface::default());
    (
        DraftStore::new(Arc::new(MemoryStorage::new())),
        NotificationGate::new(SurfaceHandle(surface.clone())),
        surface,
    )
}

#[tokio::test]
async fn submit_sends_only_the_edited_fields() {
    let echo = Record::from_value(json!({
        "_id": "o-1",
        "total": 100,
        "remarks": "ok",
    }))
    .unwrap();
    let transport = MockTransport::default().respond_with(Ok(echo));
    let mut reconciler = reconciler();
    let (drafts, gate, _surface) = fixture();

    let mut session = EditSession::edit(baseline());
    session.set_field("remarks", json!("ok"));
    session
        .submit(&transport, &mut reconciler, &drafts, &gate)
        .await
        .unwrap();

    let patched = transport.patched.lock().unwrap();
    let (id, patch) = &patched[0];
    assert_eq!(id, &RecordId::new("o-1"));
    let mut expected = Map::new();
    expected.insert("remarks".to_string(), json!("ok"));
    assert_eq!(patch, &expected);
}

#[tokio::test]
async fn submit_echo_reconciles_like_a_push_event() {
    let echo = Record::from_value(json!({
        "_id": "o-1",
        "total": 100,
        "remarks": "ok",
    }))
    .unwrap();
    let transport = MockTransport::default().respond_with(Ok(echo.clone()));
    let mut reconciler = reconciler();
    let (drafts, gate, surface) = fixture();

    let mut session = EditSession::edit(baseline());
    session.set_field("remarks", json!("ok"));
    let returned = session
        .submit(&transport, &mut reconciler, &drafts, &gate)
        .await
        .unwrap();

    assert_eq!(returned, echo);
    let snapshot = reconciler.snapshot("all").unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0], echo);

    // The session re-baselined: nothing left to submit.
    assert!(!session.is_dirty());
    assert_eq!(session.baseline(), Some(&echo));

    let shown = surface.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0, NotificationKind::Success);
}

#[tokio::test]
async fn create_submits_the_whole_payload() {
    let echo = Record::from_value(json!({
        "_id": "server-assigned",
        "customerName": "Acme",
    }))
    .unwrap();
    let transport = MockTransport::default().respond_with(Ok(echo.clone()));
    let mut reconciler = reconciler();
    let (drafts, gate, _surface) = fixture();

    let mut session = EditSession::create();
    session.set_field("customerName", json!("Acme"));
    session
        .submit(&transport, &mut reconciler, &drafts, &gate)
        .await
        .unwrap();

    let created = transport.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["customerName"], json!("Acme"));

    // The server-assigned record lands in the subscribed view.
    assert!(reconciler.snapshot("all").unwrap().iter().any(|r| r.id == echo.id));
}

#[tokio::test]
async fn clean_submit_completes_locally() {
    // No scripted response: the transport must not be called at all.
    let transport = MockTransport::default();
    let mut reconciler = reconciler();
    let (drafts, gate, _surface) = fixture();

    let mut session = EditSession::edit(baseline());
    let returned = session
        .submit(&transport, &mut reconciler, &drafts, &gate)
        .await
        .unwrap();

    assert_eq!(returned, baseline());
    assert!(transport.patched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transport_failure_preserves_draft_and_baseline() {
    let transport = MockTransport::default()
        .respond_with(Err(SyncError::transport(500u16, "backend unavailable")));
    let mut reconciler = reconciler();
    let (drafts, gate, surface) = fixture();

    let mut session = EditSession::edit(baseline());
    session.set_field("remarks", json!("ok"));
    let err = session
        .submit(&transport, &mut reconciler, &drafts, &gate)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Transport { .. }));
    // Editable state is unchanged: the user can retry without data loss.
    assert!(session.is_dirty());
    assert_eq!(session.baseline(), Some(&baseline()));
    assert_eq!(session.draft().fields["remarks"], json!("ok"));

    let shown = surface.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0, NotificationKind::Error);

    // A retry with a working backend succeeds.
    drop(shown);
    let echo = Record::from_value(json!({"_id": "o-1", "total": 100, "remarks": "ok"})).unwrap();
    let transport = MockTransport::default().respond_with(Ok(echo));
    session
        .submit(&transport, &mut reconciler, &drafts, &gate)
        .await
        .unwrap();
}

#[tokio::test]
async fn unauthorized_flips_sign_out_exactly_once() {
    let transport = MockTransport::default()
        .respond_with(Err(SyncError::transport(401u16, "token expired")))
        .respond_with(Err(SyncError::transport(401u16, "token expired")));
    let mut reconciler = reconciler();
    let (drafts, gate, surface) = fixture();

    let mut session = EditSession::edit(baseline());
    session.set_field("remarks", json!("ok"));

    for _ in 0..2 {
        let _ = session
            .submit(&transport, &mut reconciler, &drafts, &gate)
            .await;
    }

    assert!(reconciler.session().is_signing_out());
    // One notification despite two unauthorized failures.
    assert_eq!(surface.shown.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn submit_success_clears_the_draft_slot() {
    let storage = Arc::new(MemoryStorage::new());
    let drafts = DraftStore::new(storage.clone());
    let surface = Arc::new(RecordingSurface::default());
    let gate = NotificationGate::new(SurfaceHandle(surface));
    let mut reconciler = reconciler();

    let mut session = EditSession::create();
    session.set_field("customerName", json!("Acme"));
    session.persist_to(&drafts);
    drafts.flush_now(session.slot());

    let echo = Record::from_value(json!({"_id": "o-9", "customerName": "Acme"})).unwrap();
    let transport = MockTransport::default().respond_with(Ok(echo));
    session
        .submit(&transport, &mut reconciler, &drafts, &gate)
        .await
        .unwrap();

    assert!(drafts.restore(ordersync::NEW_ORDER_SLOT).unwrap().is_none());
}

#[tokio::test]
async fn discard_resets_the_draft() {
    let (drafts, _gate, _surface) = fixture();

    let mut session = EditSession::edit(baseline());
    session.set_field("remarks", json!("typo"));
    assert!(session.needs_confirmation());

    session.discard(&drafts).unwrap();
    assert!(!session.is_dirty());
    assert_eq!(session.draft().fields["remarks"], json!(""));
}
