// ============================================================================
// Ordersync Library
// ============================================================================

//! Client-side sync core for a multi-stage order workflow.
//!
//! Keeps dashboard views consistent with an authoritative push event stream
//! while local drafts are edited and submitted as minimal field patches:
//!
//! - [`diff`] computes the minimal changed-field set between a baseline and
//!   a draft;
//! - [`view`] holds the ordered, id-unique collection behind one dashboard,
//!   filtered by a [`Membership`] rule;
//! - [`reconcile`] applies push events (and submit echoes) to every
//!   subscribed view through one shared upsert/evict path;
//! - [`channel`] consumes the push connection sequentially with bounded
//!   reconnect;
//! - [`draft`] persists in-progress edits debounced and durable;
//! - [`notify`] deduplicates user-facing notifications by identity;
//! - [`session`] carries the edit lifecycle and the submit guard.
//!
//! # Examples
//!
//! ```
//! use ordersync::{Membership, Record, StagePredicate, ViewCollection, compute_dirty};
//! use serde_json::json;
//!
//! let record = Record::from_value(json!({
//!     "_id": "o-1",
//!     "installationStatus": "Completed",
//!     "paymentStatus": "Pending",
//!     "remarks": "",
//! }))
//! .unwrap();
//!
//! let awaiting_payment = StagePredicate::new()
//!     .stage_is("installationStatus", "Completed")
//!     .stage_is_not("paymentStatus", "Received");
//! assert!(awaiting_payment.belongs(&record));
//!
//! let mut view = ViewCollection::new();
//! view.upsert(record.clone());
//! assert_eq!(view.len(), 1);
//!
//! let mut edited = record.fields.clone();
//! edited.insert("remarks".to_string(), json!("ok"));
//! let dirty = compute_dirty(&record.fields, &edited);
//! assert_eq!(dirty.len(), 1);
//! ```

pub mod channel;
pub mod core;
pub mod diff;
pub mod draft;
pub mod notify;
pub mod reconcile;
pub mod session;
pub mod transport;
pub mod view;

// Re-export main types for convenience
pub use crate::core::{Record, RecordId, Result, SyncError};
pub use diff::{DiffOptions, apply_patch, compute_dirty, compute_dirty_with};
pub use view::membership::{AllRecords, Membership, StagePredicate};
pub use view::{ViewCollection, newest_first};
pub use reconcile::{EventOperation, RecordEvent, Reconciler};
pub use channel::{ChannelConfig, ChannelConsumer, JoinRequest, PushChannel};
pub use draft::{Draft, DraftStore, DraftStoreConfig, DurableStorage, FileStorage, MemoryStorage};
pub use notify::{LogSurface, NotificationGate, NotificationKind, NotificationSurface};
pub use session::{ActorProfile, EditSession, NEW_ORDER_SLOT, SessionContext};
pub use transport::{Envelope, Transport};
