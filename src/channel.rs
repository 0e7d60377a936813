//! Sequential push-channel consumption with bounded reconnect.
//!
//! The consumer performs the join handshake, then feeds every inbound
//! payload to the reconciler in arrival order on one task. A lost or closed
//! connection triggers reconnect attempts with increasing delay under a
//! fixed cap; once the cap is exhausted the subscribed views degrade to
//! stale-but-displayed and the user is told exactly once.

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::time::{Duration, sleep};

use crate::core::{Result, SyncError};
use crate::notify::{NotificationGate, NotificationKind};
use crate::reconcile::Reconciler;

/// Handshake sent when (re)establishing the channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub actor_id: String,
    pub role: String,
}

/// Persistent bidirectional connection delivering `record-event` payloads.
///
/// `next_event` yields `Ok(Some(payload))` per message, `Ok(None)` when the
/// server closes cleanly, and `Err` on connection failure. Both closure and
/// failure are handled with the same reconnect policy.
#[async_trait]
pub trait PushChannel: Send {
    async fn connect(&mut self, join: &JoinRequest) -> Result<()>;
    async fn next_event(&mut self) -> Result<Option<Value>>;
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Reconnect attempt cap before the fail-soft degradation.
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnect attempt; doubled per attempt.
    pub base_delay: Duration,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self {
            max_reconnect_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_reconnect_attempts == 0 {
            return Err(SyncError::Config(
                "max_reconnect_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one [`PushChannel`] into one [`Reconciler`].
pub struct ChannelConsumer<C: PushChannel> {
    channel: C,
    join: JoinRequest,
    config: ChannelConfig,
}

impl<C: PushChannel> ChannelConsumer<C> {
    pub fn new(channel: C, join: JoinRequest) -> Self {
        Self::with_config(channel, join, ChannelConfig::default())
    }

    pub fn with_config(channel: C, join: JoinRequest, config: ChannelConfig) -> Self {
        Self {
            channel,
            join,
            config,
        }
    }

    /// Consumes the channel until reconnection is abandoned.
    ///
    /// Returns `Err(RetriesExhausted)` after the attempt cap, with every
    /// subscribed view marked stale and a single keyed notification emitted.
    /// An initial connect failure propagates directly: there is nothing live
    /// to degrade yet.
    pub async fn run(&mut self, reconciler: &mut Reconciler, gate: &NotificationGate) -> Result<()> {
        self.channel.connect(&self.join).await?;
        loop {
            let failure = match self.channel.next_event().await {
                Ok(Some(payload)) => {
                    reconciler.handle_wire(payload);
                    continue;
                }
                // A server-side close degrades exactly like a failed read.
                Ok(None) => SyncError::ChannelClosed,
                Err(err) => err,
            };
            warn!("push channel lost: {failure}");
            self.reconnect_or_degrade(reconciler, gate).await?;
        }
    }

    async fn reconnect_or_degrade(
        &mut self,
        reconciler: &mut Reconciler,
        gate: &NotificationGate,
    ) -> Result<()> {
        let attempts = self.config.max_reconnect_attempts;
        for attempt in 1..=attempts {
            sleep(self.backoff(attempt)).await;
            match self.channel.connect(&self.join).await {
                Ok(()) => {
                    info!("push channel reconnected on attempt {attempt}");
                    return Ok(());
                }
                Err(err) => {
                    warn!("reconnect attempt {attempt} of {attempts} failed: {err}");
                }
            }
        }

        // Fail-soft: keep showing last-known data, tell the user once.
        reconciler.mark_all_stale();
        gate.notify_keyed(
            NotificationKind::Warning,
            "Live updates are unavailable; showing last known data",
            "channel-stale",
        );
        Err(SyncError::RetriesExhausted { attempts })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
