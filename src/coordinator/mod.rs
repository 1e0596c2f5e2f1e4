//! Lifecycle coordinator
//!
//! Owns the authoritative OTP state and decides, under asynchronous,
//! out-of-order, possibly duplicate input, which code is current, when to
//! fetch a new one, and how to recover when a delivered code is rejected.
//!
//! All state lives in a single task fed by a serialized event queue, so
//! every transition runs atomically: there is no interleaving inside a
//! transition, only between events. Work that must wait (retry backoff,
//! the post-success grace period) runs in spawned tasks that report back
//! as events tagged with the episode they belong to; outcomes for a
//! superseded episode are ignored.

mod events;
mod handle;
mod state;

pub use events::{DropReason, Notice};
pub use handle::{CoordinatorError, CoordinatorHandle};
pub use state::{AutomationConfig, AutomationState, Episode, OtpRecord, Phase, StatePatch};

use crate::channel::{
    deliver_with_retry, DeliveryChannel, DeliveryOutcome, OutboundMessage, RetryPolicy, Target,
};
use crate::storage::{StateStore, StorageResult};
use chrono::{DateTime, Utc};
use events::Event;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Tunable windows and policies. Defaults match the production behavior;
/// tests shrink them.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// How long a captured code may be re-served to a new request.
    pub reuse_window: Duration,
    /// How long a captured code may exist at all before the state is wiped.
    pub expiry: Duration,
    /// Cadence of the expiry sweep.
    pub expiry_sweep_interval: Duration,
    /// Delay before automation state resets after a success, absorbing
    /// duplicate success notifications.
    pub success_grace: Duration,
    /// Delivery retry policy.
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reuse_window: Duration::from_secs(180),
            expiry: Duration::from_secs(600),
            expiry_sweep_interval: Duration::from_secs(60),
            success_grace: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

/// The lifecycle coordinator. Construct with [`Coordinator::new`], then
/// [`spawn`](Coordinator::spawn) it onto the runtime and talk to it through
/// the returned [`CoordinatorHandle`].
pub struct Coordinator {
    config: CoordinatorConfig,
    channel: Arc<dyn DeliveryChannel>,
    store: Arc<dyn StateStore>,

    state: AutomationState,
    phase: Phase,
    record: Option<OtpRecord>,
    used_codes: HashSet<String>,
    episode: Option<Episode>,
    /// Bumped on every success; stale grace timers check it on arrival.
    reset_generation: u64,

    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    notices: broadcast::Sender<Notice>,
}

impl Coordinator {
    /// Create a coordinator, loading persisted state from the store.
    pub fn new(
        channel: Arc<dyn DeliveryChannel>,
        store: Arc<dyn StateStore>,
        config: CoordinatorConfig,
    ) -> StorageResult<Self> {
        let automation = store.load_automation()?.unwrap_or_default();
        let record = store.load_snapshot()?;
        let used_codes = store.load_used_codes()?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let (notices, _) = broadcast::channel(64);

        Ok(Self {
            config,
            channel,
            store,
            state: AutomationState::from_config(automation),
            phase: Phase::Idle,
            record,
            used_codes,
            episode: None,
            reset_generation: 0,
            events_tx,
            events_rx,
            notices,
        })
    }

    /// Run the coordinator on the current runtime, returning its handle.
    pub fn spawn(self) -> CoordinatorHandle {
        let handle = CoordinatorHandle {
            events: self.events_tx.clone(),
            notices: self.notices.clone(),
        };
        tokio::spawn(self.run());
        handle
    }

    async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.config.expiry_sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sweep.tick() => self.sweep_expired(),
                event = self.events_rx.recv() => match event {
                    None | Some(Event::Shutdown) => break,
                    Some(event) => self.handle_event(event),
                },
            }
        }
        debug!("coordinator stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::CodeFound {
                code,
                source_timestamp,
                reply,
            } => {
                let accepted = self.handle_code_found(code, source_timestamp);
                let _ = reply.send(accepted);
            }
            Event::NeedCode { manual, consumer } => self.handle_need_code(manual, consumer),
            Event::CodeRejected { failed_code } => self.handle_code_rejected(failed_code),
            Event::LoginSucceeded { code, timestamp } => {
                self.handle_login_succeeded(code, timestamp)
            }
            Event::GetState { reply } => {
                let _ = reply.send(self.state.clone());
            }
            Event::SetState { patch, reply } => {
                self.state.apply(&patch);
                self.persist_automation();
                let _ = reply.send(self.state.clone());
            }
            Event::ForceCleanup { reason, reply } => {
                info!(reason = %reason, "forced cleanup requested");
                self.trigger_source(OutboundMessage::CloseContexts);
                let _ = reply.send(true);
            }
            Event::ClearState { reply } => {
                self.handle_clear_state();
                let _ = reply.send(true);
            }
            Event::DeliveryFinished { episode, outcome } => {
                self.handle_delivery_finished(episode, outcome)
            }
            Event::ContextResolved { target, ctx } => match target {
                Target::Source => self.state.source_ctx = Some(ctx),
                Target::Consumer => self.state.consumer_ctx = Some(ctx),
            },
            Event::GraceElapsed { generation } => self.handle_grace_elapsed(generation),
            Event::Shutdown => {}
        }
    }

    // === Transitions ===

    /// Acceptance: a candidate becomes the current record iff its code is
    /// unused and it is fresher than the current record (or a fresh code is
    /// being waited for after a failure). Everything else is dropped, never
    /// queued.
    fn handle_code_found(&mut self, code: String, ts: Option<DateTime<Utc>>) -> bool {
        let code = code.trim().to_string();

        if self.used_codes.contains(&code) {
            debug!(code = %code, "ignoring already used code");
            self.notify_drop(code, DropReason::AlreadyUsed);
            return false;
        }

        if self.state.waiting_for_fresh_code
            && self.state.last_failed_code.as_deref() == Some(code.as_str())
        {
            debug!(code = %code, "ignoring the code that just failed");
            self.notify_drop(code, DropReason::SameAsFailed);
            return false;
        }

        if let Some(episode) = self.episode.as_mut() {
            if !episode.note_seen(&code, ts) {
                debug!(code = %code, "duplicate observation ignored");
                self.notify_drop(code, DropReason::Duplicate);
                return false;
            }
        }

        let accept = match &self.record {
            None => true,
            Some(current) => current.superseded_by(ts) || self.state.waiting_for_fresh_code,
        };
        if !accept {
            info!(code = %code, "dropping stale candidate");
            self.notify_drop(code, DropReason::Stale);
            return false;
        }

        let was_waiting_fresh = self.state.waiting_for_fresh_code;
        self.state.waiting_for_fresh_code = false;
        self.state.last_failed_code = None;

        if self.episode.is_none() {
            let mut episode = Episode::new();
            episode.note_seen(&code, ts);
            self.episode = Some(episode);
        }
        self.record = Some(OtpRecord::new(code.clone(), ts));
        self.persist_snapshot_and_codes();

        info!(code = %code, source_timestamp = ?ts, "accepted new current code");
        self.notify(Notice::CodeAccepted {
            code,
            source_timestamp: ts,
        });

        if (self.state.waiting_for_code || was_waiting_fresh) && self.state.enabled {
            self.dispatch_delivery(was_waiting_fresh);
        }
        true
    }

    fn handle_need_code(&mut self, manual: bool, consumer: Option<crate::channel::ContextRef>) {
        if let Some(ctx) = consumer {
            self.state.consumer_ctx = Some(ctx);
        }
        if !self.state.enabled {
            debug!(manual, "ignoring code request while disabled");
            return;
        }

        info!(manual, "consumer requested a code");
        self.state.waiting_for_code = true;
        if self.episode.is_none() {
            self.episode = Some(Episode::new());
        }
        self.phase = Phase::AwaitingCode;

        let now = Utc::now();
        let reusable = self
            .record
            .as_ref()
            .map(|r| {
                r.valid
                    && !r.older_than(now, self.config.reuse_window)
                    && !self.used_codes.contains(&r.code)
            })
            .unwrap_or(false);
        if reusable {
            self.dispatch_delivery(false);
            return;
        }

        // Nothing usable on hand: drop it and ask the source for a scan.
        self.record = None;
        self.persist_snapshot_and_codes();
        self.trigger_source(OutboundMessage::RequestScan);
    }

    fn handle_code_rejected(&mut self, failed_code: String) {
        let failed = failed_code.trim().to_string();
        info!(code = %failed, "delivered code was rejected, waiting for a fresh one");

        self.used_codes.insert(failed.clone());
        self.state.last_failed_code = Some(failed.clone());
        self.state.waiting_for_fresh_code = true;
        self.state.waiting_for_code = true;
        if let Some(record) = self.record.as_mut() {
            record.valid = false;
        }
        if self.episode.is_none() {
            self.episode = Some(Episode::new());
        }
        self.phase = Phase::WaitingForFreshCode;
        self.persist_snapshot_and_codes();

        self.notify(Notice::CodeRejected {
            code: failed.clone(),
        });
        self.trigger_source(OutboundMessage::AwaitFreshCode {
            failed_code: failed,
        });
    }

    fn handle_login_succeeded(&mut self, code: String, timestamp: DateTime<Utc>) {
        // Duplicate success notifications land here after the first one
        // already cleared everything.
        if self.episode.is_none() && self.phase == Phase::Idle && self.record.is_none() {
            debug!("duplicate success notification ignored");
            return;
        }

        info!(code = %code, at = %timestamp, "login succeeded, clearing state");
        if let Some(episode) = self.episode.take() {
            episode.cancel.cancel();
        }
        self.phase = Phase::Idle;
        self.record = None;
        self.used_codes.clear();
        self.state.waiting_for_code = false;
        self.state.waiting_for_fresh_code = false;
        self.state.last_failed_code = None;
        self.persist_snapshot_and_codes();

        self.notify(Notice::LoginSucceeded);
        self.trigger_source(OutboundMessage::CloseContexts);

        // Restore defaults only after the grace window, so a duplicate
        // success or a trailing result report can't race the reset.
        self.reset_generation += 1;
        let generation = self.reset_generation;
        let grace = self.config.success_grace;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(Event::GraceElapsed { generation }).await;
        });
    }

    fn handle_grace_elapsed(&mut self, generation: u64) {
        // A newer episode may have started during the grace window.
        if generation != self.reset_generation || self.phase != Phase::Idle {
            return;
        }
        self.state = AutomationState::from_config(AutomationConfig::default());
        self.persist_automation();
        debug!("automation state reset to defaults");
        self.notify(Notice::StateReset);
    }

    fn handle_clear_state(&mut self) {
        info!("explicit state clear");
        if let Some(episode) = self.episode.take() {
            episode.cancel.cancel();
        }
        self.phase = Phase::Idle;
        self.record = None;
        self.used_codes.clear();
        self.state.waiting_for_code = false;
        self.state.waiting_for_fresh_code = false;
        self.state.last_failed_code = None;
        self.persist_snapshot_and_codes();
    }

    fn handle_delivery_finished(&mut self, episode: uuid::Uuid, outcome: DeliveryOutcome) {
        let current = matches!(&self.episode, Some(e) if e.id == episode);
        if !current {
            debug!("delivery outcome for a superseded episode ignored");
            return;
        }

        match outcome {
            DeliveryOutcome::Delivered(ack) => {
                debug!(success = ack.success, "fill acknowledged by consumer");
                if self.phase == Phase::Delivering {
                    self.phase = Phase::AwaitingResult;
                }
            }
            DeliveryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                // The code may still be valid once the consumer context
                // recovers, so the episode stays put awaiting a manual
                // retry or a result report.
                warn!(attempts, error = %last_error, "delivery exhausted");
                if self.phase == Phase::Delivering {
                    self.phase = Phase::AwaitingResult;
                }
                self.notify(Notice::DeliveryExhausted { attempts });
            }
            DeliveryOutcome::Cancelled => {}
        }
    }

    fn sweep_expired(&mut self) {
        let now = Utc::now();
        let expired = self
            .record
            .as_ref()
            .map(|r| r.older_than(now, self.config.expiry))
            .unwrap_or(false);
        if !expired {
            return;
        }

        info!("current code exceeded its lifetime, wiping state");
        if let Some(episode) = self.episode.take() {
            episode.cancel.cancel();
        }
        self.phase = Phase::Idle;
        self.record = None;
        // Used codes survive expiry; only success or an explicit clear
        // resets them.
        self.state.waiting_for_code = false;
        self.state.waiting_for_fresh_code = false;
        if let Err(e) = self.store.clear_snapshot() {
            warn!(error = %e, "failed to clear persisted snapshot");
        }
        self.notify(Notice::StateExpired);
    }

    // === Effects ===

    fn dispatch_delivery(&mut self, is_retry: bool) {
        let record = match &self.record {
            Some(r) => r.clone(),
            None => return,
        };
        let (episode_id, cancel) = match &self.episode {
            Some(e) => (e.id, e.cancel.clone()),
            None => return,
        };

        self.state.waiting_for_code = false;
        self.phase = Phase::Delivering;
        self.notify(Notice::FillDispatched {
            code: record.code.clone(),
            is_retry,
        });

        let channel = Arc::clone(&self.channel);
        let tx = self.events_tx.clone();
        let ctx = self.state.consumer_ctx.clone();
        let policy = self.config.retry;
        let message = OutboundMessage::FillCode {
            code: record.code,
            is_retry,
            attempt: 0,
        };
        tokio::spawn(async move {
            let outcome = deliver_with_retry(
                channel.as_ref(),
                Target::Consumer,
                ctx.as_ref(),
                message,
                policy,
                &cancel,
            )
            .await;
            let _ = tx
                .send(Event::DeliveryFinished {
                    episode: episode_id,
                    outcome,
                })
                .await;
        });
    }

    /// Single-shot message to the source context. Failures are logged, not
    /// retried: the next poll or request will try again anyway.
    fn trigger_source(&self, message: OutboundMessage) {
        let channel = Arc::clone(&self.channel);
        let tx = self.events_tx.clone();
        let ctx = self.state.source_ctx.clone();
        let had_ctx = ctx.is_some();
        tokio::spawn(async move {
            let resolved = match ctx {
                Some(c) => Ok(c),
                None => channel.ensure_context(Target::Source).await,
            };
            match resolved {
                Ok(c) => {
                    if !had_ctx {
                        let _ = tx
                            .send(Event::ContextResolved {
                                target: Target::Source,
                                ctx: c.clone(),
                            })
                            .await;
                    }
                    if let Err(e) = channel.send(&c, message).await {
                        warn!(error = %e, "source trigger failed");
                    }
                }
                Err(e) => warn!(error = %e, "no source context available"),
            }
        });
    }

    fn notify(&self, notice: Notice) {
        // No receivers is fine; notices are advisory.
        let _ = self.notices.send(notice);
    }

    fn notify_drop(&self, code: String, reason: DropReason) {
        self.notify(Notice::CandidateDropped { code, reason });
    }

    fn persist_snapshot_and_codes(&self) {
        if let Err(e) = self
            .store
            .save_snapshot_and_codes(self.record.as_ref(), &self.used_codes)
        {
            warn!(error = %e, "failed to persist OTP state");
        }
    }

    fn persist_automation(&self) {
        if let Err(e) = self.store.save_automation(&self.state.config()) {
            warn!(error = %e, "failed to persist automation config");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Ack, ChannelResult, ContextRef};
    use crate::storage::{OpenStore, SqliteStore};
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// Channel that acknowledges everything and remembers nothing.
    struct NullChannel;

    #[async_trait]
    impl DeliveryChannel for NullChannel {
        async fn send(&self, _ctx: &ContextRef, _message: OutboundMessage) -> ChannelResult<Ack> {
            Ok(Ack::ok())
        }
        async fn ensure_context(&self, target: Target) -> ChannelResult<ContextRef> {
            Ok(ContextRef::new(match target {
                Target::Source => "source-1",
                Target::Consumer => "consumer-1",
            }))
        }
    }

    fn spawn_coordinator() -> CoordinatorHandle {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let coordinator =
            Coordinator::new(Arc::new(NullChannel), store, CoordinatorConfig::default()).unwrap();
        coordinator.spawn()
    }

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn first_candidate_is_accepted() {
        let handle = spawn_coordinator();
        assert!(handle.code_found("483920", Some(ts(0))).await.unwrap());
    }

    #[tokio::test]
    async fn older_candidate_is_dropped() {
        let handle = spawn_coordinator();
        assert!(handle.code_found("483920", Some(ts(5))).await.unwrap());
        assert!(!handle.code_found("774401", Some(ts(4))).await.unwrap());
        assert!(!handle.code_found("774401", Some(ts(5))).await.unwrap());
        assert!(handle.code_found("774401", Some(ts(6))).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_timestamp_never_displaces_known() {
        let handle = spawn_coordinator();
        assert!(handle.code_found("483920", Some(ts(5))).await.unwrap());
        assert!(!handle.code_found("774401", None).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_observation_is_ignored_within_episode() {
        let handle = spawn_coordinator();
        handle.need_code(false, None).await.unwrap();
        assert!(handle.code_found("483920", Some(ts(0))).await.unwrap());
        assert!(!handle.code_found("483920", Some(ts(0))).await.unwrap());
    }

    #[tokio::test]
    async fn set_state_merges_and_returns_full_state() {
        let handle = spawn_coordinator();
        let state = handle
            .set_state(StatePatch {
                enabled: Some(false),
                auto_submit_enabled: None,
            })
            .await
            .unwrap();
        assert!(!state.enabled);
        assert!(state.auto_submit_enabled);

        let state = handle.get_state().await.unwrap();
        assert!(!state.enabled);
    }

    #[tokio::test]
    async fn disabled_coordinator_ignores_requests() {
        let handle = spawn_coordinator();
        handle
            .set_state(StatePatch {
                enabled: Some(false),
                auto_submit_enabled: None,
            })
            .await
            .unwrap();
        handle.need_code(false, None).await.unwrap();
        let state = handle.get_state().await.unwrap();
        assert!(!state.waiting_for_code);
    }

    #[tokio::test]
    async fn clear_state_forgets_used_codes() {
        let handle = spawn_coordinator();
        handle.code_rejected("111222").await.unwrap();
        // Rejected code is refused while the set holds it.
        assert!(!handle.code_found("111222", Some(ts(1))).await.unwrap());

        assert!(handle.clear_state().await.unwrap());
        assert!(handle.code_found("111222", Some(ts(2))).await.unwrap());
    }
}
