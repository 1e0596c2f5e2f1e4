//! Shared test utilities: a scriptable mock channel and coordinator harness.
#![allow(dead_code)]

use async_trait::async_trait;
use otpflow::{
    Ack, ChannelError, ChannelResult, ContextRef, Coordinator, CoordinatorConfig,
    CoordinatorHandle, DeliveryChannel, OpenStore, OutboundMessage, RetryPolicy, SqliteStore,
    StateStore, Target,
};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One message as observed by the mock channel.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub ctx: ContextRef,
    pub message: OutboundMessage,
    pub at: tokio::time::Instant,
}

/// In-memory channel that records every send and can be scripted to fail
/// fill deliveries.
pub struct MockChannel {
    sent: Mutex<Vec<SentMessage>>,
    fill_failures: AtomicU32,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fill_failures: AtomicU32::new(0),
        })
    }

    /// Fail the next `n` fill sends with a channel error.
    pub fn fail_next_fills(&self, n: u32) {
        self.fill_failures.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fills(&self) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s.message, OutboundMessage::FillCode { .. }))
            .collect()
    }

    pub fn fill_codes(&self) -> Vec<String> {
        self.fills()
            .into_iter()
            .map(|s| match s.message {
                OutboundMessage::FillCode { code, .. } => code,
                _ => unreachable!(),
            })
            .collect()
    }

    pub fn scan_requests(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s.message, OutboundMessage::RequestScan))
            .count()
    }

    pub fn await_fresh_codes(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s.message {
                OutboundMessage::AwaitFreshCode { failed_code } => Some(failed_code),
                _ => None,
            })
            .collect()
    }

    pub fn close_requests(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s.message, OutboundMessage::CloseContexts))
            .count()
    }
}

#[async_trait]
impl DeliveryChannel for MockChannel {
    async fn send(&self, ctx: &ContextRef, message: OutboundMessage) -> ChannelResult<Ack> {
        let is_fill = matches!(message, OutboundMessage::FillCode { .. });
        self.sent.lock().unwrap().push(SentMessage {
            ctx: ctx.clone(),
            message,
            at: tokio::time::Instant::now(),
        });
        if is_fill {
            let remaining = self.fill_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fill_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ChannelError::Unreachable(ctx.clone()));
            }
        }
        Ok(Ack::ok())
    }

    async fn ensure_context(&self, target: Target) -> ChannelResult<ContextRef> {
        Ok(ContextRef::new(match target {
            Target::Source => "source-1",
            Target::Consumer => "consumer-1",
        }))
    }
}

pub struct Harness {
    pub channel: Arc<MockChannel>,
    pub handle: CoordinatorHandle,
}

pub fn spawn_with_config(config: CoordinatorConfig) -> Harness {
    let store: Arc<dyn StateStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    spawn_with(config, store)
}

pub fn spawn_with(config: CoordinatorConfig, store: Arc<dyn StateStore>) -> Harness {
    let channel = MockChannel::new();
    let dyn_channel: Arc<dyn DeliveryChannel> = channel.clone();
    let coordinator = Coordinator::new(dyn_channel, store, config).unwrap();
    Harness {
        channel,
        handle: coordinator.spawn(),
    }
}

pub fn spawn_on_disk(config: CoordinatorConfig, path: &Path) -> Harness {
    let store: Arc<dyn StateStore> = Arc::new(SqliteStore::open(path).unwrap());
    spawn_with(config, store)
}

/// Millisecond-scale windows so lifecycle tests run in real time.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        reuse_window: Duration::from_secs(10),
        expiry: Duration::from_secs(60),
        expiry_sweep_interval: Duration::from_millis(25),
        success_grace: Duration::from_millis(40),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
    }
}

/// Poll until `pred` holds or the deadline passes. Returns whether it held.
pub async fn wait_until(deadline: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    loop {
        if pred() {
            return true;
        }
        if start.elapsed() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
