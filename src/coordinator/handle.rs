//! Handle for talking to a running coordinator
//!
//! The handle is the message surface adapters use: each method maps to one
//! inbound message. Cloneable; all clones feed the same coordinator task.

use super::events::{Event, Notice};
use super::state::{AutomationState, StatePatch};
use crate::channel::ContextRef;
use crate::extract::OtpCandidate;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Errors from handle operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The coordinator task has shut down.
    #[error("coordinator is no longer running")]
    Closed,
}

/// Cloneable handle to a spawned [`Coordinator`](super::Coordinator).
#[derive(Clone)]
pub struct CoordinatorHandle {
    pub(crate) events: mpsc::Sender<Event>,
    pub(crate) notices: broadcast::Sender<Notice>,
}

impl CoordinatorHandle {
    async fn send(&self, event: Event) -> Result<(), CoordinatorError> {
        self.events
            .send(event)
            .await
            .map_err(|_| CoordinatorError::Closed)
    }

    /// Report an extracted candidate. Returns whether it was accepted as
    /// the new current record.
    pub async fn code_found(
        &self,
        code: impl Into<String>,
        source_timestamp: Option<DateTime<Utc>>,
    ) -> Result<bool, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::CodeFound {
            code: code.into(),
            source_timestamp,
            reply,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Report an extracted candidate by value.
    pub async fn report_candidate(
        &self,
        candidate: OtpCandidate,
    ) -> Result<bool, CoordinatorError> {
        self.code_found(candidate.code, candidate.source_timestamp)
            .await
    }

    /// The consumer needs a code. Delivery follows asynchronously.
    pub async fn need_code(
        &self,
        manual: bool,
        consumer: Option<ContextRef>,
    ) -> Result<(), CoordinatorError> {
        self.send(Event::NeedCode { manual, consumer }).await
    }

    /// The consumer rejected a delivered code.
    pub async fn code_rejected(
        &self,
        failed_code: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        self.send(Event::CodeRejected {
            failed_code: failed_code.into(),
        })
        .await
    }

    /// The consumer completed the login with the given code.
    pub async fn login_succeeded(
        &self,
        code: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), CoordinatorError> {
        self.send(Event::LoginSucceeded {
            code: code.into(),
            timestamp,
        })
        .await
    }

    /// Read the full automation state.
    pub async fn get_state(&self) -> Result<AutomationState, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::GetState { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Merge a partial update into the automation state; returns the full
    /// updated state.
    pub async fn set_state(
        &self,
        patch: StatePatch,
    ) -> Result<AutomationState, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::SetState { patch, reply }).await?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Ask the coordinator to close source-side contexts.
    pub async fn force_cleanup(
        &self,
        reason: impl Into<String>,
    ) -> Result<bool, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::ForceCleanup {
            reason: reason.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Explicitly wipe the current record and the used-code set.
    pub async fn clear_state(&self) -> Result<bool, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::ClearState { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Subscribe to status notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Stop the coordinator task. Best effort.
    pub async fn shutdown(&self) {
        let _ = self.events.send(Event::Shutdown).await;
    }
}
