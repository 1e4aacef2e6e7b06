//! Best-effort notification of authentication events.
//!
//! Recording must never block or fail the operation that produced the event.
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::auth::claims::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    LoginSucceeded,
    LoginFailed,
    TokenIssued,
    TokenValidated,
    ValidationFailed,
    TokenInvalidated,
    SessionsInvalidated,
    TokenRefreshed,
    RefreshFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_kind: Option<TokenKind>,
    // Internal failure reason; never sent to clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind) -> Self {
        Self {
            kind,
            at: Utc::now(),
            principal_id: None,
            application_id: None,
            token_kind: None,
            reason: None,
            count: None,
        }
    }

    pub fn scope(mut self, principal_id: Uuid, application_id: Uuid) -> Self {
        self.principal_id = Some(principal_id);
        self.application_id = Some(application_id);
        self
    }

    pub fn principal(mut self, principal_id: Uuid) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    pub fn token_kind(mut self, kind: TokenKind) -> Self {
        self.token_kind = Some(kind);
        self
    }

    pub fn reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuthEvent);
}

/// Writes events as structured log lines under the `audit` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuthEvent) {
        info!(
            target: "audit",
            kind = ?event.kind,
            principal_id = ?event.principal_id,
            application_id = ?event.application_id,
            token_kind = ?event.token_kind,
            reason = event.reason.unwrap_or(""),
            count = event.count.unwrap_or(0),
            "auth event"
        );
    }
}

/// Hands events to an external consumer over a bounded channel.
///
/// When the consumer falls behind, events are dropped rather than waited on.
#[derive(Clone, Debug)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuthEvent>,
}

impl ChannelAuditSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuthEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuthEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "dropping audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_delivers_events() {
        let (sink, mut rx) = ChannelAuditSink::new(4);
        let user = Uuid::new_v4();

        sink.record(AuthEvent::new(AuthEventKind::TokenInvalidated).principal(user));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::TokenInvalidated);
        assert_eq!(event.principal_id, Some(user));
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (sink, mut rx) = ChannelAuditSink::new(1);

        sink.record(AuthEvent::new(AuthEventKind::LoginSucceeded));
        sink.record(AuthEvent::new(AuthEventKind::LoginFailed));

        assert_eq!(rx.recv().await.unwrap().kind, AuthEventKind::LoginSucceeded);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_is_ignored() {
        let (sink, rx) = ChannelAuditSink::new(1);
        drop(rx);
        sink.record(AuthEvent::new(AuthEventKind::TokenIssued).reason("x").count(1));
    }

    #[test]
    fn events_serialize_without_empty_fields() {
        let json = serde_json::to_value(
            AuthEvent::new(AuthEventKind::ValidationFailed).reason("expired"),
        )
        .unwrap();
        assert_eq!(json["kind"], "validation_failed");
        assert_eq!(json["reason"], "expired");
        assert!(json.get("principal_id").is_none());
    }
}
