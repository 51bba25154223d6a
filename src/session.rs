use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, postgres::PgListener};
use tokio::{
    sync::{RwLock, broadcast, broadcast::error::RecvError},
    task::JoinHandle,
};
use uuid::Uuid;

/// Postgres NOTIFY channel carrying JSON-encoded `SessionEvent`s. The
/// `user_roles` trigger and the identity provider's webhooks publish here.
pub const SESSION_EVENTS_CHANNEL: &str = "campus_session_events";

/// Longest lifetime the identity provider allows for an access token. A
/// revocation older than this can no longer match a token that validates.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

const EVENT_BUFFER: usize = 256;
const LISTENER_RETRY: Duration = Duration::from_secs(5);

/// SessionEvent
///
/// A change to an identity's session or role set.
/// Wire form: `{"event":"signed_out","user_id":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn { user_id: Uuid },
    SignedOut { user_id: Uuid },
    RolesChanged { user_id: Uuid },
}

impl SessionEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            SessionEvent::SignedIn { user_id }
            | SessionEvent::SignedOut { user_id }
            | SessionEvent::RolesChanged { user_id } => *user_id,
        }
    }
}

/// Decodes a NOTIFY payload, logging and discarding anything malformed.
pub fn parse_notification(payload: &str) -> Option<SessionEvent> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(payload, error = %e, "ignoring malformed session event");
            None
        }
    }
}

/// SessionEvents
///
/// Process-wide fan-out of session changes, held in `AppState` and cloned into
/// whoever needs it. Also remembers, per identity, the newest token issue time
/// that has been signed out, so that token and older ones are refused.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
    revoked_through: Arc<RwLock<HashMap<Uuid, i64>>>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sender,
            revoked_through: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Broadcasts `event` to every watcher.
    ///
    /// A `SignedOut` without a known token (e.g. from the provider) revokes
    /// tokens issued in earlier seconds only, so a token issued right after
    /// the sign-out stays valid. `SignedIn` lifts any revocation.
    pub async fn publish(&self, event: SessionEvent) {
        match &event {
            SessionEvent::SignedOut { user_id } => {
                self.revoke(*user_id, Utc::now().timestamp() - 1).await;
            }
            SessionEvent::SignedIn { user_id } => {
                self.revoked_through.write().await.remove(user_id);
            }
            SessionEvent::RolesChanged { .. } => {}
        }

        if self.sender.send(event).is_err() {
            tracing::trace!("session event published with no active watchers");
        }
    }

    /// Refuses every token of `user_id` issued at or before `issued_at`
    /// (unix seconds). Revocations past `MAX_TOKEN_LIFETIME_SECS` are dropped.
    pub async fn revoke(&self, user_id: Uuid, issued_at: i64) {
        let horizon = Utc::now().timestamp() - MAX_TOKEN_LIFETIME_SECS;
        let mut revoked = self.revoked_through.write().await;

        let through = revoked.entry(user_id).or_insert(issued_at);
        *through = (*through).max(issued_at);
        revoked.retain(|_, through| *through > horizon);
    }

    /// True when a token issued at `issued_at` (unix seconds) has been signed out.
    pub async fn is_revoked(&self, user_id: Uuid, issued_at: i64) -> bool {
        self.revoked_through
            .read()
            .await
            .get(&user_id)
            .is_some_and(|&through| issued_at <= through)
    }

    /// Starts watching one identity. Open the watch before issuing reads so no
    /// event published in between is missed.
    pub fn watch(&self, user_id: Uuid) -> SessionWatch {
        SessionWatch {
            user_id,
            receiver: self.sender.subscribe(),
        }
    }
}

/// SessionWatch
///
/// Subscription to the session changes of a single identity.
pub struct SessionWatch {
    user_id: Uuid,
    receiver: broadcast::Receiver<SessionEvent>,
}

impl SessionWatch {
    /// Completes at the next sign-out or role change of the watched identity.
    /// A lagged receiver reports `RolesChanged` so the caller resolves again
    /// instead of trusting a possibly stale role set. Never completes once every
    /// publisher is gone.
    pub async fn changed(&mut self) -> SessionEvent {
        loop {
            match self.receiver.recv().await {
                Ok(SessionEvent::SignedIn { .. }) => continue,
                Ok(event) if event.user_id() == self.user_id => return event,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, user_id = %self.user_id, "session watch lagged");
                    return SessionEvent::RolesChanged {
                        user_id: self.user_id,
                    };
                }
                Err(RecvError::Closed) => return std::future::pending().await,
            }
        }
    }
}

/// spawn_session_listener
///
/// Runs the single `LISTEN` subscription feeding `events`. Connection errors are
/// logged and the subscription is re-established after a pause.
pub fn spawn_session_listener(pool: PgPool, events: SessionEvents) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = listen(&pool, &events).await {
                tracing::error!("session listener error: {:?}", e);
            }
            tokio::time::sleep(LISTENER_RETRY).await;
        }
    })
}

async fn listen(pool: &PgPool, events: &SessionEvents) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(SESSION_EVENTS_CHANNEL).await?;
    tracing::info!(channel = SESSION_EVENTS_CHANNEL, "listening for session events");

    loop {
        let notification = listener.recv().await?;
        if let Some(event) = parse_notification(notification.payload()) {
            tracing::info!(?event, "session event received");
            events.publish(event).await;
        }
    }
}
