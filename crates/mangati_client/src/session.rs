//! crates/mangati_client/src/session.rs
//!
//! The session manager: the single owner of the current token.
//!
//! Token refresh is single-flight. The first caller that needs a refresh sets
//! the in-flight flag and performs it; everyone arriving meanwhile parks a
//! oneshot sender in the waiter list and resumes with the same outcome. A
//! background timer refreshes the token `refresh_margin` before it expires and
//! is cancelled whenever the session is replaced or cleared.
//!
//! Every store or clear bumps a generation counter. A refresh remembers the
//! generation it started from and discards its result if the session changed
//! underneath it, so a logout during a refresh stays a logout.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::storage::{SessionStore, StoredSession, UserProfile};
use crate::token;

/// Exchanges a still-valid token for a fresh session.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, token: &str) -> Result<StoredSession, ClientError>;
}

type RefreshOutcome = Result<String, String>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Held by the caller performing a refresh. Dropping it without `finish`
/// (the future was cancelled) releases the flag and fails the waiters.
struct InFlight<'a> {
    state: &'a Mutex<RefreshState>,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, outcome: &RefreshOutcome) {
        self.finished = true;
        for waiter in self.release() {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn release(&self) -> Vec<oneshot::Sender<RefreshOutcome>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        std::mem::take(&mut state.waiters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Dropped senders make every waiter fail with "refresh abandoned".
            drop(self.release());
        }
    }
}

pub struct SessionManager {
    persisted: SessionStore,
    refresher: Option<Arc<dyn TokenRefresher>>,
    expiry_buffer: Duration,
    refresh_margin: Duration,
    refresh: Mutex<RefreshState>,
    /// Held while the persisted session changes.
    generation: Mutex<u64>,
    timer: Mutex<Option<CancellationToken>>,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        store: SessionStore,
        refresher: Option<Arc<dyn TokenRefresher>>,
        expiry_buffer: Duration,
        refresh_margin: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            persisted: store,
            refresher,
            expiry_buffer,
            refresh_margin,
            refresh: Mutex::new(RefreshState::default()),
            generation: Mutex::new(0),
            timer: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Picks up a session left in storage by a previous run and arms the timer.
    pub fn resume(&self) -> Option<UserProfile> {
        let session = self.persisted.load()?;
        if token::is_expired(&session.token, Utc::now(), self.expiry_buffer) {
            debug!("Stored session has expired; dropping it");
            self.clear();
            return None;
        }
        self.schedule_refresh(&session.token);
        Some(session.user)
    }

    pub fn store(&self, session: &StoredSession) -> Result<(), ClientError> {
        let mut generation = self.lock_generation();
        self.persisted.save(session)?;
        *generation += 1;
        self.schedule_refresh(&session.token);
        Ok(())
    }

    pub fn clear(&self) {
        let mut generation = self.lock_generation();
        *generation += 1;
        self.cancel_timer();
        self.persisted.clear();
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.persisted.load().map(|s| s.user)
    }

    pub fn remember_redirect(&self, path: &str) {
        self.persisted.set_redirect(path);
    }

    pub fn take_redirect(&self) -> Option<String> {
        self.persisted.take_redirect()
    }

    /// The token to attach to the next request, if it is still good locally.
    pub fn current_token(&self) -> Option<String> {
        self.persisted
            .load()
            .map(|s| s.token)
            .filter(|t| !token::is_expired(t, Utc::now(), self.expiry_buffer))
    }

    /// Like `current_token`, but refreshes first when the token is inside the
    /// refresh margin. An expired token is not refreshed; the request simply
    /// goes out without credentials.
    pub async fn bearer(&self) -> Result<Option<String>, ClientError> {
        let Some(current) = self.current_token() else {
            return Ok(None);
        };
        let due = token::refresh_due_at(&current, self.refresh_margin)
            .map_or(true, |due| Utc::now() >= due);
        if self.refresher.is_some() && due {
            return self.refresh_now().await.map(Some);
        }
        Ok(Some(current))
    }

    /// Refreshes the session, joining a refresh already in flight.
    pub async fn refresh_now(&self) -> Result<String, ClientError> {
        let waiter = {
            let mut state = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            return match rx.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(message)) => Err(ClientError::RefreshFailed(message)),
                Err(_) => Err(ClientError::RefreshFailed("refresh abandoned".to_string())),
            };
        }

        let guard = InFlight {
            state: &self.refresh,
            finished: false,
        };
        let outcome = self.perform_refresh().await.map_err(|e| e.to_string());
        guard.finish(&outcome);
        outcome.map_err(ClientError::RefreshFailed)
    }

    async fn perform_refresh(&self) -> Result<String, ClientError> {
        let refresher = self
            .refresher
            .as_ref()
            .ok_or_else(|| ClientError::RefreshFailed("no refresh endpoint".to_string()))?;
        let (started, current) = {
            let generation = self.lock_generation();
            let current = self
                .persisted
                .load()
                .ok_or_else(|| ClientError::RefreshFailed("no session".to_string()))?;
            (*generation, current)
        };

        let result = refresher.refresh(&current.token).await;

        let mut generation = self.lock_generation();
        if *generation != started {
            debug!("Session changed during refresh; discarding the result");
            return Err(ClientError::RefreshFailed(
                "session changed during refresh".to_string(),
            ));
        }
        match result {
            Ok(session) => {
                self.persisted.save(&session)?;
                *generation += 1;
                self.schedule_refresh(&session.token);
                info!("Refreshed session for {}", session.user.username);
                Ok(session.token)
            }
            Err(e) => {
                warn!("Session refresh failed, signing out: {}", e);
                *generation += 1;
                self.cancel_timer();
                self.persisted.clear();
                Err(e)
            }
        }
    }

    fn cancel_timer(&self) {
        let previous = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn schedule_refresh(&self, token: &str) {
        self.cancel_timer();
        if self.refresher.is_none() {
            return;
        }
        let due = match token::refresh_due_at(token, self.refresh_margin) {
            Ok(due) => due,
            Err(e) => {
                warn!("Not scheduling a refresh for an unreadable token: {}", e);
                return;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime; proactive refresh disabled");
            return;
        };

        let delay = (due - Utc::now())
            .to_std()
            .unwrap_or_default();
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let manager = self.this.clone();
        debug!("Session refresh scheduled in {:?}", delay);

        runtime.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(manager) = manager.upgrade() {
                        if let Err(e) = manager.refresh_now().await {
                            warn!("Scheduled refresh failed: {}", e);
                        }
                    }
                }
            }
        });

        *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::token::tests::{fake_token, fake_token_issued};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
        lifetime: Duration,
        latency: std::time::Duration,
    }

    impl CountingRefresher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                lifetime: Duration::hours(4),
                latency: std::time::Duration::from_millis(50),
            })
        }

        /// Hands out tokens that live for `lifetime` from the moment of refresh.
        fn issuing(lifetime: Duration, latency: std::time::Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                lifetime,
                latency,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _token: &str) -> Result<StoredSession, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(ClientError::Status {
                    status: 401,
                    message: "Authentication required".to_string(),
                });
            }
            let now = Utc::now();
            Ok(session_with(fake_token_issued(now, now + self.lifetime)))
        }
    }

    fn session_expiring_in(lifetime: Duration) -> StoredSession {
        session_with(fake_token(Utc::now() + lifetime))
    }

    fn session_with(token: String) -> StoredSession {
        StoredSession {
            token,
            user: UserProfile {
                id: Uuid::new_v4(),
                username: "hana".to_string(),
                email: "hana@mangati.app".to_string(),
                roles: vec!["Writer".to_string()],
                created_at: Utc::now(),
            },
        }
    }

    fn manager(refresher: Option<Arc<CountingRefresher>>) -> Arc<SessionManager> {
        SessionManager::new(
            SessionStore::new(Arc::new(MemoryStorage::new())),
            refresher.map(|r| r as Arc<dyn TokenRefresher>),
            Duration::seconds(30),
            Duration::minutes(2),
        )
    }

    #[tokio::test]
    async fn expired_token_is_not_offered() {
        let session = manager(None);
        session
            .store(&session_expiring_in(Duration::seconds(-10)))
            .unwrap();
        assert_eq!(session.current_token(), None);
        assert_eq!(session.bearer().await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_call() {
        let refresher = CountingRefresher::new(false);
        let session = manager(Some(refresher.clone()));
        let original = session_expiring_in(Duration::hours(1));
        session.store(&original).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move { session.refresh_now().await }));
        }
        let mut tokens = Vec::new();
        for task in tasks {
            tokens.push(task.await.unwrap().unwrap());
        }

        assert_eq!(refresher.calls(), 1);
        assert!(tokens.iter().all(|t| *t == tokens[0]));
        assert_ne!(tokens[0], original.token);
        assert_eq!(session.current_token().as_deref(), Some(tokens[0].as_str()));
    }

    #[tokio::test]
    async fn failed_refresh_fails_every_waiter_and_signs_out() {
        let refresher = CountingRefresher::new(true);
        let session = manager(Some(refresher.clone()));
        session.store(&session_expiring_in(Duration::hours(1))).unwrap();

        let (a, b) = tokio::join!(session.refresh_now(), session.refresh_now());
        assert!(matches!(a, Err(ClientError::RefreshFailed(_))));
        assert!(matches!(b, Err(ClientError::RefreshFailed(_))));
        assert_eq!(refresher.calls(), 1);
        assert_eq!(session.user(), None);
    }

    #[tokio::test]
    async fn token_inside_margin_is_refreshed_before_use() {
        let refresher = CountingRefresher::new(false);
        let session = manager(Some(refresher.clone()));
        let near_expiry = session_expiring_in(Duration::seconds(90));
        session.store(&near_expiry).unwrap();

        let bearer = session.bearer().await.unwrap().unwrap();
        assert_ne!(bearer, near_expiry.token);
        assert!(refresher.calls() >= 1);
    }

    #[tokio::test]
    async fn timer_refreshes_ahead_of_expiry() {
        let refresher = CountingRefresher::new(false);
        let session = manager(Some(refresher.clone()));
        // Already inside the margin, so the timer fires immediately.
        session
            .store(&session_expiring_in(Duration::seconds(100)))
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn clearing_cancels_the_timer() {
        let refresher = CountingRefresher::new(false);
        let session = manager(Some(refresher.clone()));
        // Due within a second.
        session
            .store(&session_expiring_in(Duration::minutes(2) + Duration::seconds(1)))
            .unwrap();
        session.clear();

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn logout_during_refresh_stays_logged_out() {
        let refresher =
            CountingRefresher::issuing(Duration::hours(4), std::time::Duration::from_millis(100));
        let session = manager(Some(refresher.clone()));
        session.store(&session_expiring_in(Duration::hours(1))).unwrap();

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.refresh_now().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        session.clear();

        let outcome = pending.await.unwrap();
        assert!(matches!(outcome, Err(ClientError::RefreshFailed(_))));
        assert_eq!(refresher.calls(), 1);
        assert_eq!(session.user(), None);
        assert_eq!(session.current_token(), None);
    }

    #[tokio::test]
    async fn login_during_refresh_is_kept() {
        let refresher =
            CountingRefresher::issuing(Duration::hours(4), std::time::Duration::from_millis(100));
        let session = manager(Some(refresher.clone()));
        session.store(&session_expiring_in(Duration::hours(1))).unwrap();

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.refresh_now().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let fresh = session_expiring_in(Duration::hours(2));
        session.store(&fresh).unwrap();

        assert!(pending.await.unwrap().is_err());
        assert_eq!(session.current_token(), Some(fresh.token));
    }

    #[tokio::test]
    async fn short_lived_tokens_do_not_refresh_in_a_loop() {
        // Shorter than the two-minute margin.
        let refresher =
            CountingRefresher::issuing(Duration::seconds(60), std::time::Duration::from_millis(1));
        let session = manager(Some(refresher.clone()));
        let now = Utc::now();
        let issued = session_with(fake_token_issued(now, now + Duration::seconds(60)));
        session.store(&issued).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(refresher.calls(), 0);

        let bearer = session.bearer().await.unwrap();
        assert_eq!(bearer, Some(issued.token));
        assert_eq!(refresher.calls(), 0);
    }
}
