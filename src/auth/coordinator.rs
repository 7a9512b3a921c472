//! Single-flight credential renewal
//!
//! When an access token expires, every in-flight request fails with `401` at
//! roughly the same moment. The [`RefreshCoordinator`] guarantees that only
//! one of them contacts the renewal endpoint; the rest wait for that single
//! call and then all succeed or all fail together.
//!
//! # Design
//!
//! The coordinator is a handle to a dedicated Tokio task that owns the
//! waiter queue. Callers send a command over an unbounded channel and await
//! a `oneshot` reply:
//!
//! ```text
//! caller A --Ensure--\                      /--> Ok(T2) --> caller A
//! caller B --Ensure---> coordinator task ---+--> Ok(T2) --> caller B
//! caller C --Ensure--/   |          ^       \--> Ok(T2) --> caller C
//!                        | spawn    | join
//!                        v          |
//!                     AuthService::refresh (exactly once)
//! ```
//!
//! Only the coordinator task reads or writes the queue and the in-flight
//! handle, and it never awaits while holding a decision half-made, so the
//! single-flight invariant holds without locks. Waiters are answered in the
//! order they joined.
//!
//! A renewal belongs to the session generation it started under. If the
//! session is reset or replaced while the renewal is in flight (logout, a
//! new login), its outcome is discarded: the session and the credential
//! store are left alone and every waiter gets a renewal error.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::auth::credential_store::{CredentialKey, CredentialStore};
use crate::auth::service::{AuthService, RefreshResponse};
use crate::auth::session::{Session, UserProfile};
use crate::error::{Result, ReportlineError};

/// Outcome delivered to every waiter of one renewal cycle.
///
/// The failure side is the renewal error message, so the same outcome can be
/// handed to any number of waiters.
pub type RenewalOutcome = std::result::Result<String, String>;

const SESSION_CHANGED: &str = "session changed during renewal";

type Waiter = oneshot::Sender<RenewalOutcome>;

/// Why a caller needs a renewed credential.
#[derive(Debug)]
enum Trigger {
    /// Renew unconditionally (or join the renewal in flight).
    Explicit,
    /// A request sent with this token was rejected.
    Rejected(Option<String>),
}

#[derive(Debug)]
enum Command {
    Ensure { trigger: Trigger, reply: Waiter },
    SessionChanged,
}

/// Handle to the renewal coordinator task.
///
/// Cloning the handle is cheap; all clones talk to the same task. The task
/// stops once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    commands: mpsc::UnboundedSender<Command>,
}

impl RefreshCoordinator {
    /// Spawns the coordinator task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(
        session: Session,
        service: Arc<dyn AuthService>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = CoordinatorTask {
            session,
            service,
            store,
            commands: rx,
            waiters: VecDeque::new(),
            renewal: None,
            renewal_generation: 0,
        };
        tokio::spawn(task.run());
        Self { commands }
    }

    /// Returns a freshly renewed access token.
    ///
    /// Starts a renewal when none is in flight, otherwise joins the one in
    /// flight. Without a refresh token the session is cleared and the call
    /// fails immediately, without contacting the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::Renewal`] when renewal fails; the session
    /// and the persisted credentials have been cleared by then.
    pub async fn ensure_valid_credential(&self) -> Result<String> {
        self.request(Trigger::Explicit).await
    }

    /// Like [`ensure_valid_credential`](Self::ensure_valid_credential), for a
    /// request that was rejected while carrying `stale`.
    ///
    /// If no renewal is in flight and the session already holds a different
    /// token, a renewal completed after the request was sent; that token is
    /// returned without contacting the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::Renewal`] when renewal fails.
    pub async fn renew_stale(&self, stale: Option<&str>) -> Result<String> {
        self.request(Trigger::Rejected(stale.map(str::to_string)))
            .await
    }

    /// Tells the coordinator the session was reset or replaced.
    ///
    /// A renewal started under an earlier session is abandoned and its
    /// waiters are rejected right away instead of when the backend answers.
    pub fn session_changed(&self) {
        if self.commands.send(Command::SessionChanged).is_err() {
            tracing::debug!("refresh coordinator has stopped");
        }
    }

    async fn request(&self, trigger: Trigger) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Ensure { trigger, reply })
            .map_err(|_| ReportlineError::Renewal("refresh coordinator has stopped".into()))?;

        match rx.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(message)) => Err(ReportlineError::Renewal(message).into()),
            Err(_) => Err(ReportlineError::Renewal(
                "refresh coordinator dropped the request".into(),
            )
            .into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator task
// ---------------------------------------------------------------------------

struct CoordinatorTask {
    session: Session,
    service: Arc<dyn AuthService>,
    store: Arc<dyn CredentialStore>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Callers awaiting the renewal in flight, oldest first.
    waiters: VecDeque<Waiter>,
    /// The renewal in flight. `Some` iff `waiters` may be non-empty.
    renewal: Option<JoinHandle<Result<RefreshResponse>>>,
    /// Session generation the renewal in flight started under.
    renewal_generation: u64,
}

impl CoordinatorTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                outcome = Self::join(&mut self.renewal), if self.renewal.is_some() => {
                    self.renewal = None;
                    self.finish(outcome);
                }
                command = self.commands.recv() => match command {
                    Some(Command::Ensure { trigger, reply }) => self.ensure(trigger, reply),
                    Some(Command::SessionChanged) => self.abandon_if_stale(),
                    None => break,
                },
            }
        }
        tracing::debug!("refresh coordinator stopped");
    }

    async fn join(renewal: &mut Option<JoinHandle<Result<RefreshResponse>>>) -> Result<RefreshResponse> {
        match renewal {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(ReportlineError::Renewal(format!("renewal task failed: {e}")).into()),
            },
            None => std::future::pending().await,
        }
    }

    fn ensure(&mut self, trigger: Trigger, reply: Waiter) {
        self.abandon_if_stale();
        if self.renewal.is_some() {
            self.waiters.push_back(reply);
            tracing::debug!(waiters = self.waiters.len(), "joined renewal in flight");
            return;
        }

        if let Trigger::Rejected(stale) = trigger {
            if let Some(current) = self.session.access_token() {
                if stale.as_deref() != Some(current.as_str()) {
                    tracing::debug!("credential already renewed; skipping renewal");
                    let _ = reply.send(Ok(current));
                    return;
                }
            }
        }

        let Some(refresh_token) = self.refresh_token() else {
            tracing::warn!("credential renewal requested without a refresh token");
            self.waiters.push_back(reply);
            self.fail("no refresh token available".to_string());
            return;
        };

        tracing::info!("starting credential renewal");
        self.renewal_generation = self.session.begin_refresh();
        self.waiters.push_back(reply);

        let service = Arc::clone(&self.service);
        self.renewal = Some(tokio::spawn(async move {
            service.refresh(&refresh_token).await
        }));
    }

    fn is_stale(&self) -> bool {
        self.session.generation() != self.renewal_generation
    }

    fn abandon_if_stale(&mut self) {
        if self.renewal.is_none() || !self.is_stale() {
            return;
        }
        if let Some(handle) = self.renewal.take() {
            handle.abort();
        }
        tracing::info!(waiters = self.waiters.len(), "abandoning renewal for a replaced session");
        self.reject_all(SESSION_CHANGED);
    }

    fn refresh_token(&self) -> Option<String> {
        if let Some(token) = self.session.refresh_token() {
            return Some(token);
        }
        match self.store.get(CredentialKey::RefreshToken) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("failed to read refresh token from credential store: {e}");
                None
            }
        }
    }

    fn stored_user(&self) -> Option<UserProfile> {
        let raw = match self.store.get(CredentialKey::UserProfile) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("failed to read user profile from credential store: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("stored user profile is not valid JSON: {e}");
                None
            }
        }
    }

    fn finish(&mut self, outcome: Result<RefreshResponse>) {
        if self.is_stale() {
            tracing::info!(waiters = self.waiters.len(), "discarding renewal for a replaced session");
            self.reject_all(SESSION_CHANGED);
            return;
        }
        match outcome {
            Ok(renewed) => self.succeed(renewed),
            Err(e) => {
                let message = match e.downcast_ref::<ReportlineError>() {
                    Some(ReportlineError::Renewal(message)) => message.clone(),
                    _ => e.to_string(),
                };
                self.expire(message);
            }
        }
    }

    fn succeed(&mut self, renewed: RefreshResponse) {
        let user = if self.session.snapshot().user.is_none() {
            self.stored_user()
        } else {
            None
        };

        let installed = self.session.complete_refresh(
            self.renewal_generation,
            renewed.token.clone(),
            renewed.refresh_token.clone(),
            user,
        );
        if !installed {
            self.reject_all(SESSION_CHANGED);
            return;
        }

        if let Err(e) = self.store.set(CredentialKey::AccessToken, &renewed.token) {
            tracing::warn!("failed to persist renewed access token: {e}");
        }
        if let Some(refresh) = &renewed.refresh_token {
            if let Err(e) = self.store.set(CredentialKey::RefreshToken, refresh) {
                tracing::warn!("failed to persist rotated refresh token: {e}");
            }
        }

        // A logout that landed between installing and persisting has
        // already cleared the store; undo the writes made after it.
        if self.is_stale() && self.session.access_token().is_none() {
            self.clear_store();
        }

        tracing::info!(waiters = self.waiters.len(), "credential renewal succeeded");
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(renewed.token.clone()));
        }
    }

    /// Fails the waiters and clears all credentials.
    fn fail(&mut self, message: String) {
        tracing::warn!(waiters = self.waiters.len(), "credential renewal failed: {message}");

        self.session.clear(Some(&message));
        self.clear_store();
        self.reject_all(&message);
    }

    /// Like [`fail`](Self::fail) for a renewal that was rejected by the
    /// backend; credentials are cleared only if the session is still the one
    /// the renewal started under.
    fn expire(&mut self, message: String) {
        tracing::warn!(waiters = self.waiters.len(), "credential renewal failed: {message}");

        if self.session.expire(self.renewal_generation, &message) {
            self.clear_store();
        }
        self.reject_all(&message);
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!("failed to clear persisted credentials: {e}");
        }
    }

    fn reject_all(&mut self, message: &str) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(message.to_string()));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential_store::MemoryCredentialStore;
    use crate::auth::service::{LoginResponse, LogoutResponse};
    use crate::auth::session::{RecordId, SessionPhase};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Auth service whose `refresh` blocks until the test releases it.
    #[derive(Debug)]
    struct GatedAuthService {
        calls: AtomicUsize,
        gate: Notify,
        outcome: Mutex<RenewalOutcome>,
        rotated: Option<String>,
    }

    impl GatedAuthService {
        fn new(outcome: RenewalOutcome) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                outcome: Mutex::new(outcome),
                rotated: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn release(&self) {
            self.gate.notify_one();
        }
    }

    #[async_trait::async_trait]
    impl AuthService for GatedAuthService {
        async fn login(&self, _email: &str, _password: &str) -> Result<LoginResponse> {
            unreachable!("login is not used by the coordinator")
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            let outcome = self.outcome.lock().unwrap().clone();
            match outcome {
                Ok(token) => Ok(RefreshResponse {
                    token,
                    refresh_token: self.rotated.clone(),
                }),
                Err(message) => Err(ReportlineError::Renewal(message).into()),
            }
        }

        async fn logout(&self, _access_token: Option<&str>) -> Result<LogoutResponse> {
            unreachable!("logout is not used by the coordinator")
        }
    }

    fn user() -> UserProfile {
        UserProfile {
            id: RecordId::Numeric(1),
            first_name: None,
            last_name: None,
            email: Some("ada@example.com".into()),
            role: None,
            is_verified: true,
            created_at: None,
            extra: HashMap::new(),
        }
    }

    fn signed_in_session() -> Session {
        let session = Session::new();
        session.complete_login("T1".into(), Some("R1".into()), user());
        session
    }

    fn is_renewal(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<ReportlineError>(),
            Some(ReportlineError::Renewal(_))
        )
    }

    /// Yields until the service has been called `n` times.
    async fn wait_for_calls(service: &GatedAuthService, n: usize) {
        for _ in 0..100 {
            if service.calls() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("service was called {} times, expected {n}", service.calls());
    }

    // -----------------------------------------------------------------------
    // Failure without a refresh token
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_fresh_session_fails_without_contacting_backend() {
        let session = Session::new();
        let service = GatedAuthService::new(Ok("never".into()));
        let coordinator = RefreshCoordinator::spawn(
            session.clone(),
            service.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );

        let err = coordinator.ensure_valid_credential().await.unwrap_err();
        assert!(is_renewal(&err), "unexpected error: {err}");
        assert_eq!(service.calls(), 0);

        let state = session.snapshot();
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert!(!state.pending_operation);
        assert!(state.is_consistent());
    }

    // -----------------------------------------------------------------------
    // Success path
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_successful_renewal_updates_session_and_store() {
        let session = signed_in_session();
        let store = Arc::new(MemoryCredentialStore::new());
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator =
            RefreshCoordinator::spawn(session.clone(), service.clone(), store.clone());

        service.release();
        let token = coordinator.ensure_valid_credential().await.unwrap();

        assert_eq!(token, "T2");
        let state = session.snapshot();
        assert_eq!(state.access_token.as_deref(), Some("T2"));
        assert_eq!(state.refresh_token.as_deref(), Some("R1"));
        assert!(state.authenticated);
        assert!(!state.pending_operation);
        assert_eq!(
            store.get(CredentialKey::AccessToken).unwrap().as_deref(),
            Some("T2")
        );
    }

    #[tokio::test]
    async fn test_renewal_uses_stored_refresh_token_and_user() {
        let session = Session::new();
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(CredentialKey::RefreshToken, "R-stored").unwrap();
        store
            .set(
                CredentialKey::UserProfile,
                &serde_json::to_string(&user()).unwrap(),
            )
            .unwrap();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator =
            RefreshCoordinator::spawn(session.clone(), service.clone(), store.clone());

        service.release();
        coordinator.ensure_valid_credential().await.unwrap();

        let state = session.snapshot();
        assert!(state.authenticated);
        assert_eq!(state.user, Some(user()));
    }

    #[tokio::test]
    async fn test_pending_flag_set_while_in_flight() {
        let session = signed_in_session();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator = RefreshCoordinator::spawn(
            session.clone(),
            service.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );

        let task = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ensure_valid_credential().await }
        });
        wait_for_calls(&service, 1).await;

        let state = session.snapshot();
        assert!(state.pending_operation);
        assert_eq!(state.phase, SessionPhase::Refreshing);

        service.release();
        task.await.unwrap().unwrap();
        assert!(!session.is_pending());
    }

    // -----------------------------------------------------------------------
    // Single-flight and FIFO
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_concurrent_callers_share_one_renewal() {
        let session = signed_in_session();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator = RefreshCoordinator::spawn(
            session.clone(),
            service.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.renew_stale(Some("T1")).await })
            })
            .collect();

        wait_for_calls(&service, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.release();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "T2");
        }
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_waiters_resolved_in_join_order() {
        let session = signed_in_session();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator = RefreshCoordinator::spawn(
            session.clone(),
            service.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for name in ["A", "B", "C"] {
            let coordinator = coordinator.clone();
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                coordinator.ensure_valid_credential().await.unwrap();
                order.lock().unwrap().push(name);
            }));
            // Let this caller enqueue before the next one is spawned.
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        wait_for_calls(&service, 1).await;
        service.release();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(service.calls(), 1);
    }

    // -----------------------------------------------------------------------
    // Failure path
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_rejected_renewal_fails_every_waiter_and_clears_state() {
        let session = signed_in_session();
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(CredentialKey::AccessToken, "T1").unwrap();
        store.set(CredentialKey::RefreshToken, "R1").unwrap();
        let service = GatedAuthService::new(Err("refresh token revoked".into()));
        let coordinator =
            RefreshCoordinator::spawn(session.clone(), service.clone(), store.clone());

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.renew_stale(Some("T1")).await })
            })
            .collect();

        wait_for_calls(&service, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.release();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(err.to_string().contains("refresh token revoked"));
        }
        assert_eq!(service.calls(), 1);

        let state = session.snapshot();
        assert_eq!(state.access_token, None);
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert!(state.is_consistent());
        assert_eq!(store.get(CredentialKey::AccessToken).unwrap(), None);
        assert_eq!(store.get(CredentialKey::RefreshToken).unwrap(), None);
    }

    // -----------------------------------------------------------------------
    // Session replaced while a renewal is in flight
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_logout_during_renewal_discards_renewed_token() {
        let session = signed_in_session();
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(CredentialKey::AccessToken, "T1").unwrap();
        store.set(CredentialKey::RefreshToken, "R1").unwrap();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator =
            RefreshCoordinator::spawn(session.clone(), service.clone(), store.clone());

        let task = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ensure_valid_credential().await }
        });
        wait_for_calls(&service, 1).await;

        session.clear(None);
        store.clear().unwrap();
        service.release();

        let err = task.await.unwrap().unwrap_err();
        assert!(is_renewal(&err), "unexpected error: {err}");

        let state = session.snapshot();
        assert_eq!(state.access_token, None);
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert!(!state.pending_operation);
        assert!(state.is_consistent());
        for key in CredentialKey::ALL {
            assert_eq!(store.get(key).unwrap(), None, "{key} should stay cleared");
        }
    }

    #[tokio::test]
    async fn test_login_during_renewal_keeps_new_credentials() {
        let session = signed_in_session();
        let store = Arc::new(MemoryCredentialStore::new());
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator =
            RefreshCoordinator::spawn(session.clone(), service.clone(), store.clone());

        let task = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ensure_valid_credential().await }
        });
        wait_for_calls(&service, 1).await;

        session.begin_authentication();
        session.complete_login("T9".into(), Some("R9".into()), user());
        store.set(CredentialKey::AccessToken, "T9").unwrap();
        service.release();

        assert!(task.await.unwrap().is_err());
        let state = session.snapshot();
        assert_eq!(state.access_token.as_deref(), Some("T9"));
        assert_eq!(state.refresh_token.as_deref(), Some("R9"));
        assert!(state.authenticated);
        assert_eq!(
            store.get(CredentialKey::AccessToken).unwrap().as_deref(),
            Some("T9")
        );
    }

    #[tokio::test]
    async fn test_failed_renewal_after_login_leaves_new_session() {
        let session = signed_in_session();
        let store = Arc::new(MemoryCredentialStore::new());
        let service = GatedAuthService::new(Err("refresh token revoked".into()));
        let coordinator =
            RefreshCoordinator::spawn(session.clone(), service.clone(), store.clone());

        let task = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ensure_valid_credential().await }
        });
        wait_for_calls(&service, 1).await;

        session.complete_login("T9".into(), Some("R9".into()), user());
        store.set(CredentialKey::AccessToken, "T9").unwrap();
        service.release();

        assert!(task.await.unwrap().is_err());
        assert_eq!(session.access_token().as_deref(), Some("T9"));
        assert!(session.is_authenticated());
        assert_eq!(
            store.get(CredentialKey::AccessToken).unwrap().as_deref(),
            Some("T9")
        );
    }

    #[tokio::test]
    async fn test_session_changed_rejects_waiters_without_waiting_for_backend() {
        let session = signed_in_session();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator = RefreshCoordinator::spawn(
            session.clone(),
            service.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );

        let task = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ensure_valid_credential().await }
        });
        wait_for_calls(&service, 1).await;

        session.clear(None);
        coordinator.session_changed();

        // The gate is never released.
        let outcome = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter rejected promptly")
            .unwrap();
        let err = outcome.unwrap_err();
        assert!(err.to_string().contains(SESSION_CHANGED));
        assert_eq!(session.access_token(), None);
    }

    #[tokio::test]
    async fn test_new_request_after_login_starts_fresh_renewal() {
        let session = signed_in_session();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator = RefreshCoordinator::spawn(
            session.clone(),
            service.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );

        let stale = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ensure_valid_credential().await }
        });
        wait_for_calls(&service, 1).await;

        session.complete_login("T9".into(), Some("R9".into()), user());
        let fresh = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ensure_valid_credential().await }
        });
        wait_for_calls(&service, 2).await;
        service.release();

        assert!(stale.await.unwrap().is_err());
        assert_eq!(fresh.await.unwrap().unwrap(), "T2");
        assert_eq!(session.access_token().as_deref(), Some("T2"));
        assert_eq!(session.refresh_token().as_deref(), Some("R9"));
    }

    // -----------------------------------------------------------------------
    // Already-renewed shortcut
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_stale_rejection_after_renewal_reuses_current_token() {
        let session = signed_in_session();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator = RefreshCoordinator::spawn(
            session.clone(),
            service.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );

        service.release();
        coordinator.renew_stale(Some("T1")).await.unwrap();

        // A straggler rejected with the old token must not renew again.
        let token = coordinator.renew_stale(Some("T1")).await.unwrap();
        assert_eq!(token, "T2");
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_explicit_request_always_renews() {
        let session = signed_in_session();
        let service = GatedAuthService::new(Ok("T2".into()));
        let coordinator = RefreshCoordinator::spawn(
            session.clone(),
            service.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );

        service.release();
        coordinator.ensure_valid_credential().await.unwrap();
        service.release();
        coordinator.ensure_valid_credential().await.unwrap();
        assert_eq!(service.calls(), 2);
    }
}
