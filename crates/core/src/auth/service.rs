//! Token lifecycle service
//!
//! Owns the current [`Token`]. Every mutation goes through `store_token`,
//! `refresh` or `clear_tokens`; everything else only reads it.
//!
//! Refreshes are coalesced through a [`SingleFlight`], so however many
//! callers find the token expired at once, exactly one refresh call reaches
//! the server and all of them observe its result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use fieldlink_common::time::{timer, Clock, SystemClock, TimerHandle};
use fieldlink_common::SingleFlight;
use fieldlink_domain::{AuthError, Token, TokenState};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use super::ports::{TokenRefresher, TokenStore};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 16;

/// Holds the current token, refreshes it ahead of expiry, and broadcasts
/// authentication changes
pub struct TokenLifecycleManager<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for TokenLifecycleManager<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<C: Clock> {
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<C>,
    refresh_window: Duration,
    current: RwLock<Option<Token>>,
    /// Bumped whenever the session is replaced or cleared, so a refresh
    /// that started under an older session never resurrects it
    session: AtomicU64,
    flight: SingleFlight<Token, AuthError>,
    timer: Mutex<Option<TimerHandle>>,
    auth_tx: broadcast::Sender<bool>,
    refreshed_tx: broadcast::Sender<Option<Token>>,
}

impl TokenLifecycleManager<SystemClock> {
    /// Create a manager on the system clock
    pub fn new(
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        refresh_window: Duration,
    ) -> Self {
        Self::with_clock(store, refresher, refresh_window, Arc::new(SystemClock))
    }
}

impl<C: Clock> TokenLifecycleManager<C> {
    /// Create a manager reading time from `clock`
    pub fn with_clock(
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        refresh_window: Duration,
        clock: Arc<C>,
    ) -> Self {
        let (auth_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (refreshed_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                clock,
                refresh_window,
                current: RwLock::new(None),
                session: AtomicU64::new(0),
                flight: SingleFlight::new(),
                timer: Mutex::new(None),
                auth_tx,
                refreshed_tx,
            }),
        }
    }

    /// Load the persisted token, publish the resulting auth state and arm
    /// the refresh timer
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<TokenState, AuthError> {
        let Some(token) = self.inner.store.load().await? else {
            debug!("No persisted token");
            let _ = self.inner.auth_tx.send(false);
            return Ok(TokenState::NoToken);
        };

        let state = token.state(self.inner.clock.now_utc(), self.inner.refresh_window);
        let authenticated = state != TokenState::Expired || token.can_refresh();
        self.inner.adopt(token);
        let _ = self.inner.auth_tx.send(authenticated);

        info!(?state, "Restored persisted token");
        Ok(state)
    }

    /// A token valid for the next request, refreshing first when it has
    /// already expired
    ///
    /// Inside the refresh window the current token is returned at once and
    /// a refresh is started in the background.
    pub async fn get_token(&self) -> Result<Token, AuthError> {
        let token = self.inner.current.read().clone().ok_or(AuthError::NoToken)?;

        match token.state(self.inner.clock.now_utc(), self.inner.refresh_window) {
            TokenState::Expired => {
                if !token.can_refresh() {
                    return Err(AuthError::SessionExpired);
                }
                debug!("Access token expired, refreshing before use");
                self.inner.refresh_replacing(Some(token.access_value)).await
            }
            TokenState::NearExpiry => {
                if token.can_refresh() {
                    self.inner.spawn_background_refresh(token.access_value.clone());
                }
                Ok(token)
            }
            _ => Ok(token),
        }
    }

    /// The access value of [`get_token`](Self::get_token)
    pub async fn get_access_token(&self) -> Result<String, AuthError> {
        self.get_token().await.map(|token| token.access_value)
    }

    /// Refresh now, or join the refresh already in flight
    ///
    /// A rejected refresh value clears the session. Network failures leave
    /// the current token untouched.
    pub async fn refresh(&self) -> Result<Token, AuthError> {
        self.inner.refresh_replacing(None).await
    }

    /// Refresh after the server rejected `rejected_access`
    ///
    /// When the token was already replaced since that value was sent, the
    /// replacement is returned without another refresh call.
    pub async fn refresh_rejected(&self, rejected_access: &str) -> Result<Token, AuthError> {
        self.inner.refresh_replacing(Some(rejected_access.to_string())).await
    }

    /// Adopt a newly issued token (login, registration, OAuth exchange)
    #[instrument(skip_all, fields(expires_at = %token.expires_at))]
    pub async fn store_token(&self, token: Token) -> Result<(), AuthError> {
        self.inner.store.save(&token).await?;
        self.inner.session.fetch_add(1, Ordering::SeqCst);
        self.inner.adopt(token.clone());

        let _ = self.inner.auth_tx.send(true);
        let _ = self.inner.refreshed_tx.send(Some(token));
        info!("Token stored");
        Ok(())
    }

    /// Forget the session: cancel the refresh timer, delete persisted
    /// credentials and notify subscribers
    #[instrument(skip(self))]
    pub async fn clear_tokens(&self) -> Result<(), AuthError> {
        self.inner.clear().await
    }

    /// True when a usable token exists, refreshing an expired one first if
    /// possible
    pub async fn is_authenticated(&self) -> bool {
        let Some(token) = self.current_token() else {
            return false;
        };
        if !token.is_expired(self.inner.clock.now_utc()) {
            return true;
        }
        if !token.can_refresh() {
            return false;
        }
        self.inner.refresh_replacing(Some(token.access_value)).await.is_ok()
    }

    pub fn state(&self) -> TokenState {
        if self.inner.flight.is_in_flight() {
            return TokenState::Refreshing;
        }
        match self.current_token() {
            Some(token) => token.state(self.inner.clock.now_utc(), self.inner.refresh_window),
            None => TokenState::NoToken,
        }
    }

    pub fn current_token(&self) -> Option<Token> {
        self.inner.current.read().clone()
    }

    /// Anti-forgery value for write requests, if the server issued one
    pub fn csrf_token(&self) -> Option<String> {
        self.inner.current.read().as_ref().and_then(|token| token.csrf_value.clone())
    }

    pub fn refresh_window(&self) -> Duration {
        self.inner.refresh_window
    }

    /// `true` on login/restore, `false` on logout or a rejected refresh
    pub fn subscribe_auth_state(&self) -> broadcast::Receiver<bool> {
        self.inner.auth_tx.subscribe()
    }

    /// Every newly adopted token, and `None` when the session is cleared
    pub fn subscribe_token_refreshed(&self) -> broadcast::Receiver<Option<Token>> {
        self.inner.refreshed_tx.subscribe()
    }
}

impl<C: Clock> Inner<C> {
    fn adopt(self: &Arc<Self>, token: Token) {
        *self.current.write() = Some(token.clone());
        self.schedule_refresh(&token);
    }

    /// Adopt `token` only if the session is still `session`. The check and
    /// the write happen under the `current` lock, which `clear` also holds
    /// while bumping the session.
    fn adopt_in_session(self: &Arc<Self>, session: u64, token: Token) -> bool {
        {
            let mut current = self.current.write();
            if self.session.load(Ordering::SeqCst) != session {
                return false;
            }
            *current = Some(token.clone());
        }
        self.schedule_refresh(&token);
        true
    }

    /// Make the store agree with memory again after a discarded refresh
    /// whose save may have landed after a logout or a new login
    async fn restore_persisted(&self) -> Result<Token, AuthError> {
        let current = self.current.read().clone();
        let result = match &current {
            Some(token) => self.store.save(token).await,
            None => self.store.clear().await,
        };
        if let Err(e) = result {
            error!(error = %e, "Failed to restore persisted tokens after discarded refresh");
        }
        current.ok_or(AuthError::NoToken)
    }

    /// Refresh through the single flight. With `stale` set, a leader that
    /// finds the token already replaced returns the replacement instead of
    /// calling the server again.
    async fn refresh_replacing(self: &Arc<Self>, stale: Option<String>) -> Result<Token, AuthError> {
        let inner = Arc::clone(self);
        self.flight.run(move || async move { inner.perform_refresh(stale).await }).await
    }

    async fn perform_refresh(self: Arc<Self>, stale: Option<String>) -> Result<Token, AuthError> {
        let session = self.session.load(Ordering::SeqCst);
        let current = self.current.read().clone().ok_or(AuthError::NoToken)?;

        if let Some(stale) = stale {
            if current.access_value != stale && !current.is_expired(self.clock.now_utc()) {
                debug!("Token already replaced, skipping refresh");
                return Ok(current);
            }
        }

        let Some(refresh_value) = current.refresh_value.clone().filter(|v| !v.is_empty()) else {
            return Err(AuthError::SessionExpired);
        };

        debug!("Requesting token refresh");
        match self.refresher.refresh(&refresh_value).await {
            Ok(issued) => {
                let token = issued.retaining_refresh_from(&current);
                if self.session.load(Ordering::SeqCst) != session {
                    debug!("Session changed during refresh, discarding result");
                    return self.current.read().clone().ok_or(AuthError::NoToken);
                }

                if let Err(e) = self.store.save(&token).await {
                    warn!(error = %e, "Failed to persist refreshed token; keeping it in memory");
                }
                if !self.adopt_in_session(session, token.clone()) {
                    debug!("Session changed while persisting refreshed token, discarding it");
                    return self.restore_persisted().await;
                }
                let _ = self.refreshed_tx.send(Some(token.clone()));
                info!(expires_at = %token.expires_at, "Access token refreshed");
                Ok(token)
            }
            Err(AuthError::InvalidRefreshToken) if self.session.load(Ordering::SeqCst) != session => {
                debug!("Refresh rejected for a session that was already replaced");
                Err(AuthError::InvalidRefreshToken)
            }
            Err(AuthError::InvalidRefreshToken) => {
                warn!("Refresh token rejected, clearing session");
                if let Err(e) = self.clear().await {
                    error!(error = %e, "Failed to clear persisted tokens after rejected refresh");
                }
                Err(AuthError::InvalidRefreshToken)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed; current token left in place");
                Err(e)
            }
        }
    }

    async fn clear(&self) -> Result<(), AuthError> {
        {
            let mut current = self.current.write();
            self.session.fetch_add(1, Ordering::SeqCst);
            *current = None;
        }
        let pending_timer = self.timer.lock().take();
        if let Some(handle) = pending_timer {
            handle.cancel();
        }

        let result = self.store.clear().await;
        let _ = self.auth_tx.send(false);
        let _ = self.refreshed_tx.send(None);
        info!("Tokens cleared");
        result.map_err(AuthError::from)
    }

    fn spawn_background_refresh(self: &Arc<Self>, stale: String) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = inner.refresh_replacing(Some(stale)).await {
                error!(error = %e, "Background token refresh failed");
            }
        });
    }

    /// Arm the one refresh timer for `token`, replacing any previous one
    fn schedule_refresh(self: &Arc<Self>, token: &Token) {
        let previous = if token.can_refresh() {
            let delay = (token.refresh_at(self.refresh_window) - self.clock.now_utc())
                .to_std()
                .unwrap_or(Duration::ZERO);
            let weak = Arc::downgrade(self);
            let handle = timer::schedule(delay, async move { Self::on_timer(&weak) });
            debug!(delay_secs = delay.as_secs(), "Refresh timer scheduled");
            self.timer.lock().replace(handle)
        } else {
            self.timer.lock().take()
        };

        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn on_timer(weak: &Weak<Self>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let Some(token) = inner.current.read().clone() else {
            return;
        };

        if token.should_refresh(inner.clock.now_utc(), inner.refresh_window) {
            inner.spawn_background_refresh(token.access_value);
        } else {
            // Wall clock moved backwards since scheduling
            inner.schedule_refresh(&token);
        }
    }
}

impl<C: Clock> Drop for Inner<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.cancel();
        }
    }
}
