//! Session coordinator.
//!
//! The [`Coordinator`] owns the [`SessionState`] and drives a tower session
//! from authentication to confirmed door opens. Every user intent is gated by
//! [`Intent::is_enabled`]; a gated-off intent returns
//! [`Outcome::Skipped`] without touching the backend or the gateway.
//!
//! ## Cancellation
//!
//! [`Coordinator::terminate`] bumps a session epoch inside the same critical
//! section that resets the state. Every backend and gateway call is raced
//! against that bump and dropped when it wins, and every mutation made after
//! an `await` is applied only if the epoch it started under is still
//! current. In-flight markers are tagged with their epoch too, so an attempt
//! left over from a terminated session never blocks the next one.
//!
//! ## Notifications
//!
//! Every intent failure is also published as a [`Notification`] on a
//! broadcast channel, whether or not the caller looks at the returned error.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::LockerBackend;
use crate::config::{Config, Credentials, SdkEnvironment, SessionConfig};
use crate::error::{DropoffError, Result};
use crate::gateway::{DiscoveredTower, GatewayError, SdkLogEvent, SdkLogLevel, TowerGateway};
use crate::poll::{BoundedPoll, PollOutcome};
use crate::session::{matches_target, Intent, SessionState};
use crate::types::{LockerId, Notification};

const NOTIFICATION_CAPACITY: usize = 64;

/// What the coordinator needs to know about its tower and session.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Tower this coordinator talks to.
    pub tower_id: String,
    /// Environment handed to the SDK with its token.
    pub sdk_environment: SdkEnvironment,
    /// Credentials used by [`Coordinator::authenticate`].
    pub credentials: Credentials,
    /// Role, poll budgets and terminate reason.
    pub session: SessionConfig,
}

impl CoordinatorSettings {
    /// Settings taken from a loaded [`Config`].
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            tower_id: config.tower.id.clone(),
            sdk_environment: config.tower.sdk_environment,
            credentials: config.backend.credentials.clone(),
            session: config.session.clone(),
        }
    }
}

/// How an intent ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The intent ran to completion.
    Completed,
    /// The intent's precondition did not hold, or the same intent was
    /// already in flight. Nothing was done.
    Skipped(Intent),
    /// The session was terminated while the intent was in flight. Its
    /// result was discarded.
    Abandoned,
}

struct Inner {
    settings: CoordinatorSettings,
    backend: Arc<dyn LockerBackend>,
    gateway: Arc<dyn TowerGateway>,
    state: watch::Sender<SessionState>,
    epoch: AtomicU64,
    notifications: broadcast::Sender<Notification>,
    auth_in_flight: InFlight,
    connect_in_flight: InFlight,
    open_in_flight: InFlight,
}

/// Marks one running attempt of an intent with the epoch it runs under.
///
/// An attempt from a terminated session never blocks a newer one: a claim
/// succeeds unless the slot is held under the same or a later epoch.
#[derive(Debug, Default)]
struct InFlight {
    // Epoch + 1 of the holder; 0 when free.
    holder: AtomicU64,
}

impl InFlight {
    const FREE: u64 = 0;

    fn claim(&self, epoch: u64) -> Option<InFlightGuard<'_>> {
        let tag = epoch + 1;
        let mut held = self.holder.load(Ordering::SeqCst);
        loop {
            if held >= tag {
                return None;
            }
            match self
                .holder
                .compare_exchange(held, tag, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Some(InFlightGuard { slot: self, tag }),
                Err(actual) => held = actual,
            }
        }
    }

    fn is_held(&self, epoch: u64) -> bool {
        self.holder.load(Ordering::SeqCst) > epoch
    }
}

struct InFlightGuard<'a> {
    slot: &'a InFlight,
    tag: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        // A newer epoch may have taken the slot over; leave it alone then.
        let _ = self.slot.holder.compare_exchange(
            self.tag,
            InFlight::FREE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Drives one tower session.
///
/// Construct inside a tokio runtime: the discovery and SDK log listeners are
/// spawned immediately and aborted when the coordinator is dropped.
pub struct Coordinator {
    inner: Arc<Inner>,
    listeners: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("tower_id", &self.inner.settings.tower_id)
            .field("phase", &self.inner.state.borrow().phase())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator and subscribe to the gateway's event channels.
    #[must_use]
    pub fn new(
        settings: CoordinatorSettings,
        backend: Arc<dyn LockerBackend>,
        gateway: Arc<dyn TowerGateway>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let inner = Arc::new(Inner {
            settings,
            backend,
            gateway,
            state,
            epoch: AtomicU64::new(0),
            notifications,
            auth_in_flight: InFlight::default(),
            connect_in_flight: InFlight::default(),
            open_in_flight: InFlight::default(),
        });

        let listeners = vec![
            spawn_discovery_listener(&inner),
            spawn_log_listener(&inner),
        ];

        Self { inner, listeners }
    }

    /// Settings this coordinator was built with.
    #[must_use]
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.inner.settings
    }

    /// A copy of the current session state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Watch the session state for changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Receive failure notifications raised from now on.
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    /// Whether an attempt of `intent` is running in the current session.
    ///
    /// Only authenticate, connect and open-locker are tracked; attempts left
    /// over from a terminated session do not count.
    #[must_use]
    pub fn is_in_flight(&self, intent: Intent) -> bool {
        let epoch = self.inner.current_epoch();
        self.inner
            .slot(intent)
            .is_some_and(|slot| slot.is_held(epoch))
    }

    /// Exchange the configured credentials for backend and SDK tokens.
    ///
    /// Allowed in any state. A later call replaces the tokens and leaves the
    /// rest of the session alone; the SDK keeps the token it was initialized
    /// with.
    ///
    /// # Errors
    ///
    /// Returns [`DropoffError::Auth`] if the backend refuses or cannot be
    /// reached. The state is left unchanged.
    pub async fn authenticate(&self) -> Result<Outcome> {
        let inner = &self.inner;
        let Some((epoch, ())) = inner.gate(Intent::Authenticate, |_| ()) else {
            return Ok(skipped(Intent::Authenticate));
        };
        let Some(_guard) = inner.auth_in_flight.claim(epoch) else {
            return Ok(in_flight(Intent::Authenticate));
        };

        info!(
            grant_type = inner.settings.credentials.grant_type(),
            "Authenticating"
        );
        let request = inner.backend.authenticate(&inner.settings.credentials);
        let Some(result) = inner.unless_terminated(epoch, request).await else {
            return Ok(Outcome::Abandoned);
        };
        match result {
            Ok(tokens) => {
                if inner.apply_if_current(epoch, |state| state.apply_tokens(tokens)) {
                    info!("Authenticated");
                    Ok(Outcome::Completed)
                } else {
                    Ok(Outcome::Abandoned)
                }
            }
            Err(err) => inner.fail_if_current(epoch, DropoffError::Auth(err.to_string())),
        }
    }

    /// Hand the SDK token to the gateway and initialize the SDK.
    ///
    /// The precondition check, both gateway calls and the flag update happen
    /// in one critical section, so the SDK is initialized at most once per
    /// session.
    pub fn initialize_sdk(&self) -> Outcome {
        let inner = &self.inner;
        let initialized = inner.state.send_if_modified(|state| {
            if !Intent::InitializeSdk.is_enabled(state) {
                return false;
            }
            inner
                .gateway
                .set_access_token(&state.sdk_token, inner.settings.sdk_environment);
            inner.gateway.initialize_sdk();
            state.sdk_initialized = true;
            true
        });

        if initialized {
            info!(environment = %inner.settings.sdk_environment, "Tower SDK initialized");
            Outcome::Completed
        } else {
            skipped(Intent::InitializeSdk)
        }
    }

    /// Start radio discovery. Matches arrive through the discovery listener.
    pub fn discover(&self) -> Outcome {
        if self.inner.gate(Intent::Discover, |_| ()).is_none() {
            return skipped(Intent::Discover);
        }
        info!(tower_id = %self.inner.settings.tower_id, "Starting discovery");
        self.inner.gateway.start_discovery();
        Outcome::Completed
    }

    /// Connect to the tower, open a session and wait for it to sync.
    ///
    /// # Errors
    ///
    /// - [`DropoffError::ConnectionFailed`] if the radio link fails
    /// - [`DropoffError::Session`] if the tower rejects the session
    /// - [`DropoffError::SyncTimeout`] if the tower is still syncing when the
    ///   sync budget runs out
    pub async fn connect(&self) -> Result<Outcome> {
        let inner = &self.inner;
        let Some((epoch, ())) = inner.gate(Intent::Connect, |_| ()) else {
            return Ok(skipped(Intent::Connect));
        };
        let Some(_guard) = inner.connect_in_flight.claim(epoch) else {
            return Ok(in_flight(Intent::Connect));
        };

        let tower_id = inner.settings.tower_id.as_str();
        info!(tower_id, "Connecting to tower");
        let Some(connected) = inner
            .unless_terminated(epoch, inner.gateway.connect(tower_id))
            .await
        else {
            return Ok(Outcome::Abandoned);
        };
        if let Err(err) = connected {
            return inner.fail_if_current(epoch, DropoffError::ConnectionFailed(err.to_string()));
        }

        let role = inner.settings.session.role;
        let Some(opened) = inner
            .unless_terminated(epoch, inner.gateway.open_session(role))
            .await
        else {
            return Ok(Outcome::Abandoned);
        };
        match opened {
            Ok(()) => {}
            Err(GatewayError::SessionRejected { code, message }) => {
                return inner.fail_if_current(epoch, DropoffError::Session { code, message });
            }
            Err(other) => {
                let err = DropoffError::ConnectionFailed(other.to_string());
                return inner.fail_if_current(epoch, err);
            }
        }
        info!(tower_id, role, "Session opened; waiting for tower to sync");

        self.await_sync(epoch).await
    }

    async fn await_sync(&self, epoch: u64) -> Result<Outcome> {
        let inner = &self.inner;
        let session = &inner.settings.session;
        let poll = BoundedPoll::new(session.sync_timeout_ticks, session.poll_interval());
        let gateway = &inner.gateway;

        let outcome = poll
            .run(
                || async move {
                    // A terminated session reads as "not ready"; the poll then
                    // sees the epoch change and abandons.
                    inner
                        .unless_terminated(epoch, gateway.is_syncing())
                        .await
                        .is_some_and(|syncing| !syncing)
                },
                || inner.is_current(epoch),
            )
            .await;

        match outcome {
            PollOutcome::Ready { ticks } => {
                if inner.apply_if_current(epoch, |state| state.tower_synced = true) {
                    info!(ticks, "Tower synced");
                    Ok(Outcome::Completed)
                } else {
                    Ok(Outcome::Abandoned)
                }
            }
            PollOutcome::Exhausted { ticks } => {
                warn!(ticks, "Tower still syncing after sync budget");
                inner.fail_if_current(
                    epoch,
                    DropoffError::SyncTimeout {
                        ticks: poll.budget(),
                    },
                )
            }
            PollOutcome::Abandoned => {
                info!("Session terminated while waiting for sync");
                Ok(Outcome::Abandoned)
            }
        }
    }

    /// Replace the available locker list with a fresh one from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DropoffError::Network`] if the directory cannot be fetched.
    /// The previous list is kept.
    pub async fn refresh_lockers(&self) -> Result<Outcome> {
        let inner = &self.inner;
        let Some((epoch, bearer)) =
            inner.gate(Intent::RefreshLockers, |state| state.bearer_token.clone())
        else {
            return Ok(skipped(Intent::RefreshLockers));
        };

        let tower_id = inner.settings.tower_id.as_str();
        let request = inner.backend.available_lockers(tower_id, &bearer);
        let Some(result) = inner.unless_terminated(epoch, request).await else {
            return Ok(Outcome::Abandoned);
        };
        match result {
            Ok(lockers) => {
                let count = lockers.len();
                if inner.apply_if_current(epoch, |state| state.available_lockers = lockers) {
                    info!(tower_id, count, "Locker list refreshed");
                    Ok(Outcome::Completed)
                } else {
                    Ok(Outcome::Abandoned)
                }
            }
            Err(err) => inner.fail_if_current(epoch, DropoffError::Network(err.to_string())),
        }
    }

    /// Open `locker_id` and wait for its door to report open.
    ///
    /// Clears `can_reopen_last_locker` before anything else, so a failed
    /// attempt never leaves the previous locker reopenable. Only one open
    /// attempt runs at a time; a second one is skipped.
    ///
    /// # Errors
    ///
    /// - [`DropoffError::Token`] if no drop-off token could be obtained
    /// - [`DropoffError::DoorCommand`] if the tower did not open a locker
    /// - [`DropoffError::DoorVerifyTimeout`] if the door never reported open
    pub async fn open_locker(&self, locker_id: LockerId) -> Result<Outcome> {
        let inner = &self.inner;
        let epoch = inner.current_epoch();
        let Some(_guard) = inner.open_in_flight.claim(epoch) else {
            return Ok(in_flight(Intent::OpenLocker));
        };

        let mut bearer = None;
        inner.state.send_if_modified(|state| {
            if !inner.is_current(epoch) || !Intent::OpenLocker.is_enabled(state) {
                return false;
            }
            bearer = Some(state.bearer_token.clone());
            std::mem::take(&mut state.can_reopen_last_locker)
        });
        let Some(bearer) = bearer else {
            return Ok(skipped(Intent::OpenLocker));
        };

        let tower_id = inner.settings.tower_id.as_str();
        info!(tower_id, locker_id, "Requesting drop-off token");
        let request = inner
            .backend
            .create_dropoff_token(tower_id, locker_id, &bearer);
        let Some(token) = inner.unless_terminated(epoch, request).await else {
            return Ok(Outcome::Abandoned);
        };
        let token = match token {
            Ok(token) => token,
            Err(err) => {
                return inner.fail_if_current(
                    epoch,
                    DropoffError::Token {
                        locker_id,
                        message: err.to_string(),
                    },
                );
            }
        };
        let Some(command) = inner
            .unless_terminated(epoch, inner.gateway.send_open_command(&token))
            .await
        else {
            return Ok(Outcome::Abandoned);
        };
        let opened = match command {
            Ok(Some(opened)) => opened,
            Ok(None) => {
                return inner.fail_if_current(
                    epoch,
                    DropoffError::DoorCommand(format!("tower did not open locker {locker_id}")),
                );
            }
            Err(err) => {
                return inner.fail_if_current(epoch, DropoffError::DoorCommand(err.to_string()));
            }
        };
        if opened != locker_id {
            warn!(requested = locker_id, opened, "Tower opened a different locker");
        }
        info!(locker_id = opened, "Open command accepted; confirming door");

        self.confirm_door(epoch, opened).await
    }

    async fn confirm_door(&self, epoch: u64, locker_id: LockerId) -> Result<Outcome> {
        let inner = &self.inner;
        let session = &inner.settings.session;
        let poll = BoundedPoll::new(session.door_timeout_ticks, session.poll_interval());
        let gateway = &inner.gateway;

        let outcome = poll
            .run(
                || async move {
                    inner
                        .unless_terminated(epoch, gateway.check_door())
                        .await
                        .unwrap_or(false)
                },
                || inner.is_current(epoch),
            )
            .await;

        match outcome {
            PollOutcome::Ready { ticks } => {
                let mut removed = false;
                let applied = inner.apply_if_current(epoch, |state| {
                    removed = state.remove_locker(locker_id);
                    state.can_reopen_last_locker = true;
                });
                if applied {
                    info!(locker_id, ticks, removed, "Door confirmed open");
                    Ok(Outcome::Completed)
                } else {
                    Ok(Outcome::Abandoned)
                }
            }
            PollOutcome::Exhausted { ticks } => {
                warn!(locker_id, ticks, "Door never reported open");
                inner.fail_if_current(
                    epoch,
                    DropoffError::DoorVerifyTimeout {
                        locker_id,
                        ticks: poll.budget(),
                    },
                )
            }
            PollOutcome::Abandoned => {
                info!(locker_id, "Session terminated while confirming door");
                Ok(Outcome::Abandoned)
            }
        }
    }

    /// Reopen the last locker whose door was confirmed open.
    pub fn reopen(&self) -> Outcome {
        if self.inner.gate(Intent::Reopen, |_| ()).is_none() {
            return skipped(Intent::Reopen);
        }
        info!("Reopening last locker");
        self.inner.gateway.reopen_last();
        Outcome::Completed
    }

    /// Terminate the tower session and reset every field of the state.
    ///
    /// Allowed in any state. Intents still in flight observe the reset and
    /// return [`Outcome::Abandoned`] without touching the new state.
    pub fn terminate(&self) -> Outcome {
        let inner = &self.inner;
        inner
            .gateway
            .terminate_session(0, &inner.settings.session.terminate_reason);
        inner.state.send_modify(|state| {
            inner.epoch.fetch_add(1, Ordering::SeqCst);
            *state = SessionState::default();
        });
        info!("Session terminated");
        Outcome::Completed
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

impl Inner {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    fn slot(&self, intent: Intent) -> Option<&InFlight> {
        match intent {
            Intent::Authenticate => Some(&self.auth_in_flight),
            Intent::Connect => Some(&self.connect_in_flight),
            Intent::OpenLocker => Some(&self.open_in_flight),
            _ => None,
        }
    }

    /// Drive `work` unless the session started at `epoch` is terminated
    /// first, in which case `work` is dropped and `None` returned.
    async fn unless_terminated<F: Future>(&self, epoch: u64, work: F) -> Option<F::Output> {
        let mut state = self.state.subscribe();
        tokio::select! {
            // Checked first, so `work` is never started for a dead session.
            biased;
            () = async {
                // The sender lives in `self`, so this only ends on a terminate.
                let _ = state.wait_for(|_| !self.is_current(epoch)).await;
            } => None,
            output = work => Some(output),
        }
    }

    /// Check `intent` against the state and read what the intent needs, all
    /// under one lock. Returns the epoch the intent runs under.
    fn gate<T>(&self, intent: Intent, read: impl FnOnce(&SessionState) -> T) -> Option<(u64, T)> {
        let state = self.state.borrow();
        if !intent.is_enabled(&state) {
            return None;
        }
        Some((self.current_epoch(), read(&state)))
    }

    /// Apply `mutate` if no terminate happened since `epoch`.
    fn apply_if_current(&self, epoch: u64, mutate: impl FnOnce(&mut SessionState)) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(epoch) {
                return false;
            }
            mutate(state);
            true
        })
    }

    fn fail<T>(&self, err: DropoffError) -> Result<T> {
        error!(code = err.error_code(), error = %err, "{}", err.title());
        // No subscribers is fine; the caller still gets the error.
        let _ = self.notifications.send(Notification::from_error(&err));
        Err(err)
    }

    fn fail_if_current(&self, epoch: u64, err: DropoffError) -> Result<Outcome> {
        if self.is_current(epoch) {
            self.fail(err)
        } else {
            debug!(error = %err, "Dropping failure from a terminated session");
            Ok(Outcome::Abandoned)
        }
    }

    fn on_towers_found(&self, towers: &[DiscoveredTower]) {
        let target = self.settings.tower_id.as_str();
        if !matches_target(towers.iter().map(|tower| tower.tower_id.as_str()), target) {
            debug!(count = towers.len(), "Discovery event without target tower");
            return;
        }

        let mut ignored = false;
        let marked = self.state.send_if_modified(|state| {
            if !state.sdk_initialized {
                ignored = true;
                return false;
            }
            !std::mem::replace(&mut state.tower_in_range, true)
        });

        if ignored {
            debug!(tower_id = target, "Ignoring discovery before SDK initialization");
        } else if marked {
            info!(tower_id = target, "Target tower in range");
        }
    }
}

fn skipped(intent: Intent) -> Outcome {
    debug!(%intent, "Precondition not met; ignoring intent");
    Outcome::Skipped(intent)
}

fn in_flight(intent: Intent) -> Outcome {
    info!(%intent, "Already in flight; ignoring intent");
    Outcome::Skipped(intent)
}

fn spawn_discovery_listener(inner: &Arc<Inner>) -> JoinHandle<()> {
    let mut events = inner.gateway.discovery_events();
    let weak: Weak<Inner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(towers) => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.on_towers_found(&towers);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Discovery listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Discovery listener stopped");
    })
}

fn spawn_log_listener(inner: &Arc<Inner>) -> JoinHandle<()> {
    let mut events = inner.gateway.log_events();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_sdk_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "SDK log listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_sdk_event(event: &SdkLogEvent) {
    let message = event.message.as_str();
    match event.level {
        SdkLogLevel::Debug => debug!(target: "dropoff::sdk", "{message}"),
        SdkLogLevel::Info => info!(target: "dropoff::sdk", "{message}"),
        SdkLogLevel::Warning => warn!(target: "dropoff::sdk", "{message}"),
        SdkLogLevel::Error => error!(target: "dropoff::sdk", "{message}"),
    }
}
