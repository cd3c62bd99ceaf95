//! Scripted in-process tower.
//!
//! [`ScriptedGateway`] records every call it receives and answers from a
//! script. Poll scripts repeat their last value once exhausted. It backs the
//! coordinator tests and lets the HTTP shell run without the vendor SDK.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    DiscoveredTower, GatewayError, GatewayResult, SdkLogEvent, SdkLogLevel, TowerGateway,
};
use crate::config::SdkEnvironment;
use crate::types::{DropoffToken, LockerId};

const EVENT_CAPACITY: usize = 16;

/// A call received by the scripted gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `set_access_token`.
    SetAccessToken {
        /// Token handed over.
        token: String,
        /// Environment handed over.
        environment: SdkEnvironment,
    },
    /// `initialize_sdk`.
    InitializeSdk,
    /// `start_discovery`.
    StartDiscovery,
    /// `connect` with the tower id.
    Connect(String),
    /// `open_session` with the role.
    OpenSession(u8),
    /// `is_syncing`.
    IsSyncing,
    /// `send_open_command` for the token's locker.
    SendOpenCommand(LockerId),
    /// `check_door`.
    CheckDoor,
    /// `reopen_last`.
    ReopenLast,
    /// `terminate_session`.
    TerminateSession {
        /// Termination code.
        code: i32,
        /// Termination reason.
        reason: String,
    },
}

/// How the scripted tower answers open commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Open the locker the token was issued for.
    EchoLocker,
    /// Always answer with this result.
    Fixed(GatewayResult<Option<LockerId>>),
}

#[derive(Debug)]
struct PollScript {
    queued: VecDeque<bool>,
    last: bool,
}

impl PollScript {
    fn new(values: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        let queued: VecDeque<bool> = values.into_iter().collect();
        let last = queued.back().copied().unwrap_or(fallback);
        Self { queued, last }
    }

    fn next(&mut self) -> bool {
        self.queued.pop_front().unwrap_or(self.last)
    }
}

#[derive(Debug)]
struct Script {
    connect: GatewayResult<()>,
    session: GatewayResult<()>,
    syncing: PollScript,
    door: PollScript,
    open: OpenBehavior,
    announce: Vec<DiscoveredTower>,
    latency: Duration,
    poll_latency: Duration,
}

/// A tower that answers from a script and records its calls.
#[derive(Debug)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
    calls: Mutex<Vec<GatewayCall>>,
    discovery_tx: broadcast::Sender<Vec<DiscoveredTower>>,
    log_tx: broadcast::Sender<SdkLogEvent>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    /// A tower that connects, syncs immediately, opens the requested locker
    /// and reports its door open on the first check.
    #[must_use]
    pub fn new() -> Self {
        let (discovery_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (log_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            script: Mutex::new(Script {
                connect: Ok(()),
                session: Ok(()),
                syncing: PollScript::new([], false),
                door: PollScript::new([], true),
                open: OpenBehavior::EchoLocker,
                announce: Vec::new(),
                latency: Duration::ZERO,
                poll_latency: Duration::ZERO,
            }),
            calls: Mutex::new(Vec::new()),
            discovery_tx,
            log_tx,
        }
    }

    /// A believable tower for running the shell without hardware: it
    /// announces `tower_id` on discovery, syncs after two polls and reports
    /// each door open on the second check.
    #[must_use]
    pub fn simulated(tower_id: &str) -> Self {
        Self::new()
            .announcing(vec![DiscoveredTower {
                tower_id: tower_id.to_string(),
                tower_name: Some("Simulated tower".to_string()),
                rssi: Some(-52),
            }])
            .with_sync_script([true, true, false])
            .with_door_script([false, true])
            .with_latency(Duration::from_millis(150))
    }

    /// Towers emitted whenever discovery starts.
    #[must_use]
    pub fn announcing(self, towers: Vec<DiscoveredTower>) -> Self {
        self.script().announce = towers;
        self
    }

    /// Answers for successive `is_syncing` polls.
    #[must_use]
    pub fn with_sync_script(self, values: impl IntoIterator<Item = bool>) -> Self {
        self.script().syncing = PollScript::new(values, false);
        self
    }

    /// Answers for successive `check_door` polls.
    #[must_use]
    pub fn with_door_script(self, values: impl IntoIterator<Item = bool>) -> Self {
        self.script().door = PollScript::new(values, true);
        self
    }

    /// Outcome of `connect`.
    #[must_use]
    pub fn with_connect_result(self, result: GatewayResult<()>) -> Self {
        self.script().connect = result;
        self
    }

    /// Outcome of `open_session`.
    #[must_use]
    pub fn with_session_result(self, result: GatewayResult<()>) -> Self {
        self.script().session = result;
        self
    }

    /// Outcome of `send_open_command`.
    #[must_use]
    pub fn with_open_behavior(self, behavior: OpenBehavior) -> Self {
        self.script().open = behavior;
        self
    }

    /// Delay applied to every asynchronous command.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.script().latency = latency;
        self
    }

    /// Delay applied to every `is_syncing` and `check_door` poll.
    #[must_use]
    pub fn with_poll_latency(self, latency: Duration) -> Self {
        self.script().poll_latency = latency;
        self
    }

    /// Emit a discovery event. Returns how many subscribers received it.
    pub fn emit_towers(&self, towers: Vec<DiscoveredTower>) -> usize {
        self.discovery_tx.send(towers).unwrap_or(0)
    }

    /// Emit an SDK log line.
    pub fn emit_log(&self, level: SdkLogLevel, message: impl Into<String>) {
        let _ = self.log_tx.send(SdkLogEvent {
            level,
            message: message.into(),
        });
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }

    /// Number of `is_syncing` polls.
    #[must_use]
    pub fn sync_polls(&self) -> usize {
        self.count(|call| matches!(call, GatewayCall::IsSyncing))
    }

    /// Number of `check_door` polls.
    #[must_use]
    pub fn door_checks(&self) -> usize {
        self.count(|call| matches!(call, GatewayCall::CheckDoor))
    }

    /// Number of `initialize_sdk` calls.
    #[must_use]
    pub fn initialize_calls(&self) -> usize {
        self.count(|call| matches!(call, GatewayCall::InitializeSdk))
    }

    /// Number of `send_open_command` calls.
    #[must_use]
    pub fn open_commands(&self) -> usize {
        self.count(|call| matches!(call, GatewayCall::SendOpenCommand(_)))
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        lock(&self.script)
    }

    fn record(&self, call: GatewayCall) {
        debug!(?call, "Scripted gateway call");
        lock(&self.calls).push(call);
    }

    async fn delay(&self) {
        let latency = self.script().latency;
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }
    }

    async fn poll_delay(&self) {
        let latency = self.script().poll_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TowerGateway for ScriptedGateway {
    fn set_access_token(&self, token: &str, environment: SdkEnvironment) {
        self.record(GatewayCall::SetAccessToken {
            token: token.to_string(),
            environment,
        });
    }

    fn initialize_sdk(&self) {
        self.record(GatewayCall::InitializeSdk);
    }

    fn start_discovery(&self) {
        self.record(GatewayCall::StartDiscovery);
        let towers = self.script().announce.clone();
        if !towers.is_empty() {
            self.emit_towers(towers);
        }
    }

    fn discovery_events(&self) -> broadcast::Receiver<Vec<DiscoveredTower>> {
        self.discovery_tx.subscribe()
    }

    fn log_events(&self) -> broadcast::Receiver<SdkLogEvent> {
        self.log_tx.subscribe()
    }

    async fn connect(&self, tower_id: &str) -> GatewayResult<()> {
        self.record(GatewayCall::Connect(tower_id.to_string()));
        self.delay().await;
        self.script().connect.clone()
    }

    async fn open_session(&self, role: u8) -> GatewayResult<()> {
        self.record(GatewayCall::OpenSession(role));
        self.delay().await;
        let result = self.script().session.clone();
        if result.is_ok() {
            self.emit_log(SdkLogLevel::Info, format!("session opened with role {role}"));
        }
        result
    }

    async fn is_syncing(&self) -> bool {
        self.record(GatewayCall::IsSyncing);
        self.poll_delay().await;
        self.script().syncing.next()
    }

    async fn send_open_command(&self, token: &DropoffToken) -> GatewayResult<Option<LockerId>> {
        self.record(GatewayCall::SendOpenCommand(token.locker_id));
        self.delay().await;
        match &self.script().open {
            OpenBehavior::EchoLocker => Ok(Some(token.locker_id)),
            OpenBehavior::Fixed(result) => result.clone(),
        }
    }

    async fn check_door(&self) -> bool {
        self.record(GatewayCall::CheckDoor);
        self.poll_delay().await;
        self.script().door.next()
    }

    fn reopen_last(&self) {
        self.record(GatewayCall::ReopenLast);
    }

    fn terminate_session(&self, code: i32, reason: &str) {
        self.record(GatewayCall::TerminateSession {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Shorthand for a rejected session.
#[must_use]
pub fn session_rejected(code: i32, message: &str) -> GatewayError {
    GatewayError::SessionRejected {
        code,
        message: message.to_string(),
    }
}
