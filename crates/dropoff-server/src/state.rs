//! Application state shared across handlers.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use dropoff_core::{
    Config, Coordinator, CoordinatorSettings, HttpBackend, LockerBackend, Notification,
    ScriptedGateway, TowerGateway,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// Everything the handlers need: the coordinator, the loaded configuration
/// and the most recent notifications.
#[derive(Debug)]
pub struct AppState {
    /// Session coordinator for the configured tower.
    pub coordinator: Arc<Coordinator>,
    /// Configuration the server was started with.
    pub config: Arc<Config>,
    notifications: RwLock<VecDeque<Notification>>,
    notification_capacity: usize,
}

impl AppState {
    /// Build the state for a running server.
    ///
    /// The vendor SDK is not linked into this binary, so the tower is the
    /// scripted simulation from `dropoff-core`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: Config) -> anyhow::Result<SharedState> {
        let backend = HttpBackend::new(&config.backend, &config.dropoff)?;
        info!(base_url = %backend.base_url(), "Backend client ready");

        let gateway = ScriptedGateway::simulated(&config.tower.id);
        warn!(tower_id = %config.tower.id, "Using simulated tower gateway");

        Ok(Self::new(config, Arc::new(backend), Arc::new(gateway)))
    }

    /// Build the state around explicit backend and gateway implementations
    /// and start collecting notifications.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: Config,
        backend: Arc<dyn LockerBackend>,
        gateway: Arc<dyn TowerGateway>,
    ) -> SharedState {
        let coordinator = Arc::new(Coordinator::new(
            CoordinatorSettings::from_config(&config),
            backend,
            gateway,
        ));
        let notification_capacity = config.server.notification_capacity.max(1);

        let state = Arc::new(Self {
            coordinator,
            config: Arc::new(config),
            notifications: RwLock::new(VecDeque::with_capacity(notification_capacity)),
            notification_capacity,
        });
        spawn_notification_pump(&state);
        state
    }

    /// Recent notifications, oldest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.iter().cloned().collect()
    }

    async fn push_notification(&self, notification: Notification) {
        let mut notifications = self.notifications.write().await;
        if notifications.len() == self.notification_capacity {
            notifications.pop_front();
        }
        notifications.push_back(notification);
    }
}

/// Copy coordinator notifications into the state's ring buffer.
fn spawn_notification_pump(state: &SharedState) {
    let mut receiver = state.coordinator.notifications();
    let weak: Weak<AppState> = Arc::downgrade(state);

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    let Some(state) = weak.upgrade() else { break };
                    info!(
                        title = %notification.title,
                        error_code = %notification.error_code,
                        "{}",
                        notification.message
                    );
                    state.push_notification(notification).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification pump lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropoff_core::DropoffError;

    #[tokio::test]
    async fn test_notifications_are_bounded() {
        let mut config = Config::default();
        config.tower.id = "00AA11BB22CC33DD".into();
        config.server.notification_capacity = 2;
        let backend = HttpBackend::new(&config.backend, &config.dropoff).unwrap();
        let state = AppState::new(
            config,
            Arc::new(backend),
            Arc::new(ScriptedGateway::new()),
        );

        for locker_id in 1..=3 {
            let err = DropoffError::DoorVerifyTimeout { locker_id, ticks: 6 };
            state
                .push_notification(Notification::from_error(&err))
                .await;
        }

        let kept = state.notifications().await;
        assert_eq!(kept.len(), 2);
        assert!(kept[0].id < kept[1].id);
    }
}
