//! One monitoring session: the bridge, its signal hub, the notifier and
//! every page controller, wired together.

use crate::analysis::AnalysisController;
use crate::bridge::{Backend, BridgeAdapter};
use crate::config::Config;
use crate::dashboard::DashboardController;
use crate::navigator::LogNavigator;
use crate::progress::Notifier;
use crate::search::SearchOverlay;
use crate::signal::SignalHub;
use crate::system_log::SystemLogController;
use std::sync::Arc;
use tokio::time::Instant;

pub struct Session {
    pub config: Config,
    pub bridge: BridgeAdapter,
    pub signals: Arc<SignalHub>,
    pub notifier: Notifier,
    pub dashboard: DashboardController,
    pub navigator: LogNavigator,
    pub search: SearchOverlay,
    pub analysis: AnalysisController,
    pub system_log: SystemLogController,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        let bridge = BridgeAdapter::new(backend);
        let signals = bridge.signals();
        let notifier = Notifier::new(&config.notifications);

        let dashboard = DashboardController::new(bridge.clone(), notifier.clone(), &config);
        let navigator = LogNavigator::new(bridge.clone(), notifier.clone(), &config.notifications);
        let search = SearchOverlay::new(navigator.clone(), notifier.clone(), &config.search);
        let analysis = AnalysisController::new(bridge.clone(), navigator.clone(), notifier.clone());
        let system_log = SystemLogController::new(Some(bridge.clone()), notifier.clone());

        log::info!("session created for backend '{}'", bridge.backend_name());
        Self {
            config,
            bridge,
            signals,
            notifier,
            dashboard,
            navigator,
            search,
            analysis,
            system_log,
        }
    }

    /// Hook up push handlers and run the dashboard's initial load.
    ///
    /// Safe to call more than once; handlers are only connected the first time.
    pub async fn start(&self) {
        self.notifier.ensure_progress_handler(&self.signals);
        if self.dashboard.connect_signals() {
            log::info!("session started");
        }
        self.dashboard.initial_load().await;
    }

    /// Advance every deadline-driven piece of view state
    pub fn tick(&self, now: Instant) {
        self.notifier.tick(now);
        self.dashboard.tick(now);
        self.navigator.tick(now);
    }

    pub fn shutdown(&self) {
        self.dashboard.shutdown();
        self.search.clear();
        log::info!("session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryBackend;

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let backend = Arc::new(MemoryBackend::demo());
        let session = Session::new(backend.clone(), Config::default());

        session.start().await;
        session.start().await;

        assert_eq!(session.signals.progress.subscriber_count(), 1);
        assert_eq!(session.signals.update_alerts.subscriber_count(), 1);
        assert_eq!(backend.call_count("get_sound_status"), 2);
        assert_eq!(session.dashboard.state().sound_enabled, Some(true));
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_dashboard() {
        let session = Session::new(Arc::new(MemoryBackend::demo()), Config::default());
        session.start().await;
        session.shutdown();

        assert_eq!(session.signals.update_alerts.subscriber_count(), 0);
        assert_eq!(session.signals.progress.subscriber_count(), 1);
    }
}
