//! Composition root for embedding applications.
//!
//! [`Desk::start`] builds the pool, runs migrations, and wires the
//! delivery registry, active-jobs counter, event bus, session monitor,
//! and auth debouncer together. UI views talk to the returned handle:
//! `sign_in`/`sign_out`, `launch`, and `subscribe_events` for the
//! notification feed.

pub mod config;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use quantdesk_core::types::DbId;
use quantdesk_db::models::credit::{CreditAccount, CreditBalance};
use quantdesk_db::repositories::CreditRepo;
use quantdesk_db::DbPool;
use quantdesk_engine::{
    ActiveJobs, DeliveryRegistry, JobHandle, JobLauncher, LaunchError, LaunchRequest, PgStore,
};
use quantdesk_events::{DeskEvent, EventBus};
use quantdesk_executor::ExecutorApi;
use quantdesk_realtime::RealtimeBridge;
use quantdesk_session::device::DeviceStateError;
use quantdesk_session::{
    AuthContext, AuthDebouncer, AuthSignal, DeviceState, PgSessionStore, SessionDeactivated,
    SessionMonitor, SessionStoreError, SignOutDecision,
};

pub use config::{ConfigError, DeskConfig};
pub use quantdesk_engine::DeliveryHandler;

/// Errors raised while bringing the desk up.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    DeviceState(#[from] DeviceStateError),
}

/// Errors surfaced by desk operations after startup.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("No user is signed in")]
    NotSignedIn,

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Session(#[from] SessionStoreError),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// A user's per-feature credit position.
#[derive(Debug)]
pub struct CreditOverview {
    pub account: Option<CreditAccount>,
    pub balances: Vec<CreditBalance>,
}

/// The assembled orchestration core.
pub struct Desk {
    pool: DbPool,
    registry: Arc<DeliveryRegistry>,
    active: Arc<ActiveJobs>,
    bus: Arc<EventBus>,
    auth: Arc<AuthContext>,
    device: Arc<DeviceState>,
    executor: Arc<ExecutorApi>,
    launcher: JobLauncher,
    monitor: Arc<SessionMonitor>,
    deactivation_tx: mpsc::UnboundedSender<SessionDeactivated>,
    raw_auth_tx: mpsc::UnboundedSender<AuthSignal>,
    bridge: tokio::sync::Mutex<Option<Arc<RealtimeBridge>>>,
    realtime_url: String,
    cancel: CancellationToken,
}

impl Desk {
    /// Connect, migrate, and wire everything up.
    pub async fn start(config: DeskConfig) -> Result<Arc<Self>, StartError> {
        let pool = quantdesk_db::create_pool(&config.database_url).await?;
        quantdesk_db::health_check(&pool).await?;
        quantdesk_db::run_migrations(&pool).await?;
        tracing::info!("Database ready");

        let device = Arc::new(DeviceState::load_or_init(&config.state_path)?);
        let auth = Arc::new(AuthContext::new());
        let registry = Arc::new(DeliveryRegistry::new());
        let active = Arc::new(ActiveJobs::new());
        let bus = Arc::new(EventBus::default());
        let cancel = CancellationToken::new();

        let store = Arc::new(PgStore::new(pool.clone()));
        let job_store: Arc<dyn quantdesk_engine::JobStore> = store.clone();
        let ledger: Arc<dyn quantdesk_engine::CreditLedger> = store;
        let executor = Arc::new(ExecutorApi::new(config.executor_url.clone()));
        let dispatcher: Arc<dyn quantdesk_engine::AnalysisDispatcher> = executor.clone();
        let launcher = JobLauncher::new(
            job_store,
            ledger,
            dispatcher,
            Arc::clone(&registry),
            Arc::clone(&active),
            Arc::clone(&bus),
            config.poll,
            cancel.child_token(),
        );

        let session_store: Arc<dyn quantdesk_session::SessionStore> =
            Arc::new(PgSessionStore::new(pool.clone()));
        let monitor = Arc::new(SessionMonitor::new(
            session_store,
            Arc::clone(&auth),
            Arc::clone(&device),
            Arc::clone(&active),
            Arc::clone(&bus),
            config.validation_interval,
        ));

        // Channel plumbing: the bridge and the debouncer feed the
        // monitor. The senders live here so the monitor's loop outlives
        // any individual bridge.
        let (deactivation_tx, deactivation_rx) = mpsc::unbounded_channel();
        let (raw_auth_tx, raw_auth_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        tokio::spawn(
            AuthDebouncer::new(config.debounce_window).run(
                raw_auth_rx,
                settled_tx,
                cancel.child_token(),
            ),
        );
        tokio::spawn(Arc::clone(&monitor).run(
            deactivation_rx,
            settled_rx,
            cancel.child_token(),
        ));
        tokio::spawn(quantdesk_session::cleanup::run(
            pool.clone(),
            cancel.child_token(),
        ));

        tracing::info!("Desk started");
        Ok(Arc::new(Self {
            pool,
            registry,
            active,
            bus,
            auth,
            device,
            executor,
            launcher,
            monitor,
            deactivation_tx,
            raw_auth_tx,
            bridge: tokio::sync::Mutex::new(None),
            realtime_url: config.realtime_url,
            cancel,
        }))
    }

    /// Subscribe to the user-visible notification feed.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeskEvent> {
        self.bus.subscribe()
    }

    /// Number of jobs currently in flight on this device.
    pub fn active_job_count(&self) -> usize {
        self.active.count()
    }

    /// Sign a user in on this device: activates the device session
    /// (deactivating every other device) and starts the realtime bridge.
    pub async fn sign_in(
        &self,
        user_id: DbId,
        device_info: serde_json::Value,
    ) -> Result<(), DeskError> {
        self.monitor.sign_in(user_id, device_info).await?;

        let bridge = RealtimeBridge::start(
            self.realtime_url.clone(),
            user_id,
            self.device.session_id(user_id),
            Arc::clone(&self.registry),
            self.deactivation_tx.clone(),
            self.cancel.child_token(),
        );
        if let Some(previous) = self.bridge.lock().await.replace(bridge) {
            previous.shutdown().await;
        }
        Ok(())
    }

    /// User-initiated sign-out. With jobs in flight the local teardown
    /// is deferred until they complete; the bridge is stopped either way.
    pub async fn sign_out(&self) -> Result<SignOutDecision, DeskError> {
        if let Some(bridge) = self.bridge.lock().await.take() {
            bridge.shutdown().await;
        }
        Ok(self.monitor.sign_out().await?)
    }

    /// Launch an analysis job for the signed-in user.
    pub async fn launch(
        &self,
        request: LaunchRequest,
        handler: DeliveryHandler,
    ) -> Result<JobHandle, DeskError> {
        let user = self.auth.current().ok_or(DeskError::NotSignedIn)?;
        Ok(self.launcher.launch(user.user_id, request, handler).await?)
    }

    /// Cancel an in-flight analysis: stop the local timers, drop the
    /// registration, and ask the execution service to abandon the work.
    /// The service-side cancel is best-effort -- a result racing in is
    /// already suppressed once the handle is detached.
    pub async fn cancel_analysis(&self, handle: &JobHandle) {
        handle.detach();
        if let Err(e) = self.executor.cancel(handle.job_id()).await {
            tracing::warn!(job_id = handle.job_id(), error = %e, "Service-side cancel failed");
        }
    }

    /// Feed a raw auth-provider signal into the debouncer.
    pub fn auth_signal(&self, signal: AuthSignal) {
        let _ = self.raw_auth_tx.send(signal);
    }

    /// The signed-in user's plan and per-feature balances.
    pub async fn credit_overview(&self) -> Result<CreditOverview, DeskError> {
        let user = self.auth.current().ok_or(DeskError::NotSignedIn)?;
        let account = CreditRepo::account(&self.pool, user.user_id).await?;
        let balances = CreditRepo::balances(&self.pool, user.user_id).await?;
        Ok(CreditOverview { account, balances })
    }

    /// Stop every background task and close the pool.
    pub async fn shutdown(&self) {
        tracing::info!("Desk shutting down");
        self.cancel.cancel();
        if let Some(bridge) = self.bridge.lock().await.take() {
            bridge.shutdown().await;
        }
        self.pool.close().await;
        tracing::info!("Desk shut down complete");
    }
}
