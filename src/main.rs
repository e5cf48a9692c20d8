//! TrafficWatch Enforcement Server
//!
//! Main entry point for the enforcement backend.

use std::sync::Arc;
use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trafficwatch_server::{
    alert_policy::{AlertPolicyEngine, MySqlAlertStore},
    audit_log::MySqlAuditLogStore,
    camera_monitor::{HeartbeatService, LivenessMonitor},
    cameras::MySqlCameraStore,
    enforcement_pipeline::EnforcementPipeline,
    event_bus::{BusRelay, EventBus, EventSink},
    fine_rules::{FineEngine, MySqlFineRuleStore},
    realtime_hub::RealtimeHub,
    state::{AppConfig, AppState, SystemHealth},
    vehicle_ledger::{MySqlVehicleStore, VehicleLedger},
    violations::MySqlViolationStore,
    web_api,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trafficwatch_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TrafficWatch enforcement server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        database_url = %config.database_url,
        redis_url = %config.redis_url,
        heartbeat_staleness_sec = config.heartbeat_staleness_sec,
        liveness_interval_sec = config.liveness_interval_sec,
        "Configuration loaded"
    );

    // Create database pool
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    // Connect the event bus (explicit lifecycle, injected everywhere below)
    let bus = EventBus::connect(&config.redis_url).await?;
    let sink: Arc<dyn EventSink> = Arc::new(bus.clone());

    // Repositories (one per entity)
    let violations = Arc::new(MySqlViolationStore::new(pool.clone()));
    let vehicles = Arc::new(MySqlVehicleStore::new(pool.clone()));
    let cameras = Arc::new(MySqlCameraStore::new(pool.clone()));
    let alerts_store = Arc::new(MySqlAlertStore::new(pool.clone()));
    let fine_rules = Arc::new(MySqlFineRuleStore::new(pool.clone()));
    let audit = Arc::new(MySqlAuditLogStore::new(pool.clone()));

    // Core components
    let ledger = Arc::new(VehicleLedger::new(vehicles));
    let fines = Arc::new(FineEngine::new(fine_rules));
    let alerts = Arc::new(AlertPolicyEngine::new(alerts_store, sink.clone()));
    let pipeline = Arc::new(EnforcementPipeline::new(
        violations.clone(),
        ledger.clone(),
        fines,
        alerts.clone(),
        audit.clone(),
        sink.clone(),
    ));
    tracing::info!("Enforcement pipeline initialized");

    let heartbeat = Arc::new(HeartbeatService::new(cameras.clone(), sink.clone()));
    let liveness = Arc::new(LivenessMonitor::new(
        cameras.clone(),
        sink.clone(),
        Duration::from_secs(config.heartbeat_staleness_sec),
        Duration::from_secs(config.liveness_interval_sec),
    ));

    let realtime = Arc::new(RealtimeHub::new());
    let relay = Arc::new(BusRelay::new(config.redis_url.clone(), realtime.clone()));

    // Initialize system health
    let system_health = Arc::new(RwLock::new(SystemHealth::default()));

    // Create application state
    let state = AppState {
        pool,
        config,
        bus,
        pipeline,
        ledger,
        violations,
        cameras,
        alerts,
        heartbeat,
        liveness: liveness.clone(),
        audit,
        realtime,
        system_health: system_health.clone(),
    };

    // Start the liveness sweep
    liveness.start().await;
    tracing::info!("Liveness monitor started");

    // Start the bus-to-dashboard relay
    relay.start().await;
    tracing::info!("Bus relay started");

    // Start system health monitoring
    tokio::spawn(async move {
        use sysinfo::System;
        let mut sys = System::new_all();
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            sys.refresh_all();

            let cpu = {
                let cpus = sys.cpus();
                if cpus.is_empty() {
                    0.0
                } else {
                    cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
                }
            };
            let memory = if sys.total_memory() > 0 {
                (sys.used_memory() as f32 / sys.total_memory() as f32) * 100.0
            } else {
                0.0
            };

            let mut health = system_health.write().await;
            health.update(cpu, memory);
        }
    });

    // Create router
    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Tear down the background tasks and the broker connection
    relay.stop().await;
    liveness.stop().await;
    state.bus.shutdown();

    Ok(())
}
