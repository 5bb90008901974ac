use anyhow::Result;
use weather_power_forecast::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real deployments set PVF__ variables directly
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load()?;

    let app_state = controller::AppState::new(cfg.clone())?;
    let app = api::router(app_state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0 - the API is reachable from the network");
    }

    info!(
        %addr,
        cell = %app_state.cell,
        capacity_kw = cfg.site.capacity_kw,
        "starting weather power forecast service"
    );

    controller::spawn_controller_tasks(app_state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
