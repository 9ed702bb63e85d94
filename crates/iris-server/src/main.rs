use std::sync::Arc;

use iris_server::{AppState, ServerConfig, router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env();
    log::info!(
        "camera service: {}x{} @ {} fps, device {}",
        config.camera.width(),
        config.camera.height(),
        config.camera.fps(),
        config
            .camera
            .device()
            .map_or_else(|| "auto".to_string(), |index| format!("/dev/video{index}")),
    );

    let state = AppState::with_usb_camera(config.clone());

    if config.enabled {
        let grabber = Arc::clone(state.grabber());
        if let Err(err) = tokio::task::spawn_blocking(move || grabber.start()).await? {
            // The service still comes up; operators can retry through the API.
            log::warn!("camera start failed on boot: {err}");
        }
    }

    let listener = tokio::net::TcpListener::bind(config.bind.as_str()).await?;
    log::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let grabber = Arc::clone(state.grabber());
    tokio::task::spawn_blocking(move || grabber.stop()).await?;
    log::info!("camera released");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("ctrl-c handler failed: {err}");
        return;
    }
    log::info!("shutdown signal received");
}
