use anyhow::{Context, Result};
use insightmed::{api, config, dashboard::DashboardService, logging};
use std::sync::Arc;
use tokio::net::TcpListener;

const PORT_RANGE: std::ops::RangeInclusive<u16> = 8501..=8599;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let config = config::init_config().context("failed to load configuration")?;
    let service = DashboardService::connect(config).context("failed to initialise dashboard")?;
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn bind_listener(preferred: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = preferred {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!(
            "No available port found in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ),
    ))
}
