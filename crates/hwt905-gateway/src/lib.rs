//! HWT905 Gateway
//!
//! Wires the serial session, the poller and the TCP snapshot responder
//! together, and shuts them down on SIGINT/SIGTERM.

use anyhow::Context;
use hwt905_poller::{PollerStats, Poller};
use hwt905_protocol::{init_sequence, DeviceSession, LinkStats, MeasurementRecord};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod config;
mod publisher;

pub use config::GatewayConfig;
pub use publisher::{snapshot_line, Snapshot};

/// Initialize logging; `RUST_LOG` overrides the default `info` filter
pub fn init_logging(json: bool) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

/// Run the gateway until a shutdown signal arrives
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let session = DeviceSession::open(
        &config.serial.device,
        config.serial.baud_rate,
        config.poller.buffer_capacity,
    )
    .with_context(|| format!("failed to open {}", config.serial.device))?;

    let (mut poller, queue, records) = Poller::new(session, config.poller_config());

    if config.device.configure_on_start {
        let commands = init_sequence(config.device.output_rate, config.content_mask());
        info!(
            "Queueing sensor configuration: {:?}, content 0x{:04X}",
            config.device.output_rate,
            config.content_mask().bits()
        );
        for command in commands {
            queue
                .send(command)
                .await
                .context("command queue closed before start")?;
        }
    }

    let server = if config.server.enabled {
        let listener = TcpListener::bind(config.server.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
        Some(tokio::spawn(publisher::serve(listener, records.clone())))
    } else {
        None
    };

    tokio::select! {
        _ = poller.run_mode(config.poller.mode) => {}
        _ = shutdown_signal() => info!("Shutdown requested"),
    }

    if let Some(server) = server {
        server.abort();
    }

    let record = records.borrow().clone();
    log_summary(poller.stats(), poller.session().stats(), &record);
    drop(poller);
    info!("Closed {}", config.serial.device);

    Ok(())
}

fn log_summary(poller: PollerStats, link: LinkStats, record: &MeasurementRecord) {
    info!(
        rounds = poller.rounds,
        requests = poller.requests,
        decoded = poller.decoded,
        timeouts = poller.timeouts,
        rejected = poller.rejected,
        transport_errors = poller.transport_errors,
        commands = poller.commands,
        "Poller summary"
    );
    info!(
        frames = link.frames_decoded,
        checksum_mismatches = link.checksum_mismatches,
        unknown_registers = link.unknown_registers,
        noise_bytes = link.noise_bytes,
        stale_frames = link.stale_frames,
        "Link summary"
    );
    info!(
        "Last values: acc={:?} m/s^2 gyro={:?} deg/s angle={:?} deg mag={:?} temp={:.2} C",
        record.acceleration,
        record.angular_velocity,
        record.angle,
        record.magnetic,
        record.temperature
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
