//! Standalone agent binary.
//!
//! Usage:
//!   cargo run -p voxbug_agent -- [--config agent.json] [--bind 0.0.0.0:0]
//!       [--domain 127.0.0.1:40102] [--tick-hz 60] [--mode orbital|linear]
//!       [--voxel-server 127.0.0.1:40106]... [--audio-mixer 127.0.0.1:40108]...
//!       [--no-audio]
//!
//! The agent animates the bug until Ctrl+C / SIGTERM, then erases it and
//! exits.

use std::env;
use std::sync::atomic::Ordering;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use voxbug_shared::config::AgentConfig;

fn parse_args() -> anyhow::Result<AgentConfig> {
    let args: Vec<String> = env::args().collect();

    // The config file is the base; flags override it.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            AgentConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => AgentConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 2,
            "--bind" if i + 1 < args.len() => {
                cfg.bind_addr = args[i + 1].clone();
                i += 2;
            }
            "--domain" if i + 1 < args.len() => {
                cfg.domain_server = Some(args[i + 1].clone());
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
                i += 2;
            }
            "--mode" if i + 1 < args.len() => {
                cfg.motion = args[i + 1].parse()?;
                i += 2;
            }
            "--voxel-server" if i + 1 < args.len() => {
                cfg.voxel_servers.push(args[i + 1].clone());
                i += 2;
            }
            "--audio-mixer" if i + 1 < args.len() => {
                cfg.audio_mixers.push(args[i + 1].clone());
                i += 2;
            }
            "--no-audio" => {
                cfg.audio_enabled = false;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        bind = %cfg.bind_addr,
        domain = ?cfg.domain_server,
        tick_hz = cfg.tick_hz,
        mode = ?cfg.motion,
        voxel_servers = cfg.voxel_servers.len(),
        audio_mixers = cfg.audio_mixers.len(),
        "Starting agent"
    );

    let (mut agent, local) = voxbug_agent::bind(&cfg).await.context("create agent")?;
    info!(%local, "Agent socket bound");

    let shutdown = agent.shutdown_handle();
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Ctrl+C handler unavailable");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C"),
            _ = terminate => info!("Received SIGTERM"),
        }
        shutdown.store(true, Ordering::SeqCst);
    });

    agent.run().await;
    Ok(())
}
