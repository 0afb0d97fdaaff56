pub mod cmdsock;
pub mod config;
pub mod key_processor;
pub mod method;
pub mod port;
pub mod supplicant;
pub mod wireless;

use anyhow::Result;
use clap::Parser;
use cmdsock::ControlRequest;
use dot1x_ipc::{Command, Response};
use dot1x_net::link::{self, LinkEvent};
use method::MethodRegistry;
use port::Port;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drives `port` until it is stopped or one of its input channels closes.
pub async fn event_loop(
    port: &mut Port,
    frames: &mut mpsc::Receiver<Vec<u8>>,
    links: &mut mpsc::Receiver<LinkEvent>,
    controls: &mut mpsc::Receiver<ControlRequest>,
) -> Result<()> {
    loop {
        let deadline = port.next_deadline();
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => port.handle_frame(&frame),
                None => {
                    error!("Datalink receiver stopped");
                    break;
                }
            },
            event = links.recv() => match event {
                Some(event) => port.handle_link_event(event),
                None => {
                    warn!("Link monitor stopped");
                    break;
                }
            },
            request = controls.recv() => match request {
                Some(ControlRequest { command, reply }) => {
                    let response = port.handle_command(command);
                    if reply.send(response).is_err() {
                        warn!("Control client went away before the reply");
                    }
                }
                None => break,
            },
            _ = sleep_until_deadline(deadline) => port.fire_timers(Instant::now()),
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down.");
                port.handle_command(Command::Stop);
            }
        }
        port.sweep();
        if port.is_stopped() {
            break;
        }
    }
    Ok(())
}

async fn sighup_handler(config_file: PathBuf, controls: mpsc::Sender<ControlRequest>) {
    let mut stream = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to create SIGHUP listener: {}", e);
            return;
        }
    };

    while stream.recv().await.is_some() {
        info!("SIGHUP received, reloading configuration...");
        match config::load_config_from_path(&config_file) {
            Ok(new_config) => {
                let command = Command::Run {
                    profile: new_config.profile,
                };
                match cmdsock::dispatch(&controls, command).await {
                    Response::Success => info!("Configuration reloaded successfully."),
                    Response::Error(e) => {
                        error!("Failed to apply reloaded configuration: {}", e);
                        break;
                    }
                    Response::Status(_) => {}
                }
            }
            Err(e) => {
                error!("Failed to reload configuration: {:#}", e);
            }
        }
    }
}

pub async fn run() -> Result<()> {
    let args = config::Args::parse();
    let config = match config::load_config_from_path(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.loglevel.as_directive())),
        )
        .init();

    info!("Starting dot1x supplicant on {}", config.interface);

    let channel = link::open_channel(&config.interface)?;
    let wireless = link::is_wireless(&config.interface);
    let registry = Arc::new(MethodRegistry::with_builtin());
    info!("Available EAP methods: {:?}", registry);

    let mut port = Port::new(
        &config.interface,
        channel.mac,
        wireless,
        channel.tx,
        &config,
        registry,
    );
    port.restore_credentials();

    let (frame_tx, mut frame_rx) = mpsc::channel(100);
    let _receiver_handle = link::spawn_receiver(channel.rx, frame_tx);

    let (link_tx, mut link_rx) = mpsc::channel(16);
    let _monitor_handle = tokio::spawn(link::monitor_link(
        config.interface.clone(),
        config.tunables.link_poll_interval(),
        link_tx,
    ));

    let (control_tx, mut control_rx) = mpsc::channel(16);
    let cmdsock_handle = {
        let path = config.cmdsocket.clone();
        let controls = control_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = cmdsock::run_cmdsock_listener(path, controls).await {
                error!("Cmdsock listener failed: {}", e);
            }
        })
    };
    let _sighup_handle = tokio::spawn(sighup_handler(args.config_file.clone(), control_tx));

    event_loop(&mut port, &mut frame_rx, &mut link_rx, &mut control_rx).await?;

    cmdsock_handle.abort();
    if let Err(e) = std::fs::remove_file(&config.cmdsocket) {
        warn!("Failed to remove {}: {}", config.cmdsocket, e);
    }
    info!("Supplicant on {} stopped", config.interface);
    Ok(())
}
