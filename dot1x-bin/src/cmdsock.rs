use anyhow::Result;
use dot1x_ipc::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

/// A control command waiting for the event loop, with the channel its
/// answer goes back on.
#[derive(Debug)]
pub struct ControlRequest {
    pub command: Command,
    pub reply: oneshot::Sender<Response>,
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Run { .. } => "Run",
        Command::Retry => "Retry",
        Command::TakeUserInput { .. } => "TakeUserInput",
        Command::Stop => "Stop",
        Command::Status => "Status",
    }
}

/// Hands `command` to the event loop and waits for its answer.
pub async fn dispatch(controls: &mpsc::Sender<ControlRequest>, command: Command) -> Response {
    let (reply, response) = oneshot::channel();
    if controls.send(ControlRequest { command, reply }).await.is_err() {
        return Response::Error("supplicant is not running".to_string());
    }
    match response.await {
        Ok(response) => response,
        Err(_) => Response::Error("supplicant dropped the request".to_string()),
    }
}

async fn handle_connection(mut stream: UnixStream, controls: mpsc::Sender<ControlRequest>) -> Result<()> {
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;

    let response = match serde_json::from_slice::<Command>(&buffer) {
        Ok(command) => {
            info!("Received {} command", command_name(&command));
            dispatch(&controls, command).await
        }
        Err(e) => {
            warn!("Failed to deserialize command: {}", e);
            Response::Error(format!("Deserialization failed: {}", e))
        }
    };

    let serialized = serde_json::to_vec(&response)?;
    stream.write_all(&serialized).await?;
    stream.shutdown().await?;

    Ok(())
}

pub async fn run_cmdsock_listener(path: String, controls: mpsc::Sender<ControlRequest>) -> Result<()> {
    let socket_path = Path::new(&path);

    // Remove the socket file if it already exists
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(&path)?;
    info!("Cmdsock listener started on {}", path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let controls = controls.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, controls).await {
                        error!("Error handling cmdsock connection: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Cmdsock accept error: {}", e);
            }
        }
    }
}
