use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dot1x_core::{Profile, StatusReport, UserAnswers};
use dot1x_ipc::{Command, Response};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Control socket of the running daemon
    #[clap(short, long, value_parser, default_value = "/tmp/dot1x.sock")]
    socket: PathBuf,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the supplicant state
    Status,
    /// Replace the active profile with one read from a TOML file
    Run {
        #[clap(value_parser)]
        profile: PathBuf,
    },
    /// Restart authentication
    Retry,
    /// Answer a pending prompt
    Input {
        #[clap(long, value_parser)]
        user_name: Option<String>,
        #[clap(long, value_parser)]
        password: Option<String>,
    },
    /// Log off and stop the daemon
    Stop,
}

async fn send_command(path: &Path, command: Command) -> Result<Response> {
    let mut stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("connecting to {}", path.display()))?;
    let serialized = serde_json::to_vec(&command)?;

    stream.write_all(&serialized).await?;
    stream.shutdown().await?; // Half-close the stream

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;

    let response: Response = serde_json::from_slice(&buffer)?;
    Ok(response)
}

fn load_profile(path: &Path) -> Result<Profile> {
    let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn print_status(report: &StatusReport) {
    println!("{:<16} {}", "State", report.state);
    println!("{:<16} {:?}", "Status", report.status);
    if let Some(name) = &report.eap_type_name {
        println!("{:<16} {}", "EAP method", name);
    }
    if let Some(mac) = &report.authenticator {
        println!(
            "{:<16} {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            "Authenticator", mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        );
    }
    if !report.missing_properties.is_empty() {
        println!("{:<16} {}", "Needs", report.missing_properties.join(", "));
    }
    for (key, value) in &report.method_properties {
        println!("{:<16} {}", key, value);
    }
    if let Some(text) = &report.last_notification {
        println!("{:<16} {}", "Notification", text);
    }
    println!("{:<16} {}", "Generation", report.generation);
}

fn report(action: &str, response: Response) {
    match response {
        Response::Success => println!("{}: ok", action),
        Response::Error(e) => eprintln!("{} failed: {}", action, e),
        Response::Status(_) => eprintln!("Unexpected response from server"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => match send_command(&cli.socket, Command::Status).await? {
            Response::Status(status) => print_status(&status),
            Response::Error(e) => eprintln!("Server error: {}", e),
            Response::Success => eprintln!("Unexpected response from server"),
        },
        Commands::Run { profile } => {
            let profile = load_profile(&profile)?;
            report("Run", send_command(&cli.socket, Command::Run { profile }).await?);
        }
        Commands::Retry => report("Retry", send_command(&cli.socket, Command::Retry).await?),
        Commands::Input { user_name, password } => {
            let answers = UserAnswers { user_name, password };
            report(
                "Input",
                send_command(&cli.socket, Command::TakeUserInput { answers }).await?,
            );
        }
        Commands::Stop => report("Stop", send_command(&cli.socket, Command::Stop).await?),
    }

    Ok(())
}
