//! moodcast client
//!
//! Records a short moment from the camera (or picks a file), tags it with
//! an emotion and shares it to the moodcast feed.

mod api;
mod capture;
mod config;
mod error;
mod logging;
mod pipeline;
mod upload;

use anyhow::{bail, Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use api::FeedClient;
use capture::{CaptureMode, ReplayDevice};
use config::Config;
use pipeline::{create_engine_channels, Engine, EngineCommand, EngineStatus};
use upload::Emotion;

fn main() -> Result<()> {
    let _log_guard = logging::init_logging()?;

    info!("moodcast client starting...");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let register = args.iter().any(|a| a == "--register");
    let config = match config_arg(&args)? {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded from {:?}", config.config_path());

    let runtime = Arc::new(tokio::runtime::Runtime::new()?);

    let client = FeedClient::new(&config.server)?;
    if let Err(e) = runtime.block_on(sign_in(&client, &config, register)) {
        error!("Sign in failed: {:#}", e);
        eprintln!("Sign in failed: {:#}", e);
        std::process::exit(1);
    }

    let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels();

    let device = ReplayDevice::new(config.capture.replay_source.clone());
    let printer_client = client.clone();
    let engine = Engine::new(config, Box::new(device), client, cmd_rx, status_tx);

    let engine_runtime = runtime.clone();
    let engine_handle = std::thread::spawn(move || {
        engine_runtime.block_on(async move {
            let mut engine = engine;
            if let Err(e) = engine.run().await {
                error!("Engine error: {}", e);
            }
        });
    });

    runtime.spawn(print_status(status_rx, printer_client));

    // Initial points and feed
    let initial_tx = cmd_tx.clone();
    runtime.block_on(async move {
        let _ = initial_tx.send(EngineCommand::RefreshPoints).await;
        let _ = initial_tx.send(EngineCommand::RefreshFeed).await;
    });

    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c_runtime = runtime.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let tx = ctrl_c_tx.clone();
        ctrl_c_runtime.spawn(async move {
            let _ = tx.send(EngineCommand::Shutdown).await;
        });
    })?;

    // stdin blocks, so it gets its own thread; the process exits once the engine does
    let input_tx = cmd_tx.clone();
    std::thread::spawn(move || read_commands(input_tx));

    println!("Type 'help' for commands.");
    let _ = engine_handle.join();

    // Let the printer flush the last status lines
    runtime.block_on(async {
        let _ = cmd_tx.send(EngineCommand::Shutdown).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    });

    info!("Shutdown complete");
    Ok(())
}

/// Value of `--config PATH`, if given
fn config_arg(args: &[String]) -> Result<Option<PathBuf>> {
    match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(path) => Ok(Some(PathBuf::from(path))),
            None => bail!("--config requires a path"),
        },
        None => Ok(None),
    }
}

async fn sign_in(client: &FeedClient, config: &Config, register: bool) -> Result<()> {
    let email = config
        .email()
        .context("No account email configured (set account.email or MOODCAST_EMAIL)")?;
    let password = config
        .password()
        .context("No password provided (set MOODCAST_PASSWORD)")?;

    if register {
        let outcome = client.register(&email, &password).await?;
        if outcome.created {
            info!("Registered {}", email);
        } else {
            warn!("Registration not completed: {}", outcome.message);
        }
        println!("{}", outcome.message);
    }

    let login = client.login(&email, &password).await?;
    info!("Signed in as {}", email);
    println!("{}", login.message);
    Ok(())
}

/// Map one line of user input to an engine command
fn parse_command(line: &str) -> Result<Option<EngineCommand>, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "upload" => EngineCommand::SetMode(CaptureMode::FileSelect),
        "live" => EngineCommand::SetMode(CaptureMode::LiveCapture),
        "file" if rest.is_empty() => return Err("usage: file PATH".to_string()),
        "file" => EngineCommand::SelectFile(PathBuf::from(rest)),
        "clear" => EngineCommand::ClearFile,
        "start" => EngineCommand::StartRecording,
        "stop" => EngineCommand::StopRecording,
        "share" if rest.is_empty() => {
            return Err(format!("usage: share EMOTION ({})", emotion_list()))
        }
        "share" => EngineCommand::Submit {
            emotion: rest.to_string(),
        },
        "feed" => EngineCommand::RefreshFeed,
        "points" => EngineCommand::RefreshPoints,
        "logout" => EngineCommand::Logout,
        "quit" | "exit" => EngineCommand::Shutdown,
        other => return Err(format!("unknown command: {}", other)),
    };
    Ok(Some(cmd))
}

fn emotion_list() -> String {
    Emotion::ALL
        .iter()
        .map(Emotion::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_commands(cmd_tx: mpsc::Sender<EngineCommand>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().eq_ignore_ascii_case("help") {
            print_commands();
            continue;
        }
        match parse_command(&line) {
            Ok(Some(cmd)) => {
                let stop = matches!(cmd, EngineCommand::Shutdown | EngineCommand::Logout);
                if cmd_tx.blocking_send(cmd).is_err() || stop {
                    return;
                }
            }
            Ok(None) => {}
            Err(msg) => println!("{}", msg),
        }
    }
    // stdin closed
    let _ = cmd_tx.blocking_send(EngineCommand::Shutdown);
}

async fn print_status(mut status_rx: broadcast::Receiver<EngineStatus>, client: FeedClient) {
    loop {
        let status = match status_rx.recv().await {
            Ok(status) => status,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Status printer missed {} updates", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match status {
            EngineStatus::ModeChanged(CaptureMode::FileSelect) => {
                println!("Mode: upload a file ('file PATH', then 'share EMOTION')")
            }
            EngineStatus::ModeChanged(CaptureMode::LiveCapture) => println!("Mode: live capture"),
            EngineStatus::PreviewReady => println!("Camera ready. 'start' to record."),
            EngineStatus::RecordingStarted { format } => println!("Recording ({})...", format),
            EngineStatus::RecordingProgress { .. } => {}
            EngineStatus::ArtifactReady { bytes, format } => {
                println!("Recorded {} bytes of {}. 'share EMOTION' to post it.", bytes, format)
            }
            EngineStatus::FileSelected { filename, bytes } => {
                println!("Selected {} ({} bytes)", filename, bytes)
            }
            EngineStatus::FileCleared => println!("Selection cleared"),
            EngineStatus::DeviceLost { reason } => println!("Camera lost: {}", reason),
            EngineStatus::SubmitAvailable(_) => {}
            EngineStatus::Uploading => println!("Uploading..."),
            EngineStatus::Uploaded { message, .. } => println!("{}", message),
            EngineStatus::UploadRejected(reason) => println!("{}", reason),
            EngineStatus::UploadFailed(reason) => println!("Upload failed: {}", reason),
            EngineStatus::Points(points) => println!("Points: {}", points),
            EngineStatus::Feed(posts) => {
                println!("Feed ({} posts):", posts.len());
                for post in posts {
                    println!(
                        "  [{}] {:?} feeling {}: {}",
                        post.time,
                        post.kind,
                        post.emotion,
                        client.media_url(&post.filename)
                    );
                }
            }
            EngineStatus::LoggedOut => println!("Logged out"),
            EngineStatus::Error(message) => println!("Error: {}", message),
        }
    }
}

fn print_commands() {
    println!("COMMANDS:");
    println!("    upload        Switch to file upload mode");
    println!("    live          Switch to live capture and open the camera");
    println!("    file PATH     Pick a file to share");
    println!("    clear         Forget the picked file");
    println!("    start         Start recording");
    println!("    stop          Stop recording");
    println!("    share EMOTION Share with one of: {}", emotion_list());
    println!("    feed          Show the feed");
    println!("    points        Show your points");
    println!("    logout        Log out and exit");
    println!("    quit          Exit");
}

fn print_help() {
    println!("moodcast - share how you feel, one moment at a time");
    println!();
    println!("USAGE:");
    println!("    moodcast [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help        Print this help message");
    println!("    --config PATH     Use this config file");
    println!("    --register        Create the account before signing in");
    println!();
    println!("ENVIRONMENT:");
    println!("    MOODCAST_EMAIL      Account email (overrides config)");
    println!("    MOODCAST_PASSWORD   Account password");
    println!("    MOODCAST_LOG_PATH   Log directory");
    println!("    RUST_LOG            Set log level (e.g., debug, info, warn)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_share_keeps_emotion_text() {
        match parse_command("share Happy") {
            Ok(Some(EngineCommand::Submit { emotion })) => assert_eq!(emotion, "Happy"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(parse_command("share").is_err());
    }

    #[test]
    fn test_parse_file_path_with_spaces() {
        match parse_command("file  /tmp/my clip.mp4 ") {
            Ok(Some(EngineCommand::SelectFile(path))) => {
                assert_eq!(path, PathBuf::from("/tmp/my clip.mp4"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_mode_and_blank_lines() {
        assert!(matches!(
            parse_command("LIVE"),
            Ok(Some(EngineCommand::SetMode(CaptureMode::LiveCapture)))
        ));
        assert!(matches!(parse_command("   "), Ok(None)));
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn test_config_arg() {
        let args: Vec<String> = ["moodcast", "--config", "/etc/moodcast.toml"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            config_arg(&args).unwrap(),
            Some(PathBuf::from("/etc/moodcast.toml"))
        );
        assert!(config_arg(&args[..2]).is_err());
    }
}
