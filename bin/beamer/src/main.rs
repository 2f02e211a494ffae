use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use beamer::{render_report, render_status, watch_status, Switch};
use clap::{Parser, Subcommand};
use fleet::{Action, ButtonLayout, Config, DeviceId, Directory, Dispatcher, Fleet, Outcome};
use indexmap::IndexMap;
use log::{error, info, warn};
use pjlink::{Operation, StatusSnapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;

type ErasedError = Box<dyn std::error::Error + Send + Sync + 'static>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "beamer", version, about = "Controls a room of networked projectors")]
struct Cli {
    /// JSON file listing projectors, aliases, groups and buttons
    #[arg(long, env = "BEAMER_CONFIG")]
    config: PathBuf,

    /// Connect and read timeout in seconds
    #[arg(long, env = "BEAMER_TIMEOUT")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Polls projectors and prints their state
    Status {
        #[arg(long)]
        json: bool,
        /// Keeps polling every SECS seconds until interrupted
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        watch: Option<u64>,
        targets: Vec<String>,
    },
    Power {
        switch: Switch,
        targets: Vec<String>,
    },
    Mute {
        switch: Switch,
        targets: Vec<String>,
    },
    Freeze {
        switch: Switch,
        targets: Vec<String>,
    },
    /// Reads button numbers from stdin, one per line
    Listen {
        #[arg(long)]
        layout: Option<ButtonLayout>,
    },
}

#[tokio::main]
async fn main() -> Result<(), ErasedError> {
    pretty_env_logger::init_timed();

    let cli = Cli::parse();

    info!("beamer version {VERSION}");

    let config = Config::load(&cli.config)?;
    let timeout = cli
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.timeout());

    let fleet = config.fleet(timeout)?;
    info!("loaded {} projectors", fleet.len());

    let mut bindings = config.bindings();
    if let Command::Listen {
        layout: Some(layout),
    } = &cli.command
    {
        bindings = layout.bindings();
        bindings.extend(config.buttons.clone());
    }

    let dispatcher = Arc::new(Dispatcher::with_bindings(fleet, bindings));

    let result = tokio::select! {
        result = run(cli.command, dispatcher.clone()) => result,
        result = shutdown() => result.map(|_| true),
    };

    dispatcher.control().close().await;

    if !result? {
        std::process::exit(1);
    }

    Ok(())
}

/// Whether anything succeeded.
async fn run(command: Command, dispatcher: Arc<Dispatcher<Fleet>>) -> Result<bool, ErasedError> {
    match command {
        Command::Status {
            json,
            watch: None,
            targets,
        } => {
            let room = dispatcher.control();
            let selection = fleet::select(room, &targets)?;
            let status = room.status(&selection).await?;

            show_status(room.directory(), &status, json);

            Ok(status.values().any(|snapshot| snapshot.online))
        }
        Command::Status {
            json,
            watch: Some(secs),
            targets,
        } => {
            let room = dispatcher.control();
            let selection = fleet::select(room, &targets)?;

            info!("polling every {secs}s until interrupted");

            watch_status(room, &selection, Duration::from_secs(secs), None, |status| {
                show_status(room.directory(), status, json);
                println!();
            })
            .await?;

            Ok(true)
        }
        Command::Power { switch, targets } => {
            perform(&dispatcher, switch.action(Operation::Power), &targets).await
        }
        Command::Mute { switch, targets } => {
            perform(&dispatcher, switch.action(Operation::Mute), &targets).await
        }
        Command::Freeze { switch, targets } => {
            perform(&dispatcher, switch.action(Operation::Freeze), &targets).await
        }
        Command::Listen { .. } => {
            listen(dispatcher).await?;
            Ok(true)
        }
    }
}

fn show_status(directory: &Directory, status: &IndexMap<DeviceId, StatusSnapshot>, json: bool) {
    if !json {
        print!("{}", render_status(directory, status));
        return;
    }

    match serde_json::to_string_pretty(status) {
        Ok(json) => println!("{json}"),
        Err(err) => error!("failed to serialize status: {err}"),
    }
}

async fn perform(
    dispatcher: &Dispatcher<Fleet>,
    action: Action,
    targets: &[String],
) -> Result<bool, ErasedError> {
    let report = dispatcher.perform(action, targets).await?;
    print!("{}", render_report(dispatcher.control().directory(), &report));

    Ok(report.outcome() != Outcome::Failed)
}

async fn listen(dispatcher: Arc<Dispatcher<Fleet>>) -> Result<(), ErasedError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut presses = JoinSet::new();

    info!("listening for buttons on stdin");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let button: u8 = match line.parse() {
            Ok(button) => button,
            Err(_) => {
                warn!("ignoring input {line:?}");
                continue;
            }
        };

        let dispatcher = dispatcher.clone();
        presses.spawn(async move {
            match dispatcher.on_button(button).await {
                Ok(report) => println!("{report}"),
                Err(err) => error!("button {button}: {err}"),
            }
        });

        while presses.try_join_next().is_some() {}
    }

    info!("input closed, waiting for {} presses", presses.len());
    while presses.join_next().await.is_some() {}

    Ok(())
}

async fn shutdown() -> Result<(), ErasedError> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("got SIGINT, exiting..."),
        _ = terminate.recv() => info!("got SIGTERM, exiting..."),
    }

    Ok(())
}
