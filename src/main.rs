#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use clap::{Parser, Subcommand};
use lendhub_client::LendHubClient;
use lendhub_client::config::Config;
use lendhub_client::services::query_service::UnauthorizedBehavior;
use lendhub_client::telemetry;
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(version, about = "Diagnostic CLI for the LendHub platform API", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and persist the session
    Login { username: String, password: String },
    /// Invalidate the current session, locally and server-side
    Logout,
    /// Show the logged-in user and their permissions
    Whoami,
    /// Fetch an API path through the cached query pipeline
    Get { path: String },
    /// Keep the session alive, refreshing tokens until interrupted
    Monitor,
}

#[allow(clippy::print_stdout)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_telemetry(&cli.config.telemetry)?;

    let client = LendHubClient::new(&cli.config)?;

    match cli.command {
        Command::Login { username, password } => {
            let session = client.session.login(&username, &password).await?;
            println!(
                "Logged in as {} {} ({})",
                session.user.first_name, session.user.last_name, session.user.role
            );
        }
        Command::Logout => {
            client.session.logout().await;
            println!("Logged out");
        }
        Command::Whoami => match client.session.user() {
            Some(user) => {
                println!("{}", serde_json::to_string_pretty(&user)?);
                let permissions: Vec<String> =
                    user.role.permissions().iter().map(|p| format!("{p:?}")).collect();
                println!("permissions: {}", permissions.join(", "));
            }
            None => println!("Not logged in"),
        },
        Command::Get { path } => {
            let value = client
                .queries
                .fetch::<serde_json::Value>(&path, &path, UnauthorizedBehavior::Propagate)
                .await?;
            match value {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("(no content)"),
            }
        }
        Command::Monitor => monitor(&client).await,
    }

    telemetry::shutdown_telemetry();
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn monitor(client: &LendHubClient) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    let worker = client.spawn_refresh_worker(shutdown_rx.clone());

    let mut states = client.session.subscribe();
    let mut shutdown = shutdown_rx;
    println!("Session state: {:?}", client.session.state());

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("Session state: {:?}", *states.borrow_and_update());
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let _ = worker.await;
}
