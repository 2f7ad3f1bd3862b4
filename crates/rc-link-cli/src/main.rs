//! rc-link CLI: drive an HC-05 equipped RC car over Bluetooth serial.

mod console;
mod output;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use rc_link_core::{setup, Config, LinkManager, LinkPolicy};
use rc_link_transport::{PairedDeviceRegistry, SerialTransport};
use rc_link_types::{Command, ConnectionState};
use tracing_subscriber::EnvFilter;

use crate::output::Output;

#[derive(Parser)]
#[command(
    name = "rc-link",
    about = "Drive an RC car over a Bluetooth serial link",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bluetooth backend to use.
    #[arg(long, value_enum, default_value_t = Backend::Bluez, global = true)]
    backend: Backend,

    /// Print session snapshots as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List paired devices, marking the target.
    Devices,

    /// Open the interactive driving console.
    Drive,

    /// Connect, send the given commands in order, then disconnect.
    Send {
        /// Commands as codes (f, b, l, r, s) or names.
        #[arg(required = true)]
        commands: Vec<Command>,

        /// Pause after each command, in milliseconds.
        #[arg(long, default_value_t = 500)]
        hold_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// System BlueZ daemon.
    Bluez,
    /// In-memory vehicle for dry runs.
    Mock,
}

type Backends = (Arc<dyn PairedDeviceRegistry>, Arc<dyn SerialTransport>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = setup::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let policy = config.link_policy()?;
    let (registry, transport) = match cli.backend {
        Backend::Bluez => bluez_backend(&config).await?,
        Backend::Mock => mock_backend(&policy)?,
    };
    tracing::debug!(backend = ?cli.backend, target = %policy.device_name, "backend ready");

    let manager = LinkManager::new(registry, transport, policy).await;
    let output = Output { json: cli.json };

    match cli.command {
        Commands::Devices => {
            let names = manager.list_paired_devices().await;
            output.devices(&names, &manager.policy().device_name);
        }
        Commands::Drive => console::run(manager, output, shutdown_signal()).await?,
        Commands::Send { commands, hold_ms } => {
            let hold = Duration::from_millis(hold_ms);
            run_send(&manager, &commands, hold, output, shutdown_signal()).await?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Send `commands`, then disconnect even when interrupted or failing.
async fn run_send(
    manager: &LinkManager,
    commands: &[Command],
    hold: Duration,
    output: Output,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let outcome = tokio::select! {
        result = send(manager, commands, hold, output) => result,
        () = shutdown => {
            output.notice("interrupted; stopping the vehicle");
            Ok(())
        }
    };

    manager.disconnect().await;
    output.snapshot(&manager.session().current());
    outcome
}

async fn send(
    manager: &LinkManager,
    commands: &[Command],
    hold: Duration,
    output: Output,
) -> anyhow::Result<()> {
    let state = manager.connect().await;
    if state != ConnectionState::Connected {
        bail!(
            "could not connect to {} (state: {state})",
            manager.policy().device_name
        );
    }

    for &command in commands {
        manager.send_command(command).await;
        if manager.state() != ConnectionState::Connected {
            bail!("link lost while sending {command}");
        }
        output.snapshot(&manager.session().current());
        tokio::time::sleep(hold).await;
    }
    Ok(())
}

#[cfg(feature = "bluez")]
async fn bluez_backend(config: &Config) -> anyhow::Result<Backends> {
    let backend = Arc::new(
        rc_link_transport::bluez::BluezBackend::new(config.bluez.adapter.as_deref()).await,
    );
    let registry: Arc<dyn PairedDeviceRegistry> = backend.clone();
    let transport: Arc<dyn SerialTransport> = backend;
    Ok((registry, transport))
}

#[cfg(not(feature = "bluez"))]
#[allow(clippy::unused_async)]
async fn bluez_backend(_config: &Config) -> anyhow::Result<Backends> {
    bail!("rc-link was built without the `bluez` feature; use --backend mock")
}

#[cfg(feature = "mock")]
fn mock_backend(policy: &LinkPolicy) -> anyhow::Result<Backends> {
    use rc_link_transport::mock::{MockRegistry, MockTransport};

    let registry: Arc<dyn PairedDeviceRegistry> = Arc::new(MockRegistry::with_names([
        policy.device_name.as_str(),
        "Living Room Speaker",
    ]));
    let transport: Arc<dyn SerialTransport> =
        Arc::new(MockTransport::new().with_open_delay(Duration::from_millis(300)));
    Ok((registry, transport))
}

#[cfg(not(feature = "mock"))]
fn mock_backend(_policy: &LinkPolicy) -> anyhow::Result<Backends> {
    bail!("rc-link was built without the `mock` feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn send_parses_codes_and_names() {
        let cli = Cli::try_parse_from(["rc-link", "send", "f", "left", "S"]).unwrap();
        match cli.command {
            Commands::Send { commands, hold_ms } => {
                assert_eq!(commands, vec![Command::Forward, Command::Left, Command::Stop]);
                assert_eq!(hold_ms, 500);
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["rc-link", "devices", "--backend", "mock", "--json"]).unwrap();
        assert_eq!(cli.backend, Backend::Mock);
        assert!(cli.json);
    }

    async fn mock_manager() -> (LinkManager, rc_link_transport::mock::MockTransportHandle) {
        use rc_link_transport::mock::{MockRegistry, MockTransport};

        let transport = MockTransport::new();
        let handle = transport.handle();
        let manager = LinkManager::new(
            Arc::new(MockRegistry::with_names(["HC-05"])),
            Arc::new(transport),
            LinkPolicy::default(),
        )
        .await;
        (manager, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn send_ends_with_stop() {
        let (manager, handle) = mock_manager().await;
        let output = Output { json: true };

        run_send(
            &manager,
            &[Command::Forward, Command::Right],
            Duration::from_millis(10),
            output,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(handle.written(), b"FRS");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_send_still_stops_vehicle() {
        let (manager, handle) = mock_manager().await;
        let output = Output { json: true };
        let started = tokio::time::Instant::now();

        run_send(
            &manager,
            &[Command::Forward, Command::Left],
            Duration::from_secs(5),
            output,
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await
        .unwrap();

        // Interrupted during the first hold: LEFT is never sent.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(handle.written(), b"FS");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_reports_error() {
        use rc_link_transport::mock::{MockRegistry, MockTransport};

        let manager = LinkManager::new(
            Arc::new(MockRegistry::with_names(["Other"])),
            Arc::new(MockTransport::new()),
            LinkPolicy::default(),
        )
        .await;
        let result = run_send(
            &manager,
            &[Command::Forward],
            Duration::ZERO,
            Output { json: true },
            std::future::pending(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn send_requires_a_command() {
        assert!(Cli::try_parse_from(["rc-link", "send"]).is_err());
        assert!(Cli::try_parse_from(["rc-link", "send", "jump"]).is_err());
    }
}
