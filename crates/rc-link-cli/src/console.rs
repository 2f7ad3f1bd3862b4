//! Interactive driving console.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use rc_link_core::{LinkManager, SessionUpdates};
use rc_link_types::{Command, ConnectionState, ParseCommandError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::output::Output;

const HELP: &str = "\
commands:
  connect             connect to the vehicle
  disconnect | d      stop the vehicle and close the link
  f b l r s           forward, backward, left, right, stop (names work too)
  estop | !           emergency stop: send STOP three times
  status              show the current session
  history             show recent commands, newest first
  help | ?            show this text
  quit | q            stop, disconnect and exit";

/// One line of console input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Connect,
    Disconnect,
    Drive(Command),
    EmergencyStop,
    Status,
    History,
    Help,
    Quit,
    Empty,
}

impl FromStr for Input {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.trim().to_ascii_lowercase();
        Ok(match word.as_str() {
            "" => Self::Empty,
            "connect" => Self::Connect,
            "disconnect" | "d" => Self::Disconnect,
            "estop" | "!" => Self::EmergencyStop,
            "status" => Self::Status,
            "history" => Self::History,
            "help" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => Self::Drive(other.parse()?),
        })
    }
}

/// Run the console on stdin until `quit`, end of input or `shutdown`, then
/// disconnect.
pub async fn run(
    manager: LinkManager,
    output: Output,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    drive(manager, stdin, shutdown, output).await
}

async fn drive<R>(
    manager: LinkManager,
    input: R,
    shutdown: impl Future<Output = ()>,
    output: Output,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let watcher = tokio::spawn(watch_session(manager.session().subscribe(), output));

    let target = manager.policy().device_name.clone();
    let bonded = manager.session().current().bonded_devices;
    if bonded.iter().any(|name| name.eq_ignore_ascii_case(&target)) {
        spawn_connect(&manager);
    } else {
        output.notice(&format!(
            "{target} is not paired. Pair it in your system Bluetooth settings, then type `connect`."
        ));
    }
    output.notice("type `help` for commands");

    let mut lines = input.lines();
    tokio::pin!(shutdown);
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            () = &mut shutdown => {
                output.notice("interrupted; stopping the vehicle");
                break;
            }
        };
        let Some(line) = line? else {
            break;
        };

        match line.parse::<Input>() {
            Ok(Input::Empty) => {}
            Ok(Input::Connect) => {
                let state = manager.state();
                if state.is_busy() {
                    output.notice(&format!("already {}", state.to_string().to_lowercase()));
                } else {
                    spawn_connect(&manager);
                }
            }
            Ok(Input::Disconnect) => manager.disconnect().await,
            Ok(Input::Drive(command)) => {
                if manager.state().accepts_commands() {
                    manager.send_command(command).await;
                } else {
                    output.notice("not connected; type `connect` first");
                }
            }
            Ok(Input::EmergencyStop) => {
                if manager.state().accepts_commands() {
                    manager.emergency_stop().await;
                } else {
                    output.notice("not connected; nothing to stop");
                }
            }
            Ok(Input::Status) => output.snapshot(&manager.session().current()),
            Ok(Input::History) => output.history(&manager.session().current().command_history),
            Ok(Input::Help) => output.notice(HELP),
            Ok(Input::Quit) => break,
            Err(e) => output.notice(&format!("{e}; type `help` for commands")),
        }
    }

    manager.disconnect().await;
    drop(manager);

    // The watcher ends once every manager clone is gone and its queue is drained.
    if tokio::time::timeout(Duration::from_secs(1), watcher).await.is_err() {
        debug!("session watcher still running at exit");
    }
    Ok(())
}

fn spawn_connect(manager: &LinkManager) {
    let manager = manager.clone();
    tokio::spawn(async move {
        let state = manager.connect().await;
        debug!(%state, "connect finished");
    });
}

async fn watch_session(mut updates: SessionUpdates, output: Output) {
    while let Some(snapshot) = updates.next().await {
        output.snapshot(&snapshot);
        if snapshot.connection == ConnectionState::Error {
            output.notice("connection failed; type `connect` to retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_link_core::LinkPolicy;
    use rc_link_transport::mock::{MockRegistry, MockTransport, MockTransportHandle};
    use std::sync::Arc;

    #[test]
    fn parses_console_words() {
        assert_eq!("connect".parse(), Ok(Input::Connect));
        assert_eq!(" Disconnect ".parse(), Ok(Input::Disconnect));
        assert_eq!("d".parse(), Ok(Input::Disconnect));
        assert_eq!("?".parse(), Ok(Input::Help));
        assert_eq!("QUIT".parse(), Ok(Input::Quit));
        assert_eq!("".parse(), Ok(Input::Empty));
        assert_eq!("status".parse(), Ok(Input::Status));
        assert_eq!("estop".parse(), Ok(Input::EmergencyStop));
        assert_eq!("!".parse(), Ok(Input::EmergencyStop));
    }

    #[test]
    fn parses_drive_commands_by_code_and_name() {
        assert_eq!("f".parse(), Ok(Input::Drive(Command::Forward)));
        assert_eq!("B".parse(), Ok(Input::Drive(Command::Backward)));
        assert_eq!("left".parse(), Ok(Input::Drive(Command::Left)));
        assert_eq!("s".parse(), Ok(Input::Drive(Command::Stop)));
    }

    #[test]
    fn rejects_unknown_words() {
        assert!("jump".parse::<Input>().is_err());
        assert!("x".parse::<Input>().is_err());
    }

    const QUIET: Output = Output { json: true };

    async fn connected() -> (LinkManager, MockTransportHandle) {
        let transport = MockTransport::new();
        let handle = transport.handle();
        let manager = LinkManager::new(
            Arc::new(MockRegistry::with_names(["HC-05"])),
            Arc::new(transport),
            LinkPolicy::default(),
        )
        .await;
        assert_eq!(manager.connect().await, ConnectionState::Connected);
        (manager, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_input_stops_and_disconnects() {
        let (manager, handle) = connected().await;
        let session = manager.session();

        drive(manager, &b"f\nl\n"[..], std::future::pending(), QUIET)
            .await
            .unwrap();

        assert_eq!(handle.written(), b"FLS");
        assert_eq!(session.current().connection, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn estop_sends_stop_burst() {
        let (manager, handle) = connected().await;

        drive(manager, &b"estop\n"[..], std::future::pending(), QUIET)
            .await
            .unwrap();

        // Three from the burst, one from the disconnect on exit.
        assert_eq!(handle.written(), b"SSSS");
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_vehicle_while_waiting_for_input() {
        let (manager, handle) = connected().await;
        let session = manager.session();
        let (mut keyboard, console) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut keyboard, b"f\n")
            .await
            .unwrap();

        drive(
            manager,
            BufReader::new(console),
            tokio::time::sleep(Duration::from_secs(1)),
            QUIET,
        )
        .await
        .unwrap();

        assert_eq!(handle.written(), b"FS");
        assert_eq!(session.current().connection, ConnectionState::Disconnected);
        drop(keyboard);
    }
}
