//! Human and JSON renderings of session snapshots.

use rc_link_types::{Command, SessionState};
use serde_json::json;

/// Where and how the console prints.
///
/// In JSON mode data goes to stdout as one object per line and notices go
/// to stderr, so stdout stays machine-readable.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn snapshot(self, snapshot: &SessionState) {
        if self.json {
            match serde_json::to_string(snapshot) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("failed to encode snapshot: {e}"),
            }
        } else {
            println!("{}", describe(snapshot));
        }
    }

    pub fn history(self, history: &[Command]) {
        if self.json {
            println!("{}", json!({ "command_history": history }));
        } else if history.is_empty() {
            println!("no commands sent yet");
        } else {
            for command in history {
                println!("{}", history_entry(*command));
            }
        }
    }

    pub fn devices(self, names: &[String], target: &str) {
        if self.json {
            println!("{}", json!({ "devices": names, "target": target }));
            return;
        }
        if names.is_empty() {
            println!("no paired devices (is the Bluetooth adapter on?)");
        }
        for name in names {
            let marker = if name.eq_ignore_ascii_case(target) { '*' } else { ' ' };
            println!("{marker} {name}");
        }
    }

    pub fn notice(self, text: &str) {
        if self.json {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }
}

/// A history line showing the wire code next to its label, e.g. `F: ↑ Forward`.
pub fn history_entry(command: Command) -> String {
    format!("{}: {}", command.code(), command.label())
}

/// One-line human summary of a snapshot.
pub fn describe(snapshot: &SessionState) -> String {
    let mut line = format!("[{}]", snapshot.connection);
    if !snapshot.command_history.is_empty() {
        line.push_str(&format!(" last: {}", history_entry(snapshot.last_command)));
    }
    line
}
