//! Browsing sessions
//!
//! A `Conductor` owns the authoritative page and pushes it to every connected
//! `Collaborator`. Both run a single-task loop: a fixed-period tick polls the
//! network, and user `Command`s arrive over an mpsc channel in between.

pub mod collaborator;
pub mod conductor;
pub mod ticker;

use std::fmt;
use std::str::FromStr;

pub use collaborator::Collaborator;
pub use conductor::Conductor;
pub use ticker::Ticker;

use crate::error::BrowserError;

/// User input for a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Go(String),
    Back,
    Forward,
    /// Follow link `n` of the current page (numbered as `Page::links()`)
    Follow(usize),
    Reload,
    Links,
    Show,
    Quit,
}

impl FromStr for Command {
    type Err = BrowserError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));
        let invalid = || BrowserError::InvalidCommand(line.to_string());

        let command = match (word, rest.is_empty()) {
            ("go", false) => Command::Go(rest.to_string()),
            ("follow", false) => Command::Follow(rest.parse().map_err(|_| invalid())?),
            ("back", true) => Command::Back,
            ("forward", true) => Command::Forward,
            ("reload", true) => Command::Reload,
            ("links", true) => Command::Links,
            ("show", true) => Command::Show,
            ("quit" | "exit", true) => Command::Quit,
            _ => return Err(invalid()),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Go(url) => write!(f, "go {}", url),
            Command::Back => f.write_str("back"),
            Command::Forward => f.write_str("forward"),
            Command::Follow(n) => write!(f, "follow {}", n),
            Command::Reload => f.write_str("reload"),
            Command::Links => f.write_str("links"),
            Command::Show => f.write_str("show"),
            Command::Quit => f.write_str("quit"),
        }
    }
}
