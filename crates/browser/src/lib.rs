//! Gaudy collaborative browser
//!
//! One Conductor fetches and renders pages; any number of Collaborators
//! mirror its current page over TCP. Pages travel in the binary form from
//! the `dom` crate, so Collaborators never fetch anything themselves.
//!
//! # Architecture
//!
//! 1. **Single task per session**: a tick loop polls sockets without blocking,
//!    commands arrive over a channel in between; no locks anywhere
//! 2. **Link failures are messages**: DISCONNECTED / INVALID / TIMEOUT come out
//!    of `MessageProtocol::receive()` like any other message
//! 3. **Seams are traits**: `Fetcher` for the network, `DisplaySurface` for output

pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod fetch;
pub mod history;
pub mod navigation;
pub mod protocol;
pub mod render;
pub mod session;

pub use config::SessionConfig;
pub use display::{DisplaySurface, HeadlessSurface, TextSurface};
pub use error::{BrowserError, Result};
pub use events::{BrowserEvent, EventBus};
pub use fetch::{Fetcher, HttpFetcher, MemoryFetcher};
pub use history::{History, HistoryEntry};
pub use navigation::make_path;
pub use protocol::{FrameFormat, Message, MessageProtocol, MessageType};
pub use render::{render_text, RenderOptions};
pub use session::{Collaborator, Command, Conductor};
