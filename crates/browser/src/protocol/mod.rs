//! Collaboration wire protocol
//!
//! Typed messages framed over one duplex TCP stream. `FrameBuffer` turns the
//! byte stream back into messages; `MessageProtocol` owns the socket and hides
//! partial reads from the sessions.

pub mod endpoint;
pub mod frame;
pub mod message;

pub use endpoint::MessageProtocol;
pub use frame::{FrameBuffer, FrameFormat};
pub use message::{Message, MessageType};
