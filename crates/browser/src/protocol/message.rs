//! Protocol message types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of message types
///
/// DISCONNECTED, INVALID and TIMEOUT are produced locally by the receiving
/// endpoint and never travel on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Greeting = 0,
    Navigation = 1,
    Back = 2,
    Forward = 3,
    PageData = 4,
    Disconnected = 5,
    Invalid = 6,
    Timeout = 7,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Greeting,
            1 => Self::Navigation,
            2 => Self::Back,
            3 => Self::Forward,
            4 => Self::PageData,
            5 => Self::Disconnected,
            6 => Self::Invalid,
            7 => Self::Timeout,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Types that end the link when a session sees them
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Invalid | Self::Timeout)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Greeting => "GREETING",
            Self::Navigation => "NAVIGATION",
            Self::Back => "BACK",
            Self::Forward => "FORWARD",
            Self::PageData => "PAGEDATA",
            Self::Disconnected => "DISCONNECTED",
            Self::Invalid => "INVALID",
            Self::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// One protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(message_type: MessageType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type,
            data: data.into(),
        }
    }

    pub fn empty(message_type: MessageType) -> Self {
        Self::new(message_type, Vec::new())
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Message {} ({} bytes)]", self.message_type, self.data.len())
    }
}
