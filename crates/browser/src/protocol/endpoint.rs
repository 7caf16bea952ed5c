//! One end of a collaboration link
//!
//! Design decisions:
//! 1. Reads never wait: `receive()` drains whatever the socket has and returns
//! 2. Sends are fire-and-forget; a failed or stalled write disconnects
//!    instead of erroring, so a peer that stops reading cannot hold up the caller
//! 3. Link failures surface as DISCONNECTED / TIMEOUT messages, not `Err`

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::frame::{encode, FrameBuffer, FrameFormat};
use super::message::{Message, MessageType};

const READ_CHUNK: usize = 4096;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

pub struct MessageProtocol {
    name: String,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    frames: FrameBuffer,
    active: bool,
    /// A disconnect happened that the caller has not been told about yet
    disconnected: bool,
    timed_out: bool,
    remote_name: String,
    send_timeout: Duration,
}

impl MessageProtocol {
    /// Wrap a connected stream and greet the peer with `name`
    pub async fn new(stream: TcpStream, name: impl Into<String>, format: FrameFormat) -> Self {
        Self::with_send_timeout(stream, name, format, DEFAULT_SEND_TIMEOUT).await
    }

    /// Like [`MessageProtocol::new`], dropping the link when a send takes longer than `send_timeout`
    pub async fn with_send_timeout(
        stream: TcpStream,
        name: impl Into<String>,
        format: FrameFormat,
        send_timeout: Duration,
    ) -> Self {
        let peer = stream.peer_addr().ok();
        let mut protocol = Self {
            name: name.into(),
            stream: Some(stream),
            peer,
            frames: FrameBuffer::new(format),
            active: true,
            disconnected: false,
            timed_out: false,
            remote_name: String::new(),
            send_timeout,
        };
        protocol.hello().await;
        protocol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Name the peer announced, empty until its greeting arrives
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Everything that arrived since the last call, without waiting
    ///
    /// Greetings are consumed here. DISCONNECTED and TIMEOUT, when due, come
    /// after the extracted frames.
    pub fn receive(&mut self) -> Vec<Message> {
        self.read_incoming_data();

        let mut messages = Vec::new();
        for message in self.frames.extract_all() {
            if message.message_type == MessageType::Greeting {
                self.remote_name = message.text();
                tracing::debug!(peer = ?self.peer, "greeted by '{}'", self.remote_name);
            } else {
                tracing::debug!(peer = ?self.peer, "received {}", message);
                messages.push(message);
            }
        }

        if self.disconnected {
            self.disconnected = false;
            messages.push(Message::empty(MessageType::Disconnected));
        }
        if self.timed_out {
            self.timed_out = false;
            messages.push(Message::empty(MessageType::Timeout));
        }
        messages
    }

    fn read_incoming_data(&mut self) {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let Some(stream) = self.stream.as_ref() else {
                return;
            };
            match stream.try_read(&mut chunk) {
                Ok(0) => {
                    tracing::debug!(peer = ?self.peer, "peer closed the connection");
                    self.disconnect();
                    return;
                }
                Ok(n) => self.frames.extend(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(peer = ?self.peer, "read failed: {}", e);
                    self.disconnect();
                    return;
                }
            }
        }
    }

    /// Close the socket locally; the next `receive()` reports DISCONNECTED
    pub fn disconnect(&mut self) {
        if self.active {
            self.active = false;
            self.disconnected = true;
            self.stream = None;
        }
    }

    /// Make the next `receive()` report TIMEOUT
    pub fn time_out(&mut self) {
        self.timed_out = true;
    }

    pub async fn send_message(&mut self, message: Message) {
        let Some(stream) = self.stream.as_mut() else {
            tracing::debug!(peer = ?self.peer, "dropping {} on a closed link", message);
            return;
        };

        let bytes = encode(&message, self.frames.format());
        match tokio::time::timeout(self.send_timeout, stream.write_all(&bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(peer = ?self.peer, "send of {} failed: {}", message, e);
                self.disconnect();
            }
            Err(_) => {
                tracing::warn!(
                    peer = ?self.peer,
                    "send of {} stalled for {:?}, dropping the link",
                    message,
                    self.send_timeout
                );
                self.disconnect();
            }
        }
    }

    pub async fn hello(&mut self) {
        let greeting = Message::new(MessageType::Greeting, self.name.as_bytes());
        self.send_message(greeting).await;
    }

    pub async fn navigate(&mut self, url: &str) {
        self.send_message(Message::new(MessageType::Navigation, url.as_bytes()))
            .await;
    }

    pub async fn back(&mut self) {
        self.send_message(Message::new(MessageType::Back, &b"back"[..]))
            .await;
    }

    pub async fn forward(&mut self) {
        self.send_message(Message::new(MessageType::Forward, &b"forward"[..]))
            .await;
    }

    pub async fn pagedata(&mut self, data: &[u8]) {
        self.send_message(Message::new(MessageType::PageData, data))
            .await;
    }
}
