//! Collaborator - mirrors a Conductor's page
//!
//! Owns only the current page. User navigation is forwarded upstream; the
//! Conductor decides what everyone sees. Losing the upstream link (closed,
//! garbled, or timed out) ends the session.

use dom::{DomService, Page};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{Command, Ticker};
use crate::config::SessionConfig;
use crate::display::DisplaySurface;
use crate::error::{BrowserError, Result};
use crate::events::{BrowserEvent, EventBus};
use crate::navigation::make_path;
use crate::protocol::{MessageProtocol, MessageType};

pub struct Collaborator {
    config: SessionConfig,
    dom: DomService,
    surface: Box<dyn DisplaySurface>,
    events: EventBus,
    upstream: MessageProtocol,
    page: Option<Page>,
    /// Last address announced by the Conductor
    address: String,
}

impl Collaborator {
    /// Dial the Conductor at the configured host and port
    pub async fn connect(config: SessionConfig, surface: Box<dyn DisplaySurface>) -> Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        tracing::info!(
            session = %config.id,
            "connected to conductor at {}:{}",
            config.host,
            config.port
        );
        let upstream = MessageProtocol::with_send_timeout(
            stream,
            config.name.as_str(),
            config.frame_format,
            config.send_timeout(),
        )
        .await;

        Ok(Self {
            dom: DomService::with_config(config.dom_config()),
            config,
            surface,
            events: EventBus::new(),
            upstream,
            page: None,
            address: String::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Name the Conductor announced, empty until its greeting arrives
    pub fn conductor_name(&self) -> &str {
        self.upstream.remote_name()
    }

    pub fn is_connected(&self) -> bool {
        self.upstream.is_active()
    }

    /// Ask the Conductor to navigate
    pub async fn go(&mut self, url: &str) {
        self.upstream.navigate(url).await;
    }

    pub async fn back(&mut self) {
        self.upstream.back().await;
    }

    pub async fn forward(&mut self) {
        self.upstream.forward().await;
    }

    /// Ask the Conductor to follow link `index` of the mirrored page
    pub async fn follow(&mut self, index: usize) -> Result<()> {
        let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
        let href = page
            .links()
            .into_iter()
            .nth(index)
            .ok_or(BrowserError::NoSuchLink(index))?;
        let target = make_path(page.address(), &href);
        self.go(&target).await;
        Ok(())
    }

    /// Treat the upstream link as timed out on the next poll
    pub fn time_out(&mut self) {
        self.upstream.time_out();
    }

    /// Apply everything the Conductor sent since the last poll
    ///
    /// Fails with `UpstreamLost` once the link is gone; the session is over.
    pub fn poll_network(&mut self) -> Result<()> {
        for message in self.upstream.receive() {
            match message.message_type {
                MessageType::Navigation => {
                    let url = message.text();
                    self.surface.show_address(&url);
                    self.events
                        .publish(BrowserEvent::NavigationStarted { url: url.clone() });
                    self.address = url;
                }
                MessageType::PageData => self.receive_page(&message.data),
                kind if kind.is_terminal() => {
                    let reason = kind.to_string();
                    tracing::warn!("conductor link ended: {}", reason);
                    self.upstream.disconnect();
                    self.events.publish(BrowserEvent::SessionEnded {
                        reason: reason.clone(),
                    });
                    return Err(BrowserError::UpstreamLost(reason));
                }
                other => tracing::debug!("ignoring {} from conductor", other),
            }
        }
        Ok(())
    }

    fn receive_page(&mut self, data: &[u8]) {
        let page = match self.dom.deserialize_page(data) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(bytes = data.len(), "discarding page data: {}", e);
                self.surface.show_error(&format!("discarded page data: {}", e));
                return;
            }
        };

        if let Some(mut old) = self.page.take() {
            old.teardown();
        }
        self.address = page.address().to_string();
        self.surface.show_page(&page);
        tracing::info!(url = %page.address(), "mirroring '{}'", page.title());
        self.events.publish(BrowserEvent::PageReceived {
            url: page.address().to_string(),
            title: page.title().to_string(),
        });
        self.page = Some(page);
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Go(url) => self.go(&url).await,
            Command::Back => self.back().await,
            Command::Forward => self.forward().await,
            Command::Follow(index) => self.follow(index).await?,
            Command::Reload => {
                let address = self.address.clone();
                if address.is_empty() {
                    return Err(BrowserError::NoPage);
                }
                self.go(&address).await;
            }
            Command::Links => {
                let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
                self.surface.show_links(&page.links());
            }
            Command::Show => {
                let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
                self.surface.show_page(page);
            }
            Command::Quit => {}
        }
        Ok(())
    }

    /// Mirror the Conductor until `Quit` or until the upstream link ends
    ///
    /// A stalled tick times the link out. Losing the Conductor is the normal
    /// way for this to finish and is reported to the surface, not as `Err`.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> Result<()> {
        self.events.publish(BrowserEvent::Started);

        let mut ticker = Ticker::new(
            self.config.first_tick(),
            self.config.tick_interval(),
            self.config.stall_timeout(),
        );
        let mut accepting_commands = true;

        let outcome = loop {
            tokio::select! {
                stalled = ticker.tick() => {
                    if stalled {
                        self.time_out();
                    }
                    if let Err(e) = self.poll_network() {
                        break Err(e);
                    }
                }
                command = commands.recv(), if accepting_commands => match command {
                    Some(Command::Quit) => break Ok(()),
                    Some(command) => {
                        tracing::debug!("command: {}", command);
                        if let Err(e) = self.execute(command).await {
                            tracing::warn!("{}", e);
                            self.surface.show_error(&e.to_string());
                        }
                    }
                    None => {
                        tracing::debug!("command channel closed");
                        accepting_commands = false;
                    }
                },
            }
        };

        self.upstream.disconnect();
        if let Some(mut page) = self.page.take() {
            page.teardown();
        }
        self.events.publish(BrowserEvent::Stopped);

        match outcome {
            Err(BrowserError::UpstreamLost(reason)) => {
                tracing::info!(session = %self.config.id, "conductor has ended the session ({})", reason);
                self.surface
                    .show_error("Conductor has ended the session");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::HeadlessSurface;
    use crate::protocol::FrameFormat;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// A collaborator wired to a raw socket standing in for the Conductor
    async fn wired() -> (Collaborator, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = SessionConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..SessionConfig::default()
        };

        let (collaborator, accepted) = tokio::join!(
            Collaborator::connect(config, Box::new(HeadlessSurface)),
            listener.accept()
        );
        (collaborator.unwrap(), accepted.unwrap().0)
    }

    fn frame(kind: MessageType, data: &[u8]) -> Vec<u8> {
        let mut out = vec![0xff, kind.as_u8()];
        out.extend_from_slice(data);
        out.extend_from_slice(&[0xff, kind.as_u8() | 0x80]);
        out
    }

    fn page_bytes(address: &str, html: &str) -> Vec<u8> {
        let dom = DomService::new();
        let page = dom.parse_page(address, html).unwrap();
        dom.serialize_page(&page).unwrap()
    }

    /// Poll until `done` holds, the link fails, or a second passes
    async fn poll_until(
        collaborator: &mut Collaborator,
        done: impl Fn(&Collaborator) -> bool,
    ) -> Result<()> {
        for _ in 0..100 {
            collaborator.poll_network()?;
            if done(collaborator) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_mirrors_navigation_and_pages() {
        let (mut collaborator, mut conductor) = wired().await;
        let url = "http://a.test/";

        conductor.write_all(&frame(MessageType::Greeting, b"boss")).await.unwrap();
        conductor.write_all(&frame(MessageType::Navigation, url.as_bytes())).await.unwrap();
        conductor
            .write_all(&frame(MessageType::PageData, &page_bytes(url, "<title>Home</title><p>x</p>")))
            .await
            .unwrap();

        poll_until(&mut collaborator, |c| c.page().is_some()).await.unwrap();
        assert_eq!(collaborator.address(), url);
        assert_eq!(collaborator.page().unwrap().title(), "Home");
        assert_eq!(collaborator.conductor_name(), "boss");
    }

    #[tokio::test]
    async fn test_corrupt_page_is_discarded() {
        let (mut collaborator, mut conductor) = wired().await;
        let url = "http://a.test/";

        conductor
            .write_all(&frame(MessageType::PageData, &page_bytes(url, "<p>first</p>")))
            .await
            .unwrap();
        poll_until(&mut collaborator, |c| c.page().is_some()).await.unwrap();

        conductor.write_all(&frame(MessageType::PageData, b"\x00page\x02")).await.unwrap();
        conductor.write_all(&frame(MessageType::Navigation, b"http://a.test/next")).await.unwrap();
        poll_until(&mut collaborator, |c| c.address().ends_with("next")).await.unwrap();

        assert!(collaborator.is_connected());
        assert_eq!(collaborator.page().unwrap().title(), url);
    }

    #[tokio::test]
    async fn test_invalid_frame_ends_session() {
        let (mut collaborator, mut conductor) = wired().await;
        conductor.write_all(b"\xff\x01bad\xff\x82").await.unwrap();

        let result = poll_until(&mut collaborator, |_| false).await;
        assert!(matches!(result, Err(BrowserError::UpstreamLost(reason)) if reason == "INVALID"));
        assert!(!collaborator.is_connected());
    }

    #[tokio::test]
    async fn test_requests_go_upstream() {
        let (mut collaborator, conductor) = wired().await;
        let mut upstream = MessageProtocol::new(conductor, "boss", FrameFormat::Sentinel).await;

        collaborator.go("http://a.test/next").await;
        collaborator.back().await;
        assert!(matches!(
            collaborator.follow(0).await,
            Err(BrowserError::NoPage)
        ));

        let mut kinds = Vec::new();
        for _ in 0..100 {
            kinds.extend(upstream.receive().into_iter().map(|m| (m.message_type, m.text())));
            if kinds.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            kinds,
            vec![
                (MessageType::Navigation, "http://a.test/next".to_string()),
                (MessageType::Back, "back".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_ends_when_conductor_leaves() {
        let (mut collaborator, conductor) = wired().await;
        let mut events = collaborator.events().subscribe();
        drop(conductor);

        let (_tx, rx) = mpsc::unbounded_channel();
        collaborator.run(rx).await.unwrap();

        let mut ended = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, BrowserEvent::SessionEnded { .. }) {
                ended = true;
            }
        }
        assert!(ended);
        assert!(!collaborator.is_connected());
    }
}
