//! Conductor - the authoritative session
//!
//! Fetches and parses pages, keeps history, and pushes every page change to
//! all connected Collaborators as NAVIGATION followed by PAGEDATA.
//!
//! Collaborator requests (NAVIGATION / BACK / FORWARD) run as if issued
//! locally. A collaborator that disconnects, sends garbage, or fails a send is
//! dropped without disturbing the others.

use std::net::SocketAddr;
use std::sync::Arc;

use dom::{DomService, Page};
use futures_util::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use super::{Command, Ticker};
use crate::config::SessionConfig;
use crate::display::DisplaySurface;
use crate::error::{BrowserError, Result};
use crate::events::{BrowserEvent, EventBus};
use crate::fetch::Fetcher;
use crate::history::{History, HistoryEntry};
use crate::navigation::make_path;
use crate::protocol::{MessageProtocol, MessageType};

struct CollaboratorLink {
    protocol: MessageProtocol,
    address: SocketAddr,
    /// Set when the link is closed on purpose
    leave_reason: Option<String>,
}

pub struct Conductor {
    config: SessionConfig,
    dom: DomService,
    fetcher: Box<dyn Fetcher>,
    surface: Box<dyn DisplaySurface>,
    events: EventBus,

    listener: Option<TcpListener>,
    collaborators: Vec<CollaboratorLink>,

    page: Option<Page>,
    page_data: Arc<[u8]>,
    history: History,
}

impl Conductor {
    pub fn new(
        config: SessionConfig,
        fetcher: Box<dyn Fetcher>,
        surface: Box<dyn DisplaySurface>,
    ) -> Self {
        Self {
            dom: DomService::with_config(config.dom_config()),
            config,
            fetcher,
            surface,
            events: EventBus::new(),
            listener: None,
            collaborators: Vec::new(),
            page: None,
            page_data: Arc::from(Vec::new()),
            history: History::new(),
        }
    }

    /// Start listening for collaborators on the configured host and port
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        tracing::info!(session = %self.config.id, %addr, "listening for collaborators");
        self.listener = Some(listener);
        Ok(addr)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let listener = self.listener.as_ref().ok_or(BrowserError::NotListening)?;
        Ok(listener.local_addr()?)
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

    /// Encoded form of the current page, as sent to collaborators
    pub fn page_data(&self) -> &[u8] {
        &self.page_data
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn collaborator_count(&self) -> usize {
        self.collaborators.len()
    }

    /// Names announced by connected collaborators (empty until greeted)
    pub fn collaborator_names(&self) -> Vec<String> {
        self.collaborators
            .iter()
            .map(|link| link.protocol.remote_name().to_string())
            .collect()
    }

    /// Navigate to a new address, recording the current page in history
    pub async fn go(&mut self, url: &str) -> Result<()> {
        let (page, data) = self.load(url).await?;
        if let Some(current) = self.current_entry() {
            self.history.visit(current);
        }
        self.install(page, data).await;
        Ok(())
    }

    /// Fetch, parse and show `url` without touching history
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        let (page, data) = self.load(url).await?;
        self.install(page, data).await;
        Ok(())
    }

    /// Returns `false` when there is nothing to go back to
    pub async fn back(&mut self) -> Result<bool> {
        self.revisit(false).await
    }

    /// Returns `false` when there is nothing to go forward to
    pub async fn forward(&mut self) -> Result<bool> {
        self.revisit(true).await
    }

    /// Follow link `index` of the current page
    pub async fn follow(&mut self, index: usize) -> Result<()> {
        let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
        let href = page
            .links()
            .into_iter()
            .nth(index)
            .ok_or(BrowserError::NoSuchLink(index))?;
        let target = make_path(page.address(), &href);
        self.go(&target).await
    }

    pub async fn reload(&mut self) -> Result<()> {
        let address = self
            .page
            .as_ref()
            .ok_or(BrowserError::NoPage)?
            .address()
            .to_string();
        self.navigate(&address).await
    }

    fn current_entry(&self) -> Option<HistoryEntry> {
        self.page
            .as_ref()
            .map(|page| HistoryEntry::new(page.address(), self.page_data.clone()))
    }

    async fn load(&mut self, url: &str) -> Result<(Page, Arc<[u8]>)> {
        self.events.publish(BrowserEvent::NavigationStarted {
            url: url.to_string(),
        });

        let loaded = match self.fetcher.fetch(url).await {
            Ok(html) => self.build_page(url, &html),
            Err(e) => Err(e),
        };
        if let Err(e) = &loaded {
            self.events.publish(BrowserEvent::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }
        loaded
    }

    fn build_page(&self, url: &str, html: &str) -> Result<(Page, Arc<[u8]>)> {
        let page = self.dom.parse_page(url, html)?;
        let data = self.dom.serialize_page(&page)?;
        Ok((page, data.into()))
    }

    async fn revisit(&mut self, forward: bool) -> Result<bool> {
        let Some(current) = self.current_entry() else {
            return Ok(false);
        };
        let target = if forward {
            self.history.peek_forward()
        } else {
            self.history.peek_back()
        };
        let Some(target) = target else {
            return Ok(false);
        };

        self.events.publish(BrowserEvent::NavigationStarted {
            url: target.address.clone(),
        });
        // Decode before moving entries so a bad entry leaves history intact
        let page = self.dom.deserialize_page(&target.data)?;

        let entry = if forward {
            self.history.step_forward(current)
        } else {
            self.history.step_back(current)
        };
        let Some(entry) = entry else {
            return Ok(false);
        };
        self.install(page, entry.data).await;
        Ok(true)
    }

    /// Replace the current page, show it and push it to every collaborator
    async fn install(&mut self, page: Page, data: Arc<[u8]>) {
        if let Some(mut old) = self.page.take() {
            old.teardown();
        }

        let url = page.address().to_string();
        let title = page.title().to_string();
        self.surface.show_address(&url);
        self.surface.show_page(&page);
        self.page = Some(page);
        self.page_data = data;

        self.broadcast().await;

        tracing::info!(%url, collaborators = self.collaborators.len(), "now showing '{}'", title);
        self.events
            .publish(BrowserEvent::NavigationComplete { url, title });
    }

    async fn broadcast(&mut self) {
        let Some(page) = self.page.as_ref() else {
            return;
        };

        for link in &mut self.collaborators {
            link.protocol.navigate(page.address()).await;
            if link.protocol.is_active() {
                link.protocol.pagedata(&self.page_data).await;
            }
        }
        self.drop_inactive();
    }

    fn drop_inactive(&mut self) {
        let events = &self.events;
        self.collaborators.retain_mut(|link| {
            if link.protocol.is_active() {
                return true;
            }
            let reason = link
                .leave_reason
                .take()
                .unwrap_or_else(|| "send failed".to_string());
            tracing::warn!(address = %link.address, "removing collaborator: {}", reason);
            events.publish(BrowserEvent::CollaboratorLeft {
                address: link.address.to_string(),
                reason,
            });
            false
        });
    }

    /// One network pass: accept newcomers, then serve every collaborator
    pub async fn poll_network(&mut self) {
        self.accept_pending().await;

        let mut requests = Vec::new();
        for link in &mut self.collaborators {
            for message in link.protocol.receive() {
                match message.message_type {
                    MessageType::Navigation | MessageType::Back | MessageType::Forward => {
                        requests.push((link.address, message));
                    }
                    kind if kind.is_terminal() => {
                        link.leave_reason = Some(kind.to_string());
                        link.protocol.disconnect();
                    }
                    other => {
                        tracing::debug!(address = %link.address, "ignoring {} from collaborator", other);
                    }
                }
            }
        }
        self.drop_inactive();

        for (address, message) in requests {
            tracing::info!(%address, "collaborator requested {}", message.message_type);
            let result = match message.message_type {
                MessageType::Navigation => self.go(&message.text()).await,
                MessageType::Back => self.back().await.map(|_| ()),
                MessageType::Forward => self.forward().await.map(|_| ()),
                _ => Ok(()),
            };
            if let Err(e) = result {
                self.report(&e);
            }
        }
    }

    async fn accept_pending(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        let mut accepted = Vec::new();
        while let Some(result) = listener.accept().now_or_never() {
            match result {
                Ok(connection) => accepted.push(connection),
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    break;
                }
            }
        }

        for (stream, address) in accepted {
            self.admit(stream, address).await;
        }
    }

    /// Greet a new collaborator and bring it up to date immediately
    async fn admit(&mut self, stream: TcpStream, address: SocketAddr) {
        let mut protocol = MessageProtocol::with_send_timeout(
            stream,
            self.config.name.as_str(),
            self.config.frame_format,
            self.config.send_timeout(),
        )
        .await;
        if let Some(page) = self.page.as_ref() {
            protocol.navigate(page.address()).await;
            protocol.pagedata(&self.page_data).await;
        }

        if !protocol.is_active() {
            tracing::warn!(%address, "collaborator dropped while joining");
            return;
        }

        tracing::info!(%address, "collaborator joined");
        self.events.publish(BrowserEvent::CollaboratorJoined {
            address: address.to_string(),
        });
        self.collaborators.push(CollaboratorLink {
            protocol,
            address,
            leave_reason: None,
        });
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Go(url) => self.go(&url).await,
            Command::Back => {
                if !self.back().await? {
                    self.surface.show_error("no previous page");
                }
                Ok(())
            }
            Command::Forward => {
                if !self.forward().await? {
                    self.surface.show_error("no next page");
                }
                Ok(())
            }
            Command::Follow(index) => self.follow(index).await,
            Command::Reload => self.reload().await,
            Command::Links => {
                let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
                self.surface.show_links(&page.links());
                Ok(())
            }
            Command::Show => {
                let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
                self.surface.show_page(page);
                Ok(())
            }
            Command::Quit => Ok(()),
        }
    }

    fn report(&mut self, error: &BrowserError) {
        tracing::warn!("{}", error);
        self.surface.show_error(&error.to_string());
    }

    /// Serve until `Quit` arrives
    ///
    /// Binds first if `bind` was not called, then loads the homepage if one
    /// is configured. A closed command channel leaves the network side running.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        self.events.publish(BrowserEvent::Started);

        if let Some(homepage) = self.config.homepage.clone() {
            if let Err(e) = self.navigate(&homepage).await {
                self.report(&e);
            }
        }

        let mut ticker = Ticker::new(
            self.config.first_tick(),
            self.config.tick_interval(),
            self.config.stall_timeout(),
        );
        let mut accepting_commands = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_network().await,
                command = commands.recv(), if accepting_commands => match command {
                    Some(Command::Quit) => break,
                    Some(command) => {
                        tracing::debug!("command: {}", command);
                        if let Err(e) = self.execute(command).await {
                            self.report(&e);
                        }
                    }
                    None => {
                        tracing::debug!("command channel closed");
                        accepting_commands = false;
                    }
                },
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Close every link and stop listening
    pub fn shutdown(&mut self) {
        self.collaborators.clear();
        self.listener = None;
        if let Some(mut page) = self.page.take() {
            page.teardown();
        }
        tracing::info!(session = %self.config.id, "conductor stopped");
        self.events.publish(BrowserEvent::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::HeadlessSurface;
    use crate::fetch::MemoryFetcher;

    const A: &str = "http://a.test/a.html";
    const B: &str = "http://a.test/b.html";
    const C: &str = "http://a.test/c.html";

    fn conductor() -> Conductor {
        let fetcher = MemoryFetcher::new()
            .with_page(A, r#"<html><head><title>A</title></head><body><a href="b.html">to b</a></body></html>"#)
            .with_page(B, "<html><head><title>B</title></head><body>b</body></html>")
            .with_page(C, "<html><head><title>C</title></head><body>c</body></html>");
        let config = SessionConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..SessionConfig::default()
        };
        Conductor::new(config, Box::new(fetcher), Box::new(HeadlessSurface))
    }

    fn title(conductor: &Conductor) -> &str {
        conductor.page().map(|p| p.title()).unwrap_or("")
    }

    #[tokio::test]
    async fn test_go_back_forward() {
        let mut conductor = conductor();
        conductor.go(A).await.unwrap();
        conductor.go(B).await.unwrap();
        conductor.go(C).await.unwrap();
        assert_eq!(conductor.history().back_len(), 2);

        assert!(conductor.back().await.unwrap());
        assert_eq!(title(&conductor), "B");
        assert!(conductor.back().await.unwrap());
        assert_eq!(title(&conductor), "A");
        assert!(!conductor.back().await.unwrap());
        assert_eq!(title(&conductor), "A");

        assert!(conductor.forward().await.unwrap());
        assert_eq!(title(&conductor), "B");

        // A fresh navigation drops the forward entry for C
        conductor.go(A).await.unwrap();
        assert!(!conductor.history().can_go_forward());
        assert!(!conductor.forward().await.unwrap());
    }

    #[tokio::test]
    async fn test_revisit_reuses_encoded_page() {
        let mut conductor = conductor();
        conductor.go(A).await.unwrap();
        let encoded_a = conductor.page_data().to_vec();
        conductor.go(B).await.unwrap();

        conductor.back().await.unwrap();
        assert_eq!(conductor.page_data(), encoded_a.as_slice());
        assert_eq!(conductor.page().unwrap().address(), A);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_state() {
        let mut conductor = conductor();
        let mut events = conductor.events().subscribe();
        conductor.go(A).await.unwrap();

        let missing = "http://a.test/missing.html";
        assert!(matches!(
            conductor.go(missing).await,
            Err(BrowserError::Fetch { .. })
        ));
        assert_eq!(title(&conductor), "A");
        assert_eq!(conductor.history().back_len(), 0);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&BrowserEvent::NavigationFailed {
            url: missing.to_string(),
            reason: format!("Failed to fetch {}: no such page", missing),
        }));
    }

    #[tokio::test]
    async fn test_follow_resolves_relative_links() {
        let mut conductor = conductor();
        conductor.go(A).await.unwrap();
        conductor.follow(0).await.unwrap();
        assert_eq!(conductor.page().unwrap().address(), B);

        assert!(matches!(
            conductor.follow(5).await,
            Err(BrowserError::NoSuchLink(5))
        ));
    }

    #[tokio::test]
    async fn test_reload_without_page() {
        let mut conductor = conductor();
        assert!(matches!(conductor.reload().await, Err(BrowserError::NoPage)));
        assert!(matches!(conductor.local_addr(), Err(BrowserError::NotListening)));
    }

    #[tokio::test]
    async fn test_run_until_quit() {
        let mut conductor = conductor();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Command::Go(A.to_string())).unwrap();
        tx.send(Command::Go(B.to_string())).unwrap();
        tx.send(Command::Back).unwrap();
        tx.send(Command::Quit).unwrap();

        let mut events = conductor.events().subscribe();
        conductor.run(rx).await.unwrap();

        let mut completed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let BrowserEvent::NavigationComplete { title, .. } = event {
                completed.push(title);
            }
        }
        assert_eq!(completed, vec!["A", "B", "A"]);
        assert!(conductor.page().is_none());
    }

    #[tokio::test]
    async fn test_stalled_collaborator_does_not_block() {
        let big = "http://a.test/big.html";
        let html = format!("<p>{}</p>", "x".repeat(16 * 1024 * 1024));
        let config = SessionConfig {
            port: 0,
            send_timeout_ms: 100,
            ..SessionConfig::default()
        };
        let fetcher = MemoryFetcher::new().with_page(big, html);
        let mut conductor = Conductor::new(config, Box::new(fetcher), Box::new(HeadlessSurface));
        let addr = conductor.bind().await.unwrap();
        let mut events = conductor.events().subscribe();

        // Joins while there is no page yet, then never reads
        let _stalled = TcpStream::connect(addr).await.unwrap();
        for _ in 0..100 {
            conductor.poll_network().await;
            if conductor.collaborator_count() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(conductor.collaborator_count(), 1);

        tokio::time::timeout(std::time::Duration::from_secs(20), conductor.go(big))
            .await
            .expect("navigation must not wait on a peer that stopped reading")
            .unwrap();

        assert_eq!(conductor.page().unwrap().address(), big);
        assert_eq!(conductor.collaborator_count(), 0);

        let left = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| matches!(event, BrowserEvent::CollaboratorLeft { .. }))
            .count();
        assert_eq!(left, 1);
    }
}
