//! Display surfaces
//!
//! The sessions never draw anything themselves. They hand pages, addresses
//! and errors to a `DisplaySurface`; user input comes back as `Command`s.

use std::io::Write;

use dom::Page;

use crate::render::{render_text, RenderOptions};

pub trait DisplaySurface: Send {
    fn show_address(&mut self, address: &str);

    fn show_page(&mut self, page: &Page);

    fn show_error(&mut self, message: &str);

    fn show_links(&mut self, links: &[String]) {
        let _ = links;
    }
}

/// Logs what would be displayed
#[derive(Debug, Default)]
pub struct HeadlessSurface;

impl DisplaySurface for HeadlessSurface {
    fn show_address(&mut self, address: &str) {
        tracing::info!("address: {}", address);
    }

    fn show_page(&mut self, page: &Page) {
        tracing::info!(
            address = %page.address(),
            nodes = page.arena().len(),
            "showing '{}'",
            page.title()
        );
    }

    fn show_error(&mut self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn show_links(&mut self, links: &[String]) {
        for (index, link) in links.iter().enumerate() {
            tracing::info!("[{}] {}", index, link);
        }
    }
}

/// Writes rendered pages as plain text
pub struct TextSurface<W: Write + Send> {
    out: W,
    options: RenderOptions,
}

impl TextSurface<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout(), RenderOptions::default())
    }
}

impl<W: Write + Send> TextSurface<W> {
    pub fn new(out: W, options: RenderOptions) -> Self {
        Self { out, options }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::warn!("display write failed: {}", e);
        }
    }
}

impl<W: Write + Send> DisplaySurface for TextSurface<W> {
    fn show_address(&mut self, address: &str) {
        self.write(&format!("== {}\n", address));
    }

    fn show_page(&mut self, page: &Page) {
        match render_text(page, self.options) {
            Ok(body) => self.write(&format!("# {}\n\n{}\n", page.title(), body)),
            Err(e) => self.show_error(&format!("cannot render {}: {}", page.address(), e)),
        }
    }

    fn show_error(&mut self, message: &str) {
        self.write(&format!("!! {}\n", message));
    }

    fn show_links(&mut self, links: &[String]) {
        let mut text = String::new();
        for (index, link) in links.iter().enumerate() {
            text.push_str(&format!("[{}] {}\n", index, link));
        }
        self.write(&text);
    }
}
