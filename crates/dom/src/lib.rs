//! Gaudy document model
//!
//! Arena-backed HTML trees, a forgiving streaming tokenizer, and the binary
//! page codec used to hand pages between peers.
//!
//! ## Core Design
//!
//! ```text
//! HTML text → Tokenizer → TagSink (TreeBuilder) → DomArena → Page
//!                               ↑                              ↓
//!                     replayed decoded tree  ←  bytes  ←  PageSerializer
//! ```
//!
//! - Nodes live in one `Vec` and refer to each other by `u32` index
//! - Text runs are `data` nodes carrying a single `text` attribute
//! - Tag behaviour comes from a static dispatch table (`TagKind`)

pub mod arena;
pub mod error;
pub mod page;
pub mod parser;
pub mod serializer;
pub mod service;
pub mod types;
pub mod utils;

pub use arena::DomArena;
pub use error::{DomError, Result};
pub use page::Page;
pub use parser::{parse_document, ParserConfig, TagSink, Tokenizer, TreeBuilder};
pub use serializer::{deserialize_page, serialize_page, PageSerializer};
pub use service::{DomService, DomServiceConfig};
pub use types::*;
