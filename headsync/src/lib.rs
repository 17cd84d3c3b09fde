//! Document head management based on facet, html5ever, and indextree.
//!
//! headsync provides:
//! - **Normalization**: turns loosely-typed producer input (possibly holding
//!   deferred values) into canonical [`TagRecord`]s
//! - **Identity**: stable render identities so updated tags patch their
//!   existing element
//! - **Reconciliation**: applies tags to a [`Dom`] and undoes, on the next
//!   pass, every side effect that was not re-applied
//! - **Arena DOM**: an in-memory [`Dom`] with an html5ever parser, for
//!   server-rendered documents and tests
//!
//! # Example
//!
//! ```rust
//! use headsync::{Document, Input, TagKind, TagRecord, normalize_tag, render_dom_head};
//!
//! let mut doc = Document::new();
//! let mut state = None;
//!
//! let meta = Input::map([("name", "description"), ("content", "Hello")]);
//! let mut tags = pollster::block_on(normalize_tag(TagKind::Meta, meta)).unwrap();
//! tags.push(TagRecord::new(TagKind::Title).with_text_content("Home"));
//!
//! render_dom_head(tags, Some(&mut doc), &mut state).unwrap();
//! assert_eq!(doc.elements_by_tag_name("meta").len(), 1);
//!
//! // a pass without the meta tag removes it again
//! render_dom_head(Vec::new(), Some(&mut doc), &mut state).unwrap();
//! assert!(doc.elements_by_tag_name("meta").is_empty());
//! ```

#[macro_use]
mod tracing_macros;

pub mod arena_dom;
pub mod dom;
pub mod identity;
pub mod normalize;
pub mod render;
pub mod tag;
pub mod value;

pub use arena_dom::{Document, parse};
pub use dom::Dom;
pub use identity::{HashIdentity, IdentityResolver, dedupe_key, hash_tag};
pub use normalize::{
    HeadInput, NormalizeError, normalize_attributes, normalize_class, normalize_entry,
    normalize_props, normalize_tag,
};
pub use render::{
    BeforeRenderContext, DomRenderer, ElementMap, NoHooks, RenderContext, RenderError,
    RenderHooks, RenderOptions, RenderOutcome, RenderState, SideEffect, SideEffects, Tracker,
    render_dom_head,
};
pub use tag::{DuplicateStrategy, EntitySequence, TagKind, TagPosition, TagRecord};
pub use value::{Deferred, Input, PropValue, Props, Value};
