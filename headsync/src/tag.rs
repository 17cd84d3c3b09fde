//! Canonical tag records consumed by the renderer.

use facet::Facet;
use std::fmt;

use crate::value::{PropValue, Props};

/// Bits reserved for a tag's index within its entry; 1024 tags per entry.
pub const TAG_ENTITY_BITS: u32 = 10;

/// Closed vocabulary of head-level tag kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum TagKind {
    Title,
    TitleTemplate,
    Base,
    Link,
    Meta,
    Style,
    Script,
    Noscript,
    HtmlAttrs,
    BodyAttrs,
    TemplateParams,
}

impl TagKind {
    pub const ALL: [TagKind; 11] = [
        TagKind::Title,
        TagKind::TitleTemplate,
        TagKind::Base,
        TagKind::Link,
        TagKind::Meta,
        TagKind::Style,
        TagKind::Script,
        TagKind::Noscript,
        TagKind::HtmlAttrs,
        TagKind::BodyAttrs,
        TagKind::TemplateParams,
    ];

    /// Name used by producers, e.g. `"htmlAttrs"`.
    pub fn as_str(self) -> &'static str {
        match self {
            TagKind::Title => "title",
            TagKind::TitleTemplate => "titleTemplate",
            TagKind::Base => "base",
            TagKind::Link => "link",
            TagKind::Meta => "meta",
            TagKind::Style => "style",
            TagKind::Script => "script",
            TagKind::Noscript => "noscript",
            TagKind::HtmlAttrs => "htmlAttrs",
            TagKind::BodyAttrs => "bodyAttrs",
            TagKind::TemplateParams => "templateParams",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Kinds that render as their own element in the document.
    pub fn is_element(self) -> bool {
        matches!(
            self,
            TagKind::Base
                | TagKind::Meta
                | TagKind::Link
                | TagKind::Style
                | TagKind::Script
                | TagKind::Noscript
        )
    }

    /// Kinds allowed to carry `innerHTML`/`textContent`.
    pub fn has_inner_content(self) -> bool {
        matches!(self, TagKind::Script | TagKind::Style | TagKind::Noscript)
    }

    /// Attribute bags patched onto `<html>` and `<body>`.
    pub fn is_attr_bag(self) -> bool {
        matches!(self, TagKind::HtmlAttrs | TagKind::BodyAttrs)
    }

    /// Kinds of which a document holds at most one.
    pub fn is_unique(self) -> bool {
        matches!(
            self,
            TagKind::Base
                | TagKind::Title
                | TagKind::TitleTemplate
                | TagKind::BodyAttrs
                | TagKind::HtmlAttrs
                | TagKind::TemplateParams
        )
    }

    /// Element name for element-producing kinds.
    pub fn element_name(self) -> Option<&'static str> {
        if self.is_element() {
            Some(self.as_str())
        } else {
            None
        }
    }

    /// Inverse of [`TagKind::element_name`].
    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::parse(name).filter(|kind| kind.is_element())
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a newly created element is inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum TagPosition {
    /// Appended to `<head>`.
    #[default]
    Head,
    /// Inserted before the first child of `<body>`.
    BodyOpen,
    /// Appended to `<body>`.
    BodyClose,
}

impl TagPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            TagPosition::Head => "head",
            TagPosition::BodyOpen => "bodyOpen",
            TagPosition::BodyClose => "bodyClose",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "head" => Some(TagPosition::Head),
            "bodyOpen" => Some(TagPosition::BodyOpen),
            "bodyClose" => Some(TagPosition::BodyClose),
            _ => None,
        }
    }
}

/// How the upstream dedupe stage merges tags sharing a dedupe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum DuplicateStrategy {
    Replace,
    Merge,
}

impl DuplicateStrategy {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "replace" => Some(DuplicateStrategy::Replace),
            "merge" => Some(DuplicateStrategy::Merge),
            _ => None,
        }
    }
}

/// Submission order of a tag: owning entry plus index within that entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
pub struct EntitySequence {
    pub entry: u32,
    pub index: u32,
}

impl EntitySequence {
    /// Composite ordering key, `(entry << TAG_ENTITY_BITS) + index`.
    pub fn position(self) -> u64 {
        (u64::from(self.entry) << TAG_ENTITY_BITS) + u64::from(self.index)
    }
}

/// One fully normalized renderable unit.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct TagRecord {
    pub kind: TagKind,
    pub props: Props,
    pub text_content: Option<String>,
    pub inner_html: Option<String>,
    pub position: TagPosition,
    pub priority: Option<String>,
    pub duplicate_strategy: Option<DuplicateStrategy>,
    pub process_template_params: Option<bool>,
    pub key: Option<String>,
    pub sequence: Option<EntitySequence>,
    /// Dedupe key, when the producer or the dedupe stage already derived one.
    pub dedupe: Option<String>,
}

impl TagRecord {
    pub fn new(kind: TagKind) -> Self {
        Self {
            kind,
            props: Props::new(),
            text_content: None,
            inner_html: None,
            position: TagPosition::Head,
            priority: None,
            duplicate_strategy: None,
            process_template_params: None,
            key: None,
            sequence: None,
            dedupe: None,
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn with_text_content(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    pub fn with_inner_html(mut self, html: impl Into<String>) -> Self {
        self.inner_html = Some(html.into());
        self
    }

    pub fn with_position(mut self, position: TagPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Content payload, `textContent` taking precedence over `innerHTML`.
    pub fn content(&self) -> Option<&str> {
        self.text_content
            .as_deref()
            .or(self.inner_html.as_deref())
    }

    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    /// Attribute value as a string, for discriminating attributes.
    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(PropValue::as_str)
    }
}
