//! Reconciliation of tag records against a live document.
//!
//! A pass matches every tag to an element by render identity, patches
//! matched elements in place, creates the missing ones, and finally undoes
//! every side effect of the previous pass that was not re-applied. The state
//! linking passes together is a caller-owned [`RenderState`].

mod hooks;
mod ledger;

pub use hooks::{BeforeRenderContext, NoHooks, RenderContext, RenderHooks};
pub use ledger::{ElementMap, SideEffect, SideEffects, Tracker};

use facet::Facet;
use std::fmt;

use crate::dom::Dom;
use crate::identity::{HashIdentity, IdentityResolver, dedupe_key};
use crate::normalize::normalize_attributes;
use crate::tag::{TagKind, TagPosition, TagRecord};

/// Errors that abort a render pass.
#[derive(Facet, Debug)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum RenderError {
    /// `{hook}` hook failed: {message}
    Hook { hook: String, message: String },
}

impl RenderError {
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Attribute carrying a precomputed identity on server-rendered
    /// elements (default: `data-hid`).
    pub hydration_attribute: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            hydration_attribute: "data-hid".to_string(),
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hydration_attribute(mut self, name: impl Into<String>) -> Self {
        self.hydration_attribute = name.into();
        self
    }
}

/// What a call to [`DomRenderer::render`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// No document to render into; nothing happened.
    NoDocument,
    /// A `before_render` hook vetoed the pass; nothing happened.
    Vetoed,
    /// The pass ran and its state was committed.
    Rendered,
}

/// Reconciliation state carried from one pass to the next.
pub struct RenderState<D: Dom> {
    element_map: ElementMap<D::Node>,
    side_effects: SideEffects<D>,
}

impl<D: Dom> RenderState<D> {
    /// Element currently owned for a render identity.
    pub fn element(&self, id: &str) -> Option<&D::Node> {
        self.element_map.get(id)
    }

    pub fn element_map(&self) -> &ElementMap<D::Node> {
        &self.element_map
    }

    pub fn side_effects(&self) -> &SideEffects<D> {
        &self.side_effects
    }
}

impl<D: Dom> Clone for RenderState<D> {
    fn clone(&self) -> Self {
        Self {
            element_map: self.element_map.clone(),
            side_effects: self.side_effects.clone(),
        }
    }
}

impl<D: Dom> fmt::Debug for RenderState<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderState")
            .field("element_map", &self.element_map)
            .field("side_effects", &self.side_effects)
            .finish()
    }
}

/// Reconciles tag records against a [`Dom`].
#[derive(Debug, Clone, Default)]
pub struct DomRenderer<R = HashIdentity> {
    options: RenderOptions,
    identity: R,
}

impl DomRenderer<HashIdentity> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: IdentityResolver> DomRenderer<R> {
    /// Swap the identity resolver.
    pub fn with_identity<R2: IdentityResolver>(self, identity: R2) -> DomRenderer<R2> {
        DomRenderer {
            options: self.options,
            identity,
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Identity a tag renders under.
    pub fn render_id(&self, tag: &TagRecord) -> String {
        if tag.kind.is_element() {
            self.identity.identity(tag)
        } else {
            tag.kind.as_str().to_string()
        }
    }

    /// Seed an element map from what is already in the document: the
    /// attribute bag targets plus every head-level element in `<body>` and
    /// `<head>`.
    pub fn hydrate<D: Dom>(&self, dom: &D) -> ElementMap<D::Node> {
        let mut elements = ElementMap::new();
        elements.insert(TagKind::HtmlAttrs.as_str().to_string(), dom.document_element());
        let body = dom.body();
        if let Some(body) = &body {
            elements.insert(TagKind::BodyAttrs.as_str().to_string(), body.clone());
        }

        for parent in [body, dom.head()].into_iter().flatten() {
            for child in dom.children(&parent) {
                let Some(kind) = TagKind::from_element_name(&dom.tag_name(&child)) else {
                    continue;
                };
                let id = dom
                    .get_attribute(&child, &self.options.hydration_attribute)
                    .filter(|hid| !hid.is_empty())
                    .unwrap_or_else(|| self.identity.identity(&element_to_tag(dom, &child, kind)));
                trace!(id = %id, kind = %kind, "hydrated element");
                elements.insert(id, child);
            }
        }
        elements
    }

    /// Run one reconciliation pass.
    ///
    /// `state` holds the previous pass's state (`None` on the first pass,
    /// which hydrates from the document). It is replaced only once the pass
    /// has applied everything, so a failing hook before that point leaves it
    /// untouched. DOM mutations already made are not rolled back.
    pub fn render<D, H>(
        &self,
        tags: Vec<TagRecord>,
        dom: Option<&mut D>,
        state: &mut Option<RenderState<D>>,
        hooks: &mut H,
    ) -> Result<RenderOutcome, RenderError>
    where
        D: Dom,
        H: RenderHooks<D> + ?Sized,
    {
        let Some(dom) = dom else {
            debug!("no document, skipping render");
            return Ok(RenderOutcome::NoDocument);
        };

        let mut before = BeforeRenderContext {
            should_render: true,
            tags: &tags,
        };
        hooks.before_render(&mut before)?;
        if !before.should_render {
            debug!("render vetoed by before_render hook");
            return Ok(RenderOutcome::Vetoed);
        }

        let mut contexts: Vec<RenderContext<D::Node>> = tags
            .into_iter()
            .map(|tag| RenderContext {
                id: self.render_id(&tag),
                tag,
                should_render: true,
                element: None,
            })
            .collect();

        let prior = state.as_ref();
        let mut elements = match prior {
            Some(prior) => prior.element_map.clone(),
            None => {
                let elements = self.hydrate(&*dom);
                debug!(count = elements.len(), "hydrated element map");
                elements
            }
        };
        let mut tracker = Tracker::new(prior.map(|prior| &prior.side_effects));

        // tags that can be matched without creating anything
        let mut pending = Vec::new();
        for (index, ctx) in contexts.iter_mut().enumerate() {
            if !ctx.should_render {
                continue;
            }
            if ctx.tag.kind == TagKind::Title {
                let title = ctx.tag.text_content.as_deref().unwrap_or_default();
                if dom.title() != title {
                    dom.set_title(title);
                }
                continue;
            }
            if ctx.element.is_none() {
                ctx.element = elements.get(&ctx.id).cloned();
            }
            if ctx.element.is_some() {
                patch(dom, ctx, &mut elements, &mut tracker);
            } else if ctx.tag.kind.is_element() {
                pending.push(index);
            }
        }

        let mut fragments: [Option<D::Node>; 3] = [None, None, None];
        for index in pending {
            let ctx = &mut contexts[index];
            let Some(name) = ctx.tag.kind.element_name() else {
                continue;
            };
            let element = dom.create_element(name);
            ctx.element = Some(element.clone());
            patch(dom, ctx, &mut elements, &mut tracker);
            trace!(id = %ctx.id, kind = %ctx.tag.kind, "created element");

            let fragment = fragments[fragment_slot(ctx.tag.position)]
                .get_or_insert_with(|| dom.create_fragment());
            dom.append_child(fragment, &element);
        }

        for ctx in contexts.iter_mut() {
            hooks.render_tag(ctx, &mut *dom, &mut tracker)?;
        }

        let [head_fragment, body_open_fragment, body_close_fragment] = fragments;
        if let Some(fragment) = head_fragment {
            let head = dom.head().unwrap_or_else(|| dom.document_element());
            dom.append_child(&head, &fragment);
        }
        if let Some(body) = dom.body() {
            if let Some(fragment) = body_open_fragment {
                let first = dom.first_child(&body);
                dom.insert_before(&body, &fragment, first.as_ref());
            }
            if let Some(fragment) = body_close_fragment {
                dom.append_child(&body, &fragment);
            }
        }

        debug!(
            stale = tracker.pending().len(),
            "undoing side effects that were not re-applied"
        );
        let side_effects = tracker.finish(dom, &mut elements);
        *state = Some(RenderState {
            element_map: elements,
            side_effects,
        });

        hooks.rendered(&contexts)?;
        Ok(RenderOutcome::Rendered)
    }
}

/// Render with default options, the default identity and no hooks.
pub fn render_dom_head<D: Dom>(
    tags: Vec<TagRecord>,
    dom: Option<&mut D>,
    state: &mut Option<RenderState<D>>,
) -> Result<RenderOutcome, RenderError> {
    DomRenderer::new().render(tags, dom, state, &mut NoHooks)
}

fn fragment_slot(position: TagPosition) -> usize {
    match position {
        TagPosition::Head => 0,
        TagPosition::BodyOpen => 1,
        TagPosition::BodyClose => 2,
    }
}

/// Rebuild a tag record from a live element so its identity can be computed.
fn element_to_tag<D: Dom>(dom: &D, element: &D::Node, kind: TagKind) -> TagRecord {
    let mut tag = TagRecord::new(kind);
    tag.props = normalize_attributes(dom.attribute_names(element).into_iter().filter_map(|name| {
        let value = dom.get_attribute(element, &name)?;
        Some((name, value))
    }));
    tag.inner_html = Some(dom.inner_html(element));
    tag.dedupe = dedupe_key(&tag);
    tag
}

/// Apply a tag to its element and track the side effects.
///
/// Element tags are tracked as a whole and removed when stale; attribute
/// bags are tracked attribute by attribute and class token by class token,
/// since `<html>` and `<body>` themselves never go away.
fn patch<D: Dom>(
    dom: &mut D,
    ctx: &RenderContext<D::Node>,
    elements: &mut ElementMap<D::Node>,
    tracker: &mut Tracker<D>,
) {
    let Some(element) = ctx.element.clone() else {
        return;
    };
    let id = ctx.id.as_str();
    let is_attr_bag = ctx.tag.kind.is_attr_bag();
    elements.insert(ctx.id.clone(), element.clone());

    if !is_attr_bag {
        if let Some(text) = ctx.tag.text_content.as_deref().filter(|t| !t.is_empty())
            && dom.text_content(&element) != text
        {
            dom.set_text_content(&element, text);
        }
        if let Some(html) = ctx.tag.inner_html.as_deref().filter(|h| !h.is_empty())
            && dom.inner_html(&element) != html
        {
            dom.set_inner_html(&element, html);
        }
        tracker.track(id, "el", SideEffect::RemoveElement { id: ctx.id.clone() });
    }

    for (name, value) in &ctx.tag.props {
        if name == "class" {
            let class = value.as_attribute().unwrap_or_default();
            for token in class.split_whitespace() {
                if is_attr_bag {
                    tracker.track(
                        id,
                        &format!("attr:class:{token}"),
                        SideEffect::RemoveClass {
                            node: element.clone(),
                            token: token.to_string(),
                        },
                    );
                }
                if !dom.class_list_contains(&element, token) {
                    dom.class_list_add(&element, token);
                }
            }
            continue;
        }

        let current = dom.get_attribute(&element, name);
        match value.as_attribute() {
            Some(desired) if current.as_deref() != Some(&*desired) => {
                dom.set_attribute(&element, name, &desired);
            }
            None if current.is_some() => dom.remove_attribute(&element, name),
            _ => {}
        }
        if is_attr_bag {
            tracker.track(
                id,
                &format!("attr:{name}"),
                SideEffect::RemoveAttribute {
                    node: element.clone(),
                    name: name.clone(),
                },
            );
        }
    }
}
