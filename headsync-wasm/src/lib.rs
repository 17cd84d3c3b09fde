//! Browser client for headsync.
//!
//! Wraps the live `window.document` in a [`Dom`] and exposes a
//! [`HeadRenderer`] to JavaScript that keeps the render state between calls.

use std::cell::RefCell;
use std::rc::Rc;

use headsync::{
    Dom, DomRenderer, HeadInput, Input, NoHooks, RenderOutcome, RenderState, normalize_entry,
};
use js_sys::{Array, Object, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise};
use web_sys::{Element, Node};

#[wasm_bindgen(start)]
pub fn start() {
    let _ = wasm_tracing::set_as_global_default();
}

fn log_failure<T>(op: &str, result: Result<T, JsValue>) {
    if let Err(err) = result {
        tracing::warn!(op, ?err, "DOM operation failed");
    }
}

fn describe(err: JsValue) -> String {
    if let Some(message) = err.as_string() {
        return message;
    }
    match err.dyn_ref::<js_sys::Error>() {
        Some(error) => String::from(error.message()),
        None => format!("{err:?}"),
    }
}

/// [`Dom`] over a browser document.
#[derive(Debug, Clone)]
pub struct WebDom {
    document: web_sys::Document,
}

impl WebDom {
    pub fn new(document: web_sys::Document) -> Self {
        Self { document }
    }

    /// The document of the current window, if there is one.
    pub fn from_window() -> Option<Self> {
        web_sys::window()?.document().map(Self::new)
    }
}

impl Dom for WebDom {
    type Node = Node;

    fn document_element(&self) -> Node {
        match self.document.document_element() {
            Some(root) => root.into(),
            None => self.document.clone().into(),
        }
    }

    fn head(&self) -> Option<Node> {
        self.document.head().map(Node::from)
    }

    fn body(&self) -> Option<Node> {
        self.document.body().map(Node::from)
    }

    fn children(&self, parent: &Node) -> Vec<Node> {
        let Some(parent) = parent.dyn_ref::<Element>() else {
            return Vec::new();
        };
        let children = parent.children();
        (0..children.length())
            .filter_map(|index| children.item(index))
            .map(Node::from)
            .collect()
    }

    fn first_child(&self, parent: &Node) -> Option<Node> {
        parent.first_child()
    }

    fn tag_name(&self, element: &Node) -> String {
        element
            .dyn_ref::<Element>()
            .map(|element| element.tag_name().to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn attribute_names(&self, element: &Node) -> Vec<String> {
        element
            .dyn_ref::<Element>()
            .map(|element| {
                element
                    .get_attribute_names()
                    .iter()
                    .filter_map(|name| name.as_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get_attribute(&self, element: &Node, name: &str) -> Option<String> {
        element.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn set_attribute(&mut self, element: &Node, name: &str, value: &str) {
        if let Some(element) = element.dyn_ref::<Element>() {
            log_failure("setAttribute", element.set_attribute(name, value));
        }
    }

    fn remove_attribute(&mut self, element: &Node, name: &str) {
        if let Some(element) = element.dyn_ref::<Element>() {
            log_failure("removeAttribute", element.remove_attribute(name));
        }
    }

    fn class_list_contains(&self, element: &Node, token: &str) -> bool {
        element
            .dyn_ref::<Element>()
            .is_some_and(|element| element.class_list().contains(token))
    }

    fn class_list_add(&mut self, element: &Node, token: &str) {
        if let Some(element) = element.dyn_ref::<Element>() {
            log_failure("classList.add", element.class_list().add_1(token));
        }
    }

    fn class_list_remove(&mut self, element: &Node, token: &str) {
        if let Some(element) = element.dyn_ref::<Element>() {
            log_failure("classList.remove", element.class_list().remove_1(token));
        }
    }

    fn text_content(&self, element: &Node) -> String {
        element.text_content().unwrap_or_default()
    }

    fn set_text_content(&mut self, element: &Node, text: &str) {
        element.set_text_content(Some(text));
    }

    fn inner_html(&self, element: &Node) -> String {
        element
            .dyn_ref::<Element>()
            .map(Element::inner_html)
            .unwrap_or_default()
    }

    fn set_inner_html(&mut self, element: &Node, html: &str) {
        if let Some(element) = element.dyn_ref::<Element>() {
            element.set_inner_html(html);
        }
    }

    fn create_element(&mut self, name: &str) -> Node {
        // only called with the fixed set of head element names
        self.document
            .create_element(name)
            .expect_throw("head element names are valid")
            .into()
    }

    fn create_fragment(&mut self) -> Node {
        self.document.create_document_fragment().into()
    }

    fn append_child(&mut self, parent: &Node, child: &Node) {
        log_failure("appendChild", parent.append_child(child));
    }

    fn insert_before(&mut self, parent: &Node, child: &Node, reference: Option<&Node>) {
        log_failure("insertBefore", parent.insert_before(child, reference));
    }

    fn remove(&mut self, node: &Node) {
        if let Some(element) = node.dyn_ref::<Element>() {
            element.remove();
        } else if let Some(parent) = node.parent_node() {
            log_failure("removeChild", parent.remove_child(node));
        }
    }

    fn title(&self) -> String {
        self.document.title()
    }

    fn set_title(&mut self, title: &str) {
        self.document.set_title(title);
    }
}

/// Convert a JS value into producer input. Promises become deferred values
/// that are awaited during normalization.
pub fn input_from_js(value: JsValue) -> Input {
    if value.is_null() || value.is_undefined() {
        return Input::Null;
    }
    if let Some(b) = value.as_bool() {
        return Input::Bool(b);
    }
    if let Some(n) = value.as_f64() {
        return Input::Number(n);
    }
    if let Some(s) = value.as_string() {
        return Input::String(s);
    }
    if value.is_instance_of::<Promise>() {
        let future = JsFuture::from(value.unchecked_into::<Promise>());
        return Input::deferred(async move { future.await.map(input_from_js).map_err(describe) });
    }
    if Array::is_array(&value) {
        return Input::List(Array::from(&value).iter().map(input_from_js).collect());
    }
    if value.is_object() {
        let entries: Vec<(String, Input)> = Object::entries(value.unchecked_ref::<Object>())
            .iter()
            .filter_map(|entry| {
                let pair = Array::from(&entry);
                Some((pair.get(0).as_string()?, input_from_js(pair.get(1))))
            })
            .collect();
        return Input::map(entries);
    }
    tracing::debug!(?value, "unsupported JS value, treating as null");
    Input::Null
}

fn entry_from_js(value: &JsValue) -> Result<HeadInput, JsValue> {
    match input_from_js(value.clone()) {
        Input::Map(entries) => Ok(entries),
        _ => Err(js_sys::Error::new("head entry must be an object").into()),
    }
}

struct Inner {
    entries: Vec<JsValue>,
    renderer: DomRenderer,
    state: Option<RenderState<WebDom>>,
}

/// Head manager bound to `window.document`.
#[wasm_bindgen]
pub struct HeadRenderer {
    inner: Rc<RefCell<Inner>>,
}

impl Default for HeadRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl HeadRenderer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> HeadRenderer {
        HeadRenderer {
            inner: Rc::new(RefCell::new(Inner {
                entries: Vec::new(),
                renderer: DomRenderer::new(),
                state: None,
            })),
        }
    }

    /// Add an entry (an object keyed by tag kind). Entries render in the
    /// order they were pushed.
    pub fn push(&self, entry: JsValue) {
        self.inner.borrow_mut().entries.push(entry);
    }

    /// Forget every entry; the next render removes what they produced.
    pub fn clear(&self) {
        self.inner.borrow_mut().entries.clear();
    }

    /// Normalize every entry and reconcile the document. Resolves to whether
    /// a pass actually ran.
    pub fn render(&self) -> Promise {
        let inner = Rc::clone(&self.inner);
        future_to_promise(async move {
            let entries = inner
                .borrow()
                .entries
                .iter()
                .map(entry_from_js)
                .collect::<Result<Vec<_>, _>>()?;

            let mut tags = Vec::new();
            for (index, entry) in entries.into_iter().enumerate() {
                let normalized = normalize_entry(index as u32, entry)
                    .await
                    .map_err(|err| js_sys::Error::new(&err.to_string()))?;
                tags.extend(normalized);
            }
            tracing::debug!(count = tags.len(), "normalized head tags");

            let mut dom = WebDom::from_window();
            let mut inner = inner.borrow_mut();
            let Inner {
                renderer, state, ..
            } = &mut *inner;
            let outcome = renderer
                .render(tags, dom.as_mut(), state, &mut NoHooks)
                .map_err(|err| js_sys::Error::new(&err.to_string()))?;
            Ok(JsValue::from_bool(outcome == RenderOutcome::Rendered))
        })
    }
}
