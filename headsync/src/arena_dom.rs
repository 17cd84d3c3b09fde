//! Arena-based in-memory document.
//!
//! Implements [`Dom`] over an indextree arena so the renderer can run without
//! a browser: on the server, in tests, or against markup parsed with
//! html5ever for hydration.
//! - **indextree Arena**: all nodes in contiguous memory
//! - **StrTendril strings**: parsed text shares the source buffer
//! - **Mutation counter**: every mutating call is counted, so idempotence can
//!   be asserted

use html5ever::tree_builder::{ElemName, ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, LocalName, Namespace, QualName, parse_document};
use html5ever::{local_name, namespace_url, ns};
use indexmap::IndexMap;
use indextree::{Arena, NodeId};
use std::borrow::Cow;
use std::cell::RefCell;
use tendril::{StrTendril, TendrilSink};

use crate::dom::Dom;

/// Document = Arena + the handles the head renderer needs
#[derive(Debug, Clone)]
pub struct Document {
    /// THE tree - all nodes live here
    pub arena: Arena<NodeData>,

    /// Document node (parent of `<html>`)
    pub document: NodeId,

    /// Root node (usually `<html>` element)
    pub root: NodeId,

    /// DOCTYPE if present (usually "html")
    pub doctype: Option<StrTendril>,

    mutations: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let document = arena.new_node(NodeData::new(NodeKind::Document));
        let root = arena.new_node(NodeData::element("html"));
        document.append(root, &mut arena);
        let head = arena.new_node(NodeData::element("head"));
        root.append(head, &mut arena);
        let body = arena.new_node(NodeData::element("body"));
        root.append(body, &mut arena);

        Document {
            arena,
            document,
            root,
            doctype: Some(StrTendril::from("html")),
            mutations: 0,
        }
    }

    /// Get immutable reference to node data
    pub fn get(&self, id: NodeId) -> &NodeData {
        self.arena[id].get()
    }

    /// Get mutable reference to node data
    pub fn get_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.arena[id].get_mut()
    }

    /// Element data of a node, if it is an element
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.arena[id].get().kind {
            NodeKind::Element(elem) => Some(elem),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.arena[id].get_mut().kind {
            NodeKind::Element(elem) => Some(elem),
            _ => None,
        }
    }

    /// Number of mutating calls made through [`Dom`] since creation.
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    /// Whether `node` is currently reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        node.ancestors(&self.arena).any(|id| id == self.document)
    }

    /// All connected elements with the given name, in document order.
    pub fn elements_by_tag_name(&self, name: &str) -> Vec<NodeId> {
        self.root
            .descendants(&self.arena)
            .filter(|&id| self.element(id).is_some_and(|elem| elem.tag.as_ref() == name))
            .collect()
    }

    fn find_child_element(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        parent.children(&self.arena).find(|&id| {
            self.element(id)
                .is_some_and(|elem| elem.tag.as_ref() == name)
        })
    }

    fn class_tokens(&self, element: NodeId) -> Vec<String> {
        self.element(element)
            .and_then(|elem| elem.attrs.get("class"))
            .map(|class| class.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    fn replace_children_with_text(&mut self, element: NodeId, text: &str) {
        let children: Vec<_> = element.children(&self.arena).collect();
        for child in children {
            child.detach(&mut self.arena);
        }
        if !text.is_empty() {
            let text_node = self
                .arena
                .new_node(NodeData::new(NodeKind::Text(StrTendril::from(text))));
            element.append(text_node, &mut self.arena);
        }
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        for child in node.children(&self.arena) {
            match &self.get(child).kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element(_) | NodeKind::Fragment => self.collect_text(child, out),
                NodeKind::Document | NodeKind::Comment(_) => {}
            }
        }
    }

    /// Serialize the whole document, starting at the root element.
    pub fn to_html(&self) -> String {
        self.outer_html(self.root)
    }

    /// Serialize a node including its own tag.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut output = String::new();
        self.serialize_node(&mut output, node, false);
        output
    }

    fn serialize_children(&self, out: &mut String, node_id: NodeId) {
        let raw = self
            .element(node_id)
            .is_some_and(|elem| is_raw_text_element(elem.tag.as_ref()));
        for child_id in node_id.children(&self.arena) {
            self.serialize_node(out, child_id, raw);
        }
    }

    fn serialize_node(&self, out: &mut String, node_id: NodeId, raw_text: bool) {
        let node = self.get(node_id);
        match &node.kind {
            NodeKind::Document | NodeKind::Fragment => self.serialize_children(out, node_id),
            NodeKind::Element(elem) => {
                self.serialize_element(out, node_id, elem);
            }
            NodeKind::Text(text) if raw_text => out.push_str(text),
            NodeKind::Text(text) => {
                // Escape text content
                for c in text.as_ref().chars() {
                    match c {
                        '&' => out.push_str("&amp;"),
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        _ => out.push(c),
                    }
                }
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text.as_ref());
                out.push_str("-->");
            }
        }
    }

    fn serialize_element(&self, out: &mut String, node_id: NodeId, elem: &ElementData) {
        let tag = elem.tag.as_ref();

        // Opening tag
        out.push('<');
        out.push_str(tag);

        // Attributes
        for (name, value) in &elem.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            // Escape attribute value
            for c in value.as_ref().chars() {
                match c {
                    '&' => out.push_str("&amp;"),
                    '"' => out.push_str("&quot;"),
                    '<' => out.push_str("&lt;"),
                    '>' => out.push_str("&gt;"),
                    _ => out.push(c),
                }
            }
            out.push('"');
        }

        out.push('>');
        if is_void_element(tag) {
            return;
        }

        self.serialize_children(out, node_id);

        // Closing tag
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

impl Dom for Document {
    type Node = NodeId;

    fn document_element(&self) -> NodeId {
        self.root
    }

    /// Get the `<head>` element if present
    fn head(&self) -> Option<NodeId> {
        self.find_child_element(self.root, "head")
    }

    /// Get the `<body>` element if present
    fn body(&self) -> Option<NodeId> {
        self.find_child_element(self.root, "body")
    }

    fn children(&self, parent: &NodeId) -> Vec<NodeId> {
        parent
            .children(&self.arena)
            .filter(|&id| self.element(id).is_some())
            .collect()
    }

    fn first_child(&self, parent: &NodeId) -> Option<NodeId> {
        parent.children(&self.arena).next()
    }

    fn tag_name(&self, element: &NodeId) -> String {
        self.element(*element)
            .map(|elem| elem.tag.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn attribute_names(&self, element: &NodeId) -> Vec<String> {
        self.element(*element)
            .map(|elem| elem.attrs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn get_attribute(&self, element: &NodeId, name: &str) -> Option<String> {
        self.element(*element)
            .and_then(|elem| elem.attrs.get(name))
            .map(|value| value.to_string())
    }

    fn set_attribute(&mut self, element: &NodeId, name: &str, value: &str) {
        self.mutations += 1;
        if let Some(elem) = self.element_mut(*element) {
            elem.attrs.insert(name.to_string(), StrTendril::from(value));
        }
    }

    fn remove_attribute(&mut self, element: &NodeId, name: &str) {
        self.mutations += 1;
        if let Some(elem) = self.element_mut(*element) {
            elem.attrs.shift_remove(name);
        }
    }

    fn class_list_contains(&self, element: &NodeId, token: &str) -> bool {
        self.class_tokens(*element).iter().any(|t| t == token)
    }

    fn class_list_add(&mut self, element: &NodeId, token: &str) {
        let mut tokens = self.class_tokens(*element);
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
        self.set_attribute(element, "class", &tokens.join(" "));
    }

    fn class_list_remove(&mut self, element: &NodeId, token: &str) {
        let had_class = self
            .element(*element)
            .is_some_and(|elem| elem.attrs.contains_key("class"));
        if !had_class {
            self.mutations += 1;
            return;
        }
        let tokens: Vec<_> = self
            .class_tokens(*element)
            .into_iter()
            .filter(|t| t != token)
            .collect();
        self.set_attribute(element, "class", &tokens.join(" "));
    }

    fn text_content(&self, element: &NodeId) -> String {
        let mut out = String::new();
        self.collect_text(*element, &mut out);
        out
    }

    fn set_text_content(&mut self, element: &NodeId, text: &str) {
        self.mutations += 1;
        self.replace_children_with_text(*element, text);
    }

    fn inner_html(&self, element: &NodeId) -> String {
        let mut out = String::new();
        self.serialize_children(&mut out, *element);
        out
    }

    /// Markup is stored as a single text node; it serializes verbatim inside
    /// raw-text elements (`script`, `style`, `noscript`, ...), which are the
    /// only elements head tags carry content for.
    fn set_inner_html(&mut self, element: &NodeId, html: &str) {
        self.mutations += 1;
        self.replace_children_with_text(*element, html);
    }

    fn create_element(&mut self, name: &str) -> NodeId {
        self.mutations += 1;
        self.arena.new_node(NodeData::element(name))
    }

    fn create_fragment(&mut self) -> NodeId {
        self.mutations += 1;
        self.arena.new_node(NodeData::new(NodeKind::Fragment))
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.insert_before(parent, child, None);
    }

    fn insert_before(&mut self, parent: &NodeId, child: &NodeId, reference: Option<&NodeId>) {
        self.mutations += 1;
        let moved: Vec<NodeId> = if matches!(self.get(*child).kind, NodeKind::Fragment) {
            child.children(&self.arena).collect()
        } else {
            vec![*child]
        };
        for node in moved {
            node.detach(&mut self.arena);
            match reference {
                Some(reference) => reference.insert_before(node, &mut self.arena),
                None => parent.append(node, &mut self.arena),
            }
        }
    }

    fn remove(&mut self, node: &NodeId) {
        self.mutations += 1;
        node.detach(&mut self.arena);
    }

    fn title(&self) -> String {
        self.head()
            .and_then(|head| self.find_child_element(head, "title"))
            .map(|title| self.text_content(&title))
            .unwrap_or_default()
    }

    fn set_title(&mut self, title: &str) {
        let existing = self
            .head()
            .and_then(|head| self.find_child_element(head, "title"));
        let element = match existing {
            Some(element) => element,
            None => {
                let element = self.arena.new_node(NodeData::element("title"));
                let parent = self.head().unwrap_or(self.root);
                parent.append(element, &mut self.arena);
                element
            }
        };
        self.set_text_content(&element, title);
    }
}

/// HTML5 void elements that never have closing tags
fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Elements whose text children serialize without escaping
fn is_raw_text_element(tag: &str) -> bool {
    matches!(
        tag,
        "script" | "style" | "noscript" | "xmp" | "iframe" | "noembed" | "noframes"
    )
}

/// What goes in each arena slot
#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub ns: Namespace,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        NodeData {
            kind,
            ns: ns!(html),
        }
    }

    fn element(tag: &str) -> Self {
        Self::new(NodeKind::Element(ElementData {
            tag: StrTendril::from(tag),
            attrs: IndexMap::new(),
        }))
    }
}

/// Node types
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Document root (invisible, parent of `<html>`)
    Document,
    /// Detached container whose children move on insertion
    Fragment,
    /// Element with tag and attributes
    Element(ElementData),
    /// Text content (StrTendril is refcounted - cheap to clone)
    Text(StrTendril),
    /// HTML comment
    Comment(StrTendril),
}

/// Element data (tag + attributes)
#[derive(Debug, Clone)]
pub struct ElementData {
    pub tag: StrTendril,

    /// IndexMap preserves insertion order for consistent serialization
    pub attrs: IndexMap<String, StrTendril>,
}

/// Parse HTML into arena-based Document
pub fn parse(html: &str) -> Document {
    let sink = ArenaSink::new();
    let tendril = StrTendril::from(html);
    parse_document(sink, Default::default()).one(tendril)
}

/// Owned element name wrapper
#[derive(Debug, Clone)]
struct OwnedElemName(QualName);

impl ElemName for OwnedElemName {
    fn ns(&self) -> &Namespace {
        &self.0.ns
    }

    fn local_name(&self) -> &LocalName {
        &self.0.local
    }
}

/// TreeSink implementation for building arena-based DOM
struct ArenaSink {
    arena: RefCell<Arena<NodeData>>,

    /// Document node (parent of `<html>`)
    document: NodeId,

    doctype: RefCell<Option<StrTendril>>,
}

impl ArenaSink {
    fn new() -> Self {
        let mut arena = Arena::new();
        let document = arena.new_node(NodeData::new(NodeKind::Document));

        ArenaSink {
            arena: RefCell::new(arena),
            document,
            doctype: RefCell::new(None),
        }
    }
}

impl TreeSink for ArenaSink {
    type Handle = NodeId;
    type Output = Document;
    type ElemName<'a>
        = OwnedElemName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        let arena = self.arena.into_inner();

        // The root element, skipping comments before `<html>`
        let root = self
            .document
            .children(&arena)
            .find(|&id| matches!(arena[id].get().kind, NodeKind::Element(_)))
            .unwrap_or(self.document);

        Document {
            arena,
            document: self.document,
            root,
            doctype: self.doctype.into_inner(),
            mutations: 0,
        }
    }

    fn parse_error(&self, _msg: Cow<'static, str>) {
        // html5ever recovers automatically
    }

    fn get_document(&self) -> Self::Handle {
        self.document
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn same_node(&self, a: &Self::Handle, b: &Self::Handle) -> bool {
        a == b
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> OwnedElemName {
        let arena = self.arena.borrow();
        let node = &arena[*target].get();

        let local = match &node.kind {
            NodeKind::Element(elem) => LocalName::from(elem.tag.as_ref()),
            _ => local_name!(""),
        };
        OwnedElemName(QualName::new(None, node.ns.clone(), local))
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        let tag = StrTendril::from(name.local.as_ref());

        // First occurrence of an attribute wins, as in browsers
        let mut attr_map = IndexMap::with_capacity(attrs.len());
        for attr in attrs {
            attr_map
                .entry(attr.name.local.to_string())
                .or_insert(attr.value);
        }

        self.arena.borrow_mut().new_node(NodeData {
            kind: NodeKind::Element(ElementData {
                tag,
                attrs: attr_map,
            }),
            ns: name.ns,
        })
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        self.arena
            .borrow_mut()
            .new_node(NodeData::new(NodeKind::Comment(text)))
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        self.arena
            .borrow_mut()
            .new_node(NodeData::new(NodeKind::Comment(StrTendril::new())))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let mut arena = self.arena.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => {
                parent.append(node, &mut *arena);
            }
            NodeOrText::AppendText(text) => {
                // Merge with the previous text node (html5ever behavior)
                let last_child_id = parent.children(&arena).next_back();

                if let Some(last_child) = last_child_id
                    && let NodeKind::Text(existing) = &mut arena[last_child].get_mut().kind
                {
                    existing.push_tendril(&text);
                    return;
                }

                let text_node = arena.new_node(NodeData::new(NodeKind::Text(text)));
                parent.append(text_node, &mut arena);
            }
        }
    }

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let mut arena = self.arena.borrow_mut();
        match new_node {
            NodeOrText::AppendNode(node) => {
                sibling.insert_before(node, &mut *arena);
            }
            NodeOrText::AppendText(text) => {
                let text_node = arena.new_node(NodeData::new(NodeKind::Text(text)));
                sibling.insert_before(text_node, &mut *arena);
            }
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        _prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        self.append(element, child);
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
        *self.doctype.borrow_mut() = Some(name);
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        // Template contents live directly under the element
        *target
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        let mut arena = self.arena.borrow_mut();
        let node = &mut arena[*target].get_mut();
        if let NodeKind::Element(elem) = &mut node.kind {
            for attr in attrs {
                let key = attr.name.local.to_string();
                elem.attrs.entry(key).or_insert(attr.value);
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        target.detach(&mut self.arena.borrow_mut());
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let mut arena = self.arena.borrow_mut();
        let children: Vec<NodeId> = node.children(&*arena).collect();
        for child in children {
            child.detach(&mut *arena);
            new_parent.append(child, &mut *arena);
        }
    }
}
