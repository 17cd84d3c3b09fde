//! The document surface the renderer drives.
//!
//! Implemented by [`crate::arena_dom::Document`] for in-memory documents and by
//! the wasm client for the browser's live `document`.

use std::fmt::Debug;

/// A mutable document tree.
///
/// Mirrors the small slice of the DOM API head management needs. Node
/// handles are cheap to clone and compare by identity.
pub trait Dom {
    type Node: Clone + PartialEq + Debug;

    /// The root `<html>` element.
    fn document_element(&self) -> Self::Node;

    fn head(&self) -> Option<Self::Node>;

    fn body(&self) -> Option<Self::Node>;

    /// Element children of `parent`, in document order.
    fn children(&self, parent: &Self::Node) -> Vec<Self::Node>;

    /// First child node of any kind.
    fn first_child(&self, parent: &Self::Node) -> Option<Self::Node>;

    /// Lowercase element name.
    fn tag_name(&self, element: &Self::Node) -> String;

    fn attribute_names(&self, element: &Self::Node) -> Vec<String>;

    fn get_attribute(&self, element: &Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&mut self, element: &Self::Node, name: &str, value: &str);

    fn remove_attribute(&mut self, element: &Self::Node, name: &str);

    fn class_list_contains(&self, element: &Self::Node, token: &str) -> bool;

    fn class_list_add(&mut self, element: &Self::Node, token: &str);

    fn class_list_remove(&mut self, element: &Self::Node, token: &str);

    fn text_content(&self, element: &Self::Node) -> String;

    fn set_text_content(&mut self, element: &Self::Node, text: &str);

    fn inner_html(&self, element: &Self::Node) -> String;

    fn set_inner_html(&mut self, element: &Self::Node, html: &str);

    fn create_element(&mut self, name: &str) -> Self::Node;

    fn create_fragment(&mut self) -> Self::Node;

    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node);

    /// Insert `child` before `reference`, or append when `reference` is `None`.
    /// Inserting a fragment moves its children and leaves it empty.
    fn insert_before(
        &mut self,
        parent: &Self::Node,
        child: &Self::Node,
        reference: Option<&Self::Node>,
    );

    /// Detach a node from its parent.
    fn remove(&mut self, node: &Self::Node);

    fn title(&self) -> String;

    fn set_title(&mut self, title: &str);
}
