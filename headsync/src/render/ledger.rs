//! Side-effect ledger.
//!
//! Every mutation made on behalf of a tag is recorded with an undo action
//! under `"{id}:{scope}"`. A pass starts by presuming everything from the
//! previous pass stale; re-tracking a key cancels that, and whatever is
//! still pending at the end of the pass gets undone.

use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

use crate::dom::Dom;

/// Identity → element mapping persisted across passes.
pub type ElementMap<N> = IndexMap<String, N>;

/// Undo action for one tracked side effect. Running one twice is harmless.
pub enum SideEffect<D: Dom> {
    /// Remove the element mapped to `id` and forget the mapping.
    RemoveElement { id: String },
    RemoveAttribute { node: D::Node, name: String },
    RemoveClass { node: D::Node, token: String },
    /// Hook-supplied undo action.
    Custom(Rc<dyn Fn(&mut D)>),
}

impl<D: Dom> SideEffect<D> {
    pub fn custom(undo: impl Fn(&mut D) + 'static) -> Self {
        SideEffect::Custom(Rc::new(undo))
    }

    pub(crate) fn undo(&self, dom: &mut D, elements: &mut ElementMap<D::Node>) {
        match self {
            SideEffect::RemoveElement { id } => {
                if let Some(node) = elements.shift_remove(id) {
                    dom.remove(&node);
                }
            }
            SideEffect::RemoveAttribute { node, name } => dom.remove_attribute(node, name),
            SideEffect::RemoveClass { node, token } => dom.class_list_remove(node, token),
            SideEffect::Custom(undo) => undo(dom),
        }
    }
}

impl<D: Dom> Clone for SideEffect<D> {
    fn clone(&self) -> Self {
        match self {
            SideEffect::RemoveElement { id } => SideEffect::RemoveElement { id: id.clone() },
            SideEffect::RemoveAttribute { node, name } => SideEffect::RemoveAttribute {
                node: node.clone(),
                name: name.clone(),
            },
            SideEffect::RemoveClass { node, token } => SideEffect::RemoveClass {
                node: node.clone(),
                token: token.clone(),
            },
            SideEffect::Custom(undo) => SideEffect::Custom(Rc::clone(undo)),
        }
    }
}

impl<D: Dom> fmt::Debug for SideEffect<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::RemoveElement { id } => {
                f.debug_struct("RemoveElement").field("id", id).finish()
            }
            SideEffect::RemoveAttribute { node, name } => f
                .debug_struct("RemoveAttribute")
                .field("node", node)
                .field("name", name)
                .finish(),
            SideEffect::RemoveClass { node, token } => f
                .debug_struct("RemoveClass")
                .field("node", node)
                .field("token", token)
                .finish(),
            SideEffect::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Ordered set of tracked side effects.
pub struct SideEffects<D: Dom> {
    entries: IndexMap<String, SideEffect<D>>,
}

impl<D: Dom> SideEffects<D> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&SideEffect<D>> {
        self.entries.get(key)
    }

    /// Ledger keys in tracking order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<D: Dom> Default for SideEffects<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dom> Clone for SideEffects<D> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<D: Dom> fmt::Debug for SideEffects<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// Working ledger of a single pass.
///
/// Handed to `render_tag` hooks so collaborators can register their own undo
/// actions next to the renderer's.
pub struct Tracker<D: Dom> {
    active: SideEffects<D>,
    pending: SideEffects<D>,
}

impl<D: Dom> Tracker<D> {
    pub(crate) fn new(previous: Option<&SideEffects<D>>) -> Self {
        Self {
            active: SideEffects::new(),
            pending: previous.cloned().unwrap_or_default(),
        }
    }

    /// Record `effect` as the undo action of `scope` for the tag `id`.
    pub fn track(&mut self, id: &str, scope: &str, effect: SideEffect<D>) {
        let key = format!("{id}:{scope}");
        self.pending.entries.shift_remove(&key);
        self.active.entries.insert(key, effect);
    }

    /// Side effects from the previous pass not re-confirmed so far.
    pub fn pending(&self) -> &SideEffects<D> {
        &self.pending
    }

    /// Undo every stale side effect exactly once and return the ledger for
    /// the next pass.
    pub(crate) fn finish(
        self,
        dom: &mut D,
        elements: &mut ElementMap<D::Node>,
    ) -> SideEffects<D> {
        for (_key, effect) in &self.pending.entries {
            trace!(key = %_key, "undoing stale side effect");
            effect.undo(dom, elements);
        }
        self.active
    }
}
