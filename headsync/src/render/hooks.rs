//! Extension points invoked around a render pass.

use crate::dom::Dom;
use crate::render::RenderError;
use crate::render::ledger::Tracker;
use crate::tag::TagRecord;

/// One tag as seen by the renderer during a pass.
#[derive(Debug, Clone)]
pub struct RenderContext<N> {
    pub tag: TagRecord,
    /// Render identity: the resolver's identity for element kinds, the kind
    /// name for everything else.
    pub id: String,
    pub should_render: bool,
    /// Element the tag was applied to, once matched or created.
    pub element: Option<N>,
}

/// Passed to [`RenderHooks::before_render`]; clearing `should_render` vetoes
/// the pass.
#[derive(Debug)]
pub struct BeforeRenderContext<'a> {
    pub should_render: bool,
    pub tags: &'a [TagRecord],
}

/// Callbacks fired by [`DomRenderer::render`](crate::DomRenderer::render).
///
/// Any error aborts the pass and propagates to the caller.
pub trait RenderHooks<D: Dom> {
    fn before_render(&mut self, _ctx: &mut BeforeRenderContext<'_>) -> Result<(), RenderError> {
        Ok(())
    }

    /// Fired for every tag after patching and element creation, before the
    /// new elements are inserted into the document.
    fn render_tag(
        &mut self,
        _ctx: &mut RenderContext<D::Node>,
        _dom: &mut D,
        _tracker: &mut Tracker<D>,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// Fired once the pass has been committed.
    fn rendered(&mut self, _renders: &[RenderContext<D::Node>]) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<D: Dom> RenderHooks<D> for NoHooks {}
