//! Tests for reconciliation passes against the arena document.

use facet_testhelpers::test;
use headsync::{
    BeforeRenderContext, Document, Dom, DomRenderer, NoHooks, RenderContext, RenderError,
    RenderHooks, RenderOutcome, RenderState, SideEffect, TagKind, TagPosition, TagRecord,
    Tracker, hash_tag, parse, render_dom_head,
};

type Node = <Document as Dom>::Node;

fn title(text: &str) -> TagRecord {
    TagRecord::new(TagKind::Title).with_text_content(text)
}

fn description(content: &str) -> TagRecord {
    TagRecord::new(TagKind::Meta)
        .with_prop("name", "description")
        .with_prop("content", content)
}

fn render(
    tags: Vec<TagRecord>,
    doc: &mut Document,
    state: &mut Option<RenderState<Document>>,
) -> RenderOutcome {
    render_dom_head(tags, Some(doc), state).unwrap()
}

fn ledger_keys(state: &Option<RenderState<Document>>) -> Vec<String> {
    state
        .as_ref()
        .map(|state| state.side_effects().keys().map(str::to_owned).collect())
        .unwrap_or_default()
}

#[test]
fn test_title_is_set_and_updated() {
    let mut doc = Document::new();
    let mut state = None;

    assert_eq!(render(vec![title("First")], &mut doc, &mut state), RenderOutcome::Rendered);
    assert_eq!(doc.title(), "First");

    render(vec![title("Second")], &mut doc, &mut state);
    assert_eq!(doc.title(), "Second");
    assert_eq!(doc.elements_by_tag_name("title").len(), 1);

    // titles are written directly, never owned or ledgered
    assert!(ledger_keys(&state).is_empty());
    let state = state.unwrap();
    assert!(state.element("title").is_none());
    assert_eq!(
        state.element_map().keys().collect::<Vec<_>>(),
        vec!["htmlAttrs", "bodyAttrs"]
    );
}

#[test]
fn test_meta_is_added_then_removed() {
    let mut doc = Document::new();
    let mut state = None;

    render(vec![description("Hello")], &mut doc, &mut state);
    assert_eq!(
        doc.to_html(),
        "<html><head><meta name=\"description\" content=\"Hello\"></head><body></body></html>"
    );

    let id = hash_tag(&description("Hello"));
    assert!(state.as_ref().unwrap().element(&id).is_some());

    render(Vec::new(), &mut doc, &mut state);
    assert_eq!(doc.to_html(), "<html><head></head><body></body></html>");
    assert!(ledger_keys(&state).is_empty());

    // only the hydrated attribute bag targets remain mapped
    let state = state.unwrap();
    assert!(state.element(&id).is_none());
    assert_eq!(
        state.element_map().keys().collect::<Vec<_>>(),
        vec!["htmlAttrs", "bodyAttrs"]
    );
}

#[test]
fn test_updated_meta_patches_existing_element() {
    let mut doc = Document::new();
    let mut state = None;

    render(vec![description("a")], &mut doc, &mut state);
    let before = doc.elements_by_tag_name("meta");

    render(vec![description("b")], &mut doc, &mut state);
    let after = doc.elements_by_tag_name("meta");

    assert_eq!(before, after);
    assert_eq!(after.len(), 1);
    assert_eq!(doc.get_attribute(&after[0], "content").as_deref(), Some("b"));
}

#[test]
fn test_identical_passes_do_not_touch_the_document() {
    let tags = vec![
        title("Home"),
        description("Welcome"),
        TagRecord::new(TagKind::HtmlAttrs).with_prop("lang", "en"),
        TagRecord::new(TagKind::BodyAttrs).with_prop("class", "dark wide"),
        TagRecord::new(TagKind::Script)
            .with_prop("src", "/app.js")
            .with_position(TagPosition::BodyClose),
    ];

    let mut doc = Document::new();
    let mut state = None;
    render(tags.clone(), &mut doc, &mut state);
    let html = doc.to_html();
    let mutations = doc.mutation_count();
    let keys = ledger_keys(&state);

    render(tags, &mut doc, &mut state);

    assert_eq!(doc.to_html(), html);
    assert_eq!(doc.mutation_count(), mutations);
    assert_eq!(ledger_keys(&state), keys);
}

#[test]
fn test_attribute_bag_changes_are_reverted() {
    let mut doc = Document::new();
    let mut state = None;
    let body = doc.body().unwrap();

    render(
        vec![
            TagRecord::new(TagKind::BodyAttrs)
                .with_prop("class", "a b")
                .with_prop("data-theme", "dark"),
        ],
        &mut doc,
        &mut state,
    );
    assert!(doc.class_list_contains(&body, "a"));
    assert!(doc.class_list_contains(&body, "b"));
    assert_eq!(doc.get_attribute(&body, "data-theme").as_deref(), Some("dark"));
    assert_eq!(
        ledger_keys(&state),
        vec![
            "bodyAttrs:attr:class:a",
            "bodyAttrs:attr:class:b",
            "bodyAttrs:attr:data-theme",
        ]
    );

    render(
        vec![TagRecord::new(TagKind::BodyAttrs).with_prop("class", "a")],
        &mut doc,
        &mut state,
    );
    assert!(doc.class_list_contains(&body, "a"));
    assert!(!doc.class_list_contains(&body, "b"));
    assert_eq!(doc.get_attribute(&body, "data-theme"), None);

    render(Vec::new(), &mut doc, &mut state);
    assert!(!doc.class_list_contains(&body, "a"));
    assert!(doc.is_connected(body));
}

#[test]
fn test_false_attribute_removes_existing_value() {
    let mut doc = parse("<html lang=\"fr\"><head></head><body></body></html>");
    let mut state = None;

    render(
        vec![TagRecord::new(TagKind::HtmlAttrs).with_prop("lang", false)],
        &mut doc,
        &mut state,
    );

    let root = doc.document_element();
    assert_eq!(doc.get_attribute(&root, "lang"), None);
}

#[test]
fn test_body_positions() {
    let mut doc = parse("<html><head></head><body><div id=\"app\"></div></body></html>");
    let mut state = None;

    render(
        vec![
            TagRecord::new(TagKind::Script)
                .with_prop("src", "/close.js")
                .with_position(TagPosition::BodyClose),
            TagRecord::new(TagKind::Script)
                .with_prop("src", "/open.js")
                .with_position(TagPosition::BodyOpen),
            TagRecord::new(TagKind::Link)
                .with_prop("rel", "stylesheet")
                .with_prop("href", "/site.css"),
        ],
        &mut doc,
        &mut state,
    );

    let body = doc.body().unwrap();
    let children: Vec<_> = doc
        .children(&body)
        .iter()
        .map(|child| {
            let src = doc.get_attribute(child, "src").unwrap_or_default();
            format!("{}{}", doc.tag_name(child), src)
        })
        .collect();
    assert_eq!(children, vec!["script/open.js", "div", "script/close.js"]);

    let head = doc.head().unwrap();
    assert_eq!(doc.children(&head).len(), 1);
    assert_eq!(
        doc.inner_html(&head),
        "<link rel=\"stylesheet\" href=\"/site.css\">"
    );
}

#[test]
fn test_script_content_is_written_once() {
    let script = TagRecord::new(TagKind::Script)
        .with_prop("id", "boot")
        .with_inner_html("window.x = 1 < 2;");

    let mut doc = Document::new();
    let mut state = None;
    render(vec![script.clone()], &mut doc, &mut state);

    let element = doc.elements_by_tag_name("script")[0];
    assert_eq!(doc.inner_html(&element), "window.x = 1 < 2;");

    let mutations = doc.mutation_count();
    render(vec![script], &mut doc, &mut state);
    assert_eq!(doc.mutation_count(), mutations);
}

#[test]
fn test_no_document_is_a_no_op() {
    let mut state: Option<RenderState<Document>> = None;
    let outcome = render_dom_head(vec![title("x")], None, &mut state).unwrap();
    assert_eq!(outcome, RenderOutcome::NoDocument);
    assert!(state.is_none());
}

struct Veto;

impl RenderHooks<Document> for Veto {
    fn before_render(&mut self, ctx: &mut BeforeRenderContext<'_>) -> Result<(), RenderError> {
        ctx.should_render = ctx.tags.is_empty();
        Ok(())
    }
}

#[test]
fn test_before_render_can_veto() {
    let mut doc = Document::new();
    let mut state = None;

    let outcome = DomRenderer::new()
        .render(vec![title("x")], Some(&mut doc), &mut state, &mut Veto)
        .unwrap();

    assert_eq!(outcome, RenderOutcome::Vetoed);
    assert!(state.is_none());
    assert_eq!(doc.mutation_count(), 0);
    assert_eq!(doc.title(), "");
}

/// Marks `<html>` while any meta tag renders, and registers the undo.
struct MarkRendered {
    rendered: Vec<String>,
}

impl RenderHooks<Document> for MarkRendered {
    fn render_tag(
        &mut self,
        ctx: &mut RenderContext<Node>,
        dom: &mut Document,
        tracker: &mut Tracker<Document>,
    ) -> Result<(), RenderError> {
        if ctx.tag.kind != TagKind::Meta {
            return Ok(());
        }
        let root = dom.document_element();
        dom.set_attribute(&root, "data-meta", "");
        tracker.track(
            &ctx.id,
            "mark",
            SideEffect::custom(|dom: &mut Document| {
                let root = dom.document_element();
                dom.remove_attribute(&root, "data-meta");
            }),
        );
        Ok(())
    }

    fn rendered(&mut self, renders: &[RenderContext<Node>]) -> Result<(), RenderError> {
        self.rendered = renders
            .iter()
            .filter(|ctx| ctx.element.is_some())
            .map(|ctx| ctx.tag.kind.to_string())
            .collect();
        Ok(())
    }
}

#[test]
fn test_hooks_can_track_side_effects() {
    let mut doc = Document::new();
    let mut state = None;
    let renderer = DomRenderer::new();
    let mut hooks = MarkRendered {
        rendered: Vec::new(),
    };
    let root = doc.document_element();

    renderer
        .render(vec![description("x"), title("t")], Some(&mut doc), &mut state, &mut hooks)
        .unwrap();
    assert_eq!(doc.get_attribute(&root, "data-meta").as_deref(), Some(""));
    assert_eq!(hooks.rendered, vec!["meta"]);
    let id = hash_tag(&description("x"));
    assert!(ledger_keys(&state).contains(&format!("{id}:mark")));

    renderer
        .render(vec![title("t")], Some(&mut doc), &mut state, &mut hooks)
        .unwrap();
    assert_eq!(doc.get_attribute(&root, "data-meta"), None);
    assert!(doc.elements_by_tag_name("meta").is_empty());
}

struct FailingTagHook;

impl RenderHooks<Document> for FailingTagHook {
    fn render_tag(
        &mut self,
        _ctx: &mut RenderContext<Node>,
        _dom: &mut Document,
        _tracker: &mut Tracker<Document>,
    ) -> Result<(), RenderError> {
        Err(RenderError::hook("render_tag", "boom"))
    }
}

#[test]
fn test_failing_hook_keeps_previous_state() {
    let mut doc = Document::new();
    let mut state = None;
    render(vec![description("x")], &mut doc, &mut state);
    let keys = ledger_keys(&state);

    let err = DomRenderer::new()
        .render(vec![title("t")], Some(&mut doc), &mut state, &mut FailingTagHook)
        .unwrap_err();

    assert!(matches!(err, RenderError::Hook { .. }));
    assert_eq!(err.to_string(), "`render_tag` hook failed: boom");
    assert_eq!(ledger_keys(&state), keys);
    // the stale meta was not cleaned up by the aborted pass
    assert_eq!(doc.elements_by_tag_name("meta").len(), 1);

    // a following successful pass still removes it
    DomRenderer::new()
        .render(vec![title("t")], Some(&mut doc), &mut state, &mut NoHooks)
        .unwrap();
    assert!(doc.elements_by_tag_name("meta").is_empty());
}

#[test]
fn test_custom_identity_resolver() {
    let renderer = DomRenderer::new()
        .with_identity(|tag: &TagRecord| tag.prop_str("name").unwrap_or("anonymous").to_string());
    let mut doc = Document::new();
    let mut state = None;

    renderer
        .render(vec![description("x"), title("t")], Some(&mut doc), &mut state, &mut NoHooks)
        .unwrap();

    let state = state.unwrap();
    let meta = doc.elements_by_tag_name("meta")[0];
    assert_eq!(state.element("description"), Some(&meta));
    assert_eq!(renderer.render_id(&title("t")), "title");
    assert!(state.side_effects().contains("description:el"));
}
