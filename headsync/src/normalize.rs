//! Normalization of producer input into canonical [`TagRecord`]s.
//!
//! Two layers:
//! - the attribute normalizer resolves deferred values and applies the HTML
//!   boolean-attribute rules to a property bag;
//! - the tag normalizer dispatches on the tag kind, lifts tag-configuration
//!   keys out of the bag, repairs structured-data scripts and fans `content`
//!   lists out into one record each.

use facet::Facet;
use futures_util::future;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::tag::{
    DuplicateStrategy, EntitySequence, TAG_ENTITY_BITS, TagKind, TagPosition, TagRecord,
};
use crate::value::{Input, PropValue, Props, Value};

/// Errors that can occur while normalizing producer input.
#[derive(Facet, Debug)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum NormalizeError {
    /// failed to resolve `{key}`: {message}
    Resolve { key: String, message: String },
}

/// One producer entry, keyed by tag kind name (`"meta"`, `"htmlAttrs"`, ...).
pub type HeadInput = IndexMap<String, Input>;

/// Keys that configure the tag itself instead of rendering as attributes.
pub const TAG_CONFIG_KEYS: [&str; 7] = [
    "tagPosition",
    "tagPriority",
    "tagDuplicateStrategy",
    "innerHTML",
    "textContent",
    "processTemplateParams",
    "key",
];

const JSON_SCRIPT_TYPES: [&str; 2] = ["application/ld+json", "application/json"];

/// Resolve every deferred value of a property bag, then apply
/// [`apply_boolean_rules`] to each entry.
pub async fn normalize_props(
    props: IndexMap<String, Input>,
) -> Result<IndexMap<String, Value>, NormalizeError> {
    let (keys, inputs): (Vec<_>, Vec<_>) = props.into_iter().unzip();
    let resolved = future::try_join_all(keys.iter().zip(inputs).map(|(key, input)| async move {
        input
            .resolve()
            .await
            .map_err(|message| NormalizeError::Resolve {
                key: key.clone(),
                message,
            })
    }))
    .await?;

    Ok(keys
        .into_iter()
        .zip(resolved)
        .filter_map(|(key, value)| apply_boolean_rules(&key, value).map(|value| (key, value)))
        .collect())
}

/// HTML boolean attributes: `true` means present with an empty value,
/// `false` means absent. `data-*` attributes keep their literal strings.
pub fn apply_boolean_rules(key: &str, value: Value) -> Option<Value> {
    let is_data_key = key.starts_with("data-");
    match value.to_js_string().as_str() {
        "true" if is_data_key => Some(Value::from("true")),
        "true" => Some(Value::from("")),
        "false" if is_data_key => Some(Value::from("false")),
        "false" => None,
        _ => Some(value),
    }
}

/// Normalize attributes read back from a live element.
pub fn normalize_attributes<I>(attrs: I) -> Props
where
    I: IntoIterator<Item = (String, String)>,
{
    attrs
        .into_iter()
        .filter_map(|(key, value)| {
            apply_boolean_rules(&key, Value::String(value))
                .map(|value| (key, PropValue::from(value)))
        })
        .collect()
}

/// Canonical class string from a string, a token list, or a map of token to
/// "is active" flag. Whitespace is collapsed; duplicate tokens are kept.
pub fn normalize_class(value: &Value) -> String {
    let joined = match value {
        Value::Map(entries) => entries
            .iter()
            .filter(|(_, active)| active.is_truthy())
            .map(|(token, _)| token.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => other.to_js_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_js_string(),
    };
    joined
        .split_whitespace()
        .collect::<SmallVec<[&str; 8]>>()
        .join(" ")
}

/// Normalize the input of one tag kind into zero or more records.
pub async fn normalize_tag(kind: TagKind, input: Input) -> Result<Vec<TagRecord>, NormalizeError> {
    let mut tag = TagRecord::new(kind);

    if matches!(kind, TagKind::Title | TagKind::TitleTemplate) {
        let value = input
            .resolve()
            .await
            .map_err(|message| NormalizeError::Resolve {
                key: kind.as_str().to_string(),
                message,
            })?;
        tag.text_content = match value {
            Value::Null => None,
            other => Some(other.to_js_string()),
        };
        return Ok(vec![tag]);
    }

    let entries = match input {
        Input::String(content) if kind.has_inner_content() => {
            tag.inner_html = Some(content);
            return Ok(vec![tag]);
        }
        Input::Map(entries) => entries,
        _other => {
            debug!(input = ?_other, %kind, "skipping tag input that is not a property bag");
            return Ok(Vec::new());
        }
    };

    let mut props = normalize_props(entries).await?;

    // `children` is a deprecated alias of `innerHTML`
    if let Some(children) = props.shift_remove("children")
        && children.is_truthy()
    {
        props.insert("innerHTML".to_string(), children);
    }

    let mut inner_html = None;
    let mut text_content = None;
    for key in TAG_CONFIG_KEYS {
        let Some(value) = props.shift_remove(key) else {
            continue;
        };
        match key {
            "innerHTML" | "textContent" if !kind.has_inner_content() => {
                debug!(%kind, key, "stripping content from tag without inner content");
            }
            "innerHTML" => inner_html = Some(value),
            "textContent" => text_content = Some(value),
            "tagPosition" => {
                tag.position = value
                    .as_str()
                    .and_then(TagPosition::parse)
                    .unwrap_or_default();
            }
            "tagPriority" => tag.priority = Some(value.to_js_string()),
            "tagDuplicateStrategy" => {
                tag.duplicate_strategy = value.as_str().and_then(DuplicateStrategy::parse);
            }
            // a `false` flag was already dropped by the boolean rules
            "processTemplateParams" => tag.process_template_params = Some(true),
            "key" => tag.key = Some(value.to_js_string()),
            _ => {}
        }
    }

    let is_json_script = kind == TagKind::Script
        && props
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|ty| JSON_SCRIPT_TYPES.contains(&ty));
    tag.inner_html = inner_html.and_then(|value| content_to_string(value, is_json_script));
    tag.text_content = text_content.and_then(|value| content_to_string(value, is_json_script));

    if let Some(class) = props.get_mut("class")
        && class.is_truthy()
    {
        *class = Value::String(normalize_class(class));
    }

    let fan_out = match props.get_mut("content") {
        Some(Value::List(items)) => Some(std::mem::take(items)),
        _ => None,
    };

    tag.props = props
        .into_iter()
        .map(|(key, value)| (key, PropValue::from(value)))
        .collect();

    match fan_out {
        Some(items) => Ok(items
            .into_iter()
            .map(|item| {
                let mut copy = tag.clone();
                copy.props.insert("content".to_string(), PropValue::from(item));
                copy
            })
            .collect()),
        None => Ok(vec![tag]),
    }
}

/// Content fields always end up as strings. Structured-data script bodies are
/// re-serialized through a JSON parser and dropped to `""` when malformed.
fn content_to_string(value: Value, is_json_script: bool) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if is_json_script && !text.is_empty() => {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => Some(json.to_string()),
                Err(_err) => {
                    debug!(error = %_err, "malformed JSON script content, emptying it");
                    Some(String::new())
                }
            }
        }
        value if value.is_object() => Some(value.to_json().to_string()),
        value => Some(value.to_js_string()),
    }
}

/// Normalize every tag of one producer entry.
///
/// Unknown tag kinds are skipped. Each produced record gets its
/// [`EntitySequence`]: the entry index plus its position in the entry's
/// flattened output.
pub async fn normalize_entry(
    entry: u32,
    input: HeadInput,
) -> Result<Vec<TagRecord>, NormalizeError> {
    let mut pending = Vec::new();
    for (name, value) in input {
        let Some(kind) = TagKind::parse(&name) else {
            debug!(name = %name, "skipping unknown tag kind");
            continue;
        };
        match value {
            Input::Null => {}
            Input::List(items) => {
                pending.extend(items.into_iter().map(|item| normalize_tag(kind, item)));
            }
            other => pending.push(normalize_tag(kind, other)),
        }
    }

    let tags: Vec<TagRecord> = future::try_join_all(pending)
        .await?
        .into_iter()
        .flatten()
        .collect();

    if tags.len() > 1 << TAG_ENTITY_BITS {
        warn!(
            entry,
            count = tags.len(),
            "entry produced more tags than its sequence range holds"
        );
    }

    Ok(tags
        .into_iter()
        .enumerate()
        .map(|(index, mut tag)| {
            tag.sequence = Some(EntitySequence {
                entry,
                index: index as u32,
            });
            tag
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Deferred;
    use pollster::block_on;

    fn normalize_one(kind: TagKind, input: Input) -> Vec<TagRecord> {
        block_on(normalize_tag(kind, input)).unwrap()
    }

    fn props_of(input: Input) -> IndexMap<String, Value> {
        let Input::Map(entries) = input else {
            panic!("expected map input");
        };
        block_on(normalize_props(entries)).unwrap()
    }

    #[test]
    fn test_boolean_attribute_law() {
        assert_eq!(
            props_of(Input::map([("x", true)])).get("x"),
            Some(&Value::from(""))
        );
        assert!(props_of(Input::map([("x", false)])).is_empty());
        assert_eq!(
            props_of(Input::map([("data-x", true)])).get("data-x"),
            Some(&Value::from("true"))
        );
        assert_eq!(
            props_of(Input::map([("data-x", false)])).get("data-x"),
            Some(&Value::from("false"))
        );
    }

    #[test]
    fn test_boolean_rules_apply_to_stringified_values() {
        assert_eq!(
            props_of(Input::map([("defer", "true")])).get("defer"),
            Some(&Value::from(""))
        );
        assert!(props_of(Input::map([("async", "false")])).is_empty());
    }

    #[test]
    fn test_deferred_props_are_resolved() {
        let props = props_of(Input::map([
            ("name", Input::from("description")),
            ("content", Input::Deferred(Deferred::ready("resolved"))),
        ]));
        assert_eq!(props.get("content"), Some(&Value::from("resolved")));
    }

    #[test]
    fn test_class_normalization() {
        let list = Value::List(vec![
            Value::from("a"),
            Value::from(""),
            Value::from("b b"),
            Value::from("a"),
        ]);
        assert_eq!(normalize_class(&list), "a b b a");

        let mut map = IndexMap::new();
        map.insert("dark".to_string(), Value::from(true));
        map.insert("light".to_string(), Value::from(false));
        map.insert("  wide ".to_string(), Value::from(true));
        assert_eq!(normalize_class(&Value::Map(map)), "dark wide");

        assert_eq!(normalize_class(&Value::from("  a   b ")), "a b");
    }

    #[test]
    fn test_content_fan_out() {
        let tags = normalize_one(
            TagKind::Meta,
            Input::map([
                ("name", Input::from("keywords")),
                ("content", Input::from(vec!["a", "b"])),
            ]),
        );
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].prop_str("content"), Some("a"));
        assert_eq!(tags[1].prop_str("content"), Some("b"));
        assert_eq!(tags[0].prop_str("name"), Some("keywords"));
        assert_eq!(
            tags[0].props.keys().collect::<Vec<_>>(),
            tags[1].props.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_json_script_repair() {
        let tags = normalize_one(
            TagKind::Script,
            Input::map([
                ("type", "application/json"),
                ("innerHTML", "{not json"),
            ]),
        );
        assert_eq!(tags[0].inner_html.as_deref(), Some(""));

        let tags = normalize_one(
            TagKind::Script,
            Input::map([
                ("type", "application/ld+json"),
                ("innerHTML", "{ \"@type\" : \"Thing\" }"),
            ]),
        );
        assert_eq!(tags[0].inner_html.as_deref(), Some("{\"@type\":\"Thing\"}"));
    }

    #[test]
    fn test_object_content_is_serialized() {
        let tags = normalize_one(
            TagKind::Script,
            Input::map([
                ("type", Input::from("application/ld+json")),
                ("innerHTML", Input::map([("@context", "https://schema.org")])),
            ]),
        );
        assert_eq!(
            tags[0].inner_html.as_deref(),
            Some("{\"@context\":\"https://schema.org\"}")
        );
    }

    #[test]
    fn test_content_stripped_for_tags_without_inner_content() {
        let tags = normalize_one(
            TagKind::Meta,
            Input::map([("name", "x"), ("innerHTML", "<b>no</b>"), ("textContent", "no")]),
        );
        assert_eq!(tags[0].inner_html, None);
        assert_eq!(tags[0].text_content, None);
        assert!(!tags[0].props.contains_key("innerHTML"));
        assert!(!tags[0].props.contains_key("textContent"));
    }

    #[test]
    fn test_children_alias() {
        let tags = normalize_one(TagKind::Style, Input::map([("children", "body { margin: 0 }")]));
        assert_eq!(tags[0].inner_html.as_deref(), Some("body { margin: 0 }"));
        assert!(tags[0].props.is_empty());
    }

    #[test]
    fn test_string_shorthand() {
        let tags = normalize_one(TagKind::Script, Input::from("console.log(1)"));
        assert_eq!(tags[0].inner_html.as_deref(), Some("console.log(1)"));

        // no shorthand for kinds without inner content
        assert!(normalize_one(TagKind::Meta, Input::from("x")).is_empty());
    }

    #[test]
    fn test_title_resolves_deferred() {
        let tags = normalize_one(TagKind::Title, Input::Deferred(Deferred::ready("Hello")));
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].text_content.as_deref(), Some("Hello"));
        assert!(tags[0].props.is_empty());
    }

    #[test]
    fn test_config_keys_are_lifted() {
        let tags = normalize_one(
            TagKind::Script,
            Input::map([
                ("src", Input::from("/app.js")),
                ("tagPosition", Input::from("bodyClose")),
                ("tagPriority", Input::from(10)),
                ("tagDuplicateStrategy", Input::from("merge")),
                ("key", Input::from("app")),
                ("defer", Input::from(true)),
            ]),
        );
        let tag = &tags[0];
        assert_eq!(tag.position, TagPosition::BodyClose);
        assert_eq!(tag.priority.as_deref(), Some("10"));
        assert_eq!(tag.duplicate_strategy, Some(DuplicateStrategy::Merge));
        assert_eq!(tag.key.as_deref(), Some("app"));
        assert_eq!(
            tag.props.keys().collect::<Vec<_>>(),
            vec!["src", "defer"]
        );
        assert_eq!(tag.prop("defer"), Some(&PropValue::from("")));
    }

    #[test]
    fn test_entry_sequence_assignment() {
        let mut input = HeadInput::new();
        input.insert("title".to_string(), Input::from("Home"));
        input.insert(
            "meta".to_string(),
            Input::from(vec![
                Input::map([("name", Input::from("a")), ("content", Input::from(vec!["1", "2"]))]),
                Input::map([("name", "b"), ("content", "3")]),
            ]),
        );
        input.insert("unknown".to_string(), Input::from("ignored"));

        let tags = block_on(normalize_entry(2, input)).unwrap();
        assert_eq!(tags.len(), 4);
        let positions: Vec<_> = tags
            .iter()
            .map(|t| t.sequence.map(EntitySequence::position))
            .collect();
        assert_eq!(
            positions,
            (0..4).map(|i| Some((2 << 10) + i)).collect::<Vec<_>>()
        );
        assert_eq!(tags[0].kind, TagKind::Title);
        assert_eq!(tags[3].prop_str("content"), Some("3"));
    }

    #[test]
    fn test_resolution_failure_fails_the_entry() {
        let mut input = HeadInput::new();
        input.insert("title".to_string(), Input::from("ok"));
        input.insert(
            "meta".to_string(),
            Input::map([("content", Input::Deferred(Deferred::failed("network")))]),
        );
        let err = block_on(normalize_entry(0, input)).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::Resolve { ref key, ref message }
                if key == "content" && message == "network"
        ));
    }

    #[test]
    fn test_element_attributes_normalization() {
        let props = normalize_attributes([
            ("defer".to_string(), "true".to_string()),
            ("data-ok".to_string(), "false".to_string()),
            ("src".to_string(), "/a.js".to_string()),
        ]);
        assert_eq!(props.get("defer"), Some(&PropValue::from("")));
        assert_eq!(props.get("data-ok"), Some(&PropValue::from("false")));
        assert_eq!(props.get("src"), Some(&PropValue::from("/a.js")));
    }
}
