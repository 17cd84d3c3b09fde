//! Tag identity.
//!
//! The renderer only needs a stable string per logical element; how that
//! string is derived is pluggable through [`IdentityResolver`]. The default,
//! [`HashIdentity`], hashes the tag's dedupe key when it has one and its whole
//! content otherwise.

use rapidhash::RapidHasher;
use std::hash::{Hash, Hasher};

use crate::tag::{TagKind, TagRecord};

/// Derives the identity used to match a tag against previously rendered
/// elements.
pub trait IdentityResolver {
    fn identity(&self, tag: &TagRecord) -> String;
}

impl<F> IdentityResolver for F
where
    F: Fn(&TagRecord) -> String,
{
    fn identity(&self, tag: &TagRecord) -> String {
        self(tag)
    }
}

/// Default resolver, see [`hash_tag`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HashIdentity;

impl IdentityResolver for HashIdentity {
    fn identity(&self, tag: &TagRecord) -> String {
        hash_tag(tag)
    }
}

/// Discriminating attributes checked, in order, for each kind.
fn discriminators(kind: TagKind) -> &'static [&'static str] {
    match kind {
        TagKind::Meta => &["id", "name", "property", "http-equiv"],
        _ => &["id"],
    }
}

/// Key under which two tags count as the same logical tag, or `None` when
/// nothing discriminates this tag from others of its kind.
pub fn dedupe_key(tag: &TagRecord) -> Option<String> {
    if let Some(key) = &tag.key {
        return Some(format!("{}:key:{}", tag.kind, key));
    }
    if tag.kind.is_unique() {
        return Some(tag.kind.as_str().to_string());
    }
    if tag.kind == TagKind::Link && tag.prop_str("rel") == Some("canonical") {
        return Some("canonical".to_string());
    }
    if tag.props.contains_key("charset") {
        return Some("charset".to_string());
    }
    discriminators(tag.kind).iter().find_map(|name| {
        tag.props
            .get(*name)
            .map(|value| format!("{}:{}:{}", tag.kind, name, value))
    })
}

/// Stable hex hash of a tag.
///
/// Tags sharing a dedupe key hash equally whatever their other attributes, so
/// an updated `<meta name="description">` patches the existing element
/// instead of creating a second one.
pub fn hash_tag(tag: &TagRecord) -> String {
    let mut hasher = RapidHasher::default();
    match tag.dedupe.clone().or_else(|| dedupe_key(tag)) {
        Some(key) => key.hash(&mut hasher),
        None => {
            tag.kind.as_str().hash(&mut hasher);
            tag.content().unwrap_or_default().hash(&mut hasher);
            for (name, value) in &tag.props {
                name.hash(&mut hasher);
                value.to_string().hash(&mut hasher);
            }
        }
    }
    format!("{:016x}", hasher.finish())
}
