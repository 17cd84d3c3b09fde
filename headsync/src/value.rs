//! Property values, from loosely-typed producer input to canonical attributes.
//!
//! Producers hand over [`Input`] trees that may still contain [`Deferred`]
//! computations. Resolution turns them into [`Value`]s, and normalization
//! finally narrows every attribute to a [`PropValue`].

use facet::Facet;
use futures_util::future::{self, FutureExt, LocalBoxFuture};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;

/// Ordered attribute bag of a normalized tag.
pub type Props = IndexMap<String, PropValue>;

/// A pending value computation supplied by a producer.
///
/// The future may itself yield further deferred values; they are awaited
/// recursively by [`Input::resolve`].
pub struct Deferred(LocalBoxFuture<'static, Result<Input, String>>);

impl Deferred {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Input, String>> + 'static,
    {
        Self(fut.boxed_local())
    }

    /// A deferred value that is already available.
    pub fn ready(value: impl Into<Input>) -> Self {
        Self::new(future::ready(Ok(value.into())))
    }

    /// A deferred value whose computation failed.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(future::ready(Err(message.into())))
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// Raw producer input.
#[derive(Debug)]
pub enum Input {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Input>),
    Map(IndexMap<String, Input>),
    Deferred(Deferred),
}

impl Input {
    /// Wrap a future as a deferred input.
    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Input, String>> + 'static,
    {
        Input::Deferred(Deferred::new(fut))
    }

    /// Build a map input from key/value pairs, preserving their order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Input>,
        I: IntoIterator<Item = (K, V)>,
    {
        Input::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Await every deferred computation in this tree.
    ///
    /// Siblings resolve concurrently, so no ordering between distinct keys
    /// is guaranteed. The first failure wins.
    pub fn resolve(self) -> LocalBoxFuture<'static, Result<Value, String>> {
        async move {
            match self {
                Input::Null => Ok(Value::Null),
                Input::Bool(b) => Ok(Value::Bool(b)),
                Input::Number(n) => Ok(Value::Number(n)),
                Input::String(s) => Ok(Value::String(s)),
                Input::List(items) => {
                    let items = future::try_join_all(items.into_iter().map(Input::resolve)).await?;
                    Ok(Value::List(items))
                }
                Input::Map(entries) => {
                    let (keys, values): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
                    let values =
                        future::try_join_all(values.into_iter().map(Input::resolve)).await?;
                    Ok(Value::Map(keys.into_iter().zip(values).collect()))
                }
                Input::Deferred(Deferred(fut)) => fut.await?.resolve().await,
            }
        }
        .boxed_local()
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::String(s.to_owned())
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::String(s)
    }
}

impl From<bool> for Input {
    fn from(b: bool) -> Self {
        Input::Bool(b)
    }
}

macro_rules! input_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Input {
                fn from(n: $ty) -> Self {
                    Input::Number(n as f64)
                }
            }
        )*
    };
}

input_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl<T: Into<Input>> From<Vec<T>> for Input {
    fn from(items: Vec<T>) -> Self {
        Input::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Input>> From<Option<T>> for Input {
    fn from(value: Option<T>) -> Self {
        value.map_or(Input::Null, Into::into)
    }
}

impl From<IndexMap<String, Input>> for Input {
    fn from(entries: IndexMap<String, Input>) -> Self {
        Input::Map(entries)
    }
}

impl From<Deferred> for Input {
    fn from(deferred: Deferred) -> Self {
        Input::Deferred(deferred)
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Input::Null,
            Value::Bool(b) => Input::Bool(b),
            Value::Number(n) => Input::Number(n),
            Value::String(s) => Input::String(s),
            Value::List(items) => Input::List(items.into_iter().map(Input::from).collect()),
            Value::Map(entries) => Input::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Input::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A fully resolved producer value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Lists and maps, the values that need serializing before they can be
    /// used as element content.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Truthiness as producers expect it from a loosely-typed host.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) => true,
        }
    }

    /// String form used for attribute values and boolean detection.
    ///
    /// Lists join their items with `,`; maps are rendered as JSON.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => self.to_json().to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == 0.0 {
        // covers -0
        "0".to_string()
    } else if (1e-6..1e21).contains(&n.abs()) {
        // shortest round-trip digits, never in exponent form
        format!("{n}")
    } else {
        let s = format!("{n:e}");
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        }
    }
}

/// Canonical attribute value stored on a [`TagRecord`](crate::TagRecord).
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum PropValue {
    String(String),
    /// `true` renders as a present, empty attribute; `false` as absent.
    Bool(bool),
    Null,
}

impl PropValue {
    /// The attribute value to write, or `None` when the attribute must not be
    /// rendered.
    pub fn as_attribute(&self) -> Option<Cow<'_, str>> {
        match self {
            PropValue::String(s) => Some(Cow::Borrowed(s)),
            PropValue::Bool(true) => Some(Cow::Borrowed("")),
            PropValue::Bool(false) | PropValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::String(s) => f.write_str(s),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::String(s.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::String(s)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PropValue::Null,
            Value::Bool(b) => PropValue::Bool(b),
            Value::String(s) => PropValue::String(s),
            other => PropValue::String(other.to_js_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_stringification() {
        assert_eq!(Value::Number(5.0).to_js_string(), "5");
        assert_eq!(Value::Number(-0.0).to_js_string(), "0");
        assert_eq!(Value::Number(1.5).to_js_string(), "1.5");
        assert_eq!(Value::Number(f64::NAN).to_js_string(), "NaN");
    }

    #[test]
    fn test_large_and_tiny_number_stringification() {
        assert_eq!(Value::Number(1e20).to_js_string(), "100000000000000000000");
        assert_eq!(Value::Number(-1e19).to_js_string(), "-10000000000000000000");
        assert_eq!(Value::Number(1e21).to_js_string(), "1e+21");
        assert_eq!(Value::Number(1.5e-7).to_js_string(), "1.5e-7");
        assert_eq!(Value::Number(0.000001).to_js_string(), "0.000001");
    }

    #[test]
    fn test_list_stringification_skips_nulls() {
        let list = Value::List(vec![Value::from("a"), Value::Null, Value::Number(2.0)]);
        assert_eq!(list.to_js_string(), "a,,2");
    }

    #[test]
    fn test_resolve_nested_deferred() {
        let input = Input::map([
            ("name", Input::from("description")),
            (
                "content",
                Input::deferred(async { Ok(Input::Deferred(Deferred::ready("nested"))) }),
            ),
        ]);
        let value = pollster::block_on(input.resolve()).unwrap();
        let Value::Map(entries) = value else {
            panic!("expected map");
        };
        assert_eq!(entries.get("content"), Some(&Value::from("nested")));
        assert_eq!(
            entries.keys().collect::<Vec<_>>(),
            vec!["name", "content"]
        );
    }

    #[test]
    fn test_resolve_failure_propagates() {
        let input = Input::from(vec![Input::from("ok"), Input::Deferred(Deferred::failed("boom"))]);
        let err = pollster::block_on(input.resolve()).unwrap_err();
        assert_eq!(err, "boom");
    }

    #[test]
    fn test_prop_value_attribute_rendering() {
        assert_eq!(PropValue::Bool(true).as_attribute().as_deref(), Some(""));
        assert_eq!(PropValue::Bool(false).as_attribute(), None);
        assert_eq!(PropValue::Null.as_attribute(), None);
        assert_eq!(PropValue::from("x").as_attribute().as_deref(), Some("x"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
        assert!(Value::from(true).is_truthy());
    }
}
