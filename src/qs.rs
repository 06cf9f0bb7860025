//! Query-string codec.
//!
//! Decodes a flat `key=value&key=value` string into [`Fields`], folding keys
//! ending in `[]` into sequences and bracketed keys (`a[b][c]`) into nested
//! mappings. URL queries, url-encoded bodies and multipart text fields all go
//! through [`decode`], so the three share the exact same folding rules.

use std::collections::btree_map::{self, BTreeMap};
use std::iter::FromIterator;

use crate::constants::ARRAY_MARKER;
use crate::options::{Duplicates, QueryOptions};

/// A decoded form or query value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(String),
    Sequence(Vec<String>),
    Nested(Fields),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[String]> {
        match self {
            Value::Sequence(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&Fields> {
        match self {
            Value::Nested(fields) => Some(fields),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Scalar(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Scalar(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(values: Vec<String>) -> Self {
        Value::Sequence(values)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Nested(fields)
    }
}

/// A mapping of names to decoded values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields {
    map: BTreeMap<String, Value>,
}

impl Fields {
    pub fn new() -> Fields {
        Fields::default()
    }

    /// Returns the value decoded under `name`. Array suffixes are already
    /// folded away: `a[]=1` is found under `"a"`.
    ///
    /// ```
    /// use reqparser::qs::{self, Value};
    ///
    /// let fields = qs::decode("a[]=1&b=2", &Default::default());
    /// assert_eq!(fields.get("a"), Some(&Value::Sequence(vec!["1".to_owned()])));
    /// assert_eq!(fields.get("a[]"), None);
    /// ```
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    /// Sets `name` to `value`, returning the value it replaced.
    ///
    /// ```
    /// use reqparser::qs::{Fields, Value};
    ///
    /// let mut fields = Fields::new();
    /// assert_eq!(fields.insert("a", "1"), None);
    /// assert_eq!(fields.insert("a", "2"), Some(Value::from("1")));
    /// assert_eq!(fields.get("a").and_then(Value::as_str), Some("2"));
    /// ```
    pub fn insert<N: Into<String>, V: Into<Value>>(&mut self, name: N, value: V) -> Option<Value> {
        self.map.insert(name.into(), value.into())
    }

    /// Removes `name`, returning its value if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.map.remove(name)
    }

    /// Whether a value was decoded under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.map.iter()
    }

    /// Folds one decoded `key=value` pair in.
    pub(crate) fn fold(&mut self, key: &str, value: String, duplicates: Duplicates) {
        let (root, segments) = split_key(key);
        self.fold_path(root, &segments, value, duplicates);
    }

    fn fold_path(&mut self, name: &str, segments: &[&str], value: String, duplicates: Duplicates) {
        match segments.split_first() {
            None => self.fold_scalar(name, value, duplicates),
            Some((&"", _)) => self.push(name, value),
            Some((&head, rest)) => {
                let entry = self
                    .map
                    .entry(name.to_owned())
                    .or_insert_with(|| Value::Nested(Fields::new()));

                if entry.as_nested().is_none() {
                    *entry = Value::Nested(Fields::new());
                }

                if let Value::Nested(nested) = entry {
                    nested.fold_path(head, rest, value, duplicates);
                }
            }
        }
    }

    fn push(&mut self, name: &str, value: String) {
        let folded = match self.map.remove(name) {
            Some(Value::Sequence(mut values)) => {
                values.push(value);
                Value::Sequence(values)
            }
            Some(Value::Scalar(first)) => Value::Sequence(vec![first, value]),
            _ => Value::Sequence(vec![value]),
        };
        self.map.insert(name.to_owned(), folded);
    }

    fn fold_scalar(&mut self, name: &str, value: String, duplicates: Duplicates) {
        let folded = match (self.map.remove(name), duplicates) {
            (None, _) => Value::Scalar(value),
            (Some(existing), Duplicates::First) => existing,
            (Some(_), Duplicates::Last) => Value::Scalar(value),
            (Some(Value::Scalar(first)), Duplicates::Combine) => Value::Sequence(vec![first, value]),
            (Some(Value::Sequence(mut values)), Duplicates::Combine) => {
                values.push(value);
                Value::Sequence(values)
            }
            (Some(Value::Nested(_)), Duplicates::Combine) => Value::Scalar(value),
        };
        self.map.insert(name.to_owned(), folded);
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_iter()
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Fields {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Fields {
            map: iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect(),
        }
    }
}

/// Decodes `input` into fields.
///
/// Pairs past [`QueryOptions::max_params`] are silently dropped. Malformed
/// escapes decode lossily instead of failing.
///
/// # Examples
///
/// ```
/// use reqparser::qs;
/// use reqparser::{QueryOptions, Value};
///
/// let fields = qs::decode("foo=bar&tag=a&tag=b&user[name]=x", &QueryOptions::default());
/// assert_eq!(fields.get("foo"), Some(&Value::from("bar")));
/// assert_eq!(fields.get("tag").and_then(Value::as_sequence), Some(&["a".to_owned(), "b".to_owned()][..]));
/// assert!(fields.get("user").and_then(Value::as_nested).is_some());
/// ```
pub fn decode(input: &str, options: &QueryOptions) -> Fields {
    let mut fields = Fields::new();

    for pair in input.split('&').filter(|pair| !pair.is_empty()).take(options.max_params) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));

        let key = decode_component(key);
        if key.is_empty() {
            continue;
        }

        fields.fold(&key, decode_component(value), options.duplicates);
    }

    fields
}

/// Encodes fields into a string that [`decode`] folds back into the same
/// mapping.
pub fn encode(fields: &Fields) -> String {
    let mut pairs = Vec::new();
    encode_into(&mut pairs, None, fields);
    pairs.join("&")
}

fn encode_into(pairs: &mut Vec<String>, prefix: Option<&str>, fields: &Fields) {
    for (name, value) in fields {
        let key = match prefix {
            Some(prefix) => format!("{}[{}]", prefix, name),
            None => name.clone(),
        };

        match value {
            Value::Scalar(value) => pairs.push(encode_pair(&key, value)),
            Value::Sequence(values) => {
                let key = format!("{}{}", key, ARRAY_MARKER);
                pairs.extend(values.iter().map(|value| encode_pair(&key, value)));
            }
            Value::Nested(nested) => encode_into(pairs, Some(&key), nested),
        }
    }
}

pub(crate) fn encode_pair(key: &str, value: &str) -> String {
    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
}

fn decode_component(input: &str) -> String {
    let input = input.replace('+', " ");
    match urlencoding::decode(&input) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(input.as_bytes())).into_owned(),
    }
}

/// Splits `a[b][c]` into `("a", ["b", "c"])`.
///
/// Keys that don't follow the bracket grammar, and keys where an array marker
/// is followed by more segments, are kept whole.
fn split_key(key: &str) -> (&str, Vec<&str>) {
    let open = match key.find('[') {
        Some(open) if open > 0 => open,
        _ => return (key, Vec::new()),
    };

    let (root, mut rest) = key.split_at(open);
    let mut segments = Vec::new();

    while !rest.is_empty() {
        let segment = rest
            .strip_prefix('[')
            .and_then(|inner| inner.find(']').map(|end| (&inner[..end], &inner[end + 1..])));

        match segment {
            Some((segment, remaining)) => {
                segments.push(segment);
                rest = remaining;
            }
            None => return (key, Vec::new()),
        }
    }

    if let Some((_, init)) = segments.split_last() {
        if init.iter().any(|segment| segment.is_empty()) {
            return (key, Vec::new());
        }
    }

    (root, segments)
}
