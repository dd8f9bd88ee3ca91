//! Header mapping carried by request and response envelopes.
//!
//! # Design Decisions
//! - Keys are normalized to title case on every write ("content-type" →
//!   "Content-Type"); lookups and removals are exact on the stored name
//! - Storage is ordered (BTreeMap) to keep the wire form stable
//! - A JSON `null` or missing `headers` field decodes to an empty mapping

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Headers that describe a single connection and must not be forwarded
/// or replayed verbatim.
pub const HOP_BY_HOP: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "Te",
    "Trailer",
    "Transfer-Encoding",
    "Upgrade",
];

/// Returns true if `name` is a hop-by-hop header.
pub fn is_hop_by_hop(name: &str) -> bool {
    let name = title_case(name);
    HOP_BY_HOP.iter().any(|h| *h == name)
}

/// Normalize a header name to title case.
///
/// Every alphabetic character that follows a non-alphabetic one (or starts
/// the string) is upper-cased; all other alphabetic characters are
/// lower-cased. Separators are kept as-is.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_alpha = false;
    for c in name.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Case-normalized header mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<BTreeMap<String, String>>", into = "BTreeMap<String, String>")]
pub struct Headers {
    items: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value under the same name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.items.insert(title_case(name), value.into());
    }

    /// Add a value, joining with any existing one as a comma-separated list.
    pub fn append(&mut self, name: &str, value: &str) {
        self.items
            .entry(title_case(name))
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    /// Exact lookup by stored (title-cased) name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.items.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.items.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<Option<BTreeMap<String, String>>> for Headers {
    fn from(raw: Option<BTreeMap<String, String>>) -> Self {
        let mut headers = Headers::new();
        for (name, value) in raw.unwrap_or_default() {
            headers.insert(&name, value);
        }
        headers
    }
}

impl From<Headers> for BTreeMap<String, String> {
    fn from(headers: Headers) -> Self {
        headers.items
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}
