//! Prefix bindings for CURIE expansion and IRI compaction
//!
//! The [`PrefixTable`] is built once by the configuration resolver and then
//! shared read-only with every downstream component: the row mapper and
//! template synthesizer use it to expand CURIEs, the serializer uses it to
//! emit `@prefix` declarations and compact IRIs.

use std::collections::BTreeMap;

/// Mapping from short prefix names to namespace IRIs.
///
/// Entries are added only during configuration resolution; afterwards the
/// table is immutable and shared by reference across worker threads.
/// Iteration order is deterministic (sorted by prefix name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTable {
    bindings: BTreeMap<String, String>,
}

impl PrefixTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a prefix to a namespace IRI.
    ///
    /// Re-binding an existing prefix replaces the previous namespace; the
    /// later-merged fragment wins, matching the import precedence rules.
    pub fn bind(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.bindings.insert(prefix.into(), namespace.into());
    }

    /// Look up the namespace bound to a prefix.
    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(|s| s.as_str())
    }

    /// Check whether a prefix is bound.
    pub fn contains(&self, prefix: &str) -> bool {
        self.bindings.contains_key(prefix)
    }

    /// Expand a `prefix:localname` CURIE to a full IRI.
    ///
    /// Returns `None` when the string has no colon or the prefix is not
    /// bound. The local name may be empty (`ex:` expands to the bare
    /// namespace).
    pub fn expand_curie(&self, curie: &str) -> Option<String> {
        let (prefix, local) = curie.split_once(':')?;
        let namespace = self.bindings.get(prefix)?;
        Some(format!("{}{}", namespace, local))
    }

    /// Compact an IRI to `prefix:localname` form against the longest
    /// matching bound namespace.
    ///
    /// Returns `None` when no bound namespace is a prefix of the IRI or the
    /// remaining local part would not survive a round-trip (contains
    /// characters that terminate a prefixed name in Turtle).
    pub fn compact(&self, iri: &str) -> Option<String> {
        let mut best: Option<(&str, &str)> = None;
        for (prefix, namespace) in &self.bindings {
            if iri.starts_with(namespace.as_str())
                && best.map_or(true, |(_, ns)| namespace.len() > ns.len())
            {
                best = Some((prefix, namespace));
            }
        }
        let (prefix, namespace) = best?;
        let local = &iri[namespace.len()..];
        if local_name_is_safe(local) {
            Some(format!("{}:{}", prefix, local))
        } else {
            None
        }
    }

    /// Iterate over `(prefix, namespace)` bindings in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, n)| (p.as_str(), n.as_str()))
    }

    /// Number of bound prefixes.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check whether the table has no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A local name is safe to emit as the tail of a prefixed name when it
/// contains only characters that the Turtle grammar accepts there without
/// escaping.
fn local_name_is_safe(local: &str) -> bool {
    !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.starts_with('-')
}
