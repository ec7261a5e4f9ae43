//! RDF graph - a set of statements
//!
//! The `Graph` type has set semantics: inserting a duplicate statement is a
//! no-op. This makes the union of per-row graphs into the shared accumulator
//! commutative and idempotent, so the final output (as a set of statements)
//! does not depend on worker completion order.

use rustc_hash::FxHashSet;

use crate::{Term, Triple};

/// A set of RDF statements.
///
/// # Design
///
/// - **Set semantics**: a side index of statement hashes rejects duplicates
///   on insert.
/// - **Insertion order**: statements are also kept in a `Vec` so iteration
///   is deterministic for a given merge order; call [`Graph::sort`] before
///   serializing for order-independent output.
/// - **Size estimate**: [`Graph::estimated_size_bytes`] is a heuristic used
///   by the chunked writer, not an exact allocation measurement.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    triples: Vec<Triple>,
    index: FxHashSet<Triple>,
    size_estimate: usize,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a statement. Returns `true` if it was not already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.index.contains(&triple) {
            return false;
        }
        self.size_estimate += triple.estimated_size_bytes();
        self.index.insert(triple.clone());
        self.triples.push(triple);
        true
    }

    /// Insert a statement by components.
    pub fn insert_triple(&mut self, s: Term, p: Term, o: Term) -> bool {
        self.insert(Triple::new(s, p, o))
    }

    /// Union another graph into this one (idempotent).
    pub fn union(&mut self, other: Graph) {
        for triple in other.triples {
            self.insert(triple);
        }
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Check whether a statement is present.
    pub fn contains(&self, triple: &Triple) -> bool {
        self.index.contains(triple)
    }

    /// Iterate over statements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Keep only the statements matching the predicate.
    ///
    /// Returns the number of statements removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Triple) -> bool,
    {
        let before = self.triples.len();
        let index = &mut self.index;
        let size = &mut self.size_estimate;
        self.triples.retain(|t| {
            if keep(t) {
                true
            } else {
                index.remove(t);
                *size = size.saturating_sub(t.estimated_size_bytes());
                false
            }
        });
        before - self.triples.len()
    }

    /// Check whether any statement has the given term as its subject.
    pub fn has_subject(&self, term: &Term) -> bool {
        self.triples.iter().any(|t| &t.s == term)
    }

    /// Sort statements by (subject, predicate, object) for deterministic
    /// serialization.
    pub fn sort(&mut self) {
        self.triples.sort();
    }

    /// Approximate in-memory size of the statement set in bytes.
    pub fn estimated_size_bytes(&self) -> usize {
        self.size_estimate
    }

    /// Drain the graph, leaving it empty.
    pub fn take(&mut self) -> Graph {
        std::mem::take(self)
    }

    /// Get all statements (consuming the graph).
    pub fn into_triples(self) -> Vec<Triple> {
        self.triples
    }

    /// Get a reference to the statements.
    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    /// Group statements by subject.
    ///
    /// Sort the graph first for consistent grouping; groups are runs of
    /// equal subjects in iteration order.
    pub fn group_by_subject(&self) -> SubjectGroups<'_> {
        SubjectGroups {
            triples: &self.triples,
            index: 0,
        }
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<T: IntoIterator<Item = Triple>>(iter: T) -> Self {
        let mut graph = Graph::new();
        for triple in iter {
            graph.insert(triple);
        }
        graph
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = std::slice::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}

/// Iterator over statements grouped by subject.
pub struct SubjectGroups<'a> {
    triples: &'a [Triple],
    index: usize,
}

impl<'a> Iterator for SubjectGroups<'a> {
    type Item = (&'a Term, &'a [Triple]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.triples.len() {
            return None;
        }

        let start = self.index;
        let subject = &self.triples[start].s;

        while self.index < self.triples.len() && self.triples[self.index].s == *subject {
            self.index += 1;
        }

        Some((subject, &self.triples[start..self.index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Term::iri(s), Term::iri(p), Term::string(o))
    }

    #[test]
    fn test_insert_dedupes() {
        let mut graph = Graph::new();
        let t = triple("http://example.org/s", "http://example.org/p", "o");

        assert!(graph.insert(t.clone()));
        assert!(!graph.insert(t.clone()));
        assert!(!graph.insert(t));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_union_idempotent() {
        let mut a = Graph::new();
        a.insert(triple("http://example.org/s", "http://example.org/p", "1"));

        let mut b = Graph::new();
        b.insert(triple("http://example.org/s", "http://example.org/p", "1"));
        b.insert(triple("http://example.org/s", "http://example.org/p", "2"));

        a.union(b.clone());
        assert_eq!(a.len(), 2);
        a.union(b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_retain_updates_index_and_size() {
        let mut graph = Graph::new();
        let keep = triple("http://example.org/s", "http://example.org/p", "keep");
        let drop = triple("http://example.org/s", "http://example.org/p", "");
        graph.insert(keep.clone());
        graph.insert(drop.clone());

        let removed = graph.retain(|t| !t.o.is_empty_literal());
        assert_eq!(removed, 1);
        assert_eq!(graph.len(), 1);
        assert!(graph.contains(&keep));
        assert!(!graph.contains(&drop));

        // A removed statement can be inserted again
        assert!(graph.insert(drop));
    }

    #[test]
    fn test_size_estimate_grows_and_shrinks() {
        let mut graph = Graph::new();
        assert_eq!(graph.estimated_size_bytes(), 0);

        graph.insert(triple("http://example.org/s", "http://example.org/p", "o"));
        let one = graph.estimated_size_bytes();
        assert!(one > 0);

        graph.insert(triple("http://example.org/s", "http://example.org/p", "oo"));
        assert!(graph.estimated_size_bytes() > one);

        graph.retain(|_| false);
        assert_eq!(graph.estimated_size_bytes(), 0);
    }

    #[test]
    fn test_group_by_subject() {
        let mut graph = Graph::new();
        graph.insert(triple("http://example.org/b", "http://example.org/p", "1"));
        graph.insert(triple("http://example.org/a", "http://example.org/p", "2"));
        graph.insert(triple("http://example.org/a", "http://example.org/q", "3"));
        graph.sort();

        let groups: Vec<_> = graph.group_by_subject().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.as_iri(), Some("http://example.org/a"));
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0.as_iri(), Some("http://example.org/b"));
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn test_has_subject() {
        let mut graph = Graph::new();
        graph.insert(Triple::new(
            Term::blank("b0"),
            Term::iri("http://example.org/p"),
            Term::string("x"),
        ));
        assert!(graph.has_subject(&Term::blank("b0")));
        assert!(!graph.has_subject(&Term::blank("b1")));
    }
}
