//! Turtle and TriG serialization.
//!
//! Writes an accumulated statement set as Turtle (triples) or TriG (the
//! same statements wrapped in a named-graph block). Prefix declarations
//! come from the run's [`PrefixTable`]; IRIs are compacted against it when
//! the compact form round-trips.

use rdforge_graph::{Graph, Term, Triple};
use rdforge_vocab::{rdf, xsd, PrefixTable};

/// Serialize a graph as Turtle.
///
/// The graph is sorted first so output is deterministic regardless of the
/// order rows were merged in.
pub fn write_turtle(graph: &mut Graph, prefixes: &PrefixTable) -> String {
    let mut out = String::new();
    write_prefix_block(&mut out, prefixes);
    graph.sort();
    write_body(&mut out, graph, prefixes, "");
    out
}

/// Serialize a graph as TriG with all statements inside one named graph.
pub fn write_trig(graph: &mut Graph, prefixes: &PrefixTable, graph_iri: &str) -> String {
    let mut out = String::new();
    write_prefix_block(&mut out, prefixes);
    out.push_str(&format!("<{}> {{\n", graph_iri));
    graph.sort();
    write_body(&mut out, graph, prefixes, "    ");
    out.push_str("}\n");
    out
}

/// Emit the `@prefix` declarations used by the run.
pub fn write_prefix_block(out: &mut String, prefixes: &PrefixTable) {
    for (prefix, namespace) in prefixes.iter() {
        out.push_str(&format!("@prefix {}: <{}> .\n", prefix, namespace));
    }
    if !prefixes.is_empty() {
        out.push('\n');
    }
}

fn write_body(out: &mut String, graph: &Graph, prefixes: &PrefixTable, indent: &str) {
    for (subject, triples) in graph.group_by_subject() {
        out.push_str(indent);
        out.push_str(&term_to_turtle(subject, prefixes));
        write_predicate_objects(out, triples, prefixes, indent);
        out.push_str(" .\n");
    }
}

fn write_predicate_objects(
    out: &mut String,
    triples: &[Triple],
    prefixes: &PrefixTable,
    indent: &str,
) {
    let mut i = 0;
    let mut first_predicate = true;
    while i < triples.len() {
        let predicate = &triples[i].p;
        if first_predicate {
            out.push(' ');
            first_predicate = false;
        } else {
            out.push_str(" ;\n");
            out.push_str(indent);
            out.push_str("    ");
        }
        out.push_str(&predicate_to_turtle(predicate, prefixes));

        let mut first_object = true;
        while i < triples.len() && &triples[i].p == predicate {
            if first_object {
                out.push(' ');
                first_object = false;
            } else {
                out.push_str(", ");
            }
            out.push_str(&term_to_turtle(&triples[i].o, prefixes));
            i += 1;
        }
    }
}

fn predicate_to_turtle(term: &Term, prefixes: &PrefixTable) -> String {
    if term.as_iri() == Some(rdf::TYPE) {
        return "a".to_string();
    }
    term_to_turtle(term, prefixes)
}

fn term_to_turtle(term: &Term, prefixes: &PrefixTable) -> String {
    match term {
        Term::Iri(iri) => match prefixes.compact(iri) {
            Some(curie) => curie,
            None => format!("<{}>", iri),
        },
        Term::BlankNode(id) => format!("_:{}", id.as_str()),
        Term::Literal {
            lexical,
            datatype,
            language,
        } => {
            let mut s = format!("\"{}\"", escape_literal(lexical));
            if let Some(lang) = language {
                s.push('@');
                s.push_str(lang);
            } else if datatype.as_ref() != xsd::STRING {
                s.push_str("^^");
                match prefixes.compact(datatype) {
                    Some(curie) => s.push_str(&curie),
                    None => s.push_str(&format!("<{}>", datatype)),
                }
            }
            s
        }
    }
}

/// Escape a literal for the short double-quoted string production.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}
