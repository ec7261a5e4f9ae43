//! Template synthesis
//!
//! Renders the user's statement template once per row, sanitizes the result,
//! parses it as Turtle, and prunes degenerate statements left behind by
//! unfilled placeholders: empty literals, unbound-prefix sentinels, and
//! orphaned blank nodes.

use std::collections::HashSet;
use std::sync::Arc;

use csv::StringRecord;
use handlebars::Handlebars;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use rdforge_graph::{Graph, Term};
use rdforge_mapping::ResolvedSpec;
use rdforge_turtle::writer::write_prefix_block;

use crate::error::{ConvertError, ConvertResult};
use crate::functions;

/// Sentinel namespace substituted for undeclared bare-prefix references so
/// the rendered text still parses; statements touching it are pruned.
pub const SENTINEL_PREFIX: &str = "urn:x-unbound-prefix:";

/// Empty literals keep their datatype annotation when a placeholder was
/// unfilled; strip it so they prune uniformly.
static EMPTY_LITERAL_DATATYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"""\^\^(<[^>]*>|[\w:-]+)"#).expect("valid regex"));

/// Prefixes declared inside the rendered text itself.
static PREFIX_DECL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:@prefix|PREFIX)\s+([A-Za-z][\w-]*)?:").expect("valid regex")
});

/// Per-worker template rendering state.
#[derive(Debug)]
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
    /// Prefix frontmatter + shorthand-expanded template, as registered
    body: String,
    header: Arc<Vec<String>>,
    /// Prefixes declared by the table or inside the template body
    declared: HashSet<String>,
}

impl TemplateRenderer {
    /// Compile the spec's template for one worker.
    pub fn new(spec: &ResolvedSpec, header: Arc<Vec<String>>) -> ConvertResult<Self> {
        let template = spec.template.as_deref().unwrap_or_default();

        let mut body = String::new();
        write_prefix_block(&mut body, &spec.prefixes);
        body.push_str(&expand_shorthand(template, &header));

        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);

        if let Some(path) = &spec.functions {
            let module = functions::load(path)?;
            module.register(&mut registry);
        }

        registry
            .register_template_string("statements", &body)
            .map_err(|e| ConvertError::TemplateRender {
                reason: e.to_string(),
                text: body.clone(),
            })?;

        let mut declared: HashSet<String> =
            spec.prefixes.iter().map(|(p, _)| p.to_string()).collect();
        for cap in PREFIX_DECL_RE.captures_iter(&body) {
            declared.insert(cap.get(1).map_or(String::new(), |m| m.as_str().to_string()));
        }

        Ok(Self {
            registry,
            body,
            header,
            declared,
        })
    }

    /// Render the template for one row and return the pruned statement set.
    pub fn render_row(&self, row: &StringRecord, row_idx: usize) -> ConvertResult<Graph> {
        let cells: serde_json::Map<String, serde_json::Value> = self
            .header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cell = row.get(i).unwrap_or("");
                (name.clone(), json!(escape_cell(cell)))
            })
            .collect();
        let context = json!({ "row": cells, "headers": &*self.header });

        let rendered = self
            .registry
            .render("statements", &context)
            .map_err(|e| ConvertError::TemplateRender {
                reason: e.to_string(),
                text: self.body.clone(),
            })?;

        let sanitized = sanitize(&rendered, &self.declared);

        let mut graph = rdforge_turtle::parse(&sanitized, &format!("r{}b", row_idx)).map_err(
            |e| ConvertError::TemplateRender {
                reason: e.to_string(),
                text: sanitized.clone(),
            },
        )?;

        prune(&mut graph);
        Ok(graph)
    }
}

/// Escape characters in a cell that would break Turtle string quoting.
fn escape_cell(cell: &str) -> String {
    let mut out = String::with_capacity(cell.len());
    for c in cell.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Expand `{column}` shorthand into engine lookups against the row map,
/// leaving `{{…}}` engine syntax untouched. Only names that match a header
/// column are expanded.
fn expand_shorthand(template: &str, header: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                // Engine-native block: copy through the matching `}}`
                if let Some(end) = template[i + 2..].find("}}") {
                    out.push_str(&template[i..i + end + 4]);
                    i += end + 4;
                    continue;
                }
                out.push_str(&template[i..]);
                break;
            }
            if let Some(end) = template[i + 1..].find(['{', '}']) {
                if bytes[i + 1 + end] == b'}' {
                    let name = &template[i + 1..i + 1 + end];
                    if header.iter().any(|h| h == name) {
                        out.push_str(&format!("{{{{lookup row \"{}\"}}}}", name));
                    } else {
                        out.push_str(&template[i..i + end + 2]);
                    }
                    i += end + 2;
                    continue;
                }
            }
        }
        // Copy one full character (multi-byte safe)
        let ch_len = template[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&template[i..i + ch_len]);
        i += ch_len;
    }
    out
}

/// Sanitize rendered statement text before parsing:
/// (a) strip datatype annotations from empty literals,
/// (b) turn empty IRI tokens into empty literals so they prune uniformly,
/// (c) rewrite undeclared bare-prefix references to the sentinel IRI.
fn sanitize(rendered: &str, declared: &HashSet<String>) -> String {
    let cleaned = EMPTY_LITERAL_DATATYPE_RE.replace_all(rendered, "\"\"");
    let cleaned = cleaned.replace("<>", "\"\"");
    rewrite_undeclared_prefixes(&cleaned, declared)
}

#[derive(Clone, Copy)]
struct StringState {
    quote: char,
    long: bool,
}

fn rewrite_undeclared_prefixes(text: &str, declared: &HashSet<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut carry: Option<StringState> = None;

    for (line_no, line) in text.split('\n').enumerate() {
        if line_no > 0 {
            out.push('\n');
        }
        if carry.is_none() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("@prefix") || trimmed.starts_with("PREFIX") {
                out.push_str(line);
                continue;
            }
        }
        carry = rewrite_line(line, declared, carry, &mut out);
    }
    out
}

/// Rewrite one line, quote- and IRI-aware. Returns the string state carried
/// into the next line (long strings span lines).
fn rewrite_line(
    line: &str,
    declared: &HashSet<String>,
    mut in_string: Option<StringState>,
    out: &mut String,
) -> Option<StringState> {
    let chars: Vec<char> = line.chars().collect();
    let len = chars.len();
    let mut in_iri = false;
    let mut i = 0;

    while i < len {
        let c = chars[i];

        if let Some(state) = in_string {
            out.push(c);
            if c == '\\' && i + 1 < len {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == state.quote {
                if !state.long {
                    in_string = None;
                } else if i + 2 < len && chars[i + 1] == state.quote && chars[i + 2] == state.quote
                {
                    out.push(state.quote);
                    out.push(state.quote);
                    i += 3;
                    in_string = None;
                    continue;
                }
            }
            i += 1;
            continue;
        }

        if in_iri {
            out.push(c);
            if c == '>' {
                in_iri = false;
            }
            i += 1;
            continue;
        }

        match c {
            '<' => {
                in_iri = true;
                out.push(c);
                i += 1;
            }
            '"' | '\'' => {
                if i + 2 < len && chars[i + 1] == c && chars[i + 2] == c {
                    out.push(c);
                    out.push(c);
                    out.push(c);
                    in_string = Some(StringState {
                        quote: c,
                        long: true,
                    });
                    i += 3;
                } else if i + 1 < len && chars[i + 1] == c {
                    // Empty short string
                    out.push(c);
                    out.push(c);
                    i += 2;
                } else {
                    out.push(c);
                    in_string = Some(StringState {
                        quote: c,
                        long: false,
                    });
                    i += 1;
                }
            }
            '#' => {
                // Comment runs to end of line
                out.extend(chars[i..].iter());
                i = len;
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();

                let scheme_like = i + 2 < len && chars[i + 1] == '/' && chars[i + 2] == '/';
                if i < len && chars[i] == ':' && !scheme_like {
                    i += 1; // colon
                    let local_start = i;
                    while i < len
                        && (chars[i].is_alphanumeric()
                            || matches!(chars[i], '_' | '-' | '.' | '%'))
                    {
                        i += 1;
                    }
                    let mut local_end = i;
                    while local_end > local_start && chars[local_end - 1] == '.' {
                        local_end -= 1;
                    }
                    if declared.contains(&name) {
                        out.push_str(&name);
                        out.push(':');
                        out.extend(chars[local_start..i].iter());
                    } else {
                        out.push('<');
                        out.push_str(SENTINEL_PREFIX);
                        out.push_str(&name);
                        out.push('>');
                        out.extend(chars[local_end..i].iter());
                    }
                } else {
                    out.push_str(&name);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    in_string
}

fn references_sentinel(term: &Term) -> bool {
    term.as_iri().is_some_and(|iri| iri.starts_with(SENTINEL_PREFIX))
}

/// Prune degenerate statements to a fixed point:
/// 1. statements whose object is an empty-string literal,
/// 2. statements referencing a sentinel IRI,
/// 3. statements whose object is a blank node with no outgoing statements —
///    repeated, because removing a blank node's last outgoing statement can
///    orphan its parent reference.
pub fn prune(graph: &mut Graph) {
    loop {
        let mut removed = 0;

        removed += graph.retain(|t| !t.o.is_empty_literal());
        removed += graph.retain(|t| {
            !references_sentinel(&t.s) && !references_sentinel(&t.p) && !references_sentinel(&t.o)
        });

        let blank_objects: Vec<Term> = graph
            .iter()
            .filter(|t| t.o.is_blank())
            .map(|t| t.o.clone())
            .collect();
        let orphans: Vec<Term> = blank_objects
            .into_iter()
            .filter(|b| !graph.has_subject(b))
            .collect();
        if !orphans.is_empty() {
            removed += graph.retain(|t| !orphans.contains(&t.o));
        }

        if removed == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdforge_mapping::ResolvedSpec;
    use rdforge_vocab::PrefixTable;
    use std::path::PathBuf;

    fn spec_with_template(template: &str) -> ResolvedSpec {
        let mut prefixes = PrefixTable::new();
        prefixes.bind("ex", "http://example.org/");
        prefixes.bind("xsd", "http://www.w3.org/2001/XMLSchema#");
        ResolvedSpec {
            infile: PathBuf::from("/data/in.csv"),
            outdir: PathBuf::from("/data"),
            encoding: "utf-8".to_string(),
            delimiter: b',',
            graph: None,
            namespace: None,
            identifier: None,
            types: vec![],
            columns: vec![],
            template: Some(template.to_string()),
            functions: None,
            max_graph_size_mb: None,
            size_check_frequency: 1000,
            workers: None,
            strict_values: false,
            prefixes,
        }
    }

    fn renderer(template: &str, header: &[&str]) -> TemplateRenderer {
        let spec = spec_with_template(template);
        let header = Arc::new(header.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        TemplateRenderer::new(&spec, header).unwrap()
    }

    fn record(cells: &[&str]) -> StringRecord {
        StringRecord::from(cells.to_vec())
    }

    #[test]
    fn test_render_basic_template() {
        let r = renderer("ex:{id} ex:note \"{note}\" .", &["id", "note"]);
        let graph = r.render_row(&record(&["42", "hello"]), 0).unwrap();

        assert_eq!(graph.len(), 1);
        let triple = graph.iter().next().unwrap();
        assert_eq!(triple.s.as_iri(), Some("http://example.org/42"));
        assert_eq!(triple.o.as_literal().map(|(l, _, _)| l), Some("hello"));
    }

    #[test]
    fn test_empty_cell_leaves_no_dangling_statement() {
        let r = renderer(
            "ex:{id} ex:note \"{note}\"^^xsd:string ; ex:link <{link}> .",
            &["id", "note", "link"],
        );
        let graph = r.render_row(&record(&["42", "", ""]), 0).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_quotes_and_newlines_escaped() {
        let r = renderer("ex:{id} ex:note \"{note}\" .", &["id", "note"]);
        let graph = r
            .render_row(&record(&["1", "say \"hi\"\nnow"]), 0)
            .unwrap();
        let (lexical, _, _) = graph.iter().next().unwrap().o.as_literal().unwrap();
        assert_eq!(lexical, "say \"hi\"\nnow");
    }

    #[test]
    fn test_undeclared_prefix_pruned() {
        let r = renderer(
            "ex:{id} ex:p ex:ok . ex:{id} ex:q nope:gone .",
            &["id"],
        );
        let graph = r.render_row(&record(&["1"]), 0).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.iter().next().unwrap().o.as_iri(),
            Some("http://example.org/ok")
        );
    }

    #[test]
    fn test_blank_node_pruning_cascades() {
        // The inner blank node's only statement has an empty object; removing
        // it orphans the inner node, which orphans the outer reference.
        let r = renderer(
            "ex:{id} ex:nested [ ex:inner [ ex:leaf \"{gone}\" ] ] .",
            &["id", "gone"],
        );
        let graph = r.render_row(&record(&["1", ""]), 0).unwrap();
        assert!(graph.is_empty());

        // With the cell filled, the whole chain survives
        let graph = r.render_row(&record(&["1", "x"]), 1).unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let r = renderer(
            "ex:{id} ex:nested [ ex:leaf \"{gone}\" ] ; ex:note \"kept\" .",
            &["id", "gone"],
        );
        let mut graph = r.render_row(&record(&["1", ""]), 0).unwrap();
        let before = graph.len();
        prune(&mut graph);
        assert_eq!(graph.len(), before);
        assert_eq!(before, 1);
    }

    #[test]
    fn test_blank_nodes_scoped_per_row() {
        let r = renderer("ex:{id} ex:item [ ex:v \"{v}\" ] .", &["id", "v"]);
        let mut merged = Graph::new();
        merged.union(r.render_row(&record(&["1", "a"]), 0).unwrap());
        merged.union(r.render_row(&record(&["2", "b"]), 1).unwrap());

        // Two rows, two distinct blank nodes, four statements
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_engine_syntax_untouched_by_expansion() {
        let expanded = expand_shorthand("{{#if x}}{col}{{/if}}", &["col".to_string()]);
        assert_eq!(expanded, "{{#if x}}{{lookup row \"col\"}}{{/if}}");

        // Unknown names stay as-is
        let expanded = expand_shorthand("{nope}", &["col".to_string()]);
        assert_eq!(expanded, "{nope}");
    }

    #[test]
    fn test_sanitize_empty_literal_datatypes() {
        let declared = HashSet::from(["xsd".to_string()]);
        let out = sanitize("<http://e.org/s> <http://e.org/p> \"\"^^xsd:integer .", &declared);
        assert!(out.contains("\"\" ."));
        let out = sanitize(
            "<http://e.org/s> <http://e.org/p> \"\"^^<http://www.w3.org/2001/XMLSchema#integer> .",
            &declared,
        );
        assert!(out.contains("\"\" ."));
    }

    #[test]
    fn test_sanitize_empty_iri() {
        let declared = HashSet::new();
        let out = sanitize("<http://e.org/s> <http://e.org/p> <> .", &declared);
        assert!(out.ends_with("\"\" ."));
    }

    #[test]
    fn test_sanitize_skips_strings_and_iris() {
        let declared = HashSet::new();
        let text = "<http://e.org/s> <http://e.org/p> \"keep nope:inside\" .";
        assert_eq!(sanitize(text, &declared), text);

        let text = "<http://e.org/nope:notaprefix> <http://e.org/p> \"x\" .";
        assert_eq!(sanitize(text, &declared), text);
    }

    #[test]
    fn test_sanitize_skips_prefix_decl_lines() {
        let declared = HashSet::new();
        let text = "@prefix fresh: <http://fresh.org/> .";
        assert_eq!(sanitize(text, &declared), text);
    }

    #[test]
    fn test_template_prefix_declaration_counts_as_declared() {
        let r = renderer(
            "@prefix mine: <http://mine.org/> .\nex:{id} ex:p mine:thing .",
            &["id"],
        );
        let graph = r.render_row(&record(&["1"]), 0).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.iter().next().unwrap().o.as_iri(),
            Some("http://mine.org/thing")
        );
    }

    #[test]
    fn test_unparseable_render_is_fatal() {
        let r = renderer("ex:{id} ex:p .", &["id"]);
        let err = r.render_row(&record(&["1"]), 0).unwrap_err();
        assert!(matches!(err, ConvertError::TemplateRender { .. }));
    }
}
