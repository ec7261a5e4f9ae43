//! Specification loading, merging, and resolution
//!
//! Turns a root fragment location into a frozen [`ResolvedSpec`]:
//!
//! 1. Load the root fragment and, recursively, every fragment it imports,
//!    validating each against the schema (all violations reported together)
//!    and failing on import cycles.
//! 2. Deep-merge fragments by precedence: imports merge in declaration
//!    order, the importing fragment merges last and wins.
//! 3. Extract the typed spec, bind prefixes, rewrite CURIE/IRI fields, and
//!    resolve `infile`/`outdir` against the root fragment's directory.

use std::path::{Path, PathBuf};

use rdforge_graph::is_valid_iri;
use rdforge_vocab::PrefixTable;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{MappingError, MappingResult};
use crate::schema::validate_fragment;
use crate::spec::{ColumnRule, ResolvedSpec};

/// Resolve a root specification file into a frozen [`ResolvedSpec`].
pub fn resolve(root: &Path) -> MappingResult<ResolvedSpec> {
    let root = root
        .canonicalize()
        .map_err(|_| MappingError::MissingInput(format!("spec file {}", root.display())))?;

    let mut chain: Vec<PathBuf> = Vec::new();
    let merged = load_merged(&root, &mut chain)?;

    let mut spec = extract_spec(&merged, &root)?;
    bind_prefixes(&merged, &mut spec.prefixes);
    rewrite_iri_fields(&mut spec);
    resolve_paths(&mut spec, &root)?;

    if !spec.columns.is_empty() && spec.identifier.is_none() {
        return Err(MappingError::Validation {
            path: root,
            violations: vec![
                "'identifier' is required when column rules are present".to_string()
            ],
        });
    }

    Ok(spec)
}

/// Load a fragment and everything it imports, producing the merged document.
///
/// `chain` holds the fragments currently being loaded, outermost first;
/// re-entering one of them is a cycle.
fn load_merged(path: &Path, chain: &mut Vec<PathBuf>) -> MappingResult<Value> {
    let canonical = path
        .canonicalize()
        .map_err(|_| MappingError::MissingInput(format!("imported fragment {}", path.display())))?;

    if chain.contains(&canonical) {
        let mut cycle: Vec<String> = chain.iter().map(|p| p.display().to_string()).collect();
        cycle.push(canonical.display().to_string());
        return Err(MappingError::CircularImport {
            chain: cycle.join(" -> "),
        });
    }
    chain.push(canonical.clone());

    let text = std::fs::read_to_string(&canonical)?;
    let doc: Value = serde_yaml::from_str(&text).map_err(|source| MappingError::Yaml {
        path: canonical.clone(),
        source,
    })?;

    let violations = validate_fragment(&doc);
    if !violations.is_empty() {
        return Err(MappingError::Validation {
            path: canonical,
            violations,
        });
    }

    // Imports merge first, in declaration order; this fragment merges last
    // so the caller-visible fragment always has the highest precedence.
    let mut merged = Value::Mapping(Mapping::new());
    if let Some(imports) = doc.get("import").and_then(Value::as_sequence) {
        let base = canonical.parent().unwrap_or(Path::new("."));
        for import in imports {
            let rel = import.as_str().expect("schema-validated import list");
            let imported = load_merged(&base.join(rel), chain)?;
            deep_merge(&mut merged, imported);
        }
    }
    debug!(fragment = %canonical.display(), "merging fragment");
    deep_merge(&mut merged, doc);

    chain.pop();
    Ok(merged)
}

/// Precedence-aware deep merge: mappings merge recursively; a non-empty
/// scalar or list from the overlay wins, an empty one keeps the base value.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay) => {
            if !is_empty_value(&overlay) {
                *base_slot = overlay;
            }
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Sequence(s) => s.is_empty(),
        _ => false,
    }
}

/// Extract the typed spec from the merged document, collecting violations
/// that only manifest after merging (e.g. a missing `infile`).
fn extract_spec(merged: &Value, root: &Path) -> MappingResult<ResolvedSpec> {
    let mut violations = Vec::new();
    let empty = Mapping::new();
    let map = merged.as_mapping().unwrap_or(&empty);

    let infile = match get_str(map, "infile") {
        Some(s) => PathBuf::from(s),
        None => {
            violations.push("'infile' is required".to_string());
            PathBuf::new()
        }
    };

    let columns = map
        .get("columns")
        .and_then(Value::as_sequence)
        .map(|rules| rules.iter().map(extract_column_rule).collect())
        .unwrap_or_default();

    if !violations.is_empty() {
        return Err(MappingError::Validation {
            path: root.to_path_buf(),
            violations,
        });
    }

    Ok(ResolvedSpec {
        infile,
        outdir: get_str(map, "outdir").map(PathBuf::from).unwrap_or_default(),
        encoding: get_str(map, "encoding")
            .unwrap_or("utf-8")
            .to_string(),
        delimiter: get_str(map, "delimiter")
            .and_then(|s| s.bytes().next())
            .unwrap_or(b','),
        graph: get_str(map, "graph").map(str::to_string),
        namespace: get_str(map, "namespace").map(str::to_string),
        identifier: get_str(map, "identifier").map(str::to_string),
        types: get_str_list(map, "types"),
        columns,
        template: get_str(map, "template").map(str::to_string),
        functions: get_str(map, "functions").map(PathBuf::from),
        max_graph_size_mb: map.get("maxGraphSizeMb").and_then(Value::as_f64),
        size_check_frequency: map
            .get("sizeCheckFrequency")
            .and_then(Value::as_u64)
            .unwrap_or(1000) as usize,
        workers: map.get("workers").and_then(Value::as_u64).map(|n| n as usize),
        strict_values: map
            .get("strictValues")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        prefixes: PrefixTable::new(),
    })
}

fn extract_column_rule(rule: &Value) -> ColumnRule {
    let empty = Mapping::new();
    let map = rule.as_mapping().unwrap_or(&empty);
    ColumnRule {
        column: get_str(map, "column").unwrap_or_default().to_string(),
        predicate: get_str(map, "predicate").unwrap_or_default().to_string(),
        datatype: get_str(map, "datatype")
            .unwrap_or(rdforge_vocab::xsd::STRING)
            .to_string(),
        separator: get_str(map, "separator").map(str::to_string),
        regex: get_bool(map, "regex"),
        datestr: get_str(map, "datestr").map(str::to_string),
        as_iri: get_bool(map, "as_iri"),
        namespace: get_str(map, "namespace").map(str::to_string),
        as_uuid: get_bool(map, "as_uuid"),
        ignore_case: get_bool(map, "ignore_case"),
        label: get_str(map, "label").map(str::to_string),
        rdf_type: get_str(map, "type").map(str::to_string),
    }
}

fn get_str<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn get_bool(map: &Mapping, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn get_str_list(map: &Mapping, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_sequence)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Bind every declared prefix from the merged document into the table.
fn bind_prefixes(merged: &Value, table: &mut PrefixTable) {
    let Some(entries) = merged.get("prefixes").and_then(Value::as_sequence) else {
        return;
    };
    for entry in entries {
        let Some(map) = entry.as_mapping() else {
            continue;
        };
        for (prefix, namespace) in map {
            if let (Some(p), Some(ns)) = (prefix.as_str(), namespace.as_str()) {
                table.bind(p, strip_angles(ns));
            }
        }
    }
}

fn strip_angles(s: &str) -> &str {
    s.trim_start_matches('<').trim_end_matches('>')
}

/// Canonicalize one IRI-positioned string: unwrap angle brackets, expand
/// CURIEs that resolve against the prefix table, keep strings that are
/// already absolute IRIs, and leave everything else untouched.
fn resolve_iri_string(value: &str, table: &PrefixTable) -> String {
    let bare = strip_angles(value);
    if let Some((_, local)) = bare.split_once(':') {
        // `scheme://` can never be a CURIE; don't let an unlucky prefix
        // binding capture it
        if !local.starts_with("//") {
            if let Some(expanded) = table.expand_curie(bare) {
                return expanded;
            }
        }
    }
    if is_valid_iri(bare) {
        return bare.to_string();
    }
    value.to_string()
}

/// Rewrite every IRI-positioned string field of the spec; the template is
/// excluded because its placeholder syntax must survive to render time.
fn rewrite_iri_fields(spec: &mut ResolvedSpec) {
    let table = spec.prefixes.clone();
    let fix = |s: &mut String| *s = resolve_iri_string(s, &table);
    let fix_opt = |s: &mut Option<String>| {
        if let Some(v) = s {
            *v = resolve_iri_string(v, &table);
        }
    };

    fix_opt(&mut spec.graph);
    fix_opt(&mut spec.namespace);
    for t in &mut spec.types {
        fix(t);
    }
    for rule in &mut spec.columns {
        fix(&mut rule.predicate);
        fix(&mut rule.datatype);
        fix_opt(&mut rule.namespace);
        fix_opt(&mut rule.label);
        fix_opt(&mut rule.rdf_type);
    }
}

/// Resolve `infile` and `outdir` against the root fragment's directory and
/// verify their filesystem kinds.
fn resolve_paths(spec: &mut ResolvedSpec, root: &Path) -> MappingResult<()> {
    let base = root.parent().unwrap_or(Path::new("."));

    if !spec.infile.is_absolute() {
        spec.infile = base.join(&spec.infile);
    }
    spec.infile = spec
        .infile
        .canonicalize()
        .map_err(|_| MappingError::MissingInput(format!("data file {}", spec.infile.display())))?;
    if !spec.infile.is_file() {
        return Err(MappingError::MissingInput(format!(
            "data file {} is not a regular file",
            spec.infile.display()
        )));
    }

    if spec.outdir.as_os_str().is_empty() {
        spec.outdir = spec
            .infile
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
    } else if !spec.outdir.is_absolute() {
        spec.outdir = base.join(&spec.outdir);
    }
    if spec.outdir.is_file() {
        return Err(MappingError::MissingInput(format!(
            "output directory {} is a file",
            spec.outdir.display()
        )));
    }
    std::fs::create_dir_all(&spec.outdir)?;
    spec.outdir = spec.outdir.canonicalize()?;

    if let Some(functions) = &spec.functions {
        if !functions.is_absolute() {
            spec.functions = Some(base.join(functions));
        }
    }

    Ok(())
}
