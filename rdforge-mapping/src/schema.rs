//! Fragment schema validation
//!
//! Validates one YAML fragment against the fixed mapping schema. Violations
//! are collected, not short-circuited: a fragment with three problems
//! reports all three in one error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

/// Prefix namespace values must be angle-bracketed absolute http(s) IRIs.
static PREFIX_IRI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<http[s]?://.*>$").expect("valid regex"));

/// Date patterns are strftime strings: conversion specifiers separated by
/// punctuation/whitespace.
static DATE_FMT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(%[aAbBcCdDeFgGHhIjkMmnpPrRSTuUVWwxXyYzZf]|[%\-\s:./,TZ+]+)+$")
        .expect("valid regex")
});

const TOP_LEVEL_KEYS: &[&str] = &[
    "import",
    "prefixes",
    "infile",
    "encoding",
    "delimiter",
    "outdir",
    "graph",
    "namespace",
    "identifier",
    "types",
    "columns",
    "template",
    "functions",
    "maxGraphSizeMb",
    "sizeCheckFrequency",
    "workers",
    "strictValues",
];

const COLUMN_KEYS: &[&str] = &[
    "column",
    "predicate",
    "datatype",
    "datestr",
    "separator",
    "regex",
    "as_iri",
    "namespace",
    "as_uuid",
    "ignore_case",
    "label",
    "type",
];

/// Validate one fragment. Returns every violation found; an empty vector
/// means the fragment is schema-valid.
pub fn validate_fragment(doc: &Value) -> Vec<String> {
    let mut violations = Vec::new();

    let Value::Mapping(map) = doc else {
        violations.push("document must be a mapping".to_string());
        return violations;
    };

    for key in map.keys() {
        match key.as_str() {
            Some(k) if TOP_LEVEL_KEYS.contains(&k) => {}
            Some(k) => violations.push(format!("unknown field '{}'", k)),
            None => violations.push("field names must be strings".to_string()),
        }
    }

    check_string_list(map, "import", &mut violations);
    check_prefixes(map, &mut violations);
    for field in [
        "infile",
        "encoding",
        "outdir",
        "graph",
        "namespace",
        "identifier",
        "template",
        "functions",
    ] {
        check_string(map, field, &mut violations);
    }
    check_delimiter(map, &mut violations);
    check_string_list(map, "types", &mut violations);
    check_columns(map, &mut violations);
    check_positive_number(map, "maxGraphSizeMb", &mut violations);
    check_positive_int(map, "sizeCheckFrequency", &mut violations);
    check_positive_int(map, "workers", &mut violations);
    check_bool(map, "strictValues", &mut violations);

    violations
}

fn field<'a>(map: &'a serde_yaml::Mapping, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn check_string(map: &serde_yaml::Mapping, key: &str, violations: &mut Vec<String>) {
    if let Some(v) = field(map, key) {
        if !v.is_string() {
            violations.push(format!("'{}' must be a string", key));
        }
    }
}

fn check_bool(map: &serde_yaml::Mapping, key: &str, violations: &mut Vec<String>) {
    if let Some(v) = field(map, key) {
        if !v.is_bool() {
            violations.push(format!("'{}' must be a boolean", key));
        }
    }
}

fn check_delimiter(map: &serde_yaml::Mapping, violations: &mut Vec<String>) {
    if let Some(v) = field(map, "delimiter") {
        match v.as_str() {
            Some(s) if s.len() == 1 && s.is_ascii() => {}
            _ => violations.push("'delimiter' must be a single ASCII character".to_string()),
        }
    }
}

fn check_string_list(map: &serde_yaml::Mapping, key: &str, violations: &mut Vec<String>) {
    if let Some(v) = field(map, key) {
        match v.as_sequence() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        violations.push(format!("'{}[{}]' must be a string", key, i));
                    }
                }
            }
            None => violations.push(format!("'{}' must be a list of strings", key)),
        }
    }
}

fn check_positive_number(map: &serde_yaml::Mapping, key: &str, violations: &mut Vec<String>) {
    if let Some(v) = field(map, key) {
        match v.as_f64() {
            Some(n) if n > 0.0 => {}
            _ => violations.push(format!("'{}' must be a positive number", key)),
        }
    }
}

fn check_positive_int(map: &serde_yaml::Mapping, key: &str, violations: &mut Vec<String>) {
    if let Some(v) = field(map, key) {
        match v.as_u64() {
            Some(n) if n > 0 => {}
            _ => violations.push(format!("'{}' must be a positive integer", key)),
        }
    }
}

/// `prefixes` is a list of single-entry maps: `- ex: "<http://example.org/>"`.
fn check_prefixes(map: &serde_yaml::Mapping, violations: &mut Vec<String>) {
    let Some(v) = field(map, "prefixes") else {
        return;
    };
    let Some(items) = v.as_sequence() else {
        violations.push("'prefixes' must be a list of prefix-to-IRI maps".to_string());
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let Some(entry) = item.as_mapping() else {
            violations.push(format!("'prefixes[{}]' must be a map", i));
            continue;
        };
        for (k, val) in entry {
            if !k.is_string() {
                violations.push(format!("'prefixes[{}]' keys must be strings", i));
            }
            match val.as_str() {
                Some(s) if PREFIX_IRI_RE.is_match(s) => {}
                _ => violations.push(format!(
                    "'prefixes[{}].{}' must match {}",
                    i,
                    k.as_str().unwrap_or("?"),
                    PREFIX_IRI_RE.as_str()
                )),
            }
        }
    }
}

fn check_columns(map: &serde_yaml::Mapping, violations: &mut Vec<String>) {
    let Some(v) = field(map, "columns") else {
        return;
    };
    let Some(items) = v.as_sequence() else {
        violations.push("'columns' must be a list".to_string());
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let Some(rule) = item.as_mapping() else {
            violations.push(format!("'columns[{}]' must be a map", i));
            continue;
        };

        for key in rule.keys() {
            match key.as_str() {
                Some(k) if COLUMN_KEYS.contains(&k) => {}
                Some(k) => violations.push(format!("'columns[{}]': unknown field '{}'", i, k)),
                None => violations.push(format!("'columns[{}]': field names must be strings", i)),
            }
        }

        for required in ["column", "predicate"] {
            match field(rule, required) {
                Some(v) if v.is_string() => {}
                Some(_) => violations.push(format!(
                    "'columns[{}].{}' must be a string",
                    i, required
                )),
                None => violations.push(format!(
                    "'columns[{}]' is missing required field '{}'",
                    i, required
                )),
            }
        }

        for optional in ["datatype", "separator", "namespace", "label", "type"] {
            if let Some(v) = field(rule, optional) {
                if !v.is_string() {
                    violations.push(format!("'columns[{}].{}' must be a string", i, optional));
                }
            }
        }

        for flag in ["regex", "as_iri", "as_uuid", "ignore_case"] {
            if let Some(v) = field(rule, flag) {
                if !v.is_bool() {
                    violations.push(format!("'columns[{}].{}' must be a boolean", i, flag));
                }
            }
        }

        if let Some(v) = field(rule, "datestr") {
            match v.as_str() {
                Some(s) if DATE_FMT_RE.is_match(s) => {}
                Some(s) => violations.push(format!(
                    "'columns[{}].datestr' is not a date format pattern: '{}'",
                    i, s
                )),
                None => violations.push(format!("'columns[{}].datestr' must be a string", i)),
            }
        }
    }
}
