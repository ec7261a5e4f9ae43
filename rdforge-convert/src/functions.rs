//! Custom template functions
//!
//! A custom-function module is a user-authored Rhai script; every top-level
//! function it defines is exposed inside template rendering as a helper
//! under its own name. Scripts are compiled once per distinct path and
//! cached; each worker registers the cached module into its own template
//! registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason};
use once_cell::sync::Lazy;
use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{ConvertError, ConvertResult};

static MODULE_CACHE: Lazy<Mutex<HashMap<PathBuf, Arc<CustomFunctions>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A compiled custom-function module.
#[derive(Debug)]
pub struct CustomFunctions {
    ast: AST,
    names: Vec<String>,
}

impl CustomFunctions {
    /// Function names exported by the module.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Register every function as a helper in a template registry.
    ///
    /// Each helper evaluates the named script function with the helper's
    /// parameters and writes the result's string form to the output.
    pub fn register(self: &Arc<Self>, registry: &mut Handlebars<'static>) {
        for name in &self.names {
            let module = Arc::clone(self);
            let fn_name = name.clone();
            registry.register_helper(
                name,
                Box::new(
                    move |h: &Helper,
                          _r: &Handlebars,
                          _ctx: &Context,
                          _rc: &mut RenderContext,
                          out: &mut dyn Output|
                          -> HelperResult {
                        let args: Vec<Dynamic> = h
                            .params()
                            .iter()
                            .map(|p| json_to_dynamic(p.value()))
                            .collect();
                        let engine = Engine::new();
                        let result = engine
                            .call_fn::<Dynamic>(&mut Scope::new(), &module.ast, &fn_name, args)
                            .map_err(|e| {
                                RenderErrorReason::Other(format!(
                                    "custom function '{}' failed: {}",
                                    fn_name, e
                                ))
                            })?;
                        if !result.is_unit() {
                            out.write(&result.to_string())?;
                        }
                        Ok(())
                    },
                ),
            );
        }
    }
}

/// Load a custom-function module, compiling it on first use per path.
pub fn load(path: &Path) -> ConvertResult<Arc<CustomFunctions>> {
    let canonical = path
        .canonicalize()
        .map_err(|e| ConvertError::CustomFunctions {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let mut cache = MODULE_CACHE.lock().expect("function cache poisoned");
    if let Some(module) = cache.get(&canonical) {
        return Ok(Arc::clone(module));
    }

    let source = std::fs::read_to_string(&canonical)?;
    let engine = Engine::new();
    let ast = engine
        .compile(&source)
        .map_err(|e| ConvertError::CustomFunctions {
            path: canonical.display().to_string(),
            reason: e.to_string(),
        })?;

    let names: Vec<String> = ast
        .iter_functions()
        .map(|f| f.name.to_string())
        .collect();
    debug!(path = %canonical.display(), functions = names.len(), "loaded custom functions");

    let module = Arc::new(CustomFunctions { ast, names });
    cache.insert(canonical, Arc::clone(&module));
    Ok(module)
}

fn json_to_dynamic(value: &JsonValue) -> Dynamic {
    match value {
        JsonValue::Null => Dynamic::UNIT,
        JsonValue::Bool(b) => (*b).into(),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        JsonValue::String(s) => s.clone().into(),
        other => other.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn script_file(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".rhai").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_lists_top_level_functions() {
        let file = script_file(
            r#"
fn shout(s) { s.to_upper() }
fn first_word(s) { s.split(" ")[0] }
"#,
        );
        let module = load(file.path()).unwrap();
        let mut names = module.names().to_vec();
        names.sort();
        assert_eq!(names, vec!["first_word", "shout"]);
    }

    #[test]
    fn test_load_is_cached_per_path() {
        let file = script_file("fn one() { 1 }");
        let a = load(file.path()).unwrap();
        let b = load(file.path()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_compile_error_reported() {
        let file = script_file("fn broken( {");
        let err = load(file.path()).unwrap_err();
        assert!(matches!(err, ConvertError::CustomFunctions { .. }));
    }

    #[test]
    fn test_helper_callable_from_template() {
        let file = script_file(r#"fn shout(s) { s.to_upper() }"#);
        let module = load(file.path()).unwrap();

        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        module.register(&mut registry);
        registry
            .register_template_string("t", "{{shout name}}")
            .unwrap();

        let rendered = registry.render("t", &json!({"name": "alice"})).unwrap();
        assert_eq!(rendered, "ALICE");
    }
}
