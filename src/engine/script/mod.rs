//! Script functions.
//!
//! Turns inline script text from a scene into a function with an explicit,
//! ordered parameter list, bound to a context value used as `this`:
//!
//! ```yaml
//! - exec:
//!     script: |
//!       let url = this.base + "/items";
//!       return #{ url: url, limit: limit };
//!     vars: { limit: 20 }
//! ```
//!
//! Scripts are compiled as the body of a Rhai function, so the body only
//! sees its parameters, `this` and the engine's global functions. Nothing from
//! the caller's environment leaks in.
//!
//! Compilation errors are returned before anything runs. Runtime errors come
//! back from the returned future.

mod bindings;
mod convert;
mod modules;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rhai::{CallFnOptions, Dynamic, Engine, Scope, AST};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ScriptConfig;
use crate::error::{Error, Result};
use crate::metrics;

pub use bindings::Bindings;
use convert::{dynamic_to_json, dynamic_to_json_string, json_to_dynamic};
use modules::{ModuleHandle, ModuleLoader};

/// Binding name of the module loader injected by
/// [`ScriptExecutor::call_function_script`].
pub const DEFAULT_MODULE_BINDING: &str = "require";

/// Name of the function the script body is compiled into.
const ENTRY_FN: &str = "script_entry";

/// Receiver (`this`) shared between the caller and compiled scripts.
///
/// Clones share the same value; changes a script makes through `this` are
/// visible to every holder.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    value: Arc<Mutex<Dynamic>>,
}

impl ScriptContext {
    pub fn new(value: Value) -> Self {
        Self {
            value: Arc::new(Mutex::new(json_to_dynamic(value))),
        }
    }

    /// Current value of the context as JSON.
    pub fn snapshot(&self) -> Value {
        dynamic_to_json(self.lock().clone())
    }

    /// Replace the context value.
    pub fn set(&self, value: Value) {
        *self.lock() = json_to_dynamic(value);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Dynamic> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ScriptContext {
    fn default() -> Self {
        Self::new(Value::Object(serde_json::Map::new()))
    }
}

/// A compiled script function with its parameter list.
#[derive(Clone)]
struct CompiledScript {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    params: Arc<[String]>,
}

impl CompiledScript {
    /// Run the function once with `this` bound to `context`.
    fn invoke(&self, context: &ScriptContext, args: Vec<Dynamic>) -> Result<Value> {
        let start = Instant::now();
        let outcome = {
            let mut this = context.lock();
            let options = CallFnOptions::new()
                .eval_ast(false)
                .rewind_scope(true)
                .bind_this_ptr(&mut *this);
            self.engine.call_fn_with_options::<Dynamic>(
                options,
                &mut Scope::new(),
                &self.ast,
                ENTRY_FN,
                args,
            )
        };

        match outcome {
            Ok(result) => {
                metrics::record_script_execution("success", start.elapsed());
                Ok(dynamic_to_json(result))
            }
            Err(e) => {
                metrics::record_script_execution("failed", start.elapsed());
                debug!(error = %e, "Script failed");
                Err(Error::ScriptRuntime(e.to_string()))
            }
        }
    }
}

/// A script bound to a context, callable any number of times.
#[derive(Clone)]
pub struct BoundScript {
    compiled: CompiledScript,
    context: ScriptContext,
}

impl BoundScript {
    /// Invoke with positional arguments matching the parameter names.
    ///
    /// A wrong number of arguments is a runtime error.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        let args = args.into_iter().map(json_to_dynamic).collect();
        self.compiled.invoke(&self.context, args)
    }

    /// Parameter names in order.
    pub fn params(&self) -> &[String] {
        &self.compiled.params
    }

    /// The context this script is bound to.
    pub fn context(&self) -> &ScriptContext {
        &self.context
    }
}

impl std::fmt::Debug for BoundScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundScript")
            .field("params", &self.compiled.params)
            .finish()
    }
}

/// Compiles and runs script functions in a sandboxed engine.
#[derive(Clone)]
pub struct ScriptExecutor {
    engine: Arc<Engine>,
    modules: ModuleHandle,
}

impl ScriptExecutor {
    /// Create an executor with the given limits and module directory.
    pub fn new(config: &ScriptConfig) -> Self {
        let loader = Arc::new(ModuleLoader::new(config.module_dir.clone()));
        Self {
            engine: Arc::new(Self::create_engine(config)),
            modules: ModuleHandle::new(loader),
        }
    }

    /// Create a configured Rhai engine.
    fn create_engine(config: &ScriptConfig) -> Engine {
        let mut engine = Engine::new();

        engine.set_max_operations(config.max_operations);
        engine.set_max_call_levels(config.max_call_levels);
        engine.set_max_string_size(config.max_string_size);
        engine.set_max_array_size(config.max_array_size);
        engine.set_max_map_size(config.max_map_size);

        engine.on_print(|text| info!(target: "scene_runtime::script", "{}", text));
        engine.on_debug(|text, source, pos| {
            debug!(target: "scene_runtime::script", source = ?source, position = %pos, "{}", text)
        });

        engine.register_fn("to_json", |v: Dynamic| -> String { dynamic_to_json_string(v) });
        engine.register_fn("from_json", |s: &str| -> Dynamic {
            serde_json::from_str::<Value>(s)
                .map(json_to_dynamic)
                .unwrap_or(Dynamic::UNIT)
        });

        // Only reachable through a handle passed as a binding.
        ModuleHandle::register(&mut engine);

        engine
    }

    /// Compile `script` with `extra` bindings plus the module loader, and
    /// run it once against `context`.
    ///
    /// The outer `Result` carries compilation errors, returned before any
    /// binding is injected or code runs. The future runs the function and
    /// resolves to its return value.
    ///
    /// Parameters are `require` followed by the names in `extra`, in order;
    /// an `extra` binding named `require` replaces the loader.
    pub fn call_function_script(
        &self,
        script: &str,
        context: &ScriptContext,
        extra: Bindings,
    ) -> Result<impl Future<Output = Result<Value>> + Send + 'static> {
        let mut bindings = Bindings::new();
        bindings.insert_dynamic(DEFAULT_MODULE_BINDING, self.modules.binding());
        bindings.extend(extra);

        let (params, args) = bindings.into_parts();
        let compiled = self.compile(script, params)?;
        let context = context.clone();

        Ok(async move { compiled.invoke(&context, args) })
    }

    /// Compile `script` with exactly `params` as parameters and bind it to
    /// `context` for repeated calls. No default bindings are injected.
    pub fn bind_function_script(
        &self,
        script: &str,
        context: &ScriptContext,
        params: &[&str],
    ) -> Result<BoundScript> {
        let params = params.iter().map(|p| p.to_string()).collect();
        let compiled = self.compile(script, params)?;
        Ok(BoundScript {
            compiled,
            context: context.clone(),
        })
    }

    /// Check that `script` compiles with the given parameters.
    pub fn check(&self, script: &str, params: &[&str]) -> Result<()> {
        let params = params.iter().map(|p| p.to_string()).collect();
        self.compile(script, params).map(|_| ())
    }

    fn compile(&self, script: &str, params: Vec<String>) -> Result<CompiledScript> {
        for (i, name) in params.iter().enumerate() {
            if !is_identifier(name) {
                return Err(Error::ScriptCompile(format!(
                    "Invalid parameter name '{}'",
                    name
                )));
            }
            if params[..i].contains(name) {
                return Err(Error::ScriptCompile(format!(
                    "Duplicate parameter name '{}'",
                    name
                )));
            }
        }

        let source = format!("fn {}({}) {{\n{}\n}}", ENTRY_FN, params.join(", "), script);
        let ast = self
            .engine
            .compile(&source)
            .map_err(|e| Error::ScriptCompile(e.to_string()))?;

        debug!(params = ?params, "Compiled script function");
        Ok(CompiledScript {
            engine: self.engine.clone(),
            ast: Arc::new(ast),
            params: params.into(),
        })
    }
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new(&ScriptConfig::default())
    }
}

/// ASCII identifier check; keeps parameter names from altering the
/// generated function header.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
