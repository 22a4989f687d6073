//! Module loading for scripts (`require`).
//!
//! Modules are Rhai files under the configured module directory. A module
//! is evaluated once per executor; its final value (usually an object map)
//! is cached and returned to every later `require` of the same name.
//!
//! Scripts reach the loader only through a [`ModuleHandle`] passed as the
//! `require` binding (`require.load("name")`). The handle type has no
//! script-side constructor and the engine exposes no global loader function,
//! so a script that was not given the binding cannot load modules.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use rhai::{Dynamic, Engine, EvalAltResult, NativeCallContext, Position, Scope};
use tracing::debug;

use super::DEFAULT_MODULE_BINDING;

/// Script-side type name of the `require` binding.
const HANDLE_TYPE: &str = "ModuleLoader";

thread_local! {
    /// Modules currently being evaluated on this thread, outermost first.
    /// Evaluation is synchronous, so this is the require chain of the
    /// running script.
    static LOADING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Resolves, evaluates and caches modules.
#[derive(Debug, Default)]
pub(crate) struct ModuleLoader {
    root: Option<PathBuf>,
    cache: Mutex<HashMap<String, Dynamic>>,
}

/// Opaque handle given to scripts as `require`.
#[derive(Debug, Clone)]
pub(crate) struct ModuleHandle {
    loader: Arc<ModuleLoader>,
}

impl ModuleHandle {
    pub(crate) fn new(loader: Arc<ModuleLoader>) -> Self {
        Self { loader }
    }

    /// Register the handle type and its `load` method on `engine`.
    ///
    /// `load` takes the handle by value so it also works on the constant
    /// `require` inside modules.
    pub(crate) fn register(engine: &mut Engine) {
        engine.register_type_with_name::<ModuleHandle>(HANDLE_TYPE);
        engine.register_fn(
            "load",
            |ctx: NativeCallContext,
             handle: ModuleHandle,
             name: &str|
             -> Result<Dynamic, Box<EvalAltResult>> {
                handle.loader.load(ctx.engine(), name)
            },
        );
    }

    /// The handle as a script value.
    pub(crate) fn binding(&self) -> Dynamic {
        Dynamic::from(self.clone())
    }
}

impl ModuleLoader {
    pub(crate) fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Load a module by name.
    pub(crate) fn load(
        self: &Arc<Self>,
        engine: &Engine,
        name: &str,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        if let Some(cached) = lock(&self.cache).get(name) {
            return Ok(cached.clone());
        }

        let path = self.resolve(name).map_err(runtime_error)?;

        let value = {
            let _entry = LoadingEntry::enter(self, name)?;
            self.evaluate(engine, &path)?
        };

        debug!(module = name, path = %path.display(), "Loaded script module");
        // Concurrent first loads may both evaluate; the first stored value wins.
        let value = lock(&self.cache)
            .entry(name.to_string())
            .or_insert(value)
            .clone();
        Ok(value)
    }

    fn evaluate(self: &Arc<Self>, engine: &Engine, path: &Path) -> Result<Dynamic, Box<EvalAltResult>> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            runtime_error(format!("Cannot read module '{}': {}", path.display(), e))
        })?;

        // Modules may require other modules.
        let mut scope = Scope::new();
        scope.push_constant(
            DEFAULT_MODULE_BINDING,
            ModuleHandle::new(self.clone()).binding(),
        );
        engine.eval_with_scope::<Dynamic>(&mut scope, &source)
    }

    /// Map a module name to a file under the module directory.
    fn resolve(&self, name: &str) -> Result<PathBuf, String> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| format!("Cannot require '{}': no module directory configured", name))?;

        let relative = Path::new(name);
        let confined = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(format!(
                "Invalid module name '{}': must be a relative path inside the module directory",
                name
            ));
        }

        let mut path = root.join(relative);
        if path.extension().is_none() {
            path.set_extension("rhai");
        }
        Ok(path)
    }
}

/// Marks a module as loading on this thread until dropped.
struct LoadingEntry {
    key: (usize, String),
}

impl LoadingEntry {
    fn enter(loader: &Arc<ModuleLoader>, name: &str) -> Result<Self, Box<EvalAltResult>> {
        let key = (Arc::as_ptr(loader) as usize, name.to_string());
        LOADING.with(|chain| {
            let mut chain = chain.borrow_mut();
            if chain.contains(&key) {
                return Err(runtime_error(format!(
                    "Circular require of module '{}'",
                    name
                )));
            }
            chain.push(key.clone());
            Ok(Self { key })
        })
    }
}

impl Drop for LoadingEntry {
    fn drop(&mut self) {
        LOADING.with(|chain| {
            let mut chain = chain.borrow_mut();
            if let Some(pos) = chain.iter().rposition(|k| *k == self.key) {
                chain.remove(pos);
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    let message: String = message.into();
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message),
        Position::NONE,
    ))
}
