//! The Starlark-based workflow script interpreter (component I).
//!
//! A script's `main(args)` runs once per [`exec_workflow`](crate::retry::exec_workflow)
//! attempt. Every observable side effect — filesystem, network, RNG — must
//! go through `workflow.execactivity(name, *args)`, which looks `name` up in
//! an [`ActivityRegistry`] built from the engine's built-in modules plus
//! whatever the embedder registers, and records/replays it through
//! [`exec_activity`].
//!
//! Starlark function values are scoped to the [`Evaluator`] that created
//! them and cannot serve as a stable identity across replay attempts (each
//! attempt gets a fresh evaluator), so scripts address activities by
//! registered name rather than by passing a callable — unlike the informal
//! description of "the callable's identity" as the activity key.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anvil_context::Context;
use anvil_fs::ReadableFs;
use anvil_paths::SlashPathBuf;
use serde_json::Value as JsonValue;
use starlark::{
    environment::{FrozenModule, Globals, GlobalsBuilder, LibraryExtension, Module},
    eval::{Evaluator, FileLoader},
    starlark_module,
    syntax::{AstModule, Dialect},
    values::{
        dict::AllocDict,
        list::AllocList,
        Value as StarlarkValue,
    },
};

use crate::activity::{exec_activity, Activity, ActivityError, WorkflowError};
use crate::events::EventHistory;
use crate::retry::WorkflowEngine as WorkflowEngineTrait;

/// A native activity implementation keyed by the name scripts call it by.
pub type ActivityFn = dyn Fn(&Context, &JsonValue) -> Result<JsonValue, ActivityError> + Send + Sync;

#[derive(Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<ActivityFn>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Context, &JsonValue) -> Result<JsonValue, ActivityError> + Send + Sync + 'static,
    ) {
        self.activities.insert(name.into(), Arc::new(f));
    }

    fn get(&self, name: &str) -> Option<Arc<ActivityFn>> {
        self.activities.get(name).cloned()
    }
}

struct NamedActivity {
    name: String,
    args: JsonValue,
    call: Arc<ActivityFn>,
}

impl Activity for NamedActivity {
    fn key(&self) -> String {
        self.name.clone()
    }

    fn serialize(&self) -> JsonValue {
        self.args.clone()
    }

    fn exec(&self, ctx: &Context) -> Result<JsonValue, ActivityError> {
        (self.call)(ctx, &self.args)
    }
}

/// Bridges a live workflow attempt into the `execactivity` native function:
/// owned by value (not borrowed) so it satisfies Starlark's `'static`
/// extra-data requirement, and handed back to the caller once evaluation
/// finishes.
#[derive(starlark::any::ProvidesStaticType)]
struct WorkflowExtra {
    ctx: Context,
    history: RefCell<EventHistory>,
    registry: Arc<ActivityRegistry>,
    error: RefCell<Option<WorkflowError>>,
}

#[starlark_module]
fn workflow_builtins(builder: &mut GlobalsBuilder) {
    fn execactivity<'v>(
        name: &str,
        args: StarlarkValue<'v>,
        eval: &mut Evaluator<'v, '_>,
    ) -> anyhow::Result<StarlarkValue<'v>> {
        let extra = eval
            .extra
            .ok_or_else(|| anyhow::anyhow!("no workflow execution context bound to this evaluator"))?
            .downcast_ref::<WorkflowExtra>()
            .ok_or_else(|| anyhow::anyhow!("evaluator extra is not a WorkflowExtra"))?;

        let call = extra
            .registry
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no activity registered under the name {name:?}"))?;
        let json_args = starlark_to_json(args)?;
        let activity = NamedActivity {
            name: name.to_owned(),
            args: json_args,
            call,
        };

        let mut history = extra.history.borrow_mut();
        match exec_activity(&extra.ctx, &mut history, &activity) {
            Ok(result) => Ok(json_to_starlark(&result, eval.heap())),
            Err(err) => {
                let message = err.to_string();
                *extra.error.borrow_mut() = Some(err);
                Err(anyhow::anyhow!(message))
            }
        }
    }
}

fn globals() -> Globals {
    GlobalsBuilder::extended_by(&[LibraryExtension::StructType])
        .with(workflow_builtins)
        .build()
}

fn json_to_starlark<'v>(value: &JsonValue, heap: &'v starlark::values::Heap) -> StarlarkValue<'v> {
    match value {
        JsonValue::Null => StarlarkValue::new_none(),
        JsonValue::Bool(b) => StarlarkValue::new_bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                heap.alloc(i)
            } else {
                heap.alloc(n.as_f64().unwrap_or_default())
            }
        }
        JsonValue::String(s) => heap.alloc(s.as_str()),
        JsonValue::Array(items) => {
            let values: Vec<StarlarkValue<'v>> =
                items.iter().map(|item| json_to_starlark(item, heap)).collect();
            heap.alloc(AllocList(values))
        }
        JsonValue::Object(map) => {
            let entries: Vec<(StarlarkValue<'v>, StarlarkValue<'v>)> = map
                .iter()
                .map(|(k, v)| (heap.alloc(k.as_str()), json_to_starlark(v, heap)))
                .collect();
            heap.alloc(AllocDict(entries))
        }
    }
}

/// The reverse bridge: Starlark's own `to_json` serialization already
/// preserves the int/float split the same way `serde_json` does, so this is
/// a single parse rather than a hand-rolled value walk.
fn starlark_to_json(value: StarlarkValue<'_>) -> anyhow::Result<JsonValue> {
    let text = value.to_json()?;
    Ok(serde_json::from_str(&text)?)
}

/// Resolves `load("...")` statements against the script filesystem root,
/// absolute paths from the root and relative paths from the importing
/// file's own directory, per the repository layout workflows are fetched
/// into (component B).
struct ScriptLoader<'a> {
    fs: &'a dyn ReadableFs,
    globals: &'a Globals,
    cache: RefCell<HashMap<String, FrozenModule>>,
    in_progress: RefCell<HashSet<String>>,
}

impl<'a> ScriptLoader<'a> {
    fn new(fs: &'a dyn ReadableFs, globals: &'a Globals) -> Self {
        Self {
            fs,
            globals,
            cache: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        }
    }

    fn load_module(&self, path: &str) -> anyhow::Result<FrozenModule> {
        if let Some(cached) = self.cache.borrow().get(path) {
            return Ok(cached.dupe());
        }
        if !self.in_progress.borrow_mut().insert(path.to_owned()) {
            return Err(anyhow::anyhow!("import cycle at {path}"));
        }

        let slash = SlashPathBuf::parse(path.trim_start_matches('/'))
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let bytes = self
            .fs
            .read_file(&slash)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let body = String::from_utf8(bytes)?;
        // `workflow` is a namespace object wrapping the native
        // `execactivity` global, not a global itself, so every module gets
        // it bound ahead of its own source. Every module also gets its own
        // path and directory bound as implicit globals (spec §4.8).
        let dir = path.rsplit_once('/').map_or("", |(dir, _)| dir);
        let source = format!(
            "__anvil_mod__ = {path:?}\n__anvil_moddir__ = {dir:?}\nworkflow = struct(execactivity = execactivity)\n{body}"
        );

        let ast = AstModule::parse(path, source, &Dialect::Extended)?;
        let module = Module::new();
        {
            let mut eval = Evaluator::new(&module);
            eval.set_loader(self);
            eval.eval_module(ast, self.globals)?;
        }
        let frozen = module.freeze()?;

        self.in_progress.borrow_mut().remove(path);
        self.cache
            .borrow_mut()
            .insert(path.to_owned(), frozen.dupe());
        Ok(frozen)
    }
}

impl FileLoader for ScriptLoader<'_> {
    fn load(&self, path: &str) -> anyhow::Result<FrozenModule> {
        self.load_module(path)
    }
}

/// Evaluates compiled Starlark scripts against a registry of named
/// activities. One instance can run many workflow attempts; each call to
/// [`exec`](WorkflowEngineTrait::exec) is independent and single-threaded
/// (spec §5: no concurrent scripts share an evaluator).
pub struct StarlarkWorkflowEngine {
    fs: Arc<dyn ReadableFs>,
    entry: String,
    registry: Arc<ActivityRegistry>,
}

impl StarlarkWorkflowEngine {
    pub fn new(fs: Arc<dyn ReadableFs>, entry: impl Into<String>, registry: ActivityRegistry) -> Self {
        Self {
            fs,
            entry: entry.into(),
            registry: Arc::new(registry),
        }
    }
}

impl WorkflowEngineTrait for StarlarkWorkflowEngine {
    fn exec(
        &self,
        ctx: &Context,
        history: &mut EventHistory,
        name: &str,
        args: &JsonValue,
    ) -> Result<JsonValue, WorkflowError> {
        let globals = globals();
        let loader = ScriptLoader::new(self.fs.as_ref(), &globals);
        let frozen = loader
            .load_module(&self.entry)
            .map_err(|e| WorkflowError::Script(e.to_string()))?;

        let main = frozen
            .get(name)
            .map_err(|_| WorkflowError::Script(format!("no top-level binding named {name:?}")))?;

        let module = Module::new();
        let extra = WorkflowExtra {
            ctx: ctx.clone(),
            history: RefCell::new(std::mem::take(history)),
            registry: self.registry.clone(),
            error: RefCell::new(None),
        };

        let result = {
            let mut eval = Evaluator::new(&module);
            eval.extra = Some(&extra);
            let heap = eval.heap();
            let arg_value = json_to_starlark(args, heap);
            eval.eval_function(main.value(), &[arg_value], &[])
                .map_err(|e| {
                    extra
                        .error
                        .borrow_mut()
                        .take()
                        .unwrap_or_else(|| WorkflowError::Script(e.to_string()))
                })
                .and_then(|v| starlark_to_json(v).map_err(|e| WorkflowError::Script(e.to_string())))
        };

        *history = extra.history.into_inner();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_fs::LocalFs;
    use anvil_paths::AbsoluteSystemPathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn write_script(dir: &std::path::Path, name: &str, source: &str) {
        std::fs::write(dir.join(name), source).unwrap();
    }

    #[test]
    fn main_calls_registered_activity_once_per_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        write_script(
            tmp.path(),
            "workflow.star",
            "def main(args):\n    return workflow.execactivity(\"double\", args[\"n\"])\n",
        );
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = Arc::new(LocalFs::new(root));

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let mut registry = ActivityRegistry::new();
        registry.register("double", move |_ctx, args| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            let n = args.as_i64().unwrap_or(0);
            Ok(serde_json::json!(n * 2))
        });

        let engine = StarlarkWorkflowEngine::new(fs, "workflow.star", registry);
        let ctx = Context::background();
        let mut history = EventHistory::new();

        let result = engine
            .exec(&ctx, &mut history, "main", &serde_json::json!({"n": 21}))
            .unwrap();
        assert_eq!(result, serde_json::json!(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        history.start();
        let replayed = engine
            .exec(&ctx, &mut history, "main", &serde_json::json!({"n": 21}))
            .unwrap();
        assert_eq!(replayed, serde_json::json!(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "replay must not re-invoke the activity");
    }

    #[test]
    fn module_globals_expose_own_path_and_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        write_script(
            &tmp.path().join("sub"),
            "workflow.star",
            "def main(args):\n    return {\"mod\": __anvil_mod__, \"dir\": __anvil_moddir__}\n",
        );
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = Arc::new(LocalFs::new(root));
        let engine = StarlarkWorkflowEngine::new(fs, "sub/workflow.star", ActivityRegistry::new());
        let ctx = Context::background();
        let mut history = EventHistory::new();

        let result = engine
            .exec(&ctx, &mut history, "main", &serde_json::json!({}))
            .unwrap();
        assert_eq!(
            result,
            serde_json::json!({"mod": "sub/workflow.star", "dir": "sub"})
        );
    }

    #[test]
    fn unregistered_activity_name_is_a_script_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_script(
            tmp.path(),
            "workflow.star",
            "def main(args):\n    return workflow.execactivity(\"missing\", 1)\n",
        );
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = Arc::new(LocalFs::new(root));
        let engine = StarlarkWorkflowEngine::new(fs, "workflow.star", ActivityRegistry::new());
        let ctx = Context::background();
        let mut history = EventHistory::new();

        let err = engine
            .exec(&ctx, &mut history, "main", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Script(_)));
    }
}
