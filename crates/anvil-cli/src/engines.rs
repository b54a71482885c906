//! Registers the reference engine-kind set (spec §4.4, §6): `jsonnet`,
//! `jsonnetstr`, `staticfile`, `gotmpl`.

use std::sync::Arc;

use anvil_context::Context;
use anvil_engine::{Builder, ConfigEngineInstance, EngineError, EngineRegistry};
use anvil_fs::ReadableFs;
use anvil_jsonnet::JsonnetBuilder;
use anvil_paths::SlashPathBuf;
use anvil_workflow::render_gotmpl;
use async_trait::async_trait;
use serde_json::Value;

struct StaticFileEngine {
    fs: Arc<dyn ReadableFs>,
}

impl ConfigEngineInstance for StaticFileEngine {
    fn exec(&self, _ctx: &Context, path: &SlashPathBuf, _args: &Value) -> Result<Vec<u8>, EngineError> {
        self.fs
            .read_file(path)
            .map_err(|e| EngineError::Build(e.to_string()))
    }
}

struct StaticFileBuilder;

#[async_trait]
impl Builder for StaticFileBuilder {
    async fn build(&self, fs: Arc<dyn ReadableFs>) -> Result<Arc<dyn ConfigEngineInstance>, EngineError> {
        Ok(Arc::new(StaticFileEngine { fs }))
    }
}

struct GoTmplEngine {
    fs: Arc<dyn ReadableFs>,
}

impl ConfigEngineInstance for GoTmplEngine {
    fn exec(&self, _ctx: &Context, path: &SlashPathBuf, args: &Value) -> Result<Vec<u8>, EngineError> {
        let bytes = self
            .fs
            .read_file(path)
            .map_err(|e| EngineError::Build(e.to_string()))?;
        let template = String::from_utf8_lossy(&bytes);
        Ok(render_gotmpl(&template, args).into_bytes())
    }
}

struct GoTmplBuilder;

#[async_trait]
impl Builder for GoTmplBuilder {
    async fn build(&self, fs: Arc<dyn ReadableFs>) -> Result<Arc<dyn ConfigEngineInstance>, EngineError> {
        Ok(Arc::new(GoTmplEngine { fs }))
    }
}

/// Builds a registry with every reference engine kind registered. Callers
/// that introduce a custom kind register it on the returned registry
/// directly (open for extension, per §9). `std_name` is the module name
/// Jsonnet sources `import` to reach the native helper bridge (component J's
/// `std_import_name` setting).
pub fn builtin_registry(std_name: &str) -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    registry.register("jsonnet", Arc::new(JsonnetBuilder::new(std_name, false)));
    registry.register("jsonnetstr", Arc::new(JsonnetBuilder::new(std_name, true)));
    registry.register("staticfile", Arc::new(StaticFileBuilder));
    registry.register("gotmpl", Arc::new(GoTmplBuilder));
    registry
}
