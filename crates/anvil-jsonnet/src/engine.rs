//! The Jsonnet-based [`ConfigEngineInstance`]/[`Builder`] pair (spec §4.6).

use std::sync::Arc;

use anvil_context::Context;
use anvil_engine::{Builder, ConfigEngineInstance, EngineError};
use anvil_fs::ReadableFs;
use anvil_mergepatch::merge_patch;
use anvil_paths::SlashPathBuf;
use async_trait::async_trait;
use jrsonnet_evaluator::{
    error::{Error as JrError, ErrorKind},
    function::builtin,
    trace::CompactFormat,
    IStr, State, Val,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::import::FsImportResolver;

#[derive(Debug, Error)]
pub enum JsonnetError {
    #[error("invalid import {0:?}")]
    InvalidImport(String),
    #[error("jsonnet evaluation failed: {0}")]
    ConfigEval(String),
}

impl From<JsonnetError> for EngineError {
    fn from(e: JsonnetError) -> Self {
        EngineError::Build(e.to_string())
    }
}

#[builtin]
fn anvil_json_merge_patch(a: Val, b: Val) -> Result<Val, JrError> {
    let a_json = val_to_json(&a)?;
    let b_json = val_to_json(&b)?;
    json_to_val(&merge_patch(&a_json, &b_json))
}

#[builtin]
fn anvil_yaml_unmarshal(s: IStr) -> Result<Val, JrError> {
    let value: Value = serde_yaml::from_str(&s)
        .map_err(|e| ErrorKind::RuntimeError(e.to_string().into()))?;
    json_to_val(&value)
}

#[builtin]
fn anvil_sha256hex(s: IStr) -> Result<IStr, JrError> {
    Ok(IStr::from(hex::encode(Sha256::digest(s.as_bytes()))))
}

/// Bridges a `Val` to `serde_json::Value` via Jsonnet's own JSON
/// manifestation (`std.manifestJsonEx`), rather than walking `Val`'s
/// variants by hand — the manifested text is parsed with `serde_json` just
/// like any other JSON source.
fn val_to_json(val: &Val) -> Result<Value, JrError> {
    let state = State::default();
    state.settings_mut().globals.insert(
        "__anvil_bridge_input".into(),
        jrsonnet_evaluator::Thunk::evaluated(val.clone()),
    );
    let manifested = state.evaluate_snippet(
        "<bridge>",
        "std.manifestJsonEx(__anvil_bridge_input, \"\")",
    )?;
    let text = manifested
        .as_str()
        .ok_or_else(|| ErrorKind::RuntimeError("expected a string from manifestJsonEx".into()))?;
    serde_json::from_str(&text).map_err(|e| ErrorKind::RuntimeError(e.to_string().into()).into())
}

fn json_to_val(value: &Value) -> Result<Val, JrError> {
    let state = State::default();
    state.with_stdlib();
    let text = serde_json::to_string(value)
        .map_err(|e| ErrorKind::RuntimeError(e.to_string().into()))?;
    state.evaluate_snippet("<bridge>", &text)
}

fn new_state(fs: Arc<dyn ReadableFs>, std_name: &str) -> State {
    let state = State::default();
    state.with_stdlib();
    state.set_import_resolver(Box::new(FsImportResolver::new(fs, std_name.to_owned())));
    state.set_trace_format(Box::new(CompactFormat::default()));
    state
        .settings_mut()
        .globals
        .insert("anvil_jsonMergePatch".into(), anvil_json_merge_patch::INSTANCE.into());
    state
        .settings_mut()
        .globals
        .insert("anvil_yamlUnmarshal".into(), anvil_yaml_unmarshal::INSTANCE.into());
    state
        .settings_mut()
        .globals
        .insert("anvil_sha256hex".into(), anvil_sha256hex::INSTANCE.into());
    state
}

/// One evaluation environment bound to a fetched Jsonnet source tree. Each
/// `exec` call builds a fresh [`State`] so that its import cache and its
/// `getargs()` binding are scoped to that single evaluation, per §4.6's
/// "cached ... within one evaluation" wording.
pub struct JsonnetEngine {
    fs: Arc<dyn ReadableFs>,
    std_name: String,
    string_output: bool,
}

impl JsonnetEngine {
    pub fn new(fs: Arc<dyn ReadableFs>, std_name: impl Into<String>, string_output: bool) -> Self {
        Self {
            fs,
            std_name: std_name.into(),
            string_output,
        }
    }
}

impl ConfigEngineInstance for JsonnetEngine {
    fn exec(
        &self,
        _ctx: &Context,
        path: &SlashPathBuf,
        args: &Value,
    ) -> Result<Vec<u8>, EngineError> {
        let state = new_state(self.fs.clone(), &self.std_name);
        let args_val = json_to_val(args).map_err(|e| JsonnetError::ConfigEval(e.to_string()))?;
        state
            .settings_mut()
            .globals
            .insert("__anvil_args".into(), jrsonnet_evaluator::Thunk::evaluated(args_val));

        let bytes = self
            .fs
            .read_file(path)
            .map_err(|e| EngineError::Build(e.to_string()))?;
        let source = String::from_utf8_lossy(&bytes).into_owned();

        let result = state
            .evaluate_snippet(path.as_str().to_owned(), &source)
            .map_err(|e| JsonnetError::ConfigEval(e.to_string()))?;

        if self.string_output {
            let s = result
                .as_str()
                .ok_or_else(|| JsonnetError::ConfigEval("top-level value is not a string".into()))?;
            Ok(s.as_bytes().to_vec())
        } else {
            let json = val_to_json(&result).map_err(|e| JsonnetError::ConfigEval(e.to_string()))?;
            let mut text = serde_json::to_string(&json)
                .map_err(|e| JsonnetError::ConfigEval(e.to_string()))?;
            text.push('\n');
            Ok(text.into_bytes())
        }
    }
}

pub struct JsonnetBuilder {
    std_name: String,
    string_output: bool,
}

impl JsonnetBuilder {
    pub fn new(std_name: impl Into<String>, string_output: bool) -> Self {
        Self {
            std_name: std_name.into(),
            string_output,
        }
    }
}

#[async_trait]
impl Builder for JsonnetBuilder {
    async fn build(
        &self,
        fs: Arc<dyn ReadableFs>,
    ) -> Result<Arc<dyn ConfigEngineInstance>, EngineError> {
        Ok(Arc::new(JsonnetEngine::new(
            fs,
            self.std_name.clone(),
            self.string_output,
        )))
    }
}

/// The default std-import name, per §4.6.
pub const DEFAULT_STD_NAME: &str = "anvil:std";
