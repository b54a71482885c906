//! The rooted importer (spec §4.6): `/`-prefixed imports resolve against the
//! engine's filesystem root, everything else against the importing file's
//! own directory. Resolved paths are validated the same way every other
//! manifest-sourced path is (`SlashPathBuf`, no `..` escape), and file bytes
//! are cached per resolved path for the lifetime of one evaluation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anvil_fs::ReadableFs;
use anvil_paths::SlashPathBuf;
use jrsonnet_evaluator::{
    error::{Error as JrError, ErrorKind},
    IStr, ImportResolver,
};
use jrsonnet_parser::SourcePath;

use crate::engine::JsonnetError;

/// Synthesized module returned for the configured std-import name, exposing
/// the native helpers as plain jsonnet bindings (spec §4.6).
pub(crate) const STD_MODULE_SOURCE: &str = r#"
{
  getargs():: __anvil_args,
  jsonMarshal(v):: std.manifestJsonEx(v, ""),
  jsonUnmarshal(s):: std.parseJson(s),
  jsonMergePatch(a, b):: anvil_jsonMergePatch(a, b),
  yamlMarshal(v):: std.manifestYamlDoc(v),
  yamlUnmarshal(s):: anvil_yamlUnmarshal(s),
  pathJoin(parts):: std.join("/", parts),
  sha256hex(s):: anvil_sha256hex(s),
}
"#;

pub(crate) struct FsImportResolver {
    fs: Arc<dyn ReadableFs>,
    std_name: String,
    cache: Mutex<HashMap<String, Option<Vec<u8>>>>,
}

impl FsImportResolver {
    pub(crate) fn new(fs: Arc<dyn ReadableFs>, std_name: impl Into<String>) -> Self {
        Self {
            fs,
            std_name: std_name.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn resolved_path(&self, from_dir: &str, path: &str) -> Result<String, JrError> {
        let joined = if let Some(stripped) = path.strip_prefix('/') {
            stripped.to_owned()
        } else if from_dir.is_empty() {
            path.to_owned()
        } else {
            format!("{from_dir}/{path}")
        };
        SlashPathBuf::parse_cleaning(&joined).map(|p| p.as_str().to_owned()).map_err(|_| {
            ErrorKind::RuntimeError(JsonnetError::InvalidImport(path.to_owned()).to_string().into()).into()
        })
    }
}

impl ImportResolver for FsImportResolver {
    fn resolve_from(&self, from: &SourcePath, path: &str) -> Result<SourcePath, JrError> {
        if path == self.std_name {
            return Ok(SourcePath::new_virtual(Arc::from(self.std_name.as_str())));
        }
        let from_dir = from
            .path()
            .and_then(|p| p.parent())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let resolved = self.resolved_path(&from_dir, path)?;
        Ok(SourcePath::new(resolved.into()))
    }

    fn load_file_contents(&self, resolved: &SourcePath) -> Result<IStr, JrError> {
        let key = resolved.to_string();
        if key.ends_with(&self.std_name) {
            return Ok(IStr::from(STD_MODULE_SOURCE));
        }

        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return match cached {
                Some(bytes) => Ok(IStr::from(String::from_utf8_lossy(bytes).into_owned())),
                None => Err(ErrorKind::ImportFileNotFound(resolved.clone()).into()),
            };
        }

        let slash = SlashPathBuf::parse(key.trim_start_matches('/'))
            .map_err(|_| ErrorKind::ImportFileNotFound(resolved.clone()))?;
        match self.fs.read_file(&slash) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.cache
                    .lock()
                    .unwrap()
                    .insert(key, Some(bytes));
                Ok(IStr::from(text))
            }
            Err(_) => {
                self.cache.lock().unwrap().insert(key, None);
                Err(ErrorKind::ImportFileNotFound(resolved.clone()).into())
            }
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
