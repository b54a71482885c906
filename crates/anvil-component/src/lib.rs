//! Component-tree resolver (spec §4.5, component E): recursively evaluates
//! component manifests into an ordered, post-order list of materialized
//! [`Component`] values.

use std::{future::Future, pin::Pin};

use anvil_context::Context;
use anvil_engine::{ConfigEngineInstance, EngineCache, EngineError};
use anvil_mergepatch::merge_patch;
use anvil_repository::{RepoError, Spec, SpecRegistry};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("import cycle: {0}")]
    ImportCycle(String),
    #[error("invalid component manifest: {0}")]
    InvalidManifest(String),
    #[error("invalid repo path: {0}")]
    InvalidRepoPath(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// The raw shape a config engine produces when it evaluates a component's
/// manifest file (spec §3).
#[derive(Debug, Deserialize)]
pub struct ComponentManifest {
    pub version: Value,
    #[serde(default)]
    pub templates: Vec<TemplateManifest>,
    #[serde(default)]
    pub components: Vec<ChildManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateManifest {
    pub kind: String,
    pub path: String,
    #[serde(default)]
    pub args: Value,
    pub output: String,
}

#[derive(Debug, Deserialize)]
pub struct ChildManifest {
    pub path: RepoPathInput,
    #[serde(default)]
    pub args: Value,
}

/// A child's raw `RepoPath` as it appears in a manifest. `repo` absent means
/// "inherit the parent's repo spec" (spec §4.5 step 5; see DESIGN.md for how
/// this implementation reads the spec's "kind == local" wording).
#[derive(Debug, Deserialize)]
pub struct RepoPathInput {
    /// Engine kind used to evaluate this child's own manifest.
    pub kind: String,
    #[serde(default)]
    pub repo: Option<RepoRef>,
    pub dir: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RepoRef {
    /// Repo kind (`localdir`, `git`, ...), passed to [`SpecRegistry::parse`].
    pub kind: String,
    pub spec: Value,
}

/// A fully resolved `RepoPath`: identity is `(spec.string(), dir, name)` per
/// spec §3 ("RepoPath identity = (spec, dir, name)").
#[derive(Clone)]
struct ResolvedRepoPath {
    engine_kind: String,
    spec: Spec,
    dir: String,
    name: String,
}

impl ResolvedRepoPath {
    fn key(&self) -> String {
        format!("{}::{}::{}", self.spec.string(), self.dir, self.name)
    }
}

/// One materialized component, ready for the output writer (component G) to
/// render. `spec`/`dir` let G re-resolve each template's own engine kind
/// against the same repo location the manifest was evaluated from.
pub struct Component {
    pub spec: Spec,
    pub dir: String,
    pub name: String,
    pub templates: Vec<TemplateManifest>,
    pub args: Value,
}

pub struct RootPath {
    pub engine_kind: String,
    pub spec: Spec,
    pub dir: String,
    pub name: String,
}

/// Resolves the whole component tree rooted at `root`, returning components
/// in post-order (children before parents). `patch` is merged into the
/// root's otherwise-empty args; children receive args from their manifest
/// entry directly, as the spec defines no patch propagation below the root.
pub async fn resolve(
    ctx: &Context,
    engine_cache: &EngineCache,
    spec_registry: &SpecRegistry,
    root: RootPath,
    patch: Option<Value>,
) -> Result<Vec<Component>, ComponentError> {
    let root_args = match patch {
        Some(p) => merge_patch(&Value::Object(Default::default()), &p),
        None => Value::Object(Default::default()),
    };
    let resolved = ResolvedRepoPath {
        engine_kind: root.engine_kind,
        spec: root.spec,
        dir: root.dir,
        name: root.name,
    };
    let mut ancestors = Vec::new();
    let mut out = Vec::new();
    walk(
        ctx,
        engine_cache,
        spec_registry,
        resolved,
        root_args,
        &mut ancestors,
        &mut out,
    )
    .await?;
    Ok(out)
}

fn walk<'a>(
    ctx: &'a Context,
    engine_cache: &'a EngineCache,
    spec_registry: &'a SpecRegistry,
    path: ResolvedRepoPath,
    args: Value,
    ancestors: &'a mut Vec<String>,
    out: &'a mut Vec<Component>,
) -> Pin<Box<dyn Future<Output = Result<(), ComponentError>> + Send + 'a>> {
    Box::pin(async move {
        let key = path.key();
        if ancestors.iter().any(|a| a == &key) {
            let chain = ancestors.join(" -> ");
            return Err(ComponentError::ImportCycle(format!("{chain} -> {key}")));
        }
        ancestors.push(key);

        let engine: std::sync::Arc<dyn ConfigEngineInstance> = engine_cache
            .get(ctx, &path.engine_kind, &path.spec, &path.dir)
            .await?;
        let entry_path = anvil_paths::SlashPathBuf::parse(&path.name)
            .map_err(|e| ComponentError::InvalidRepoPath(e.to_string()))?;
        let bytes = engine.exec(ctx, &entry_path, &args)?;
        let manifest: ComponentManifest = serde_json::from_slice(&bytes)
            .map_err(|e| ComponentError::InvalidManifest(e.to_string()))?;

        debug!(component = %path.name, children = manifest.components.len(), "evaluated component manifest");

        for child in &manifest.components {
            let child_spec = match &child.path.repo {
                Some(repo_ref) => {
                    let bytes = serde_json::to_vec(&repo_ref.spec)
                        .map_err(|e| ComponentError::InvalidRepoPath(e.to_string()))?;
                    spec_registry.parse(&repo_ref.kind, &bytes)?
                }
                None => path.spec.clone(),
            };
            let child_path = ResolvedRepoPath {
                engine_kind: child.path.kind.clone(),
                spec: child_spec,
                dir: child.path.dir.clone(),
                name: child.path.name.clone(),
            };
            walk(
                ctx,
                engine_cache,
                spec_registry,
                child_path,
                child.args.clone(),
                ancestors,
                out,
            )
            .await?;
        }

        ancestors.pop();
        out.push(Component {
            spec: path.spec,
            dir: path.dir,
            name: path.name,
            templates: manifest.templates,
            args,
        });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anvil_fs::ReadableFs;
    use anvil_repository::{FetchCache, LocalDirFetcher};
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct FixedEngine {
        bodies: std::collections::HashMap<String, Vec<u8>>,
    }

    impl ConfigEngineInstance for FixedEngine {
        fn exec(
            &self,
            _ctx: &Context,
            path: &anvil_paths::SlashPathBuf,
            _args: &Value,
        ) -> Result<Vec<u8>, EngineError> {
            Ok(self
                .bodies
                .get(path.as_str())
                .cloned()
                .unwrap_or_else(|| b"{\"version\":1}".to_vec()))
        }
    }

    struct FixedBuilder {
        bodies: std::collections::HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl anvil_engine::Builder for FixedBuilder {
        async fn build(
            &self,
            _fs: Arc<dyn ReadableFs>,
        ) -> Result<Arc<dyn ConfigEngineInstance>, EngineError> {
            Ok(Arc::new(FixedEngine {
                bodies: self.bodies.clone(),
            }))
        }
    }

    fn setup(bodies: std::collections::HashMap<String, Vec<u8>>) -> (tempfile::TempDir, EngineCache, SpecRegistry, Spec) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("root")).unwrap();
        let base = anvil_paths::AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fetcher = Arc::new(LocalDirFetcher::new(base));
        let fetch_cache = Arc::new(FetchCache::new(fetcher));
        let mut registry = anvil_engine::EngineRegistry::new();
        registry.register("fixed", Arc::new(FixedBuilder { bodies }));
        let engine_cache = EngineCache::new(registry, fetch_cache);
        let spec_registry = SpecRegistry::new();
        let spec = spec_registry
            .parse("localdir", br#"{"dir": "root"}"#)
            .unwrap();
        (tmp, engine_cache, spec_registry, spec)
    }

    #[tokio::test]
    async fn single_component_emits_its_templates() {
        let mut bodies = std::collections::HashMap::new();
        bodies.insert(
            "config.jsonnet".to_owned(),
            serde_json::to_vec(&json!({
                "version": 1,
                "templates": [{"kind": "jsonnetstr", "path": "foo.txt", "args": {}, "output": "anvil_out/foo.txt"}],
                "components": []
            }))
            .unwrap(),
        );
        let (_tmp, engine_cache, spec_registry, spec) = setup(bodies);
        let ctx = Context::background();

        let root = RootPath {
            engine_kind: "fixed".to_owned(),
            spec,
            dir: String::new(),
            name: "config.jsonnet".to_owned(),
        };
        let components = resolve(&ctx, &engine_cache, &spec_registry, root, None)
            .await
            .unwrap();

        assert_eq!(components.len(), 1);
        assert_eq!(components[0].templates.len(), 1);
        assert_eq!(components[0].templates[0].output, "anvil_out/foo.txt");
    }

    #[tokio::test]
    async fn nested_child_emits_before_parent() {
        let mut bodies = std::collections::HashMap::new();
        bodies.insert(
            "root.jsonnet".to_owned(),
            serde_json::to_vec(&json!({
                "version": 1,
                "templates": [{"kind": "jsonnetstr", "path": "foo.txt", "args": {}, "output": "anvil_out/foo.txt"}],
                "components": [{
                    "path": {"kind": "fixed", "dir": "subcomp", "name": "child.jsonnet"},
                    "args": {"output": "anvil_out/bar"}
                }]
            }))
            .unwrap(),
        );
        bodies.insert(
            "child.jsonnet".to_owned(),
            serde_json::to_vec(&json!({
                "version": 1,
                "templates": [{"kind": "jsonnetstr", "path": "baz.txt", "args": {}, "output": "anvil_out/bar/baz.txt"}],
                "components": []
            }))
            .unwrap(),
        );
        let (_tmp, engine_cache, spec_registry, spec) = setup(bodies);
        let ctx = Context::background();

        let root = RootPath {
            engine_kind: "fixed".to_owned(),
            spec,
            dir: String::new(),
            name: "root.jsonnet".to_owned(),
        };
        let components = resolve(&ctx, &engine_cache, &spec_registry, root, None)
            .await
            .unwrap();

        assert_eq!(components.len(), 2);
        assert_eq!(components[0].templates[0].output, "anvil_out/bar/baz.txt");
        assert_eq!(components[1].templates[0].output, "anvil_out/foo.txt");
    }

    #[tokio::test]
    async fn self_cycle_is_an_error() {
        let mut bodies = std::collections::HashMap::new();
        bodies.insert(
            "a.jsonnet".to_owned(),
            serde_json::to_vec(&json!({
                "version": 1,
                "templates": [],
                "components": [{
                    "path": {"kind": "fixed", "dir": "", "name": "a.jsonnet"},
                    "args": {}
                }]
            }))
            .unwrap(),
        );
        let (_tmp, engine_cache, spec_registry, spec) = setup(bodies);
        let ctx = Context::background();

        let root = RootPath {
            engine_kind: "fixed".to_owned(),
            spec,
            dir: String::new(),
            name: "a.jsonnet".to_owned(),
        };
        let err = resolve(&ctx, &engine_cache, &spec_registry, root, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::ImportCycle(_)));
    }

    #[tokio::test]
    async fn patch_seeds_root_args() {
        let mut bodies = std::collections::HashMap::new();
        bodies.insert(
            "root.jsonnet".to_owned(),
            serde_json::to_vec(&json!({"version": 1, "templates": [], "components": []})).unwrap(),
        );
        let (_tmp, engine_cache, spec_registry, spec) = setup(bodies);
        let ctx = Context::background();

        let root = RootPath {
            engine_kind: "fixed".to_owned(),
            spec,
            dir: String::new(),
            name: "root.jsonnet".to_owned(),
        };
        let components = resolve(
            &ctx,
            &engine_cache,
            &spec_registry,
            root,
            Some(json!({"msg": "hello"})),
        )
        .await
        .unwrap();
        assert_eq!(components[0].args, json!({"msg": "hello"}));
    }
}
