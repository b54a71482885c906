//! Output writer (spec §4.7, component G): a write-only sandboxed
//! filesystem rooted at an output directory, plus `write_components`, which
//! renders every template emitted by the component resolver (component E)
//! through its own config engine (component D).

use std::{fs, io, io::Write};

use anvil_component::Component;
use anvil_context::Context;
use anvil_engine::{EngineCache, EngineError};
use anvil_paths::{AbsoluteSystemPathBuf, SlashPathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("invalid output path {0:?}: {1}")]
    InvalidPath(String, anvil_paths::PathError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A write-only view rooted at a real directory. Every path is validated as
/// a [`SlashPathBuf`] before touching the filesystem, so callers can never
/// escape the root via `..`.
pub struct OutputFs {
    root: AbsoluteSystemPathBuf,
}

impl OutputFs {
    pub fn new(root: AbsoluteSystemPathBuf) -> Self {
        Self { root }
    }

    /// Opens `name` for writing, creating parent directories (mode `0o777`
    /// before umask, matching standard Unix directory-creation semantics)
    /// when they don't already exist.
    pub fn open_file(&self, name: &str) -> Result<fs::File, OutputError> {
        let path = SlashPathBuf::parse(name)
            .map_err(|e| OutputError::InvalidPath(name.to_owned(), e))?;
        let abs = self.root.join_slash(path.as_slash_path());
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent.as_path())?;
        }
        Ok(fs::File::create(abs.as_path())?)
    }
}

/// Renders every template in every component, in the order E emitted them.
/// `dry_run` still evaluates each template (so determinism and engine
/// errors surface) but skips the actual write.
pub async fn write_components(
    ctx: &Context,
    engine_cache: &EngineCache,
    out: &OutputFs,
    components: &[Component],
    dry_run: bool,
) -> Result<(), OutputError> {
    for component in components {
        for template in &component.templates {
            let engine = engine_cache
                .get(ctx, &template.kind, &component.spec, &component.dir)
                .await?;
            let input_path = SlashPathBuf::parse(&template.path)
                .map_err(|e| OutputError::InvalidPath(template.path.clone(), e))?;
            let bytes = engine.exec(ctx, &input_path, &template.args)?;

            if dry_run {
                info!(output = %template.output, bytes = bytes.len(), "dry-run: skipping write");
                continue;
            }

            let mut file = out.open_file(&template.output)?;
            file.write_all(&bytes)?;
            info!(output = %template.output, bytes = bytes.len(), "wrote artifact");
        }
    }
    Ok(())
}
