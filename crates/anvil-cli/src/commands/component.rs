//! `anvil component`: resolves a component tree rooted at a local manifest
//! and renders every template it emits (spec §6, scenarios 1, 2, 6, 8).

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
};

use anvil_component::RootPath;
use anvil_context::Context;
use anvil_engine::EngineCache;
use anvil_output::OutputFs;
use anvil_paths::AbsoluteSystemPathBuf;
use anvil_repository::{FetchCache, GitFetcher, LocalDirFetcher, SpecRegistry, SystemGitCmd};
use clap::Args;
use serde_json::Value;

use crate::{engines, error::CliError, fetcher::DispatchFetcher, settings::Settings};

/// Repo kinds exempt from integrity checking (spec §4.3): a local directory
/// is already on disk rather than fetched, so there's nothing to pin.
const LOCAL_KINDS: [&str; 1] = ["localdir"];

#[derive(Debug, Args)]
pub struct ComponentArgs {
    /// Directory the root component tree is resolved from.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,
    /// Directory artifacts are written to.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,
    /// Overrides `cache.root` for this invocation only.
    #[arg(short = 'c', long = "cache")]
    cache: Option<PathBuf>,
    /// Fail instead of cloning a git repo that isn't already cached.
    #[arg(long)]
    no_network: bool,
    /// Discard and re-clone any cached git checkout before resolving.
    #[arg(long)]
    force_fetch: bool,
    /// Evaluate every template but skip writing its output.
    #[arg(long)]
    dry_run: bool,
    /// Writes the resolved fetch-cache checksums to this path as JSON.
    #[arg(long = "repo-sum")]
    repo_sum: Option<PathBuf>,
    /// Pinned checksums (the `--repo-sum` format) to verify fetched repos
    /// against; a mismatch fails with `InvalidCache`.
    #[arg(long = "checksums")]
    checksums: Option<PathBuf>,
    /// Engine kind used to evaluate the root manifest.
    #[arg(long, default_value = "jsonnet")]
    engine: String,
    /// Entry file, relative to `input`, the root manifest is read from.
    #[arg(long, default_value = "config.jsonnet")]
    entry: String,
}

pub async fn run(ctx: &Context, settings: &Settings, args: ComponentArgs) -> Result<(), CliError> {
    let input = AbsoluteSystemPathBuf::new(std::fs::canonicalize(&args.input)?)?;
    let output = args.output.clone();
    std::fs::create_dir_all(&output)?;
    let output = AbsoluteSystemPathBuf::new(std::fs::canonicalize(&output)?)?;

    let cache_root = match &args.cache {
        Some(path) => path.clone(),
        None => PathBuf::from(&settings.cache.root),
    };
    std::fs::create_dir_all(&cache_root)?;
    let cache_root = AbsoluteSystemPathBuf::new(std::fs::canonicalize(&cache_root)?)?;

    let local_fetcher = LocalDirFetcher::new(input.clone());
    let git_fetcher = GitFetcher::new(
        cache_root,
        args.no_network,
        args.force_fetch,
        Arc::new(SystemGitCmd),
    );
    let fetcher: Arc<dyn anvil_repository::Fetcher> =
        Arc::new(DispatchFetcher::new(local_fetcher, git_fetcher));

    let local_kinds: HashSet<String> = LOCAL_KINDS.iter().map(|s| s.to_string()).collect();
    let checksums = read_checksums(args.checksums.as_deref())?;
    let fetch_cache = Arc::new(FetchCache::with_checksums(fetcher, local_kinds, checksums));

    let spec_registry = SpecRegistry::new();
    let root_spec = spec_registry.parse("localdir", br#"{"dir": ""}"#)?;

    let engine_registry = engines::builtin_registry(&settings.std_import_name.0);
    let engine_cache = EngineCache::new(engine_registry, fetch_cache.clone());

    let root = RootPath {
        engine_kind: args.engine,
        spec: root_spec,
        dir: String::new(),
        name: args.entry,
    };
    let components = anvil_component::resolve(ctx, &engine_cache, &spec_registry, root, None::<Value>).await?;

    let out_fs = OutputFs::new(output);
    anvil_output::write_components(ctx, &engine_cache, &out_fs, &components, args.dry_run).await?;

    if let Some(repo_sum_path) = &args.repo_sum {
        let mut sums: Vec<_> = fetch_cache.sums().into_iter().collect();
        sums.sort_by(|a, b| a.0.cmp(&b.0));
        let entries: Vec<Value> = sums
            .into_iter()
            .map(|(key, sum)| serde_json::json!({ "key": key, "sum": sum }))
            .collect();
        let body = serde_json::to_vec_pretty(&entries).map_err(|e| CliError::Usage(e.to_string()))?;
        std::fs::write(repo_sum_path, body)?;
    }

    Ok(())
}

/// Reads a `--repo-sum`-shaped checksum file (an array of `{key, sum}`
/// entries) into the pinned-checksum table `FetchCache` verifies against.
fn read_checksums(path: Option<&std::path::Path>) -> Result<HashMap<String, String>, CliError> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let bytes = std::fs::read(path)?;
    let entries: Vec<Value> =
        serde_json::from_slice(&bytes).map_err(|e| CliError::Usage(format!("{}: {e}", path.display())))?;

    entries
        .into_iter()
        .map(|entry| {
            let key = entry
                .get("key")
                .and_then(Value::as_str)
                .ok_or_else(|| CliError::Usage(format!("{}: entry missing string \"key\"", path.display())))?
                .to_owned();
            let sum = entry
                .get("sum")
                .and_then(Value::as_str)
                .ok_or_else(|| CliError::Usage(format!("{}: entry missing string \"sum\"", path.display())))?
                .to_owned();
            Ok((key, sum))
        })
        .collect()
}
