//! A Jsonnet-based config engine (spec component F, §4.6): a rooted
//! importer, a synthesized `anvil:std` module, and a handful of native
//! helpers Jsonnet's own standard library has no equivalent for
//! (`jsonMergePatch`, `yamlUnmarshal`, `sha256hex`).
#![deny(clippy::all)]

mod engine;
mod import;

pub use engine::{JsonnetBuilder, JsonnetEngine, JsonnetError, DEFAULT_STD_NAME};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anvil_context::Context;
    use anvil_engine::ConfigEngineInstance;
    use anvil_fs::LocalFs;
    use anvil_paths::{AbsoluteSystemPathBuf, SlashPathBuf};

    use super::*;

    fn write_script(dir: &std::path::Path, name: &str, source: &str) {
        std::fs::write(dir.join(name), source).unwrap();
    }

    #[test]
    fn evaluates_plain_json_object() {
        let tmp = tempfile::tempdir().unwrap();
        write_script(tmp.path(), "config.jsonnet", "{ a: 1, b: \"two\" }");
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = Arc::new(LocalFs::new(root));

        let engine = JsonnetEngine::new(fs, DEFAULT_STD_NAME, false);
        let ctx = Context::background();
        let path = SlashPathBuf::parse("config.jsonnet").unwrap();
        let bytes = engine.exec(&ctx, &path, &serde_json::json!({})).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, serde_json::json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn string_output_mode_returns_raw_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        write_script(
            tmp.path(),
            "foo.jsonnet",
            "local std_ = import \"anvil:std\"; \"Greetings. \" + std_.getargs().msg",
        );
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = Arc::new(LocalFs::new(root));

        let engine = JsonnetEngine::new(fs, DEFAULT_STD_NAME, true);
        let ctx = Context::background();
        let path = SlashPathBuf::parse("foo.jsonnet").unwrap();
        let bytes = engine
            .exec(&ctx, &path, &serde_json::json!({"msg": "hello, world"}))
            .unwrap();
        assert_eq!(bytes, b"Greetings. hello, world");
    }

    #[test]
    fn json_merge_patch_native_matches_rust_implementation() {
        let tmp = tempfile::tempdir().unwrap();
        write_script(
            tmp.path(),
            "patch.jsonnet",
            "local std_ = import \"anvil:std\"; std_.jsonMergePatch({a: \"b\", c: {d: \"e\", f: \"g\"}}, {a: \"z\", c: {f: null}})",
        );
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = Arc::new(LocalFs::new(root));

        let engine = JsonnetEngine::new(fs, DEFAULT_STD_NAME, false);
        let ctx = Context::background();
        let path = SlashPathBuf::parse("patch.jsonnet").unwrap();
        let bytes = engine.exec(&ctx, &path, &serde_json::json!({})).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, serde_json::json!({"a": "z", "c": {"d": "e"}}));
    }

    #[test]
    fn import_escaping_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_script(tmp.path(), "main.jsonnet", "import \"../escape.jsonnet\"");
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = Arc::new(LocalFs::new(root));

        let engine = JsonnetEngine::new(fs, DEFAULT_STD_NAME, false);
        let ctx = Context::background();
        let path = SlashPathBuf::parse("main.jsonnet").unwrap();
        let err = engine.exec(&ctx, &path, &serde_json::json!({})).unwrap_err();
        assert!(err.to_string().contains("invalid import"));
    }

    #[test]
    fn rooted_import_resolves_against_fs_root() {
        let tmp = tempfile::tempdir().unwrap();
        write_script(tmp.path(), "lib.jsonnet", "{ greeting: \"hi\" }");
        write_script(tmp.path(), "main.jsonnet", "(import \"/lib.jsonnet\").greeting");
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = Arc::new(LocalFs::new(root));

        let engine = JsonnetEngine::new(fs, DEFAULT_STD_NAME, true);
        let ctx = Context::background();
        let path = SlashPathBuf::parse("main.jsonnet").unwrap();
        let bytes = engine.exec(&ctx, &path, &serde_json::json!({})).unwrap();
        assert_eq!(bytes, b"hi");
    }
}
