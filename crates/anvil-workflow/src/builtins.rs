//! Built-in activity modules (spec §4.8): filesystem read/write, an HTTP
//! client, a template renderer, crypto helpers, and a thin Vault client.
//! Every call here is wrapped as an [`Activity`] by the caller before it
//! reaches the workflow engine, so scripts can never observe these side
//! effects outside the replay boundary.

use std::time::Duration;

use anvil_context::Context;
use anvil_paths::{AbsoluteSystemPathBuf, SlashPathBuf};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::activity::{Activity, ActivityError};

/// Sandboxed read/write access for the `fs` script module, rooted the same
/// way the output writer (component G) is, but permitting reads too since
/// workflow scripts may need to inspect previously written artifacts.
pub struct FsActivities {
    root: AbsoluteSystemPathBuf,
}

impl FsActivities {
    pub fn new(root: AbsoluteSystemPathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> Result<AbsoluteSystemPathBuf, ActivityError> {
        let slash = SlashPathBuf::parse(path).map_err(|e| ActivityError::Failed(e.to_string()))?;
        Ok(self.root.join_slash(slash.as_slash_path()))
    }

    pub fn read(&self, path: &str) -> FsReadActivity {
        FsReadActivity {
            path: path.to_owned(),
            root: self.root.clone(),
        }
    }

    pub fn write(&self, path: &str, contents: Vec<u8>) -> FsWriteActivity {
        FsWriteActivity {
            path: path.to_owned(),
            contents,
            root: self.root.clone(),
        }
    }
}

pub struct FsReadActivity {
    path: String,
    root: AbsoluteSystemPathBuf,
}

impl Activity for FsReadActivity {
    fn key(&self) -> String {
        format!("fs.read:{}", self.path)
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "path": self.path })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        let fs = FsActivities::new(self.root.clone());
        let abs = fs.resolve(&self.path)?;
        let bytes =
            std::fs::read(abs.as_path()).map_err(|e| ActivityError::Failed(e.to_string()))?;
        Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

pub struct FsWriteActivity {
    path: String,
    contents: Vec<u8>,
    root: AbsoluteSystemPathBuf,
}

impl Activity for FsWriteActivity {
    fn key(&self) -> String {
        format!("fs.write:{}", self.path)
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "path": self.path, "sha256": hex::encode(Sha256::digest(&self.contents)) })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        let fs = FsActivities::new(self.root.clone());
        let abs = fs.resolve(&self.path)?;
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent.as_path())
                .map_err(|e| ActivityError::Failed(e.to_string()))?;
        }
        std::fs::write(abs.as_path(), &self.contents)
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        Ok(Value::Null)
    }
}

/// `http.get`/`http.post`, bounded by a configured timeout (default 5s,
/// spec §5).
pub struct HttpGetActivity {
    pub url: String,
    pub timeout: Duration,
}

impl Activity for HttpGetActivity {
    fn key(&self) -> String {
        format!("http.get:{}", self.url)
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "url": self.url })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        let response = client
            .get(&self.url)
            .send()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        Ok(serde_json::json!({ "status": status, "body": body }))
    }
}

pub struct HttpPostActivity {
    pub url: String,
    pub body: String,
    pub timeout: Duration,
}

impl Activity for HttpPostActivity {
    fn key(&self) -> String {
        format!("http.post:{}", self.url)
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "url": self.url, "body": self.body })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        let response = client
            .post(&self.url)
            .body(self.body.clone())
            .send()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        Ok(serde_json::json!({ "status": status, "body": body }))
    }
}

/// `tmpl.render`: reuses the same `{{ key }}` substitution semantics as the
/// `gotmpl` config-engine kind (component D's built-in registrations)
/// rather than a second templating implementation.
pub struct TmplRenderActivity {
    pub template: String,
    pub args: Value,
}

impl Activity for TmplRenderActivity {
    fn key(&self) -> String {
        format!("tmpl.render:{:x}", Sha256::digest(self.template.as_bytes()))
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "template": self.template, "args": self.args })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        Ok(Value::String(render_gotmpl(&self.template, &self.args)))
    }
}

/// Minimal `{{ key }}` substitution against a flat JSON object. Kept
/// deliberately small (spec §1: a full template language is out of scope).
/// Shared by the `tmpl` workflow activity and the `gotmpl` config-engine
/// kind, so the two surfaces can never drift apart.
pub fn render_gotmpl(template: &str, args: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                let value = args
                    .get(key)
                    .map(value_to_plain_string)
                    .unwrap_or_default();
                out.push_str(&value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct Sha256HexActivity {
    pub input: String,
}

impl Activity for Sha256HexActivity {
    fn key(&self) -> String {
        format!("crypto.sha256hex:{:x}", Sha256::digest(self.input.as_bytes()))
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "input": self.input })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        Ok(Value::String(hex::encode(Sha256::digest(
            self.input.as_bytes(),
        ))))
    }
}

/// `randomHex` touches the RNG — an external-state source per §9 — so it is
/// itself an activity even though it performs no I/O.
pub struct RandomHexActivity {
    pub call_id: String,
    pub len: usize,
}

impl Activity for RandomHexActivity {
    fn key(&self) -> String {
        format!("crypto.randomHex:{}", self.call_id)
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "call_id": self.call_id, "len": self.len })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        use rand::RngCore;
        let mut bytes = vec![0u8; self.len];
        rand::thread_rng().fill_bytes(&mut bytes);
        Ok(Value::String(hex::encode(bytes)))
    }
}

/// A thin Vault client sufficient for the `secret vault` CLI subcommand
/// (spec §1, §6): full Vault API coverage is explicitly out of scope.
pub struct VaultClient {
    base_url: String,
    token: String,
    timeout: Duration,
}

impl VaultClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout,
        }
    }

    pub fn read(&self, path: &str) -> VaultReadActivity {
        VaultReadActivity {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            path: path.to_owned(),
            timeout: self.timeout,
        }
    }

    pub fn write_policy(&self, name: &str, body: Value) -> VaultWriteActivity {
        VaultWriteActivity {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            path: format!("sys/policies/acl/{name}"),
            kind: "policy",
            name: name.to_owned(),
            body,
            timeout: self.timeout,
        }
    }

    pub fn write_role(&self, name: &str, body: Value) -> VaultWriteActivity {
        VaultWriteActivity {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            path: format!("auth/approle/role/{name}"),
            kind: "role",
            name: name.to_owned(),
            body,
            timeout: self.timeout,
        }
    }
}

pub struct VaultReadActivity {
    base_url: String,
    token: String,
    path: String,
    timeout: Duration,
}

impl Activity for VaultReadActivity {
    fn key(&self) -> String {
        format!("vault.read:{}", self.path)
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "path": self.path })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        let response = client
            .get(format!("{}/v1/{}", self.base_url, self.path))
            .header("X-Vault-Token", &self.token)
            .send()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        response
            .json::<Value>()
            .map_err(|e| ActivityError::Failed(e.to_string()))
    }
}

pub struct VaultWriteActivity {
    base_url: String,
    token: String,
    path: String,
    kind: &'static str,
    name: String,
    body: Value,
    timeout: Duration,
}

impl Activity for VaultWriteActivity {
    fn key(&self) -> String {
        format!("vault.write.{}:{}", self.kind, self.name)
    }

    fn serialize(&self) -> Value {
        serde_json::json!({ "path": self.path, "body": self.body })
    }

    fn exec(&self, _ctx: &Context) -> Result<Value, ActivityError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        client
            .post(format!("{}/v1/{}", self.base_url, self.path))
            .header("X-Vault-Token", &self.token)
            .json(&self.body)
            .send()
            .map_err(|e| ActivityError::Failed(e.to_string()))?;
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_write_then_read_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs = FsActivities::new(root);
        let ctx = Context::background();

        fs.write("out/a.txt", b"hello".to_vec()).exec(&ctx).unwrap();
        let read = fs.read("out/a.txt").exec(&ctx).unwrap();
        assert_eq!(read, Value::String("hello".to_owned()));
    }

    #[test]
    fn gotmpl_substitutes_flat_keys() {
        let rendered = render_gotmpl(
            "Arg value: {{ a }} {{ b }} {{ c }}",
            &serde_json::json!({"a": "foo", "b": "bar", "c": "baz"}),
        );
        assert_eq!(rendered, "Arg value: foo bar baz");
    }

    #[test]
    fn gotmpl_leaves_unmatched_braces_alone() {
        let rendered = render_gotmpl("no braces here", &serde_json::json!({}));
        assert_eq!(rendered, "no braces here");
    }

    #[test]
    fn sha256hex_matches_known_vector() {
        let activity = Sha256HexActivity {
            input: String::new(),
        };
        let ctx = Context::background();
        let result = activity.exec(&ctx).unwrap();
        assert_eq!(
            result,
            Value::String(
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_owned()
            )
        );
    }
}
