use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// One embedded schema: repo-relative path, body digest, body.
struct Schema {
    path: String,
    sha256: String,
    body: String,
}

fn main() {
    let manifest_dir =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let repo_root = manifest_dir
        .ancestors()
        .nth(2)
        .expect("repo root")
        .to_path_buf();
    let contracts_dir = repo_root.join("contracts/v1");
    println!("cargo:rerun-if-changed={}", contracts_dir.display());

    let schemas: Vec<Schema> = schema_files(&contracts_dir)
        .into_iter()
        .map(|path| load_schema(&repo_root, &path))
        .collect();

    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let out = render(&schemas, &set_digest(&schemas), &generated_at);

    let out_path = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR"));
    fs::write(out_path.join("generated_contracts.rs"), out).expect("write generated_contracts.rs");
}

fn schema_files(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .expect("read contracts/v1")
        .filter_map(|entry| entry.ok().map(|v| v.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(".schema.json"))
        })
        .collect();
    paths.sort();
    paths
}

fn load_schema(repo_root: &Path, path: &Path) -> Schema {
    println!("cargo:rerun-if-changed={}", path.display());
    let body = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read schema {}: {e}", path.display()));
    // Keyed like "contracts/v1/form_definition.schema.json".
    let relative = path
        .strip_prefix(repo_root)
        .unwrap_or_else(|e| panic!("{} is outside the repo: {e}", path.display()));
    Schema {
        path: relative.to_string_lossy().replace('\\', "/"),
        sha256: hex(Sha256::digest(body.as_bytes())),
        body,
    }
}

/// Digest over every `(path, body)` pair, NUL separated, in path order.
fn set_digest(schemas: &[Schema]) -> String {
    let hasher = schemas.iter().fold(Sha256::new(), |hasher, schema| {
        hasher
            .chain_update(schema.path.as_bytes())
            .chain_update([0])
            .chain_update(schema.body.as_bytes())
            .chain_update([0])
    });
    hex(hasher.finalize())
}

fn hex(digest: impl AsRef<[u8]>) -> String {
    digest
        .as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

fn render(schemas: &[Schema], set_sha256: &str, generated_at: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "pub const GENERATED_CONTRACTS_SET_SHA256: &str = {set_sha256:?};");
    let _ = writeln!(out, "pub const GENERATED_AT_RFC3339: &str = {generated_at:?};");
    out.push_str("pub const GENERATED_CONTRACT_SCHEMAS: &[(&str, &str, &str)] = &[\n");
    for schema in schemas {
        let _ = writeln!(
            out,
            "    ({:?}, {:?}, {:?}),",
            schema.path, schema.sha256, schema.body
        );
    }
    out.push_str("];\n");
    out
}
