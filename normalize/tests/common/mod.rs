use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use normalize::config::{DestinationCapabilities, NormalizeConfiguration};
use normalize::driver::{Driver, RunMetrics};
use normalize::pool::{InlinePool, Pool, RayonPool};

///
/// A fresh `extracted/`, `load/`, `schemas/` layout under
/// `CARGO_TARGET_TMPDIR`, matching the on-disk layout `FsNormalizeStorage`/
/// `FsLoadStorage`/`FsSchemaStorage` expect (§6).
///
pub fn init_base_dir(folder: &str) -> PathBuf {
    let _ = env_logger::builder().is_test(true).try_init();

    let base_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join(folder);
    let _ = fs::remove_dir_all(&base_dir);
    fs::create_dir_all(base_dir.join("extracted")).expect("cannot create extracted/");
    fs::create_dir_all(base_dir.join("load")).expect("cannot create load/");
    fs::create_dir_all(base_dir.join("schemas")).expect("cannot create schemas/");
    base_dir
}

///
/// Write one extracted load package: `extracted/<load_id>/schema.json` (an
/// empty `schema_name` schema, unless already reconciled by Schema Storage)
/// plus `new_jobs/<file>` for each `(filename, jsonl_body)` pair.
///
pub fn write_extracted_package(base_dir: &Path, load_id: &str, schema_name: &str, files: &[(&str, &str)]) {
    let pkg = base_dir.join("extracted").join(load_id);
    let jobs = pkg.join("new_jobs");
    fs::create_dir_all(&jobs).expect("cannot create new_jobs/");

    let schema = serde_json::json!({ "name": schema_name, "version": 0, "tables": {} });
    fs::write(pkg.join("schema.json"), serde_json::to_vec_pretty(&schema).unwrap()).expect("cannot write schema.json");

    for (name, body) in files {
        fs::write(jobs.join(name), body).expect("cannot write fixture item file");
    }
}

///
/// A `DestinationCapabilities` that accepts jsonl natively and nothing else -
/// enough for every item-file fixture written by these tests, which are all
/// newline-delimited JSON.
///
pub fn jsonl_caps() -> DestinationCapabilities {
    DestinationCapabilities {
        preferred_loader_file_format: Some("jsonl".to_string()),
        preferred_staging_file_format: None,
        supported_loader_file_formats: vec!["jsonl".to_string()],
        supported_table_formats: vec![],
        loader_file_format_adapter: None,
    }
}

pub fn config(base_dir: &Path, pool_width: usize) -> NormalizeConfiguration {
    NormalizeConfiguration {
        loader_file_format: None,
        pool_width,
        normalize_storage_root: base_dir.join("extracted"),
        load_storage_root: base_dir.join("load"),
        schema_storage_root: base_dir.join("schemas"),
    }
}

///
/// Build a `Driver` over real filesystem storages rooted at `base_dir`, with
/// no cancellation and a silent collector.
///
pub fn driver(base_dir: &Path, pool_width: usize) -> Driver {
    Driver::new(config(base_dir, pool_width), jsonl_caps(), Box::new(normalize::collector::NullCollector), Arc::new(AtomicBool::new(false)))
}

///
/// Run the driver to completion against a pool sized to `pool_width`
/// (`InlinePool` when 1, a real `RayonPool` otherwise).
///
pub fn run(driver: &Driver, pool_width: usize) -> Result<RunMetrics, normalize::error::NormalizeError> {
    if pool_width > 1 {
        let pool = RayonPool::new(pool_width).expect("failed to build test thread pool");
        driver.run(&pool)
    } else {
        let pool = InlinePool::default();
        driver.run(&pool)
    }
}

///
/// List the base file names (no directory component) of every file directly
/// under `dir`, sorted.
///
pub fn list_file_names(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("cannot read dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

///
/// Count newline-delimited records across every file in `dir` whose name
/// starts with `table_prefix.` - i.e. every output file for one table,
/// regardless of which worker produced it.
///
pub fn count_jsonl_rows_for_table(dir: &Path, table_prefix: &str) -> usize {
    let prefix = format!("{}.", table_prefix);
    let mut total = 0usize;
    for name in list_file_names(dir) {
        if name.starts_with(&prefix) {
            let contents = fs::read_to_string(dir.join(&name)).expect("cannot read output file");
            total += contents.lines().filter(|l| !l.trim().is_empty()).count();
        }
    }
    total
}

pub fn read_committed_schema(base_dir: &Path, load_id: &str) -> serde_json::Value {
    let path = base_dir.join("load").join("committed").join(load_id).join("schema.json");
    let bytes = fs::read(&path).unwrap_or_else(|_| panic!("no committed schema at {:?}", path));
    serde_json::from_slice(&bytes).expect("committed schema.json is not valid JSON")
}

pub fn committed_package_dir(base_dir: &Path, load_id: &str) -> PathBuf {
    base_dir.join("load").join("committed").join(load_id)
}

pub fn extracted_package_dir(base_dir: &Path, load_id: &str) -> PathBuf {
    base_dir.join("extracted").join(load_id)
}

///
/// The serialized `DataType` variant name (e.g. `"Integer"`, `"String"`) for
/// every column of `table` in a committed schema.json, keyed by column name.
///
pub fn column_types(schema: &serde_json::Value, table: &str) -> HashMap<String, String> {
    schema["tables"][table]["columns"]
        .as_array()
        .unwrap_or_else(|| panic!("table {} missing from committed schema", table))
        .iter()
        .map(|c| (c["name"].as_str().unwrap().to_string(), c["data_type"].as_str().unwrap().to_string()))
        .collect()
}
