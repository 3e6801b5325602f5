use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use chrono::Utc;
use uuid::Uuid;
use crate::error::NormalizeError;
use crate::metrics::WriterMetrics;
use crate::schema::{SchemaSnapshot, SchemaUpdate};
use crate::writer_resolver::WriterSpec;
use super::{ItemStorage, LoadPackageInfo, LoadStorage, NormalizeStorage, PackageStage, SchemaStorage};

fn io_err(path: impl AsRef<Path>, source: std::io::Error) -> NormalizeError {
    NormalizeError::ItemIo { path: path.as_ref().to_string_lossy().into(), source }
}

///
/// Recursively copy a directory tree. `std::fs` has no directory-copy primitive;
/// this is the manual equivalent of `fs_extra::dir::copy` for production code
/// (the dev-only `fs_extra` dependency is reserved for test fixture setup).
///
fn copy_dir_recursive(from: &Path, to: &Path) -> Result<(), NormalizeError> {
    fs::create_dir_all(to).map_err(|source| NormalizeError::CannotCreateDir { path: to.to_string_lossy().into(), source })?;

    for entry in fs::read_dir(from).map_err(|source| io_err(from, source))? {
        let entry = entry.map_err(|source| io_err(from, source))?;
        let dest = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|source| io_err(entry.path(), source))?;

        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|source| io_err(entry.path(), source))?;
        }
    }

    Ok(())
}

///
/// Filesystem-backed `extracted/<load_id>/{schema.json, new_jobs/*}` layout
/// (§6 on-disk layout), grounded in `matcher/src/folders.rs`'s directory-rename
/// staging model.
///
pub struct FsNormalizeStorage {
    root: PathBuf,
}

impl FsNormalizeStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn new_jobs_dir(&self, load_id: &str) -> PathBuf {
        self.root.join(load_id).join("new_jobs")
    }

    fn schema_path(&self, load_id: &str) -> PathBuf {
        self.root.join(load_id).join("schema.json")
    }
}

impl NormalizeStorage for FsNormalizeStorage {
    fn list_packages(&self) -> Result<Vec<String>, NormalizeError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(&self.root)
            .map_err(|source| io_err(&self.root, source))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn load_schema(&self, load_id: &str) -> Result<SchemaSnapshot, NormalizeError> {
        let path = self.schema_path(load_id);
        let bytes = fs::read(&path).map_err(|source| io_err(&path, source))?;
        serde_json::from_slice(&bytes).map_err(|source| NormalizeError::SchemaJson { path: path.to_string_lossy().into(), source })
    }

    fn list_new_jobs(&self, load_id: &str) -> Result<Vec<String>, NormalizeError> {
        let dir = self.new_jobs_dir(load_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<String> = fs::read_dir(&dir)
            .map_err(|source| io_err(&dir, source))?
            .filter_map(|e| e.ok())
            .map(|e| e.path().to_string_lossy().to_string())
            .collect();
        files.sort();
        Ok(files)
    }

    fn delete_package(&self, load_id: &str, not_exists_ok: bool) -> Result<(), NormalizeError> {
        let path = self.root.join(load_id);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound && not_exists_ok => Ok(()),
            Err(source) => Err(io_err(&path, source)),
        }
    }

    fn get_load_package_info(&self, load_id: &str) -> Result<LoadPackageInfo, NormalizeError> {
        Ok(LoadPackageInfo { load_id: load_id.to_string(), stage: PackageStage::Extracted, path: self.root.join(load_id) })
    }

    fn package_path(&self, load_id: &str) -> PathBuf {
        self.root.join(load_id)
    }
}

///
/// Filesystem-backed `load/new/<load_id>/...` -> `load/committed/<load_id>/...`
/// layout (§6).
///
pub struct FsLoadStorage {
    new_root: PathBuf,
    committed_root: PathBuf,
}

impl FsLoadStorage {
    pub fn new(load_root: impl Into<PathBuf>) -> Self {
        let load_root = load_root.into();
        Self { new_root: load_root.join("new"), committed_root: load_root.join("committed") }
    }

    fn new_jobs_dir(&self, load_id: &str) -> PathBuf {
        self.new_root.join(load_id).join("new_jobs")
    }
}

impl LoadStorage for FsLoadStorage {
    fn delete_new_package(&self, load_id: &str, not_exists_ok: bool) -> Result<(), NormalizeError> {
        let path = self.new_root.join(load_id);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound && not_exists_ok => Ok(()),
            Err(source) => Err(io_err(&path, source)),
        }
    }

    fn import_extracted_package(&self, load_id: &str, source: &dyn NormalizeStorage) -> Result<(), NormalizeError> {
        let from = source.package_path(load_id);
        let to = self.new_root.join(load_id);

        // Copy the package's top-level metadata (schema.json) but not `new_jobs/`
        // itself: that holds the *input* files the workers still need to read from
        // the extracted side, and the loading volume's own `new_jobs/` is where
        // normalized *output* gets written fresh. Copying the raw inputs across too
        // would leave unreferenced leftovers sitting next to the real output once
        // the package is committed.
        fs::create_dir_all(&to).map_err(|source| NormalizeError::CannotCreateDir { path: to.to_string_lossy().into(), source })?;
        for entry in fs::read_dir(&from).map_err(|source| io_err(&from, source))? {
            let entry = entry.map_err(|source| io_err(&from, source))?;
            if entry.file_name() == "new_jobs" {
                continue;
            }
            let dest = to.join(entry.file_name());
            let file_type = entry.file_type().map_err(|source| io_err(entry.path(), source))?;
            if file_type.is_dir() {
                copy_dir_recursive(&entry.path(), &dest)?;
            } else {
                fs::copy(entry.path(), &dest).map_err(|source| io_err(entry.path(), source))?;
            }
        }

        fs::create_dir_all(self.new_jobs_dir(load_id)).map_err(|src| NormalizeError::CannotCreateDir { path: self.new_jobs_dir(load_id).to_string_lossy().into(), source: src })?;
        Ok(())
    }

    fn create_item_storage(&self, load_id: &str, table_name: &str, spec: &WriterSpec) -> Result<Box<dyn ItemStorage>, NormalizeError> {
        let job_id = Uuid::new_v4().to_simple().to_string();
        let path = self.new_jobs_dir(load_id).join(format!("{}.{}.{}", table_name, job_id, spec.file_format));
        fs::create_dir_all(path.parent().expect("writer path always has a parent"))
            .map_err(|source| NormalizeError::CannotCreateDir { path: path.to_string_lossy().into(), source })?;
        Ok(Box::new(FsItemWriter::new(path)))
    }

    fn save_schema(&self, load_id: &str, schema: &SchemaSnapshot) -> Result<(), NormalizeError> {
        let path = self.new_root.join(load_id).join("schema.json");
        let bytes = serde_json::to_vec_pretty(schema).map_err(|source| NormalizeError::SchemaJson { path: path.to_string_lossy().into(), source })?;
        fs::write(&path, bytes).map_err(|source| io_err(&path, source))
    }

    fn save_schema_updates(&self, load_id: &str, updates: &SchemaUpdate) -> Result<(), NormalizeError> {
        let path = self.new_root.join(load_id).join("schema_updates.json");
        let bytes = serde_json::to_vec_pretty(updates).map_err(|source| NormalizeError::SchemaJson { path: path.to_string_lossy().into(), source })?;
        fs::write(&path, bytes).map_err(|source| io_err(&path, source))
    }

    fn commit_new_load_package(&self, load_id: &str) -> Result<(), NormalizeError> {
        fs::create_dir_all(&self.committed_root)
            .map_err(|source| NormalizeError::CannotCreateDir { path: self.committed_root.to_string_lossy().into(), source })?;
        let from = self.new_root.join(load_id);
        let to = self.committed_root.join(load_id);
        fs::rename(&from, &to).map_err(|source| NormalizeError::CannotRename {
            from: from.to_string_lossy().into(), to: to.to_string_lossy().into(), source,
        })
    }

    fn get_load_package_info(&self, load_id: &str) -> Result<LoadPackageInfo, NormalizeError> {
        let committed = self.committed_root.join(load_id);
        if committed.exists() {
            return Ok(LoadPackageInfo { load_id: load_id.to_string(), stage: PackageStage::Committed, path: committed });
        }
        let new = self.new_root.join(load_id);
        Ok(LoadPackageInfo { load_id: load_id.to_string(), stage: PackageStage::New, path: new })
    }
}

///
/// Filesystem-backed schema storage: one `<name>.json` file per schema under
/// `schema_storage_root`, keyed by schema name rather than load_id since a
/// schema outlives any single package.
///
pub struct FsSchemaStorage {
    root: PathBuf,
}

impl FsSchemaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }
}

impl SchemaStorage for FsSchemaStorage {
    fn load_schema(&self, name: &str) -> Result<Option<SchemaSnapshot>, NormalizeError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|source| io_err(&path, source))?;
        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|source| NormalizeError::SchemaJson { path: path.to_string_lossy().into(), source })?;
        Ok(Some(snapshot))
    }

    fn save_schema(&self, schema: &SchemaSnapshot) -> Result<(), NormalizeError> {
        fs::create_dir_all(&self.root).map_err(|source| NormalizeError::CannotCreateDir { path: self.root.to_string_lossy().into(), source })?;
        let path = self.path_for(&schema.name);
        let bytes = serde_json::to_vec_pretty(schema).map_err(|source| NormalizeError::SchemaJson { path: path.to_string_lossy().into(), source })?;
        fs::write(&path, bytes).map_err(|source| io_err(&path, source))
    }
}

///
/// One table's writer within a single worker job. Tracks exactly the files it
/// has opened for this (load_id, table) pair so `closed_files`/
/// `remove_closed_files` can account for and clean up precisely its own output.
///
pub struct FsItemWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    items_count: u64,
    bytes: u64,
    created_at: i64,
    closed: Vec<WriterMetrics>,
    dirty: bool,
}

impl FsItemWriter {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None, items_count: 0, bytes: 0, created_at: 0, closed: Vec::new(), dirty: false }
    }

    fn ensure_open(&mut self) -> Result<&mut BufWriter<File>, NormalizeError> {
        if self.file.is_none() {
            let f = File::create(&self.path).map_err(|source| io_err(&self.path, source))?;
            self.file = Some(BufWriter::new(f));
            self.created_at = Utc::now().timestamp_millis();
        }
        Ok(self.file.as_mut().expect("just ensured"))
    }
}

impl ItemStorage for FsItemWriter {
    fn write_json_item(&mut self, item: &serde_json::Value) -> Result<(), NormalizeError> {
        let path = self.path.clone();
        let line = serde_json::to_vec(item).map_err(|source| NormalizeError::SchemaJson { path: path.to_string_lossy().into(), source })?;
        let writer = self.ensure_open()?;
        writer.write_all(&line).map_err(|source| io_err(&path, source))?;
        writer.write_all(b"\n").map_err(|source| io_err(&path, source))?;
        self.items_count += 1;
        self.bytes += line.len() as u64 + 1;
        self.dirty = true;
        Ok(())
    }

    fn write_arrow_file(&mut self, source: &Path, rows: usize, bytes: u64) -> Result<(), NormalizeError> {
        fs::copy(source, &self.path).map_err(|err| io_err(&self.path, err))?;
        self.items_count += rows as u64;
        self.bytes += bytes;
        if self.created_at == 0 {
            self.created_at = Utc::now().timestamp_millis();
        }
        self.dirty = true;
        Ok(())
    }

    fn close_writers(&mut self, skip_flush: bool) -> Result<(), NormalizeError> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(mut writer) = self.file.take() {
            if !skip_flush {
                writer.flush().map_err(|source| io_err(&self.path, source))?;
            }
        }

        self.closed.push(WriterMetrics {
            file_path: self.path.to_string_lossy().into(),
            items_count: self.items_count,
            bytes: self.bytes,
            created_at: self.created_at,
            last_modified_at: Utc::now().timestamp_millis(),
        });
        self.items_count = 0;
        self.bytes = 0;
        self.dirty = false;
        Ok(())
    }

    fn closed_files(&self) -> Vec<WriterMetrics> {
        self.closed.clone()
    }

    ///
    /// Forget this writer's closed-file bookkeeping now that `closed_files` has
    /// harvested it (§4.3 step 4's "remove references"). This does not touch the
    /// files on disk - they're the worker's normalized output and belong to the
    /// load package until the mapper explicitly discards a losing retry's files
    /// or the whole package is deleted on a higher-level failure.
    ///
    fn remove_closed_files(&mut self) -> Result<(), NormalizeError> {
        self.closed.clear();
        Ok(())
    }
}
