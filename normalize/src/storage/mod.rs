pub mod fs;

use std::path::Path;
use crate::error::NormalizeError;
use crate::metrics::WriterMetrics;
use crate::schema::SchemaSnapshot;
use crate::writer_resolver::WriterSpec;

///
/// Information about one package, regardless of which stage (extracted/new/
/// committed) currently owns it.
///
#[derive(Clone, Debug)]
pub struct LoadPackageInfo {
    pub load_id: String,
    pub stage: PackageStage,
    pub path: std::path::PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageStage {
    Extracted,
    New,
    Committed,
}

///
/// `extracted_packages.*` (§6 NormalizeStorage).
///
pub trait NormalizeStorage: Send + Sync {
    fn list_packages(&self) -> Result<Vec<String>, NormalizeError>;
    fn load_schema(&self, load_id: &str) -> Result<SchemaSnapshot, NormalizeError>;
    fn list_new_jobs(&self, load_id: &str) -> Result<Vec<String>, NormalizeError>;
    fn delete_package(&self, load_id: &str, not_exists_ok: bool) -> Result<(), NormalizeError>;
    fn get_load_package_info(&self, load_id: &str) -> Result<LoadPackageInfo, NormalizeError>;
    fn package_path(&self, load_id: &str) -> std::path::PathBuf;
}

///
/// The schema-storage backend referenced only by interface in spec.md §1 (its
/// internal persistence format is explicitly out of scope). The Driver (§4.7)
/// consults it to prefer a previously-committed schema over the one embedded in
/// an extracted package, and the Spooler (§4.6 step 6) persists to it whenever
/// a run actually changes the schema.
///
pub trait SchemaStorage: Send + Sync {
    fn load_schema(&self, name: &str) -> Result<Option<SchemaSnapshot>, NormalizeError>;
    fn save_schema(&self, schema: &SchemaSnapshot) -> Result<(), NormalizeError>;
}

///
/// `new_packages.*` plus top-level `LoadStorage` operations (§6 LoadStorage).
///
pub trait LoadStorage: Send + Sync {
    fn delete_new_package(&self, load_id: &str, not_exists_ok: bool) -> Result<(), NormalizeError>;
    fn import_extracted_package(&self, load_id: &str, source: &dyn NormalizeStorage) -> Result<(), NormalizeError>;
    fn create_item_storage(&self, load_id: &str, table_name: &str, spec: &WriterSpec) -> Result<Box<dyn ItemStorage>, NormalizeError>;
    fn save_schema(&self, load_id: &str, schema: &SchemaSnapshot) -> Result<(), NormalizeError>;
    fn save_schema_updates(&self, load_id: &str, updates: &crate::schema::SchemaUpdate) -> Result<(), NormalizeError>;
    fn commit_new_load_package(&self, load_id: &str) -> Result<(), NormalizeError>;
    fn get_load_package_info(&self, load_id: &str) -> Result<LoadPackageInfo, NormalizeError>;
}

///
/// Per-table writer handle (§6 ItemStorage). A normalizer owns exactly one of
/// these, created lazily via `LoadStorage::create_item_storage` on first file.
///
pub trait ItemStorage: Send {
    fn write_json_item(&mut self, item: &serde_json::Value) -> Result<(), NormalizeError>;
    fn write_arrow_file(&mut self, source: &Path, rows: usize, bytes: u64) -> Result<(), NormalizeError>;
    fn close_writers(&mut self, skip_flush: bool) -> Result<(), NormalizeError>;
    fn closed_files(&self) -> Vec<WriterMetrics>;
    fn remove_closed_files(&mut self) -> Result<(), NormalizeError>;
}
