use std::path::PathBuf;
use std::sync::Arc;
use serde::Deserialize;
use crate::schema::table::TableSchema;

///
/// Recognized configuration keys and their effects (§6):
///
/// - `loader_file_format` forces a writer format; ignored per-table (with a
///   warning) when the destination doesn't support it.
/// - `pool_width` sets the worker pool's parallelism degree.
/// - the three `*_storage_root` fields locate the on-disk layout described in
///   §6's "On-disk layout".
///
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizeConfiguration {
    pub loader_file_format: Option<String>,

    #[serde(default = "default_pool_width")]
    pub pool_width: usize,

    #[serde(default = "default_normalize_storage_root")]
    pub normalize_storage_root: PathBuf,

    #[serde(default = "default_load_storage_root")]
    pub load_storage_root: PathBuf,

    #[serde(default = "default_schema_storage_root")]
    pub schema_storage_root: PathBuf,
}

impl Default for NormalizeConfiguration {
    fn default() -> Self {
        Self {
            loader_file_format: None,
            pool_width: default_pool_width(),
            normalize_storage_root: default_normalize_storage_root(),
            load_storage_root: default_load_storage_root(),
            schema_storage_root: default_schema_storage_root(),
        }
    }
}

fn default_pool_width() -> usize {
    num_cpus::get().max(1)
}

fn default_normalize_storage_root() -> PathBuf {
    PathBuf::from("./data/extracted")
}

fn default_load_storage_root() -> PathBuf {
    PathBuf::from("./data/load")
}

fn default_schema_storage_root() -> PathBuf {
    PathBuf::from("./data/schemas")
}

///
/// A pure function `(preferred, supported, table_schema) -> (preferred', supported')`
/// allowing per-table refinement of writer-format choice, e.g. a destination
/// where iceberg tables demand parquet regardless of the pipeline default.
///
pub type FormatAdapter = Arc<dyn Fn(Option<&str>, &[String], &TableSchema) -> (Option<String>, Vec<String>) + Send + Sync>;

///
/// What the destination can accept. Consulted by the WriterResolver (§4.2) in
/// priority order: user override, then this capability adapter, then best-match.
///
#[derive(Clone, Default)]
pub struct DestinationCapabilities {
    pub preferred_loader_file_format: Option<String>,
    pub preferred_staging_file_format: Option<String>,
    pub supported_loader_file_formats: Vec<String>,
    pub supported_table_formats: Vec<String>,
    pub loader_file_format_adapter: Option<FormatAdapter>,
}

impl std::fmt::Debug for DestinationCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationCapabilities")
            .field("preferred_loader_file_format", &self.preferred_loader_file_format)
            .field("preferred_staging_file_format", &self.preferred_staging_file_format)
            .field("supported_loader_file_formats", &self.supported_loader_file_formats)
            .field("supported_table_formats", &self.supported_table_formats)
            .field("loader_file_format_adapter", &self.loader_file_format_adapter.is_some())
            .finish()
    }
}

impl DestinationCapabilities {
    pub fn preferred(&self) -> Option<&str> {
        self.preferred_loader_file_format.as_deref().or(self.preferred_staging_file_format.as_deref())
    }
}
