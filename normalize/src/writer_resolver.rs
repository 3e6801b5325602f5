use crate::config::{DestinationCapabilities, NormalizeConfiguration};
use crate::error::NormalizeError;
use crate::schema::table::TableSchema;

///
/// The (file format, item format) pair chosen for one table, plus whether the
/// writer can consume the item format natively or needs an in-process
/// converter (in which case a performance warning is logged once per table).
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterSpec {
    pub file_format: String,
    pub item_format: String,
    pub native: bool,
}

///
/// Native writer-format support per item format. Anything outside this list is
/// still writable via an in-process converter, just slower.
///
fn native_formats_for(item_format: &str) -> &'static [&'static str] {
    match item_format {
        "jsonl" => &["jsonl"],
        "arrow" => &["arrow", "parquet"],
        _ => &[],
    }
}

///
/// Chooses a writer specification for a (table, item_format) pair (§4.2).
///
pub struct WriterResolver;

impl WriterResolver {
    pub fn resolve(
        table_schema: &TableSchema,
        item_format: &str,
        caps: &DestinationCapabilities,
        config: &NormalizeConfiguration,
    ) -> Result<WriterSpec, NormalizeError> {
        if let Some(table_format) = &table_schema.table_format {
            if !caps.supported_table_formats.iter().any(|f| f == table_format) {
                log::warn!(
                    "Destination does not support the configured `table_format` value `{}` for table `{}`. \
                     The setting will probably be ignored.",
                    table_format, table_schema.name
                );
            }
        }

        let mut preferred = caps.preferred().map(|s| s.to_string());
        let mut supported = caps.supported_loader_file_formats.clone();

        if let Some(adapter) = &caps.loader_file_format_adapter {
            let (p, s) = adapter(preferred.as_deref(), &supported, table_schema);
            preferred = p;
            supported = s;
        }

        let mut best: Option<WriterSpec> = None;

        if let Some(forced) = &config.loader_file_format {
            if supported.iter().any(|f| f == forced) {
                best = Some(WriterSpec {
                    file_format: forced.clone(),
                    item_format: item_format.to_string(),
                    native: native_formats_for(item_format).contains(&forced.as_str()),
                });
            } else {
                log::warn!(
                    "The configured value `{}` for `loader_file_format` is not supported for table `{}` \
                     and will be ignored. A supported format will be used instead.",
                    forced, table_schema.name
                );
            }
        }

        if best.is_none() {
            best = Self::best_match(item_format, &supported, preferred.as_deref());
        }

        let spec = best.ok_or_else(|| NormalizeError::UnsupportedFormat {
            table: table_schema.name.clone(),
            item_format: item_format.to_string(),
        })?;

        if !spec.native {
            log::warn!(
                "For data items yielded as {} and job file format {} no native writer could be found. \
                 An in-process converter will be used. This will degrade performance.",
                item_format, spec.file_format
            );
        }

        Ok(spec)
    }

    ///
    /// Best match priority: the preferred format if supported; else any supported
    /// format that natively consumes the item format; else any supported format
    /// at all (written via an in-process converter).
    ///
    fn best_match(item_format: &str, supported: &[String], preferred: Option<&str>) -> Option<WriterSpec> {
        if let Some(p) = preferred {
            if supported.iter().any(|f| f == p) {
                return Some(WriterSpec {
                    file_format: p.to_string(),
                    item_format: item_format.to_string(),
                    native: native_formats_for(item_format).contains(&p),
                });
            }
        }

        let natives = native_formats_for(item_format);
        if let Some(native) = supported.iter().find(|f| natives.contains(&f.as_str())) {
            return Some(WriterSpec { file_format: native.clone(), item_format: item_format.to_string(), native: true });
        }

        supported.first().map(|f| WriterSpec { file_format: f.clone(), item_format: item_format.to_string(), native: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(supported: &[&str], preferred: Option<&str>) -> DestinationCapabilities {
        DestinationCapabilities {
            preferred_loader_file_format: preferred.map(String::from),
            preferred_staging_file_format: None,
            supported_loader_file_formats: supported.iter().map(|s| s.to_string()).collect(),
            supported_table_formats: vec![],
            loader_file_format_adapter: None,
        }
    }

    #[test]
    fn prefers_the_native_preferred_format() {
        let table = TableSchema::new("orders");
        let config = NormalizeConfiguration::default();
        let spec = WriterResolver::resolve(&table, "jsonl", &caps(&["jsonl", "parquet"], Some("jsonl")), &config).unwrap();
        assert_eq!(spec.file_format, "jsonl");
        assert!(spec.native);
    }

    #[test]
    fn falls_back_to_a_converter_when_nothing_is_native() {
        let table = TableSchema::new("orders");
        let config = NormalizeConfiguration::default();
        let spec = WriterResolver::resolve(&table, "jsonl", &caps(&["parquet"], None), &config).unwrap();
        assert_eq!(spec.file_format, "parquet");
        assert!(!spec.native);
    }

    #[test]
    fn user_override_wins_when_supported() {
        let table = TableSchema::new("orders");
        let mut config = NormalizeConfiguration::default();
        config.loader_file_format = Some("parquet".into());
        let spec = WriterResolver::resolve(&table, "arrow", &caps(&["jsonl", "parquet"], Some("jsonl")), &config).unwrap();
        assert_eq!(spec.file_format, "parquet");
    }

    #[test]
    fn fails_with_unsupported_format_when_nothing_fits() {
        let table = TableSchema::new("orders");
        let config = NormalizeConfiguration::default();
        let err = WriterResolver::resolve(&table, "jsonl", &caps(&[], None), &config).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedFormat { .. }));
    }
}
