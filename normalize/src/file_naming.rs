use crate::error::NormalizeError;

///
/// Splits an extracted item file's name into its root table, job id and format,
/// e.g. `orders.a3f1c2.jsonl` -> `(orders, a3f1c2, jsonl)`. Used both to discover
/// the root table of each extracted file (§4.3) and to group metrics per table
/// on commit (§4.5, §4.6).
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLoadJobFileName {
    table_name: String,
    job_id: String,
    file_format: String,
}

impl ParsedLoadJobFileName {
    pub fn parse(file_path: &str) -> Result<Self, NormalizeError> {
        let filename = std::path::Path::new(file_path)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.to_string());

        let parts: Vec<&str> = filename.rsplitn(3, '.').collect();
        if parts.len() != 3 {
            return Err(NormalizeError::InvalidFileName { filename });
        }

        // rsplitn yields parts in reverse: [format, job_id, table_name]
        let file_format = parts[0].to_string();
        let job_id = parts[1].to_string();
        let table_name = parts[2].to_string();

        if table_name.is_empty() || job_id.is_empty() || file_format.is_empty() {
            return Err(NormalizeError::InvalidFileName { filename });
        }

        Ok(Self { table_name, job_id, file_format })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn file_format(&self) -> &str {
        &self.file_format
    }

    pub fn to_filename(&self) -> String {
        format!("{}.{}.{}", self.table_name, self.job_id, self.file_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_job_and_format() {
        let parsed = ParsedLoadJobFileName::parse("/tmp/extracted/orders.a3f1c2.jsonl").unwrap();
        assert_eq!(parsed.table_name(), "orders");
        assert_eq!(parsed.job_id(), "a3f1c2");
        assert_eq!(parsed.file_format(), "jsonl");
    }

    #[test]
    fn rejects_a_name_with_too_few_parts() {
        assert!(ParsedLoadJobFileName::parse("orders.jsonl").is_err());
    }
}
