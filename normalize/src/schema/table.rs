use serde::{Deserialize, Serialize};
use crate::error::NormalizeError;
use crate::schema::column::ColumnDefinition;

///
/// Opaque per-table sub-mapping the normalize engine stores its own bookkeeping
/// in. `evolve_columns_once`, when set, tells a future run it may still widen
/// this table's columns freely; it's cleared the first time the table actually
/// sees data (see `Spooler::mark_seen`). `seen_data` is set the first time any
/// file is normalized into this table and never cleared again.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct XNormalizer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evolve_columns_once: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seen_data: Option<bool>,
}

///
/// The schema of one table: an ordered column list plus the opaque x-normalizer
/// metadata. Column order matters for file/column-position stability but not for
/// the `update_table` merge, which is keyed by column name.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_format: Option<String>,

    pub columns: Vec<ColumnDefinition>,

    #[serde(default, rename = "x-normalizer")]
    pub x_normalizer: XNormalizer,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), table_format: None, columns: Vec::new(), x_normalizer: XNormalizer::default() }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    ///
    /// Merge a partial table schema into `self` by the monotonicity rule: new
    /// columns are appended, existing columns may only widen. Raises
    /// `NormalizeError::CoercionConflict` (unchanged) if a proposed column type
    /// would narrow an existing one.
    ///
    /// Idempotent: merging the same partial twice leaves the schema unchanged
    /// the second time, since `DataType::widen` of a type with itself is a no-op.
    ///
    pub fn update_table(&mut self, partial: &TableSchema) -> Result<(), NormalizeError> {
        for proposed in &partial.columns {
            match self.columns.iter_mut().find(|c| c.name == proposed.name) {
                Some(existing) => {
                    match existing.data_type.widen(&proposed.data_type) {
                        Some(widened) => existing.data_type = widened,
                        None => return Err(NormalizeError::CoercionConflict {
                            table: self.name.clone(),
                            column: proposed.name.clone(),
                            existing: existing.data_type.as_str().to_string(),
                            proposed: proposed.data_type.as_str().to_string(),
                        }),
                    }
                    existing.nullable = existing.nullable || proposed.nullable;
                }
                None => self.columns.push(proposed.clone()),
            }
        }

        if self.table_format.is_none() {
            self.table_format = partial.table_format.clone();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use normalize_core::data_type::DataType;

    fn table_with(name: &str, dt: DataType) -> TableSchema {
        let mut t = TableSchema::new("t");
        t.columns.push(ColumnDefinition::new(name, dt));
        t
    }

    #[test]
    fn widens_an_existing_column() {
        let mut t = table_with("x", DataType::Integer);
        t.update_table(&table_with("x", DataType::Decimal)).unwrap();
        assert_eq!(t.column("x").unwrap().data_type, DataType::Decimal);
    }

    #[test]
    fn appends_new_columns() {
        let mut t = TableSchema::new("t");
        t.update_table(&table_with("y", DataType::String)).unwrap();
        assert!(t.column("y").is_some());
    }

    #[test]
    fn conflicting_types_are_rejected() {
        let mut t = table_with("x", DataType::Boolean);
        let err = t.update_table(&table_with("x", DataType::Integer)).unwrap_err();
        assert!(err.is_coercion_conflict());
    }

    #[test]
    fn applying_the_same_delta_twice_is_a_no_op() {
        let mut t = table_with("x", DataType::Integer);
        let delta = table_with("x", DataType::Decimal);
        t.update_table(&delta).unwrap();
        t.update_table(&delta).unwrap();
        assert_eq!(t.column("x").unwrap().data_type, DataType::Decimal);
    }
}
