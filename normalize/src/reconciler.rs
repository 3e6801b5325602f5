use crate::error::NormalizeError;
use crate::schema::{Schema, SchemaUpdate};

///
/// Applies a worker's schema deltas to the authoritative, live `Schema` (§4.4).
/// The only call site that mutates that schema - always invoked on the
/// `ParallelMapper`'s calling thread, never from a worker.
///
pub struct SchemaReconciler;

impl SchemaReconciler {
    ///
    /// Apply every table delta in `updates`, in the map's iteration order. On
    /// the first `CoercionConflict`, stop and propagate it unchanged - the
    /// caller (`ParallelMapper`) owns the recovery policy, not this function.
    ///
    /// Idempotent: applying the same `updates` twice is a no-op the second
    /// time, since `TableSchema::update_table` is itself idempotent per table.
    ///
    pub fn apply(schema: &mut Schema, updates: &SchemaUpdate) -> Result<(), NormalizeError> {
        for (table_name, partials) in updates {
            for partial in partials {
                schema.update_table(table_name, partial)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::ColumnDefinition;
    use crate::schema::table::TableSchema;
    use normalize_core::data_type::DataType;
    use std::collections::HashMap;

    #[test]
    fn applies_every_table_delta() {
        let mut schema = Schema::new("s");
        let mut updates: SchemaUpdate = HashMap::new();
        let mut orders = TableSchema::new("orders");
        orders.columns.push(ColumnDefinition::new("id", DataType::Integer));
        updates.insert("orders".to_string(), vec![orders]);

        SchemaReconciler::apply(&mut schema, &updates).unwrap();
        assert!(schema.table("orders").unwrap().column("id").is_some());
    }

    #[test]
    fn propagates_a_coercion_conflict_unchanged() {
        let mut schema = Schema::new("s");
        let mut first: SchemaUpdate = HashMap::new();
        let mut t = TableSchema::new("t");
        t.columns.push(ColumnDefinition::new("x", DataType::Boolean));
        first.insert("t".to_string(), vec![t]);
        SchemaReconciler::apply(&mut schema, &first).unwrap();

        let mut second: SchemaUpdate = HashMap::new();
        let mut conflict = TableSchema::new("t");
        conflict.columns.push(ColumnDefinition::new("x", DataType::Integer));
        second.insert("t".to_string(), vec![conflict]);

        let err = SchemaReconciler::apply(&mut schema, &second).unwrap_err();
        assert!(err.is_coercion_conflict());
    }

    #[test]
    fn applying_the_same_updates_twice_is_a_no_op() {
        let mut schema = Schema::new("s");
        let mut updates: SchemaUpdate = HashMap::new();
        let mut t = TableSchema::new("t");
        t.columns.push(ColumnDefinition::new("x", DataType::Decimal));
        updates.insert("t".to_string(), vec![t]);

        SchemaReconciler::apply(&mut schema, &updates).unwrap();
        SchemaReconciler::apply(&mut schema, &updates).unwrap();
        assert_eq!(schema.table("t").unwrap().column("x").unwrap().data_type, DataType::Decimal);
    }
}
