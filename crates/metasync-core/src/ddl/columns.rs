//! Physical column sets of items.

use crate::dialect::{ColumnDef, Dialect};
use crate::metadata::{ItemRecord, Snapshot};

/// Columns backing an item's table.
///
/// Inherited parent fields come first, then the item's own fields.
/// Calculated fields and master-linked fields have no column of their own.
pub fn table_columns(snapshot: &Snapshot, item: &ItemRecord, dialect: &dyn Dialect) -> Vec<ColumnDef> {
    snapshot
        .effective_fields(item.id)
        .into_iter()
        .filter(|f| !f.deleted && f.is_stored())
        .map(|f| ColumnDef {
            field_id: f.id,
            name: dialect.literal_case(&f.db_field_name),
            data_type: f.data_type,
            size: f.size,
            default_value: f.default_value.clone(),
            primary_key: item.primary_key == Some(f.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::metadata::{DataType, FieldRecord, ItemKind};

    #[test]
    fn test_excludes_calculated_and_master_fields() {
        let mut s = Snapshot::default();
        s.items
            .upsert(ItemRecord::new(6, 5, ItemKind::CatalogGroup, "catalogs"));
        s.fields
            .upsert(FieldRecord::new(1, 6, "id", DataType::Integer));
        s.fields
            .upsert(FieldRecord::new(2, 6, "deleted", DataType::Integer));
        let item = ItemRecord::new(10, 6, ItemKind::Catalog, "orders")
            .with_table("ORDERS")
            .with_system_fields(1, 2);
        s.items.upsert(item.clone());
        s.fields
            .upsert(FieldRecord::new(3, 10, "total", DataType::Currency));
        s.fields
            .upsert(FieldRecord::new(4, 10, "sum", DataType::Currency).calculated());
        s.fields
            .upsert(FieldRecord::new(5, 10, "owner", DataType::Integer).with_master_field(9));

        let columns = table_columns(&s, &item, &SqliteDialect);
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["ID", "DELETED", "TOTAL"]);
        assert!(columns[0].primary_key);
        assert!(!columns[2].primary_key);

        let lower = table_columns(&s, &item, &PostgresDialect);
        assert_eq!(lower[2].name, "total");
    }
}
