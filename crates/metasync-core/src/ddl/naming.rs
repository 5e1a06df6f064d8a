//! Default table and generator names.

use tracing::debug;

use crate::dialect::Dialect;
use crate::metadata::{MetaRecord, Snapshot};

/// Default table and generator names for a new item of a task.
///
/// The generator name is empty on dialects without generators.
pub fn suggest_table_name(task_name: &str, var_name: &str, dialect: &dyn Dialect) -> (String, String) {
    let name = format!("{task_name}_{var_name}");
    let gen_name = if dialect.supports_generators() {
        format!("{name}_SEQ")
    } else {
        String::new()
    };
    (dialect.literal_case(&name), dialect.literal_case(&gen_name))
}

/// Give every physical item new in `new` a `<TABLE>_SEQ` generator when the
/// dialect needs one and none was set. Returns the number of items named.
pub fn assign_generator_names(old: &Snapshot, new: &mut Snapshot, dialect: &dyn Dialect) -> usize {
    if !dialect.supports_generators() {
        return 0;
    }
    let pending: Vec<i64> = new
        .physical_items()
        .filter(|i| !i.is_deleted() && i.gen_name.is_empty())
        .filter(|i| old.item(i.id).map_or(true, |o| o.is_deleted()))
        .map(|i| i.id)
        .collect();
    for id in &pending {
        if let Some(item) = new.items.get_mut(*id) {
            item.gen_name = dialect.literal_case(&format!("{}_SEQ", item.table_name));
            debug!(item = id, generator = %item.gen_name, "generator assigned");
        }
    }
    pending.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{FirebirdDialect, PostgresDialect, SqliteDialect};
    use crate::metadata::{ItemKind, ItemRecord};

    #[test]
    fn test_suggest_table_name() {
        assert_eq!(
            suggest_table_name("demo", "customers", &SqliteDialect),
            ("DEMO_CUSTOMERS".to_string(), String::new())
        );
        assert_eq!(
            suggest_table_name("demo", "customers", &PostgresDialect),
            ("demo_customers".to_string(), "demo_customers_seq".to_string())
        );
    }

    #[test]
    fn test_generators_only_for_new_items() {
        let mut old = Snapshot::default();
        old.items.upsert(
            ItemRecord::new(10, 6, ItemKind::Catalog, "orders").with_table("ORDERS"),
        );
        let mut new = old.clone();
        new.items.upsert(
            ItemRecord::new(11, 6, ItemKind::Catalog, "customers").with_table("CUSTOMERS"),
        );
        new.items.upsert(
            ItemRecord::new(12, 6, ItemKind::Catalog, "notes")
                .with_table("NOTES")
                .with_generator("NOTES_GEN"),
        );

        assert_eq!(assign_generator_names(&old, &mut new, &FirebirdDialect), 1);
        assert_eq!(new.item(11).unwrap().gen_name, "CUSTOMERS_SEQ");
        assert_eq!(new.item(10).unwrap().gen_name, "");
        assert_eq!(new.item(12).unwrap().gen_name, "NOTES_GEN");

        let mut sqlite = old.clone();
        sqlite.items.upsert(
            ItemRecord::new(11, 6, ItemKind::Catalog, "customers").with_table("CUSTOMERS"),
        );
        assert_eq!(assign_generator_names(&old, &mut sqlite, &SqliteDialect), 0);
    }
}
