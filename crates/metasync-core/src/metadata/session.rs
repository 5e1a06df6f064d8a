//! Editing sessions over a scratch copy of the metadata.

use tracing::debug;

use super::field::FieldRecord;
use super::record::MetaRecord;
use super::repository::MetadataRepository;
use super::settings::Settings;
use super::snapshot::{Snapshot, SnapshotRecord};
use super::types::DataType;
use crate::error::Error;

/// An in-progress edit of the application structure.
///
/// The session works on an owned copy of the live snapshot. Nothing reaches
/// the live tables until the finished snapshot is handed to the apply
/// pipeline; the only shared state touched here is the field id generator.
pub struct EditSession<'a> {
    repo: &'a MetadataRepository,
    working: Snapshot,
}

impl<'a> EditSession<'a> {
    /// Start a session from the current live snapshot.
    pub fn begin(repo: &'a MetadataRepository) -> Result<Self, Error> {
        let working = repo.snapshot()?;
        Ok(Self { repo, working })
    }

    /// The scratch snapshot as edited so far.
    pub fn snapshot(&self) -> &Snapshot {
        &self.working
    }

    /// Insert or replace a row.
    pub fn upsert<R: SnapshotRecord>(&mut self, record: R) -> Option<R> {
        R::records_mut(&mut self.working).upsert(record)
    }

    /// Remove a row.
    pub fn remove<R: SnapshotRecord>(&mut self, id: i64) -> Option<R> {
        R::records_mut(&mut self.working).remove(id)
    }

    /// Get a mutable row.
    pub fn get_mut<R: SnapshotRecord>(&mut self, id: i64) -> Option<&mut R> {
        R::records_mut(&mut self.working).get_mut(id)
    }

    /// Remove an item with everything it owns.
    pub fn remove_item(&mut self, id: i64) -> bool {
        if self.working.items.remove(id).is_none() {
            return false;
        }
        let owned = Some(id);
        self.working.fields.retain(|f| f.owner_id() != owned);
        self.working.indices.retain(|i| i.owner_id() != owned);
        self.working.filters.retain(|f| f.owner_id() != owned);
        self.working.report_params.retain(|p| p.owner_id() != owned);
        self.working.privileges.retain(|p| p.item_id != id);
        debug!(item = id, "item removed from edit session");
        true
    }

    /// Allocate an identifier and add a field to an item.
    pub fn add_field(
        &mut self,
        owner_id: i64,
        field_name: &str,
        data_type: DataType,
        size: u32,
    ) -> Result<i64, Error> {
        let id = self.repo.next_field_id(1)?;
        let field = FieldRecord::new(id, owner_id, field_name, data_type).with_size(size);
        self.working.fields.upsert(field);
        Ok(id)
    }

    /// Reserve a block of field identifiers, returning the first.
    pub fn next_field_id(&self, length: i64) -> Result<i64, Error> {
        self.repo.next_field_id(length)
    }

    /// Mutable access to the settings row.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.working.settings
    }

    /// Finish editing and return the new snapshot.
    pub fn finish(mut self) -> Snapshot {
        self.working.refresh_has_children();
        self.working
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::index::IndexRecord;
    use crate::metadata::item::ItemRecord;
    use crate::metadata::types::ItemKind;

    fn test_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    #[test]
    fn test_session_never_touches_live_tables() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        repo.put(&ItemRecord::new(10, 3, ItemKind::Catalog, "orders"))
            .unwrap();

        let mut session = EditSession::begin(&repo).unwrap();
        let field_id = session
            .add_field(10, "total", DataType::Currency, 10)
            .unwrap();
        session.upsert(IndexRecord::new(50, 10, "IX_TOTAL").with_field(field_id));
        let new = session.finish();

        assert!(new.field(field_id).is_some());
        assert!(new.indices.contains(50));
        let live = repo.snapshot().unwrap();
        assert!(live.fields.is_empty());
        assert!(live.indices.is_empty());
        // the generator is the one shared resource
        assert_eq!(live.settings.field_id_gen, field_id);
    }

    #[test]
    fn test_remove_item_cascades() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        repo.put(&ItemRecord::new(10, 3, ItemKind::Catalog, "orders"))
            .unwrap();
        repo.put(&IndexRecord::new(50, 10, "IX1")).unwrap();

        let mut session = EditSession::begin(&repo).unwrap();
        assert!(session.remove_item(10));
        assert!(!session.remove_item(10));
        let new = session.finish();
        assert!(new.items.is_empty());
        assert!(new.indices.is_empty());
    }
}
