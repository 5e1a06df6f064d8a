//! The `task.dat` snapshot document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metadata::{
    FieldRecord, FilterRecord, IndexRecord, ItemRecord, LookupListRecord, PrivilegeRecord,
    RecordSet, ReportParamRecord, RoleRecord, Settings, Snapshot,
};

/// Archive entry holding the document.
pub const DOCUMENT_NAME: &str = "task.dat";

/// Current document format.
pub const FORMAT_VERSION: u32 = 1;

/// Serialized snapshot of every metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDocument {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub task_name: String,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
    #[serde(default)]
    pub indices: Vec<IndexRecord>,
    #[serde(default)]
    pub filters: Vec<FilterRecord>,
    #[serde(default)]
    pub report_params: Vec<ReportParamRecord>,
    #[serde(default)]
    pub roles: Vec<RoleRecord>,
    #[serde(default)]
    pub privileges: Vec<PrivilegeRecord>,
    #[serde(default)]
    pub lookup_lists: Vec<LookupListRecord>,
    #[serde(default)]
    pub settings: Settings,
}

impl BundleDocument {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            exported_at: Utc::now(),
            task_name: snapshot
                .task_item()
                .map(|t| t.item_name.clone())
                .unwrap_or_default(),
            items: snapshot.items.to_vec(),
            fields: snapshot.fields.to_vec(),
            indices: snapshot.indices.to_vec(),
            filters: snapshot.filters.to_vec(),
            report_params: snapshot.report_params.to_vec(),
            roles: snapshot.roles.to_vec(),
            privileges: snapshot.privileges.to_vec(),
            lookup_lists: snapshot.lookup_lists.to_vec(),
            settings: snapshot.settings.clone(),
        }
    }

    /// Rebuild the snapshot. Duplicate identifiers within a table are
    /// rejected.
    pub fn into_snapshot(self) -> Result<Snapshot, Error> {
        if self.format_version > FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "bundle format {} is newer than supported format {FORMAT_VERSION}",
                self.format_version
            )));
        }
        Ok(Snapshot {
            items: RecordSet::from_records(self.items)?,
            fields: RecordSet::from_records(self.fields)?,
            indices: RecordSet::from_records(self.indices)?,
            filters: RecordSet::from_records(self.filters)?,
            report_params: RecordSet::from_records(self.report_params)?,
            roles: RecordSet::from_records(self.roles)?,
            privileges: RecordSet::from_records(self.privileges)?,
            lookup_lists: RecordSet::from_records(self.lookup_lists)?,
            settings: self.settings,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DataType, ItemKind};

    #[test]
    fn test_document_rebuilds_snapshot() {
        let mut s = Snapshot::default();
        s.items.upsert(ItemRecord::new(5, 0, ItemKind::Task, "demo"));
        s.fields
            .upsert(FieldRecord::new(100, 5, "id", DataType::Integer));
        s.settings.version = "1.4".into();

        let doc = BundleDocument::from_snapshot(&s);
        assert_eq!(doc.task_name, "demo");
        let bytes = doc.to_json().unwrap();
        let back = BundleDocument::from_json(&bytes).unwrap().into_snapshot().unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let mut doc = BundleDocument::from_snapshot(&Snapshot::default());
        doc.roles = vec![RoleRecord::new(1, "admin"), RoleRecord::new(1, "guest")];
        assert!(matches!(
            doc.into_snapshot(),
            Err(Error::DuplicateId { id: 1, .. })
        ));
    }

    #[test]
    fn test_newer_format_rejected() {
        let mut doc = BundleDocument::from_snapshot(&Snapshot::default());
        doc.format_version = FORMAT_VERSION + 1;
        assert!(matches!(doc.into_snapshot(), Err(Error::InvalidData(_))));
    }
}
