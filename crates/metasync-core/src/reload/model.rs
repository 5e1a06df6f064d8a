//! The compiled task model served to requests.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::metadata::{
    Alignment, DataType, FieldRecord, FilterRecord, ItemKind, ItemRecord, MetaRecord,
    ReportParamRecord, Settings, Snapshot,
};

/// Errors raised while building a [`TaskModel`].
#[derive(Debug, Error)]
pub enum ModelError {
    /// The metadata has no task node.
    #[error("metadata has no task item")]
    NoTask,

    /// A field carries a data type tag the model does not know.
    #[error("field {field_id} of item {item_id} has unknown data type {tag}")]
    UnknownDataType { item_id: i64, field_id: i64, tag: u8 },

    /// A detail points to a table that does not exist.
    #[error("detail {detail_id} references missing table item {table_id:?}")]
    MissingDetailTable { detail_id: i64, table_id: Option<i64> },

    /// A lookup list does not hold `[value, caption]` pairs.
    #[error("lookup list {id} is malformed: {message}")]
    LookupList { id: i64, message: String },

    /// Metadata could not be read.
    #[error(transparent)]
    Metadata(#[from] crate::error::Error),
}

/// Source of a compiled module with its content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeModule {
    pub source: String,
    /// Hex-encoded blake3 digest of the source.
    pub digest: String,
}

impl CodeModule {
    fn compile(source: &str) -> Option<Self> {
        if source.trim().is_empty() {
            return None;
        }
        Some(Self {
            source: source.to_string(),
            digest: hex::encode(blake3::hash(source.as_bytes()).as_bytes()),
        })
    }
}

/// A field as requests see it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub id: i64,
    /// Identifier used by application code.
    pub field_name: String,
    /// Caption.
    pub name: String,
    /// Column name in the item's table.
    pub db_field_name: String,
    pub data_type: DataType,
    /// Characters, for text types.
    pub size: u32,
    pub required: bool,
    pub read_only: bool,
    /// Computed by the application, never stored.
    pub calculated: bool,
    /// Explicit alignment, or the data type's default.
    pub alignment: Alignment,
    /// Item the field looks values up in.
    pub lookup_item: Option<i64>,
    /// Field of `lookup_item` shown for the value.
    pub lookup_field: Option<i64>,
    /// Lookup list supplying fixed values.
    pub lookup_values: Option<i64>,
    /// Declared on the parent group.
    pub inherited: bool,
}

impl FieldNode {
    fn build(item_id: i64, field: &FieldRecord, inherited: bool) -> Result<Self, ModelError> {
        let data_type = field.data_type().ok_or(ModelError::UnknownDataType {
            item_id,
            field_id: field.id,
            tag: field.data_type,
        })?;
        Ok(Self {
            id: field.id,
            field_name: field.field_name.clone(),
            name: field.name.clone(),
            db_field_name: field.db_field_name.clone(),
            data_type,
            size: field.size,
            required: field.required,
            read_only: field.read_only,
            calculated: field.calculated,
            alignment: field
                .alignment()
                .unwrap_or_else(|| Alignment::for_data_type(data_type)),
            lookup_item: field.lookup_item,
            lookup_field: field.lookup_field,
            lookup_values: field.lookup_values,
            inherited,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailNode {
    pub id: i64,
    pub item_name: String,
    pub name: String,
    /// Item whose table stores the detail rows.
    pub table_id: i64,
    pub fields: Vec<FieldNode>,
}

/// An item with everything it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemNode {
    pub id: i64,
    /// Owning group.
    pub group_id: i64,
    pub kind: ItemKind,
    pub item_name: String,
    pub name: String,
    /// Empty for items without storage.
    pub table_name: String,
    /// Sequence feeding the primary key, on dialects that use one.
    pub gen_name: String,
    /// Declared without a physical table.
    pub virtual_table: bool,
    /// Rows are flagged through `deleted_flag` instead of removed.
    pub soft_delete: bool,
    pub primary_key: Option<i64>,
    pub deleted_flag: Option<i64>,
    /// Fields inherited from the group followed by its own.
    pub fields: Vec<FieldNode>,
    pub filters: Vec<FilterRecord>,
    /// Report parameters.
    pub params: Vec<ReportParamRecord>,
    pub details: Vec<DetailNode>,
    /// Reports attached to the item.
    pub reports: Vec<i64>,
    pub server_module: Option<CodeModule>,
    pub client_module: Option<CodeModule>,
}

impl ItemNode {
    pub fn field(&self, field_name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.field_name == field_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub id: i64,
    pub kind: ItemKind,
    pub item_name: String,
    pub name: String,
    /// Items of the group in identifier order.
    pub items: Vec<i64>,
}

/// Rights of a role on an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rights {
    pub can_view: bool,
    pub can_create: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

/// Immutable object graph of a task, rebuilt from committed metadata.
///
/// A model is never patched; a structural change builds a new one and the
/// live application swaps it in whole.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskModel {
    pub generation: u64,
    pub task_id: i64,
    pub task_name: String,
    pub settings: Settings,
    pub groups: Vec<GroupNode>,
    items: BTreeMap<i64, ItemNode>,
    by_name: HashMap<String, i64>,
    lookup_lists: HashMap<i64, Vec<(i64, String)>>,
    rights: HashMap<(i64, i64), Rights>,
    /// Item storing change history, when it is a physical catalog or table.
    pub history_item: Option<i64>,
    pub lock_item: Option<i64>,
}

impl TaskModel {
    /// Build a model from a snapshot.
    pub fn build(snapshot: &Snapshot, generation: u64) -> Result<Self, ModelError> {
        let task = snapshot
            .task_item()
            .filter(|t| !t.is_deleted())
            .ok_or(ModelError::NoTask)?;

        let mut groups = Vec::new();
        let mut items = BTreeMap::new();
        for group in live_children(snapshot, task.id).filter(|g| g.kind.is_group()) {
            let mut members = Vec::new();
            for item in live_children(snapshot, group.id)
                .filter(|i| matches!(i.kind, ItemKind::Catalog | ItemKind::Table | ItemKind::Report))
            {
                items.insert(item.id, build_item(snapshot, group, item)?);
                members.push(item.id);
            }
            groups.push(GroupNode {
                id: group.id,
                kind: group.kind,
                item_name: group.item_name.clone(),
                name: group.name.clone(),
                items: members,
            });
        }

        let by_name = items
            .values()
            .map(|i| (i.item_name.clone(), i.id))
            .collect();

        let mut lookup_lists = HashMap::new();
        for list in snapshot.lookup_lists.iter().filter(|l| !l.deleted) {
            let values: Vec<(i64, String)> = if list.values_text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&list.values_text).map_err(|e| ModelError::LookupList {
                    id: list.id,
                    message: e.to_string(),
                })?
            };
            lookup_lists.insert(list.id, values);
        }

        let rights = snapshot
            .privileges
            .iter()
            .filter(|p| !p.deleted)
            .map(|p| {
                (
                    (p.role_id, p.item_id),
                    Rights {
                        can_view: p.can_view,
                        can_create: p.can_create,
                        can_edit: p.can_edit,
                        can_delete: p.can_delete,
                    },
                )
            })
            .collect();

        let settings = snapshot.settings.clone();
        let history_item = settings.history_item.filter(|id| {
            snapshot
                .item(*id)
                .is_some_and(|i| !i.deleted && i.is_physical())
        });

        Ok(Self {
            generation,
            task_id: task.id,
            task_name: task.item_name.clone(),
            lock_item: settings.lock_item,
            settings,
            groups,
            items,
            by_name,
            lookup_lists,
            rights,
            history_item,
        })
    }

    pub fn item(&self, id: i64) -> Option<&ItemNode> {
        self.items.get(&id)
    }

    pub fn item_by_name(&self, item_name: &str) -> Option<&ItemNode> {
        self.by_name.get(item_name).and_then(|id| self.items.get(id))
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemNode> {
        self.items.values()
    }

    pub fn lookup_list(&self, id: i64) -> Option<&[(i64, String)]> {
        self.lookup_lists.get(&id).map(Vec::as_slice)
    }

    /// Rights of a role on an item; no row means no rights.
    pub fn rights(&self, role_id: i64, item_id: i64) -> Rights {
        self.rights
            .get(&(role_id, item_id))
            .copied()
            .unwrap_or_default()
    }
}

fn live_children(snapshot: &Snapshot, parent: i64) -> impl Iterator<Item = &ItemRecord> {
    snapshot.children_of(parent).filter(|i| !i.deleted)
}

fn field_nodes(snapshot: &Snapshot, item_id: i64, parent_id: i64) -> Result<Vec<FieldNode>, ModelError> {
    snapshot
        .effective_fields(item_id)
        .into_iter()
        .filter(|f| !f.deleted)
        .map(|f| FieldNode::build(item_id, f, f.owner_id == parent_id))
        .collect()
}

fn build_item(snapshot: &Snapshot, group: &ItemRecord, item: &ItemRecord) -> Result<ItemNode, ModelError> {
    let live_filters = |owner: i64| {
        snapshot
            .filters_of(owner)
            .filter(|f| !f.deleted)
            .cloned()
            .collect::<Vec<_>>()
    };
    let mut filters = live_filters(group.id);
    filters.extend(live_filters(item.id));

    let mut details = Vec::new();
    for detail in live_children(snapshot, item.id).filter(|d| d.kind == ItemKind::Detail) {
        let table = detail
            .table_id
            .and_then(|id| snapshot.item(id))
            .filter(|t| !t.deleted)
            .ok_or(ModelError::MissingDetailTable {
                detail_id: detail.id,
                table_id: detail.table_id,
            })?;
        details.push(DetailNode {
            id: detail.id,
            item_name: detail.item_name.clone(),
            name: detail.name.clone(),
            table_id: table.id,
            fields: field_nodes(snapshot, table.id, table.parent)?,
        });
    }

    Ok(ItemNode {
        id: item.id,
        group_id: group.id,
        kind: item.kind,
        item_name: item.item_name.clone(),
        name: item.name.clone(),
        table_name: item.table_name.clone(),
        gen_name: item.gen_name.clone(),
        virtual_table: item.virtual_table,
        soft_delete: item.soft_delete,
        primary_key: item.primary_key,
        deleted_flag: item.deleted_flag,
        fields: field_nodes(snapshot, item.id, group.id)?,
        filters,
        params: snapshot
            .params_of(item.id)
            .filter(|p| !p.deleted)
            .cloned()
            .collect(),
        details,
        reports: item.report_ids.clone(),
        server_module: CodeModule::compile(&item.server_module),
        client_module: CodeModule::compile(&item.client_module),
    })
}
