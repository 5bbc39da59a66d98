pub mod fields;
pub mod relation;
pub mod work_item;

pub use fields::{
    CommitOutcome, FieldStore, FieldValue, IdentityRef, PendingFields, Snapshot, ID_FIELD,
    TITLE_FIELD, WORK_ITEM_TYPE_FIELD,
};
pub use relation::{
    work_item_id_from_url, RelationLink, RelationLinks, RelationType, UNRESOLVED_WORK_ITEM_ID,
};
pub use work_item::{WorkItem, WorkItemType};
