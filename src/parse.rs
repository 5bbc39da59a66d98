//! Turns server payloads into [`WorkItem`]s.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::client::WorkItemService;
use crate::error::ParseError;
use crate::model::{
    FieldStore, FieldValue, RelationLink, RelationLinks, Snapshot, WorkItem, ID_FIELD,
    WORK_ITEM_TYPE_FIELD,
};

#[derive(Deserialize)]
struct WireCollection {
    #[serde(default)]
    value: Option<Vec<WireWorkItem>>,
}

#[derive(Deserialize)]
struct WireWorkItem {
    id: i32,
    url: String,
    #[serde(default)]
    rev: Option<i32>,
    #[serde(default)]
    fields: Option<Map<String, Value>>,
    #[serde(default)]
    relations: Option<Vec<WireRelation>>,
}

#[derive(Deserialize)]
struct WireRelation {
    rel: String,
    url: String,
    #[serde(default)]
    attributes: Option<Map<String, Value>>,
}

/// Parse a single work item body.
pub fn parse_work_item(
    service: &Arc<dyn WorkItemService>,
    body: &str,
) -> Result<WorkItem, ParseError> {
    let wire: WireWorkItem = serde_json::from_str(body)?;
    Ok(into_work_item(service, wire))
}

/// Parse a `{count, value}` collection. A body without `value` yields `None`.
pub fn parse_work_items(
    service: &Arc<dyn WorkItemService>,
    body: &str,
) -> Result<Option<Vec<WorkItem>>, ParseError> {
    let wire: WireCollection = serde_json::from_str(body)?;
    Ok(wire.value.map(|items| {
        items
            .into_iter()
            .map(|item| into_work_item(service, item))
            .collect()
    }))
}

fn into_work_item(service: &Arc<dyn WorkItemService>, wire: WireWorkItem) -> WorkItem {
    let mut item_type_name = None;
    let mut snapshot = Snapshot::new();

    for (name, value) in wire.fields.unwrap_or_default() {
        match name.as_str() {
            WORK_ITEM_TYPE_FIELD => item_type_name = FieldValue::from(value).display(),
            ID_FIELD => {}
            _ => {
                snapshot.insert(name, FieldValue::from(value));
            }
        }
    }

    let relations = wire
        .relations
        .unwrap_or_default()
        .into_iter()
        .map(|rel| {
            RelationLink::new(rel.rel, rel.url).with_attributes(rel.attributes.unwrap_or_default())
        })
        .collect();

    WorkItem::new(
        Arc::clone(service),
        wire.id,
        wire.url,
        wire.rev,
        item_type_name,
        FieldStore::new(snapshot),
        RelationLinks::new(relations),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::mock_service;
    use crate::model::{RelationType, WorkItemType, UNRESOLVED_WORK_ITEM_ID};

    const SINGLE: &str = r#"{
        "id": 100500,
        "rev": 3,
        "url": "https://tfs-tfs/tfs/_apis/wit/workItems/100500",
        "fields": {
            "System.Id": 100500,
            "System.WorkItemType": "Task",
            "System.Title": "T",
            "System.AssignedTo": {"displayName": "TopTuK", "uniqueName": "Test\\TopTuK"}
        },
        "relations": [
            {
                "rel": "System.LinkTypes.Hierarchy-Reverse",
                "url": "https://tfs-tfs/tfs/_apis/wit/workItems/42",
                "attributes": {"isLocked": false, "name": "Parent"}
            },
            {
                "rel": "ArtifactLink",
                "url": "vstfs:///Git/Commit/abc",
                "attributes": {"name": "Fixed in Commit"}
            }
        ]
    }"#;

    #[test]
    fn single_item_fields_and_type() {
        let item = parse_work_item(&mock_service(), SINGLE).unwrap();

        assert_eq!(item.id(), 100500);
        assert_eq!(item.rev(), Some(3));
        assert_eq!(item.item_type_name(), Some("Task"));
        assert_eq!(item.item_type(), WorkItemType::Task);
        assert_eq!(item.get("System.Title").as_deref(), Some("T"));

        let names = item.field_names();
        assert!(!names.contains(&"System.WorkItemType"));
        assert!(!names.contains(&"System.Id"));
        assert!(names.contains(&"System.AssignedTo"));
    }

    #[test]
    fn minimal_item_without_relations() {
        let body = r#"{"id":100500,"url":"https://tfs-tfs/tfs/_apis/wit/workItems/100500",
            "fields":{"System.WorkItemType":"Task","System.Title":"T"}}"#;
        let item = parse_work_item(&mock_service(), body).unwrap();

        assert_eq!(item.id(), 100500);
        assert_eq!(item.item_type(), WorkItemType::Task);
        assert_eq!(item.field_names(), vec!["System.Title"]);
        assert!(item.relations().is_empty());
    }

    #[test]
    fn relations_keep_order_and_resolve_targets() {
        let item = parse_work_item(&mock_service(), SINGLE).unwrap();
        let relations = item.relations().as_slice();

        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].relation_type, RelationType::Parent);
        assert_eq!(relations[0].target_work_item_id, 42);
        assert_eq!(relations[0].attributes.get("name"), Some(&Value::from("Parent")));
        assert_eq!(relations[1].relation_type, RelationType::Unknown);
        assert_eq!(relations[1].relation_type_name, "ArtifactLink");
        assert_eq!(relations[1].target_work_item_id, UNRESOLVED_WORK_ITEM_ID);
    }

    #[test]
    fn unrecognized_type_name_is_unknown() {
        let body = r#"{"id":1,"url":"u","fields":{"System.WorkItemType":"Epic"}}"#;
        let item = parse_work_item(&mock_service(), body).unwrap();
        assert_eq!(item.item_type_name(), Some("Epic"));
        assert_eq!(item.item_type(), WorkItemType::Unknown);
    }

    #[test]
    fn collection_parses_every_value() {
        let body = r#"{"count":2,"value":[
            {"id":1,"url":"u1","fields":{"System.Title":"one"}},
            {"id":2,"url":"u2","fields":{"System.Title":"two"}}
        ]}"#;
        let items = parse_work_items(&mock_service(), body).unwrap().unwrap();
        let ids: Vec<i32> = items.iter().map(WorkItem::id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn collection_without_value_is_absent() {
        let items = parse_work_items(&mock_service(), r#"{"count":0}"#).unwrap();
        assert!(items.is_none());
    }

    #[test]
    fn malformed_payloads_fail() {
        let service = mock_service();
        assert!(parse_work_item(&service, "not json").is_err());
        assert!(parse_work_item(&service, r#"{"url":"u"}"#).is_err());
        assert!(parse_work_item(&service, r#"{"id":1}"#).is_err());
        assert!(parse_work_items(&service, r#"{"value":[{"id":1}]}"#).is_err());
    }
}
