use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::Result;

/// Field carrying the work item id; identity lives on the record instead.
pub const ID_FIELD: &str = "System.Id";
/// Field carrying the work item type name.
pub const WORK_ITEM_TYPE_FIELD: &str = "System.WorkItemType";
pub const TITLE_FIELD: &str = "System.Title";

pub type Snapshot = BTreeMap<String, FieldValue>;
pub type PendingFields = BTreeMap<String, String>;

/// A user reference as the server embeds it in identity fields such as
/// `System.AssignedTo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
}

/// A field value as confirmed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Identity(IdentityRef),
    /// Any other object or array, kept as-is.
    Structured(Value),
}

impl FieldValue {
    /// The string a field read returns. `Null` reads as absent.
    pub fn display(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn as_identity(&self) -> Option<&IdentityRef> {
        match self {
            FieldValue::Identity(identity) => Some(identity),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Identity(identity) => match &identity.unique_name {
                Some(unique) => write!(f, "{} <{unique}>", identity.display_name),
                None => f.write_str(&identity.display_name),
            },
            FieldValue::Structured(value) => write!(f, "{value}"),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::Text(s),
            Value::Object(map) => identity_from_object(&map)
                .map(FieldValue::Identity)
                .unwrap_or(FieldValue::Structured(Value::Object(map))),
            array @ Value::Array(_) => FieldValue::Structured(array),
        }
    }
}

fn identity_from_object(map: &Map<String, Value>) -> Option<IdentityRef> {
    if !map.contains_key("displayName") {
        return None;
    }
    serde_json::from_value(Value::Object(map.clone())).ok()
}

/// Three-way outcome of pushing pending edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was pending; no request was sent.
    Empty,
    Success,
    /// The server rejected the update. Pending edits are kept.
    Failure,
}

/// Server snapshot plus local, uncommitted edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStore {
    snapshot: Snapshot,
    pending: PendingFields,
}

impl FieldStore {
    pub fn new(mut snapshot: Snapshot) -> Self {
        snapshot.remove(ID_FIELD);
        Self {
            snapshot,
            pending: PendingFields::new(),
        }
    }

    /// Pending edit if any, otherwise the server value.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.pending.get(name) {
            return Some(value.clone());
        }
        self.snapshot.get(name).and_then(FieldValue::display)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pending.insert(name.into(), value.into());
    }

    pub fn snapshot_value(&self, name: &str) -> Option<&FieldValue> {
        self.snapshot.get(name)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Names of the fields the server reported.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.snapshot.keys().map(String::as_str)
    }

    pub fn pending(&self) -> &PendingFields {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Send pending edits through `remote`. On `Some(snapshot)` the snapshot is
    /// replaced and pending edits cleared; on `None` or an error nothing changes.
    pub async fn commit<F, Fut>(&mut self, remote: F) -> Result<CommitOutcome>
    where
        F: FnOnce(PendingFields) -> Fut,
        Fut: Future<Output = Result<Option<Snapshot>>>,
    {
        if self.pending.is_empty() {
            return Ok(CommitOutcome::Empty);
        }

        match remote(self.pending.clone()).await? {
            Some(snapshot) => {
                self.replace_snapshot(snapshot);
                self.pending.clear();
                Ok(CommitOutcome::Success)
            }
            None => Ok(CommitOutcome::Failure),
        }
    }

    pub(crate) fn replace_snapshot(&mut self, mut snapshot: Snapshot) {
        snapshot.remove(ID_FIELD);
        self.snapshot = snapshot;
    }

    pub(crate) fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, TransportError};
    use serde_json::json;

    fn store() -> FieldStore {
        let mut snapshot = Snapshot::new();
        snapshot.insert(ID_FIELD.into(), FieldValue::from(json!(100500)));
        snapshot.insert(TITLE_FIELD.into(), FieldValue::from(json!("Original")));
        snapshot.insert("Microsoft.VSTS.Scheduling.Effort".into(), FieldValue::from(json!(8)));
        snapshot.insert("System.AssignedTo".into(), FieldValue::from(json!({
            "displayName": "TopTuK",
            "uniqueName": "Test\\TopTuK",
            "id": "GUID",
        })));
        snapshot.insert("System.Description".into(), FieldValue::Null);
        FieldStore::new(snapshot)
    }

    #[test]
    fn id_field_never_stored() {
        let store = store();
        assert!(store.snapshot_value(ID_FIELD).is_none());
        assert!(!store.names().any(|n| n == ID_FIELD));
    }

    #[test]
    fn reads_render_typed_values() {
        let store = store();
        assert_eq!(store.get(TITLE_FIELD).as_deref(), Some("Original"));
        assert_eq!(store.get("Microsoft.VSTS.Scheduling.Effort").as_deref(), Some("8"));
        assert_eq!(
            store.get("System.AssignedTo").as_deref(),
            Some("TopTuK <Test\\TopTuK>")
        );
        assert_eq!(store.get("System.Description"), None);
        assert_eq!(store.get("System.Missing"), None);
    }

    #[test]
    fn object_without_display_name_is_structured() {
        let value = FieldValue::from(json!({"a": 1}));
        assert!(matches!(value, FieldValue::Structured(_)));
        assert_eq!(value.display().as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn set_overrides_snapshot_and_new_fields() {
        let mut store = store();
        store.set(TITLE_FIELD, "Edited");
        store.set("Custom.NewField", "fresh");

        assert_eq!(store.get(TITLE_FIELD).as_deref(), Some("Edited"));
        assert_eq!(store.get("Custom.NewField").as_deref(), Some("fresh"));
        assert_eq!(
            store.snapshot_value(TITLE_FIELD),
            Some(&FieldValue::Text("Original".into()))
        );
    }

    #[tokio::test]
    async fn commit_without_pending_is_empty() {
        let mut store = store();
        let mut called = false;
        let outcome = store
            .commit(|_| {
                called = true;
                async { Ok::<Option<Snapshot>, ClientError>(None) }
            })
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Empty);
        assert!(!called);
    }

    #[tokio::test]
    async fn successful_commit_replaces_snapshot() {
        let mut store = store();
        store.set(TITLE_FIELD, "X");

        let outcome = store
            .commit(|pending| async move {
                let mut fresh = Snapshot::new();
                for (name, value) in pending {
                    fresh.insert(name, FieldValue::Text(value));
                }
                Ok::<_, ClientError>(Some(fresh))
            })
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::Success);
        assert!(!store.has_pending());
        assert_eq!(store.snapshot_value(TITLE_FIELD), Some(&FieldValue::Text("X".into())));
        assert!(store.snapshot_value("System.AssignedTo").is_none());
    }

    #[tokio::test]
    async fn rejected_commit_keeps_pending() {
        let mut store = store();
        store.set(TITLE_FIELD, "X");

        let outcome = store.commit(|_| async { Ok::<Option<Snapshot>, ClientError>(None) }).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Failure);
        assert_eq!(store.get(TITLE_FIELD).as_deref(), Some("X"));
        assert_eq!(store.pending().len(), 1);
    }

    #[tokio::test]
    async fn transport_error_keeps_pending() {
        let mut store = store();
        store.set(TITLE_FIELD, "X");

        let result = store
            .commit(|_| async {
                Err::<Option<Snapshot>, _>(ClientError::transport(
                    "update fields",
                    TransportError::Other("connection reset".into()),
                ))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.get(TITLE_FIELD).as_deref(), Some("X"));
    }
}
