//! JSON-Patch request synthesis for work item mutations.
//!
//! Everything here is pure: functions describe a request, the client sends it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ClientError, Result};
use crate::model::{PendingFields, RelationLink, RelationType};

pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";
pub const DEFAULT_API_VERSION: &str = "6.0";
pub(crate) const WORK_ITEMS_PATH: &str = "wit/workitems";

/// How much of a work item the server should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Expand {
    None,
    Relations,
    Fields,
    Links,
    #[default]
    All,
}

impl Expand {
    pub fn as_str(self) -> &'static str {
        match self {
            Expand::None => "None",
            Expand::Relations => "Relations",
            Expand::Fields => "Fields",
            Expand::Links => "Links",
            Expand::All => "All",
        }
    }
}

impl fmt::Display for Expand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Expand {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        [
            Expand::None,
            Expand::Relations,
            Expand::Fields,
            Expand::Links,
            Expand::All,
        ]
        .into_iter()
        .find(|e| e.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| ClientError::invalid("expand", format!("unsupported value {s:?}")))
    }
}

/// Query flags carried by every mutating request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOptions {
    pub expand: Expand,
    pub bypass_rules: bool,
    pub suppress_notifications: bool,
    pub validate_only: bool,
}

impl PatchOptions {
    pub fn query(&self, api_version: &str) -> Vec<(String, String)> {
        vec![
            ("api-version".into(), api_version.into()),
            ("$expand".into(), self.expand.as_str().into()),
            ("bypassRules".into(), self.bypass_rules.to_string()),
            (
                "suppressNotifications".into(),
                self.suppress_notifications.to_string(),
            ),
            ("validateOnly".into(), self.validate_only.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    /// `Some(Value::Null)` serializes an explicit `"from": null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    fn add_field(name: &str, value: &str) -> Self {
        Self {
            op: PatchOp::Add,
            path: format!("/fields/{name}"),
            from: None,
            value: Some(Value::String(value.to_owned())),
        }
    }

    fn add_relation(rel: &str, url: &str, attributes: Option<&Map<String, Value>>) -> Self {
        Self {
            op: PatchOp::Add,
            path: "/relations/-".into(),
            from: None,
            value: Some(json!({
                "rel": rel,
                "url": url,
                "attributes": attributes,
            })),
        }
    }

    fn with_null_from(mut self) -> Self {
        self.from = Some(Value::Null);
        self
    }
}

/// A fully described JSON-Patch request.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    pub operations: Vec<PatchOperation>,
    pub query: Vec<(String, String)>,
    pub content_type: &'static str,
}

impl PatchRequest {
    fn new(operations: Vec<PatchOperation>, options: &PatchOptions, api_version: &str) -> Self {
        Self {
            operations,
            query: options.query(api_version),
            content_type: JSON_PATCH_CONTENT_TYPE,
        }
    }

    pub fn body(&self) -> Value {
        json!(self.operations)
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        vec![("Content-Type".into(), self.content_type.into())]
    }
}

/// Url the server expects for a relation target.
pub fn relation_target_url(server_url: &str, collection_api_root: &str, target_id: i32) -> String {
    format!("{server_url}{collection_api_root}{WORK_ITEMS_PATH}/{target_id}")
}

/// Wire name for a relation kind. `Unknown` cannot be sent.
pub fn relation_wire_name(relation_type: RelationType) -> Result<&'static str> {
    relation_type
        .wire_name()
        .ok_or_else(|| ClientError::invalid("relation_type", "relation type must not be Unknown"))
}

/// Request body for creating a work item: one field add per field in the
/// given order, then one relation add per relation.
pub fn create_work_item<I, K, V>(
    fields: I,
    relations: &[RelationLink],
    options: &PatchOptions,
    api_version: &str,
) -> PatchRequest
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut operations: Vec<PatchOperation> = fields
        .into_iter()
        .map(|(name, value)| PatchOperation::add_field(name.as_ref(), value.as_ref()).with_null_from())
        .collect();

    operations.extend(relations.iter().map(|link| {
        let attributes = (!link.attributes.is_empty()).then_some(&link.attributes);
        PatchOperation::add_relation(&link.relation_type_name, &link.url, attributes).with_null_from()
    }));

    PatchRequest::new(operations, options, api_version)
}

/// Request body for pushing pending field edits.
pub fn update_fields(fields: &PendingFields, options: &PatchOptions, api_version: &str) -> PatchRequest {
    let operations = fields
        .iter()
        .map(|(name, value)| PatchOperation::add_field(name, value))
        .collect();
    PatchRequest::new(operations, options, api_version)
}

/// Request body adding a relation by wire name. Blank names are rejected.
pub fn add_relation(
    relation_type_name: &str,
    target_url: &str,
    attributes: Option<&Map<String, Value>>,
    options: &PatchOptions,
    api_version: &str,
) -> Result<PatchRequest> {
    if relation_type_name.trim().is_empty() {
        return Err(ClientError::invalid(
            "relation_type",
            "relation type name is empty",
        ));
    }
    let operation = PatchOperation::add_relation(relation_type_name, target_url, attributes);
    Ok(PatchRequest::new(vec![operation], options, api_version))
}

pub fn add_relation_of_type(
    relation_type: RelationType,
    target_url: &str,
    attributes: Option<&Map<String, Value>>,
    options: &PatchOptions,
    api_version: &str,
) -> Result<PatchRequest> {
    let name = relation_wire_name(relation_type)?;
    add_relation(name, target_url, attributes, options, api_version)
}

/// Request body removing the relation at `index` in the server's list.
pub fn remove_relation(index: usize, options: &PatchOptions, api_version: &str) -> PatchRequest {
    let operation = PatchOperation {
        op: PatchOp::Remove,
        path: format!("/relations/{index}"),
        from: None,
        value: None,
    };
    PatchRequest::new(vec![operation], options, api_version)
}
