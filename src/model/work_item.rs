use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fields::{CommitOutcome, FieldStore, FieldValue};
use super::relation::{RelationLink, RelationLinks, RelationType};
use crate::client::{WorkItemService, DEFAULT_BATCH_SIZE};
use crate::error::{ClientError, Result};
use crate::patch::{relation_wire_name, Expand, PatchOptions};

/// Best-effort classification of the server's work item type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WorkItemType {
    #[default]
    Unknown,
    Requirement,
    ChangeRequest,
    Task,
    Bug,
}

impl WorkItemType {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "Requirement" => WorkItemType::Requirement,
            "Change request" => WorkItemType::ChangeRequest,
            "Task" => WorkItemType::Task,
            "Bug" => WorkItemType::Bug,
            _ => WorkItemType::Unknown,
        }
    }

    /// Server type name. `Unknown` has none.
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            WorkItemType::Requirement => Some("Requirement"),
            WorkItemType::ChangeRequest => Some("Change request"),
            WorkItemType::Task => Some("Task"),
            WorkItemType::Bug => Some("Bug"),
            WorkItemType::Unknown => None,
        }
    }
}

/// A work item fetched from (or created on) the server.
///
/// Field edits stay local until [`WorkItem::update_fields`]; relation changes
/// go to the server immediately. Every successful round-trip replaces the
/// local snapshot with what the server returned.
#[derive(Clone)]
pub struct WorkItem {
    id: i32,
    url: String,
    rev: Option<i32>,
    item_type: WorkItemType,
    item_type_name: Option<String>,
    fields: FieldStore,
    relations: RelationLinks,
    service: Arc<dyn WorkItemService>,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("rev", &self.rev)
            .field("item_type", &self.item_type)
            .field("item_type_name", &self.item_type_name)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .finish_non_exhaustive()
    }
}

impl WorkItem {
    pub(crate) fn new(
        service: Arc<dyn WorkItemService>,
        id: i32,
        url: String,
        rev: Option<i32>,
        item_type_name: Option<String>,
        fields: FieldStore,
        relations: RelationLinks,
    ) -> Self {
        let item_type = item_type_name
            .as_deref()
            .map(WorkItemType::from_type_name)
            .unwrap_or_default();
        Self {
            id,
            url,
            rev,
            item_type,
            item_type_name,
            fields,
            relations,
            service,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn rev(&self) -> Option<i32> {
        self.rev
    }

    pub fn item_type(&self) -> WorkItemType {
        self.item_type
    }

    pub fn item_type_name(&self) -> Option<&str> {
        self.item_type_name.as_deref()
    }

    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.names().collect()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.fields.get(name)
    }

    pub fn field_value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.snapshot_value(name)
    }

    /// Stage an edit. Nothing is sent until [`WorkItem::update_fields`].
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.set(name, value);
    }

    pub fn relations(&self) -> &RelationLinks {
        &self.relations
    }

    pub fn relations_of_type(&self, relation_type: RelationType) -> Vec<&RelationLink> {
        self.relations.of_type(relation_type)
    }

    pub fn relations_named(&self, relation_type_name: &str) -> Vec<&RelationLink> {
        self.relations.named(relation_type_name)
    }

    /// Push pending edits with default options.
    pub async fn update_fields(&mut self) -> Result<CommitOutcome> {
        self.update_fields_with(&PatchOptions::default()).await
    }

    pub async fn update_fields_with(&mut self, options: &PatchOptions) -> Result<CommitOutcome> {
        let service = Arc::clone(&self.service);
        let id = self.id;
        let mut fresh_state = None;
        let slot = &mut fresh_state;

        let outcome = self
            .fields
            .commit(move |pending| async move {
                let fresh = service.update_work_item_fields(id, &pending, options).await?;
                Ok::<_, ClientError>(fresh.map(|item| {
                    let (fields, relations, rev) = item.into_state();
                    *slot = Some((relations, rev));
                    fields.into_snapshot()
                }))
            })
            .await?;

        if let Some((relations, rev)) = fresh_state {
            self.relations.replace(relations);
            self.rev = rev;
        }
        match outcome {
            CommitOutcome::Failure => {
                tracing::warn!(id = self.id, "server rejected field update; edits kept")
            }
            CommitOutcome::Success => tracing::info!(id = self.id, rev = ?self.rev, "fields updated"),
            CommitOutcome::Empty => tracing::debug!(id = self.id, "no pending field edits"),
        }
        Ok(outcome)
    }

    /// Link this item to `target_id`. `Unknown` is rejected before any request.
    pub async fn add_relation(
        &mut self,
        target_id: i32,
        relation_type: RelationType,
        attributes: Option<Map<String, Value>>,
    ) -> Result<CommitOutcome> {
        let name = relation_wire_name(relation_type)?;
        self.add_relation_named(target_id, name, attributes).await
    }

    pub async fn add_relation_named(
        &mut self,
        target_id: i32,
        relation_type_name: &str,
        attributes: Option<Map<String, Value>>,
    ) -> Result<CommitOutcome> {
        if relation_type_name.trim().is_empty() {
            return Err(ClientError::invalid(
                "relation_type",
                "relation type name is empty",
            ));
        }
        let fresh = self
            .service
            .add_relation_link(
                self.id,
                target_id,
                relation_type_name,
                attributes.as_ref(),
                &PatchOptions::default(),
            )
            .await?;
        Ok(self.absorb(fresh))
    }

    /// Remove the first relation pointing at `target_id`.
    ///
    /// The relation's position in the locally cached list is sent as the
    /// server-side index. If the relations changed on the server since this
    /// item was fetched, that index may name a different relation; use
    /// [`WorkItem::remove_relation_verified`] to refresh first.
    pub async fn remove_relation(&mut self, target_id: i32) -> Result<CommitOutcome> {
        let index = self.relations.position_of_target(target_id).ok_or_else(|| {
            ClientError::invalid(
                "target_id",
                format!("work item {} has no relation to {target_id}", self.id),
            )
        })?;
        let fresh = self
            .service
            .remove_relation_link(self.id, index, &PatchOptions::default())
            .await?;
        Ok(self.absorb(fresh))
    }

    /// Refresh from the server, then remove by the authoritative position.
    pub async fn remove_relation_verified(&mut self, target_id: i32) -> Result<CommitOutcome> {
        if !self.refresh().await? {
            return Ok(CommitOutcome::Failure);
        }
        self.remove_relation(target_id).await
    }

    /// Reload snapshot and relations. Pending edits are kept. Returns `false`
    /// when the server no longer returns the item.
    pub async fn refresh(&mut self) -> Result<bool> {
        let fresh = self
            .service
            .get_single_work_item(self.id, None, Expand::All)
            .await?;
        Ok(self.absorb(fresh) == CommitOutcome::Success)
    }

    pub async fn related_work_items(&self, relation_type: RelationType) -> Result<Vec<WorkItem>> {
        let ids = target_ids(self.relations.of_type(relation_type));
        self.fetch_related(ids).await
    }

    pub async fn related_work_items_named(&self, relation_type_name: &str) -> Result<Vec<WorkItem>> {
        let ids = target_ids(self.relations.named(relation_type_name));
        self.fetch_related(ids).await
    }

    async fn fetch_related(&self, ids: Vec<i32>) -> Result<Vec<WorkItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.service
            .get_work_items(&ids, None, Expand::All, DEFAULT_BATCH_SIZE)
            .await
    }

    fn absorb(&mut self, fresh: Option<WorkItem>) -> CommitOutcome {
        let Some(fresh) = fresh else {
            tracing::warn!(id = self.id, "server rejected work item update");
            return CommitOutcome::Failure;
        };
        if let Some(name) = fresh.item_type_name.clone() {
            self.item_type = WorkItemType::from_type_name(&name);
            self.item_type_name = Some(name);
        }
        let (fields, relations, rev) = fresh.into_state();
        self.fields.replace_snapshot(fields.into_snapshot());
        self.relations.replace(relations);
        self.rev = rev;
        CommitOutcome::Success
    }

    fn into_state(self) -> (FieldStore, RelationLinks, Option<i32>) {
        (self.fields, self.relations, self.rev)
    }
}

fn target_ids(links: Vec<&RelationLink>) -> Vec<i32> {
    links.iter().filter_map(|link| link.target_id()).collect()
}
