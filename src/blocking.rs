//! Synchronous facade over [`WorkItemClient`].
//!
//! Every call drives the async client to completion on a private
//! current-thread runtime. Calling any of these from inside a tokio runtime
//! panics; use the async API there.

use serde_json::{Map, Value};
use tokio::runtime::{Builder, Runtime};

use crate::client::{WorkItemClient, WorkItemService};
use crate::error::Result;
use crate::model::{CommitOutcome, PendingFields, RelationLink, RelationType, WorkItem, WorkItemType};
use crate::patch::{Expand, PatchOptions};

pub struct Client {
    inner: WorkItemClient,
    runtime: Runtime,
}

impl Client {
    pub fn new(inner: WorkItemClient) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn inner(&self) -> &WorkItemClient {
        &self.inner
    }

    pub fn get_work_items(
        &self,
        ids: &[i32],
        fields: Option<&[String]>,
        expand: Expand,
        batch_size: usize,
    ) -> Result<Vec<WorkItem>> {
        self.runtime
            .block_on(self.inner.get_work_items(ids, fields, expand, batch_size))
    }

    pub fn get_single_work_item(
        &self,
        id: i32,
        fields: Option<&[String]>,
        expand: Expand,
    ) -> Result<Option<WorkItem>> {
        self.runtime
            .block_on(self.inner.get_single_work_item(id, fields, expand))
    }

    pub fn create_work_item<I, K, V>(
        &self,
        type_name: &str,
        fields: I,
        relations: &[RelationLink],
        options: &PatchOptions,
    ) -> Result<Option<WorkItem>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.runtime.block_on(
            self.inner
                .create_work_item(type_name, fields, relations, options),
        )
    }

    pub fn create_work_item_of_type<I, K, V>(
        &self,
        item_type: WorkItemType,
        fields: I,
        relations: &[RelationLink],
    ) -> Result<Option<WorkItem>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.runtime.block_on(
            self.inner
                .create_work_item_of_type(item_type, fields, relations),
        )
    }

    pub fn copy_work_item(
        &self,
        source: &WorkItem,
        overrides: &PendingFields,
    ) -> Result<Option<WorkItem>> {
        self.runtime
            .block_on(self.inner.copy_work_item(source, overrides))
    }

    pub fn update_work_item_fields(
        &self,
        id: i32,
        fields: &PendingFields,
        options: &PatchOptions,
    ) -> Result<Option<WorkItem>> {
        self.runtime
            .block_on(self.inner.update_work_item_fields(id, fields, options))
    }

    pub fn add_relation_link(
        &self,
        source_id: i32,
        target_id: i32,
        relation_type_name: &str,
        attributes: Option<&Map<String, Value>>,
    ) -> Result<Option<WorkItem>> {
        self.runtime.block_on(self.inner.add_relation_link(
            source_id,
            target_id,
            relation_type_name,
            attributes,
            &PatchOptions::default(),
        ))
    }

    pub fn remove_relation_link(&self, id: i32, relation_index: usize) -> Result<Option<WorkItem>> {
        self.runtime.block_on(self.inner.remove_relation_link(
            id,
            relation_index,
            &PatchOptions::default(),
        ))
    }

    pub fn update_fields(&self, item: &mut WorkItem) -> Result<CommitOutcome> {
        self.runtime.block_on(item.update_fields())
    }

    pub fn add_relation(
        &self,
        item: &mut WorkItem,
        target_id: i32,
        relation_type: RelationType,
        attributes: Option<Map<String, Value>>,
    ) -> Result<CommitOutcome> {
        self.runtime
            .block_on(item.add_relation(target_id, relation_type, attributes))
    }

    pub fn remove_relation(&self, item: &mut WorkItem, target_id: i32) -> Result<CommitOutcome> {
        self.runtime.block_on(item.remove_relation(target_id))
    }

    pub fn related_work_items(
        &self,
        item: &WorkItem,
        relation_type: RelationType,
    ) -> Result<Vec<WorkItem>> {
        self.runtime.block_on(item.related_work_items(relation_type))
    }

    pub fn refresh(&self, item: &mut WorkItem) -> Result<bool> {
        self.runtime.block_on(item.refresh())
    }
}
