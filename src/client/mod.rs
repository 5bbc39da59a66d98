mod batch;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::model::{PendingFields, RelationLink, WorkItem, WorkItemType};
use crate::parse;
use crate::patch::{self, Expand, PatchOptions, PatchRequest, DEFAULT_API_VERSION, WORK_ITEMS_PATH};
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Server-managed fields that are never copied onto a new work item.
const COPY_IGNORED_FIELDS: &[&str] = &[
    "System.TeamProject",
    "System.AreaPath",
    "System.AreaId",
    "System.AreaLevel1",
    "System.AreaLevel2",
    "System.AreaLevel3",
    "System.AreaLevel4",
    "System.Id",
    "System.NodeName",
    "System.Rev",
    "System.RevisedDate",
    "System.IterationId",
    "System.IterationLevel1",
    "System.IterationLevel2",
    "System.IterationLevel3",
    "System.IterationLevel4",
    "System.CreatedBy",
    "System.CreatedDate",
    "System.ChangedDate",
    "System.ChangedBy",
    "System.AuthorizedAs",
    "System.AuthorizedDate",
    "System.Watermark",
];

/// Remote operations a [`WorkItem`] delegates to.
///
/// Read operations return `Ok(None)` when the server answers with a
/// non-success status; mutations do the same so callers can tell a rejected
/// update apart from a transport failure.
#[async_trait]
pub trait WorkItemService: Send + Sync {
    async fn get_work_items(
        &self,
        ids: &[i32],
        fields: Option<&[String]>,
        expand: Expand,
        batch_size: usize,
    ) -> Result<Vec<WorkItem>>;

    async fn get_single_work_item(
        &self,
        id: i32,
        fields: Option<&[String]>,
        expand: Expand,
    ) -> Result<Option<WorkItem>> {
        match self.get_work_items(&[id], fields, expand, 1).await {
            Ok(items) => Ok(items.into_iter().next()),
            Err(ClientError::UnsuccessfulResponse { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_work_item_fields(
        &self,
        id: i32,
        fields: &PendingFields,
        options: &PatchOptions,
    ) -> Result<Option<WorkItem>>;

    async fn add_relation_link(
        &self,
        source_id: i32,
        target_id: i32,
        relation_type_name: &str,
        attributes: Option<&Map<String, Value>>,
        options: &PatchOptions,
    ) -> Result<Option<WorkItem>>;

    async fn remove_relation_link(
        &self,
        id: i32,
        relation_index: usize,
        options: &PatchOptions,
    ) -> Result<Option<WorkItem>>;
}

/// Client for one collection (and optionally one project) on a server.
#[derive(Clone)]
pub struct WorkItemClient {
    transport: Arc<dyn HttpTransport>,
    server_url: String,
    collection: String,
    project: Option<String>,
    api_root: String,
    project_api_root: String,
    api_version: String,
}

impl WorkItemClient {
    /// `project_name` is `Collection` or `Collection/Project`.
    pub fn new(transport: Arc<dyn HttpTransport>, server_url: &str, project_name: &str) -> Self {
        let server_url = if server_url.ends_with('/') {
            server_url.to_string()
        } else {
            format!("{server_url}/")
        };

        let mut parts = project_name.splitn(2, '/');
        let collection = parts.next().unwrap_or_default().trim().to_string();
        let project = parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from);

        let api_root = format!("{}/_apis/", urlencoding::encode(&collection));
        let project_api_root = match &project {
            Some(project) => format!(
                "{}/{}/_apis/",
                urlencoding::encode(&collection),
                urlencoding::encode(project)
            ),
            None => api_root.clone(),
        };

        Self {
            transport,
            server_url,
            collection,
            project,
            api_root,
            project_api_root,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut transport = ReqwestTransport::new(config.server_url.as_str());
        if let Some(token) = &config.personal_access_token {
            transport = transport.with_personal_access_token(token);
        }
        if let Some(secs) = config.timeout_secs {
            transport = transport
                .with_timeout(Duration::from_secs(secs))
                .map_err(|e| ClientError::transport("build client", e))?;
        }
        Ok(Self::new(Arc::new(transport), &config.server_url, &config.project)
            .with_api_version(&config.api_version))
    }

    pub fn with_api_version(mut self, api_version: &str) -> Self {
        self.api_version = api_version.to_string();
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn service(&self) -> Arc<dyn WorkItemService> {
        Arc::new(self.clone())
    }

    fn work_item_resource(&self, id: i32) -> String {
        format!("{}{WORK_ITEMS_PATH}/{id}", self.project_api_root)
    }

    /// Create a work item of the given server type name.
    pub async fn create_work_item<I, K, V>(
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
        if type_name.trim().is_empty() {
            return Err(ClientError::invalid("type_name", "work item type is empty"));
        }
        let resource = format!(
            "{}{WORK_ITEMS_PATH}/${}",
            self.project_api_root,
            urlencoding::encode(type_name)
        );
        let request = patch::create_work_item(fields, relations, options, &self.api_version);

        tracing::debug!(%resource, operations = request.operations.len(), "creating work item");
        let response = self
            .transport
            .post_json(&resource, &request.body(), &request.query, &request.headers())
            .await
            .map_err(|e| ClientError::transport("create work item", e))?;
        self.item_from_response("create work item", response)
    }

    pub async fn create_work_item_of_type<I, K, V>(
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
        let type_name = item_type
            .type_name()
            .ok_or_else(|| ClientError::invalid("item_type", "work item type must not be Unknown"))?;
        self.create_work_item(type_name, fields, relations, &PatchOptions::default())
            .await
    }

    /// Create a new item of the same type carrying `source`'s fields, minus
    /// server-managed ones. `overrides` win over copied values.
    pub async fn copy_work_item(
        &self,
        source: &WorkItem,
        overrides: &PendingFields,
    ) -> Result<Option<WorkItem>> {
        let type_name = source.item_type_name().ok_or_else(|| {
            ClientError::invalid("source", format!("work item {} has no type name", source.id()))
        })?;
        let fields = copy_fields(source, overrides);
        self.create_work_item(type_name, &fields, &[], &PatchOptions::default())
            .await
    }

    pub async fn copy_work_item_by_id(
        &self,
        source_id: i32,
        overrides: &PendingFields,
    ) -> Result<Option<WorkItem>> {
        match self.get_single_work_item(source_id, None, Expand::All).await? {
            Some(source) => self.copy_work_item(&source, overrides).await,
            None => Ok(None),
        }
    }

    async fn send_patch(
        &self,
        operation: &'static str,
        resource: String,
        request: PatchRequest,
    ) -> Result<Option<WorkItem>> {
        tracing::debug!(%resource, operations = request.operations.len(), "{operation}");
        let response = self
            .transport
            .patch_json(&resource, &request.body(), &request.query, &request.headers())
            .await
            .map_err(|e| ClientError::transport(operation, e))?;
        self.item_from_response(operation, response)
    }

    fn item_from_response(
        &self,
        operation: &'static str,
        response: HttpResponse,
    ) -> Result<Option<WorkItem>> {
        if !response.is_success() {
            tracing::warn!(status = response.status, "{operation} was not successful");
            return Ok(None);
        }
        parse::parse_work_item(&self.service(), &response.body)
            .map(Some)
            .map_err(|e| ClientError::parse(operation, e))
    }
}

fn copy_fields(source: &WorkItem, overrides: &PendingFields) -> PendingFields {
    let mut fields: PendingFields = source
        .field_names()
        .into_iter()
        .filter(|name| !COPY_IGNORED_FIELDS.contains(name))
        .filter_map(|name| source.get(name).map(|value| (name.to_string(), value)))
        .collect();
    for (name, value) in overrides {
        if fields.contains_key(name) {
            fields.insert(name.clone(), value.clone());
        }
    }
    fields
}

#[async_trait]
impl WorkItemService for WorkItemClient {
    async fn get_work_items(
        &self,
        ids: &[i32],
        fields: Option<&[String]>,
        expand: Expand,
        batch_size: usize,
    ) -> Result<Vec<WorkItem>> {
        const OPERATION: &str = "get work items";
        let service = self.service();
        let resource = format!("{}{WORK_ITEMS_PATH}", self.api_root);

        batch::fetch_in_batches(ids, batch_size, |chunk| {
            let query = batch::read_query(chunk, fields, expand, &self.api_version);
            let service = Arc::clone(&service);
            let resource = resource.clone();
            tracing::debug!(%resource, ids = %batch::join_ids(chunk), "fetching work items");
            async move {
                let response = self
                    .transport
                    .get(&resource, &query)
                    .await
                    .map_err(|e| ClientError::transport(OPERATION, e))?;
                if !response.is_success() {
                    return Err(ClientError::UnsuccessfulResponse {
                        operation: OPERATION,
                        status: response.status,
                    });
                }
                let items = parse::parse_work_items(&service, &response.body)
                    .map_err(|e| ClientError::parse(OPERATION, e))?;
                Ok(items.unwrap_or_default())
            }
        })
        .await
    }

    async fn update_work_item_fields(
        &self,
        id: i32,
        fields: &PendingFields,
        options: &PatchOptions,
    ) -> Result<Option<WorkItem>> {
        let request = patch::update_fields(fields, options, &self.api_version);
        self.send_patch("update work item fields", self.work_item_resource(id), request)
            .await
    }

    async fn add_relation_link(
        &self,
        source_id: i32,
        target_id: i32,
        relation_type_name: &str,
        attributes: Option<&Map<String, Value>>,
        options: &PatchOptions,
    ) -> Result<Option<WorkItem>> {
        let target_url = patch::relation_target_url(&self.server_url, &self.api_root, target_id);
        let request = patch::add_relation(
            relation_type_name,
            &target_url,
            attributes,
            options,
            &self.api_version,
        )?;
        self.send_patch("add relation link", self.work_item_resource(source_id), request)
            .await
    }

    async fn remove_relation_link(
        &self,
        id: i32,
        relation_index: usize,
        options: &PatchOptions,
    ) -> Result<Option<WorkItem>> {
        let request = patch::remove_relation(relation_index, options, &self.api_version);
        self.send_patch("remove relation link", self.work_item_resource(id), request)
            .await
    }
}
