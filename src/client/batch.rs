use std::future::Future;

use crate::error::{ClientError, Result};
use crate::patch::Expand;

/// Query for one read chunk: `ids`, optional `fields`, `$expand`, `api-version`.
pub(crate) fn read_query(
    ids: &[i32],
    fields: Option<&[String]>,
    expand: Expand,
    api_version: &str,
) -> Vec<(String, String)> {
    let mut query = vec![
        ("ids".to_string(), join_ids(ids)),
        ("$expand".to_string(), expand.as_str().to_string()),
        ("api-version".to_string(), api_version.to_string()),
    ];
    if let Some(fields) = fields {
        query.push(("fields".to_string(), fields.join(",")));
    }
    query
}

pub(crate) fn join_ids(ids: &[i32]) -> String {
    ids.iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Split `ids` into consecutive chunks of at most `batch_size` and fetch them
/// one after another, concatenating results in chunk order. The first failing
/// chunk aborts the whole fetch.
pub(crate) async fn fetch_in_batches<T, F, Fut>(
    ids: &[i32],
    batch_size: usize,
    mut fetch_chunk: F,
) -> Result<Vec<T>>
where
    F: FnMut(&[i32]) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    if batch_size == 0 {
        return Err(ClientError::invalid("batch_size", "must be greater than zero"));
    }

    let mut items = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(batch_size) {
        items.extend(fetch_chunk(chunk).await?);
    }
    Ok(items)
}
