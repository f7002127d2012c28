//! REST implementation of [`CatalogGateway`].
//!
//! Resource layout:
//!
//! ```text
//! {parent}/glossaries/{glossary}
//! {parent}/glossaries/{glossary}/categories/{category}
//! {parent}/glossaries/{glossary}/terms/{term}
//! ```
//!
//! A term's `parent` is its category's resource name, or the glossary's
//! when it has no category.
//!
//! The catalog refuses to delete a glossary that still has children, so
//! [`HttpCatalogGateway::ensure_glossary_absent`] deletes terms, then
//! categories (deepest first), then the glossary. Calls answered with a
//! long-running operation are polled until the operation is done.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use glossary_core::{
    CatalogGateway, CreateOutcome, DeleteOutcome, GatewayError, GatewayResult, NewCategory,
    NewTerm, ResourceSlug,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CatalogConfig;

const USER_AGENT: &str = concat!("glossary-catalog-client/", env!("CARGO_PKG_VERSION"));
const LIST_PAGE_SIZE: &str = "1000";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GlossaryBody<'a> {
    display_name: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryBody<'a> {
    display_name: &'a str,
    description: &'a str,
    parent: String,
    #[serde(skip_serializing_if = "no_labels")]
    labels: &'a BTreeMap<String, String>,
}

fn no_labels(labels: &&BTreeMap<String, String>) -> bool {
    labels.is_empty()
}

/// Long-running operation envelope.
#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationStatus>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// One page of a term or category listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default, alias = "terms", alias = "categories")]
    items: Vec<ChildResource>,
    #[serde(default)]
    next_page_token: String,
}

#[derive(Debug, Deserialize)]
struct ChildResource {
    name: String,
    #[serde(default)]
    parent: String,
}

/// The body as a long-running operation, if it is one.
fn operation(body: &str) -> Option<Operation> {
    serde_json::from_str::<Operation>(body)
        .ok()
        .filter(|op| op.name.contains("/operations/"))
}

/// HTTP status equivalent of an operation's RPC status code.
fn rpc_status(code: i32) -> StatusCode {
    match code {
        0 => StatusCode::OK,
        3 | 9 | 11 => StatusCode::BAD_REQUEST,
        4 => StatusCode::GATEWAY_TIMEOUT,
        5 => StatusCode::NOT_FOUND,
        6 | 10 => StatusCode::CONFLICT,
        7 => StatusCode::FORBIDDEN,
        8 => StatusCode::TOO_MANY_REQUESTS,
        14 => StatusCode::SERVICE_UNAVAILABLE,
        16 => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Categories ordered so that nested ones come before their parents.
fn deepest_first(mut categories: Vec<ChildResource>) -> Vec<ChildResource> {
    let parents: HashMap<String, String> = categories
        .iter()
        .map(|c| (c.name.clone(), c.parent.clone()))
        .collect();
    let depth = |name: &str| {
        let mut level = 0;
        let mut current = name;
        while let Some(parent) = parents.get(current) {
            level += 1;
            // A cycle would never end; no real tree is deeper than this.
            if level > parents.len() {
                break;
            }
            current = parent.as_str();
        }
        level
    };
    categories.sort_by_cached_key(|c| Reverse(depth(&c.name)));
    categories
}

/// Map a create response status onto the gateway's tagged result.
pub fn classify_create(status: StatusCode, body: &str) -> GatewayResult<CreateOutcome> {
    if status.is_success() {
        return Ok(CreateOutcome::Created);
    }
    match status {
        StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
        _ => Err(classify_failure(status, body)),
    }
}

/// Map a delete response status onto the gateway's tagged result.
pub fn classify_delete(status: StatusCode, body: &str) -> GatewayResult<DeleteOutcome> {
    if status.is_success() {
        return Ok(DeleteOutcome::Deleted);
    }
    match status {
        StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
        _ => Err(classify_failure(status, body)),
    }
}

fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::PermissionDenied(message),
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => {
            GatewayError::Transport(format!("status {}: {}", status.as_u16(), message))
        }
        _ => GatewayError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

/// Extract `error.message` from a Google-style error body, else the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

/// Catalog gateway speaking the glossary REST API.
pub struct HttpCatalogGateway {
    config: CatalogConfig,
    http_client: reqwest::Client,
}

impl HttpCatalogGateway {
    /// Create a new gateway client
    pub fn new(config: CatalogConfig) -> GatewayResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(transport_error)?;

        Ok(HttpCatalogGateway {
            config,
            http_client,
        })
    }

    /// Resource name of a glossary.
    pub fn glossary_name(&self, glossary_id: &ResourceSlug) -> String {
        format!("{}/glossaries/{}", self.config.parent(), glossary_id)
    }

    /// Resource name of a category.
    pub fn category_name(&self, glossary_id: &ResourceSlug, slug: &ResourceSlug) -> String {
        format!("{}/categories/{}", self.glossary_name(glossary_id), slug)
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/v1/{}", self.config.endpoint, resource)
    }

    /// Send with credentials; returns the status and body text.
    async fn send(&self, request: reqwest::RequestBuilder) -> GatewayResult<(StatusCode, String)> {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Ok((status, text))
    }

    /// Wait for a long-running operation answer to finish.
    ///
    /// Non-operation answers pass through unchanged. A finished operation
    /// is turned back into a status and message so the usual
    /// classification applies.
    async fn settle(&self, status: StatusCode, body: String) -> GatewayResult<(StatusCode, String)> {
        if !status.is_success() {
            return Ok((status, body));
        }
        let Some(mut op) = operation(&body) else {
            return Ok((status, body));
        };

        let mut polls = 0;
        while !op.done {
            if polls >= self.config.poll_attempts {
                return Err(GatewayError::Transport(format!(
                    "operation {} still running after {} polls",
                    op.name, polls
                )));
            }
            polls += 1;
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;

            let name = op.name.clone();
            debug!("Polling operation {}", name);
            let (status, text) = self.send(self.http_client.get(self.url(&name))).await?;
            if !status.is_success() {
                return Err(classify_failure(status, &text));
            }
            op = serde_json::from_str(&text)
                .map_err(|e| GatewayError::Decode(format!("operation {name}: {e}")))?;
        }

        match op.error {
            Some(err) if err.code != 0 => Ok((rpc_status(err.code), err.message)),
            _ => Ok((StatusCode::OK, String::new())),
        }
    }

    async fn post_create<B: Serialize + Sync + ?Sized>(
        &self,
        collection: &str,
        id_param: &str,
        id: &ResourceSlug,
        body: &B,
    ) -> GatewayResult<CreateOutcome> {
        let url = self.url(collection);
        debug!("POST {}?{}={}", url, id_param, id);

        let request = self
            .http_client
            .post(&url)
            .query(&[(id_param, id.as_str())])
            .json(body);
        let (status, text) = self.send(request).await?;
        let (status, text) = self.settle(status, text).await?;
        classify_create(status, &text)
    }

    async fn delete_resource(&self, name: &str) -> GatewayResult<DeleteOutcome> {
        debug!("DELETE {}", name);
        let (status, text) = self.send(self.http_client.delete(self.url(name))).await?;
        let (status, text) = self.settle(status, text).await?;
        classify_delete(status, &text)
    }

    /// Every term or category of a glossary, following page tokens.
    async fn list_children(
        &self,
        glossary: &str,
        collection: &str,
    ) -> GatewayResult<Vec<ChildResource>> {
        let url = self.url(&format!("{glossary}/{collection}"));
        let mut children = Vec::new();
        let mut page_token = String::new();
        loop {
            let mut request = self.http_client.get(&url).query(&[("pageSize", LIST_PAGE_SIZE)]);
            if !page_token.is_empty() {
                request = request.query(&[("pageToken", page_token.as_str())]);
            }
            let (status, text) = self.send(request).await?;
            if !status.is_success() {
                return Err(classify_failure(status, &text));
            }
            let page: ListPage = serde_json::from_str(&text)
                .map_err(|e| GatewayError::Decode(format!("{collection} listing: {e}")))?;
            children.extend(page.items);
            if page.next_page_token.is_empty() {
                return Ok(children);
            }
            page_token = page.next_page_token;
        }
    }
}

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    async fn ensure_glossary_absent(
        &self,
        glossary_id: &ResourceSlug,
    ) -> GatewayResult<DeleteOutcome> {
        let glossary = self.glossary_name(glossary_id);
        let (status, text) = self.send(self.http_client.get(self.url(&glossary))).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        let terms = self.list_children(&glossary, "terms").await?;
        let categories = deepest_first(self.list_children(&glossary, "categories").await?);
        info!(
            "Deleting glossary {} with {} categories and {} terms",
            glossary_id,
            categories.len(),
            terms.len()
        );
        for term in &terms {
            self.delete_resource(&term.name).await?;
        }
        for category in &categories {
            self.delete_resource(&category.name).await?;
        }
        self.delete_resource(&glossary).await
    }

    async fn create_glossary(
        &self,
        glossary_id: &ResourceSlug,
        display_name: &str,
        description: &str,
    ) -> GatewayResult<CreateOutcome> {
        let collection = format!("{}/glossaries", self.config.parent());
        let body = GlossaryBody {
            display_name,
            description,
        };
        self.post_create(&collection, "glossaryId", glossary_id, &body)
            .await
    }

    async fn create_category(
        &self,
        glossary_id: &ResourceSlug,
        category: &NewCategory,
    ) -> GatewayResult<CreateOutcome> {
        let glossary = self.glossary_name(glossary_id);
        let body = EntryBody {
            display_name: &category.display_name,
            description: &category.description,
            parent: glossary.clone(),
            labels: &category.labels,
        };
        self.post_create(
            &format!("{glossary}/categories"),
            "categoryId",
            &category.slug,
            &body,
        )
        .await
    }

    async fn create_term(
        &self,
        glossary_id: &ResourceSlug,
        term: &NewTerm,
    ) -> GatewayResult<CreateOutcome> {
        let glossary = self.glossary_name(glossary_id);
        let parent = match &term.parent_category {
            Some(category) => self.category_name(glossary_id, category),
            None => glossary.clone(),
        };
        let body = EntryBody {
            display_name: &term.display_name,
            description: &term.description,
            parent,
            labels: &term.labels,
        };
        self.post_create(&format!("{glossary}/terms"), "termId", &term.slug, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossary_core::slugify;

    fn gateway() -> HttpCatalogGateway {
        HttpCatalogGateway::new(CatalogConfig::new("http://catalog.local", "acme", "us")).unwrap()
    }

    #[test]
    fn test_resource_names() {
        let gw = gateway();
        let gid = slugify("business_glossary_v1", 63).unwrap();
        let cat = slugify("Clinical Data", 63).unwrap();

        assert_eq!(
            gw.glossary_name(&gid),
            "projects/acme/locations/us/glossaries/business-glossary-v1"
        );
        assert_eq!(
            gw.category_name(&gid, &cat),
            "projects/acme/locations/us/glossaries/business-glossary-v1/categories/clinical-data"
        );
        assert_eq!(
            gw.url(&gw.glossary_name(&gid)),
            "http://catalog.local/v1/projects/acme/locations/us/glossaries/business-glossary-v1"
        );
    }

    #[test]
    fn test_classify_create() {
        assert_eq!(
            classify_create(StatusCode::OK, "{}").unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            classify_create(StatusCode::CONFLICT, "").unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert!(matches!(
            classify_create(StatusCode::FORBIDDEN, ""),
            Err(GatewayError::PermissionDenied(_))
        ));
        assert!(matches!(
            classify_create(StatusCode::SERVICE_UNAVAILABLE, ""),
            Err(GatewayError::Transport(_))
        ));
        assert!(matches!(
            classify_create(StatusCode::BAD_REQUEST, ""),
            Err(GatewayError::Rejected { status: 400, .. })
        ));
    }

    #[test]
    fn test_classify_delete() {
        assert_eq!(
            classify_delete(StatusCode::NO_CONTENT, "").unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            classify_delete(StatusCode::NOT_FOUND, "").unwrap(),
            DeleteOutcome::NotFound
        );
        assert!(classify_delete(StatusCode::UNAUTHORIZED, "")
            .unwrap_err()
            .is_permission());
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"code":403,"message":"Permission 'dataplex.glossaries.delete' denied","status":"PERMISSION_DENIED"}}"#;
        match classify_delete(StatusCode::FORBIDDEN, body) {
            Err(GatewayError::PermissionDenied(msg)) => {
                assert_eq!(msg, "Permission 'dataplex.glossaries.delete' denied")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(error_message("  plain text \n"), "plain text");
    }

    #[test]
    fn test_operation_detection() {
        let pending = r#"{"name":"projects/p/locations/us/operations/op-1","done":false}"#;
        let op = operation(pending).unwrap();
        assert!(!op.done);

        let resource = r#"{"name":"projects/p/locations/us/glossaries/g/terms/t"}"#;
        assert!(operation(resource).is_none());
        assert!(operation("").is_none());
    }

    #[test]
    fn test_rpc_status_mapping() {
        assert_eq!(rpc_status(6), StatusCode::CONFLICT);
        assert_eq!(rpc_status(5), StatusCode::NOT_FOUND);
        assert!(classify_create(rpc_status(7), "denied")
            .unwrap_err()
            .is_permission());
        assert!(matches!(
            classify_delete(rpc_status(9), "glossary is not empty"),
            Err(GatewayError::Rejected { status: 400, .. })
        ));
    }

    #[test]
    fn test_nested_categories_sorted_before_parents() {
        let g = "projects/p/locations/us/glossaries/g";
        let child = |name: &str, parent: &str| ChildResource {
            name: format!("{g}/categories/{name}"),
            parent: parent.to_string(),
        };
        let sorted = deepest_first(vec![
            child("top", g),
            child("mid", &format!("{g}/categories/top")),
            child("leaf", &format!("{g}/categories/mid")),
            child("other", g),
        ]);
        let names: Vec<_> = sorted
            .iter()
            .map(|c| c.name.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(names, vec!["leaf", "mid", "top", "other"]);
    }

    #[test]
    fn test_list_page_accepts_both_collections() {
        let terms: ListPage =
            serde_json::from_str(r#"{"terms":[{"name":"a"}],"nextPageToken":"n"}"#).unwrap();
        assert_eq!(terms.items.len(), 1);
        assert_eq!(terms.next_page_token, "n");

        let empty: ListPage = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_entry_body_serialization() {
        let empty = BTreeMap::new();
        let body = EntryBody {
            display_name: "Patient ID",
            description: "Unique patient identifier",
            parent: "projects/p/locations/l/glossaries/g".to_string(),
            labels: &empty,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["displayName"], "Patient ID");
        assert_eq!(json["parent"], "projects/p/locations/l/glossaries/g");
        assert!(json.get("labels").is_none());
    }
}
