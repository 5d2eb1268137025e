//! Object Storage and Secret Access Adapter
//!
//! Talks to the storage JSON API for the resolved cloud project and reads
//! named secrets from the managed secret store. Every request asks the token
//! source for a fresh bearer token.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{media_content, parse_args, read_bytes, read_json, ToolAdapter, ToolDescriptor};
use crate::config::{HttpSettings, SecretStoreSettings, Settings, StorageSettings};
use crate::error::{Result, SwitchboardError};
use crate::secrets::store::{build_http_client, AccessTokenSource};
use crate::secrets::{ManagedSecretStore, SecretManagerClient, SecretsResolver};

pub const ADAPTER_NAME: &str = "storage";

pub const TOOL_LIST_BUCKETS: &str = "storage_list_buckets";
pub const TOOL_LIST_OBJECTS: &str = "storage_list_objects";
pub const TOOL_READ_OBJECT: &str = "storage_read_object";
pub const TOOL_WRITE_OBJECT: &str = "storage_write_object";
pub const TOOL_ACCESS_SECRET: &str = "storage_access_secret";

/// Arguments for `storage_list_buckets`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListBucketsArgs {
    /// Only buckets whose names start with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Arguments for `storage_list_objects`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListObjectsArgs {
    /// Bucket name
    pub bucket: String,

    /// Only objects whose names start with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Arguments for `storage_read_object`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadObjectArgs {
    pub bucket: String,

    /// Object name (may contain `/`)
    pub object: String,
}

/// Arguments for `storage_write_object`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteObjectArgs {
    pub bucket: String,
    pub object: String,

    /// Object content as text
    pub content: String,

    /// MIME type stored with the object
    pub content_type: String,
}

/// Arguments for `storage_access_secret`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AccessSecretArgs {
    /// Secret name (latest version is read)
    pub name: String,
}

/// `{base}/storage/v1/b/{bucket}/o[/{object}]` with each segment percent-encoded
pub fn object_url(base_url: &str, bucket: &str, object: Option<&str>) -> Result<Url> {
    let mut segments = vec!["storage", "v1", "b", bucket, "o"];
    if let Some(object) = object {
        segments.push(object);
    }
    api_url(base_url, &segments)
}

fn api_url(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| SwitchboardError::config_error(format!("Invalid storage URL '{base_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|()| SwitchboardError::config_error(format!("Storage URL cannot be a base: {base_url}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

struct StorageClient {
    http: Client,
    base_url: String,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
    secrets: Arc<dyn ManagedSecretStore>,
}

impl StorageClient {
    fn url(&self, operation: &str, segments: &[&str]) -> Result<Url> {
        api_url(&self.base_url, segments).map_err(|e| failed(operation, &e))
    }

    fn object_url(&self, operation: &str, bucket: &str, object: Option<&str>) -> Result<Url> {
        object_url(&self.base_url, bucket, object).map_err(|e| failed(operation, &e))
    }

    async fn request(&self, operation: &str, method: Method, url: Url) -> Result<RequestBuilder> {
        let token = self.tokens.access_token().await.map_err(|e| failed(operation, &e))?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }
}

fn failed(operation: &str, cause: &SwitchboardError) -> SwitchboardError {
    SwitchboardError::operation_failed(operation, cause.message())
}

/// Object storage and secret access adapter
pub struct StorageAdapter {
    resolver: Arc<SecretsResolver>,
    settings: StorageSettings,
    secret_store: SecretStoreSettings,
    http_settings: HttpSettings,
    tokens: Option<Arc<dyn AccessTokenSource>>,
    client: Option<StorageClient>,
}

impl StorageAdapter {
    pub fn new(resolver: Arc<SecretsResolver>, settings: &Settings) -> Self {
        Self {
            resolver,
            settings: settings.storage.clone(),
            secret_store: settings.secret_store.clone(),
            http_settings: settings.http.clone(),
            tokens: None,
            client: None,
        }
    }

    /// Use `tokens` instead of the CLI probe for bearer tokens
    #[must_use]
    pub fn with_token_source(mut self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn client(&self, operation: &str) -> Result<&StorageClient> {
        self.client.as_ref().ok_or_else(|| SwitchboardError::uninitialized(ADAPTER_NAME, operation))
    }

    pub async fn list_buckets(&self, args: ListBucketsArgs) -> Result<Value> {
        let client = self.client(TOOL_LIST_BUCKETS)?;
        let url = client.url(TOOL_LIST_BUCKETS, &["storage", "v1", "b"])?;

        let mut query = vec![("project", client.project_id.clone())];
        if let Some(prefix) = args.prefix {
            query.push(("prefix", prefix));
        }

        let request = client.request(TOOL_LIST_BUCKETS, Method::GET, url).await?;
        read_json(TOOL_LIST_BUCKETS, request.query(&query).send().await).await
    }

    pub async fn list_objects(&self, args: ListObjectsArgs) -> Result<Value> {
        let client = self.client(TOOL_LIST_OBJECTS)?;
        let url = client.object_url(TOOL_LIST_OBJECTS, &args.bucket, None)?;

        let mut request = client.request(TOOL_LIST_OBJECTS, Method::GET, url).await?;
        if let Some(prefix) = &args.prefix {
            request = request.query(&[("prefix", prefix)]);
        }
        read_json(TOOL_LIST_OBJECTS, request.send().await).await
    }

    pub async fn read_object(&self, args: ReadObjectArgs) -> Result<Value> {
        let client = self.client(TOOL_READ_OBJECT)?;
        let url = client.object_url(TOOL_READ_OBJECT, &args.bucket, Some(&args.object))?;

        let request = client.request(TOOL_READ_OBJECT, Method::GET, url).await?;
        let bytes = read_bytes(TOOL_READ_OBJECT, request.query(&[("alt", "media")]).send().await).await?;

        let mut result = media_content(bytes);
        result["bucket"] = json!(args.bucket);
        result["object"] = json!(args.object);
        Ok(result)
    }

    pub async fn write_object(&self, args: WriteObjectArgs) -> Result<Value> {
        let client = self.client(TOOL_WRITE_OBJECT)?;
        if args.content_type.trim().is_empty() {
            return Err(SwitchboardError::invalid_input("content_type must not be empty"));
        }

        let url = client.url(TOOL_WRITE_OBJECT, &["upload", "storage", "v1", "b", &args.bucket, "o"])?;
        let request = client.request(TOOL_WRITE_OBJECT, Method::POST, url).await?;
        let response = request
            .query(&[("uploadType", "media"), ("name", args.object.as_str())])
            .header("Content-Type", args.content_type)
            .body(args.content)
            .send()
            .await;
        read_json(TOOL_WRITE_OBJECT, response).await
    }

    pub async fn access_secret(&self, args: AccessSecretArgs) -> Result<Value> {
        let client = self.client(TOOL_ACCESS_SECRET)?;
        let value = client
            .secrets
            .access_latest(&args.name)
            .await
            .map_err(|e| failed(TOOL_ACCESS_SECRET, &e))?;
        Ok(json!({ "name": args.name, "value": value }))
    }

    #[must_use]
    pub fn catalogue() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new::<ListBucketsArgs>(TOOL_LIST_BUCKETS, "List buckets in the cloud project"),
            ToolDescriptor::new::<ListObjectsArgs>(TOOL_LIST_OBJECTS, "List objects in a bucket"),
            ToolDescriptor::new::<ReadObjectArgs>(TOOL_READ_OBJECT, "Read an object's content"),
            ToolDescriptor::new::<WriteObjectArgs>(TOOL_WRITE_OBJECT, "Upload an object"),
            ToolDescriptor::new::<AccessSecretArgs>(
                TOOL_ACCESS_SECRET,
                "Read the latest version of a managed secret",
            ),
        ]
    }
}

#[async_trait]
impl ToolAdapter for StorageAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn initialize(&mut self) -> bool {
        self.client = None;

        let Some(project_id) = self.resolver.cloud_context().and_then(|c| c.project()) else {
            debug!("cloud project absent; storage adapter left uninitialized");
            return false;
        };

        let http = match build_http_client(&self.http_settings) {
            Ok(http) => http,
            Err(e) => {
                warn!(error = %e, "storage client could not be built");
                return false;
            }
        };

        let tokens = self
            .tokens
            .clone()
            .unwrap_or_else(|| Arc::new(self.resolver.probe().clone()) as Arc<dyn AccessTokenSource>);
        let secrets: Arc<dyn ManagedSecretStore> = Arc::new(SecretManagerClient::new(
            http.clone(),
            &self.secret_store,
            project_id,
            Arc::clone(&tokens),
        ));

        self.client = Some(StorageClient {
            http,
            base_url: self.settings.api_base_url.clone(),
            project_id: project_id.to_string(),
            tokens,
            secrets,
        });
        true
    }

    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        Self::catalogue()
    }

    async fn call(&self, tool: &str, arguments: Value) -> Result<Value> {
        match tool {
            TOOL_LIST_BUCKETS => self.list_buckets(parse_args(tool, arguments)?).await,
            TOOL_LIST_OBJECTS => self.list_objects(parse_args(tool, arguments)?).await,
            TOOL_READ_OBJECT => self.read_object(parse_args(tool, arguments)?).await,
            TOOL_WRITE_OBJECT => self.write_object(parse_args(tool, arguments)?).await,
            TOOL_ACCESS_SECRET => self.access_secret(parse_args(tool, arguments)?).await,
            other => Err(SwitchboardError::invalid_input(format!("Unknown storage tool: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::resolver_from_env;
    use crate::secrets::store::StaticToken;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use mockito::Matcher;

    struct LoggedOut;

    #[async_trait]
    impl AccessTokenSource for LoggedOut {
        async fn access_token(&self) -> Result<String> {
            Err(SwitchboardError::credential_source("gcloud", "not logged in"))
        }
    }

    async fn connected(base_url: &str) -> StorageAdapter {
        connected_with(base_url, Arc::new(StaticToken("ya29.test".to_string()))).await
    }

    async fn connected_with(base_url: &str, tokens: Arc<dyn AccessTokenSource>) -> StorageAdapter {
        let mut settings = Settings::default();
        settings.storage.api_base_url = base_url.to_string();
        settings.secret_store.base_url = base_url.to_string();

        let mut adapter =
            StorageAdapter::new(resolver_from_env(&[("CLOUD_PROJECT", "demo")]).await, &settings)
                .with_token_source(tokens);
        assert!(adapter.initialize());
        adapter
    }

    #[test]
    fn test_object_url_encodes_object_name() {
        let url = object_url("https://storage.example.com/", "assets", Some("reports/2024 q1.csv")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.example.com/storage/v1/b/assets/o/reports%2F2024%20q1.csv"
        );
    }

    #[tokio::test]
    async fn test_uninitialized_without_project() {
        let mut adapter = StorageAdapter::new(resolver_from_env(&[]).await, &Settings::default());
        assert!(!adapter.initialize());

        let err = adapter.call(TOOL_LIST_BUCKETS, Value::Null).await.unwrap_err();
        assert_eq!(err.error_code(), "UNINITIALIZED");
        assert_eq!(err.operation(), Some(TOOL_LIST_BUCKETS));
    }

    #[tokio::test]
    async fn test_list_buckets_uses_project() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/storage/v1/b")
            .match_query(Matcher::UrlEncoded("project".into(), "demo".into()))
            .match_header("authorization", "Bearer ya29.test")
            .with_status(200)
            .with_body(r#"{"items": [{"name": "assets"}]}"#)
            .create_async()
            .await;

        let buckets = connected(&server.url()).await.call(TOOL_LIST_BUCKETS, json!({})).await.unwrap();

        assert_eq!(buckets["items"][0]["name"], "assets");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_read_object_as_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/storage/v1/b/assets/o/notes.txt")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(200)
            .with_body("hello world")
            .create_async()
            .await;

        let object = connected(&server.url())
            .await
            .call(TOOL_READ_OBJECT, json!({"bucket": "assets", "object": "notes.txt"}))
            .await
            .unwrap();

        assert_eq!(object["content"], "hello world");
        assert_eq!(object["encoding"], "utf-8");
        assert_eq!(object["object"], "notes.txt");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_write_object_sends_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload/storage/v1/b/assets/o")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("uploadType".into(), "media".into()),
                Matcher::UrlEncoded("name".into(), "data/out.json".into()),
            ]))
            .match_header("content-type", "application/json")
            .match_body(r#"{"ok":true}"#)
            .with_status(200)
            .with_body(r#"{"name": "data/out.json", "size": "11"}"#)
            .create_async()
            .await;

        let stored = connected(&server.url())
            .await
            .call(
                TOOL_WRITE_OBJECT,
                json!({
                    "bucket": "assets",
                    "object": "data/out.json",
                    "content": r#"{"ok":true}"#,
                    "content_type": "application/json"
                }),
            )
            .await
            .unwrap();

        assert_eq!(stored["name"], "data/out.json");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_access_secret_through_store() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/projects/demo/secrets/api-key/versions/latest:access")
            .match_header("authorization", "Bearer ya29.test")
            .with_status(200)
            .with_body(json!({"payload": {"data": STANDARD.encode("s3cr3t")}}).to_string())
            .create_async()
            .await;

        let secret = connected(&server.url())
            .await
            .call(TOOL_ACCESS_SECRET, json!({"name": "api-key"}))
            .await
            .unwrap();

        assert_eq!(secret, json!({"name": "api-key", "value": "s3cr3t"}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_access_secret_failure_names_tool() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/projects/demo/secrets/gone/versions/latest:access")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let err = connected(&server.url())
            .await
            .call(TOOL_ACCESS_SECRET, json!({"name": "gone"}))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "OPERATION_FAILED");
        assert_eq!(err.operation(), Some(TOOL_ACCESS_SECRET));
        assert!(err.message().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn test_token_failure_names_each_tool() {
        let adapter = connected_with("http://127.0.0.1:9", Arc::new(LoggedOut)).await;
        let calls = [
            (TOOL_LIST_BUCKETS, json!({})),
            (TOOL_LIST_OBJECTS, json!({"bucket": "assets"})),
            (TOOL_READ_OBJECT, json!({"bucket": "assets", "object": "a.txt"})),
            (
                TOOL_WRITE_OBJECT,
                json!({"bucket": "assets", "object": "a.txt", "content": "x", "content_type": "text/plain"}),
            ),
        ];

        for (tool, arguments) in calls {
            let err = adapter.call(tool, arguments).await.unwrap_err();
            assert_eq!(err.error_code(), "OPERATION_FAILED");
            assert_eq!(err.operation(), Some(tool));
            assert!(err.message().contains(tool), "{}", err.message());
            assert!(err.message().contains("not logged in"), "{}", err.message());
        }
    }

    #[tokio::test]
    async fn test_invalid_base_url_names_tool() {
        let adapter = connected("not a url").await;
        let err = adapter.call(TOOL_LIST_OBJECTS, json!({"bucket": "assets"})).await.unwrap_err();

        assert_eq!(err.error_code(), "OPERATION_FAILED");
        assert_eq!(err.operation(), Some(TOOL_LIST_OBJECTS));
    }
}
