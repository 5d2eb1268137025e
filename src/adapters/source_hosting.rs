//! Source-Hosting Adapter
//!
//! GitHub-style REST client authenticated with the resolved source-hosting
//! token. Responses are passed through as JSON, except file contents which are
//! decoded from base64 into text, or kept as base64 when the file is binary.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, Url};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{media_content, parse_args, read_json, ToolAdapter, ToolDescriptor};
use crate::config::{HttpSettings, Settings, SourceHostingSettings};
use crate::error::{Result, SwitchboardError};
use crate::secrets::store::build_http_client;
use crate::secrets::SecretsResolver;

pub const ADAPTER_NAME: &str = "source_hosting";

pub const TOOL_GET_REPOSITORY: &str = "source_get_repository";
pub const TOOL_LIST_ISSUES: &str = "source_list_issues";
pub const TOOL_CREATE_ISSUE: &str = "source_create_issue";
pub const TOOL_LIST_PULL_REQUESTS: &str = "source_list_pull_requests";
pub const TOOL_CREATE_PULL_REQUEST: &str = "source_create_pull_request";
pub const TOOL_GET_FILE_CONTENTS: &str = "source_get_file_contents";
pub const TOOL_SEARCH: &str = "source_search";

const ACCEPT: &str = "application/vnd.github+json";

/// Repository coordinates
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RepositoryArgs {
    /// Repository owner (user or organization)
    pub owner: String,

    /// Repository name
    pub repo: String,
}

/// Issue or pull request state filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    #[default]
    Open,
    Closed,
    All,
}

impl ItemState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

/// Arguments for listing issues or pull requests
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListArgs {
    pub owner: String,
    pub repo: String,

    /// State filter (default `open`)
    #[serde(default)]
    pub state: ItemState,

    /// Page size, 1-100
    #[serde(default)]
    pub per_page: Option<u32>,
}

/// Arguments for `source_create_issue`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateIssueArgs {
    pub owner: String,
    pub repo: String,

    /// Issue title
    pub title: String,

    /// Issue body (markdown)
    #[serde(default)]
    pub body: Option<String>,

    /// Label names
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// Arguments for `source_create_pull_request`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreatePullRequestArgs {
    pub owner: String,
    pub repo: String,

    /// Pull request title
    pub title: String,

    /// Branch with the changes
    pub head: String,

    /// Branch to merge into
    pub base: String,

    /// Pull request body (markdown)
    #[serde(default)]
    pub body: Option<String>,

    /// Open as a draft
    #[serde(default)]
    pub draft: Option<bool>,
}

/// Arguments for `source_get_file_contents`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FileContentsArgs {
    pub owner: String,
    pub repo: String,

    /// Path within the repository
    pub path: String,

    /// Branch, tag or commit (default branch if omitted)
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

/// What to search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Repositories,
    Code,
    Issues,
}

impl SearchKind {
    fn segment(self) -> &'static str {
        match self {
            Self::Repositories => "repositories",
            Self::Code => "code",
            Self::Issues => "issues",
        }
    }
}

/// Arguments for `source_search`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Search target
    pub kind: SearchKind,

    /// Query in the hosting service's search syntax
    pub query: String,

    /// Page size, 1-100
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: String,
    size: u64,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Decode a file-contents response into `{ path, sha, size, encoding, content }`
///
/// `encoding` is `utf-8` for text files and `base64` for anything else.
/// Directory listings (arrays) are returned unchanged.
pub fn decode_file_contents(response: Value) -> Result<Value> {
    if response.is_array() {
        return Ok(response);
    }

    let entry: ContentEntry = serde_json::from_value(response).map_err(|e| {
        SwitchboardError::operation_failed(TOOL_GET_FILE_CONTENTS, format!("unexpected response: {e}"))
    })?;

    if entry.kind != "file" {
        return Err(SwitchboardError::operation_failed(
            TOOL_GET_FILE_CONTENTS,
            format!("{} is a {}, not a file", entry.path, entry.kind),
        ));
    }

    let bytes = match (entry.encoding.as_deref(), entry.content) {
        (Some("base64"), Some(encoded)) => {
            // Payloads are wrapped at 60 columns
            let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            STANDARD.decode(compact).map_err(|e| {
                SwitchboardError::operation_failed(TOOL_GET_FILE_CONTENTS, format!("invalid base64: {e}"))
            })?
        }
        (_, Some(raw)) => raw.into_bytes(),
        (_, None) => Vec::new(),
    };

    let mut file = media_content(bytes);
    file["path"] = json!(entry.path);
    file["sha"] = json!(entry.sha);
    file["size"] = json!(entry.size);
    Ok(file)
}

/// A single URL path segment taken from tool arguments
fn path_segment<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() || value == "." || value == ".." || value.contains('/') {
        return Err(SwitchboardError::invalid_input(format!("Invalid {field}: '{value}'")));
    }
    Ok(value)
}

/// `repos/{owner}/{repo}` followed by `rest`
fn repository_path<'a>(owner: &'a str, repo: &'a str, rest: &[&'a str]) -> Result<Vec<&'a str>> {
    let mut segments = vec!["repos", path_segment("owner", owner)?, path_segment("repo", repo)?];
    segments.extend_from_slice(rest);
    Ok(segments)
}

struct SourceHostingClient {
    http: Client,
    base_url: String,
    token: String,
}

impl SourceHostingClient {
    fn request(&self, operation: &str, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            SwitchboardError::operation_failed(operation, format!("invalid API URL '{}': {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                let detail = format!("API URL cannot be a base: {}", self.base_url);
                SwitchboardError::operation_failed(operation, detail)
            })?
            .pop_if_empty()
            .extend(segments);

        Ok(self.http.request(method, url).bearer_auth(&self.token).header("Accept", ACCEPT))
    }
}

/// Source-hosting adapter
pub struct SourceHostingAdapter {
    resolver: Arc<SecretsResolver>,
    settings: SourceHostingSettings,
    http_settings: HttpSettings,
    client: Option<SourceHostingClient>,
}

impl SourceHostingAdapter {
    pub fn new(resolver: Arc<SecretsResolver>, settings: &Settings) -> Self {
        Self {
            resolver,
            settings: settings.source_hosting.clone(),
            http_settings: settings.http.clone(),
            client: None,
        }
    }

    fn client(&self, operation: &str) -> Result<&SourceHostingClient> {
        self.client.as_ref().ok_or_else(|| SwitchboardError::uninitialized(ADAPTER_NAME, operation))
    }

    pub async fn get_repository(&self, args: RepositoryArgs) -> Result<Value> {
        let client = self.client(TOOL_GET_REPOSITORY)?;
        let path = repository_path(&args.owner, &args.repo, &[])?;
        let request = client.request(TOOL_GET_REPOSITORY, Method::GET, &path)?;
        read_json(TOOL_GET_REPOSITORY, request.send().await).await
    }

    pub async fn list_issues(&self, args: ListArgs) -> Result<Value> {
        self.list(TOOL_LIST_ISSUES, "issues", args).await
    }

    pub async fn list_pull_requests(&self, args: ListArgs) -> Result<Value> {
        self.list(TOOL_LIST_PULL_REQUESTS, "pulls", args).await
    }

    async fn list(&self, operation: &str, collection: &str, args: ListArgs) -> Result<Value> {
        let client = self.client(operation)?;
        let path = repository_path(&args.owner, &args.repo, &[collection])?;

        let mut query = vec![("state", args.state.as_str().to_string())];
        if let Some(per_page) = args.per_page {
            query.push(("per_page", per_page.clamp(1, 100).to_string()));
        }

        read_json(operation, client.request(operation, Method::GET, &path)?.query(&query).send().await).await
    }

    pub async fn create_issue(&self, args: CreateIssueArgs) -> Result<Value> {
        let client = self.client(TOOL_CREATE_ISSUE)?;
        let path = repository_path(&args.owner, &args.repo, &["issues"])?;

        let mut body = json!({ "title": args.title });
        if let Some(text) = args.body {
            body["body"] = json!(text);
        }
        if let Some(labels) = args.labels {
            body["labels"] = json!(labels);
        }

        let request = client.request(TOOL_CREATE_ISSUE, Method::POST, &path)?;
        read_json(TOOL_CREATE_ISSUE, request.json(&body).send().await).await
    }

    pub async fn create_pull_request(&self, args: CreatePullRequestArgs) -> Result<Value> {
        let client = self.client(TOOL_CREATE_PULL_REQUEST)?;
        let path = repository_path(&args.owner, &args.repo, &["pulls"])?;

        let mut body = json!({
            "title": args.title,
            "head": args.head,
            "base": args.base,
        });
        if let Some(text) = args.body {
            body["body"] = json!(text);
        }
        if let Some(draft) = args.draft {
            body["draft"] = json!(draft);
        }

        let request = client.request(TOOL_CREATE_PULL_REQUEST, Method::POST, &path)?;
        read_json(TOOL_CREATE_PULL_REQUEST, request.json(&body).send().await).await
    }

    pub async fn get_file_contents(&self, args: FileContentsArgs) -> Result<Value> {
        let client = self.client(TOOL_GET_FILE_CONTENTS)?;
        let mut path = repository_path(&args.owner, &args.repo, &["contents"])?;
        for segment in args.path.split('/').filter(|segment| !segment.is_empty()) {
            path.push(path_segment("path", segment)?);
        }

        let mut request = client.request(TOOL_GET_FILE_CONTENTS, Method::GET, &path)?;
        if let Some(reference) = &args.reference {
            request = request.query(&[("ref", reference)]);
        }

        decode_file_contents(read_json(TOOL_GET_FILE_CONTENTS, request.send().await).await?)
    }

    pub async fn search(&self, args: SearchArgs) -> Result<Value> {
        let client = self.client(TOOL_SEARCH)?;

        let mut query = vec![("q", args.query)];
        if let Some(per_page) = args.per_page {
            query.push(("per_page", per_page.clamp(1, 100).to_string()));
        }

        let request = client.request(TOOL_SEARCH, Method::GET, &["search", args.kind.segment()])?;
        read_json(TOOL_SEARCH, request.query(&query).send().await).await
    }

    #[must_use]
    pub fn catalogue() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new::<RepositoryArgs>(TOOL_GET_REPOSITORY, "Get repository metadata"),
            ToolDescriptor::new::<ListArgs>(TOOL_LIST_ISSUES, "List issues in a repository"),
            ToolDescriptor::new::<CreateIssueArgs>(TOOL_CREATE_ISSUE, "Create an issue"),
            ToolDescriptor::new::<ListArgs>(TOOL_LIST_PULL_REQUESTS, "List pull requests in a repository"),
            ToolDescriptor::new::<CreatePullRequestArgs>(TOOL_CREATE_PULL_REQUEST, "Open a pull request"),
            ToolDescriptor::new::<FileContentsArgs>(
                TOOL_GET_FILE_CONTENTS,
                "Read a file from a repository (text, or base64 for binary files)",
            ),
            ToolDescriptor::new::<SearchArgs>(TOOL_SEARCH, "Search repositories, code or issues"),
        ]
    }
}

#[async_trait]
impl ToolAdapter for SourceHostingAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn initialize(&mut self) -> bool {
        self.client = None;

        let Some(token) = self.resolver.source_hosting_token() else {
            debug!("source-hosting token absent; adapter left uninitialized");
            return false;
        };

        match build_http_client(&self.http_settings) {
            Ok(http) => {
                self.client = Some(SourceHostingClient {
                    http,
                    base_url: self.settings.api_base_url.trim_end_matches('/').to_string(),
                    token: token.to_string(),
                });
                true
            }
            Err(e) => {
                warn!(error = %e, "source-hosting client could not be built");
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        Self::catalogue()
    }

    async fn call(&self, tool: &str, arguments: Value) -> Result<Value> {
        match tool {
            TOOL_GET_REPOSITORY => self.get_repository(parse_args(tool, arguments)?).await,
            TOOL_LIST_ISSUES => self.list_issues(parse_args(tool, arguments)?).await,
            TOOL_CREATE_ISSUE => self.create_issue(parse_args(tool, arguments)?).await,
            TOOL_LIST_PULL_REQUESTS => self.list_pull_requests(parse_args(tool, arguments)?).await,
            TOOL_CREATE_PULL_REQUEST => self.create_pull_request(parse_args(tool, arguments)?).await,
            TOOL_GET_FILE_CONTENTS => self.get_file_contents(parse_args(tool, arguments)?).await,
            TOOL_SEARCH => self.search(parse_args(tool, arguments)?).await,
            other => Err(SwitchboardError::invalid_input(format!("Unknown source-hosting tool: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::resolver_from_env;
    use mockito::Matcher;

    async fn connected(base_url: &str) -> SourceHostingAdapter {
        let mut settings = Settings::default();
        settings.source_hosting.api_base_url = base_url.to_string();

        let mut adapter =
            SourceHostingAdapter::new(resolver_from_env(&[("SOURCE_HOSTING_TOKEN", "abc123")]).await, &settings);
        assert!(adapter.initialize());
        adapter
    }

    #[tokio::test]
    async fn test_uninitialized_without_token() {
        let mut adapter = SourceHostingAdapter::new(resolver_from_env(&[]).await, &Settings::default());
        assert!(!adapter.initialize());

        let err = adapter
            .call(TOOL_GET_REPOSITORY, json!({"owner": "octo", "repo": "hello"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNINITIALIZED");
        assert_eq!(err.operation(), Some(TOOL_GET_REPOSITORY));
    }

    #[tokio::test]
    async fn test_get_repository_sends_auth_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/octo/hello")
            .match_header("authorization", "Bearer abc123")
            .match_header("accept", ACCEPT)
            .match_header("user-agent", Matcher::Regex("^switchboard/".to_string()))
            .with_status(200)
            .with_body(r#"{"full_name": "octo/hello", "private": false}"#)
            .create_async()
            .await;

        let repo = connected(&server.url())
            .await
            .call(TOOL_GET_REPOSITORY, json!({"owner": "octo", "repo": "hello"}))
            .await
            .unwrap();

        assert_eq!(repo["full_name"], "octo/hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_issues_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/octo/hello/issues")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "closed".into()),
                Matcher::UrlEncoded("per_page".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let issues = connected(&server.url())
            .await
            .call(
                TOOL_LIST_ISSUES,
                json!({"owner": "octo", "repo": "hello", "state": "closed", "per_page": 500}),
            )
            .await
            .unwrap();

        assert_eq!(issues, json!([]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_pull_request_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/octo/hello/pulls")
            .match_body(Matcher::Json(json!({
                "title": "Add feature",
                "head": "feature",
                "base": "main",
                "draft": true
            })))
            .with_status(201)
            .with_body(r#"{"number": 12}"#)
            .create_async()
            .await;

        let pr = connected(&server.url())
            .await
            .call(
                TOOL_CREATE_PULL_REQUEST,
                json!({
                    "owner": "octo", "repo": "hello",
                    "title": "Add feature", "head": "feature", "base": "main", "draft": true
                }),
            )
            .await
            .unwrap();

        assert_eq!(pr["number"], 12);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_file_contents_decodes_base64() {
        let mut server = mockito::Server::new_async().await;
        let encoded = STANDARD.encode("fn main() {}\n");
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        let mock = server
            .mock("GET", "/repos/octo/hello/contents/src/main.rs")
            .match_query(Matcher::UrlEncoded("ref".into(), "dev".into()))
            .with_status(200)
            .with_body(
                json!({
                    "type": "file",
                    "path": "src/main.rs",
                    "sha": "abc",
                    "size": 13,
                    "encoding": "base64",
                    "content": wrapped
                })
                .to_string(),
            )
            .create_async()
            .await;

        let file = connected(&server.url())
            .await
            .call(
                TOOL_GET_FILE_CONTENTS,
                json!({"owner": "octo", "repo": "hello", "path": "src/main.rs", "ref": "dev"}),
            )
            .await
            .unwrap();

        assert_eq!(file["content"], "fn main() {}\n");
        assert_eq!(file["encoding"], "utf-8");
        assert_eq!(file["path"], "src/main.rs");
        mock.assert_async().await;
    }

    #[test]
    fn test_binary_file_kept_as_base64() {
        let png = [0x89, b'P', b'N', b'G', 0xff, 0x00];
        let file = decode_file_contents(json!({
            "type": "file",
            "path": "logo.png",
            "sha": "def",
            "size": 6,
            "encoding": "base64",
            "content": STANDARD.encode(png)
        }))
        .unwrap();

        assert_eq!(file["encoding"], "base64");
        assert_eq!(STANDARD.decode(file["content"].as_str().unwrap()).unwrap(), png);
        assert_eq!(file["path"], "logo.png");
        assert_eq!(file["size"], 6);
    }

    #[test]
    fn test_path_segment_rejects_traversal() {
        assert_eq!(path_segment("owner", "octo").unwrap(), "octo");
        for bad in ["", ".", "..", "octo/hello"] {
            let err = path_segment("owner", bad).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_INPUT");
        }
    }

    #[tokio::test]
    async fn test_owner_with_slash_is_rejected_before_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", Matcher::Any).expect(0).create_async().await;

        let adapter = connected(&server.url()).await;
        for (owner, repo) in [("octo/../admin", "hello"), ("octo", ".."), ("octo", "hello/issues")] {
            let err = adapter
                .call(TOOL_GET_REPOSITORY, json!({"owner": owner, "repo": repo}))
                .await
                .unwrap_err();
            assert_eq!(err.error_code(), "INVALID_INPUT");
        }

        let err = adapter
            .call(TOOL_GET_FILE_CONTENTS, json!({"owner": "octo", "repo": "hello", "path": "../../user"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_file_path_segments_are_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/octo/hello/contents/docs/a%20b%3F.md")
            .with_status(200)
            .with_body(json!({"type": "file", "path": "docs/a b?.md", "sha": "s", "size": 0}).to_string())
            .create_async()
            .await;

        let file = connected(&server.url())
            .await
            .call(TOOL_GET_FILE_CONTENTS, json!({"owner": "octo", "repo": "hello", "path": "/docs/a b?.md"}))
            .await
            .unwrap();

        assert_eq!(file["content"], "");
        mock.assert_async().await;
    }

    #[test]
    fn test_directory_listing_passes_through() {
        let listing = json!([{"type": "file", "path": "a"}, {"type": "dir", "path": "b"}]);
        assert_eq!(decode_file_contents(listing.clone()).unwrap(), listing);
    }

    #[test]
    fn test_submodule_entry_is_error() {
        let err = decode_file_contents(json!({
            "type": "submodule", "path": "vendor/lib", "sha": "x", "size": 0
        }))
        .unwrap_err();
        assert_eq!(err.error_code(), "OPERATION_FAILED");
        assert!(err.message().contains("not a file"));
    }

    #[tokio::test]
    async fn test_search_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search/code")
            .match_query(Matcher::UrlEncoded("q".into(), "resolver repo:octo/hello".into()))
            .with_status(200)
            .with_body(r#"{"total_count": 1, "items": []}"#)
            .create_async()
            .await;

        let result = connected(&server.url())
            .await
            .call(TOOL_SEARCH, json!({"kind": "code", "query": "resolver repo:octo/hello"}))
            .await
            .unwrap();

        assert_eq!(result["total_count"], 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_search_kind() {
        let adapter = connected("http://127.0.0.1:9").await;
        let err = adapter.call(TOOL_SEARCH, json!({"kind": "users", "query": "x"})).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }
}
