//! Database Adapter
//!
//! Thin client for a PostgREST-style REST endpoint. Rows are addressed as
//! `{endpoint}/rest/v1/{table}`; filters become `column=op.value` query pairs.
//!
//! # Filters
//! A filter map is applied in the order its keys were supplied:
//! - scalar value: equality (`eq.v`), `null` becomes `is.null`
//! - `{ "operator": op, "value": v }`: one of `eq`, `neq`, `gt`, `gte`, `lt`,
//!   `lte`, `like`, `ilike`, `in`
//! - unknown operators are skipped with a warning

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{parse_args, read_json, ToolAdapter, ToolDescriptor};
use crate::config::{DatabaseSettings, HttpSettings, Settings};
use crate::error::{Result, SwitchboardError};
use crate::secrets::store::build_http_client;
use crate::secrets::SecretsResolver;

/// Adapter name used in envelopes and errors
pub const ADAPTER_NAME: &str = "database";

pub const TOOL_QUERY: &str = "database_query";
pub const TOOL_INSERT: &str = "database_insert";
pub const TOOL_UPDATE: &str = "database_update";
pub const TOOL_DELETE: &str = "database_delete";
pub const TOOL_RPC: &str = "database_rpc";

/// Comparison operator of a tagged filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    /// Operator tag not understood; the filter is not applied
    Unknown(String),
}

impl FilterOperator {
    /// Parse an operator tag (case-sensitive, as sent by the caller)
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "like" => Self::Like,
            "ilike" => Self::Ilike,
            "in" => Self::In,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// PostgREST operator token
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::In => "in",
            Self::Unknown(tag) => tag,
        }
    }
}

/// One column filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    /// Interpret one entry of a filter map
    #[must_use]
    pub fn from_entry(column: &str, value: &Value) -> Self {
        let tagged = value
            .as_object()
            .and_then(|object| object.get("operator").and_then(Value::as_str).map(|op| (op, object)));

        match tagged {
            Some((tag, object)) => Self {
                column: column.to_string(),
                operator: FilterOperator::parse(tag),
                value: object.get("value").cloned().unwrap_or(Value::Null),
            },
            None => Self {
                column: column.to_string(),
                operator: FilterOperator::Eq,
                value: value.clone(),
            },
        }
    }

    /// Render as a `(column, "op.value")` query pair
    ///
    /// Returns `None` for unknown operators.
    #[must_use]
    pub fn to_query_pair(&self) -> Option<(String, String)> {
        let rendered = match (&self.operator, &self.value) {
            (FilterOperator::Unknown(_), _) => return None,
            (FilterOperator::Eq, Value::Null) => "is.null".to_string(),
            (FilterOperator::Neq, Value::Null) => "not.is.null".to_string(),
            (FilterOperator::In, Value::Array(items)) => format!("in.({})", render_list(items)),
            (FilterOperator::In, single) => format!("in.({})", render_list(std::slice::from_ref(single))),
            (operator, value) => format!("{}.{}", operator.as_str(), render_scalar(value)),
        };
        Some((self.column.clone(), rendered))
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Comma-separated list; items with reserved characters are double-quoted
fn render_list(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| {
            let text = render_scalar(item);
            if text.contains([',', '(', ')', '"']) {
                format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                text
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a filter map in key order
#[must_use]
pub fn parse_filters(filters: &Map<String, Value>) -> Vec<Filter> {
    filters.iter().map(|(column, value)| Filter::from_entry(column, value)).collect()
}

/// Render filters as query pairs, skipping (and logging) unknown operators
#[must_use]
pub fn filter_query_pairs(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .filter_map(|filter| {
            let pair = filter.to_query_pair();
            if pair.is_none() {
                warn!(
                    column = %filter.column,
                    operator = filter.operator.as_str(),
                    "unknown filter operator ignored"
                );
            }
            pair
        })
        .collect()
}

fn default_true() -> bool {
    true
}

/// Result ordering
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct OrderBy {
    /// Column to order by
    pub column: String,

    /// Ascending order (default true)
    #[serde(default = "default_true")]
    pub ascending: bool,
}

/// Arguments for `database_query`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryArgs {
    /// Table or view name
    pub table: String,

    /// Column selection (default `*`)
    #[serde(default)]
    pub select: Option<String>,

    /// Column filters: scalar for equality, or `{ "operator": op, "value": v }`
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,

    /// Ordering applied after filters
    #[serde(default)]
    pub order: Option<OrderBy>,

    /// Maximum number of rows
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Arguments for `database_insert`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InsertArgs {
    /// Table name
    pub table: String,

    /// A row object or an array of row objects
    pub rows: Value,
}

/// Arguments for `database_update`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateArgs {
    /// Table name
    pub table: String,

    /// Column values to set
    pub values: Map<String, Value>,

    /// Filters selecting the rows to update (required)
    pub filters: Map<String, Value>,
}

/// Arguments for `database_delete`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteArgs {
    /// Table name
    pub table: String,

    /// Filters selecting the rows to delete (required)
    pub filters: Map<String, Value>,
}

/// Arguments for `database_rpc`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RpcArgs {
    /// Stored function name
    pub function: String,

    /// Named function parameters
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

/// Query pairs for a select: `select`, filters in order, then `order` and `limit`
#[must_use]
pub fn build_query_params(args: &QueryArgs) -> Vec<(String, String)> {
    let mut params = vec![(
        "select".to_string(),
        args.select.clone().unwrap_or_else(|| "*".to_string()),
    )];

    if let Some(filters) = &args.filters {
        params.extend(filter_query_pairs(&parse_filters(filters)));
    }

    if let Some(order) = &args.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }

    if let Some(limit) = args.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    params
}

fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('/') {
        return Err(SwitchboardError::invalid_input(format!("Invalid {kind} name: '{name}'")));
    }
    Ok(())
}

/// Filters for a mutating request; refuses to address every row
fn required_filters(operation: &str, filters: &Map<String, Value>) -> Result<Vec<(String, String)>> {
    let pairs = filter_query_pairs(&parse_filters(filters));
    if pairs.is_empty() {
        return Err(SwitchboardError::invalid_input(format!(
            "{operation} requires at least one applicable filter"
        )));
    }
    Ok(pairs)
}

/// Connected REST client
struct DatabaseClient {
    http: Client,
    base_url: String,
    key: String,
}

impl DatabaseClient {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{path}", self.base_url))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }
}

/// Database adapter
pub struct DatabaseAdapter {
    resolver: Arc<SecretsResolver>,
    settings: DatabaseSettings,
    http_settings: HttpSettings,
    client: Option<DatabaseClient>,
}

impl DatabaseAdapter {
    /// Store references only; call [`ToolAdapter::initialize`] before use
    pub fn new(resolver: Arc<SecretsResolver>, settings: &Settings) -> Self {
        Self {
            resolver,
            settings: settings.database.clone(),
            http_settings: settings.http.clone(),
            client: None,
        }
    }

    fn client(&self, operation: &str) -> Result<&DatabaseClient> {
        self.client.as_ref().ok_or_else(|| SwitchboardError::uninitialized(ADAPTER_NAME, operation))
    }

    /// Select rows
    pub async fn query(&self, args: QueryArgs) -> Result<Value> {
        let client = self.client(TOOL_QUERY)?;
        validate_identifier("table", &args.table)?;

        let params = build_query_params(&args);
        debug!(table = %args.table, params = params.len(), "database query");

        read_json(TOOL_QUERY, client.request(Method::GET, &args.table).query(&params).send().await)
            .await
    }

    /// Insert one or more rows, returning the stored representation
    pub async fn insert(&self, args: InsertArgs) -> Result<Value> {
        let client = self.client(TOOL_INSERT)?;
        validate_identifier("table", &args.table)?;
        if !(args.rows.is_object() || args.rows.is_array()) {
            return Err(SwitchboardError::invalid_input("rows must be an object or an array of objects"));
        }

        let response = client
            .request(Method::POST, &args.table)
            .header("Prefer", "return=representation")
            .json(&args.rows)
            .send()
            .await;
        read_json(TOOL_INSERT, response).await
    }

    /// Update the rows matching the filters
    pub async fn update(&self, args: UpdateArgs) -> Result<Value> {
        let client = self.client(TOOL_UPDATE)?;
        validate_identifier("table", &args.table)?;
        let params = required_filters(TOOL_UPDATE, &args.filters)?;

        let response = client
            .request(Method::PATCH, &args.table)
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&args.values)
            .send()
            .await;
        read_json(TOOL_UPDATE, response).await
    }

    /// Delete the rows matching the filters
    pub async fn delete(&self, args: DeleteArgs) -> Result<Value> {
        let client = self.client(TOOL_DELETE)?;
        validate_identifier("table", &args.table)?;
        let params = required_filters(TOOL_DELETE, &args.filters)?;

        let response = client
            .request(Method::DELETE, &args.table)
            .query(&params)
            .header("Prefer", "return=representation")
            .send()
            .await;
        read_json(TOOL_DELETE, response).await
    }

    /// Call a stored function
    pub async fn rpc(&self, args: RpcArgs) -> Result<Value> {
        let client = self.client(TOOL_RPC)?;
        validate_identifier("function", &args.function)?;

        let params = args.params.unwrap_or_default();
        let response = client
            .request(Method::POST, &format!("rpc/{}", args.function))
            .json(&params)
            .send()
            .await;
        read_json(TOOL_RPC, response).await
    }

    /// Static tool catalogue
    #[must_use]
    pub fn catalogue() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new::<QueryArgs>(
                TOOL_QUERY,
                "Select rows from a table with optional filters, ordering and limit",
            ),
            ToolDescriptor::new::<InsertArgs>(TOOL_INSERT, "Insert one or more rows into a table"),
            ToolDescriptor::new::<UpdateArgs>(TOOL_UPDATE, "Update the rows matching the filters"),
            ToolDescriptor::new::<DeleteArgs>(TOOL_DELETE, "Delete the rows matching the filters"),
            ToolDescriptor::new::<RpcArgs>(TOOL_RPC, "Call a stored database function"),
        ]
    }
}

#[async_trait]
impl ToolAdapter for DatabaseAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn initialize(&mut self) -> bool {
        self.client = None;

        let Some(credentials) = self.resolver.database_config() else {
            debug!("database credentials absent; adapter left uninitialized");
            return false;
        };

        let http = match build_http_client(&self.http_settings) {
            Ok(http) => http,
            Err(e) => {
                warn!(error = %e, "database client could not be built");
                return false;
            }
        };

        self.client = Some(DatabaseClient {
            http,
            base_url: format!(
                "{}{}",
                credentials.endpoint_url.trim_end_matches('/'),
                self.settings.rest_path
            ),
            key: credentials.request_key().to_string(),
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
            TOOL_QUERY => self.query(parse_args(tool, arguments)?).await,
            TOOL_INSERT => self.insert(parse_args(tool, arguments)?).await,
            TOOL_UPDATE => self.update(parse_args(tool, arguments)?).await,
            TOOL_DELETE => self.delete(parse_args(tool, arguments)?).await,
            TOOL_RPC => self.rpc(parse_args(tool, arguments)?).await,
            other => Err(SwitchboardError::invalid_input(format!("Unknown database tool: {other}"))),
        }
    }
}
