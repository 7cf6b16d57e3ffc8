//! Analytical warehouse pass-through.
//!
//! The `/data` endpoints read and append rows of a single BigQuery table through the BigQuery v2
//! REST API.

use crate::error::EarError;
use crate::models::{DataCreate, DataItem};
use crate::retry::RetryPolicy;
use crate::sanitize::Row;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Number, Value};
use std::time::Duration;
use url::Url;

/// Warehouse holding the `/data` table.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Fully qualified `project.dataset.table` reference of the table.
    fn table_ref(&self) -> String;

    /// Run a query and return its rows.
    async fn get_data(&self, query: &str) -> Result<Vec<Row>, EarError>;

    /// Append one row to the table.
    async fn post_data(&self, row: Row) -> Result<(), EarError>;
}

/// Read up to `limit` rows of the warehouse table.
pub async fn list_items(warehouse: &dyn Warehouse, limit: u32) -> Result<Vec<DataItem>, EarError> {
    let query = format!("SELECT * FROM `{}` LIMIT {}", warehouse.table_ref(), limit);
    warehouse
        .get_data(&query)
        .await?
        .into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row))
                .map_err(|err| EarError::Warehouse(format!("unexpected row: {}", err)))
        })
        .collect()
}

/// Append a row to the warehouse table.
pub async fn create_item(warehouse: &dyn Warehouse, item: &DataCreate) -> Result<(), EarError> {
    let mut row = Row::new();
    row.insert("nome".to_string(), Value::String(item.nome.clone()));
    row.insert(
        "valor".to_string(),
        Number::from_f64(item.valor).map_or(Value::Null, Value::Number),
    );
    warehouse.post_data(row).await?;
    tracing::info!("Inserted a row into {}", warehouse.table_ref());
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct TableField {
    name: String,
    #[serde(rename = "type", default)]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorProto,
}

/// Convert a cell of the query response, which carries scalars as text, to its JSON type.
fn cell_value(field_type: &str, value: Value) -> Value {
    let Value::String(text) = value else {
        return value;
    };
    match field_type {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map_or(Value::String(text), Value::from),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        "BOOLEAN" | "BOOL" => Value::Bool(text == "true"),
        _ => Value::String(text),
    }
}

/// BigQuery v2 REST client.
#[derive(Debug)]
pub struct BigQueryClient {
    client: reqwest::Client,
    api_url: Url,
    project: String,
    dataset: String,
    table: String,
    token: Option<String>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl BigQueryClient {
    /// Create a new BigQuery client.
    ///
    /// # Arguments
    ///
    /// * `client`: Shared reqwest client
    /// * `api_url`: Base URL of the REST API
    /// * `project`: Project of the table
    /// * `dataset`: Dataset of the table
    /// * `table`: Table name
    /// * `token`: Optional OAuth2 bearer token
    /// * `retry`: Retry policy of queries. Inserts are never retried.
    /// * `timeout`: Timeout of each request
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: reqwest::Client,
        api_url: Url,
        project: &str,
        dataset: &str,
        table: &str,
        token: Option<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_url,
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
            token,
            retry,
            timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/projects/{}{}",
            self.api_url.as_str().trim_end_matches('/'),
            self.project,
            path
        )
    }

    fn post(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let request = self.client.post(url).json(body).timeout(self.timeout);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Read a response body, failing on unsuccessful statuses.
    async fn body<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EarError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| EarError::Warehouse(err.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|body| body.error.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(EarError::Warehouse(format!(
                "HTTP status {}: {}",
                status, message
            )));
        }
        serde_json::from_slice(&body).map_err(|err| EarError::Warehouse(err.to_string()))
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }

    #[tracing::instrument(level = "DEBUG", skip(self))]
    async fn get_data(&self, query: &str) -> Result<Vec<Row>, EarError> {
        let url = self.endpoint("/queries");
        let body = json!({"query": query, "useLegacySql": false});
        let response = self
            .retry
            .send(|| self.post(&url, &body))
            .await
            .map_err(|err| EarError::Warehouse(err.to_string()))?;
        let response: QueryResponse = Self::body(response).await?;
        if !response.job_complete {
            return Err(EarError::Warehouse(
                "query did not complete in time".to_string(),
            ));
        }
        let fields = response.schema.map(|s| s.fields).unwrap_or_default();
        Ok(response
            .rows
            .into_iter()
            .map(|row| {
                fields
                    .iter()
                    .zip(row.f)
                    .map(|(field, cell)| (field.name.clone(), cell_value(&field.field_type, cell.v)))
                    .collect()
            })
            .collect())
    }

    #[tracing::instrument(level = "DEBUG", skip(self))]
    async fn post_data(&self, row: Row) -> Result<(), EarError> {
        let url = self.endpoint(&format!(
            "/datasets/{}/tables/{}/insertAll",
            self.dataset, self.table
        ));
        let body = json!({"rows": [{"json": row}]});
        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(|err| EarError::Warehouse(err.to_string()))?;
        let response: InsertAllResponse = Self::body(response).await?;
        if response.insert_errors.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = response
            .insert_errors
            .into_iter()
            .flat_map(|e| e.errors)
            .map(|e| e.message)
            .collect();
        tracing::error!("Insert into {} failed: {:?}", self.table_ref(), messages);
        Err(EarError::WarehouseRejected(messages.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::{spawn_server, StubWarehouse};

    use axum::{
        extract::{Json, State},
        http::{header, HeaderMap, StatusCode},
        routing::post,
        Router,
    };
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    // Records the authorization header and body of each request and answers with `reply`.
    fn server(path: &str, status: StatusCode, reply: Value) -> (Url, Captured) {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                path,
                post(
                    move |State(captured): State<Captured>,
                          headers: HeaderMap,
                          Json(body): Json<Value>| async move {
                        let auth = headers
                            .get(header::AUTHORIZATION)
                            .map(|v| v.to_str().unwrap().to_string());
                        captured.lock().unwrap().push((auth, body));
                        (status, Json(reply))
                    },
                ),
            )
            .with_state(captured.clone());
        let addr = spawn_server(router);
        (
            Url::parse(&format!("http://{}/bigquery/v2", addr)).unwrap(),
            captured,
        )
    }

    fn client(api_url: Url, token: Option<&str>) -> BigQueryClient {
        BigQueryClient::new(
            reqwest::Client::new(),
            api_url,
            "proj",
            "ear",
            "dados",
            token.map(str::to_string),
            RetryPolicy::new(0, Duration::ZERO),
            Duration::from_secs(5),
        )
    }

    fn query_reply() -> Value {
        json!({
            "kind": "bigquery#queryResponse",
            "jobComplete": true,
            "schema": {"fields": [
                {"name": "id", "type": "INTEGER"},
                {"name": "nome", "type": "STRING"},
                {"name": "valor", "type": "FLOAT"},
                {"name": "ativo", "type": "BOOLEAN"}
            ]},
            "rows": [
                {"f": [{"v": "1"}, {"v": "FURNAS"}, {"v": "55.5"}, {"v": "true"}]},
                {"f": [{"v": "2"}, {"v": null}, {"v": "NaN"}, {"v": "false"}]}
            ]
        })
    }

    #[test]
    fn table_ref() {
        let client = client(Url::parse("http://localhost").unwrap(), None);
        assert_eq!("proj.ear.dados", client.table_ref());
    }

    #[test]
    fn cell_values() {
        assert_eq!(json!(42), cell_value("INTEGER", json!("42")));
        assert_eq!(json!(1.5), cell_value("FLOAT", json!("1.5")));
        assert_eq!(Value::Null, cell_value("FLOAT64", json!("Infinity")));
        assert_eq!(json!(true), cell_value("BOOLEAN", json!("true")));
        assert_eq!(json!("x"), cell_value("STRING", json!("x")));
        assert_eq!(Value::Null, cell_value("INTEGER", Value::Null));
    }

    #[tokio::test]
    async fn get_data() {
        let (api_url, captured) = server(
            "/bigquery/v2/projects/proj/queries",
            StatusCode::OK,
            query_reply(),
        );
        let rows = client(api_url, Some("secret"))
            .get_data("SELECT 1")
            .await
            .unwrap();
        let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
        assert_eq!(
            vec![
                json!({"id": 1, "nome": "FURNAS", "valor": 55.5, "ativo": true}),
                json!({"id": 2, "nome": null, "valor": null, "ativo": false}),
            ],
            rows
        );
        let captured = captured.lock().unwrap();
        assert_eq!(Some("Bearer secret".to_string()), captured[0].0);
        assert_eq!(json!({"query": "SELECT 1", "useLegacySql": false}), captured[0].1);
    }

    #[tokio::test]
    async fn get_data_incomplete_job() {
        let (api_url, _) = server(
            "/bigquery/v2/projects/proj/queries",
            StatusCode::OK,
            json!({"jobComplete": false}),
        );
        let err = client(api_url, None).get_data("SELECT 1").await.unwrap_err();
        assert!(matches!(err, EarError::Warehouse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn get_data_api_error() {
        let (api_url, _) = server(
            "/bigquery/v2/projects/proj/queries",
            StatusCode::FORBIDDEN,
            json!({"error": {"code": 403, "message": "Access Denied"}}),
        );
        let err = client(api_url, None).get_data("SELECT 1").await.unwrap_err();
        assert_eq!(
            "warehouse request failed: HTTP status 403 Forbidden: Access Denied",
            err.to_string()
        );
    }

    #[tokio::test]
    async fn post_data() {
        let (api_url, captured) = server(
            "/bigquery/v2/projects/proj/datasets/ear/tables/dados/insertAll",
            StatusCode::OK,
            json!({"kind": "bigquery#tableDataInsertAllResponse"}),
        );
        let mut row = Row::new();
        row.insert("nome".to_string(), json!("FURNAS"));
        client(api_url, None).post_data(row).await.unwrap();
        let captured = captured.lock().unwrap();
        assert_eq!(None, captured[0].0);
        assert_eq!(json!({"rows": [{"json": {"nome": "FURNAS"}}]}), captured[0].1);
    }

    #[tokio::test]
    async fn post_data_rejected() {
        let (api_url, _) = server(
            "/bigquery/v2/projects/proj/datasets/ear/tables/dados/insertAll",
            StatusCode::OK,
            json!({"insertErrors": [{"index": 0, "errors": [
                {"reason": "invalid", "message": "no such field: foo"}
            ]}]}),
        );
        let err = client(api_url, None).post_data(Row::new()).await.unwrap_err();
        assert_eq!(
            "warehouse rejected the data: no such field: foo",
            err.to_string()
        );
    }

    #[tokio::test]
    async fn list_items_builds_query() {
        let warehouse = StubWarehouse::new(vec![json!({"id": 7, "nome": "FURNAS", "valor": 1})]);
        let items = list_items(&warehouse, 5).await.unwrap();
        assert_eq!(
            vec![DataItem {
                id: 7,
                nome: "FURNAS".to_string(),
                valor: 1.0
            }],
            items
        );
        assert_eq!(
            vec!["SELECT * FROM `proj.ear.dados` LIMIT 5"],
            warehouse.queries()
        );
    }

    #[tokio::test]
    async fn list_items_unexpected_row() {
        let warehouse = StubWarehouse::new(vec![json!({"nome": "FURNAS"})]);
        let err = list_items(&warehouse, 5).await.unwrap_err();
        assert!(matches!(err, EarError::Warehouse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn create_item_inserts_row() {
        let warehouse = StubWarehouse::new(vec![]);
        let item = DataCreate {
            nome: "FURNAS".to_string(),
            valor: 55.5,
        };
        create_item(&warehouse, &item).await.unwrap();
        let inserted: Vec<Value> = warehouse.inserted().into_iter().map(Value::Object).collect();
        assert_eq!(vec![json!({"nome": "FURNAS", "valor": 55.5})], inserted);
    }
}
