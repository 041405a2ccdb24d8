//! Milvus backend over the REST v2 API.

use crate::backend::VectorIndex;
use crate::batch::ColumnBatch;
use crate::error::{IndexError, IndexResult};
use crate::schema::{validate_collection_name, CollectionSchema, CHUNK_ID};
use castindex_config::IndexConfig;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// A Milvus collection reached through `/v2/vectordb/*`.
pub struct MilvusIndex {
    client: Client,
    runtime: Runtime,
    endpoint: String,
    collection: String,
    token: Option<String>,
    timeout: Duration,
}

impl MilvusIndex {
    pub fn from_config(config: &IndexConfig) -> IndexResult<Self> {
        Self::new(
            config.endpoint(),
            &config.collection,
            config.token.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn new(
        endpoint: impl Into<String>,
        collection: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> IndexResult<Self> {
        validate_collection_name(collection)?;
        let runtime = Runtime::new().map_err(|e| IndexError::Runtime(e.to_string()))?;
        Ok(Self {
            client: build_client(timeout)?,
            runtime,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            token,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn call(&self, path: &str, body: Value) -> IndexResult<Value> {
        self.runtime.block_on(self.post(path, body))
    }

    async fn post(&self, path: &str, body: Value) -> IndexResult<Value> {
        let url = format!("{}/v2/vectordb/{}", self.endpoint, path);
        debug!("POST {}", url);

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                IndexError::Connection(format!("{}: {}", self.endpoint, e))
            } else if e.is_timeout() {
                IndexError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                IndexError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::Api {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let payload: Value = response.json().await?;
        check_response(payload)
    }

    fn collection_body(&self) -> Value {
        json!({ "collectionName": self.collection })
    }
}

fn build_client(timeout: Duration) -> IndexResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(IndexError::Http)
}

/// Unwrap the `{code, data, message}` envelope.
fn check_response(payload: Value) -> IndexResult<Value> {
    let code = payload.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(IndexError::Api { code, message });
    }
    Ok(payload.get("data").cloned().unwrap_or(Value::Null))
}

/// `rowCount` arrives as a number or a numeric string depending on version.
fn parse_row_count(data: &Value) -> u64 {
    match data.get("rowCount") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

impl VectorIndex for MilvusIndex {
    fn backend(&self) -> &'static str {
        "milvus"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn has_collection(&self) -> IndexResult<bool> {
        let data = self.call("collections/has", self.collection_body())?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    fn create_collection(&mut self, schema: &CollectionSchema) -> IndexResult<()> {
        if schema.name != self.collection {
            return Err(IndexError::Schema(format!(
                "schema is for collection {}, index is bound to {}",
                schema.name, self.collection
            )));
        }
        self.call("collections/create", schema.to_milvus_request())?;
        info!("Created Milvus collection {}", self.collection);
        Ok(())
    }

    fn drop_collection(&mut self) -> IndexResult<()> {
        self.call("collections/drop", self.collection_body())?;
        info!("Dropped Milvus collection {}", self.collection);
        Ok(())
    }

    fn clear(&mut self) -> IndexResult<()> {
        self.call(
            "entities/delete",
            json!({
                "collectionName": self.collection,
                "filter": format!("{} != \"\"", CHUNK_ID),
            }),
        )?;
        info!("Cleared Milvus collection {}", self.collection);
        Ok(())
    }

    fn load(&mut self) -> IndexResult<()> {
        self.call("collections/load", self.collection_body())?;
        Ok(())
    }

    fn row_count(&self) -> IndexResult<u64> {
        let data = self.call("collections/get_stats", self.collection_body())?;
        Ok(parse_row_count(&data))
    }

    fn upsert(&mut self, batch: &ColumnBatch) -> IndexResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let data = self.call(
            "entities/upsert",
            json!({
                "collectionName": self.collection,
                "data": batch.to_rows(),
            }),
        )?;
        let written = data
            .get("upsertCount")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(batch.len());
        Ok(written)
    }

    fn reconnect(&mut self) -> IndexResult<()> {
        info!("Reconnecting to Milvus at {}", self.endpoint);
        self.client = build_client(self.timeout)?;
        self.has_collection().map(|_| ())
    }
}
