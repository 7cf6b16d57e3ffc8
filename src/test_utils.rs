use crate::columnar_reader::ResourceReader;
use crate::error::EarError;
use crate::frame::Frame;
use crate::models::QueryParams;
use crate::portal::{MetadataSource, PackageMetadata};
use crate::sanitize::Row;
use crate::warehouse::Warehouse;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use axum::{response::Response, Router};
use bytes::Bytes;
use hashbrown::HashMap;
use parquet::arrow::ArrowWriter;
use serde_json::Value;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serve `router` on an ephemeral local port for the rest of the test.
pub(crate) fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(server);
    addr
}

// Jump through the hoops to get the body as a string.
pub(crate) async fn body_string(response: Response) -> String {
    String::from_utf8(
        hyper::body::to_bytes(response.into_body())
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap()
}

/// Create a QueryParams object with only required fields set.
pub(crate) fn query_params(package_id: &str) -> QueryParams {
    QueryParams {
        package_id: package_id.to_string(),
        ano: None,
        mes: None,
        nome_reservatorio: None,
        start_date: None,
        end_date: None,
        page: 1,
        page_size: 100,
    }
}

/// A record batch shaped like an EAR resource: date text, reservoir name and stored energy.
pub(crate) fn ear_batch(rows: &[(&str, &str, f64)]) -> RecordBatch {
    let dates: StringArray = rows.iter().map(|r| Some(r.0)).collect();
    let names: StringArray = rows.iter().map(|r| Some(r.1)).collect();
    let values: Float64Array = rows.iter().map(|r| Some(r.2)).collect();
    RecordBatch::try_from_iter([
        ("ear_data", Arc::new(dates) as ArrayRef),
        ("nom_reservatorio", Arc::new(names) as ArrayRef),
        ("ear_reservatorio_percentual", Arc::new(values) as ArrayRef),
    ])
    .unwrap()
}

/// Encode a frame as an in-memory Parquet file.
pub(crate) fn parquet_bytes(frame: &Frame) -> Bytes {
    let schema = frame.batches()[0].schema();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
    for batch in frame.batches() {
        writer.write(batch).unwrap();
    }
    writer.close().unwrap();
    Bytes::from(buffer)
}

/// Metadata source returning fixed metadata, or always failing, and counting fetches.
pub(crate) struct StubMetadataSource {
    metadata: Option<PackageMetadata>,
    calls: AtomicUsize,
}

impl StubMetadataSource {
    pub(crate) fn new(metadata: PackageMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            metadata: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for StubMetadataSource {
    async fn fetch(&self, _package_id: &str) -> Result<PackageMetadata, EarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Keep the fetch in flight long enough for concurrent lookups to pile up.
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.metadata
            .clone()
            .ok_or_else(|| EarError::UpstreamUnavailable {
                url: "http://portal".to_string(),
                reason: "HTTP status 503 Service Unavailable".to_string(),
            })
    }
}

/// Resource reader serving fixed frames by URL and recording reads.
pub(crate) struct StubReader {
    frames: HashMap<String, Frame>,
    reads: Mutex<Vec<String>>,
}

impl StubReader {
    pub(crate) fn new<'a>(frames: impl IntoIterator<Item = (&'a str, Frame)>) -> Self {
        Self {
            frames: frames
                .into_iter()
                .map(|(url, frame)| (url.to_string(), frame))
                .collect(),
            reads: Mutex::default(),
        }
    }

    pub(crate) fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceReader for StubReader {
    async fn read(&self, url: &str) -> Result<Frame, EarError> {
        self.reads.lock().unwrap().push(url.to_string());
        self.frames
            .get(url)
            .cloned()
            .ok_or_else(|| EarError::FetchError {
                url: url.to_string(),
                reason: "HTTP status 404 Not Found".to_string(),
            })
    }
}

/// In-memory warehouse of table `proj.ear.dados`.
pub(crate) struct StubWarehouse {
    rows: Vec<Value>,
    reject: Option<String>,
    queries: Mutex<Vec<String>>,
    inserted: Mutex<Vec<Row>>,
}

impl StubWarehouse {
    /// A warehouse answering every query with `rows`.
    pub(crate) fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            reject: None,
            queries: Mutex::default(),
            inserted: Mutex::default(),
        }
    }

    /// A warehouse rejecting every insert with `message`.
    pub(crate) fn rejecting(message: &str) -> Self {
        Self {
            reject: Some(message.to_string()),
            ..Self::new(vec![])
        }
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub(crate) fn inserted(&self) -> Vec<Row> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for StubWarehouse {
    fn table_ref(&self) -> String {
        "proj.ear.dados".to_string()
    }

    async fn get_data(&self, query: &str) -> Result<Vec<Row>, EarError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.as_object().cloned())
            .collect())
    }

    async fn post_data(&self, row: Row) -> Result<(), EarError> {
        if let Some(message) = &self.reject {
            return Err(EarError::WarehouseRejected(message.clone()));
        }
        self.inserted.lock().unwrap().push(row);
        Ok(())
    }
}
