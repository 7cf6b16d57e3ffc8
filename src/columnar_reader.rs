//! Parquet resource reader.
//!
//! A resource is first read in place through the object store HTTP backend of the `parquet`
//! crate, which fetches only the footer and the column chunks through ranged requests. Servers
//! that do not support this (no `HEAD`, no `Range`, odd redirects) get a second chance: the whole
//! file is downloaded into memory and decoded from there.

use crate::error::EarError;
use crate::frame::Frame;
use crate::metrics::RESOURCE_READS;
use crate::retry::RetryPolicy;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use object_store::http::HttpBuilder;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::async_reader::ParquetObjectReader;
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use parquet::errors::ParquetError;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio_stream::StreamExt;
use url::{Position, Url};

/// Reader of columnar resources.
///
/// Implemented by [ColumnarReader] over HTTP, and by in-memory stubs in tests.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    /// Read the resource at `url` into a frame.
    async fn read(&self, url: &str) -> Result<Frame, EarError>;
}

/// The path that produced a frame.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ReadPath {
    /// Structured ranged read
    Primary,
    /// Full download, decoded from memory
    Fallback,
}

/// Why the structured read failed.
#[derive(Debug)]
pub enum PrimaryFailure {
    /// The URL cannot be addressed at all
    InvalidUrl(String),
    /// The URL is valid but cannot be mapped onto an object path, e.g. it has a query string
    NotAddressable(String),
    /// The object store could not reach or stat the resource
    Transport(object_store::Error),
    /// The resource was reached but did not decode as Parquet
    Decode(ParquetError),
}

impl PrimaryFailure {
    /// Whether a full download might succeed where the structured read did not.
    pub fn warrants_fallback(&self) -> bool {
        match self {
            PrimaryFailure::InvalidUrl(_) => false,
            PrimaryFailure::NotAddressable(_)
            | PrimaryFailure::Transport(_)
            | PrimaryFailure::Decode(_) => true,
        }
    }
}

impl std::fmt::Display for PrimaryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimaryFailure::InvalidUrl(reason) => write!(f, "invalid URL: {}", reason),
            PrimaryFailure::NotAddressable(reason) => {
                write!(f, "no structured read for this URL: {}", reason)
            }
            PrimaryFailure::Transport(err) => write!(f, "structured read failed: {}", err),
            PrimaryFailure::Decode(err) => write!(f, "structured decode failed: {}", err),
        }
    }
}

/// Outcome of a structured read.
#[derive(Debug)]
pub enum PrimaryRead {
    Loaded(Frame),
    Failed(PrimaryFailure),
}

/// HTTP Parquet reader with download fallback.
#[derive(Debug)]
pub struct ColumnarReader {
    client: reqwest::Client,
    retry: RetryPolicy,
    connect_timeout: Duration,
    primary_timeout: Duration,
    fallback_timeout: Duration,
}

impl ColumnarReader {
    /// Create a new reader.
    ///
    /// # Arguments
    ///
    /// * `client`: Shared reqwest client used by the download fallback
    /// * `retry`: Retry policy of the download fallback
    /// * `connect_timeout`: Connect timeout of the structured read
    /// * `primary_timeout`: Timeout of each request of the structured read
    /// * `fallback_timeout`: Timeout of the download
    pub fn new(
        client: reqwest::Client,
        retry: RetryPolicy,
        connect_timeout: Duration,
        primary_timeout: Duration,
        fallback_timeout: Duration,
    ) -> Self {
        Self {
            client,
            retry,
            connect_timeout,
            primary_timeout,
            fallback_timeout,
        }
    }

    /// Read a resource and report which path produced the frame.
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn read_with_path(&self, url: &str) -> Result<(Frame, ReadPath), EarError> {
        tracing::info!("Reading parquet from {}", url);
        let (frame, path) = match self.read_structured(url).await {
            PrimaryRead::Loaded(frame) => (frame, ReadPath::Primary),
            PrimaryRead::Failed(failure) if failure.warrants_fallback() => {
                tracing::info!("{} for {}; downloading instead", failure, url);
                let frame = self
                    .download(url)
                    .await
                    .map_err(|reason| EarError::FetchError {
                        url: url.to_string(),
                        reason: format!("{}; download fallback failed: {}", failure, reason),
                    })?;
                (frame, ReadPath::Fallback)
            }
            PrimaryRead::Failed(failure) => {
                return Err(EarError::FetchError {
                    url: url.to_string(),
                    reason: failure.to_string(),
                })
            }
        };
        tracing::info!("{} read of {} produced {} rows", path, url, frame.num_rows());
        RESOURCE_READS
            .with_label_values(&[&path.to_string()])
            .inc();
        Ok((frame, path))
    }

    /// Read a resource in place through ranged requests.
    pub async fn read_structured(&self, url: &str) -> PrimaryRead {
        let (store, path) = match self.object_store(url) {
            Ok(located) => located,
            Err(failure) => return PrimaryRead::Failed(failure),
        };
        let meta = match store.head(&path).await {
            Ok(meta) => meta,
            Err(err) => return PrimaryRead::Failed(PrimaryFailure::Transport(err)),
        };
        let reader = ParquetObjectReader::new(store, meta);
        match decode_stream(reader).await {
            Ok(frame) => PrimaryRead::Loaded(frame),
            Err(err) => PrimaryRead::Failed(PrimaryFailure::Decode(err)),
        }
    }

    /// Object store rooted at the URL's origin, and the object path within it.
    fn object_store(&self, url: &str) -> Result<(Arc<dyn ObjectStore>, Path), PrimaryFailure> {
        let parsed = Url::parse(url).map_err(|err| PrimaryFailure::InvalidUrl(err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PrimaryFailure::InvalidUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }
        if parsed.query().is_some() {
            return Err(PrimaryFailure::NotAddressable(
                "query strings are not passed through ranged reads".to_string(),
            ));
        }
        let path = Path::from_url_path(parsed.path())
            .map_err(|err| PrimaryFailure::InvalidUrl(err.to_string()))?;
        let options = ClientOptions::new()
            .with_allow_http(true)
            .with_connect_timeout(self.connect_timeout)
            .with_timeout(self.primary_timeout);
        let store = HttpBuilder::new()
            .with_url(&parsed[..Position::BeforePath])
            .with_client_options(options)
            .build()
            .map_err(PrimaryFailure::Transport)?;
        Ok((Arc::new(store), path))
    }

    /// Download a resource into memory and decode it.
    async fn download(&self, url: &str) -> Result<Frame, String> {
        let response = self
            .retry
            .send(|| self.client.get(url).timeout(self.fallback_timeout))
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP status {}", response.status()));
        }
        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.map_err(|err| err.to_string())?);
        }
        decode_bytes(body.freeze()).map_err(|err| err.to_string())
    }
}

#[async_trait]
impl ResourceReader for ColumnarReader {
    async fn read(&self, url: &str) -> Result<Frame, EarError> {
        self.read_with_path(url).await.map(|(frame, _)| frame)
    }
}

async fn decode_stream(reader: ParquetObjectReader) -> Result<Frame, ParquetError> {
    let stream = ParquetRecordBatchStreamBuilder::new(reader).await?.build()?;
    let batches = stream.collect::<Result<Vec<_>, _>>().await?;
    Ok(Frame::new(batches))
}

/// Decode an in-memory Parquet file.
pub fn decode_bytes(data: Bytes) -> Result<Frame, ParquetError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)?.build()?;
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(Frame::new(batches))
}
