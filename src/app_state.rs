use crate::cli::CommandLineArgs;
use crate::columnar_reader::ColumnarReader;
use crate::metadata_cache::MetadataCache;
use crate::portal::PortalClient;
use crate::query_engine::QueryEngine;
use crate::retry::RetryPolicy;
use crate::warehouse::{BigQueryClient, Warehouse};

use std::sync::Arc;
use std::time::Duration;

/// Shared application state passed to each request handler.
pub struct AppState {
    /// EAR query engine, owning the metadata cache.
    pub engine: QueryEngine,

    /// Warehouse behind the `/data` endpoints, if a project is configured.
    pub warehouse: Option<Arc<dyn Warehouse>>,
}

impl AppState {
    /// Create and return an [AppState].
    ///
    /// All outbound clients share one connection pool.
    pub fn new(args: &CommandLineArgs) -> Result<Self, reqwest::Error> {
        let connect_timeout = Duration::from_secs(args.connect_timeout);
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        let retry = RetryPolicy::new(
            args.metadata_retries,
            Duration::from_millis(args.retry_backoff_ms),
        );
        let portal = PortalClient::new(
            client.clone(),
            args.portal_url.clone(),
            retry,
            Duration::from_secs(args.metadata_timeout),
        );
        let reader = ColumnarReader::new(
            client.clone(),
            retry,
            connect_timeout,
            Duration::from_secs(args.primary_read_timeout),
            Duration::from_secs(args.fallback_read_timeout),
        );
        let engine = QueryEngine::new(
            MetadataCache::new(Arc::new(portal)),
            Arc::new(reader),
            &args.date_column,
            &args.reservoir_column,
        );
        let warehouse = args.warehouse_project.as_ref().map(|project| {
            Arc::new(BigQueryClient::new(
                client,
                args.warehouse_api_url.clone(),
                project,
                &args.warehouse_dataset,
                &args.warehouse_table,
                args.warehouse_token.clone(),
                retry,
                Duration::from_secs(args.metadata_timeout),
            )) as Arc<dyn Warehouse>
        });
        if warehouse.is_none() {
            tracing::info!("No warehouse project configured; /data endpoints are disabled");
        }

        Ok(Self {
            engine,
            warehouse,
        })
    }
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
