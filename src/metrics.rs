use axum::{body::Body, http::Request, response::Response};
use lazy_static::lazy_static;
use prometheus::{self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use tracing::Span;

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Simple request counter
    pub static ref INCOMING_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("incoming_requests", "The number of HTTP requests received"),
        &["http_method"]
    ).expect("Prometheus metric options should be valid");
    // Request counter by status code
    pub static ref RESPONSE_CODE_COLLECTOR: IntCounterVec = IntCounterVec::new(
        Opts::new("outgoing_response", "The number of responses sent."),
        &["status_code"]
    ).expect("Prometheus metric options should be valid");
    // Request histogram by response time
    pub static ref RESPONSE_TIME_COLLECTOR: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("response_time", "The time taken to respond to each request"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(), // Change buckets here if desired
        },
        &[],
    ).expect("Prometheus metric options should be valid");
    // Package metadata lookups by outcome (hit or miss)
    pub static ref METADATA_CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("metadata_cache_lookups", "The number of package metadata cache lookups"),
        &["outcome"]
    ).expect("Prometheus metric options should be valid");
    // Parquet resources read, by the path that produced the data (primary or fallback)
    pub static ref RESOURCE_READS: IntCounterVec = IntCounterVec::new(
        Opts::new("resource_reads", "The number of Parquet resources read"),
        &["path"]
    ).expect("Prometheus metric options should be valid");
}

/// Register all metrics with the registry.
pub fn register_metrics() {
    let collectors: [Box<dyn prometheus::core::Collector>; 5] = [
        Box::new(INCOMING_REQUESTS.clone()),
        Box::new(RESPONSE_CODE_COLLECTOR.clone()),
        Box::new(RESPONSE_TIME_COLLECTOR.clone()),
        Box::new(METADATA_CACHE_LOOKUPS.clone()),
        Box::new(RESOURCE_READS.clone()),
    ];
    for collector in collectors {
        if let Err(err) = REGISTRY.register(collector) {
            tracing::warn!("Failed to register metric: {}", err);
        }
    }
}

/// Render all registered metrics in the Prometheus text format.
pub async fn metrics_handler() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", err);
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

/// Increments the prometheus counter on all incoming requests, labelled by http method
pub fn request_counter(request: &Request<Body>, _span: &Span) {
    INCOMING_REQUESTS
        .with_label_values(&[&request.method().to_string().to_ascii_uppercase()])
        .inc();
}

/// Increment the prometheus counter on all outgoing responses, labelled by status code
pub fn record_response_metrics<B>(
    response: &Response<B>,
    latency: std::time::Duration,
    _span: &Span,
) {
    RESPONSE_CODE_COLLECTOR
        .with_label_values(&[response.status().as_str()])
        .inc();

    RESPONSE_TIME_COLLECTOR
        .with_label_values(&[])
        .observe(latency.as_secs_f64());
}
