//! Command Line Interface (CLI) arguments.

use clap::Parser;
use url::Url;

/// EAR service command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "EAR_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8000, env = "EAR_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "EAR_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/ear-service/certs/cert.pem",
        env = "EAR_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/ear-service/certs/key.pem",
        env = "EAR_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for requests to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "EAR_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Open data portal `package_show` endpoint. The dataset identifier is passed as `id`.
    #[arg(
        long,
        default_value = "https://dados.ons.org.br/api/3/action/package_show",
        env = "EAR_PORTAL_URL"
    )]
    pub portal_url: Url,
    /// Number of retries on transient upstream failures.
    #[arg(long, default_value_t = 3, env = "EAR_METADATA_RETRIES")]
    pub metadata_retries: u32,
    /// Base delay in milliseconds between retries. Doubles on every attempt.
    #[arg(long, default_value_t = 300, env = "EAR_RETRY_BACKOFF_MS")]
    pub retry_backoff_ms: u64,
    /// Connect timeout in seconds for all outbound HTTP requests.
    #[arg(long, default_value_t = 5, env = "EAR_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,
    /// Timeout in seconds for a package metadata request.
    #[arg(long, default_value_t = 30, env = "EAR_METADATA_TIMEOUT")]
    pub metadata_timeout: u64,
    /// Timeout in seconds for each request of a structured (ranged) Parquet read.
    #[arg(long, default_value_t = 30, env = "EAR_PRIMARY_READ_TIMEOUT")]
    pub primary_read_timeout: u64,
    /// Timeout in seconds for a full Parquet download.
    #[arg(long, default_value_t = 60, env = "EAR_FALLBACK_READ_TIMEOUT")]
    pub fallback_read_timeout: u64,
    /// Name of the date column in EAR resources.
    #[arg(long, default_value = "ear_data", env = "EAR_DATE_COLUMN")]
    pub date_column: String,
    /// Name of the reservoir name column in EAR resources.
    #[arg(long, default_value = "nom_reservatorio", env = "EAR_RESERVOIR_COLUMN")]
    pub reservoir_column: String,
    /// Base URL of the BigQuery REST API.
    #[arg(
        long,
        default_value = "https://bigquery.googleapis.com/bigquery/v2",
        env = "EAR_WAREHOUSE_API_URL"
    )]
    pub warehouse_api_url: Url,
    /// Warehouse project. The `/data` endpoints are disabled when unset.
    #[arg(long, env = "EAR_WAREHOUSE_PROJECT")]
    pub warehouse_project: Option<String>,
    /// Warehouse dataset.
    #[arg(long, default_value = "ear", env = "EAR_WAREHOUSE_DATASET")]
    pub warehouse_dataset: String,
    /// Warehouse table.
    #[arg(long, default_value = "dados", env = "EAR_WAREHOUSE_TABLE")]
    pub warehouse_table: String,
    /// OAuth2 bearer token for the warehouse API.
    #[arg(long, env = "EAR_WAREHOUSE_TOKEN", hide_env_values = true)]
    pub warehouse_token: Option<String>,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
