//! refract binary: wires filesystem storage, the raster codec, the HTTP
//! fetcher and the throttle registry into the pipeline and serves it.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use refract::{
    FileDriver, Fetcher, HttpFetcher, Pipeline, RasterCodec, StorageDriver, ThrottleRegistry,
};
use serve::ServeConfig;

#[derive(Parser, Debug)]
#[command(name = "refract")]
#[command(about = "refract — on-demand image transformation service")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "REFRACT_PORT", default_value_t = 3002)]
    port: u16,

    /// Base directory for cached originals and derived images
    #[arg(long, env = "REFRACT_FS_BASE", default_value = "/tmp/refract")]
    fs_base: PathBuf,

    /// Global cap on simultaneous origin downloads
    #[arg(long, env = "REFRACT_MAX_FETCHES", default_value_t = 100)]
    max_fetches: usize,

    /// Per-origin-host cap on simultaneous downloads
    #[arg(long, env = "REFRACT_MAX_FETCHES_PER_ORIGIN", default_value_t = 10)]
    max_fetches_per_origin: usize,

    /// max-age for the Cache-Control header on image responses, seconds
    #[arg(long, env = "REFRACT_CDN_TTL", default_value_t = 604_800)]
    cdn_ttl: u64,

    /// When set, requests whose Host header differs get a 404
    #[arg(long, env = "REFRACT_DOMAIN")]
    domain: Option<String>,

    /// Comma-separated referer hosts allowed to request images (suffix match);
    /// empty allows everyone
    #[arg(long, env = "REFRACT_ALLOW_HOSTS", value_delimiter = ',')]
    allow_hosts: Vec<String>,

    /// Public domain used to build upload URLs in API responses
    #[arg(long, env = "REFRACT_PUBLIC_DOMAIN", default_value = "localhost")]
    public_domain: String,
}

impl Args {
    fn serve_config(&self) -> ServeConfig {
        ServeConfig {
            port: self.port,
            max_fetches: self.max_fetches,
            max_fetches_per_origin: self.max_fetches_per_origin,
            cdn_ttl: self.cdn_ttl,
            domain: self.domain.clone(),
            allowed_referers: self
                .allow_hosts
                .iter()
                .map(|host| host.trim().to_string())
                .filter(|host| !host.is_empty())
                .collect(),
            public_domain: self.public_domain.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.serve_config();

    let storage: Arc<dyn StorageDriver> = Arc::new(FileDriver::new(&args.fs_base));
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);
    let throttle = ThrottleRegistry::new(config.max_fetches, config.max_fetches_per_origin);
    let pipeline = Arc::new(
        Pipeline::new(Arc::clone(&storage), Arc::new(RasterCodec), fetcher, throttle).await?,
    );

    tracing::info!(
        port = config.port,
        fs_base = %args.fs_base.display(),
        "starting refract"
    );
    serve::run_serve(config, pipeline, storage).await
}
