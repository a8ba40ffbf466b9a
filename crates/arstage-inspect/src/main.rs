//! arstage-inspect - Load a GLB the way the AR stage does
//!
//! Runs a model through the same loader the browser uses (fetch, decode,
//! normalize, build the animation mixer) and prints what came out.

use anyhow::{Context, Result};
use arstage_core::{AssetSource, FetchError, ModelLoader, ModelSource, ModelSummary, StageConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "arstage-inspect")]
#[command(about = "Load a GLB through the AR stage loader and report its contents")]
#[command(version)]
struct Args {
    /// File path or http(s) URL of a .glb asset
    source: String,

    /// Stage configuration (JSON, same format the page passes in)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the normalization radius in meters
    #[arg(short, long)]
    target_radius: Option<f32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

/// Reads local files and fetches http(s) URLs
struct CliAssetSource {
    client: reqwest::Client,
}

impl CliAssetSource {
    fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

impl AssetSource for CliAssetSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if !is_remote(url) {
            debug!(path = %url, "Reading local asset");
            return tokio::fs::read(url)
                .await
                .map_err(|e| FetchError(e.to_string()));
        }

        debug!(url = %url, "Fetching remote asset");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError(format!("HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            StageConfig::from_json(&json)?
        }
        None => StageConfig::default(),
    };
    if let Some(radius) = args.target_radius {
        config.target_radius = radius;
        config.validate()?;
    }
    info!(source = %args.source, radius = config.target_radius, "Inspecting model");

    let loader = ModelLoader::new(CliAssetSource::new()?, &config);
    let model = loader
        .load_model(&ModelSource::Url(args.source.clone()))
        .await
        .with_context(|| format!("loading {}", args.source))?;
    let summary = model.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&args.source, &summary);
    }
    Ok(())
}

fn print_summary(source: &str, summary: &ModelSummary) {
    println!("=== {} ===", source);
    println!();
    println!("Root node:   {}", summary.name);
    println!("Nodes:       {}", summary.nodes);
    println!("Meshes:      {} ({} primitives)", summary.meshes, summary.primitives);
    println!("Vertices:    {}", summary.vertices);
    println!("Scale:       {:.4}", summary.scale);
    println!("Radius:      {:.4} m", summary.radius);
    println!();

    if summary.clips.is_empty() {
        println!("No animation clips");
        return;
    }
    println!("Animation clips:");
    for clip in &summary.clips {
        println!(
            "  {:<24} {:>7.3}s  {} channels",
            clip.name.as_deref().unwrap_or("<unnamed>"),
            clip.duration,
            clip.channels
        );
    }
}
