//! Fetch a dataset to local disk ahead of a batch job.
//!
//! Compute nodes do not have internet access, so run this on the login node first
//! and submit the job once the files are there. Without arguments it fetches the
//! MNIST training split into `./data`.
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vision_datasets::{Dataset, DatasetKind, MnistBuilder, Split};

/// Third-party targets whose warnings are silenced unless asked for.
const PROVIDER_NOISE: [&str; 2] = ["hyper=error", "reqwest=error"];

#[derive(Debug, Parser)]
#[command(version, about = "Download a dataset before running a job offline")]
struct Cli {
    /// Directory the dataset is stored under
    #[arg(long, default_value = "data")]
    root: PathBuf,

    /// Dataset to fetch: mnist, fashion-mnist or kmnist
    #[arg(long, default_value = "mnist")]
    dataset: DatasetKind,

    /// Partition to load once present: train or test
    #[arg(long, default_value = "train")]
    split: Split,

    /// Fail instead of downloading when the files are absent
    #[arg(long)]
    no_download: bool,

    /// Mirror base url, may be repeated. Replaces the built-in list.
    #[arg(long = "mirror", value_name = "URL")]
    mirrors: Vec<String>,

    /// Do not draw progress bars
    #[arg(long)]
    no_progress: bool,

    /// Keep warnings emitted by the http stack
    #[arg(long)]
    show_provider_warnings: bool,
}

fn log_filter(show_provider_warnings: bool) -> String {
    let mut directives = vec!["info"];
    if !show_provider_warnings {
        directives.extend(PROVIDER_NOISE);
    }
    directives.join(",")
}

fn init_tracing(show_provider_warnings: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(show_provider_warnings)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.show_provider_warnings);

    let mut builder = MnistBuilder::new(&cli.root)
        .kind(cli.dataset)
        .split(cli.split)
        .download(!cli.no_download)
        .with_progress(!cli.no_progress);
    if !cli.mirrors.is_empty() {
        builder = builder.with_mirrors(cli.mirrors);
    }
    let raw_folder = builder.raw_folder();

    let dataset = builder
        .build()
        .await
        .with_context(|| format!("fetching {} into {}", cli.dataset, cli.root.display()))?;
    tracing::info!(
        dataset = %cli.dataset,
        split = %cli.split,
        samples = dataset.len(),
        path = %raw_folder.display(),
        "dataset ready"
    );
    Ok(())
}
