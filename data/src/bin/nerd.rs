use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use batch_client::{BatchClient, BearerCredentialHelper, HttpBatchClient, NoopBatchClient};
use cas_client::{LocalClient, ObjectClient, ObjectStoreClient};
use cas_types::DatasetSummary;
use clap::{Args, Parser, Subcommand};
use data::configurations::{DownloadConfig, UploadConfig};
use data::logging::{init_logging, LoggingConfig};
use data::{download, get_remote_dataset_size, upload};
use error_printer::OptionPrinter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!("nerd", "/", env!("CARGO_PKG_VERSION"));
const DEFAULT_BUCKET: &str = "nerdalize-datasets";

#[derive(Parser)]
#[clap(name = "nerd", version)]
struct NerdCommand {
    #[clap(flatten)]
    overrides: CliOverrides,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CliOverrides {
    /// Batch service endpoint. Without it, datasets are laid out under the default bucket and no
    /// heartbeats are sent.
    #[clap(long)]
    batch_endpoint: Option<String>, // if not specified we use env:NERD_BATCH_ENDPOINT
    /// Batch service access token.
    #[clap(long)]
    token: Option<String>, // if not specified we use env:NERD_TOKEN
    /// Store objects in this local directory instead of object storage.
    #[clap(long)]
    local_store: Option<PathBuf>,
}

#[derive(Args)]
struct DatasetArgs {
    /// Project the dataset belongs to.
    #[clap(long)]
    project: String,
    /// Dataset id.
    #[clap(long)]
    dataset: String,
    /// Bucket, when not resolved by the batch service.
    #[clap(long, default_value = DEFAULT_BUCKET)]
    bucket: String,
}

#[derive(Subcommand)]
enum Command {
    /// Uploads the contents of a directory as a dataset.
    Upload(UploadArg),
    /// Downloads a dataset into a directory.
    Download(DownloadArg),
    /// Prints the archived size of a dataset.
    Size(DatasetArgs),
}

#[derive(Args)]
struct UploadArg {
    #[clap(flatten)]
    dataset: DatasetArgs,
    /// Directory to upload.
    dir: PathBuf,
}

#[derive(Args)]
struct DownloadArg {
    #[clap(flatten)]
    dataset: DatasetArgs,
    /// Directory to extract into.
    output_dir: PathBuf,
}

struct Clients {
    batch: Arc<dyn BatchClient>,
    objects: Arc<dyn ObjectClient>,
    has_batch_service: bool,
}

impl CliOverrides {
    fn clients(self) -> Result<Clients> {
        let endpoint = self
            .batch_endpoint
            .or_else(|| std::env::var("NERD_BATCH_ENDPOINT").ok())
            .filter(|e| !e.is_empty());

        let (batch, has_batch_service): (Arc<dyn BatchClient>, bool) = match endpoint {
            Some(endpoint) => {
                let token = self
                    .token
                    .or_else(|| std::env::var("NERD_TOKEN").ok())
                    .warn_none("No batch service token given; sending unauthenticated requests")
                    .unwrap_or_default();
                let cred_helper = BearerCredentialHelper::new(token, "");
                (Arc::new(HttpBatchClient::new(&endpoint, USER_AGENT, cred_helper)?), true)
            },
            None => (Arc::new(NoopBatchClient), false),
        };

        let objects: Arc<dyn ObjectClient> = match self.local_store {
            Some(dir) => Arc::new(LocalClient::new(dir)),
            None => Arc::new(ObjectStoreClient::new()),
        };

        Ok(Clients {
            batch,
            objects,
            has_batch_service,
        })
    }
}

impl Clients {
    async fn dataset(&self, args: &DatasetArgs) -> Result<DatasetSummary> {
        if self.has_batch_service {
            return Ok(self.batch.describe_dataset(&args.project, &args.dataset).await?);
        }

        let project_root = format!("projects/{}", args.project);
        Ok(DatasetSummary {
            project_id: args.project.clone(),
            dataset_id: args.dataset.clone(),
            bucket: args.bucket.clone(),
            dataset_root: format!("{project_root}/datasets/{}", args.dataset),
            project_root,
        })
    }
}

/// Prints the running byte count to stderr.
fn report_progress(verb: &'static str) -> (mpsc::Sender<u64>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<u64>(256);
    let task = tokio::spawn(async move {
        let mut total = 0u64;
        while let Some(n) = rx.recv().await {
            total += n;
            eprint!("\r{verb} {total} bytes");
        }
        if total > 0 {
            eprintln!();
        }
    });
    (tx, task)
}

impl NerdCommand {
    async fn run(self, token: CancellationToken) -> Result<()> {
        let clients = self.overrides.clients()?;

        match self.command {
            Command::Upload(arg) => {
                let dataset = clients.dataset(&arg.dataset).await?;
                let (progress, printer) = report_progress("Uploaded");
                let config = UploadConfig::new(clients.batch.clone(), clients.objects.clone(), &arg.dir, dataset)
                    .with_progress(progress)
                    .with_cancellation_token(token);

                let summary = upload(config).await;
                printer.await?;
                let summary = summary?;
                println!(
                    "Uploaded dataset {} ({} bytes in {} chunks)",
                    arg.dataset.dataset, summary.size, summary.num_chunks
                );
            },
            Command::Download(arg) => {
                let dataset = clients.dataset(&arg.dataset).await?;
                let (progress, printer) = report_progress("Downloaded");
                let config = DownloadConfig::new(clients.objects.clone(), dataset, &arg.output_dir)
                    .with_progress(progress)
                    .with_cancellation_token(token);

                let received = download(config).await;
                printer.await?;
                println!("Downloaded {} bytes into {:?}", received?, arg.output_dir);
            },
            Command::Size(args) => {
                let dataset = clients.dataset(&args).await?;
                println!("{}", get_remote_dataset_size(clients.objects.as_ref(), &dataset).await?);
            },
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = NerdCommand::parse();
    init_logging(LoggingConfig::new(env!("CARGO_PKG_VERSION")));

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let token = CancellationToken::new();
        let on_interrupt = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, stopping...");
                on_interrupt.cancel();
            }
        });

        cli.run(token).await
    })
}
