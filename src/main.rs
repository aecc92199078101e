use anyhow::{bail, Context, Result};
use chartshot::codec;
use chartshot::host::DEFAULT_EDITOR_URL;
use chartshot::metadata::{extract_metadata, AttributeSelection, DicomReader, ExtractOptions};
use chartshot::{ChartSpec, Delivery, HoldSignal, RenderOptions, Strategy};
use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Render UDI grammar charts through the hosted editor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render one spec to an image
    Render {
        /// Spec JSON file
        spec: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Render several specs in parallel, one session each
    Batch {
        #[arg(required = true)]
        specs: Vec<PathBuf>,
        #[arg(long)]
        out_dir: PathBuf,
        /// Concurrent sessions (defaults to the CPU count)
        #[arg(long)]
        jobs: Option<usize>,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Print the editor URL that carries a spec
    Encode {
        spec: PathBuf,
        #[arg(long, default_value = DEFAULT_EDITOR_URL)]
        editor_url: String,
    },
    /// Print the spec carried by an editor URL token
    Decode { token: String },
    /// Write DICOM header attributes of a folder to CSV
    Metadata {
        dir: PathBuf,
        #[arg(short, long, default_value = "dicom_metadata.csv")]
        output: PathBuf,
        /// Only these attribute keywords (repeatable)
        #[arg(long = "attr")]
        attributes: Vec<String>,
        /// The imaging use-case column set
        #[arg(long, conflicts_with = "attributes")]
        usecase: bool,
        #[arg(long)]
        max_files: Option<usize>,
    },
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// JSON file with base render options
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    strategy: Option<Strategy>,
    #[arg(long)]
    delivery: Option<Delivery>,
    /// Visible browser with page instrumentation
    #[arg(long)]
    debug: bool,
    /// Stay headless even in debug mode
    #[arg(long)]
    headless: bool,
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    settle_ms: Option<u64>,
    /// Debug only: keep the browser open this long after the render
    #[arg(long)]
    hold_ms: Option<u64>,
    #[arg(long)]
    editor_url: Option<String>,
}

impl RenderArgs {
    fn options(&self) -> Result<RenderOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str::<RenderOptions>(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => RenderOptions::default(),
        };
        if let Some(strategy) = self.strategy {
            options.strategy = strategy;
        }
        if self.delivery.is_some() {
            options.delivery = self.delivery;
        }
        options.debug |= self.debug;
        if self.headless {
            options.headless = Some(true);
        }
        if let Some(ms) = self.timeout_ms {
            options.timeout_ms = ms;
        }
        if let Some(ms) = self.settle_ms {
            options.settle_delay_ms = ms;
        }
        if let Some(ms) = self.hold_ms {
            options.hold_ms = ms;
        }
        if let Some(url) = &self.editor_url {
            options.host.editor_url = url.clone();
        }
        options.validate()?;
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { spec, output, render } => {
            let options = render.options()?;
            let spec = ChartSpec::from_file(&spec)?;
            release_on_ctrl_c(&options);
            let artifact = render_one(spec, output, options).await?;
            println!("{}", artifact.display());
        }
        Commands::Batch {
            specs,
            out_dir,
            jobs,
            render,
        } => {
            let options = render.options()?;
            release_on_ctrl_c(&options);
            let failed = render_many(&specs, &out_dir, jobs.unwrap_or_else(num_cpus::get), &options).await?;
            if failed > 0 {
                bail!("{} of {} renders failed", failed, specs.len());
            }
        }
        Commands::Encode { spec, editor_url } => {
            let spec = ChartSpec::from_file(&spec)?;
            let token = codec::encode_for_transport(&spec)?;
            println!("{}", codec::editor_url(&editor_url, &token));
        }
        Commands::Decode { token } => {
            let token = token.rsplit("spec=").next().unwrap_or(&token);
            let spec = codec::decode_token(token)?;
            println!("{}", codec::serialize(&spec)?);
        }
        Commands::Metadata {
            dir,
            output,
            attributes,
            usecase,
            max_files,
        } => {
            let attributes = if usecase {
                AttributeSelection::usecase()
            } else if attributes.is_empty() {
                AttributeSelection::All
            } else {
                AttributeSelection::Selected(attributes)
            };
            let options = ExtractOptions { attributes, max_files };
            let report = extract_metadata(&dir, &output, &options, &DicomReader)?;
            println!(
                "{} rows, {} skipped -> {}",
                report.rows,
                report.skipped.len(),
                report.output.display()
            );
        }
    }
    Ok(())
}

/// While a debug hold is configured, the first Ctrl-C ends the hold and lets
/// the session close normally; a second one exits. Without a hold the default
/// SIGINT behaviour is left alone.
fn release_on_ctrl_c(options: &RenderOptions) {
    if !options.holds_for_inspection() {
        return;
    }
    let signal: HoldSignal = options.hold_signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Releasing debug hold; press Ctrl-C again to exit now");
        signal.release();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

#[cfg(feature = "cdp")]
async fn render_one(spec: ChartSpec, output: PathBuf, options: RenderOptions) -> Result<PathBuf> {
    let artifact = chartshot::async_api::render_async(spec, output, options).await?;
    Ok(artifact.path)
}

#[cfg(not(feature = "cdp"))]
async fn render_one(_spec: ChartSpec, _output: PathBuf, _options: RenderOptions) -> Result<PathBuf> {
    bail!("rendering requires the `cdp` feature")
}

#[cfg(feature = "cdp")]
async fn render_many(specs: &[PathBuf], out_dir: &Path, jobs: usize, options: &RenderOptions) -> Result<usize> {
    use chartshot::async_api::{render_batch, RenderJob};
    use std::sync::Arc;

    let mut batch = Vec::with_capacity(specs.len());
    for path in specs {
        let stem = path
            .file_stem()
            .with_context(|| format!("{} has no file name", path.display()))?;
        batch.push(RenderJob {
            spec: ChartSpec::from_file(path)?,
            destination: out_dir.join(format!("{}.png", stem.to_string_lossy())),
        });
    }

    let outcomes = render_batch(Arc::new(chartshot::cdp::CdpLauncher), batch, options, jobs).await;
    let mut failed = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(artifact) => println!("{}", artifact.path.display()),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", outcome.destination.display(), e);
            }
        }
    }
    Ok(failed)
}

#[cfg(not(feature = "cdp"))]
async fn render_many(_specs: &[PathBuf], _out_dir: &Path, _jobs: usize, _options: &RenderOptions) -> Result<usize> {
    bail!("rendering requires the `cdp` feature")
}
