use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use drive_core::DriveClient;
use drivepull::config::PullConfig;
use drivepull::sync::engine::PullEngine;
use drivepull::sync::metadata::XattrStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    root: PathBuf,
    remote_root: String,
    help: bool,
}

fn parse_cli<I>(args: I) -> anyhow::Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions {
        root: PathBuf::from("."),
        remote_root: "root".to_string(),
        help: false,
    };
    let mut iter = args.into_iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--root" | "-r" => {
                options.root = PathBuf::from(iter.next().context("--root requires a value")?);
            }
            "--remote-root" => {
                options.remote_root = iter.next().context("--remote-root requires a value")?;
            }
            "--help" | "-h" => options.help = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = parse_cli(std::env::args())?;
    if options.help {
        println!("Usage: drivepull [--root <dir>] [--remote-root <folder-id>]");
        println!("  --root         local directory to mirror into (default: current directory)");
        println!("  --remote-root  remote folder id to mirror from (default: root)");
        println!();
        println!("The API token is read from DRIVE_TOKEN (environment or .env).");
        return Ok(());
    }

    let token = std::env::var("DRIVE_TOKEN").context("DRIVE_TOKEN is not set")?;
    let client = match std::env::var("DRIVE_BASE_URL") {
        Ok(base) => DriveClient::with_base_url(&base, token)?,
        Err(_) => DriveClient::new(token)?,
    };
    let engine = PullEngine::new(client, Arc::new(XattrStore::new()), PullConfig::from_env());

    let report = engine.synchronize(&options.remote_root, &options.root).await?;
    info!(
        folders = report.folders_listed,
        downloads = report.downloads,
        adopted = report.adopted,
        up_to_date = report.up_to_date,
        skipped = report.skipped_no_content,
        conflicts = report.conflicts,
        failures = report.failures,
        "sync finished"
    );
    if report.failures > 0 {
        anyhow::bail!("{} task(s) failed", report.failures);
    }
    Ok(())
}
