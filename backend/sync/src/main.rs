use std::path::PathBuf;

use clap::Parser;
use commerce::api::DEFAULT_API_BASE_URL;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Custom backend to snapshot.
    #[arg(long, env = "CUSTOM_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    base_url: String,

    #[arg(long, default_value = "catalog.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    catalog_sync::sync_catalog(&args.base_url, &args.output).await?;

    Ok(())
}
