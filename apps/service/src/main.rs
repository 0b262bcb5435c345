use clap::Parser;
use logger::init_tracing;

use sitewatch::cli::{Cli, execute};
use sitewatch::error::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    execute(cli).await
}
