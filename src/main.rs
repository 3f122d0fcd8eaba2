use color_eyre::Result;
use portal_sync::cli::{init_logging, parse_args, run_cli_command};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let command = parse_args(std::env::args());
    run_cli_command(command).await
}
