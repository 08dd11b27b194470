use anyhow::Result;
use clap::Parser;
use easy_deploy::cli::{self, Cli};
use easy_deploy::config::Config;
use easy_deploy::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(&cli.log_config())?;

    let config = Config::from_env().with_overrides(
        cli.ws_base.clone(),
        cli.api_base.clone(),
        cli.token.clone(),
    );
    cli::run(cli, config).await
}
