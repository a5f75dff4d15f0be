mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let exit_code = cli::Cli::parse().run().await?;
    std::process::exit(exit_code);
}
