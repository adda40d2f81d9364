use clap::Parser;
use replay_cli::Cli;
use replay_cli::init_tracing;
use replay_cli::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    if !run_main(cli).await? {
        std::process::exit(1);
    }
    Ok(())
}
