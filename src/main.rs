use clap::Parser;

use esoarchive_service::cli::Cli;
use esoarchive_service::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug_enabled());

    if let Err(err) = cli.run().await {
        eprintln!("esoarchive error: {err}");
        std::process::exit(1);
    }
}
