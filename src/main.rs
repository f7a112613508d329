use clap::Parser;

use sharp_lsp::config::Cli;
use sharp_lsp::lsp::server::run_server;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run_server(cli).await {
        eprintln!("sharp-lsp: {:#}", e);
        std::process::exit(1);
    }
}
