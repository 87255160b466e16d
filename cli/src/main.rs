use clap::Parser;
use env_logger::Env;
use ojt_cli::cmd::GlobalArgs;

#[tokio::main]
async fn main() {
    // Warnings (e.g. a --cases filter that matches nothing) must be visible
    // without RUST_LOG being set.
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let app = GlobalArgs::parse();
    app.exec_subcmd().await.unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    });
}
