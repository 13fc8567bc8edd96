//! CLI binary entry point.

use clap::Parser;
use sso_bearer::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let result = match args.command {
        Commands::Login(args) => cli::handle_login(&args).await,
        Commands::Status(args) => cli::handle_status(&args).await,
        Commands::Token(args) => cli::handle_token(&args).await,
        Commands::Logout(args) => cli::handle_logout(&args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
