use clap::Parser;

use promstore::cli::{self, Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve {
            config,
            listen,
            redis_url,
        } => cli::handle_serve(config, listen, redis_url).await,
        Command::Render { config, redis_url } => cli::handle_render(config, redis_url).await,
        Command::Version => {
            cli::handle_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
