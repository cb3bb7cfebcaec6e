mod cmd;

use clap::{Parser, Subcommand};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "qwen3-service")]
#[command(version)]
#[command(about = "Qwen3 text generation with separated thinking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the model and serve the HTTP API and web UI
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        model_path: Option<PathBuf>,
    },
    /// Generate one reply from the terminal
    Generate {
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
        #[arg(long)]
        max_new_tokens: Option<NonZeroUsize>,
        #[arg(long)]
        model_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    qwen3_service::init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            model_path,
        } => cmd::serve(host, port, model_path).await,
        Commands::Generate {
            prompt,
            max_new_tokens,
            model_path,
        } => {
            let max_new_tokens = max_new_tokens.map(NonZeroUsize::get);
            cmd::generate(&prompt.join(" "), max_new_tokens, model_path).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
