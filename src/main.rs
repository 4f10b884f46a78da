use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bedrock_chat::cli::Commands;
use bedrock_chat::connector::{CatalogController, ChatController, Container, ContainerConfig};

#[derive(Parser)]
#[command(name = "bedrock-chat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true, default_value = "~/.bedrock-chat")]
    data_dir: String,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Region display name or code
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Model display name or identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Knowledge base name or identifier used to ground text answers
    #[arg(long, global = true)]
    kb: Option<String>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long, global = true)]
    no_stream: bool,

    /// Where video jobs write their output (s3://bucket/prefix)
    #[arg(long, global = true)]
    output_uri: Option<String>,

    /// Answer from a local mock instead of the managed runtime
    #[arg(long, global = true)]
    mock_backend: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data_dir = expand_tilde(&cli.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let container = Container::new(ContainerConfig {
        data_dir,
        config_path: cli.config.map(|p| expand_tilde(&p)),
        region: cli.region,
        model: cli.model,
        knowledge_base: cli.kb,
        streaming: !cli.no_stream,
        output_uri: cli.output_uri,
        mock_backend: cli.mock_backend,
    })
    .await?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let mut controller = ChatController::new(&container).await?;
            controller.run().await?;
        }
        Commands::Ask { prompt, attach } => {
            let mut controller = ChatController::new(&container).await?;
            for path in attach {
                eprintln!("{}", controller.attach(&expand_tilde(&path)).await?);
            }
            let output = controller.ask_once(prompt).await?;
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Commands::Models => {
            println!("{}", CatalogController::new(&container).models()?);
        }
        Commands::Kbs => {
            println!("{}", CatalogController::new(&container).knowledge_bases().await?);
        }
    }

    Ok(())
}

fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            if path == "~" {
                return home.to_string_lossy().to_string();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
