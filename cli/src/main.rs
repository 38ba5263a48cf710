mod bulk;
mod extract;
mod single;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use imgseo_core::client::MetaApiClient;
use imgseo_core::config::ClientSettings;
use imgseo_core::http::ReqwestTransport;

#[derive(Parser)]
#[command(name = "imgseo")]
#[command(about = "Find page images and generate SEO titles and alt text", long_about = None)]
struct Cli {
    #[command(flatten)]
    client: ClientArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the environment-driven client settings.
#[derive(Args)]
struct ClientArgs {
    /// API root (default: IMGSEO_SERVER_URL or http://127.0.0.1:3000/api/v1)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Bearer token (default: IMGSEO_API_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Attempts per call, including the first
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Wait between attempts of one call, in milliseconds
    #[arg(long, global = true)]
    retry_delay_ms: Option<u64>,

    /// Wait between items of a bulk run, in milliseconds
    #[arg(long, global = true)]
    request_delay_ms: Option<u64>,
}

impl ClientArgs {
    fn settings(&self) -> Result<ClientSettings> {
        let mut settings = ClientSettings::from_env().context("Invalid client configuration")?;
        if let Some(server) = &self.server {
            settings.server_url = server.clone();
        }
        if let Some(token) = &self.token {
            settings.api_token = Some(token.clone());
        }
        if let Some(max_attempts) = self.max_attempts {
            anyhow::ensure!(max_attempts > 0, "--max-attempts must be at least 1");
            settings.max_attempts = max_attempts;
        }
        if let Some(delay) = self.retry_delay_ms {
            settings.retry_delay_ms = delay;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        Ok(settings)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the server (unauthenticated)
    Ping,
    /// Extract image references from a page in a local library file (offline)
    Extract {
        /// Media library JSON document
        #[arg(long)]
        library: PathBuf,
        /// Page ID
        #[arg(long)]
        page: u64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List the media-library images the server finds on a page
    Analyze {
        #[arg(long)]
        page: u64,
    },
    /// Generate a title and alt text for one image
    Generate {
        #[arg(long)]
        image: u64,
        #[arg(long, default_value = "")]
        focus: String,
        #[arg(long, default_value = "")]
        secondary: String,
    },
    /// Save a title and/or alt text for one image
    Update {
        #[arg(long)]
        image: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        alt: Option<String>,
    },
    /// Generate (and optionally save) metadata for every image on a page
    Bulk {
        #[arg(long)]
        page: u64,
        /// Focus keyword applied to every image
        #[arg(long, default_value = "")]
        focus: String,
        /// Secondary keywords applied to every image
        #[arg(long, default_value = "")]
        secondary: String,
        /// JSON file of per-image keywords: {"<image id>": {"focus": "...", "secondary": "..."}}
        #[arg(long)]
        keywords: Option<PathBuf>,
        /// Save the generated metadata after generating
        #[arg(long)]
        update: bool,
        /// Skip confirmation prompts
        #[arg(long)]
        yes: bool,
    },
    /// Check the Gemini API key and model configured in the environment
    CheckKey,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Settings plus a client for the commands that talk to the server.
fn connect(args: &ClientArgs) -> Result<(ClientSettings, MetaApiClient<ReqwestTransport>)> {
    let settings = args.settings()?;
    let transport = ReqwestTransport::builder(&settings.server_url)
        .token(settings.api_token.clone())
        .timeout(settings.request_timeout())
        .user_agent(format!("imgseo-cli/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let client = MetaApiClient::with_policy(transport, settings.retry_policy());
    Ok((settings, client))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            library,
            page,
            json,
        } => extract::extract(&library, page, json),
        Commands::CheckKey => single::check_key().await,
        Commands::Ping => {
            let (settings, client) = connect(&cli.client)?;
            single::ping(&client, &settings).await
        }
        Commands::Analyze { page } => {
            let (_, client) = connect(&cli.client)?;
            single::analyze(&client, page).await
        }
        Commands::Generate {
            image,
            focus,
            secondary,
        } => {
            let (_, client) = connect(&cli.client)?;
            single::generate(&client, image, &focus, &secondary).await
        }
        Commands::Update { image, title, alt } => {
            let (_, client) = connect(&cli.client)?;
            single::update(&client, image, title, alt).await
        }
        Commands::Bulk {
            page,
            focus,
            secondary,
            keywords,
            update,
            yes,
        } => {
            let (settings, client) = connect(&cli.client)?;
            let options = bulk::BulkOptions {
                page,
                focus,
                secondary,
                keywords,
                update,
                assume_yes: yes,
            };
            bulk::run(client, &settings, options).await
        }
    }
}
