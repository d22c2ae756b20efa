use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use immo::config::Config;
use immo::{build_app, cli, db};

#[derive(Parser)]
#[command(name = "immo", version, about = "Property listings and visit scheduling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server (default)
    Serve,
    /// Create a back-office agent and print their invite code
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Import listings from a JSON array
    ImportProperties {
        /// Path to the JSON file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    // Loads .env first so RUST_LOG set there is honoured
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pool = db::init_pool(&config.database_url).await?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let app = build_app(pool, config.secure_cookies).await?;
            let listener = TcpListener::bind(config.bind_addr).await?;

            tracing::info!("listening on {}", config.bind_addr);
            axum::serve(listener, app).await?;
        }
        Commands::CreateUser { name, email } => {
            let user = cli::create_user(&pool, &name, email.as_deref()).await?;
            println!("Created user:");
            println!("  ID: {}", user.id);
            println!("  Name: {}", user.name);
            println!("  Invite Code: {}", user.invite_code);
        }
        Commands::ImportProperties { file } => {
            let imported = cli::import_properties(&pool, &file).await?;
            println!("Imported {imported} properties");
        }
    }

    Ok(())
}
