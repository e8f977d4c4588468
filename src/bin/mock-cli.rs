use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "mock-cli")]
#[command(about = "Console client for a running mock server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the live route map
    Db {
        /// Drop runtime fields (ids, fetch data, stores)
        #[arg(long)]
        clean: bool,
    },
    /// Print one route by id
    Route { id: String },
    /// Print the shared store
    Store,
    /// Print the rewrite table
    Rewriters,
    /// List route paths
    Routes,
    /// Reset every route, or one route by id
    Reset { id: Option<String> },
    /// Fetch a route's upstream now
    Refresh { id: String },
}

impl Commands {
    fn request(&self) -> (Method, String) {
        match self {
            Commands::Db { clean: true } => (Method::GET, "/_db?_clean=true".into()),
            Commands::Db { clean: false } => (Method::GET, "/_db".into()),
            Commands::Route { id } => (Method::GET, format!("/_db/{}", id)),
            Commands::Store => (Method::GET, "/_store".into()),
            Commands::Rewriters => (Method::GET, "/_rewriters".into()),
            Commands::Routes => (Method::GET, "/_routes".into()),
            Commands::Reset { id: None } => (Method::POST, "/_reset".into()),
            Commands::Reset { id: Some(id) } => (Method::POST, format!("/_reset/{}", id)),
            Commands::Refresh { id } => (Method::POST, format!("/_refresh/{}", id)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let (method, path) = cli.command.request();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: console returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
