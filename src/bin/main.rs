use std::error::Error;

use clap::{Parser, Subcommand};

use storefront_auth::config::Config;
use storefront_auth::credential::extract_caveat_id;
use storefront_auth::dashboard::DashboardClient;
use storefront_auth::http::client::HttpClient;

#[derive(Parser, Debug)]
#[command(name = "storefront-auth-cli")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Request a root macaroon from the dashboard and print it together
    /// with its identity-provider caveat id
    RequestMacaroon,
    /// Extract the identity-provider caveat id from a serialized root
    /// macaroon
    CaveatId {
        #[arg(long)]
        macaroon: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::RequestMacaroon => {
            let http_client =
                HttpClient::new().map_err(|e| format!("error creating http client: {e}"))?;
            let dashboard = DashboardClient::new(http_client, config.clone());
            let root = dashboard.request_macaroon()?;
            let caveat_id = extract_caveat_id(&root, config.login_host())?;
            println!("{root}");
            println!("caveat id: {caveat_id}");
        }
        Commands::CaveatId { macaroon } => {
            println!("{}", extract_caveat_id(&macaroon, config.login_host())?);
        }
    }
    Ok(())
}
