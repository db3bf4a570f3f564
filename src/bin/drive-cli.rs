use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use drive_gatekeeper::config::{SessionConfig, SigningAlgorithm};
use drive_gatekeeper::security::session::SessionAuthenticator;

#[derive(Parser)]
#[command(name = "drive-cli")]
#[command(about = "Management CLI for the drive gatekeeper", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "ADMIN_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gatekeeper status
    Status,
    /// Show tracked rate-limit clients and the active policy
    Clients,
    /// Sign a session token locally and print its Set-Cookie value
    MintToken {
        #[arg(long)]
        user_id: u64,

        #[arg(long)]
        email: String,

        #[arg(long, env = "SIGNING_KEY", hide_env_values = true)]
        signing_key: String,

        #[arg(long, default_value = "HS256")]
        algorithm: String,

        #[arg(long, default_value_t = 14_400)]
        ttl_secs: u64,

        #[arg(long, default_value = "drive_session")]
        cookie_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let path = match cli.command {
        Commands::Status => "status",
        Commands::Clients => "clients",
        Commands::MintToken {
            user_id,
            email,
            signing_key,
            algorithm,
            ttl_secs,
            cookie_name,
        } => {
            let algorithm = match algorithm.to_ascii_uppercase().as_str() {
                "HS256" => SigningAlgorithm::HS256,
                "HS384" => SigningAlgorithm::HS384,
                "HS512" => SigningAlgorithm::HS512,
                other => return Err(format!("unsupported algorithm {}", other).into()),
            };
            let session = SessionConfig {
                signing_key,
                algorithm,
                cookie_name,
                ttl_secs,
                ..SessionConfig::default()
            };
            let auth = SessionAuthenticator::new(&session);
            let token = auth.issue(user_id, &email)?;
            println!("{}", token);
            eprintln!("Set-Cookie: {}", auth.session_cookie(&token));
            return Ok(());
        }
    };

    let client = reqwest::Client::new();
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = client
        .get(format!("{}/admin/{}", cli.url, path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
