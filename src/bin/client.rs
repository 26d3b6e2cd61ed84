use std::time::Instant;

use authgate::proto::auth_client::AuthClient;
use authgate::proto::{GetUserRequest, UserRequest};
use clap::{Parser, Subcommand};
use tonic::Request;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

#[derive(Parser)]
#[command(name = "authgate-client")]
#[command(about = "Calls the Auth service directly over gRPC", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:10000")]
    server: String,

    /// Metadata entry sent with the call, as `key=value`. May be repeated.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(short, long)]
        username: String,
    },

    GetUser {
        #[arg(short = 'i', long)]
        user_id: i64,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim().to_ascii_lowercase();

    AsciiMetadataKey::from_bytes(key.as_bytes())
        .map_err(|e| format!("invalid metadata key '{key}': {e}"))?;
    AsciiMetadataValue::try_from(value)
        .map_err(|e| format!("invalid metadata value for '{key}': {e}"))?;

    Ok((key, value.to_string()))
}

fn metadata(headers: &[(String, String)]) -> MetadataMap {
    let mut map = MetadataMap::new();
    for (key, value) in headers {
        // Both halves were validated by `parse_header`.
        if let (Ok(key), Ok(value)) = (
            AsciiMetadataKey::from_bytes(key.as_bytes()),
            AsciiMetadataValue::try_from(value.as_str()),
        ) {
            map.append(key, value);
        }
    }
    map
}

fn with_metadata<T>(message: T, headers: &[(String, String)]) -> Request<T> {
    let mut request = Request::new(message);
    *request.metadata_mut() = metadata(headers);
    request
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut client = AuthClient::connect(cli.server.clone()).await?;

    match cli.command {
        Commands::Login { username } => {
            println!("Logging in as '{username}'...");

            let start = Instant::now();
            let request = with_metadata(UserRequest { username }, &cli.headers);

            match client.login(request).await {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(response.get_ref())?);
                    println!("Completed in {:?}", start.elapsed());
                }
                Err(status) => {
                    eprintln!("Login failed: {} ({:?})", status.message(), status.code());
                    std::process::exit(1);
                }
            }
        }

        Commands::GetUser { user_id } => {
            println!("Looking up user {user_id}...");

            let start = Instant::now();
            let request = with_metadata(GetUserRequest { user_id }, &cli.headers);

            match client.get_user(request).await {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(response.get_ref())?);
                    println!("Completed in {:?}", start.elapsed());
                }
                Err(status) => {
                    eprintln!("GetUser failed: {} ({:?})", status.message(), status.code());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
