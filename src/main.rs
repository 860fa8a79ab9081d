use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info_span, Instrument};

use ffund_gateway::client::ApiClient;
use ffund_gateway::config::{config_schema, load_config};
use ffund_gateway::error::GatewayError;
use ffund_gateway::startup::build_client;
use ffund_gateway::utils::logger::init_logging;

#[derive(Parser)]
#[command(name = "ffund-gateway")]
#[command(version, about = "Authenticated client for the FFund admin API")]
pub struct Cli {
    /// Path to the YAML configuration
    #[arg(short, long, default_value = "./config.yaml", global = true)]
    pub config: PathBuf,

    /// Print gateway metrics to stderr after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the JSON schema of the configuration file
    Schema,
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the stored session
    Logout,
    /// Show the stored user id and role
    Whoami,
    /// GET a path and print its `data`
    Get { path: String },
    /// POST a JSON body and print the response `data`
    Post { path: String, body: String },
    /// PUT a JSON body and print the response `data`
    Put { path: String, body: String },
    /// DELETE a path
    Delete { path: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Schema = cli.command {
        match config_schema() {
            Ok(schema) => println!("{}", schema),
            Err(e) => {
                eprintln!("Error rendering schema: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let client = match build_client(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let span = info_span!("ffund", service = %config.logging.service_name);
    let result = run(&client, cli.command).instrument(span).await;

    if cli.metrics {
        eprint!("{}", client.gateway().metrics().render());
    }

    if let Err(e) = result {
        if e.is_terminal() {
            eprintln!("{} (run `ffund-gateway login` to start a new session)", e);
        } else {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}

async fn run(client: &ApiClient, command: Commands) -> Result<(), GatewayError> {
    match command {
        Commands::Schema => Ok(()),
        Commands::Login { email, password } => {
            let session = client.login(&email, &password).await?;
            println!(
                "Logged in as user {} ({})",
                session.user_id.as_deref().unwrap_or("?"),
                session.role.as_deref().unwrap_or("?")
            );
            Ok(())
        }
        Commands::Logout => {
            client.logout().await;
            println!("Logged out");
            Ok(())
        }
        Commands::Whoami => {
            let session = client.require_session().await?;
            println!(
                "user {} ({})",
                session.user_id.as_deref().unwrap_or("?"),
                session.role.as_deref().unwrap_or("?")
            );
            Ok(())
        }
        Commands::Get { path } => print_json(&client.get::<Value>(&path).await?),
        Commands::Post { path, body } => {
            let body = parse_body(&body)?;
            print_json(&client.post::<Value, Value>(&path, &body).await?)
        }
        Commands::Put { path, body } => {
            let body = parse_body(&body)?;
            print_json(&client.put::<Value, Value>(&path, &body).await?)
        }
        Commands::Delete { path } => print_json(&client.delete(&path).await?),
    }
}

fn parse_body(body: &str) -> Result<Value, GatewayError> {
    serde_json::from_str(body).map_err(|e| GatewayError::Decode(format!("request body: {}", e)))
}

fn print_json(value: &Value) -> Result<(), GatewayError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|e| GatewayError::Decode(e.to_string()))?;
    println!("{}", rendered);
    Ok(())
}
