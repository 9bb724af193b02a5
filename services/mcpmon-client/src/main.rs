use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mcpmon_client::{
    load_config, shared_cache, ApiClient, CacheSync, Config, ConnectionEvent, ContactMessage,
    Feedback, MessageHandler, MonitorChanges, MonitorRecord, NewMonitor, RealtimeClient,
    ScanRequest, Session, SharedCache, SignupRequest, WireMessage,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn, Level};

#[derive(Parser)]
#[command(name = "mcpmon-client")]
#[command(about = "Command line client for the MCPmon monitoring service")]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API base URL (overrides the configuration file)
    #[arg(long)]
    api_url: Option<String>,

    /// Session token from a previous login
    #[arg(long)]
    token: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info", value_parser = clap::value_parser!(Level))]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the session token
    Login { email: String, password: String },

    /// Create an account and print the session token
    Signup {
        name: String,
        email: String,
        password: String,
    },

    /// Confirm an email address
    VerifyEmail { token: String },

    /// Email a password reset link
    ForgotPassword { email: String },

    /// Set a new password with the token from a reset link
    ResetPassword { token: String, password: String },

    /// Finish a Google sign-in from the redirect URL and print the session token
    OauthCallback { url: String },

    /// List monitors
    List {
        /// Only monitors with this status
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one monitor
    Get { id: String },

    /// Create a monitor
    Create {
        name: String,
        url: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Change a monitor's settings
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Enable or disable tool discovery
        #[arg(long)]
        tools_sync: Option<bool>,
    },

    /// Delete a monitor
    Delete { id: String },

    /// Pause checks for a monitor
    Pause { id: String },

    /// Resume checks for a monitor
    Resume { id: String },

    /// Show uptime and response time statistics
    Stats { id: String },

    /// Show a monitor's public status page data
    Public { id: String },

    /// Send product feedback
    Feedback {
        message: String,
        /// Allow the team to reply
        #[arg(long)]
        allow_response: bool,
    },

    /// Send a message through the contact form
    Contact { email: String, message: String },

    /// Scan a YouTube channel for broken affiliate links
    Scan {
        channel_id: String,
        affiliate_id: String,
    },

    /// Load the monitor list and follow live updates
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    debug!(
        "Parsed command line arguments: api_url={:?}, log_level={:?}",
        args.api_url, args.log_level
    );

    let mut config = match &args.config {
        Some(path) => {
            debug!("Loading configuration from {:?}", path);
            load_config(path)?
        }
        None => Config::default(),
    };
    if let Some(api_url) = args.api_url {
        config.api.base_url = api_url;
    }
    config.validate()?;

    let session = match args.token {
        Some(token) => Session::with_token(token),
        None => Session::new(),
    };
    let api = ApiClient::new(&config.api, session.clone(), shared_cache())?;

    match args.command {
        Commands::Login { email, password } => {
            let user = api.login(&email, &password).await?;
            info!("Logged in as {}", user.email);
            println!("{}", user.token);
        }
        Commands::Signup {
            name,
            email,
            password,
        } => {
            let user = api
                .signup(&SignupRequest {
                    name,
                    email,
                    password,
                })
                .await?;
            info!("Account created for {}", user.email);
            println!("{}", user.token);
        }
        Commands::VerifyEmail { token } => {
            print_json(&api.verify_email(&token).await?)?;
        }
        Commands::ForgotPassword { email } => {
            api.forgot_password(&email).await?;
            info!("Password reset email requested for {}", email);
        }
        Commands::ResetPassword { token, password } => {
            api.reset_password(&token, &password).await?;
            info!("Password updated");
        }
        Commands::OauthCallback { url } => {
            let user = api.complete_oauth(&url)?;
            info!("Logged in as {}", user.email);
            println!("{}", user.token);
        }
        Commands::List { status } => {
            let filters: Vec<(&str, &str)> = status
                .as_deref()
                .map(|status| vec![("status", status)])
                .unwrap_or_default();
            for record in api.list_monitors(&filters).await? {
                print_record(&record);
            }
        }
        Commands::Get { id } => {
            print_json(&api.get_monitor(&id).await?)?;
        }
        Commands::Create {
            name,
            url,
            description,
        } => {
            let record = api
                .create_monitor(&NewMonitor {
                    name,
                    url,
                    description,
                })
                .await?;
            print_json(&record)?;
        }
        Commands::Update {
            id,
            name,
            url,
            description,
            tools_sync,
        } => {
            let changes = MonitorChanges {
                name,
                url,
                description,
                tools_sync_enabled: tools_sync,
                ..Default::default()
            };
            print_json(&api.update_monitor(&id, &changes).await?)?;
        }
        Commands::Delete { id } => {
            api.delete_monitor(&id).await?;
            info!("Deleted monitor {}", id);
        }
        Commands::Pause { id } => {
            print_json(&api.pause_monitor(&id).await?)?;
        }
        Commands::Resume { id } => {
            print_json(&api.resume_monitor(&id).await?)?;
        }
        Commands::Stats { id } => {
            print_json(&api.monitor_stats(&id).await?)?;
        }
        Commands::Public { id } => {
            print_json(&api.public_monitor(&id).await?)?;
        }
        Commands::Feedback {
            message,
            allow_response,
        } => {
            api.submit_feedback(&Feedback {
                feedback: message,
                allow_response,
            })
            .await?;
            info!("Feedback sent");
        }
        Commands::Contact { email, message } => {
            api.submit_contact(&ContactMessage { email, message })
                .await?;
            info!("Message sent");
        }
        Commands::Scan {
            channel_id,
            affiliate_id,
        } => {
            let report = api
                .scan_channel(&ScanRequest {
                    channel_id,
                    affiliate_id,
                })
                .await?;
            print_json(&report)?;
        }
        Commands::Watch => {
            run_watch(&config, &api, &session).await?;
        }
    }

    Ok(())
}

/// Prints every record a push message touched
struct PrintUpdates {
    sync: CacheSync,
    cache: SharedCache,
}

#[async_trait]
impl MessageHandler for PrintUpdates {
    async fn handle(&self, message: WireMessage) {
        let id = message
            .data
            .as_ref()
            .and_then(|data| MonitorRecord::from_value(data.clone()))
            .and_then(|record| record.id().map(str::to_string));
        let outcome = self.sync.apply(message).await;
        if !outcome.applied() {
            return;
        }
        if let Some(id) = id {
            let cache = self.cache.read().await;
            let updated = cache
                .list()
                .and_then(|list| list.into_iter().find(|r| r.id() == Some(id.as_str())))
                .or_else(|| cache.get(&id).cloned());
            if let Some(record) = updated {
                print_record(&record);
            }
        }
    }
}

async fn run_watch(
    config: &Config,
    api: &ApiClient,
    session: &Session,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = api.list_monitors(&[]).await?;
    info!("Loaded {} monitors", records.len());
    for record in &records {
        print_record(record);
    }

    let handler = PrintUpdates {
        sync: CacheSync::new(api.cache().clone()),
        cache: api.cache().clone(),
    };
    let client = RealtimeClient::new(config, session.subscribe(), Arc::new(handler));
    let mut events = client.subscribe();
    client.start();

    info!("Watching for monitor updates (press Ctrl+C to stop)...");

    loop {
        tokio::select! {
            event = next_event(&mut events) => {
                match event {
                    Some(event) => print_event(&event),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Next connection event, or `None` once the client is gone
///
/// A lagging receiver skips the events it missed and keeps going.
async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> Option<ConnectionEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} connection events", skipped);
            }
            Err(RecvError::Closed) => {
                debug!("Event channel closed");
                return None;
            }
        }
    }
}

fn print_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connecting { attempt } => info!("Connecting (attempt {})", attempt),
        ConnectionEvent::Connected => info!("Connected to push channel"),
        ConnectionEvent::ConnectionLost { reason } => warn!("Connection lost: {}", reason),
        ConnectionEvent::Reconnecting {
            attempt,
            max_attempts,
        } => info!("Reconnecting ({}/{})", attempt, max_attempts),
        ConnectionEvent::ReconnectExhausted { attempts } => {
            warn!("Giving up after {} reconnect attempts", attempts)
        }
        ConnectionEvent::Disconnected => info!("Disconnected"),
    }
}

fn print_record(record: &MonitorRecord) {
    let name = record
        .get("name")
        .and_then(|name| name.as_str())
        .unwrap_or("-");
    println!(
        "{:<26} {:<10} {}",
        record.id().unwrap_or("-"),
        record.status(),
        name
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
