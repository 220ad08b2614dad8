use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::debug;
use servicefix::config::ClientOptions;
use servicefix::{ApiError, FileStore, ServiceFix};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[clap(name = "servicefix-cli", version, about = "Command line client for the ServiceFix API")]
struct Cli {
    /// Base URL of the ServiceFix API
    #[clap(long, env = "SERVICEFIX_API_URL")]
    api_url: String,

    /// Where the session is kept between runs
    #[clap(long, default_value = ".servicefix-session.json")]
    session_file: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[clap(long)]
        email: String,
        #[clap(long, env = "SERVICEFIX_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show a user profile
    User { id: String },
    /// Show a settings section
    Settings { section: String },
    /// Show SLA metrics
    Sla {
        #[clap(long)]
        period: Option<String>,
    },
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = FileStore::open(&cli.session_file)
        .with_context(|| format!("cannot open session file {}", cli.session_file.display()))?;
    debug!("Using session file {}", store.path().display());

    let servicefix = ServiceFix::with_store(&cli.api_url, ClientOptions::from_env()?, Arc::new(store))?;

    match cli.command {
        Command::Login { email, password } => {
            let user = servicefix.auth().login(&email, &password).await?;
            println!("Signed in as {} <{}> ({})", user.full_name(), user.email, user.role);
        }
        Command::Logout => {
            servicefix.auth().logout().await?;
            println!("Signed out");
        }
        Command::Whoami => match servicefix.auth().current_user() {
            Some(user) => print_json(&user)?,
            None => bail!("not signed in"),
        },
        Command::User { id } => print_json(&servicefix.users().get(&id).await?)?,
        Command::Settings { section } => print_json(&servicefix.settings().get(&section).await?)?,
        Command::Sla { period } => print_json(&servicefix.sla().metrics(period.as_deref()).await?)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ApiError>() {
                Some(api_err) => match serde_json::to_string_pretty(api_err) {
                    Ok(shape) => eprintln!("{}", shape),
                    Err(_) => eprintln!("error: {}", api_err),
                },
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
