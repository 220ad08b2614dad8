use log::info;
use servicefix::{SessionEvent, ServiceFix};
use std::env;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let email = env::var("SERVICEFIX_EMAIL")?;
    let password = env::var("SERVICEFIX_PASSWORD")?;

    // Reads SERVICEFIX_API_URL and the optional SERVICEFIX_* settings
    let servicefix = ServiceFix::from_env()?;
    let auth = servicefix.auth();

    // Print session events as they happen
    let mut events = auth.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Expired { redirect_to } => {
                    println!("Session expired; the app would now navigate to {}", redirect_to);
                }
                other => println!("Session event: {:?}", other),
            }
        }
    });

    println!("Signing in as {}", email);
    let user = auth.login(&email, &password).await?;
    println!("Signed in: {} ({})", user.full_name(), user.role);

    println!("\nFetching own profile");
    let profile = servicefix.users().get(&user.id).await?;
    println!("{}", serde_json::to_string_pretty(&profile)?);

    if user.role.is_staff() {
        println!("\nSLA metrics for the last 7 days");
        let metrics = servicefix.sla().metrics(Some("7d")).await?;
        println!(
            "{} tickets, {:.1}% within SLA",
            metrics.total_tickets,
            metrics.effective_compliance_rate()
        );
    }

    println!("\nGeneral settings");
    match servicefix.settings().get("general").await {
        Ok(settings) => println!("{}", serde_json::to_string_pretty(&settings)?),
        Err(err) => println!("Could not load settings: {} (kind {:?})", err, err.kind()),
    }

    println!("\nSigning out");
    auth.logout().await?;
    info!("Walkthrough finished");

    drop(servicefix);
    watcher.abort();
    Ok(())
}
