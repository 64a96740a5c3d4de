//! Deploy-time helper for the platform push subscription.
//!
//! Usage:
//!   subscriptions create <gcp-project-id> <topic>
//!   subscriptions delete
//!
//! Reads the commerce credentials from the config file at CONFIG_PATH
//! (default: config.toml).

use std::env;

use relay_core::commerce::CommerceClient;
use relay_core::{Config, init_logging, subscription};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("dev")?;

    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;
    let client = CommerceClient::new(reqwest::Client::new(), &config.commerce);

    let args: Vec<String> = env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args[..] {
        ["create", gcp_project_id, topic] => {
            let created =
                subscription::create_approval_flow_subscription(&client, gcp_project_id, topic)
                    .await?;
            println!("created subscription {} (key {})", created.id, subscription::SUBSCRIPTION_KEY);
        }
        ["delete"] => match subscription::delete_approval_flow_subscription(&client).await? {
            Some(deleted) => println!("deleted subscription {}", deleted.id),
            None => println!("no subscription registered; nothing to delete"),
        },
        _ => {
            eprintln!("usage: subscriptions create <gcp-project-id> <topic> | subscriptions delete");
            std::process::exit(2);
        }
    }

    Ok(())
}
