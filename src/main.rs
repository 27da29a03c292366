#![cfg(not(tarpaulin_include))]

use jinet::{app, config::Config, db::Database, models::ROLE_ADMIN, users};
use log::error;
use std::env;

/// Entry point for the JINet server.
///
/// * `jinet` or `jinet serve` starts the web server
/// * `jinet promote <username>` gives an existing user the admin role
///
/// The binary starts without an identity provider, so `/login` and
/// `/callback` answer 404 until a deployment builds its own entry point
/// passing an [`jinet::auth::IdentityProvider`] to [`app::run`].
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config = Config::load()?;

    match args.get(1).map(String::as_str) {
        None | Some("serve") => app::run(config, None).await,
        Some("promote") => match args.get(2) {
            Some(username) => {
                let db = Database::connect(&config.database_url).await?;
                users::set_role(&db, username, ROLE_ADMIN).await?;
                println!("{username} is now an administrator");
                Ok(())
            }
            None => {
                error!("Usage: jinet promote <username>");
                std::process::exit(2);
            }
        },
        Some(other) => {
            error!("Unknown command {other:?}; expected `serve` or `promote <username>`");
            std::process::exit(2);
        }
    }
}
