// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use revkeep::auth::permissions::PermissionSet;
use revkeep::auth::hash_password;
use revkeep::db;
use revkeep::server::RevkeepConfig;
use rusqlite::Connection;
use tracing::info;

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = RevkeepConfig::load(&cli.config)
        .with_context(|| format!("loading config from {:?}", cli.config))?;

    match cli.command {
        Commands::Serve => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(revkeep::server::run_server(config))?;
            Ok(())
        }
        Commands::Migrate => {
            info!(db_path = %config.db_path, "applying pending migrations");
            let conn = Connection::open(config.db_path_buf())?;
            db::schema::migrate(&conn)?;
            println!("migrations applied, schema at version {}", db::schema::get_schema_version(&conn)?);
            Ok(())
        }
        Commands::CreateAdmin { username } => {
            use std::io::Write;
            print!("password: ");
            std::io::stdout().flush()?;
            let mut password = String::new();
            std::io::stdin().read_line(&mut password)?;
            let hash = hash_password(password.trim_end_matches(['\n', '\r']))?;
            let conn = Connection::open(config.db_path_buf())?;
            db::schema::migrate(&conn)?;
            let user = db::create_user(&conn, &username, &hash, &PermissionSet::admin())?;
            println!("created admin user '{}'", user.username);
            Ok(())
        }
    }
}
