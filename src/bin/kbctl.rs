use std::collections::HashSet;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use kb_access::authz::AccessEngine;
use kb_access::config::EngineConfig;
use kb_access::db;
use kb_access::models::authorization::{Pagination, Role, Scope};

#[derive(Parser, Debug)]
#[command(author, version, about = "kb-access operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Organization id
    #[arg(long)]
    org: Uuid,
    /// Wiki id, for wiki and document scopes
    #[arg(long)]
    wiki: Option<Uuid>,
    /// Document id, requires --wiki
    #[arg(long)]
    doc: Option<Uuid>,
}

impl ScopeArgs {
    fn scope(&self) -> anyhow::Result<Scope> {
        Ok(Scope::try_new(self.org, self.wiki, self.doc)?)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Grant a role at a scope and everything beneath it, bypassing delegation rules
    Grant {
        #[arg(long)]
        user: Uuid,
        /// creator, admin, member or noAccess
        #[arg(long)]
        role: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Remove a user's role at a scope and everything beneath it
    Revoke {
        #[arg(long)]
        user: Uuid,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Print the role a user holds at exactly this scope
    Show {
        #[arg(long)]
        user: Uuid,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// List the wikis and documents a user can open inside an organization
    Viewable {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        org: Uuid,
    },
    /// List members of an organization or wiki
    Members {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            db::migrate(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            print_status(&pool).await?;
        }
        Commands::Grant { user, role, scope } => {
            let engine = engine().await?;
            let role: Role = role.parse()?;
            let record = engine.grant(user, &scope.scope()?, role).await?;
            println!("{} is now {} at {}", record.user_id, record.role, record.scope());
        }
        Commands::Revoke { user, scope } => {
            let engine = engine().await?;
            let scope = scope.scope()?;
            let removed = engine.revoke(user, &scope).await?;
            println!("removed {} record(s) for {} under {}", removed, user, scope);
        }
        Commands::Show { user, scope } => {
            let engine = engine().await?;
            let scope = scope.scope()?;
            match engine.get_role(user, &scope).await? {
                Some(role) => println!("{}", role),
                None => println!("no record for {} at {}", user, scope),
            }
        }
        Commands::Viewable { user, org } => {
            let engine = engine().await?;
            let scopes = engine.list_viewable_scopes(user, org).await?;
            for wiki in &scopes.wiki_ids {
                println!("wiki     {}", wiki);
            }
            for document in &scopes.document_ids {
                println!("document {}", document);
            }
            println!("{} wiki(s), {} document(s)", scopes.wiki_ids.len(), scopes.document_ids.len());
        }
        Commands::Members { scope, page, page_size } => {
            let engine = engine().await?;
            let pagination = match (page, page_size) {
                (None, None) => None,
                (page, page_size) => Some(Pagination::new(page.unwrap_or(1), page_size.unwrap_or(12))),
            };
            let members = engine.list_members(&scope.scope()?, pagination).await?;

            println!("{:<38} {:<10} {}", "User", "Role", "Name");
            for member in &members.records {
                let name = member.user.as_ref().map(|user| user.name.as_str()).unwrap_or("-");
                println!("{:<38} {:<10} {}", member.auth.user_id, member.auth.role, name);
            }
            println!("{} of {} member(s)", members.records.len(), members.total);
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn engine() -> anyhow::Result<AccessEngine> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = db::init(&database_url).await?;
    Ok(AccessEngine::new(pool, EngineConfig::from_env()?))
}

async fn print_status(pool: &SqlitePool) -> anyhow::Result<()> {
    let migrator = sqlx::migrate!();

    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    let applied_versions: HashSet<i64> = if has_table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}
