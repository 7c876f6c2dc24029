use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iam::config::{self, Config, StoreBackend};
use iam::middleware::audit::{PgAuditSink, TracingAuditSink};
use iam::middleware::rbac::{Caller, RequestContext};
use iam::models::account::{Account, AccountStatus, Role};
use iam::models::capability::CapabilitySet;
use iam::models::token::Lifespan;
use iam::store::memory::{InMemoryAccounts, InMemoryTokenStore};
use iam::store::postgres::PgStore;
use iam::store::{bounded, TokenQuery};
use iam::tokens::CreateTokenRequest;
use iam::{api, cli, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(&cfg)?;

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Migrate) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Some(cli::Commands::Token { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            let audit = Arc::new(PgAuditSink::new(db.pool().clone()));
            let db = Arc::new(db);
            let state = AppState::new(cfg, db.clone(), db, audit);
            handle_token_command(command, &state).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(cfg: &Config) -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "iam-tokens"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let (text_layer, json_layer) = if cfg.log_format.eq_ignore_ascii_case("json") {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "iam=debug,tower_http=debug".into()),
        ))
        .with(text_layer)
        .with(json_layer)
        .with(telemetry_layer)
        .init();

    Ok(())
}

async fn build_state(cfg: Config) -> anyhow::Result<Arc<AppState>> {
    match cfg.store {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let db = PgStore::connect(&cfg.database_url).await?;

            tracing::info!("Running migrations...");
            db.migrate().await?;

            let audit = Arc::new(PgAuditSink::new(db.pool().clone()));
            let db = Arc::new(db);
            Ok(Arc::new(AppState::new(cfg, db.clone(), db, audit)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory token store; tokens are lost on restart");
            let accounts = Arc::new(InMemoryAccounts::new());
            accounts.upsert(bootstrap_admin());
            let state = Arc::new(AppState::new(
                cfg,
                Arc::new(InMemoryTokenStore::new()),
                accounts,
                Arc::new(TracingAuditSink),
            ));

            let token = state
                .issuer
                .issue(
                    &system_context(),
                    CreateTokenRequest {
                        account_id: BOOTSTRAP_ADMIN_ID.into(),
                        expires_in: Some(-1),
                        purpose: Some("bootstrap".into()),
                        inquirer: Some("iam".into()),
                        description: Some("in-memory bootstrap admin".into()),
                        custom_permissions: None,
                        new: true,
                    },
                )
                .await?;
            println!(
                "Bootstrap admin token:\n  Use:   Authorization: Bearer {}",
                token.token
            );
            Ok(state)
        }
    }
}

const BOOTSTRAP_ADMIN_ID: &str = "admin";

fn bootstrap_admin() -> Account {
    Account {
        id: BOOTSTRAP_ADMIN_ID.into(),
        username: "admin".into(),
        firstname: None,
        lastname: None,
        role: Role::Admin,
        status: AccountStatus::Active,
        tenant: None,
        permissions: CapabilitySet::new(),
    }
}

fn system_context() -> RequestContext {
    RequestContext::new(Caller::system(), None)
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let cleanup_every = Duration::from_secs(cfg.cleanup_interval_secs.max(1));
    let retention = cfg.retention();

    let state = build_state(cfg).await?;
    let app = api::app(state.clone());

    jobs::cleanup::spawn(state.tokens.clone(), cleanup_every, retention);
    tracing::info!(
        every_secs = cleanup_every.as_secs(),
        "Background token cleanup job started"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("IAM token service listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_token_command(cmd: cli::TokenCommands, state: &AppState) -> anyhow::Result<()> {
    let ctx = system_context();

    match cmd {
        cli::TokenCommands::Create {
            account_id,
            inquirer,
            purpose,
            expires_in,
            description,
            permissions,
            new,
        } => {
            let req = CreateTokenRequest {
                account_id,
                expires_in,
                purpose,
                inquirer: Some(inquirer),
                description,
                custom_permissions: permissions,
                new,
            };
            let token = state.issuer.issue(&ctx, req).await?;
            let expires = match token.lifespan {
                Lifespan::Infinite => "never".to_string(),
                Lifespan::Seconds(_) => token
                    .expires_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            };
            println!(
                "Token issued:\n  ID:      {}\n  Expires: {}\n  Use:     Authorization: Bearer {}",
                token.id, expires, token.token
            );
        }
        cli::TokenCommands::List { account_id } => {
            let query = TokenQuery {
                token: None,
                account_id,
            };
            let tokens = bounded(state.config.store_timeout(), state.tokens.find(&query)).await?;
            if tokens.is_empty() {
                println!("No tokens found.");
            } else {
                println!(
                    "{:<38} {:<20} {:<16} {:<12} {:<26}",
                    "ID", "ACCOUNT", "PURPOSE", "INQUIRER", "EXPIRES"
                );
                for t in tokens {
                    let expires = t
                        .expires_at
                        .map(|e| e.to_rfc3339())
                        .unwrap_or_else(|| "never".into());
                    println!(
                        "{:<38} {:<20} {:<16} {:<12} {:<26}",
                        t.id, t.account_id, t.purpose, t.inquirer, expires
                    );
                }
            }
        }
        cli::TokenCommands::Revoke { id } => {
            let id = uuid::Uuid::parse_str(&id).context("Invalid token ID")?;
            state.revocation.revoke(&ctx, id).await?;
            println!("Token revoked.");
        }
        cli::TokenCommands::RevokeAccount { account_id } => {
            let removed = state.revocation.revoke_account(&ctx, &account_id).await?;
            println!("Revoked {} token(s) for account {}.", removed, account_id);
        }
        cli::TokenCommands::Purge => {
            let purged = bounded(
                state.config.store_timeout(),
                jobs::cleanup::run_once(state.tokens.as_ref(), state.config.retention()),
            )
            .await?;
            println!("Purged {} expired token(s).", purged);
        }
    }
    Ok(())
}
