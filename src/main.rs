use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::time::sleep;

use teleshelf::cli::{Cli, Commands};
use teleshelf::core::audit::LogAudit;
use teleshelf::core::{config, init_logger, log_gate_configuration};
use teleshelf::pipeline::gate::GateChain;
use teleshelf::pipeline::router::Router;
use teleshelf::pipeline::state::{RedisStateStore, StateStore, TieredStateStore};
use teleshelf::storage::db::{self, ALL_CAPABILITIES};
use teleshelf::storage::{create_pool, get_connection};
use teleshelf::telegram::{
    build_router, create_bot, schema, setup_bot_commands, HandlerDeps, TelegramOracle, TelegramResponder,
};

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to the appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Catch panics escaping spawned tasks so they are logged, not silent
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    init_logger(&config::LOG_FILE_PATH)?;

    // Load environment variables from .env if present
    let _ = dotenv();

    match cli.command {
        Some(Commands::GrantAdmin {
            telegram_id,
            capabilities,
        }) => run_grant_admin(telegram_id, capabilities),
        Some(Commands::Run) | None => run_bot().await,
    }
}

/// Promote a user to admin from the command line (bootstraps the first admin).
fn run_grant_admin(telegram_id: i64, capabilities: Option<String>) -> Result<()> {
    let pool = create_pool(&config::DATABASE_PATH)?;
    let conn = get_connection(&pool)?;

    let granted = match capabilities {
        Some(raw) => {
            let mut parsed = Vec::new();
            for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let capability = serde_json::from_value(serde_json::Value::String(name.to_string()))
                    .map_err(|_| anyhow::anyhow!("unknown capability: {}", name))?;
                parsed.push(capability);
            }
            parsed
        }
        None => ALL_CAPABILITIES.to_vec(),
    };

    // The user may not have messaged the bot yet
    db::create_user(&conn, telegram_id, None, None, &config::DEFAULT_LANG)?;
    db::set_admin(&conn, telegram_id, true, &granted)?;

    log::info!("granted admin to {} with capabilities {:?}", telegram_id, granted);
    Ok(())
}

/// Run the bot: build the pipeline, then poll with reconnect-on-panic.
async fn run_bot() -> Result<()> {
    log_gate_configuration();

    let db_pool = Arc::new(create_pool(&config::DATABASE_PATH)?);
    let bot = create_bot()?;

    let me = bot.get_me().await?;
    log::info!("Bot authorized as @{}", me.username());

    if let Err(err) = setup_bot_commands(&bot).await {
        log::warn!("Failed to publish command menu: {}", err);
    }

    let audit = Arc::new(LogAudit);

    // Conversation states: shared Redis tier when configured, local tier
    // otherwise. A dead Redis at startup is a degraded start, not a crash.
    let tiered = match config::REDIS_URL.as_deref() {
        Some(url) => match RedisStateStore::connect(url).await {
            Ok(shared) => TieredStateStore::new(Some(Box::new(shared) as Box<dyn StateStore>)),
            Err(err) => {
                log::error!("Shared state store unavailable, running local-only: {}", err);
                TieredStateStore::new(None)
            }
        },
        None => TieredStateStore::new(None),
    };
    let states: Arc<dyn StateStore> = Arc::new(tiered.with_audit(audit.clone()));

    let oracle = Arc::new(TelegramOracle::new(bot.clone()));
    let responder = Arc::new(TelegramResponder::new(bot.clone()));
    let gate = GateChain::standard(oracle.clone(), *config::SUPERUSER_ID);

    let deps = HandlerDeps {
        bot: bot.clone(),
        states: Arc::clone(&states),
        oracle,
        responder: responder.clone(),
        search_cache: Arc::new(teleshelf::telegram::cache::SearchCache::new(
            std::time::Duration::from_secs(config::search::CACHE_TTL_SECS),
        )),
    };

    let router: Arc<Router> = Arc::new(build_router(deps, Arc::clone(&db_pool), gate, responder, audit));
    let handler = schema(router);

    log::info!("Starting bot in long polling mode");

    // Run the dispatcher with retry logic; panics inside the dispatcher are
    // isolated in a task so the process can reconnect.
    let mut retry_count: u32 = 0;
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        let handle = tokio::spawn(async move {
            use teloxide::prelude::*;
            use teloxide::update_listeners::Polling;

            let listener = Polling::builder(bot_clone.clone()).drop_pending_updates().build();

            Dispatcher::builder(bot_clone, handler_clone)
                .dependencies(DependencyMap::new())
                .enable_ctrlc_handler()
                .build()
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    log::error!("Dispatcher panicked: {}", join_err);
                    if retry_count < config::retry::MAX_DISPATCHER_RETRIES {
                        retry_count += 1;
                        log::info!(
                            "Retrying dispatcher connection (attempt {}/{})...",
                            retry_count,
                            config::retry::MAX_DISPATCHER_RETRIES
                        );
                        exponential_backoff(retry_count).await;
                    } else {
                        log::error!("Max retries reached after panic. Exiting...");
                        break;
                    }
                } else {
                    log::warn!("Dispatcher task was cancelled: {}", join_err);
                    break;
                }
            }
        }

        if retry_count > 0 {
            sleep(config::retry::dispatcher_delay()).await;
        }
    }

    Ok(())
}

/// Sleeps for base^attempt seconds, capped at one minute.
async fn exponential_backoff(attempt: u32) {
    let secs = config::retry::EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt).min(60);
    sleep(std::time::Duration::from_secs(secs)).await;
}
