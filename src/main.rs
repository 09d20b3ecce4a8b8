use anyhow::{Context as _, Result};
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Discord bot running the K-pop bias game
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the JSON config file
    #[arg(long, short = 'c', default_value = "config.json")]
    config: String,

    /// Force re-sync of slash commands (use when commands aren't showing up)
    #[arg(long, short = 's')]
    sync_commands: bool,

    /// Register slash commands in this guild only (faster for testing)
    #[arg(long)]
    guild_id: Option<u64>,

    /// Log at debug level
    #[arg(long, short = 'v')]
    verbose: bool,
}

mod commands;
mod compose;
mod config;
mod error;
mod events;
mod game;
mod i18n;
mod managers;
mod models;
mod plugins;
mod services;
mod state;
mod stats;

#[cfg(test)]
pub mod testing;

use commands::help;
use config::BotConfig;
use i18n::Translations;
use managers::{
    create_shared_asset_manager, create_shared_game_manager, create_shared_stats_manager,
    create_shared_suggestion_manager, load_overlays,
};
use plugins::{BiasGamePlugin, PluginRegistry, PongPlugin, SharedPluginRegistry};
use services::{
    GoogleDriveStore, HttpImageSource, SerenityGateway, SharedGateway, SharedImageSource,
    SharedObjectStore,
};
use state::{JsonDocumentStore, SharedDocumentStore};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared application state
pub struct Data {
    pub config: Arc<BotConfig>,
    pub plugins: SharedPluginRegistry,
    pub bot_user_id: serenity::UserId,
}

async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = events::handle_message(new_message, data).await {
                error!("Failed to handle message: {}", e);
            }
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            if let Err(e) = events::handle_reaction(add_reaction, data).await {
                error!("Failed to handle reaction: {}", e);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Log the application id encoded in the first token segment
fn log_bot_id(token: &str) {
    use base64::Engine;

    let Some(bot_id_b64) = token.split('.').next() else {
        return;
    };
    let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(bot_id_b64)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(bot_id_b64));
    if let Ok(Ok(id_str)) = decoded.map(String::from_utf8) {
        info!(
            "Bot ID: {} (configure intents at https://discord.com/developers/applications/{}/bot)",
            id_str, id_str
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = if args.verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(level)
        .init();

    let token = std::env::var("DISCORD_TOKEN").context("Missing DISCORD_TOKEN environment variable")?;
    log_bot_id(&token);

    info!("Loading configuration from {}...", args.config);
    let config = Arc::new(BotConfig::load_from_file(&args.config)?);
    let translations = Arc::new(Translations::load_from_file(&config.i18n_path)?);

    tokio::fs::create_dir_all(&config.state_path)
        .await
        .with_context(|| format!("Could not create state directory {}", config.state_path))?;

    let http = Arc::new(serenity::Http::new(&token));
    let gateway: SharedGateway = Arc::new(SerenityGateway::new(http));

    let drive = GoogleDriveStore::from_env(config.fetch_timeout())
        .context("Missing DRIVE_ACCESS_TOKEN environment variable")??;
    let store: SharedObjectStore = Arc::new(drive);
    let images: SharedImageSource = Arc::new(HttpImageSource::new(config.fetch_timeout())?);

    info!("Loading overlay images...");
    let overlays = load_overlays(
        store.as_ref(),
        images.as_ref(),
        &config.folders.misc,
        config.bracket_layout.clone(),
        config.image_height,
        config.fetch_timeout(),
    )
    .await?;

    let assets = create_shared_asset_manager(&config, store, images, Arc::new(overlays));
    info!("Loading idol images...");
    let report = assets.refresh().await?;
    if report.idols == 0 {
        anyhow::bail!("No idol images could be loaded");
    }

    info!("Loading documents from {}...", config.documents_path());
    let documents: SharedDocumentStore =
        Arc::new(JsonDocumentStore::load(&config.documents_path()).await?);

    let games =
        create_shared_game_manager(&config, assets.clone(), gateway.clone(), documents.clone());
    let stats = create_shared_stats_manager(documents.clone());

    let suggestions = match config.suggestion_channel_id {
        Some(channel) => {
            let suggestions = create_shared_suggestion_manager(
                &config,
                serenity::ChannelId::new(channel),
                assets.clone(),
                gateway.clone(),
                documents.clone(),
                translations.clone(),
            );
            if let Err(e) = suggestions.load_pending().await {
                warn!("Could not show pending suggestions: {}", e);
            }
            Some(suggestions)
        }
        None => {
            info!("No suggestion channel configured, suggestions are disabled");
            None
        }
    };

    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(BiasGamePlugin::new(
        config.clone(),
        games,
        assets,
        suggestions,
        stats,
        gateway.clone(),
        translations,
    )));
    registry.register(Arc::new(PongPlugin::new(gateway)));
    let plugins: SharedPluginRegistry = Arc::new(registry);
    info!("Registered {} plugins", plugins.len());

    let sync_commands = args.sync_commands;
    let target_guild_id = args.guild_id;
    let setup_config = config.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![help()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {}) in {}",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id,
                        ctx.guild_id().map(|g| g.to_string()).unwrap_or_else(|| "DM".to_string())
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx.say(format!("An error occurred: {}", error)).await;
                        }
                        poise::FrameworkError::ArgumentParse { error, input, ctx, .. } => {
                            error!("Argument parse error in '{}': {} (input: {:?})", ctx.command().qualified_name, error, input);
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let config = setup_config.clone();
            let plugins = plugins.clone();

            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                let guilds_to_register: Vec<serenity::GuildId> = match target_guild_id {
                    Some(gid) => vec![serenity::GuildId::new(gid)],
                    None if sync_commands => ready.guilds.iter().map(|g| g.id).collect(),
                    None => Vec::new(),
                };

                if guilds_to_register.is_empty() {
                    info!("Registering commands globally...");
                    if let Err(e) = poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    ).await {
                        error!("Failed to register commands globally: {}", e);
                    } else {
                        info!("Registered {} commands globally (may take up to 1 hour to propagate)",
                              framework.options().commands.len());
                    }
                }
                for guild_id in &guilds_to_register {
                    info!("Registering commands to guild: {}", guild_id);
                    if let Err(e) = poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        *guild_id,
                    ).await {
                        error!("Failed to register commands for guild {}: {}", guild_id, e);
                    }
                }

                Ok(Data {
                    config,
                    plugins,
                    bot_user_id: ready.user.id,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot with prefix '{}'...", config.prefix);
    if let Err(e) = client.start().await {
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!("Failed to start bot: {}", e);
            error!("Enable the MESSAGE_CONTENT intent at https://discord.com/developers/applications -> Your App -> Bot -> Privileged Gateway Intents");
            return Err(anyhow::anyhow!(
                "Disallowed gateway intents. Enable MESSAGE_CONTENT in the Discord Developer Portal"
            ));
        }
        return Err(e.into());
    }
    warn!("Bot ended.");

    Ok(())
}
