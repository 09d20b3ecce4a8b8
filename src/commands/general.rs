use poise::serenity_prelude as serenity;
use tracing::info;

use crate::services::gateway::EMBED_COLOR;
use crate::{Context, Error};

/// Show help for the bias game
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    info!("Help command called by {}", ctx.author().name);
    let prefix = &ctx.data().config.prefix;

    let embed = serenity::CreateEmbed::new()
        .title("Bias Game")
        .description("Pick your favourite idol, one round at a time. React with ⬅ or ➡ to choose.")
        .field(
            format!("{}biasgame [girl|boy|mixed] [size]", prefix),
            "Start a game, or continue the one you have running",
            false,
        )
        .field(
            format!("{}biasgame current", prefix),
            "Show your game in progress",
            false,
        )
        .field(
            format!("{}biasgame stats [server|global|@user] [rounds won|rounds lost] [group] [today]", prefix),
            "Show bias game stats",
            false,
        )
        .field(
            format!("{}biasgame suggest <girl|boy> \"<group>\" \"<idol>\" [url]", prefix),
            "Suggest a new idol picture (or attach the image)",
            false,
        )
        .field(
            format!("{}biasgame idols", prefix),
            "List the loaded groups",
            false,
        )
        .field(
            format!("{}ping", prefix),
            "Check if the bot is running",
            false,
        )
        .color(EMBED_COLOR);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}
