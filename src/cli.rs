use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "teleshelf")]
#[command(author, version, about = "Telegram content-shelf bot with a channel-membership gate", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot (long polling)
    Run,

    /// Grant the admin role with capabilities to a user
    GrantAdmin {
        /// Telegram id of the user to promote
        telegram_id: i64,

        /// Comma-separated capability list (default: all).
        /// Known: upload, delete, stats, users, broadcast, settings, channels
        #[arg(short, long)]
        capabilities: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
