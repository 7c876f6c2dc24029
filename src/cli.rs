use clap::{Parser, Subcommand};

/// IAM token service: issues, introspects, refreshes and revokes
/// account access tokens.
#[derive(Parser)]
#[command(name = "iam", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (overrides IAM_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Manage tokens directly against the store
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a token for an account
    Create {
        #[arg(long)]
        account_id: String,
        /// Client identifier recorded on the token
        #[arg(long, default_value = "cli")]
        inquirer: String,
        #[arg(long)]
        purpose: Option<String>,
        /// Lifespan in seconds, or -1 for a persistent token
        #[arg(long, allow_hyphen_values = true)]
        expires_in: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        /// Extra capabilities granted on top of the account's own
        #[arg(long, value_delimiter = ',')]
        permissions: Option<Vec<String>>,
        /// Always mint a fresh token instead of reusing a live one
        #[arg(long)]
        new: bool,
    },
    /// List live tokens
    List {
        #[arg(long)]
        account_id: Option<String>,
    },
    /// Revoke a token by id
    Revoke { id: String },
    /// Revoke every token of an account
    RevokeAccount { account_id: String },
    /// Purge tokens expired longer than the retention window
    Purge,
}
