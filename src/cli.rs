use clap::{Parser, Subcommand};

/// API Tackle — token-metered REST API scaffold
#[derive(Parser)]
#[command(name = "tackle", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (defaults to TACKLE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage API auth tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Manage admin auth tokens
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Add or update an auth token
    Add {
        #[arg(long)]
        token: String,
        /// Description; omit to leave an existing description unchanged
        #[arg(long)]
        desc: Option<String>,
        /// Call count limit; omit for unlimited
        #[arg(long)]
        limit: Option<i64>,
        /// Treat --limit as relative to the current call count
        #[arg(long)]
        relative: bool,
    },
    /// Remove an auth token and its usage breakdown
    Remove {
        #[arg(long)]
        token: String,
    },
    /// Show a token's description, counts and per-endpoint breakdown
    Show {
        #[arg(long)]
        token: String,
    },
    /// List all auth tokens
    List,
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Add or update an admin token
    Add {
        #[arg(long)]
        token: String,
        #[arg(long, default_value = "Admin token.")]
        desc: String,
    },
    /// Remove an admin token
    Remove {
        #[arg(long)]
        token: String,
    },
    /// Check whether an admin token is valid
    Check {
        #[arg(long)]
        token: String,
    },
    /// List all admin tokens
    List,
}
