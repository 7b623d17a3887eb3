use clap::{Parser, Subcommand};

/// SetLog — track the services, credentials, and env vars behind a project
#[derive(Parser)]
#[command(name = "setlog", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (overrides SETLOG_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user and print a session token
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        display_name: Option<String>,
    },
}
