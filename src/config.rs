//! Command line and environment configuration.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================
// CLI Definition
// ============================================================

#[derive(Debug, Parser)]
#[command(name = "pr-validator")]
#[command(about = "Pull request review pipeline orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Bucket holding execution → pull request records
    #[arg(long, env = "STORE_BUCKET")]
    pub store_bucket: String,

    /// AWS region of CodeCommit, CodePipeline and the bucket
    #[arg(long, env = "AWS_REGION", default_value = "us-west-2")]
    pub region: String,

    /// Override every AWS endpoint (local emulators); S3 switches to path-style
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Timeout for each outbound HTTP request
    #[arg(long, default_value = "30")]
    pub http_timeout_secs: u64,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve events over HTTP
    Serve {
        /// Listen address
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Shared secret for X-Signature-256 verification
        #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
        webhook_secret: Option<String>,
    },

    /// Handle a single event and print the status
    Handle {
        /// Envelope JSON file (stdin when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
