//! Service configuration from flags and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::Level;

use gitter_runner_core::DispatcherConfig;
use gitter_runner_github::DEFAULT_API_URL;

#[derive(Parser, Debug, Clone)]
#[command(name = "gitter-runnerd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify multi-gitter pull requests and run them once merged", long_about = None)]
pub struct Config {
    /// GitHub App identifier
    #[arg(long, env = "APP_ID")]
    pub app_id: String,

    /// GitHub App private key (PEM; literal `\n` sequences are expanded)
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Secret used to sign webhook deliveries
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: String,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub github_api_url: String,

    /// multi-gitter executable
    #[arg(long, env = "MULTI_GITTER_BIN", default_value = "multi-gitter")]
    pub multi_gitter_bin: PathBuf,

    /// Parent directory for per-phase staging directories (default: system temp dir)
    #[arg(long, env = "STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Kill multi-gitter after this many seconds (0, the default, never kills)
    #[arg(long, env = "RUN_TIMEOUT_SECS", default_value_t = 0)]
    pub run_timeout_secs: u64,

    /// Drop repeated delivery ids seen within this many seconds (0 disables)
    #[arg(long, env = "DELIVERY_TTL_SECS", default_value_t = 600)]
    pub delivery_ttl_secs: u64,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }

    pub fn delivery_ttl(&self) -> Duration {
        Duration::from_secs(self.delivery_ttl_secs)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let mut config = DispatcherConfig::default();
        if let Some(dir) = &self.staging_dir {
            config.staging_root = dir.clone();
        }
        config
    }
}
