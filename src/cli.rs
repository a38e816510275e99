use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::task::TaskTracker;

use crate::config::{Config, PartialConfig};
use crate::providers::gitlab::StatusPolicy;
use crate::server::{self, AppState, FailurePolicy};
use crate::sink;

#[derive(Parser)]
#[command(name = "buildevents")]
#[command(
    author,
    version,
    about = "buildevents creates events for your CI builds",
    long_about = "Receives GitLab pipeline and job webhooks and sends them to Honeycomb as trace spans, one trace per pipeline."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The Honeycomb authentication token
    #[arg(short = 'k', long = "apikey", global = true, env = "BUILDEVENT_APIKEY", hide_env_values = true)]
    api_key: Option<String>,

    /// The name of the Honeycomb dataset to which to send these events [default: buildevents]
    #[arg(short, long, global = true, env = "BUILDEVENT_DATASET")]
    dataset: Option<String>,

    /// The hostname for the Honeycomb API server [default: https://api.honeycomb.io]
    #[arg(short = 'a', long = "apihost", global = true, env = "BUILDEVENT_APIHOST")]
    api_host: Option<String>,

    /// Text file of key=val pairs (logfmt style) added to every event
    #[arg(short = 'f', long = "filename", global = true, env = "BUILDEVENT_FILE")]
    fields_file: Option<PathBuf>,

    /// CI provider label on every event [default: GitLab-CI]
    #[arg(short = 'p', long = "provider", global = true, env = "BUILDEVENT_CIPROVIDER")]
    ci_provider: Option<String>,

    /// Config file (TOML, JSON or YAML)
    #[arg(short, long, global = true, env = "BUILDEVENT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for GitLab webhooks on /api/message
    Serve {
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,

        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
        bind: IpAddr,

        /// Which statuses produce a span [default: terminal-only]
        #[arg(long, value_enum)]
        status_policy: Option<StatusPolicy>,

        /// HTTP status for webhooks that cannot be turned into a span [default: always-ok]
        #[arg(long, value_enum)]
        failure_responses: Option<FailurePolicy>,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let Cli {
            command,
            api_key,
            dataset,
            api_host,
            fields_file,
            ci_provider,
            config,
        } = self;

        let file = PartialConfig::load(config.as_deref())?;

        match command {
            Commands::Serve {
                port,
                bind,
                status_policy,
                failure_responses,
            } => {
                let overrides = PartialConfig {
                    api_key,
                    dataset,
                    api_host,
                    fields_file,
                    ci_provider,
                    status_policy,
                    failure_policy: failure_responses,
                };
                let config = Config::resolve(overrides.or(file))?;
                info!(
                    "Dataset {}, status policy {:?}, failure responses {:?}",
                    config.dataset, config.status_policy, config.failure_policy
                );

                let deliveries = TaskTracker::new();
                let sink = sink::from_config(&config, &deliveries)?;
                let state = AppState {
                    config: Arc::new(config),
                    sink,
                };

                let served = server::serve(SocketAddr::new(bind, port), state).await;
                sink::drain(&deliveries).await;
                served
            }
        }
    }
}
