//! Resolve config plus CLI overrides into a board client and a console.

use std::sync::Arc;

use maintlink_api::{BoardClient, TransportConfig, WebSocketFeed};
use maintlink_config::Config;
use maintlink_core::{Console, ConsoleConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a board-bound command needs.
pub struct Session {
    pub config: Config,
    pub client: Arc<BoardClient>,
}

impl Session {
    /// Load config and apply `--api-url` / `--timeout-ms`.
    pub fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let config = resolve_config(global)?;
        let transport = TransportConfig {
            timeout: config.api.timeout(),
            connect_timeout: config.api.connect_timeout(),
        };
        let client = BoardClient::new(&config.api.base_url, &transport)?;
        tracing::debug!(base_url = %client.base_url(), "board client ready");
        Ok(Self {
            config,
            client: Arc::new(client),
        })
    }

    /// Console config, optionally without the event feed.
    pub fn console_config(&self, stream: bool) -> Result<ConsoleConfig, CliError> {
        let mut console = self.config.to_console_config()?;
        console.stream.enabled &= stream;
        Ok(console)
    }

    /// Build a console wired to this session's board client and feed.
    pub fn console(&self, console_config: ConsoleConfig) -> Result<Console, CliError> {
        let mut builder = Console::builder(console_config, self.client.clone())
            .mode_source(self.client.clone());
        if self.config.stream.enabled {
            builder = builder.event_source(Arc::new(self.feed()?));
        }
        Ok(builder.build())
    }

    fn feed(&self) -> Result<WebSocketFeed, CliError> {
        match self.config.api.stream_url()? {
            Some(url) => Ok(WebSocketFeed::new(url)),
            None => Ok(WebSocketFeed::from_api_base(self.client.base_url())?),
        }
    }
}

/// Config file + env, then CLI flags on top.
pub fn resolve_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut config = maintlink_config::load_config(global.config.as_deref())?;
    if let Some(url) = &global.api_url {
        config.api.base_url.clone_from(url);
    }
    if let Some(ms) = global.timeout_ms {
        config.api.timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}
