//! Runtime configuration loaded from `config.toml`.
//!
//! Every field is optional. When no config file is present the built-in
//! defaults are used: the mev-commit indexing endpoint, no token, no
//! timeout and the default contract addresses.
//!
//! ```toml
//! url = "https://mev-commit.hypersync.xyz"
//! http_timeout_secs = 60
//! data_dir = "data"
//!
//! [contracts]
//! oracle = "0x6856Eb630C79D491886E104D328834643f5a9Ca6"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result, bail};
use mev_commit::{Contract, EventRegistry};
use serde::Deserialize;
use url::Url;

use crate::client::ClientBuilder;
use crate::endpoints;

/// Environment variable read when the file has no `bearer_token`.
pub const BEARER_TOKEN_ENV: &str = "HYPERSYNC_BEARER_TOKEN";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Indexing service base URL.
    #[serde(default)]
    pub url: Option<Url>,
    /// Bearer token for the indexing service.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Per-request HTTP timeout in seconds.
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    /// Default output directory for persisted queries.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Contract address overrides, keyed by contract name
    /// (e.g. `bidder_registry`).
    #[serde(default)]
    pub contracts: HashMap<String, Address>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`Config::default`] if the file does not exist,
    /// allowing the binary to work without any config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Service URL, falling back to the default mev-commit endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in endpoint URL does not parse.
    pub fn url(&self) -> Result<Url> {
        match &self.url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(endpoints::MEV_COMMIT.url).context("parsing default endpoint"),
        }
    }

    /// Bearer token from the file, else from [`BEARER_TOKEN_ENV`].
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        self.bearer_token
            .clone()
            .or_else(|| std::env::var(BEARER_TOKEN_ENV).ok())
            .filter(|token| !token.is_empty())
    }

    /// Configured HTTP timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    /// Output directory for persisted queries, `data` by default.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Contract overrides keyed by [`Contract`].
    ///
    /// # Errors
    ///
    /// Returns an error if a key does not name a known contract.
    pub fn contract_overrides(&self) -> Result<HashMap<Contract, Address>> {
        let mut overrides = HashMap::with_capacity(self.contracts.len());
        for (key, address) in &self.contracts {
            let Some(contract) = Contract::from_key(key) else {
                let known: Vec<_> = Contract::ALL.iter().map(|c| c.key()).collect();
                bail!("unknown contract `{key}` in [contracts], expected one of {known:?}");
            };
            overrides.insert(contract, *address);
        }
        Ok(overrides)
    }

    /// Event registry with this configuration's contract overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown contract keys or malformed definitions.
    pub fn registry(&self) -> Result<EventRegistry> {
        let overrides = self.contract_overrides()?;
        for (contract, address) in &overrides {
            tracing::info!(contract = contract.key(), %address, "contract address overridden");
        }
        EventRegistry::mev_commit_with(&overrides).context("building event registry")
    }

    /// A [`ClientBuilder`] carrying every connection setting.
    ///
    /// `url` replaces the configured URL when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or the registry cannot be built.
    pub fn client_builder(&self, url: Option<Url>) -> Result<ClientBuilder> {
        let url = match url {
            Some(url) => url,
            None => self.url()?,
        };
        let mut builder = ClientBuilder::new(url).registry(self.registry()?);
        if let Some(token) = self.bearer_token() {
            builder = builder.bearer_token(token);
        }
        if let Some(timeout) = self.http_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }
}
