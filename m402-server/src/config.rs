//! Server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8000
//! verify_timeout_secs = 10
//! result_cache_secs = 600
//!
//! [ledger]
//! url = "$LEDGER_URL"
//! timeout_secs = 5
//!
//! [prices."place-pizza-order"]
//! amount = 15000000
//! asset = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"
//! currency = "USDC"
//! recipient = "$MERCHANT_WALLET"
//! network = "solana-devnet"
//! description = "Place a pizza order"
//! ```
//!
//! Tools without a `[prices]` entry are free. Without a `[ledger]` table the
//! server falls back to a development verifier that trusts declared amounts.
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - Any variable referenced by `$VAR` in the config file

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use m402::Price;
use m402::tool::Asset;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Errors raised while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML or does not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// The variable reference pattern failed to compile.
    #[error("invalid variable pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `8000`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on a single ledger verification (default: `10`).
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,

    /// How long a paid result is replayed for duplicate deliveries
    /// (default: `600`).
    #[serde(default = "default_result_cache_secs")]
    pub result_cache_secs: u64,

    /// Remote ledger query service.
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,

    /// Tool prices keyed by tool name.
    #[serde(default)]
    pub prices: HashMap<String, PriceConfig>,
}

/// Remote ledger query service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Base URL; `POST {url}/verify` is called for every paid call.
    pub url: String,

    /// Per-request HTTP timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Price of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Amount in the smallest currency unit. `0` makes the tool free.
    pub amount: u64,
    /// Asset address (e.g. an SPL mint).
    pub asset: String,
    /// Currency symbol (default: `USDC`).
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Who receives the payment.
    pub recipient: String,
    /// Ledger network identifier.
    pub network: String,
    /// What the payment is for.
    #[serde(default)]
    pub description: String,
}

impl From<&PriceConfig> for Price {
    fn from(config: &PriceConfig) -> Self {
        Self {
            amount: config.amount,
            asset: Asset::new(config.asset.clone()),
            currency: config.currency.clone(),
            recipient: config.recipient.clone(),
            network: config.network.clone(),
            description: config.description.clone(),
        }
    }
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    8000
}

const fn default_verify_timeout_secs() -> u64 {
    10
}

const fn default_result_cache_secs() -> u64 {
    600
}

fn default_currency() -> String {
    "USDC".to_owned()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            verify_timeout_secs: default_verify_timeout_secs(),
            result_cache_secs: default_result_cache_secs(),
            ledger: None,
            prices: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults. After loading, all `$VAR` /
    /// `${VAR}` references are expanded from the process environment, and
    /// `HOST` / `PORT` env vars override the file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };

        let mut config = Self::from_toml(&content)?;

        if let Ok(host) = std::env::var("HOST")
            && let Ok(addr) = host.parse()
        {
            config.host = addr;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        Ok(config)
    }

    /// Parses a TOML document after expanding environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is invalid, or
    /// [`ConfigError::Pattern`] if variable expansion cannot run.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_env_vars(content)?)?)
    }

    /// Returns the verification timeout.
    #[must_use]
    pub const fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    /// Returns the paid-result cache window.
    #[must_use]
    pub const fn result_cache(&self) -> Duration {
        Duration::from_secs(self.result_cache_secs)
    }

    /// Returns the configured price of `tool`, if any.
    #[must_use]
    pub fn price(&self, tool: &str) -> Option<Price> {
        self.prices.get(tool).map(Price::from)
    }
}

/// Expands `$VAR` and `${VAR}` references from the process environment.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> Result<String, regex::Error> {
    let reference = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")?;
    let expanded = reference.replace_all(input, |caps: &Captures<'_>| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        std::env::var(name).unwrap_or_else(|_| caps[0].to_owned())
    });
    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.verify_timeout(), Duration::from_secs(10));
        assert_eq!(config.result_cache(), Duration::from_secs(600));
        assert!(config.ledger.is_none());
        assert!(config.prices.is_empty());
    }

    #[test]
    fn parses_prices_and_ledger() {
        let config = ServerConfig::from_toml(
            r#"
            port = 9000
            result_cache_secs = 60

            [ledger]
            url = "https://ledger.example"
            timeout_secs = 3

            [prices."place-pizza-order"]
            amount = 15000000
            asset = "mint"
            recipient = "R"
            network = "solana-devnet"
            description = "Place a pizza order"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.result_cache(), Duration::from_secs(60));
        let ledger = config.ledger.as_ref().unwrap();
        assert_eq!(ledger.timeout_secs, Some(3));

        let price = config.price("place-pizza-order").unwrap();
        assert_eq!(price.amount, 15_000_000);
        assert_eq!(price.currency, "USDC");
        assert_eq!(price.asset, Asset::new("mint"));
        assert!(config.price("pizza-carousel").is_none());
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = ServerConfig::from_toml("port = \"eighty\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load_from(Path::new("/nonexistent/m402.toml")).unwrap();
        assert!(config.prices.is_empty());
    }

    #[test]
    fn expands_known_variables() {
        let dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        assert_eq!(
            expand_env_vars("a=$CARGO_MANIFEST_DIR;").unwrap(),
            format!("a={dir};")
        );
        assert_eq!(
            expand_env_vars("a=${CARGO_MANIFEST_DIR}").unwrap(),
            format!("a={dir}")
        );
    }

    #[test]
    fn leaves_unknown_variables_alone() {
        assert_eq!(
            expand_env_vars("x = \"$M402_SURELY_UNSET_VAR\"").unwrap(),
            "x = \"$M402_SURELY_UNSET_VAR\""
        );
        assert_eq!(expand_env_vars("${M402_UNSET}").unwrap(), "${M402_UNSET}");
        assert_eq!(expand_env_vars("cost: $ 5").unwrap(), "cost: $ 5");
        assert_eq!(expand_env_vars("${unterminated").unwrap(), "${unterminated");
    }

    #[test]
    fn expansion_feeds_the_parsed_config() {
        let config = ServerConfig::from_toml(
            r#"
            [ledger]
            url = "${CARGO_MANIFEST_DIR}/ledger"
            "#,
        )
        .unwrap();
        let dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        assert_eq!(config.ledger.unwrap().url, format!("{dir}/ledger"));
    }
}
