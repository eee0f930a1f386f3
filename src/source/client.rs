use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::Locale;
use crate::config::SourceConfig;

/// Anything that can hand back the raw XML for an item id
pub trait ItemSource: Sync {
    fn fetch(&self, id: i64, locale: Option<Locale>) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network failure for {url}: {message}")]
    Network { url: String, message: String },
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },
}

/// Blocking client for the Wowhead XML item feed
pub struct WowheadClient {
    client: Client,
    config: SourceConfig,
}

impl WowheadClient {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn item_url(&self, id: i64, locale: Option<Locale>) -> String {
        item_url(&self.config, id, locale)
    }
}

impl ItemSource for WowheadClient {
    fn fetch(&self, id: i64, locale: Option<Locale>) -> Result<Vec<u8>, FetchError> {
        let url = self.item_url(id, locale);

        let response = self.client.get(&url).send().map_err(|e| FetchError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|e| FetchError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;

        Ok(body.to_vec())
    }
}

/// Build the feed URL for an item, on the locale's host when one is given
pub fn item_url(config: &SourceConfig, id: i64, locale: Option<Locale>) -> String {
    let host = match locale {
        Some(locale) => format!("{}.{}", locale.subdomain(), config.host),
        None => config.host.clone(),
    };
    let path = config.catalog_path.trim_matches('/');

    if path.is_empty() {
        format!("{}://{}/item={}?xml", config.scheme, host, id)
    } else {
        format!("{}://{}/{}/item={}?xml", config.scheme, host, path, id)
    }
}
