use async_trait::async_trait;
use coinledger_core::{Asset, AssetSource, SourceError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-CoinAPI-Key";
const ASSETS_PATH: &str = "/v1/assets";

/// Configuration for the CoinAPI REST catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinApiConfig {
    /// Base URL (e.g. "https://rest.coinapi.io").
    pub base_url: String,
    pub api_key: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CoinApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rest.coinapi.io".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Wire shape of one catalog entry.
#[derive(Debug, Deserialize)]
struct RawAsset {
    asset_id: String,
    #[serde(default)]
    name: Option<String>,
    /// 1 for crypto assets, 0 otherwise.
    #[serde(default)]
    type_is_crypto: u8,
    #[serde(default)]
    price_usd: Option<f64>,
}

impl From<RawAsset> for Asset {
    fn from(raw: RawAsset) -> Self {
        let price = raw
            .price_usd
            .and_then(|p| p.to_string().parse::<Decimal>().ok())
            .unwrap_or(Decimal::ZERO);
        Asset {
            name: raw.name.unwrap_or_else(|| raw.asset_id.clone()),
            id: raw.asset_id,
            is_crypto: raw.type_is_crypto == 1,
            price,
        }
    }
}

/// Fetches the asset catalog from CoinAPI over HTTPS.
pub struct CoinApiSource {
    client: reqwest::Client,
    config: CoinApiConfig,
}

impl CoinApiSource {
    pub fn new(config: CoinApiConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn assets_url(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), ASSETS_PATH)
    }
}

#[async_trait]
impl AssetSource for CoinApiSource {
    async fn fetch(&self) -> Result<Vec<Asset>, SourceError> {
        let url = self.assets_url();
        debug!(url = %url, "Fetching asset catalog");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        if let Some(err) = status_error(response.status().as_u16()) {
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        parse_assets(&body)
    }
}

/// Map a non-success status code to its error kind.
pub fn status_error(status: u16) -> Option<SourceError> {
    match status {
        200 => None,
        400 => Some(SourceError::BadRequest),
        401 => Some(SourceError::Unauthorized),
        403 => Some(SourceError::Forbidden),
        429 => Some(SourceError::TooManyRequests),
        550 => Some(SourceError::NoData),
        other => Some(SourceError::UnexpectedStatus(other)),
    }
}

/// Decode a catalog body. An empty catalog is `NoData`.
pub fn parse_assets(body: &str) -> Result<Vec<Asset>, SourceError> {
    let raw: Vec<RawAsset> =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    if raw.is_empty() {
        return Err(SourceError::NoData);
    }
    Ok(raw.into_iter().map(Asset::from).collect())
}
