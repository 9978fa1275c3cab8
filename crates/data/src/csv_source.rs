use async_trait::async_trait;
use coinledger_core::{Asset, AssetSource, SourceError};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A catalog read from a local CSV file on every fetch.
///
/// Expected columns (case-insensitive, flexible ordering):
/// `id` (or `asset_id`), `name`, `is_crypto` (or `type_is_crypto`), `price`
/// (or `price_usd`). `name` may be omitted.
pub struct CsvAssetSource {
    path: PathBuf,
}

impl CsvAssetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AssetSource for CsvAssetSource {
    async fn fetch(&self) -> Result<Vec<Asset>, SourceError> {
        let assets = load_assets_from_csv(&self.path)?;
        if assets.is_empty() {
            return Err(SourceError::NoData);
        }
        Ok(assets)
    }
}

/// Load catalog entries from a CSV file.
pub fn load_assets_from_csv(path: &Path) -> Result<Vec<Asset>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| SourceError::Transport(format!("Failed to open CSV: {}", e)))?;

    let headers = reader
        .headers()
        .map_err(|e| SourceError::Decode(format!("Failed to read headers: {}", e)))?
        .clone();

    let id_col = find_column(&headers, &["id", "asset_id"])
        .ok_or_else(|| SourceError::Decode("No id column found".into()))?;
    let crypto_col = find_column(&headers, &["is_crypto", "type_is_crypto"])
        .ok_or_else(|| SourceError::Decode("No is_crypto column found".into()))?;
    let price_col = find_column(&headers, &["price", "price_usd"])
        .ok_or_else(|| SourceError::Decode("No price column found".into()))?;
    let name_col = find_column(&headers, &["name"]);

    let mut assets = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| SourceError::Decode(format!("CSV record error: {}", e)))?;

        let id = field(&record, id_col)?;
        let name = name_col
            .and_then(|i| record.get(i))
            .filter(|n| !n.is_empty())
            .unwrap_or(id);

        assets.push(Asset {
            id: id.to_string(),
            name: name.to_string(),
            is_crypto: parse_flag(field(&record, crypto_col)?)?,
            price: parse_price(field(&record, price_col)?)?,
        });
    }

    Ok(assets)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.contains(&header.trim().to_lowercase().as_str()))
}

fn field(record: &csv::StringRecord, index: usize) -> Result<&str, SourceError> {
    record
        .get(index)
        .ok_or_else(|| SourceError::Decode(format!("Missing column {} in record", index)))
}

fn parse_flag(s: &str) -> Result<bool, SourceError> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(SourceError::Decode(format!(
            "Failed to parse is_crypto '{}'",
            other
        ))),
    }
}

fn parse_price(s: &str) -> Result<Decimal, SourceError> {
    Decimal::from_str(s)
        .map_err(|e| SourceError::Decode(format!("Failed to parse price '{}': {}", s, e)))
}
