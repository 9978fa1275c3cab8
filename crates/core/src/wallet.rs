use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::models::{RecordError, ENTRIES_DELIMITER, ENTRY_DELIMITER, FIELD_DELIMITER};

const NO_INVESTMENTS: &str = "No investments";

/// Errors raised by wallet operations. Every check runs before any mutation,
/// so a failed operation leaves the wallet untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("Money should not be negative")]
    NegativeAmount,
    #[error("Amount should be greater than zero")]
    ZeroAmount,
    #[error("Not enough money")]
    InsufficientFunds,
    #[error("Asset not found in wallet")]
    AssetNotHeld,
    #[error("Asset price unavailable")]
    InvalidPrice,
    #[error("Amount too large")]
    Overflow,
}

/// Cash balance plus crypto positions of a single user.
///
/// An asset id is present in `investments` exactly when it is present in
/// `entry_prices`. The entry price is sticky: it is recorded on the first
/// purchase of an asset and later purchases of the same asset do not move it,
/// so trends are measured against the first lot rather than a volume-weighted
/// average. This is intended behavior.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wallet {
    balance: Decimal,
    /// Asset id -> owned units.
    investments: BTreeMap<String, Decimal>,
    /// Asset id -> price at first acquisition.
    entry_prices: BTreeMap<String, Decimal>,
}

impl Wallet {
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn quantity(&self, asset_id: &str) -> Option<Decimal> {
        self.investments.get(asset_id).copied()
    }

    pub fn entry_price(&self, asset_id: &str) -> Option<Decimal> {
        self.entry_prices.get(asset_id).copied()
    }

    /// Ids of all currently held assets.
    pub fn holdings(&self) -> Vec<String> {
        self.investments.keys().cloned().collect()
    }

    /// Credit cash. Returns the new balance.
    pub fn deposit(&mut self, amount: Decimal) -> Result<Decimal, WalletError> {
        ensure_non_negative(amount)?;
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(WalletError::Overflow)?;
        Ok(self.balance)
    }

    /// Debit cash. Returns the new balance.
    pub fn withdraw(&mut self, amount: Decimal) -> Result<Decimal, WalletError> {
        ensure_non_negative(amount)?;
        if self.balance < amount {
            return Err(WalletError::InsufficientFunds);
        }
        self.balance -= amount;
        Ok(self.balance)
    }

    /// Spend `usd_amount` on `asset_id` at `price`. Returns the units bought.
    ///
    /// Cash is withdrawn before the position is touched; a failed withdrawal
    /// aborts the whole purchase.
    pub fn buy(
        &mut self,
        asset_id: &str,
        usd_amount: Decimal,
        price: Decimal,
    ) -> Result<Decimal, WalletError> {
        ensure_non_negative(usd_amount)?;
        if usd_amount.is_zero() {
            return Err(WalletError::ZeroAmount);
        }
        if price <= Decimal::ZERO {
            return Err(WalletError::InvalidPrice);
        }
        let quantity = usd_amount
            .checked_div(price)
            .ok_or(WalletError::Overflow)?
            .normalize();
        let held = self.quantity(asset_id).unwrap_or(Decimal::ZERO);
        let new_quantity = held.checked_add(quantity).ok_or(WalletError::Overflow)?;

        self.withdraw(usd_amount)?;

        self.entry_prices
            .entry(asset_id.to_string())
            .or_insert(price);
        self.investments.insert(asset_id.to_string(), new_quantity);
        Ok(quantity)
    }

    /// Liquidate the entire position in `asset_id` at `price`. Returns the
    /// proceeds credited to the balance.
    pub fn sell(&mut self, asset_id: &str, price: Decimal) -> Result<Decimal, WalletError> {
        let quantity = self.quantity(asset_id).ok_or(WalletError::AssetNotHeld)?;
        let proceeds = quantity.checked_mul(price).ok_or(WalletError::Overflow)?;
        let balance = self
            .balance
            .checked_add(proceeds)
            .ok_or(WalletError::Overflow)?;

        self.balance = balance.normalize();
        self.investments.remove(asset_id);
        self.entry_prices.remove(asset_id);
        Ok(proceeds)
    }

    /// Mark-to-market value of all positions. Ids missing from `prices` are
    /// valued at zero.
    pub fn crypto_value(&self, prices: &HashMap<String, Decimal>) -> Decimal {
        self.investments
            .iter()
            .map(|(id, quantity)| *quantity * price_of(prices, id))
            .sum()
    }

    /// Human-readable account overview: totals followed by one line per holding.
    pub fn summary(&self, prices: &HashMap<String, Decimal>) -> String {
        if self.investments.is_empty() {
            return format!("{}\n\n{NO_INVESTMENTS}", money_line("Balance", self.balance));
        }

        let crypto = self.crypto_value(prices);
        let mut lines = vec![
            money_line("Balance", self.balance + crypto),
            money_line("Cash", self.balance),
            money_line("Crypto", crypto),
            String::new(),
            "Current investments:".to_string(),
        ];
        for (id, quantity) in &self.investments {
            let value = *quantity * price_of(prices, id);
            lines.push(format!(
                "{:013.8} {} (${:.2} USD)",
                quantity.round_dp(8),
                id,
                value.round_dp(2)
            ));
        }
        lines.join("\n")
    }

    /// Percentage change of each holding against its sticky entry price.
    pub fn trends(&self, prices: &HashMap<String, Decimal>) -> String {
        if self.investments.is_empty() {
            return NO_INVESTMENTS.to_string();
        }

        let mut lines = vec!["Current trends:".to_string()];
        for id in self.investments.keys() {
            let entry = self.entry_price(id).unwrap_or(Decimal::ZERO);
            let change = (price_of(prices, id) - entry)
                .checked_div(entry)
                .map(|ratio| ratio * Decimal::ONE_HUNDRED)
                .unwrap_or(Decimal::ZERO);
            lines.push(format!("{}: {:+.2}%", id, change.round_dp(2)));
        }
        lines.join("\n")
    }
}

/// Renders the persisted form `balance;investments;entry_prices`.
impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}",
            self.balance,
            render_map(&self.investments),
            render_map(&self.entry_prices)
        )
    }
}

impl FromStr for Wallet {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.splitn(3, FIELD_DELIMITER);
        let balance = fields.next().ok_or(RecordError::MissingField("balance"))?;
        let investments = fields
            .next()
            .ok_or(RecordError::MissingField("investments"))?;
        let entry_prices = fields
            .next()
            .ok_or(RecordError::MissingField("entry_prices"))?;

        let wallet = Self {
            balance: parse_decimal(balance, "balance")?,
            investments: parse_map(investments, "quantity")?,
            entry_prices: parse_map(entry_prices, "entry price")?,
        };

        if !wallet.investments.keys().eq(wallet.entry_prices.keys()) {
            return Err(RecordError::MalformedEntry(line.to_string()));
        }
        Ok(wallet)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn ensure_non_negative(amount: Decimal) -> Result<(), WalletError> {
    if amount < Decimal::ZERO {
        return Err(WalletError::NegativeAmount);
    }
    Ok(())
}

fn price_of(prices: &HashMap<String, Decimal>, asset_id: &str) -> Decimal {
    prices.get(asset_id).copied().unwrap_or(Decimal::ZERO)
}

fn money_line(label: &str, amount: Decimal) -> String {
    format!("{}: {:.2} USD", label, amount.round_dp(2))
}

fn render_map(map: &BTreeMap<String, Decimal>) -> String {
    map.iter()
        .map(|(id, value)| format!("{id}{ENTRY_DELIMITER}{value}"))
        .collect::<Vec<_>>()
        .join(&ENTRIES_DELIMITER.to_string())
}

fn parse_map(
    line: &str,
    field: &'static str,
) -> Result<BTreeMap<String, Decimal>, RecordError> {
    if line.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    line.split(ENTRIES_DELIMITER)
        .map(|entry| {
            let (id, value) = entry
                .split_once(ENTRY_DELIMITER)
                .ok_or_else(|| RecordError::MalformedEntry(entry.to_string()))?;
            Ok((id.to_string(), parse_decimal(value, field)?))
        })
        .collect()
}

fn parse_decimal(s: &str, field: &'static str) -> Result<Decimal, RecordError> {
    Decimal::from_str(s).map_err(|_| RecordError::InvalidNumber {
        field,
        value: s.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn prices(entries: &[(&str, Decimal)]) -> HashMap<String, Decimal> {
        entries
            .iter()
            .map(|(id, price)| (id.to_string(), *price))
            .collect()
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let mut wallet = Wallet::default();
        assert_eq!(wallet.deposit(dec!(100)), Ok(dec!(100)));
        assert_eq!(wallet.withdraw(dec!(40)), Ok(dec!(60)));
        assert_eq!(wallet.withdraw(dec!(61)), Err(WalletError::InsufficientFunds));
        assert_eq!(wallet.balance(), dec!(60));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut wallet = Wallet::default();
        assert_eq!(wallet.deposit(dec!(-1)), Err(WalletError::NegativeAmount));
        assert_eq!(wallet.withdraw(dec!(-1)), Err(WalletError::NegativeAmount));
        assert_eq!(wallet.balance(), Decimal::ZERO);
    }

    #[test]
    fn test_buy_records_position() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(100)).unwrap();

        assert_eq!(wallet.buy("BTC", dec!(100), dec!(50)), Ok(dec!(2)));
        assert_eq!(wallet.balance(), Decimal::ZERO);
        assert_eq!(wallet.quantity("BTC"), Some(dec!(2)));
        assert_eq!(wallet.entry_price("BTC"), Some(dec!(50)));
    }

    #[test]
    fn test_buy_insufficient_funds_leaves_no_position() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(10)).unwrap();

        assert_eq!(
            wallet.buy("BTC", dec!(100), dec!(50)),
            Err(WalletError::InsufficientFunds)
        );
        assert_eq!(wallet.balance(), dec!(10));
        assert!(wallet.holdings().is_empty());
        assert_eq!(wallet.entry_price("BTC"), None);
    }

    #[test]
    fn test_buy_with_zero_price_rejected() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(10)).unwrap();
        assert_eq!(
            wallet.buy("BTC", dec!(5), Decimal::ZERO),
            Err(WalletError::InvalidPrice)
        );
        assert_eq!(wallet.balance(), dec!(10));
    }

    #[test]
    fn test_entry_price_is_sticky() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(300)).unwrap();
        wallet.buy("BTC", dec!(100), dec!(50)).unwrap();
        wallet.buy("BTC", dec!(200), dec!(100)).unwrap();

        assert_eq!(wallet.quantity("BTC"), Some(dec!(4)));
        assert_eq!(wallet.entry_price("BTC"), Some(dec!(50)));
    }

    #[test]
    fn test_sell_liquidates_whole_position() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(100)).unwrap();
        wallet.buy("BTC", dec!(100), dec!(50)).unwrap();

        assert_eq!(wallet.sell("BTC", dec!(60)), Ok(dec!(120)));
        assert_eq!(wallet.balance(), dec!(120));
        assert_eq!(wallet.quantity("BTC"), None);
        assert_eq!(wallet.entry_price("BTC"), None);
    }

    #[test]
    fn test_buy_zero_amount_rejected() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(10)).unwrap();

        assert_eq!(wallet.buy("ETH", dec!(0), dec!(5)), Err(WalletError::ZeroAmount));
        assert_eq!(wallet.buy("ETH", dec!(-1), dec!(5)), Err(WalletError::NegativeAmount));
        assert!(wallet.holdings().is_empty());
        assert_eq!(wallet.entry_price("ETH"), None);
        assert_eq!(wallet.balance(), dec!(10));
    }

    #[test]
    fn test_sell_proceeds_drop_trailing_zeros() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(1000)).unwrap();
        wallet.buy("ETH", dec!(1000), dec!(3)).unwrap();
        wallet.sell("ETH", dec!(3)).unwrap();

        assert_eq!(wallet.balance(), dec!(1000));
        assert_eq!(wallet.balance().to_string(), "1000");
    }

    #[test]
    fn test_sell_unheld_asset() {
        let mut wallet = Wallet::default();
        assert_eq!(wallet.sell("ETH", dec!(10)), Err(WalletError::AssetNotHeld));
    }

    #[test]
    fn test_buy_then_sell_at_same_price_restores_balance() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(1000)).unwrap();
        wallet.buy("ETH", dec!(333), dec!(1039.3682961935640591450912866)).unwrap();
        wallet.sell("ETH", dec!(1039.3682961935640591450912866)).unwrap();

        let diff = (wallet.balance() - dec!(1000)).abs();
        assert!(diff < dec!(0.000000001), "balance drifted by {diff}");
    }

    #[test]
    fn test_summary_without_holdings() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(12.5)).unwrap();
        assert_eq!(
            wallet.summary(&HashMap::new()),
            "Balance: 12.50 USD\n\nNo investments"
        );
    }

    #[test]
    fn test_summary_with_holdings() {
        let mut wallet = Wallet::default();
        wallet.deposit(dec!(150)).unwrap();
        wallet.buy("BTC", dec!(100), dec!(50)).unwrap();

        let summary = wallet.summary(&prices(&[("BTC", dec!(60))]));
        assert_eq!(
            summary,
            "Balance: 170.00 USD\n\
             Cash: 50.00 USD\n\
             Crypto: 120.00 USD\n\
             \n\
             Current investments:\n\
             0002.00000000 BTC ($120.00 USD)"
        );
    }

    #[test]
    fn test_trends() {
        let mut wallet = Wallet::default();
        assert_eq!(wallet.trends(&HashMap::new()), "No investments");

        wallet.deposit(dec!(200)).unwrap();
        wallet.buy("BTC", dec!(100), dec!(50)).unwrap();
        wallet.buy("ETH", dec!(100), dec!(20)).unwrap();

        let trends = wallet.trends(&prices(&[("BTC", dec!(60)), ("ETH", dec!(15))]));
        assert_eq!(trends, "Current trends:\nBTC: +20.00%\nETH: -25.00%");
    }

    #[test]
    fn test_record_round_trip() {
        let empty = Wallet::default();
        assert_eq!(empty.to_string(), "0;;");
        assert_eq!("0;;".parse::<Wallet>().unwrap(), empty);

        let mut single = Wallet::default();
        single.deposit(dec!(100)).unwrap();
        single.buy("BTC", dec!(100), dec!(50)).unwrap();
        let line = single.to_string();
        assert_eq!(line, "0;BTC=2;BTC=50");
        assert_eq!(line.parse::<Wallet>().unwrap(), single);

        let line = "10.25;ADA=300.5,BTC=0.001,ETH=1.75;ADA=0.35,BTC=19424.47,ETH=1039.36";
        let many: Wallet = line.parse().unwrap();
        assert_eq!(many.holdings(), vec!["ADA", "BTC", "ETH"]);
        assert_eq!(many.to_string(), line);
    }

    #[test]
    fn test_record_with_mismatched_maps_rejected() {
        assert!("1;BTC=2;".parse::<Wallet>().is_err());
        assert!("1;BTC=2;ETH=3".parse::<Wallet>().is_err());
        assert!("abc;;".parse::<Wallet>().is_err());
        assert!("1;BTC;BTC=2".parse::<Wallet>().is_err());
    }
}
