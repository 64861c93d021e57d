use rust_decimal::Decimal;

/// Contract size for symbols not in the table.
pub const DEFAULT_CONTRACT_SIZE: Decimal = Decimal::TEN;

/// Base-asset units per contract on the contract-quoted exchange.
pub fn contract_size(symbol: &str) -> Decimal {
    match normalize_symbol(symbol).as_str() {
        // 0.001 BTC
        "BTCUSDT" => Decimal::new(1, 3),
        // 0.01 ETH
        "ETHUSDT" => Decimal::new(1, 2),
        _ => DEFAULT_CONTRACT_SIZE,
    }
}

/// `BTC_USDT` -> `BTCUSDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().replace('_', "").to_uppercase()
}

/// Notional value of `quantity` contracts entered at `price`.
pub fn contract_volume(symbol: &str, quantity: Decimal, price: Decimal) -> Decimal {
    quantity * price * contract_size(symbol)
}
