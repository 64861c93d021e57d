mod common;

use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use rust_decimal::Decimal;

use tradeledger::exchanges::Adapters;
use tradeledger::models::{Credential, Exchange};
use tradeledger::services::{BalanceAggregator, ExchangeBalance};

use common::{MemoryStore, ScriptedAdapter};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn creds(exchange: Exchange) -> Credential {
    Credential::new(exchange.as_str(), "key", "secret")
}

#[tokio::test]
async fn zero_and_failing_balances_are_left_out() {
    let store = Arc::new(MemoryStore::with_credentials(vec![
        creds(Exchange::Bybit),
        creds(Exchange::Mexc),
        creds(Exchange::Bitget),
    ]));

    let mut adapters = Adapters::new();
    adapters.insert(Arc::new(ScriptedAdapter::new(Exchange::Bybit).with_balance(Ok(dec("100.5")))));
    adapters.insert(Arc::new(ScriptedAdapter::new(Exchange::Mexc).with_balance(Ok(Decimal::ZERO))));
    adapters.insert(Arc::new(
        ScriptedAdapter::new(Exchange::Bitget).with_balance(Err("connection reset".into())),
    ));

    let summary = BalanceAggregator::new(store, adapters).total_balance().await.unwrap();

    assert_eq!(summary.total_balance, dec("100.5"));
    assert_eq!(
        summary.exchange_balances,
        vec![ExchangeBalance {
            exchange: "bybit".into(),
            balance: dec("100.5"),
        }]
    );
}

#[tokio::test]
async fn balances_are_summed_and_sorted() {
    let store = Arc::new(MemoryStore::with_credentials(vec![
        creds(Exchange::Mexc),
        creds(Exchange::Bitget),
    ]));

    let mut adapters = Adapters::new();
    adapters.insert(Arc::new(ScriptedAdapter::new(Exchange::Mexc).with_balance(Ok(dec("0.25")))));
    adapters.insert(Arc::new(ScriptedAdapter::new(Exchange::Bitget).with_balance(Ok(dec("19.75")))));

    let summary = BalanceAggregator::new(store, adapters).total_balance().await.unwrap();

    assert_eq!(summary.total_balance, Decimal::from(20));
    let names: Vec<&str> = summary.exchange_balances.iter().map(|b| b.exchange.as_str()).collect();
    assert_eq!(names, vec!["bitget", "mexc"]);
}

#[tokio::test]
async fn inactive_and_incomplete_credentials_are_not_queried() {
    let mut inactive = creds(Exchange::Bybit);
    inactive.is_active = false;
    let store = Arc::new(MemoryStore::with_credentials(vec![
        inactive,
        Credential::new("mexc", "", "secret"),
    ]));

    let bybit = Arc::new(ScriptedAdapter::new(Exchange::Bybit).with_balance(Ok(dec("50"))));
    let mexc = Arc::new(ScriptedAdapter::new(Exchange::Mexc).with_balance(Ok(dec("50"))));
    let mut adapters = Adapters::new();
    adapters.insert(bybit.clone());
    adapters.insert(mexc.clone());

    let summary = BalanceAggregator::new(store, adapters).total_balance().await.unwrap();

    assert_eq!(summary.total_balance, Decimal::ZERO);
    assert!(summary.exchange_balances.is_empty());
    assert_eq!(bybit.balance_calls.load(Ordering::SeqCst), 0);
    assert_eq!(mexc.balance_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn summary_serializes_camel_case() {
    let store = Arc::new(MemoryStore::with_credentials(vec![creds(Exchange::Bybit)]));
    let mut adapters = Adapters::new();
    adapters.insert(Arc::new(ScriptedAdapter::new(Exchange::Bybit).with_balance(Ok(dec("7.5")))));

    let summary = BalanceAggregator::new(store, adapters).total_balance().await.unwrap();
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["totalBalance"], "7.5");
    assert_eq!(json["exchangeBalances"][0]["exchange"], "bybit");
    assert_eq!(json["exchangeBalances"][0]["balance"], "7.5");
}
