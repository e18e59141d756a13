//! Full-engine scans over mock exchanges: catalog build, cached price
//! fetches, detection, ranking and the synthetic fallback.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use arbhunter::engine::cache::CacheConfig;
use arbhunter::engine::fallback::FallbackGenerator;
use arbhunter::engine::{ArbitrageEngine, EngineConfig};
use arbhunter::exchanges::ExchangeAdapter;
use arbhunter::types::{ExchangeId, Opportunity, ScanPreferences, Symbol};

use crate::mock_exchange::{Failure, MockExchange};

fn engine_config(priority: &[&str]) -> EngineConfig {
    EngineConfig {
        cache: CacheConfig {
            fetch_timeout: Duration::from_millis(300),
            ..CacheConfig::default()
        },
        priority: priority.iter().map(|n| ExchangeId::new(n)).collect(),
        ..EngineConfig::default()
    }
}

fn prefs(volume: Decimal, profit: Decimal, pct: Decimal, fallback: bool) -> ScanPreferences {
    ScanPreferences {
        min_volume: volume,
        min_profit: profit,
        min_profit_pct: pct,
        allow_fallback: fallback,
        ..ScanPreferences::default()
    }
}

fn adapters(list: &[&Arc<MockExchange>]) -> Vec<Arc<dyn ExchangeAdapter>> {
    list.iter()
        .map(|m| {
            let adapter: Arc<dyn ExchangeAdapter> = (*m).clone();
            adapter
        })
        .collect()
}

fn assert_within_thresholds(opportunities: &[Opportunity], p: &ScanPreferences) {
    for o in opportunities {
        assert!(o.buy_price <= o.sell_price, "{o}");
        assert!(o.fee_adjusted_profit_pct >= p.min_profit_pct, "{o}");
        assert!(o.estimated_profit_amount >= p.min_profit, "{o}");
        assert!(!o.is_synthetic);
    }
}

#[tokio::test]
async fn test_timed_out_exchange_is_skipped() {
    let a = Arc::new(MockExchange::new("a").quote("X", "100"));
    let b = Arc::new(MockExchange::new("b").quote("X", "103"));
    let c = Arc::new(MockExchange::new("c").quote("X", "99"));
    let engine = ArbitrageEngine::new(adapters(&[&a, &b, &c]), engine_config(&["a", "b", "c"]));

    engine.build_catalog().await;
    c.set_failure(Failure::Hang);

    let p = prefs(dec!(100), dec!(1), dec!(1), false);
    let report = engine.scan_report(&p, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.opportunities.len(), 1);
    let o = &report.opportunities[0];
    assert_eq!(o.symbol, Symbol::new("X"));
    assert_eq!(o.buy_exchange, ExchangeId::new("a"));
    assert_eq!(o.sell_exchange, ExchangeId::new("b"));
    assert_eq!(o.gross_spread_pct, dec!(3.0));
    assert_eq!(o.fee_adjusted_profit_pct, dec!(3.0) - dec!(0.4));
    assert!(o.estimated_profit_amount > dec!(1));
    assert_eq!(report.exchanges_skipped, vec![ExchangeId::new("c")]);
    assert!(!report.synthetic);
}

#[tokio::test]
async fn test_single_exchange_symbol_never_appears() {
    // Y is listed on both but only one of them quotes it.
    let a = Arc::new(MockExchange::new("a").quote("X", "10").quote("Y", "1").quote("Z", "5"));
    let b = Arc::new(MockExchange::new("b").quote("X", "10.6").list("Y"));
    let engine = ArbitrageEngine::new(adapters(&[&a, &b]), engine_config(&["a", "b"]));

    let p = prefs(dec!(100), dec!(0), dec!(0), false);
    let report = engine.scan_report(&p, &CancellationToken::new()).await.unwrap();

    assert!(report.opportunities.iter().all(|o| o.symbol != Symbol::new("Y")));
    assert!(report.opportunities.iter().all(|o| o.symbol != Symbol::new("Z")));
    assert_eq!(report.symbols_sampled, 2);
    assert_eq!(report.symbols_insufficient, 1);
    assert_eq!(report.opportunities.len(), 1);
}

#[tokio::test]
async fn test_nothing_qualifies_returns_flagged_synthetic() {
    let a = Arc::new(MockExchange::new("a").quote("BTC", "67000"));
    let b = Arc::new(MockExchange::new("b").quote("BTC", "67010"));
    let engine = ArbitrageEngine::new(adapters(&[&a, &b]), engine_config(&["a", "b"]))
        .with_fallback(FallbackGenerator::seeded(99));

    let report = engine
        .scan_report(&prefs(dec!(100), dec!(5), dec!(3), true), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.synthetic);
    assert!(!report.opportunities.is_empty());
    assert!(report.opportunities.iter().all(|o| o.is_synthetic));

    let live = engine.scan(&prefs(dec!(100), dec!(5), dec!(3), false)).await;
    assert!(live.is_empty());
}

#[tokio::test]
async fn test_empty_listings_fall_back_to_major_pairs() {
    let a = Arc::new(MockExchange::new("a"));
    let b = Arc::new(MockExchange::new("b").failing(Failure::Refused));
    let engine = ArbitrageEngine::new(adapters(&[&a, &b]), engine_config(&["a", "b"]));

    let status = engine.build_catalog().await;

    assert!(status.used_fallback);
    assert!(status.common_symbol_count > 0);
    assert_eq!(status.exchanges_loaded, vec![ExchangeId::new("a")]);
    assert_eq!(status.exchanges_failed, vec![ExchangeId::new("b")]);
}

#[tokio::test]
async fn test_fallback_catalog_still_scans_live_prices() {
    // Listings come back empty, but both venues still quote SOL.
    let a = Arc::new(MockExchange::new("a").unlisted_quote("SOL", "150"));
    let b = Arc::new(MockExchange::new("b").unlisted_quote("SOL", "156"));
    let engine = ArbitrageEngine::new(adapters(&[&a, &b]), engine_config(&["a", "b"]));

    let status = engine.build_catalog().await;
    assert!(status.used_fallback);

    let report = engine
        .scan_report(&prefs(dec!(100), dec!(1), dec!(1), false), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.catalog_fallback);
    assert_eq!(report.symbols_sampled, 5);
    assert_eq!(report.symbols_insufficient, 4);
    assert_eq!(report.opportunities.len(), 1);
    assert_eq!(report.opportunities[0].symbol, Symbol::new("SOL"));
    assert!(!report.opportunities[0].is_synthetic);
}

#[tokio::test]
async fn test_repeated_scans_are_byte_identical() {
    let a = Arc::new(
        MockExchange::new("a")
            .quote("BTC", "67000")
            .quote("ETH", "3500")
            .quote("SOL", "150")
            .quote("XRP", "0.55"),
    );
    let b = Arc::new(
        MockExchange::new("b")
            .quote("BTC", "69500")
            .quote("ETH", "3650")
            .quote("SOL", "150")
            .quote("XRP", "0.58"),
    );
    let c = Arc::new(MockExchange::new("c").quote("BTC", "66900").quote("ETH", "3620"));
    let p = prefs(dec!(1000), dec!(1), dec!(1), false);

    let mut outputs = Vec::new();
    for _ in 0..3 {
        let engine = ArbitrageEngine::new(adapters(&[&a, &b, &c]), engine_config(&["a", "b", "c"]));
        let found = engine.scan(&p).await;
        assert_within_thresholds(&found, &p);
        outputs.push(serde_json::to_string(&found).unwrap());
    }

    assert!(outputs[0].contains("XRP/USDT"));
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}

#[tokio::test]
async fn test_price_tie_goes_to_higher_priority_exchange() {
    let a = Arc::new(MockExchange::new("a").quote("X", "100"));
    let b = Arc::new(MockExchange::new("b").quote("X", "100"));
    let c = Arc::new(MockExchange::new("c").quote("X", "105"));
    let p = prefs(dec!(100), dec!(1), dec!(1), false);

    for _ in 0..5 {
        let engine = ArbitrageEngine::new(adapters(&[&a, &b, &c]), engine_config(&["b", "a", "c"]));
        let found = engine.scan(&p).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].buy_exchange, ExchangeId::new("b"));
    }

    let engine = ArbitrageEngine::new(adapters(&[&a, &b, &c]), engine_config(&["a", "b", "c"]));
    assert_eq!(engine.scan(&p).await[0].buy_exchange, ExchangeId::new("a"));
}

#[tokio::test]
async fn test_second_scan_within_window_reuses_cache() {
    let a = Arc::new(MockExchange::new("a").quote("X", "100").quote("W", "20"));
    let b = Arc::new(MockExchange::new("b").quote("X", "104").quote("W", "20.1"));
    let engine = ArbitrageEngine::new(adapters(&[&a, &b]), engine_config(&["a", "b"]));
    let p = prefs(dec!(100), dec!(1), dec!(1), false);

    let first = engine.scan(&p).await;
    let fetched = a.fetch_count() + b.fetch_count();
    let second = engine.scan(&p).await;

    assert_eq!(fetched, 4);
    assert_eq!(a.fetch_count() + b.fetch_count(), fetched);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_exchange_subset_limits_comparison() {
    let a = Arc::new(MockExchange::new("a").quote("X", "100"));
    let b = Arc::new(MockExchange::new("b").quote("X", "102"));
    let c = Arc::new(MockExchange::new("c").quote("X", "110"));
    let engine = ArbitrageEngine::new(adapters(&[&a, &b, &c]), engine_config(&["a", "b", "c"]));

    let mut p = prefs(dec!(100), dec!(0), dec!(0), false);
    p.exchanges = vec!["A".into(), "b".into()];
    let found = engine.scan(&p).await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].sell_exchange, ExchangeId::new("b"));
    assert_eq!(c.fetch_count(), 0);
}

#[tokio::test]
async fn test_results_are_ranked_and_capped() {
    let a = Arc::new(
        MockExchange::new("a")
            .quote("AAA", "100")
            .quote("BBB", "100")
            .quote("CCC", "100")
            .quote("DDD", "100"),
    );
    let b = Arc::new(
        MockExchange::new("b")
            .quote("AAA", "102")
            .quote("BBB", "106")
            .quote("CCC", "104")
            .quote("DDD", "108"),
    );
    let engine = ArbitrageEngine::new(adapters(&[&a, &b]), engine_config(&["a", "b"]));

    let mut p = prefs(dec!(100), dec!(0), dec!(0), false);
    let found = engine.scan(&p).await;
    let order: Vec<&str> = found.iter().map(|o| o.symbol.base()).collect();
    assert_eq!(order, vec!["DDD", "BBB", "CCC"]);

    p.top_k = Some(1);
    assert_eq!(engine.scan(&p).await.len(), 1);
}

#[tokio::test]
async fn test_refused_exchange_is_called_once_per_scan() {
    let bases = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF", "GGG", "HHH"];
    let mut a = MockExchange::new("a");
    let mut b = MockExchange::new("b");
    let mut c = MockExchange::new("c");
    for base in bases {
        a = a.quote(base, "100");
        b = b.quote(base, "102");
        c = c.quote(base, "101");
    }
    let (a, b, c) = (Arc::new(a), Arc::new(b), Arc::new(c));
    let engine = ArbitrageEngine::new(adapters(&[&a, &b, &c]), engine_config(&["a", "b", "c"]));
    engine.build_catalog().await;
    c.set_failure(Failure::Refused);

    let mut p = prefs(dec!(100), dec!(0), dec!(0), false);
    p.top_k = Some(bases.len());
    let report = engine.scan_report(&p, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.symbols_compared, bases.len());
    assert_eq!(report.opportunities.len(), bases.len());
    assert_eq!(report.exchanges_skipped, vec![ExchangeId::new("c")]);
    assert_eq!(c.fetch_count(), 1);
}
