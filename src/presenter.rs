//! Human-readable signal rendering.
//!
//! Turns [`Opportunity`] records into plain-text messages for a chat or
//! notification sink. Synthetic records always carry a DEMO banner.

use rust_decimal::Decimal;
use std::fmt::Write;

use crate::types::{ExchangeId, Opportunity, REFERENCE_QUOTE};

const DEMO_BANNER: &str = "⚠️ DEMO DATA: synthetic example, not a live price";

/// Spot trading page for `base` on `exchange`, if the venue is known.
pub fn trade_link(exchange: &ExchangeId, base: &str) -> Option<String> {
    let upper = urlencoding::encode(&base.to_uppercase()).into_owned();
    let lower = urlencoding::encode(&base.to_lowercase()).into_owned();
    let url = match exchange.as_str() {
        "kucoin" => format!("https://www.kucoin.com/trade/{upper}-USDT"),
        "bybit" => format!("https://www.bybit.com/trade/spot/{upper}/USDT"),
        "okx" => format!("https://www.okx.com/trade-spot/{lower}-usdt"),
        "gateio" => format!("https://www.gate.io/trade/{upper}_USDT"),
        "htx" => format!("https://www.htx.com/trade/{lower}_usdt"),
        _ => return None,
    };
    Some(url)
}

/// Render one opportunity as a multi-line signal for `network`.
pub fn render_signal(opportunity: &Opportunity, network: &str) -> String {
    let o = opportunity;
    let base = o.symbol.base();
    let buy_name = o.buy_exchange.display_name();
    let sell_name = o.sell_exchange.display_name();

    let coins = o.coin_amount();
    let proceeds = sell_proceeds(o);
    let fees = coins
        .checked_mul(o.sell_price)
        .map(|gross| (gross - proceeds).max(Decimal::ZERO))
        .unwrap_or(Decimal::ZERO);

    let mut out = String::new();
    if o.is_synthetic {
        let _ = writeln!(out, "{DEMO_BANNER}\n");
    }

    let _ = writeln!(out, "{buy_name} -> {sell_name} ({})", o.symbol);
    let _ = writeln!(out);

    let _ = writeln!(out, "{buy_name} BUY #{base}{}", link_suffix(&o.buy_exchange, base));
    let _ = writeln!(out, "Price: {:.6} {REFERENCE_QUOTE}", o.buy_price);
    let _ = writeln!(out, "Coins: {} {base} = {:.2} {REFERENCE_QUOTE}", coin_str(coins), o.trade_volume.round_dp(2));
    let _ = writeln!(out);

    let _ = writeln!(out, "Fees (est.)");
    let _ = writeln!(out, "{:.2} {REFERENCE_QUOTE}", fees.round_dp(2));
    let _ = writeln!(out);

    let _ = writeln!(out, "{sell_name} SELL #{base}{}", link_suffix(&o.sell_exchange, base));
    let _ = writeln!(out, "Price: {:.6} {REFERENCE_QUOTE}", o.sell_price);
    let _ = writeln!(out, "Coins: {} {base} = {:.2} {REFERENCE_QUOTE}", coin_str(coins), proceeds.round_dp(2));
    let _ = writeln!(out);

    let _ = writeln!(out, "Profit: {:.2} {REFERENCE_QUOTE}", o.estimated_profit_amount.round_dp(2));
    let _ = writeln!(
        out,
        "Return: {:.1}% (gross {:.2}%)",
        o.fee_adjusted_profit_pct.round_dp(1),
        o.gross_spread_pct.round_dp(2)
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Withdraw: {network}");
    let _ = write!(out, "Deposit: {network}");

    out
}

/// Short digest of a ranked list.
pub fn render_summary(opportunities: &[Opportunity]) -> String {
    if opportunities.is_empty() {
        return "No arbitrage found. Waiting for the next scan.".to_string();
    }

    let mut out = String::new();
    if opportunities.iter().any(|o| o.is_synthetic) {
        let _ = writeln!(out, "{DEMO_BANNER}");
    }
    let _ = writeln!(out, "ARBITRAGE FOUND: top {}", opportunities.len());
    for (i, o) in opportunities.iter().enumerate() {
        let _ = write!(
            out,
            "\n{}. {} {} ${} -> {} ${} | {:.2}%",
            i + 1,
            o.symbol.base(),
            o.buy_exchange.display_name(),
            o.buy_price.normalize(),
            o.sell_exchange.display_name(),
            o.sell_price.normalize(),
            o.fee_adjusted_profit_pct.round_dp(2),
        );
    }
    out
}

/// Sell-side value net of fees: the trade volume plus the estimated profit.
fn sell_proceeds(o: &Opportunity) -> Decimal {
    o.trade_volume + o.estimated_profit_amount
}

fn link_suffix(exchange: &ExchangeId, base: &str) -> String {
    trade_link(exchange, base)
        .map(|url| format!(" ({url})"))
        .unwrap_or_default()
}

/// Whole coins for large counts, four decimals for fractional ones.
fn coin_str(coins: Decimal) -> String {
    if coins >= Decimal::ONE {
        format!("{:.0}", coins.round_dp(0))
    } else {
        format!("{:.4}", coins.round_dp(4))
    }
}
