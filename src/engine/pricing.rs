use rust_decimal::Decimal;

/// Applied when a config leaves price tolerance unset.
pub fn tolerance_or_default(tolerance_pct: Option<Decimal>) -> Decimal {
    tolerance_pct.unwrap_or_else(|| Decimal::from(5))
}

/// Limit price for a copy buy: leader price raised by the tolerance
/// percentage, capped at 0.99. The cap keeps the order inside the valid
/// price band even for near-resolved markets.
pub fn buy_limit_price(leader_price: Decimal, tolerance_pct: Decimal) -> Decimal {
    let adjusted = leader_price * (Decimal::ONE + tolerance_pct / Decimal::ONE_HUNDRED);
    adjusted.min(Decimal::new(99, 2))
}

/// Limit price for a copy sell: leader price lowered by the tolerance
/// percentage, floored at 0.01.
pub fn sell_limit_price(leader_price: Decimal, tolerance_pct: Decimal) -> Decimal {
    let adjusted = leader_price * (Decimal::ONE - tolerance_pct / Decimal::ONE_HUNDRED);
    adjusted.max(Decimal::new(1, 2))
}

/// Execution price for a copy sell: current best bid when the book gives
/// one, otherwise the leader's sell price marked down 10% to guarantee a
/// fill. Floored at 0.01.
pub fn sell_execution_price(best_bid: Option<Decimal>, leader_price: Decimal) -> Decimal {
    let price =
        best_bid.unwrap_or_else(|| sell_limit_price(leader_price, Decimal::from(10)));
    price.max(Decimal::new(1, 2))
}
