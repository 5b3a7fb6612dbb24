use rust_decimal::Decimal;

use crate::models::{CopyConfig, CopyReservation, SizingMode};

/// Candidate buy quantity for a config, before any headroom shrinking.
/// Returns `None` for configs whose sizing inputs are unusable (zero ratio,
/// zero notional, free leader fill).
pub fn buy_quantity(
    config: &CopyConfig,
    leader_size: Decimal,
    leader_price: Decimal,
) -> Option<Decimal> {
    match config.mode() {
        SizingMode::Ratio => {
            if config.ratio <= Decimal::ZERO {
                return None;
            }
            Some(leader_size * config.ratio)
        }
        SizingMode::Fixed => {
            if config.fixed_notional <= Decimal::ZERO || leader_price <= Decimal::ZERO {
                return None;
            }
            Some(config.fixed_notional / leader_price)
        }
    }
}

/// Quantity to close against a leader sell.
///
/// Ratio configs mirror the leader directly. Fixed-notional configs never
/// track the leader 1:1, so the close is sized by the ratio actually
/// realized across the outstanding reservations.
pub fn sell_quantity(
    config: &CopyConfig,
    leader_size: Decimal,
    outstanding: &[CopyReservation],
) -> Option<Decimal> {
    match config.mode() {
        SizingMode::Ratio => {
            if config.ratio <= Decimal::ZERO {
                return None;
            }
            Some(leader_size * config.ratio)
        }
        SizingMode::Fixed => Some(leader_size * actual_ratio(config, outstanding)),
    }
}

/// Realized copy ratio: total copied quantity over the leader's own fill
/// sizes recorded when those reservations were opened. Falls back to the
/// configured ratio (or 1) when any leader-side size is unknown.
fn actual_ratio(config: &CopyConfig, outstanding: &[CopyReservation]) -> Decimal {
    let fallback = if config.ratio > Decimal::ZERO {
        config.ratio
    } else {
        Decimal::ONE
    };

    if outstanding.is_empty() {
        return fallback;
    }
    if outstanding.iter().any(|r| r.leader_quantity <= Decimal::ZERO) {
        return fallback;
    }

    let copied: Decimal = outstanding.iter().map(|r| r.quantity).sum();
    let leader: Decimal = outstanding.iter().map(|r| r.leader_quantity).sum();
    if leader <= Decimal::ZERO {
        return fallback;
    }

    copied / leader
}
