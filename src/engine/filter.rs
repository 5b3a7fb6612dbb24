use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::db::reservation_repo;
use crate::errors::{CopyError, RejectReason};
use crate::exchange::{ApiOrderBook, ApiOrderBookLevel, ExchangeApi};
use crate::models::{CopyConfig, Side};

/// Levels counted by the top-of-book depth filter.
const TOP_DEPTH_LEVELS: usize = 3;

/// Outcome of a filter evaluation. On a pass the fetched order book rides
/// along so the caller does not hit the exchange twice; `value_headroom`
/// is set when the position-value cap leaves less room than the candidate
/// order wanted and the caller should shrink instead of dropping.
#[derive(Debug)]
pub struct FilterVerdict {
    pub reject: Option<RejectReason>,
    pub value_headroom: Option<Decimal>,
    pub book: Option<ApiOrderBook>,
}

impl FilterVerdict {
    pub fn passed(&self) -> bool {
        self.reject.is_none()
    }

    fn reject(reason: RejectReason, book: Option<ApiOrderBook>) -> Self {
        Self {
            reject: Some(reason),
            value_headroom: None,
            book,
        }
    }
}

/// One candidate order to filter.
#[derive(Debug)]
pub struct FilterInput<'a> {
    pub config: &'a CopyConfig,
    pub market_id: &'a str,
    pub token_id: &'a str,
    pub side: Side,
    pub leader_price: Decimal,
    pub candidate_notional: Decimal,
}

/// Run all configured filters for one candidate order, short-circuiting on
/// the first violation. Checks run cheapest-first: price range before the
/// book fetch, book shape before the position-cap queries.
pub async fn evaluate(
    exchange: &dyn ExchangeApi,
    pool: &PgPool,
    input: &FilterInput<'_>,
    book: Option<ApiOrderBook>,
) -> Result<FilterVerdict, CopyError> {
    let config = input.config;

    if !price_in_range(config, input.leader_price) {
        return Ok(FilterVerdict::reject(RejectReason::PriceOutsideRange, book));
    }

    let book = match book {
        Some(b) => b,
        None => exchange.get_order_book(input.token_id).await?,
    };

    if let Err(reason) = book_rules(config, input.side, &book) {
        return Ok(FilterVerdict::reject(reason, Some(book)));
    }

    let mut value_headroom = None;
    if config.max_position_count.is_some() || config.max_position_value.is_some() {
        let exposure =
            reservation_repo::open_exposure(pool, config.id, input.market_id).await?;

        if let Some(max_count) = config.max_position_count {
            if exposure.count + 1 > max_count {
                return Ok(FilterVerdict::reject(
                    RejectReason::PositionCountExceeded,
                    Some(book),
                ));
            }
        }

        if let Some(max_value) = config.max_position_value {
            if exposure.value + input.candidate_notional > max_value {
                let headroom = max_value - exposure.value;
                if headroom <= Decimal::ZERO {
                    return Ok(FilterVerdict::reject(
                        RejectReason::PositionValueExceeded,
                        Some(book),
                    ));
                }
                value_headroom = Some(headroom);
            }
        }
    }

    Ok(FilterVerdict {
        reject: None,
        value_headroom,
        book: Some(book),
    })
}

fn price_in_range(config: &CopyConfig, price: Decimal) -> bool {
    if let Some(min) = config.min_price {
        if price < min {
            return false;
        }
    }
    if let Some(max) = config.max_price {
        if price > max {
            return false;
        }
    }
    true
}

/// Spread and depth checks against the current book. Pure so the rules can
/// be tested with hand-built books.
fn book_rules(config: &CopyConfig, side: Side, book: &ApiOrderBook) -> Result<(), RejectReason> {
    if let Some(max_spread) = config.max_spread {
        let (bid, ask) = match (best_bid(book), best_ask(book)) {
            (Some(bid), Some(ask)) => (bid, ask),
            _ => return Err(RejectReason::EmptyBook),
        };
        if ask - bid > max_spread {
            return Err(RejectReason::SpreadTooWide);
        }
    }

    // The side being consumed: asks fill a buy, bids fill a sell.
    let consumed = match side {
        Side::Buy => &book.asks,
        Side::Sell => &book.bids,
    };

    if let Some(min_top) = config.min_top_depth {
        if top_depth(consumed, side) < min_top {
            return Err(RejectReason::InsufficientTopDepth);
        }
    }
    if let Some(min_total) = config.min_book_depth {
        if side_depth(consumed) < min_total {
            return Err(RejectReason::InsufficientBookDepth);
        }
    }

    Ok(())
}

/// Book feeds carry no ordering guarantee, so best prices are computed,
/// not taken positionally.
pub fn best_bid(book: &ApiOrderBook) -> Option<Decimal> {
    book.bids.iter().map(|l| l.price).max()
}

pub fn best_ask(book: &ApiOrderBook) -> Option<Decimal> {
    book.asks.iter().map(|l| l.price).min()
}

/// Notional across the best `TOP_DEPTH_LEVELS` levels of the consumed side.
fn top_depth(levels: &[ApiOrderBookLevel], side: Side) -> Decimal {
    let mut prices: Vec<(Decimal, Decimal)> = levels.iter().map(|l| (l.price, l.size)).collect();
    match side {
        Side::Buy => prices.sort_by(|a, b| a.0.cmp(&b.0)),
        Side::Sell => prices.sort_by(|a, b| b.0.cmp(&a.0)),
    }
    prices
        .iter()
        .take(TOP_DEPTH_LEVELS)
        .map(|(price, size)| price * size)
        .sum()
}

fn side_depth(levels: &[ApiOrderBookLevel]) -> Decimal {
    levels.iter().map(|l| l.price * l.size).sum()
}
