use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{OrderId, Price, Qty, Ticks};

const LOT_EPSILON: f64 = 1e-9;

/// Converts a price to integer ticks by rounding to the nearest tick.
#[inline(always)]
pub fn price_to_ticks(price: Price, tick_size: f64) -> Ticks {
    (price / tick_size).round() as Ticks
}

/// Converts integer ticks back to a price.
#[inline(always)]
pub fn ticks_to_price(ticks: Ticks, tick_size: f64) -> Price {
    ticks as f64 * tick_size
}

/// Rounds a quantity to the nearest lot. The epsilon defeats floating-point drift for quantities
/// sitting just below a lot boundary.
#[inline(always)]
pub fn quantity_to_lot(qty: Qty, lot_size: f64) -> Qty {
    ((qty + LOT_EPSILON) / lot_size).round() * lot_size
}

/// Monotonic order id generator; ids are unique within one engine instance and start at 1.
#[derive(Debug)]
pub struct OrderIdGenerator {
    next: AtomicU64,
}

impl OrderIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next order id.
    #[inline]
    pub fn next_id(&self) -> OrderId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
