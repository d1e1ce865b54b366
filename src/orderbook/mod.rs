use std::{
    cell::{Cell, Ref, RefCell},
    collections::HashMap,
};

use crate::{
    backtest::BacktestError,
    types::{BookUpdate, Price, Qty, Side, Ticks, UpdateKind},
    utils::{price_to_ticks, ticks_to_price},
};

/// L2 order book implementation based on per-side hash maps keyed by price in ticks.
///
/// Best/mid queries and level walks go through lazily sorted per-side caches that are invalidated
/// on any mutation to that side. Market-taking operations walk several levels per order, so the
/// sort cost is paid once per burst of feed updates rather than once per level.
///
/// The feed may briefly show a crossed book mid-burst; no crossed-book invariant is enforced
/// here.
pub struct OrderBook {
    tick_size: f64,
    lot_size: f64,
    bid_book: HashMap<Ticks, Qty>,
    ask_book: HashMap<Ticks, Qty>,
    last_update: UpdateKind,
    sorted_bids: RefCell<Vec<(Ticks, Qty)>>,
    sorted_asks: RefCell<Vec<(Ticks, Qty)>>,
    bids_cache_valid: Cell<bool>,
    asks_cache_valid: Cell<bool>,
}

impl OrderBook {
    /// Constructs an empty `OrderBook`.
    ///
    /// Panics if `tick_size` or `lot_size` is not strictly positive.
    pub fn new(tick_size: f64, lot_size: f64) -> Self {
        assert!(tick_size > 0.0, "tick size must be positive: {tick_size}");
        assert!(lot_size > 0.0, "lot size must be positive: {lot_size}");
        Self {
            tick_size,
            lot_size,
            bid_book: HashMap::new(),
            ask_book: HashMap::new(),
            last_update: UpdateKind::Snapshot,
            sorted_bids: RefCell::new(Vec::new()),
            sorted_asks: RefCell::new(Vec::new()),
            bids_cache_valid: Cell::new(false),
            asks_cache_valid: Cell::new(false),
        }
    }

    #[inline]
    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    #[inline]
    pub fn lot_size(&self) -> f64 {
        self.lot_size
    }

    /// Applies a single book update.
    ///
    /// A [`UpdateKind::Snapshot`] update arriving after an incremental one clears the whole book
    /// before being applied. A quantity of zero deletes the level.
    pub fn apply_update(&mut self, update: &BookUpdate) -> Result<(), BacktestError> {
        if update.price <= 0.0 || update.qty < 0.0 {
            return Err(BacktestError::InvalidBookUpdate {
                price: update.price,
                qty: update.qty,
            });
        }
        if update.kind == UpdateKind::Snapshot && self.last_update == UpdateKind::Incremental {
            self.clear();
        }
        let price_ticks = price_to_ticks(update.price, self.tick_size);
        let book = match update.side {
            Side::Buy => &mut self.bid_book,
            Side::Sell => &mut self.ask_book,
        };
        if update.qty == 0.0 {
            book.remove(&price_ticks);
        } else {
            book.insert(price_ticks, update.qty);
        }
        match update.side {
            Side::Buy => self.bids_cache_valid.set(false),
            Side::Sell => self.asks_cache_valid.set(false),
        }
        self.last_update = update.kind;
        Ok(())
    }

    /// Removes all levels from both sides.
    pub fn clear(&mut self) {
        self.bid_book.clear();
        self.ask_book.clear();
        self.bids_cache_valid.set(false);
        self.asks_cache_valid.set(false);
    }

    /// Returns the best (highest) bid price, or `0.0` if the bid side is empty.
    pub fn best_bid(&self) -> Price {
        if self.bid_book.is_empty() {
            return 0.0;
        }
        if self.bids_cache_valid.get() {
            return ticks_to_price(self.sorted_bids.borrow()[0].0, self.tick_size);
        }
        let best = self.bid_book.keys().max().copied().unwrap_or(0);
        ticks_to_price(best, self.tick_size)
    }

    /// Returns the best (lowest) ask price, or `0.0` if the ask side is empty.
    pub fn best_ask(&self) -> Price {
        if self.ask_book.is_empty() {
            return 0.0;
        }
        if self.asks_cache_valid.get() {
            return ticks_to_price(self.sorted_asks.borrow()[0].0, self.tick_size);
        }
        let best = self.ask_book.keys().min().copied().unwrap_or(0);
        ticks_to_price(best, self.tick_size)
    }

    /// Returns `(best_bid + best_ask) / 2`, or `0.0` when either side is empty.
    pub fn mid_price(&self) -> Price {
        if self.bid_book.is_empty() || self.ask_book.is_empty() {
            return 0.0;
        }
        (self.best_bid() + self.best_ask()) / 2.0
    }

    /// Returns the quantity resting at the given price in ticks, or `0.0` if the level does not
    /// exist.
    pub fn depth_at(&self, side: Side, price_ticks: Ticks) -> Qty {
        let book = match side {
            Side::Buy => &self.bid_book,
            Side::Sell => &self.ask_book,
        };
        book.get(&price_ticks).copied().unwrap_or(0.0)
    }

    /// Returns the quantity at the 0-based `level` in best-first order, or `0.0` when out of
    /// range.
    pub fn depth_at_level(&self, side: Side, level: usize) -> Qty {
        self.sorted(side).get(level).map(|&(_, qty)| qty).unwrap_or(0.0)
    }

    /// Returns the price in ticks at the 0-based `level` in best-first order, or `0` when out of
    /// range.
    pub fn price_at_level(&self, side: Side, level: usize) -> Ticks {
        self.sorted(side).get(level).map(|&(ticks, _)| ticks).unwrap_or(0)
    }

    /// Returns all bid levels in descending price order.
    pub fn sorted_bids(&self) -> Vec<(Ticks, Qty)> {
        self.sorted(Side::Buy).clone()
    }

    /// Returns all ask levels in ascending price order.
    pub fn sorted_asks(&self) -> Vec<(Ticks, Qty)> {
        self.sorted(Side::Sell).clone()
    }

    /// Returns the number of bid price levels.
    pub fn bid_levels(&self) -> usize {
        self.bid_book.len()
    }

    /// Returns the number of ask price levels.
    pub fn ask_levels(&self) -> usize {
        self.ask_book.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bid_book.is_empty() && self.ask_book.is_empty()
    }

    pub fn bid_book(&self) -> &HashMap<Ticks, Qty> {
        &self.bid_book
    }

    pub fn ask_book(&self) -> &HashMap<Ticks, Qty> {
        &self.ask_book
    }

    fn sorted(&self, side: Side) -> Ref<'_, Vec<(Ticks, Qty)>> {
        match side {
            Side::Buy => {
                if !self.bids_cache_valid.get() {
                    let mut cache = self.sorted_bids.borrow_mut();
                    cache.clear();
                    cache.extend(self.bid_book.iter().map(|(&ticks, &qty)| (ticks, qty)));
                    cache.sort_unstable_by(|a, b| b.0.cmp(&a.0));
                    self.bids_cache_valid.set(true);
                }
                self.sorted_bids.borrow()
            }
            Side::Sell => {
                if !self.asks_cache_valid.get() {
                    let mut cache = self.sorted_asks.borrow_mut();
                    cache.clear();
                    cache.extend(self.ask_book.iter().map(|(&ticks, &qty)| (ticks, qty)));
                    cache.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                    self.asks_cache_valid.set(true);
                }
                self.sorted_asks.borrow()
            }
        }
    }
}
