use std::collections::HashSet;

use tracing::debug;

use crate::{
    backtest::{BacktestEngine, BacktestError},
    config::{ConfigError, ConfigReader},
    strategy::Strategy,
    types::{AssetId, OrdType, Qty, Ticks, TimeInForce},
    utils::{quantity_to_lot, ticks_to_price},
};

/// Grid-trading parameters. `grid_interval` and `half_spread` are in ticks.
#[derive(Clone, Debug)]
pub struct GridTradingConfig {
    pub grid_num: usize,
    pub grid_interval: Ticks,
    pub half_spread: Ticks,
    pub position_limit: Qty,
    pub notional_order_qty: f64,
}

impl GridTradingConfig {
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = ConfigReader::open(path)?;
        Ok(Self {
            grid_num: reader.get_usize("grid_num")?,
            grid_interval: reader.get_u64("grid_interval")? as Ticks,
            half_spread: reader.get_u64("half_spread")? as Ticks,
            position_limit: reader.get_f64("position_limit")?,
            notional_order_qty: reader.get_f64("notional_order_qty")?,
        })
    }
}

/// A symmetric market-making grid around the local mid price.
///
/// Each step it derives the wanted bid and ask price grids, cancels resting orders that fell off
/// the grid, and posts the missing levels as post-only limit orders. Quoting on a side stops
/// while the position is beyond its limit in that direction.
pub struct GridTrading {
    asset_id: AssetId,
    config: GridTradingConfig,
}

impl GridTrading {
    pub fn new(asset_id: AssetId, config: GridTradingConfig) -> Self {
        Self { asset_id, config }
    }
}

impl Strategy for GridTrading {
    fn on_elapse(&mut self, engine: &mut BacktestEngine) -> Result<(), BacktestError> {
        let depth = engine.depth(self.asset_id);
        let position = engine.position(self.asset_id);
        let orders = engine.orders(self.asset_id);

        let tick_size = depth.tick_size;
        let lot_size = depth.lot_size;
        let best_bid = ticks_to_price(depth.best_bid, tick_size);
        let best_ask = ticks_to_price(depth.best_ask, tick_size);
        if best_bid <= 0.0 || best_ask <= 0.0 || !best_bid.is_finite() || !best_ask.is_finite() {
            debug!(
                asset_id = self.asset_id,
                best_bid, best_ask, "skipping grid setup: incomplete book"
            );
            return Ok(());
        }
        let mid_price = (best_bid + best_ask) / 2.0;
        let grid_step = self.config.grid_interval as f64 * tick_size;

        let mut bid_price =
            ((mid_price - self.config.half_spread as f64 * tick_size) / grid_step).floor()
                * grid_step;
        let mut ask_price =
            ((mid_price + self.config.half_spread as f64 * tick_size) / grid_step).ceil()
                * grid_step;

        let mut new_bid_ticks: HashSet<Ticks> = HashSet::new();
        if position < self.config.position_limit {
            for _ in 0..self.config.grid_num {
                new_bid_ticks.insert((bid_price / tick_size).floor() as Ticks);
                bid_price -= grid_step;
            }
        }
        let mut new_ask_ticks: HashSet<Ticks> = HashSet::new();
        if position > -self.config.position_limit {
            for _ in 0..self.config.grid_num {
                new_ask_ticks.insert((ask_price / tick_size).ceil() as Ticks);
                ask_price += grid_step;
            }
        }

        // Cancel live orders that fell off the grid; remember the ones already on it.
        let mut existing_bid_ticks: HashSet<Ticks> = HashSet::new();
        let mut existing_ask_ticks: HashSet<Ticks> = HashSet::new();
        for order in &orders {
            if !order.active() {
                continue;
            }
            match order.side {
                crate::types::Side::Buy => {
                    let order_ticks = (order.price / tick_size).floor() as Ticks;
                    existing_bid_ticks.insert(order_ticks);
                    if !new_bid_ticks.contains(&order_ticks) {
                        engine.cancel_order(self.asset_id, order.order_id);
                        debug!(
                            asset_id = self.asset_id,
                            order_id = order.order_id,
                            price = order.price,
                            "canceled off-grid bid"
                        );
                    }
                }
                crate::types::Side::Sell => {
                    let order_ticks = (order.price / tick_size).ceil() as Ticks;
                    existing_ask_ticks.insert(order_ticks);
                    if !new_ask_ticks.contains(&order_ticks) {
                        engine.cancel_order(self.asset_id, order.order_id);
                        debug!(
                            asset_id = self.asset_id,
                            order_id = order.order_id,
                            price = order.price,
                            "canceled off-grid ask"
                        );
                    }
                }
            }
        }

        let order_qty = quantity_to_lot(self.config.notional_order_qty / mid_price, lot_size);
        if order_qty <= 0.0 {
            debug!(
                asset_id = self.asset_id,
                order_qty, "skipping order submission: quantity below one lot"
            );
            return Ok(());
        }
        for &ticks in &new_bid_ticks {
            if ticks <= 0 || existing_bid_ticks.contains(&ticks) {
                continue;
            }
            let price = ticks_to_price(ticks, tick_size);
            engine.submit_buy_order(
                self.asset_id,
                price,
                order_qty,
                TimeInForce::GTC,
                OrdType::Limit,
            )?;
        }
        for &ticks in &new_ask_ticks {
            if ticks <= 0 || existing_ask_ticks.contains(&ticks) {
                continue;
            }
            let price = ticks_to_price(ticks, tick_size);
            engine.submit_sell_order(
                self.asset_id,
                price,
                order_qty,
                TimeInForce::GTC,
                OrdType::Limit,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backtest::EngineConfig,
        types::{AssetConfig, BookUpdate, Side, Status, UpdateKind},
    };

    fn book_update(ts: u64, side: Side, price: f64, qty: f64) -> BookUpdate {
        BookUpdate {
            exch_timestamp: ts,
            local_timestamp: ts,
            kind: UpdateKind::Incremental,
            side,
            price,
            qty,
        }
    }

    fn engine(book: Vec<BookUpdate>) -> BacktestEngine {
        BacktestEngine::builder()
            .config(EngineConfig {
                initial_cash: 10_000.0,
                order_entry_latency: 10_000,
                order_response_latency: 10_000,
                market_feed_latency: 0,
            })
            .add_asset_with_streams(
                0,
                AssetConfig {
                    tick_size: 0.5,
                    lot_size: 1.0,
                    ..Default::default()
                },
                book.into_iter(),
                std::iter::empty(),
            )
            .build()
            .unwrap()
    }

    fn config() -> GridTradingConfig {
        GridTradingConfig {
            grid_num: 2,
            grid_interval: 2,
            half_spread: 2,
            position_limit: 5.0,
            notional_order_qty: 1_000.0,
        }
    }

    #[test]
    fn places_symmetric_grid_around_mid() {
        let mut engine = engine(vec![
            book_update(1_000_000, Side::Buy, 99.5, 5.0),
            book_update(1_000_000, Side::Sell, 100.5, 5.0),
        ]);
        engine.elapse(1_100_000);

        let mut strategy = GridTrading::new(0, config());
        strategy.on_elapse(&mut engine).unwrap();
        engine.elapse(100_000);

        let orders = engine.orders(0);
        assert_eq!(orders.len(), 4);
        let mut bid_prices: Vec<f64> = orders
            .iter()
            .filter(|order| order.side == Side::Buy)
            .map(|order| order.price)
            .collect();
        bid_prices.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(bid_prices, vec![98.0, 99.0]);
        let mut ask_prices: Vec<f64> = orders
            .iter()
            .filter(|order| order.side == Side::Sell)
            .map(|order| order.price)
            .collect();
        ask_prices.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(ask_prices, vec![101.0, 102.0]);
        assert!(orders.iter().all(|order| order.status == Status::Active));
        // notional 1000 / mid 100, rounded to the 1.0 lot
        assert!(orders.iter().all(|order| order.qty == 10.0));
    }

    #[test]
    fn requoting_on_an_unchanged_grid_is_a_no_op() {
        let mut engine = engine(vec![
            book_update(1_000_000, Side::Buy, 99.5, 5.0),
            book_update(1_000_000, Side::Sell, 100.5, 5.0),
        ]);
        engine.elapse(1_100_000);

        let mut strategy = GridTrading::new(0, config());
        strategy.on_elapse(&mut engine).unwrap();
        engine.elapse(100_000);
        assert_eq!(engine.orders(0).len(), 4);

        strategy.on_elapse(&mut engine).unwrap();
        engine.elapse(100_000);
        assert_eq!(engine.orders(0).len(), 4);
    }

    #[test]
    fn position_limit_stops_one_side() {
        let mut engine = engine(vec![
            book_update(1_000_000, Side::Buy, 99.5, 5.0),
            book_update(1_000_000, Side::Sell, 100.5, 5.0),
        ]);
        engine.elapse(1_100_000);

        let mut limited = config();
        limited.position_limit = 0.0;
        let mut strategy = GridTrading::new(0, limited);
        strategy.on_elapse(&mut engine).unwrap();
        engine.elapse(100_000);
        assert!(engine.orders(0).is_empty());
    }

    #[test]
    fn skips_quoting_on_incomplete_book() {
        let mut engine = engine(vec![book_update(1_000_000, Side::Sell, 100.5, 5.0)]);
        engine.elapse(1_100_000);

        let mut strategy = GridTrading::new(0, config());
        strategy.on_elapse(&mut engine).unwrap();
        engine.elapse(100_000);
        assert!(engine.orders(0).is_empty());
    }

    #[test]
    fn cancels_orders_that_fell_off_the_grid() {
        let mut engine = engine(vec![
            book_update(1_000_000, Side::Buy, 99.5, 5.0),
            book_update(1_000_000, Side::Sell, 100.5, 5.0),
            // Mid moves up by two ticks later on.
            book_update(1_500_000, Side::Buy, 100.5, 5.0),
            book_update(1_500_000, Side::Sell, 101.5, 5.0),
            book_update(1_500_000, Side::Buy, 99.5, 0.0),
            book_update(1_500_000, Side::Sell, 100.5, 0.0),
        ]);
        engine.elapse(1_100_000);

        let mut strategy = GridTrading::new(0, config());
        strategy.on_elapse(&mut engine).unwrap();
        engine.elapse(500_000);

        // Mid is now 101: the grid shifts to bids {99, 100} and asks {102, 103}.
        strategy.on_elapse(&mut engine).unwrap();
        engine.elapse(100_000);
        engine.clear_inactive_orders();

        let orders = engine.orders(0);
        let mut prices: Vec<f64> = orders.iter().map(|order| order.price).collect();
        prices.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(prices, vec![99.0, 100.0, 102.0, 103.0]);
    }
}
