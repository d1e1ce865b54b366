use std::{collections::HashMap, io::Error as IoError};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use crate::backtest::{
    exchange::ExchangeMatcher,
    scheduler::{Action, DelayedAction, Scheduler},
    state::{State, StateValues},
};
use crate::{
    feed::{BookStreamReader, MarketFeed, TradeStreamReader},
    orderbook::OrderBook,
    types::{
        AssetConfig,
        AssetId,
        BookUpdate,
        BuildError,
        Depth,
        Event,
        OrdType,
        Order,
        OrderEventKind,
        OrderId,
        OrderUpdate,
        Price,
        Qty,
        Side,
        TimeInForce,
        Timestamp,
        Trade,
    },
    utils::OrderIdGenerator,
};

/// The simulated exchange matching engine.
pub mod exchange;

/// The delayed-action scheduler driving `elapse`.
pub mod scheduler;

/// Local position and trading-statistics accounting.
pub mod state;

/// Equity sampling and performance metrics.
pub mod recorder;

/// Errors that can occur during backtesting.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("order request is invalid: {0}")]
    InvalidOrderRequest(&'static str),
    #[error("order related to a given order id already exists")]
    OrderIdExist,
    #[error("order not found")]
    OrderNotFound,
    #[error("invalid book update: price={price}, qty={qty}")]
    InvalidBookUpdate { price: f64, qty: f64 },
    #[error("end of data")]
    EndOfData,
    #[error("data error: {0:?}")]
    DataError(#[from] IoError),
}

/// Engine-level configuration: seed cash and the three one-way latency budgets in microseconds.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub initial_cash: f64,
    pub order_entry_latency: Timestamp,
    pub order_response_latency: Timestamp,
    pub market_feed_latency: Timestamp,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_cash: 1_000.0,
            order_entry_latency: 25_000,
            order_response_latency: 25_000,
            market_feed_latency: 50_000,
        }
    }
}

enum AssetStreams {
    Files,
    Streams {
        book: Box<dyn Iterator<Item = BookUpdate>>,
        trade: Box<dyn Iterator<Item = Trade>>,
    },
}

struct AssetEntry {
    asset_id: AssetId,
    config: AssetConfig,
    streams: AssetStreams,
}

/// [`BacktestEngine`] builder.
#[derive(Default)]
pub struct BacktestEngineBuilder {
    config: EngineConfig,
    assets: Vec<AssetEntry>,
}

impl BacktestEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the engine configuration.
    pub fn config(self, config: EngineConfig) -> Self {
        Self { config, ..self }
    }

    /// Adds an asset whose book-update and trade streams are read from the CSV files named in its
    /// configuration.
    pub fn add_asset(mut self, asset_id: AssetId, config: AssetConfig) -> Self {
        self.assets.push(AssetEntry {
            asset_id,
            config,
            streams: AssetStreams::Files,
        });
        self
    }

    /// Adds an asset fed from caller-supplied streams; used for tests and custom data sources.
    pub fn add_asset_with_streams<B, T>(
        mut self,
        asset_id: AssetId,
        config: AssetConfig,
        book: B,
        trade: T,
    ) -> Self
    where
        B: Iterator<Item = BookUpdate> + 'static,
        T: Iterator<Item = Trade> + 'static,
    {
        self.assets.push(AssetEntry {
            asset_id,
            config,
            streams: AssetStreams::Streams {
                book: Box::new(book),
                trade: Box::new(trade),
            },
        });
        self
    }

    /// Builds a [`BacktestEngine`].
    pub fn build(self) -> Result<BacktestEngine, BuildError> {
        if self.assets.is_empty() {
            return Err(BuildError::BuilderIncomplete("assets"));
        }

        let mut exchange = ExchangeMatcher::new(self.config.order_response_latency);
        let mut feed = MarketFeed::new();
        let mut local_books = HashMap::new();
        let mut states = HashMap::new();
        let mut asset_configs = HashMap::new();

        for entry in self.assets {
            let AssetEntry {
                asset_id,
                config,
                streams,
            } = entry;
            if asset_configs.contains_key(&asset_id) {
                return Err(BuildError::Duplicate(asset_id));
            }
            if config.tick_size <= 0.0 {
                return Err(BuildError::InvalidArgument("tick_size must be positive"));
            }
            if config.lot_size <= 0.0 {
                return Err(BuildError::InvalidArgument("lot_size must be positive"));
            }

            match streams {
                AssetStreams::Files => {
                    let book = BookStreamReader::open(
                        &config.book_update_file,
                        self.config.market_feed_latency,
                    )
                    .map_err(|err| BuildError::Error(err.into()))?;
                    let trade = TradeStreamReader::open(
                        &config.trade_file,
                        self.config.market_feed_latency,
                    )
                    .map_err(|err| BuildError::Error(err.into()))?;
                    feed.add_stream(asset_id, book, trade);
                }
                AssetStreams::Streams { book, trade } => {
                    feed.add_stream(asset_id, book, trade);
                }
            }

            exchange.add_asset(asset_id, config.tick_size, config.lot_size);
            local_books.insert(asset_id, OrderBook::new(config.tick_size, config.lot_size));
            states.insert(asset_id, State::new(config.maker_fee, config.taker_fee));
            asset_configs.insert(asset_id, config);
        }

        // Start a second before the first feed event, aligned down to a whole second.
        let current_time = match feed.peek_timestamp() {
            Some(first) => (first.saturating_sub(1_000_000) / 1_000_000) * 1_000_000,
            None => 0,
        };

        info!(
            assets = asset_configs.len(),
            order_entry_latency = self.config.order_entry_latency,
            order_response_latency = self.config.order_response_latency,
            market_feed_latency = self.config.market_feed_latency,
            start_time = current_time,
            "backtest engine initialized"
        );

        Ok(BacktestEngine {
            current_time,
            order_entry_latency: self.config.order_entry_latency,
            order_response_latency: self.config.order_response_latency,
            market_feed_latency: self.config.market_feed_latency,
            exchange,
            feed,
            scheduler: Scheduler::new(),
            local_cash: self.config.initial_cash,
            local_books,
            local_orders: HashMap::new(),
            states,
            asset_configs,
            order_ids: OrderIdGenerator::new(),
        })
    }
}

/// The event-driven simulation engine.
///
/// Composes the market feed, the exchange matching engine, and the delayed-action scheduler, and
/// maintains the latency-delayed local view a strategy observes: a shadow order book per asset,
/// the active-order table, cash, positions, and trading statistics.
///
/// The exchange sees feed events at their exchange timestamps; the local view catches up only
/// when the corresponding delayed actions execute. Strategy actions submitted at time `T` reach
/// the exchange no earlier than `T + order_entry_latency`, and their effects become visible
/// locally no earlier than `T + order_entry_latency + order_response_latency`.
pub struct BacktestEngine {
    current_time: Timestamp,
    order_entry_latency: Timestamp,
    order_response_latency: Timestamp,
    market_feed_latency: Timestamp,
    exchange: ExchangeMatcher,
    feed: MarketFeed,
    scheduler: Scheduler,
    local_cash: f64,
    local_books: HashMap<AssetId, OrderBook>,
    local_orders: HashMap<OrderId, Order>,
    states: HashMap<AssetId, State>,
    asset_configs: HashMap<AssetId, AssetConfig>,
    order_ids: OrderIdGenerator,
}

impl BacktestEngine {
    pub fn builder() -> BacktestEngineBuilder {
        BacktestEngineBuilder::new()
    }

    /// Returns the current simulation time in microseconds.
    #[inline]
    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    /// Returns the local-to-exchange order entry latency in microseconds.
    #[inline]
    pub fn order_entry_latency(&self) -> Timestamp {
        self.order_entry_latency
    }

    /// Returns the exchange-to-local order response latency in microseconds.
    #[inline]
    pub fn order_response_latency(&self) -> Timestamp {
        self.order_response_latency
    }

    /// Returns the exchange-to-local market data latency in microseconds.
    #[inline]
    pub fn market_feed_latency(&self) -> Timestamp {
        self.market_feed_latency
    }

    /// Places a buy order and returns its id. The order reaches the exchange after entry
    /// latency.
    pub fn submit_buy_order(
        &mut self,
        asset_id: AssetId,
        price: Price,
        qty: Qty,
        time_in_force: TimeInForce,
        order_type: OrdType,
    ) -> Result<OrderId, BacktestError> {
        self.submit_order(asset_id, Side::Buy, price, qty, time_in_force, order_type)
    }

    /// Places a sell order and returns its id. The order reaches the exchange after entry
    /// latency.
    pub fn submit_sell_order(
        &mut self,
        asset_id: AssetId,
        price: Price,
        qty: Qty,
        time_in_force: TimeInForce,
        order_type: OrdType,
    ) -> Result<OrderId, BacktestError> {
        self.submit_order(asset_id, Side::Sell, price, qty, time_in_force, order_type)
    }

    fn submit_order(
        &mut self,
        asset_id: AssetId,
        side: Side,
        price: Price,
        qty: Qty,
        time_in_force: TimeInForce,
        order_type: OrdType,
    ) -> Result<OrderId, BacktestError> {
        assert!(
            self.asset_configs.contains_key(&asset_id),
            "unknown asset {asset_id}"
        );
        if qty <= 0.0 {
            return Err(BacktestError::InvalidOrderRequest(
                "quantity must be positive",
            ));
        }
        if order_type == OrdType::Limit && price <= 0.0 {
            return Err(BacktestError::InvalidOrderRequest(
                "limit price must be positive",
            ));
        }

        let exch_timestamp = self.current_time + self.order_entry_latency;
        let order = Order::new(
            self.order_ids.next_id(),
            asset_id,
            side,
            price,
            qty,
            order_type,
            time_in_force,
            self.current_time,
            exch_timestamp,
        );
        let order_id = order.order_id;
        debug!(
            asset_id,
            order_id,
            side = AsRef::<str>::as_ref(&side),
            price,
            qty,
            local_timestamp = self.current_time,
            "order submitted"
        );
        let action = match side {
            Side::Buy => Action::SubmitBuy(order),
            Side::Sell => Action::SubmitSell(order),
        };
        self.scheduler.push(DelayedAction {
            asset_id,
            execute_time: exch_timestamp,
            action,
        });
        Ok(order_id)
    }

    /// Requests cancellation of an order. The request is itself a scheduled action that reaches
    /// the exchange after entry latency.
    pub fn cancel_order(&mut self, asset_id: AssetId, order_id: OrderId) {
        let execute_time = self.current_time + self.order_entry_latency;
        self.scheduler.push(DelayedAction {
            asset_id,
            execute_time,
            action: Action::Cancel(order_id),
        });
    }

    /// Sweeps terminal-status orders from the exchange-side structures and the local
    /// active-order table. Call between `elapse` steps.
    pub fn clear_inactive_orders(&mut self) {
        debug!(
            current_time = self.current_time,
            "clearing inactive orders"
        );
        let asset_ids: Vec<AssetId> = self.asset_configs.keys().copied().collect();
        for asset_id in asset_ids {
            self.exchange.clear_inactive_orders(asset_id);
        }
        self.local_orders.retain(|_, order| !order.terminal());
    }

    /// Advances the simulation clock by `duration` microseconds, interleaving market events and
    /// scheduled actions strictly by timestamp. Returns `true`; the clock always reaches
    /// `current_time + duration` even after feed exhaustion.
    pub fn elapse(&mut self, duration: Timestamp) -> bool {
        let interval_end = self.current_time + duration;
        while self.current_time < interval_end {
            let next_event = self.feed.peek_timestamp();
            let cut = next_event.unwrap_or(Timestamp::MAX).min(interval_end);
            while let Some(action) = self.scheduler.pop_before(cut) {
                self.dispatch(action);
            }
            match next_event {
                Some(t_feed) if t_feed < interval_end => {
                    let (asset_id, event) =
                        self.feed.next_event().expect("peeked event disappeared");
                    match event {
                        Event::Trade(trade) => {
                            self.exchange.handle_trade(asset_id, &trade);
                        }
                        Event::Book(update) => {
                            self.exchange.handle_book_update(asset_id, &update);
                            // The local shadow book catches up with feed latency.
                            self.scheduler.push(DelayedAction {
                                asset_id,
                                execute_time: update.local_timestamp,
                                action: Action::LocalBookUpdate(update),
                            });
                        }
                    }
                    self.drain_exchange();
                    self.current_time = self.current_time.max(t_feed);
                }
                _ => {
                    self.current_time = interval_end;
                }
            }
        }
        self.current_time = interval_end;
        debug!(current_time = self.current_time, "elapse complete");
        true
    }

    /// Returns this asset's orders as the local view knows them: acknowledged or filled
    /// snapshots not yet swept by [`clear_inactive_orders`](Self::clear_inactive_orders).
    pub fn orders(&self, asset_id: AssetId) -> Vec<Order> {
        self.local_orders
            .values()
            .filter(|order| order.asset_id == asset_id)
            .cloned()
            .collect()
    }

    /// Returns the local position for an asset.
    pub fn position(&self, asset_id: AssetId) -> Qty {
        self.states
            .get(&asset_id)
            .expect("unknown asset")
            .values()
            .position
    }

    /// Returns the current cash balance.
    #[inline]
    pub fn cash(&self) -> f64 {
        self.local_cash
    }

    /// Returns `cash + Σ position · local mid price` over all assets.
    pub fn equity(&self) -> f64 {
        let mut value = self.local_cash;
        for (asset_id, state) in self.states.iter() {
            let book = self.local_books.get(asset_id).expect("unknown asset");
            value += state.values().position * book.mid_price();
        }
        value
    }

    /// Returns a snapshot of the local (latency-delayed) book for an asset.
    pub fn depth(&self, asset_id: AssetId) -> Depth {
        let book = self.local_books.get(&asset_id).expect("unknown asset");
        Depth {
            best_bid: book.price_at_level(Side::Buy, 0),
            bid_qty: book.depth_at_level(Side::Buy, 0),
            best_ask: book.price_at_level(Side::Sell, 0),
            ask_qty: book.depth_at_level(Side::Sell, 0),
            bid_depth: book.bid_book().clone(),
            ask_depth: book.ask_book().clone(),
            tick_size: book.tick_size(),
            lot_size: book.lot_size(),
        }
    }

    /// Returns the per-asset trading statistics.
    pub fn state_values(&self, asset_id: AssetId) -> &StateValues {
        self.states.get(&asset_id).expect("unknown asset").values()
    }

    /// Returns the registered asset ids in ascending order.
    pub fn asset_ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.asset_configs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the configuration of an asset.
    pub fn asset_config(&self, asset_id: AssetId) -> &AssetConfig {
        self.asset_configs.get(&asset_id).expect("unknown asset")
    }

    fn dispatch(&mut self, delayed: DelayedAction) {
        self.current_time = self.current_time.max(delayed.execute_time);
        match delayed.action {
            Action::SubmitBuy(order) | Action::SubmitSell(order) => {
                self.exchange.submit(delayed.asset_id, order);
            }
            Action::Cancel(order_id) => {
                self.exchange
                    .cancel(delayed.asset_id, order_id, self.current_time);
            }
            Action::LocalProcessFill(fill) => {
                self.process_fill_local(&fill);
            }
            Action::LocalBookUpdate(update) => {
                let book = self
                    .local_books
                    .get_mut(&delayed.asset_id)
                    .expect("unknown asset");
                if let Err(error) = book.apply_update(&update) {
                    warn!(asset_id = delayed.asset_id, %error, "skipped invalid local book update");
                }
            }
            Action::LocalOrderUpdate(update) => {
                self.process_order_update_local(update);
            }
        }
        self.drain_exchange();
    }

    /// Schedules the exchange's outgoing fills and order notifications for local delivery at
    /// their response-latency timestamps. Called after every dispatch so the queues never
    /// accumulate across events.
    fn drain_exchange(&mut self) {
        for fill in self.exchange.drain_fills() {
            self.scheduler.push(DelayedAction {
                asset_id: fill.asset_id,
                execute_time: fill.local_timestamp,
                action: Action::LocalProcessFill(fill),
            });
        }
        for update in self.exchange.drain_order_updates() {
            self.scheduler.push(DelayedAction {
                asset_id: update.asset_id,
                execute_time: update.local_timestamp,
                action: Action::LocalOrderUpdate(update),
            });
        }
    }

    fn process_fill_local(&mut self, fill: &crate::types::Fill) {
        debug!(
            asset_id = fill.asset_id,
            order_id = fill.order_id,
            price = fill.price,
            qty = fill.qty,
            local_timestamp = fill.local_timestamp,
            "fill processed locally"
        );
        let state = self.states.get_mut(&fill.asset_id).expect("unknown asset");
        self.local_cash += state.apply_fill(fill);
    }

    fn process_order_update_local(&mut self, update: OrderUpdate) {
        debug!(
            asset_id = update.asset_id,
            order_id = update.order_id,
            kind = ?update.kind,
            local_timestamp = update.local_timestamp,
            "order update received locally"
        );
        match update.kind {
            OrderEventKind::Acknowledged | OrderEventKind::Fill => {
                self.local_orders.insert(update.order_id, update.order);
            }
            OrderEventKind::Canceled | OrderEventKind::Rejected => {
                self.local_orders.remove(&update.order_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Status, UpdateKind};

    fn book_update(ts: Timestamp, local_ts: Timestamp, side: Side, price: f64, qty: f64) -> BookUpdate {
        BookUpdate {
            exch_timestamp: ts,
            local_timestamp: local_ts,
            kind: UpdateKind::Incremental,
            side,
            price,
            qty,
        }
    }

    fn trade(ts: Timestamp, local_ts: Timestamp, side: Side, price: f64, qty: f64) -> Trade {
        Trade {
            exch_timestamp: ts,
            local_timestamp: local_ts,
            trade_id: ts,
            side,
            price,
            qty,
        }
    }

    fn asset_config() -> AssetConfig {
        AssetConfig {
            tick_size: 0.5,
            lot_size: 1.0,
            ..Default::default()
        }
    }

    fn engine_with(
        config: EngineConfig,
        book: Vec<BookUpdate>,
        trades: Vec<Trade>,
    ) -> BacktestEngine {
        BacktestEngine::builder()
            .config(config)
            .add_asset_with_streams(0, asset_config(), book.into_iter(), trades.into_iter())
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_bad_configs() {
        let result = BacktestEngine::builder().build();
        assert!(matches!(result, Err(BuildError::BuilderIncomplete(_))));

        let mut config = asset_config();
        config.tick_size = 0.0;
        let result = BacktestEngine::builder()
            .add_asset_with_streams(0, config, std::iter::empty(), std::iter::empty())
            .build();
        assert!(matches!(result, Err(BuildError::InvalidArgument(_))));

        let result = BacktestEngine::builder()
            .add_asset_with_streams(0, asset_config(), std::iter::empty(), std::iter::empty())
            .add_asset_with_streams(0, asset_config(), std::iter::empty(), std::iter::empty())
            .build();
        assert!(matches!(result, Err(BuildError::Duplicate(0))));
    }

    #[test]
    fn rejects_invalid_order_parameters() {
        let mut engine = engine_with(EngineConfig::default(), vec![], vec![]);
        assert!(engine
            .submit_buy_order(0, 100.0, 0.0, TimeInForce::GTC, OrdType::Limit)
            .is_err());
        assert!(engine
            .submit_buy_order(0, 0.0, 1.0, TimeInForce::GTC, OrdType::Limit)
            .is_err());
        // Market orders carry no meaningful price.
        assert!(engine
            .submit_sell_order(0, 0.0, 1.0, TimeInForce::IOC, OrdType::Market)
            .is_ok());
    }

    #[test]
    fn clock_is_monotonic() {
        let mut engine = engine_with(
            EngineConfig::default(),
            vec![book_update(1_000_000, 1_000_000, Side::Sell, 101.0, 2.0)],
            vec![],
        );
        let mut last = engine.current_time();
        for _ in 0..5 {
            engine.elapse(300_000);
            assert!(engine.current_time() >= last);
            last = engine.current_time();
        }
    }

    // End-to-end latency: entry 25ms, response 10ms. A market order submitted at T=0 produces a
    // fill whose local effects land at exactly 35ms.
    #[test]
    fn fill_effects_arrive_after_entry_plus_response_latency() {
        let config = EngineConfig {
            initial_cash: 1_000.0,
            order_entry_latency: 25_000,
            order_response_latency: 10_000,
            market_feed_latency: 0,
        };
        let mut engine = engine_with(
            config,
            vec![book_update(10, 10, Side::Sell, 101.0, 2.0)],
            vec![],
        );
        assert_eq!(engine.current_time(), 0);

        engine
            .submit_buy_order(0, 0.0, 1.0, TimeInForce::IOC, OrdType::Market)
            .unwrap();

        // The window ends exactly at the fill's local timestamp; delivery is strictly-before.
        engine.elapse(35_000);
        assert_eq!(engine.current_time(), 35_000);
        assert_eq!(engine.position(0), 0.0);
        assert_eq!(engine.cash(), 1_000.0);

        engine.elapse(1_000);
        assert_eq!(engine.position(0), 1.0);
        assert_eq!(engine.cash(), 1_000.0 - 101.0);
    }

    #[test]
    fn local_book_lags_exchange_book_by_feed_latency() {
        let config = EngineConfig {
            initial_cash: 0.0,
            order_entry_latency: 25_000,
            order_response_latency: 25_000,
            market_feed_latency: 50_000,
        };
        let mut engine = engine_with(
            config,
            vec![
                book_update(1_000_000, 1_050_000, Side::Sell, 101.0, 2.0),
                book_update(1_000_000, 1_050_000, Side::Buy, 100.0, 1.0),
            ],
            vec![],
        );

        // Cross the exchange timestamps but not the local ones.
        engine.elapse(1_020_000);
        let depth = engine.depth(0);
        assert_eq!(depth.best_ask, 0);
        assert_eq!(depth.best_bid, 0);

        // Cross the local timestamps.
        engine.elapse(40_000);
        let depth = engine.depth(0);
        assert_eq!(depth.best_ask, 202);
        assert_eq!(depth.best_bid, 200);
        assert_eq!(depth.ask_qty, 2.0);
        assert_eq!(depth.mid_price(), 100.5);
    }

    #[test]
    fn maker_order_lifecycle_and_cash_identity() {
        let config = EngineConfig {
            initial_cash: 1_000.0,
            order_entry_latency: 10_000,
            order_response_latency: 10_000,
            market_feed_latency: 0,
        };
        let fee = 0.0002;
        let mut asset = asset_config();
        asset.maker_fee = fee;
        let mut engine = BacktestEngine::builder()
            .config(config)
            .add_asset_with_streams(
                0,
                asset,
                vec![
                    book_update(1_000_000, 1_000_000, Side::Sell, 101.0, 2.0),
                    book_update(1_000_000, 1_000_000, Side::Buy, 99.0, 1.0),
                ]
                .into_iter(),
                vec![trade(1_200_000, 1_200_000, Side::Sell, 100.0, 1.0)].into_iter(),
            )
            .build()
            .unwrap();

        engine.elapse(1_100_000);
        let order_id = engine
            .submit_buy_order(0, 100.0, 1.0, TimeInForce::GTC, OrdType::Limit)
            .unwrap();

        // Acknowledgement arrives after entry + response latency.
        engine.elapse(30_000);
        let orders = engine.orders(0);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, order_id);
        assert_eq!(orders[0].status, Status::Active);

        // The trade at 1.2s prints at our level; the fill lands locally at 1.21s.
        engine.elapse(200_000);
        assert_eq!(engine.position(0), 1.0);
        let expected_cash = 1_000.0 - 100.0 - 100.0 * fee;
        assert!((engine.cash() - expected_cash).abs() < 1e-8);
        let orders = engine.orders(0);
        assert_eq!(orders[0].status, Status::Filled);
        assert_eq!(orders[0].filled_qty, 1.0);

        // cash + position * local_mid = equity
        let depth = engine.depth(0);
        let expected_equity = engine.cash() + engine.position(0) * depth.mid_price();
        assert!((engine.equity() - expected_equity).abs() < 1e-8);

        let values = engine.state_values(0);
        assert_eq!(values.num_trades, 1);
        assert_eq!(values.trading_volume, 1.0);
        assert_eq!(values.trading_value, 100.0);

        // Terminal snapshots are swept on request, and sweeping twice is the same as once.
        engine.clear_inactive_orders();
        assert!(engine.orders(0).is_empty());
        engine.clear_inactive_orders();
        assert!(engine.orders(0).is_empty());
    }

    #[test]
    fn rejected_post_only_order_disappears_from_local_view() {
        let config = EngineConfig {
            initial_cash: 0.0,
            order_entry_latency: 10_000,
            order_response_latency: 10_000,
            market_feed_latency: 0,
        };
        let mut engine = engine_with(
            config,
            vec![book_update(1_000_000, 1_000_000, Side::Sell, 101.0, 2.0)],
            vec![],
        );

        engine.elapse(1_100_000);
        // Would cross the best ask: rejected on the exchange, never acknowledged locally.
        engine
            .submit_buy_order(0, 101.5, 1.0, TimeInForce::GTC, OrdType::Limit)
            .unwrap();
        engine.elapse(100_000);
        assert!(engine.orders(0).is_empty());
        assert_eq!(engine.position(0), 0.0);
    }

    #[test]
    fn cancel_request_takes_entry_latency() {
        let config = EngineConfig {
            initial_cash: 0.0,
            order_entry_latency: 10_000,
            order_response_latency: 10_000,
            market_feed_latency: 0,
        };
        let mut engine = engine_with(
            config,
            vec![
                book_update(1_000_000, 1_000_000, Side::Sell, 101.0, 2.0),
                book_update(1_000_000, 1_000_000, Side::Buy, 99.0, 1.0),
            ],
            vec![],
        );

        engine.elapse(1_100_000);
        let order_id = engine
            .submit_buy_order(0, 100.0, 1.0, TimeInForce::GTC, OrdType::Limit)
            .unwrap();
        engine.elapse(30_000);
        assert_eq!(engine.orders(0).len(), 1);

        engine.cancel_order(0, order_id);
        // Cancel reaches the exchange after entry latency and the notification comes back after
        // response latency; just before that the order is still visible.
        engine.elapse(15_000);
        assert_eq!(engine.orders(0).len(), 1);
        engine.elapse(10_000);
        assert!(engine.orders(0).is_empty());
    }

    #[test]
    fn feed_exhaustion_still_advances_the_clock() {
        let mut engine = engine_with(
            EngineConfig::default(),
            vec![book_update(1_000_000, 1_050_000, Side::Sell, 101.0, 2.0)],
            vec![],
        );
        assert!(engine.elapse(10_000_000));
        let end = engine.current_time();
        assert!(engine.elapse(1_000_000));
        assert_eq!(engine.current_time(), end + 1_000_000);
    }
}
