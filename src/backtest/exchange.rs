use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    orderbook::OrderBook,
    types::{
        AssetId,
        BookUpdate,
        Fill,
        OrdType,
        Order,
        OrderEventKind,
        OrderId,
        OrderUpdate,
        Qty,
        Side,
        Status,
        Ticks,
        TimeInForce,
        Timestamp,
        Trade,
    },
    utils::price_to_ticks,
};

/// Our resting orders by price level. At most one order rests per level; a later order placed at
/// an occupied level replaces the slot.
#[derive(Default)]
struct MakerBook {
    bid_orders: HashMap<Ticks, OrderId>,
    ask_orders: HashMap<Ticks, OrderId>,
}

impl MakerBook {
    fn side(&self, side: Side) -> &HashMap<Ticks, OrderId> {
        match side {
            Side::Buy => &self.bid_orders,
            Side::Sell => &self.ask_orders,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut HashMap<Ticks, OrderId> {
        match side {
            Side::Buy => &mut self.bid_orders,
            Side::Sell => &mut self.ask_orders,
        }
    }
}

struct ExchangeAsset {
    book: OrderBook,
    maker_book: MakerBook,
    active_orders: Vec<OrderId>,
}

/// The simulated exchange matching engine.
///
/// Holds the exchange-time order book per asset, executes taker orders against it, rests
/// post-only maker orders, and fills them from public trade imprints gated by a probabilistic
/// queue-position estimate. Resting orders are owned exclusively by the `orders` arena; the maker
/// book and per-asset active lists hold ids only.
///
/// Taker executions never consume book liquidity; the book mirrors the feed and is mutated only
/// by feed updates.
///
/// Outgoing `fills` and `order_updates` are drained by the engine after every dispatch.
pub struct ExchangeMatcher {
    assets: HashMap<AssetId, ExchangeAsset>,
    orders: HashMap<OrderId, Order>,
    fills: Vec<Fill>,
    order_updates: Vec<OrderUpdate>,
    order_response_latency: Timestamp,
}

/// Log-scaled prior for apportioning a depth reduction between the queue ahead of and behind a
/// resting order.
#[inline]
fn f(x: f64) -> f64 {
    x.ln_1p()
}

impl ExchangeMatcher {
    pub fn new(order_response_latency: Timestamp) -> Self {
        Self {
            assets: HashMap::new(),
            orders: HashMap::new(),
            fills: Vec::new(),
            order_updates: Vec::new(),
            order_response_latency,
        }
    }

    /// Registers an asset and its exchange-side order book.
    pub fn add_asset(&mut self, asset_id: AssetId, tick_size: f64, lot_size: f64) {
        self.assets.insert(
            asset_id,
            ExchangeAsset {
                book: OrderBook::new(tick_size, lot_size),
                maker_book: MakerBook::default(),
                active_orders: Vec::new(),
            },
        );
    }

    /// Returns the exchange-time order book for an asset.
    pub fn book(&self, asset_id: AssetId) -> &OrderBook {
        &self.assets.get(&asset_id).expect("unknown asset").book
    }

    /// Returns a resting or recently terminal order by id.
    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Routes a newly arrived order to the execution path selected by its type and
    /// time-in-force.
    pub fn submit(&mut self, asset_id: AssetId, order: Order) {
        debug!(
            asset_id,
            order_id = order.order_id,
            side = AsRef::<str>::as_ref(&order.side),
            price = order.price,
            qty = order.qty,
            exch_timestamp = order.exch_timestamp,
            "order received"
        );
        match order.order_type {
            OrdType::Market => self.execute_market_order(asset_id, order),
            OrdType::Limit => match order.time_in_force {
                TimeInForce::FOK => self.execute_fok_order(asset_id, order),
                TimeInForce::IOC => self.execute_ioc_order(asset_id, order),
                TimeInForce::GTC => self.place_maker_order(asset_id, order),
            },
        }
    }

    /// Flips a resting order to [`Status::Canceled`] and emits the cancel notification. The
    /// order stays in the maker book until [`clear_inactive_orders`](Self::clear_inactive_orders)
    /// sweeps it; a canceled slot can no longer fill.
    pub fn cancel(&mut self, asset_id: AssetId, order_id: OrderId, now: Timestamp) {
        let snapshot = match self.orders.get_mut(&order_id) {
            Some(order) if !order.terminal() => {
                order.status = Status::Canceled;
                Some(order.clone())
            }
            Some(_) => {
                warn!(asset_id, order_id, "cancel ignored: order already terminal");
                None
            }
            None => {
                warn!(asset_id, order_id, "cancel ignored: unknown order");
                None
            }
        };
        if let Some(snapshot) = snapshot {
            debug!(asset_id, order_id, exch_timestamp = now, "order canceled");
            self.push_update(OrderEventKind::Canceled, snapshot, now);
        }
    }

    /// Applies a feed book update to the exchange book, first advancing the queue-position
    /// estimate of a resting order at that level when the level shrinks.
    ///
    /// With prior depth `Q`, remaining order quantity `S`, current estimate `V` and reduction
    /// `ΔQ < 0`, the estimate becomes `max(V + p·ΔQ, 0)` where
    /// `p = f(V) / (f(V) + f(max(Q − S − V, 0)))` and `f(x) = ln(1 + x)`.
    pub fn handle_book_update(&mut self, asset_id: AssetId, update: &BookUpdate) {
        let asset = self.assets.get_mut(&asset_id).expect("unknown asset");
        let price_ticks = price_to_ticks(update.price, asset.book.tick_size());
        let prior_qty = asset.book.depth_at(update.side, price_ticks);
        let delta = update.qty - prior_qty;
        if delta < 0.0 {
            if let Some(&order_id) = asset.maker_book.side(update.side).get(&price_ticks) {
                if let Some(order) = self.orders.get_mut(&order_id) {
                    let open_qty = order.leaves_qty();
                    let ahead = order.queue_est;
                    let behind = (prior_qty - open_qty - ahead).max(0.0);
                    let p = if f(ahead) > 0.0 {
                        f(ahead) / (f(ahead) + f(behind))
                    } else {
                        0.0
                    };
                    order.queue_est = (ahead + p * delta).max(0.0);
                }
            }
        }
        if let Err(error) = asset.book.apply_update(update) {
            warn!(asset_id, %error, "skipped invalid book update");
        }
    }

    /// Fills the resting order at the trade's price level from a public trade imprint.
    ///
    /// Only the slot on the side opposite the taker is considered, the order must have been
    /// acknowledged before the trade printed, and it fills only once its queue estimate has
    /// reached zero. At most `trade.qty` executes against the single slot at the level.
    pub fn handle_trade(&mut self, asset_id: AssetId, trade: &Trade) {
        let asset = self.assets.get(&asset_id).expect("unknown asset");
        let price_ticks = price_to_ticks(trade.price, asset.book.tick_size());
        let maker_side = trade.side.opposite();
        let Some(&order_id) = asset.maker_book.side(maker_side).get(&price_ticks) else {
            debug!(
                asset_id,
                price = trade.price,
                "no resting order at trade price"
            );
            return;
        };
        let Some(order) = self.orders.get_mut(&order_id) else {
            return;
        };
        if order.exch_timestamp >= trade.exch_timestamp {
            // Cannot be filled by a trade printed before our acknowledgement.
            return;
        }
        if order.queue_est == 0.0 && order.filled_qty < order.qty {
            let fill_qty = trade.qty.min(order.leaves_qty());
            order.filled_qty += fill_qty;
            order.status = if order.filled_qty >= order.qty {
                Status::Filled
            } else {
                Status::PartiallyFilled
            };
            let snapshot = order.clone();
            debug!(
                asset_id,
                order_id,
                price = trade.price,
                qty = fill_qty,
                exch_timestamp = trade.exch_timestamp,
                "resting order filled by trade imprint"
            );
            self.push_fill(Fill {
                asset_id,
                order_id,
                side: snapshot.side,
                price: trade.price,
                qty: fill_qty,
                is_maker: true,
                exch_timestamp: trade.exch_timestamp,
                local_timestamp: trade.exch_timestamp + self.order_response_latency,
            });
            self.push_update(OrderEventKind::Fill, snapshot, trade.exch_timestamp);
        }
    }

    /// Removes every terminal-status order from the per-asset active list, the maker book, and
    /// the global order arena.
    pub fn clear_inactive_orders(&mut self, asset_id: AssetId) {
        let Some(asset) = self.assets.get_mut(&asset_id) else {
            return;
        };
        let orders = &self.orders;
        asset
            .active_orders
            .retain(|id| orders.get(id).is_some_and(|order| !order.terminal()));
        asset
            .maker_book
            .bid_orders
            .retain(|_, id| orders.get(id).is_some_and(|order| !order.terminal()));
        asset
            .maker_book
            .ask_orders
            .retain(|_, id| orders.get(id).is_some_and(|order| !order.terminal()));
        self.orders
            .retain(|_, order| order.asset_id != asset_id || !order.terminal());
    }

    /// Removes and returns the accumulated fills.
    pub fn drain_fills(&mut self) -> Vec<Fill> {
        std::mem::take(&mut self.fills)
    }

    /// Removes and returns the accumulated order notifications.
    pub fn drain_order_updates(&mut self) -> Vec<OrderUpdate> {
        std::mem::take(&mut self.order_updates)
    }

    /// Walks the opposite side best-first, consuming `min(level_depth, remaining)` per level.
    /// `limit_ticks` bounds the walk for limit orders. Every fill prints at the level's price.
    fn take_liquidity(&mut self, asset_id: AssetId, order: &mut Order, limit_ticks: Option<Ticks>) {
        let opposite = order.side.opposite();
        let mut level = 0;
        while order.filled_qty < order.qty {
            let (level_ticks, level_depth) = {
                let asset = self.assets.get(&asset_id).expect("unknown asset");
                (
                    asset.book.price_at_level(opposite, level),
                    asset.book.depth_at_level(opposite, level),
                )
            };
            if level_depth <= 0.0 {
                break;
            }
            if let Some(limit) = limit_ticks {
                match order.side {
                    Side::Buy if level_ticks > limit => break,
                    Side::Sell if level_ticks < limit => break,
                    _ => {}
                }
            }
            let tick_size = self.assets.get(&asset_id).expect("unknown asset").book.tick_size();
            let level_price = level_ticks as f64 * tick_size;
            let fill_qty = level_depth.min(order.leaves_qty());
            order.filled_qty += fill_qty;
            order.status = if order.filled_qty >= order.qty {
                Status::Filled
            } else {
                Status::PartiallyFilled
            };
            let snapshot = order.clone();
            debug!(
                asset_id,
                order_id = order.order_id,
                price = level_price,
                qty = fill_qty,
                exch_timestamp = order.exch_timestamp,
                "taker fill"
            );
            self.push_fill(Fill {
                asset_id,
                order_id: order.order_id,
                side: order.side,
                price: level_price,
                qty: fill_qty,
                is_maker: false,
                exch_timestamp: order.exch_timestamp,
                local_timestamp: order.exch_timestamp + self.order_response_latency,
            });
            self.push_update(OrderEventKind::Fill, snapshot, order.exch_timestamp);
            level += 1;
        }
    }

    /// Takes liquidity from best outward until the quantity is exhausted or the book runs out.
    /// No rest and no rejection: whatever remains unfilled is discarded.
    fn execute_market_order(&mut self, asset_id: AssetId, mut order: Order) {
        if order.status != Status::New {
            return;
        }
        self.take_liquidity(asset_id, &mut order, None);
        if order.filled_qty == 0.0 {
            debug!(
                asset_id,
                order_id = order.order_id,
                "market order dropped: no liquidity"
            );
        }
    }

    /// Fill-or-kill: rejected without any fills unless the full quantity is available at levels
    /// at or better than the limit price.
    fn execute_fok_order(&mut self, asset_id: AssetId, mut order: Order) {
        if order.status != Status::New {
            return;
        }
        let tick_size = self.assets.get(&asset_id).expect("unknown asset").book.tick_size();
        let limit_ticks = price_to_ticks(order.price, tick_size);
        let opposite = order.side.opposite();
        let mut available: Qty = 0.0;
        let mut level = 0;
        while available < order.qty {
            let (level_ticks, level_depth) = {
                let asset = self.assets.get(&asset_id).expect("unknown asset");
                (
                    asset.book.price_at_level(opposite, level),
                    asset.book.depth_at_level(opposite, level),
                )
            };
            if level_depth <= 0.0 {
                break;
            }
            match order.side {
                Side::Buy if level_ticks > limit_ticks => break,
                Side::Sell if level_ticks < limit_ticks => break,
                _ => {}
            }
            available += level_depth;
            level += 1;
        }
        if available < order.qty {
            order.status = Status::Rejected;
            debug!(
                asset_id,
                order_id = order.order_id,
                "FOK order rejected: insufficient liquidity"
            );
            let exch_timestamp = order.exch_timestamp;
            self.push_update(OrderEventKind::Rejected, order, exch_timestamp);
            return;
        }
        self.take_liquidity(asset_id, &mut order, Some(limit_ticks));
    }

    /// Immediate-or-cancel: fills as much as possible within the limit; the remainder is
    /// discarded. Rejected when nothing fills.
    fn execute_ioc_order(&mut self, asset_id: AssetId, mut order: Order) {
        if order.status != Status::New {
            return;
        }
        let tick_size = self.assets.get(&asset_id).expect("unknown asset").book.tick_size();
        let limit_ticks = price_to_ticks(order.price, tick_size);
        self.take_liquidity(asset_id, &mut order, Some(limit_ticks));
        if order.filled_qty == 0.0 {
            order.status = Status::Rejected;
            debug!(
                asset_id,
                order_id = order.order_id,
                "IOC order rejected: no liquidity within limit"
            );
            let exch_timestamp = order.exch_timestamp;
            self.push_update(OrderEventKind::Rejected, order, exch_timestamp);
        }
    }

    /// Post-only placement: rejected if the order would cross, otherwise rested at its tick with
    /// the queue estimate seeded from the current depth at that level.
    fn place_maker_order(&mut self, asset_id: AssetId, mut order: Order) {
        let (crossed, price_ticks, queue_est) = {
            let asset = self.assets.get(&asset_id).expect("unknown asset");
            let best_ask = asset.book.best_ask();
            let best_bid = asset.book.best_bid();
            let crossed = match order.side {
                Side::Buy => best_ask > 0.0 && order.price >= best_ask,
                Side::Sell => best_bid > 0.0 && order.price <= best_bid,
            };
            let price_ticks = price_to_ticks(order.price, asset.book.tick_size());
            (crossed, price_ticks, asset.book.depth_at(order.side, price_ticks))
        };
        if crossed {
            order.status = Status::Rejected;
            debug!(
                asset_id,
                order_id = order.order_id,
                price = order.price,
                "post-only order rejected: would cross"
            );
            let exch_timestamp = order.exch_timestamp;
            self.push_update(OrderEventKind::Rejected, order, exch_timestamp);
            return;
        }
        // We assume we join the queue behind the depth currently resting at our level.
        order.queue_est = queue_est;
        order.status = Status::Active;
        let snapshot = order.clone();
        debug!(
            asset_id,
            order_id = order.order_id,
            side = AsRef::<str>::as_ref(&order.side),
            price = order.price,
            qty = order.qty,
            queue_est = order.queue_est,
            "maker order placed"
        );
        let asset = self.assets.get_mut(&asset_id).expect("unknown asset");
        if let Some(previous) = asset
            .maker_book
            .side_mut(order.side)
            .insert(price_ticks, order.order_id)
        {
            warn!(
                asset_id,
                order_id = order.order_id,
                replaced = previous,
                "replaced resting order at occupied level"
            );
        }
        asset.active_orders.push(order.order_id);
        let exch_timestamp = order.exch_timestamp;
        self.orders.insert(order.order_id, order);
        self.push_update(OrderEventKind::Acknowledged, snapshot, exch_timestamp);
    }

    fn push_fill(&mut self, fill: Fill) {
        self.fills.push(fill);
    }

    fn push_update(&mut self, kind: OrderEventKind, order: Order, exch_timestamp: Timestamp) {
        self.order_updates.push(OrderUpdate {
            asset_id: order.asset_id,
            order_id: order.order_id,
            kind,
            order,
            exch_timestamp,
            local_timestamp: exch_timestamp + self.order_response_latency,
        });
    }
}
