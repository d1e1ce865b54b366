use std::collections::HashMap;

use thiserror::Error;

/// Simulation time in microseconds since an arbitrary epoch.
pub type Timestamp = u64;

/// Integer price in units of an asset's tick size.
pub type Ticks = i64;

/// Price in natural units.
pub type Price = f64;

/// Quantity in natural units, a lot-rounded multiple of the asset's lot size.
pub type Qty = f64;

pub type OrderId = u64;

pub type AssetId = usize;

/// Represents a side, which can refer to either the side of an order or the initiator's side in a
/// trade event, with the meaning varying depending on the context.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(i8)]
pub enum Side {
    /// In a depth event, this indicates the bid side; in a trade event, it indicates that the
    /// trade initiator is a buyer.
    Buy = 1,
    /// In a depth event, this indicates the ask side; in a trade event, it indicates that the
    /// trade initiator is a seller.
    Sell = -1,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl AsRef<f64> for Side {
    fn as_ref(&self) -> &f64 {
        match self {
            Side::Buy => &1.0f64,
            Side::Sell => &-1.0f64,
        }
    }
}

impl AsRef<str> for Side {
    fn as_ref(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Order status
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Status {
    /// Created on the local side, not yet acknowledged by the exchange.
    New = 0,
    /// Resting in the exchange's maker book.
    Active = 1,
    PartiallyFilled = 2,
    Filled = 3,
    Canceled = 4,
    Expired = 5,
    Rejected = 6,
}

/// Time In Force
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum TimeInForce {
    /// Good 'Til Canceled, post-only: rejected instead of crossing the book.
    GTC = 0,
    /// Fill or Kill
    FOK = 1,
    /// Immediate or Cancel
    IOC = 2,
}

impl AsRef<str> for TimeInForce {
    fn as_ref(&self) -> &'static str {
        match self {
            TimeInForce::GTC => "GTC",
            TimeInForce::FOK => "FOK",
            TimeInForce::IOC => "IOC",
        }
    }
}

/// Order type
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum OrdType {
    Limit = 0,
    Market = 1,
}

impl AsRef<str> for OrdType {
    fn as_ref(&self) -> &'static str {
        match self {
            OrdType::Limit => "LIMIT",
            OrdType::Market => "MARKET",
        }
    }
}

/// Order
#[derive(Clone, Debug)]
pub struct Order {
    pub order_id: OrderId,
    pub asset_id: AssetId,
    pub side: Side,
    /// Limit price; meaningful for limit orders only.
    pub price: Price,
    /// Order quantity.
    pub qty: Qty,
    /// Executed quantity accumulated so far; never exceeds `qty`.
    pub filled_qty: Qty,
    pub order_type: OrdType,
    pub time_in_force: TimeInForce,
    /// Estimated quantity ahead of this order in its price level's queue. The order becomes
    /// fillable by trade imprints once the estimate reaches zero.
    pub queue_est: Qty,
    pub status: Status,
    /// The time at which the local side submitted this order.
    pub local_timestamp: Timestamp,
    /// The time at which the exchange receives this order.
    pub exch_timestamp: Timestamp,
}

impl Order {
    /// Constructs a freshly submitted order in [`Status::New`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        asset_id: AssetId,
        side: Side,
        price: Price,
        qty: Qty,
        order_type: OrdType,
        time_in_force: TimeInForce,
        local_timestamp: Timestamp,
        exch_timestamp: Timestamp,
    ) -> Self {
        Self {
            order_id,
            asset_id,
            side,
            price,
            qty,
            filled_qty: 0.0,
            order_type,
            time_in_force,
            queue_est: 0.0,
            status: Status::New,
            local_timestamp,
            exch_timestamp,
        }
    }

    /// Returns the quantity still open in the market.
    #[inline]
    pub fn leaves_qty(&self) -> Qty {
        self.qty - self.filled_qty
    }

    /// Returns whether this order is resting and can still be executed.
    #[inline]
    pub fn active(&self) -> bool {
        self.status == Status::Active || self.status == Status::PartiallyFilled
    }

    /// Returns whether this order has reached a terminal status.
    #[inline]
    pub fn terminal(&self) -> bool {
        matches!(
            self.status,
            Status::Filled | Status::Canceled | Status::Expired | Status::Rejected
        )
    }
}

/// An execution produced by the exchange matching engine. It reaches the local side at
/// `local_timestamp = exch_timestamp + order_response_latency`.
#[derive(Clone, Debug)]
pub struct Fill {
    pub asset_id: AssetId,
    pub order_id: OrderId,
    /// The executing order's direction: [`Side::Buy`] increases the position.
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    /// Whether the order added liquidity; maker and taker fee rates differ.
    pub is_maker: bool,
    pub exch_timestamp: Timestamp,
    pub local_timestamp: Timestamp,
}

/// The kind of order transition conveyed by an [`OrderUpdate`].
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum OrderEventKind {
    Acknowledged,
    Fill,
    Canceled,
    Rejected,
}

/// An exchange-to-local order notification. The embedded snapshot becomes the local view of the
/// order once the update is delivered after response latency.
#[derive(Clone, Debug)]
pub struct OrderUpdate {
    pub asset_id: AssetId,
    pub order_id: OrderId,
    pub kind: OrderEventKind,
    /// Post-mutation copy of the order as the exchange sees it.
    pub order: Order,
    pub exch_timestamp: Timestamp,
    pub local_timestamp: Timestamp,
}

/// Whether a book update replaces the whole book or patches a single level.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum UpdateKind {
    Snapshot,
    Incremental,
}

/// An L2 depth feed event. A quantity of zero deletes the level.
#[derive(Clone, Debug)]
pub struct BookUpdate {
    pub exch_timestamp: Timestamp,
    pub local_timestamp: Timestamp,
    pub kind: UpdateKind,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
}

/// A public trade feed event; `side` is the taker side.
#[derive(Clone, Debug)]
pub struct Trade {
    pub exch_timestamp: Timestamp,
    pub local_timestamp: Timestamp,
    pub trade_id: u64,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
}

/// A market data feed event.
#[derive(Clone, Debug)]
pub enum Event {
    Book(BookUpdate),
    Trade(Trade),
}

impl Event {
    /// Returns the time at which this event occurred on the exchange.
    #[inline]
    pub fn exch_timestamp(&self) -> Timestamp {
        match self {
            Event::Book(update) => update.exch_timestamp,
            Event::Trade(trade) => trade.exch_timestamp,
        }
    }

    /// Returns the time at which this event is received by the local side.
    #[inline]
    pub fn local_timestamp(&self) -> Timestamp {
        match self {
            Event::Book(update) => update.local_timestamp,
            Event::Trade(trade) => trade.local_timestamp,
        }
    }
}

/// Immutable per-asset configuration.
#[derive(Clone, Debug)]
pub struct AssetConfig {
    pub book_update_file: String,
    pub trade_file: String,
    pub tick_size: f64,
    pub lot_size: f64,
    /// Reserved; not used by the simulation core.
    pub contract_multiplier: f64,
    /// Reserved; not used by the simulation core.
    pub is_inverse: bool,
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub name: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            book_update_file: String::new(),
            trade_file: String::new(),
            tick_size: 0.01,
            lot_size: 1.0,
            contract_multiplier: 1.0,
            is_inverse: false,
            maker_fee: 0.0,
            taker_fee: 0.0,
            name: String::new(),
        }
    }
}

/// A strategy-facing snapshot of the local (latency-delayed) order book. Price levels are keyed
/// by ticks; convert with [`ticks_to_price`](crate::utils::ticks_to_price).
#[derive(Clone, Debug)]
pub struct Depth {
    pub best_bid: Ticks,
    pub bid_qty: Qty,
    pub best_ask: Ticks,
    pub ask_qty: Qty,
    pub bid_depth: HashMap<Ticks, Qty>,
    pub ask_depth: HashMap<Ticks, Qty>,
    pub tick_size: f64,
    pub lot_size: f64,
}

impl Depth {
    /// Returns the mid price, or `0.0` when either side is empty.
    pub fn mid_price(&self) -> Price {
        if self.best_bid == 0 || self.best_ask == 0 {
            return 0.0;
        }
        (self.best_bid as f64 + self.best_ask as f64) / 2.0 * self.tick_size
    }
}

/// Provides errors that can occur in builders.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("`{0}` is required")]
    BuilderIncomplete(&'static str),
    #[error("{0}")]
    InvalidArgument(&'static str),
    #[error("asset `{0}` already exists")]
    Duplicate(AssetId),
    #[error("{0:?}")]
    Error(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_transitions() {
        let mut order = Order::new(
            1,
            0,
            Side::Buy,
            100.0,
            2.0,
            OrdType::Limit,
            TimeInForce::GTC,
            0,
            25_000,
        );
        assert_eq!(order.status, Status::New);
        assert_eq!(order.leaves_qty(), 2.0);
        assert!(!order.active());
        assert!(!order.terminal());

        order.status = Status::Active;
        assert!(order.active());

        order.filled_qty = 2.0;
        order.status = Status::Filled;
        assert_eq!(order.leaves_qty(), 0.0);
        assert!(order.terminal());
    }

    #[test]
    fn side_sign() {
        assert_eq!(*AsRef::<f64>::as_ref(&Side::Buy), 1.0);
        assert_eq!(*AsRef::<f64>::as_ref(&Side::Sell), -1.0);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }
}
