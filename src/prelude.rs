pub use crate::{
    backtest::{
        BacktestEngine,
        BacktestEngineBuilder,
        BacktestError,
        EngineConfig,
        recorder::BacktestRecorder,
    },
    feed::{BookStreamReader, MarketFeed, TradeStreamReader},
    orderbook::OrderBook,
    strategy::{GridTrading, GridTradingConfig, Strategy},
    types::{
        AssetConfig,
        AssetId,
        BookUpdate,
        BuildError,
        Depth,
        Event,
        Fill,
        OrdType,
        Order,
        OrderEventKind,
        OrderId,
        OrderUpdate,
        Price,
        Qty,
        Side,
        Status,
        Ticks,
        TimeInForce,
        Timestamp,
        Trade,
        UpdateKind,
    },
    utils::{OrderIdGenerator, price_to_ticks, quantity_to_lot, ticks_to_price},
};
