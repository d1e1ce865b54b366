use crate::backtest::{BacktestEngine, BacktestError};

pub use gridtrading::{GridTrading, GridTradingConfig};

mod gridtrading;

/// A strategy observes the engine's local view and submits actions between time-advance steps.
pub trait Strategy {
    /// Invoked by the driver loop after each `elapse` step completes.
    fn on_elapse(&mut self, engine: &mut BacktestEngine) -> Result<(), BacktestError>;
}
