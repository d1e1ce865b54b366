use crate::types::{Fill, Price, Qty};

/// Per-asset trading statistics maintained by the local (latency-delayed) accounting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateValues {
    pub position: Qty,
    pub num_trades: i64,
    pub trading_volume: Qty,
    pub trading_value: f64,
    /// Average-cost realized profit, gross of fees. Fees are reflected in cash only.
    pub realized_pnl: f64,
}

/// Applies local fills to one asset's position and statistics and produces the cash delta the
/// engine credits to the portfolio.
#[derive(Clone, Debug)]
pub struct State {
    values: StateValues,
    avg_entry_price: Price,
    maker_fee: f64,
    taker_fee: f64,
}

impl State {
    pub fn new(maker_fee: f64, taker_fee: f64) -> Self {
        Self {
            values: StateValues::default(),
            avg_entry_price: 0.0,
            maker_fee,
            taker_fee,
        }
    }

    /// Applies a fill and returns the signed cash delta: `-signed_qty · price - fee`.
    pub fn apply_fill(&mut self, fill: &Fill) -> f64 {
        let signed_qty = fill.qty * AsRef::<f64>::as_ref(&fill.side);
        let position = self.values.position;

        if position * signed_qty >= 0.0 {
            // Extending (or opening) the position: blend the entry price.
            let total = position.abs() + fill.qty;
            if total > 0.0 {
                self.avg_entry_price =
                    (position.abs() * self.avg_entry_price + fill.qty * fill.price) / total;
            }
        } else {
            let closed = position.abs().min(fill.qty);
            self.values.realized_pnl +=
                (fill.price - self.avg_entry_price) * closed * position.signum();
            if fill.qty > position.abs() {
                // Flipped through zero; the remainder opens at the fill price.
                self.avg_entry_price = fill.price;
            }
        }

        self.values.position += signed_qty;
        self.values.num_trades += 1;
        self.values.trading_volume += fill.qty;
        self.values.trading_value += fill.qty * fill.price;

        let fee_rate = if fill.is_maker {
            self.maker_fee
        } else {
            self.taker_fee
        };
        let fee = fill.qty * fill.price * fee_rate;
        -signed_qty * fill.price - fee
    }

    #[inline]
    pub fn values(&self) -> &StateValues {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn fill(side: Side, price: f64, qty: f64, is_maker: bool) -> Fill {
        Fill {
            asset_id: 0,
            order_id: 1,
            side,
            price,
            qty,
            is_maker,
            exch_timestamp: 0,
            local_timestamp: 0,
        }
    }

    #[test]
    fn buy_then_sell_round_trip() {
        let mut state = State::new(0.0, 0.0);
        let mut cash = 1000.0;
        cash += state.apply_fill(&fill(Side::Buy, 100.0, 2.0, false));
        assert_eq!(state.values().position, 2.0);
        assert_eq!(cash, 800.0);

        cash += state.apply_fill(&fill(Side::Sell, 110.0, 2.0, false));
        assert_eq!(state.values().position, 0.0);
        assert_eq!(cash, 1020.0);
        assert_eq!(state.values().realized_pnl, 20.0);
        assert_eq!(state.values().num_trades, 2);
        assert_eq!(state.values().trading_volume, 4.0);
        assert_eq!(state.values().trading_value, 420.0);
    }

    #[test]
    fn fees_differ_for_maker_and_taker() {
        let mut state = State::new(0.0002, 0.0007);
        let taker_delta = state.apply_fill(&fill(Side::Buy, 100.0, 1.0, false));
        assert!((taker_delta - (-100.0 - 100.0 * 0.0007)).abs() < 1e-12);

        let maker_delta = state.apply_fill(&fill(Side::Buy, 100.0, 1.0, true));
        assert!((maker_delta - (-100.0 - 100.0 * 0.0002)).abs() < 1e-12);
    }

    #[test]
    fn realized_pnl_uses_average_cost() {
        let mut state = State::new(0.0, 0.0);
        state.apply_fill(&fill(Side::Buy, 100.0, 1.0, true));
        state.apply_fill(&fill(Side::Buy, 110.0, 1.0, true));
        // Average entry 105; closing 1 @ 108 realizes +3.
        state.apply_fill(&fill(Side::Sell, 108.0, 1.0, true));
        assert!((state.values().realized_pnl - 3.0).abs() < 1e-9);
        assert_eq!(state.values().position, 1.0);
    }

    #[test]
    fn flipping_through_zero_rebases_entry_price() {
        let mut state = State::new(0.0, 0.0);
        state.apply_fill(&fill(Side::Buy, 100.0, 1.0, true));
        // Sell 2 @ 104: realizes +4 on the long leg, leaves a short opened at 104.
        state.apply_fill(&fill(Side::Sell, 104.0, 2.0, true));
        assert!((state.values().realized_pnl - 4.0).abs() < 1e-9);
        assert_eq!(state.values().position, -1.0);

        // Cover the short @ 101: realizes +3 more.
        state.apply_fill(&fill(Side::Buy, 101.0, 1.0, true));
        assert!((state.values().realized_pnl - 7.0).abs() < 1e-9);
        assert_eq!(state.values().position, 0.0);
    }
}
