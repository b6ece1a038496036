use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::Result;

/// OHLCV candlestick data, one closed or forming bar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Direction of a position or order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side as the exchange spells it
    pub fn order_side(&self) -> &'static str {
        match self {
            Side::Long => "Buy",
            Side::Short => "Sell",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

/// Entry signal produced by the breakout rules
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    Hold,
}

/// Position on the traded symbol as reported by the exchange account
///
/// Never cached between cycles: a fresh copy is fetched every time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PositionState {
    Flat,
    Open {
        side: Side,
        size: f64,
        entry_price: f64,
    },
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            PositionState::Flat => None,
            PositionState::Open { side, .. } => Some(*side),
        }
    }
}

/// Market order with attached exits, validated at construction
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderIntent {
    side: Side,
    quantity: f64,
    take_profit: f64,
    stop_loss: f64,
}

impl OrderIntent {
    /// Build an intent, rejecting anything that would be a malformed order.
    ///
    /// `reference_price` is the price the levels were derived from: a long needs
    /// `stop < reference < target`, a short the mirror image.
    pub fn new(
        side: Side,
        quantity: f64,
        take_profit: f64,
        stop_loss: f64,
        reference_price: f64,
    ) -> Result<Self> {
        let values = [quantity, take_profit, stop_loss, reference_price];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BotError::InvalidComputation(format!(
                "non-finite order values: qty={} tp={} sl={} ref={}",
                quantity, take_profit, stop_loss, reference_price
            )));
        }
        if quantity <= 0.0 {
            return Err(BotError::InvalidComputation(format!(
                "order quantity must be positive, got {}",
                quantity
            )));
        }
        if take_profit <= 0.0 || stop_loss <= 0.0 {
            return Err(BotError::InvalidComputation(format!(
                "exit levels must be positive: tp={} sl={}",
                take_profit, stop_loss
            )));
        }

        let ordered = match side {
            Side::Long => stop_loss < reference_price && reference_price < take_profit,
            Side::Short => take_profit < reference_price && reference_price < stop_loss,
        };
        if !ordered {
            return Err(BotError::InvalidComputation(format!(
                "{} exits out of order: sl={} ref={} tp={}",
                side.label(),
                stop_loss,
                reference_price,
                take_profit
            )));
        }

        Ok(Self {
            side,
            quantity,
            take_profit,
            stop_loss,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }
}

/// Exchange acknowledgement of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub order_link_id: String,
}

/// Trading increments of the instrument
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSpec {
    pub qty_step: f64,
    pub price_tick: f64,
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self {
            qty_step: 0.001,
            price_tick: 0.01,
        }
    }
}

impl InstrumentSpec {
    /// Round a quantity down to the quantity step
    pub fn floor_qty(&self, qty: f64) -> f64 {
        // 1e-9 absorbs representation error such as 0.3 / 0.1 = 2.9999999999999996
        let steps = (qty / self.qty_step + 1e-9).floor();
        round_to_decimals(steps * self.qty_step, step_decimals(self.qty_step))
    }

    /// Round a price to the nearest tick
    pub fn round_price(&self, price: f64) -> f64 {
        let ticks = (price / self.price_tick).round();
        round_to_decimals(ticks * self.price_tick, step_decimals(self.price_tick))
    }

    pub fn format_qty(&self, qty: f64) -> String {
        format!("{:.*}", step_decimals(self.qty_step), qty)
    }

    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", step_decimals(self.price_tick), price)
    }
}

/// Number of decimals needed to print multiples of `step` exactly
fn step_decimals(step: f64) -> usize {
    let mut decimals = 0;
    let mut scaled = step;
    while decimals < 10 && (scaled - scaled.round()).abs() > 1e-9 {
        scaled *= 10.0;
        decimals += 1;
    }
    decimals
}

fn round_to_decimals(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_order_side() {
        assert_eq!(Side::Long.order_side(), "Buy");
        assert_eq!(Side::Short.order_side(), "Sell");
    }

    #[test]
    fn test_position_state() {
        assert!(PositionState::Flat.is_flat());
        let open = PositionState::Open {
            side: Side::Short,
            size: 1.5,
            entry_price: 140.0,
        };
        assert!(!open.is_flat());
        assert_eq!(open.side(), Some(Side::Short));
    }

    #[test]
    fn test_order_intent_long_valid() {
        let intent = OrderIntent::new(Side::Long, 0.5, 113.0, 95.0, 101.0).unwrap();
        assert_eq!(intent.side(), Side::Long);
        assert_eq!(intent.quantity(), 0.5);
        assert_eq!(intent.take_profit(), 113.0);
        assert_eq!(intent.stop_loss(), 95.0);
    }

    #[test]
    fn test_order_intent_rejects_misordered_short() {
        // Short with stop below price
        let result = OrderIntent::new(Side::Short, 0.5, 90.0, 99.0, 100.0);
        assert!(matches!(result, Err(BotError::InvalidComputation(_))));
    }

    #[test]
    fn test_order_intent_rejects_zero_quantity() {
        let result = OrderIntent::new(Side::Long, 0.0, 113.0, 95.0, 101.0);
        assert!(matches!(result, Err(BotError::InvalidComputation(_))));
    }

    #[test]
    fn test_order_intent_rejects_nan() {
        let result = OrderIntent::new(Side::Long, 1.0, f64::NAN, 95.0, 101.0);
        assert!(matches!(result, Err(BotError::InvalidComputation(_))));
    }

    #[test]
    fn test_floor_qty() {
        let spec = InstrumentSpec::default();
        assert!((spec.floor_qty(0.33333) - 0.333).abs() < 1e-12);
        assert!((spec.floor_qty(0.3339) - 0.333).abs() < 1e-12);
        assert_eq!(spec.floor_qty(0.0009), 0.0);

        let tenths = InstrumentSpec {
            qty_step: 0.1,
            price_tick: 0.01,
        };
        assert!((tenths.floor_qty(0.3) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_round_price_and_format() {
        let spec = InstrumentSpec::default();
        assert!((spec.round_price(95.0049) - 95.0).abs() < 1e-12);
        assert!((spec.round_price(95.006) - 95.01).abs() < 1e-12);
        assert_eq!(spec.format_price(95.0), "95.00");
        assert_eq!(spec.format_qty(0.333), "0.333");
    }

    #[test]
    fn test_step_decimals() {
        assert_eq!(step_decimals(1.0), 0);
        assert_eq!(step_decimals(0.1), 1);
        assert_eq!(step_decimals(0.001), 3);
        assert_eq!(step_decimals(0.5), 1);
    }
}
