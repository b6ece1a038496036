use crate::error::BotError;
use crate::models::InstrumentSpec;
use crate::Result;

/// Converts account risk into an order quantity
///
/// `quantity = (equity * risk_fraction) / (atr * stop_multiplier) / price`,
/// floored to the instrument's quantity step.
#[derive(Debug, Clone)]
pub struct RiskSizer {
    stop_multiplier: f64,
    fallback_equity: f64,
    instrument: InstrumentSpec,
}

impl RiskSizer {
    pub fn new(stop_multiplier: f64, fallback_equity: f64, instrument: InstrumentSpec) -> Result<Self> {
        if !(stop_multiplier > 0.0 && stop_multiplier.is_finite()) {
            return Err(BotError::Config(format!(
                "stop_multiplier must be positive, got {}",
                stop_multiplier
            )));
        }
        if !(fallback_equity > 0.0 && fallback_equity.is_finite()) {
            return Err(BotError::Config(format!(
                "fallback_equity must be positive, got {}",
                fallback_equity
            )));
        }
        if !(instrument.qty_step > 0.0 && instrument.price_tick > 0.0) {
            return Err(BotError::Config(format!(
                "instrument increments must be positive: qty_step={} price_tick={}",
                instrument.qty_step, instrument.price_tick
            )));
        }

        Ok(Self {
            stop_multiplier,
            fallback_equity,
            instrument,
        })
    }

    pub fn stop_multiplier(&self) -> f64 {
        self.stop_multiplier
    }

    pub fn fallback_equity(&self) -> f64 {
        self.fallback_equity
    }

    /// Equity to size with: the queried value, or the fallback when the
    /// query failed or reported nothing usable.
    pub fn resolve_equity(&self, queried: Result<f64>) -> f64 {
        match queried {
            Ok(equity) if equity > 0.0 && equity.is_finite() => equity,
            Ok(equity) => {
                tracing::warn!(
                    equity,
                    fallback = self.fallback_equity,
                    "Equity query returned no usable balance, sizing with fallback"
                );
                self.fallback_equity
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = self.fallback_equity,
                    "Equity unavailable, sizing with fallback"
                );
                self.fallback_equity
            }
        }
    }

    /// Position quantity for one trade
    ///
    /// Fails with `InsufficientData` when ATR or price is not positive, and
    /// with `InvalidComputation` when the result is non-finite or floors to zero.
    pub fn size(&self, equity: f64, risk_fraction: f64, atr: f64, price: f64) -> Result<f64> {
        if atr.is_nan() || atr <= 0.0 {
            return Err(BotError::InsufficientData(format!(
                "ATR must be positive to size a position, got {}",
                atr
            )));
        }
        if price.is_nan() || price <= 0.0 {
            return Err(BotError::InsufficientData(format!(
                "price must be positive to size a position, got {}",
                price
            )));
        }

        let risk_amount = equity * risk_fraction;
        let stop_distance = atr * self.stop_multiplier;
        let raw_quantity = (risk_amount / stop_distance) / price;

        if !raw_quantity.is_finite() {
            return Err(BotError::InvalidComputation(format!(
                "non-finite quantity: equity={} risk={} atr={} price={}",
                equity, risk_fraction, atr, price
            )));
        }

        let quantity = self.instrument.floor_qty(raw_quantity);
        if quantity <= 0.0 {
            return Err(BotError::InvalidComputation(format!(
                "quantity {:.8} is below the minimum step {}",
                raw_quantity, self.instrument.qty_step
            )));
        }

        tracing::debug!(
            risk_amount,
            stop_distance,
            raw_quantity,
            quantity,
            "Sized position"
        );

        Ok(quantity)
    }
}
