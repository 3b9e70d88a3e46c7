use crate::config::StrategyConfig;
use crate::models::{OrderSide, SignalVerdict, TradingSignal};

/// Decide whether a signal justifies opening a position.
///
/// Pure and deterministic; the caller owns all side effects. Rules are
/// checked in order: completeness, trend strength (ADX), then the
/// directional-index entry criteria.
pub fn validate_signal(signal: &TradingSignal, config: &StrategyConfig) -> SignalVerdict {
    let (plus_di, minus_di, adx) = match (signal.plus_di, signal.minus_di, signal.adx) {
        (Some(p), Some(m), Some(a)) => (p, m, a),
        _ => {
            return SignalVerdict::Invalid {
                reason: "missing required signal data (plusDI, minusDI, or adx)".to_string(),
            }
        }
    };

    if adx < config.adx_minimum {
        return SignalVerdict::Invalid {
            reason: format!("ADX below minimum ({} < {})", adx, config.adx_minimum),
        };
    }

    if plus_di > config.plus_di_threshold && minus_di < config.minus_di_threshold {
        return SignalVerdict::Valid {
            action: OrderSide::Buy,
        };
    }

    // The SELL rule reuses plus_di_threshold as the bound for -DI and
    // minus_di_threshold as the bound for +DI. The crossed thresholds look
    // swapped but match the tuned strategy settings; do not "fix" this.
    if minus_di > config.plus_di_threshold && plus_di < config.minus_di_threshold {
        return SignalVerdict::Valid {
            action: OrderSide::Sell,
        };
    }

    SignalVerdict::Invalid {
        reason: format!(
            "no entry criteria met: +DI={}, -DI={}, ADX={}, thresholds: +DI={}, -DI={}, ADX={}",
            plus_di,
            minus_di,
            adx,
            config.plus_di_threshold,
            config.minus_di_threshold,
            config.adx_minimum
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StrategyConfig {
        StrategyConfig {
            adx_minimum: 20.0,
            plus_di_threshold: 25.0,
            minus_di_threshold: 20.0,
            ..StrategyConfig::default()
        }
    }

    fn signal(plus_di: f64, minus_di: f64, adx: f64) -> TradingSignal {
        TradingSignal {
            plus_di: Some(plus_di),
            minus_di: Some(minus_di),
            adx: Some(adx),
            ..TradingSignal::default()
        }
    }

    #[test]
    fn test_buy_signal() {
        let verdict = validate_signal(&signal(30.0, 10.0, 25.0), &test_config());
        assert_eq!(
            verdict,
            SignalVerdict::Valid {
                action: OrderSide::Buy
            }
        );
    }

    #[test]
    fn test_sell_signal_uses_crossed_thresholds() {
        // -DI must clear plus_di_threshold (25), +DI must be under
        // minus_di_threshold (20).
        let verdict = validate_signal(&signal(10.0, 30.0, 25.0), &test_config());
        assert_eq!(
            verdict,
            SignalVerdict::Valid {
                action: OrderSide::Sell
            }
        );

        // -DI above minus_di_threshold but not above plus_di_threshold is
        // not enough for a SELL.
        let verdict = validate_signal(&signal(10.0, 22.0, 25.0), &test_config());
        assert!(!verdict.is_valid());
    }

    #[test]
    fn test_low_adx_rejects_regardless_of_di() {
        let verdict = validate_signal(&signal(30.0, 10.0, 15.0), &test_config());
        assert!(!verdict.is_valid());
        assert!(verdict.reason().unwrap().starts_with("ADX below minimum"));

        // Even a perfect SELL setup is rejected on weak trend.
        let verdict = validate_signal(&signal(10.0, 30.0, 19.9), &test_config());
        assert!(verdict.reason().unwrap().starts_with("ADX below minimum"));
    }

    #[test]
    fn test_missing_fields_reject() {
        let incomplete = TradingSignal {
            plus_di: Some(30.0),
            minus_di: None,
            adx: Some(25.0),
            ..TradingSignal::default()
        };
        let verdict = validate_signal(&incomplete, &test_config());
        assert!(!verdict.is_valid());
        assert!(verdict.reason().unwrap().contains("missing required signal data"));
    }

    #[test]
    fn test_ambiguous_signal_reports_values() {
        // Both DI lines above their thresholds: neither rule matches.
        let verdict = validate_signal(&signal(26.0, 26.0, 25.0), &test_config());
        assert!(!verdict.is_valid());
        let reason = verdict.reason().unwrap();
        assert!(reason.contains("+DI=26"));
        assert!(reason.contains("-DI=26"));
    }

    #[test]
    fn test_adx_exactly_at_minimum_passes() {
        let verdict = validate_signal(&signal(30.0, 10.0, 20.0), &test_config());
        assert!(verdict.is_valid());
    }
}
