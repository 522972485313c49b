use common::{PairSettings, STRATEGY_TAG};
use engine::pricing::quantize;
use proptest::prelude::*;

fn settings_with_bonus(sell_bonus: f64) -> PairSettings {
    PairSettings {
        symbol: "HONEY-USDT".into(),
        strategy: STRATEGY_TAG.into(),
        active: true,
        amount: 100.0,
        sell_bonus,
        check_delay: 5,
        cycle_delay: 3600,
        api_key: "k".into(),
        api_secret: "s".into(),
        api_passphrase: "p".into(),
    }
}

proptest! {
    /// Quantizing an already-quantized price is a fixed point, for the
    /// tick sizes the exchange actually uses.
    #[test]
    fn quantize_is_idempotent(
        price in 0.0001f64..1_000_000.0f64,
        tick in prop::sample::select(vec![0.00001, 0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0]),
    ) {
        let q = quantize(price, tick);
        prop_assert_eq!(quantize(q, tick), q);
    }

    /// A fractional bonus is taken as-is.
    #[test]
    fn fractional_bonus_is_unchanged(b in 0.0f64..1.0f64) {
        let f = settings_with_bonus(b).sell_bonus_fraction();
        prop_assert_eq!(f, b);
        prop_assert!((0.0..1.0).contains(&f));
    }

    /// A percentage bonus lands in the unit interval after dividing
    /// by 100.
    #[test]
    fn percentage_bonus_normalizes_into_unit_interval(b in 1.01f64..100.0f64) {
        let f = settings_with_bonus(b).sell_bonus_fraction();
        prop_assert_eq!(f, b / 100.0);
        prop_assert!(f > 0.0 && f < 1.0);
    }
}
