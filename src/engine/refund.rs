use rust_decimal::Decimal;

use crate::model::*;

use super::pricing::round_money;

const HOUR_MS: Ms = 3_600_000;

/// What a cancellation returns to the renter.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundBreakdown {
    /// Fraction of the total refunded (`0..=1`).
    pub fraction: Decimal,
    pub amount: Decimal,
    /// The platform service fee is refunded in full or not at all.
    pub service_fee_refund: Decimal,
}

impl RefundBreakdown {
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

/// Refund policy. Pure: mutates nothing, reads no clock beyond `now`.
///
/// Owner cancellations always refund 100% — the renter never bears cost for
/// a cancellation outside their control. Renter cancellations step down with
/// time remaining before the start: 90% at ≥ 48h out, 50% at ≥ 24h, then
/// nothing. Breakpoints are inclusive on the ≥ side.
pub fn compute_refund(
    pricing: &PriceBreakdown,
    start: Ms,
    cancelled_by: CancelParty,
    now: Ms,
) -> RefundBreakdown {
    let fraction = match cancelled_by {
        CancelParty::Owner => Decimal::ONE,
        CancelParty::Renter => {
            let hours_until_start = (start - now) / HOUR_MS;
            if hours_until_start >= 48 {
                Decimal::new(90, 2)
            } else if hours_until_start >= 24 {
                Decimal::new(50, 2)
            } else {
                Decimal::ZERO
            }
        }
    };
    refund_for_fraction(pricing, fraction)
}

/// Refund an explicit fraction of the total — used directly by dispute
/// resolutions, which carry their own fraction.
pub fn refund_for_fraction(pricing: &PriceBreakdown, fraction: Decimal) -> RefundBreakdown {
    let amount = round_money(pricing.total * fraction);
    let service_fee_refund = if fraction > Decimal::ZERO {
        pricing.service_fee
    } else {
        Decimal::ZERO
    };
    RefundBreakdown {
        fraction,
        amount,
        service_fee_refund,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pricing(total: Decimal, service_fee: Decimal) -> PriceBreakdown {
        PriceBreakdown {
            base: total - service_fee,
            deposit: Decimal::ZERO,
            service_fee,
            delivery_fee: Decimal::ZERO,
            taxes: Decimal::ZERO,
            total,
            currency: "USD".into(),
        }
    }

    #[test]
    fn owner_cancellation_refunds_everything() {
        let p = pricing(dec!(200), dec!(20));
        // Even one hour before start
        let r = compute_refund(&p, 10 * HOUR_MS, CancelParty::Owner, 9 * HOUR_MS);
        assert_eq!(r.fraction, Decimal::ONE);
        assert_eq!(r.amount, dec!(200.00));
        assert_eq!(r.service_fee_refund, dec!(20));
    }

    #[test]
    fn renter_thirty_hours_out_gets_half() {
        let p = pricing(dec!(200), dec!(20));
        let r = compute_refund(&p, 30 * HOUR_MS, CancelParty::Renter, 0);
        assert_eq!(r.fraction, dec!(0.50));
        assert_eq!(r.amount, dec!(100.00));
        assert_eq!(r.service_fee_refund, dec!(20));
    }

    #[test]
    fn breakpoints_are_inclusive_on_the_ge_side() {
        let p = pricing(dec!(100), dec!(10));
        let at = |hours: Ms| compute_refund(&p, hours * HOUR_MS, CancelParty::Renter, 0).fraction;
        assert_eq!(at(49), dec!(0.90));
        assert_eq!(at(48), dec!(0.90)); // exactly 48h still 90%
        assert_eq!(at(47), dec!(0.50));
        assert_eq!(at(24), dec!(0.50)); // exactly 24h still 50%
        assert_eq!(at(23), Decimal::ZERO);
        assert_eq!(at(0), Decimal::ZERO);
    }

    #[test]
    fn refund_is_monotonic_in_time_until_start() {
        let p = pricing(dec!(100), dec!(10));
        let mut last = Decimal::ONE;
        for hours in (0..=72).rev() {
            let f = compute_refund(&p, hours * HOUR_MS, CancelParty::Renter, 0).fraction;
            assert!(f <= last, "refund fraction rose as start approached");
            last = f;
        }
    }

    #[test]
    fn service_fee_is_all_or_nothing() {
        let p = pricing(dec!(100), dec!(12));
        let some = compute_refund(&p, 50 * HOUR_MS, CancelParty::Renter, 0);
        assert_eq!(some.service_fee_refund, dec!(12));
        let none = compute_refund(&p, HOUR_MS, CancelParty::Renter, 0);
        assert_eq!(none.service_fee_refund, Decimal::ZERO);
        assert!(none.is_zero());
    }

    #[test]
    fn ninety_percent_rounds_half_up() {
        let p = pricing(dec!(33.35), dec!(0));
        let r = compute_refund(&p, 50 * HOUR_MS, CancelParty::Renter, 0);
        // 33.35 × 0.9 = 30.015 → 30.02
        assert_eq!(r.amount, dec!(30.02));
    }

    #[test]
    fn explicit_fraction_for_resolutions() {
        let p = pricing(dec!(80), dec!(8));
        let r = refund_for_fraction(&p, dec!(0.25));
        assert_eq!(r.amount, dec!(20.00));
        assert_eq!(r.service_fee_refund, dec!(8));
        let zero = refund_for_fraction(&p, Decimal::ZERO);
        assert!(zero.is_zero());
        assert_eq!(zero.service_fee_refund, Decimal::ZERO);
    }
}
