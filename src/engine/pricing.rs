use rust_decimal::{Decimal, RoundingStrategy};

use crate::fees::FeeSchedule;
use crate::model::*;

use super::EngineError;

const HOUR_MS: Ms = 3_600_000;
const DAY_MS: Ms = 24 * HOUR_MS;
const WEEK_MS: Ms = 168 * HOUR_MS;
const MONTH_MS: Ms = 720 * HOUR_MS;

/// All monetary values carry 2 decimal places, rounded half-up.
pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn ceil_hours(duration: Ms) -> i64 {
    (duration + HOUR_MS - 1) / HOUR_MS
}

fn ceil_days(duration: Ms) -> i64 {
    (duration + DAY_MS - 1) / DAY_MS
}

/// Duration-bucketed tier selection, fixed order — first matching bucket
/// wins, even where a cheaper combination exists:
///
/// 1. ≤ 24h and a daily rate exists → daily rate
/// 2. ≤ 168h and a weekly rate exists → weekly rate
/// 3. ≤ 720h and a monthly rate exists → monthly rate
/// 4. an hourly rate exists → hourly × ceil(hours)
/// 5. a daily rate exists → daily × ceil(days)
/// 6. otherwise the resource is unpriceable for this duration
pub fn base_amount(tiers: &PricingTiers, span: &Span) -> Option<Decimal> {
    let duration = span.duration_ms();
    if duration <= DAY_MS
        && let Some(daily) = tiers.daily {
            return Some(daily);
        }
    if duration <= WEEK_MS
        && let Some(weekly) = tiers.weekly {
            return Some(weekly);
        }
    if duration <= MONTH_MS
        && let Some(monthly) = tiers.monthly {
            return Some(monthly);
        }
    if let Some(hourly) = tiers.hourly {
        return Some(hourly * Decimal::from(ceil_hours(duration)));
    }
    if let Some(daily) = tiers.daily {
        return Some(daily * Decimal::from(ceil_days(duration)));
    }
    None
}

/// Compute the full monetary breakdown for a candidate reservation.
///
/// Pure given its inputs: identical tiers, interval, and fee schedule always
/// produce an identical breakdown. Service fee and taxes come from the
/// injected platform fee schedule; the taxable subtotal is base + service fee
/// + delivery fee (the deposit is returned to the renter and is not taxed).
pub fn quote(
    resource: &Resource,
    span: &Span,
    delivery_requested: bool,
    fees: &dyn FeeSchedule,
) -> Result<PriceBreakdown, EngineError> {
    let base = round_money(
        base_amount(&resource.tiers, span).ok_or(EngineError::Unpriceable(resource.id))?,
    );
    let deposit = round_money(resource.tiers.deposit);
    let delivery_fee = if delivery_requested && resource.delivery.available {
        round_money(resource.delivery.fee)
    } else {
        Decimal::ZERO
    };
    let service_fee = round_money(fees.service_fee(base));
    let taxes = round_money(fees.taxes(base + service_fee + delivery_fee));
    let total = base + deposit + service_fee + delivery_fee + taxes;

    Ok(PriceBreakdown {
        base,
        deposit,
        service_fee,
        delivery_fee,
        taxes,
        total,
        currency: resource.tiers.currency.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use ulid::Ulid;

    use crate::fees::{NoFees, PercentFeeSchedule};

    fn tiers(
        hourly: Option<Decimal>,
        daily: Option<Decimal>,
        weekly: Option<Decimal>,
        monthly: Option<Decimal>,
    ) -> PricingTiers {
        PricingTiers {
            hourly,
            daily,
            weekly,
            monthly,
            deposit: Decimal::ZERO,
            currency: "USD".into(),
        }
    }

    fn resource_with(tiers: PricingTiers, delivery: DeliveryTerms) -> Resource {
        Resource {
            id: Ulid::new(),
            owner: Ulid::new(),
            title: None,
            tiers,
            delivery,
            policy: BookingPolicy::default(),
            retired: false,
        }
    }

    fn span_hours(h: i64) -> Span {
        Span::new(0, h * HOUR_MS)
    }

    #[test]
    fn one_day_uses_daily_rate() {
        let t = tiers(None, Some(dec!(50)), Some(dec!(300)), None);
        assert_eq!(base_amount(&t, &span_hours(24)), Some(dec!(50)));
        assert_eq!(base_amount(&t, &span_hours(8)), Some(dec!(50)));
    }

    #[test]
    fn three_days_costs_the_weekly_rate() {
        // 72h fails the 24h bucket and lands on the weekly tier — the fixed
        // order charges a full week even though 3 × daily would be less.
        let t = tiers(None, Some(dec!(50)), Some(dec!(300)), None);
        assert_eq!(base_amount(&t, &span_hours(72)), Some(dec!(300)));
    }

    #[test]
    fn month_bucket_before_hourly_fallback() {
        let t = tiers(Some(dec!(2)), None, None, Some(dec!(900)));
        assert_eq!(base_amount(&t, &span_hours(500)), Some(dec!(900)));
    }

    #[test]
    fn hourly_fallback_rounds_hours_up() {
        let t = tiers(Some(dec!(10)), None, None, None);
        // 90 minutes bills as 2 hours
        let span = Span::new(0, 90 * 60_000);
        assert_eq!(base_amount(&t, &span), Some(dec!(20)));
    }

    #[test]
    fn hourly_fallback_beyond_month_bucket() {
        let t = tiers(Some(dec!(1)), None, None, Some(dec!(900)));
        // 800h exceeds the 720h monthly bucket, so the hourly fallback fires
        assert_eq!(base_amount(&t, &span_hours(800)), Some(dec!(800)));
    }

    #[test]
    fn daily_fallback_rounds_days_up() {
        let t = tiers(None, Some(dec!(40)), None, None);
        // 73h → 4 billed days
        assert_eq!(base_amount(&t, &span_hours(73)), Some(dec!(160)));
    }

    #[test]
    fn no_applicable_tier_is_unpriceable() {
        let t = tiers(None, None, None, Some(dec!(900)));
        // 800h exceeds every bucket and no hourly/daily fallback exists
        assert_eq!(base_amount(&t, &span_hours(800)), None);

        let r = resource_with(t, DeliveryTerms::default());
        let err = quote(&r, &span_hours(800), false, &NoFees).unwrap_err();
        assert!(matches!(err, EngineError::Unpriceable(id) if id == r.id));
    }

    #[test]
    fn quote_sums_all_components() {
        let mut t = tiers(None, Some(dec!(100)), None, None);
        t.deposit = dec!(25);
        let r = resource_with(
            t,
            DeliveryTerms {
                available: true,
                fee: dec!(10),
            },
        );
        let fees = PercentFeeSchedule {
            service_rate: dec!(0.10),
            service_floor: dec!(5),
            tax_rate: dec!(0.08),
        };
        let q = quote(&r, &span_hours(24), true, &fees).unwrap();
        assert_eq!(q.base, dec!(100));
        assert_eq!(q.deposit, dec!(25));
        assert_eq!(q.delivery_fee, dec!(10));
        assert_eq!(q.service_fee, dec!(10.00));
        // taxes on 100 + 10 + 10 = 120 at 8%
        assert_eq!(q.taxes, dec!(9.60));
        assert_eq!(q.total, dec!(154.60));
        assert_eq!(q.currency, "USD");
    }

    #[test]
    fn delivery_fee_requires_support_and_request() {
        let t = tiers(None, Some(dec!(100)), None, None);
        let supported = resource_with(
            t.clone(),
            DeliveryTerms {
                available: true,
                fee: dec!(15),
            },
        );
        let unsupported = resource_with(
            t,
            DeliveryTerms {
                available: false,
                fee: dec!(15),
            },
        );

        let q = quote(&supported, &span_hours(24), false, &NoFees).unwrap();
        assert_eq!(q.delivery_fee, Decimal::ZERO);
        let q = quote(&supported, &span_hours(24), true, &NoFees).unwrap();
        assert_eq!(q.delivery_fee, dec!(15));
        let q = quote(&unsupported, &span_hours(24), true, &NoFees).unwrap();
        assert_eq!(q.delivery_fee, Decimal::ZERO);
    }

    #[test]
    fn rounding_is_half_up_to_cents() {
        assert_eq!(round_money(dec!(1.665)), dec!(1.67));
        assert_eq!(round_money(dec!(1.664)), dec!(1.66));
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));

        let t = tiers(Some(dec!(0.333)), None, None, None);
        // 5 hours at 0.333 = 1.665 → 1.67
        assert_eq!(
            quote(
                &resource_with(t, DeliveryTerms::default()),
                &span_hours(5),
                false,
                &NoFees
            )
            .unwrap()
            .base,
            dec!(1.67)
        );
    }

    #[test]
    fn quote_is_deterministic() {
        let t = tiers(Some(dec!(7.25)), Some(dec!(60)), None, None);
        let r = resource_with(t, DeliveryTerms::default());
        let fees = PercentFeeSchedule {
            service_rate: dec!(0.05),
            service_floor: dec!(2),
            tax_rate: dec!(0.0625),
        };
        let a = quote(&r, &span_hours(30), false, &fees).unwrap();
        let b = quote(&r, &span_hours(30), false, &fees).unwrap();
        assert_eq!(a, b);
    }
}
