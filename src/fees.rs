use rust_decimal::Decimal;

/// Platform fee schedule — an external pricing-policy collaborator. The
/// engine only relies on the summation and rounding contract in
/// `engine::pricing`; what the platform actually charges lives here.
pub trait FeeSchedule: Send + Sync {
    /// Service fee for a given base amount.
    fn service_fee(&self, base: Decimal) -> Decimal;

    /// Taxes on the fee-inclusive subtotal (base + service fee + delivery).
    fn taxes(&self, subtotal: Decimal) -> Decimal;
}

/// Percentage service fee with a floor, plus a flat tax rate.
#[derive(Debug, Clone)]
pub struct PercentFeeSchedule {
    pub service_rate: Decimal,
    /// Minimum service fee charged regardless of base amount.
    pub service_floor: Decimal,
    pub tax_rate: Decimal,
}

impl FeeSchedule for PercentFeeSchedule {
    fn service_fee(&self, base: Decimal) -> Decimal {
        (base * self.service_rate).max(self.service_floor)
    }

    fn taxes(&self, subtotal: Decimal) -> Decimal {
        subtotal * self.tax_rate
    }
}

/// No platform fees, no taxes. Useful for tests and single-owner deployments.
#[derive(Debug, Clone, Default)]
pub struct NoFees;

impl FeeSchedule for NoFees {
    fn service_fee(&self, _base: Decimal) -> Decimal {
        Decimal::ZERO
    }

    fn taxes(&self, _subtotal: Decimal) -> Decimal {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percent_fee_with_floor() {
        let fees = PercentFeeSchedule {
            service_rate: dec!(0.05),
            service_floor: dec!(50),
            tax_rate: Decimal::ZERO,
        };
        assert_eq!(fees.service_fee(dec!(2000)), dec!(100.00));
        // Small bases hit the floor
        assert_eq!(fees.service_fee(dec!(100)), dec!(50));
        assert_eq!(fees.service_fee(Decimal::ZERO), dec!(50));
    }

    #[test]
    fn no_fees_is_free() {
        assert_eq!(NoFees.service_fee(dec!(1000)), Decimal::ZERO);
        assert_eq!(NoFees.taxes(dec!(1000)), Decimal::ZERO);
    }
}
