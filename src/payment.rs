use async_trait::async_trait;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::{PaymentRef, RefundRef};

/// A gateway call failed. The engine surfaces this as `EngineError::Payment`
/// with the reservation left in its pre-transition state.
#[derive(Debug)]
pub struct GatewayError(pub String);

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for GatewayError {}

/// External payment gateway. All calls are treated as slow and fallible; the
/// engine wraps each in a timeout (`EngineConfig::payment_timeout`).
///
/// The engine authorizes at request time, captures on owner approval, and
/// refunds on cancellation or dispute resolution. Card processing itself is
/// entirely the gateway's concern.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(
        &self,
        amount: Decimal,
        currency: &str,
        payer: Ulid,
    ) -> Result<PaymentRef, GatewayError>;

    async fn capture(&self, payment: &PaymentRef) -> Result<(), GatewayError>;

    async fn refund(
        &self,
        payment: &PaymentRef,
        amount: Decimal,
    ) -> Result<RefundRef, GatewayError>;
}

/// Gateway that approves everything and charges nobody. For tests and
/// deployments that settle payment out of band.
#[derive(Debug, Default)]
pub struct NoopGateway;

#[async_trait]
impl PaymentGateway for NoopGateway {
    async fn authorize(
        &self,
        _amount: Decimal,
        _currency: &str,
        _payer: Ulid,
    ) -> Result<PaymentRef, GatewayError> {
        Ok(PaymentRef(format!("noop-pay-{}", Ulid::new())))
    }

    async fn capture(&self, _payment: &PaymentRef) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn refund(
        &self,
        _payment: &PaymentRef,
        _amount: Decimal,
    ) -> Result<RefundRef, GatewayError> {
        Ok(RefundRef(format!("noop-ref-{}", Ulid::new())))
    }
}
