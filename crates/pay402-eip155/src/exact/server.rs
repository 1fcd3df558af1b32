//! Resource-server side of the EVM `exact` scheme.

use pay402::chain::ChainId;
use pay402::proto::SupportedPaymentKind;
use pay402::proto::v2;
use pay402::scheme::{PriceQuote, SchemeServer};

use crate::chain::ChecksummedAddress;
use crate::networks::USDC;

/// Server-side capabilities: price conversion against known USDC
/// deployments, facilitator-extra merging, and payload matching.
///
/// Chain-family generic; register once under the `eip155` namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip155ExactServer;

impl SchemeServer for Eip155ExactServer {
    fn enhance_requirements(
        &self,
        mut requirements: v2::PaymentRequirements,
        kind: Option<&SupportedPaymentKind>,
    ) -> v2::PaymentRequirements {
        let Some(advertised) = kind.and_then(|k| k.extra.as_ref()) else {
            return requirements;
        };
        let Some(advertised) = advertised.as_object() else {
            return requirements;
        };
        // Facilitator-advertised extra fills gaps; the route's own extra wins.
        let mut merged = match requirements.extra.take() {
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => {
                requirements.extra = Some(other);
                return requirements;
            }
            None => serde_json::Map::new(),
        };
        for (key, value) in advertised {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }
        requirements.extra = Some(serde_json::Value::Object(merged));
        requirements
    }

    fn parse_price(&self, price: &str, network: &ChainId) -> Option<PriceQuote> {
        let deployment = USDC::by_chain_id(network)?;
        let amount = deployment.parse(price).ok()?;
        let extra = deployment
            .eip712
            .as_ref()
            .and_then(|eip712| serde_json::to_value(eip712).ok());
        Some(PriceQuote {
            amount: amount.to_string(),
            asset: ChecksummedAddress(deployment.address).to_string(),
            extra,
        })
    }

    fn matches(
        &self,
        offered: &v2::PaymentRequirements,
        accepted: &v2::PaymentRequirements,
    ) -> bool {
        let core_fields = offered.scheme == accepted.scheme
            && offered.network == accepted.network
            && offered.amount == accepted.amount
            && offered.asset == accepted.asset
            && offered.pay_to == accepted.pay_to;
        if !core_fields {
            return false;
        }
        // The EIP-712 domain parameters are load-bearing for this scheme: a
        // payload bound to a different domain is not the offered payment.
        let domain = |extra: &Option<serde_json::Value>| {
            extra.as_ref().map(|e| {
                (
                    e.get("name").cloned(),
                    e.get("version").cloned(),
                )
            })
        };
        domain(&offered.extra) == domain(&accepted.extra)
    }
}
