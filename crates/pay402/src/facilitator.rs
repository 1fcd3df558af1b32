//! Core trait defining the verification and settlement interface.
//!
//! Implementors validate incoming payment payloads against declared
//! requirements ([`Facilitator::verify`]) and execute on-chain transfers
//! ([`Facilitator::settle`]). The resource server programs against this
//! trait and does not care whether the facilitator is in-process
//! ([`crate::facilitator_local::FacilitatorLocal`]) or remote over HTTP.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::proto;
use crate::proto::v2;

/// Asynchronous interface for x402 payment facilitators.
pub trait Facilitator {
    /// The error type returned by this facilitator.
    ///
    /// Errors are infrastructure failures; protocol-level rejections are
    /// values inside [`v2::VerifyResponse`] and [`v2::SettleResponse`].
    type Error: Debug + Display;

    /// Verifies a proposed payment payload against requirements.
    ///
    /// Checks payload integrity, signature validity, balance sufficiency,
    /// replay, and compliance with the declared payment requirements.
    fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> impl Future<Output = Result<v2::VerifyResponse, Self::Error>> + Send;

    /// Executes an on-chain settlement for a verified payment.
    ///
    /// Re-validates the payment (possibly a cheap subset) and performs the
    /// transfer. The receipt carries the network-native transaction id.
    fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> impl Future<Output = Result<v2::SettleResponse, Self::Error>> + Send;

    /// The union of payment kinds this facilitator can process.
    fn supported(
        &self,
    ) -> impl Future<Output = Result<proto::SupportedResponse, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> impl Future<Output = Result<v2::VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> impl Future<Output = Result<v2::SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }

    fn supported(
        &self,
    ) -> impl Future<Output = Result<proto::SupportedResponse, Self::Error>> + Send {
        self.as_ref().supported()
    }
}
