//! In-process facilitator dispatching to registered mechanisms.
//!
//! [`FacilitatorLocal`] routes verify/settle requests to the handler
//! registered for the payload's `(scheme, network)` key. The version probe,
//! scheme lookup, and network lookup happen here; everything
//! scheme-specific is delegated.

use crate::facilitator::Facilitator;
use crate::proto;
use crate::proto::v2;
use crate::proto::{ErrorReason, RequestProbeError};
use crate::scheme::{SchemeFacilitatorError, SchemeKey, SchemeRegistry};

/// A local [`Facilitator`] implementation backed by a [`SchemeRegistry`].
pub struct FacilitatorLocal {
    schemes: SchemeRegistry,
}

impl FacilitatorLocal {
    /// Creates a facilitator over the given (frozen) registry.
    pub fn new(schemes: SchemeRegistry) -> Self {
        Self { schemes }
    }

    /// The registry this facilitator dispatches through.
    pub fn schemes(&self) -> &SchemeRegistry {
        &self.schemes
    }

    /// Resolves the handler for a request, or the reason it cannot be
    /// resolved.
    fn dispatch(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<(SchemeKey, &dyn crate::scheme::SchemeFacilitator), ErrorReason> {
        let key = request.scheme_key().map_err(|e| match e {
            RequestProbeError::Invalid(_) => ErrorReason::InvalidPayload,
            RequestProbeError::UnsupportedVersion(_) => ErrorReason::UnsupportedVersion,
        })?;
        match self.schemes.by_key(&key) {
            Some(handler) => Ok((key, handler)),
            None if self.schemes.knows_scheme(&key.scheme) => {
                Err(ErrorReason::UnsupportedNetwork)
            }
            None => Err(ErrorReason::UnsupportedScheme),
        }
    }
}

impl Facilitator for FacilitatorLocal {
    type Error = FacilitatorLocalError;

    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<v2::VerifyResponse, Self::Error> {
        let (key, handler) = match self.dispatch(request) {
            Ok(found) => found,
            Err(reason) => return Ok(v2::VerifyResponse::invalid(reason)),
        };
        tracing::debug!(key = %key, "dispatching verify");
        let response = handler.verify(request).await?;
        Ok(response)
    }

    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<v2::SettleResponse, Self::Error> {
        let (key, handler) = match self.dispatch(request) {
            Ok(found) => found,
            Err(reason) => {
                return Ok(v2::SettleResponse::Error {
                    reason,
                    network: None,
                });
            }
        };
        tracing::debug!(key = %key, "dispatching settle");
        let response = handler.settle(request).await?;
        Ok(response)
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, Self::Error> {
        let mut kinds = vec![];
        let mut extensions = vec![];
        for handler in self.schemes.values() {
            match handler.supported().await {
                Ok(mut supported) => {
                    kinds.append(&mut supported.kinds);
                    for extension in supported.extensions {
                        if !extensions.contains(&extension) {
                            extensions.push(extension);
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "scheme handler failed to report supported kinds");
                }
            }
        }
        Ok(proto::SupportedResponse { kinds, extensions })
    }
}

/// Errors from local facilitator operations.
///
/// Only infrastructure failures surface here; protocol rejections are
/// carried as invalid/error responses.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorLocalError {
    /// A mechanism failed at the infrastructure level.
    #[error(transparent)]
    Scheme(#[from] SchemeFacilitatorError),
}
