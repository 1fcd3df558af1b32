//! The alloy-based EVM chain provider.
//!
//! Wraps a filler-composed alloy provider with wallet signing, round-robin
//! signer selection, and receipt timeouts. Mechanisms submit settlement
//! transactions through [`Eip155MetaTransactionProvider::send_transaction`]
//! and never touch gas or nonce management themselves.

use alloy_network::{Ethereum as AlloyEthereum, EthereumWallet, NetworkWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{
    Identity, PendingTransactionError, Provider, ProviderBuilder, RootProvider, WalletProvider,
};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportError;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceBuilder;

use pay402::chain::{ChainId, ChainProviderOps, FromConfig};
use pay402::config::RpcConfig;

use crate::chain::{Eip155ChainConfig, Eip155ChainReference};

/// The fully composed provider type: gas, blob gas, nonce, chain id, and
/// wallet fillers over a [`RootProvider`].
pub type InnerProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider,
>;

/// Provider for interacting with EVM-compatible blockchains.
///
/// Supports multiple signers selected round-robin to spread settlement load
/// and avoid nonce contention.
#[derive(Debug)]
pub struct Eip155ChainProvider {
    chain: Eip155ChainReference,
    eip1559: bool,
    receipt_timeout_secs: u64,
    inner: InnerProvider,
    signer_addresses: Arc<Vec<Address>>,
    signer_cursor: Arc<AtomicUsize>,
}

impl Eip155ChainProvider {
    /// Builds the RPC client with throttling and endpoint fallback.
    pub fn rpc_client(chain_id: &ChainId, rpc: &[RpcConfig]) -> RpcClient {
        let transports = rpc
            .iter()
            .filter_map(|provider_config| {
                let scheme = provider_config.http.scheme();
                if scheme != "http" && scheme != "https" {
                    return None;
                }
                let rpc_url = provider_config.http.clone();
                tracing::info!(chain = %chain_id, rpc_url = %rpc_url, rate_limit = ?provider_config.rate_limit, "using HTTP transport");
                let rate_limit = provider_config.rate_limit.unwrap_or(u32::MAX);
                let service = ServiceBuilder::new()
                    .layer(ThrottleLayer::new(rate_limit))
                    .service(Http::new(rpc_url));
                Some(service)
            })
            .collect::<Vec<_>>();
        let fallback = ServiceBuilder::new()
            .layer(
                FallbackLayer::default().with_active_transport_count(
                    NonZeroUsize::new(transports.len())
                        .expect("at least one http rpc endpoint configured"),
                ),
            )
            .service(transports);
        RpcClient::new(fallback, false)
    }

    /// Round-robin selection of the next signer address.
    fn next_signer_address(&self) -> Address {
        debug_assert!(!self.signer_addresses.is_empty());
        if self.signer_addresses.len() == 1 {
            self.signer_addresses[0]
        } else {
            let next =
                self.signer_cursor.fetch_add(1, Ordering::Relaxed) % self.signer_addresses.len();
            self.signer_addresses[next]
        }
    }
}

#[async_trait::async_trait]
impl FromConfig<Eip155ChainConfig> for Eip155ChainProvider {
    async fn from_config(config: &Eip155ChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let signers = config
            .inner
            .signers
            .iter()
            .map(|key| {
                key.inner()
                    .parse::<PrivateKeySigner>()
                    .map(|s| s.with_chain_id(Some(config.chain_reference().inner())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if signers.is_empty() {
            return Err("at least one signer must be provided".into());
        }
        let wallet = {
            let mut iter = signers.into_iter();
            let first_signer = iter.next().expect("non-empty by the check above");
            let mut wallet = EthereumWallet::from(first_signer);
            for signer in iter {
                wallet.register_signer(signer);
            }
            wallet
        };
        let signer_addresses =
            NetworkWallet::<AlloyEthereum>::signer_addresses(&wallet).collect::<Vec<_>>();
        let signer_addresses = Arc::new(signer_addresses);

        let client = Self::rpc_client(&config.chain_id(), &config.inner.rpc);

        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(NonceFiller::default(), ChainIdFiller::default()),
            ),
        );
        let inner: InnerProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client);

        tracing::info!(chain = %config.chain_id(), signers = ?signer_addresses, "using EVM provider");

        Ok(Self {
            chain: config.chain_reference(),
            eip1559: config.inner.eip1559,
            receipt_timeout_secs: config.inner.receipt_timeout_secs,
            inner,
            signer_addresses,
            signer_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl ChainProviderOps for Eip155ChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        self.inner
            .signer_addresses()
            .map(|a| a.to_string())
            .collect()
    }

    fn chain_id(&self) -> ChainId {
        self.chain.into()
    }
}

/// A settlement transaction: target contract and encoded calldata.
#[derive(Debug, Clone)]
pub struct MetaTransaction {
    /// Target contract address.
    pub to: Address,
    /// Encoded function call.
    pub calldata: Bytes,
    /// Block confirmations to wait for.
    pub confirmations: u64,
}

/// Errors from submitting a settlement transaction.
#[derive(Debug, thiserror::Error)]
pub enum MetaTransactionSendError {
    /// Transport-level RPC failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The transaction was submitted but the receipt never arrived.
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
}

/// Sends meta-transactions on behalf of mechanisms.
pub trait Eip155MetaTransactionProvider {
    /// Error type for submission failures.
    type Error;
    /// Underlying alloy provider type.
    type Inner: Provider;

    /// The underlying provider, for read-only contract calls.
    fn inner(&self) -> &Self::Inner;
    /// The chain this provider talks to.
    fn chain(&self) -> &Eip155ChainReference;

    /// Submits a transaction and waits for its receipt.
    fn send_transaction(
        &self,
        tx: MetaTransaction,
    ) -> impl Future<Output = Result<TransactionReceipt, Self::Error>> + Send;
}

impl Eip155MetaTransactionProvider for Eip155ChainProvider {
    type Error = MetaTransactionSendError;
    type Inner = InnerProvider;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    fn chain(&self) -> &Eip155ChainReference {
        &self.chain
    }

    /// Submits with an automatically selected signer.
    ///
    /// On legacy (pre-EIP-1559) chains the gas price is fetched and set
    /// explicitly; otherwise the filler stack prices the transaction.
    /// Receipt fetching is bounded by the configured timeout.
    async fn send_transaction(
        &self,
        tx: MetaTransaction,
    ) -> Result<TransactionReceipt, Self::Error> {
        let from_address = self.next_signer_address();
        let mut txr = TransactionRequest::default()
            .with_to(tx.to)
            .with_from(from_address)
            .with_input(tx.calldata);

        if !self.eip1559 {
            let gas: u128 = self.inner.get_gas_price().await?;
            txr.set_gas_price(gas);
        }

        let pending_tx = self.inner.send_transaction(txr).await?;

        let timeout = std::time::Duration::from_secs(self.receipt_timeout_secs);
        let receipt = pending_tx
            .with_required_confirmations(tx.confirmations)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await?;
        Ok(receipt)
    }
}

impl<T: Eip155MetaTransactionProvider> Eip155MetaTransactionProvider for Arc<T> {
    type Error = T::Error;
    type Inner = T::Inner;

    fn inner(&self) -> &Self::Inner {
        (**self).inner()
    }

    fn chain(&self) -> &Eip155ChainReference {
        (**self).chain()
    }

    fn send_transaction(
        &self,
        tx: MetaTransaction,
    ) -> impl Future<Output = Result<TransactionReceipt, Self::Error>> + Send {
        (**self).send_transaction(tx)
    }
}
