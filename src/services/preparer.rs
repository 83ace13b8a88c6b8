// src/services/preparer.rs
//! Transaction preparation.
//!
//! Validates a request, selects the adapter of the DID's chain and hands it the
//! request. Every validation fault is raised before the first remote call that
//! could have an effect. UTXO updates and deletions first walk the document chain
//! to find the output they must spend.

use crate::adapters::{Adapters, ChainAdapter, ChangeRequest, CreateRequest};
use crate::blockchain::ChainBackends;
use crate::error::{MdipError, Result};
use crate::identifier;
use crate::models::did::{ChainTag, DIDDocument, Identifier, Network};
use crate::models::transaction::UnsignedTransaction;
use crate::services::ledger_info::funding_besides;
use crate::services::resolver::{anchor_of, walk_chain};
use log::{debug, info};
use std::sync::Arc;
use url::Url;

/// Schemes a document pointer may use.
const DOCUMENT_SCHEMES: [&str; 3] = ["http", "https", "ipfs"];

/// Checks that `document_url` is an absolute URL the content store can fetch.
///
/// # Errors
/// `InvalidDocumentURL` for unparsable URLs, other schemes, or http(s) URLs
/// without a host.
pub fn validate_document_url(document_url: &str) -> Result<Url> {
    let url = Url::parse(document_url)
        .map_err(|e| MdipError::InvalidDocumentURL(format!("{}: {}", document_url, e)))?;
    if !DOCUMENT_SCHEMES.contains(&url.scheme()) {
        return Err(MdipError::InvalidDocumentURL(format!(
            "unsupported scheme '{}' in {}",
            url.scheme(),
            document_url
        )));
    }
    if url.scheme() != "ipfs" && url.host_str().map_or(true, str::is_empty) {
        return Err(MdipError::InvalidDocumentURL(format!("{} has no host", document_url)));
    }
    Ok(url)
}

pub struct Preparer {
    backends: ChainBackends,
    adapters: Arc<Adapters>,
}

impl Preparer {
    pub fn new(backends: ChainBackends, adapters: Arc<Adapters>) -> Self {
        Preparer { backends, adapters }
    }

    /// Size, then grammar, then content of a document pointer.
    async fn check_document(&self, adapter: &dyn ChainAdapter, document_url: Option<&str>, trust: bool) -> Result<()> {
        let Some(document_url) = document_url else {
            return Ok(());
        };
        if adapter.max_metadata_bytes().is_some() {
            adapter.encode_metadata(document_url.as_bytes())?;
        }
        validate_document_url(document_url)?;
        if trust {
            return Ok(());
        }
        let bytes = self.backends.content.fetch(document_url).await?;
        DIDDocument::from_slice(&bytes)?;
        debug!("document at {} validated", document_url);
        Ok(())
    }

    /// Prepares the transaction creating a new DID on `chain`.
    ///
    /// # Arguments
    /// * `chain` - Ledger to anchor the DID on
    /// * `request` - Funding, receivers and optional initial document
    ///
    /// # Returns
    /// An unsigned transaction for UTXO and account chains; for the document store
    /// the allocated record.
    ///
    /// # Errors
    /// `PayloadTooLarge`, `InvalidDocumentURL`, `SchemaViolation` in that order, then
    /// the adapter's own errors (`InsufficientFunds`, `InvalidAddress`, ...).
    pub async fn prepare_create(&self, chain: ChainTag, request: &CreateRequest) -> Result<UnsignedTransaction> {
        let adapter = self.adapters.for_chain(chain);
        self.check_document(adapter, request.document_url.as_deref(), request.trust_document)
            .await?;
        let unsigned = adapter.prepare_create(request).await?;
        info!("prepared create on {}", chain);
        Ok(unsigned)
    }

    /// Prepares the transaction pointing `request.did` at a new document, or
    /// handing it to a new controller.
    pub async fn prepare_update(&self, request: &ChangeRequest) -> Result<UnsignedTransaction> {
        let identifier = identifier::parse(&request.did)?;
        let adapter = self.adapters.for_chain(identifier.chain);
        if identifier.chain.is_utxo() && request.document_url.is_none() {
            return Err(MdipError::InvalidDocumentURL("an update must reference a document".into()));
        }
        self.check_document(adapter, request.document_url.as_deref(), request.trust_document)
            .await?;
        let request = self.with_tip(&identifier, request).await?;
        let unsigned = adapter.prepare_update(&request).await?;
        info!("prepared update of {}", request.did);
        Ok(unsigned)
    }

    /// Prepares the transaction ending `request.did`'s document chain.
    pub async fn prepare_delete(&self, request: &ChangeRequest) -> Result<UnsignedTransaction> {
        let identifier = identifier::parse(&request.did)?;
        let adapter = self.adapters.for_chain(identifier.chain);
        let request = self.with_tip(&identifier, request).await?;
        let unsigned = adapter.prepare_delete(&request).await?;
        info!("prepared delete of {}", request.did);
        Ok(unsigned)
    }

    /// Copy of `request` carrying the current tip of a UTXO DID.
    ///
    /// A request without funding gets the controller's other unspent outputs, which
    /// the adapter only spends when the tip alone cannot pay the fee.
    async fn with_tip(&self, identifier: &Identifier, request: &ChangeRequest) -> Result<ChangeRequest> {
        let mut request = request.clone();
        if identifier.chain.is_utxo() {
            let network: Network = request.network;
            let ledger = self.backends.ledger(identifier.chain)?;
            let adapter = self.adapters.for_chain(identifier.chain);
            let anchor = anchor_of(ledger.as_ref(), identifier, network).await?;
            let walk = walk_chain(ledger.as_ref(), adapter, anchor).await?;
            debug!("{} is at {}", identifier, walk.tip.outpoint);
            let owner = walk.tip.address.clone();
            if let Some(address) = owner.filter(|owner| request.controller.as_ref() == Some(owner)) {
                if request.funding.is_empty() {
                    request.funding = funding_besides(ledger.as_ref(), &address, &walk.tip.outpoint).await?;
                }
            }
            request.tip = Some(walk.tip);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::utxo::decode_transaction;
    use crate::blockchain::mock::{funding_transaction, ledger_view, pay, transaction, MockBackends};
    use crate::identifier::txref::TxRef;
    use crate::models::transaction::{FeeSchedule, SignedTransaction, SpendableInput};
    use crate::services::signer;
    use crate::wallet::key_management::KeyManager;

    const DOCUMENT_URL: &str = "https://example.com/did.json";

    fn preparer(mocks: &MockBackends) -> Preparer {
        let backends = mocks.backends();
        let adapters = Arc::new(Adapters::new(&backends, 1));
        Preparer::new(backends, adapters)
    }

    fn document_bytes(did: &str) -> Vec<u8> {
        serde_json::to_vec(&DIDDocument::initial_record(did, "02aa")).unwrap()
    }

    /// Creates, signs and confirms a btc DID controlled by `key`; the anchor is the
    /// second transaction of block 1.
    async fn confirmed_did(mocks: &MockBackends, key: &KeyManager) -> String {
        let address = key.p2pkh_address(Network::Testnet);
        let (funding, input) = funding_transaction(&address, 10_000);
        let request = CreateRequest {
            network: Network::Testnet,
            creator: address.to_string(),
            updater: address.to_string(),
            inputs: vec![input],
            document_url: Some(DOCUMENT_URL.into()),
            trust_document: true,
            ..Default::default()
        };
        let unsigned = preparer(mocks).prepare_create(ChainTag::Btc, &request).await.unwrap();
        let SignedTransaction::Utxo { hex, .. } = signer::sign(&unsigned, &key.to_wif(Network::Testnet)).unwrap() else {
            panic!("expected a UTXO transaction");
        };
        let anchor = decode_transaction(&hex).unwrap();

        mocks.bitcoin.push_block(vec![ledger_view(&funding, Network::Testnet)]);
        mocks.bitcoin.push_block(vec![
            transaction("coinbase1", &[], vec![pay(0, 5_000_000_000, "mkHS9ne12qx9pS9VojpwU5xtRd4T7X7ZUt")]),
            ledger_view(&anchor, Network::Testnet),
        ]);
        format!(
            "did:mdip:btc-{}",
            TxRef::new(Network::Testnet, 1, 1, 0).encode().unwrap()
        )
    }

    #[tokio::test]
    async fn test_oversized_pointer_rejected_before_any_request() {
        let mocks = MockBackends::new();
        let request = CreateRequest {
            document_url: Some(format!("https://example.com/{}", "a".repeat(150))),
            ..Default::default()
        };
        let preparer = preparer(&mocks);

        let err = preparer.prepare_create(ChainTag::Btc, &request).await.unwrap_err();
        assert!(matches!(err, MdipError::PayloadTooLarge { max: 160, .. }));
        let err = preparer.prepare_create(ChainTag::Omni, &request).await.unwrap_err();
        assert!(matches!(err, MdipError::PayloadTooLarge { max: 144, .. }));
        assert_eq!(mocks.bitcoin.requests(), 0);
        assert_eq!(mocks.omni.requests(), 0);
    }

    #[test]
    fn test_document_url_grammar() {
        assert!(validate_document_url(DOCUMENT_URL).is_ok());
        assert!(validate_document_url("ipfs://QmDoc").is_ok());
        for bad in ["ftp://example.com/did.json", "example.com/did.json", "https://", ""] {
            assert!(
                matches!(validate_document_url(bad), Err(MdipError::InvalidDocumentURL(_))),
                "{} accepted",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_document_checked_unless_trusted() {
        let mocks = MockBackends::new();
        mocks.content.put(DOCUMENT_URL, br#"{"id": "did:mdip:btc-xyz"}"#);
        let mut request = CreateRequest {
            public_key: Some("02aa".into()),
            document_url: Some(DOCUMENT_URL.into()),
            ..Default::default()
        };
        let preparer = preparer(&mocks);

        let err = preparer.prepare_create(ChainTag::Eth, &request).await.unwrap_err();
        assert!(matches!(err, MdipError::SchemaViolation(_)));
        assert!(mocks.registry.calls().is_empty());

        request.trust_document = true;
        request.document_url = Some("ipfs://QmDoc".into());
        let unsigned = preparer.prepare_create(ChainTag::Eth, &request).await.unwrap();
        assert!(matches!(unsigned, UnsignedTransaction::ContractCall(_)));
        assert_eq!(mocks.registry.calls(), vec!["create:QmDoc:02aa".to_string()]);
    }

    #[tokio::test]
    async fn test_create_on_document_store() {
        let mocks = MockBackends::new();
        let request = CreateRequest {
            public_key: Some("02aa".into()),
            ..Default::default()
        };
        let unsigned = preparer(&mocks).prepare_create(ChainTag::MongoDb, &request).await.unwrap();
        assert!(matches!(unsigned, UnsignedTransaction::Record { .. }));
        assert_eq!(mocks.documents.count_records().await, 1);
    }

    #[tokio::test]
    async fn test_update_spends_tip_with_funding() {
        let mocks = MockBackends::new();
        let key = KeyManager::generate();
        let did = confirmed_did(&mocks, &key).await;
        mocks.content.put("https://example.com/v2.json", &document_bytes(&did));
        let address = key.p2pkh_address(Network::Testnet);
        let (_, funding) = funding_transaction(&address, 5_000);

        let request = ChangeRequest {
            did,
            network: Network::Testnet,
            controller: Some(address.to_string()),
            document_url: Some("https://example.com/v2.json".into()),
            funding: vec![funding],
            ..Default::default()
        };
        let UnsignedTransaction::Utxo(unsigned) = preparer(&mocks).prepare_update(&request).await.unwrap() else {
            panic!("expected a UTXO transaction");
        };

        let fee = FeeSchedule::estimate(2, 1, 1).nulldata;
        assert_eq!(unsigned.psbt.unsigned_tx.input.len(), 2);
        assert_eq!(unsigned.output_values(), vec![5_600 - fee, 0]);
        assert!(unsigned.has_metadata_output());
        assert!(signer::sign(&UnsignedTransaction::Utxo(unsigned), &key.to_wif(Network::Testnet)).is_ok());
    }

    #[tokio::test]
    async fn test_update_discovers_funding_of_controller() {
        let mocks = MockBackends::new();
        let key = KeyManager::generate();
        let did = confirmed_did(&mocks, &key).await;
        let address = key.p2pkh_address(Network::Testnet);
        let ledger = mocks.bitcoin.clone();
        let identifier = identifier::parse(&did).unwrap();
        let anchor = anchor_of(ledger.as_ref(), &identifier, Network::Testnet).await.unwrap();
        let tip = SpendableInput {
            txid: anchor.txid.clone(),
            vout: anchor.vout,
            amount_sats: 600,
            raw_tx_hex: None,
        };
        let (_, funding) = funding_transaction(&address, 5_000);
        mocks.bitcoin.add_unspent(&address.to_string(), tip);
        mocks.bitcoin.add_unspent(&address.to_string(), funding);

        let request = ChangeRequest {
            did,
            network: Network::Testnet,
            controller: Some(address.to_string()),
            document_url: Some("https://example.com/v2.json".into()),
            trust_document: true,
            ..Default::default()
        };
        let UnsignedTransaction::Utxo(unsigned) = preparer(&mocks).prepare_update(&request).await.unwrap() else {
            panic!("expected a UTXO transaction");
        };

        let fee = FeeSchedule::estimate(2, 1, 1).nulldata;
        assert_eq!(unsigned.psbt.unsigned_tx.input.len(), 2);
        assert_eq!(unsigned.output_values(), vec![5_600 - fee, 0]);
    }

    #[tokio::test]
    async fn test_delete_has_no_metadata_output() {
        let mocks = MockBackends::new();
        let key = KeyManager::generate();
        let did = confirmed_did(&mocks, &key).await;
        let address = key.p2pkh_address(Network::Testnet);

        let request = ChangeRequest {
            did,
            network: Network::Testnet,
            controller: Some(address.to_string()),
            fees: Some(FeeSchedule { base: 0, nulldata: 0 }),
            ..Default::default()
        };
        let UnsignedTransaction::Utxo(unsigned) = preparer(&mocks).prepare_delete(&request).await.unwrap() else {
            panic!("expected a UTXO transaction");
        };
        assert_eq!(unsigned.output_values(), vec![600]);
        assert!(!unsigned.has_metadata_output());
    }

    #[tokio::test]
    async fn test_update_requires_tip_controller() {
        let mocks = MockBackends::new();
        let key = KeyManager::generate();
        let did = confirmed_did(&mocks, &key).await;
        let stranger = KeyManager::generate().p2pkh_address(Network::Testnet);

        let mut request = ChangeRequest {
            did,
            network: Network::Testnet,
            controller: Some(stranger.to_string()),
            document_url: Some("https://example.com/v2.json".into()),
            trust_document: true,
            ..Default::default()
        };
        assert!(matches!(
            preparer(&mocks).prepare_update(&request).await,
            Err(MdipError::ControlVerificationFailed(_))
        ));

        request.document_url = None;
        assert!(matches!(
            preparer(&mocks).prepare_update(&request).await,
            Err(MdipError::InvalidDocumentURL(_))
        ));
    }
}
