// src/services/api_server.rs
//! HTTP API of the mdip DID service.
//!
//! The API is built using Axum and includes endpoints for:
//! - DID resolution
//! - Preparation of create, update and delete transactions on every chain
//! - Signing and broadcasting prepared transactions, or relaying client-signed ones
//! - Minting the DID of a confirmed create
//! - Funding quotes, balances and confirmation depths on the UTXO chains
//! - Credential issuance
//! - Publishing DID documents to the content store
//!
//! Every endpoint answers with the [`ApiResponse`] envelope.

use crate::adapters::{Adapters, ChangeRequest, CreateRequest};
use crate::blockchain::ChainBackends;
use crate::error::{MdipError, Result};
use crate::identifier;
use crate::models::did::{ChainTag, DIDDocument, Network};
use crate::models::response::ApiResponse;
use crate::models::transaction::{UnsignedContractCall, UnsignedTransaction, UnsignedUtxoTransaction};
use crate::services::credential_issuer::{CredentialEngine, SigningContext};
use crate::services::ledger_info;
use crate::services::preparer::Preparer;
use crate::services::resolver::Resolver;
use crate::services::signer;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

// API request structures

/// Query of `GET /readdid`
#[derive(Serialize, Deserialize)]
struct ReadDidQuery {
    did: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Create,
    Update,
    Delete,
}

/// Request payload of `POST /preparetransaction`; the remaining fields are the
/// create or change request of the operation.
#[derive(Serialize, Deserialize)]
struct PrepareTransactionRequest {
    blockchain: ChainTag,
    #[serde(rename = "type")]
    operation: Operation,
    #[serde(flatten)]
    params: Value,
}

/// Request payload of `POST /broadcast`: either a transaction the client signed,
/// or a prepared one with the key to sign it.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastRequest {
    blockchain: ChainTag,
    #[serde(default)]
    network: Network,
    /// Signed raw transaction in hex
    #[serde(default)]
    signed_tx: Option<String>,
    /// PSBT hex for UTXO chains, the contract call object for `eth`
    #[serde(default)]
    unsigned_tx: Value,
    #[serde(default)]
    private_key: Option<String>,
}

/// Request payload of `POST /mintdid`
#[derive(Serialize, Deserialize)]
struct MintDidRequest {
    blockchain: ChainTag,
    /// Create txid, creation event data or record id, depending on the chain
    tx: String,
}

/// Request payload of `POST /getutxos`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRequest {
    blockchain: ChainTag,
    #[serde(default)]
    network: Network,
    address: String,
}

/// Request payload of `POST /checkconfs`
#[derive(Serialize, Deserialize)]
struct CheckConfsRequest {
    blockchain: ChainTag,
    txids: Vec<String>,
}

/// Query of `GET /gettxdetails`
#[derive(Serialize, Deserialize)]
struct TxDetailsQuery {
    blockchain: ChainTag,
    txid: String,
}

/// Query of `GET /getfunds`
#[derive(Serialize, Deserialize)]
struct FundsQuery {
    blockchain: ChainTag,
    #[serde(default)]
    network: Network,
    address: String,
}

/// Request payload of `POST /issuenewclaim`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueClaimRequest {
    #[serde(rename = "attestorDID")]
    attestor_did: String,
    #[serde(rename = "requestorDID")]
    requestor_did: String,
    claim_type: String,
    claim_data: bool,
    attestor_name: String,
    attestor_private_key: String,
    #[serde(default)]
    network: Network,
}

/// Request payload of `POST /storedoc`
#[derive(Serialize, Deserialize)]
struct StoreDocumentRequest {
    document: Value,
}

/// Renders a prepared transaction for the caller to sign.
fn unsigned_to_json(unsigned: &UnsignedTransaction) -> Value {
    match unsigned {
        UnsignedTransaction::Utxo(tx) => json!({
            "kind": "utxo",
            "chain": tx.chain,
            "network": tx.network,
            "psbt": tx.to_hex(),
            "outputs": tx.output_values(),
        }),
        UnsignedTransaction::ContractCall(call) => json!({
            "kind": "contractCall",
            "call": call,
            "fee": call.fee().to_string(),
        }),
        UnsignedTransaction::Record { record_id } => json!({
            "kind": "record",
            "did": identifier::mint_record_did(record_id).to_string(),
        }),
        UnsignedTransaction::Applied { record_id } => json!({
            "kind": "applied",
            "recordId": record_id,
        }),
    }
}

fn status_of(e: &MdipError) -> StatusCode {
    match e {
        MdipError::NotFound(_) => StatusCode::NOT_FOUND,
        MdipError::ControlVerificationFailed(_) => StatusCode::FORBIDDEN,
        MdipError::ConcurrentModification(_) => StatusCode::CONFLICT,
        MdipError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        MdipError::BrokenDocumentChain(_) | MdipError::MissingContinuationMetadata { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Wraps an operation result into the envelope and its status code.
fn respond<T: Serialize>(result: Result<T>) -> (StatusCode, Json<ApiResponse<Value>>) {
    let result = result.and_then(|value| serde_json::to_value(value).map_err(MdipError::from));
    match result {
        Ok(value) => (StatusCode::OK, Json(ApiResponse::ok(value))),
        Err(e) => {
            if e.is_validation() {
                warn!("request rejected: {}", e);
            } else {
                error!("request failed: {}", e);
            }
            (status_of(&e), Json(ApiResponse::err(&e)))
        }
    }
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Shared collaborator handles
    backends: ChainBackends,

    /// Resolution engine
    resolver: Resolver,

    /// Transaction preparer
    preparer: Arc<Preparer>,

    /// Credential engine
    credentials: CredentialEngine,

    /// Satoshis per byte quoted to wallets
    fee_rate: u64,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `backends` - Ledger, registry and storage handles
    /// * `network` - Network UTXO identifiers are resolved on
    /// * `fee_rate` - Satoshis per byte for requests without explicit fees
    /// * `credential_types` - Claim types that may be issued
    pub fn new(backends: ChainBackends, network: Network, fee_rate: u64, credential_types: Vec<String>) -> Self {
        let adapters = Arc::new(Adapters::new(&backends, fee_rate));
        ApiServer {
            resolver: Resolver::new(backends.clone(), adapters.clone(), network),
            preparer: Arc::new(Preparer::new(backends.clone(), adapters)),
            credentials: CredentialEngine::new(backends.documents.clone(), credential_types),
            backends,
            fee_rate,
        }
    }

    /// Routes of the API, bound to this server's state.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/readdid", get(Self::read_did_handler))
            .route("/preparetransaction", post(Self::prepare_transaction_handler))
            .route("/broadcast", post(Self::broadcast_handler))
            .route("/mintdid", post(Self::mint_did_handler))
            .route("/getutxos", post(Self::get_utxos_handler))
            .route("/checkconfs", post(Self::check_confs_handler))
            .route("/gettxdetails", get(Self::tx_details_handler))
            .route("/getfunds", get(Self::get_funds_handler))
            .route("/issuenewclaim", post(Self::issue_claim_handler))
            .route("/updatedid", post(Self::update_did_handler))
            .route("/deletedid", post(Self::delete_did_handler))
            .route("/storedoc", post(Self::store_document_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    ///
    /// # Errors
    /// Returns the I/O error when the address cannot be bound or serving fails.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// Resolves a DID to its current document
    ///
    /// # Endpoint
    /// GET /readdid?did=
    async fn read_did_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<ReadDidQuery>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        respond(state.resolver.resolve(&query.did).await)
    }

    /// Prepares an unsigned create, update or delete transaction
    ///
    /// # Endpoint
    /// POST /preparetransaction
    ///
    /// # Request Body
    /// `{blockchain, type: "create" | "update" | "delete", ...request}`
    async fn prepare_transaction_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<PrepareTransactionRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let result = async {
            let unsigned = match payload.operation {
                Operation::Create => {
                    let request: CreateRequest = serde_json::from_value(payload.params)?;
                    state.preparer.prepare_create(payload.blockchain, &request).await?
                }
                Operation::Update => {
                    let request: ChangeRequest = serde_json::from_value(payload.params)?;
                    state.preparer.prepare_update(&request).await?
                }
                Operation::Delete => {
                    let request: ChangeRequest = serde_json::from_value(payload.params)?;
                    state.preparer.prepare_delete(&request).await?
                }
            };
            Ok::<_, MdipError>(unsigned_to_json(&unsigned))
        }
        .await;
        respond(result)
    }

    /// Submits a signed transaction to its chain, signing a prepared one first
    /// when the request carries a key instead
    ///
    /// # Endpoint
    /// POST /broadcast
    ///
    /// # Request Body
    /// `{blockchain, signedTx}` or `{blockchain, network, unsignedTx, privateKey}`
    ///
    /// # Responses
    /// - 200 OK: `{txid}` as reported by the node or registry
    /// - 400 Bad Request: undecodable transaction, wrong key or failed signature check
    async fn broadcast_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<BroadcastRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let result = async {
            if payload.blockchain == ChainTag::MongoDb {
                return Err(MdipError::UnsupportedOperation(
                    "document-store changes are applied when prepared".into(),
                ));
            }
            if let Some(raw) = &payload.signed_tx {
                let signed = signer::from_signed_raw(payload.blockchain, raw)?;
                let txid = signer::broadcast(&state.backends, &signed).await?;
                return Ok(json!({ "txid": txid }));
            }
            let private_key = payload
                .private_key
                .as_deref()
                .ok_or_else(|| MdipError::SchemaViolation("expected signedTx or privateKey".into()))?;
            let unsigned = match payload.blockchain {
                chain @ (ChainTag::Btc | ChainTag::Omni) => {
                    let psbt = payload
                        .unsigned_tx
                        .as_str()
                        .ok_or_else(|| MdipError::SignatureValidationFailed("expected PSBT hex".into()))?;
                    UnsignedTransaction::Utxo(UnsignedUtxoTransaction::from_hex(chain, payload.network, psbt)?)
                }
                ChainTag::Eth => {
                    let call: UnsignedContractCall = serde_json::from_value(payload.unsigned_tx)?;
                    UnsignedTransaction::ContractCall(call)
                }
                ChainTag::MongoDb => {
                    return Err(MdipError::UnsupportedOperation(
                        "document-store changes are applied when prepared".into(),
                    ))
                }
            };
            let signed = signer::sign(&unsigned, private_key)?;
            let txid = signer::broadcast(&state.backends, &signed).await?;
            Ok::<_, MdipError>(json!({ "txid": txid }))
        }
        .await;
        respond(result)
    }

    /// Mints the DID of a confirmed create
    ///
    /// # Endpoint
    /// POST /mintdid
    ///
    /// # Request Body
    /// `{blockchain, tx}`: the create's txid on the UTXO chains, the creation
    /// event's data on `eth`, the record id on `mongodb`
    async fn mint_did_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<MintDidRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let result = state.resolver.mint_did(payload.blockchain, &payload.tx).await;
        respond(result.map(|identifier| json!({ "did": identifier.to_string() })))
    }

    /// Quotes the spendable outputs of an address and the fee of spending them
    ///
    /// # Endpoint
    /// POST /getutxos
    async fn get_utxos_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<FundingRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let result = async {
            let ledger = state.backends.ledger(payload.blockchain)?;
            ledger_info::quote_funding(ledger.as_ref(), &payload.address, payload.network, state.fee_rate).await
        }
        .await;
        respond(result)
    }

    /// POST /checkconfs
    async fn check_confs_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CheckConfsRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let result = async {
            let ledger = state.backends.ledger(payload.blockchain)?;
            ledger_info::confirmations(ledger.as_ref(), &payload.txids).await
        }
        .await;
        respond(result)
    }

    /// GET /gettxdetails?blockchain=&txid=
    async fn tx_details_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<TxDetailsQuery>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let result = async {
            let ledger = state.backends.ledger(query.blockchain)?;
            ledger_info::tx_details(ledger.as_ref(), &query.txid).await
        }
        .await;
        respond(result)
    }

    /// GET /getfunds?blockchain=&address=
    async fn get_funds_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<FundsQuery>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let result = async {
            let ledger = state.backends.ledger(query.blockchain)?;
            let sats = ledger_info::balance(ledger.as_ref(), &query.address, query.network).await?;
            Ok::<_, MdipError>(json!({ "address": query.address, "balanceSats": sats }))
        }
        .await;
        respond(result)
    }

    /// Issues a signed verifiable credential
    ///
    /// # Endpoint
    /// POST /issuenewclaim
    async fn issue_claim_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<IssueClaimRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let context = SigningContext {
            did: payload.attestor_did,
            name: payload.attestor_name,
            private_key: payload.attestor_private_key,
            network: payload.network,
            extra_entropy: Some(rand::random()),
        };
        respond(state.credentials.issue_credential(
            &context,
            &payload.requestor_did,
            &payload.claim_type,
            payload.claim_data,
        ))
    }

    /// Prepares a DID update; document-store updates are applied directly
    ///
    /// # Endpoint
    /// POST /updatedid
    async fn update_did_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<ChangeRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        respond(state.preparer.prepare_update(&payload).await.map(|u| unsigned_to_json(&u)))
    }

    /// Prepares a DID deletion; document-store deletions are applied directly
    ///
    /// # Endpoint
    /// POST /deletedid
    async fn delete_did_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<ChangeRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        respond(state.preparer.prepare_delete(&payload).await.map(|u| unsigned_to_json(&u)))
    }

    /// Validates a DID document and publishes it to the content store
    ///
    /// # Endpoint
    /// POST /storedoc
    ///
    /// # Responses
    /// - 200 OK: `{cid, url}` where `url` is the `ipfs://` pointer to anchor
    /// - 400 Bad Request: the document violates the DID document schema
    async fn store_document_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<StoreDocumentRequest>,
    ) -> (StatusCode, Json<ApiResponse<Value>>) {
        let result = async {
            let bytes = serde_json::to_vec(&payload.document)?;
            DIDDocument::from_slice(&bytes)?;
            let cid = state.backends.content.store(&bytes).await?;
            Ok::<_, MdipError>(json!({ "cid": cid, "url": format!("ipfs://{}", cid) }))
        }
        .await;
        respond(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock::{data, funding_transaction, pay, transaction, MockBackends};
    use crate::models::transaction::SignedTransaction;
    use crate::storage::DocumentStore;
    use crate::identifier::txref::TxRef;
    use crate::services::credential_issuer::DEFAULT_CREDENTIAL_TYPES;
    use crate::wallet::key_management::KeyManager;

    fn server(mocks: &MockBackends) -> Arc<ApiServer> {
        let types = DEFAULT_CREDENTIAL_TYPES.iter().map(|t| t.to_string()).collect();
        Arc::new(ApiServer::new(mocks.backends(), Network::Testnet, 1, types))
    }

    #[tokio::test]
    async fn test_read_did_envelope() {
        let mocks = MockBackends::new();
        mocks.bitcoin.push_block(vec![transaction(
            "anchor",
            &[],
            vec![pay(0, 600, "mvd6R8AfXQ5M7wQWb9YhUh5TCBBjFb2a9Z"), data(1, b"https://example.com/did.json")],
        )]);
        let did = format!("did:mdip:btc-{}", TxRef::new(Network::Testnet, 0, 0, 0).encode().unwrap());

        let (status, Json(response)) = ApiServer::read_did_handler(
            State(server(&mocks)),
            Query(ReadDidQuery { did }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
        assert_eq!(
            response.result.unwrap(),
            json!({"kind": "pointer", "value": "https://example.com/did.json"})
        );

        let (status, Json(response)) = ApiServer::read_did_handler(
            State(server(&mocks)),
            Query(ReadDidQuery { did: "did:other:1".into() }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().kind, "MalformedIdentifier");
    }

    #[tokio::test]
    async fn test_prepare_document_store_create() {
        let mocks = MockBackends::new();
        let payload: PrepareTransactionRequest = serde_json::from_value(json!({
            "blockchain": "mongodb",
            "type": "create",
            "publicKey": "02aa",
        }))
        .unwrap();

        let (status, Json(response)) =
            ApiServer::prepare_transaction_handler(State(server(&mocks)), Json(payload)).await;
        assert_eq!(status, StatusCode::OK);
        let result = response.result.unwrap();
        assert_eq!(result["kind"], "record");
        assert!(result["did"].as_str().unwrap().starts_with("did:mdip:mongodb-"));
    }

    #[tokio::test]
    async fn test_issue_claim_rejects_unknown_type() {
        let mocks = MockBackends::new();
        let key = KeyManager::generate();
        let payload: IssueClaimRequest = serde_json::from_value(json!({
            "attestorDID": "did:mdip:mongodb-0a0b",
            "requestorDID": "did:mdip:mongodb-0c0d",
            "claimType": "isAdmin",
            "claimData": true,
            "attestorName": "Attestor",
            "attestorPrivateKey": ethers_core::utils::hex::encode(key.secret_key().secret_bytes()),
        }))
        .unwrap();

        let (status, Json(response)) = ApiServer::issue_claim_handler(State(server(&mocks)), Json(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().kind, "UnsupportedClaimType");
    }

    #[tokio::test]
    async fn test_store_document_validates_schema() {
        let mocks = MockBackends::new();
        let document = serde_json::to_value(DIDDocument::initial_record("did:mdip:mongodb-0a0b", "02aa")).unwrap();

        let (status, Json(response)) = ApiServer::store_document_handler(
            State(server(&mocks)),
            Json(StoreDocumentRequest { document }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let result = response.result.unwrap();
        assert_eq!(result["url"], format!("ipfs://{}", result["cid"].as_str().unwrap()));

        let (status, _) = ApiServer::store_document_handler(
            State(server(&mocks)),
            Json(StoreDocumentRequest { document: json!({"id": "x"}) }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_broadcast_refuses_document_store() {
        let mocks = MockBackends::new();
        let payload = BroadcastRequest {
            blockchain: ChainTag::MongoDb,
            network: Network::Testnet,
            signed_tx: None,
            unsigned_tx: Value::Null,
            private_key: Some("00".into()),
        };
        let (_, Json(response)) = ApiServer::broadcast_handler(State(server(&mocks)), Json(payload)).await;
        assert_eq!(response.error.unwrap().kind, "UnsupportedOperation");
    }

    #[tokio::test]
    async fn test_broadcast_client_signed_transaction() {
        let mocks = MockBackends::new();
        let server = server(&mocks);
        let key = KeyManager::generate();
        let address = key.p2pkh_address(Network::Testnet);
        let request = CreateRequest {
            network: Network::Testnet,
            creator: address.to_string(),
            updater: address.to_string(),
            inputs: vec![funding_transaction(&address, 10_000).1],
            document_url: Some("https://example.com/did.json".into()),
            trust_document: true,
            ..Default::default()
        };
        let unsigned = server.preparer.prepare_create(ChainTag::Btc, &request).await.unwrap();
        let SignedTransaction::Utxo { txid, hex, .. } = signer::sign(&unsigned, &key.to_wif(Network::Testnet)).unwrap()
        else {
            panic!("expected a UTXO transaction");
        };

        let payload: BroadcastRequest = serde_json::from_value(json!({
            "blockchain": "btc",
            "signedTx": hex,
        }))
        .unwrap();
        let (status, Json(response)) = ApiServer::broadcast_handler(State(server.clone()), Json(payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.result.unwrap(), json!({ "txid": txid }));
        assert_eq!(mocks.bitcoin.broadcasts(), vec![hex]);

        let payload: BroadcastRequest = serde_json::from_value(json!({ "blockchain": "btc" })).unwrap();
        let (status, Json(response)) = ApiServer::broadcast_handler(State(server), Json(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().kind, "SchemaViolation");
    }

    #[tokio::test]
    async fn test_mint_did_route() {
        let mocks = MockBackends::new();
        mocks
            .documents
            .insert("0a0b", DIDDocument::initial_record("did:mdip:mongodb-0a0b", "02aa"))
            .await
            .unwrap();

        let payload = MintDidRequest {
            blockchain: ChainTag::MongoDb,
            tx: "0a0b".into(),
        };
        let (status, Json(response)) = ApiServer::mint_did_handler(State(server(&mocks)), Json(payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.result.unwrap(), json!({ "did": "did:mdip:mongodb-0a0b" }));
    }

    #[tokio::test]
    async fn test_ledger_queries() {
        let mocks = MockBackends::new();
        let address = KeyManager::generate().p2pkh_address(Network::Testnet);
        let (_, input) = funding_transaction(&address, 8_000);
        mocks.bitcoin.add_unspent(&address.to_string(), input.clone());
        mocks.bitcoin.push_block(vec![transaction("anchor", &[], vec![pay(0, 600, "controller")])]);
        let server = server(&mocks);

        let payload = FundingRequest {
            blockchain: ChainTag::Btc,
            network: Network::Testnet,
            address: address.to_string(),
        };
        let (status, Json(response)) = ApiServer::get_utxos_handler(State(server.clone()), Json(payload)).await;
        assert_eq!(status, StatusCode::OK);
        let quote = response.result.unwrap();
        assert_eq!(quote["totalSats"], 8_000);
        assert_eq!(quote["inputs"][0]["txid"], input.txid);

        let query = FundsQuery {
            blockchain: ChainTag::Btc,
            network: Network::Testnet,
            address: address.to_string(),
        };
        let (_, Json(response)) = ApiServer::get_funds_handler(State(server.clone()), Query(query)).await;
        assert_eq!(response.result.unwrap()["balanceSats"], 8_000);

        let payload = CheckConfsRequest {
            blockchain: ChainTag::Btc,
            txids: vec!["anchor".into(), "missing".into()],
        };
        let (_, Json(response)) = ApiServer::check_confs_handler(State(server.clone()), Json(payload)).await;
        assert_eq!(
            response.result.unwrap(),
            json!({ "valid": [{ "txid": "anchor", "confirmations": 1 }], "invalid": ["missing"] })
        );

        let query = TxDetailsQuery {
            blockchain: ChainTag::Eth,
            txid: "anchor".into(),
        };
        let (status, Json(response)) = ApiServer::tx_details_handler(State(server), Query(query)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().kind, "UnsupportedOperation");
    }
}
