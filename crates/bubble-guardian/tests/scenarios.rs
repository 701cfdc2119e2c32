//! Integration tests exercising the Guardian end-to-end against the
//! in-memory fixtures, covering the Guardian's numbered authorization
//! scenarios: create conflicts, permission gating, delegation expiry,
//! terminated-bubble reclaim, and subscription delivery.
//!
//! Every scenario signs requests for real (via `alloy-signer-local`) and
//! drives them through `Guardian::handle` exactly as a transport would,
//! rather than calling internals directly.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use bubble_crypto::canonical::{canonical_bytes, eip191_digest};
use bubble_crypto::eip712;
use bubble_guardian::data_server::{DataServerError, ListOptions, SilentOption};
use bubble_guardian::testing::{InMemoryBlockchainProvider, InMemoryDataServer};
use bubble_guardian::guardian::{Guardian, GuardianError, GuardianOutcome};
use bubble_guardian::DataServer;
use bubble_types::rpc::envelope::RequestParams;
use bubble_types::signature::{Signature, SignatureEnvelope, SignatureKind};
use bubble_types::{GuardianMethod, Path, Permissions};
use serde_json::Value;
use uuid::Uuid;

const CHAIN_ID: u64 = 8453;
const PROVIDER: &str = "https://guardian.example.com/";

fn contract() -> Address {
    Address::from_str("0x1234567890abcdef1234567890abcdef12345678").unwrap()
}

fn root() -> String {
    Path::root().as_str()
}

fn digest_for(kind: SignatureKind, payload: &bubble_types::rpc::envelope::CanonicalPayload<'_>) -> B256 {
    match kind {
        SignatureKind::Plain => keccak256(canonical_bytes(payload)),
        SignatureKind::Eip191 => eip191_digest(&canonical_bytes(payload)),
        SignatureKind::Eip712 => eip712::signing_hash(payload),
    }
}

/// Builds and signs a request for `method`, owned by `signer`.
fn build_request(
    signer: &PrivateKeySigner,
    method: GuardianMethod,
    nonce: &str,
    timestamp: u64,
    file: Option<String>,
    data: Option<String>,
    options: Option<Value>,
) -> RequestParams {
    let mut params = RequestParams {
        version: 1,
        timestamp,
        nonce: nonce.to_string(),
        chain_id: CHAIN_ID,
        contract: contract(),
        file,
        data,
        options,
        signatory: signer.address().to_string(),
        signature: SignatureEnvelope { kind: SignatureKind::Eip191, signature: format!("0x{}{}", "00".repeat(64), "1b") },
        delegate: None,
    };
    let payload = params.canonical_payload(method);
    let digest = digest_for(SignatureKind::Eip191, &payload);
    let sig = signer.sign_hash_sync(&digest).unwrap();
    params.signature = SignatureEnvelope { kind: SignatureKind::Eip191, signature: Signature::new(SignatureKind::Eip191, sig.as_bytes()).to_hex() };
    params
}

fn fixture() -> (Arc<InMemoryBlockchainProvider>, Arc<InMemoryDataServer>, Guardian<InMemoryBlockchainProvider, InMemoryDataServer>) {
    let chain = Arc::new(InMemoryBlockchainProvider::new(CHAIN_ID));
    let data = Arc::new(InMemoryDataServer::new());
    let guardian = Guardian::new(chain.clone(), data.clone(), PROVIDER, Duration::from_secs(300));
    (chain, data, guardian)
}

async fn expect_error(outcome: Result<GuardianOutcome, GuardianError>) -> GuardianError {
    match outcome {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    }
}

#[tokio::test]
async fn scenario_1_create_then_create_again_conflicts() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));

    let req = build_request(&owner, GuardianMethod::Create, "n1", 1_000, None, None, None);
    let outcome = guardian.handle(GuardianMethod::Create, &req, 1_000, Uuid::new_v4()).await.unwrap();
    assert!(matches!(outcome, GuardianOutcome::Result(Value::String(_))));

    let req2 = build_request(&owner, GuardianMethod::Create, "n2", 1_001, None, None, None);
    let err = expect_error(guardian.handle(GuardianMethod::Create, &req2, 1_001, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::BubbleAlreadyExists);

    let req3 = build_request(&owner, GuardianMethod::Create, "n3", 1_002, None, None, Some(serde_json::json!({"silent": true})));
    guardian.handle(GuardianMethod::Create, &req3, 1_002, Uuid::new_v4()).await.unwrap();
}

#[tokio::test]
async fn scenario_2_write_requires_permission_and_read_sees_it() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    let requester = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));
    guardian.handle(GuardianMethod::Create, &build_request(&owner, GuardianMethod::Create, "c1", 1_000, None, None, None), 1_000, Uuid::new_v4()).await.unwrap();

    let file1 = format!("{}/file1.txt", root());
    chain.grant(contract(), requester.address(), root(), Permissions::none().with_read(true));

    let denied = build_request(&requester, GuardianMethod::Write, "r1", 1_001, Some(file1.clone()), Some("hi".to_string()), None);
    let err = expect_error(guardian.handle(GuardianMethod::Write, &denied, 1_001, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::PermissionDenied);

    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));
    let owner_write = build_request(&owner, GuardianMethod::Write, "o1", 1_002, Some(file1.clone()), Some("hi".to_string()), None);
    guardian.handle(GuardianMethod::Write, &owner_write, 1_002, Uuid::new_v4()).await.unwrap();

    let read = build_request(&requester, GuardianMethod::Read, "r2", 1_003, Some(file1.clone()), None, None);
    let outcome = guardian.handle(GuardianMethod::Read, &read, 1_003, Uuid::new_v4()).await.unwrap();
    match outcome {
        GuardianOutcome::Result(Value::String(s)) => assert_eq!(s, "hi"),
        _ => panic!("expected a string result"),
    }
}

#[tokio::test]
async fn scenario_3_mkdir_permission_and_idempotence() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    let requester = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));
    guardian.handle(GuardianMethod::Create, &build_request(&owner, GuardianMethod::Create, "c1", 1_000, None, None, None), 1_000, Uuid::new_v4()).await.unwrap();

    let dir = format!("0x{}", "55".repeat(32));

    let owner_mkdir = build_request(&owner, GuardianMethod::Mkdir, "o1", 1_001, Some(dir.clone()), None, None);
    let err = expect_error(guardian.handle(GuardianMethod::Mkdir, &owner_mkdir, 1_001, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::PermissionDenied);

    chain.grant(contract(), requester.address(), dir.clone(), Permissions::none().with_write(true).with_directory(true));
    let req_mkdir = build_request(&requester, GuardianMethod::Mkdir, "r1", 1_002, Some(dir.clone()), None, None);
    guardian.handle(GuardianMethod::Mkdir, &req_mkdir, 1_002, Uuid::new_v4()).await.unwrap();

    let req_mkdir2 = build_request(&requester, GuardianMethod::Mkdir, "r2", 1_003, Some(dir.clone()), None, None);
    let err = expect_error(guardian.handle(GuardianMethod::Mkdir, &req_mkdir2, 1_003, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::DirectoryAlreadyExists);

    let req_mkdir3 = build_request(&requester, GuardianMethod::Mkdir, "r3", 1_004, Some(dir.clone()), None, Some(serde_json::json!({"silent": true})));
    guardian.handle(GuardianMethod::Mkdir, &req_mkdir3, 1_004, Uuid::new_v4()).await.unwrap();
}

#[tokio::test]
async fn scenario_4_listing_a_directory_reports_length_and_close_timestamps() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    let requester = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));
    guardian.handle(GuardianMethod::Create, &build_request(&owner, GuardianMethod::Create, "c1", 1_000, None, None, None), 1_000, Uuid::new_v4()).await.unwrap();

    let dir = format!("0x{}", "55".repeat(32));
    let dir_perms = Permissions::none().with_write(true).with_read(true).with_directory(true);
    chain.grant(contract(), requester.address(), dir.clone(), dir_perms);
    chain.grant(contract(), owner.address(), dir.clone(), dir_perms);

    let file = format!("{dir}/a.txt");
    let write = build_request(&requester, GuardianMethod::Write, "w1", 1_001, Some(file.clone()), Some("hello".to_string()), None);
    guardian.handle(GuardianMethod::Write, &write, 1_001, Uuid::new_v4()).await.unwrap();

    let list = build_request(&owner, GuardianMethod::List, "l1", 1_002, Some(dir.clone()), None, Some(serde_json::json!({"long": true})));
    let outcome = guardian.handle(GuardianMethod::List, &list, 1_002, Uuid::new_v4()).await.unwrap();
    let entries = match outcome {
        GuardianOutcome::Result(Value::Array(entries)) => entries,
        _ => panic!("expected a list result"),
    };
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry["name"], Value::String(file));
    assert_eq!(entry["type"], Value::String("file".to_string()));
    assert_eq!(entry["length"], Value::from(5));
    let created = entry["created"].as_i64().unwrap();
    let modified = entry["modified"].as_i64().unwrap();
    assert!((created - modified).abs() < 100);
}

#[tokio::test]
async fn scenario_5_listing_filters_by_modified_and_created_thresholds() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));
    guardian.handle(GuardianMethod::Create, &build_request(&owner, GuardianMethod::Create, "c1", 1_000, None, None, None), 1_000, Uuid::new_v4()).await.unwrap();

    let dir = format!("0x{}", "44".repeat(32));
    let dir_perms = Permissions::none().with_write(true).with_append(true).with_read(true).with_directory(true);
    chain.grant(contract(), owner.address(), dir.clone(), dir_perms);

    let f1 = format!("{dir}/f1");
    let f2 = format!("{dir}/f2");
    let f3 = format!("{dir}/f3");

    let mut nonce = 0u64;
    let mut ts = 1_001u64;
    let mut append = |file: &str, data: &str| {
        nonce += 1;
        ts += 1;
        let n = format!("n{nonce}");
        build_request(&owner, GuardianMethod::Append, &n, ts, Some(file.to_string()), Some(data.to_string()), None)
    };

    // Creation order: f1, f2, f3 ("hello world", "hello solar system", "hello universe").
    // A short sleep between each separates the in-memory store's wall-clock
    // `created`/`modified` stamps, which run off real time rather than the
    // synthetic `ts` used for nonce/replay bookkeeping above.
    let req = append(&f1, "hello world");
    guardian.handle(GuardianMethod::Append, &req, ts, Uuid::new_v4()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let req = append(&f2, "hello solar system");
    guardian.handle(GuardianMethod::Append, &req, ts, Uuid::new_v4()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let req = append(&f3, "hello universe");
    guardian.handle(GuardianMethod::Append, &req, ts, Uuid::new_v4()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let list_entries = |outcome: GuardianOutcome| -> Vec<Value> {
        match outcome {
            GuardianOutcome::Result(Value::Array(entries)) => entries,
            _ => panic!("expected a list result"),
        }
    };
    let created_of = |entries: &[Value], name: &str| -> i64 {
        entries.iter().find(|e| e["name"] == Value::String(name.to_string())).unwrap()["created"].as_i64().unwrap()
    };
    let modified_of = |entries: &[Value], name: &str| -> i64 {
        entries.iter().find(|e| e["name"] == Value::String(name.to_string())).unwrap()["modified"].as_i64().unwrap()
    };

    nonce += 1;
    ts += 1;
    let first_round_req = build_request(&owner, GuardianMethod::List, &format!("n{nonce}"), ts, Some(dir.clone()), None, Some(serde_json::json!({"long": true})));
    let first_round = list_entries(guardian.handle(GuardianMethod::List, &first_round_req, ts, Uuid::new_v4()).await.unwrap());
    let f1_created = created_of(&first_round, &f1);

    tokio::time::sleep(Duration::from_millis(5)).await;

    // Reverse-order second append round: f3, f2, f1, each with " again". f3 is
    // touched first and so ends up with the earliest `modified` of the three
    // once this round completes; f1, touched last, has the latest.
    let req = append(&f3, " again");
    guardian.handle(GuardianMethod::Append, &req, ts, Uuid::new_v4()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let req = append(&f2, " again");
    guardian.handle(GuardianMethod::Append, &req, ts, Uuid::new_v4()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let req = append(&f1, " again");
    guardian.handle(GuardianMethod::Append, &req, ts, Uuid::new_v4()).await.unwrap();

    nonce += 1;
    ts += 1;
    let second_round_req = build_request(&owner, GuardianMethod::List, &format!("n{nonce}"), ts, Some(dir.clone()), None, Some(serde_json::json!({"long": true})));
    let second_round = list_entries(guardian.handle(GuardianMethod::List, &second_round_req, ts, Uuid::new_v4()).await.unwrap());
    let f3_modified_after_second_round = modified_of(&second_round, &f3);

    nonce += 1;
    ts += 1;
    let after_req = build_request(
        &owner,
        GuardianMethod::List,
        &format!("n{nonce}"),
        ts,
        Some(dir.clone()),
        None,
        Some(serde_json::json!({"long": true, "after": f3_modified_after_second_round})),
    );
    let after_entries = list_entries(guardian.handle(GuardianMethod::List, &after_req, ts, Uuid::new_v4()).await.unwrap());
    let mut after_names: Vec<String> = after_entries.iter().map(|e| e["name"].as_str().unwrap().to_string()).collect();
    after_names.sort();
    let mut expected_after = vec![f1.clone(), f2.clone()];
    expected_after.sort();
    assert_eq!(after_names, expected_after);

    nonce += 1;
    ts += 1;
    let created_after_req = build_request(
        &owner,
        GuardianMethod::List,
        &format!("n{nonce}"),
        ts,
        Some(dir.clone()),
        None,
        Some(serde_json::json!({"long": true, "createdAfter": f1_created})),
    );
    let created_after_entries = list_entries(guardian.handle(GuardianMethod::List, &created_after_req, ts, Uuid::new_v4()).await.unwrap());
    let mut created_after_names: Vec<String> = created_after_entries.iter().map(|e| e["name"].as_str().unwrap().to_string()).collect();
    created_after_names.sort();
    let mut expected_created_after = vec![f2.clone(), f3.clone()];
    expected_created_after.sort();
    assert_eq!(created_after_names, expected_created_after);
}

#[tokio::test]
async fn scenario_6_terminated_bubble_rejects_everything_but_terminate() {
    let (chain, data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true).with_read(true));
    guardian.handle(GuardianMethod::Create, &build_request(&owner, GuardianMethod::Create, "c1", 1_000, None, None, None), 1_000, Uuid::new_v4()).await.unwrap();

    chain.terminate_bubble(contract(), &root());

    // The ACC already shows the bubble terminated, so even a read is
    // rejected — and the Guardian drains a best-effort reclaim on the
    // DataServer before returning, so the bubble is gone afterwards.
    let read = build_request(&owner, GuardianMethod::Read, "r1", 1_001, Some(root()), None, None);
    let err = expect_error(guardian.handle(GuardianMethod::Read, &read, 1_001, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::BubbleTerminated);
    let list_err = data.list(contract(), &root(), ListOptions::default()).await.unwrap_err();
    assert!(matches!(list_err, DataServerError::BubbleDoesNotExist));

    // A genuine (non-silent) `terminate` call against an already-reclaimed
    // bubble surfaces the DataServer's own BUBBLE_DOES_NOT_EXIST.
    let terminate = build_request(&owner, GuardianMethod::Terminate, "t1", 1_002, None, None, None);
    let err = expect_error(guardian.handle(GuardianMethod::Terminate, &terminate, 1_002, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::BubbleDoesNotExist);

    // Silenced, it is idempotent.
    let terminate_silent = build_request(
        &owner,
        GuardianMethod::Terminate,
        "t2",
        1_003,
        None,
        None,
        Some(serde_json::json!({"silent": true})),
    );
    let outcome = guardian.handle(GuardianMethod::Terminate, &terminate_silent, 1_003, Uuid::new_v4()).await.unwrap();
    assert!(matches!(outcome, GuardianOutcome::Result(Value::Null)));
}

#[tokio::test]
async fn scenario_7_delegation_grants_and_then_expires() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    let requester = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));
    guardian.handle(GuardianMethod::Create, &build_request(&owner, GuardianMethod::Create, "c1", 1_000, None, None, None), 1_000, Uuid::new_v4()).await.unwrap();

    let file1 = format!("{}/file1.txt", root());
    use bubble_types::signature::{AllScopes, DelegatedPermissions, Delegation};

    let expires = 2_000u64;
    let unsigned = Delegation {
        delegate: requester.address(),
        expires,
        permissions: DelegatedPermissions::All(AllScopes),
        signature: SignatureEnvelope { kind: SignatureKind::Eip191, signature: format!("0x{}{}", "00".repeat(64), "1b") },
    };
    let digest = bubble_crypto_delegation_digest(&unsigned);
    let sig = owner.sign_hash_sync(&digest).unwrap();
    let delegation = Delegation {
        signature: SignatureEnvelope { kind: SignatureKind::Eip191, signature: Signature::new(SignatureKind::Eip191, sig.as_bytes()).to_hex() },
        ..unsigned
    };

    let mut req = build_request(&requester, GuardianMethod::Write, "d1", 1_500, Some(file1.clone()), Some("hello".to_string()), None);
    req.delegate = Some(delegation.clone());
    let outcome = guardian.handle(GuardianMethod::Write, &req, 1_500, Uuid::new_v4()).await.unwrap();
    assert!(matches!(outcome, GuardianOutcome::Result(Value::String(_))));

    let mut req_late = build_request(&requester, GuardianMethod::Write, "d2", 2_500_000, Some(file1.clone()), Some("again".to_string()), None);
    req_late.delegate = Some(delegation);
    let err = expect_error(guardian.handle(GuardianMethod::Write, &req_late, 2_500_000, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::PermissionDenied);
}

fn bubble_crypto_delegation_digest(delegation: &bubble_types::signature::Delegation) -> B256 {
    #[derive(serde::Serialize)]
    struct Canonical<'a> {
        delegate: Address,
        expires: u64,
        permissions: &'a bubble_types::signature::DelegatedPermissions,
    }
    let bytes = serde_json::to_vec(&Canonical { delegate: delegation.delegate, expires: delegation.expires, permissions: &delegation.permissions }).unwrap();
    eip191_digest(&bytes)
}

#[tokio::test]
async fn scenario_8_subscription_delivers_write_notification() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true).with_read(true));
    guardian.handle(GuardianMethod::Create, &build_request(&owner, GuardianMethod::Create, "c1", 1_000, None, None, None), 1_000, Uuid::new_v4()).await.unwrap();

    let file1 = format!("{}/file1.txt", root());
    guardian
        .handle(
            GuardianMethod::Write,
            &build_request(&owner, GuardianMethod::Write, "w0", 1_001, Some(file1.clone()), Some("seed".to_string()), None),
            1_001,
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    let connection_id = Uuid::new_v4();
    let sub_req = build_request(&owner, GuardianMethod::Subscribe, "s1", 1_002, Some(file1.clone()), None, None);
    let outcome = guardian.handle(GuardianMethod::Subscribe, &sub_req, 1_002, connection_id).await.unwrap();
    let mut receiver = match outcome {
        GuardianOutcome::Subscribed { receiver, .. } => receiver,
        _ => panic!("expected a subscription"),
    };

    let write = build_request(&owner, GuardianMethod::Write, "w1", 1_003, Some(file1.clone()), Some("hello world".to_string()), None);
    guardian.handle(GuardianMethod::Write, &write, 1_003, Uuid::new_v4()).await.unwrap();

    let notification = receiver.recv().await.unwrap();
    assert_eq!(notification.event, bubble_guardian::subscription::NotificationEvent::Write);
    assert_eq!(notification.data.as_ref().and_then(Value::as_str), Some("hello world"));
}

#[tokio::test]
async fn replayed_nonce_is_rejected_as_authentication_failure() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));
    let req = build_request(&owner, GuardianMethod::Create, "dup", 1_000, None, None, None);
    guardian.handle(GuardianMethod::Create, &req, 1_000, Uuid::new_v4()).await.unwrap();

    let req2 = build_request(&owner, GuardianMethod::Create, "dup", 1_000, None, None, Some(serde_json::json!({"silent": true})));
    let err = expect_error(guardian.handle(GuardianMethod::Create, &req2, 1_000, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::AuthenticationFailure);
}

#[tokio::test]
async fn wrong_chain_id_is_rejected() {
    let (_chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    let mut req = build_request(&owner, GuardianMethod::Create, "x1", 1_000, None, None, None);
    req.chain_id = CHAIN_ID + 1;
    let err = expect_error(guardian.handle(GuardianMethod::Create, &req, 1_000, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::BlockchainNotSupported);
}

#[tokio::test]
async fn tampered_request_fails_authentication() {
    let (chain, _data, guardian) = fixture();
    let owner = PrivateKeySigner::random();
    chain.grant(contract(), owner.address(), root(), Permissions::none().with_write(true));
    let mut req = build_request(&owner, GuardianMethod::Create, "tamper", 1_000, None, None, None);
    req.nonce = "tampered".to_string();
    let err = expect_error(guardian.handle(GuardianMethod::Create, &req, 1_000, Uuid::new_v4()).await).await;
    assert_eq!(err.code, bubble_types::GuardianErrorCode::AuthenticationFailure);
}
