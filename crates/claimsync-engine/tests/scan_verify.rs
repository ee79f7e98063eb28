//! Scanner, verifier, and reindexer scenarios against the in-memory store.

mod common;

use std::sync::Arc;

use claimsync_chain::{ChainClient, ProviderPool, RpcError};
use claimsync_core::LedgerStore;
use claimsync_engine::{ClaimVerifier, EventScanner, LedgerWriter, Reindexer, ScanOutcome};
use claimsync_storage::MemoryStore;

use common::*;

const FIVE_TOKENS_WEI: u128 = 5_000_000_000_000_000_000;

struct Harness {
    chain: Arc<MockChain>,
    store: Arc<MemoryStore>,
    scanner: EventScanner,
    verifier: ClaimVerifier,
    reindexer: Reindexer,
}

fn harness(head: u64) -> Harness {
    let chain = Arc::new(MockChain::with_head(head));
    let as_client: Arc<dyn ChainClient> = chain.clone();
    let pool = Arc::new(ProviderPool::new(vec![as_client.clone()]));
    let store = Arc::new(MemoryStore::new());
    let config = test_config();
    let writer = Arc::new(LedgerWriter::new(
        store.clone(),
        as_client.clone(),
        config.clone(),
    ));
    Harness {
        scanner: EventScanner::new(pool, store.clone(), writer.clone(), config.clone()),
        verifier: ClaimVerifier::new(as_client.clone(), store.clone(), writer.clone(), config.clone()),
        reindexer: Reindexer::new(as_client, writer, config),
        chain,
        store,
    }
}

#[tokio::test]
async fn scan_window_is_confirmation_bounded() {
    let h = harness(1000);
    h.chain.push_logs(Ok(vec![]));

    // head 1000, 12 confirmations, cursor initialized to 900
    let outcome = h.scanner.tick().await.unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Advanced { from: 901, to: 988, events: 0 }
    );
    assert_eq!(h.chain.log_calls.lock().unwrap().as_slice(), &[(901, 988)]);

    let cursor = h.store.load_cursor("claims").await.unwrap().unwrap();
    assert_eq!(cursor.last_block, 988);

    // head has not moved; the next cycle is empty
    assert_eq!(h.scanner.tick().await.unwrap(), ScanOutcome::Empty);
}

#[tokio::test]
async fn range_limit_halves_span_and_retries() {
    let h = harness(1000);
    h.chain
        .push_logs(Err(RpcError::RangeLimited("query returned more than 10000 results".into())));
    h.chain.push_logs(Ok(vec![]));

    let outcome = h.scanner.tick().await.unwrap();
    // span 88 halves to 44 after the range fault
    assert_eq!(
        outcome,
        ScanOutcome::Advanced { from: 901, to: 944, events: 0 }
    );
    assert_eq!(
        h.chain.log_calls.lock().unwrap().as_slice(),
        &[(901, 988), (901, 944)]
    );

    let cursor = h.store.load_cursor("claims").await.unwrap().unwrap();
    assert_eq!(cursor.last_block, 944);

    // the remainder is picked up next cycle
    h.chain.push_logs(Ok(vec![]));
    assert_eq!(
        h.scanner.tick().await.unwrap(),
        ScanOutcome::Advanced { from: 945, to: 988, events: 0 }
    );
}

#[tokio::test]
async fn exhausted_fetch_cools_down_without_moving_cursor() {
    let h = harness(1000);
    for _ in 0..3 {
        h.chain
            .push_logs(Err(RpcError::RangeLimited("rate limit exceeded".into())));
    }

    assert_eq!(h.scanner.tick().await.unwrap(), ScanOutcome::CooledDown);
    // initialized to start_block, untouched by the failed fetch
    let cursor = h.store.load_cursor("claims").await.unwrap().unwrap();
    assert_eq!(cursor.last_block, 900);
}

#[tokio::test]
async fn claimed_event_writes_claim_user_and_referrer_rows() {
    let h = harness(1000);
    h.chain.add_tx(claim_tx("0xfeed", USER, REFERRER));
    h.chain
        .push_logs(Ok(vec![claimed_log(USER, FIVE_TOKENS_WEI, 950, "0xfeed")]));

    let outcome = h.scanner.tick().await.unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Advanced { from: 901, to: 988, events: 1 }
    );

    let claim = h.store.get_claim("0xfeed").await.unwrap().unwrap();
    assert_eq!(claim.address, USER);
    assert_eq!(claim.amount_wei, "5000000000000000000");
    assert_eq!(claim.referrer.as_deref(), Some(REFERRER));
    assert_eq!(claim.block_number, 950);
    assert!(claim.energy_awarded);

    let user = h.store.get_user(USER).await.unwrap().unwrap();
    assert_eq!(user.energy_total, 1.0);
    assert_eq!(user.referrer.as_deref(), Some(REFERRER));

    // first claim: invite plus referral bonus plus pipeline bonus
    let referrer = h.store.get_user(REFERRER).await.unwrap().unwrap();
    assert_eq!(referrer.invite_count, 1);
    assert_eq!(referrer.energy_total, 5.5);
}

#[tokio::test]
async fn reindex_replays_without_double_granting() {
    let h = harness(1000);
    let log = claimed_log(USER, FIVE_TOKENS_WEI, 950, "0xfeed");
    h.chain.add_tx(claim_tx("0xfeed", USER, REFERRER));
    h.chain.add_receipt(receipt_with("0xfeed", 950, vec![log.clone()]));
    h.chain.push_logs(Ok(vec![log]));
    h.scanner.tick().await.unwrap();

    let report = h.reindexer.reindex("0xfeed").await.unwrap();
    assert!(report.success);
    assert_eq!(report.results.len(), 1);
    assert!(report.results[0].ok);

    // the replay inserted nothing and granted nothing
    let user = h.store.get_user(USER).await.unwrap().unwrap();
    assert_eq!(user.energy_total, 1.0);
    let referrer = h.store.get_user(REFERRER).await.unwrap().unwrap();
    assert_eq!(referrer.invite_count, 1);
    assert_eq!(referrer.energy_total, 5.5);
}

#[tokio::test]
async fn reindex_reports_unrecognized_tx_as_failure() {
    let h = harness(1000);
    // only a token Transfer, nothing from the claim contract
    h.chain.add_receipt(receipt_with(
        "0xother",
        950,
        vec![transfer_log(PAYOUT, USER, FIVE_TOKENS_WEI)],
    ));

    let report = h.reindexer.reindex("0xother").await.unwrap();
    assert!(!report.success);
    assert!(report.message.contains("no recognized"));
}

#[tokio::test]
async fn cooldown_reset_grants_bonus_exactly_once() {
    let h = harness(1000);
    let log = cooldown_log(REFERRER, 960, "0xc001");
    h.chain.add_receipt(receipt_with("0xc001", 960, vec![log.clone()]));
    h.chain.push_logs(Ok(vec![log]));
    h.scanner.tick().await.unwrap();

    let referrer = h.store.get_user(REFERRER).await.unwrap().unwrap();
    assert_eq!(referrer.invite_count, 1);
    assert_eq!(referrer.energy_total, 10.0);

    let report = h.reindexer.reindex("0xc001").await.unwrap();
    assert!(report.success);
    let referrer = h.store.get_user(REFERRER).await.unwrap().unwrap();
    assert_eq!(referrer.invite_count, 1);
    assert_eq!(referrer.energy_total, 10.0);
}

#[tokio::test]
async fn verification_is_idempotent_across_repeat_calls() {
    let h = harness(1000);
    let log = claimed_log(USER, FIVE_TOKENS_WEI, 950, "0xfeed");
    h.chain.add_tx(claim_tx("0xfeed", USER, REFERRER));
    h.chain.add_receipt(receipt_with("0xfeed", 950, vec![log]));

    let first = h.verifier.verify("0xfeed", USER).await.unwrap();
    assert!(first.ok);
    assert!(!first.duplicated);
    assert_eq!(first.amount, 5.0);
    assert_eq!(first.unit, "CLM");
    assert_eq!(first.block_number, 950);

    for _ in 0..2 {
        let again = h.verifier.verify("0xfeed", USER).await.unwrap();
        assert!(again.duplicated);
        assert_eq!(again.amount, 5.0);
    }

    assert_eq!(h.store.count_claims(USER).await.unwrap(), 1);
    let user = h.store.get_user(USER).await.unwrap().unwrap();
    assert_eq!(user.energy_total, 1.0);
}

#[tokio::test]
async fn verification_rejects_foreign_transactions() {
    let h = harness(1000);
    let mut wrong_to = claim_tx("0xbad1", USER, REFERRER);
    wrong_to.to = Some(TOKEN.to_string());
    h.chain.add_tx(wrong_to);
    assert!(matches!(
        h.verifier.verify("0xbad1", USER).await,
        Err(claimsync_core::LedgerError::ToMismatch { .. })
    ));

    h.chain.add_tx(claim_tx("0xbad2", REFERRER, USER));
    assert!(matches!(
        h.verifier.verify("0xbad2", USER).await,
        Err(claimsync_core::LedgerError::FromMismatch { .. })
    ));

    // receipt present but no Claimed log for the caller
    h.chain.add_tx(claim_tx("0xbad3", USER, REFERRER));
    h.chain.add_receipt(receipt_with("0xbad3", 950, vec![]));
    assert!(matches!(
        h.verifier.verify("0xbad3", USER).await,
        Err(claimsync_core::LedgerError::EventNotFound { .. })
    ));

    assert!(h.store.get_claim("0xbad1").await.unwrap().is_none());
    assert!(h.store.get_claim("0xbad3").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_scan_and_verify_award_energy_once() {
    let h = harness(1000);
    let log = claimed_log(USER, FIVE_TOKENS_WEI, 950, "0xfeed");
    h.chain.add_tx(claim_tx("0xfeed", USER, REFERRER));
    h.chain.add_receipt(receipt_with("0xfeed", 950, vec![log.clone()]));
    h.chain.push_logs(Ok(vec![log]));

    let (scanned, verified) =
        tokio::join!(h.scanner.tick(), h.verifier.verify("0xfeed", USER));
    scanned.unwrap();
    verified.unwrap();

    assert_eq!(h.store.count_claims(USER).await.unwrap(), 1);
    let user = h.store.get_user(USER).await.unwrap().unwrap();
    assert_eq!(user.energy_total, 1.0);

    // the losing path granted no second set of referrer bonuses
    let referrer = h.store.get_user(REFERRER).await.unwrap().unwrap();
    assert_eq!(referrer.invite_count, 1);
    assert_eq!(referrer.energy_total, 5.5);
}
