//! Integration Tests - End-to-end Pipeline Component Testing
//!
//! Tests the interaction between usecases, ports, and mock adapters.
//! Uses mockall for trait mocking and tokio::test (paused clock) for
//! the correlation timing properties.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::VersionedTransaction;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use launch_sniper::config::ExecutionConfig;
use launch_sniper::domain::bundle::{DispatchError, DispatchOutcome, TipAccounts};
use launch_sniper::domain::launch::{AbandonReason, CorrelationOutcome, LaunchEvent, MatchedLaunch};
use launch_sniper::domain::layout::{LiquidityStateV4, MINT_LEN, MarketStateV3, fixtures, market_offsets, mint_offsets};
use launch_sniper::domain::leader_schedule::{AlwaysAttempt, LeaderGate, LeaderScheduleSet, ScheduleGate};
use launch_sniper::domain::quote::QuoteToken;
use launch_sniper::domain::ring_buffer::RingBuffer;
use launch_sniper::domain::swap::{OPENBOOK_PROGRAM, WSOL_MINT};
use launch_sniper::ports::account_stream::{AccountUpdate, StreamRecord};
use launch_sniper::ports::bundle_relay::{RelayError, RelayResponse};
use launch_sniper::ports::telemetry::NoopTelemetry;
use launch_sniper::usecases::correlation::{CorrelationEngine, MatchDispatch, PollBudget};
use launch_sniper::usecases::dispatcher::{BundleDispatcher, ExecutionContext, TippedSubmitter};
use launch_sniper::usecases::subscriber::{LaunchSink, StreamSubscriber};

// ---- Mock Definitions ----

mock! {
    pub Relay {}

    #[async_trait::async_trait]
    impl launch_sniper::ports::bundle_relay::BundleRelay for Relay {
        async fn send_bundle(
            &self,
            transactions: &[VersionedTransaction],
        ) -> Result<RelayResponse, RelayError>;

        async fn tip_accounts(&self) -> Result<Vec<Pubkey>, RelayError>;
    }
}

mock! {
    pub Reader {}

    #[async_trait::async_trait]
    impl launch_sniper::ports::chain_reader::ChainReader for Reader {
        async fn account_data(&self, address: &Pubkey) -> anyhow::Result<Option<Vec<u8>>>;
        async fn token_balance(&self, token_account: &Pubkey) -> anyhow::Result<Option<u64>>;
        async fn latest_blockhash(&self) -> anyhow::Result<Hash>;
        async fn leader_slots(&self, identities: &[Pubkey]) -> anyhow::Result<Vec<u64>>;
    }
}

/// Records matches instead of submitting them.
#[derive(Default)]
struct RecordingDispatch(Mutex<Vec<MatchedLaunch>>);

#[async_trait]
impl MatchDispatch for RecordingDispatch {
    async fn dispatch(&self, matched: MatchedLaunch) -> DispatchOutcome {
        self.0.lock().push(matched);
        DispatchOutcome::Submitted {
            bundle_id: "recorded".into(),
            signature: Signature::default(),
        }
    }
}

// ---- Helpers ----

fn context(check_freeze_authority: bool) -> Arc<ExecutionContext> {
    let config = ExecutionConfig {
        keypair_path: None,
        quote_mint: QuoteToken::Wsol,
        quote_amount: dec!(0.01),
        compute_unit_price_micro_lamports: 100_000,
        compute_unit_limit: 60_000,
        tip_lamports: 150_000,
        check_freeze_authority,
    };
    let tips = TipAccounts::new((0..8).map(|_| Pubkey::new_unique()).collect()).unwrap();
    Arc::new(ExecutionContext::from_config(Arc::new(Keypair::new()), &config, tips).unwrap())
}

fn launch(base_mint: &Pubkey, market_id: &Pubkey, slot: u64) -> LaunchEvent {
    let data = fixtures::pool_bytes(base_mint, &WSOL_MINT, market_id, &OPENBOOK_PROGRAM);
    LaunchEvent {
        pool_id: Pubkey::new_unique(),
        slot,
        pool: LiquidityStateV4::decode(&data).unwrap(),
    }
}

fn matched_launch() -> MatchedLaunch {
    let base = Pubkey::new_unique();
    let market_id = Pubkey::new_unique();
    let market = MarketStateV3::decode(&fixtures::market_bytes(&market_id, &base, &WSOL_MINT)).unwrap();
    MatchedLaunch {
        launch: launch(&base, &market_id, 1),
        market: market.keys(),
    }
}

fn dispatcher(
    relay: MockRelay,
    reader: MockReader,
    blockhash: Option<Hash>,
    context: Arc<ExecutionContext>,
    max_per_second: u32,
) -> BundleDispatcher<MockRelay, MockReader> {
    let (_tx, rx) = watch::channel(blockhash);
    BundleDispatcher::new(
        Arc::new(TippedSubmitter::new(Arc::new(relay), max_per_second)),
        Arc::new(reader),
        context,
        rx,
        Arc::new(NoopTelemetry),
    )
}

fn engine<D: MatchDispatch>(
    ring: &Arc<RingBuffer>,
    gate: Arc<dyn LeaderGate>,
    dispatch: Arc<D>,
) -> CorrelationEngine<D> {
    CorrelationEngine::new(
        Arc::clone(ring),
        gate,
        dispatch,
        PollBudget {
            interval: Duration::from_millis(10),
            max_attempts: 2,
        },
        Arc::new(NoopTelemetry),
        CancellationToken::new(),
    )
}

fn market_ring() -> Arc<RingBuffer> {
    Arc::new(RingBuffer::with_key_offset(64, market_offsets::BASE_MINT))
}

// ---- Bundle Dispatch ----

#[tokio::test]
async fn test_rejection_of_one_transaction_fails_whole_bundle() {
    let mut relay = MockRelay::new();
    relay
        .expect_send_bundle()
        .withf(|txs: &[VersionedTransaction]| txs.len() == 2)
        .times(1)
        .returning(|_| {
            Ok(RelayResponse::Rejected {
                reason: "bundle simulation failed".into(),
                tx_index: Some(1),
            })
        });

    let dispatcher = dispatcher(relay, MockReader::new(), Some(Hash::new_unique()), context(false), 0);
    let outcome = dispatcher.dispatch(matched_launch()).await;

    assert!(!outcome.is_submitted());
    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(DispatchError::Rejected {
            reason: "bundle simulation failed".into(),
            tx_index: Some(1),
        })
    );
}

#[tokio::test]
async fn test_accepted_bundle_reports_primary_signature_and_tips_last() {
    let seen = Arc::new(Mutex::new(Vec::<VersionedTransaction>::new()));
    let context = context(false);
    let tip_list = context.tip_accounts.as_slice().to_vec();

    let mut relay = MockRelay::new();
    let captured = Arc::clone(&seen);
    relay.expect_send_bundle().times(1).returning(move |txs| {
        captured.lock().extend_from_slice(txs);
        Ok(RelayResponse::Accepted {
            bundle_id: "bundle-1".into(),
        })
    });

    let dispatcher = dispatcher(relay, MockReader::new(), Some(Hash::new_unique()), context, 0);
    let outcome = dispatcher.dispatch(matched_launch()).await;

    let txs = seen.lock();
    assert_eq!(txs.len(), 2);
    assert_eq!(
        outcome,
        DispatchOutcome::Submitted {
            bundle_id: "bundle-1".into(),
            signature: txs[0].signatures[0],
        }
    );

    // Last transaction is a single system transfer to an allow-listed tip account.
    let tip = &txs[1];
    let keys = tip.message.static_account_keys();
    let instructions = tip.message.instructions();
    assert_eq!(instructions.len(), 1);
    assert_eq!(*instructions[0].program_id(keys), solana_sdk::system_program::id());
    let recipient = keys[usize::from(instructions[0].accounts[1])];
    assert!(tip_list.contains(&recipient));
}

#[tokio::test]
async fn test_transport_failure_is_swallowed_as_rejection() {
    let mut relay = MockRelay::new();
    relay
        .expect_send_bundle()
        .times(1)
        .returning(|_| Err(RelayError::Transport("connection reset".into())));

    let dispatcher = dispatcher(relay, MockReader::new(), Some(Hash::new_unique()), context(false), 0);
    let outcome = dispatcher.dispatch(matched_launch()).await;

    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(DispatchError::Transport("connection reset".into()))
    );
}

#[tokio::test]
async fn test_no_blockhash_means_no_submission() {
    let mut relay = MockRelay::new();
    relay.expect_send_bundle().times(0);

    let dispatcher = dispatcher(relay, MockReader::new(), None, context(false), 0);
    let outcome = dispatcher.dispatch(matched_launch()).await;

    assert!(matches!(outcome, DispatchOutcome::Rejected(DispatchError::Build(_))));
}

#[tokio::test]
async fn test_freeze_authority_blocks_buy() {
    let mut relay = MockRelay::new();
    relay.expect_send_bundle().times(0);

    let mut reader = MockReader::new();
    reader.expect_account_data().times(1).returning(|_| {
        let mut mint = vec![0u8; MINT_LEN];
        mint[mint_offsets::FREEZE_AUTHORITY_OPTION] = 1;
        Ok(Some(mint))
    });

    let dispatcher = dispatcher(relay, reader, Some(Hash::new_unique()), context(true), 0);
    let outcome = dispatcher.dispatch(matched_launch()).await;

    assert_eq!(outcome, DispatchOutcome::Rejected(DispatchError::FreezeAuthority));
}

#[tokio::test]
async fn test_missing_mint_account_does_not_block_buy() {
    let mut relay = MockRelay::new();
    relay.expect_send_bundle().times(1).returning(|_| {
        Ok(RelayResponse::Accepted {
            bundle_id: "bundle-2".into(),
        })
    });

    let mut reader = MockReader::new();
    reader.expect_account_data().times(1).returning(|_| Ok(None));

    let dispatcher = dispatcher(relay, reader, Some(Hash::new_unique()), context(true), 0);
    assert!(dispatcher.dispatch(matched_launch()).await.is_submitted());
}

#[tokio::test]
async fn test_submission_rate_limit() {
    let mut relay = MockRelay::new();
    relay.expect_send_bundle().times(1).returning(|_| {
        Ok(RelayResponse::Accepted {
            bundle_id: "only-one".into(),
        })
    });

    let dispatcher = dispatcher(relay, MockReader::new(), Some(Hash::new_unique()), context(false), 1);

    assert!(dispatcher.dispatch(matched_launch()).await.is_submitted());
    assert_eq!(
        dispatcher.dispatch(matched_launch()).await,
        DispatchOutcome::Rejected(DispatchError::RateLimited)
    );
}

// ---- Correlation Timing ----

#[tokio::test(start_paused = true)]
async fn test_market_inserted_before_first_poll_matches() {
    let ring = market_ring();
    let recorder = Arc::new(RecordingDispatch::default());
    let engine = engine(&ring, Arc::new(AlwaysAttempt), Arc::clone(&recorder));

    let base = Pubkey::new_unique();
    let market_id = Pubkey::new_unique();
    let handle = engine.spawn(launch(&base, &market_id, 1));

    tokio::time::sleep(Duration::from_millis(5)).await;
    ring.enqueue(fixtures::market_bytes(&market_id, &base, &WSOL_MINT));

    let outcome = handle.await.unwrap();
    assert!(outcome.is_matched());
    assert_eq!(ring.lookups(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_market_inserted_after_both_polls_is_abandoned() {
    let ring = market_ring();
    let recorder = Arc::new(RecordingDispatch::default());
    let engine = engine(&ring, Arc::new(AlwaysAttempt), Arc::clone(&recorder));

    let base = Pubkey::new_unique();
    let market_id = Pubkey::new_unique();
    let handle = engine.spawn(launch(&base, &market_id, 1));

    tokio::time::sleep(Duration::from_millis(25)).await;
    ring.enqueue(fixtures::market_bytes(&market_id, &base, &WSOL_MINT));

    let outcome = handle.await.unwrap();
    assert_eq!(
        outcome,
        CorrelationOutcome::Abandoned(AbandonReason::Exhausted { attempts: 2 })
    );
    assert_eq!(ring.lookups(), 2);
    assert!(recorder.0.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_launches_resolve_independently() {
    let ring = market_ring();
    let recorder = Arc::new(RecordingDispatch::default());
    let engine = engine(&ring, Arc::new(AlwaysAttempt), Arc::clone(&recorder));

    let found_base = Pubkey::new_unique();
    let found_market = Pubkey::new_unique();
    ring.enqueue(fixtures::market_bytes(&found_market, &found_base, &WSOL_MINT));

    let start = tokio::time::Instant::now();
    let missing = engine.spawn(launch(&Pubkey::new_unique(), &Pubkey::new_unique(), 1));
    let found = engine.spawn(launch(&found_base, &found_market, 1));

    let found_outcome = found.await.unwrap();
    assert!(found_outcome.is_matched());
    // First poll, not the whole budget.
    assert!(start.elapsed() < Duration::from_millis(20));

    let missing_outcome = missing.await.unwrap();
    assert!(matches!(
        missing_outcome,
        CorrelationOutcome::Abandoned(AbandonReason::Exhausted { .. })
    ));

    tokio::time::sleep(Duration::from_millis(1)).await;
    let dispatched = recorder.0.lock();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].launch.pool.base_mint, found_base);
}

#[tokio::test(start_paused = true)]
async fn test_closed_gate_skips_ring_lookup() {
    let ring = market_ring();
    let recorder = Arc::new(RecordingDispatch::default());
    let schedule = Arc::new(LeaderScheduleSet::new());
    let engine = engine(&ring, Arc::new(ScheduleGate::new(schedule)), Arc::clone(&recorder));

    let base = Pubkey::new_unique();
    let market_id = Pubkey::new_unique();
    ring.enqueue(fixtures::market_bytes(&market_id, &base, &WSOL_MINT));

    let outcome = engine.spawn(launch(&base, &market_id, 42)).await.unwrap();

    assert_eq!(outcome, CorrelationOutcome::Abandoned(AbandonReason::GateClosed));
    assert_eq!(ring.lookups(), 0);
    assert!(recorder.0.lock().is_empty());
}

// ---- Full Pipeline ----

#[tokio::test(start_paused = true)]
async fn test_stream_records_flow_to_relay() {
    let mut relay = MockRelay::new();
    relay.expect_send_bundle().times(1).returning(|_| {
        Ok(RelayResponse::Accepted {
            bundle_id: "pipeline".into(),
        })
    });

    let (blockhash_tx, blockhash_rx) = watch::channel(None);
    let dispatcher = BundleDispatcher::new(
        Arc::new(TippedSubmitter::new(Arc::new(relay), 0)),
        Arc::new(MockReader::new()),
        context(false),
        blockhash_rx,
        Arc::new(NoopTelemetry),
    );

    let ring = market_ring();
    let sink: Arc<dyn LaunchSink> = Arc::new(engine(&ring, Arc::new(AlwaysAttempt), Arc::new(dispatcher)));
    let subscriber = StreamSubscriber::new("pipeline", Arc::clone(&ring), sink, blockhash_tx, Arc::new(NoopTelemetry));

    let base = Pubkey::new_unique();
    let market_id = Pubkey::new_unique();
    let record = |data: Vec<u8>| {
        StreamRecord::Account(AccountUpdate {
            slot: 7,
            pubkey: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            data,
        })
    };

    subscriber.handle(StreamRecord::BlockMeta {
        slot: 7,
        blockhash: Hash::new_unique(),
    });
    subscriber.handle(record(fixtures::market_bytes(&market_id, &base, &WSOL_MINT)));
    subscriber.handle(record(fixtures::pool_bytes(&base, &WSOL_MINT, &market_id, &OPENBOOK_PROGRAM)));

    // Poll at 10ms, dispatch right after; the mock checks the call count on drop.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ring.lookups(), 1);
}
