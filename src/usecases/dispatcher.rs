//! Bundle Dispatcher - Buy Construction and Atomic Submission
//!
//! On every correlated launch:
//! 1. Optionally rejects mints that carry a freeze authority
//! 2. Derives the full pool key set from pool + market
//! 3. Builds the buy (compute budget, idempotent ATA create, swap)
//! 4. Signs it against the latest observed blockhash
//! 5. Appends a tip transfer to a random allow-listed tip account
//! 6. Submits both as one bundle
//!
//! Every failure ends as `DispatchOutcome::Rejected` with a typed
//! reason; nothing is retried and nothing propagates to the caller.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{VersionedMessage, v0};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::config::ExecutionConfig;
use crate::domain::bundle::{Bundle, DispatchError, DispatchOutcome, TipAccounts};
use crate::domain::launch::MatchedLaunch;
use crate::domain::layout::MintInfo;
use crate::domain::quote::QuoteToken;
use crate::domain::swap::{PoolKeys, UserSwapAccounts, swap_base_in};
use crate::ports::bundle_relay::{BundleRelay, RelayError, RelayResponse};
use crate::ports::chain_reader::ChainReader;
use crate::ports::telemetry::Telemetry;

use super::auto_sell::AutoSeller;
use super::correlation::MatchDispatch;

/// Signing identity and buy parameters, passed explicitly to every build.
#[derive(Debug)]
pub struct ExecutionContext {
  /// Fee payer and token owner.
  pub payer: Arc<Keypair>,
  /// Quote currency.
  pub quote: QuoteToken,
  /// Payer's associated token account for the quote mint.
  pub quote_account: Pubkey,
  /// Raw quote amount spent per buy.
  pub amount_in: u64,
  /// Priority fee (micro-lamports per compute unit).
  pub compute_unit_price: u64,
  /// Compute unit limit for the buy.
  pub compute_unit_limit: u32,
  /// Tip per bundle (lamports).
  pub tip_lamports: u64,
  /// Tip allow-list.
  pub tip_accounts: TipAccounts,
  /// Reject mints with a freeze authority.
  pub check_freeze_authority: bool,
}

impl ExecutionContext {
  /// Build the context from configuration and a loaded keypair.
  ///
  /// # Errors
  /// Returns an error if the quote amount does not fit the quote decimals.
  pub fn from_config(
    payer: Arc<Keypair>,
    config: &ExecutionConfig,
    tip_accounts: TipAccounts,
  ) -> Result<Self> {
    let amount_in = config
      .quote_mint
      .to_raw(config.quote_amount)
      .with_context(|| format!("quote_amount {} out of range", config.quote_amount))?;
    let quote_account = get_associated_token_address(&payer.pubkey(), &config.quote_mint.mint());

    Ok(Self {
      payer,
      quote: config.quote_mint,
      quote_account,
      amount_in,
      compute_unit_price: config.compute_unit_price_micro_lamports,
      compute_unit_limit: config.compute_unit_limit,
      tip_lamports: config.tip_lamports,
      tip_accounts,
      check_freeze_authority: config.check_freeze_authority,
    })
  }

  /// Public key of the signing identity.
  pub fn owner(&self) -> Pubkey {
    self.payer.pubkey()
  }

  /// Payer's associated token account for `mint`.
  pub fn token_account(&self, mint: &Pubkey) -> Pubkey {
    get_associated_token_address(&self.owner(), mint)
  }
}

/// Compile a v0 message and sign it with the payer.
pub fn compile_signed(
  payer: &Keypair,
  instructions: &[Instruction],
  blockhash: Hash,
) -> Result<VersionedTransaction, DispatchError> {
  let message = v0::Message::try_compile(&payer.pubkey(), instructions, &[], blockhash)
    .map_err(|e| DispatchError::Build(e.to_string()))?;
  VersionedTransaction::try_new(VersionedMessage::V0(message), &[payer])
    .map_err(|e| DispatchError::Signing(e.to_string()))
}

/// Instructions for the buy: compute budget, ATA create, swap in.
pub fn buy_instructions(context: &ExecutionContext, keys: &PoolKeys) -> Vec<Instruction> {
  let owner = context.owner();
  let user = UserSwapAccounts {
    source: context.quote_account,
    destination: context.token_account(&keys.base_mint),
    owner,
  };

  vec![
    ComputeBudgetInstruction::set_compute_unit_price(context.compute_unit_price),
    ComputeBudgetInstruction::set_compute_unit_limit(context.compute_unit_limit),
    create_associated_token_account_idempotent(&owner, &owner, &keys.base_mint, &spl_token::id()),
    swap_base_in(keys, &user, context.amount_in, 0),
  ]
}

/// Appends the tip and hands bundles to the relay.
///
/// Shared by buys and delayed sells so both respect one submission limit.
pub struct TippedSubmitter<R: BundleRelay> {
  /// Block-engine relay.
  relay: Arc<R>,
  /// Optional local submission cap.
  limiter: Option<DefaultDirectRateLimiter>,
}

impl<R: BundleRelay> TippedSubmitter<R> {
  /// Create a submitter; `max_per_second == 0` disables the cap.
  pub fn new(relay: Arc<R>, max_per_second: u32) -> Self {
    let limiter = NonZeroU32::new(max_per_second).map(|n| RateLimiter::direct(Quota::per_second(n)));
    Self { relay, limiter }
  }

  /// Relay in use.
  pub fn relay(&self) -> &Arc<R> {
    &self.relay
  }

  /// Tip `primary`, submit the pair and map the verdict.
  pub async fn submit(
    &self,
    context: &ExecutionContext,
    primary: VersionedTransaction,
    blockhash: Hash,
  ) -> DispatchOutcome {
    match self.try_submit(context, primary, blockhash).await {
      Ok(outcome) => outcome,
      Err(e) => DispatchOutcome::Rejected(e),
    }
  }

  async fn try_submit(
    &self,
    context: &ExecutionContext,
    primary: VersionedTransaction,
    blockhash: Hash,
  ) -> Result<DispatchOutcome, DispatchError> {
    if let Some(limiter) = &self.limiter {
      if limiter.check().is_err() {
        return Err(DispatchError::RateLimited);
      }
    }

    let tip_account = context.tip_accounts.choose(&mut rand::thread_rng());
    let transfer = system_instruction::transfer(&context.owner(), &tip_account, context.tip_lamports);
    let tip = compile_signed(&context.payer, &[transfer], blockhash)?;
    let bundle = Bundle::new(vec![primary], tip, tip_account, context.tip_lamports)?;

    let response = self
      .relay
      .send_bundle(bundle.transactions())
      .await
      .map_err(|e| match e {
        RelayError::Encode(message) => DispatchError::Build(message),
        RelayError::Transport(message) | RelayError::Protocol(message) => DispatchError::Transport(message),
      })?;

    match response {
      RelayResponse::Accepted { bundle_id } => Ok(DispatchOutcome::Submitted {
        bundle_id,
        signature: bundle.primary_signature(),
      }),
      RelayResponse::Rejected { reason, tx_index } => Err(DispatchError::Rejected { reason, tx_index }),
    }
  }
}

/// Builds, signs, tips and submits a buy for each match.
pub struct BundleDispatcher<R: BundleRelay, C: ChainReader> {
  /// Shared tipping submitter.
  submitter: Arc<TippedSubmitter<R>>,
  /// Chain reads for the freeze check.
  reader: Arc<C>,
  /// Signing identity and buy parameters.
  context: Arc<ExecutionContext>,
  /// Latest observed blockhash.
  blockhash: watch::Receiver<Option<Hash>>,
  /// Outcome counters.
  telemetry: Arc<dyn Telemetry>,
  /// Delayed sell after a submitted buy.
  auto_sell: Option<Arc<AutoSeller<R, C>>>,
}

impl<R: BundleRelay, C: ChainReader> BundleDispatcher<R, C> {
  /// Create a dispatcher.
  pub fn new(
    submitter: Arc<TippedSubmitter<R>>,
    reader: Arc<C>,
    context: Arc<ExecutionContext>,
    blockhash: watch::Receiver<Option<Hash>>,
    telemetry: Arc<dyn Telemetry>,
  ) -> Self {
    Self {
      submitter,
      reader,
      context,
      blockhash,
      telemetry,
      auto_sell: None,
    }
  }

  /// Schedule a delayed sell after every submitted buy.
  pub fn with_auto_sell(mut self, seller: Arc<AutoSeller<R, C>>) -> Self {
    self.auto_sell = Some(seller);
    self
  }

  async fn buy(&self, keys: &PoolKeys) -> Result<DispatchOutcome, DispatchError> {
    if self.context.check_freeze_authority {
      self.check_freeze_authority(&keys.base_mint).await?;
    }

    let blockhash = (*self.blockhash.borrow())
      .ok_or_else(|| DispatchError::Build("no blockhash observed yet".to_string()))?;

    let instructions = buy_instructions(&self.context, keys);
    let transaction = compile_signed(&self.context.payer, &instructions, blockhash)?;
    Ok(self.submitter.submit(&self.context, transaction, blockhash).await)
  }

  async fn check_freeze_authority(&self, mint: &Pubkey) -> Result<(), DispatchError> {
    let data = self
      .reader
      .account_data(mint)
      .await
      .map_err(|e| DispatchError::Transport(e.to_string()))?;

    // Not visible yet at the read commitment; nothing to reject on.
    let Some(data) = data else {
      return Ok(());
    };

    let mint = MintInfo::decode(&data).map_err(|e| DispatchError::Build(e.to_string()))?;
    if mint.has_freeze_authority {
      return Err(DispatchError::FreezeAuthority);
    }
    Ok(())
  }

  fn finish(&self, started: Instant, outcome: DispatchOutcome) -> DispatchOutcome {
    let elapsed = started.elapsed();
    self.telemetry.dispatch_finished(outcome.label(), elapsed);

    match &outcome {
      DispatchOutcome::Submitted { bundle_id, signature } => {
        info!(
          %bundle_id,
          %signature,
          elapsed_ms = elapsed.as_millis() as u64,
          "Bundle accepted by relay"
        );
      }
      DispatchOutcome::Rejected(error) => {
        warn!(
          reason = error.label(),
          error = %error,
          elapsed_ms = elapsed.as_millis() as u64,
          "Bundle not submitted"
        );
      }
    }
    outcome
  }
}

#[async_trait]
impl<R: BundleRelay, C: ChainReader> MatchDispatch for BundleDispatcher<R, C> {
  #[instrument(skip_all, fields(pool = %matched.launch.pool_id, base_mint = %matched.launch.pool.base_mint))]
  async fn dispatch(&self, matched: MatchedLaunch) -> DispatchOutcome {
    let started = Instant::now();

    let Some(keys) = PoolKeys::derive(matched.launch.pool_id, &matched.launch.pool, &matched.market) else {
      let error = DispatchError::Build("market authority not derivable".to_string());
      return self.finish(started, DispatchOutcome::Rejected(error));
    };

    let outcome = match self.buy(&keys).await {
      Ok(outcome) => outcome,
      Err(e) => DispatchOutcome::Rejected(e),
    };
    let outcome = self.finish(started, outcome);

    if outcome.is_submitted() {
      if let Some(seller) = &self.auto_sell {
        drop(seller.schedule(keys));
      }
    }
    outcome
  }
}
