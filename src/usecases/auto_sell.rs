//! Auto Sell - Delayed Exit After a Submitted Buy
//!
//! After the configured delay the seller looks up the bought token
//! balance (retrying while the account is not visible yet), prices the
//! exit from the pool vault reserves with a slippage floor, and submits
//! swap-out plus close-account as a tipped bundle.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::AutoSellConfig;
use crate::domain::bundle::{DispatchError, DispatchOutcome};
use crate::domain::swap::{PoolKeys, UserSwapAccounts, min_amount_out, swap_base_in};
use crate::ports::bundle_relay::BundleRelay;
use crate::ports::chain_reader::ChainReader;
use crate::ports::telemetry::Telemetry;

use super::dispatcher::{ExecutionContext, TippedSubmitter, compile_signed};

/// Timing and pricing for delayed sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellPolicy {
  pub delay: Duration,
  pub max_retry: u32,
  pub retry_delay: Duration,
  pub slippage_bps: u16,
  pub compute_unit_limit: u32,
}

impl From<&AutoSellConfig> for SellPolicy {
  fn from(config: &AutoSellConfig) -> Self {
    Self {
      delay: Duration::from_millis(config.delay_ms),
      max_retry: config.max_retry,
      retry_delay: Duration::from_millis(config.retry_delay_ms),
      slippage_bps: config.slippage_bps,
      compute_unit_limit: config.compute_unit_limit,
    }
  }
}

/// Terminal state of one delayed sell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellOutcome {
  /// Sell bundle accepted by the relay.
  Submitted { bundle_id: String },
  /// Nothing to sell (zero balance or account never appeared).
  NoBalance,
  /// Sell bundle was not submitted.
  Rejected(DispatchError),
  /// Shutdown interrupted the wait.
  Cancelled,
}

impl SellOutcome {
  /// Metric label for this outcome.
  pub fn label(&self) -> &'static str {
    match self {
      Self::Submitted { .. } => "submitted",
      Self::NoBalance => "no_balance",
      Self::Rejected(error) => error.label(),
      Self::Cancelled => "cancelled",
    }
  }
}

/// Sells the full position of a bought token after a delay.
pub struct AutoSeller<R: BundleRelay, C: ChainReader> {
  submitter: Arc<TippedSubmitter<R>>,
  reader: Arc<C>,
  context: Arc<ExecutionContext>,
  blockhash: watch::Receiver<Option<Hash>>,
  policy: SellPolicy,
  telemetry: Arc<dyn Telemetry>,
  shutdown: CancellationToken,
}

impl<R: BundleRelay, C: ChainReader> AutoSeller<R, C> {
  /// Create a seller sharing the buy path's submitter and context.
  pub fn new(
    submitter: Arc<TippedSubmitter<R>>,
    reader: Arc<C>,
    context: Arc<ExecutionContext>,
    blockhash: watch::Receiver<Option<Hash>>,
    policy: SellPolicy,
    telemetry: Arc<dyn Telemetry>,
    shutdown: CancellationToken,
  ) -> Self {
    Self {
      submitter,
      reader,
      context,
      blockhash,
      policy,
      telemetry,
      shutdown,
    }
  }

  /// Run `sell` for `keys` on its own task.
  pub fn schedule(self: &Arc<Self>, keys: PoolKeys) -> JoinHandle<SellOutcome> {
    let seller = Arc::clone(self);
    let cancel = self.shutdown.child_token();
    let span = info_span!("auto_sell", pool = %keys.id, base_mint = %keys.base_mint);

    tokio::spawn(
      async move {
        let outcome = seller.sell(&keys, &cancel).await;
        seller.telemetry.sell_finished(outcome.label());
        match &outcome {
          SellOutcome::Submitted { bundle_id } => info!(%bundle_id, "Sell bundle accepted by relay"),
          other => info!(outcome = other.label(), "Sell finished without submission"),
        }
        outcome
      }
      .instrument(span),
    )
  }

  /// Wait, look up the balance, and submit the sell.
  pub async fn sell(&self, keys: &PoolKeys, cancel: &CancellationToken) -> SellOutcome {
    if !pause(cancel, self.policy.delay).await {
      return SellOutcome::Cancelled;
    }

    let token_account = self.context.token_account(&keys.base_mint);
    let amount = match self.wait_for_balance(&token_account, cancel).await {
      Ok(Some(amount)) => amount,
      Ok(None) => return SellOutcome::NoBalance,
      Err(outcome) => return outcome,
    };

    match self.submit_sell(keys, &token_account, amount).await {
      DispatchOutcome::Submitted { bundle_id, .. } => SellOutcome::Submitted { bundle_id },
      DispatchOutcome::Rejected(error) => SellOutcome::Rejected(error),
    }
  }

  async fn wait_for_balance(
    &self,
    token_account: &Pubkey,
    cancel: &CancellationToken,
  ) -> Result<Option<u64>, SellOutcome> {
    for attempt in 1..=self.policy.max_retry {
      match self.reader.token_balance(token_account).await {
        Ok(Some(0)) => return Ok(None),
        Ok(Some(amount)) => return Ok(Some(amount)),
        Ok(None) => debug!(attempt, "Token account not visible yet"),
        Err(e) => warn!(attempt, error = %e, "Balance lookup failed"),
      }

      if attempt < self.policy.max_retry && !pause(cancel, self.policy.retry_delay).await {
        return Err(SellOutcome::Cancelled);
      }
    }
    Ok(None)
  }

  async fn submit_sell(&self, keys: &PoolKeys, token_account: &Pubkey, amount: u64) -> DispatchOutcome {
    match self.build_sell(keys, token_account, amount).await {
      Ok((transaction, blockhash)) => self.submitter.submit(&self.context, transaction, blockhash).await,
      Err(e) => DispatchOutcome::Rejected(e),
    }
  }

  async fn build_sell(
    &self,
    keys: &PoolKeys,
    token_account: &Pubkey,
    amount: u64,
  ) -> Result<(VersionedTransaction, Hash), DispatchError> {
    let base_reserve = self.vault_balance(&keys.base_vault).await?;
    let quote_reserve = self.vault_balance(&keys.quote_vault).await?;
    let min_out = min_amount_out(amount, base_reserve, quote_reserve, self.policy.slippage_bps);

    let blockhash = (*self.blockhash.borrow())
      .ok_or_else(|| DispatchError::Build("no blockhash observed yet".to_string()))?;

    let instructions = sell_instructions(&self.context, keys, token_account, amount, min_out, &self.policy)?;
    let transaction = compile_signed(&self.context.payer, &instructions, blockhash)?;
    Ok((transaction, blockhash))
  }

  async fn vault_balance(&self, vault: &Pubkey) -> Result<u64, DispatchError> {
    self
      .reader
      .token_balance(vault)
      .await
      .map_err(|e| DispatchError::Transport(e.to_string()))?
      .ok_or_else(|| DispatchError::Build(format!("pool vault {vault} not found")))
  }
}

/// Instructions for the sell: compute budget, swap out, close account.
pub fn sell_instructions(
  context: &ExecutionContext,
  keys: &PoolKeys,
  token_account: &Pubkey,
  amount: u64,
  min_out: u64,
  policy: &SellPolicy,
) -> Result<Vec<Instruction>, DispatchError> {
  let owner = context.owner();
  let user = UserSwapAccounts {
    source: *token_account,
    destination: context.quote_account,
    owner,
  };
  let close = spl_token::instruction::close_account(&spl_token::id(), token_account, &owner, &owner, &[])
    .map_err(|e| DispatchError::Build(e.to_string()))?;

  Ok(vec![
    ComputeBudgetInstruction::set_compute_unit_price(context.compute_unit_price),
    ComputeBudgetInstruction::set_compute_unit_limit(policy.compute_unit_limit),
    swap_base_in(keys, &user, amount, min_out),
    close,
  ])
}

/// Sleep for `duration`; `false` if cancelled first.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
  tokio::select! {
    biased;
    _ = cancel.cancelled() => false,
    _ = tokio::time::sleep(duration) => true,
  }
}
