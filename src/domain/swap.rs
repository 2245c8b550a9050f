//! Swap Construction - Raydium AMM v4 Pool Keys and Swap Instruction
//!
//! Derives the full account set of a pool from its streamed state plus
//! the minimal market subset, and builds the `swapBaseIn` instruction
//! (discriminator 9, 18 accounts, serum-backed v4 layout).

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

use super::layout::{LiquidityStateV4, MarketKeys};

/// Raydium liquidity pool v4 program.
pub const RAYDIUM_AMM_V4: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
/// OpenBook (Serum v3) DEX program.
pub const OPENBOOK_PROGRAM: Pubkey = pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");
/// Wrapped SOL mint.
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");
/// Circle USDC mint.
pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");

/// Raydium v4 trade fee: 25 / 10000.
const TRADE_FEE_NUMERATOR: u128 = 25;
const TRADE_FEE_DENOMINATOR: u128 = 10_000;

const SWAP_BASE_IN: u8 = 9;
const AMM_AUTHORITY_SEED: &[u8] = b"amm authority";

/// Every account the v4 swap instruction touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolKeys {
    pub id: Pubkey,
    pub program_id: Pubkey,
    pub authority: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub market_program_id: Pubkey,
    pub market_id: Pubkey,
    pub market_authority: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
}

impl PoolKeys {
    /// Combine a launched pool with its correlated market.
    ///
    /// Returns `None` if the market authority cannot be derived from the
    /// market's vault-signer nonce.
    pub fn derive(pool_id: Pubkey, pool: &LiquidityStateV4, market: &MarketKeys) -> Option<Self> {
        let (authority, _) = Pubkey::find_program_address(&[AMM_AUTHORITY_SEED], &RAYDIUM_AMM_V4);
        let market_authority =
            market_authority(&pool.market_id, &pool.market_program_id, market.vault_signer_nonce)?;

        Some(Self {
            id: pool_id,
            program_id: RAYDIUM_AMM_V4,
            authority,
            base_mint: pool.base_mint,
            quote_mint: pool.quote_mint,
            base_decimals: u8::try_from(pool.base_decimal).unwrap_or(u8::MAX),
            quote_decimals: u8::try_from(pool.quote_decimal).unwrap_or(u8::MAX),
            open_orders: pool.open_orders,
            target_orders: pool.target_orders,
            base_vault: pool.base_vault,
            quote_vault: pool.quote_vault,
            market_program_id: pool.market_program_id,
            market_id: pool.market_id,
            market_authority,
            market_base_vault: market.base_vault,
            market_quote_vault: market.quote_vault,
            market_bids: market.bids,
            market_asks: market.asks,
            market_event_queue: market.event_queue,
        })
    }
}

/// Vault signer of an OpenBook market.
///
/// Tries the recorded nonce first, then the first valid nonce below 100.
pub fn market_authority(market_id: &Pubkey, program_id: &Pubkey, nonce: u64) -> Option<Pubkey> {
    let derive = |n: u64| {
        Pubkey::create_program_address(&[market_id.as_ref(), &n.to_le_bytes()], program_id).ok()
    };
    derive(nonce).or_else(|| (0..100).find_map(derive))
}

/// Token accounts and owner taking part in a swap.
#[derive(Debug, Clone, Copy)]
pub struct UserSwapAccounts {
    pub source: Pubkey,
    pub destination: Pubkey,
    pub owner: Pubkey,
}

/// Build a `swapBaseIn` instruction (fixed input, minimum output).
pub fn swap_base_in(
    keys: &PoolKeys,
    user: &UserSwapAccounts,
    amount_in: u64,
    min_amount_out: u64,
) -> Instruction {
    let mut data = Vec::with_capacity(17);
    data.push(SWAP_BASE_IN);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_amount_out.to_le_bytes());

    let accounts = vec![
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new(keys.id, false),
        AccountMeta::new_readonly(keys.authority, false),
        AccountMeta::new(keys.open_orders, false),
        AccountMeta::new(keys.target_orders, false),
        AccountMeta::new(keys.base_vault, false),
        AccountMeta::new(keys.quote_vault, false),
        AccountMeta::new_readonly(keys.market_program_id, false),
        AccountMeta::new(keys.market_id, false),
        AccountMeta::new(keys.market_bids, false),
        AccountMeta::new(keys.market_asks, false),
        AccountMeta::new(keys.market_event_queue, false),
        AccountMeta::new(keys.market_base_vault, false),
        AccountMeta::new(keys.market_quote_vault, false),
        AccountMeta::new_readonly(keys.market_authority, false),
        AccountMeta::new(user.source, false),
        AccountMeta::new(user.destination, false),
        AccountMeta::new_readonly(user.owner, true),
    ];

    Instruction::new_with_bytes(keys.program_id, &data, accounts)
}

/// Constant-product output after the pool fee, reduced by slippage.
///
/// `slippage_bps` is in basis points (50 = 0.5%).
pub fn min_amount_out(amount_in: u64, reserve_in: u64, reserve_out: u64, slippage_bps: u16) -> u64 {
    let amount_in = u128::from(amount_in);
    let reserve_in = u128::from(reserve_in);
    let reserve_out = u128::from(reserve_out);

    let in_after_fee = amount_in * (TRADE_FEE_DENOMINATOR - TRADE_FEE_NUMERATOR) / TRADE_FEE_DENOMINATOR;
    let denominator = reserve_in + in_after_fee;
    if denominator == 0 {
        return 0;
    }
    let out = reserve_out * in_after_fee / denominator;
    let slippage = u128::from(slippage_bps.min(10_000));
    let min_out = out * (10_000 - slippage) / 10_000;
    u64::try_from(min_out).unwrap_or(u64::MAX)
}
