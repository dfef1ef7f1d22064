use metrics::counter;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::db::{staged_trade_repo, token_repo, wallet_repo};
use crate::ingestion::payload::{parse_payload, RawSwap};
use crate::models::{BaseToken, NewStagedTrade, Side, Wallet};

/// Native balance movement at or below this is treated as transaction-fee
/// noise, not base-currency exposure.
fn fee_noise() -> Decimal {
    Decimal::new(1, 2) // 0.01 SOL
}

#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub staged: u32,
    pub duplicates: u32,
    pub skipped: u32,
}

/// Normalize one raw provider payload into staged trades.
///
/// Failures are isolated per sub-transaction: a malformed or untracked swap
/// is counted and skipped, and the rest of the batch proceeds.
pub async fn process_payload(
    pool: &PgPool,
    raw: &serde_json::Value,
) -> anyhow::Result<NormalizeOutcome> {
    let batch = match parse_payload(raw) {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable webhook payload, dropping");
            return Ok(NormalizeOutcome {
                skipped: 1,
                ..Default::default()
            });
        }
    };

    let mut outcome = NormalizeOutcome {
        skipped: batch.skipped,
        ..Default::default()
    };

    for swap in &batch.swaps {
        match stage_swap(pool, swap).await {
            Ok(StageResult::Staged) => {
                outcome.staged += 1;
                counter!("staged_trades_total").increment(1);
            }
            Ok(StageResult::Duplicate) => {
                // Duplicate delivery is a success by contract.
                outcome.duplicates += 1;
                tracing::debug!(signature = %swap.signature, "Duplicate swap delivery, no-op");
            }
            Ok(StageResult::Skipped(reason)) => {
                outcome.skipped += 1;
                tracing::debug!(signature = %swap.signature, reason, "Swap skipped");
            }
            Err(e) => {
                outcome.skipped += 1;
                tracing::error!(
                    error = %e,
                    signature = %swap.signature,
                    "Failed to stage swap, continuing batch"
                );
            }
        }
    }

    Ok(outcome)
}

enum StageResult {
    Staged,
    Duplicate,
    Skipped(&'static str),
}

async fn stage_swap(pool: &PgPool, swap: &RawSwap) -> anyhow::Result<StageResult> {
    let Some(wallet) = resolve_tracked_wallet(pool, swap).await? else {
        return Ok(StageResult::Skipped("no_tracked_wallet"));
    };

    let Some(classified) = classify(swap, &wallet.address) else {
        return Ok(StageResult::Skipped("no_token_delta"));
    };

    let token = token_repo::upsert_token(pool, &classified.mint, None, None).await?;

    let new = NewStagedTrade {
        tx_signature: swap.signature.clone(),
        wallet_id: wallet.id,
        token_id: token.id,
        side: classified.side,
        amount_token: classified.amount_token,
        amount_base_raw: classified.amount_base_raw,
        base_token: classified.base_token,
        price_base_per_token_raw: classified.price_base_per_token_raw,
        traded_at: swap.timestamp,
        dex: swap.dex.clone(),
    };

    match staged_trade_repo::insert_staged(pool, &new).await? {
        Some(staged) => {
            tracing::info!(
                wallet = %wallet.address,
                mint = %classified.mint,
                side = %staged.side,
                amount = %staged.amount_token,
                base = %staged.amount_base_raw,
                "Swap staged"
            );
            Ok(StageResult::Staged)
        }
        None => Ok(StageResult::Duplicate),
    }
}

/// Resolve the tracked wallet for a swap by probing, in order: the explicit
/// account-participant list, native SOL transfer parties, token transfer
/// parties. First tracked address wins.
async fn resolve_tracked_wallet(
    pool: &PgPool,
    swap: &RawSwap,
) -> anyhow::Result<Option<Wallet>> {
    let mut candidates: Vec<String> = Vec::new();
    for addr in swap
        .participants
        .iter()
        .chain(swap.native_transfer_parties.iter())
        .chain(swap.token_transfer_parties.iter())
    {
        if !candidates.contains(addr) {
            candidates.push(addr.clone());
        }
    }

    wallet_repo::find_tracked(pool, &candidates).await
}

#[derive(Debug, PartialEq)]
struct ClassifiedSwap {
    mint: String,
    side: Side,
    amount_token: Decimal,
    amount_base_raw: Decimal,
    base_token: BaseToken,
    price_base_per_token_raw: Option<Decimal>,
}

/// Classify a swap from the tracked wallet's own balance deltas.
///
/// The target token is the non-base mint with the largest absolute delta;
/// its sign gives the side. The base leg is the largest of the wallet's
/// native SOL delta (beyond fee noise) and its stable/WSOL token deltas.
/// No base leg means a token-for-token swap: `void`. Amounts are computed
/// strictly from deltas, never from provider USD fields, so the staged
/// ledger stays currency-pure.
fn classify(swap: &RawSwap, wallet_address: &str) -> Option<ClassifiedSwap> {
    let token_deltas = swap.token_deltas.get(wallet_address);
    let native_delta = swap
        .native_sol_deltas
        .get(wallet_address)
        .copied()
        .unwrap_or(Decimal::ZERO);

    // Target: largest non-base token movement.
    let (mint, token_delta) = token_deltas?
        .iter()
        .filter(|(mint, delta)| BaseToken::from_mint(mint).is_none() && !delta.is_zero())
        .max_by(|a, b| a.1.abs().cmp(&b.1.abs()))
        .map(|(m, d)| (m.clone(), *d))?;

    // Base leg candidates: native SOL beyond fee noise, plus any base-mint
    // token deltas (WSOL counts as SOL).
    let mut base_legs: Vec<(BaseToken, Decimal)> = Vec::new();
    if native_delta.abs() > fee_noise() {
        base_legs.push((BaseToken::Sol, native_delta));
    }
    for (m, d) in swap.token_deltas.get(wallet_address).into_iter().flatten() {
        if let Some(base) = BaseToken::from_mint(m) {
            if !d.is_zero() {
                base_legs.push((base, *d));
            }
        }
    }

    let base_leg = base_legs
        .into_iter()
        .max_by(|a, b| a.1.abs().cmp(&b.1.abs()));

    let amount_token = token_delta.abs();

    match base_leg {
        Some((base_token, base_delta)) => {
            let side = if token_delta > Decimal::ZERO {
                Side::Buy
            } else {
                Side::Sell
            };
            let amount_base_raw = base_delta.abs();
            let price = if amount_token.is_zero() {
                None
            } else {
                Some(amount_base_raw / amount_token)
            };

            Some(ClassifiedSwap {
                mint,
                side,
                amount_token,
                amount_base_raw,
                base_token,
                price_base_per_token_raw: price,
            })
        }
        // Zero net base exposure: token-for-token swap.
        None => Some(ClassifiedSwap {
            mint,
            side: Side::Void,
            amount_token,
            amount_base_raw: Decimal::ZERO,
            base_token: BaseToken::Sol,
            price_base_per_token_raw: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn swap_with_deltas(
        wallet: &str,
        native_sol: Decimal,
        tokens: &[(&str, Decimal)],
    ) -> RawSwap {
        let mut token_deltas = HashMap::new();
        let mut per_wallet: HashMap<String, Decimal> = HashMap::new();
        for (mint, delta) in tokens {
            per_wallet.insert((*mint).to_string(), *delta);
        }
        token_deltas.insert(wallet.to_string(), per_wallet);

        let mut native_sol_deltas = HashMap::new();
        if !native_sol.is_zero() {
            native_sol_deltas.insert(wallet.to_string(), native_sol);
        }

        RawSwap {
            signature: "sig".into(),
            timestamp: Utc::now(),
            dex: None,
            participants: vec![wallet.to_string()],
            native_sol_deltas,
            token_deltas,
            native_transfer_parties: vec![],
            token_transfer_parties: vec![],
        }
    }

    #[test]
    fn test_token_increase_with_sol_outflow_is_buy() {
        let swap = swap_with_deltas(
            "walletA",
            Decimal::new(-15, 1), // -1.5 SOL
            &[("MintX", Decimal::from(100))],
        );

        let c = classify(&swap, "walletA").expect("classified");
        assert_eq!(c.side, Side::Buy);
        assert_eq!(c.base_token, BaseToken::Sol);
        assert_eq!(c.amount_token, Decimal::from(100));
        assert_eq!(c.amount_base_raw, Decimal::new(15, 1));
        assert_eq!(c.price_base_per_token_raw, Some(Decimal::new(15, 3))); // 0.015
    }

    #[test]
    fn test_token_decrease_with_sol_inflow_is_sell() {
        let swap = swap_with_deltas(
            "walletA",
            Decimal::from(2),
            &[("MintX", Decimal::from(-50))],
        );

        let c = classify(&swap, "walletA").expect("classified");
        assert_eq!(c.side, Side::Sell);
        assert_eq!(c.amount_base_raw, Decimal::from(2));
    }

    #[test]
    fn test_stable_leg_beats_fee_noise() {
        // Paid in USDC; SOL only moved by the fee.
        let swap = swap_with_deltas(
            "walletA",
            Decimal::new(-5, 3), // -0.005 SOL fee
            &[
                ("MintX", Decimal::from(1000)),
                (crate::models::USDC_MINT, Decimal::from(-250)),
            ],
        );

        let c = classify(&swap, "walletA").expect("classified");
        assert_eq!(c.side, Side::Buy);
        assert_eq!(c.base_token, BaseToken::Usdc);
        assert_eq!(c.amount_base_raw, Decimal::from(250));
    }

    #[test]
    fn test_token_for_token_swap_is_void() {
        let swap = swap_with_deltas(
            "walletA",
            Decimal::new(-5, 3), // fee only
            &[
                ("MintX", Decimal::from(-10)),
                ("MintY", Decimal::from(500)),
            ],
        );

        let c = classify(&swap, "walletA").expect("classified");
        assert_eq!(c.side, Side::Void);
        assert_eq!(c.amount_base_raw, Decimal::ZERO);
        // Largest leg is the 500 MintY received.
        assert_eq!(c.mint, "MintY");
        assert_eq!(c.amount_token, Decimal::from(500));
    }

    #[test]
    fn test_wallet_without_token_delta_is_skipped() {
        let swap = swap_with_deltas("walletA", Decimal::from(-1), &[]);
        assert!(classify(&swap, "walletA").is_none());
        assert!(classify(&swap, "walletB").is_none());
    }
}
