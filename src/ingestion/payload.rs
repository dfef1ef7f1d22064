use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is neither a JSON object nor an array")]
    UnsupportedShape,
}

/// Which wire shape a payload resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Enhanced,
    Rpc,
    /// Heartbeats, empty batches, shapes we don't recognize. Zero records.
    Unknown,
}

/// A provider-agnostic view of one swap transaction: who moved, and by how
/// much, in the transaction's own balance deltas. All downstream
/// classification works from this — never from provider USD fields.
#[derive(Debug, Clone)]
pub struct RawSwap {
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    pub dex: Option<String>,
    /// Explicit account-participant list, first probe for wallet resolution.
    pub participants: Vec<String>,
    /// Account → net SOL delta, in SOL units.
    pub native_sol_deltas: HashMap<String, Decimal>,
    /// Account → mint → net token delta, in UI units.
    pub token_deltas: HashMap<String, HashMap<String, Decimal>>,
    /// Accounts seen in native transfers, second probe.
    pub native_transfer_parties: Vec<String>,
    /// Accounts seen in token transfers, third probe.
    pub token_transfer_parties: Vec<String>,
}

impl RawSwap {
    fn new(signature: String, timestamp: DateTime<Utc>, dex: Option<String>) -> Self {
        Self {
            signature,
            timestamp,
            dex,
            participants: Vec::new(),
            native_sol_deltas: HashMap::new(),
            token_deltas: HashMap::new(),
            native_transfer_parties: Vec::new(),
            token_transfer_parties: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct NormalizedBatch {
    pub dialect: Dialect,
    pub swaps: Vec<RawSwap>,
    /// Sub-transactions dropped as malformed or non-swap. One bad
    /// transaction never aborts its batch.
    pub skipped: u32,
}

impl NormalizedBatch {
    fn empty(dialect: Dialect) -> Self {
        Self {
            dialect,
            swaps: Vec::new(),
            skipped: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Enhanced dialect (accountData + transactions)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnhancedEnvelope {
    #[serde(default)]
    transactions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnhancedTx {
    signature: String,
    #[serde(rename = "type")]
    tx_type: Option<String>,
    source: Option<String>,
    timestamp: Option<i64>,
    #[serde(default)]
    account_data: Vec<EnhancedAccountData>,
    #[serde(default)]
    native_transfers: Vec<NativeTransfer>,
    #[serde(default)]
    token_transfers: Vec<TokenTransfer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnhancedAccountData {
    account: String,
    #[serde(default)]
    native_balance_change: i64,
    #[serde(default)]
    token_balance_changes: Vec<TokenBalanceChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalanceChange {
    user_account: Option<String>,
    mint: String,
    raw_token_amount: RawTokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTokenAmount {
    token_amount: String,
    decimals: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeTransfer {
    from_user_account: Option<String>,
    to_user_account: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransfer {
    from_user_account: Option<String>,
    to_user_account: Option<String>,
}

// ---------------------------------------------------------------------------
// RPC dialect (transaction.message + meta)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcEnvelope {
    #[serde(default)]
    data: Vec<RpcBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    block_time: Option<i64>,
    #[serde(default)]
    transactions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTx {
    block_time: Option<i64>,
    transaction: RpcTransaction,
    meta: Option<RpcMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    #[serde(default)]
    signatures: Vec<String>,
    message: Option<RpcMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage {
    #[serde(default)]
    account_keys: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMeta {
    #[serde(default)]
    pre_balances: Vec<i64>,
    #[serde(default)]
    post_balances: Vec<i64>,
    #[serde(default)]
    pre_token_balances: Vec<RpcTokenBalance>,
    #[serde(default)]
    post_token_balances: Vec<RpcTokenBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTokenBalance {
    account_index: usize,
    mint: String,
    owner: Option<String>,
    ui_token_amount: Option<UiTokenAmount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiTokenAmount {
    ui_amount: Option<f64>,
    amount: Option<String>,
    decimals: u32,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Resolve a raw provider payload into a normalized batch.
///
/// Dialect detection is structural: an `Enhanced` envelope or transaction
/// list, an `RPC` envelope or transaction list, or `Unknown` (heartbeats and
/// shapes we don't recognize resolve to an empty batch, not an error).
pub fn parse_payload(raw: &serde_json::Value) -> Result<NormalizedBatch, ParseError> {
    match raw {
        serde_json::Value::Object(obj) => {
            if obj.contains_key("transactions") {
                if let Ok(envelope) = serde_json::from_value::<EnhancedEnvelope>(raw.clone()) {
                    return Ok(parse_enhanced_list(&envelope.transactions));
                }
            }
            if obj.contains_key("data") {
                if let Ok(envelope) = serde_json::from_value::<RpcEnvelope>(raw.clone()) {
                    return Ok(parse_rpc_envelope(&envelope));
                }
            }
            Ok(NormalizedBatch::empty(Dialect::Unknown))
        }
        serde_json::Value::Array(items) => {
            let Some(first) = items.iter().find_map(|v| v.as_object()) else {
                return Ok(NormalizedBatch::empty(Dialect::Unknown));
            };
            if first.contains_key("transaction") || first.contains_key("meta") {
                Ok(parse_rpc_list(items, None))
            } else if first.contains_key("signature") {
                Ok(parse_enhanced_list(items))
            } else {
                Ok(NormalizedBatch::empty(Dialect::Unknown))
            }
        }
        _ => Err(ParseError::UnsupportedShape),
    }
}

fn parse_enhanced_list(items: &[serde_json::Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::empty(Dialect::Enhanced);

    for item in items {
        let tx: EnhancedTx = match serde_json::from_value(item.clone()) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed enhanced transaction");
                batch.skipped += 1;
                continue;
            }
        };

        // Only swap-type transactions feed the ledger.
        if !tx
            .tx_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("swap"))
        {
            batch.skipped += 1;
            continue;
        }

        let timestamp = tx
            .timestamp
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .unwrap_or_else(Utc::now);

        let mut swap = RawSwap::new(tx.signature, timestamp, tx.source);

        for account in &tx.account_data {
            swap.participants.push(account.account.clone());
            if account.native_balance_change != 0 {
                swap.native_sol_deltas.insert(
                    account.account.clone(),
                    Decimal::new(account.native_balance_change, 9),
                );
            }
            for change in &account.token_balance_changes {
                let holder = change
                    .user_account
                    .clone()
                    .unwrap_or_else(|| account.account.clone());
                let Some(delta) = decimal_from_raw(
                    &change.raw_token_amount.token_amount,
                    change.raw_token_amount.decimals,
                ) else {
                    batch.skipped += 1;
                    continue;
                };
                *swap
                    .token_deltas
                    .entry(holder)
                    .or_default()
                    .entry(change.mint.clone())
                    .or_default() += delta;
            }
        }

        for transfer in &tx.native_transfers {
            if let Some(from) = &transfer.from_user_account {
                swap.native_transfer_parties.push(from.clone());
            }
            if let Some(to) = &transfer.to_user_account {
                swap.native_transfer_parties.push(to.clone());
            }
        }
        for transfer in &tx.token_transfers {
            if let Some(from) = &transfer.from_user_account {
                swap.token_transfer_parties.push(from.clone());
            }
            if let Some(to) = &transfer.to_user_account {
                swap.token_transfer_parties.push(to.clone());
            }
        }

        batch.swaps.push(swap);
    }

    batch
}

fn parse_rpc_envelope(envelope: &RpcEnvelope) -> NormalizedBatch {
    let mut batch = NormalizedBatch::empty(Dialect::Rpc);

    for block in &envelope.data {
        let inner = parse_rpc_list(&block.transactions, block.block_time);
        batch.swaps.extend(inner.swaps);
        batch.skipped += inner.skipped;
    }

    batch
}

fn parse_rpc_list(items: &[serde_json::Value], block_time: Option<i64>) -> NormalizedBatch {
    let mut batch = NormalizedBatch::empty(Dialect::Rpc);

    for item in items {
        let tx: RpcTx = match serde_json::from_value(item.clone()) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed RPC transaction");
                batch.skipped += 1;
                continue;
            }
        };

        match rpc_tx_to_swap(&tx, block_time) {
            Some(swap) if swap.looks_like_swap() => batch.swaps.push(swap),
            _ => batch.skipped += 1,
        }
    }

    batch
}

fn rpc_tx_to_swap(tx: &RpcTx, block_time: Option<i64>) -> Option<RawSwap> {
    let signature = tx.transaction.signatures.first()?.clone();
    let meta = tx.meta.as_ref()?;

    let account_keys: Vec<String> = tx
        .transaction
        .message
        .as_ref()
        .map(|m| {
            m.account_keys
                .iter()
                .filter_map(|k| match k {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Object(o) => {
                        o.get("pubkey").and_then(|v| v.as_str()).map(String::from)
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let timestamp = tx
        .block_time
        .or(block_time)
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_else(Utc::now);

    let mut swap = RawSwap::new(signature, timestamp, None);
    swap.participants = account_keys.clone();

    // Native deltas from pre/post lamport balances, indexed by account key.
    for (i, key) in account_keys.iter().enumerate() {
        let pre = meta.pre_balances.get(i).copied().unwrap_or(0);
        let post = meta.post_balances.get(i).copied().unwrap_or(pre);
        if post != pre {
            swap.native_sol_deltas
                .insert(key.clone(), Decimal::new(post - pre, 9));
        }
    }

    // Token deltas from pre/post token balances, keyed by owner when the
    // provider includes it, falling back to the token account's key.
    let mut pre_amounts: HashMap<(String, String), Decimal> = HashMap::new();
    for balance in &meta.pre_token_balances {
        if let Some((holder, amount)) = token_balance_entry(balance, &account_keys) {
            pre_amounts.insert((holder, balance.mint.clone()), amount);
        }
    }
    for balance in &meta.post_token_balances {
        let Some((holder, post)) = token_balance_entry(balance, &account_keys) else {
            continue;
        };
        let pre = pre_amounts
            .remove(&(holder.clone(), balance.mint.clone()))
            .unwrap_or(Decimal::ZERO);
        let delta = post - pre;
        if !delta.is_zero() {
            *swap
                .token_deltas
                .entry(holder)
                .or_default()
                .entry(balance.mint.clone())
                .or_default() += delta;
        }
    }
    // Accounts whose token balance went to zero appear only in pre.
    for ((holder, mint), pre) in pre_amounts {
        if !pre.is_zero() {
            *swap
                .token_deltas
                .entry(holder)
                .or_default()
                .entry(mint)
                .or_default() -= pre;
        }
    }

    Some(swap)
}

fn token_balance_entry(
    balance: &RpcTokenBalance,
    account_keys: &[String],
) -> Option<(String, Decimal)> {
    let holder = balance
        .owner
        .clone()
        .or_else(|| account_keys.get(balance.account_index).cloned())?;
    let ui = balance.ui_token_amount.as_ref()?;

    let amount = match ui.ui_amount {
        Some(f) => Decimal::try_from(f).ok()?,
        None => decimal_from_raw(ui.amount.as_deref()?, ui.decimals)?,
    };

    Some((holder, amount))
}

fn decimal_from_raw(raw: &str, decimals: u32) -> Option<Decimal> {
    let units: i128 = raw.parse().ok()?;
    Decimal::try_from_i128_with_scale(units, decimals).ok()
}

impl RawSwap {
    /// RPC payloads carry no transaction type; a swap is recognized by its
    /// balance shape: either two distinct mints moved, or one mint moved
    /// against a native SOL leg larger than fee noise.
    pub fn looks_like_swap(&self) -> bool {
        let mut mints: Vec<&str> = Vec::new();
        for per_account in self.token_deltas.values() {
            for (mint, delta) in per_account {
                if !delta.is_zero() && !mints.contains(&mint.as_str()) {
                    mints.push(mint);
                }
            }
        }

        if mints.len() >= 2 {
            return true;
        }
        if mints.len() == 1 {
            let fee_noise = Decimal::new(1, 2); // 0.01 SOL
            return self
                .native_sol_deltas
                .values()
                .any(|d| d.abs() > fee_noise);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enhanced_swap_tx(signature: &str, wallet: &str, mint: &str, token_delta: &str) -> serde_json::Value {
        json!({
            "signature": signature,
            "type": "SWAP",
            "source": "JUPITER",
            "timestamp": 1_700_000_000,
            "accountData": [
                {
                    "account": wallet,
                    "nativeBalanceChange": -1_000_000_000i64,
                    "tokenBalanceChanges": [
                        {
                            "userAccount": wallet,
                            "mint": mint,
                            "rawTokenAmount": { "tokenAmount": token_delta, "decimals": 6 }
                        }
                    ]
                }
            ],
            "nativeTransfers": [
                { "fromUserAccount": wallet, "toUserAccount": "pool", "amount": 1_000_000_000i64 }
            ],
            "tokenTransfers": [
                { "fromUserAccount": "pool", "toUserAccount": wallet, "mint": mint, "tokenAmount": 100.0 }
            ]
        })
    }

    #[test]
    fn test_enhanced_envelope_parses() {
        let payload = json!({
            "accountData": [],
            "transactions": [enhanced_swap_tx("sig1", "walletA", "MintX", "100000000")]
        });

        let batch = parse_payload(&payload).expect("parse");
        assert_eq!(batch.dialect, Dialect::Enhanced);
        assert_eq!(batch.swaps.len(), 1);

        let swap = &batch.swaps[0];
        assert_eq!(swap.signature, "sig1");
        assert_eq!(swap.dex.as_deref(), Some("JUPITER"));
        assert_eq!(
            swap.native_sol_deltas.get("walletA"),
            Some(&Decimal::new(-1_000_000_000, 9))
        );
        assert_eq!(
            swap.token_deltas["walletA"]["MintX"],
            Decimal::from(100)
        );
    }

    #[test]
    fn test_enhanced_bare_array_parses() {
        let payload = json!([enhanced_swap_tx("sig2", "walletA", "MintX", "5000000")]);

        let batch = parse_payload(&payload).expect("parse");
        assert_eq!(batch.dialect, Dialect::Enhanced);
        assert_eq!(batch.swaps.len(), 1);
        assert_eq!(batch.swaps[0].token_deltas["walletA"]["MintX"], Decimal::from(5));
    }

    #[test]
    fn test_non_swap_transactions_are_filtered() {
        let mut tx = enhanced_swap_tx("sig3", "walletA", "MintX", "100");
        tx["type"] = json!("TRANSFER");
        let payload = json!({ "transactions": [tx] });

        let batch = parse_payload(&payload).expect("parse");
        assert!(batch.swaps.is_empty());
        assert_eq!(batch.skipped, 1);
    }

    #[test]
    fn test_malformed_transaction_does_not_abort_batch() {
        let payload = json!({
            "transactions": [
                { "bogus": true },
                enhanced_swap_tx("sig4", "walletA", "MintX", "1000000")
            ]
        });

        let batch = parse_payload(&payload).expect("parse");
        assert_eq!(batch.swaps.len(), 1);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.swaps[0].signature, "sig4");
    }

    #[test]
    fn test_heartbeat_yields_empty_batch() {
        let payload = json!({ "status": "ok" });
        let batch = parse_payload(&payload).expect("parse");
        assert_eq!(batch.dialect, Dialect::Unknown);
        assert!(batch.swaps.is_empty());
    }

    #[test]
    fn test_scalar_payload_is_unsupported() {
        assert!(parse_payload(&json!(42)).is_err());
    }

    fn rpc_tx(signature: &str, wallet: &str, mint: &str) -> serde_json::Value {
        json!({
            "blockTime": 1_700_000_100,
            "transaction": {
                "signatures": [signature],
                "message": { "accountKeys": [wallet, "pool"] }
            },
            "meta": {
                "preBalances": [5_000_000_000i64, 0],
                "postBalances": [3_000_000_000i64, 2_000_000_000i64],
                "preTokenBalances": [
                    {
                        "accountIndex": 0,
                        "mint": mint,
                        "owner": wallet,
                        "uiTokenAmount": { "uiAmount": 0.0, "amount": "0", "decimals": 6 }
                    }
                ],
                "postTokenBalances": [
                    {
                        "accountIndex": 0,
                        "mint": mint,
                        "owner": wallet,
                        "uiTokenAmount": { "uiAmount": 200.0, "amount": "200000000", "decimals": 6 }
                    }
                ]
            }
        })
    }

    #[test]
    fn test_rpc_envelope_parses() {
        let payload = json!({
            "data": [ { "blockTime": 1_700_000_100, "transactions": [rpc_tx("sigR", "walletB", "MintY")] } ]
        });

        let batch = parse_payload(&payload).expect("parse");
        assert_eq!(batch.dialect, Dialect::Rpc);
        assert_eq!(batch.swaps.len(), 1);

        let swap = &batch.swaps[0];
        assert_eq!(swap.signature, "sigR");
        assert_eq!(swap.token_deltas["walletB"]["MintY"], Decimal::from(200));
        assert_eq!(
            swap.native_sol_deltas.get("walletB"),
            Some(&Decimal::new(-2_000_000_000, 9))
        );
    }

    #[test]
    fn test_rpc_bare_array_parses() {
        let payload = json!([rpc_tx("sigR2", "walletB", "MintY")]);
        let batch = parse_payload(&payload).expect("parse");
        assert_eq!(batch.dialect, Dialect::Rpc);
        assert_eq!(batch.swaps.len(), 1);
    }

    #[test]
    fn test_rpc_fee_only_movement_is_not_a_swap() {
        // One mint, native movement under fee noise: a dusting transfer.
        let payload = json!([{
            "transaction": { "signatures": ["sigT"], "message": { "accountKeys": ["walletB"] } },
            "meta": {
                "preBalances": [1_000_000_000i64],
                "postBalances": [999_995_000i64],
                "preTokenBalances": [],
                "postTokenBalances": [
                    {
                        "accountIndex": 0,
                        "mint": "MintY",
                        "owner": "walletB",
                        "uiTokenAmount": { "uiAmount": 5.0, "amount": "5000000", "decimals": 6 }
                    }
                ]
            }
        }]);

        let batch = parse_payload(&payload).expect("parse");
        assert!(batch.swaps.is_empty());
        assert_eq!(batch.skipped, 1);
    }
}
