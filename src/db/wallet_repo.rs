use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Wallet;

/// Insert a new tracked wallet or return the existing one by address.
pub async fn upsert_wallet(pool: &PgPool, address: &str, label: Option<&str>) -> anyhow::Result<Wallet> {
    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        INSERT INTO wallets (address, label, tracking_started_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (address) DO UPDATE SET updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(address)
    .bind(label)
    .fetch_one(pool)
    .await?;

    Ok(wallet)
}

/// Fetch a wallet by its address.
pub async fn get_wallet_by_address(pool: &PgPool, address: &str) -> anyhow::Result<Option<Wallet>> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE address = $1",
    )
    .bind(address)
    .fetch_optional(pool)
    .await?;

    Ok(wallet)
}

pub async fn get_wallet(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<Wallet>> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(wallet)
}

/// Fetch all active tracked wallets.
pub async fn get_active_wallets(pool: &PgPool) -> anyhow::Result<Vec<Wallet>> {
    let wallets = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE is_active = true ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(wallets)
}

/// Find which of the given addresses belongs to an active tracked wallet.
/// Returns the first match in the order the addresses were supplied, which
/// is how the normalizer's probe order is preserved.
pub async fn find_tracked(pool: &PgPool, addresses: &[String]) -> anyhow::Result<Option<Wallet>> {
    if addresses.is_empty() {
        return Ok(None);
    }

    let wallets = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE is_active = true AND address = ANY($1)",
    )
    .bind(addresses)
    .fetch_all(pool)
    .await?;

    for addr in addresses {
        if let Some(w) = wallets.iter().find(|w| &w.address == addr) {
            return Ok(Some(w.clone()));
        }
    }

    Ok(None)
}
