use sqlx::PgPool;

use crate::models::Token;

/// Insert a token on first sight of its mint, or return the existing row.
pub async fn upsert_token(
    pool: &PgPool,
    mint: &str,
    symbol: Option<&str>,
    decimals: Option<i32>,
) -> anyhow::Result<Token> {
    let token = sqlx::query_as::<_, Token>(
        r#"
        INSERT INTO tokens (mint, symbol, decimals)
        VALUES ($1, $2, $3)
        ON CONFLICT (mint) DO UPDATE
            SET symbol = COALESCE(tokens.symbol, $2),
                decimals = COALESCE(tokens.decimals, $3)
        RETURNING *
        "#,
    )
    .bind(mint)
    .bind(symbol)
    .bind(decimals)
    .fetch_one(pool)
    .await?;

    Ok(token)
}
