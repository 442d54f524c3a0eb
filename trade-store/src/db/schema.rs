use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Trades. Timestamps are epoch milliseconds of the naive (local) value.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS trades (
  storage_key INTEGER PRIMARY KEY AUTOINCREMENT,
  identifier BIGINT NOT NULL,
  version BIGINT NOT NULL,
  counterparty TEXT NOT NULL,
  book TEXT NOT NULL,
  created_at_ms BIGINT NOT NULL,
  maturity_ms BIGINT NOT NULL,
  active INTEGER NOT NULL CHECK (active IN (0,1)),
  revision BIGINT NOT NULL DEFAULT 0
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_trades_identifier_version ON trades(identifier, version);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_trades_active ON trades(active);"#)
        .execute(pool)
        .await?;

    Ok(())
}
