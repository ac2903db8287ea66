use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Bootstrap schema. The control panel owns real schema management; this only
/// makes a fresh database usable by the collector.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            path                TEXT NOT NULL UNIQUE,
            email               TEXT NOT NULL,
            pgp_key             TEXT,
            send_email_alerts   INTEGER NOT NULL DEFAULT 1,
            additional_js       TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS injection_requests (
            id              TEXT PRIMARY KEY,
            injection_key   TEXT NOT NULL UNIQUE,
            request         TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS payload_fire_results (
            id                  TEXT PRIMARY KEY,
            user_id             TEXT NOT NULL REFERENCES users(id),
            encrypted           INTEGER NOT NULL,
            screenshot_id       TEXT,
            url                 TEXT,
            ip_address          TEXT,
            referer             TEXT,
            user_agent          TEXT,
            cookies             TEXT,
            title               TEXT,
            secrets             TEXT,
            origin              TEXT,
            was_iframe          INTEGER,
            browser_timestamp   INTEGER,
            cors                TEXT,
            git_exposed         TEXT,
            correlated_request  TEXT,
            encrypted_data      TEXT,
            public_key          TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_payload_fire_results_user
            ON payload_fire_results(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
