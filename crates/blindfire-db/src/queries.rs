use crate::Database;
use crate::models::{InjectionRequestRow, PayloadFireRow, UserRow};
use anyhow::Result;
use blindfire_types::models::{FireBody, InjectionRequest, PayloadFire, User};
use rusqlite::{Connection, OptionalExtension};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &User) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, path, email, pgp_key, send_email_alerts, additional_js)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    &user.id,
                    &user.path,
                    &user.email,
                    &user.pgp_key,
                    user.send_email_alerts,
                    &user.additional_js,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_path(&self, path: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_path(conn, path))
    }

    // -- Injection requests --

    pub fn insert_injection_request(&self, id: &str, injection_key: &str, request: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO injection_requests (id, injection_key, request) VALUES (?1, ?2, ?3)",
                (id, injection_key, request),
            )?;
            Ok(())
        })
    }

    pub fn get_injection_request(&self, injection_key: &str) -> Result<Option<InjectionRequestRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT injection_key, request FROM injection_requests WHERE injection_key = ?1",
                    [injection_key],
                    |row| {
                        Ok(InjectionRequestRow {
                            injection_key: row.get(0)?,
                            request: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Payload fires --

    /// Write one fire. Columns belonging to the other shape stay NULL.
    pub fn insert_payload_fire(&self, fire: &PayloadFire) -> Result<()> {
        let id = fire.id.to_string();
        let screenshot_id = fire.screenshot_id.map(|s| s.to_string());

        match &fire.body {
            FireBody::Plaintext(p) => {
                let secrets = serde_json::to_string(&p.secrets)?;
                self.with_conn_mut(|conn| {
                    conn.execute(
                        "INSERT INTO payload_fire_results (
                            id, user_id, encrypted, screenshot_id, url, ip_address, referer,
                            user_agent, cookies, title, secrets, origin, was_iframe,
                            browser_timestamp, cors, git_exposed, correlated_request
                         ) VALUES (?1, ?2, 0, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                        rusqlite::params![
                            &id,
                            &fire.user_id,
                            &screenshot_id,
                            &p.url,
                            &p.ip_address,
                            &p.referer,
                            &p.user_agent,
                            &p.cookies,
                            &p.title,
                            &secrets,
                            &p.origin,
                            p.was_iframe,
                            p.browser_timestamp,
                            &p.cors,
                            &p.git_exposed,
                            &p.correlated_request,
                        ],
                    )?;
                    Ok(())
                })
            }
            FireBody::Encrypted(e) => self.with_conn_mut(|conn| {
                conn.execute(
                    "INSERT INTO payload_fire_results (
                        id, user_id, encrypted, screenshot_id, encrypted_data, public_key,
                        correlated_request
                     ) VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        &id,
                        &fire.user_id,
                        &screenshot_id,
                        &e.encrypted_data,
                        &e.public_key,
                        &e.correlated_request,
                    ],
                )?;
                Ok(())
            }),
        }
    }

    pub fn get_payload_fires_for_user(&self, user_id: &str) -> Result<Vec<PayloadFireRow>> {
        self.with_conn(|conn| query_payload_fires(conn, user_id))
    }

    /// Cheap liveness probe for `/health`.
    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            path: row.path,
            pgp_key: row.pgp_key,
            send_email_alerts: row.send_email_alerts,
            additional_js: row.additional_js,
            email: row.email,
        }
    }
}

impl From<InjectionRequestRow> for InjectionRequest {
    fn from(row: InjectionRequestRow) -> Self {
        InjectionRequest {
            injection_key: row.injection_key,
            request: row.request,
        }
    }
}

fn query_user_by_path(conn: &Connection, path: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, email, pgp_key, send_email_alerts, additional_js FROM users WHERE path = ?1",
    )?;

    let row = stmt
        .query_row([path], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                path: row.get(1)?,
                email: row.get(2)?,
                pgp_key: row.get(3)?,
                send_email_alerts: row.get(4)?,
                additional_js: row.get(5)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn query_payload_fires(conn: &Connection, user_id: &str) -> Result<Vec<PayloadFireRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, encrypted, screenshot_id, url, ip_address, referer, user_agent,
                cookies, title, secrets, origin, was_iframe, browser_timestamp, cors,
                git_exposed, correlated_request, encrypted_data, public_key
         FROM payload_fire_results
         WHERE user_id = ?1
         ORDER BY created_at, rowid",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(PayloadFireRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                encrypted: row.get(2)?,
                screenshot_id: row.get(3)?,
                url: row.get(4)?,
                ip_address: row.get(5)?,
                referer: row.get(6)?,
                user_agent: row.get(7)?,
                cookies: row.get(8)?,
                title: row.get(9)?,
                secrets: row.get(10)?,
                origin: row.get(11)?,
                was_iframe: row.get(12)?,
                browser_timestamp: row.get(13)?,
                cors: row.get(14)?,
                git_exposed: row.get(15)?,
                correlated_request: row.get(16)?,
                encrypted_data: row.get(17)?,
                public_key: row.get(18)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blindfire_types::models::{EncryptedFire, PlaintextFire};
    use uuid::Uuid;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn user(id: &str, path: &str) -> User {
        User {
            id: id.into(),
            path: path.into(),
            pgp_key: None,
            send_email_alerts: true,
            additional_js: Some("https://example.com/extra.js".into()),
            email: "tester@example.com".into(),
        }
    }

    #[test]
    fn user_lookup_by_path() {
        let (_dir, db) = open();
        db.create_user(&user("u1", "abc")).unwrap();

        let found: User = db.get_user_by_path("abc").unwrap().unwrap().into();
        assert_eq!(found.id, "u1");
        assert!(found.send_email_alerts);
        assert_eq!(found.additional_js.as_deref(), Some("https://example.com/extra.js"));

        assert!(db.get_user_by_path("nope").unwrap().is_none());
    }

    #[test]
    fn injection_request_exact_match() {
        let (_dir, db) = open();
        db.insert_injection_request("r1", "abc123", "GET /vulnerable?x=1").unwrap();

        let row = db.get_injection_request("abc123").unwrap().unwrap();
        assert_eq!(row.request, "GET /vulnerable?x=1");
        assert!(db.get_injection_request("abc12").unwrap().is_none());
        assert!(db.get_injection_request("").unwrap().is_none());
    }

    #[test]
    fn plaintext_fire_leaves_ciphertext_columns_null() {
        let (_dir, db) = open();
        db.create_user(&user("u1", "abc")).unwrap();

        let fire = PayloadFire {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            screenshot_id: Some(Uuid::new_v4()),
            body: FireBody::Plaintext(PlaintextFire {
                url: "https://victim.example/admin".into(),
                ip_address: "203.0.113.9".into(),
                referer: String::new(),
                user_agent: "Mozilla/5.0".into(),
                cookies: "session=1".into(),
                title: "Admin".into(),
                secrets: serde_json::json!([{"type": "aws"}]),
                origin: "https://victim.example".into(),
                was_iframe: false,
                browser_timestamp: 1_700_000_000_000,
                cors: None,
                git_exposed: Some("[core]".into()),
                correlated_request: "GET /".into(),
            }),
        };
        db.insert_payload_fire(&fire).unwrap();

        let rows = db.get_payload_fires_for_user("u1").unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(!row.encrypted);
        assert_eq!(row.id, fire.id.to_string());
        assert_eq!(row.was_iframe, Some(false));
        assert_eq!(row.browser_timestamp, Some(1_700_000_000_000));
        assert_eq!(row.secrets.as_deref(), Some(r#"[{"type":"aws"}]"#));
        assert!(row.cors.is_none());
        assert_eq!(row.git_exposed.as_deref(), Some("[core]"));
        assert!(row.encrypted_data.is_none());
        assert!(row.public_key.is_none());
    }

    #[test]
    fn encrypted_fire_leaves_plaintext_columns_null() {
        let (_dir, db) = open();
        db.create_user(&user("u1", "abc")).unwrap();

        let fire = PayloadFire {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            screenshot_id: None,
            body: FireBody::Encrypted(EncryptedFire {
                encrypted_data: "cipher".into(),
                public_key: None,
                correlated_request: Some("GET /vulnerable?x=1".into()),
            }),
        };
        db.insert_payload_fire(&fire).unwrap();

        let row = db.get_payload_fires_for_user("u1").unwrap().remove(0);
        assert!(row.encrypted);
        assert!(row.screenshot_id.is_none());
        assert_eq!(row.encrypted_data.as_deref(), Some("cipher"));
        assert!(row.public_key.is_none());
        assert_eq!(row.correlated_request.as_deref(), Some("GET /vulnerable?x=1"));
        assert!(row.url.is_none());
        assert!(row.was_iframe.is_none());
    }

    #[test]
    fn ping_succeeds_on_open_database() {
        let (_dir, db) = open();
        db.ping().unwrap();
    }
}
