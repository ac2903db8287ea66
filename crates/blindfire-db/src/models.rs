/// Database row types. These map directly to SQLite rows.
/// Distinct from blindfire-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub path: String,
    pub email: String,
    pub pgp_key: Option<String>,
    pub send_email_alerts: bool,
    pub additional_js: Option<String>,
}

pub struct InjectionRequestRow {
    pub injection_key: String,
    pub request: String,
}

/// A stored fire as written, with every nullable column exposed as-is.
#[derive(Debug)]
pub struct PayloadFireRow {
    pub id: String,
    pub user_id: String,
    pub encrypted: bool,
    pub screenshot_id: Option<String>,
    pub url: Option<String>,
    pub ip_address: Option<String>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub cookies: Option<String>,
    pub title: Option<String>,
    pub secrets: Option<String>,
    pub origin: Option<String>,
    pub was_iframe: Option<bool>,
    pub browser_timestamp: Option<i64>,
    pub cors: Option<String>,
    pub git_exposed: Option<String>,
    pub correlated_request: Option<String>,
    pub encrypted_data: Option<String>,
    pub public_key: Option<String>,
}
