use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use blindfire_types::models::User;
use tracing::info;

/// The probe script served to victims, with its placeholder tokens intact.
///
/// Substitution is literal string replacement so already-deployed probes keep
/// working as long as the tokens are unchanged.
#[derive(Clone)]
pub struct ProbeTemplate {
    body: Arc<str>,
}

impl ProbeTemplate {
    pub fn new(body: impl Into<Arc<str>>) -> Self {
        Self { body: body.into() }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let body = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading probe template {}", path.display()))?;
        info!("Loaded probe template from {} ({} bytes)", path.display(), body.len());
        Ok(Self::new(body))
    }

    /// Fill in the template for one user and probe instance.
    pub fn render(&self, host_url: &str, user: &User, probe_id: &str) -> String {
        let chainload = user.additional_js.as_deref().unwrap_or_default();
        self.body
            .replace("[HOST_URL]", host_url)
            .replacen("[COLLECT_PAGE_LIST_REPLACE_ME]", "[]", 1)
            .replace("[USER_PATH]", &user.path)
            .replacen("[pgp_key]", user.pgp_key.as_deref().unwrap_or_default(), 1)
            .replacen("[CHAINLOAD_REPLACE_ME]", &json_string(chainload), 1)
            .replacen("[PROBE_ID]", &json_string(probe_id), 1)
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u1".into(),
            path: "abc".into(),
            pgp_key: None,
            send_email_alerts: false,
            additional_js: Some("https://cdn.example/x.js".into()),
            email: "t@example.com".into(),
        }
    }

    #[test]
    fn replaces_every_token() {
        let template = ProbeTemplate::new(
            "var h='[HOST_URL]';var h2='[HOST_URL]/[USER_PATH]';var p=[COLLECT_PAGE_LIST_REPLACE_ME];\
             var k=`[pgp_key]`;var c=[CHAINLOAD_REPLACE_ME];var i=[PROBE_ID];var u='[USER_PATH]';",
        );
        let out = template.render("https://x.example", &user(), "abc");
        assert_eq!(
            out,
            "var h='https://x.example';var h2='https://x.example/abc';var p=[];\
             var k=``;var c=\"https://cdn.example/x.js\";var i=\"abc\";var u='abc';"
        );
    }

    #[test]
    fn chainload_and_probe_id_are_json_quoted() {
        let mut u = user();
        u.additional_js = None;
        let out = ProbeTemplate::new("[CHAINLOAD_REPLACE_ME]|[PROBE_ID]").render("h", &u, "a\"b");
        assert_eq!(out, "\"\"|\"a\\\"b\"");
    }
}
