use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use blindfire_types::models::{FireBody, PayloadFire};
use serde_json::json;
use tracing::debug;

use crate::config::EmailConfig;

const EMAIL_TEMPLATE: &str = include_str!("../templates/fire_email.html");
const SUBJECT_PREFIX: &str = "[Blindfire] XSS Payload Fired";

/// Absolute links included in a notification.
#[derive(Debug, Clone)]
pub struct FireLinks {
    pub screenshot_url: Option<String>,
    pub service_url: String,
}

/// Delivery channel for "your payload fired" alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, fire: &PayloadFire, links: &FireLinks, recipient: &str) -> Result<()>;
}

/// Build the notifier for the configured provider, if notifications are on.
pub fn from_config(email: Option<&EmailConfig>) -> Option<Arc<dyn Notifier>> {
    email.map(|cfg| Arc::new(SendgridNotifier::new(cfg.clone())) as Arc<dyn Notifier>)
}

pub fn subject(fire: &PayloadFire) -> String {
    match &fire.body {
        FireBody::Plaintext(p) => format!("{} On {}", SUBJECT_PREFIX, p.url),
        FireBody::Encrypted(_) => format!("{} With An Encryption Key", SUBJECT_PREFIX),
    }
}

/// HTML body of the alert. Every value is escaped; ciphertext and keys keep
/// their line structure.
pub fn render_email(fire: &PayloadFire, links: &FireLinks) -> String {
    let fields: Vec<(&str, String)> = match &fire.body {
        FireBody::Plaintext(p) => {
            let mut fields = vec![
                ("URL", escape_html(&p.url)),
                ("IP Address", escape_html(&p.ip_address)),
                ("Referer", escape_html(&p.referer)),
                ("User Agent", escape_html(&p.user_agent)),
                ("Cookies", escape_html(&p.cookies)),
                ("Title", escape_html(&p.title)),
                ("Origin", escape_html(&p.origin)),
                ("Secrets", escape_html(&p.secrets.to_string())),
                ("In iframe", p.was_iframe.to_string()),
                ("Browser Time", p.browser_timestamp.to_string()),
            ];
            if let Some(cors) = &p.cors {
                fields.push(("CORS", escape_html(cors)));
            }
            if let Some(git) = &p.git_exposed {
                fields.push(("Exposed .git", escape_html(git)));
            }
            fields.push(("Injection Request", escape_html(&p.correlated_request)));
            fields
        }
        FireBody::Encrypted(e) => {
            let mut fields = vec![(
                "Encrypted Data",
                line_breaks(&escape_html(&e.encrypted_data)),
            )];
            if let Some(key) = &e.public_key {
                fields.push(("Public Key", line_breaks(&escape_html(key))));
            }
            if let Some(request) = &e.correlated_request {
                fields.push(("Injection Request", escape_html(request)));
            }
            fields
        }
    };

    let rows: String = fields
        .iter()
        .map(|(label, value)| format!("<tr><th>{}</th><td>{}</td></tr>\n", label, value))
        .collect();

    let screenshot = match &links.screenshot_url {
        Some(url) => format!(
            "<p><a href=\"{0}\"><img src=\"{0}\" alt=\"Screenshot\"></a></p>",
            escape_html(url)
        ),
        None => String::new(),
    };

    EMAIL_TEMPLATE
        .replace("{{fire_id}}", &fire.id.to_string())
        .replace("{{service_url}}", &escape_html(&links.service_url))
        .replace("{{screenshot}}", &screenshot)
        .replace("{{fields}}", &rows)
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn line_breaks(value: &str) -> String {
    value.replace("\r\n", "\n").replace('\n', "<br/>")
}

/// Alerts through the SendGrid v3 mail API.
pub struct SendgridNotifier {
    client: reqwest::Client,
    config: EmailConfig,
}

impl SendgridNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn message(&self, fire: &PayloadFire, links: &FireLinks, recipient: &str) -> serde_json::Value {
        let mut msg = json!({
            "personalizations": [{ "to": [{ "email": recipient }] }],
            "from": { "email": self.config.from },
            "subject": subject(fire),
            "content": [
                {
                    "type": "text/plain",
                    "value": "Only HTML reports are available, please use an email client which supports this.",
                },
                { "type": "text/html", "value": render_email(fire, links) },
            ],
        });
        if let Some(group_id) = self.config.unsubscribe_group_id {
            msg["asm"] = json!({ "group_id": group_id, "groups_to_display": [group_id] });
        }
        msg
    }
}

#[async_trait]
impl Notifier for SendgridNotifier {
    async fn send(&self, fire: &PayloadFire, links: &FireLinks, recipient: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.message(fire, links, recipient))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("SendGrid rejected message with {}: {}", status, detail);
        }
        debug!("Message emailed with status {}", status.as_u16());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blindfire_types::models::{EncryptedFire, PlaintextFire};
    use uuid::Uuid;

    fn plaintext() -> PayloadFire {
        PayloadFire {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            screenshot_id: Some(Uuid::new_v4()),
            body: FireBody::Plaintext(PlaintextFire {
                url: "http://google.com".into(),
                ip_address: "127.0.0.1".into(),
                referer: "http://google.com".into(),
                user_agent: "TruffleHog".into(),
                cookies: "a=<b>".into(),
                title: "Hello".into(),
                secrets: json!({}),
                origin: "http://google.com".into(),
                was_iframe: true,
                browser_timestamp: 1,
                cors: None,
                git_exposed: None,
                correlated_request: "GET /?q=\"x\"".into(),
            }),
        }
    }

    fn encrypted() -> PayloadFire {
        PayloadFire {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            screenshot_id: None,
            body: FireBody::Encrypted(EncryptedFire {
                encrypted_data: "line1\nline2".into(),
                public_key: Some("key1\r\nkey2".into()),
                correlated_request: Some("POST /comment".into()),
            }),
        }
    }

    fn links() -> FireLinks {
        FireLinks {
            screenshot_url: Some("https://x.example/screenshots/abc.png".into()),
            service_url: "https://x.example".into(),
        }
    }

    #[test]
    fn subject_names_url_or_encryption() {
        assert_eq!(
            subject(&plaintext()),
            "[Blindfire] XSS Payload Fired On http://google.com"
        );
        assert_eq!(
            subject(&encrypted()),
            "[Blindfire] XSS Payload Fired With An Encryption Key"
        );
    }

    #[test]
    fn plaintext_body_is_escaped() {
        let html = render_email(&plaintext(), &links());
        assert!(html.contains("a=&lt;b&gt;"));
        assert!(html.contains("GET /?q=&quot;x&quot;"));
        assert!(html.contains("https://x.example/screenshots/abc.png"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn encrypted_body_keeps_line_breaks() {
        let html = render_email(
            &encrypted(),
            &FireLinks {
                screenshot_url: None,
                service_url: "https://x.example".into(),
            },
        );
        assert!(html.contains("line1<br/>line2"));
        assert!(html.contains("key1<br/>key2"));
        assert!(html.contains("POST /comment"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn sendgrid_message_carries_unsubscribe_group() {
        let notifier = SendgridNotifier::new(EmailConfig {
            api_key: "SG.test".into(),
            from: "alerts@x.example".into(),
            unsubscribe_group_id: Some(7),
            endpoint: "http://127.0.0.1:9/v3/mail/send".into(),
        });
        let msg = notifier.message(&plaintext(), &links(), "tester@example.com");
        assert_eq!(msg["personalizations"][0]["to"][0]["email"], "tester@example.com");
        assert_eq!(msg["asm"]["group_id"], 7);
        assert_eq!(msg["subject"], "[Blindfire] XSS Payload Fired On http://google.com");
    }
}
