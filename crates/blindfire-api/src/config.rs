use std::path::PathBuf;

use anyhow::{Context, Result, bail};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
const DEFAULT_SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// Process-wide settings, read once at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Host header the probe calls back on. Anything else is foreign traffic.
    pub xss_hostname: String,
    /// Public hostname used in links inside notifications.
    pub hostname: String,
    /// Serve plain `http://` URLs instead of `https://`.
    pub development: bool,
    /// Where uncompressed screenshot uploads land before compression.
    pub upload_tmp_dir: PathBuf,
    pub storage: StorageConfig,
    /// `None` when email notifications are disabled.
    pub email: Option<EmailConfig>,
    pub probe_path: PathBuf,
    pub trust_proxy: bool,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local {
        dir: PathBuf,
    },
    Bucket {
        bucket: String,
        endpoint: String,
        token: Option<String>,
        staging_dir: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub from: String,
    pub unsubscribe_group_id: Option<i64>,
    pub endpoint: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` is the production source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let flag = |key: &str| get(key).as_deref() == Some("true");

        let xss_hostname = get("BLINDFIRE_XSS_HOSTNAME")
            .context("BLINDFIRE_XSS_HOSTNAME must be set to the hostname probes call back on")?;
        let hostname = get("BLINDFIRE_HOSTNAME").unwrap_or_else(|| xss_hostname.clone());

        let port: u16 = get("BLINDFIRE_PORT")
            .unwrap_or_else(|| "8080".into())
            .parse()
            .context("BLINDFIRE_PORT is not a valid port")?;

        let upload_tmp_dir = get("BLINDFIRE_UPLOAD_TMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let storage = if flag("BLINDFIRE_USE_CLOUD_STORAGE") {
            let Some(bucket) = get("BLINDFIRE_BUCKET_NAME") else {
                bail!("BLINDFIRE_USE_CLOUD_STORAGE is on but BLINDFIRE_BUCKET_NAME is unset");
            };
            StorageConfig::Bucket {
                bucket,
                endpoint: get("BLINDFIRE_STORAGE_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.into()),
                token: get("BLINDFIRE_STORAGE_TOKEN"),
                staging_dir: upload_tmp_dir.clone(),
            }
        } else {
            StorageConfig::Local {
                dir: get("BLINDFIRE_SCREENSHOTS_DIR")
                    .unwrap_or_else(|| "./screenshots".into())
                    .into(),
            }
        };

        let email = if flag("BLINDFIRE_EMAIL_NOTIFICATIONS_ENABLED") {
            let (Some(api_key), Some(from)) =
                (get("BLINDFIRE_SENDGRID_API_KEY"), get("BLINDFIRE_EMAIL_FROM"))
            else {
                bail!(
                    "email notifications need BLINDFIRE_SENDGRID_API_KEY and BLINDFIRE_EMAIL_FROM"
                );
            };
            let unsubscribe_group_id = get("BLINDFIRE_SENDGRID_UNSUBSCRIBE_GROUP_ID")
                .map(|v| v.parse())
                .transpose()
                .context("BLINDFIRE_SENDGRID_UNSUBSCRIBE_GROUP_ID is not an integer")?;
            Some(EmailConfig {
                api_key,
                from,
                unsubscribe_group_id,
                endpoint: DEFAULT_SENDGRID_ENDPOINT.into(),
            })
        } else {
            None
        };

        let max_upload_bytes = get("BLINDFIRE_MAX_UPLOAD_BYTES")
            .map(|v| v.parse())
            .transpose()
            .context("BLINDFIRE_MAX_UPLOAD_BYTES is not an integer")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Ok(Self {
            host: get("BLINDFIRE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("BLINDFIRE_DB_PATH")
                .unwrap_or_else(|| "blindfire.db".into())
                .into(),
            xss_hostname,
            hostname,
            development: flag("BLINDFIRE_DEVELOPMENT"),
            upload_tmp_dir,
            storage,
            email,
            probe_path: get("BLINDFIRE_PROBE_PATH")
                .unwrap_or_else(|| "./probe.js".into())
                .into(),
            trust_proxy: get("BLINDFIRE_TRUST_PROXY").as_deref() != Some("false"),
            max_upload_bytes,
        })
    }

    pub fn email_notifications_enabled(&self) -> bool {
        self.email.is_some()
    }

    /// Base URL substituted into the served probe.
    pub fn probe_base_url(&self) -> String {
        let scheme = if self.development { "http" } else { "https" };
        format!("{}://{}", scheme, self.xss_hostname)
    }

    /// Base URL of the control panel, linked from notifications. Always https,
    /// even in development mode.
    pub fn public_url(&self) -> String {
        format!("https://{}", self.hostname)
    }
}
