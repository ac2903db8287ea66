use std::path::Path;

use axum::extract::Multipart;
use axum::extract::multipart::Field;
use blindfire_types::models::FireBranch;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::FormError;
use crate::scratch::ScratchFile;

const SCREENSHOT_FIELD: &str = "screenshot";

/// Text fields of a fire callback, after defaults are applied.
///
/// Values stay as the probe sent them; coercion happens when the record is
/// built. [`FireForm::validate`] guarantees the coercions cannot fail.
#[derive(Debug, Clone)]
pub struct FireForm {
    pub uri: String,
    pub cookies: String,
    pub referrer: String,
    pub user_agent: String,
    pub browser_time: String,
    pub probe_uid: String,
    pub origin: String,
    pub injection_key: String,
    pub title: String,
    pub was_iframe: String,
    pub secrets: String,
    pub cors: String,
    pub git_exposed: String,
    pub path: String,
    pub encrypted_data: Option<String>,
    pub pgp_key: Option<String>,
}

impl Default for FireForm {
    fn default() -> Self {
        Self {
            uri: String::new(),
            cookies: String::new(),
            referrer: String::new(),
            user_agent: String::new(),
            browser_time: "0".into(),
            probe_uid: String::new(),
            origin: String::new(),
            injection_key: String::new(),
            title: String::new(),
            was_iframe: "false".into(),
            secrets: "[]".into(),
            cors: "false".into(),
            git_exposed: "false".into(),
            path: String::new(),
            encrypted_data: None,
            pgp_key: None,
        }
    }
}

impl FireForm {
    /// Assign a named field. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: String) {
        match name {
            "uri" => self.uri = value,
            "cookies" => self.cookies = value,
            "referrer" => self.referrer = value,
            "user-agent" => self.user_agent = value,
            "browser-time" => self.browser_time = value,
            "probe-uid" => self.probe_uid = value,
            "origin" => self.origin = value,
            "injection_key" => self.injection_key = value,
            "title" => self.title = value,
            "was_iframe" => self.was_iframe = value,
            "secrets" => self.secrets = value,
            "CORS" => self.cors = value,
            "gitExposed" => self.git_exposed = value,
            "path" => self.path = value,
            "encrypted_data" => self.encrypted_data = Some(value),
            "pgp_key" => self.pgp_key = Some(value),
            _ => {}
        }
    }

    pub fn validate(&self) -> Result<(), FormError> {
        let digits = !self.browser_time.is_empty()
            && self.browser_time.bytes().all(|b| b.is_ascii_digit());
        if !digits || self.browser_time.parse::<i64>().is_err() {
            return Err(FormError::InvalidField {
                field: "browser-time",
                expected: "a non-negative integer",
            });
        }
        if self.was_iframe != "true" && self.was_iframe != "false" {
            return Err(FormError::InvalidField {
                field: "was_iframe",
                expected: "\"true\" or \"false\"",
            });
        }
        Ok(())
    }

    /// The presence of `encrypted_data` alone selects the encrypted shape.
    pub fn branch(&self) -> FireBranch {
        if self.encrypted_data.is_some() {
            FireBranch::Encrypted
        } else {
            FireBranch::Plaintext
        }
    }
}

/// A validated callback: its text fields and the spooled screenshot, if any.
#[derive(Debug)]
pub struct FireSubmission {
    pub form: FireForm,
    pub screenshot: Option<ScratchFile>,
}

/// Drain the multipart body, spooling the screenshot to `tmp_dir`.
///
/// Returns a schema error before any side effect beyond the spooled file,
/// which is dropped (and so deleted) with the failed submission.
pub async fn read_submission(
    multipart: &mut Multipart,
    tmp_dir: &Path,
) -> Result<FireSubmission, FormError> {
    let mut form = FireForm::default();
    let mut screenshot: Option<ScratchFile> = None;
    let mut seen_screenshot = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == SCREENSHOT_FIELD {
            if seen_screenshot {
                return Err(FormError::DuplicateScreenshot);
            }
            seen_screenshot = true;
            screenshot = spool_screenshot(field, tmp_dir).await?;
            continue;
        }

        if field.file_name().is_some() {
            return Err(FormError::UnexpectedFile(name));
        }

        let value = field.text().await?;
        form.set(&name, value);
    }

    form.validate()?;
    Ok(FireSubmission { form, screenshot })
}

/// Stream one file field to disk. A local I/O failure drops the screenshot
/// rather than rejecting the fire.
async fn spool_screenshot(
    mut field: Field<'_>,
    tmp_dir: &Path,
) -> Result<Option<ScratchFile>, FormError> {
    let scratch = ScratchFile::unique_in(tmp_dir, "");
    let mut file = match fs::File::create(scratch.path()).await {
        Ok(f) => Some(f),
        Err(e) => {
            warn!("Failed to create upload file {}: {}", scratch.path().display(), e);
            None
        }
    };

    while let Some(chunk) = field.chunk().await? {
        if let Some(f) = file.as_mut() {
            if let Err(e) = f.write_all(&chunk).await {
                warn!("Failed to spool screenshot upload: {}", e);
                file = None;
            }
        }
    }

    let Some(mut file) = file else {
        return Ok(None);
    };
    if let Err(e) = file.flush().await {
        warn!("Failed to flush screenshot upload: {}", e);
        return Ok(None);
    }
    Ok(Some(scratch))
}
