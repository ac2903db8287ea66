use serde::Serialize;
use uuid::Uuid;

/// Text stored on a plaintext fire until a matching injection request is found.
pub const NO_CORRELATION_FOUND: &str = "No correlated request found for this injection.";

/// A registered user. Provisioned by the control panel; read-only here.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub path: String,
    pub pgp_key: Option<String>,
    pub send_email_alerts: bool,
    pub additional_js: Option<String>,
    pub email: String,
}

/// Marker recorded when a probe was planted, keyed by the tester's token.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionRequest {
    pub injection_key: String,
    pub request: String,
}

/// One recorded payload fire.
///
/// The shared columns live here; everything that depends on whether the probe
/// encrypted its report lives in [`FireBody`].
#[derive(Debug, Clone, Serialize)]
pub struct PayloadFire {
    pub id: Uuid,
    pub user_id: String,
    /// Only set when a screenshot blob was actually stored.
    pub screenshot_id: Option<Uuid>,
    pub body: FireBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FireBody {
    Plaintext(PlaintextFire),
    Encrypted(EncryptedFire),
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaintextFire {
    pub url: String,
    pub ip_address: String,
    pub referer: String,
    pub user_agent: String,
    pub cookies: String,
    pub title: String,
    pub secrets: serde_json::Value,
    pub origin: String,
    pub was_iframe: bool,
    pub browser_timestamp: i64,
    pub cors: Option<String>,
    pub git_exposed: Option<String>,
    pub correlated_request: String,
}

/// The server only relays ciphertext addressed to the user's own key.
#[derive(Debug, Clone, Serialize)]
pub struct EncryptedFire {
    pub encrypted_data: String,
    /// Absent when the probe sent no `pgp_key`.
    pub public_key: Option<String>,
    /// Request text of a matching injection request. No sentinel on this shape.
    pub correlated_request: Option<String>,
}

impl PayloadFire {
    pub fn is_encrypted(&self) -> bool {
        matches!(self.body, FireBody::Encrypted(_))
    }

    pub fn plaintext(&self) -> Option<&PlaintextFire> {
        match &self.body {
            FireBody::Plaintext(p) => Some(p),
            FireBody::Encrypted(_) => None,
        }
    }

    pub fn encrypted(&self) -> Option<&EncryptedFire> {
        match &self.body {
            FireBody::Encrypted(e) => Some(e),
            FireBody::Plaintext(_) => None,
        }
    }
}

/// Storage naming differs between the two report shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireBranch {
    Plaintext,
    Encrypted,
}

impl FireBranch {
    /// Object name for a compressed screenshot of this branch.
    pub fn screenshot_name(self, id: Uuid) -> String {
        match self {
            FireBranch::Plaintext => format!("{id}.png.gz"),
            FireBranch::Encrypted => format!("{id}.b64png.enc.gz"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_names_follow_branch() {
        let id = Uuid::nil();
        assert_eq!(
            FireBranch::Plaintext.screenshot_name(id),
            "00000000-0000-0000-0000-000000000000.png.gz"
        );
        assert_eq!(
            FireBranch::Encrypted.screenshot_name(id),
            "00000000-0000-0000-0000-000000000000.b64png.enc.gz"
        );
    }

    #[test]
    fn body_accessors_match_variant() {
        let fire = PayloadFire {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            screenshot_id: None,
            body: FireBody::Encrypted(EncryptedFire {
                encrypted_data: "-----BEGIN PGP MESSAGE-----".into(),
                public_key: Some("key".into()),
                correlated_request: None,
            }),
        };
        assert!(fire.is_encrypted());
        assert!(fire.plaintext().is_none());
        assert_eq!(fire.encrypted().and_then(|e| e.public_key.as_deref()), Some("key"));
    }
}
