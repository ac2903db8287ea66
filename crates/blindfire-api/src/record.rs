use blindfire_types::models::{
    EncryptedFire, FireBody, NO_CORRELATION_FOUND, PayloadFire, PlaintextFire,
};
use uuid::Uuid;

use crate::error::RecordError;
use crate::form::FireForm;

/// `gitExposed` is truncated to this many characters before storage.
pub const GIT_EXPOSED_MAX_CHARS: usize = 5000;

/// Probe sentinel for an optional field that does not apply.
const NOT_APPLICABLE: &str = "false";

/// Everything about a fire that the form itself doesn't carry.
pub struct FireMeta<'a> {
    pub user_id: &'a str,
    pub ip_address: &'a str,
    pub screenshot_id: Option<Uuid>,
    /// Request text of a matching injection request, if one was found.
    pub correlated_request: Option<String>,
}

/// Turn a validated form into the record that gets persisted.
pub fn build_fire(form: &FireForm, meta: FireMeta<'_>) -> Result<PayloadFire, RecordError> {
    let body = match &form.encrypted_data {
        Some(encrypted_data) => FireBody::Encrypted(EncryptedFire {
            encrypted_data: encrypted_data.clone(),
            public_key: form.pgp_key.clone(),
            correlated_request: meta.correlated_request,
        }),
        None => FireBody::Plaintext(PlaintextFire {
            url: form.uri.clone(),
            ip_address: meta.ip_address.to_string(),
            referer: form.referrer.clone(),
            user_agent: form.user_agent.clone(),
            cookies: form.cookies.clone(),
            title: form.title.clone(),
            secrets: serde_json::from_str(&form.secrets)?,
            origin: form.origin.clone(),
            was_iframe: form.was_iframe == "true",
            // Digits-only and in range, checked by FireForm::validate.
            browser_timestamp: form.browser_time.parse().unwrap_or_default(),
            cors: applicable(&form.cors).map(str::to_string),
            git_exposed: applicable(&form.git_exposed)
                .map(|v| v.chars().take(GIT_EXPOSED_MAX_CHARS).collect()),
            correlated_request: meta
                .correlated_request
                .unwrap_or_else(|| NO_CORRELATION_FOUND.to_string()),
        }),
    };

    Ok(PayloadFire {
        id: Uuid::new_v4(),
        user_id: meta.user_id.to_string(),
        screenshot_id: meta.screenshot_id,
        body,
    })
}

fn applicable(value: &str) -> Option<&str> {
    (value != NOT_APPLICABLE).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> FireMeta<'static> {
        FireMeta {
            user_id: "u1",
            ip_address: "198.51.100.7",
            screenshot_id: None,
            correlated_request: None,
        }
    }

    fn form(fields: &[(&str, &str)]) -> FireForm {
        let mut form = FireForm::default();
        for (k, v) in fields {
            form.set(k, v.to_string());
        }
        form.validate().unwrap();
        form
    }

    #[test]
    fn plaintext_coercions() {
        let fire = build_fire(
            &form(&[
                ("uri", "https://victim.example/"),
                ("was_iframe", "true"),
                ("browser-time", "1700000000123"),
                ("secrets", r#"[{"secret":"AKIA..."}]"#),
            ]),
            meta(),
        )
        .unwrap();

        let p = fire.plaintext().unwrap();
        assert!(p.was_iframe);
        assert_eq!(p.browser_timestamp, 1_700_000_000_123);
        assert_eq!(p.secrets[0]["secret"], "AKIA...");
        assert_eq!(p.ip_address, "198.51.100.7");
        assert_eq!(p.correlated_request, NO_CORRELATION_FOUND);
    }

    #[test]
    fn false_sentinel_omits_optional_fields() {
        let fire = build_fire(&form(&[("CORS", "false"), ("gitExposed", "false")]), meta()).unwrap();
        let p = fire.plaintext().unwrap();
        assert!(p.cors.is_none());
        assert!(p.git_exposed.is_none());

        let fire = build_fire(&form(&[("CORS", "*"), ("gitExposed", "")]), meta()).unwrap();
        let p = fire.plaintext().unwrap();
        assert_eq!(p.cors.as_deref(), Some("*"));
        assert_eq!(p.git_exposed.as_deref(), Some(""));
    }

    #[test]
    fn git_exposed_is_capped() {
        let long = "é".repeat(GIT_EXPOSED_MAX_CHARS + 123);
        let fire = build_fire(&form(&[("gitExposed", long.as_str())]), meta()).unwrap();
        let stored = fire.plaintext().unwrap().git_exposed.clone().unwrap();
        assert_eq!(stored.chars().count(), GIT_EXPOSED_MAX_CHARS);
    }

    #[test]
    fn malformed_secrets_fail_the_record() {
        let result = build_fire(&form(&[("secrets", "{not json")]), meta());
        assert!(matches!(result, Err(RecordError::Secrets(_))));
    }

    #[test]
    fn correlation_overwrites_sentinel() {
        let fire = build_fire(
            &form(&[]),
            FireMeta {
                correlated_request: Some("GET /vulnerable?x=1".into()),
                ..meta()
            },
        )
        .unwrap();
        assert_eq!(fire.plaintext().unwrap().correlated_request, "GET /vulnerable?x=1");
    }

    #[test]
    fn encrypted_branch_ignores_plaintext_fields() {
        let fire = build_fire(
            &form(&[
                ("encrypted_data", "-----BEGIN PGP MESSAGE-----\nabc"),
                ("pgp_key", "-----BEGIN PGP PUBLIC KEY BLOCK-----"),
                // Not parsed on this branch.
                ("secrets", "{not json"),
            ]),
            meta(),
        )
        .unwrap();

        assert!(fire.is_encrypted());
        let e = fire.encrypted().unwrap();
        assert_eq!(e.encrypted_data, "-----BEGIN PGP MESSAGE-----\nabc");
        assert_eq!(e.public_key.as_deref(), Some("-----BEGIN PGP PUBLIC KEY BLOCK-----"));
        assert!(e.correlated_request.is_none());
    }

    #[test]
    fn encrypted_branch_keeps_correlation_and_absent_key() {
        let fire = build_fire(
            &form(&[("encrypted_data", "-----BEGIN PGP MESSAGE-----")]),
            FireMeta {
                correlated_request: Some("GET /vulnerable?x=1".into()),
                ..meta()
            },
        )
        .unwrap();

        let e = fire.encrypted().unwrap();
        assert!(e.public_key.is_none());
        assert_eq!(e.correlated_request.as_deref(), Some("GET /vulnerable?x=1"));
    }

    #[test]
    fn every_record_gets_a_fresh_id() {
        let f = form(&[]);
        let a = build_fire(&f, meta()).unwrap();
        let b = build_fire(&f, meta()).unwrap();
        assert_ne!(a.id, b.id);
    }
}
