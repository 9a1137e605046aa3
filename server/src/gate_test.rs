use super::*;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

fn encode_claims(json: &str) -> String {
    URL_SAFE_NO_PAD.encode(json.as_bytes())
}

#[test]
fn valid_credential_yields_identity() {
    let user_id = Uuid::new_v4();
    let raw = encode_claims(&format!(
        r#"{{"user_id":"{user_id}","email":"kay@example.com","avatar_url":"https://cdn/a.png"}}"#
    ));

    let identity = Base64JsonVerifier.verify(&raw).expect("verify");

    assert_eq!(identity.user_id, user_id);
    assert_eq!(identity.user_email, "kay@example.com");
    assert_eq!(identity.avatar_url.as_deref(), Some("https://cdn/a.png"));
}

#[test]
fn avatar_is_optional() {
    let user_id = Uuid::new_v4();
    let raw = encode_claims(&format!(r#"{{"user_id":"{user_id}","email":"kay@example.com"}}"#));

    let identity = Base64JsonVerifier.verify(&raw).expect("verify");

    assert!(identity.avatar_url.is_none());
}

#[test]
fn empty_credential_is_missing() {
    let err = Base64JsonVerifier.verify("").expect_err("must reject");
    assert!(matches!(err, AuthError::MissingCredential));
    assert_eq!(err.code(), RejectCode::AuthRequired);
}

#[test]
fn garbage_credential_is_invalid() {
    let err = Base64JsonVerifier.verify("!!!not-base64!!!").expect_err("must reject");
    assert!(matches!(err, AuthError::InvalidCredential(_)));
    assert_eq!(err.code(), RejectCode::InvalidToken);
}

#[test]
fn base64_of_non_json_is_invalid() {
    let raw = encode_claims("plain text, not claims");
    let err = Base64JsonVerifier.verify(&raw).expect_err("must reject");
    assert!(matches!(err, AuthError::InvalidCredential(_)));
}

#[test]
fn missing_claims_are_invalid() {
    let raw = encode_claims(r#"{"email":"kay@example.com"}"#);
    let err = Base64JsonVerifier.verify(&raw).expect_err("must reject");
    assert!(matches!(err, AuthError::InvalidCredential(_)));
}
