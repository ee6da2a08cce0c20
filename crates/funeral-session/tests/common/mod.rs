//! Shared fixtures for the session integration tests.

#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use funeral_session::{AUTH_CONFIG_PATH, TOKEN_PATH};
use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::{json, Value};

/// Builds an unsigned three-segment token carrying `claims`.
pub fn jwt(claims: &Value) -> String {
    format!(
        "{}.{}.c2ln",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// An expiry one hour from now.
pub fn future_exp() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}

/// An expiry one hour ago.
pub fn past_exp() -> i64 {
    chrono::Utc::now().timestamp() - 3600
}

/// Serves the auth policy.
pub fn mock_policy(server: &MockServer, enabled: bool) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path(AUTH_CONFIG_PATH);
        then.status(200)
            .json_body(json!({"enabled": enabled, "allowAnonymousPull": false}));
    })
}

/// Issues `token` to the client presenting `basic` credentials.
pub fn mock_token_grant<'a>(server: &'a MockServer, basic: &str, token: &str) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(POST)
            .path(TOKEN_PATH)
            .header("authorization", format!("Basic {basic}"));
        then.status(200).json_body(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": 3600
        }));
    })
}

/// Rejects the client presenting `basic` credentials.
pub fn mock_token_denial<'a>(server: &'a MockServer, basic: &str) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(POST)
            .path(TOKEN_PATH)
            .header("authorization", format!("Basic {basic}"));
        then.status(401).json_body(json!({
            "errors": [{"code": "UNAUTHORIZED", "message": "authentication required"}]
        }));
    })
}
