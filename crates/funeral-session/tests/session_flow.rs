//! End-to-end session behavior against a mock registry.
//!
//! Each test drives a real `Session` through the policy endpoint, the token
//! endpoint and the credential store the way the console does at runtime.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{future_exp, jwt, mock_policy, mock_token_denial, mock_token_grant, past_exp};
use funeral_session::{
    ClientConfig, CredentialStore, FileCredentialStore, Identity, LoginError,
    MemoryCredentialStore, Navigation, RouteGuard, Session, SessionState, StoredCredential,
    ADMIN_DENIED_NOTICE, AUTH_CONFIG_PATH,
};
use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn session(server: &MockServer, store: Arc<dyn CredentialStore>) -> Arc<Session> {
    let config = ClientConfig::new(server.base_url());
    Arc::new(Session::new(config, store).unwrap())
}

#[tokio::test]
async fn test_concurrent_checks_share_one_fetch() {
    let server = MockServer::start_async().await;
    let policy = server.mock(|when, then| {
        when.method(GET).path(AUTH_CONFIG_PATH);
        then.status(200)
            .json_body(json!({"enabled": true}))
            .delay(Duration::from_millis(200));
    });

    let session = session(&server, Arc::new(MemoryCredentialStore::new()));
    let results =
        futures::future::join_all((0..16).map(|_| session.ensure_config())).await;

    policy.assert();
    assert_eq!(session.gate().fetch_count(), 1);
    assert!(results.iter().all(|c| c == &results[0]));
    assert!(results[0].enabled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_across_tasks_share_one_fetch() {
    let server = MockServer::start_async().await;
    let policy = server.mock(|when, then| {
        when.method(GET).path(AUTH_CONFIG_PATH);
        then.status(200)
            .json_body(json!({"enabled": false}))
            .delay(Duration::from_millis(200));
    });

    let session = session(&server, Arc::new(MemoryCredentialStore::new()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.ensure_config().await })
        })
        .collect();

    for handle in handles {
        assert!(!handle.await.unwrap().enabled);
    }
    policy.assert();
    assert_eq!(session.gate().fetch_count(), 1);
}

#[tokio::test]
async fn test_disabled_is_authenticated_and_never_admin() {
    let server = MockServer::start_async().await;
    mock_policy(&server, false);

    let session = session(&server, Arc::new(MemoryCredentialStore::new()));
    session.ensure_config().await;

    assert_eq!(session.state(), SessionState::Disabled);
    assert!(session.is_authenticated());
    assert!(!session.is_admin());
}

#[tokio::test]
async fn test_expired_stored_token_is_discarded() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);

    let token = jwt(&json!({"sub": "alice", "groups": ["ADMIN"], "exp": past_exp()}));
    let store = Arc::new(MemoryCredentialStore::with_credential(StoredCredential {
        token,
        user: Identity::new("alice", ["ADMIN".to_string()]),
    }));

    let session = session(&server, store.clone());
    session.ensure_config().await;

    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(!session.is_authenticated());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_login_survives_reload() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);
    let token = jwt(&json!({"sub": "admin", "groups": ["ADMIN", "DEV"], "exp": future_exp()}));
    mock_token_grant(&server, "YWRtaW46c2VjcmV0", &token);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credentials.json");

    let first = session(&server, Arc::new(FileCredentialStore::new(&path)));
    let identity = first.login("admin", "secret").await.unwrap();
    assert_eq!(first.state(), SessionState::LoggedIn);
    drop(first);

    let reloaded = session(&server, Arc::new(FileCredentialStore::new(&path)));
    reloaded.ensure_config().await;
    assert_eq!(reloaded.state(), SessionState::LoggedIn);
    assert_eq!(reloaded.identity(), Some(identity));
    assert!(reloaded.is_admin());
}

#[tokio::test]
async fn test_anonymous_login_survives_reload_when_token_decodes() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);
    let token = jwt(&json!({"sub": "anonymous", "exp": future_exp()}));
    server.mock(|when, then| {
        when.method(GET).path("/v2/token").query_param("scope", "pull");
        then.status(200).json_body(json!({"token": token}));
    });

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credentials.json");

    let first = session(&server, Arc::new(FileCredentialStore::new(&path)));
    first.login_anonymous().await.unwrap();
    drop(first);

    let reloaded = session(&server, Arc::new(FileCredentialStore::new(&path)));
    reloaded.ensure_config().await;
    assert_eq!(reloaded.state(), SessionState::LoggedIn);
    assert!(reloaded.identity().unwrap().is_anonymous());
    assert!(!reloaded.is_admin());
}

#[tokio::test]
async fn test_anonymous_login_survives_reload_with_opaque_token() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);
    server.mock(|when, then| {
        when.method(GET).path("/v2/token").query_param("scope", "pull");
        then.status(200).json_body(json!({"token": "anonymous"}));
    });

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credentials.json");

    let first = session(&server, Arc::new(FileCredentialStore::new(&path)));
    first.login_anonymous().await.unwrap();
    assert_eq!(first.state(), SessionState::LoggedIn);
    drop(first);

    let reloaded = session(&server, Arc::new(FileCredentialStore::new(&path)));
    reloaded.ensure_config().await;
    assert_eq!(reloaded.state(), SessionState::LoggedIn);
    assert!(path.exists());
    assert!(reloaded.identity().unwrap().is_anonymous());
    assert_eq!(
        reloaded.authorization_header().as_deref(),
        Some("Bearer anonymous")
    );
    assert!(!reloaded.is_admin());
}

#[tokio::test]
async fn test_undecodable_named_token_is_discarded_on_reload() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);
    let store = Arc::new(MemoryCredentialStore::with_credential(StoredCredential {
        token: "opaque".to_string(),
        user: Identity::new("alice", Vec::new()),
    }));

    let session = session(&server, Arc::clone(&store) as Arc<dyn CredentialStore>);
    session.ensure_config().await;
    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_wrong_login_then_repeated_correct_logins() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);
    let token = jwt(&json!({"sub": "admin", "groups": ["ADMIN"], "exp": future_exp()}));
    let denial = mock_token_denial(&server, "YWRtaW46d3Jvbmc=");
    let grant = mock_token_grant(&server, "YWRtaW46c2VjcmV0", &token);

    let store = Arc::new(MemoryCredentialStore::new());
    let session = session(&server, store.clone());

    let failed = session.login("admin", "wrong").await;
    assert!(matches!(failed, Err(LoginError::InvalidCredentials)));
    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(store.is_empty());
    denial.assert();

    let once = session.login("admin", "secret").await.unwrap();
    let stored_once = store.load().unwrap();
    let twice = session.login("admin", "secret").await.unwrap();
    let stored_twice = store.load().unwrap();
    grant.assert_calls(2);

    assert_eq!(once, twice);
    assert_eq!(stored_once, stored_twice);
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert!(session.is_admin());
}

#[tokio::test]
async fn test_login_from_uninitialized_resolves_policy_first() {
    let server = MockServer::start_async().await;
    let policy = mock_policy(&server, true);
    let token = jwt(&json!({"sub": "alice", "exp": future_exp()}));
    mock_token_grant(&server, "YWxpY2U6cGFzc3dvcmQx", &token);

    let session = session(&server, Arc::new(MemoryCredentialStore::new()));
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.login("alice", "password1").await.unwrap();
    policy.assert();
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert!(!session.is_admin());
}

#[tokio::test]
async fn test_guard_redirects_to_login_with_resume_path() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);

    let session = session(&server, Arc::new(MemoryCredentialStore::new()));
    let guard = RouteGuard::new(session);

    let decision = guard.before_each("/repository/x").await;
    assert_eq!(
        decision,
        Navigation::RedirectToLogin {
            redirect: "/repository/x".to_string()
        }
    );
    assert_eq!(
        decision.location().as_deref(),
        Some("/login?redirect=/repository/x")
    );
    assert!(guard.before_each("/login").await.is_allowed());
}

#[tokio::test]
async fn test_guard_disabled_skips_login_view() {
    let server = MockServer::start_async().await;
    mock_policy(&server, false);

    let guard = RouteGuard::new(session(&server, Arc::new(MemoryCredentialStore::new())));

    let decision = guard.before_each("/login").await;
    assert_eq!(decision, Navigation::RedirectHome { notice: None });
    assert_eq!(decision.location().as_deref(), Some("/"));
    assert!(guard.before_each("/repository/x").await.is_allowed());
    assert!(!guard.before_each("/admin/users").await.is_allowed());
}

#[tokio::test]
async fn test_guard_is_closed_before_policy_resolves() {
    let server = MockServer::start_async().await;
    let policy = mock_policy(&server, false);

    let guard = RouteGuard::new(session(&server, Arc::new(MemoryCredentialStore::new())));

    assert!(matches!(
        guard.decide("/upload"),
        Navigation::RedirectToLogin { .. }
    ));
    assert_eq!(policy.calls(), 0);
}

#[tokio::test]
async fn test_guard_login_redirect_settles_before_policy_resolves() {
    let server = MockServer::start_async().await;
    let policy = mock_policy(&server, true);

    let guard = RouteGuard::new(session(&server, Arc::new(MemoryCredentialStore::new())));

    let first = guard.decide("/");
    assert_eq!(first.location().as_deref(), Some("/login?redirect=/"));
    assert!(guard.decide("/login?redirect=/").is_allowed());
    assert_eq!(policy.calls(), 0);
}

#[tokio::test]
async fn test_guard_admin_routes() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);
    let admin = jwt(&json!({"sub": "admin", "groups": ["ADMIN"], "exp": future_exp()}));
    let user = jwt(&json!({"sub": "alice", "groups": ["DEV"], "exp": future_exp()}));
    mock_token_grant(&server, "YWRtaW46c2VjcmV0", &admin);
    mock_token_grant(&server, "YWxpY2U6cGFzc3dvcmQx", &user);

    let session = session(&server, Arc::new(MemoryCredentialStore::new()));
    let guard = RouteGuard::new(Arc::clone(&session));

    session.login("alice", "password1").await.unwrap();
    assert!(guard.before_each("/upload").await.is_allowed());
    assert_eq!(
        guard.before_each("/admin/permissions").await,
        Navigation::RedirectHome {
            notice: Some(ADMIN_DENIED_NOTICE.to_string())
        }
    );
    assert_eq!(
        guard.before_each("/login").await,
        Navigation::RedirectHome { notice: None }
    );

    session.login("admin", "secret").await.unwrap();
    assert!(guard.before_each("/admin/users").await.is_allowed());

    session.logout();
    assert!(matches!(
        guard.before_each("/admin/users").await,
        Navigation::RedirectToLogin { .. }
    ));
}

#[tokio::test]
async fn test_unknown_routes_are_open() {
    let server = MockServer::start_async().await;
    mock_policy(&server, true);

    let guard = RouteGuard::new(session(&server, Arc::new(MemoryCredentialStore::new())));
    assert!(guard.before_each("/about").await.is_allowed());
}
