use std::sync::Arc;

use portal_session::auth::messages::{
    EMAIL_TAKEN, INVALID_CREDENTIALS, NETWORK_ERROR, NOT_SIGNED_IN, PASSWORD_CHANGED,
    SESSION_EXPIRED,
};
use portal_session::auth::storage::COOKIE_KEY;
use portal_session::auth::{
    AuthConfig, AuthPhase, BackendMode, FileStore, KeyValueStore, MemoryStore, MockDirectory,
    ProfilePatch, ProfileUpdate, RemoteAuthClient, Role, SessionController,
};
use tempfile::tempdir;
use portal_session::test_support::{RunningAuthority, StubAuthority, WRONG_CURRENT_PASSWORD};

async fn authority() -> RunningAuthority {
    StubAuthority::new()
        .launch()
        .await
        .expect("stub authority starts")
}

fn remote_config(authority: &RunningAuthority) -> AuthConfig {
    AuthConfig::new(BackendMode::Remote, authority.base_url())
}

async fn remote_controller(authority: &RunningAuthority) -> SessionController {
    SessionController::connect(
        &remote_config(authority),
        Arc::new(MemoryStore::new()),
        MockDirectory::default(),
    )
    .await
    .expect("controller")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_normalizes_success_and_failure_replies() {
    let authority = authority().await;
    let client = RemoteAuthClient::new(&remote_config(&authority)).expect("client");

    let status = client.status().await;
    assert!(!status.ok);
    assert!(status.user.is_none());

    let rejected = client.login("member@gdg.dev.tw", "wrong").await;
    assert!(!rejected.ok);
    assert_eq!(rejected.message.as_deref(), Some(INVALID_CREDENTIALS));

    let accepted = client.login("member@gdg.dev.tw", "Member123!").await;
    assert!(accepted.ok);
    assert_eq!(
        accepted.user.as_ref().map(|user| user.role),
        Some(Role::Member)
    );

    let status = client.status().await;
    assert!(status.ok);
    assert_eq!(
        status.user.map(|user| user.email),
        Some("member@gdg.dev.tw".to_string())
    );

    assert!(client.refresh().await.ok);
    assert!(client.logout().await.ok);
    assert!(!client.status().await.ok);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_login_round_trip() {
    let authority = authority().await;
    let controller = remote_controller(&authority).await;
    assert_eq!(controller.phase(), AuthPhase::Anonymous);

    let outcome = controller.login("admin@gdg.dev.tw", "Admin123!").await;
    assert!(outcome.success, "{outcome:?}");
    assert!(controller.is_admin());
    assert!(controller.can_manage_users());

    controller.check_status().await;
    assert_eq!(controller.phase(), AuthPhase::Authenticated);

    assert!(controller.logout().await.success);
    controller.check_status().await;
    assert_eq!(controller.phase(), AuthPhase::Anonymous);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_session_survives_a_new_controller_on_the_same_store() {
    let authority = authority().await;
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("session.json");
    let open = || -> Arc<dyn KeyValueStore> { Arc::new(FileStore::new(&path)) };
    let config = remote_config(&authority);
    let connect = || SessionController::connect(&config, open(), MockDirectory::default());

    let first = connect().await.expect("controller");
    assert!(first.login("core@gdg.dev.tw", "Core123!").await.success);
    drop(first);
    assert!(open().get(COOKIE_KEY).unwrap().is_some());

    let second = connect().await.expect("controller");
    assert_eq!(second.phase(), AuthPhase::Authenticated);
    assert!(second.is_core_team());

    assert!(second.logout().await.success);
    assert_eq!(open().get(COOKIE_KEY).unwrap(), None);

    let third = connect().await.expect("controller");
    assert_eq!(third.phase(), AuthPhase::Anonymous);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_login_failure_carries_the_server_message() {
    let authority = authority().await;
    let controller = remote_controller(&authority).await;

    let outcome = controller.login("x@x.com", "anything").await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, INVALID_CREDENTIALS);
    assert!(!controller.is_authenticated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_register_and_duplicate() {
    let authority = authority().await;
    let controller = remote_controller(&authority).await;

    let duplicate = controller
        .register("Dup", "member@gdg.dev.tw", "Secret123!")
        .await;
    assert!(!duplicate.success);
    assert_eq!(duplicate.message, EMAIL_TAKEN);
    assert!(!controller.is_authenticated());

    let created = controller
        .register("Fresh", "fresh@gdg.dev.tw", "Secret123!")
        .await;
    assert!(created.success, "{created:?}");
    assert_eq!(
        controller.principal().map(|user| user.role),
        Some(Role::Member)
    );
    assert!(authority.directory().contains_email("fresh@gdg.dev.tw"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_profile_update_replaces_the_principal_with_the_server_copy() {
    let authority = authority().await;
    let controller = remote_controller(&authority).await;

    let anonymous = controller
        .update_profile(ProfileUpdate {
            name: Some("Nobody".into()),
            ..Default::default()
        })
        .await;
    assert!(!anonymous.success);
    assert_eq!(anonymous.message, NOT_SIGNED_IN);

    assert!(controller.login("member@gdg.dev.tw", "Member123!").await.success);
    let outcome = controller
        .update_profile(ProfileUpdate {
            name: Some("改名".into()),
            profile: Some(ProfilePatch {
                department: Some("講師群".into()),
                ..Default::default()
            }),
            ..Default::default()
        })
        .await;
    assert!(outcome.success, "{outcome:?}");

    let principal = controller.principal().expect("principal");
    assert_eq!(principal.name, "改名");
    assert_eq!(principal.profile.department.as_deref(), Some("講師群"));
    assert_eq!(principal.profile.title.as_deref(), Some("前端工程師"));
    assert_eq!(
        authority.directory().find_by_id("3").map(|user| user.name),
        Some("改名".to_string())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn change_password_is_remote_even_in_mock_mode() {
    let authority = authority().await;
    let config = AuthConfig::new(BackendMode::Mock, authority.base_url());
    let controller = SessionController::connect(
        &config,
        Arc::new(MemoryStore::new()),
        MockDirectory::with_demo_accounts(),
    )
    .await
    .expect("controller");

    // The mock sign-in never reaches the authority, so it holds no session cookie.
    assert!(controller.login("member@gdg.dev.tw", "Member123!").await.success);
    let outcome = controller.change_password("Member123!", "Next123!").await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, NOT_SIGNED_IN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_change_password() {
    let authority = authority().await;
    let controller = remote_controller(&authority).await;
    assert!(controller.login("core@gdg.dev.tw", "Core123!").await.success);

    let wrong = controller.change_password("nope", "Next123!").await;
    assert!(!wrong.success);
    assert_eq!(wrong.message, WRONG_CURRENT_PASSWORD);

    let changed = controller.change_password("Core123!", "Next123!").await;
    assert!(changed.success);
    assert_eq!(changed.message, PASSWORD_CHANGED);
    assert!(controller.is_authenticated());
    assert!(
        authority
            .directory()
            .verify("core@gdg.dev.tw", "Next123!")
            .is_some()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_success_keeps_the_session() {
    let authority = authority().await;
    let controller = remote_controller(&authority).await;
    assert!(controller.login("member@gdg.dev.tw", "Member123!").await.success);

    let outcome = controller.refresh_token().await;
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(controller.phase(), AuthPhase::Authenticated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_rejection_ends_the_session() {
    let authority = authority().await;
    let controller = remote_controller(&authority).await;
    assert!(controller.login("member@gdg.dev.tw", "Member123!").await.success);

    authority.controls().reject_refresh(true);
    let outcome = controller.refresh_token().await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, SESSION_EXPIRED);
    assert!(!controller.is_authenticated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_ends_anonymous_when_the_authority_fails() {
    let authority = authority().await;
    let config = remote_config(&authority);
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let controller = SessionController::connect(&config, store.clone(), MockDirectory::default())
        .await
        .expect("controller");
    assert!(controller.login("member@gdg.dev.tw", "Member123!").await.success);

    authority.controls().fail_logout(true);
    let outcome = controller.logout().await;
    assert!(outcome.success);
    assert_eq!(controller.phase(), AuthPhase::Anonymous);
    assert_eq!(store.get(COOKIE_KEY).unwrap(), None);

    let later = SessionController::connect(&config, store, MockDirectory::default())
        .await
        .expect("controller");
    assert_eq!(later.phase(), AuthPhase::Anonymous);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_authority_resolves_anonymous_with_network_errors() {
    let config = AuthConfig::new(BackendMode::Remote, "http://127.0.0.1:9/api");
    let controller = SessionController::connect(
        &config,
        Arc::new(MemoryStore::new()),
        MockDirectory::default(),
    )
    .await
    .expect("controller");
    assert_eq!(controller.phase(), AuthPhase::Anonymous);

    let outcome = controller.login("member@gdg.dev.tw", "Member123!").await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, NETWORK_ERROR);

    assert!(controller.logout().await.success);
    assert!(!controller.is_authenticated());
}
