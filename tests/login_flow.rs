use std::sync::Arc;

use chrono::{Duration, Utc};
use payguard_core::audit::MemoryAuditSink;
use payguard_core::db::{AccountStore, MemoryAccountStore};
use payguard_core::error::{AppError, AuthError};
use payguard_core::gate::GateRequest;
use payguard_core::store::MemoryBackend;
use payguard_core::{AuthCore, LoginOutcome, Settings};

const PASSWORD: &str = "Integration-T3st-Pw!";
const CLIENT_IP: &str = "203.0.113.50";

struct TestCore {
    core: AuthCore,
    accounts: Arc<MemoryAccountStore>,
    audit: MemoryAuditSink,
}

fn test_core() -> TestCore {
    let settings = Settings::new_for_test().expect("failed to load test config");
    let accounts = Arc::new(MemoryAccountStore::new());
    let audit = MemoryAuditSink::new();

    let core = AuthCore::new(
        settings,
        accounts.clone(),
        Arc::new(MemoryBackend::new()),
        Arc::new(audit.clone()),
    );

    TestCore {
        core,
        accounts,
        audit,
    }
}

#[test_log::test(tokio::test)]
async fn register_login_refresh_logout() {
    let t = test_core();
    let request = GateRequest::anonymous(CLIENT_IP);

    // Register issues tokens and a session.
    let (_, session) = t
        .core
        .gate
        .register(&request, "alice@example.com", PASSWORD, "customer")
        .await
        .expect("registration should succeed");

    // The access token authorizes a bearer request.
    let ctx = t
        .core
        .gate
        .authorize(&GateRequest::bearer(CLIENT_IP, session.access_token.clone()))
        .await
        .expect("fresh access token should pass the gate");
    assert_eq!(ctx.identity.unwrap().user_id, session.user_id.to_string());

    // The refresh token does not authorize a resource request...
    let rejection = t
        .core
        .gate
        .authorize(&GateRequest::bearer(CLIENT_IP, session.refresh_token.clone()))
        .await
        .unwrap_err();
    assert_eq!(rejection.status_hint(), 401);

    // ...but does mint a new access token.
    let new_access = t
        .core
        .guard
        .refresh_access(&session.refresh_token)
        .await
        .expect("refresh should mint a new access token");
    t.core
        .gate
        .authorize(&GateRequest::bearer(CLIENT_IP, new_access))
        .await
        .expect("minted access token should pass the gate");

    // Logout removes the session.
    let meta = payguard_core::guard::RequestMeta::new(CLIENT_IP);
    t.core.guard.logout(session.user_id, &meta).await.unwrap();
    assert!(t
        .core
        .sessions
        .get(&session.session_id)
        .await
        .unwrap()
        .is_none());
}

#[test_log::test(tokio::test)]
async fn five_wrong_passwords_lock_the_account() {
    let t = test_core();
    let request = GateRequest::anonymous(CLIENT_IP);

    t.core
        .gate
        .register(&request, "bob@example.com", PASSWORD, "customer")
        .await
        .unwrap();
    t.audit.clear();

    for attempt in 1..=4 {
        let rejection = t
            .core
            .gate
            .login(&request, "bob@example.com", "Wrong-Guess-1!", None)
            .await
            .unwrap_err();
        assert!(
            matches!(
                rejection.error,
                AppError::Auth(AuthError::InvalidCredentials)
            ),
            "attempt {} should be a plain rejection",
            attempt
        );
    }

    // Attempt 5 trips the lockout; the variant is precise, the message
    // generic.
    let rejection = t
        .core
        .gate
        .login(&request, "bob@example.com", "Wrong-Guess-1!", None)
        .await
        .unwrap_err();
    assert!(matches!(
        rejection.error,
        AppError::Auth(AuthError::AccountLocked { .. })
    ));
    assert_eq!(rejection.client_message(), "Invalid credentials");

    // Even the correct password is now rejected.
    let rejection = t
        .core
        .gate
        .login(&request, "bob@example.com", PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(
        rejection.error,
        AppError::Auth(AuthError::AccountLocked { .. })
    ));

    // Audit recorded one event per attempt, all failures.
    let events = t.audit.events();
    assert_eq!(events.len(), 6);
    assert!(events.iter().all(|e| !e.success));

    // Once the lockout window has elapsed, the correct password works and
    // the counter resets.
    let account = t
        .accounts
        .find_by_email("bob@example.com")
        .await
        .unwrap()
        .unwrap();
    let mut unlocked = account.clone();
    unlocked.locked_until = Some(Utc::now() - Duration::seconds(1));
    t.accounts.update_security_state(&unlocked).await.unwrap();

    let (_, outcome) = t
        .core
        .gate
        .login(&request, "bob@example.com", PASSWORD, None)
        .await
        .expect("login should succeed after the lockout elapses");
    assert!(matches!(outcome, LoginOutcome::Authenticated(_)));

    let account = t
        .accounts
        .find_by_email("bob@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.failed_login_attempts, 0);
    assert!(account.locked_until.is_none());
}

#[tokio::test]
async fn mfa_enrollment_gates_the_next_login() {
    let t = test_core();
    let request = GateRequest::anonymous(CLIENT_IP);

    let (_, session) = t
        .core
        .gate
        .register(&request, "carol@example.com", PASSWORD, "customer")
        .await
        .unwrap();
    let meta = payguard_core::guard::RequestMeta::new(CLIENT_IP);

    // Enroll and confirm with a currently valid code.
    let enrollment = t.core.guard.mfa_setup(session.user_id, &meta).await.unwrap();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let mfa = payguard_core::MfaService::new("PayGuard Test");
    let code = mfa.code_at(&enrollment.secret, now).unwrap();
    t.core
        .guard
        .mfa_confirm(session.user_id, &code, &meta)
        .await
        .unwrap();

    // Password alone now only gets you to the MFA step, with no tokens.
    let (_, outcome) = t
        .core
        .gate
        .login(&request, "carol@example.com", PASSWORD, None)
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::MfaRequired));

    // Password plus a valid code completes the login.
    let code = mfa.code_at(&enrollment.secret, now).unwrap();
    let (_, outcome) = t
        .core
        .gate
        .login(&request, "carol@example.com", PASSWORD, Some(&code))
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
}

#[tokio::test]
async fn login_rejections_share_one_client_message() {
    let t = test_core();
    let request = GateRequest::anonymous(CLIENT_IP);

    t.core
        .gate
        .register(&request, "dave@example.com", PASSWORD, "customer")
        .await
        .unwrap();

    let unknown = t
        .core
        .gate
        .login(&request, "nobody@example.com", PASSWORD, None)
        .await
        .unwrap_err();
    let wrong = t
        .core
        .gate
        .login(&request, "dave@example.com", "Wrong-Guess-1!", None)
        .await
        .unwrap_err();

    assert_eq!(unknown.client_message(), wrong.client_message());
}
