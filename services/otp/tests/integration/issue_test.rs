use std::time::Duration as StdDuration;

use chrono::Duration;

use agri_core::clock::Clock;
use agri_domain::challenge::ChallengeStatus;
use agri_domain::id::{ChallengeId, UserId};
use agri_domain::purpose::Purpose;
use agri_domain::recipient::RecipientKind;

use agri_otp::config::OtpConfig;
use agri_otp::domain::types::RequestContext;
use agri_otp::error::OtpServiceError;
use agri_otp::usecase::issue::RequestOtpInput;

use crate::helpers::{FailingChannel, Harness, SlowChannel, email, request};

#[tokio::test]
async fn should_issue_six_digit_code_expiring_in_ten_minutes() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");

    let challenge = h
        .request_uc()
        .execute(request(&recipient, Purpose::Registration))
        .await
        .unwrap();

    assert_eq!(challenge.code.len(), 6);
    assert!(challenge.code.chars().all(|c| c.is_ascii_digit()));
    assert_ne!(challenge.code.as_bytes()[0], b'0');
    assert_eq!(challenge.status, ChallengeStatus::Pending);
    assert_eq!(challenge.attempts_used, 0);
    assert_eq!(challenge.max_attempts, 3);
    assert_eq!(challenge.created_at, h.clock.now());
    assert_eq!(challenge.expires_at - challenge.created_at, Duration::minutes(10));

    let stored = h.store.challenges();
    assert_eq!(stored, vec![challenge.clone()]);
}

#[tokio::test]
async fn should_hand_code_and_deadline_to_delivery_channel() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("Farmer@Example.com");

    let challenge = h
        .request_uc()
        .execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();

    let sent = h.channel.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient.as_str(), "farmer@example.com");
    assert_eq!(sent[0].recipient.kind(), RecipientKind::Email);
    assert_eq!(sent[0].purpose, Purpose::Login);
    assert_eq!(sent[0].code, challenge.code);
    assert_eq!(sent[0].expires_at, challenge.expires_at);
    assert_eq!(sent[0].ttl_minutes, 10);
}

#[tokio::test]
async fn should_expire_previous_pending_challenge_on_new_request() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");
    let uc = h.request_uc();

    let first = uc
        .execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(90));
    let second = uc
        .execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();

    let stored = h.store.challenges();
    let status_of = |id: ChallengeId| stored.iter().find(|c| c.id == id).unwrap().status;
    assert_eq!(status_of(first.id), ChallengeStatus::Expired);
    assert_eq!(status_of(second.id), ChallengeStatus::Pending);
}

#[tokio::test]
async fn should_keep_purposes_independent() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");
    let uc = h.request_uc();

    uc.execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();
    uc.execute(request(&recipient, Purpose::PasswordReset))
        .await
        .unwrap();

    let pending = h
        .store
        .challenges()
        .into_iter()
        .filter(|c| c.status == ChallengeStatus::Pending)
        .count();
    assert_eq!(pending, 2);
}

#[tokio::test]
async fn should_record_request_context_on_challenge() {
    let h = Harness::new(OtpConfig::default());
    let user_id = UserId(uuid::Uuid::new_v4());

    let challenge = h
        .request_uc()
        .execute(RequestOtpInput {
            recipient: email("a@b.com"),
            purpose: Purpose::AccountSecurity,
            context: RequestContext {
                ip: Some("203.0.113.7".to_owned()),
                user_agent: Some("AgriApp/2.1".to_owned()),
                user_id: Some(user_id),
            },
        })
        .await
        .unwrap();

    assert_eq!(challenge.user_id, Some(user_id));
    assert_eq!(challenge.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(challenge.user_agent.as_deref(), Some("AgriApp/2.1"));
}

#[tokio::test]
async fn should_generate_alphanumeric_codes_when_configured() {
    let h = Harness::new(OtpConfig {
        code_length: 8,
        code_alphabet: agri_domain::challenge::CodeAlphabet::Alphanumeric,
        ..OtpConfig::default()
    });

    let challenge = h
        .request_uc()
        .execute(request(&email("a@b.com"), Purpose::Login))
        .await
        .unwrap();

    assert_eq!(challenge.code.len(), 8);
    assert!(
        challenge
            .code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    );
}

// ── Delivery failure ─────────────────────────────────────────────────────────

#[tokio::test]
async fn should_fail_challenge_when_delivery_fails() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");

    let result = h
        .request_with(FailingChannel)
        .execute(request(&recipient, Purpose::Login))
        .await;

    match result {
        Err(OtpServiceError::DeliveryFailed { cause }) => assert!(cause.contains("503")),
        other => panic!("expected DeliveryFailed, got {other:?}"),
    }
    let stored = h.store.challenges();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, ChallengeStatus::Failed);
}

#[tokio::test]
async fn should_keep_quota_spent_when_delivery_fails() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");

    let _ = h
        .request_with(FailingChannel)
        .execute(request(&recipient, Purpose::Login))
        .await;

    assert_eq!(h.limits.count("otp:rl:recipient:login:a@b.com:hour"), 1);
    assert_eq!(h.limits.count("otp:rl:global:minute"), 1);
}

#[tokio::test(start_paused = true)]
async fn should_treat_slow_delivery_as_failed() {
    let h = Harness::new(OtpConfig {
        delivery_timeout_seconds: 2,
        ..OtpConfig::default()
    });

    let result = h
        .request_with(SlowChannel(StdDuration::from_secs(30)))
        .execute(request(&email("a@b.com"), Purpose::Login))
        .await;

    match result {
        Err(OtpServiceError::DeliveryFailed { cause }) => assert_eq!(cause, "delivery timed out"),
        other => panic!("expected DeliveryFailed, got {other:?}"),
    }
    assert_eq!(h.store.challenges()[0].status, ChallengeStatus::Failed);
}

// ── Resend ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_refuse_resend_within_cooldown() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");

    h.request_uc()
        .execute(request(&recipient, Purpose::Registration))
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(5));

    let result = h
        .resend_uc()
        .execute(request(&recipient, Purpose::Registration))
        .await;

    assert!(
        matches!(
            result,
            Err(OtpServiceError::CooldownActive {
                seconds_remaining: 55
            })
        ),
        "expected CooldownActive(55), got {result:?}"
    );
    assert_eq!(h.store.challenges().len(), 1);
    assert_eq!(h.channel.count(), 1);
    assert_eq!(
        h.limits.count("otp:rl:recipient:registration:a@b.com:hour"),
        1,
        "cooldown refusal must not spend quota"
    );
}

#[tokio::test]
async fn should_round_cooldown_remainder_up() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");

    h.request_uc()
        .execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();
    h.clock.advance(Duration::milliseconds(59_500));

    let result = h
        .resend_uc()
        .execute(request(&recipient, Purpose::Login))
        .await;
    assert!(matches!(
        result,
        Err(OtpServiceError::CooldownActive {
            seconds_remaining: 1
        })
    ));
}

#[tokio::test]
async fn should_resend_after_cooldown() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");

    let first = h
        .request_uc()
        .execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(60));

    let second = h
        .resend_uc()
        .execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(h.channel.count(), 2);
    assert_eq!(h.channel.last_code(), second.code);
}

#[tokio::test]
async fn should_resend_when_nothing_was_issued() {
    let h = Harness::new(OtpConfig::default());

    let challenge = h
        .resend_uc()
        .execute(request(&email("a@b.com"), Purpose::Login))
        .await
        .unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Pending);
}
