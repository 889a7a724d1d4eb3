use chrono::Duration;

use agri_core::clock::Clock;
use agri_domain::purpose::Purpose;

use agri_otp::config::OtpConfig;
use agri_otp::error::OtpServiceError;
use agri_otp::usecase::rate_limit::BLOCKED_REASON;

use crate::helpers::{Harness, email, request, request_from_ip};

fn rate_limited_reason(result: Result<impl std::fmt::Debug, OtpServiceError>) -> String {
    match result {
        Err(OtpServiceError::RateLimited { reason }) => reason,
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn should_reject_sixth_request_within_an_hour() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");
    let uc = h.request_uc();

    for _ in 0..5 {
        uc.execute(request(&recipient, Purpose::Login))
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(1));
    }
    let sixth = uc.execute(request(&recipient, Purpose::Login)).await;

    assert_eq!(
        rate_limited_reason(sixth),
        "hourly limit for recipient exceeded"
    );
    assert_eq!(h.channel.count(), 5);
    assert_eq!(h.store.challenges().len(), 5);
}

#[tokio::test]
async fn should_allow_requests_again_after_an_hour() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");
    let uc = h.request_uc();

    for _ in 0..5 {
        uc.execute(request(&recipient, Purpose::Login))
            .await
            .unwrap();
    }
    assert!(uc.execute(request(&recipient, Purpose::Login)).await.is_err());

    h.clock.advance(Duration::hours(1));
    assert!(uc.execute(request(&recipient, Purpose::Login)).await.is_ok());
}

#[tokio::test]
async fn should_enforce_daily_recipient_limit() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");
    let uc = h.request_uc();

    for _ in 0..2 {
        for _ in 0..5 {
            uc.execute(request(&recipient, Purpose::Login))
                .await
                .unwrap();
        }
        h.clock.advance(Duration::hours(1));
    }
    let eleventh = uc.execute(request(&recipient, Purpose::Login)).await;
    assert_eq!(
        rate_limited_reason(eleventh),
        "daily limit for recipient exceeded"
    );

    h.clock.advance(Duration::days(1));
    assert!(uc.execute(request(&recipient, Purpose::Login)).await.is_ok());
}

#[tokio::test]
async fn should_enforce_ip_limit_across_recipients() {
    let h = Harness::new(OtpConfig::default());
    let uc = h.request_uc();

    for i in 0..10 {
        let recipient = email(&format!("user{i}@b.com"));
        uc.execute(request_from_ip(&recipient, Purpose::Login, "198.51.100.4"))
            .await
            .unwrap();
    }
    let blocked = uc
        .execute(request_from_ip(
            &email("user10@b.com"),
            Purpose::Login,
            "198.51.100.4",
        ))
        .await;
    assert_eq!(
        rate_limited_reason(blocked),
        "hourly limit for ip address exceeded"
    );

    // Another address is unaffected.
    assert!(
        uc.execute(request_from_ip(
            &email("user10@b.com"),
            Purpose::Login,
            "198.51.100.5",
        ))
        .await
        .is_ok()
    );
}

#[tokio::test]
async fn should_enforce_global_limit_per_minute() {
    let h = Harness::new(OtpConfig::default());
    let uc = h.request_uc();

    for i in 0..20 {
        uc.execute(request(&email(&format!("user{i}@b.com")), Purpose::Login))
            .await
            .unwrap();
    }
    let over = uc
        .execute(request(&email("late@b.com"), Purpose::Login))
        .await;
    assert_eq!(rate_limited_reason(over), "global rate limit exceeded");

    h.clock.advance(Duration::minutes(1));
    assert!(
        uc.execute(request(&email("late@b.com"), Purpose::Login))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn should_not_spend_quota_on_rejected_request() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");
    let uc = h.request_uc();

    for _ in 0..6 {
        let _ = uc.execute(request(&recipient, Purpose::Login)).await;
    }
    assert_eq!(h.limits.count("otp:rl:recipient:login:a@b.com:hour"), 5);
    assert_eq!(h.limits.count("otp:rl:recipient:login:a@b.com:day"), 5);
    assert_eq!(h.limits.count("otp:rl:global:minute"), 5);
}

#[tokio::test]
async fn should_scope_recipient_limits_per_purpose() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");
    let uc = h.request_uc();

    for _ in 0..5 {
        uc.execute(request(&recipient, Purpose::Login))
            .await
            .unwrap();
    }
    assert!(uc.execute(request(&recipient, Purpose::Login)).await.is_err());
    assert!(
        uc.execute(request(&recipient, Purpose::PasswordReset))
            .await
            .is_ok()
    );
}

// ── Blocking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_reject_blocked_recipient_until_unblocked() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");
    let limiter = h.rate_limiter();

    let until = limiter
        .block(
            recipient.as_str(),
            Purpose::Login,
            Duration::minutes(30),
            h.clock.now(),
        )
        .await
        .unwrap();
    assert_eq!(until, h.clock.now() + Duration::minutes(30));

    let refused = h
        .request_uc()
        .execute(request(&recipient, Purpose::Login))
        .await;
    assert_eq!(rate_limited_reason(refused), BLOCKED_REASON);
    assert_eq!(h.channel.count(), 0);
    assert_eq!(h.limits.count("otp:rl:recipient:login:a@b.com:hour"), 0);

    limiter
        .unblock(recipient.as_str(), Purpose::Login)
        .await
        .unwrap();
    assert!(
        h.request_uc()
            .execute(request(&recipient, Purpose::Login))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn should_lift_block_when_it_lapses() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");

    h.rate_limiter()
        .block(
            recipient.as_str(),
            Purpose::Login,
            Duration::minutes(30),
            h.clock.now(),
        )
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(30));

    assert!(
        h.request_uc()
            .execute(request(&recipient, Purpose::Login))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn should_block_only_the_given_purpose() {
    let h = Harness::new(OtpConfig::default());
    let recipient = email("a@b.com");

    h.rate_limiter()
        .block(
            recipient.as_str(),
            Purpose::Login,
            Duration::hours(1),
            h.clock.now(),
        )
        .await
        .unwrap();

    assert!(
        h.request_uc()
            .execute(request(&recipient, Purpose::Registration))
            .await
            .is_ok()
    );
}
