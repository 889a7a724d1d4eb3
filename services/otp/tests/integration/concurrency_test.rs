use std::sync::Arc;

use futures::future::join_all;

use agri_domain::challenge::ChallengeStatus;
use agri_domain::purpose::Purpose;

use agri_otp::config::OtpConfig;
use agri_otp::error::OtpServiceError;

use crate::helpers::{Harness, email, relaxed_config, request, request_from_ip, verify};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_leave_single_pending_challenge_under_concurrent_requests() {
    let h = Harness::new(relaxed_config());
    let uc = Arc::new(h.request_uc());
    let recipient = email("a@b.com");

    let handles = (0..50).map(|_| {
        let uc = Arc::clone(&uc);
        let recipient = recipient.clone();
        tokio::spawn(async move { uc.execute(request(&recipient, Purpose::Login)).await })
    });
    let results = join_all(handles).await;
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

    let stored = h.store.challenges();
    assert_eq!(stored.len(), 50);
    let pending: Vec<_> = stored
        .iter()
        .filter(|c| c.status == ChallengeStatus::Pending)
        .collect();
    assert_eq!(pending.len(), 1);
    assert!(
        stored
            .iter()
            .filter(|c| c.id != pending[0].id)
            .all(|c| c.status == ChallengeStatus::Expired)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_count_every_concurrent_wrong_code() {
    let h = Harness::new(relaxed_config());
    let recipient = email("a@b.com");
    let issued = h
        .request_uc()
        .execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();
    let bad: String = issued
        .code
        .chars()
        .map(|c| if c == '9' { '8' } else { '9' })
        .collect();
    let uc = Arc::new(h.verify_uc());

    let handles = (0..10).map(|_| {
        let uc = Arc::clone(&uc);
        let recipient = recipient.clone();
        let bad = bad.clone();
        tokio::spawn(async move { uc.execute(verify(&recipient, Purpose::Login, &bad)).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let mismatches = results
        .iter()
        .filter(|r| matches!(r, Err(OtpServiceError::Mismatch { .. })))
        .count();
    let exceeded = results
        .iter()
        .filter(|r| matches!(r, Err(OtpServiceError::AttemptsExceeded)))
        .count();
    assert_eq!(mismatches, 2);
    assert_eq!(exceeded, 8);

    let stored = &h.store.challenges()[0];
    assert_eq!(stored.attempts_used, 3);
    assert_eq!(stored.status, ChallengeStatus::Failed);
    assert_eq!(h.store.attempt_records().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_verify_correct_code_exactly_once_under_contention() {
    let h = Harness::new(relaxed_config());
    let recipient = email("a@b.com");
    let issued = h
        .request_uc()
        .execute(request(&recipient, Purpose::Login))
        .await
        .unwrap();
    let uc = Arc::new(h.verify_uc());

    let handles = (0..20).map(|_| {
        let uc = Arc::clone(&uc);
        let recipient = recipient.clone();
        let code = issued.code.clone();
        tokio::spawn(async move { uc.execute(verify(&recipient, Purpose::Login, &code)).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
        r,
        Err(OtpServiceError::AlreadyResolved {
            status: ChallengeStatus::Verified
        })
    )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_keep_pairs_independent_under_load() {
    let h = Harness::new(relaxed_config());
    let request_uc = Arc::new(h.request_uc());
    let verify_uc = Arc::new(h.verify_uc());

    let handles = (0..20).map(|i| {
        let request_uc = Arc::clone(&request_uc);
        let verify_uc = Arc::clone(&verify_uc);
        tokio::spawn(async move {
            let recipient = email(&format!("user{i}@b.com"));
            let issued = request_uc
                .execute(request(&recipient, Purpose::Registration))
                .await
                .unwrap();
            verify_uc
                .execute(verify(&recipient, Purpose::Registration, &issued.code))
                .await
        })
    });
    let results = join_all(handles).await;

    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));
    assert!(
        h.store
            .challenges()
            .iter()
            .all(|c| c.status == ChallengeStatus::Verified)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_grant_exactly_the_hourly_quota_under_concurrent_requests() {
    let h = Harness::new(OtpConfig::default());
    let uc = Arc::new(h.request_uc());
    let recipient = email("a@b.com");

    let handles = (0..50).map(|_| {
        let uc = Arc::clone(&uc);
        let recipient = recipient.clone();
        tokio::spawn(async move { uc.execute(request(&recipient, Purpose::Login)).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let granted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(granted, 5);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(OtpServiceError::RateLimited { .. })))
    );
    assert_eq!(h.channel.count(), 5);
    assert_eq!(h.limits.count("otp:rl:recipient:login:a@b.com:hour"), 5);
    assert_eq!(h.limits.count("otp:rl:global:minute"), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_grant_exactly_the_ip_quota_across_recipients() {
    let h = Harness::new(OtpConfig::default());
    let uc = Arc::new(h.request_uc());

    let handles = (0..50).map(|i| {
        let uc = Arc::clone(&uc);
        tokio::spawn(async move {
            let recipient = email(&format!("user{i}@b.com"));
            uc.execute(request_from_ip(&recipient, Purpose::Login, "198.51.100.4"))
                .await
        })
    });
    let results = join_all(handles).await;

    let granted = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(granted, 10);
    assert_eq!(h.limits.count("otp:rl:ip:198.51.100.4:hour"), 10);
}
