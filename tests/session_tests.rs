// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session coordinator behaviour over in-memory backends.

use frost_warlord::db::DocumentStore;
use frost_warlord::error::AppError;
use frost_warlord::models::{ProfileUpdate, SessionPhase, TeamRole};
use frost_warlord::retry::RetryPolicy;
use frost_warlord::services::{ProfileImage, UploadProgress};
use std::sync::Arc;
use tokio::sync::watch;

mod common;
use common::{
    alex_signup, create_test_portal, create_test_portal_with_store, fast_retry, member_profile,
    signup_request, FlakyStore, GatedStore,
};

// ═══════════════════════════════════════════════════════════════════════════
// SIGN-UP
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_signup_creates_profile_with_defaults() {
    let portal = create_test_portal().await;
    let coordinator = &portal.coordinator;

    let identity = coordinator.sign_up(&alex_signup()).await.unwrap();
    let profile = coordinator
        .fetch_profile(&identity.uid)
        .await
        .unwrap()
        .expect("Profile should exist after sign-up");

    assert_eq!(profile.full_name, "Alex Chen");
    assert_eq!(profile.role, Some(TeamRole::Tank));
    assert_eq!(profile.wins, 0);
    assert_eq!(profile.losses, 0);
    assert_eq!(profile.level, 1);
    assert_eq!(profile.rank, "Unranked");
    assert!(!profile.created_at.is_empty());

    let session = coordinator.wait_for_profile().await;
    assert_eq!(session.phase(), SessionPhase::Authenticated);
    assert_eq!(session.profile, Some(profile));
}

#[tokio::test]
async fn test_signup_with_every_role() {
    let portal = create_test_portal().await;
    let coordinator = &portal.coordinator;

    for (i, role) in TeamRole::ALL.iter().enumerate() {
        let email = format!("member{}@test.com", i);
        let identity = coordinator
            .sign_up(&signup_request(&email, "Passw0rd", "Team Member", *role))
            .await
            .unwrap();
        let profile = coordinator.fetch_profile(&identity.uid).await.unwrap().unwrap();
        assert_eq!(profile.role, Some(*role));
        coordinator.log_out().await.unwrap();
    }
}

#[tokio::test]
async fn test_invalid_passwords_never_reach_backend() {
    let portal = create_test_portal().await;

    for password in ["passw0rd", "Password", "Pass0"] {
        let err = portal
            .coordinator
            .sign_up(&signup_request("alex@test.com", password, "Alex Chen", TeamRole::Tank))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{password}: {err:?}");
    }

    assert_eq!(portal.provider.calls().creates, 0);
    assert_eq!(portal.db.calls().creates, 0);
    assert_eq!(portal.coordinator.phase(), SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn test_invalid_profile_fields_never_reach_backend() {
    let portal = create_test_portal().await;

    let mut short_phone = alex_signup();
    short_phone.profile.phone = "0812".to_string();
    let mut short_name = alex_signup();
    short_name.profile.full_name = "Al".to_string();
    let mut bad_email = alex_signup();
    bad_email.email = "alex-at-test.com".to_string();

    let cases = [
        (short_phone, "Phone number must be at least 10 characters"),
        (short_name, "Full name must be at least 3 characters"),
        (bad_email, "Please enter a valid email"),
    ];
    for (request, message) in cases {
        let err = portal.coordinator.sign_up(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.user_message(), message);
        assert_eq!(
            portal.coordinator.session().last_error.as_deref(),
            Some(message)
        );
    }
    assert_eq!(portal.provider.calls().creates, 0);
}

#[tokio::test]
async fn test_padded_profile_fields_are_trimmed_before_checks() {
    let portal = create_test_portal().await;

    let mut padded = alex_signup();
    padded.profile.full_name = "  Al  ".to_string();
    padded.profile.phone = "123456789 ".to_string();
    let err = portal.coordinator.sign_up(&padded).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(portal.provider.calls().creates, 0);

    let mut padded = alex_signup();
    padded.email = " alex@test.com ".to_string();
    padded.profile.full_name = "  Alex Chen ".to_string();
    padded.profile.phone = " 08123456789\t".to_string();
    let identity = portal.coordinator.sign_up(&padded).await.unwrap();

    let stored = portal.db.get_profile(&identity.uid).await.unwrap().unwrap();
    assert_eq!(stored.full_name, "Alex Chen");
    assert_eq!(stored.phone, "08123456789");
    assert!(portal.provider.has_account("alex@test.com"));
}

#[tokio::test]
async fn test_duplicate_email_is_reported() {
    let portal = create_test_portal().await;
    portal.provider.add_account("alex@test.com", "Passw0rd");

    let err = portal.coordinator.sign_up(&alex_signup()).await.unwrap_err();
    assert!(matches!(err, AppError::EmailInUse));
    assert_eq!(
        portal.coordinator.session().last_error.as_deref(),
        Some("This email is already in use. Please use a different email or login.")
    );
    assert_eq!(portal.db.calls().creates, 0);
}

#[tokio::test]
async fn test_failed_profile_write_rolls_back_identity() {
    let portal = create_test_portal().await;
    portal.db.set_fail_writes(true);

    let err = portal.coordinator.sign_up(&alex_signup()).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::PartialSignup {
            rolled_back: true,
            ..
        }
    ));
    assert_eq!(portal.provider.calls().deletes, 1);
    assert!(!portal.provider.has_account("alex@test.com"));

    let session = portal.coordinator.wait_for_profile().await;
    assert_eq!(session.phase(), SessionPhase::Unauthenticated);

    // The email is free again once the store recovers.
    portal.db.set_fail_writes(false);
    portal.coordinator.sign_up(&alex_signup()).await.unwrap();
}

#[tokio::test]
async fn test_failed_rollback_is_reported() {
    let portal = create_test_portal().await;
    portal.db.set_fail_writes(true);
    portal.provider.set_fail_delete(true);

    let err = portal.coordinator.sign_up(&alex_signup()).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::PartialSignup {
            rolled_back: false,
            ..
        }
    ));
    assert!(portal.provider.has_account("alex@test.com"));
    assert_eq!(
        portal.coordinator.wait_for_profile().await.phase(),
        SessionPhase::Unauthenticated
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// LOG-IN / LOG-OUT
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_wrong_password_keeps_session_unauthenticated() {
    let portal = create_test_portal().await;
    portal.coordinator.sign_up(&alex_signup()).await.unwrap();
    portal.coordinator.log_out().await.unwrap();

    let err = portal
        .coordinator
        .log_in("alex@test.com", "wrongpass")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidCredentials));
    assert_eq!(portal.coordinator.phase(), SessionPhase::Unauthenticated);
    assert!(portal.coordinator.session().profile.is_none());
}

#[tokio::test]
async fn test_unknown_account_reads_like_wrong_password() {
    let portal = create_test_portal().await;

    let err = portal
        .coordinator
        .log_in("nobody@test.com", "Passw0rd")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AccountNotFound));
    assert_eq!(
        err.user_message(),
        AppError::InvalidCredentials.user_message()
    );
}

#[tokio::test]
async fn test_login_fetches_profile() {
    let portal = create_test_portal().await;
    let uid = portal.provider.add_account("alex@test.com", "Passw0rd");
    portal
        .db
        .create_profile(&uid, &member_profile("Alex Chen", TeamRole::Support))
        .await
        .unwrap();

    let identity = portal
        .coordinator
        .log_in("alex@test.com", "Passw0rd")
        .await
        .unwrap();
    assert_eq!(identity.uid, uid);

    let session = portal.coordinator.wait_for_profile().await;
    assert_eq!(session.phase(), SessionPhase::Authenticated);
    assert_eq!(session.profile.unwrap().role, Some(TeamRole::Support));
    // One fetch, even though the provider also announced the sign-in.
    assert_eq!(portal.db.calls().reads, 1);
}

#[tokio::test]
async fn test_login_without_profile_document() {
    let portal = create_test_portal().await;
    portal.provider.add_account("alex@test.com", "Passw0rd");

    portal
        .coordinator
        .log_in("alex@test.com", "Passw0rd")
        .await
        .unwrap();
    let session = portal.coordinator.wait_for_profile().await;

    assert_eq!(session.phase(), SessionPhase::Authenticated);
    assert!(session.profile.is_none());
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn test_login_again_recovers_failed_profile_fetch() {
    let db = Arc::new(frost_warlord::db::MemoryDb::new());
    let flaky = Arc::new(FlakyStore::new(db.clone(), 1, 0));
    let portal = create_test_portal_with_store(db.clone(), flaky, RetryPolicy::none()).await;
    let uid = portal.provider.add_account("alex@test.com", "Passw0rd");
    db.create_profile(&uid, &member_profile("Alex Chen", TeamRole::Tank))
        .await
        .unwrap();

    portal
        .coordinator
        .log_in("alex@test.com", "Passw0rd")
        .await
        .unwrap();
    let session = portal.coordinator.wait_for_profile().await;
    assert!(session.profile.is_none());
    assert!(session.last_error.is_some());
    assert_eq!(db.calls().reads, 0);

    // Same uid, but nothing in flight: logging in again must refetch.
    portal
        .coordinator
        .log_in("alex@test.com", "Passw0rd")
        .await
        .unwrap();
    let session = portal.coordinator.wait_for_profile().await;
    assert_eq!(session.profile.unwrap().full_name, "Alex Chen");
    assert!(session.last_error.is_none());
    assert_eq!(db.calls().reads, 1);
}

#[tokio::test]
async fn test_logout_when_signed_out_is_noop() {
    let portal = create_test_portal().await;

    portal.coordinator.log_out().await.unwrap();
    portal.coordinator.log_out().await.unwrap();

    assert_eq!(portal.coordinator.phase(), SessionPhase::Unauthenticated);
    assert_eq!(portal.provider.calls().ends, 0);
}

#[tokio::test]
async fn test_logout_clears_session() {
    let portal = create_test_portal().await;
    portal.coordinator.sign_up(&alex_signup()).await.unwrap();
    portal.coordinator.wait_for_profile().await;

    portal.coordinator.log_out().await.unwrap();

    let session = portal.coordinator.session();
    assert_eq!(session.phase(), SessionPhase::Unauthenticated);
    assert!(session.identity.is_none());
    assert!(session.profile.is_none());
    assert_eq!(portal.provider.calls().ends, 1);
}

#[tokio::test]
async fn test_logout_provider_failure_still_clears_locally() {
    let portal = create_test_portal().await;
    portal.coordinator.sign_up(&alex_signup()).await.unwrap();
    portal.provider.set_fail_end_session(true);

    let err = portal.coordinator.log_out().await.unwrap_err();

    assert!(matches!(err, AppError::Network(_)));
    let session = portal.coordinator.session();
    assert_eq!(session.phase(), SessionPhase::Unauthenticated);
    assert!(session.profile.is_none());
}

#[tokio::test]
async fn test_stale_fetch_does_not_repopulate_after_logout() {
    let db = Arc::new(frost_warlord::db::MemoryDb::new());
    let gated = Arc::new(GatedStore::new(db.clone()));
    let portal =
        create_test_portal_with_store(db.clone(), gated.clone(), fast_retry(1)).await;

    let uid = portal.provider.add_account("alex@test.com", "Passw0rd");
    db.create_profile(&uid, &member_profile("Alex Chen", TeamRole::Tank))
        .await
        .unwrap();

    gated.close();
    portal
        .coordinator
        .log_in("alex@test.com", "Passw0rd")
        .await
        .unwrap();
    assert!(portal.coordinator.session().profile_pending);

    portal.coordinator.log_out().await.unwrap();
    gated.open();
    gated.wait_for_reads(1).await;

    let session = portal.coordinator.session();
    assert_eq!(session.phase(), SessionPhase::Unauthenticated);
    assert!(session.profile.is_none());
    assert!(!session.profile_pending);
}

#[tokio::test]
async fn test_stale_fetch_loses_to_newer_identity() {
    let db = Arc::new(frost_warlord::db::MemoryDb::new());
    let gated = Arc::new(GatedStore::new(db.clone()));
    let portal =
        create_test_portal_with_store(db.clone(), gated.clone(), fast_retry(1)).await;

    let alex = portal.provider.add_account("alex@test.com", "Passw0rd");
    let sam = portal.provider.add_account("sam@test.com", "Passw0rd");
    db.create_profile(&alex, &member_profile("Alex Chen", TeamRole::Tank))
        .await
        .unwrap();
    db.create_profile(&sam, &member_profile("Sam Rivera", TeamRole::Mage))
        .await
        .unwrap();

    gated.close();
    let coordinator = &portal.coordinator;
    coordinator.log_in("alex@test.com", "Passw0rd").await.unwrap();
    coordinator.log_out().await.unwrap();
    coordinator.log_in("sam@test.com", "Passw0rd").await.unwrap();
    gated.open();

    let session = coordinator.wait_for_profile().await;
    gated.wait_for_reads(2).await;

    assert_eq!(session.uid(), Some(sam.as_str()));
    let session = coordinator.session();
    assert_eq!(session.uid(), Some(sam.as_str()));
    assert_eq!(session.profile.unwrap().full_name, "Sam Rivera");
}

// ═══════════════════════════════════════════════════════════════════════════
// PASSWORD RESET
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_reset_password_does_not_reveal_accounts() {
    let portal = create_test_portal().await;
    portal.provider.add_account("alex@test.com", "Passw0rd");

    let unknown = portal.coordinator.reset_password("nonexistent@test.com").await;
    let known = portal.coordinator.reset_password("alex@test.com").await;

    assert!(unknown.is_ok());
    assert!(known.is_ok());
    assert_eq!(portal.provider.sent_resets(), vec!["alex@test.com".to_string()]);
    assert_eq!(portal.coordinator.phase(), SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn test_reset_password_rejects_malformed_email() {
    let portal = create_test_portal().await;

    assert!(matches!(
        portal.coordinator.reset_password("not-an-email").await,
        Err(AppError::InvalidInput(_))
    ));
    assert_eq!(portal.provider.calls().resets, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE UPDATES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_update_profile_reads_back_stored_profile() {
    let portal = create_test_portal().await;
    let identity = portal.coordinator.sign_up(&alex_signup()).await.unwrap();
    portal.coordinator.wait_for_profile().await;

    let profile = portal
        .coordinator
        .update_profile(ProfileUpdate {
            bio: Some("Frontline since season 3".to_string()),
            role: Some(TeamRole::Assassin),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(profile.bio.as_deref(), Some("Frontline since season 3"));
    assert_eq!(profile.role, Some(TeamRole::Assassin));
    assert_eq!(profile.full_name, "Alex Chen");
    assert!(profile.updated_at.is_some());

    let stored = portal.db.get_profile(&identity.uid).await.unwrap().unwrap();
    assert_eq!(portal.coordinator.session().profile, Some(stored));
}

#[tokio::test]
async fn test_update_profile_rejects_long_bio_locally() {
    let portal = create_test_portal().await;
    portal.coordinator.sign_up(&alex_signup()).await.unwrap();
    let before = portal.coordinator.wait_for_profile().await.profile;

    let err = portal
        .coordinator
        .update_profile(ProfileUpdate {
            bio: Some("x".repeat(201)),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(portal.db.calls().updates, 0);
    assert_eq!(portal.coordinator.session().profile, before);
}

#[tokio::test]
async fn test_update_profile_requires_identity() {
    let portal = create_test_portal().await;

    let err = portal
        .coordinator
        .update_profile(ProfileUpdate {
            bio: Some("hello".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Unauthorized));
    assert_eq!(portal.db.calls().updates, 0);
}

#[tokio::test]
async fn test_update_profile_rejects_empty_update() {
    let portal = create_test_portal().await;
    portal.coordinator.sign_up(&alex_signup()).await.unwrap();

    assert!(matches!(
        portal
            .coordinator
            .update_profile(ProfileUpdate::default())
            .await,
        Err(AppError::InvalidInput(_))
    ));
    assert_eq!(portal.db.calls().updates, 0);
}

#[tokio::test]
async fn test_failed_write_leaves_profile_unchanged() {
    let portal = create_test_portal().await;
    portal.coordinator.sign_up(&alex_signup()).await.unwrap();
    let before = portal.coordinator.wait_for_profile().await.profile;
    portal.db.set_fail_writes(true);

    let err = portal
        .coordinator
        .update_profile(ProfileUpdate {
            bio: Some("hello".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Database(_)));
    let session = portal.coordinator.session();
    assert_eq!(session.profile, before);
    assert!(session.last_error.is_some());
}

// ═══════════════════════════════════════════════════════════════════════════
// RETRIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_transient_read_failures_are_retried() {
    let db = Arc::new(frost_warlord::db::MemoryDb::new());
    let flaky = Arc::new(FlakyStore::new(db.clone(), 2, 0));
    let portal = create_test_portal_with_store(db.clone(), flaky, fast_retry(3)).await;

    db.create_profile("uid-1", &member_profile("Alex Chen", TeamRole::Tank))
        .await
        .unwrap();

    let profile = portal.coordinator.fetch_profile("uid-1").await.unwrap();
    assert_eq!(profile.unwrap().full_name, "Alex Chen");
    assert_eq!(db.calls().reads, 1);
}

#[tokio::test]
async fn test_retries_give_up_after_max_attempts() {
    let db = Arc::new(frost_warlord::db::MemoryDb::new());
    let flaky = Arc::new(FlakyStore::new(db.clone(), 5, 0));
    let portal = create_test_portal_with_store(db.clone(), flaky, fast_retry(3)).await;

    let err = portal.coordinator.fetch_profile("uid-1").await.unwrap_err();
    assert!(matches!(err, AppError::Network(_)));
    assert_eq!(db.calls().reads, 0);
}

#[tokio::test]
async fn test_transient_update_failure_is_retried() {
    let db = Arc::new(frost_warlord::db::MemoryDb::new());
    let flaky = Arc::new(FlakyStore::new(db.clone(), 0, 1));
    let portal = create_test_portal_with_store(db.clone(), flaky, fast_retry(2)).await;
    portal.coordinator.sign_up(&alex_signup()).await.unwrap();

    let profile = portal
        .coordinator
        .update_profile(ProfileUpdate {
            favorite_hero: Some("Layla".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(profile.favorite_hero.as_deref(), Some("Layla"));
    assert_eq!(db.calls().updates, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE IMAGE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_upload_profile_image_sets_image_url() {
    let portal = create_test_portal().await;
    let identity = portal.coordinator.sign_up(&alex_signup()).await.unwrap();
    portal.coordinator.wait_for_profile().await;

    let (tx, rx) = watch::channel(UploadProgress::default());
    let profile = portal
        .coordinator
        .upload_profile_image(ProfileImage::new(vec![0x89; 1024], "image/png"), Some(tx))
        .await
        .unwrap();

    let path = format!("profileImages/{}", identity.uid);
    assert_eq!(
        profile.image_url.as_deref(),
        Some(format!("https://storage.memory.local/{}", path).as_str())
    );
    assert!(portal.objects.get(&path).is_some());
    assert_eq!(rx.borrow().percent(), 100.0);
}

#[tokio::test]
async fn test_upload_rejects_non_images() {
    let portal = create_test_portal().await;
    let identity = portal.coordinator.sign_up(&alex_signup()).await.unwrap();

    let err = portal
        .coordinator
        .upload_profile_image(ProfileImage::new(b"%PDF".to_vec(), "application/pdf"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(portal
        .objects
        .get(&format!("profileImages/{}", identity.uid))
        .is_none());
}

#[tokio::test]
async fn test_upload_requires_identity() {
    let portal = create_test_portal().await;

    assert!(matches!(
        portal
            .coordinator
            .upload_profile_image(ProfileImage::new(vec![1], "image/png"), None)
            .await,
        Err(AppError::Unauthorized)
    ));
}
