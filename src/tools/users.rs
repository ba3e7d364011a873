//! User account tools
//!
//! Registration with an email verification task, account verification, and
//! the user profile.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use ring::hmac;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::external::{generate_file_name, BlobStore, Mailer};
use crate::models::{HealthProfile, User, UserCreate, UserUpdate};
use crate::nutrition::Gender;

pub const VERIFICATION_SUBJECT: &str = "SweetLife - Email Verification";

const PHOTO_PROFILE_PREFIX: &str = "photo-profile";

/// Hex HMAC-SHA256 of the email under the application key
pub fn verification_token(email: &str, app_key: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, app_key.as_bytes());
    hex::encode(hmac::sign(&key, email.as_bytes()).as_ref())
}

/// Constant-time check of a token produced by `verification_token`
pub fn verify_token(email: &str, app_key: &str, token: &str) -> bool {
    let Ok(tag) = hex::decode(token.trim()) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, app_key.as_bytes());
    hmac::verify(&key, email.as_bytes(), &tag).is_ok()
}

pub fn verification_link(app_host: &str, user_id: i64, token: &str) -> String {
    format!("{}/api/v1/auth/verify/{}?token={}", app_host, user_id, token)
}

fn verification_email_body(link: &str) -> String {
    format!(
        r#"<html>
<body style="font-family: sans-serif;">
  <h2>Welcome to SweetLife</h2>
  <p>Please confirm your email address to activate your account.</p>
  <p><a href="{link}">Verify my account</a></p>
  <p>If the button does not work, copy this link into your browser:<br>{link}</p>
</body>
</html>"#
    )
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

// ============================================
// Verification task
// ============================================

/// Progress of a verification email task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VerificationState {
    /// Sending; `attempts` made so far
    Pending { attempts: u32 },
    Delivered { attempts: u32 },
    /// Every attempt failed and the unverified user was deleted
    RolledBack { attempts: u32, error: String },
    /// Every attempt failed and deleting the user failed too
    RollbackFailed { attempts: u32, error: String },
    /// Every attempt failed but the user was verified (or removed) meanwhile
    Abandoned { attempts: u32 },
    Cancelled,
}

impl VerificationState {
    pub fn is_final(&self) -> bool {
        !matches!(self, VerificationState::Pending { .. })
    }
}

#[derive(Debug, Clone)]
pub struct VerificationSettings {
    pub app_host: String,
    pub app_key: String,
    pub attempts: u32,
    pub backoff: Duration,
}

/// Owner of a running verification task
pub struct VerificationHandle {
    user_id: i64,
    state: Arc<watch::Sender<VerificationState>>,
    task: JoinHandle<()>,
}

/// Only a non-final state may be replaced
fn publish(state: &watch::Sender<VerificationState>, next: VerificationState) {
    state.send_if_modified(|current| {
        if current.is_final() {
            false
        } else {
            *current = next;
            true
        }
    });
}

impl VerificationHandle {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn state(&self) -> VerificationState {
        self.state.borrow().clone()
    }

    /// Wait until the task reaches a final state
    pub async fn wait(&self) -> VerificationState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(VerificationState::is_final).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Stop the task; a task that already finished keeps its outcome
    pub fn cancel(&self) -> VerificationState {
        self.task.abort();
        publish(&self.state, VerificationState::Cancelled);
        self.state()
    }
}

impl Drop for VerificationHandle {
    fn drop(&mut self) {
        if !self.state.borrow().is_final() {
            warn!("Verification task for user {} dropped while pending", self.user_id);
        }
    }
}

/// Send the verification email in the background.
///
/// After `attempts` failures the still-unverified user is deleted.
pub fn start_verification(
    db: Database,
    mailer: Arc<dyn Mailer>,
    user: &User,
    settings: &VerificationSettings,
) -> VerificationHandle {
    let token = verification_token(&user.email, &settings.app_key);
    let html = verification_email_body(&verification_link(&settings.app_host, user.id, &token));

    let (tx, _rx) = watch::channel(VerificationState::Pending { attempts: 0 });
    let state = Arc::new(tx);

    let task = tokio::spawn(run_verification(
        db,
        mailer,
        user.id,
        user.email.clone(),
        html,
        settings.attempts.max(1),
        settings.backoff,
        Arc::clone(&state),
    ));

    VerificationHandle {
        user_id: user.id,
        state,
        task,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_verification(
    db: Database,
    mailer: Arc<dyn Mailer>,
    user_id: i64,
    email: String,
    html: String,
    max_attempts: u32,
    backoff: Duration,
    state: Arc<watch::Sender<VerificationState>>,
) {
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match mailer.send(&email, VERIFICATION_SUBJECT, &html).await {
            Ok(()) => {
                info!("Verification email sent to {} (attempt {})", email, attempt);
                publish(&state, VerificationState::Delivered { attempts: attempt });
                return;
            }
            Err(e) => {
                warn!(
                    "Verification email to {} failed (attempt {}/{}): {}",
                    email, attempt, max_attempts, e
                );
                last_error = e.to_string();
                publish(&state, VerificationState::Pending { attempts: attempt });
                if attempt < max_attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    let outcome = match db.with_conn(|conn| User::delete_unverified(conn, user_id)) {
        Ok(true) => {
            warn!("Deleted unverified user {} after failed verification email", user_id);
            VerificationState::RolledBack {
                attempts: max_attempts,
                error: last_error,
            }
        }
        Ok(false) => {
            info!("User {} verified or removed meanwhile, keeping account", user_id);
            VerificationState::Abandoned { attempts: max_attempts }
        }
        Err(e) => {
            error!("Failed to delete unverified user {}: {}", user_id, e);
            VerificationState::RollbackFailed {
                attempts: max_attempts,
                error: e.to_string(),
            }
        }
    };
    publish(&state, outcome);
}

/// Verification tasks keyed by user id
#[derive(Default)]
pub struct VerificationRegistry {
    handles: Mutex<HashMap<i64, VerificationHandle>>,
}

impl VerificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a handle, replacing (and cancelling) any earlier one for the user.
    /// Handles that already reached a final state are dropped.
    pub async fn insert(&self, handle: VerificationHandle) {
        let mut handles = self.handles.lock().await;
        handles.retain(|_, h| !h.state().is_final());
        if let Some(previous) = handles.insert(handle.user_id(), handle) {
            previous.cancel();
        }
    }

    pub async fn state(&self, user_id: i64) -> Option<VerificationState> {
        self.handles.lock().await.get(&user_id).map(VerificationHandle::state)
    }

    pub async fn cancel(&self, user_id: i64) -> Option<VerificationState> {
        self.handles.lock().await.get(&user_id).map(VerificationHandle::cancel)
    }

    /// Number of tasks that have not reached a final state
    pub async fn pending(&self) -> usize {
        self.handles
            .lock()
            .await
            .values()
            .filter(|h| !h.state().is_final())
            .count()
    }
}

// ============================================
// Registration and verification
// ============================================

/// Response for register_user
#[derive(Debug, Serialize)]
pub struct RegisterUserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub verification: VerificationState,
}

/// Create an unverified user; the caller starts the verification task
pub fn register_user(db: &Database, name: &str, email: &str) -> ServiceResult<User> {
    let email = email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(ServiceError::invalid(format!("Invalid email address: '{}'", email)));
    }

    let conn = db.get_conn()?;
    if User::find_by_email(&conn, &email)?.is_some() {
        return Err(ServiceError::invalid("Email already registered"));
    }

    let user = User::create(
        &conn,
        &UserCreate {
            name: name.trim().to_string(),
            email,
        },
    )?;
    info!("Registered user {} <{}>", user.id, user.email);
    Ok(user)
}

/// Response for verify_account
#[derive(Debug, Serialize)]
pub struct VerifyAccountResponse {
    pub success: bool,
    pub id: i64,
    pub verified_at: Option<String>,
}

pub fn verify_account(db: &Database, app_key: &str, user_id: i64, token: &str) -> ServiceResult<VerifyAccountResponse> {
    let conn = db.get_conn()?;
    let user = User::get_by_id(&conn, user_id)?.ok_or_else(|| ServiceError::not_found("User", user_id))?;

    if user.is_verified() {
        return Err(ServiceError::invalid("Account is already verified"));
    }
    if !verify_token(&user.email, app_key, token) {
        return Err(ServiceError::invalid("Invalid verification token"));
    }

    if !User::mark_verified(&conn, user_id)? {
        return Err(ServiceError::invalid("Account is already verified"));
    }
    let verified = User::get_by_id(&conn, user_id)?.ok_or_else(|| ServiceError::not_found("User", user_id))?;
    info!("User {} verified", user_id);

    Ok(VerifyAccountResponse {
        success: true,
        id: user_id,
        verified_at: verified.verified_at,
    })
}

// ============================================
// Profile
// ============================================

/// Response for get_profile and update_profile
#[derive(Debug, Serialize)]
pub struct UserProfileResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub photo_profile: Option<String>,
    pub verified: bool,
    pub has_health_profile: bool,
}

impl UserProfileResponse {
    fn new(user: User, has_health_profile: bool) -> Self {
        Self {
            id: user.id,
            verified: user.is_verified(),
            email: user.email,
            name: user.name,
            date_of_birth: user.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
            gender: user.gender,
            photo_profile: user.image_url,
            has_health_profile,
        }
    }
}

pub fn get_profile(db: &Database, user_id: i64) -> ServiceResult<UserProfileResponse> {
    let conn = db.get_conn()?;
    let user = User::get_by_id(&conn, user_id)?.ok_or_else(|| ServiceError::not_found("User", user_id))?;
    let has_health_profile = HealthProfile::get_by_user(&conn, user_id)?.is_some();
    Ok(UserProfileResponse::new(user, has_health_profile))
}

#[derive(Debug, Clone)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub gender: String,
    pub date_of_birth: String,
    /// Local image file to use as the new profile photo
    pub photo_path: Option<String>,
}

/// Update name, gender and date of birth, optionally replacing the photo.
///
/// A date of birth in the current year is rejected.
pub async fn update_profile(
    db: &Database,
    store: &dyn BlobStore,
    user_id: i64,
    req: UpdateProfileRequest,
    today: NaiveDate,
) -> ServiceResult<UserProfileResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ServiceError::invalid("Name cannot be empty"));
    }
    let gender = Gender::from_str(&req.gender)
        .ok_or_else(|| ServiceError::invalid(format!("Invalid gender: '{}'. Use male or female", req.gender)))?;
    let date_of_birth = NaiveDate::parse_from_str(req.date_of_birth.trim(), "%Y-%m-%d")
        .map_err(|_| ServiceError::invalid(format!("Invalid date_of_birth: '{}'. Use YYYY-MM-DD", req.date_of_birth)))?;
    if date_of_birth.year() >= today.year() {
        return Err(ServiceError::invalid("Invalid date of birth"));
    }

    let existing = db
        .with_conn(|conn| User::get_by_id(conn, user_id))?
        .ok_or_else(|| ServiceError::not_found("User", user_id))?;

    let mut image_url = None;
    if let Some(photo_path) = req.photo_path.as_deref() {
        let path = Path::new(photo_path);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ServiceError::invalid(format!("Cannot read photo '{}': {}", photo_path, e)))?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let key = format!("{}/{}", PHOTO_PROFILE_PREFIX, generate_file_name(extension));
        image_url = Some(store.upload(&key, bytes).await?);
    }

    let replaced_photo = image_url.is_some();
    let update = UserUpdate {
        name: Some(name.to_string()),
        gender: Some(gender),
        date_of_birth: Some(date_of_birth),
        image_url,
    };
    let (user, has_health_profile) = db.with_conn(|conn| {
        let user = User::update(conn, user_id, &update)?;
        let has_health_profile = HealthProfile::get_by_user(conn, user_id)?.is_some();
        Ok((user, has_health_profile))
    })?;
    let user = user.ok_or_else(|| ServiceError::not_found("User", user_id))?;

    if replaced_photo {
        if let Some(old_key) = existing.image_url.as_deref().and_then(|url| store.key_for_url(url)) {
            if let Err(e) = store.delete(&old_key).await {
                warn!("Failed to delete old profile photo {}: {}", old_key, e);
            }
        }
    }

    info!("Updated profile of user {}", user_id);
    Ok(UserProfileResponse::new(user, has_health_profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;
    use crate::external::{LocalBlobStore, UpstreamError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Fails the first `failures` sends
    struct FlakyMailer {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyMailer {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, _to: &str, subject: &str, html: &str) -> Result<(), UpstreamError> {
            assert_eq!(subject, VERIFICATION_SUBJECT);
            assert!(html.contains("/api/v1/auth/verify/"));
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(UpstreamError::Status {
                    service: "mailgun",
                    status: 503,
                    body: "unavailable".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn settings(backoff_ms: u64) -> VerificationSettings {
        VerificationSettings {
            app_host: "http://localhost:3000".into(),
            app_key: "test-key".into(),
            attempts: 3,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    #[test]
    fn test_token_roundtrip_and_link() {
        let token = verification_token("ayu@example.com", "test-key");
        assert_eq!(token.len(), 64);
        assert!(verify_token("ayu@example.com", "test-key", &token));
        assert!(!verify_token("ayu@example.com", "other-key", &token));
        assert!(!verify_token("budi@example.com", "test-key", &token));
        assert!(!verify_token("ayu@example.com", "test-key", "not-hex"));
        assert_eq!(
            verification_link("http://localhost:3000", 7, "abc"),
            "http://localhost:3000/api/v1/auth/verify/7?token=abc"
        );
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_email() {
        let (_dir, db) = test_database();
        let user = register_user(&db, " Ayu ", "Ayu@Example.com").unwrap();
        assert_eq!(user.name, "Ayu");
        assert_eq!(user.email, "ayu@example.com");
        assert!(!user.is_verified());

        assert!(matches!(
            register_user(&db, "Ayu", "ayu@example.com"),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(register_user(&db, "X", "nobody"), Err(ServiceError::InvalidInput(_))));
    }

    #[test]
    fn test_verify_account() {
        let (_dir, db) = test_database();
        let user = register_user(&db, "Ayu", "ayu@example.com").unwrap();

        assert!(matches!(
            verify_account(&db, "test-key", user.id, "deadbeef"),
            Err(ServiceError::InvalidInput(_))
        ));

        let token = verification_token(&user.email, "test-key");
        let resp = verify_account(&db, "test-key", user.id, &token).unwrap();
        assert!(resp.success);
        assert!(resp.verified_at.is_some());

        assert!(matches!(
            verify_account(&db, "test-key", user.id, &token),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            verify_account(&db, "test-key", 999, &token),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_verification_delivered_after_retry() {
        let (_dir, db) = test_database();
        let user = register_user(&db, "Ayu", "ayu@example.com").unwrap();
        let mailer = FlakyMailer::new(2);

        let handle = start_verification(db.clone(), mailer.clone(), &user, &settings(1));
        assert_eq!(handle.wait().await, VerificationState::Delivered { attempts: 3 });
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);

        let kept = db.with_conn(|conn| User::get_by_id(conn, user.id)).unwrap();
        assert!(kept.is_some());
    }

    #[tokio::test]
    async fn test_verification_rolls_back_unverified_user() {
        let (_dir, db) = test_database();
        let user = register_user(&db, "Ayu", "ayu@example.com").unwrap();

        let handle = start_verification(db.clone(), FlakyMailer::new(u32::MAX), &user, &settings(1));
        match handle.wait().await {
            VerificationState::RolledBack { attempts, error } => {
                assert_eq!(attempts, 3);
                assert!(error.contains("503"));
            }
            other => panic!("unexpected state {:?}", other),
        }

        let gone = db.with_conn(|conn| User::get_by_id(conn, user.id)).unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_verified_user_is_kept() {
        let (_dir, db) = test_database();
        let user = register_user(&db, "Ayu", "ayu@example.com").unwrap();

        let handle = start_verification(db.clone(), FlakyMailer::new(u32::MAX), &user, &settings(30));
        let token = verification_token(&user.email, "test-key");
        verify_account(&db, "test-key", user.id, &token).unwrap();

        assert_eq!(handle.wait().await, VerificationState::Abandoned { attempts: 3 });
        let kept = db.with_conn(|conn| User::get_by_id(conn, user.id)).unwrap();
        assert!(kept.unwrap().is_verified());
    }

    #[tokio::test]
    async fn test_cancel_keeps_user() {
        let (_dir, db) = test_database();
        let user = register_user(&db, "Ayu", "ayu@example.com").unwrap();
        let registry = VerificationRegistry::new();

        let handle = start_verification(db.clone(), FlakyMailer::new(u32::MAX), &user, &settings(60_000));
        registry.insert(handle).await;
        assert_eq!(registry.pending().await, 1);

        assert_eq!(registry.cancel(user.id).await, Some(VerificationState::Cancelled));
        assert_eq!(registry.pending().await, 0);
        assert_eq!(registry.state(user.id).await, Some(VerificationState::Cancelled));
        assert_eq!(registry.state(999).await, None);

        let kept = db.with_conn(|conn| User::get_by_id(conn, user.id)).unwrap();
        assert!(kept.is_some());
    }

    #[tokio::test]
    async fn test_registry_drops_finished_tasks() {
        let (_dir, db) = test_database();
        let ayu = register_user(&db, "Ayu", "ayu@example.com").unwrap();
        let budi = register_user(&db, "Budi", "budi@example.com").unwrap();
        let registry = VerificationRegistry::new();

        let first = start_verification(db.clone(), FlakyMailer::new(0), &ayu, &settings(1));
        assert_eq!(first.wait().await, VerificationState::Delivered { attempts: 1 });
        registry.insert(first).await;
        assert_eq!(
            registry.state(ayu.id).await,
            Some(VerificationState::Delivered { attempts: 1 })
        );

        let second = start_verification(db.clone(), FlakyMailer::new(u32::MAX), &budi, &settings(60_000));
        registry.insert(second).await;
        assert_eq!(registry.state(ayu.id).await, None);
        assert_eq!(registry.pending().await, 1);
        assert_eq!(registry.handles.lock().await.len(), 1);

        registry.cancel(budi.id).await;
    }

    #[tokio::test]
    async fn test_update_profile_replaces_photo() {
        let (_dir, db) = test_database();
        let files = TempDir::new().unwrap();
        let store = LocalBlobStore::new(files.path().join("blobs"), "http://cdn.local");
        let user = register_user(&db, "Ayu", "ayu@example.com").unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let photo = files.path().join("me.PNG");
        std::fs::write(&photo, [1u8, 2, 3]).unwrap();
        let request = UpdateProfileRequest {
            name: "Ayu Lestari".into(),
            gender: "Female".into(),
            date_of_birth: "1996-04-12".into(),
            photo_path: Some(photo.display().to_string()),
        };

        let first = update_profile(&db, &store, user.id, request.clone(), today).await.unwrap();
        assert_eq!(first.name, "Ayu Lestari");
        assert_eq!(first.gender.as_deref(), Some("female"));
        assert_eq!(first.date_of_birth.as_deref(), Some("1996-04-12"));
        assert!(!first.has_health_profile);
        let first_url = first.photo_profile.unwrap();
        assert!(first_url.starts_with("http://cdn.local/photo-profile/"));
        assert!(first_url.ends_with(".png"));

        let second = update_profile(&db, &store, user.id, request, today).await.unwrap();
        let second_url = second.photo_profile.unwrap();
        assert_ne!(first_url, second_url);

        let old_key = store.key_for_url(&first_url).unwrap();
        assert!(!files.path().join("blobs").join(old_key).exists());
        let new_key = store.key_for_url(&second_url).unwrap();
        assert!(files.path().join("blobs").join(new_key).exists());
    }

    #[tokio::test]
    async fn test_update_profile_validation() {
        let (_dir, db) = test_database();
        let files = TempDir::new().unwrap();
        let store = LocalBlobStore::new(files.path(), "http://cdn.local");
        let user = register_user(&db, "Ayu", "ayu@example.com").unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let request = |gender: &str, dob: &str| UpdateProfileRequest {
            name: "Ayu".into(),
            gender: gender.into(),
            date_of_birth: dob.into(),
            photo_path: None,
        };

        for (gender, dob) in [("female", "2025-01-01"), ("other", "1990-01-01"), ("female", "01/02/1990")] {
            assert!(matches!(
                update_profile(&db, &store, user.id, request(gender, dob), today).await,
                Err(ServiceError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            update_profile(&db, &store, 999, request("male", "1990-01-01"), today).await,
            Err(ServiceError::NotFound { .. })
        ));

        let profile = get_profile(&db, user.id).unwrap();
        assert_eq!(profile.gender, None);
        assert!(!profile.verified);
    }
}
