//! User profiles

use bytes::Bytes;
use log::debug;
use serde_json::Value;
use servicefix_auth::{normalize_user, validate_user, AuthError, CanonicalUser, UserUpdate};
use servicefix_http::{find_str, ApiError};

use crate::client::ApiClient;
use crate::fetch::ApiRequest;

const AVATAR_FIELD: &str = "avatar";
const AVATAR_URL_FIELDS: &[&str] = &["avatar_url", "avatarUrl", "avatar"];

/// Client for the `/users` endpoints
#[derive(Clone)]
pub struct UserService {
    client: ApiClient,
}

impl UserService {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn user_path(id: &str) -> String {
        format!("/users/{}", urlencoding::encode(id))
    }

    /// Fetch a user profile
    pub async fn get(&self, id: &str) -> Result<CanonicalUser, ApiError> {
        let payload = self.client.get(&Self::user_path(id)).await?;
        Ok(normalize_user(&payload))
    }

    /// Update a user profile
    ///
    /// When `id` is the signed-in user the cached profile is replaced with
    /// the server's answer. A response without a valid user record (a bare
    /// acknowledgement, or an unknown role) leaves the cached identity alone
    /// and only applies the submitted fields.
    pub async fn update(&self, id: &str, update: &UserUpdate) -> Result<CanonicalUser, ApiError> {
        let payload = self.client.put(&Self::user_path(id), update).await?;
        let record = validate_user(&payload).ok();

        let mut cached_after = None;
        self.refresh_cached_user(id, |cached| {
            match &record {
                Some(user) => {
                    *cached = CanonicalUser {
                        organization: user.organization.clone().or(cached.organization.take()),
                        ..user.clone()
                    };
                }
                None => {
                    debug!("Profile update response carried no user record; merging locally");
                    apply_update(cached, update);
                }
            }
            cached_after = Some(cached.clone());
        })?;

        Ok(match (record, cached_after) {
            (Some(user), _) => user,
            (None, Some(cached)) => cached,
            (None, None) => normalize_user(&payload),
        })
    }

    /// Upload a new avatar image and return its URL
    pub async fn upload_avatar(
        &self,
        id: &str,
        file_name: &str,
        mime: &str,
        bytes: Bytes,
    ) -> Result<String, ApiError> {
        let path = format!("{}/avatar", Self::user_path(id));
        debug!("Uploading avatar {} ({} bytes)", file_name, bytes.len());

        let request = ApiRequest::post(&path).file(AVATAR_FIELD, file_name, mime, bytes);
        let payload = self.client.execute(request).await?;

        let url = avatar_url(&payload).ok_or(AuthError::MissingField("avatar_url"))?;
        self.refresh_cached_user(id, |cached| cached.avatar_url = Some(url.clone()))?;
        Ok(url)
    }

    fn refresh_cached_user<F>(&self, id: &str, apply: F) -> Result<(), ApiError>
    where
        F: FnOnce(&mut CanonicalUser),
    {
        let session = self.client.session();
        if let Some(mut cached) = session.user() {
            if cached.id == id {
                apply(&mut cached);
                session.store_user(&cached)?;
            }
        }
        Ok(())
    }
}

/// Apply the submitted fields to a cached profile
///
/// The role is left untouched; only the server may change it.
fn apply_update(user: &mut CanonicalUser, update: &UserUpdate) {
    fn set(field: &mut String, value: &Option<String>) {
        if let Some(value) = value {
            *field = value.clone();
        }
    }
    fn set_opt<T: Clone>(field: &mut Option<T>, value: &Option<T>) {
        if value.is_some() {
            *field = value.clone();
        }
    }

    set(&mut user.first_name, &update.first_name);
    set(&mut user.last_name, &update.last_name);
    set(&mut user.email, &update.email);
    set_opt(&mut user.phone_number, &update.phone_number);
    set_opt(&mut user.designation, &update.designation);
    set_opt(&mut user.timezone, &update.timezone);
    set_opt(&mut user.language, &update.language);
    set_opt(&mut user.notification_settings, &update.notification_settings);
}

fn avatar_url(payload: &Value) -> Option<String> {
    if let Some(url) = payload.as_str().filter(|s| !s.is_empty()) {
        return Some(url.to_string());
    }
    find_str(payload, AVATAR_URL_FIELDS)
        .or_else(|| payload.get("user").and_then(|user| find_str(user, AVATAR_URL_FIELDS)))
        .map(str::to_string)
}
