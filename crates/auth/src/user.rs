//! Canonical user model and normalization of backend user records
//!
//! The backend serves user records with drifting field names: snake_case
//! and camelCase variants of the same field, legacy aliases, numeric or
//! string ids, and the organization either nested or as a bare id. Every
//! record is funnelled through [`normalize_user`] so the rest of the client
//! only sees [`CanonicalUser`].

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use servicefix_http::unwrap_envelope_ref;
use std::fmt;

use crate::AuthError;

/// Name given to an organization known only by id until it is fetched
pub const PENDING_ORGANIZATION_NAME: &str = "Loading...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Agent,
    #[default]
    Customer,
}

impl Role {
    /// Strict parse; only the three known roles are accepted
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "agent" => Some(Role::Agent),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
            Role::Customer => "customer",
        }
    }

    /// Admins and agents work tickets; customers only open them
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Agent)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    /// Remaining fields of the backend object, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Organization {
    /// Stand-in for an organization that has only been referenced by id
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: PENDING_ORGANIZATION_NAME.to_string(),
            extra: Map::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name == PENDING_ORGANIZATION_NAME
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let mut extra = obj.clone();
        extra.remove("id");
        extra.remove("name");
        Self {
            id: pick(obj, &["id"]).unwrap_or_default(),
            name: pick(obj, &["name"]).unwrap_or_default(),
            extra,
        }
    }
}

/// The single user shape the client works with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_settings: Option<Value>,
}

impl CanonicalUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Fields a user profile update may carry, in the backend's snake_case schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_settings: Option<Value>,
}

/// First non-empty string (or number, rendered as a string) among `keys`
fn pick(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn pick_value(obj: &Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null())
        .cloned()
}

/// Locate the user object inside a response: enveloped, under `user`, or bare
fn user_record(raw: &Value) -> Option<&Map<String, Value>> {
    let payload = unwrap_envelope_ref(raw);
    match payload.get("user") {
        Some(Value::Object(user)) => Some(user),
        _ => payload.as_object(),
    }
}

/// Normalize an untrusted user record
///
/// Never fails: unknown shapes produce a user with defaulted fields, and a
/// missing or unrecognized role becomes [`Role::Customer`], the least
/// privileged role. Use [`validate_user`] where an unknown role must be
/// rejected instead.
pub fn normalize_user(raw: &Value) -> CanonicalUser {
    let empty = Map::new();
    let record = user_record(raw).unwrap_or(&empty);

    let role = match pick(record, &["role"]) {
        Some(raw_role) => Role::parse(&raw_role).unwrap_or_else(|| {
            warn!("Unrecognized role {:?}; treating user as customer", raw_role);
            Role::Customer
        }),
        None => Role::Customer,
    };

    let organization_id = pick(record, &["organization_id", "organizationId", "org_id"]);
    let organization = match record.get("organization") {
        Some(Value::Object(org)) => Some(Organization::from_object(org)),
        _ => organization_id.as_deref().map(Organization::placeholder),
    };
    let organization_id = organization_id.or_else(|| {
        organization
            .as_ref()
            .map(|org| org.id.clone())
            .filter(|id| !id.is_empty())
    });

    CanonicalUser {
        id: pick(record, &["id", "user_id", "userId"]).unwrap_or_default(),
        email: pick(record, &["email"]).unwrap_or_default(),
        first_name: pick(record, &["first_name", "firstName"]).unwrap_or_default(),
        last_name: pick(record, &["last_name", "lastName"]).unwrap_or_default(),
        role,
        avatar_url: pick(record, &["avatar_url", "avatarUrl", "avatar"]),
        phone_number: pick(record, &["phone", "phone_number", "phoneNumber"]),
        designation: pick(record, &["designation", "job_title", "jobTitle"]),
        organization_id,
        organization,
        timezone: pick(record, &["timezone", "time_zone", "timeZone"]),
        language: pick(record, &["language", "locale"]),
        last_login: pick(record, &["last_login", "lastLogin", "last_login_at"]),
        notification_settings: pick_value(
            record,
            &["notification_settings", "notificationSettings"],
        ),
    }
}

/// Normalize a user record that is about to back a session
///
/// Unlike [`normalize_user`] this fails closed: a role string outside the
/// known set, or a record without an id, is rejected.
pub fn validate_user(raw: &Value) -> Result<CanonicalUser, AuthError> {
    let record = user_record(raw)
        .ok_or_else(|| AuthError::InvalidUser("user record is not an object".to_string()))?;

    if let Some(raw_role) = pick(record, &["role"]) {
        if Role::parse(&raw_role).is_none() {
            return Err(AuthError::UnrecognizedRole(raw_role));
        }
    }

    let user = normalize_user(raw);
    if user.id.is_empty() {
        return Err(AuthError::InvalidUser("missing id".to_string()));
    }
    Ok(user)
}
