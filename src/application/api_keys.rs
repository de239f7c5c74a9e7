use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::domain::api_keys::{Capability, Role};

pub const MIN_TOKEN_LEN: usize = 16;

const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiAuthError {
    #[error("missing api key")]
    Missing,
    #[error("invalid api key")]
    Invalid,
    #[error("api key lacks the `{}` capability", .0.as_str())]
    Forbidden(Capability),
}

/// A key declared in configuration, before hashing.
#[derive(Debug, Clone)]
pub struct ConfiguredKey {
    pub name: String,
    pub token: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct ApiPrincipal {
    pub name: String,
    pub fingerprint: String,
    pub role: Option<Role>,
    pub capabilities: Vec<Capability>,
}

impl ApiPrincipal {
    fn anonymous() -> Self {
        Self {
            name: ANONYMOUS.to_string(),
            fingerprint: String::new(),
            role: None,
            capabilities: vec![Capability::Read],
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.role.is_none()
    }

    /// Anonymous callers lacking a capability are asked to authenticate;
    /// authenticated callers are refused.
    pub fn requires(&self, needed: Capability) -> Result<(), ApiAuthError> {
        if self.capabilities.contains(&needed) {
            Ok(())
        } else if self.is_anonymous() {
            Err(ApiAuthError::Missing)
        } else {
            Err(ApiAuthError::Forbidden(needed))
        }
    }
}

struct KeyRecord {
    name: String,
    role: Role,
    hashed_secret: Vec<u8>,
}

/// Authenticates bearer tokens against the configured key set.
pub struct ApiKeyService {
    keys: Vec<KeyRecord>,
    public_reads: bool,
}

impl ApiKeyService {
    pub fn new(keys: Vec<ConfiguredKey>, public_reads: bool) -> Self {
        let keys = keys
            .into_iter()
            .map(|key| KeyRecord {
                name: key.name,
                role: key.role,
                hashed_secret: Self::hash_secret(&key.token),
            })
            .collect();
        Self { keys, public_reads }
    }

    /// Resolve the caller. `None` means no credential was presented.
    pub fn authenticate(&self, token: Option<&str>) -> Result<ApiPrincipal, ApiAuthError> {
        let Some(token) = token else {
            return if self.public_reads {
                Ok(ApiPrincipal::anonymous())
            } else {
                Err(ApiAuthError::Missing)
            };
        };

        if token.len() < MIN_TOKEN_LEN {
            return Err(ApiAuthError::Invalid);
        }

        let hashed_input = Self::hash_secret(token);
        // Compare against every key so timing does not reveal the match position.
        let mut matched = None;
        for record in &self.keys {
            if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 1 && matched.is_none() {
                matched = Some(record);
            }
        }
        let record = matched.ok_or(ApiAuthError::Invalid)?;

        Ok(ApiPrincipal {
            name: record.name.clone(),
            fingerprint: Self::fingerprint(&record.hashed_secret),
            role: Some(record.role),
            capabilities: record.role.capabilities().to_vec(),
        })
    }

    fn hash_secret(secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn fingerprint(hashed: &[u8]) -> String {
        hex::encode(&hashed[..hashed.len().min(4)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN_TOKEN: &str = "admin-token-0123456789";
    const USER_TOKEN: &str = "user-token-0123456789";

    fn service(public_reads: bool) -> ApiKeyService {
        ApiKeyService::new(
            vec![
                ConfiguredKey {
                    name: "ops".to_string(),
                    token: ADMIN_TOKEN.to_string(),
                    role: Role::Admin,
                },
                ConfiguredKey {
                    name: "reader".to_string(),
                    token: USER_TOKEN.to_string(),
                    role: Role::User,
                },
            ],
            public_reads,
        )
    }

    #[test]
    fn known_token_resolves_role_capabilities() {
        let principal = service(false)
            .authenticate(Some(ADMIN_TOKEN))
            .expect("admin key");
        assert_eq!(principal.name, "ops");
        assert_eq!(principal.role, Some(Role::Admin));
        assert_eq!(principal.fingerprint.len(), 8);
        assert!(principal.requires(Capability::Manage).is_ok());
    }

    #[test]
    fn user_is_forbidden_from_manage() {
        let principal = service(false)
            .authenticate(Some(USER_TOKEN))
            .expect("user key");
        assert!(principal.requires(Capability::Write).is_ok());
        assert_eq!(
            principal.requires(Capability::Manage),
            Err(ApiAuthError::Forbidden(Capability::Manage))
        );
    }

    #[test]
    fn unknown_or_short_tokens_are_invalid() {
        let service = service(false);
        assert_eq!(
            service.authenticate(Some("nope")).map(|p| p.name),
            Err(ApiAuthError::Invalid)
        );
        assert_eq!(
            service
                .authenticate(Some("a-long-but-unknown-token"))
                .map(|p| p.name),
            Err(ApiAuthError::Invalid)
        );
    }

    #[test]
    fn missing_token_depends_on_public_reads() {
        assert_eq!(
            service(false).authenticate(None).map(|p| p.name),
            Err(ApiAuthError::Missing)
        );

        let anonymous = service(true).authenticate(None).expect("anonymous reads");
        assert!(anonymous.is_anonymous());
        assert!(anonymous.requires(Capability::Read).is_ok());
        assert_eq!(
            anonymous.requires(Capability::Write),
            Err(ApiAuthError::Missing)
        );
    }
}
