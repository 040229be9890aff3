//! Access-control invariants over the user interface record.

use crate::error::{ConfigError, Result};
use crate::record::{AnonymousAccess, UserInterfaceConfig};

/// The access-relevant projection of a user interface record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessState {
    pub admin_password_enabled: bool,
    pub read_only_password_enabled: bool,
    pub anonymous_access: AnonymousAccess,
}

impl AccessState {
    pub fn of(config: &UserInterfaceConfig) -> Self {
        Self {
            admin_password_enabled: config.admin_password_enabled(),
            read_only_password_enabled: config.read_only_password_enabled(),
            anonymous_access: config.anonymous_access,
        }
    }

    /// Check the four state invariants, ignoring how the state was reached
    pub fn check_invariants(&self) -> Result<()> {
        if self.read_only_password_enabled && !self.admin_password_enabled {
            return Err(invalid("read-only password requires the admin password"));
        }
        match self.anonymous_access {
            AnonymousAccess::Admin => {
                if self.admin_password_enabled || self.read_only_password_enabled {
                    return Err(invalid(
                        "anonymous admin access requires both passwords disabled",
                    ));
                }
            }
            AnonymousAccess::ReadOnly => {
                if !self.admin_password_enabled || self.read_only_password_enabled {
                    return Err(invalid(
                        "anonymous read-only access requires the admin password and no read-only password",
                    ));
                }
            }
            AnonymousAccess::None => {
                if !self.admin_password_enabled {
                    return Err(invalid("disabling anonymous access requires the admin password"));
                }
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::InvalidAccessState(reason.to_string())
}

/// Validate a candidate access state against the prior one.
///
/// Besides the state invariants, granting anonymous admin access when it was
/// not already granted needs a verified admin password proof in the same
/// request.
pub fn validate_access(
    candidate: &AccessState,
    prior: &AccessState,
    admin_proof_verified: bool,
) -> Result<()> {
    candidate.check_invariants()?;
    if candidate.anonymous_access == AnonymousAccess::Admin
        && prior.anonymous_access != AnonymousAccess::Admin
        && !admin_proof_verified
    {
        return Err(invalid(
            "granting anonymous admin access requires the current admin password",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(anon: AnonymousAccess, admin: bool, read_only: bool) -> AccessState {
        AccessState {
            admin_password_enabled: admin,
            read_only_password_enabled: read_only,
            anonymous_access: anon,
        }
    }

    #[test]
    fn exactly_four_tuples_are_legal() {
        let mut accepted = Vec::new();
        for anon in [AnonymousAccess::None, AnonymousAccess::ReadOnly, AnonymousAccess::Admin] {
            for admin in [false, true] {
                for read_only in [false, true] {
                    let s = state(anon, admin, read_only);
                    match s.check_invariants() {
                        Ok(()) => accepted.push((anon, admin, read_only)),
                        Err(e) => assert!(matches!(e, ConfigError::InvalidAccessState(_))),
                    }
                }
            }
        }
        accepted.sort_by_key(|(a, b, c)| (format!("{:?}", a), *b, *c));
        let mut expected = vec![
            (AnonymousAccess::Admin, false, false),
            (AnonymousAccess::ReadOnly, true, false),
            (AnonymousAccess::None, true, false),
            (AnonymousAccess::None, true, true),
        ];
        expected.sort_by_key(|(a, b, c)| (format!("{:?}", a), *b, *c));
        assert_eq!(accepted, expected);
    }

    #[test]
    fn anonymous_admin_with_admin_password_rejected() {
        for read_only in [false, true] {
            assert!(state(AnonymousAccess::Admin, true, read_only)
                .check_invariants()
                .is_err());
        }
    }

    #[test]
    fn escalation_to_anonymous_admin_needs_proof() {
        let prior = state(AnonymousAccess::None, true, false);
        let candidate = state(AnonymousAccess::Admin, false, false);
        assert!(matches!(
            validate_access(&candidate, &prior, false),
            Err(ConfigError::InvalidAccessState(_))
        ));
        assert!(validate_access(&candidate, &prior, true).is_ok());
    }

    #[test]
    fn staying_anonymous_admin_needs_no_proof() {
        let prior = state(AnonymousAccess::Admin, false, false);
        assert!(validate_access(&prior, &prior, false).is_ok());
    }

    #[test]
    fn invariants_checked_even_with_proof() {
        let prior = state(AnonymousAccess::None, true, false);
        let candidate = state(AnonymousAccess::Admin, true, false);
        assert!(validate_access(&candidate, &prior, true).is_err());
    }

    #[test]
    fn state_projection_from_record() {
        let config = UserInterfaceConfig {
            admin_password_hash: Some("h".to_string()),
            anonymous_access: AnonymousAccess::ReadOnly,
            ..UserInterfaceConfig::default()
        };
        assert_eq!(AccessState::of(&config), state(AnonymousAccess::ReadOnly, true, false));
    }
}
