//! Login against the configured shared secrets.
//!
//! There is one administrator password and one password per center. A
//! successful login yields a [`Session`] that decides which records the user
//! may see.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::record::Record;

/// Display name of the administrator session.
pub const ADMIN_DISPLAY_NAME: &str = "통합 관리자";

/// Who is logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Sees every center.
    Admin,
    /// Sees one center only.
    Center,
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The role granted at login.
    pub role: Role,
    /// The center a [`Role::Center`] session is scoped to.
    pub center: Option<String>,
    /// Name shown to the user.
    pub name: String,
}

impl Session {
    /// An administrator session.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            center: None,
            name: ADMIN_DISPLAY_NAME.to_string(),
        }
    }

    /// A session scoped to one center.
    #[must_use]
    pub fn center(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            role: Role::Center,
            center: Some(name.clone()),
            name,
        }
    }

    /// The center this session is restricted to, if any.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        match self.role {
            Role::Admin => None,
            Role::Center => self.center.as_deref(),
        }
    }

    /// Whether this session is restricted to one center.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.role == Role::Center
    }

    /// Whether a record is visible to this session.
    ///
    /// A center session without a center sees nothing.
    #[must_use]
    pub fn can_see(&self, record: &Record) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Center => match &self.center {
                Some(center) => record.center_name() == Some(center.as_str()),
                None => false,
            },
        }
    }
}

/// Credentials submitted at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    /// Requested role.
    pub role: Role,
    /// Selected center (center logins only).
    pub center: Option<String>,
    /// Submitted password.
    pub password: String,
}

/// Checks credentials against [`AuthConfig`].
#[derive(Debug, Clone)]
pub struct Authenticator {
    config: AuthConfig,
}

impl Authenticator {
    /// Create an authenticator for the given configuration.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Center names in display order.
    pub fn centers(&self) -> impl Iterator<Item = &str> {
        self.config.centers.iter().map(|c| c.name.as_str())
    }

    /// The center preselected on the login screen.
    #[must_use]
    pub fn default_center(&self) -> Option<&str> {
        self.config.centers.first().map(|c| c.name.as_str())
    }

    /// Check credentials.
    ///
    /// A center login without an explicit center uses
    /// [`Authenticator::default_center`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] with a user-facing message if the
    /// password does not match or the center is unknown.
    pub fn login(&self, request: &LoginRequest) -> Result<Session> {
        match request.role {
            Role::Admin => {
                if request.password == self.config.admin_password {
                    info!("administrator logged in");
                    Ok(Session::admin())
                } else {
                    warn!("administrator login rejected");
                    Err(Error::authentication(
                        "administrator password does not match",
                    ))
                }
            }
            Role::Center => {
                let selected = request.center.as_deref().or_else(|| self.default_center());
                let center = selected.and_then(|name| self.config.center(name));
                match center {
                    Some(center) if center.password == request.password => {
                        info!(center = %center.name, "center logged in");
                        Ok(Session::center(center.name.clone()))
                    }
                    _ => {
                        warn!(center = ?selected, "center login rejected");
                        Err(Error::authentication(
                            "center password does not match; contact the administrator",
                        ))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DONGGU: &str = "광주광역시 동구 치매안심센터";
    const SEOGU: &str = "광주광역시 서구 치매안심센터";

    fn authenticator() -> Authenticator {
        Authenticator::new(AuthConfig::default())
    }

    fn request(role: Role, center: Option<&str>, password: &str) -> LoginRequest {
        LoginRequest {
            role,
            center: center.map(str::to_string),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_admin_login() {
        let session = authenticator()
            .login(&request(Role::Admin, None, "1234"))
            .unwrap();
        assert_eq!(session, Session::admin());
        assert!(!session.is_scoped());
        assert_eq!(session.scope(), None);
    }

    #[test]
    fn test_admin_wrong_password() {
        let err = authenticator()
            .login(&request(Role::Admin, None, "0000"))
            .unwrap_err();
        assert!(err.is_authentication_error());
    }

    #[test]
    fn test_center_login_scopes_session() {
        let session = authenticator()
            .login(&request(Role::Center, Some(SEOGU), "2222"))
            .unwrap();
        assert!(session.is_scoped());
        assert_eq!(session.scope(), Some(SEOGU));
        assert_eq!(session.name, SEOGU);
    }

    #[test]
    fn test_center_password_is_per_center() {
        let err = authenticator()
            .login(&request(Role::Center, Some(SEOGU), "1111"))
            .unwrap_err();
        assert!(err.is_authentication_error());
    }

    #[test]
    fn test_center_login_defaults_to_first_center() {
        let session = authenticator()
            .login(&request(Role::Center, None, "1111"))
            .unwrap();
        assert_eq!(session.scope(), Some(DONGGU));
    }

    #[test]
    fn test_unknown_center_rejected() {
        let err = authenticator()
            .login(&request(Role::Center, Some("없는 센터"), "1111"))
            .unwrap_err();
        assert!(err.is_authentication_error());
    }

    #[test]
    fn test_visibility() {
        let ours = Record::new("1").with_field("centerName", DONGGU);
        let theirs = Record::new("2").with_field("centerName", SEOGU);
        let untagged = Record::new("3");

        let center = Session::center(DONGGU);
        assert!(center.can_see(&ours));
        assert!(!center.can_see(&theirs));
        assert!(!center.can_see(&untagged));

        let admin = Session::admin();
        assert!(admin.can_see(&ours) && admin.can_see(&theirs) && admin.can_see(&untagged));
    }

    #[test]
    fn test_centers_listed_in_order() {
        let auth = authenticator();
        let centers: Vec<_> = auth.centers().collect();
        assert_eq!(centers.len(), 5);
        assert_eq!(centers[0], DONGGU);
        assert_eq!(auth.default_center(), Some(DONGGU));
    }
}
