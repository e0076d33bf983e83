//! Identity claims as handed over by the token verifier, and their normalization.

use super::error::ReconcileError;

/// Display name stored when the provider supplies none.
pub const PLACEHOLDER_NAME: &str = "Anonymous";

/// Domain of the email synthesized from the subject id when the provider
/// supplies none.
pub const PLACEHOLDER_EMAIL_DOMAIN: &str = "firebaseuser.local";

/// A verified assertion about a subject, trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub subject_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub provider: String,
}

/// A claim with every optional field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedClaim {
    pub subject_id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub provider: String,
}

impl IdentityClaim {
    /// Fill in placeholders for absent fields.
    ///
    /// Empty strings count as absent. The synthesized email depends only on
    /// the subject id, so repeated logins without an email converge.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidClaim`] when the subject id is blank.
    pub fn normalize(self) -> Result<NormalizedClaim, ReconcileError> {
        if self.subject_id.trim().is_empty() {
            return Err(ReconcileError::InvalidClaim("claim has no subject id"));
        }

        let name = present(self.name).unwrap_or_else(|| PLACEHOLDER_NAME.to_owned());
        let email = present(self.email)
            .unwrap_or_else(|| format!("{}@{PLACEHOLDER_EMAIL_DOMAIN}", self.subject_id));

        Ok(NormalizedClaim {
            subject_id: self.subject_id,
            name,
            email,
            avatar: present(self.avatar),
            provider: self.provider,
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(subject_id: &str) -> IdentityClaim {
        IdentityClaim {
            subject_id: subject_id.into(),
            name: None,
            email: None,
            avatar: None,
            provider: "anonymous".into(),
        }
    }

    #[test]
    fn absent_fields_get_placeholders() {
        let n = claim("uid-42").normalize().unwrap();
        assert_eq!(n.name, "Anonymous");
        assert_eq!(n.email, "uid-42@firebaseuser.local");
        assert_eq!(n.avatar, None);
    }

    #[test]
    fn empty_fields_count_as_absent() {
        let mut c = claim("uid-7");
        c.name = Some(String::new());
        c.email = Some(String::new());
        c.avatar = Some(String::new());
        let n = c.normalize().unwrap();
        assert_eq!(n.name, "Anonymous");
        assert_eq!(n.email, "uid-7@firebaseuser.local");
        assert_eq!(n.avatar, None);
    }

    #[test]
    fn present_fields_are_kept() {
        let c = IdentityClaim {
            subject_id: "uid-1".into(),
            name: Some("Grace Hopper".into()),
            email: Some("grace@example.com".into()),
            avatar: Some("https://img.example/g.png".into()),
            provider: "google.com".into(),
        };
        let n = c.clone().normalize().unwrap();
        assert_eq!(n.name, "Grace Hopper");
        assert_eq!(n.email, "grace@example.com");
        assert_eq!(n.avatar.as_deref(), Some("https://img.example/g.png"));
        assert_eq!(n.provider, "google.com");
    }

    #[test]
    fn blank_subject_is_rejected() {
        for subject in ["", "   "] {
            assert!(matches!(
                claim(subject).normalize(),
                Err(ReconcileError::InvalidClaim(_))
            ));
        }
    }
}
