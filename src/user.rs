//! User data model
//!
//! The farm renders several kinds of account references, and each kind
//! carries different data: a registered account has a name and usually an
//! id, an anonymous edit only has an IP, a deleted account only has its
//! old id. [`User`] is a closed union over those renderings; the scraper
//! selects the variant, so no other construction paths exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account reference as rendered by the remote service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum User {
    /// A normal registered account
    Registered(RegisteredUser),

    /// A guest contribution attributed only to an IP address
    Anonymous {
        /// The IP address shown in place of an account
        ip: String,
    },

    /// The placeholder left where an account was deleted
    Deleted {
        /// The numeric id the account had before deletion
        id: u64,
    },

    /// The farm's own system account ("Wikidot")
    System,

    /// A reference the remote service itself could not resolve
    Unknown,
}

impl User {
    /// The account id, for variants that have one
    pub fn id(&self) -> Option<u64> {
        match self {
            User::Registered(user) => user.id,
            User::Deleted { id } => Some(*id),
            User::Anonymous { .. } | User::System | User::Unknown => None,
        }
    }

    /// The registered account data, if this is a registered user
    pub fn registered(&self) -> Option<&RegisteredUser> {
        match self {
            User::Registered(user) => Some(user),
            _ => None,
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            User::Registered(user) => match user.id {
                Some(id) => write!(f, "{} ({id})", user.name),
                None => write!(f, "{}", user.name),
            },
            User::Anonymous { ip } => write!(f, "anonymous ({ip})"),
            User::Deleted { id } => write!(f, "deleted account ({id})"),
            User::System => write!(f, "system account"),
            User::Unknown => write!(f, "unknown account"),
        }
    }
}

/// Profile data of a registered account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    /// Numeric account id; absent in some renderings (e.g. `[[user]]`
    /// syntax without a resolvable listener)
    pub id: Option<u64>,

    /// Display name
    pub name: String,

    /// Unix name, as used in profile URLs
    pub unix_name: String,

    /// Account registration date, when the profile page showed one
    pub registered: Option<DateTime<Utc>>,

    /// Whether the account has a paid Pro plan
    pub pro: bool,

    /// Karma level, when the profile page showed one
    pub karma: Option<Karma>,
}

/// Karma level as displayed on profile pages
///
/// The service renders karma as a word, not a number; the ordering here
/// follows the displayed scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Karma {
    /// "none"
    None,
    /// "low"
    Low,
    /// "medium"
    Medium,
    /// "high"
    High,
    /// "very high"
    VeryHigh,
    /// "guru"
    Guru,
}

impl Karma {
    /// Decode the karma wording used on profile pages
    ///
    /// "very high" must be probed before "high" because the latter is a
    /// substring of the former.
    pub(crate) fn from_profile_text(text: &str) -> Option<Self> {
        if text.contains("guru") {
            Some(Karma::Guru)
        } else if text.contains("very high") {
            Some(Karma::VeryHigh)
        } else if text.contains("high") {
            Some(Karma::High)
        } else if text.contains("medium") {
            Some(Karma::Medium)
        } else if text.contains("low") {
            Some(Karma::Low)
        } else if text.contains("none") {
            Some(Karma::None)
        } else {
            None
        }
    }

    /// The numeric level (0–5) matching the displayed scale
    pub fn level(&self) -> u8 {
        match self {
            Karma::None => 0,
            Karma::Low => 1,
            Karma::Medium => 2,
            Karma::High => 3,
            Karma::VeryHigh => 4,
            Karma::Guru => 5,
        }
    }
}

/// Membership of a user in one specific site
///
/// Composition, not a user subtype: the same account can be a member of
/// many sites with different join dates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMember {
    /// The member's account
    pub user: User,

    /// When the account joined the site, when the listing showed a date
    pub joined: Option<DateTime<Utc>>,
}

/// Normalize a display name into the unix form used in URLs
///
/// Lowercases and collapses spaces and underscores to dashes, matching
/// how the service derives profile URLs.
pub fn to_unix_name(name: &str) -> String {
    name.to_lowercase().replace([' ', '_'], "-")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_name_normalization() {
        assert_eq!(to_unix_name("John Doe"), "john-doe");
        assert_eq!(to_unix_name("snake_case_name"), "snake-case-name");
        assert_eq!(to_unix_name("Already-Dashed"), "already-dashed");
        assert_eq!(to_unix_name("MiXeD Case_Name"), "mixed-case-name");
    }

    #[test]
    fn karma_wording_decodes_in_precedence_order() {
        assert_eq!(Karma::from_profile_text("guru"), Some(Karma::Guru));
        assert_eq!(Karma::from_profile_text("very high"), Some(Karma::VeryHigh));
        assert_eq!(Karma::from_profile_text("high"), Some(Karma::High));
        assert_eq!(Karma::from_profile_text("medium"), Some(Karma::Medium));
        assert_eq!(Karma::from_profile_text("low"), Some(Karma::Low));
        assert_eq!(Karma::from_profile_text("none"), Some(Karma::None));
        assert_eq!(Karma::from_profile_text("something else"), None);
    }

    #[test]
    fn karma_levels_follow_displayed_scale() {
        assert_eq!(Karma::None.level(), 0);
        assert_eq!(Karma::Guru.level(), 5);
        assert!(Karma::Guru > Karma::VeryHigh);
        assert!(Karma::Low > Karma::None);
    }

    #[test]
    fn user_id_per_variant() {
        let registered = User::Registered(RegisteredUser {
            id: Some(42),
            name: "Example".to_string(),
            unix_name: "example".to_string(),
            registered: None,
            pro: false,
            karma: None,
        });
        assert_eq!(registered.id(), Some(42));
        assert_eq!(User::Deleted { id: 7 }.id(), Some(7));
        assert_eq!(
            User::Anonymous {
                ip: "198.51.100.7".to_string()
            }
            .id(),
            None
        );
        assert_eq!(User::System.id(), None);
        assert_eq!(User::Unknown.id(), None);
    }

    #[test]
    fn display_identifies_the_variant() {
        assert_eq!(
            User::Anonymous {
                ip: "198.51.100.7".to_string()
            }
            .to_string(),
            "anonymous (198.51.100.7)"
        );
        assert_eq!(User::Deleted { id: 9 }.to_string(), "deleted account (9)");
        assert_eq!(User::System.to_string(), "system account");
    }
}
