use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

/// Whoever is making the current request. Identity is resolved by the
/// front layer and passed in explicitly; nothing here reads ambient state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(UserId),
}

impl Viewer {
    pub fn user(&self) -> Option<UserId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(*id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

impl From<UserId> for Viewer {
    fn from(id: UserId) -> Self {
        Viewer::User(id)
    }
}

impl fmt::Display for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Viewer::Anonymous => write!(f, "anonymous"),
            Viewer::User(id) => id.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_has_no_user() {
        assert_eq!(Viewer::Anonymous.user(), None);
        assert!(!Viewer::default().is_authenticated());
    }

    #[test]
    fn user_viewer_exposes_id() {
        let viewer = Viewer::from(UserId(7));
        assert_eq!(viewer.user(), Some(UserId(7)));
        assert_eq!(viewer.to_string(), "user#7");
    }
}
