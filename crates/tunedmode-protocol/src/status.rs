//! GameMode status codes returned by `QueryStatus`.

use std::fmt;

/// Result of a `QueryStatus` call, as GameMode clients expect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    /// No registrations; the performance profile is not applied.
    Inactive,
    /// The performance profile is applied, but not for the queried game.
    Active,
    /// The performance profile is applied and the queried game is registered.
    Registered,
}

impl GameStatus {
    /// Projects registry state onto a status code.
    pub fn project(engaged: bool, registered: bool) -> Self {
        match (engaged, registered) {
            (_, true) => Self::Registered,
            (true, false) => Self::Active,
            (false, false) => Self::Inactive,
        }
    }

    /// Wire representation.
    pub fn code(self) -> i32 {
        match self {
            Self::Inactive => 0,
            Self::Active => 1,
            Self::Registered => 2,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
            Self::Registered => write!(f, "registered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project() {
        assert_eq!(GameStatus::project(false, false), GameStatus::Inactive);
        assert_eq!(GameStatus::project(true, false), GameStatus::Active);
        assert_eq!(GameStatus::project(true, true), GameStatus::Registered);
    }

    #[test]
    fn test_codes_match_gamemode() {
        assert_eq!(GameStatus::Inactive.code(), 0);
        assert_eq!(GameStatus::Active.code(), 1);
        assert_eq!(GameStatus::Registered.code(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(GameStatus::Inactive.to_string(), "inactive");
        assert_eq!(GameStatus::Active.to_string(), "active");
        assert_eq!(GameStatus::Registered.to_string(), "registered");
    }
}
