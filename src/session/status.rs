// src/session/status.rs
// Closed status type for one case-chat attempt. Every transition goes through
// can_transition_to; handlers never compare raw strings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    InProgress,
    Abandoned,
    Canceled,
    Killed,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Started => "started",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Abandoned => "abandoned",
            SessionStatus::Canceled => "canceled",
            SessionStatus::Killed => "killed",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(SessionStatus::Started),
            "in_progress" => Some(SessionStatus::InProgress),
            "abandoned" => Some(SessionStatus::Abandoned),
            "canceled" => Some(SessionStatus::Canceled),
            "killed" => Some(SessionStatus::Killed),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Abandoned
                | SessionStatus::Canceled
                | SessionStatus::Killed
                | SessionStatus::Completed
        )
    }

    /// Valid edges: started → in_progress → any terminal; started may also
    /// end directly (a student can exit before ever sending a message).
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SessionStatus::Started => false,
            SessionStatus::InProgress => true,
            _ => next.is_terminal(),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionStatus::Started.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
        assert!(SessionStatus::Canceled.is_terminal());
        assert!(SessionStatus::Killed.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
    }

    #[test]
    fn test_no_transition_leaves_terminal() {
        let terminals = [
            SessionStatus::Abandoned,
            SessionStatus::Canceled,
            SessionStatus::Killed,
            SessionStatus::Completed,
        ];
        let all = [
            SessionStatus::Started,
            SessionStatus::InProgress,
            SessionStatus::Abandoned,
            SessionStatus::Canceled,
            SessionStatus::Killed,
            SessionStatus::Completed,
        ];
        for from in terminals {
            for to in all {
                assert!(!from.can_transition_to(to), "{} -> {} must be rejected", from, to);
            }
        }
    }

    #[test]
    fn test_started_promotes_to_in_progress() {
        assert!(SessionStatus::Started.can_transition_to(SessionStatus::InProgress));
        assert!(!SessionStatus::InProgress.can_transition_to(SessionStatus::Started));
    }

    #[test]
    fn test_live_states_reach_all_terminals() {
        for from in [SessionStatus::Started, SessionStatus::InProgress] {
            for to in [
                SessionStatus::Abandoned,
                SessionStatus::Canceled,
                SessionStatus::Killed,
                SessionStatus::Completed,
            ] {
                assert!(from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_round_trip_strings() {
        for s in [
            SessionStatus::Started,
            SessionStatus::InProgress,
            SessionStatus::Abandoned,
            SessionStatus::Canceled,
            SessionStatus::Killed,
            SessionStatus::Completed,
        ] {
            assert_eq!(SessionStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(SessionStatus::parse("paused"), None);
    }
}
