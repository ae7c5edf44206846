//! Transcript classification for account operations.
//!
//! The ircd never acknowledges NickServ administrative commands on a raw
//! connection, so the result of an operation is recovered after the fact
//! from the accumulated session transcript. Matching is case-insensitive
//! substring search with a fixed precedence per action.

use std::fmt;

/// The two account mutations driven through a privileged session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountAction {
    Register,
    Unregister,
}

impl AccountAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Unregister => "unregister",
        }
    }
}

impl fmt::Display for AccountAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed outcome of one account operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Registered,
    AlreadyRegistered,
    Dropped,
    NotFound,
    Error,
    /// The session completed but the transcript matched nothing we know;
    /// the operator has to look at the logs.
    CompletedUnknown,
}

impl Outcome {
    /// Report wording, kept stable for operators grepping run output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::AlreadyRegistered => "already registered",
            Self::Dropped => "dropped",
            Self::NotFound => "not found",
            Self::Error => "error",
            Self::CompletedUnknown => "completed (check logs)",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a session transcript to an outcome for the action that produced it.
///
/// Precedence is fixed: the specific success phrase wins, then the specific
/// already/unknown phrase, then the generic error words. Server banners
/// routinely contain more than one trigger substring, so the order matters.
pub fn classify(transcript: &str, action: AccountAction) -> Outcome {
    let lower = transcript.to_lowercase();
    match action {
        AccountAction::Register => {
            if lower.contains("successfully registered") {
                Outcome::Registered
            } else if lower.contains("already registered") {
                Outcome::AlreadyRegistered
            } else if lower.contains("illegal") || lower.contains("error") {
                Outcome::Error
            } else {
                Outcome::CompletedUnknown
            }
        }
        AccountAction::Unregister => {
            if lower.contains("dropped") {
                Outcome::Dropped
            } else if lower.contains("unknown") {
                Outcome::NotFound
            } else if lower.contains("illegal") || lower.contains("error") {
                Outcome::Error
            } else {
                Outcome::CompletedUnknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_success_phrase_wins() {
        let t = ":NickServ NOTICE OperBot42 :Account alice successfully registered";
        assert_eq!(classify(t, AccountAction::Register), Outcome::Registered);
    }

    #[test]
    fn register_matching_is_case_insensitive() {
        let t = ":NickServ NOTICE * :Account ALICE Successfully Registered";
        assert_eq!(classify(t, AccountAction::Register), Outcome::Registered);
    }

    #[test]
    fn register_already_registered_beats_generic_error() {
        // Transcripts often carry an ERROR line from the server teardown as
        // well as the NickServ notice; the specific phrase has precedence.
        let t = ":NickServ NOTICE * :Account is already registered\r\nERROR :Closing link";
        assert_eq!(
            classify(t, AccountAction::Register),
            Outcome::AlreadyRegistered
        );
    }

    #[test]
    fn register_success_beats_everything_else() {
        let t = "ERROR :noise\r\n:NickServ NOTICE * :alice successfully registered\r\nalready registered";
        assert_eq!(classify(t, AccountAction::Register), Outcome::Registered);
    }

    #[test]
    fn register_illegal_or_error_classify_as_error() {
        let t = ":server 421 * NS :Unknown command, illegal channel name";
        assert_eq!(classify(t, AccountAction::Register), Outcome::Error);
        let t = "ERROR :Closing link: (unregistered)";
        assert_eq!(classify(t, AccountAction::Register), Outcome::Error);
    }

    #[test]
    fn register_unmatched_transcript_needs_log_review() {
        let t = ":irc.example NOTICE * :*** Looking up your hostname";
        assert_eq!(
            classify(t, AccountAction::Register),
            Outcome::CompletedUnknown
        );
    }

    #[test]
    fn unregister_dropped_phrase_wins() {
        let t = ":NickServ NOTICE * :Account bob has been dropped";
        assert_eq!(classify(t, AccountAction::Unregister), Outcome::Dropped);
    }

    #[test]
    fn unregister_unknown_account_is_not_found() {
        let t = ":NickServ NOTICE * :Account bob is unknown";
        assert_eq!(classify(t, AccountAction::Unregister), Outcome::NotFound);
    }

    #[test]
    fn unregister_error_words_classify_as_error() {
        // For a drop, "already registered" means nothing and the generic
        // error word decides.
        let t = ":NickServ NOTICE * :already registered\r\nERROR :Closing link";
        assert_eq!(classify(t, AccountAction::Unregister), Outcome::Error);
    }

    #[test]
    fn unregister_dropped_beats_error() {
        let t = "ERROR :noise\r\n:NickServ NOTICE * :Account bob has been dropped";
        assert_eq!(classify(t, AccountAction::Unregister), Outcome::Dropped);
    }

    #[test]
    fn empty_transcript_needs_log_review() {
        assert_eq!(classify("", AccountAction::Register), Outcome::CompletedUnknown);
        assert_eq!(
            classify("", AccountAction::Unregister),
            Outcome::CompletedUnknown
        );
    }

    #[test]
    fn outcome_report_wording_is_stable() {
        assert_eq!(Outcome::Registered.to_string(), "registered");
        assert_eq!(Outcome::AlreadyRegistered.to_string(), "already registered");
        assert_eq!(Outcome::Dropped.to_string(), "dropped");
        assert_eq!(Outcome::NotFound.to_string(), "not found");
        assert_eq!(Outcome::Error.to_string(), "error");
        assert_eq!(Outcome::CompletedUnknown.to_string(), "completed (check logs)");
    }
}
