//! Lifecycle directives carried in reply text
//!
//! A handler may answer with `SYSTEM_COMMAND:<VERB>` instead of speech. The
//! control plane intercepts these before anything reaches the synthesizer.

use std::fmt;

/// Reserved reply prefix marking a lifecycle directive
pub const SENTINEL_PREFIX: &str = "SYSTEM_COMMAND:";

/// A process-level action requested by application logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Shutdown,
    Restart,
    Mute,
    Unmute,
}

impl Directive {
    /// Parse a reply, returning the directive if it is a sentinel
    ///
    /// Leading and trailing whitespace is ignored; the verb is case-sensitive.
    #[must_use]
    pub fn parse(reply: &str) -> Option<Self> {
        let verb = reply.trim().strip_prefix(SENTINEL_PREFIX)?;
        match verb {
            "SHUTDOWN" => Some(Self::Shutdown),
            "RESTART" => Some(Self::Restart),
            "MUTE" => Some(Self::Mute),
            "UNMUTE" => Some(Self::Unmute),
            _ => None,
        }
    }

    /// Whether the reply starts with the reserved prefix at all
    #[must_use]
    pub fn is_sentinel(reply: &str) -> bool {
        reply.trim_start().starts_with(SENTINEL_PREFIX)
    }

    /// The sentinel reply encoding this directive
    #[must_use]
    pub fn sentinel(self) -> String {
        format!("{SENTINEL_PREFIX}{}", self.verb())
    }

    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Shutdown => "SHUTDOWN",
            Self::Restart => "RESTART",
            Self::Mute => "MUTE",
            Self::Unmute => "UNMUTE",
        }
    }

    /// Text returned to callers in place of the sentinel
    #[must_use]
    pub const fn acknowledgment(self) -> &'static str {
        match self {
            Self::Shutdown => "Shutting down",
            Self::Restart => "Restarting",
            Self::Mute => "Muted",
            Self::Unmute => "Unmuted",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_verbs() {
        assert_eq!(
            Directive::parse("SYSTEM_COMMAND:SHUTDOWN"),
            Some(Directive::Shutdown)
        );
        assert_eq!(
            Directive::parse("  SYSTEM_COMMAND:UNMUTE\n"),
            Some(Directive::Unmute)
        );
        assert_eq!(Directive::Restart.sentinel(), "SYSTEM_COMMAND:RESTART");
    }

    #[test]
    fn test_parse_rejects_plain_text() {
        assert_eq!(Directive::parse("Turned on the lamp"), None);
        assert_eq!(Directive::parse("SYSTEM_COMMAND:REBOOT"), None);
        assert!(Directive::is_sentinel("SYSTEM_COMMAND:REBOOT"));
        assert!(!Directive::is_sentinel("shutdown please"));
    }
}
