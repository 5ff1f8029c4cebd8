//! Middleware groups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse ordering bucket for stages.
///
/// Stages are sorted by group first, then by priority. The declaration
/// order below is the execution order: error handlers wrap everything,
/// inbound stages rewrite the request, outbound stages decorate the
/// response, and generic / generator stages produce it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MiddlewareGroup {
    /// Error recovery stages.
    ErrorHandler = 0,
    /// Request rewriting stages.
    Inbound = 1,
    /// Response decorating stages.
    Outbound = 2,
    /// Everything else.
    #[default]
    Generic = 3,
    /// Response producing stages.
    Generator = 4,
}

impl MiddlewareGroup {
    /// Returns the sort ordinal of this group.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Returns the group name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ErrorHandler => "ErrorHandler",
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
            Self::Generic => "Generic",
            Self::Generator => "Generator",
        }
    }

    /// Returns all groups in execution order.
    #[must_use]
    pub const fn all() -> [MiddlewareGroup; 5] {
        [
            Self::ErrorHandler,
            Self::Inbound,
            Self::Outbound,
            Self::Generic,
            Self::Generator,
        ]
    }
}

impl fmt::Display for MiddlewareGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MiddlewareGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        Self::all()
            .into_iter()
            .find(|group| group.name().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| format!("unknown middleware group: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_ordering() {
        assert!(MiddlewareGroup::ErrorHandler < MiddlewareGroup::Inbound);
        assert!(MiddlewareGroup::Inbound < MiddlewareGroup::Outbound);
        assert!(MiddlewareGroup::Outbound < MiddlewareGroup::Generic);
        assert!(MiddlewareGroup::Generic < MiddlewareGroup::Generator);
    }

    #[test]
    fn test_default_group_is_generic() {
        assert_eq!(MiddlewareGroup::default(), MiddlewareGroup::Generic);
    }

    #[test]
    fn test_parse_group_names() {
        assert_eq!("error_handler".parse(), Ok(MiddlewareGroup::ErrorHandler));
        assert_eq!("ErrorHandler".parse(), Ok(MiddlewareGroup::ErrorHandler));
        assert_eq!("outbound".parse(), Ok(MiddlewareGroup::Outbound));
        assert!("sideways".parse::<MiddlewareGroup>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&MiddlewareGroup::ErrorHandler).unwrap();
        assert_eq!(json, "\"error_handler\"");
    }
}
