//! # Sender authorization
//!
//! Phone numbers arrive in many spellings (`+1 (555) 123-4567`, `5551234567`,
//! `15551234567`). Both the configured allow-list and every inbound sender go
//! through [`CountryCode::normalize`], so comparisons happen between canonical
//! digit strings only.

use crate::consts;
use anyhow::bail;
use std::collections::HashSet;

/// Country code prefixed to numbers given without one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let digits = value.trim().trim_start_matches('+');
        if digits.is_empty() || digits.len() > 3 || !digits.chars().all(|c| c.is_ascii_digit()) {
            bail!("invalid country code `{value}`, expected 1 to 3 digits");
        }
        Ok(Self(digits.to_string()))
    }

    /// Strips everything but digits and prefixes the country code when the
    /// number is no longer than a national number.
    ///
    /// Returns `None` when the identifier holds no digits at all.
    pub fn normalize(&self, identifier: &str) -> Option<String> {
        let digits: String = identifier.chars().filter(char::is_ascii_digit).collect();

        if digits.is_empty() {
            return None;
        }

        if digits.len() <= consts::NATIONAL_NUMBER_LEN {
            return Some(format!("{}{}", self.0, digits));
        }

        Some(digits)
    }
}

/// Normalized identifiers allowed to use the service
#[derive(Debug, Clone)]
pub struct AllowList {
    country_code: CountryCode,
    entries: HashSet<String>,
}

impl AllowList {
    /// Builds the list from comma separated identifiers, skipping blank or digit-less entries.
    pub fn from_csv(csv: &str, country_code: &CountryCode) -> Self {
        let entries = csv
            .split(',')
            .filter_map(|entry| {
                let normalized = country_code.normalize(entry);
                if normalized.is_none() && !entry.trim().is_empty() {
                    logfire::warn!(
                        "Ignoring authorized sender without digits: {entry}",
                        entry = entry.trim().to_string()
                    );
                }
                normalized
            })
            .collect();

        Self {
            country_code: country_code.clone(),
            entries,
        }
    }

    pub fn contains(&self, sender_id: &str) -> bool {
        self.country_code
            .normalize(sender_id)
            .is_some_and(|normalized| self.entries.contains(&normalized))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a sender was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    AllowListed,
    /// Debug override, reported separately for audit
    Bypassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Allowed(AllowReason),
    Denied,
}

impl AuthorizationDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Allowed(AllowReason::AllowListed) => "allowed",
            Self::Allowed(AllowReason::Bypassed) => "bypassed",
            Self::Denied => "denied",
        }
    }
}

pub fn authorize(sender_id: &str, allow_list: &AllowList, bypass: bool) -> AuthorizationDecision {
    if bypass {
        return AuthorizationDecision::Allowed(AllowReason::Bypassed);
    }

    if allow_list.contains(sender_id) {
        AuthorizationDecision::Allowed(AllowReason::AllowListed)
    } else {
        AuthorizationDecision::Denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us() -> CountryCode {
        CountryCode::parse("1").unwrap()
    }

    #[test]
    fn test_normalize_strips_formatting() {
        assert_eq!(
            us().normalize("+1 (555) 123-4567").as_deref(),
            Some("15551234567")
        );
        assert_eq!(
            us().normalize("15551234567").as_deref(),
            Some("15551234567")
        );
    }

    #[test]
    fn test_normalize_adds_missing_country_code() {
        assert_eq!(us().normalize("5551234567").as_deref(), Some("15551234567"));
        assert_eq!(
            us().normalize("555-123-4567").as_deref(),
            Some("15551234567")
        );

        let mx = CountryCode::parse("+52").unwrap();
        assert_eq!(
            mx.normalize("55 1234 5678").as_deref(),
            Some("525512345678")
        );
        assert_eq!(
            mx.normalize("525512345678").as_deref(),
            Some("525512345678")
        );
    }

    #[test]
    fn test_normalize_without_digits() {
        assert_eq!(us().normalize(""), None);
        assert_eq!(us().normalize(" +() - "), None);
    }

    #[test]
    fn test_country_code_parse() {
        assert!(CountryCode::parse("1").is_ok());
        assert!(CountryCode::parse("+52").is_ok());
        assert!(CountryCode::parse("").is_err());
        assert!(CountryCode::parse("1234").is_err());
        assert!(CountryCode::parse("1a").is_err());
    }

    #[test]
    fn test_allow_list_from_csv() {
        let allow_list = AllowList::from_csv(" 15551234567 , 5559876543,,abc", &us());

        assert_eq!(allow_list.len(), 2);
        assert!(allow_list.contains("15559876543"));
        assert!(!allow_list.contains("abc"));
        assert!(AllowList::from_csv("", &us()).is_empty());
    }

    #[test]
    fn test_authorize_normalizes_inbound_sender() {
        let allow_list = AllowList::from_csv("15551234567", &us());

        assert_eq!(
            authorize("5551234567", &allow_list, false),
            AuthorizationDecision::Allowed(AllowReason::AllowListed)
        );
        assert_eq!(
            authorize("+1 555 123 4567", &allow_list, false),
            AuthorizationDecision::Allowed(AllowReason::AllowListed)
        );
    }

    #[test]
    fn test_authorize_normalizes_allow_list_entries() {
        let allow_list = AllowList::from_csv("5551234567", &us());

        assert!(authorize("15551234567", &allow_list, false).is_allowed());
    }

    #[test]
    fn test_authorize_denies_unknown_sender() {
        let allow_list = AllowList::from_csv("15551234567", &us());

        assert_eq!(
            authorize("19998887777", &allow_list, false),
            AuthorizationDecision::Denied
        );
        assert_eq!(
            authorize("", &allow_list, false),
            AuthorizationDecision::Denied
        );
    }

    #[test]
    fn test_authorize_bypass_is_distinguishable() {
        let allow_list = AllowList::from_csv("15551234567", &us());

        let bypassed = authorize("19998887777", &allow_list, true);
        assert!(bypassed.is_allowed());
        assert_eq!(bypassed.label(), "bypassed");

        let listed = authorize("15551234567", &allow_list, true);
        assert_eq!(
            listed,
            AuthorizationDecision::Allowed(AllowReason::Bypassed)
        );
        assert_ne!(
            listed.label(),
            authorize("15551234567", &allow_list, false).label()
        );
    }
}
