//! Telling local locale names apart from network addresses.

use url::Url;

use crate::error::HabitatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleAddress {
    Local(String),
    Remote(Url),
}

impl LocaleAddress {
    pub fn parse(identifier: &str) -> Result<Self, HabitatError> {
        let trimmed = identifier.trim();

        if is_network(trimmed) {
            let url = Url::parse(trimmed).map_err(|err| HabitatError::InvalidAddress {
                address: identifier.to_string(),
                reason: err.to_string(),
            })?;
            return Ok(LocaleAddress::Remote(url));
        }

        validate_local_name(trimmed)?;
        Ok(LocaleAddress::Local(trimmed.to_string()))
    }
}

/// Anything carrying a scheme separator, or naming http(s) without one, is a network location,
/// whether or not the rest of it parses.
pub fn is_network(identifier: &str) -> bool {
    let identifier = identifier.trim();
    let lowered = identifier.to_ascii_lowercase();
    identifier.contains("://") || lowered.starts_with("http:") || lowered.starts_with("https:")
}

fn validate_local_name(name: &str) -> Result<(), HabitatError> {
    let invalid = |reason: &str| HabitatError::InvalidAddress {
        address: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("locale name is empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("locale name must not start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("locale names may only use letters, digits, '-', '_' and '.'"));
    }
    Ok(())
}
