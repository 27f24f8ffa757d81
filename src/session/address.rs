use url::Url;

use crate::error::{HabitatError, Result};

/// Where a login starts and where the proxy shows it is finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAddresses {
    pub root: Url,
    pub sign_in: Url,
    pub landing: Url,
}

impl LoginAddresses {
    /// Derived from the address that failed the probe: its last path segment is the
    /// database, everything before it is the proxy root.
    pub fn derive(remote: &Url, sign_in_path: &str, landing: Option<&Url>) -> Result<Self> {
        let root = root_of(remote);
        let sign_in = root
            .join(sign_in_path.trim_start_matches('/'))
            .map_err(|err| HabitatError::InvalidAddress {
                address: sign_in_path.to_string(),
                reason: err.to_string(),
            })?;
        let landing = landing.cloned().unwrap_or_else(|| root.clone());

        Ok(Self {
            root,
            sign_in,
            landing,
        })
    }

    /// The landing page counts with or without an empty fragment.
    pub fn is_landing(&self, url: &Url) -> bool {
        let mut bare = url.clone();
        if bare.fragment() == Some("") {
            bare.set_fragment(None);
        }
        bare == self.landing
    }
}

pub fn root_of(remote: &Url) -> Url {
    let mut root = remote.clone();
    root.set_query(None);
    root.set_fragment(None);
    if let Ok(mut segments) = root.path_segments_mut() {
        segments.pop_if_empty().pop();
    }
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root
}
