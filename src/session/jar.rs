use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use reqwest::{
    cookie::{CookieStore, Jar},
    Client,
};
use url::Url;

use crate::error::Result;

struct JarInner {
    cookies: Arc<Jar>,
    client: Client,
}

/// The cookie jar holding the proxy credential, and the HTTP client that carries it.
///
/// Every request to the cloud goes through `client()`, so a credential copied in after
/// login rides along automatically.
pub struct SessionJar {
    inner: RwLock<JarInner>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl SessionJar {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let inner = build(connect_timeout, request_timeout)?;
        Ok(Self {
            inner: RwLock::new(inner),
            connect_timeout,
            request_timeout,
        })
    }

    pub fn client(&self) -> Client {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .client
            .clone()
    }

    /// Adds `name=value` cookie strings scoped to `root`.
    pub fn store(&self, root: &Url, cookies: &[String]) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        for cookie in cookies {
            inner.cookies.add_cookie_str(cookie, root);
        }
    }

    pub fn has_cookies_for(&self, url: &Url) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cookies
            .cookies(url)
            .is_some()
    }

    /// Drops every stored cookie by swapping in a fresh jar and client.
    pub fn reset(&self) -> Result<()> {
        let fresh = build(self.connect_timeout, self.request_timeout)?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(())
    }
}

fn build(connect_timeout: Duration, request_timeout: Duration) -> Result<JarInner> {
    let cookies = Arc::new(Jar::default());
    let client = Client::builder()
        .cookie_provider(Arc::clone(&cookies))
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()?;
    Ok(JarInner { cookies, client })
}
