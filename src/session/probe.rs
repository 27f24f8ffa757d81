//! The identity probe and the classification of its failures.

use reqwest::{header::ACCEPT, Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Why a probe did not come back with the service's JSON.
///
/// An authenticating proxy answers differently depending on what it knows: no cookie at all
/// gives a 401 or a sign-in page instead of JSON, a cookie it cannot match to an identity
/// gives a 403, and some deployments refuse the connection outright.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("no credential ({0})")]
    NoCredential(String),

    #[error("credential rejected by the proxy")]
    CredentialRejected,

    #[error("connection refused before reaching the service: {0}")]
    TransportRefused(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Unexpected(StatusCode),
}

impl ProbeFailure {
    /// The failures that mean "not logged in yet" rather than "something is broken".
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            ProbeFailure::NoCredential(_)
                | ProbeFailure::CredentialRejected
                | ProbeFailure::TransportRefused(_)
        )
    }
}

pub async fn probe(client: &Client, remote: &Url) -> Result<Value, ProbeFailure> {
    let response = client
        .get(remote.clone())
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(classify_transport)?;

    match response.status() {
        StatusCode::UNAUTHORIZED => return Err(ProbeFailure::NoCredential("HTTP 401".into())),
        StatusCode::FORBIDDEN => return Err(ProbeFailure::CredentialRejected),
        status if !status.is_success() => return Err(ProbeFailure::Unexpected(status)),
        _ => {}
    }

    let body = response.bytes().await.map_err(classify_transport)?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ProbeFailure::NoCredential("empty body".into()));
    }
    serde_json::from_slice(&body).map_err(|_| ProbeFailure::NoCredential("body is not JSON".into()))
}

fn classify_transport(err: reqwest::Error) -> ProbeFailure {
    if err.is_timeout() {
        ProbeFailure::Network(err.to_string())
    } else if err.is_connect() {
        ProbeFailure::TransportRefused(err.to_string())
    } else {
        ProbeFailure::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/habitat-projects")).unwrap()
    }

    fn client() -> Client {
        Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn json_body_is_success() {
        let url = serve(Router::new().route(
            "/habitat-projects",
            get(|| async { Json(json!({ "db_name": "habitat-projects" })) }),
        ))
        .await;

        let body = probe(&client(), &url).await.unwrap();
        assert_eq!(body["db_name"], "habitat-projects");
    }

    #[tokio::test]
    async fn empty_body_and_401_mean_no_credential() {
        let url = serve(
            Router::new()
                .route("/habitat-projects", get(|| async { "" }))
                .route("/locked", get(|| async { AxumStatus::UNAUTHORIZED })),
        )
        .await;

        let empty = probe(&client(), &url).await.unwrap_err();
        assert!(matches!(empty, ProbeFailure::NoCredential(_)));

        let locked = probe(&client(), &url.join("locked").unwrap()).await.unwrap_err();
        assert!(matches!(locked, ProbeFailure::NoCredential(_)));
        assert!(locked.needs_login());
    }

    #[tokio::test]
    async fn forbidden_is_rejected_credential() {
        let url = serve(Router::new().route(
            "/habitat-projects",
            get(|| async { AxumStatus::FORBIDDEN }),
        ))
        .await;

        let failure = probe(&client(), &url).await.unwrap_err();
        assert!(matches!(failure, ProbeFailure::CredentialRejected));
        assert!(failure.needs_login());
    }

    #[tokio::test]
    async fn server_errors_are_fatal() {
        let url = serve(Router::new().route(
            "/habitat-projects",
            get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        ))
        .await;

        let failure = probe(&client(), &url).await.unwrap_err();
        assert!(matches!(failure, ProbeFailure::Unexpected(status) if status.as_u16() == 500));
        assert!(!failure.needs_login());
    }

    #[tokio::test]
    async fn refused_connections_need_login() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/habitat-projects")).unwrap();
        let failure = probe(&client(), &url).await.unwrap_err();
        assert!(matches!(failure, ProbeFailure::TransportRefused(_)), "{failure:?}");
    }
}
