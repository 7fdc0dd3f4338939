//! Request helpers driving the router in-process.

use super::server::{OPERATOR_PASSWORD, OPERATOR_USER, TestServer};
use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use std::net::SocketAddr;
use tower::ServiceExt;

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A client with a fixed peer address.
pub struct TestClient {
    router: Router,
}

impl TestClient {
    pub fn new(server: &TestServer) -> Self {
        Self::from_addr(server, [10, 0, 0, 1])
    }

    pub fn from_addr(server: &TestServer, ip: [u8; 4]) -> Self {
        let addr = SocketAddr::from((ip, 40_000));
        Self {
            router: server.router().layer(MockConnectInfo(addr)),
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = authorization {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, authorization: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, authorization, None).await
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            })),
        )
        .await
    }

    pub async fn activate(&self, token: &str) -> TestResponse {
        self.send(Method::PUT, &format!("/v1/users/activate/{token}"), None, None)
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(serde_json::json!({ "email": email, "password": password })),
        )
        .await
    }
}

pub fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

pub fn operator() -> String {
    basic(OPERATOR_USER, OPERATOR_PASSWORD)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
