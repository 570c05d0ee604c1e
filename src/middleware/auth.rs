use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::HeaderValue;
use http::Request as HttpRequest;
use http::Response as HttpResponse;
use http_body_util::combinators::UnsyncBoxBody;
use tonic::Status;
use tower::{Layer, Service};

use crate::domain::Identity;
use crate::error::AppError;
use crate::models::Member;

/// Member resolved from the bearer token, injected into request extensions.
#[derive(Clone, Debug)]
pub struct AuthenticatedMember(pub Member);

/// Paths reachable without a bearer token
const PUBLIC_PATHS: &[&str] = &[
    "/roster.auth.AuthService/Register",
    "/roster.auth.AuthService/Login",
    "/grpc.health.v1.Health/Check",
    "/grpc.health.v1.Health/Watch",
    "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
    "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo",
];

fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|p| path == *p)
}

/// Token from an `authorization: Bearer <token>` header value.
fn bearer_token(header: Option<&HeaderValue>) -> Option<&str> {
    header
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Clone)]
pub struct AuthLayer {
    identity: Identity,
}

impl AuthLayer {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            identity: self.identity.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    identity: Identity,
}

type BoxBody = UnsyncBoxBody<bytes::Bytes, Status>;

fn grpc_status_response(status: Status) -> HttpResponse<BoxBody> {
    let code = status.code() as i32;
    let message = status.message().to_string();

    let mut response = HttpResponse::new(UnsyncBoxBody::default());
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/grpc"),
    );
    response
        .headers_mut()
        .insert("grpc-status", HeaderValue::from(code));
    if !message.is_empty() {
        if let Ok(val) = HeaderValue::from_str(&message) {
            response.headers_mut().insert("grpc-message", val);
        }
    }
    response
}

impl<S, ReqBody> Service<HttpRequest<ReqBody>> for AuthMiddleware<S>
where
    S: Service<HttpRequest<ReqBody>, Response = HttpResponse<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = HttpResponse<BoxBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        let identity = self.identity.clone();

        Box::pin(async move {
            if is_public(req.uri().path()) {
                return inner.call(req).await;
            }

            let token = bearer_token(req.headers().get("authorization")).map(str::to_string);
            let Some(token) = token else {
                return Ok(grpc_status_response(Status::unauthenticated(
                    "Invalid credentials",
                )));
            };

            match identity.resolve_credential(&token).await {
                Ok(member) => {
                    req.extensions_mut().insert(AuthenticatedMember(member));
                    inner.call(req).await
                }
                Err(AppError::InvalidCredential) => {
                    tracing::debug!("Rejected credential on {}", req.uri().path());
                    Ok(grpc_status_response(Status::unauthenticated(
                        "Invalid credentials",
                    )))
                }
                Err(e) => Ok(grpc_status_response(e.into())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public("/roster.auth.AuthService/Login"));
        assert!(is_public("/roster.auth.AuthService/Register"));
        assert!(is_public("/grpc.health.v1.Health/Check"));
        assert!(!is_public("/roster.member.MemberService/GetMe"));
        assert!(!is_public("/roster.auth.AuthService/LoginX"));
    }

    #[test]
    fn test_bearer_token() {
        let value = HeaderValue::from_static("Bearer abc.def");
        assert_eq!(bearer_token(Some(&value)), Some("abc.def"));

        let basic = HeaderValue::from_static("Basic abc");
        assert_eq!(bearer_token(Some(&basic)), None);

        let empty = HeaderValue::from_static("Bearer ");
        assert_eq!(bearer_token(Some(&empty)), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn test_status_response_headers() {
        let response = grpc_status_response(Status::unauthenticated("Invalid credentials"));
        let headers = response.headers();
        assert_eq!(headers["grpc-status"], "16");
        assert_eq!(headers["grpc-message"], "Invalid credentials");
        assert_eq!(headers["content-type"], "application/grpc");
    }
}
