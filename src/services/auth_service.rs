use tonic::{Request, Response, Status};

use crate::domain::{Identity, IssuedToken, MemberDraft};
use crate::proto::auth::auth_service_server::AuthService;
use crate::proto::auth::{AuthResponse, LoginRequest, RegisterRequest};
use crate::services::parse_role;

pub struct AuthServiceImpl {
    identity: Identity,
}

impl AuthServiceImpl {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    fn token_to_proto(token: IssuedToken) -> AuthResponse {
        AuthResponse {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_at: token
                .expires_at
                .map(|exp| exp.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();
        let draft = MemberDraft {
            email: req.email,
            name: req.name,
            surname: req.surname,
            role: parse_role(&req.role)?,
            password: req.password,
        };

        let member = self.identity.register(draft).await?;
        let token = self.identity.issue_credential(&member)?;
        Ok(Response::new(Self::token_to_proto(token)))
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();
        if req.email.is_empty() || req.password.is_empty() {
            return Err(Status::invalid_argument("email and password are required"));
        }

        let token = self.identity.login(&req.email, &req.password).await?;
        Ok(Response::new(Self::token_to_proto(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{backend, PASSWORD};
    use tonic::Code;

    fn register_request(email: &str, role: &str) -> Request<RegisterRequest> {
        Request::new(RegisterRequest {
            email: email.to_string(),
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            role: role.to_string(),
            password: PASSWORD.to_string(),
        })
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (backend, _) = backend();
        let service = AuthServiceImpl::new(backend.identity.clone());

        let registered = service
            .register(register_request("ada@x.com", "superadmin"))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(registered.token_type, "bearer");
        assert!(!registered.access_token.is_empty());

        let login = service
            .login(Request::new(LoginRequest {
                email: "ada@x.com".to_string(),
                password: PASSWORD.to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        let member = backend
            .identity
            .resolve_credential(&login.access_token)
            .await
            .unwrap();
        assert_eq!(member.email, "ada@x.com");
    }

    #[tokio::test]
    async fn test_error_codes() {
        let (backend, _) = backend();
        let service = AuthServiceImpl::new(backend.identity.clone());
        service
            .register(register_request("ada@x.com", "superadmin"))
            .await
            .unwrap();

        let second = service
            .register(register_request("bob@x.com", "superadmin"))
            .await
            .unwrap_err();
        assert_eq!(second.code(), Code::AlreadyExists);

        let bad_role = service
            .register(register_request("eve@x.com", "owner"))
            .await
            .unwrap_err();
        assert_eq!(bad_role.code(), Code::InvalidArgument);

        let wrong = service
            .login(Request::new(LoginRequest {
                email: "ada@x.com".to_string(),
                password: "wrong-password".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(wrong.code(), Code::Unauthenticated);
        assert_eq!(wrong.message(), "Invalid credentials");
    }
}
