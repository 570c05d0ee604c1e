pub mod auth_service;
pub mod health_service;
pub mod items_service;
pub mod logs_service;
pub mod member_service;
pub mod organization_service;

pub use auth_service::AuthServiceImpl;
pub use health_service::HealthServiceImpl;
pub use items_service::ItemsServiceImpl;
pub use logs_service::LogsServiceImpl;
pub use member_service::MemberServiceImpl;
pub use organization_service::OrganizationServiceImpl;

use tonic::{Request, Status};
use uuid::Uuid;

use crate::middleware::AuthenticatedMember;
use crate::models::{Member, Role};
use crate::proto::common::PageRequest;
use crate::store::Page;

/// Member injected by `AuthLayer`.
fn get_authenticated_member<T>(request: &Request<T>) -> Result<Member, Status> {
    request
        .extensions()
        .get::<AuthenticatedMember>()
        .map(|m| m.0.clone())
        .ok_or_else(|| Status::unauthenticated("Invalid credentials"))
}

fn parse_id(field: &str, value: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(value)
        .map_err(|_| Status::invalid_argument(format!("{} must be a UUID, got '{}'", field, value)))
}

/// Empty means `user`.
fn parse_role(value: &str) -> Result<Role, Status> {
    if value.is_empty() {
        return Ok(Role::User);
    }
    value
        .parse()
        .map_err(|e| Status::invalid_argument(format!("{}", e)))
}

fn page_from_proto(page: PageRequest) -> Page {
    Page::new(page.skip, page.limit)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id("id", &id.to_string()).unwrap(), id);
        assert_eq!(parse_id("id", "42").unwrap_err().code(), Code::InvalidArgument);
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("").unwrap(), Role::User);
        assert_eq!(parse_role("admin").unwrap(), Role::Admin);
        assert_eq!(parse_role("root").unwrap_err().code(), Code::InvalidArgument);
    }

    #[test]
    fn test_missing_member_is_unauthenticated() {
        let request = Request::new(());
        let status = get_authenticated_member(&request).unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }
}
