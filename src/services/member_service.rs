use tonic::{Request, Response, Status};

use crate::domain::{MemberChanges, MemberDraft, Members};
use crate::models::Member as MemberModel;
use crate::proto::common::{Empty, PageRequest};
use crate::proto::member::member_service_server::MemberService;
use crate::proto::member::{
    CreateMemberRequest, ListMembersResponse, Member, MemberIdRequest, MemberResponse,
    UpdateMemberRequest,
};
use crate::services::{get_authenticated_member, page_from_proto, parse_id, parse_role};

pub struct MemberServiceImpl {
    members: Members,
}

impl MemberServiceImpl {
    pub fn new(members: Members) -> Self {
        Self { members }
    }

    fn model_to_proto(model: &MemberModel) -> Member {
        Member {
            id: model.id.to_string(),
            email: model.email.clone(),
            name: model.name.clone(),
            surname: model.surname.clone(),
            role: model.role.to_string(),
            active: model.active,
            suspended_by: model
                .suspended_by
                .map(|id| id.to_string())
                .unwrap_or_default(),
            last_updated_by: model
                .last_updated_by
                .map(|id| id.to_string())
                .unwrap_or_default(),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }

    fn respond(model: &MemberModel) -> Response<MemberResponse> {
        Response::new(MemberResponse {
            member: Some(Self::model_to_proto(model)),
        })
    }
}

#[tonic::async_trait]
impl MemberService for MemberServiceImpl {
    async fn get_me(&self, request: Request<Empty>) -> Result<Response<MemberResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let me = self.members.me(&actor).await?;
        Ok(Self::respond(&me))
    }

    async fn list_members(
        &self,
        request: Request<PageRequest>,
    ) -> Result<Response<ListMembersResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let page = page_from_proto(request.into_inner());

        let members = self.members.list(&actor, page).await?;
        Ok(Response::new(ListMembersResponse {
            members: members.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn get_member(
        &self,
        request: Request<MemberIdRequest>,
    ) -> Result<Response<MemberResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let id = parse_id("id", &request.into_inner().id)?;

        let member = self.members.get(&actor, id).await?;
        Ok(Self::respond(&member))
    }

    async fn create_member(
        &self,
        request: Request<CreateMemberRequest>,
    ) -> Result<Response<MemberResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let req = request.into_inner();
        let draft = MemberDraft {
            email: req.email,
            name: req.name,
            surname: req.surname,
            role: parse_role(&req.role)?,
            password: req.password,
        };

        let member = self.members.create(&actor, draft).await?;
        Ok(Self::respond(&member))
    }

    async fn update_member(
        &self,
        request: Request<UpdateMemberRequest>,
    ) -> Result<Response<MemberResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let req = request.into_inner();
        let id = parse_id("id", &req.id)?;
        let changes = MemberChanges {
            name: req.name,
            surname: req.surname,
            email: req.email,
            password: req.password,
            active: req.active,
        };

        let member = self.members.update(&actor, id, changes).await?;
        Ok(Self::respond(&member))
    }

    async fn delete_member(
        &self,
        request: Request<MemberIdRequest>,
    ) -> Result<Response<Empty>, Status> {
        let actor = get_authenticated_member(&request)?;
        let id = parse_id("id", &request.into_inner().id)?;

        self.members.delete(&actor, id).await?;
        Ok(Response::new(Empty {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{backend, draft, member, root};
    use crate::models::Role;
    use crate::services::testing::as_member;
    use tonic::Code;

    #[tokio::test]
    async fn test_get_me_and_hidden_member() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;
        let other = member(&backend, &root, "o@x.com", Role::User).await;
        let service = MemberServiceImpl::new(backend.members.clone());

        let me = service
            .get_me(as_member(&user, Empty {}))
            .await
            .unwrap()
            .into_inner()
            .member
            .unwrap();
        assert_eq!(me.id, user.id.to_string());
        assert_eq!(me.role, "user");
        assert_eq!(me.suspended_by, "");

        let hidden = service
            .get_member(as_member(
                &user,
                MemberIdRequest {
                    id: other.id.to_string(),
                },
            ))
            .await
            .unwrap_err();
        assert_eq!(hidden.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_suspend_over_the_wire() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "a@x.com", Role::Admin).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;
        let service = MemberServiceImpl::new(backend.members.clone());

        let suspended = service
            .update_member(as_member(
                &admin,
                UpdateMemberRequest {
                    id: user.id.to_string(),
                    active: Some(false),
                    ..Default::default()
                },
            ))
            .await
            .unwrap()
            .into_inner()
            .member
            .unwrap();
        assert!(!suspended.active);
        assert_eq!(suspended.suspended_by, admin.id.to_string());

        let denied = service
            .update_member(as_member(
                &user,
                UpdateMemberRequest {
                    id: user.id.to_string(),
                    active: Some(true),
                    ..Default::default()
                },
            ))
            .await
            .unwrap_err();
        assert_eq!(denied.code(), Code::PermissionDenied);
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let service = MemberServiceImpl::new(backend.members.clone());

        let created = service
            .create_member(as_member(
                &root,
                CreateMemberRequest {
                    email: "new@x.com".to_string(),
                    name: "New".to_string(),
                    surname: "Member".to_string(),
                    role: "admin".to_string(),
                    password: "password123".to_string(),
                },
            ))
            .await
            .unwrap()
            .into_inner()
            .member
            .unwrap();
        assert_eq!(created.role, "admin");

        service
            .delete_member(as_member(&root, MemberIdRequest { id: created.id.clone() }))
            .await
            .unwrap();
        let gone = service
            .delete_member(as_member(&root, MemberIdRequest { id: created.id }))
            .await
            .unwrap_err();
        assert_eq!(gone.code(), Code::NotFound);

        let bad_id = service
            .get_member(as_member(&root, MemberIdRequest { id: "nope".to_string() }))
            .await
            .unwrap_err();
        assert_eq!(bad_id.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_list_pages() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        for i in 0..3 {
            backend
                .members
                .create(&root, draft(&format!("u{}@x.com", i), Role::User))
                .await
                .unwrap();
        }
        let service = MemberServiceImpl::new(backend.members.clone());

        let listed = service
            .list_members(as_member(&root, PageRequest { skip: 1, limit: 0 }))
            .await
            .unwrap()
            .into_inner()
            .members;
        let emails: Vec<_> = listed.iter().map(|m| m.email.as_str()).collect();
        assert_eq!(emails, ["u1@x.com", "u2@x.com"]);
    }
}
