use tonic::{Request, Response, Status};

use crate::domain::{OrganizationChanges, Organizations};
use crate::models::OrganizationModel;
use crate::proto::common::Empty;
use crate::proto::organization::organization_service_server::OrganizationService;
use crate::proto::organization::{
    CreateOrganizationRequest, Organization, OrganizationResponse, UpdateOrganizationRequest,
};
use crate::services::get_authenticated_member;

pub struct OrganizationServiceImpl {
    organizations: Organizations,
}

impl OrganizationServiceImpl {
    pub fn new(organizations: Organizations) -> Self {
        Self { organizations }
    }

    fn respond(model: OrganizationModel) -> Response<OrganizationResponse> {
        Response::new(OrganizationResponse {
            organization: Some(Organization {
                id: model.id.to_string(),
                name: model.name,
                is_active: model.is_active,
            }),
        })
    }
}

#[tonic::async_trait]
impl OrganizationService for OrganizationServiceImpl {
    async fn create_organization(
        &self,
        request: Request<CreateOrganizationRequest>,
    ) -> Result<Response<OrganizationResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let req = request.into_inner();

        let organization = self
            .organizations
            .create(&actor, req.name, req.is_active)
            .await?;
        Ok(Self::respond(organization))
    }

    async fn get_organization(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<OrganizationResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let organization = self.organizations.get(&actor).await?;
        Ok(Self::respond(organization))
    }

    async fn update_organization(
        &self,
        request: Request<UpdateOrganizationRequest>,
    ) -> Result<Response<OrganizationResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let req = request.into_inner();
        let changes = OrganizationChanges {
            name: req.name,
            is_active: req.is_active,
        };

        let organization = self.organizations.update(&actor, changes).await?;
        Ok(Self::respond(organization))
    }
}
