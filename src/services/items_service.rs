use tonic::{Request, Response, Status};

use crate::domain::{ItemChanges, ItemDraft, Items};
use crate::models::ItemModel;
use crate::proto::common::{Empty, PageRequest};
use crate::proto::items::items_service_server::ItemsService;
use crate::proto::items::{
    CreateItemRequest, Item, ItemIdRequest, ItemResponse, ListItemsResponse, UpdateItemRequest,
};
use crate::services::{get_authenticated_member, page_from_proto, parse_id};

pub struct ItemsServiceImpl {
    items: Items,
}

impl ItemsServiceImpl {
    pub fn new(items: Items) -> Self {
        Self { items }
    }

    fn model_to_proto(model: &ItemModel) -> Item {
        Item {
            id: model.id.to_string(),
            name: model.name.clone(),
            description: model.description.clone(),
            price: model.price,
            owner_id: model.owner_id.to_string(),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[tonic::async_trait]
impl ItemsService for ItemsServiceImpl {
    async fn list_items(
        &self,
        request: Request<PageRequest>,
    ) -> Result<Response<ListItemsResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let page = page_from_proto(request.into_inner());

        let items = self.items.list(&actor, page).await?;
        Ok(Response::new(ListItemsResponse {
            items: items.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn get_item(
        &self,
        request: Request<ItemIdRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let id = parse_id("id", &request.into_inner().id)?;

        let item = self.items.get(&actor, id).await?;
        Ok(Response::new(ItemResponse {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn create_item(
        &self,
        request: Request<CreateItemRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let req = request.into_inner();
        let draft = ItemDraft {
            name: req.name,
            description: req.description,
            price: req.price,
        };

        let item = self.items.create(&actor, draft).await?;
        Ok(Response::new(ItemResponse {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn update_item(
        &self,
        request: Request<UpdateItemRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let req = request.into_inner();
        let id = parse_id("id", &req.id)?;
        let changes = ItemChanges {
            name: req.name,
            description: req.description,
            price: req.price,
        };

        let item = self.items.update(&actor, id, changes).await?;
        Ok(Response::new(ItemResponse {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn delete_item(
        &self,
        request: Request<ItemIdRequest>,
    ) -> Result<Response<Empty>, Status> {
        let actor = get_authenticated_member(&request)?;
        let id = parse_id("id", &request.into_inner().id)?;

        self.items.delete(&actor, id).await?;
        Ok(Response::new(Empty {}))
    }
}
