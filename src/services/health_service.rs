use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::health::{
    health_check_response::ServingStatus, health_server::Health, HealthCheckRequest,
    HealthCheckResponse,
};
use crate::store::Store;

pub struct HealthServiceImpl {
    store: Arc<dyn Store>,
}

impl HealthServiceImpl {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn status(&self) -> ServingStatus {
        match self.store.ping().await {
            Ok(()) => ServingStatus::Serving,
            Err(e) => {
                tracing::warn!("Health check failed: {}", e);
                ServingStatus::NotServing
            }
        }
    }
}

#[tonic::async_trait]
impl Health for HealthServiceImpl {
    async fn check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse {
            status: self.status().await.into(),
        }))
    }

    type WatchStream = tokio_stream::wrappers::ReceiverStream<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let status = self.status().await;

        tokio::spawn(async move {
            let _ = tx
                .send(Ok(HealthCheckResponse {
                    status: status.into(),
                }))
                .await;
        });

        Ok(Response::new(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_check_reports_serving() {
        let service = HealthServiceImpl::new(Arc::new(MemoryStore::new()));
        let response = service
            .check(Request::new(HealthCheckRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.status(), ServingStatus::Serving);
    }
}
