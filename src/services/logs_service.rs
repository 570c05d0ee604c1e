use tonic::{Request, Response, Status};

use crate::domain::AuditLog;
use crate::models::LogEntry as LogEntryModel;
use crate::proto::common::PageRequest;
use crate::proto::logs::logs_service_server::LogsService;
use crate::proto::logs::{ListLogsResponse, LogEntry};
use crate::services::{get_authenticated_member, page_from_proto};

pub struct LogsServiceImpl {
    audit: AuditLog,
}

impl LogsServiceImpl {
    pub fn new(audit: AuditLog) -> Self {
        Self { audit }
    }

    fn model_to_proto(model: &LogEntryModel) -> LogEntry {
        LogEntry {
            id: model.id.to_string(),
            subject_id: model.subject_id.to_string(),
            subject_email: model.subject_email.clone(),
            object_id: model.object_id.to_string(),
            action: model.action.clone(),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

#[tonic::async_trait]
impl LogsService for LogsServiceImpl {
    async fn list_logs(
        &self,
        request: Request<PageRequest>,
    ) -> Result<Response<ListLogsResponse>, Status> {
        let actor = get_authenticated_member(&request)?;
        let page = page_from_proto(request.into_inner());

        let logs = self.audit.list(&actor, page).await?;
        Ok(Response::new(ListLogsResponse {
            logs: logs.iter().map(Self::model_to_proto).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{backend, member, root};
    use crate::models::Role;
    use crate::services::testing::as_member;
    use tonic::Code;

    #[tokio::test]
    async fn test_list_logs() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;
        let service = LogsServiceImpl::new(backend.audit.clone());

        let logs = service
            .list_logs(as_member(&root, PageRequest::default()))
            .await
            .unwrap()
            .into_inner()
            .logs;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].action, "create member");
        assert_eq!(logs[1].subject_email, "root@x.com");
        assert_eq!(logs[1].object_id, user.id.to_string());

        let denied = service
            .list_logs(as_member(&user, PageRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(denied.code(), Code::PermissionDenied);
        assert_eq!(denied.message(), "users cannot view logs");
    }
}
