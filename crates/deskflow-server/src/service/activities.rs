use std::sync::Arc;

use deskflow_shared::{Caller, Clock};
use deskflow_store::{Activity, NewActivity, NewDocument};
use tracing::info;

use super::{audit, check_uploads, Store};
use crate::error::ServiceError;

#[derive(Clone)]
pub struct ActivityService {
    store: Store,
    clock: Arc<dyn Clock>,
    max_document_size: usize,
}

impl ActivityService {
    pub fn new(store: Store, clock: Arc<dyn Clock>, max_document_size: usize) -> Self {
        Self {
            store,
            clock,
            max_document_size,
        }
    }

    /// Append a progress note to a ticket.  The second note on a ticket moves
    /// it to "In Progress".
    pub async fn add_activity(
        &self,
        caller: Caller,
        ticket_id: i64,
        description: String,
        documents: Vec<NewDocument>,
    ) -> Result<Activity, ServiceError> {
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(ServiceError::Validation("description is required".into()));
        }
        check_uploads(&documents, self.max_document_size)?;

        let activity = NewActivity {
            description,
            documents,
        };
        let audit = audit(caller, self.clock.as_ref());
        let created = self
            .store
            .call("ticket", move |db, files| {
                db.add_activity(ticket_id, &activity, audit, files)
            })
            .await?;

        info!(
            activity_id = created.id,
            ticket_id,
            documents = created.documents.len(),
            "Activity added"
        );
        Ok(created)
    }

    pub async fn get_activities_by_ticket(&self, ticket_id: i64) -> Result<Vec<Activity>, ServiceError> {
        self.store
            .call("ticket", move |db, _| db.get_activities_by_ticket(ticket_id))
            .await
    }

    pub async fn get_activity_by_id(&self, id: i64) -> Result<Activity, ServiceError> {
        self.store
            .call("activity", move |db, _| db.get_activity_by_id(id))
            .await
    }

    pub async fn update_activity(
        &self,
        caller: Caller,
        id: i64,
        description: String,
    ) -> Result<Activity, ServiceError> {
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(ServiceError::Validation("description is required".into()));
        }

        let audit = audit(caller, self.clock.as_ref());
        let activity = self
            .store
            .call("activity", move |db, _| db.update_activity(id, &description, audit))
            .await?;

        info!(activity_id = id, user_id = caller.user_id, "Activity updated");
        Ok(activity)
    }

    pub async fn delete_activity(&self, caller: Caller, id: i64) -> Result<(), ServiceError> {
        let deleted = self
            .store
            .call("activity", move |db, files| db.delete_activity(id, files))
            .await?;
        if !deleted {
            return Err(ServiceError::NotFound("activity".into()));
        }

        info!(activity_id = id, user_id = caller.user_id, "Activity deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use deskflow_shared::TicketStatus;

    use super::*;
    use crate::service::testing::{at, fixture};
    use crate::service::tickets::{TicketForm, TicketService};

    fn note(name: &str) -> NewDocument {
        NewDocument {
            file_name: name.into(),
            document_type: "text/plain".into(),
            content: Bytes::from_static(b"minutes"),
        }
    }

    #[tokio::test]
    async fn test_second_activity_moves_ticket_in_progress() {
        let fx = fixture().await;
        let tickets = TicketService::new(fx.store.clone(), fx.clock.clone(), 1024);
        let activities = ActivityService::new(fx.store.clone(), fx.clock.clone(), 1024);

        let ticket = tickets
            .add_ticket(
                fx.admin,
                TicketForm {
                    ticket_type: "Meeting Minutes".into(),
                    subject: "Weekly sync".into(),
                    priority: "Low".into(),
                    assigned_id: Some(fx.agent.user_id.to_string()),
                    ..TicketForm::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Open);

        fx.clock.set(at(2024, 3, 16));
        let second = activities
            .add_activity(fx.agent, ticket.id, "Drafted notes".into(), vec![note("a.txt"), note("b.txt")])
            .await
            .unwrap();
        assert_eq!(second.documents.len(), 2);
        assert_eq!(second.documents[1].document_no, format!("{}/SV-HR/2-NOT/III/2024", ticket.id));

        let after = tickets.get_ticket_by_id(ticket.id).await.unwrap();
        assert_eq!(after.status, TicketStatus::InProgress);

        // A third note leaves a manually set status alone.
        tickets.close_ticket(fx.agent, ticket.id, Some("Pending".into())).await.unwrap();
        fx.clock.set(at(2024, 3, 17));
        activities
            .add_activity(fx.agent, ticket.id, "Follow-up".into(), vec![])
            .await
            .unwrap();
        assert_eq!(
            tickets.get_ticket_by_id(ticket.id).await.unwrap().status,
            TicketStatus::Pending
        );

        let listed = activities.get_activities_by_ticket(ticket.id).await.unwrap();
        let descriptions: Vec<_> = listed.iter().map(|a| a.description.as_str()).collect();
        assert_eq!(descriptions, ["Follow-up", "Drafted notes", "Initial Activity"]);
    }

    #[tokio::test]
    async fn test_activity_crud_errors() {
        let fx = fixture().await;
        let activities = ActivityService::new(fx.store.clone(), fx.clock.clone(), 1024);

        assert!(matches!(
            activities.add_activity(fx.agent, 404, "x".into(), vec![]).await,
            Err(ServiceError::NotFound(ref e)) if e == "ticket"
        ));
        assert!(matches!(
            activities.add_activity(fx.agent, 404, "   ".into(), vec![]).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            activities.get_activities_by_ticket(404).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            activities.update_activity(fx.agent, 404, "x".into()).await,
            Err(ServiceError::NotFound(ref e)) if e == "activity"
        ));
        assert!(matches!(
            activities.delete_activity(fx.agent, 404).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_activity() {
        let fx = fixture().await;
        let tickets = TicketService::new(fx.store.clone(), fx.clock.clone(), 1024);
        let activities = ActivityService::new(fx.store.clone(), fx.clock.clone(), 1024);

        let ticket = tickets
            .add_ticket(
                fx.admin,
                TicketForm {
                    ticket_type: "Incident Report".into(),
                    subject: "Leak".into(),
                    priority: "High".into(),
                    ..TicketForm::default()
                },
            )
            .await
            .unwrap();
        let added = activities
            .add_activity(fx.admin, ticket.id, "Plumber called".into(), vec![note("invoice.txt")])
            .await
            .unwrap();

        let updated = activities
            .update_activity(fx.agent, added.id, "Plumber arrived".into())
            .await
            .unwrap();
        assert_eq!(updated.description, "Plumber arrived");
        assert_eq!(updated.updated_by, Some(fx.agent.user_id));

        let path = added.documents[0].document_path.clone();
        activities.delete_activity(fx.admin, added.id).await.unwrap();
        assert!(matches!(
            activities.get_activity_by_id(added.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(fx.store.files().read(&path).await.is_err());
        assert_eq!(tickets.get_ticket_by_id(ticket.id).await.unwrap().activities.len(), 1);
    }
}
