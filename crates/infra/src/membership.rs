//! Membership application review service.
//!
//! Suppliers submit one application; an admin approves or rejects it. The
//! resulting status and tier are what the product-upload gate reads.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use exportmart_auth::Principal;
use exportmart_core::{AggregateId, UserId};
use exportmart_events::{EventBus, EventEnvelope};
use exportmart_membership::{
    ApplicationId, ApplicationRecord, ApproveApplication, CompanyProfile, MembershipApplication,
    MembershipCommand, MembershipStatus, MembershipTier, RejectApplication, SubmitApplication, User,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::WorkflowError;
use crate::event_store::EventStore;
use crate::projections::{MEMBERSHIP_AGGREGATE_TYPE, MembershipApplicationsProjection, StaleStreams};
use crate::read_model::{Page, Pagination, ReadStore};

fn make_application(id: AggregateId) -> MembershipApplication {
    MembershipApplication::empty(ApplicationId::new(id))
}

#[derive(Debug)]
pub struct MembershipReviews<S, B, P>
where
    P: ReadStore<ApplicationId, ApplicationRecord>,
{
    dispatcher: CommandDispatcher<S, B>,
    projection: MembershipApplicationsProjection<P>,
    stale: StaleStreams,
}

impl<S, B, P> MembershipReviews<S, B, P>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    P: ReadStore<ApplicationId, ApplicationRecord>,
{
    pub fn new(store: S, bus: B, read_store: P) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            projection: MembershipApplicationsProjection::new(read_store),
            stale: StaleStreams::new(),
        }
    }

    pub fn projection(&self) -> &MembershipApplicationsProjection<P> {
        &self.projection
    }

    /// The application stream for a user.
    ///
    /// Keyed by the applicant, so a second submission lands on the existing
    /// stream and is refused by the aggregate, even under concurrent submits.
    pub fn application_id_for(user_id: UserId) -> ApplicationId {
        ApplicationId::new(AggregateId::from_uuid(*user_id.as_uuid()))
    }

    pub fn submit(
        &self,
        applicant: &Principal,
        tier: MembershipTier,
        company: CompanyProfile,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let application_id = Self::application_id_for(applicant.user_id);
        let command = MembershipCommand::SubmitApplication(SubmitApplication {
            application_id,
            user_id: applicant.user_id,
            user_name: applicant.name.clone(),
            user_email: applicant.email.clone(),
            tier,
            company,
            occurred_at: Utc::now(),
        });
        self.commit(application_id, command)
    }

    pub fn approve(
        &self,
        application_id: ApplicationId,
        reviewed_by: UserId,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let command = MembershipCommand::ApproveApplication(ApproveApplication {
            application_id,
            reviewed_by,
            occurred_at: Utc::now(),
        });
        self.commit(application_id, command)
    }

    pub fn reject(
        &self,
        application_id: ApplicationId,
        reviewed_by: UserId,
        reason: Option<String>,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let command = MembershipCommand::RejectApplication(RejectApplication {
            application_id,
            reviewed_by,
            reason,
            occurred_at: Utc::now(),
        });
        self.commit(application_id, command)
    }

    fn commit(
        &self,
        application_id: ApplicationId,
        command: MembershipCommand,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let out = self
            .dispatcher
            .execute(
                application_id.0,
                MEMBERSHIP_AGGREGATE_TYPE,
                command,
                make_application,
            )
            .inspect_err(|err| {
                warn!(application_id = %application_id, error = %err, "membership command rejected");
            })?;

        // Committed from here on; later failures are logged, not returned.
        if let Err(err) = self.projection.catch_up(self.dispatcher.store(), application_id.0) {
            warn!(application_id = %application_id, error = %err, "membership read model update failed");
            self.stale.mark(application_id.0);
        }
        if let Err(err) = self.dispatcher.publish(&out.committed) {
            warn!(application_id = %application_id, error = %err, "publishing membership events failed");
        }

        let record = out
            .state
            .record()
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("membership application"))?;
        info!(
            application_id = %application_id,
            status = %record.status,
            "membership application updated"
        );
        Ok(record)
    }

    fn heal_read_model(&self) -> Result<(), WorkflowError> {
        if self.stale.is_empty() {
            return Ok(());
        }
        self.stale
            .heal(|id| self.projection.catch_up(self.dispatcher.store(), id))?;
        Ok(())
    }

    pub fn get(&self, application_id: ApplicationId) -> Result<Option<ApplicationRecord>, WorkflowError> {
        self.heal_read_model()?;
        Ok(self.projection.get(&application_id)?)
    }

    /// Newest submissions first, optionally narrowed to one status.
    pub fn list(
        &self,
        status: Option<MembershipStatus>,
        pagination: Pagination,
    ) -> Result<Page<ApplicationRecord>, WorkflowError> {
        self.heal_read_model()?;
        let all = self.projection.list(status)?;
        let total = all.len() as u64;
        Ok(Page::new(pagination.slice(all), total, pagination))
    }

    /// Drop the application read model and replay every application stream.
    pub fn rebuild_read_model(&self) -> Result<usize, WorkflowError> {
        let envelopes: Vec<EventEnvelope<JsonValue>> = self
            .dispatcher
            .store()
            .load_all(MEMBERSHIP_AGGREGATE_TYPE)?
            .iter()
            .map(|e| e.to_envelope())
            .collect();

        self.projection.rebuild_from_scratch(&envelopes)?;
        info!(events = envelopes.len(), "membership read model rebuilt");
        Ok(envelopes.len())
    }

    /// Copy the applicant's review outcome onto the identity record.
    ///
    /// Users without an application come back unchanged.
    pub fn apply_to(&self, user: User) -> Result<User, WorkflowError> {
        self.heal_read_model()?;
        let application = self.projection.get(&Self::application_id_for(user.id))?;
        Ok(match application {
            Some(record) => user.with_membership(record.status, Some(record.tier)),
            None => user,
        })
    }
}
