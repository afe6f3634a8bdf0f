use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use exportmart_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use exportmart_events::Event;

use crate::user::{MembershipStatus, MembershipTier};

/// Membership application identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub AggregateId);

impl ApplicationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Company details a supplier files with the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub company_name: String,
    pub contact_email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub business_registration_number: Option<String>,
    #[serde(default)]
    pub main_products: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CompanyProfile {
    pub fn new(company_name: impl Into<String>, contact_email: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            contact_email: contact_email.into(),
            phone: None,
            website: None,
            country: None,
            business_registration_number: None,
            main_products: None,
            description: None,
        }
    }
}

/// Current state of one application, as listed on the admin review screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub tier: MembershipTier,
    pub status: MembershipStatus,
    pub company: CompanyProfile,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reviewed_by: Option<UserId>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl ApplicationRecord {
    pub fn from_submitted(e: &ApplicationSubmitted) -> Self {
        Self {
            id: e.application_id,
            user_id: e.user_id,
            user_name: e.user_name.clone(),
            user_email: e.user_email.clone(),
            tier: e.tier,
            status: MembershipStatus::Pending,
            company: e.company.clone(),
            submitted_at: e.occurred_at,
            reviewed_at: None,
            reviewed_by: None,
            rejection_reason: None,
        }
    }

    pub fn evolve(&mut self, event: &MembershipEvent) {
        match event {
            MembershipEvent::ApplicationSubmitted(_) => {}
            MembershipEvent::ApplicationApproved(e) => {
                self.status = MembershipStatus::Approved;
                self.reviewed_at = Some(e.occurred_at);
                self.reviewed_by = Some(e.reviewed_by);
            }
            MembershipEvent::ApplicationRejected(e) => {
                self.status = MembershipStatus::Rejected;
                self.reviewed_at = Some(e.occurred_at);
                self.reviewed_by = Some(e.reviewed_by);
                self.rejection_reason = e.reason.clone();
            }
        }
    }
}

/// Aggregate root: MembershipApplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipApplication {
    id: ApplicationId,
    record: Option<ApplicationRecord>,
    version: u64,
}

impl MembershipApplication {
    /// Create an empty, not-yet-submitted aggregate instance for rehydration.
    pub fn empty(id: ApplicationId) -> Self {
        Self {
            id,
            record: None,
            version: 0,
        }
    }

    pub fn record(&self) -> Option<&ApplicationRecord> {
        self.record.as_ref()
    }

    pub fn status(&self) -> Option<MembershipStatus> {
        self.record.as_ref().map(|r| r.status)
    }
}

impl AggregateRoot for MembershipApplication {
    type Id = ApplicationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SubmitApplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitApplication {
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub tier: MembershipTier,
    pub company: CompanyProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveApplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveApplication {
    pub application_id: ApplicationId,
    pub reviewed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectApplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectApplication {
    pub application_id: ApplicationId,
    pub reviewed_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipCommand {
    SubmitApplication(SubmitApplication),
    ApproveApplication(ApproveApplication),
    RejectApplication(RejectApplication),
}

/// Event: ApplicationSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmitted {
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub tier: MembershipTier,
    pub company: CompanyProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApplicationApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationApproved {
    pub application_id: ApplicationId,
    pub reviewed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApplicationRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRejected {
    pub application_id: ApplicationId,
    pub reviewed_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    ApplicationSubmitted(ApplicationSubmitted),
    ApplicationApproved(ApplicationApproved),
    ApplicationRejected(ApplicationRejected),
}

impl MembershipEvent {
    pub fn application_id(&self) -> ApplicationId {
        match self {
            MembershipEvent::ApplicationSubmitted(e) => e.application_id,
            MembershipEvent::ApplicationApproved(e) => e.application_id,
            MembershipEvent::ApplicationRejected(e) => e.application_id,
        }
    }
}

impl Event for MembershipEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MembershipEvent::ApplicationSubmitted(_) => "membership.application_submitted",
            MembershipEvent::ApplicationApproved(_) => "membership.application_approved",
            MembershipEvent::ApplicationRejected(_) => "membership.application_rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MembershipEvent::ApplicationSubmitted(e) => e.occurred_at,
            MembershipEvent::ApplicationApproved(e) => e.occurred_at,
            MembershipEvent::ApplicationRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for MembershipApplication {
    type Command = MembershipCommand;
    type Event = MembershipEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MembershipEvent::ApplicationSubmitted(e) => {
                self.id = e.application_id;
                self.record = Some(ApplicationRecord::from_submitted(e));
            }
            other => {
                if let Some(record) = self.record.as_mut() {
                    record.evolve(other);
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MembershipCommand::SubmitApplication(cmd) => self.handle_submit(cmd),
            MembershipCommand::ApproveApplication(cmd) => self.handle_approve(cmd),
            MembershipCommand::RejectApplication(cmd) => self.handle_reject(cmd),
        }
    }
}

impl MembershipApplication {
    fn handle_submit(&self, cmd: &SubmitApplication) -> Result<Vec<MembershipEvent>, DomainError> {
        if self.record.is_some() {
            return Err(DomainError::conflict("membership application already exists"));
        }

        let company_name = cmd.company.company_name.trim();
        if company_name.is_empty() {
            return Err(DomainError::validation("company name cannot be empty"));
        }
        let contact_email = cmd.company.contact_email.trim();
        if contact_email.is_empty() || !contact_email.contains('@') {
            return Err(DomainError::validation("a valid contact email is required"));
        }

        let mut company = cmd.company.clone();
        company.company_name = company_name.to_string();
        company.contact_email = contact_email.to_string();

        Ok(vec![MembershipEvent::ApplicationSubmitted(ApplicationSubmitted {
            application_id: cmd.application_id,
            user_id: cmd.user_id,
            user_name: cmd.user_name.trim().to_string(),
            user_email: cmd.user_email.trim().to_string(),
            tier: cmd.tier,
            company,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn pending_record(&self) -> Result<&ApplicationRecord, DomainError> {
        let record = self
            .record
            .as_ref()
            .ok_or_else(|| DomainError::not_found("membership application"))?;

        // Invariant: approved and rejected are final.
        if record.status != MembershipStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "membership application is already {}",
                record.status
            )));
        }
        Ok(record)
    }

    fn handle_approve(&self, cmd: &ApproveApplication) -> Result<Vec<MembershipEvent>, DomainError> {
        self.pending_record()?;

        Ok(vec![MembershipEvent::ApplicationApproved(ApplicationApproved {
            application_id: cmd.application_id,
            reviewed_by: cmd.reviewed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectApplication) -> Result<Vec<MembershipEvent>, DomainError> {
        self.pending_record()?;

        let reason = cmd
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        Ok(vec![MembershipEvent::ApplicationRejected(ApplicationRejected {
            application_id: cmd.application_id,
            reviewed_by: cmd.reviewed_by,
            reason,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn submit_cmd(id: ApplicationId) -> MembershipCommand {
        MembershipCommand::SubmitApplication(SubmitApplication {
            application_id: id,
            user_id: UserId::new(),
            user_name: "Nadia Karim".into(),
            user_email: "nadia@example.com".into(),
            tier: MembershipTier::Gold,
            company: CompanyProfile::new(" Karim Spices Ltd ", "sales@karimspices.example"),
            occurred_at: test_time(),
        })
    }

    fn execute(app: &mut MembershipApplication, cmd: MembershipCommand) -> Result<(), DomainError> {
        let events = app.handle(&cmd)?;
        for e in &events {
            app.apply(e);
        }
        Ok(())
    }

    fn submitted() -> MembershipApplication {
        let id = ApplicationId::generate();
        let mut app = MembershipApplication::empty(id);
        execute(&mut app, submit_cmd(id)).unwrap();
        app
    }

    #[test]
    fn submit_starts_pending_with_trimmed_company() {
        let app = submitted();
        let record = app.record().unwrap();
        assert_eq!(record.status, MembershipStatus::Pending);
        assert_eq!(record.company.company_name, "Karim Spices Ltd");
        assert_eq!(record.tier, MembershipTier::Gold);
        assert_eq!(app.version(), 1);
    }

    #[test]
    fn submit_requires_company_and_email() {
        let id = ApplicationId::generate();
        let app = MembershipApplication::empty(id);

        let mut cmd = match submit_cmd(id) {
            MembershipCommand::SubmitApplication(c) => c,
            _ => unreachable!(),
        };
        cmd.company.contact_email = "not-an-email".into();
        let err = app
            .handle(&MembershipCommand::SubmitApplication(cmd.clone()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        cmd.company = CompanyProfile::new("  ", "a@b.example");
        let err = app
            .handle(&MembershipCommand::SubmitApplication(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("company name") => {}
            _ => panic!("Expected company name validation error"),
        }
    }

    #[test]
    fn approve_records_reviewer() {
        let mut app = submitted();
        let admin = UserId::new();
        let id = *app.id();

        execute(
            &mut app,
            MembershipCommand::ApproveApplication(ApproveApplication {
                application_id: id,
                reviewed_by: admin,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let record = app.record().unwrap();
        assert_eq!(record.status, MembershipStatus::Approved);
        assert_eq!(record.reviewed_by, Some(admin));
        assert!(record.reviewed_at.is_some());
    }

    #[test]
    fn review_is_final() {
        let mut app = submitted();
        let id = *app.id();

        execute(
            &mut app,
            MembershipCommand::RejectApplication(RejectApplication {
                application_id: id,
                reviewed_by: UserId::new(),
                reason: Some(" Missing business license ".into()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(
            app.record().unwrap().rejection_reason.as_deref(),
            Some("Missing business license")
        );

        let err = execute(
            &mut app,
            MembershipCommand::ApproveApplication(ApproveApplication {
                application_id: id,
                reviewed_by: UserId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::InvalidState(msg) if msg.contains("rejected") => {}
            _ => panic!("Expected invalid state error"),
        }
    }

    #[test]
    fn reviewing_unknown_application_is_not_found() {
        let app = MembershipApplication::empty(ApplicationId::generate());
        let err = app
            .handle(&MembershipCommand::ApproveApplication(ApproveApplication {
                application_id: *app.id(),
                reviewed_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err.to_string(), "membership application not found");
    }
}
