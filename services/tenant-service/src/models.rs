// Tenant records and the lifecycle state machine

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ldp_shared::events::{
    Event, TOPIC_TENANT_ACTIVATED, TOPIC_TENANT_CREATED, TOPIC_TENANT_DEACTIVATED,
    TOPIC_TENANT_REACTIVATED, TOPIC_TENANT_SCHEMA_CREATED, TOPIC_TENANT_SUSPENDED,
};
use ldp_shared::{TenantId, TenantStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub name: String,
    pub contact_email: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
    pub status: TenantStatus,
    pub realm: Option<String>,
    pub schema_name: String,
    /// Monotonic lifecycle version, bumped on every transition. Events carry
    /// it; consumers dedupe on (tenant, version).
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub id: TenantId,
    pub name: String,
    pub contact_email: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
    pub realm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub config: Option<HashMap<String, String>>,
    pub realm: Option<String>,
}

/// Lifecycle verbs of the orchestrator API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Activate,
    Suspend,
    Deactivate,
    Reinstate,
    Reactivate,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Activate => "activate",
            LifecycleAction::Suspend => "suspend",
            LifecycleAction::Deactivate => "deactivate",
            LifecycleAction::Reinstate => "reinstate",
            LifecycleAction::Reactivate => "reactivate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "activate" => Some(LifecycleAction::Activate),
            "suspend" => Some(LifecycleAction::Suspend),
            "deactivate" => Some(LifecycleAction::Deactivate),
            "reinstate" => Some(LifecycleAction::Reinstate),
            "reactivate" => Some(LifecycleAction::Reactivate),
            _ => None,
        }
    }

    /// The transition table. `None` means the action is not legal from
    /// `from`; there is no self-transition anywhere in the machine.
    pub fn target_status(&self, from: TenantStatus) -> Option<TenantStatus> {
        match (from, self) {
            (TenantStatus::Pending, LifecycleAction::Activate) => Some(TenantStatus::Active),
            (TenantStatus::Active, LifecycleAction::Suspend) => Some(TenantStatus::Suspended),
            (TenantStatus::Active, LifecycleAction::Deactivate) => Some(TenantStatus::Inactive),
            (TenantStatus::Suspended, LifecycleAction::Reinstate) => Some(TenantStatus::Active),
            (TenantStatus::Suspended, LifecycleAction::Deactivate) => Some(TenantStatus::Inactive),
            (TenantStatus::Inactive, LifecycleAction::Reactivate) => Some(TenantStatus::Active),
            _ => None,
        }
    }

    /// Topic of the single lifecycle event a successful transition emits.
    pub fn event_topic(&self) -> &'static str {
        match self {
            LifecycleAction::Activate => TOPIC_TENANT_ACTIVATED,
            LifecycleAction::Suspend => TOPIC_TENANT_SUSPENDED,
            LifecycleAction::Deactivate => TOPIC_TENANT_DEACTIVATED,
            LifecycleAction::Reinstate | LifecycleAction::Reactivate => TOPIC_TENANT_REACTIVATED,
        }
    }

    /// Whether this transition brings the tenant into data-plane service
    /// and therefore also publishes `tenant.schema.created`.
    pub fn enters_active(&self, from: TenantStatus) -> bool {
        self.target_status(from) == Some(TenantStatus::Active)
    }
}

impl TenantRecord {
    pub fn realm_or_default(&self) -> Option<&str> {
        self.realm.as_deref().filter(|r| !r.is_empty())
    }

    fn lifecycle_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "tenantId": self.id,
            "status": self.status,
            "version": self.version,
        })
    }

    /// The single event recorded with a successful create.
    pub fn creation_events(&self) -> Vec<Event> {
        vec![Event::new(
            TOPIC_TENANT_CREATED,
            self.id.clone(),
            self.version,
            self.lifecycle_payload(),
        )]
    }

    /// Events recorded with a successful transition: the lifecycle event,
    /// plus `tenant.schema.created` whenever the tenant enters ACTIVE.
    /// Re-announcing the schema on reinstate and reactivate is harmless
    /// (consumers are idempotent) and self-heals lost deliveries.
    pub fn transition_events(&self, action: LifecycleAction, from: TenantStatus) -> Vec<Event> {
        let mut events = vec![Event::new(
            action.event_topic(),
            self.id.clone(),
            self.version,
            self.lifecycle_payload(),
        )];

        if action.enters_active(from) {
            events.push(Event::new(
                TOPIC_TENANT_SCHEMA_CREATED,
                self.id.clone(),
                self.version,
                serde_json::json!({
                    "tenantId": self.id,
                    "schemaName": self.schema_name,
                    "version": self.version,
                    "timestamp": Utc::now(),
                }),
            ));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIONS: [LifecycleAction; 5] = [
        LifecycleAction::Activate,
        LifecycleAction::Suspend,
        LifecycleAction::Deactivate,
        LifecycleAction::Reinstate,
        LifecycleAction::Reactivate,
    ];

    const ALL_STATUSES: [TenantStatus; 4] = [
        TenantStatus::Pending,
        TenantStatus::Active,
        TenantStatus::Suspended,
        TenantStatus::Inactive,
    ];

    #[test]
    fn test_legal_transitions() {
        assert_eq!(
            LifecycleAction::Activate.target_status(TenantStatus::Pending),
            Some(TenantStatus::Active)
        );
        assert_eq!(
            LifecycleAction::Suspend.target_status(TenantStatus::Active),
            Some(TenantStatus::Suspended)
        );
        assert_eq!(
            LifecycleAction::Deactivate.target_status(TenantStatus::Active),
            Some(TenantStatus::Inactive)
        );
        assert_eq!(
            LifecycleAction::Reinstate.target_status(TenantStatus::Suspended),
            Some(TenantStatus::Active)
        );
        assert_eq!(
            LifecycleAction::Deactivate.target_status(TenantStatus::Suspended),
            Some(TenantStatus::Inactive)
        );
        assert_eq!(
            LifecycleAction::Reactivate.target_status(TenantStatus::Inactive),
            Some(TenantStatus::Active)
        );
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        // Exhaustive complement of the six legal pairs.
        let legal: [(TenantStatus, LifecycleAction); 6] = [
            (TenantStatus::Pending, LifecycleAction::Activate),
            (TenantStatus::Active, LifecycleAction::Suspend),
            (TenantStatus::Active, LifecycleAction::Deactivate),
            (TenantStatus::Suspended, LifecycleAction::Reinstate),
            (TenantStatus::Suspended, LifecycleAction::Deactivate),
            (TenantStatus::Inactive, LifecycleAction::Reactivate),
        ];

        for from in ALL_STATUSES {
            for action in ALL_ACTIONS {
                let expected_legal = legal.contains(&(from, action));
                assert_eq!(
                    action.target_status(from).is_some(),
                    expected_legal,
                    "{:?} from {:?}",
                    action,
                    from
                );
            }
        }
    }

    #[test]
    fn test_inactive_is_only_left_via_reactivate() {
        for action in ALL_ACTIONS {
            let target = action.target_status(TenantStatus::Inactive);
            if action == LifecycleAction::Reactivate {
                assert_eq!(target, Some(TenantStatus::Active));
            } else {
                assert!(target.is_none());
            }
        }
    }

    #[test]
    fn test_action_parsing_round_trip() {
        for action in ALL_ACTIONS {
            assert_eq!(LifecycleAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(LifecycleAction::parse("destroy"), None);
    }

    fn record(status: TenantStatus, version: i64) -> TenantRecord {
        let id = TenantId::new("acme").unwrap();
        TenantRecord {
            schema_name: ldp_shared::schema::schema_name(&id),
            id,
            name: "Acme Logistics".to_string(),
            contact_email: "ops@acme.example".to_string(),
            config: HashMap::new(),
            status,
            realm: None,
            version,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_creation_emits_exactly_one_event() {
        let events = record(TenantStatus::Pending, 1).creation_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, TOPIC_TENANT_CREATED);
        assert_eq!(events[0].version, 1);
    }

    #[test]
    fn test_activation_emits_lifecycle_and_schema_events() {
        let events =
            record(TenantStatus::Active, 2).transition_events(LifecycleAction::Activate, TenantStatus::Pending);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, TOPIC_TENANT_ACTIVATED);
        assert_eq!(events[1].event_type, TOPIC_TENANT_SCHEMA_CREATED);
        assert_eq!(events[1].payload["schemaName"], "tenant_acme_schema");
        assert_eq!(events[1].version, 2);
    }

    #[test]
    fn test_suspension_emits_only_the_lifecycle_event() {
        let events = record(TenantStatus::Suspended, 3)
            .transition_events(LifecycleAction::Suspend, TenantStatus::Active);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, TOPIC_TENANT_SUSPENDED);
    }

    #[test]
    fn test_entering_active_flags_schema_provisioning() {
        assert!(LifecycleAction::Activate.enters_active(TenantStatus::Pending));
        assert!(LifecycleAction::Reinstate.enters_active(TenantStatus::Suspended));
        assert!(LifecycleAction::Reactivate.enters_active(TenantStatus::Inactive));
        assert!(!LifecycleAction::Suspend.enters_active(TenantStatus::Active));
        assert!(!LifecycleAction::Deactivate.enters_active(TenantStatus::Active));
    }
}
