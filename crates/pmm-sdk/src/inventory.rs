//! Pure helpers over inventory listings

use crate::types::{AgentRecord, ServiceRecord};

/// Service type tags that identify a PostgreSQL service, compared case-insensitively
pub const DATABASE_SERVICE_TYPES: &[&str] = &[
    "SERVICE_TYPE_POSTGRESQL_SERVICE",
    "POSTGRESQL_SERVICE",
    "POSTGRESQL",
];

/// Whether `services` already contains a database service for `address`.
///
/// The recorded address may carry an appended port or domain suffix, so the target
/// address only has to appear inside it.
pub fn is_registered(services: &[ServiceRecord], address: &str) -> bool {
    if address.is_empty() {
        return false;
    }
    services.iter().any(|service| {
        is_database_service(&service.service_type) && service.address.contains(address)
    })
}

fn is_database_service(service_type: &str) -> bool {
    DATABASE_SERVICE_TYPES
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case(service_type))
}

/// Pick the agent to own a new service: first connected one, else the first one.
pub fn select_agent(agents: &[AgentRecord]) -> Option<&AgentRecord> {
    agents
        .iter()
        .find(|agent| agent.connected)
        .or_else(|| agents.first())
}
