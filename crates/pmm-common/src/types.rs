//! Descriptors shared between the harness and the PMM client

use std::fmt;

/// Connection details of the managed PostgreSQL instance, as provisioned
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConnection {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DatabaseConnection {
    /// `host:port` form used in diagnostics
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Password stays out of logs and panic messages
impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let db = DatabaseConnection {
            host: "pmm-db.abc123.us-west-2.rds.amazonaws.com".into(),
            port: 5432,
            database: "postgres".into(),
            username: "pmm".into(),
            password: "s3cr3t!".into(),
        };
        let rendered = format!("{db:?}");
        assert!(!rendered.contains("s3cr3t!"));
        assert!(rendered.contains("<redacted>"));
        assert_eq!(db.endpoint(), "pmm-db.abc123.us-west-2.rds.amazonaws.com:5432");
    }
}
