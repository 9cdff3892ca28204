//! Prepares the managed PostgreSQL instance for PMM monitoring
//!
//! The database is not reachable from the test runner, so both steps run on the
//! compute instance through a [`RemoteExecutor`]:
//!
//! 1. install `psycopg2` (every sub-command tolerates failure, so the exit code says
//!    nothing; the completion marker in the output does)
//! 2. run `configure_postgres.py` delivered as a heredoc, with the connection settings
//!    in environment variables rather than in the script text
//!
//! Both steps are safe to repeat against an already configured database.

use std::borrow::Cow;
use std::time::Duration;

use pmm_common::remote::{continue_on_error, heredoc};
use pmm_common::{DatabaseConnection, PackageManager};
use tracing::{debug, error, info};

use crate::error::{HarnessError, Result};
use crate::remote::{RemoteExecutor, RemoteTarget};

/// Printed by the install step once the client library imports
pub const INSTALL_COMPLETE_MARKER: &str = "PMM_CLIENT_INSTALL_COMPLETE";

/// Printed by the configuration script on success
pub const CONFIGURATION_OK_MARKER: &str = "PMM_DB_CONFIGURATION_OK";

const CLIENT_LIBRARY: &str = "psycopg2-binary";
const SCRIPT_DELIMITER: &str = "PMM_CONFIGURE_EOF";
const CONFIGURE_SCRIPT: &str = include_str!("configure_postgres.py");

pub struct DatabaseConfigurator<E> {
    executor: E,
    package_manager: PackageManager,
    install_timeout: Duration,
    configure_timeout: Duration,
}

impl<E: RemoteExecutor> DatabaseConfigurator<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            package_manager: PackageManager::default(),
            install_timeout: Duration::from_secs(600),
            configure_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_package_manager(mut self, package_manager: PackageManager) -> Self {
        self.package_manager = package_manager;
        self
    }

    pub fn with_timeouts(mut self, install: Duration, configure: Duration) -> Self {
        self.install_timeout = install;
        self.configure_timeout = configure;
        self
    }

    /// Install the client library, then enable monitoring on the database.
    pub async fn configure(&self, target: &RemoteTarget, db: &DatabaseConnection) -> Result<()> {
        self.install_client_library(target).await?;
        self.run_configuration_script(target, db).await
    }

    pub async fn install_client_library(&self, target: &RemoteTarget) -> Result<()> {
        let command = install_command(self.package_manager);
        info!(
            instance_id = %target.instance_id,
            package_manager = %self.package_manager,
            "Installing PostgreSQL client library on remote instance"
        );
        debug!(command = %command, "Install command");

        let result = self
            .executor
            .execute(target, &command, self.install_timeout)
            .await?;

        if !result.combined_output().contains(INSTALL_COMPLETE_MARKER) {
            error!(
                instance_id = %target.instance_id,
                exit_code = result.exit_code,
                "Client library installation did not report completion"
            );
            return Err(HarnessError::Setup {
                message: format!(
                    "{CLIENT_LIBRARY} installation on {} did not print {INSTALL_COMPLETE_MARKER} (exit code {})",
                    target.instance_id, result.exit_code
                ),
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        info!(instance_id = %target.instance_id, "Client library installed");
        Ok(())
    }

    pub async fn run_configuration_script(
        &self,
        target: &RemoteTarget,
        db: &DatabaseConnection,
    ) -> Result<()> {
        info!(
            instance_id = %target.instance_id,
            database = %db.endpoint(),
            user = %db.username,
            "Configuring database for PMM monitoring"
        );

        let result = self
            .executor
            .execute(target, &configure_command(db), self.configure_timeout)
            .await?;

        for line in result.stdout.lines() {
            debug!(instance_id = %target.instance_id, "remote: {}", line);
        }

        if !result.success() {
            error!(
                instance_id = %target.instance_id,
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "Database configuration script failed"
            );
            return Err(HarnessError::ConfigurationFailed {
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        if !result.stdout.contains(CONFIGURATION_OK_MARKER) {
            error!(
                instance_id = %target.instance_id,
                "Database configuration script exited cleanly without confirming"
            );
            return Err(HarnessError::Setup {
                message: format!(
                    "configuration script on {} exited 0 but did not print {CONFIGURATION_OK_MARKER}",
                    target.instance_id
                ),
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        info!(database = %db.endpoint(), "Database configured for PMM monitoring");
        Ok(())
    }
}

/// Shell command installing pip and the client library, ending with the marker.
pub fn install_command(package_manager: PackageManager) -> String {
    [
        continue_on_error(
            &package_manager.guarded_install_command(&[package_manager.pip_package()]),
        ),
        continue_on_error(&format!(
            "sudo python3 -m pip install --quiet {CLIENT_LIBRARY}"
        )),
        format!("python3 -c 'import psycopg2; print(\"{INSTALL_COMPLETE_MARKER}\")'"),
    ]
    .join("\n")
}

/// Shell command running the configuration script with `db` passed in the environment.
pub fn configure_command(db: &DatabaseConnection) -> String {
    let port = db.port.to_string();
    let env = [
        ("PMM_DB_HOST", db.host.as_str()),
        ("PMM_DB_PORT", port.as_str()),
        ("PMM_DB_NAME", db.database.as_str()),
        ("PMM_DB_USER", db.username.as_str()),
        ("PMM_DB_PASSWORD", db.password.as_str()),
    ]
    .iter()
    .map(|(name, value)| format!("{name}={}", shell_escape::unix::escape(Cow::Borrowed(*value))))
    .collect::<Vec<_>>()
    .join(" ");

    heredoc(
        &format!("env {env} python3 -"),
        SCRIPT_DELIMITER,
        CONFIGURE_SCRIPT,
    )
}
