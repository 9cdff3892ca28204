//! Unified logging initialization for the PMM harness binaries and tests
//!
//! Filters are resolved in the following priority order:
//! 1. CLI flags (`-v/-q`) - highest priority
//! 2. RUST_LOG environment variable
//! 3. Defaults derived from [`LoggingConfig`] - lowest priority

use anyhow::Result;
use clap_verbosity_flag::{LogLevel, Verbosity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Targets capped at `warn` unless AWS SDK debugging is requested.
const LOW_LEVEL_TARGETS: &[&str] = &[
    "aws_config",
    "aws_smithy_runtime",
    "aws_smithy_runtime_api",
    "aws_sdk_ssm",
    "aws_sdk_backup",
    "aws_sdk_sts",
    "hyper",
    "rustls",
    "reqwest",
];

/// Logging switches chosen by the harness entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log the harness itself at `debug` instead of `info`
    pub debug: bool,
    /// Let AWS SDK and HTTP stack chatter through
    pub debug_aws_sdk: bool,
}

impl LoggingConfig {
    pub fn new(debug: bool, debug_aws_sdk: bool) -> Self {
        Self {
            debug,
            debug_aws_sdk,
        }
    }

    /// Filter used when neither CLI flags nor RUST_LOG say otherwise.
    pub fn default_filter(&self) -> String {
        let level = if self.debug { "debug" } else { "info" };
        self.with_library_caps(level)
    }

    fn with_library_caps(&self, base: &str) -> String {
        let mut directives = vec![base.to_string()];
        if !self.debug_aws_sdk {
            directives.extend(LOW_LEVEL_TARGETS.iter().map(|t| format!("{t}=warn")));
        }
        directives.join(",")
    }
}

/// Initialize logging with the specified verbosity level and harness switches.
///
/// # Example
///
/// ```no_run
/// use clap::Parser;
/// use clap_verbosity_flag::{Verbosity, InfoLevel};
/// use pmm_common::logging::{self, LoggingConfig};
///
/// #[derive(Parser)]
/// struct Args {
///     #[clap(flatten)]
///     verbosity: Verbosity<InfoLevel>,
/// }
///
/// let args = Args::parse();
/// logging::init_logging(&args.verbosity, LoggingConfig::default()).unwrap();
/// ```
pub fn init_logging<L: LogLevel>(verbosity: &Verbosity<L>, config: LoggingConfig) -> Result<()> {
    let filter = if let Some(log_level) = verbosity.log_level() {
        // CLI flags take priority, library caps still apply
        EnvFilter::try_new(config.with_library_caps(&log_level.to_string().to_lowercase()))?
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_filter()))
    };

    install(filter)
}

/// Initialize logging from test code.
///
/// Returns `false` when a subscriber was already installed by an earlier test in the
/// same process.
pub fn init_test_logging(config: LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));
    install(filter).is_ok()
}

fn install(filter: EnvFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true) // Show module path
                .with_file(true) // Show source file
                .with_line_number(true) // Show line number
                .compact(),
        )
        .try_init()?;

    Ok(())
}
