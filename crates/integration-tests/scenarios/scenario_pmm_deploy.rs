//! Run the PMM deployment scenario against a real AWS account
//!
//! ```text
//! scenario_pmm_deploy --config pmm-tests.toml --provider-version "~> 6.0" --keep-after
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use integration_tests::{PmmScenario, TestConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "scenario_pmm_deploy", about = "Deploy PMM on ECS and validate it end to end")]
struct Args {
    /// TOML configuration file (defaults to ./pmm-tests.toml when present)
    #[arg(short, long, env = "PMM_TEST_CONFIG")]
    config: Option<PathBuf>,

    /// Run only this AWS provider constraint instead of every configured one
    #[arg(long)]
    provider_version: Option<String>,

    /// Leave the deployment in place after the run
    #[arg(long)]
    keep_after: bool,

    /// Skip provisioning and check the deployment already applied in the module directory
    #[arg(long, conflicts_with = "provider_version")]
    reuse: bool,

    /// Let AWS SDK and HTTP client logs through
    #[arg(long)]
    debug_aws_sdk: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TestConfig::load(args.config.as_deref())?;
    config.keep_after |= args.keep_after;
    config.debug_aws_sdk |= args.debug_aws_sdk;
    if let Some(version) = args.provider_version {
        config.aws_provider_versions = vec![version];
    }

    pmm_common::logging::init_logging(&args.verbosity, config.logging())?;
    config.validate()?;

    let scenario = PmmScenario::new(config);

    if args.reuse {
        let report = scenario
            .run_existing()
            .await
            .context("scenario against existing deployment failed")?;
        info!(?report, "Scenario finished");
        return Ok(());
    }

    for report in scenario.run_all().await.context("PMM scenario failed")? {
        info!(
            aws_provider_version = report.aws_provider_version.as_deref().unwrap_or("-"),
            pmm_version = report.pmm_version.as_deref().unwrap_or("unknown"),
            service = %report.service_name,
            recovery_point = %report.recovery_point_arn,
            "Scenario finished"
        );
    }
    Ok(())
}
