//! Package Manager Module
//!
//! Renders package installation commands for the distribution running on the remote
//! compute instance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Package manager types supported for remote system package installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// APT package manager (Debian/Ubuntu)
    Apt,
    /// YUM package manager (Amazon Linux 2, older RHEL)
    Yum,
    /// DNF package manager (Amazon Linux 2023, RHEL 8+)
    #[default]
    Dnf,
    /// APK package manager (Alpine Linux)
    Apk,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Apt => write!(f, "apt"),
            PackageManager::Yum => write!(f, "yum"),
            PackageManager::Dnf => write!(f, "dnf"),
            PackageManager::Apk => write!(f, "apk"),
        }
    }
}

impl FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apt" | "apt-get" => Ok(PackageManager::Apt),
            "yum" => Ok(PackageManager::Yum),
            "dnf" => Ok(PackageManager::Dnf),
            "apk" => Ok(PackageManager::Apk),
            other => Err(format!("unsupported package manager: {other}")),
        }
    }
}

impl PackageManager {
    /// Get the install command for this package manager
    pub fn install_command(&self, packages: &[&str]) -> String {
        let packages = packages.join(" ");
        match self {
            PackageManager::Apt => {
                format!(
                    "DEBIAN_FRONTEND=noninteractive sudo -E apt-get update && DEBIAN_FRONTEND=noninteractive sudo -E apt-get install -y --no-install-recommends {}",
                    packages
                )
            }
            PackageManager::Yum => {
                format!("sudo yum install -y {}", packages)
            }
            PackageManager::Dnf => {
                format!(
                    "sudo dnf install -y --setopt=install_weak_deps=False {}",
                    packages
                )
            }
            PackageManager::Apk => {
                format!("sudo apk add --no-cache {}", packages)
            }
        }
    }

    /// Executable the install command invokes
    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Yum => "yum",
            PackageManager::Dnf => "dnf",
            PackageManager::Apk => "apk",
        }
    }

    /// Silent shell test that succeeds when [`binary`](Self::binary) is on `PATH`
    pub fn availability_check(&self) -> String {
        format!("command -v {} >/dev/null 2>&1", self.binary())
    }

    /// Install `packages` only when the package manager exists on the host
    pub fn guarded_install_command(&self, packages: &[&str]) -> String {
        format!(
            "{} && {}",
            self.availability_check(),
            self.install_command(packages)
        )
    }

    /// Name of the pip package for the distribution's python3
    pub fn pip_package(&self) -> &'static str {
        match self {
            PackageManager::Apk => "py3-pip",
            _ => "python3-pip",
        }
    }
}
