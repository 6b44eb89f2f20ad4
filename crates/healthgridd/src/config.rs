//! Check definitions file parser.
//!
//! ```toml
//! [[checks]]
//! name = "dns-check"
//! namespace = "default"
//! interval = "60s"
//! timeout = "30s"
//!
//! [checks.workload]
//! image = "busybox:latest"
//! command = ["sh", "-c"]
//! args = ["nslookup kubernetes.default.svc.cluster.local"]
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use healthgrid_model::{HealthCheck, WorkloadSpec};
use serde::{Deserialize, Serialize};

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksFile {
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub interval: String,
    pub timeout: String,
    pub workload: Option<WorkloadSpec>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ChecksFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read checks file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid checks file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Convert into validated check definitions.
    pub fn into_checks(self) -> anyhow::Result<Vec<HealthCheck>> {
        let mut seen = HashSet::new();
        let mut checks = Vec::with_capacity(self.checks.len());

        for entry in self.checks {
            if !seen.insert(entry.name.clone()) {
                bail!("duplicate check name {:?}", entry.name);
            }
            let interval = whole_seconds("interval", &entry.interval)
                .with_context(|| format!("check {:?}", entry.name))?;
            let timeout = whole_seconds("timeout", &entry.timeout)
                .with_context(|| format!("check {:?}", entry.name))?;

            let mut check = HealthCheck::new(entry.name, entry.namespace, interval, timeout);
            if let Some(workload) = entry.workload {
                check = check.with_workload(workload);
            }
            check.validate()?;
            checks.push(check);
        }
        Ok(checks)
    }
}

/// The checks registered when no file is given.
pub fn builtin_checks() -> Vec<HealthCheck> {
    let shell = |script: &str| WorkloadSpec {
        image: "busybox:latest".to_string(),
        command: vec!["sh".to_string(), "-c".to_string()],
        args: vec![script.to_string()],
    };

    vec![
        HealthCheck::new("dns-check", DEFAULT_NAMESPACE, 60, 30).with_workload(shell(
            "nslookup kubernetes.default.svc.cluster.local && echo 'DNS check passed'",
        )),
        HealthCheck::new("pod-deployment-check", DEFAULT_NAMESPACE, 120, 60).with_workload(shell(
            "echo 'Testing pod creation and execution' && sleep 5 && echo 'Pod check passed'",
        )),
    ]
}

/// Parse a duration like "5s", "500ms", "2m", or plain seconds "10".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn whole_seconds(field: &str, raw: &str) -> anyhow::Result<u64> {
    let duration = parse_duration(raw).ok_or_else(|| anyhow!("invalid {field} {raw:?}"))?;
    if duration.subsec_nanos() != 0 {
        bail!("{field} {raw:?} is not a whole number of seconds");
    }
    Ok(duration.as_secs())
}
