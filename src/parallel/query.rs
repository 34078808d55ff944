//! Installed-package inventory for a box
//!
//! One read-only query per package ecosystem. Queries are independent, so
//! they run concurrently on a short-deadline pool, and a failing query only
//! empties its own ecosystem's entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::config::EngineConfig;
use super::error::TaskError;
use super::pool::{StringTask, WorkerPool};
use crate::sandbox::CommandRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Apt,
    Pip,
    Npm,
    Yarn,
    Pnpm,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Apt => "apt",
            Ecosystem::Pip => "pip",
            Ecosystem::Npm => "npm",
            Ecosystem::Yarn => "yarn",
            Ecosystem::Pnpm => "pnpm",
        }
    }

    /// Turn raw query output into package entries. Never fails: empty or
    /// malformed output yields an empty list.
    pub fn parse_output(&self, output: &str) -> Vec<String> {
        match self {
            Ecosystem::Apt | Ecosystem::Pip | Ecosystem::Yarn => parse_line_list(output),
            Ecosystem::Npm | Ecosystem::Pnpm => parse_json_package_list(output),
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageQuery {
    pub ecosystem: Ecosystem,
    pub command: &'static str,
}

/// Manually installed apt packages, pip freeze, and the global package lists
/// of npm, yarn and pnpm.
pub const PACKAGE_QUERIES: [PackageQuery; 5] = [
    PackageQuery {
        ecosystem: Ecosystem::Apt,
        command: "dpkg-query -W -f='${Package}=${Version}\\n' $(apt-mark showmanual 2>/dev/null || true) 2>/dev/null | sort",
    },
    PackageQuery {
        ecosystem: Ecosystem::Pip,
        command: "python3 -m pip freeze 2>/dev/null || pip3 freeze 2>/dev/null || true",
    },
    PackageQuery {
        ecosystem: Ecosystem::Npm,
        command: "npm list -g --depth=0 --json 2>/dev/null || true",
    },
    PackageQuery {
        ecosystem: Ecosystem::Yarn,
        command: "yarn global list --depth=0 2>/dev/null | sed -n 's/^info \"\\(.*\\)\" has binaries:$/\\1/p'",
    },
    PackageQuery {
        ecosystem: Ecosystem::Pnpm,
        command: "pnpm ls -g --depth=0 --json 2>/dev/null || true",
    },
];

/// Package lists keyed by ecosystem; every ecosystem has an entry.
pub type PackageInventory = BTreeMap<Ecosystem, Vec<String>>;

pub struct PackageQueryExecutor {
    box_name: String,
    runner: Arc<dyn CommandRunner>,
    worker_pool: WorkerPool,
}

impl PackageQueryExecutor {
    pub fn new(
        box_name: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            box_name: box_name.into(),
            runner,
            worker_pool: config.query_pool(),
        }
    }

    /// Run every query concurrently. Failed queries are logged and leave an
    /// empty list for their ecosystem.
    pub async fn query_all_packages(&self) -> PackageInventory {
        let tasks: Vec<StringTask> = PACKAGE_QUERIES
            .iter()
            .map(|query| self.query_task(query.command))
            .collect();

        let results = self.worker_pool.execute_string_tasks(tasks).await;

        PACKAGE_QUERIES
            .iter()
            .zip(results)
            .map(|(query, result)| (query.ecosystem, Self::collect(query, result)))
            .collect()
    }

    /// Same queries and failure handling as [`Self::query_all_packages`],
    /// one after another.
    pub async fn query_all_sequential(&self) -> PackageInventory {
        let mut inventory = PackageInventory::new();
        for query in &PACKAGE_QUERIES {
            let result = self.query_task(query.command).await;
            inventory.insert(query.ecosystem, Self::collect(query, result));
        }
        inventory
    }

    fn query_task(&self, command: &'static str) -> StringTask {
        let runner = Arc::clone(&self.runner);
        let box_name = self.box_name.clone();
        Box::pin(async move { run_query(runner, &box_name, command).await })
    }

    fn collect(query: &PackageQuery, result: Result<String, TaskError>) -> Vec<String> {
        match result {
            Ok(output) => {
                let packages = query.ecosystem.parse_output(&output);
                debug!("Found {} {} packages", packages.len(), query.ecosystem);
                packages
            }
            Err(err) => {
                warn!("Failed to query {} packages: {}", query.ecosystem, err);
                Vec::new()
            }
        }
    }
}

async fn run_query(
    runner: Arc<dyn CommandRunner>,
    box_name: &str,
    command: &'static str,
) -> Result<String, TaskError> {
    let output = runner
        .run(box_name, command)
        .await
        .map_err(|source| TaskError::Runner {
            command: command.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(TaskError::CommandFailed {
            command: command.to_string(),
            status: output.status,
            stderr: output.stderr,
        });
    }
    Ok(output.stdout)
}

/// Trimmed, non-empty lines
pub fn parse_line_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Global packages from `npm list --json` (an object) or `pnpm ls --json`
/// (an array of objects), rendered as `name@version`.
pub fn parse_json_package_list(output: &str) -> Vec<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => {
            debug!("Ignoring unparsable package list: {}", err);
            return Vec::new();
        }
    };

    let roots = match &value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![&value],
        _ => Vec::new(),
    };

    roots
        .into_iter()
        .filter_map(|root| root.get("dependencies").and_then(Value::as_object))
        .flat_map(|deps| deps.iter())
        .map(|(name, info)| match info.get("version").and_then(Value::as_str) {
            Some(version) => format!("{name}@{version}"),
            None => name.clone(),
        })
        .collect()
}
