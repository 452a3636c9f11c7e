// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of stonne-bridge (tensor compiler to STONNE simulator bridge).

//! Cycle-count reporting.
//!
//! Every simulated layer is recorded once in the metrics artifact, a JSON
//! object keyed by run name. During a tuning pass the cost is additionally
//! appended to the tuner's cost log. Sink failures are logged and returned
//! in the [`ReportSummary`]; they never fail the invocation.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

/// Environment variable naming the metrics artifact.
pub const METRICS_ENV: &str = "STONNE_BRIDGE_METRICS";

const DEFAULT_METRICS_FILE: &str = "stonne-bridge-cycles.json";

/// Serializes read-modify-write cycles on keyed records within the process.
static RECORD_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportingError {
    /// The sink file could not be read, created or written.
    #[error("{sink} sink at {} is unwritable: {message}", path.display())]
    Unwritable {
        sink: &'static str,
        path: PathBuf,
        message: String,
    },
    /// An existing keyed record is not a JSON object of cycle counts.
    #[error("{sink} sink at {} holds a malformed record: {message}", path.display())]
    Malformed {
        sink: &'static str,
        path: PathBuf,
        message: String,
    },
}

/// Tuning state of the current invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuningContext {
    pub active: bool,
    /// Run name both sinks key their records by.
    pub name: String,
    pub cost_sink_path: PathBuf,
}

impl TuningContext {
    /// A plain inference run: only the metrics artifact is written.
    pub fn inactive(name: impl Into<String>) -> Self {
        Self {
            active: false,
            name: name.into(),
            cost_sink_path: PathBuf::new(),
        }
    }

    pub fn tuning(name: impl Into<String>, cost_sink_path: impl Into<PathBuf>) -> Self {
        Self {
            active: true,
            name: name.into(),
            cost_sink_path: cost_sink_path.into(),
        }
    }
}

/// Destination of `(run name, cycles)` pairs.
pub trait CostSink: Send + Sync {
    /// Short name used in logs and errors.
    fn kind(&self) -> &'static str;

    fn record(&self, path: &Path, run_name: &str, cost: u64) -> Result<(), ReportingError>;
}

impl<S: CostSink + ?Sized> CostSink for Arc<S> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    fn record(&self, path: &Path, run_name: &str, cost: u64) -> Result<(), ReportingError> {
        (**self).record(path, run_name, cost)
    }
}

/// `{"run name": cycles, ...}`, rewritten on every record.
///
/// A missing file starts an empty record; keys are kept sorted. Writers in
/// one process take turns, and each rewrite replaces the file atomically so
/// readers never observe a partial record.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordSink;

impl JsonRecordSink {
    /// Read the current record; a missing file is an empty record.
    pub fn read(path: &Path) -> Result<BTreeMap<String, u64>, ReportingError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(ReportingError::Unwritable {
                    sink: "metrics",
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text).map_err(|err| ReportingError::Malformed {
            sink: "metrics",
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    fn write(path: &Path, record: &BTreeMap<String, u64>) -> anyhow::Result<()> {
        ensure_parent(path)?;
        let mut text = serde_json::to_string_pretty(record).context("serialize metrics record")?;
        text.push('\n');
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("stage record in {}", dir.display()))?;
        staged
            .write_all(text.as_bytes())
            .and_then(|()| staged.flush())
            .with_context(|| format!("write staged record for {}", path.display()))?;
        staged
            .persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }
}

impl CostSink for JsonRecordSink {
    fn kind(&self) -> &'static str {
        "metrics"
    }

    fn record(&self, path: &Path, run_name: &str, cost: u64) -> Result<(), ReportingError> {
        let _guard = RECORD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut record = Self::read(path)?;
        record.insert(run_name.to_string(), cost);
        Self::write(path, &record).map_err(|err| ReportingError::Unwritable {
            sink: self.kind(),
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })
    }
}

#[derive(Serialize)]
struct CostEntry<'a> {
    name: &'a str,
    cost: u64,
}

/// Appends one `{"name": .., "cost": ..}` line per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostLogSink;

impl CostLogSink {
    fn append(path: &Path, run_name: &str, cost: u64) -> anyhow::Result<()> {
        ensure_parent(path)?;
        let line = serde_json::to_string(&CostEntry {
            name: run_name,
            cost,
        })
        .context("serialize cost entry")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        writeln!(file, "{line}").with_context(|| format!("append to {}", path.display()))
    }
}

impl CostSink for CostLogSink {
    fn kind(&self) -> &'static str {
        "cost"
    }

    fn record(&self, path: &Path, run_name: &str, cost: u64) -> Result<(), ReportingError> {
        if path.as_os_str().is_empty() {
            return Err(ReportingError::Unwritable {
                sink: self.kind(),
                path: path.to_path_buf(),
                message: "tuning is active but no cost sink path was given".into(),
            });
        }
        Self::append(path, run_name, cost).map_err(|err| ReportingError::Unwritable {
            sink: self.kind(),
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })
    }
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display())),
        _ => Ok(()),
    }
}

/// Where the metrics artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportingConfig {
    metrics_path: PathBuf,
}

impl ReportingConfig {
    pub fn new(metrics_path: impl Into<PathBuf>) -> Self {
        Self {
            metrics_path: metrics_path.into(),
        }
    }

    /// `$STONNE_BRIDGE_METRICS`, else a file under the OS temp directory.
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var_os(METRICS_ENV).map(PathBuf::from))
    }

    fn from_env_value(value: Option<PathBuf>) -> Self {
        match value {
            Some(path) if !path.as_os_str().is_empty() => Self::new(path),
            _ => Self::new(std::env::temp_dir().join(DEFAULT_METRICS_FILE)),
        }
    }

    pub fn metrics_path(&self) -> &Path {
        &self.metrics_path
    }
}

/// Result of one sink write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    /// Not attempted (cost sink outside a tuning pass).
    Skipped,
    Recorded,
    Failed(ReportingError),
}

impl SinkOutcome {
    fn from_result(result: Result<(), ReportingError>) -> Self {
        match result {
            Ok(()) => SinkOutcome::Recorded,
            Err(err) => {
                warn!(error = %err, "cycle report not recorded");
                SinkOutcome::Failed(err)
            }
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, SinkOutcome::Recorded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub layer: String,
    pub run_name: String,
    pub cycles: u64,
    pub cost: SinkOutcome,
    pub metrics: SinkOutcome,
}

/// Forwards cycle counts to the cost and metrics sinks.
pub struct MetricsReporter {
    config: ReportingConfig,
    metrics_sink: Box<dyn CostSink>,
    cost_sink: Box<dyn CostSink>,
}

impl MetricsReporter {
    /// JSON record for metrics, JSON lines for tuning costs.
    pub fn new(config: ReportingConfig) -> Self {
        Self::with_sinks(config, Box::new(JsonRecordSink), Box::new(CostLogSink))
    }

    pub fn from_env() -> Self {
        Self::new(ReportingConfig::from_env())
    }

    pub fn with_sinks(
        config: ReportingConfig,
        metrics_sink: Box<dyn CostSink>,
        cost_sink: Box<dyn CostSink>,
    ) -> Self {
        Self {
            config,
            metrics_sink,
            cost_sink,
        }
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    /// Record one simulated layer. The cost sink is written only while
    /// tuning; the metrics sink exactly once per call.
    pub fn report(&self, layer_tag: &str, cycles: u64, tuning: &TuningContext) -> ReportSummary {
        info!(layer = layer_tag, run = %tuning.name, cycles, tuning = tuning.active, "simulated layer");

        let cost = if tuning.active {
            SinkOutcome::from_result(self.cost_sink.record(
                &tuning.cost_sink_path,
                &tuning.name,
                cycles,
            ))
        } else {
            SinkOutcome::Skipped
        };
        let metrics = SinkOutcome::from_result(self.metrics_sink.record(
            self.config.metrics_path(),
            &tuning.name,
            cycles,
        ));

        ReportSummary {
            layer: layer_tag.to_string(),
            run_name: tuning.name.clone(),
            cycles,
            cost,
            metrics,
        }
    }
}

impl std::fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("config", &self.config)
            .field("metrics_sink", &self.metrics_sink.kind())
            .field("cost_sink", &self.cost_sink.kind())
            .finish()
    }
}
