//! Fixed-width latency reports and comparison of persisted results

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::SystemInfo;
use crate::error::{BenchError, BenchResult};
use crate::tracker::TrackerStats;
use crate::traits::EndpointKind;

const NAME_WIDTH: usize = 24;
const KIND_WIDTH: usize = 12;
const COUNT_WIDTH: usize = 12;
const VALUE_WIDTH: usize = 15;

/// Append `value` left-justified in a field of `width` characters
///
/// Values wider than the field still get one separating space, so rows can
/// always be split on whitespace.
pub fn push_column(line: &mut String, value: impl Display, width: usize) {
    let cell = value.to_string();
    line.push_str(&format!("{:<width$}", cell, width = width));
    if cell.len() >= width {
        line.push(' ');
    }
}

/// Latency of one node's endpoints of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    /// Node name
    pub node: String,
    /// Endpoint kind
    pub kind: EndpointKind,
    /// Number of endpoints merged into this row
    pub endpoints: usize,
    /// Merged tracker statistics
    pub stats: TrackerStats,
}

/// Latency of every endpoint of one kind across the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalRow {
    /// Endpoint kind
    pub kind: EndpointKind,
    /// Nodes contributing at least one endpoint
    pub nodes: usize,
    /// Number of endpoints merged into this row
    pub endpoints: usize,
    /// Merged tracker statistics
    pub stats: TrackerStats,
}

/// Per-node and system-wide latency tables
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyReport {
    /// One row per node and endpoint kind
    pub node_rows: Vec<NodeRow>,
    /// One row per endpoint kind
    pub total_rows: Vec<TotalRow>,
    /// Discovery outcome label (`complete`, `incomplete`, `skipped`, `pending`)
    pub discovery: String,
    /// Labels for comparing runs
    pub system_info: Option<SystemInfo>,
}

fn push_stats(line: &mut String, stats: &TrackerStats) {
    push_column(line, stats.received, COUNT_WIDTH);
    push_column(line, stats.late, COUNT_WIDTH);
    push_column(line, stats.too_late, COUNT_WIDTH);
    push_column(line, stats.lost, COUNT_WIDTH);
    push_column(line, format!("{:.2}", stats.latency.mean), VALUE_WIDTH);
    push_column(line, format!("{:.2}", stats.latency.stddev()), VALUE_WIDTH);
    push_column(line, format!("{:.2}", stats.latency.min), VALUE_WIDTH);
    push_column(line, format!("{:.2}", stats.latency.max), VALUE_WIDTH);
}

fn push_stats_header(line: &mut String) {
    for name in ["received", "late", "too_late", "lost"] {
        push_column(line, name, COUNT_WIDTH);
    }
    for name in ["mean[us]", "sd[us]", "min[us]", "max[us]"] {
        push_column(line, name, VALUE_WIDTH);
    }
}

impl LatencyReport {
    /// Header plus one line per node row
    pub fn all_stats_table(&self) -> String {
        let mut header = String::new();
        push_column(&mut header, "node", NAME_WIDTH);
        push_column(&mut header, "kind", KIND_WIDTH);
        push_column(&mut header, "endpoints", COUNT_WIDTH);
        push_stats_header(&mut header);

        let mut out = vec![header.trim_end().to_string()];
        for row in &self.node_rows {
            let mut line = String::new();
            push_column(&mut line, &row.node, NAME_WIDTH);
            push_column(&mut line, row.kind, KIND_WIDTH);
            push_column(&mut line, row.endpoints, COUNT_WIDTH);
            push_stats(&mut line, &row.stats);
            out.push(line.trim_end().to_string());
        }
        out.join("\n") + "\n"
    }

    /// Header plus one line per endpoint kind
    pub fn total_stats_table(&self) -> String {
        let mut header = String::new();
        push_column(&mut header, "kind", KIND_WIDTH);
        push_column(&mut header, "nodes", COUNT_WIDTH);
        push_column(&mut header, "endpoints", COUNT_WIDTH);
        push_stats_header(&mut header);
        push_column(&mut header, "discovery", KIND_WIDTH);
        if self.system_info.is_some() {
            for name in ["pubs", "subs", "frequency", "msg_size"] {
                push_column(&mut header, name, VALUE_WIDTH);
            }
        }

        let mut out = vec![header.trim_end().to_string()];
        for row in &self.total_rows {
            let mut line = String::new();
            push_column(&mut line, row.kind, KIND_WIDTH);
            push_column(&mut line, row.nodes, COUNT_WIDTH);
            push_column(&mut line, row.endpoints, COUNT_WIDTH);
            push_stats(&mut line, &row.stats);
            push_column(&mut line, &self.discovery, KIND_WIDTH);
            if let Some(info) = &self.system_info {
                push_column(&mut line, info.pubs, VALUE_WIDTH);
                push_column(&mut line, info.subs, VALUE_WIDTH);
                push_column(&mut line, format!("{:.6}", info.frequency), VALUE_WIDTH);
                push_column(&mut line, info.msg_size, VALUE_WIDTH);
            }
            out.push(line.trim_end().to_string());
        }
        out.join("\n") + "\n"
    }

    /// Write the per-node table
    pub fn write_all_stats(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(self.all_stats_table().as_bytes())
    }

    /// Write the system-wide table
    pub fn write_total_stats(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(self.total_stats_table().as_bytes())
    }
}

// ============================================================================
// Persisted results
// ============================================================================

/// Metrics shown when comparing persisted results
const COMPARED_METRICS: [&str; 8] = [
    "received", "late", "too_late", "lost", "mean[us]", "sd[us]", "min[us]", "max[us]",
];

/// A total-stats file read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTotals {
    /// Label (file stem)
    pub label: String,
    /// Column values per endpoint kind
    pub rows: BTreeMap<EndpointKind, BTreeMap<String, String>>,
}

impl PersistedTotals {
    /// Parse a file written by `save_latency_total_stats`
    pub fn load(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&label, &content).map_err(|reason| BenchError::report_parse(path, reason))
    }

    /// Parse total-stats text
    pub fn parse(label: &str, content: &str) -> Result<Self, String> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header: Vec<&str> = lines
            .next()
            .ok_or_else(|| "empty report".to_string())?
            .split_whitespace()
            .collect();
        if header.first() != Some(&"kind") {
            return Err(format!("unexpected header starting with {:?}", header.first()));
        }

        let mut rows = BTreeMap::new();
        for (idx, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != header.len() {
                return Err(format!(
                    "row {} has {} fields, header has {}",
                    idx + 1,
                    fields.len(),
                    header.len()
                ));
            }
            let kind: EndpointKind = fields[0].parse()?;
            let values = header
                .iter()
                .zip(&fields)
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            rows.insert(kind, values);
        }

        Ok(Self {
            label: label.to_string(),
            rows,
        })
    }
}

/// Side-by-side comparison of several persisted results, one table per kind
pub fn comparison_table(results: &[PersistedTotals]) -> String {
    let mut kinds: Vec<EndpointKind> = results
        .iter()
        .flat_map(|r| r.rows.keys().copied())
        .collect();
    kinds.sort();
    kinds.dedup();

    let mut out = String::new();
    for kind in kinds {
        out.push_str(&format!("[{}]\n", kind));

        let mut header = String::new();
        push_column(&mut header, "metric", KIND_WIDTH);
        for result in results {
            push_column(&mut header, &result.label, NAME_WIDTH);
        }
        out.push_str(header.trim_end());
        out.push('\n');

        for metric in COMPARED_METRICS {
            let mut line = String::new();
            push_column(&mut line, metric, KIND_WIDTH);
            for result in results {
                let value = result
                    .rows
                    .get(&kind)
                    .and_then(|row| row.get(metric))
                    .map(String::as_str)
                    .unwrap_or("-");
                push_column(&mut line, value, NAME_WIDTH);
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out.push('\n');
    }
    out
}
