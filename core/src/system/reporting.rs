//! Printing and persisting results

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{BenchError, BenchResult};
use crate::report::{comparison_table, PersistedTotals};

use super::runner::System;

fn write_file(path: &Path, content: &str) -> BenchResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(content.as_bytes())?;
    writer.flush()?;
    Ok(())
}

impl System {
    /// Print one latency row per node and endpoint kind
    pub fn print_latency_all_stats(&self) {
        print!("{}", self.latency_report().all_stats_table());
    }

    /// Write one latency row per node and endpoint kind to `path`
    pub fn save_latency_all_stats(&self, path: impl AsRef<Path>) -> BenchResult<()> {
        let path = path.as_ref();
        write_file(path, &self.latency_report().all_stats_table())?;
        tracing::info!(path = %path.display(), "Saved per-node latency statistics");
        Ok(())
    }

    /// Print one latency row per endpoint kind
    pub fn print_latency_total_stats(&self) {
        print!("{}", self.latency_report().total_stats_table());
    }

    /// Write one latency row per endpoint kind to `path`
    pub fn save_latency_total_stats(&self, path: impl AsRef<Path>) -> BenchResult<()> {
        let path = path.as_ref();
        write_file(path, &self.latency_report().total_stats_table())?;
        tracing::info!(path = %path.display(), "Saved total latency statistics");
        Ok(())
    }

    /// Print the last resource sample, if resource logging was enabled
    pub fn print_resource_usage(&self) {
        match &self.resources {
            Some(resources) => resources.print_resource_usage(),
            None => tracing::warn!("Resource logging is not enabled"),
        }
    }

    /// Write the run summary as JSON
    pub fn save_run_summary(&self, path: impl AsRef<Path>) -> BenchResult<()> {
        let path = path.as_ref();
        let summary = self
            .summary
            .as_ref()
            .ok_or_else(|| BenchError::config("no run summary, spin has not completed"))?;
        let json = serde_json::to_string_pretty(summary)?;
        write_file(path, &json)?;
        tracing::info!(path = %path.display(), "Saved run summary");
        Ok(())
    }

    /// Comparison of previously saved total-stats files, one table per kind
    pub fn aggregate_stats_table<P: AsRef<Path>>(paths: &[P]) -> BenchResult<String> {
        if paths.is_empty() {
            return Err(BenchError::config("no result files to compare"));
        }
        let results = paths
            .iter()
            .map(|path| PersistedTotals::load(path))
            .collect::<BenchResult<Vec<_>>>()?;
        Ok(comparison_table(&results))
    }

    /// Print a comparison of previously saved total-stats files
    ///
    /// Reads only the given files; never the state of a live system.
    pub fn print_aggregate_stats<P: AsRef<Path>>(paths: &[P]) -> BenchResult<()> {
        print!("{}", Self::aggregate_stats_table(paths)?);
        Ok(())
    }
}
