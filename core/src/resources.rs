//! Periodic process resource usage sampling
//!
//! While active, a background thread appends one fixed-width row per period:
//! elapsed time, CPU usage, allocator statistics, max RSS and virtual size.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{BenchError, BenchResult};
use crate::report::push_column;

const WIDE: usize = 15;
const NARROW: usize = 10;

/// One resource sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Resources {
    /// Milliseconds since logging started
    pub elapsed_ms: u64,
    /// CPU usage over the whole logging window, as a share of all cores
    pub cpu_usage: f64,
    /// Allocator arena size
    pub mem_arena_kb: u64,
    /// Allocated bytes in use
    pub mem_in_use_kb: u64,
    /// Allocator mmap'd bytes
    pub mem_mmap_kb: u64,
    /// Maximum resident set size
    pub mem_max_rss_kb: i64,
    /// Virtual memory size, `-1` when unavailable
    pub mem_virtual_kb: i64,
}

#[derive(Debug, Clone, Copy)]
struct ResourceSystemInfo {
    pubs: usize,
    subs: usize,
    frequency: f32,
}

struct Sampler {
    start: Instant,
    cpu_start: Duration,
    cores: usize,
}

impl Sampler {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            cpu_start: process_cpu_time(),
            cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    fn sample(&self) -> Resources {
        let wall = self.start.elapsed();
        let cpu = process_cpu_time().saturating_sub(self.cpu_start);
        let cpu_usage = if wall.is_zero() {
            0.0
        } else {
            cpu.as_secs_f64() / (wall.as_secs_f64() * self.cores as f64) * 100.0
        };
        let (arena, in_use, mmap) = allocator_stats();

        Resources {
            elapsed_ms: wall.as_millis() as u64,
            cpu_usage,
            mem_arena_kb: arena >> 10,
            mem_in_use_kb: in_use >> 10,
            mem_mmap_kb: mmap >> 10,
            mem_max_rss_kb: max_rss_kb(),
            mem_virtual_kb: virtual_size_kb(),
        }
    }
}

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Samples process resource usage into a file at a fixed period
pub struct ResourceUsageLogger {
    path: PathBuf,
    system_info: Option<ResourceSystemInfo>,
    last: Arc<Mutex<Resources>>,
    running: Option<Running>,
}

impl ResourceUsageLogger {
    /// Create an inactive logger writing to `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            system_info: None,
            last: Arc::new(Mutex::new(Resources::default())),
            running: None,
        }
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the sampling thread is running
    pub fn is_logging(&self) -> bool {
        self.running.is_some()
    }

    /// Label the rows with the topology size; only allowed before `start`
    pub fn set_system_info(&mut self, pubs: usize, subs: usize, frequency: f32) -> BenchResult<()> {
        if self.is_logging() {
            return Err(BenchError::SystemInfoLocked);
        }
        self.system_info = Some(ResourceSystemInfo {
            pubs,
            subs,
            frequency,
        });
        Ok(())
    }

    /// Start sampling every `period`
    ///
    /// If the file cannot be opened the error is logged and the logger stays
    /// inactive.
    pub fn start(&mut self, period: Duration) {
        if self.is_logging() {
            tracing::warn!(path = %self.path.display(), "Resource logger already running");
            return;
        }

        let mut writer = match File::create(&self.path) {
            Ok(file) => BufWriter::new(file),
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not open resource usage file, not logging"
                );
                return;
            }
        };

        let info = self.system_info;
        let header_written = writeln!(writer, "{}", header_line(info.as_ref()))
            .and_then(|_| writeln!(writer, "{}", row_line(&Resources::default(), info.as_ref())))
            .and_then(|_| writer.flush());
        if let Err(e) = header_written {
            tracing::error!(path = %self.path.display(), error = %e, "Could not write resource usage header");
            return;
        }

        let period = if period.is_zero() {
            Duration::from_millis(1)
        } else {
            period
        };
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let last = Arc::clone(&self.last);
        let path = self.path.clone();
        let sampler = Sampler::new();

        let spawned = std::thread::Builder::new()
            .name("resource-logger".to_string())
            .spawn(move || {
                let mut tick: u32 = 1;
                loop {
                    let deadline = sampler.start + period * tick;
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(timeout) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let resources = sampler.sample();
                    *last.lock() = resources;
                    let written = writeln!(writer, "{}", row_line(&resources, info.as_ref()))
                        .and_then(|_| writer.flush());
                    if let Err(e) = written {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to write resource sample");
                        break;
                    }
                    tick += 1;
                }
                tracing::debug!(samples = tick - 1, "Resource logger stopped");
            });

        match spawned {
            Ok(handle) => {
                tracing::info!(
                    path = %self.path.display(),
                    period_ms = period.as_millis() as u64,
                    "Resource usage logging started"
                );
                self.running = Some(Running { stop_tx, handle });
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn resource logger thread");
            }
        }
    }

    /// Stop sampling and wait for the thread to finish
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(());
            if running.handle.join().is_err() {
                tracing::error!("Resource logger thread panicked");
            }
        }
    }

    /// Most recent sample
    pub fn last_sample(&self) -> Resources {
        *self.last.lock()
    }

    /// Print the header and the most recent sample to stdout
    pub fn print_resource_usage(&self) {
        let info = self.system_info.as_ref();
        println!("{}", header_line(info));
        println!("{}", row_line(&self.last_sample(), info));
    }
}

impl Drop for ResourceUsageLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ResourceUsageLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceUsageLogger")
            .field("path", &self.path)
            .field("logging", &self.is_logging())
            .finish()
    }
}

fn header_line(info: Option<&ResourceSystemInfo>) -> String {
    let mut line = String::new();
    push_column(&mut line, "time[ms]", WIDE);
    push_column(&mut line, "cpu[%]", NARROW);
    for name in ["arena[KB]", "in_use[KB]", "mmap[KB]", "rss[KB]", "vsz[KB]"] {
        push_column(&mut line, name, WIDE);
    }
    if info.is_some() {
        for name in ["pubs", "subs", "frequency"] {
            push_column(&mut line, name, WIDE);
        }
    }
    line.trim_end().to_string()
}

fn row_line(resources: &Resources, info: Option<&ResourceSystemInfo>) -> String {
    let mut line = String::new();
    push_column(&mut line, resources.elapsed_ms, WIDE);
    push_column(&mut line, format!("{:.2}", resources.cpu_usage), NARROW);
    push_column(&mut line, resources.mem_arena_kb, WIDE);
    push_column(&mut line, resources.mem_in_use_kb, WIDE);
    push_column(&mut line, resources.mem_mmap_kb, WIDE);
    push_column(&mut line, resources.mem_max_rss_kb, WIDE);
    push_column(&mut line, resources.mem_virtual_kb, WIDE);
    if let Some(info) = info {
        push_column(&mut line, info.pubs, WIDE);
        push_column(&mut line, info.subs, WIDE);
        push_column(&mut line, format!("{:.6}", info.frequency), WIDE);
    }
    line.trim_end().to_string()
}

// ============================================================================
// Platform probes
// ============================================================================

#[cfg(unix)]
fn rusage() -> Option<libc::rusage> {
    // SAFETY: getrusage only writes into the zeroed struct we pass it.
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        (libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0).then_some(usage)
    }
}

#[cfg(unix)]
fn process_cpu_time() -> Duration {
    fn to_duration(tv: libc::timeval) -> Duration {
        Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
    }
    rusage()
        .map(|usage| to_duration(usage.ru_utime) + to_duration(usage.ru_stime))
        .unwrap_or_default()
}

#[cfg(not(unix))]
fn process_cpu_time() -> Duration {
    Duration::ZERO
}

#[cfg(unix)]
fn max_rss_kb() -> i64 {
    rusage().map(|usage| usage.ru_maxrss as i64).unwrap_or(-1)
}

#[cfg(not(unix))]
fn max_rss_kb() -> i64 {
    -1
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn allocator_stats() -> (u64, u64, u64) {
    // SAFETY: mallinfo2 takes no arguments and returns a plain struct.
    let info = unsafe { libc::mallinfo2() };
    (info.arena as u64, info.uordblks as u64, info.hblkhd as u64)
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn allocator_stats() -> (u64, u64, u64) {
    (0, 0, 0)
}

#[cfg(unix)]
fn virtual_size_kb() -> i64 {
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return -1;
    };
    let Some(pages) = statm.split_whitespace().next().and_then(|v| v.parse::<i64>().ok()) else {
        return -1;
    };
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return -1;
    }
    (pages * page_size as i64) >> 10
}

#[cfg(not(unix))]
fn virtual_size_kb() -> i64 {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_zero_row_written_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.txt");

        let mut logger = ResourceUsageLogger::new(&path);
        logger.start(Duration::from_secs(60));
        assert!(logger.is_logging());
        logger.stop();
        assert!(!logger.is_logging());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("time[ms]       cpu[%]    arena[KB]"));
        assert!(lines[1].starts_with("0 "));
    }

    #[test]
    fn test_samples_are_appended_each_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.txt");

        let mut logger = ResourceUsageLogger::new(&path);
        logger.start(Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(110));
        logger.stop();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.lines().count() >= 4);
        assert!(logger.last_sample().elapsed_ms >= 20);
    }

    #[test]
    fn test_system_info_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.txt");

        let mut logger = ResourceUsageLogger::new(&path);
        logger.set_system_info(2, 10, 100.0).unwrap();
        logger.start(Duration::from_secs(60));
        assert!(matches!(
            logger.set_system_info(1, 1, 1.0),
            Err(BenchError::SystemInfoLocked)
        ));
        logger.stop();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].ends_with("frequency"));
        assert!(lines[1].ends_with("100.000000"));
    }

    fn sample_for(path: &std::path::Path, info: Option<(usize, usize, f32)>) -> Vec<String> {
        let mut logger = ResourceUsageLogger::new(path);
        if let Some((pubs, subs, frequency)) = info {
            logger.set_system_info(pubs, subs, frequency).unwrap();
        }
        logger.start(Duration::from_millis(15));
        std::thread::sleep(Duration::from_millis(80));
        logger.stop();

        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_every_row_has_header_column_count() {
        let dir = tempfile::tempdir().unwrap();

        let lines = sample_for(&dir.path().join("plain.txt"), None);
        assert!(lines.len() >= 3);
        for line in &lines {
            assert_eq!(line.split_whitespace().count(), 7, "row: {line}");
        }

        let lines = sample_for(&dir.path().join("info.txt"), Some((3, 7, 50.0)));
        assert!(lines.len() >= 3);
        assert_eq!(lines[0].split_whitespace().count(), 10);
        for line in &lines[1..] {
            let fields: Vec<&str> = line.split_whitespace().collect();
            assert_eq!(fields.len(), 10, "row: {line}");
            assert_eq!(fields[7..], ["3", "7", "50.000000"]);
        }
    }

    #[test]
    fn test_unwritable_path_stays_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ResourceUsageLogger::new(dir.path().join("missing").join("r.txt"));
        logger.start(Duration::from_millis(10));
        assert!(!logger.is_logging());
        logger.stop();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_virtual_size_is_available_on_linux() {
        assert!(virtual_size_kb() > 0);
        assert!(max_rss_kb() > 0);
    }
}
