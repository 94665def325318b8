//! Subcommand implementations

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pubsub_bench_core::{
    AssignmentPolicy, DiscoveryConfig, DiscoveryTimeoutPolicy, ExecutorModel, System,
    SystemBuilder, SystemConfig, TrackerOptions,
};
use pubsub_bench_topology::{MessageRegistry, NodeFactory, TopologyDescription};
use pubsub_bench_transport::{Domain, DomainConfig};

use super::{Commands, ExecutorArg};

/// Run the selected subcommand
pub fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            topology,
            duration,
            executor,
            threads,
            shared,
            output,
            events,
            resources,
            resource_period_ms,
            no_discovery,
            max_discovery_secs,
            abort_on_discovery_timeout,
            pdp_delay_ms,
            edp_delay_ms,
            no_thread_names,
        } => {
            let model = match executor {
                ExecutorArg::Single => ExecutorModel::SingleThreaded,
                ExecutorArg::Multi => ExecutorModel::MultiThreaded { threads },
            };
            let assignment = if shared {
                AssignmentPolicy::Shared
            } else {
                AssignmentPolicy::Dedicated
            };
            let policy = if abort_on_discovery_timeout {
                DiscoveryTimeoutPolicy::Abort
            } else {
                DiscoveryTimeoutPolicy::Proceed
            };
            let config = SystemConfig::new(model)
                .with_assignment(assignment)
                .with_discovery(
                    DiscoveryConfig::default()
                        .with_max_wait(Duration::from_secs(max_discovery_secs))
                        .with_timeout_policy(policy),
                )
                .with_resource_period(Duration::from_millis(resource_period_ms));
            let domain = DomainConfig {
                pdp_delay: Duration::from_millis(pdp_delay_ms),
                edp_delay: Duration::from_millis(edp_delay_ms),
                ..Default::default()
            };

            run(RunArgs {
                topology,
                duration: Duration::from_secs(duration),
                config,
                domain,
                output,
                events,
                resources,
                wait_for_discovery: !no_discovery,
                name_threads: !no_thread_names,
            })
        }
        Commands::Compare { files } => {
            System::print_aggregate_stats(files.as_slice()).context("Failed to compare results")
        }
        Commands::Validate { topology } => validate(&topology),
    }
}

struct RunArgs {
    topology: PathBuf,
    duration: Duration,
    config: SystemConfig,
    domain: DomainConfig,
    output: PathBuf,
    events: bool,
    resources: bool,
    wait_for_discovery: bool,
    name_threads: bool,
}

fn run(args: RunArgs) -> Result<()> {
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory {}", args.output.display()))?;

    let factory = NodeFactory::new(Domain::new(args.domain));
    let (nodes, info) = factory
        .load_topology(&args.topology, TrackerOptions::default())
        .with_context(|| format!("Failed to load topology {}", args.topology.display()))?;

    let mut builder = SystemBuilder::new()
        .config(args.config)
        .nodes(nodes)
        .system_info(info);
    if args.events {
        builder = builder.events_logger(args.output.join("events.txt"));
    }
    if args.resources {
        builder = builder.resource_logger(args.output.join("resources.txt"));
    }
    let mut system = builder.build().context("Failed to build system")?;

    tracing::info!(
        topology = %args.topology.display(),
        duration_s = args.duration.as_secs(),
        executors = system.executors().len(),
        "Starting experiment"
    );

    let summary = system
        .spin(args.duration, args.wait_for_discovery, args.name_threads)
        .context("Experiment failed")?;

    system.print_latency_all_stats();
    system.print_latency_total_stats();
    if args.resources {
        system.print_resource_usage();
    }

    save_reports(&system, &args.output);

    tracing::info!(
        output = %args.output.display(),
        callbacks = summary.totals.total_callbacks,
        errors = summary.totals.total_errors,
        discovery = summary.discovery.label(),
        "Experiment finished"
    );
    Ok(())
}

/// Write every report into `dir`; a report that cannot be written does not
/// prevent the others. Returns the number of failed writes.
fn save_reports(system: &System, dir: &Path) -> usize {
    let saves = [
        ("latency_all.txt", system.save_latency_all_stats(dir.join("latency_all.txt"))),
        ("latency_total.txt", system.save_latency_total_stats(dir.join("latency_total.txt"))),
        ("summary.json", system.save_run_summary(dir.join("summary.json"))),
    ];
    let mut failed = 0;
    for (file, result) in saves {
        if let Err(e) = result {
            tracing::error!(file, error = %e, "Failed to save report");
            failed += 1;
        }
    }
    failed
}

fn validate(path: &Path) -> Result<()> {
    let description = TopologyDescription::from_file(path)
        .with_context(|| format!("Invalid topology {}", path.display()))?;
    let info = description
        .system_info(&MessageRegistry::new())
        .with_context(|| format!("Invalid topology {}", path.display()))?;

    println!(
        "{}: {} nodes, {} publishers, {} subscribers, {:.2} Hz, {} bytes",
        path.display(),
        description.nodes.len(),
        info.pubs,
        info.subs,
        info.frequency,
        info.msg_size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_system() -> System {
        let mut system = System::new(ExecutorModel::SingleThreaded);
        system.spin(Duration::from_millis(10), false, false).unwrap();
        system
    }

    #[test]
    fn test_save_reports_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(save_reports(&finished_system(), dir.path()), 0);
        for file in ["latency_all.txt", "latency_total.txt", "summary.json"] {
            assert!(dir.path().join(file).is_file(), "{file} missing");
        }
    }

    #[test]
    fn test_failed_report_does_not_skip_the_others() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in the way makes the first write fail
        std::fs::create_dir(dir.path().join("latency_all.txt")).unwrap();

        assert_eq!(save_reports(&finished_system(), dir.path()), 1);
        assert!(dir.path().join("latency_total.txt").is_file());
        assert!(dir.path().join("summary.json").is_file());
    }
}
