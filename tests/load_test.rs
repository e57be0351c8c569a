use das_sampling::{LatencySummary, Role};
use das_simulator::{Config, Simulation, SimulationReport};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
struct LoadTestConfig {
    validators: usize,
    non_validators: usize,
    row_count: usize,
    parcel_size: usize,
    blocks: u64,
    failure_rate: f64,
    block_timeout: Duration,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            validators: 8,
            non_validators: 8,
            row_count: 16,
            parcel_size: 4,
            blocks: 3,
            failure_rate: 0.0,
            block_timeout: Duration::from_secs(30),
        }
    }
}

async fn run_load_test(load: LoadTestConfig) -> SimulationReport {
    let mut config = Config::default();
    config.peers.builders = 1;
    config.peers.validators = load.validators;
    config.peers.non_validators = load.non_validators;
    config.simulation.row_count = load.row_count;
    config.simulation.parcel_size = load.parcel_size;
    config.simulation.blocks = load.blocks;
    config.simulation.block_timeout_ms = load.block_timeout.as_millis() as u64;
    config.simulation.step_interval_ms = 5;
    config.simulation.seed = Some(2024);
    config.store.min_latency_ms = 1;
    config.store.max_latency_ms = 20;
    config.store.failure_rate = load.failure_rate;

    let simulation = Simulation::new(config)
        .unwrap()
        .with_event_sink(std::sync::Arc::new(das_sampling::NoopEventSink));
    let (_tx, rx) = watch::channel(false);
    simulation.run(rx).await.unwrap()
}

fn assert_ordered(summary: &LatencySummary) {
    assert!(summary.min <= summary.p50);
    assert!(summary.p50 <= summary.p95);
    assert!(summary.p95 <= summary.p99);
    assert!(summary.p99 <= summary.max);
}

#[tokio::test(start_paused = true)]
async fn test_many_samplers_one_builder() {
    let load = LoadTestConfig::default();
    let report = run_load_test(load.clone()).await;

    assert!(!report.interrupted);

    let validators = report.role(Role::Validator).unwrap();
    assert_eq!(validators.peers, load.validators);
    assert_eq!(validators.blocks_completed, load.validators * load.blocks as usize);
    assert_eq!(
        validators.stats.row_sampling.count,
        load.validators * load.blocks as usize
    );
    assert_ordered(&validators.stats.get_latency);
    assert!(validators.stats.get_latency.max <= Duration::from_millis(20));

    let regular = report.role(Role::NonValidator).unwrap();
    assert_eq!(
        regular.stats.random_sampling.count,
        load.non_validators * load.blocks as usize
    );
    assert_ordered(&regular.stats.random_sampling);

    let builder = report.role(Role::Builder).unwrap();
    // 16 rows and 16 columns, 4 parcels each
    assert_eq!(builder.stats.total_put_messages, 128 * load.blocks);
}

#[tokio::test(start_paused = true)]
async fn test_failure_injection_keeps_accounting_consistent() {
    let report = run_load_test(LoadTestConfig {
        failure_rate: 0.2,
        ..LoadTestConfig::default()
    })
    .await;

    for role in &report.roles {
        let stats = &role.stats;
        assert!(stats.total_failed_puts <= stats.total_put_messages);
        assert_eq!(
            stats.total_failed_gets + stats.total_success_gets,
            stats.total_get_messages
        );
        assert_eq!(stats.get_latency.count as u64, stats.total_get_messages);
        assert_eq!(stats.put_latency.count as u64, stats.total_put_messages);
    }

    let builder = report.role(Role::Builder).unwrap();
    assert!(builder.stats.total_failed_puts > 0);
    assert_eq!(
        builder.stats.total_put_messages - builder.stats.total_failed_puts,
        128 * 3
    );

    // Retries eventually succeed: every block completes despite drops
    assert!(!report.interrupted);
    assert!(report.peers.iter().all(|p| p.blocks_abandoned == 0));
}

#[tokio::test(start_paused = true)]
async fn test_tight_deadline_abandons_blocks() {
    let report = run_load_test(LoadTestConfig {
        validators: 2,
        non_validators: 2,
        block_timeout: Duration::from_millis(50),
        ..LoadTestConfig::default()
    })
    .await;

    // 128 puts cannot fit in 50ms at a 5ms step interval
    let builder = report.role(Role::Builder).unwrap();
    assert_eq!(builder.blocks_completed, 0);
    assert_eq!(builder.blocks_abandoned, 3);
    assert_eq!(builder.stats.seeding.count, 0);

    // Abandoned blocks still advance every engine to the end
    assert!(!report.interrupted);
    assert!(report.peers.iter().all(|p| p.finished));
}
