//! 健康跟踪器基准测试
//!
//! 测试结果记录、状态迁移和事件序列化的开销

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::time::Duration;
use watchdog::config::{Config, ConfigLoader, Thresholds, TomlConfigLoader};
use watchdog::health::{HealthState, HealthTracker, ProbeResult, TransitionEvent};

/// 稳定健康时的记录开销
fn tracker_record_benchmark(c: &mut Criterion) {
    let success = ProbeResult::success("api").with_latency(Duration::from_millis(12));

    c.bench_function("tracker_record_success", |b| {
        let mut tracker = HealthTracker::new("api", Thresholds::default());
        b.iter(|| black_box(tracker.record(black_box(&success))));
    });

    let failure = ProbeResult::failure("api", "HTTP 503 Service Unavailable");
    c.bench_function("tracker_flapping_cycle", |b| {
        let mut tracker = HealthTracker::new("api", Thresholds::new(2, 3, 1));
        b.iter(|| {
            for _ in 0..3 {
                black_box(tracker.record(&failure));
            }
            black_box(tracker.record(&success))
        });
    });
}

/// 迁移事件序列化
fn transition_serialization_benchmark(c: &mut Criterion) {
    let event = TransitionEvent::new(
        Some(HealthState::Healthy),
        HealthState::Degraded,
        ProbeResult::failure("api", "connection refused")
            .with_latency(Duration::from_millis(3))
            .with_metadata("status_code", serde_json::json!(503)),
    );

    c.bench_function("transition_event_to_json", |b| {
        b.iter(|| black_box(event.to_json().unwrap()));
    });
}

/// 配置解析
fn config_parsing_benchmark(c: &mut Criterion) {
    let content = r#"
[global]
default_interval_seconds = 15

[[targets]]
name = "api"
probe = { kind = "http", url = "http://127.0.0.1:8080/health" }

[[targets]]
name = "db"
probe = { kind = "tcp", address = "127.0.0.1:5432" }
actions = [{ kind = "log", level = "error" }]
"#;
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let loader = TomlConfigLoader::new(false);

    c.bench_function("config_load_from_string", |b| {
        b.iter(|| {
            let config: Config = runtime
                .block_on(loader.load_from_string(black_box(content)))
                .unwrap();
            black_box(config)
        });
    });
}

criterion_group!(
    benches,
    tracker_record_benchmark,
    transition_serialization_benchmark,
    config_parsing_benchmark
);
criterion_main!(benches);
