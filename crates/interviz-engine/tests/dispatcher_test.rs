//! Integration tests for job dispatch, region isolation and cleanup

use futures::future::join_all;
use interviz_core::config::RegionPolicy;
use interviz_core::models::{Job, NativeCoord, RasterExtent, SunDateTime};
use interviz_core::{InterVizError, Result};
use interviz_engine::memory::{MemoryEngine, Operation};
use interviz_engine::{Dispatcher, DispatcherConfig, JobExecutor, Workspace};
use interviz_geo::transform::ToGeographic;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Identity;

impl ToGeographic for Identity {
    fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok((x, y))
    }
}

struct Harness {
    _dir: TempDir,
    engine: Arc<MemoryEngine>,
    workspace: Arc<Workspace>,
    dispatcher: Dispatcher,
}

async fn harness(policy: RegionPolicy, job_timeout: Duration, engine: MemoryEngine) -> Harness {
    let dir = TempDir::new().unwrap();
    let dem = dir.path().join("dem.tif");
    std::fs::write(&dem, b"dem").unwrap();
    let extent =
        RasterExtent::new(None, "LOCAL_CS[\"test\"]", [0.0, 0.0, 1000.0, 1000.0], 10.0, 10.0)
            .unwrap();

    let engine = Arc::new(engine);
    let workspace =
        Arc::new(Workspace::bootstrap(engine.as_ref(), dir.path(), &dem, extent).await.unwrap());
    let executor = Arc::new(JobExecutor::new(
        engine.clone(),
        workspace.clone(),
        Arc::new(Identity),
    ));
    let config = DispatcherConfig {
        pool_size: 4,
        queue_capacity: 8,
        job_timeout,
        region_policy: policy,
    };
    let dispatcher = Dispatcher::start(config, executor).unwrap();

    Harness {
        _dir: dir,
        engine,
        workspace,
        dispatcher,
    }
}

fn viewshed_at(x: f64, y: f64) -> Job {
    Job::viewshed(NativeCoord::new(x, y), 1.6, 0.0, 120.0)
}

fn sunmask_at(x: f64, y: f64) -> Job {
    let datetime = SunDateTime {
        year: 2024,
        month: 6,
        day: 21,
        hour: 18,
        minute: 15,
    };
    Job::sunmask(NativeCoord::new(x, y), datetime, 1, 150.0)
}

fn assert_clean(h: &Harness) {
    assert_eq!(h.engine.layer_count(), 0, "engine layers left behind");
    assert!(h.workspace.scratch_files().unwrap().is_empty(), "scratch files left behind");
    assert!(h.workspace.job_mapsets().unwrap().is_empty(), "job mapsets left behind");
    assert_eq!(h.workspace.shared_region().unwrap(), h.workspace.full_region());
}

#[tokio::test]
async fn test_concurrent_viewsheds_match_sequential_results() {
    for policy in [RegionPolicy::Isolated, RegionPolicy::Exclusive] {
        let engine = MemoryEngine::new();
        engine.delay(Operation::Viewshed, Duration::from_millis(20));
        let h = harness(policy, Duration::from_secs(30), engine).await;

        let points = [(200.0, 200.0), (500.0, 500.0), (800.0, 300.0), (300.0, 800.0)];

        let mut sequential = Vec::new();
        for (x, y) in points {
            let fc = h.dispatcher.submit(viewshed_at(x, y)).await.unwrap();
            sequential.push(serde_json::to_value(&fc).unwrap());
        }

        let concurrent: Vec<_> =
            join_all(points.iter().map(|(x, y)| h.dispatcher.submit(viewshed_at(*x, *y))))
                .await
                .into_iter()
                .map(|r| serde_json::to_value(r.unwrap()).unwrap())
                .collect();

        assert_eq!(sequential, concurrent, "{} policy", policy);
        assert!(h.engine.peak_concurrency() >= 2, "{} policy ran viewsheds serially", policy);
        assert_clean(&h);
    }
}

#[tokio::test]
async fn test_viewshed_never_observes_a_narrowed_region() {
    for policy in [RegionPolicy::Isolated, RegionPolicy::Exclusive] {
        let engine = MemoryEngine::new();
        engine.delay(Operation::Viewshed, Duration::from_millis(15));
        engine.delay(Operation::Sunmask, Duration::from_millis(40));
        let h = harness(policy, Duration::from_secs(30), engine).await;
        let full = h.workspace.full_region();

        let jobs = vec![
            viewshed_at(500.0, 500.0),
            sunmask_at(500.0, 500.0),
            viewshed_at(300.0, 300.0),
            sunmask_at(200.0, 700.0),
            viewshed_at(700.0, 700.0),
            viewshed_at(600.0, 200.0),
        ];
        let results = join_all(jobs.into_iter().map(|job| h.dispatcher.submit(job))).await;
        assert!(results.iter().all(|r| r.is_ok()), "{} policy: {:?}", policy, results);

        let observations = h.engine.observations();
        assert_eq!(observations.len(), 6);
        for observation in &observations {
            match observation.operation {
                Operation::Viewshed => {
                    assert_eq!(observation.region_at_start, full, "{} policy", policy);
                    assert_eq!(observation.region_at_end, full, "{} policy", policy);
                }
                Operation::Sunmask => {
                    assert_eq!(observation.region_at_start.width(), 300.0);
                    assert_eq!(observation.region_at_end, observation.region_at_start);
                }
                other => panic!("unexpected observation {:?}", other),
            }
        }
        assert_clean(&h);
    }
}

#[tokio::test]
async fn test_sunmask_result_is_limited_to_its_window() {
    let h = harness(RegionPolicy::Isolated, Duration::from_secs(30), MemoryEngine::new()).await;

    let fc = h.dispatcher.submit(sunmask_at(500.0, 500.0)).await.unwrap();
    assert_eq!(fc.features.len(), 1);

    let json = serde_json::to_value(&fc).unwrap();
    let ring = json["features"][0]["geometry"]["coordinates"][0].as_array().unwrap().clone();
    for position in ring {
        let x = position[0].as_f64().unwrap();
        let y = position[1].as_f64().unwrap();
        assert!((350.0..=650.0).contains(&x), "x = {}", x);
        assert!((350.0..=650.0).contains(&y), "y = {}", y);
    }
    assert_eq!(json["features"][0]["properties"]["sun"], 1.0);
}

#[tokio::test]
async fn test_failed_sunmask_restores_region_without_retry() {
    for policy in [RegionPolicy::Isolated, RegionPolicy::Exclusive] {
        let engine = MemoryEngine::new();
        engine.fail_on(Operation::Sunmask);
        let h = harness(policy, Duration::from_secs(30), engine).await;

        let err = h.dispatcher.submit(sunmask_at(500.0, 500.0)).await.unwrap_err();
        assert!(matches!(err, InterVizError::Computation { .. }));
        assert!(err.to_string().contains("r.sunmask"));
        assert_clean(&h);

        // the failure is not retried and does not poison later jobs
        h.engine.clear_failures();
        h.dispatcher.submit(viewshed_at(500.0, 500.0)).await.unwrap();
        assert_eq!(h.engine.observations().len(), 1);

        let stats = h.dispatcher.stats();
        assert_eq!((stats.submitted, stats.succeeded, stats.failed), (2, 1, 1));
    }
}

#[tokio::test]
async fn test_timed_out_job_is_cleaned_up() {
    for policy in [RegionPolicy::Isolated, RegionPolicy::Exclusive] {
        let engine = MemoryEngine::new();
        engine.delay(Operation::Sunmask, Duration::from_secs(5));
        let h = harness(policy, Duration::from_millis(100), engine).await;

        let err = h.dispatcher.submit(sunmask_at(500.0, 500.0)).await.unwrap_err();
        assert!(err.is_timeout(), "{}", err);
        assert_clean(&h);

        let stats = h.dispatcher.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.running, 0);

        // the pool keeps serving after a timeout
        h.dispatcher.submit(viewshed_at(500.0, 500.0)).await.unwrap();
    }
}

#[tokio::test]
async fn test_identical_requests_give_identical_results() {
    let h = harness(RegionPolicy::Isolated, Duration::from_secs(30), MemoryEngine::new()).await;

    let first = h.dispatcher.submit(sunmask_at(400.0, 600.0)).await.unwrap();
    let second = h.dispatcher.submit(sunmask_at(400.0, 600.0)).await.unwrap();

    assert_eq!(serde_json::to_value(first).unwrap(), serde_json::to_value(second).unwrap());
    assert_clean(&h);
}

#[tokio::test]
async fn test_more_jobs_than_queue_slots_all_complete() {
    let engine = MemoryEngine::new();
    engine.delay(Operation::Viewshed, Duration::from_millis(5));
    let h = harness(RegionPolicy::Isolated, Duration::from_secs(30), engine).await;

    let jobs: Vec<Job> = (0..20).map(|i| viewshed_at(100.0 + 40.0 * i as f64, 500.0)).collect();
    let results = join_all(jobs.into_iter().map(|job| h.dispatcher.submit(job))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    let stats = h.dispatcher.stats();
    assert_eq!(stats.pool_size, 4);
    assert_eq!((stats.submitted, stats.succeeded, stats.queued), (20, 20, 0));
    assert!(h.engine.peak_concurrency() <= 4);
    assert_clean(&h);
}

#[tokio::test]
async fn test_submit_after_shutdown_fails() {
    let h = harness(RegionPolicy::Exclusive, Duration::from_secs(30), MemoryEngine::new()).await;

    h.dispatcher.shutdown().await;
    let err = h.dispatcher.submit(viewshed_at(500.0, 500.0)).await.unwrap_err();
    assert!(err.to_string().contains("worker pool unavailable"));

    h.workspace.cleanup();
    assert!(!h.workspace.location_path().exists());
}
