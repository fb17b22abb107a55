use lamport_mutex::{
    mesh::full_mesh, resource::ResourceGuard, timestamp::Timestamp, Harness, HarnessConfig,
    Phase, ProcessAgent,
};
use std::time::Duration;
use tokio::time::timeout;

fn fast_config(peers: usize, rounds: usize, seed: u64) -> HarnessConfig {
    HarnessConfig {
        peers,
        rounds,
        capacity: 2,
        min_hold: Duration::from_millis(1),
        max_hold: Duration::from_millis(5),
        rate: 200.,
        seed: Some(seed),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_single_request_is_granted() {
    lamport_mutex::log::init(false);
    let harness = Harness::start(fast_config(5, 1, 1)).unwrap();

    let report = timeout(Duration::from_secs(30), harness.run())
        .await
        .expect("every process should eventually hold the resource")
        .unwrap();

    assert_eq!(report.grants, 5);
    let mut holders: Vec<_> = harness.guard.grants().iter().map(|t| t.process).collect();
    holders.sort();
    assert_eq!(holders, vec![0, 1, 2, 3, 4]);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_contention_keeps_exclusion_and_order() {
    let harness = Harness::start(fast_config(4, 10, 42)).unwrap();

    let report = timeout(Duration::from_secs(60), harness.run())
        .await
        .expect("run should finish")
        .unwrap();

    assert_eq!(report.grants, 40);
    assert!(report.rate() > 0. && report.rate() <= 1.);
    assert!(harness.guard.grants_in_timestamp_order());
    assert_eq!(harness.guard.holder(), None);

    for agent in &harness.agents {
        assert_eq!(agent.phase().await, Phase::Idle);

        // the last releases may still be in flight
        timeout(Duration::from_secs(5), async {
            while !agent.queued().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("every queue should drain once all releases are delivered");
    }

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_slot_channels_still_finish() {
    let config = HarnessConfig {
        capacity: 1,
        ..fast_config(6, 3, 7)
    };
    let harness = Harness::start(config).unwrap();

    let report = timeout(Duration::from_secs(60), harness.run())
        .await
        .expect("a full channel must only slow senders down")
        .unwrap();
    assert_eq!(report.grants, 18);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_grants_follow_request_timestamps() {
    let guard = ResourceGuard::new();
    let agents: Vec<_> = full_mesh(3, 4)
        .into_iter()
        .enumerate()
        .map(|(id, channels)| ProcessAgent::start(id, channels, guard.clone()))
        .collect();

    // process 2 asks first, the others only once it holds the resource
    let first = timeout(Duration::from_secs(5), agents[2].request())
        .await
        .unwrap();
    let waiting = {
        let (zero, one) = (agents[0].clone(), agents[1].clone());
        tokio::spawn(async move {
            let cycles = [zero, one].map(|agent| async move {
                let request = agent.request().await;
                agent.release().await;
                request
            });
            futures::future::join_all(cycles).await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(guard.holder(), Some(first.timestamp));
    agents[2].release().await;

    let later = timeout(Duration::from_secs(5), waiting).await.unwrap().unwrap();
    assert!(later.iter().all(|request| request.timestamp > first.timestamp));
    assert!(guard.grants_in_timestamp_order());
    assert_eq!(guard.grants().len(), 3);

    for agent in &agents {
        agent.shutdown().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_violation_ends_the_run_with_an_error() {
    let harness = Harness::start(fast_config(3, 2, 5)).unwrap();
    // a holder outside the mesh makes the first grant break exclusion
    harness.guard.occupy(Timestamp::new(0, 99)).unwrap();

    let result = timeout(Duration::from_secs(30), harness.run())
        .await
        .expect("a violation must end the run instead of hanging it");
    assert!(result.is_err());

    harness.shutdown().await;
}
