//! End-to-end scenarios and concurrency checks for the snapshot engine.

mod common;

use namestat::{
    BlockCensus, BlockCounters, BlockDelta, ClusterState, LivenessMonitor, NodeId, NodeState,
    SafeModeConfig, SafeModeState, StatsError, Timestamp,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_three_node_capacity_scenario() {
    let state = ClusterState::default();
    let nodes = common::register_nodes(&state, 100, &[50, 20, 0], 3);
    assert!(state.registry.mark_dead(&nodes[2]));

    let snap = state.aggregator().take_snapshot();
    assert_eq!(snap.total(), 200);
    assert_eq!(snap.used(), 70);
    assert!((snap.percent_used - 35.0).abs() < 1e-9);

    let dead: Vec<NodeId> = snap.dead_nodes.iter().map(|r| r.node_id.clone()).collect();
    assert_eq!(dead, vec![NodeId::new("node3")]);
    assert_eq!(snap.live_nodes.len(), 2);
}

#[test]
fn test_block_census_scenario() {
    let census = BlockCensus::with_counters(BlockCounters::with_blocks(10, 0)).unwrap();

    let after = census.apply_delta(BlockDelta::new(5, 3, 0, 0)).unwrap();
    assert_eq!((after.total_blocks, after.missing_blocks), (15, 3));

    let rejected = census.apply_delta(BlockDelta::new(0, 20, 0, 0));
    assert!(matches!(rejected, Err(StatsError::InvariantViolation { .. })));

    let counters = census.snapshot();
    assert_eq!((counters.total_blocks, counters.missing_blocks), (15, 3));
}

#[test]
fn test_safemode_lifecycle_scenario() {
    let state = ClusterState::default();
    let now = Timestamp::from_secs(0);

    state.safemode.transition_to(SafeModeState::On, now).unwrap();
    state
        .safemode
        .transition_to(SafeModeState::ExtensionPending, now)
        .unwrap();

    let err = state
        .safemode
        .transition_to(SafeModeState::On, now)
        .unwrap_err();
    assert!(matches!(err, StatsError::InvalidTransition { .. }));
    assert_eq!(
        state.safemode.current_state().state,
        SafeModeState::ExtensionPending
    );

    state.safemode.transition_to(SafeModeState::Off, now).unwrap();
    assert_eq!(state.aggregator().take_snapshot().safemode.state, SafeModeState::Off);
}

#[test]
fn test_startup_recovery_through_monitor() {
    let state = ClusterState::new(SafeModeConfig {
        threshold_pct: 0.9,
        extension_secs: 30,
        min_live_nodes: 2,
    })
    .unwrap();
    state.safemode.enter_startup().unwrap();
    state
        .census
        .reset(BlockCounters {
            total_blocks: 100,
            missing_blocks: 100,
            files_and_dirs: 20,
            namespace_used_bytes: 0,
        })
        .unwrap();

    let monitor = LivenessMonitor::with_intervals(
        state.clone(),
        Duration::from_secs(1),
        Duration::from_secs(600),
    );

    common::register_nodes(&state, 100, &[], 1);
    state.census.apply_delta(BlockDelta::new(0, -95, 0, 0)).unwrap();
    let outcome = monitor.check(Timestamp::from_secs(1_000));
    assert_eq!(outcome.safemode, Some(SafeModeState::On));

    // second node brings the live count to the minimum
    common::register_nodes(&state, 100, &[], 2);
    let outcome = monitor.check(Timestamp::from_secs(1_001));
    assert_eq!(outcome.safemode, Some(SafeModeState::ExtensionPending));

    let outcome = monitor.check(Timestamp::from_secs(1_031));
    assert!(outcome.left_safemode);
    assert!(!state.aggregator().take_snapshot().safemode.is_on());
}

#[test]
fn test_heartbeat_expiry_and_revival() {
    let state = ClusterState::default();
    let nodes = common::register_nodes(&state, 100, &[10, 10], 2);
    let monitor = LivenessMonitor::with_intervals(
        state.clone(),
        Duration::from_secs(1),
        Duration::from_secs(60),
    );

    state
        .registry
        .record_heartbeat_at(nodes[1].clone(), 100, 10, 0, Timestamp::from_secs(1_050));
    let outcome = monitor.check(Timestamp::from_secs(1_100));
    assert_eq!(outcome.expired, vec![nodes[0].clone()]);

    let snap = state.aggregator().take_snapshot();
    assert_eq!(snap.total(), 100);
    assert_eq!(snap.nodes(NodeState::Dead).len(), 1);

    state
        .registry
        .record_heartbeat_at(nodes[0].clone(), 100, 10, 0, Timestamp::from_secs(1_101));
    let snap = state.aggregator().take_snapshot();
    assert_eq!(snap.total(), 200);
    assert!(snap.dead_nodes.is_empty());
}

#[test]
fn test_concurrent_writers_and_readers() {
    let state = ClusterState::default();
    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();

    for w in 0..4u64 {
        let state = state.clone();
        writers.push(thread::spawn(move || {
            for i in 0..500u64 {
                let id = NodeId::new(format!("w{}-n{}", w, i % 8));
                state.registry.record_heartbeat(id.clone(), 1_000, (i * 7) % 1_000, 0);
                match i % 5 {
                    0 => {
                        state.registry.mark_dead(&id);
                    }
                    1 => {
                        state.registry.mark_decommissioning(&id);
                    }
                    _ => {}
                }
                let _ = state.census.apply_delta(BlockDelta::new(2, 1, 1, 64));
                let _ = state.census.apply_delta(BlockDelta::new(0, -1, 0, 0));
                let _ = state.census.apply_delta(BlockDelta::new(0, 5, 0, 0));
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..2 {
        let aggregator = state.aggregator();
        let stop = stop.clone();
        readers.push(thread::spawn(move || {
            let mut snapshots = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let snap = aggregator.take_snapshot();
                assert!(snap.blocks.missing_blocks <= snap.blocks.total_blocks);
                assert!(snap.used() <= snap.total());

                let mut ids: Vec<&NodeId> = snap
                    .live_nodes
                    .iter()
                    .chain(&snap.dead_nodes)
                    .chain(&snap.decom_nodes)
                    .map(|r| &r.node_id)
                    .collect();
                let listed = ids.len();
                ids.sort();
                ids.dedup();
                assert_eq!(ids.len(), listed, "a node appeared in two listings");
                snapshots += 1;
            }
            snapshots
        }));
    }

    for w in writers {
        w.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        r.join().unwrap();
    }

    let snap = state.aggregator().take_snapshot();
    assert_eq!(snap.node_count(), 32);
    assert!(snap.blocks.missing_blocks <= snap.blocks.total_blocks);
    assert_eq!(snap.blocks.total_blocks, 4 * 500 * 2);
}

#[tokio::test]
async fn test_monitor_shutdown_is_prompt() {
    let state = ClusterState::default();
    let handle = LivenessMonitor::with_intervals(
        state.clone(),
        Duration::from_secs(3_600),
        Duration::from_secs(60),
    )
    .start();

    let stats = tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("monitor did not stop");
    assert!(stats.checks <= 1);
}
