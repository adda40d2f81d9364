#![allow(clippy::expect_used, clippy::unwrap_used)]
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use replay_work_queue::WorkQueue;
use tokio::sync::Notify;

#[tokio::test]
async fn idle_resolves_immediately_without_jobs() {
    let queue = WorkQueue::new(3);
    tokio::time::timeout(Duration::from_secs(1), queue.wait_until_idle())
        .await
        .expect("empty queue should be idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fork_idle_waits_for_its_own_jobs_only() {
    let root = WorkQueue::new(4);
    let busy_sibling = root.fork();
    let parts = root.fork();

    let sibling_gate = Arc::new(Notify::new());
    let root_gate = Arc::new(Notify::new());
    let sibling = {
        let gate = Arc::clone(&sibling_gate);
        busy_sibling.add(move || async move { gate.notified().await })
    };
    let root_job = {
        let gate = Arc::clone(&root_gate);
        root.add(move || async move { gate.notified().await })
    };

    let settled = Arc::new(AtomicUsize::new(0));
    for delay in [5, 1, 3] {
        let settled = Arc::clone(&settled);
        let _ = parts.add(move || async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            settled.fetch_add(1, Ordering::SeqCst);
        });
    }

    tokio::time::timeout(Duration::from_secs(5), parts.wait_until_idle())
        .await
        .expect("fork should go idle while siblings are still busy");
    assert_eq!(settled.load(Ordering::SeqCst), 3);
    assert_eq!(parts.outstanding(), 0);
    assert_eq!(busy_sibling.outstanding(), 1);
    assert_eq!(root.outstanding(), 1);

    sibling_gate.notify_one();
    root_gate.notify_one();
    sibling.await.unwrap();
    root_job.await.unwrap();
    root.wait_until_idle().await;
}

#[tokio::test]
async fn root_idle_ignores_jobs_added_through_forks() {
    let root = WorkQueue::new(2);
    let fork = root.fork();
    let gate = Arc::new(Notify::new());

    let stuck = {
        let gate = Arc::clone(&gate);
        fork.add(move || async move { gate.notified().await })
    };

    tokio::time::timeout(Duration::from_secs(1), root.wait_until_idle())
        .await
        .expect("root has no jobs of its own");
    assert_eq!(fork.outstanding(), 1);

    gate.notify_one();
    stuck.await.unwrap();
    fork.wait_until_idle().await;
}

#[tokio::test]
async fn fork_jobs_queue_behind_parent_capacity() {
    let root = WorkQueue::new(1);
    let fork = root.fork();
    let gate = Arc::new(Notify::new());

    let holder = {
        let gate = Arc::clone(&gate);
        root.add(move || async move { gate.notified().await })
    };
    let queued = fork.add(|| async { "part" });
    assert_eq!(fork.running(), 1);
    assert_eq!(fork.waiting(), 1);
    assert_eq!(fork.outstanding(), 1);

    gate.notify_one();
    holder.await.unwrap();
    assert_eq!(queued.await.unwrap(), "part");
    fork.wait_until_idle().await;
}
