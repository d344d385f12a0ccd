//! Several workers sharing one store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use tardy_core::impls::InMemoryStore;
use tardy_core::ports::{Clock, FixedClock};
use tardy_core::{HandlerError, QueueOptions, TaskId, TaskQueue, TickOutcome, handler_fn};

async fn worker(
    store: &Arc<InMemoryStore>,
    clock: &Arc<FixedClock>,
    worker_id: &str,
    max_retries: i64,
) -> TaskQueue {
    let options = QueueOptions::new("jobs", "it")
        .with_worker_id(worker_id)
        .with_max_retries(max_retries);
    TaskQueue::builder(options)
        .store(store.clone())
        .clock(clock.clone())
        .build()
        .await
        .unwrap()
}

fn start() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_due_task_is_claimed_by_exactly_one_worker() {
    let store = Arc::new(InMemoryStore::new());
    let clock = start();

    let mut workers = Vec::new();
    for i in 0..8 {
        workers.push(worker(&store, &clock, &format!("w{i}"), -1).await);
    }
    let id = workers[0].schedule_now(json!({"body": "1"})).await.unwrap();

    let mut joins = Vec::new();
    for queue in workers.clone() {
        joins.push(tokio::spawn(async move { queue.claim().await.unwrap() }));
    }
    let mut claimed = Vec::new();
    for join in joins {
        if let Some(task) = join.await.unwrap() {
            claimed.push(task);
        }
    }

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, id);
    assert!(store.members(workers[0].keys().schedule()).await.is_empty());

    let mut markers = 0;
    for queue in &workers {
        if store.get(queue.keys().in_progress()).await.is_some() {
            markers += 1;
        }
    }
    assert_eq!(markers, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_handle_every_task_once() {
    let store = Arc::new(InMemoryStore::new());
    let clock = start();

    let producer = worker(&store, &clock, "producer", -1).await;
    let mut expected = HashSet::new();
    for n in 0..40 {
        expected.insert(producer.schedule_now(json!({ "body": n })).await.unwrap());
    }

    let seen: Arc<Mutex<Vec<TaskId>>> = Arc::new(Mutex::new(Vec::new()));
    let mut joins = Vec::new();
    for i in 0..4 {
        let queue = worker(&store, &clock, &format!("w{i}"), -1).await;
        let seen = seen.clone();
        joins.push(tokio::spawn(async move {
            let handler = handler_fn(move |_, id, _| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(id);
                    Ok(())
                }
            });
            while queue.tick(&handler).await != TickOutcome::Empty {}
        }));
    }
    for join in joins {
        join.await.unwrap();
    }

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), expected.len());
    assert_eq!(seen.into_iter().collect::<HashSet<_>>(), expected);
}

#[tokio::test]
async fn failing_task_backs_off_then_drops_at_the_ceiling() {
    let store = Arc::new(InMemoryStore::new());
    let clock = start();
    let queue = worker(&store, &clock, "w0", 3).await;
    let id = queue.schedule_now(json!({"body": "1"})).await.unwrap();
    let failing = handler_fn(|_, _, _| async { Err(HandlerError::new("always")) });

    let mut waits = Vec::new();
    loop {
        match queue.tick(&failing).await {
            TickOutcome::Retried(rescheduled) => {
                assert_eq!(rescheduled.task_id, id);
                // not yet due
                assert_eq!(queue.tick(&failing).await, TickOutcome::Empty);
                waits.push(rescheduled.wait);
                clock.set(rescheduled.execute_at);
            }
            TickOutcome::Dropped { task_id } => {
                assert_eq!(task_id, id);
                break;
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(
        waits,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
    let stats = queue.stats();
    assert_eq!(stats.retried, 3);
    assert_eq!(stats.dropped, 1);
    assert!(store.members(queue.keys().schedule()).await.is_empty());
    assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 7).unwrap());
}

#[tokio::test]
async fn retried_task_can_be_picked_up_by_another_worker() {
    let store = Arc::new(InMemoryStore::new());
    let clock = start();
    let first = worker(&store, &clock, "w0", -1).await;
    let second = worker(&store, &clock, "w1", -1).await;
    let id = first.schedule_now(json!({"body": "1"})).await.unwrap();

    let failing = handler_fn(|_, _, _| async { Err(HandlerError::new("flaky")) });
    let TickOutcome::Retried(rescheduled) = first.tick(&failing).await else {
        panic!("expected a retry");
    };
    clock.set(rescheduled.execute_at);

    let retries = Arc::new(Mutex::new(None));
    let ok = {
        let retries = retries.clone();
        handler_fn(move |ctx, _, _| {
            let retries = retries.clone();
            async move {
                *retries.lock().unwrap() = Some(ctx.retry_count);
                Ok(())
            }
        })
    };
    assert_eq!(second.tick(&ok).await, TickOutcome::Succeeded { task_id: id });
    assert_eq!(*retries.lock().unwrap(), Some(1));
}
