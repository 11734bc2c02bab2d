//! Batches flushed by a Tokio `LocalSet` instead of a hand-driven queue.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::LocalSet;

use nexttick_batch::{BatchPhase, BatchScheduler, RecordingSink, TokioCheckpoint};

fn scheduler() -> (BatchScheduler, RecordingSink) {
    let sink = RecordingSink::new();
    let scheduler = BatchScheduler::builder()
        .checkpoint(TokioCheckpoint)
        .sink(sink.clone())
        .build()
        .expect("valid scheduler config");
    (scheduler, sink)
}

#[tokio::test]
async fn batch_runs_after_current_turn() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let (scheduler, _) = scheduler();
            let log = Rc::new(RefCell::new(Vec::new()));

            for i in 0..3 {
                let l = log.clone();
                scheduler.submit(move || l.borrow_mut().push(i));
            }
            log.borrow_mut().push(99);
            assert_eq!(*log.borrow(), vec![99]);

            tokio::task::yield_now().await;

            assert_eq!(*log.borrow(), vec![99, 0, 1, 2]);
            assert_eq!(scheduler.phase(), BatchPhase::Closed);
            assert_eq!(scheduler.stats().flushes_scheduled, 1);
        })
        .await;
}

#[tokio::test]
async fn batch_runs_before_timer() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let (scheduler, _) = scheduler();
            let log = Rc::new(RefCell::new(Vec::new()));

            let timer_log = log.clone();
            let timer = tokio::task::spawn_local(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                timer_log.borrow_mut().push("timer");
            });

            let l = log.clone();
            scheduler.submit(move || l.borrow_mut().push("task"));

            timer.await.expect("timer task");
            assert_eq!(*log.borrow(), vec!["task", "timer"]);
        })
        .await;
}

#[tokio::test]
async fn failures_and_reentry_under_tokio() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let (scheduler, sink) = scheduler();
            let log = Rc::new(RefCell::new(Vec::new()));

            let (s, l) = (scheduler.clone(), log.clone());
            scheduler.submit(move || {
                let inner = l.clone();
                s.submit(move || inner.borrow_mut().push("inner"));
                panic!("outer failed");
            });

            for _ in 0..4 {
                tokio::task::yield_now().await;
            }

            assert_eq!(*log.borrow(), vec!["inner"]);
            assert_eq!(sink.len(), 1);
            assert_eq!(scheduler.stats().batches_flushed, 2);
        })
        .await;
}
