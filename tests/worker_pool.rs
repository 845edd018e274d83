use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::sync::WaitGroup;
use rand::Rng;
use taskpool::{
    FullPolicy, PoolBuilder, PoolError, PoolState, Result, TaskError, TaskId, WorkerPool,
};

#[test]
fn every_submission_yields_one_result() -> Result<()> {
    const TASK_NUM: u64 = 200;

    let pool: WorkerPool<u64> = WorkerPool::new(4)?;
    let mut ids = HashSet::new();
    for i in 0..TASK_NUM {
        ids.insert(pool.submit(move || i * 2)?);
    }

    let completions = pool.results().collect_n(TASK_NUM as usize);
    assert_eq!(completions.len(), TASK_NUM as usize);

    let seen: HashSet<TaskId> = completions.iter().map(|c| c.id).collect();
    assert_eq!(seen, ids);

    let sum: u64 = completions
        .into_iter()
        .map(|c| c.outcome.unwrap())
        .sum();
    assert_eq!(sum, (0..TASK_NUM).map(|i| i * 2).sum::<u64>());

    pool.shutdown(true)?;
    assert!(pool.results().recv().is_none());
    Ok(())
}

#[test]
fn shutdown_without_tasks_stops_all_workers() -> Result<()> {
    let pool: WorkerPool<()> = WorkerPool::new(4)?;
    assert_eq!(pool.stats().live_workers, 4);

    pool.shutdown(true)?;

    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(pool.stats().live_workers, 0);
    assert_eq!(pool.stats().completed, 0);
    assert!(pool.results().try_recv().is_none());
    assert!(pool.results().recv().is_none());
    Ok(())
}

#[test]
fn tasks_run_in_parallel() -> Result<()> {
    const THREADS: usize = 4;
    const TASK_NUM: usize = 8;
    const NAP: Duration = Duration::from_millis(200);

    let pool: WorkerPool<()> = WorkerPool::new(THREADS)?;
    let start = Instant::now();
    for _ in 0..TASK_NUM {
        pool.submit(move || thread::sleep(NAP))?;
    }
    pool.shutdown(true)?;
    let elapsed = start.elapsed();

    // ceil(8 / 4) = 2 naps, far below the 8 naps of serial execution.
    assert!(elapsed >= NAP * 2, "finished too early: {elapsed:?}");
    assert!(elapsed < NAP * 5, "looks serial: {elapsed:?}");
    assert_eq!(pool.results().count(), TASK_NUM);
    Ok(())
}

#[test]
fn failing_task_is_isolated() -> Result<()> {
    let pool: WorkerPool<i32> = WorkerPool::new(2)?;

    let divisors = [1, 2, 0, 4, 5];
    let mut failing = None;
    for d in divisors {
        let id = pool.submit_fallible(move || 100i32.checked_div(d).ok_or("division by zero"))?;
        if d == 0 {
            failing = Some(id);
        }
    }
    let panicking = pool.submit(|| {
        panic_control::disable_hook_in_current_thread();
        panic!("explicit panic")
    })?;

    let completions = pool.results().collect_n(divisors.len() + 1);
    for completion in &completions {
        if Some(completion.id) == failing {
            assert_eq!(
                completion.outcome,
                Err(TaskError::Failed("division by zero".to_owned()))
            );
        } else if completion.id == panicking {
            assert_eq!(
                completion.outcome,
                Err(TaskError::Panicked("explicit panic".to_owned()))
            );
        } else {
            assert!(completion.is_ok());
        }
    }

    // The pool still works after both failures.
    pool.submit(|| 7)?;
    assert_eq!(pool.results().recv().map(|c| c.outcome), Some(Ok(7)));

    let stats = pool.stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.live_workers, 2);
    Ok(())
}

#[test]
fn submit_after_shutdown_is_rejected() -> Result<()> {
    let pool: WorkerPool<u32> = WorkerPool::new(2)?;
    pool.submit(|| 1)?;
    pool.shutdown(true)?;

    assert!(matches!(pool.submit(|| 2), Err(PoolError::PoolClosed)));
    assert!(matches!(
        pool.submit_fallible(|| Ok::<_, String>(3)),
        Err(PoolError::PoolClosed)
    ));

    let stats = pool.stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.rejected, 2);
    assert_eq!(pool.results().count(), 1);
    Ok(())
}

#[test]
fn shutdown_is_idempotent() -> Result<()> {
    let pool: WorkerPool<()> = WorkerPool::new(2)?;
    pool.shutdown(false)?;
    pool.shutdown(false)?;
    pool.shutdown(true)?;
    pool.shutdown(true)?;
    assert_eq!(pool.state(), PoolState::Stopped);
    Ok(())
}

#[test]
fn non_waiting_shutdown_still_drains_queue() -> Result<()> {
    const TASK_NUM: usize = 20;

    let pool: WorkerPool<usize> = WorkerPool::new(2)?;
    let mut rng = rand::thread_rng();
    for i in 0..TASK_NUM {
        let nap = Duration::from_millis(rng.gen_range(1..20));
        pool.submit(move || {
            thread::sleep(nap);
            i
        })?;
    }

    pool.shutdown(false)?;
    assert!(matches!(pool.submit(|| 0), Err(PoolError::PoolClosed)));

    // Iteration ends once the workers have drained the queue and exited.
    let mut values: Vec<usize> = pool.results().map(|c| c.outcome.unwrap()).collect();
    values.sort_unstable();
    assert_eq!(values, (0..TASK_NUM).collect::<Vec<_>>());

    pool.join()?;
    assert_eq!(pool.state(), PoolState::Stopped);
    Ok(())
}

#[test]
fn concurrent_producers_run_each_task_once() -> Result<()> {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 250;

    let pool: Arc<WorkerPool<()>> = Arc::new(WorkerPool::new(4)?);
    let counter = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(PRODUCERS));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                barrier.wait();
                for _ in 0..PER_PRODUCER {
                    let counter = Arc::clone(&counter);
                    pool.submit(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })?;
                }
                Ok(())
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer panicked")?;
    }
    pool.shutdown(true)?;

    assert_eq!(counter.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);
    assert_eq!(pool.results().count(), PRODUCERS * PER_PRODUCER);
    assert_eq!(pool.stats().completed as usize, PRODUCERS * PER_PRODUCER);
    Ok(())
}

#[test]
fn bounded_queue_rejects_when_full() -> Result<()> {
    let pool: WorkerPool<()> = PoolBuilder::new()
        .size(1)
        .bounded(1, FullPolicy::Reject)
        .build()?;

    // Park the only worker so the queue can fill up.
    let started = WaitGroup::new();
    let release = Arc::new(Barrier::new(2));
    {
        let started = started.clone();
        let release = Arc::clone(&release);
        pool.submit(move || {
            drop(started);
            release.wait();
        })?;
    }
    started.wait();

    pool.submit(|| ())?;
    assert!(matches!(pool.submit(|| ()), Err(PoolError::QueueFull)));
    let stats = pool.stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.queued, 1);

    release.wait();
    pool.shutdown(true)?;
    assert_eq!(pool.results().count(), 2);
    Ok(())
}

#[test]
fn bounded_queue_blocks_when_full() -> Result<()> {
    const TASK_NUM: usize = 50;

    let pool: WorkerPool<usize> = PoolBuilder::new()
        .size(2)
        .bounded(2, FullPolicy::Block)
        .build()?;

    for i in 0..TASK_NUM {
        pool.submit(move || {
            thread::sleep(Duration::from_millis(1));
            i
        })?;
        assert!(pool.stats().queued <= 2);
    }
    pool.shutdown(true)?;

    assert_eq!(pool.stats().rejected, 0);
    assert_eq!(pool.results().count(), TASK_NUM);
    Ok(())
}

#[test]
fn multiple_consumers_share_results() -> Result<()> {
    const TASK_NUM: usize = 100;

    let pool: WorkerPool<usize> = WorkerPool::new(4)?;
    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let results = pool.results();
            thread::spawn(move || results.count())
        })
        .collect();

    for i in 0..TASK_NUM {
        pool.submit(move || i)?;
    }
    pool.shutdown(true)?;

    let received: usize = consumers
        .into_iter()
        .map(|c| c.join().expect("consumer panicked"))
        .sum();
    assert_eq!(received, TASK_NUM);
    Ok(())
}

#[test]
fn task_may_shut_down_its_own_pool() -> Result<()> {
    let pool: Arc<WorkerPool<()>> = Arc::new(WorkerPool::new(2)?);
    let handle = Arc::clone(&pool);
    pool.submit(move || {
        handle.shutdown(true).expect("shutdown from worker");
    })?;

    assert!(pool.results().recv().is_some());
    pool.join()?;
    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(pool.stats().live_workers, 0);
    assert!(matches!(pool.submit(|| ()), Err(PoolError::PoolClosed)));
    Ok(())
}

#[test]
fn concurrent_waiting_shutdowns_all_wait_for_stop() -> Result<()> {
    let pool: Arc<WorkerPool<()>> = Arc::new(WorkerPool::new(1)?);
    let started = WaitGroup::new();
    {
        let started = started.clone();
        pool.submit(move || {
            drop(started);
            thread::sleep(Duration::from_millis(300));
        })?;
    }
    started.wait();

    let first = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || -> Result<PoolState> {
            pool.shutdown(true)?;
            Ok(pool.state())
        })
    };
    // Give the first caller time to take the worker handle.
    thread::sleep(Duration::from_millis(50));

    pool.shutdown(true)?;
    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(first.join().expect("shutdown thread panicked")?, PoolState::Stopped);
    Ok(())
}

#[test]
fn concurrent_joins_all_wait_for_stop() -> Result<()> {
    const JOINERS: usize = 4;

    let pool: Arc<WorkerPool<()>> = Arc::new(WorkerPool::new(2)?);
    for _ in 0..4 {
        pool.submit(|| thread::sleep(Duration::from_millis(100)))?;
    }
    pool.shutdown(false)?;

    let barrier = Arc::new(Barrier::new(JOINERS));
    let joiners: Vec<_> = (0..JOINERS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<PoolState> {
                barrier.wait();
                pool.join()?;
                Ok(pool.state())
            })
        })
        .collect();

    for joiner in joiners {
        assert_eq!(joiner.join().expect("joiner panicked")?, PoolState::Stopped);
    }
    assert_eq!(pool.results().count(), 4);
    Ok(())
}

#[test]
fn join_after_self_shutdown_waits_for_calling_worker() -> Result<()> {
    let pool: Arc<WorkerPool<()>> = Arc::new(WorkerPool::new(2)?);
    let handle = Arc::clone(&pool);
    pool.submit(move || {
        handle.shutdown(true).expect("shutdown from worker");
        // Still running after shutdown returned inside the worker.
        thread::sleep(Duration::from_millis(200));
    })?;

    // Wait until the task has closed the pool.
    while pool.state() == PoolState::Running {
        thread::sleep(Duration::from_millis(5));
    }
    pool.join()?;
    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(pool.stats().completed, 1);
    Ok(())
}

struct ExplodingPayload;

impl Drop for ExplodingPayload {
    fn drop(&mut self) {
        panic!("payload destructor panicked");
    }
}

#[test]
fn panic_payload_with_panicking_drop_is_still_reported() -> Result<()> {
    let pool: WorkerPool<u32> = WorkerPool::new(1)?;
    let exploding = pool.submit(|| {
        panic_control::disable_hook_in_current_thread();
        std::panic::panic_any(ExplodingPayload)
    })?;
    let healthy = pool.submit(|| 5)?;

    let mut completions = pool.results().collect_n(2);
    completions.sort_by_key(|c| c.id);
    assert_eq!(completions.len(), 2);
    assert_eq!(completions[0].id, exploding);
    assert_eq!(
        completions[0].outcome,
        Err(TaskError::Panicked("unknown panic payload".to_owned()))
    );
    assert_eq!(completions[1].id, healthy);
    assert_eq!(completions[1].outcome, Ok(5));

    let stats = pool.stats();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.live_workers, 1);
    Ok(())
}
