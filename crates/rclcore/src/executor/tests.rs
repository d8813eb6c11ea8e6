use core::time::Duration;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{
    context::{current_worker_id, Context},
    error::Error,
    executable::{AnyExecutable, ExecutableKind},
    executor::{ExecutorConfig, MultiThreadedExecutor},
    message::RequestId,
    service::{AnyServiceCallback, Service},
    testing::{
        AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse, RecordingTransport, ScriptedWaitSet,
        TaskTimer,
    },
    wait_set::WaitSet,
};

const PATIENCE: Duration = Duration::from_secs(10);

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn build_executor(
    context: &Arc<Context>,
    wait_set: Arc<dyn WaitSet>,
    threads: usize,
) -> MultiThreadedExecutor {
    MultiThreadedExecutor::with_config(
        context.clone(),
        wait_set,
        ExecutorConfig::with_threads(threads),
    )
    .unwrap()
}

/// A failure as seen by the hook: worker, entity and rendered error.
type Recorded = (usize, String, String);

fn recording_hook(
    executor: MultiThreadedExecutor,
) -> (MultiThreadedExecutor, Arc<Mutex<Vec<Recorded>>>) {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let executor = executor.with_failure_hook(move |failure| {
        sink.lock().push((
            failure.worker_id,
            failure.entity.clone(),
            failure.error.to_string(),
        ));
    });
    (executor, failures)
}

/// Spins `executor` on a scoped thread, runs `body`, then shuts down and
/// joins.
fn run_spinning(executor: &MultiThreadedExecutor, body: impl FnOnce()) {
    std::thread::scope(|s| {
        let spinner = s.spawn(|| executor.spin());
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body));
        executor.context().shutdown();
        spinner.join().unwrap().unwrap();
        if let Err(payload) = outcome {
            std::panic::resume_unwind(payload);
        }
    });
}

#[test]
fn spin_joins_every_worker_after_shutdown() {
    for threads in [1, 2, 4, 8] {
        let context = Arc::new(Context::new());
        let wait_set = Arc::new(ScriptedWaitSet::holding(Duration::from_micros(200)));
        let seen = Arc::new(Mutex::new(HashSet::new()));
        for i in 0..(threads as u64 * 20) {
            let seen = Arc::clone(&seen);
            wait_set.push_timer(&TaskTimer::new(i, move || {
                seen.lock().insert(current_worker_id());
                std::thread::sleep(Duration::from_millis(2));
                Ok(())
            }));
        }

        let executor = build_executor(&context, wait_set.clone(), threads);
        assert_eq!(executor.number_of_threads(), threads);
        run_spinning(&executor, || {
            assert!(wait_until(|| wait_set.remaining() == 0));
        });

        // spin returned, so every worker has exited
        assert!(!context.ok());
        let seen = seen.lock();
        assert!(!seen.is_empty());
        for id in seen.iter() {
            let id = id.unwrap();
            assert!((1..=threads).contains(&id), "worker id {id} out of range");
        }
        assert_eq!(current_worker_id(), None);
    }
}

#[test]
fn spin_returns_immediately_when_already_shut_down() {
    let context = Arc::new(Context::new());
    context.shutdown();
    let wait_set = Arc::new(ScriptedWaitSet::new());
    let executor = build_executor(&context, wait_set.clone(), 4);
    executor.spin().unwrap();
    assert_eq!(wait_set.selections(), 0);
}

#[test]
fn selection_is_serialized() {
    let context = Arc::new(Context::new());
    let wait_set = Arc::new(ScriptedWaitSet::holding(Duration::from_micros(500)));
    let executed = Arc::new(AtomicUsize::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));
    for i in 0..64 {
        let executed = Arc::clone(&executed);
        let running = Arc::clone(&running);
        let max_running = Arc::clone(&max_running);
        wait_set.push_timer(&TaskTimer::new(i, move || {
            let now = running.fetch_add(1, Ordering::AcqRel) + 1;
            max_running.fetch_max(now, Ordering::AcqRel);
            std::thread::sleep(Duration::from_millis(5));
            running.fetch_sub(1, Ordering::AcqRel);
            executed.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }));
    }

    let executor = build_executor(&context, wait_set.clone(), 4);
    run_spinning(&executor, || {
        assert!(wait_until(|| executed.load(Ordering::Acquire) == 64));
    });

    assert_eq!(wait_set.max_inside(), 1);
    // execution itself overlaps
    assert!(max_running.load(Ordering::Acquire) > 1);
}

#[test]
fn every_item_executes_exactly_once() {
    let context = Arc::new(Context::new());
    let wait_set = Arc::new(ScriptedWaitSet::new());
    let counts = Arc::new(Mutex::new(HashMap::new()));
    let total = 500_u64;
    for i in 0..total {
        let counts = Arc::clone(&counts);
        wait_set.push_timer(&TaskTimer::new(i, move || {
            *counts.lock().entry(i).or_insert(0_usize) += 1;
            Ok(())
        }));
    }

    let executor = build_executor(&context, wait_set.clone(), 8);
    run_spinning(&executor, || {
        assert!(wait_until(|| counts.lock().len() == total as usize));
    });

    let counts = counts.lock();
    assert_eq!(counts.len(), total as usize);
    assert!(counts.values().all(|&n| n == 1));
    assert_eq!(executor.failure_count(), 0);
}

#[test]
fn completion_runs_after_execution() {
    let context = Arc::new(Context::new());
    let wait_set = Arc::new(ScriptedWaitSet::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let task = {
        let log = Arc::clone(&log);
        TaskTimer::new(1, move || {
            log.lock().push("execute");
            Ok(())
        })
    };
    let completion_log = Arc::clone(&log);
    wait_set.push_executable(
        AnyExecutable::new(ExecutableKind::Timer(task))
            .with_completion(move || completion_log.lock().push("complete")),
    );

    let executor = build_executor(&context, wait_set, 1);
    assert!(executor.spin_once().unwrap());
    assert_eq!(*log.lock(), vec!["execute", "complete"]);
    assert!(!executor.spin_once().unwrap());
}

#[test]
fn add_two_ints_through_the_pool() {
    let context = Arc::new(Context::new());
    let transport = RecordingTransport::new();
    let service = Arc::new(
        Service::new(
            transport.clone(),
            "add_two_ints",
            AnyServiceCallback::<AddTwoInts>::new(|req, resp| resp.sum = req.a + req.b),
            None,
        )
        .unwrap(),
    );
    let id = RequestId::new(3, 1);
    transport.push_request(id, AddTwoIntsRequest { a: 2, b: 3 });

    let wait_set = Arc::new(ScriptedWaitSet::new());
    wait_set.push(ExecutableKind::Service(service));
    let executor = build_executor(&context, wait_set, 2);
    run_spinning(&executor, || {
        assert!(wait_until(|| !transport.sent_responses::<AddTwoIntsResponse>().is_empty()));
    });

    assert_eq!(
        transport.sent_responses::<AddTwoIntsResponse>(),
        vec![(id, AddTwoIntsResponse { sum: 5 })]
    );
}

#[test]
fn send_failure_is_reported_and_the_pool_continues() {
    let context = Arc::new(Context::new());
    let transport = RecordingTransport::new();
    let service = Arc::new(
        Service::new(
            transport.clone(),
            "add_two_ints",
            AnyServiceCallback::<AddTwoInts>::new(|req, resp| resp.sum = req.a + req.b),
            None,
        )
        .unwrap(),
    );
    transport.fail_next_sends(1);
    transport.push_request(RequestId::new(1, 1), AddTwoIntsRequest { a: 1, b: 1 });
    transport.push_request(RequestId::new(1, 2), AddTwoIntsRequest { a: 2, b: 2 });

    let wait_set = Arc::new(ScriptedWaitSet::new());
    wait_set.push(ExecutableKind::Service(service.clone()));
    wait_set.push(ExecutableKind::Service(service));

    let (executor, failures) = recording_hook(build_executor(&context, wait_set, 1));
    run_spinning(&executor, || {
        assert!(wait_until(|| !transport.sent_responses::<AddTwoIntsResponse>().is_empty()));
    });

    assert_eq!(executor.failure_count(), 1);
    let failures = failures.lock();
    assert_eq!(failures[0].1, "service `add_two_ints`");
    assert!(failures[0].2.starts_with("failed to send response for service `add_two_ints`"));
    assert_eq!(
        transport.sent_responses::<AddTwoIntsResponse>(),
        vec![(RequestId::new(1, 2), AddTwoIntsResponse { sum: 4 })]
    );
}

#[test]
fn callback_panic_keeps_both_workers_alive() {
    let context = Arc::new(Context::new());
    let wait_set = Arc::new(ScriptedWaitSet::new());
    wait_set.push_timer(&TaskTimer::new(0, || panic!("boom")));

    // Two rendezvous tasks can only both finish if two workers run them at
    // the same time.
    let arrived = Arc::new(AtomicUsize::new(0));
    let met = Arc::new(AtomicUsize::new(0));
    for i in 1..=2 {
        let arrived = Arc::clone(&arrived);
        let met = Arc::clone(&met);
        wait_set.push_timer(&TaskTimer::new(i, move || {
            arrived.fetch_add(1, Ordering::AcqRel);
            let deadline = Instant::now() + PATIENCE;
            while arrived.load(Ordering::Acquire) < 2 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            if arrived.load(Ordering::Acquire) >= 2 {
                met.fetch_add(1, Ordering::AcqRel);
            }
            Ok(())
        }));
    }

    let (executor, failures) = recording_hook(build_executor(&context, wait_set, 2));
    run_spinning(&executor, || {
        assert!(wait_until(|| met.load(Ordering::Acquire) == 2));
    });

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].1, "timer #0");
    assert_eq!(failures[0].2, "callback panicked: boom");
}

#[test]
fn errors_are_reported_without_stopping_the_worker() {
    let context = Arc::new(Context::new());
    let wait_set = Arc::new(ScriptedWaitSet::new());
    let done = Arc::new(AtomicBool::new(false));
    wait_set.push_timer(&TaskTimer::failing(7));
    {
        let done = Arc::clone(&done);
        wait_set.push_timer(&TaskTimer::new(8, move || {
            done.store(true, Ordering::Release);
            Ok(())
        }));
    }

    let (executor, failures) = recording_hook(build_executor(&context, wait_set, 1));
    run_spinning(&executor, || {
        assert!(wait_until(|| done.load(Ordering::Acquire)));
    });
    assert_eq!(executor.failure_count(), 1);
    assert_eq!(failures.lock()[0].0, 1);
}

#[test]
fn panicking_failure_hook_does_not_stop_the_worker() {
    let context = Arc::new(Context::new());
    let wait_set = Arc::new(ScriptedWaitSet::new());
    let done = Arc::new(AtomicBool::new(false));
    wait_set.push_timer(&TaskTimer::failing(1));
    {
        let done = Arc::clone(&done);
        wait_set.push_timer(&TaskTimer::new(2, move || {
            done.store(true, Ordering::Release);
            Ok(())
        }));
    }

    let hook_calls = Arc::new(AtomicUsize::new(0));
    let executor = {
        let hook_calls = Arc::clone(&hook_calls);
        build_executor(&context, wait_set, 1).with_failure_hook(move |_| {
            hook_calls.fetch_add(1, Ordering::Relaxed);
            panic!("hook failed");
        })
    };
    // the lone worker survives the hook and still runs the next item
    run_spinning(&executor, || {
        assert!(wait_until(|| done.load(Ordering::Acquire)));
    });
    assert_eq!(executor.failure_count(), 1);
    assert_eq!(hook_calls.load(Ordering::Relaxed), 1);
}

struct PanicOnceWaitSet {
    panicked: AtomicBool,
    inner: ScriptedWaitSet,
}

impl WaitSet for PanicOnceWaitSet {
    fn select_next_ready(&self, context: &Context) -> Option<AnyExecutable> {
        if !self.panicked.swap(true, Ordering::AcqRel) {
            panic!("selection exploded");
        }
        self.inner.select_next_ready(context)
    }
}

#[test]
fn selection_panic_does_not_poison_the_gate() {
    let context = Arc::new(Context::new());
    let done = Arc::new(AtomicBool::new(false));
    let inner = ScriptedWaitSet::new();
    {
        let done = Arc::clone(&done);
        inner.push_timer(&TaskTimer::new(1, move || {
            done.store(true, Ordering::Release);
            Ok(())
        }));
    }
    let wait_set = Arc::new(PanicOnceWaitSet {
        panicked: AtomicBool::new(false),
        inner,
    });

    let (executor, failures) = recording_hook(build_executor(&context, wait_set, 2));
    run_spinning(&executor, || {
        assert!(wait_until(|| done.load(Ordering::Acquire)));
    });

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].1, "wait-set");
    assert_eq!(failures[0].2, "wait-set selection panicked: selection exploded");
}

#[test]
fn zero_threads_is_rejected() {
    let context = Arc::new(Context::new());
    let result = MultiThreadedExecutor::with_config(
        context,
        Arc::new(ScriptedWaitSet::new()),
        ExecutorConfig::with_threads(0),
    );
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));
}

#[test]
fn default_sizing_uses_hardware_parallelism() {
    let context = Arc::new(Context::new());
    let executor = MultiThreadedExecutor::new(context, Arc::new(ScriptedWaitSet::new()));
    assert_eq!(executor.number_of_threads(), num_cpus::get().max(1));
    assert_eq!(ExecutorConfig::default().resolve().unwrap(), executor.number_of_threads());
}

#[test]
fn spin_once_reports_errors_to_the_caller() {
    let context = Arc::new(Context::new());
    let wait_set = Arc::new(ScriptedWaitSet::new());
    wait_set.push_timer(&TaskTimer::new(1, || panic!("once")));
    let executor = build_executor(&context, wait_set, 1);
    assert!(matches!(executor.spin_once(), Err(Error::CallbackPanicked { .. })));
    context.shutdown();
    assert!(!executor.spin_once().unwrap());
}

#[cfg(feature = "serde")]
#[test]
fn config_deserializes_with_defaults() {
    let config: ExecutorConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, ExecutorConfig::default());

    let config: ExecutorConfig = serde_json::from_str(r#"{"number_of_threads":3}"#).unwrap();
    assert_eq!(config.resolve().unwrap(), 3);
    assert_eq!(serde_json::to_string(&config).unwrap(), r#"{"number_of_threads":3}"#);
}
