//! Scheduling guarantees: barriers, fan-out, lineage, worker budget,
//! cancellation and retries

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickgraph_core::{
    Engine, EngineConfig, Graph, GraphError, Input, ProcessId, RetryPolicy, RunContext, RunEvent,
    RunStatus, State,
};

type Log = Arc<Mutex<Vec<(String, usize)>>>;

fn recording(graph: &mut Graph, name: &'static str, log: &Log) -> tickgraph_core::StateHandle<i32, i32> {
    let log = log.clone();
    graph.add_fn_state(name, move |input: Input<i32>, ctx: RunContext| {
        let log = log.clone();
        Box::pin(async move {
            log.lock().push((name.to_string(), ctx.round()));
            Ok(input.into_value())
        })
    })
}

#[tokio::test]
async fn test_every_matching_edge_fires_in_the_same_round() {
    let log: Log = Arc::default();
    let mut graph = Graph::new();
    let source = recording(&mut graph, "source", &log);
    let positive = recording(&mut graph, "positive", &log);
    let large = recording(&mut graph, "large", &log);
    let negative = recording(&mut graph, "negative", &log);

    graph
        .connect(source, |v| *v > 0, positive)
        .unwrap()
        .connect(source, |v| *v > 5, large)
        .unwrap()
        .connect(source, |v| *v < 0, negative)
        .unwrap()
        .add_exit_edge(positive, |_: &i32| true)
        .unwrap()
        .add_exit_edge(large, |_: &i32| true)
        .unwrap()
        .add_exit_edge(negative, |_: &i32| true)
        .unwrap();

    let engine = Engine::new(graph);
    let mut run = engine.typed::<i32, i32>();
    run.set_entry(source).unwrap().set_result(large).unwrap();

    assert_eq!(run.run(9).await.unwrap(), vec![9]);

    let mut log = log.lock().clone();
    log.sort();
    assert_eq!(
        log,
        vec![
            ("large".to_string(), 2),
            ("positive".to_string(), 2),
            ("source".to_string(), 1),
        ]
    );
}

#[tokio::test]
async fn test_combining_state_sees_exactly_one_rounds_arrivals() {
    let counts = Arc::new(Mutex::new(Vec::new()));
    let mut graph = Graph::new();
    let split = graph.add_fn_state("split", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    });
    let fast = graph.add_fn_state("fast", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value() + 1) })
    });
    let slow = graph.add_fn_state("slow", |input: Input<i32>, _ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(input.into_value() + 2)
        })
    });
    let counts_in = counts.clone();
    let merge = graph.add_combining_fn_state("merge", move |input: Input<i32>, _ctx| {
        let counts = counts_in.clone();
        Box::pin(async move {
            counts.lock().push(input.count());
            Ok(input.into_iter().sum::<i32>())
        })
    });

    graph
        .connect(split, |_| true, fast)
        .unwrap()
        .connect(split, |_| true, slow)
        .unwrap()
        .connect(split, |_| true, slow)
        .unwrap()
        .connect(fast, |_| true, merge)
        .unwrap()
        .connect(slow, |_| true, merge)
        .unwrap()
        .add_exit_edge(merge, |_: &i32| true)
        .unwrap();

    let engine = Engine::new(graph);
    let mut run = engine.typed::<i32, i32>();
    run.set_entry(split).unwrap().set_result(merge).unwrap();

    // fast: 11, slow twice (two edges fired): 12 + 12
    assert_eq!(run.run(10).await.unwrap(), vec![35]);
    assert_eq!(*counts.lock(), vec![3]);
}

#[tokio::test]
async fn test_non_combining_results_keep_their_lineage() {
    let mut graph = Graph::new();
    let split = graph.add_fn_state("split", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    });
    let left = graph.add_fn_state("left", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value() + 100) })
    });
    let right = graph.add_fn_state("right", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value() + 200) })
    });
    let tag = graph.add_fn_state("tag", |input: Input<i32>, _ctx| {
        Box::pin(async move {
            assert_eq!(input.count(), 1);
            let id = input.process_ids()[0];
            Ok((input.into_value(), id))
        })
    });

    graph
        .connect(split, |_| true, left)
        .unwrap()
        .connect(split, |_| true, right)
        .unwrap()
        .connect(left, |_| true, tag)
        .unwrap()
        .connect(right, |_| true, tag)
        .unwrap()
        .add_exit_edge(tag, |_: &(i32, ProcessId)| true)
        .unwrap();

    let engine = Engine::new(graph);
    let mut run = engine.typed::<i32, (i32, ProcessId)>();
    run.set_entry(split).unwrap().set_result(tag).unwrap();

    let mut results = run.run(3).await.unwrap();
    results.sort_by_key(|(value, _)| *value);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, 103);
    assert_eq!(results[1].0, 203);
    assert_ne!(results[0].1, results[1].1);
}

#[tokio::test]
async fn test_no_state_starts_next_round_before_slow_state_finishes() {
    let slow_done = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let mut graph = Graph::new();
    let split = graph.add_fn_state("split", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    });
    let done = slow_done.clone();
    let slow = graph.add_fn_state("slow", move |input: Input<i32>, _ctx| {
        let done = done.clone();
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            done.store(true, Ordering::SeqCst);
            Ok(input.into_value())
        })
    });
    let fast = graph.add_fn_state("fast", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    });
    let (done, seen) = (slow_done.clone(), observed.clone());
    let observe = graph.add_fn_state("observe", move |input: Input<i32>, _ctx| {
        let (done, seen) = (done.clone(), seen.clone());
        Box::pin(async move {
            seen.lock().push(done.load(Ordering::SeqCst));
            Ok(input.into_value())
        })
    });

    graph
        .connect(split, |_| true, slow)
        .unwrap()
        .connect(split, |_| true, fast)
        .unwrap()
        .connect(slow, |_| true, observe)
        .unwrap()
        .connect(fast, |_| true, observe)
        .unwrap()
        .add_exit_edge(observe, |_: &i32| true)
        .unwrap();

    let engine = Engine::new(graph);
    let mut run = engine.typed::<i32, i32>();
    run.set_entry(split).unwrap().set_result(observe).unwrap();
    run.run(1).await.unwrap();

    assert_eq!(*observed.lock(), vec![true, true]);
}

#[tokio::test]
async fn test_worker_budget_caps_concurrent_invocations() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut graph = Graph::new();
    let split = graph.add_fn_state("split", |input: Input<u32>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    });
    let (current, max) = (in_flight.clone(), peak.clone());
    let work = graph.add_fn_state("work", move |_input: Input<u32>, _ctx| {
        let (current, max) = (current.clone(), max.clone());
        Box::pin(async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(1u32)
        })
    });
    let count = graph.add_combining_fn_state("count", |input: Input<u32>, _ctx| {
        Box::pin(async move { Ok(input.into_iter().sum::<u32>()) })
    });

    for _ in 0..6 {
        graph.connect(split, |_| true, work).unwrap();
    }
    graph
        .connect(work, |_| true, count)
        .unwrap()
        .add_exit_edge(count, |_: &u32| true)
        .unwrap();

    let config = EngineConfig::default().with_max_concurrency(2);
    let engine = Engine::with_config(graph, config).unwrap();
    let mut run = engine.typed::<u32, u32>();
    run.set_entry(split).unwrap().set_result(count).unwrap();

    assert_eq!(run.run(0).await.unwrap(), vec![6]);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

fn spinning_engine(config: EngineConfig) -> (Engine, tickgraph_core::StateHandle<u32, u32>) {
    let mut graph = Graph::new();
    let spin = graph.add_fn_state("spin", |input: Input<u32>, _ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(input.into_value())
        })
    });
    (Engine::with_config(graph, config).unwrap(), spin)
}

#[tokio::test]
async fn test_stop_cancels_in_flight_run() {
    let (engine, spin) = spinning_engine(EngineConfig::default());
    let mut events = engine.subscribe();
    let mut run = engine.typed::<u32, u32>();
    run.set_entry(spin).unwrap().set_result(spin).unwrap();

    let (report, _) = tokio::join!(run.execute(7), async {
        tokio::time::sleep(Duration::from_millis(35)).await;
        run.stop();
    });

    let report = report.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.rounds >= 1);
    // Results of completed rounds are still reported
    assert_eq!(report.results.len(), report.rounds);

    let mut last = None;
    let mut exits = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RunEvent::StateExited { .. }) {
            exits += 1;
        }
        last = Some(event);
    }
    assert!(exits >= report.rounds);
    assert!(matches!(
        last,
        Some(RunEvent::RunFinished {
            status: RunStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn test_node_can_cancel_its_own_run() {
    let mut graph = Graph::new();
    let quit = graph.add_fn_state("quit", |input: Input<u32>, ctx: RunContext| {
        Box::pin(async move {
            if ctx.round() == 2 {
                ctx.stop();
            }
            Ok(input.into_value())
        })
    });

    let engine = Engine::new(graph);
    let mut run = engine.typed::<u32, u32>();
    run.set_entry(quit).unwrap().set_result(quit).unwrap();

    assert!(matches!(run.run(1).await, Err(GraphError::Cancelled)));
    // Cancelling one execution leaves the wrapper usable
    assert!(!run.is_stopped());
}

fn flaky_engine(failures: usize, config: EngineConfig) -> (Engine, Arc<AtomicUsize>, tickgraph_core::StateHandle<u32, u32>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut graph = Graph::new();
    let flaky = graph.add_fn_state("flaky", move |input: Input<u32>, _ctx| {
        let counter = counter.clone();
        Box::pin(async move {
            if counter.fetch_add(1, Ordering::SeqCst) < failures {
                return Err(GraphError::Execution("transient".to_string()));
            }
            Ok(input.into_value() + 1)
        })
    });
    graph.add_exit_edge(flaky, |_: &u32| true).unwrap();
    (Engine::with_config(graph, config).unwrap(), calls, flaky)
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::enabled()
        .with_initial_interval(0.001)
        .with_max_interval(0.005)
        .with_jitter(false)
}

#[tokio::test]
async fn test_failure_propagates_without_retry() {
    let (engine, calls, flaky) = flaky_engine(1, EngineConfig::default());
    let mut events = engine.subscribe();
    let mut run = engine.typed::<u32, u32>();
    run.set_entry(flaky).unwrap().set_result(flaky).unwrap();

    let err = run.run(1).await.unwrap_err();
    assert!(matches!(err, GraphError::NodeExecution { ref node, .. } if node == "flaky"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        failed |= matches!(event, RunEvent::RunFailed { .. });
    }
    assert!(failed);
}

#[tokio::test]
async fn test_retry_recovers_within_budget() {
    let config = EngineConfig::default().with_retry(fast_retry());
    let (engine, calls, flaky) = flaky_engine(2, config);
    let mut run = engine.typed::<u32, u32>();
    run.set_entry(flaky).unwrap().set_result(flaky).unwrap();

    assert_eq!(run.run(1).await.unwrap(), vec![2]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_gives_up_when_budget_spent() {
    let mut config = EngineConfig::default().with_retry(fast_retry());
    config.default_retry_budget = 1;
    let (engine, calls, flaky) = flaky_engine(5, config);
    let mut run = engine.typed::<u32, u32>();
    run.set_entry(flaky).unwrap().set_result(flaky).unwrap();

    assert!(matches!(run.run(1).await, Err(GraphError::NodeExecution { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

type Hooks = Arc<Mutex<Vec<&'static str>>>;

#[derive(Clone, Copy)]
enum Behaviour {
    Sum,
    Spin,
    Fail,
}

/// Records its lifecycle hooks and invocations in order
struct Hooked {
    behaviour: Behaviour,
    hooks: Hooks,
}

#[async_trait]
impl State for Hooked {
    type Input = i32;
    type Output = i32;

    fn name(&self) -> &str {
        "hooked"
    }

    fn combine_input(&self) -> bool {
        matches!(self.behaviour, Behaviour::Sum)
    }

    async fn invoke(&self, input: Input<i32>, _ctx: &RunContext) -> tickgraph_core::Result<i32> {
        self.hooks.lock().push("invoke");
        match self.behaviour {
            Behaviour::Sum => Ok(input.into_iter().sum()),
            Behaviour::Spin => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(input.into_value())
            }
            Behaviour::Fail => Err(GraphError::node_execution("hooked", "refused")),
        }
    }

    fn on_enter(&self, _input: &i32, _ctx: &RunContext) {
        self.hooks.lock().push("enter");
    }

    fn on_exit(&self, _ctx: &RunContext) {
        self.hooks.lock().push("exit");
    }
}

fn count(hooks: &Hooks, hook: &str) -> usize {
    hooks.lock().iter().filter(|h| **h == hook).count()
}

#[tokio::test]
async fn test_hooks_fire_per_arrival_and_per_round() {
    let hooks: Hooks = Arc::default();
    let mut graph = Graph::new();
    let split = graph.add_fn_state("split", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    });
    let left = graph.add_fn_state("left", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value() + 1) })
    });
    let right = graph.add_fn_state("right", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value() + 2) })
    });
    let join = graph.add_state(Hooked {
        behaviour: Behaviour::Sum,
        hooks: hooks.clone(),
    });
    graph
        .connect(split, |_| true, left)
        .unwrap()
        .connect(split, |_| true, right)
        .unwrap()
        .connect(left, |_| true, join)
        .unwrap()
        .connect(right, |_| true, join)
        .unwrap()
        .add_exit_edge(join, |_: &i32| true)
        .unwrap();

    let engine = Engine::new(graph);
    let mut run = engine.typed::<i32, i32>();
    run.set_entry(split).unwrap().set_result(join).unwrap();

    assert_eq!(run.run(10).await.unwrap(), vec![23]);
    // Both arrivals are announced before the single combined invocation
    assert_eq!(*hooks.lock(), vec!["enter", "enter", "invoke", "exit"]);
}

#[tokio::test]
async fn test_cancelled_run_exits_hooked_state() {
    let hooks: Hooks = Arc::default();
    let mut graph = Graph::new();
    // No outgoing edge, so every round re-enters the state
    let spin = graph.add_state(Hooked {
        behaviour: Behaviour::Spin,
        hooks: hooks.clone(),
    });

    let engine = Engine::new(graph);
    let mut run = engine.typed::<i32, i32>();
    run.set_entry(spin).unwrap().set_result(spin).unwrap();

    let (report, _) = tokio::join!(run.execute(1), async {
        tokio::time::sleep(Duration::from_millis(35)).await;
        run.stop();
    });

    let report = report.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.rounds >= 1);
    assert_eq!(count(&hooks, "invoke"), report.rounds);
    // Every activation is matched by an exit, including the cancelled one
    assert_eq!(count(&hooks, "enter"), count(&hooks, "exit"));
    assert!(count(&hooks, "exit") >= report.rounds);
    assert_eq!(hooks.lock().last(), Some(&"exit"));
}

#[tokio::test]
async fn test_failed_run_exits_hooked_state() {
    let hooks: Hooks = Arc::default();
    let mut graph = Graph::new();
    let fail = graph.add_state(Hooked {
        behaviour: Behaviour::Fail,
        hooks: hooks.clone(),
    });

    let engine = Engine::new(graph);
    let mut run = engine.typed::<i32, i32>();
    run.set_entry(fail).unwrap().set_result(fail).unwrap();

    assert!(matches!(run.run(1).await, Err(GraphError::NodeExecution { .. })));
    assert_eq!(*hooks.lock(), vec!["enter", "invoke", "exit"]);
}

#[test]
fn test_wiring_errors_surface_before_any_run() {
    let mut graph = Graph::new();
    let number = graph.add_fn_state("number", |input: Input<i32>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    });
    let text = graph.add_fn_state("text", |input: Input<String>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    });

    let err = graph.add_edge(number, |_: &i32| true, text).unwrap_err();
    assert!(err.is_wiring());

    let engine = Engine::new(graph);
    let mut run = engine.typed::<String, i32>();
    assert!(matches!(run.set_entry(number), Err(GraphError::TypeMismatch { .. })));
    assert!(matches!(run.set_result(text), Err(GraphError::TypeMismatch { .. })));
}
