//! Reference scenario graphs
//!
//! Every scenario takes a `String` input and produces `String` results, so
//! the runner can treat them uniformly.

use async_trait::async_trait;
use clap::ValueEnum;
use tickgraph_core::{
    Graph, GraphError, Input, Result, RunContext, State, StateHandle, StateId,
};

/// A scenario the runner knows how to wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// parse -> +3 -> toString
    Linear,
    /// parse fans out to +3 and +4, a combining sum joins them
    FanIn,
    /// +3/+4 loop until the sum reaches 20, then an adder joins the seed
    Loop,
    /// A poller re-enters itself until it is ready
    SelfLoop,
}

/// A wired scenario graph and its pins
pub struct Wired {
    pub graph: Graph,
    pub entry: StateId,
    pub result: StateId,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Linear,
        Scenario::FanIn,
        Scenario::Loop,
        Scenario::SelfLoop,
    ];

    /// Name accepted on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Linear => "linear",
            Scenario::FanIn => "fan-in",
            Scenario::Loop => "loop",
            Scenario::SelfLoop => "self-loop",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Linear => "parse -> +3 -> toString (\"3\" gives \"6\")",
            Scenario::FanIn => "parse -> {+3, +4} -> combining sum -> toString (\"3\" gives \"13\")",
            Scenario::Loop => {
                "looped +3/+4 sums until >= 20, merged with the seed by an adder (\"3\" gives \"36\")"
            }
            Scenario::SelfLoop => "poller re-enters itself until its third poll, then reports",
        }
    }

    /// Build the graph
    pub fn build(&self) -> Result<Wired> {
        match self {
            Scenario::Linear => linear(),
            Scenario::FanIn => fan_in(),
            Scenario::Loop => looped(),
            Scenario::SelfLoop => self_loop(),
        }
    }
}

fn parse(graph: &mut Graph) -> StateHandle<String, i64> {
    graph.add_fn_state("parse", |input: Input<String>, _ctx| {
        Box::pin(async move {
            let raw = input.into_value();
            raw.trim()
                .parse::<i64>()
                .map_err(|e| GraphError::node_execution("parse", format!("'{}': {}", raw, e)))
        })
    })
}

fn plus(graph: &mut Graph, amount: i64) -> StateHandle<i64, i64> {
    graph.add_fn_state(format!("plus{}", amount), move |input: Input<i64>, _ctx| {
        Box::pin(async move { Ok(input.into_value() + amount) })
    })
}

fn sum(graph: &mut Graph) -> StateHandle<i64, i64> {
    graph.add_combining_fn_state("sum", |input: Input<i64>, _ctx| {
        Box::pin(async move { Ok(input.into_iter().sum::<i64>()) })
    })
}

fn to_string(graph: &mut Graph) -> StateHandle<i64, String> {
    graph.add_fn_state("toString", |input: Input<i64>, _ctx| {
        Box::pin(async move { Ok(input.into_value().to_string()) })
    })
}

fn emit(graph: &mut Graph) -> StateHandle<String, String> {
    graph.add_fn_state("emit", |input: Input<String>, _ctx| {
        Box::pin(async move { Ok(input.into_value()) })
    })
}

fn linear() -> Result<Wired> {
    let mut graph = Graph::new();
    let parse = parse(&mut graph);
    let plus3 = plus(&mut graph, 3);
    let show = to_string(&mut graph);

    graph
        .connect(parse, |_| true, plus3)?
        .connect(plus3, |_| true, show)?
        .add_exit_edge(show, |_: &String| true)?;

    Ok(Wired {
        graph,
        entry: parse.id(),
        result: show.id(),
    })
}

fn fan_in() -> Result<Wired> {
    let mut graph = Graph::new();
    let parse = parse(&mut graph);
    let plus3 = plus(&mut graph, 3);
    let plus4 = plus(&mut graph, 4);
    let sum = sum(&mut graph);
    let emit = emit(&mut graph);

    graph
        .connect(parse, |_| true, plus3)?
        .connect(parse, |_| true, plus4)?
        .connect(plus3, |_| true, sum)?
        .connect(plus4, |_| true, sum)?
        .add_edge_with(sum, |_: &i64| true, |total: &i64| total.to_string(), emit)?
        .add_exit_edge(emit, |_: &String| true)?;

    Ok(Wired {
        graph,
        entry: parse.id(),
        result: emit.id(),
    })
}

/// Holds arrivals on the blackboard until two of them can be added
///
/// Keyed by run so concurrent batch executions keep separate buffers.
struct Adder;

impl Adder {
    fn key(ctx: &RunContext) -> String {
        format!("adder:{}", ctx.run_id())
    }
}

#[async_trait]
impl State for Adder {
    type Input = i64;
    type Output = Option<i64>;

    fn name(&self) -> &str {
        "adder"
    }

    fn on_enter(&self, input: &i64, ctx: &RunContext) {
        tracing::debug!(run_id = %ctx.run_id(), value = input, "Adder received value");
    }

    async fn invoke(&self, input: Input<i64>, ctx: &RunContext) -> Result<Option<i64>> {
        let key = Self::key(ctx);
        let value = input.into_value();
        let pending = ctx
            .properties()
            .update(key.clone(), Vec::<i64>::new(), |pending| pending.push(value));

        if pending.len() < 2 {
            return Ok(None);
        }
        ctx.properties().remove(&key);
        Ok(Some(pending.iter().sum()))
    }
}

fn looped() -> Result<Wired> {
    let mut graph = Graph::new();
    let parse = parse(&mut graph);
    let plus3 = plus(&mut graph, 3);
    let plus4 = plus(&mut graph, 4);
    let sum = sum(&mut graph);
    let adder = graph.add_state(Adder);
    let show = to_string(&mut graph);

    graph
        .connect(parse, |_| true, plus3)?
        .connect(parse, |_| true, plus4)?
        .connect(parse, |_| true, adder)?
        .connect(plus3, |_| true, sum)?
        .connect(plus4, |_| true, sum)?
        .connect(sum, |total| *total < 20, plus3)?
        .connect(sum, |total| *total < 20, plus4)?
        .connect(sum, |total| *total >= 20, adder)?
        .add_edge_with(
            adder,
            |total: &Option<i64>| total.is_some(),
            |total: &Option<i64>| total.unwrap_or_default(),
            show,
        )?
        .add_exit_edge(adder, |total: &Option<i64>| total.is_none())?
        .add_exit_edge(show, |_: &String| true)?;

    Ok(Wired {
        graph,
        entry: parse.id(),
        result: show.id(),
    })
}

const POLLS_UNTIL_READY: usize = 3;

fn self_loop() -> Result<Wired> {
    let mut graph = Graph::new();

    // No edge matches `None`, so an unready poll re-enters the poller
    let poll = graph.add_fn_state("poll", |input: Input<String>, ctx: RunContext| {
        Box::pin(async move {
            let key = format!("polls:{}", ctx.run_id());
            let polls = ctx.properties().update(key.clone(), 0usize, |n| *n += 1);
            if polls < POLLS_UNTIL_READY {
                return Ok(None);
            }
            ctx.properties().remove(&key);
            Ok(Some(format!("{} ready after {} polls", input.into_value(), polls)))
        })
    });
    let report = graph.add_fn_state("report", |input: Input<String>, ctx: RunContext| {
        Box::pin(async move {
            ctx.finish();
            Ok(input.into_value())
        })
    });

    graph.add_edge_with(
        poll,
        |status: &Option<String>| status.is_some(),
        |status: &Option<String>| status.clone().unwrap_or_default(),
        report,
    )?;

    Ok(Wired {
        graph,
        entry: poll.id(),
        result: report.id(),
    })
}
