//! Critical-path analysis: forward pass (earliest start/finish), backward
//! pass (latest start/finish), slack, and the chain of nodes with near-zero
//! slack, per spec.md §4.2.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::graph::FlowGraph;

const SLACK_TOLERANCE_MS: i64 = 1;

pub struct CriticalPathResult {
    pub on_critical_path: HashMap<Uuid, bool>,
    pub critical_path: Vec<Uuid>,
    pub critical_path_execution_time_ms: i64,
}

/// Topologically orders every node in `graph` by its `depends_on` edges.
/// Callers already guarantee acyclicity via `FlowGraph::validate`.
fn topo_order(graph: &FlowGraph) -> Vec<Uuid> {
    let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
    let mut successors: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

    for node in graph.nodes() {
        in_degree.entry(node.id).or_insert(0);
        for dep in &node.depends_on {
            *in_degree.entry(node.id).or_insert(0) += 1;
            successors.entry(*dep).or_default().push(node.id);
        }
    }

    let mut queue: VecDeque<Uuid> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(id, _)| *id).collect();
    let mut order = Vec::new();

    while let Some(id) = queue.pop_front() {
        order.push(id);
        if let Some(succs) = successors.get(&id) {
            for &s in succs {
                let d = in_degree.get_mut(&s).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push_back(s);
                }
            }
        }
    }

    order
}

pub fn analyze(graph: &FlowGraph) -> CriticalPathResult {
    let order = topo_order(graph);
    let duration = |id: &Uuid| graph.node(id).and_then(|n| n.execution_time_ms()).unwrap_or(0);

    let mut earliest_start: HashMap<Uuid, i64> = HashMap::new();
    let mut earliest_finish: HashMap<Uuid, i64> = HashMap::new();

    for id in &order {
        let node = graph.node(id).expect("topo_order only yields registered ids");
        let es = node.depends_on.iter().filter_map(|d| earliest_finish.get(d)).copied().max().unwrap_or(0);
        earliest_start.insert(*id, es);
        earliest_finish.insert(*id, es + duration(id));
    }

    let overall_finish = earliest_finish.values().copied().max().unwrap_or(0);

    let mut successors: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for node in graph.nodes() {
        for dep in &node.depends_on {
            successors.entry(*dep).or_default().push(node.id);
        }
    }

    let mut latest_finish: HashMap<Uuid, i64> = HashMap::new();
    let mut latest_start: HashMap<Uuid, i64> = HashMap::new();

    for id in order.iter().rev() {
        let lf = successors.get(id)
                            .map(|succs| succs.iter().filter_map(|s| latest_start.get(s)).copied().min().unwrap_or(overall_finish))
                            .unwrap_or(overall_finish);
        latest_finish.insert(*id, lf);
        latest_start.insert(*id, lf - duration(id));
    }

    let mut on_critical_path = HashMap::new();
    let mut critical_ids: Vec<Uuid> = Vec::new();

    for id in &order {
        let slack = latest_start[id] - earliest_start[id];
        let critical = slack.abs() <= SLACK_TOLERANCE_MS;
        on_critical_path.insert(*id, critical);
        if critical {
            critical_ids.push(*id);
        }
    }

    critical_ids.sort_by_key(|id| earliest_start[id]);

    let span = if critical_ids.is_empty() {
        0
    } else {
        let min_start = critical_ids.iter().map(|id| earliest_start[id]).min().unwrap_or(0);
        let max_finish = critical_ids.iter().map(|id| earliest_finish[id]).max().unwrap_or(0);
        max_finish - min_start
    };

    CriticalPathResult { on_critical_path, critical_path: critical_ids, critical_path_execution_time_ms: span }
}
