//! Structural validation of pipeline graphs.
//!
//! All violations are raised before any provider executes. Validation
//! also computes the fork -> join pairing the scheduler walks with.

use super::definition::{NodeKind, PipelineDefinition};
use crate::errors::EngineError;
use std::collections::{HashMap, HashSet, VecDeque};

/// Adjacency and pairing data computed once per definition.
#[derive(Debug, Clone)]
pub struct GraphIndex {
    start: String,
    outgoing: HashMap<String, Vec<String>>,
    fork_joins: HashMap<String, String>,
}

impl GraphIndex {
    /// The single start node id.
    #[must_use]
    pub fn start(&self) -> &str {
        &self.start
    }

    /// Outgoing targets of a node, in edge declaration order.
    #[must_use]
    pub fn outgoing(&self, id: &str) -> &[String] {
        self.outgoing.get(id).map_or(&[], Vec::as_slice)
    }

    /// The join every branch of the given fork converges at.
    #[must_use]
    pub fn join_for_fork(&self, fork_id: &str) -> Option<&str> {
        self.fork_joins.get(fork_id).map(String::as_str)
    }
}

/// A definition that passed structural validation, plus its index.
#[derive(Debug, Clone)]
pub struct ValidatedPipeline {
    /// The definition as loaded.
    pub definition: PipelineDefinition,
    /// Adjacency and fork/join pairing.
    pub index: GraphIndex,
}

/// Validates a definition and builds its [`GraphIndex`].
///
/// Checks, in order: unique node ids, edge endpoints, exactly one start,
/// per-kind arity rules, acyclicity, reachability from start, at least
/// one reachable end, and fork/join pairing.
pub fn validate(definition: PipelineDefinition) -> Result<ValidatedPipeline, EngineError> {
    let mut kinds: HashMap<&str, NodeKind> = HashMap::new();
    for node in &definition.nodes {
        if kinds.insert(&node.id, node.kind).is_some() {
            return Err(EngineError::invalid_graph(
                format!("duplicate node id '{}'", node.id),
                vec![node.id.clone()],
            ));
        }
    }

    let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
    let mut incoming: HashMap<String, usize> = HashMap::new();
    for edge in &definition.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !kinds.contains_key(endpoint.as_str()) {
                return Err(EngineError::invalid_graph(
                    format!("edge references unknown node '{endpoint}'"),
                    vec![endpoint.clone()],
                ));
            }
        }
        outgoing
            .entry(edge.source.clone())
            .or_default()
            .push(edge.target.clone());
        *incoming.entry(edge.target.clone()).or_default() += 1;
    }

    let starts: Vec<&str> = definition
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Start)
        .map(|n| n.id.as_str())
        .collect();
    let start = match starts.as_slice() {
        [only] => (*only).to_string(),
        [] => {
            return Err(EngineError::invalid_graph(
                "graph has no start node",
                Vec::new(),
            ))
        }
        many => {
            return Err(EngineError::invalid_graph(
                "graph has more than one start node",
                many.iter().map(|s| (*s).to_string()).collect(),
            ))
        }
    };

    for node in &definition.nodes {
        let out = outgoing.get(&node.id).map_or(0, Vec::len);
        let inc = incoming.get(&node.id).copied().unwrap_or(0);
        match node.kind {
            NodeKind::Start => {
                if inc != 0 || out != 1 {
                    return Err(EngineError::invalid_graph(
                        format!("start node '{}' must have no incoming and one outgoing edge", node.id),
                        vec![node.id.clone()],
                    ));
                }
            }
            NodeKind::Provider => {
                if node.data.provider_ref.is_none() {
                    return Err(EngineError::invalid_graph(
                        format!("provider node '{}' has no provider_ref", node.id),
                        vec![node.id.clone()],
                    ));
                }
                if out != 1 {
                    return Err(EngineError::invalid_graph(
                        format!("provider node '{}' must have exactly one outgoing edge", node.id),
                        vec![node.id.clone()],
                    ));
                }
            }
            NodeKind::Fork => {
                if out < 2 {
                    return Err(EngineError::invalid_graph(
                        format!("fork node '{}' must have at least two outgoing edges", node.id),
                        vec![node.id.clone()],
                    ));
                }
                if let Some(declared) = node.data.branches {
                    if declared != out {
                        return Err(EngineError::invalid_graph(
                            format!(
                                "fork node '{}' declares {declared} branches but has {out} outgoing edges",
                                node.id
                            ),
                            vec![node.id.clone()],
                        ));
                    }
                }
            }
            NodeKind::Join => {
                if out != 1 {
                    return Err(EngineError::invalid_graph(
                        format!("join node '{}' must have exactly one outgoing edge", node.id),
                        vec![node.id.clone()],
                    ));
                }
            }
            NodeKind::End => {
                if out != 0 {
                    return Err(EngineError::invalid_graph(
                        format!("end node '{}' must have no outgoing edges", node.id),
                        vec![node.id.clone()],
                    ));
                }
            }
        }
    }

    detect_cycle(&definition, &outgoing, &incoming)?;

    // Reachability from start; anything unreachable is an orphan.
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    reachable.insert(start.as_str());
    queue.push_back(start.as_str());
    while let Some(current) = queue.pop_front() {
        if let Some(targets) = outgoing.get(current) {
            for target in targets {
                if reachable.insert(target.as_str()) {
                    queue.push_back(target.as_str());
                }
            }
        }
    }
    let orphans: Vec<String> = definition
        .nodes
        .iter()
        .filter(|n| !reachable.contains(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect();
    if !orphans.is_empty() {
        return Err(EngineError::invalid_graph(
            format!("orphan nodes not reachable from start: {orphans:?}"),
            orphans,
        ));
    }

    if !definition.nodes.iter().any(|n| n.kind == NodeKind::End) {
        return Err(EngineError::invalid_graph(
            "graph has no end node",
            Vec::new(),
        ));
    }

    let fork_joins = pair_forks(&definition, &outgoing, &kinds)?;

    Ok(ValidatedPipeline {
        index: GraphIndex {
            start,
            outgoing,
            fork_joins,
        },
        definition,
    })
}

/// Kahn's algorithm; leftover nodes are on a cycle.
fn detect_cycle(
    definition: &PipelineDefinition,
    outgoing: &HashMap<String, Vec<String>>,
    incoming: &HashMap<String, usize>,
) -> Result<(), EngineError> {
    let mut degree: HashMap<&str, usize> = definition
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), incoming.get(&n.id).copied().unwrap_or(0)))
        .collect();
    let mut queue: VecDeque<&str> = degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0usize;
    while let Some(current) = queue.pop_front() {
        visited += 1;
        if let Some(targets) = outgoing.get(current) {
            for target in targets {
                if let Some(d) = degree.get_mut(target.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(target.as_str());
                    }
                }
            }
        }
    }

    if visited < definition.nodes.len() {
        let cyclic: Vec<String> = degree
            .into_iter()
            .filter(|&(_, d)| d > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        return Err(EngineError::invalid_graph(
            format!("graph contains a cycle involving: {cyclic:?}"),
            cyclic,
        ));
    }
    Ok(())
}

/// Pairs every fork with the single join all of its branches converge at
/// before touching any node outside the fork/join region. Nested forks
/// are skipped over via their own pairing, innermost first.
fn pair_forks(
    definition: &PipelineDefinition,
    outgoing: &HashMap<String, Vec<String>>,
    kinds: &HashMap<&str, NodeKind>,
) -> Result<HashMap<String, String>, EngineError> {
    let mut pairs: HashMap<String, String> = HashMap::new();
    for node in &definition.nodes {
        if node.kind == NodeKind::Fork {
            resolve_fork(&node.id, definition, outgoing, kinds, &mut pairs)?;
        }
    }
    Ok(pairs)
}

fn resolve_fork(
    fork_id: &str,
    definition: &PipelineDefinition,
    outgoing: &HashMap<String, Vec<String>>,
    kinds: &HashMap<&str, NodeKind>,
    pairs: &mut HashMap<String, String>,
) -> Result<String, EngineError> {
    if let Some(join) = pairs.get(fork_id) {
        return Ok(join.clone());
    }

    let branches = outgoing.get(fork_id).cloned().unwrap_or_default();
    let mut join: Option<String> = None;
    for branch_head in &branches {
        let found = walk_branch_to_join(branch_head, definition, outgoing, kinds, pairs, fork_id)?;
        match &join {
            None => join = Some(found),
            Some(existing) if *existing == found => {}
            Some(existing) => {
                return Err(EngineError::invalid_graph(
                    format!(
                        "fork '{fork_id}' branches converge at different joins ('{existing}' vs '{found}')"
                    ),
                    vec![fork_id.to_string(), existing.clone(), found],
                ));
            }
        }
    }
    let join = join.ok_or_else(|| {
        EngineError::invalid_graph(
            format!("fork '{fork_id}' has no branches"),
            vec![fork_id.to_string()],
        )
    })?;
    pairs.insert(fork_id.to_string(), join.clone());
    Ok(join)
}

/// Follows one branch from a fork until its join, resolving nested forks
/// through their own matching joins.
fn walk_branch_to_join(
    from: &str,
    definition: &PipelineDefinition,
    outgoing: &HashMap<String, Vec<String>>,
    kinds: &HashMap<&str, NodeKind>,
    pairs: &mut HashMap<String, String>,
    fork_id: &str,
) -> Result<String, EngineError> {
    let mut current = from.to_string();
    loop {
        match kinds.get(current.as_str()) {
            Some(NodeKind::Join) => return Ok(current),
            Some(NodeKind::Provider) => {
                current = single_outgoing(&current, outgoing, fork_id)?;
            }
            Some(NodeKind::Fork) => {
                let inner_join = resolve_fork(&current, definition, outgoing, kinds, pairs)?;
                current = single_outgoing(&inner_join, outgoing, fork_id)?;
            }
            Some(NodeKind::End) => {
                return Err(EngineError::invalid_graph(
                    format!("branch of fork '{fork_id}' reaches end without a join"),
                    vec![fork_id.to_string(), current],
                ));
            }
            Some(NodeKind::Start) | None => {
                return Err(EngineError::invalid_graph(
                    format!("branch of fork '{fork_id}' passes through invalid node '{current}'"),
                    vec![fork_id.to_string(), current],
                ));
            }
        }
    }
}

fn single_outgoing(
    id: &str,
    outgoing: &HashMap<String, Vec<String>>,
    fork_id: &str,
) -> Result<String, EngineError> {
    outgoing
        .get(id)
        .and_then(|targets| targets.first())
        .cloned()
        .ok_or_else(|| {
            EngineError::invalid_graph(
                format!("branch of fork '{fork_id}' dead-ends at '{id}'"),
                vec![fork_id.to_string(), id.to_string()],
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definition::{Edge, JoinStrategy, Node, NodeKind};

    fn linear() -> PipelineDefinition {
        PipelineDefinition {
            schema_ref: "t".to_string(),
            nodes: vec![
                Node::new("start", NodeKind::Start),
                Node::provider("p1", "tts.default"),
                Node::new("end", NodeKind::End),
            ],
            edges: vec![Edge::new("start", "p1"), Edge::new("p1", "end")],
        }
    }

    fn forked() -> PipelineDefinition {
        PipelineDefinition {
            schema_ref: "t".to_string(),
            nodes: vec![
                Node::new("start", NodeKind::Start),
                Node::new("f1", NodeKind::Fork),
                Node::provider("a", "vendor.image"),
                Node::provider("b", "vendor.video"),
                Node::join("j1", JoinStrategy::All),
                Node::new("end", NodeKind::End),
            ],
            edges: vec![
                Edge::new("start", "f1"),
                Edge::new("f1", "a"),
                Edge::new("f1", "b"),
                Edge::new("a", "j1"),
                Edge::new("b", "j1"),
                Edge::new("j1", "end"),
            ],
        }
    }

    #[test]
    fn test_accepts_linear_chain() {
        let validated = validate(linear()).unwrap();
        assert_eq!(validated.index.start(), "start");
        assert_eq!(validated.index.outgoing("p1"), &["end".to_string()]);
    }

    #[test]
    fn test_accepts_fork_join_and_pairs_them() {
        let validated = validate(forked()).unwrap();
        assert_eq!(validated.index.join_for_fork("f1"), Some("j1"));
    }

    #[test]
    fn test_rejects_cycle() {
        // A back edge into a join keeps per-node arity legal, so the
        // cycle check is what fires.
        let def = PipelineDefinition {
            schema_ref: "t".to_string(),
            nodes: vec![
                Node::new("start", NodeKind::Start),
                Node::provider("p1", "a"),
                Node::join("j1", JoinStrategy::All),
                Node::provider("p2", "b"),
                Node::new("end", NodeKind::End),
            ],
            edges: vec![
                Edge::new("start", "p1"),
                Edge::new("p1", "j1"),
                Edge::new("j1", "p2"),
                Edge::new("p2", "j1"),
            ],
        };
        let err = validate(def).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_rejects_orphan() {
        let mut def = linear();
        def.nodes.push(Node::provider("lost", "x"));
        def.nodes.push(Node::new("lost_end", NodeKind::End));
        def.edges.push(Edge::new("lost", "lost_end"));
        let err = validate(def).unwrap_err();
        assert!(err.to_string().contains("orphan"));
    }

    #[test]
    fn test_rejects_two_starts() {
        let mut def = linear();
        def.nodes.push(Node::new("start2", NodeKind::Start));
        def.edges.push(Edge::new("start2", "p1"));
        let err = validate(def).unwrap_err();
        assert!(err.to_string().contains("more than one start"));
    }

    #[test]
    fn test_rejects_branch_count_mismatch() {
        let mut def = forked();
        for node in &mut def.nodes {
            if node.id == "f1" {
                node.data.branches = Some(3);
            }
        }
        let err = validate(def).unwrap_err();
        assert!(err.to_string().contains("declares 3 branches"));
    }

    #[test]
    fn test_rejects_fork_branch_escaping_to_end() {
        let def = PipelineDefinition {
            schema_ref: "t".to_string(),
            nodes: vec![
                Node::new("start", NodeKind::Start),
                Node::new("f1", NodeKind::Fork),
                Node::provider("a", "x"),
                Node::provider("b", "y"),
                Node::join("j1", JoinStrategy::All),
                Node::new("end", NodeKind::End),
                Node::new("end2", NodeKind::End),
            ],
            edges: vec![
                Edge::new("start", "f1"),
                Edge::new("f1", "a"),
                Edge::new("f1", "b"),
                Edge::new("a", "j1"),
                Edge::new("b", "end2"),
                Edge::new("j1", "end"),
            ],
        };
        let err = validate(def).unwrap_err();
        assert!(err.to_string().contains("without a join"));
    }

    #[test]
    fn test_nested_fork_pairing() {
        let def = PipelineDefinition {
            schema_ref: "t".to_string(),
            nodes: vec![
                Node::new("start", NodeKind::Start),
                Node::new("outer", NodeKind::Fork),
                Node::provider("a", "x"),
                Node::new("inner", NodeKind::Fork),
                Node::provider("b1", "y"),
                Node::provider("b2", "z"),
                Node::join("inner_j", JoinStrategy::All),
                Node::join("outer_j", JoinStrategy::All),
                Node::new("end", NodeKind::End),
            ],
            edges: vec![
                Edge::new("start", "outer"),
                Edge::new("outer", "a"),
                Edge::new("outer", "inner"),
                Edge::new("inner", "b1"),
                Edge::new("inner", "b2"),
                Edge::new("b1", "inner_j"),
                Edge::new("b2", "inner_j"),
                Edge::new("inner_j", "outer_j"),
                Edge::new("a", "outer_j"),
                Edge::new("outer_j", "end"),
            ],
        };
        let validated = validate(def).unwrap();
        assert_eq!(validated.index.join_for_fork("inner"), Some("inner_j"));
        assert_eq!(validated.index.join_for_fork("outer"), Some("outer_j"));
    }

    #[test]
    fn test_rejects_provider_without_ref() {
        let mut def = linear();
        for node in &mut def.nodes {
            if node.id == "p1" {
                node.data.provider_ref = None;
            }
        }
        let err = validate(def).unwrap_err();
        assert!(err.to_string().contains("no provider_ref"));
    }
}
