//! Per-step execution planning for the children of an aggregate.
//!
//! For one iteration step of a host aggregate, every child is mapped to the
//! siblings it depends on, feedback edges through data buffers are dropped,
//! and the remaining graph is ordered upstream-first starting from its dead
//! ends (children no sibling depends on).

use crate::model::component::split_reference;
use crate::model::{AdvanceParameter, ComponentId, ModelError, ModelResult, Repository};
use std::cmp::Reverse;
use std::collections::VecDeque;

/// Planning statistics, logged at debug level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanStats {
    pub children: usize,
    pub dead_ends: usize,
    pub feedback_edges: usize,
    pub plan_time_us: u64,
}

/// Children of a host in execution order for one step.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub order: Vec<ComponentId>,
    pub stats: PlanStats,
}

/// Plans the execution order of an aggregate's children.
pub struct StepScheduler;

impl StepScheduler {
    /// Plan the children of `host` for iteration step `host_step`.
    ///
    /// Each child appears at most once in the returned order.
    pub fn plan(
        repo: &Repository,
        host: ComponentId,
        host_step: usize,
    ) -> ModelResult<ExecutionPlan> {
        let start_time = std::time::Instant::now();
        let children = repo.children_of(host).to_vec();
        let n = children.len();
        if n == 0 {
            return Ok(ExecutionPlan::default());
        }

        let mut deps = Self::dependencies(repo, host, &children, host_step);
        let feedback_edges = Self::drop_feedback_edges(repo, &children, &mut deps);

        let mut dependents = vec![Vec::new(); n];
        for (consumer, sources) in deps.iter().enumerate() {
            for &source in sources {
                dependents[source].push(consumer);
            }
        }
        Self::check_acyclic(repo, &children, &deps, &dependents)?;

        let mut dead_ends: Vec<usize> = (0..n).filter(|&i| dependents[i].is_empty()).collect();
        dead_ends.sort_by_key(|&i| {
            let level = repo.get(children[i]).map(|c| c.time_level()).unwrap_or(0);
            (Reverse(level), i)
        });

        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);
        for &end in &dead_ends {
            Self::visit(end, &deps, &mut visited, &mut order);
        }

        let stats = PlanStats {
            children: n,
            dead_ends: dead_ends.len(),
            feedback_edges,
            plan_time_us: start_time.elapsed().as_micros() as u64,
        };
        tracing::trace!("Planned '{}' step {}: {:?}", repo.name_of(host), host_step, stats);

        Ok(ExecutionPlan {
            order: order.into_iter().map(|i| children[i]).collect(),
            stats,
        })
    }

    /// `deps[i]` = indices of the siblings child `i` reads from this step.
    fn dependencies(
        repo: &Repository,
        host: ComponentId,
        children: &[ComponentId],
        host_step: usize,
    ) -> Vec<Vec<usize>> {
        children
            .iter()
            .map(|&child| {
                let mut sources = Vec::new();
                for reference in Self::references(repo, child, host_step) {
                    let (name, _) = split_reference(&reference);
                    // unregistered inputs are reported when linking
                    let Some(target) = repo.id_of(name) else {
                        continue;
                    };
                    let Some(sibling) = Self::sibling_of(repo, host, target) else {
                        continue;
                    };
                    if sibling == child {
                        continue;
                    }
                    if let Some(idx) = children.iter().position(|c| *c == sibling) {
                        if !sources.contains(&idx) {
                            sources.push(idx);
                        }
                    }
                }
                sources
            })
            .collect()
    }

    /// Input references of `id` that apply to this step.
    ///
    /// Aggregates are pass-through boundaries: they read whatever any of
    /// their descendants read, across all steps.
    fn references(repo: &Repository, id: ComponentId, host_step: usize) -> Vec<String> {
        let Some(component) = repo.get(id) else {
            return Vec::new();
        };
        let inputs = component.inputs();

        if let Some(process) = component.process() {
            let state = process.state();
            return state
                .parameter_handling
                .index(state.param_pos(), host_step, inputs.len())
                .map(|i| inputs[i].clone())
                .unwrap_or_default();
        }
        if component.is_data() {
            return AdvanceParameter::UseUp
                .index(component.fetches(), host_step, inputs.len())
                .and_then(|i| inputs[i].first().cloned())
                .into_iter()
                .collect();
        }
        repo.subtree(id)
            .into_iter()
            .skip(1)
            .filter_map(|sub| repo.get(sub))
            .flat_map(|c| c.inputs().iter().flatten().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// The child of `host` that is or contains `target`.
    fn sibling_of(repo: &Repository, host: ComponentId, target: ComponentId) -> Option<ComponentId> {
        std::iter::once(target)
            .chain(repo.host_chain_ids(target))
            .find(|id| repo.get(*id).and_then(|c| c.host()) == Some(host))
    }

    /// Remove edges from a data buffer into a child the buffer itself
    /// depends on. Returns the number of edges removed.
    fn drop_feedback_edges(
        repo: &Repository,
        children: &[ComponentId],
        deps: &mut [Vec<usize>],
    ) -> usize {
        let snapshot = deps.to_vec();
        let mut dropped = 0;
        for (consumer, sources) in deps.iter_mut().enumerate() {
            sources.retain(|&source| {
                let is_buffer = repo.get(children[source]).map(|c| c.is_data()).unwrap_or(false);
                let feedback = is_buffer && Self::reaches(&snapshot, source, consumer);
                if feedback {
                    tracing::trace!(
                        "Feedback edge {} -> {} uses the buffer's previous value",
                        repo.name_of(children[source]),
                        repo.name_of(children[consumer])
                    );
                    dropped += 1;
                }
                !feedback
            });
        }
        dropped
    }

    /// True if `from` depends, directly or transitively, on `to`.
    fn reaches(deps: &[Vec<usize>], from: usize, to: usize) -> bool {
        let mut seen = vec![false; deps.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            for &next in &deps[node] {
                if next == to {
                    return true;
                }
                if !seen[next] {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }
        false
    }

    /// Kahn's algorithm; anything left over sits on a cycle.
    fn check_acyclic(
        repo: &Repository,
        children: &[ComponentId],
        deps: &[Vec<usize>],
        dependents: &[Vec<usize>],
    ) -> ModelResult<()> {
        let n = children.len();
        let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut done = 0;

        while let Some(node) = queue.pop_front() {
            done += 1;
            for &next in &dependents[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if done == n {
            return Ok(());
        }
        let names = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| repo.name_of(children[i]).to_string())
            .collect();
        Err(ModelError::CycleDetected(names))
    }

    fn visit(node: usize, deps: &[Vec<usize>], visited: &mut [bool], order: &mut Vec<usize>) {
        if visited[node] {
            return;
        }
        visited[node] = true;
        for &source in &deps[node] {
            Self::visit(source, deps, visited, order);
        }
        order.push(node);
    }
}
