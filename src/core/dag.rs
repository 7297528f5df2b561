//! Task dependency graph.
//!
//! Nodes are task declarations, edges point from a prerequisite to the
//! task that needs it. The graph is validated when it is built: every
//! prerequisite must be declared, names must be unique, and there must
//! be no cycles.

use crate::core::task::Task;
use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, kosaraju_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

pub struct TaskGraph {
    graph: DiGraph<Task, ()>,
    /// Name to node lookup.
    task_index: HashMap<String, NodeIndex>,
    /// Names in declaration order.
    order: Vec<String>,
}

impl TaskGraph {
    /// Build and validate the graph from declarations.
    ///
    /// # Errors
    /// - `DuplicateTask` if two declarations share a name
    /// - `UnknownPrerequisite` if a task needs an undeclared task
    /// - `Cycle` if prerequisites loop back on themselves
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut task_index = HashMap::new();
        let mut order = Vec::with_capacity(tasks.len());

        for task in tasks {
            if task_index.contains_key(&task.name) {
                return Err(Error::DuplicateTask(task.name));
            }
            let name = task.name.clone();
            let index = graph.add_node(task);
            task_index.insert(name.clone(), index);
            order.push(name);
        }

        let mut edges = Vec::new();
        for name in &order {
            let index = task_index[name];
            for prereq in &graph[index].needs {
                let from = task_index
                    .get(prereq)
                    .ok_or_else(|| Error::UnknownPrerequisite {
                        task: name.clone(),
                        prereq: prereq.clone(),
                    })?;
                edges.push((*from, index));
            }
        }
        for (from, to) in edges {
            graph.update_edge(from, to, ());
        }

        let dag = Self {
            graph,
            task_index,
            order,
        };
        dag.check_acyclic()?;
        Ok(dag)
    }

    fn check_acyclic(&self) -> Result<()> {
        if !is_cyclic_directed(&self.graph) {
            return Ok(());
        }
        // A self-loop is its own component; larger cycles are strongly
        // connected components with more than one member.
        let members: HashSet<NodeIndex> = kosaraju_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|scc| scc.into_iter().collect())
            .unwrap_or_default();
        Err(Error::Cycle(self.cycle_path(&members)))
    }

    /// Walk `needs` inside one strongly connected component until a name
    /// repeats, giving a readable `a -> b -> a` path.
    fn cycle_path(&self, members: &HashSet<NodeIndex>) -> Vec<String> {
        let Some(start) = self
            .order
            .iter()
            .filter_map(|name| self.task_index.get(name))
            .find(|index| members.contains(index))
        else {
            return Vec::new();
        };

        let mut path = vec![self.graph[*start].name.clone()];
        let mut seen = HashSet::from([*start]);
        let mut current = *start;
        loop {
            let next = self.graph[current]
                .needs
                .iter()
                .filter_map(|name| self.task_index.get(name))
                .find(|index| members.contains(index))
                .copied();
            let Some(next) = next else {
                return path;
            };
            path.push(self.graph[next].name.clone());
            if !seen.insert(next) {
                return path;
            }
            current = next;
        }
    }

    pub fn get_task(&self, name: &str) -> Option<&Task> {
        self.task_index.get(name).map(|&index| &self.graph[index])
    }

    pub fn contains_task(&self, name: &str) -> bool {
        self.task_index.contains_key(name)
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All tasks in declaration order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.order
            .iter()
            .filter_map(|name| self.get_task(name))
            .collect()
    }

    /// Tasks that list `name` as a prerequisite.
    pub fn dependents(&self, name: &str) -> Vec<&Task> {
        let Some(&index) = self.task_index.get(name) else {
            return Vec::new();
        };
        let mut dependents: Vec<&Task> = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Outgoing)
            .map(|neighbor| &self.graph[neighbor])
            .collect();
        dependents.sort_by_key(|task| self.position(&task.name));
        dependents
    }

    fn position(&self, name: &str) -> usize {
        self.order
            .iter()
            .position(|n| n == name)
            .unwrap_or(usize::MAX)
    }

    /// Execution order for `targets`.
    ///
    /// Depth-first: each task's prerequisites come first, in the order
    /// they are listed, then the task itself. A task reachable through
    /// several paths, or requested twice, appears once.
    pub fn resolve<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<&Task>> {
        let mut plan = Vec::new();
        let mut visited = HashSet::new();
        for target in targets {
            let target = target.as_ref();
            let index = *self
                .task_index
                .get(target)
                .ok_or_else(|| Error::UnknownTask(target.to_string()))?;
            self.visit(index, &mut visited, &mut plan);
        }
        Ok(plan)
    }

    fn visit<'a>(
        &'a self,
        index: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        plan: &mut Vec<&'a Task>,
    ) {
        if !visited.insert(index) {
            return;
        }
        let task = &self.graph[index];
        for prereq in &task.needs {
            // Validated in from_tasks.
            if let Some(&dep) = self.task_index.get(prereq) {
                self.visit(dep, visited, plan);
            }
        }
        plan.push(task);
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
