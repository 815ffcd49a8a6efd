//! Composition plans: resolved topology trees with an evaluation schedule.
//!
//! A plan stores the tree as an arena of nodes and a list of [`Step`]s, one per
//! atmosphere. Each step names the node whose emergent spectrum illuminates that
//! atmosphere (`input`), or `None` for the region boundary condition.
//!
//! The step order is a topological sort (Kahn) of the stacking dependencies:
//! an atmosphere is scheduled only after every atmosphere below it. Independent
//! atmospheres are ordered by height, then by their position in the expression.

use std::fmt;

use crate::domain::StokesProfile;
use crate::topology::parser::Expr;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Atmosphere { name: String, position: usize },
    Stack(Vec<NodeId>),
    Superpose(Vec<NodeId>),
}

/// One oracle invocation in the evaluation schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub atmosphere: String,
    pub node: NodeId,
    /// Node whose emergent spectrum is the incoming light, `None` for the boundary.
    pub input: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionPlan {
    nodes: Vec<Node>,
    root: NodeId,
    steps: Vec<Step>,
}

impl CompositionPlan {
    /// Build a plan from a validated syntax tree.
    ///
    /// `height_of` supplies the ordering metadata of each atmosphere.
    pub(crate) fn build(expr: &Expr, height_of: impl Fn(&str) -> f64) -> Self {
        let mut nodes = Vec::new();
        let mut inputs = Vec::new();
        let root = lower(expr, None, &mut nodes, &mut inputs);

        let mut plan = CompositionPlan {
            nodes,
            root,
            steps: Vec::new(),
        };
        plan.steps = plan.schedule(&inputs, height_of);
        plan
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Atmosphere names in evaluation order.
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.atmosphere.as_str()).collect()
    }

    /// Atmosphere leaves contained in `id`, in expression order.
    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(id, &mut out);
        out
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match &self.nodes[id] {
            Node::Atmosphere { .. } => out.push(id),
            Node::Stack(children) | Node::Superpose(children) => {
                for &child in children {
                    self.collect_leaves(child, out);
                }
            }
        }
    }

    /// Emergent spectrum of a node given the per-leaf outputs computed so far.
    ///
    /// A stack emerges from its top member; a superposition is the sample-wise sum
    /// of its members. Returns `None` if a required leaf has not been evaluated.
    pub fn emergent(&self, id: NodeId, outputs: &[Option<StokesProfile>]) -> Option<StokesProfile> {
        match &self.nodes[id] {
            Node::Atmosphere { .. } => outputs.get(id).and_then(|o| o.clone()),
            Node::Stack(children) => self.emergent(*children.last()?, outputs),
            Node::Superpose(children) => {
                let mut iter = children.iter();
                let mut sum = self.emergent(*iter.next()?, outputs)?;
                for &child in iter {
                    sum.add_assign(&self.emergent(child, outputs)?);
                }
                Some(sum)
            }
        }
    }

    fn schedule(&self, inputs: &[(NodeId, Option<NodeId>)], height_of: impl Fn(&str) -> f64) -> Vec<Step> {
        let leaves = self.leaves_under(self.root);
        let slot = |node: NodeId| leaves.iter().position(|&l| l == node);

        // dependents[a] = leaves that must wait for leaf a.
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); leaves.len()];
        let mut indegree = vec![0usize; leaves.len()];
        let mut input_of = vec![None; leaves.len()];
        for &(leaf, input) in inputs {
            let Some(li) = slot(leaf) else { continue };
            input_of[li] = input;
            if let Some(input) = input {
                for below in self.leaves_under(input) {
                    if let Some(bi) = slot(below) {
                        dependents[bi].push(li);
                        indegree[li] += 1;
                    }
                }
            }
        }

        let key = |li: usize| match &self.nodes[leaves[li]] {
            Node::Atmosphere { name, position } => (height_of(name), *position),
            _ => (0.0, 0),
        };

        let mut ready: Vec<usize> = (0..leaves.len()).filter(|&li| indegree[li] == 0).collect();
        let mut steps = Vec::with_capacity(leaves.len());
        while !ready.is_empty() {
            // Deterministic pick: lowest height, then earliest position.
            let mut best = 0;
            for k in 1..ready.len() {
                let (h, p) = key(ready[k]);
                let (bh, bp) = key(ready[best]);
                if h.total_cmp(&bh).then(p.cmp(&bp)).is_lt() {
                    best = k;
                }
            }
            let li = ready.swap_remove(best);
            if let Node::Atmosphere { name, .. } = &self.nodes[leaves[li]] {
                steps.push(Step {
                    atmosphere: name.clone(),
                    node: leaves[li],
                    input: input_of[li],
                });
            }
            for &d in &dependents[li] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.push(d);
                }
            }
        }

        debug_assert_eq!(steps.len(), leaves.len(), "composition tree cannot contain cycles");
        steps
    }

    fn render(&self, id: NodeId, inside_superpose: bool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.nodes[id] {
            Node::Atmosphere { name, .. } => write!(f, "{name}"),
            Node::Stack(children) => {
                if inside_superpose {
                    write!(f, "(")?;
                }
                for (k, &child) in children.iter().enumerate() {
                    if k > 0 {
                        write!(f, " -> ")?;
                    }
                    self.render(child, false, f)?;
                }
                if inside_superpose {
                    write!(f, ")")?;
                }
                Ok(())
            }
            Node::Superpose(children) => {
                for (k, &child) in children.iter().enumerate() {
                    if k > 0 {
                        write!(f, " + ")?;
                    }
                    self.render(child, true, f)?;
                }
                Ok(())
            }
        }
    }
}

/// Canonical expression with the minimal set of parentheses.
impl fmt::Display for CompositionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(self.root, false, f)
    }
}

/// Lower the syntax tree into the arena, recording each leaf's input node.
fn lower(
    expr: &Expr,
    below: Option<NodeId>,
    nodes: &mut Vec<Node>,
    inputs: &mut Vec<(NodeId, Option<NodeId>)>,
) -> NodeId {
    match expr {
        Expr::Atmosphere { name, position } => {
            let id = nodes.len();
            nodes.push(Node::Atmosphere {
                name: name.clone(),
                position: *position,
            });
            inputs.push((id, below));
            id
        }
        Expr::Stack(items) => {
            let mut children = Vec::with_capacity(items.len());
            let mut current = below;
            for item in items {
                let child = lower(item, current, nodes, inputs);
                children.push(child);
                current = Some(child);
            }
            let id = nodes.len();
            nodes.push(Node::Stack(children));
            id
        }
        Expr::Superpose(items) => {
            let children = items.iter().map(|item| lower(item, below, nodes, inputs)).collect();
            let id = nodes.len();
            nodes.push(Node::Superpose(children));
            id
        }
    }
}
