use flowq_common::{SideInputId, StageId};
use serde::{Deserialize, Serialize};

use crate::physical_plan::{PhysicalPlan, PhysicalUnit};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    /// Materializes one scalar side input.
    SideInput(SideInputId),
    /// Produces the rows of one statement.
    Output(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageNode {
    pub id: StageId,
    pub kind: StageKind,
    pub operators: Vec<String>,
    /// Stages that must finish first.
    pub parents: Vec<StageId>,
    /// Stages waiting on this one.
    pub children: Vec<StageId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageDag {
    pub stages: Vec<StageNode>,
}

impl StageDag {
    pub fn new() -> Self {
        Self { stages: vec![] }
    }

    /// Stage materializing `id`, if any.
    pub fn side_input_stage(&self, id: SideInputId) -> Option<&StageNode> {
        self.stages
            .iter()
            .find(|s| s.kind == StageKind::SideInput(id))
    }

    /// Stages without parents; they can start immediately.
    pub fn roots(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|s| s.parents.is_empty())
            .map(|s| s.id)
            .collect()
    }
}

/// One stage per side input and per output; a side input stage is a parent of
/// every stage whose plan carries a `ScalarBroadcast` on it.
pub fn build_stage_dag(unit: &PhysicalUnit) -> StageDag {
    let mut dag = StageDag::new();
    for si in &unit.side_inputs {
        new_stage(&mut dag, StageKind::SideInput(si.id), &si.plan);
    }
    for out in &unit.outputs {
        new_stage(&mut dag, StageKind::Output(out.alias.clone()), &out.plan);
    }

    let plans = unit
        .side_inputs
        .iter()
        .map(|s| &s.plan)
        .chain(unit.outputs.iter().map(|o| &o.plan))
        .collect::<Vec<_>>();
    for (idx, plan) in plans.into_iter().enumerate() {
        for dep in plan.side_inputs() {
            if let Some(parent) = dag.side_input_stage(dep).map(|s| s.id) {
                add_edge(&mut dag, parent, StageId(idx));
            }
        }
    }
    dag
}

fn new_stage(dag: &mut StageDag, kind: StageKind, plan: &PhysicalPlan) -> StageId {
    let id = StageId(dag.stages.len());
    let mut operators = Vec::new();
    collect_operators(plan, &mut operators);
    dag.stages.push(StageNode {
        id,
        kind,
        operators,
        parents: Vec::new(),
        children: Vec::new(),
    });
    id
}

fn collect_operators(plan: &PhysicalPlan, out: &mut Vec<String>) {
    out.push(plan.name().to_string());
    for child in plan.children() {
        collect_operators(child, out);
    }
}

fn add_edge(dag: &mut StageDag, parent: StageId, child: StageId) {
    if !dag.stages[parent.0].children.contains(&child) {
        dag.stages[parent.0].children.push(child);
    }
    if !dag.stages[child.0].parents.contains(&parent) {
        dag.stages[child.0].parents.push(parent);
    }
}
