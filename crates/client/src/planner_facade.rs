use flowq_common::{EngineConfig, Result};
use flowq_planner::{
    build_stage_dag, compile_unit, create_physical_unit, explain_logical, explain_stages,
    explain_unit, PhysicalPlannerConfig, PhysicalUnit, ScriptDefinitions, Statement,
};
use tracing::debug;

#[derive(Debug, Default)]
pub struct PlannerFacade {
    physical: PhysicalPlannerConfig,
}

impl PlannerFacade {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            physical: PhysicalPlannerConfig {
                batch_size_rows: config.batch_size_rows,
            },
        }
    }

    /// Compile and lower `statements` as one unit.
    pub fn plan_unit(
        &self,
        defs: &ScriptDefinitions,
        statements: &[Statement],
    ) -> Result<PhysicalUnit> {
        let compiled = compile_unit(defs, statements)?;
        let unit = create_physical_unit(&compiled, &self.physical)?;
        debug!(
            stages = build_stage_dag(&unit).stages.len(),
            side_inputs = unit.side_inputs.len(),
            "planned unit"
        );
        Ok(unit)
    }

    /// Analyzed logical plans followed by the physical unit.
    pub fn explain(&self, defs: &ScriptDefinitions, statements: &[Statement]) -> Result<String> {
        let compiled = compile_unit(defs, statements)?;
        let unit = create_physical_unit(&compiled, &self.physical)?;
        let mut out = String::from("== Logical ==\n");
        for stmt in &compiled.statements {
            out.push_str(&format!("-- {}\n", stmt.alias));
            out.push_str(&explain_logical(&stmt.plan));
        }
        for si in &compiled.side_inputs {
            out.push_str(&format!("-- side input {} ({})\n", si.id, si.aliases.join(", ")));
            out.push_str(&explain_logical(&si.plan));
        }
        out.push_str("== Physical ==\n");
        out.push_str(&explain_unit(&unit));
        out.push_str("== Stages ==\n");
        out.push_str(&explain_stages(&build_stage_dag(&unit)));
        Ok(out)
    }
}
