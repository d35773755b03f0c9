//! Enablement Analysis
//!
//! Labels every variable with respect to the declared outputs:
//!
//! - `Relevant` — on a dataflow path from a source to an output whose
//!   crossed method inputs were all known when consumed.
//! - `AssumedRelevant` — a path exists but crosses at least one *assumed*
//!   value: a prior-flagged input whose writer had not yet been scheduled
//!   when the reader ran.
//! - `Irrelevant` — no path under the current selection. For these, the
//!   fuzzy `relevant` flag is refined by a purely structural walk over the
//!   constraint graph that ignores selection entirely.
//!
//! The analyzer observes the evaluator's `method_scheduled` events and
//! recomputes global `contributing`/`relevant` flags against the current
//! output multiset after every pass.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::graph::{ConstraintGraph, SolutionGraph};
use crate::ids::{MethodId, VarId};
use crate::vars::{Activation, Fuzzy, Variable};

/// Enablement label of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enablement {
    Relevant,
    AssumedRelevant,
    Irrelevant,
}

impl Enablement {
    fn to_fuzzy(self) -> Fuzzy {
        match self {
            Enablement::Relevant => Fuzzy::Yes,
            Enablement::AssumedRelevant => Fuzzy::Maybe,
            Enablement::Irrelevant => Fuzzy::No,
        }
    }
}

/// Observes method scheduling and maintains per-variable labels.
#[derive(Debug, Default)]
pub struct EnablementAnalyzer {
    /// Scheduling positions of the current pass.
    scheduled: IndexMap<MethodId, usize>,
    labels: IndexMap<VarId, Enablement>,
}

impl EnablementAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing a fresh evaluation pass.
    pub fn begin_pass(&mut self) {
        self.scheduled.clear();
    }

    /// Record that a method was scheduled (in evaluation order).
    pub fn method_scheduled(&mut self, activation: &Activation) {
        let position = self.scheduled.len();
        self.scheduled.insert(activation.method.clone(), position);
    }

    /// The current label of a variable.
    pub fn label(&self, vid: &VarId) -> Enablement {
        self.labels
            .get(vid)
            .copied()
            .unwrap_or(Enablement::Irrelevant)
    }

    /// Whether the input edge `variable -> method` carried an assumed value.
    ///
    /// Prior reads are assumed when the variable's writer runs (or ran)
    /// after the reader in the observed pass.
    fn edge_assumed(
        &self,
        sg: &SolutionGraph,
        variable: &VarId,
        prior: bool,
        reader: &MethodId,
    ) -> bool {
        if !prior {
            return false;
        }
        let Some(writer) = sg.writer_of(variable) else {
            return false;
        };
        if writer.is_stay() {
            return false;
        }
        let Some(writer_pos) = self.scheduled.get(writer) else {
            return false;
        };
        match self.scheduled.get(reader) {
            Some(reader_pos) => writer_pos > reader_pos,
            // The reader did not run this pass but its prior input was
            // rewritten: its output rests on a stale value.
            None => true,
        }
    }

    /// Recompute labels and write the fuzzy flags into the variables.
    pub fn relabel(
        &mut self,
        cg: &dyn ConstraintGraph,
        sg: &SolutionGraph,
        topomids: &[MethodId],
        outputs: &[VarId],
        variables: &IndexMap<VarId, Variable>,
    ) {
        // Forward taint over the selection in evaluation order: a method's
        // outputs are tainted when any consumed input was assumed or itself
        // tainted.
        let mut tainted: IndexSet<VarId> = IndexSet::new();
        for mid in topomids {
            if mid.is_stay() {
                continue;
            }
            let inputs = cg.inputs_for(mid);
            let is_tainted = inputs.iter().any(|input| {
                self.edge_assumed(sg, &input.variable, input.prior, mid)
                    || (!input.prior && tainted.contains(&input.variable))
            });
            if is_tainted {
                for out in cg.outputs_for(mid) {
                    tainted.insert(out);
                }
            }
        }

        // Backward reachability from the outputs over the selection: once
        // through clean edges only, once through every edge.
        let clean_back = self.backward(cg, sg, outputs, false);
        let any_back = self.backward(cg, sg, outputs, true);

        for (vid, variable) in variables {
            let label = if clean_back.contains(vid) && !tainted.contains(vid) {
                Enablement::Relevant
            } else if any_back.contains(vid) {
                Enablement::AssumedRelevant
            } else {
                Enablement::Irrelevant
            };
            self.labels.insert(vid.clone(), label);

            let contributing = label.to_fuzzy();
            let relevant = match label {
                Enablement::Irrelevant => {
                    if structurally_relevant(cg, outputs, vid) {
                        Fuzzy::Maybe
                    } else {
                        Fuzzy::No
                    }
                }
                other => other.to_fuzzy(),
            };
            variable.set_labels(contributing, relevant);
        }
    }

    /// Variables from which an output is reachable through the selection.
    fn backward(
        &self,
        cg: &dyn ConstraintGraph,
        sg: &SolutionGraph,
        outputs: &[VarId],
        include_assumed: bool,
    ) -> IndexSet<VarId> {
        let mut reached: IndexSet<VarId> = IndexSet::new();
        let mut queue: Vec<VarId> = outputs.to_vec();

        while let Some(vid) = queue.pop() {
            if !reached.insert(vid.clone()) {
                continue;
            }
            let Some(writer) = sg.writer_of(&vid) else {
                continue;
            };
            if writer.is_stay() {
                continue;
            }
            for input in cg.inputs_for(writer) {
                let assumed = self.edge_assumed(sg, &input.variable, input.prior, writer);
                if assumed && !include_assumed {
                    continue;
                }
                queue.push(input.variable);
            }
        }

        reached
    }
}

/// Structural relevancy: ignoring selection, can `vid` flow into any output
/// through some chain of methods? Prior reads do not carry flow.
fn structurally_relevant(cg: &dyn ConstraintGraph, outputs: &[VarId], vid: &VarId) -> bool {
    let mut relevant: IndexSet<VarId> = outputs.iter().cloned().collect();
    if relevant.contains(vid) {
        return true;
    }

    // Reverse edges: output variable -> primary inputs, over every method.
    let mut inputs_by_output: HashMap<VarId, Vec<VarId>> = HashMap::new();
    for mid in cg.methods() {
        let primary: Vec<VarId> = cg
            .inputs_for(&mid)
            .into_iter()
            .filter(|i| !i.prior)
            .map(|i| i.variable)
            .collect();
        for out in cg.outputs_for(&mid) {
            inputs_by_output
                .entry(out)
                .or_default()
                .extend(primary.iter().cloned());
        }
    }

    let mut queue: Vec<VarId> = relevant.iter().cloned().collect();
    while let Some(out) = queue.pop() {
        if let Some(ins) = inputs_by_output.get(&out) {
            for input in ins {
                if input == vid {
                    return true;
                }
                if relevant.insert(input.clone()) {
                    queue.push(input.clone());
                }
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CachingConstraintGraph;
    use crate::ids::ConstraintId;
    use crate::reactive::Scheduler;
    use crate::vars::{MethodInput, Value};

    fn input(v: &str) -> MethodInput {
        MethodInput {
            variable: VarId::new(v),
            prior: false,
        }
    }

    fn prior(v: &str) -> MethodInput {
        MethodInput {
            variable: VarId::new(v),
            prior: true,
        }
    }

    fn vid(v: &str) -> VarId {
        VarId::new(v)
    }

    fn registry(scheduler: &Scheduler, names: &[&str]) -> IndexMap<VarId, Variable> {
        names
            .iter()
            .map(|n| (vid(n), Variable::new(*n, Value::Null, scheduler)))
            .collect()
    }

    fn activation(mid: &str) -> Activation {
        Activation {
            constraint: ConstraintId::new("c"),
            method: MethodId::new(mid),
            inputs: vec![],
            outputs: vec![],
        }
    }

    /// a -> b -> c with output c: everything on the path is relevant.
    #[test]
    fn chain_to_output_is_relevant() {
        let mut cg = CachingConstraintGraph::new();
        for v in ["a", "b", "c", "d"] {
            cg.add_variable(vid(v));
        }
        cg.add_method(
            MethodId::new("ab"),
            ConstraintId::new("c1"),
            vec![input("a")],
            vec![vid("b")],
        );
        cg.add_method(
            MethodId::new("bc"),
            ConstraintId::new("c2"),
            vec![input("b")],
            vec![vid("c")],
        );
        cg.add_method(
            MethodId::new("a.stay"),
            vid("a").stay_constraint(),
            vec![],
            vec![vid("a")],
        );

        let mut sg = SolutionGraph::new();
        sg.select(vid("a").stay_constraint(), MethodId::new("a.stay"), &[vid("a")]);
        sg.select(ConstraintId::new("c1"), MethodId::new("ab"), &[vid("b")]);
        sg.select(ConstraintId::new("c2"), MethodId::new("bc"), &[vid("c")]);

        let scheduler = Scheduler::new();
        let vars = registry(&scheduler, &["a", "b", "c", "d"]);
        let topomids = vec![
            MethodId::new("a.stay"),
            MethodId::new("ab"),
            MethodId::new("bc"),
        ];

        let mut analyzer = EnablementAnalyzer::new();
        analyzer.begin_pass();
        analyzer.method_scheduled(&activation("ab"));
        analyzer.method_scheduled(&activation("bc"));
        analyzer.relabel(&cg, &sg, &topomids, &[vid("c")], &vars);

        assert_eq!(analyzer.label(&vid("a")), Enablement::Relevant);
        assert_eq!(analyzer.label(&vid("b")), Enablement::Relevant);
        assert_eq!(analyzer.label(&vid("c")), Enablement::Relevant);
        assert_eq!(analyzer.label(&vid("d")), Enablement::Irrelevant);

        assert_eq!(vars[&vid("a")].contributing(), Fuzzy::Yes);
        assert_eq!(vars[&vid("d")].contributing(), Fuzzy::No);
        assert_eq!(vars[&vid("d")].relevant(), Fuzzy::No);
    }

    /// A prior read whose writer runs later in the pass marks the reader's
    /// output as assumed.
    #[test]
    fn late_writer_of_prior_input_marks_assumed() {
        let mut cg = CachingConstraintGraph::new();
        for v in ["a", "b", "c"] {
            cg.add_variable(vid(v));
        }
        // m1 reads b as prior and writes c; m2 writes b from a.
        cg.add_method(
            MethodId::new("m1"),
            ConstraintId::new("c1"),
            vec![prior("b")],
            vec![vid("c")],
        );
        cg.add_method(
            MethodId::new("m2"),
            ConstraintId::new("c2"),
            vec![input("a")],
            vec![vid("b")],
        );

        let mut sg = SolutionGraph::new();
        sg.select(ConstraintId::new("c1"), MethodId::new("m1"), &[vid("c")]);
        sg.select(ConstraintId::new("c2"), MethodId::new("m2"), &[vid("b")]);

        let scheduler = Scheduler::new();
        let vars = registry(&scheduler, &["a", "b", "c"]);
        // m1 scheduled before m2: the prior value of b was assumed.
        let topomids = vec![MethodId::new("m1"), MethodId::new("m2")];

        let mut analyzer = EnablementAnalyzer::new();
        analyzer.begin_pass();
        analyzer.method_scheduled(&activation("m1"));
        analyzer.method_scheduled(&activation("m2"));
        analyzer.relabel(&cg, &sg, &topomids, &[vid("c")], &vars);

        assert_eq!(analyzer.label(&vid("c")), Enablement::AssumedRelevant);
        assert_eq!(vars[&vid("c")].contributing(), Fuzzy::Maybe);
        // b flows into c only through the assumed edge.
        assert_eq!(analyzer.label(&vid("b")), Enablement::AssumedRelevant);
    }

    /// Off-path variables refine `relevant` through the structural walk.
    #[test]
    fn structural_walk_refines_relevant() {
        let mut cg = CachingConstraintGraph::new();
        for v in ["a", "b"] {
            cg.add_variable(vid(v));
        }
        // An unselected method could carry a into b.
        cg.add_method(
            MethodId::new("ab"),
            ConstraintId::new("c1"),
            vec![input("a")],
            vec![vid("b")],
        );

        let sg = SolutionGraph::new();
        let scheduler = Scheduler::new();
        let vars = registry(&scheduler, &["a", "b"]);

        let mut analyzer = EnablementAnalyzer::new();
        analyzer.begin_pass();
        analyzer.relabel(&cg, &sg, &[], &[vid("b")], &vars);

        // Nothing selected: a is off every live path, but structurally it
        // could still reach the output.
        assert_eq!(analyzer.label(&vid("a")), Enablement::Irrelevant);
        assert_eq!(vars[&vid("a")].contributing(), Fuzzy::No);
        assert_eq!(vars[&vid("a")].relevant(), Fuzzy::Maybe);
    }
}
