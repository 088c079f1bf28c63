//! Forward propagation of guarantees over a control-flow graph

use super::cfg::Cfg;
use super::guard::Guard;
use super::IssueCategory;
use crate::kb::PermissionRequirement;
use petgraph::Direction;
use std::collections::BTreeSet;
use tracing::trace;

/// Passes over the graph; loop bodies see facts established before the loop
const MAX_PASSES: usize = 2;

/// Facts that hold on every path reaching a program point
///
/// The default value is the top of the lattice: nothing is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuaranteeSet {
    /// Running platform version is at least this
    pub floor: Option<u32>,
    /// Part of `floor` declared by enclosing `@TargetApi`/`@RequiresApi`
    pub annotation_floor: Option<u32>,
    /// Running platform version is at most this
    pub ceiling: Option<u32>,
    /// Permissions verified at runtime
    pub held: BTreeSet<String>,
    /// Exception types caught by an enclosing handler or declared as thrown
    pub excluded: BTreeSet<String>,
    pub suppressed: BTreeSet<IssueCategory>,
    /// Permission requirements declared by the enclosing method
    pub caller_requirements: Vec<PermissionRequirement>,
    /// No execution reaches this point
    bottom: bool,
}

impl GuaranteeSet {
    pub fn top() -> Self {
        Self::default()
    }

    pub fn is_bottom(&self) -> bool {
        self.bottom
    }

    pub fn raise_floor(&mut self, level: u32) {
        self.floor = Some(self.floor.map_or(level, |f| f.max(level)));
        self.check_consistency();
    }

    /// Floor promised by an enclosing annotation rather than a runtime check
    pub fn raise_annotation_floor(&mut self, level: u32) {
        self.annotation_floor = Some(self.annotation_floor.map_or(level, |f| f.max(level)));
        self.raise_floor(level);
    }

    fn lower_ceiling(&mut self, level: u32) {
        self.ceiling = Some(self.ceiling.map_or(level, |c| c.min(level)));
        self.check_consistency();
    }

    fn check_consistency(&mut self) {
        if let (Some(floor), Some(ceiling)) = (self.floor, self.ceiling) {
            if floor > ceiling {
                self.bottom = true;
            }
        }
    }

    pub fn suppress(&mut self, categories: impl IntoIterator<Item = IssueCategory>) {
        self.suppressed.extend(categories);
    }

    pub fn is_suppressed(&self, category: IssueCategory) -> bool {
        self.suppressed.contains(&category)
    }

    pub fn declare_requirement(&mut self, requirement: PermissionRequirement) {
        if !self.caller_requirements.contains(&requirement) {
            self.caller_requirements.push(requirement);
        }
    }

    /// Effective minimum version given the module's declared minimum
    pub fn effective_floor(&self, min_sdk: u32) -> u32 {
        self.floor.map_or(min_sdk, |f| f.max(min_sdk))
    }

    /// Minimum cited in messages: the declared minimum raised only by
    /// enclosing annotations, never by runtime checks
    pub fn reported_min(&self, min_sdk: u32) -> u32 {
        self.annotation_floor.map_or(min_sdk, |f| f.max(min_sdk))
    }

    /// Permissions certainly held because the enclosing method requires them
    pub fn implied_permissions(&self) -> BTreeSet<String> {
        self.caller_requirements
            .iter()
            .flat_map(|r| r.expr.implied_held())
            .collect()
    }

    /// Refine with a guard known to evaluate to `truth`
    pub fn assume(&mut self, guard: &Guard, truth: bool) {
        if self.bottom {
            return;
        }
        match (guard, truth) {
            (Guard::VersionAtLeast(v), true) => self.raise_floor(*v),
            (Guard::VersionAtLeast(v), false) => match v.checked_sub(1) {
                Some(c) => self.lower_ceiling(c),
                None => self.bottom = true,
            },
            (Guard::VersionAtMost(v), true) => self.lower_ceiling(*v),
            (Guard::VersionAtMost(v), false) => self.raise_floor(v.saturating_add(1)),
            (Guard::VersionExactly(v), true) => {
                self.raise_floor(*v);
                self.lower_ceiling(*v);
            }
            (Guard::PermissionHeld(p), true) => {
                self.held.insert(p.clone());
            }
            (Guard::TypeExcluded(t), true) => {
                self.excluded.insert(t.clone());
            }
            (Guard::And(parts), true) | (Guard::Or(parts), false) => {
                for part in parts {
                    self.assume(part, truth);
                }
            }
            (Guard::Or(parts), true) | (Guard::And(parts), false) => {
                let mut merged: Option<GuaranteeSet> = None;
                for part in parts {
                    let mut branch = self.clone();
                    branch.assume(part, truth);
                    merged = Some(match merged {
                        Some(m) => m.meet(&branch),
                        None => branch,
                    });
                }
                if let Some(merged) = merged {
                    *self = merged;
                }
            }
            (Guard::Not(inner), _) => self.assume(inner, !truth),
            (Guard::VersionExactly(_), false)
            | (Guard::PermissionHeld(_), false)
            | (Guard::TypeExcluded(_), false)
            | (Guard::Unknown, _) => {}
        }
    }

    /// Facts holding on both incoming paths
    pub fn meet(&self, other: &GuaranteeSet) -> GuaranteeSet {
        if self.bottom {
            return other.clone();
        }
        if other.bottom {
            return self.clone();
        }
        let both = |a: Option<u32>, b: Option<u32>, pick: fn(u32, u32) -> u32| match (a, b) {
            (Some(a), Some(b)) => Some(pick(a, b)),
            _ => None,
        };
        GuaranteeSet {
            floor: both(self.floor, other.floor, u32::min),
            annotation_floor: both(self.annotation_floor, other.annotation_floor, u32::min),
            ceiling: both(self.ceiling, other.ceiling, u32::max),
            held: self.held.intersection(&other.held).cloned().collect(),
            excluded: self.excluded.intersection(&other.excluded).cloned().collect(),
            suppressed: self.suppressed.intersection(&other.suppressed).copied().collect(),
            caller_requirements: self
                .caller_requirements
                .iter()
                .filter(|r| other.caller_requirements.contains(r))
                .cloned()
                .collect(),
            bottom: false,
        }
    }
}

/// Compute the guarantees at the entry of every block.
///
/// Blocks that are unreachable, or reachable only along contradictory
/// guards, get the seed so their sites are still checked.
pub fn propagate(cfg: &Cfg, seed: &GuaranteeSet) -> Vec<GuaranteeSet> {
    let order = cfg.reverse_postorder();
    let mut state: Vec<Option<GuaranteeSet>> = vec![None; cfg.block_count()];
    state[cfg.entry.index()] = Some(seed.clone());

    for pass in 0..MAX_PASSES {
        let mut changed = false;
        for &node in &order {
            if node == cfg.entry {
                continue;
            }
            let mut incoming: Option<GuaranteeSet> = None;
            for edge in cfg.graph.edges_directed(node, Direction::Incoming) {
                let Some(facts) = &state[petgraph::visit::EdgeRef::source(&edge).index()] else {
                    continue;
                };
                let mut facts = facts.clone();
                if let Some(guard) = &edge.weight().guard {
                    facts.assume(guard, true);
                }
                incoming = Some(match incoming {
                    Some(current) => current.meet(&facts),
                    None => facts,
                });
            }
            if incoming != state[node.index()] {
                state[node.index()] = incoming;
                changed = true;
            }
        }
        trace!("Propagation pass {} over {} blocks", pass + 1, order.len());
        if !changed {
            break;
        }
    }

    state
        .into_iter()
        .map(|facts| match facts {
            Some(facts) if !facts.is_bottom() => facts,
            _ => seed.clone(),
        })
        .collect()
}
