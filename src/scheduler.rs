//! Reactive scheduler: turns a control event into one atomic transition.
//!
//! Handling an event runs in two phases. First the new value is validated and
//! written, and every cascade target downstream of it is reset (options
//! recomputed, value cleared). Only then are the affected outputs recomputed,
//! all from the final post-cascade state. The result is published as a whole
//! new [`Snapshot`]; readers see either the previous snapshot or the next one.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::error::DashError;
use crate::graph::{DependencyGraph, Node, OutputId};
use crate::selector::{ControlEvent, ControlId, ControlValue, Dimension, SelectorState};
use crate::views::{derive_view, DerivedView};

/// A control overwritten by a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReset {
    pub control: ControlId,
    pub options: Vec<String>,
    pub value: ControlValue,
}

/// Everything one event changes, computed off to the side before publication.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SelectorState,
    pub resets: Vec<ControlReset>,
    pub views: Vec<Arc<DerivedView>>,
}

impl Transition {
    pub fn recomputed(&self) -> Vec<OutputId> {
        self.views.iter().map(|v| v.output).collect()
    }
}

/// Published state of a session: selector values, option sets and views.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: u64,
    pub state: SelectorState,
    pub product_options: Vec<String>,
    views: BTreeMap<OutputId, Arc<DerivedView>>,
}

impl Snapshot {
    pub fn view(&self, output: OutputId) -> Option<&Arc<DerivedView>> {
        self.views.get(&output)
    }

    pub fn views(&self) -> impl Iterator<Item = &Arc<DerivedView>> {
        self.views.values()
    }

    fn apply(&self, transition: Transition) -> Snapshot {
        let mut views = self.views.clone();
        let mut product_options = self.product_options.clone();
        for reset in &transition.resets {
            if reset.control == ControlId::Products {
                product_options = reset.options.clone();
            }
        }
        for view in transition.views {
            views.insert(view.output, view);
        }
        Snapshot {
            version: self.version + 1,
            state: transition.state,
            product_options,
            views,
        }
    }
}

/// Interprets the dependency graph against the shared dataset.
#[derive(Debug)]
pub struct Scheduler {
    dataset: Arc<Dataset>,
    graph: DependencyGraph,
    top_n: usize,
    /// Outputs with no inputs, computed once at construction.
    static_views: BTreeMap<OutputId, Arc<DerivedView>>,
}

impl Scheduler {
    pub fn new(dataset: Arc<Dataset>, graph: DependencyGraph, top_n: usize) -> Result<Self, DashError> {
        let state = SelectorState::initial(&dataset, Dimension::default());
        let mut static_views = BTreeMap::new();
        for output in graph.static_outputs() {
            let view = derive_view(output, &state, &dataset, top_n)?;
            static_views.insert(output, Arc::new(view));
        }
        debug!(static_outputs = static_views.len(), "scheduler ready");
        Ok(Self {
            dataset,
            graph,
            top_n,
            static_views,
        })
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn static_view(&self, output: OutputId) -> Option<&Arc<DerivedView>> {
        self.static_views.get(&output)
    }

    /// Full evaluation of every output for a fresh session.
    pub fn initial_snapshot(&self, state: SelectorState) -> Result<Snapshot, DashError> {
        let mut views = self.static_views.clone();
        for output in self.graph.driven_outputs() {
            let view = derive_view(output, &state, &self.dataset, self.top_n)?;
            views.insert(output, Arc::new(view));
        }
        Ok(Snapshot {
            version: 0,
            product_options: state.options(ControlId::Products, &self.dataset),
            state,
            views,
        })
    }

    /// Compute the transition for `event` from `current` without publishing it.
    ///
    /// Rejected events return `UnknownSelectorValue` and leave `current`
    /// untouched.
    pub fn plan(&self, current: &SelectorState, event: &ControlEvent) -> Result<Transition, DashError> {
        let mut state = current.clone();
        state.assign(event.control, &event.value, &self.dataset)?;

        // Re-submitting the held value neither cascades nor recomputes.
        if state == *current {
            return Ok(Transition {
                state,
                resets: Vec::new(),
                views: Vec::new(),
            });
        }

        let affected = self.graph.affected(event.control);

        // Phase 1: cascade resets, in dependency order.
        let mut changed: HashSet<ControlId> = HashSet::from([event.control]);
        let mut resets = Vec::new();
        for node in &affected {
            let Node::Control(control) = *node else {
                continue;
            };
            let triggered = changed
                .iter()
                .any(|&c| self.graph.cascade_targets(c).contains(&control));
            if triggered {
                let options = state.reset(control, &self.dataset);
                resets.push(ControlReset {
                    control,
                    options,
                    value: state.get(control),
                });
                changed.insert(control);
            }
        }

        // Phase 2: recompute outputs from the final state.
        let mut views = Vec::new();
        for node in &affected {
            if let Node::Output(output) = *node {
                let view = derive_view(output, &state, &self.dataset, self.top_n)?;
                views.push(Arc::new(view));
            }
        }

        Ok(Transition {
            state,
            resets,
            views,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a session handled an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    Applied {
        version: u64,
        recomputed: Vec<OutputId>,
        resets: Vec<ControlId>,
    },
    /// The event was illegal and changed nothing.
    Ignored { reason: String },
}

/// One user's selector state and published views.
///
/// Events are serialized by `inflight`, so a session never interleaves two
/// cascades. Readers only take the `published` lock long enough to clone an
/// `Arc`.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    scheduler: Arc<Scheduler>,
    inflight: Mutex<()>,
    published: RwLock<Arc<Snapshot>>,
}

impl Session {
    pub fn open(scheduler: Arc<Scheduler>, dimension: Dimension) -> Result<Self, DashError> {
        let state = SelectorState::initial(scheduler.dataset(), dimension);
        let snapshot = scheduler.initial_snapshot(state)?;
        let id = SessionId::new();
        debug!(session = %id, "session opened");
        Ok(Self {
            id,
            scheduler,
            inflight: Mutex::new(()),
            published: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handle one control event.
    ///
    /// Illegal values are acknowledged as [`Ack::Ignored`]; only failures of
    /// the aggregation itself surface as errors.
    pub fn dispatch(&self, event: &ControlEvent) -> Result<Ack, DashError> {
        let _guard = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();

        let transition = match self.scheduler.plan(&current.state, event) {
            Ok(t) => t,
            Err(err) if err.is_rejected_event() => {
                warn!(session = %self.id, control = %event.control, value = %event.value, %err, "event ignored");
                return Ok(Ack::Ignored {
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        let recomputed = transition.recomputed();
        let resets: Vec<ControlId> = transition.resets.iter().map(|r| r.control).collect();
        let next = Arc::new(current.apply(transition));
        let version = next.version;

        *self.published.write().unwrap_or_else(PoisonError::into_inner) = next;

        debug!(
            session = %self.id,
            control = %event.control,
            version,
            ?recomputed,
            ?resets,
            "transition published"
        );
        Ok(Ack::Applied {
            version,
            recomputed,
            resets,
        })
    }

    /// Parse wire identifiers and dispatch. Unknown controls are ignored.
    pub fn dispatch_raw(&self, control: &str, value: ControlValue) -> Result<Ack, DashError> {
        match ControlEvent::parse(control, value) {
            Ok(event) => self.dispatch(&event),
            Err(err) => {
                warn!(session = %self.id, control, %err, "event ignored");
                Ok(Ack::Ignored {
                    reason: err.to_string(),
                })
            }
        }
    }
}
