//! Selective recomputation
//!
//! [`build_plan`] decides which formulas are cached and which recompute on
//! every pass. [`OptimizeManager`] installs a plan: it subscribes once to
//! every watched host, turns property changes into queued formulas, and runs
//! compute passes over the queue.

mod plan;
mod queue;

pub use plan::{build_plan, OptimizationPlan};
pub use queue::ComputeQueue;

use crate::expressions::ExpressionSet;
use indexmap::IndexMap;
use propcalc_core::{PropertyListener, Subscription, VariableSet};
use propcalc_formula::EvaluationContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Routes property changes of watched hosts into the compute queue
pub struct ChangeDispatcher {
    plan: Arc<OptimizationPlan>,
    queue: ComputeQueue,
    computing: AtomicBool,
    expressions: Arc<ExpressionSet>,
    separator: char,
}

impl ChangeDispatcher {
    fn new(plan: Arc<OptimizationPlan>, expressions: Arc<ExpressionSet>, separator: char) -> Self {
        Self {
            plan,
            queue: ComputeQueue::new(),
            computing: AtomicBool::new(false),
            expressions,
            separator,
        }
    }

    /// Queue a formula, invalidating its buffer if it was not queued yet
    fn enqueue(&self, key: &str) -> bool {
        self.queue
            .push_with(key, || self.expressions.reset_buffer(key))
    }

    pub fn is_computing(&self) -> bool {
        self.computing.load(Ordering::SeqCst)
    }
}

impl PropertyListener for ChangeDispatcher {
    fn property_changed(&self, variable: &str, property: &str) {
        // Writes made by a compute pass must not queue more work
        if self.is_computing() {
            return;
        }

        let key = format!("{}{}{}", variable, self.separator, property);
        let Some(formulas) = self.plan.listeners(&key) else {
            return;
        };
        let queued = formulas.iter().filter(|f| self.enqueue(f)).count();
        tracing::trace!(key = %key, queued, "property changed");
    }
}

/// Clears the computing flag when a pass ends, even by unwinding
struct ComputingGuard<'a>(&'a AtomicBool);

impl<'a> ComputingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the installed plan, the host subscriptions and the compute queue
pub struct OptimizeManager {
    dispatcher: Arc<ChangeDispatcher>,
    subscriptions: IndexMap<String, Subscription>,
    expressions: Arc<ExpressionSet>,
    separator: char,
    installed: bool,
}

impl OptimizeManager {
    pub fn new(expressions: Arc<ExpressionSet>, separator: char) -> Self {
        let dispatcher = Arc::new(ChangeDispatcher::new(
            Arc::new(OptimizationPlan::default()),
            Arc::clone(&expressions),
            separator,
        ));
        Self {
            dispatcher,
            subscriptions: IndexMap::new(),
            expressions,
            separator,
            installed: false,
        }
    }

    /// Replace the installed plan.
    ///
    /// Subscriptions of the previous plan are cancelled and anything still
    /// queued is discarded. Each watched host that supports change tracking
    /// gets exactly one subscription.
    pub fn install(&mut self, plan: OptimizationPlan, variables: &VariableSet) {
        self.subscriptions.clear();

        let plan = Arc::new(plan);
        self.dispatcher = Arc::new(ChangeDispatcher::new(
            Arc::clone(&plan),
            Arc::clone(&self.expressions),
            self.separator,
        ));

        for name in plan.watched_variables(self.separator) {
            if self.subscriptions.contains_key(name) {
                continue;
            }
            let Some(host) = variables.get(name).and_then(|var| var.as_optimizable()) else {
                continue;
            };
            let listener: Arc<dyn PropertyListener> = self.dispatcher.clone();
            self.subscriptions
                .insert(name.to_string(), host.subscribe(listener));
        }
        self.installed = true;

        tracing::debug!(
            subscriptions = self.subscriptions.len(),
            watched_keys = plan.event_graph.len(),
            "plan installed"
        );
    }

    /// Drop the plan and every subscription
    pub fn reset(&mut self) {
        self.subscriptions.clear();
        self.dispatcher = Arc::new(ChangeDispatcher::new(
            Arc::new(OptimizationPlan::default()),
            Arc::clone(&self.expressions),
            self.separator,
        ));
        self.installed = false;
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn plan(&self) -> &OptimizationPlan {
        &self.dispatcher.plan
    }

    /// Names of the hosts this manager is subscribed to
    pub fn subscribed_variables(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.keys().map(String::as_str)
    }

    /// Number of formulas waiting for the next pass
    pub fn pending(&self) -> usize {
        self.dispatcher.queue.len()
    }

    pub fn queued_keys(&self) -> Vec<String> {
        self.dispatcher.queue.keys()
    }

    /// Report a change by hand, for hosts without change notification
    pub fn property_changed(&self, variable: &str, property: &str) {
        self.dispatcher.property_changed(variable, property);
    }

    /// Recompute every not-optimizable formula plus the queued ones, the
    /// queued ones in dependency order.
    ///
    /// Returns how many formulas were queued.
    pub fn compute(&self, ctx: &dyn EvaluationContext) -> usize {
        let dispatcher = &self.dispatcher;
        let not_optimizable = &dispatcher.plan.not_optimizable;
        for key in not_optimizable {
            self.expressions.reset_buffer(key);
        }

        let _guard = ComputingGuard::enter(&dispatcher.computing);
        let mut queued = dispatcher.queue.drain();
        let count = queued.len();
        // Sources before readers
        dispatcher.plan.sort_by_order(&mut queued);

        let mut keys: Vec<String> = not_optimizable.iter().cloned().collect();
        keys.extend(queued.into_iter().filter(|key| !not_optimizable.contains(key)));
        ctx.compute_expressions(&keys);

        tracing::debug!(queued = count, computed = keys.len(), "compute pass finished");
        count
    }

    /// Queue every object reference and every formula in the event graph,
    /// then [`compute`](Self::compute).
    pub fn compute_all(&self, ctx: &dyn EvaluationContext) -> usize {
        let plan = &self.dispatcher.plan;
        for key in &plan.object_references {
            self.dispatcher.enqueue(key);
        }
        for formulas in plan.event_graph.values() {
            for key in formulas {
                self.dispatcher.enqueue(key);
            }
        }
        self.compute(ctx)
    }
}

impl std::fmt::Debug for OptimizeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizeManager")
            .field("installed", &self.installed)
            .field("subscriptions", &self.subscriptions.len())
            .field("pending", &self.pending())
            .finish()
    }
}
