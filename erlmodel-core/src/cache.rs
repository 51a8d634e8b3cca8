//! Element cache: arena of model nodes with lazy, single-flight builds
//!
//! Every node lives in one arena keyed by its [`Handle`]. A node records its
//! parent handle and owns the ordered list of its children's handles.
//! Openable nodes start closed; opening runs the node's builder once and
//! installs the produced subtree. Closing drops every descendant entry.
//!
//! Concurrent openers of the same closed node share one build: the first
//! caller registers a [`Flight`] and builds without holding the arena lock,
//! later callers block on the flight and receive its outcome.

use crate::element::{Element, ElementInfo, ElementSpec};
use crate::error::BuildFailure;
use crate::handle::Handle;
use crate::ModelError;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

/// Produces the children of an element from its backing data
pub type Builder<'a> = dyn Fn(&Element) -> Result<Vec<ElementSpec>, BuildFailure> + 'a;

type BuildOutcome = Result<Vec<Element>, BuildFailure>;

struct NodeEntry {
    info: ElementInfo,
    parent: Option<Handle>,
    children: Vec<Handle>,
    open: bool,
}

/// One in-progress build, shared by every caller waiting for it
struct Flight {
    outcome: Mutex<Option<BuildOutcome>>,
    done: Condvar,
    builder: ThreadId,
}

impl Flight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
            builder: thread::current().id(),
        }
    }

    fn complete(&self, outcome: BuildOutcome) {
        let mut slot = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> BuildOutcome {
        let mut slot = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

#[derive(Default)]
struct Arena {
    nodes: HashMap<Handle, NodeEntry>,
    /// Builds in progress; an entry removed by `close` marks its build stale
    flights: HashMap<Handle, Arc<Flight>>,
    /// Builder runs per handle, kept across close/reopen
    builds: HashMap<Handle, u64>,
}

impl Arena {
    fn element(&self, handle: &Handle) -> Option<Element> {
        self.nodes
            .get(handle)
            .map(|entry| Element::new(handle.clone(), entry.info.clone()))
    }

    fn children_of(&self, handle: &Handle) -> Vec<Element> {
        self.nodes
            .get(handle)
            .map(|entry| {
                entry
                    .children
                    .iter()
                    .filter_map(|child| self.element(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert built children below `parent`; returns their handles in order
    fn install(&mut self, parent: &Handle, specs: Vec<ElementSpec>) -> Vec<Handle> {
        let mut seen = HashSet::new();
        let mut handles = Vec::with_capacity(specs.len());

        for ElementSpec {
            handle,
            info,
            children,
        } in specs
        {
            if !seen.insert(handle.clone()) {
                tracing::debug!(element = %handle, "duplicate child dropped");
                continue;
            }

            if let Some(existing) = self.nodes.get_mut(&handle) {
                // Detached node created before its parent was built
                existing.info = info;
                existing.parent = Some(parent.clone());
            } else if info.is_openable() {
                self.nodes.insert(
                    handle.clone(),
                    NodeEntry {
                        info,
                        parent: Some(parent.clone()),
                        children: Vec::new(),
                        open: false,
                    },
                );
            } else {
                self.nodes.insert(
                    handle.clone(),
                    NodeEntry {
                        info,
                        parent: Some(parent.clone()),
                        children: Vec::new(),
                        open: true,
                    },
                );
                let nested = self.install(&handle, children);
                if let Some(entry) = self.nodes.get_mut(&handle) {
                    entry.children = nested;
                }
            }
            handles.push(handle);
        }

        handles
    }

    /// Drop a node's descendants and mark it closed
    fn close(&mut self, handle: &Handle) {
        self.flights.remove(handle);
        let children = match self.nodes.get_mut(handle) {
            Some(entry) => {
                if !entry.info.is_openable() {
                    return;
                }
                entry.open = false;
                std::mem::take(&mut entry.children)
            }
            None => return,
        };
        for child in children {
            self.remove_subtree(&child);
        }
    }

    fn remove_subtree(&mut self, handle: &Handle) {
        self.flights.remove(handle);
        if let Some(entry) = self.nodes.remove(handle) {
            for child in entry.children {
                self.remove_subtree(&child);
            }
        }
    }
}

/// Completes a flight with a failure if the builder unwinds
struct FlightGuard<'a> {
    cache: &'a ElementCache,
    handle: &'a Handle,
    flight: &'a Arc<Flight>,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut arena = self.cache.lock();
            if arena
                .flights
                .get(self.handle)
                .is_some_and(|f| Arc::ptr_eq(f, self.flight))
            {
                arena.flights.remove(self.handle);
            }
        }
        self.flight.complete(Err(BuildFailure::new(
            self.handle.to_string(),
            "structure builder panicked",
        )));
    }
}

/// Arena-backed store of model elements
pub struct ElementCache {
    arena: Mutex<Arena>,
}

impl ElementCache {
    /// Cache holding only a closed root node
    pub fn new(root: Handle, info: ElementInfo) -> Self {
        let mut arena = Arena::default();
        arena.nodes.insert(
            root,
            NodeEntry {
                info,
                parent: None,
                children: Vec::new(),
                open: false,
            },
        );
        Self {
            arena: Mutex::new(arena),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Existing element, or a new closed node that is not (yet) one of its
    /// parent's children
    pub fn ensure(&self, handle: &Handle, info: ElementInfo) -> Element {
        let mut arena = self.lock();
        if let Some(element) = arena.element(handle) {
            return element;
        }
        let open = !info.is_openable();
        arena.nodes.insert(
            handle.clone(),
            NodeEntry {
                info: info.clone(),
                parent: handle.parent().cloned(),
                children: Vec::new(),
                open,
            },
        );
        Element::new(handle.clone(), info)
    }

    pub fn element(&self, handle: &Handle) -> Option<Element> {
        self.lock().element(handle)
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.lock().nodes.contains_key(handle)
    }

    pub fn is_open(&self, handle: &Handle) -> bool {
        self.lock().nodes.get(handle).is_some_and(|e| e.open)
    }

    /// Parent recorded for a cached node
    pub fn parent(&self, handle: &Handle) -> Option<Handle> {
        self.lock().nodes.get(handle).and_then(|e| e.parent.clone())
    }

    /// Children of `handle`, building them first when the node is closed.
    ///
    /// An open node is never rebuilt. A failed build leaves the node closed
    /// without children.
    pub fn children(&self, handle: &Handle, builder: &Builder<'_>) -> crate::Result<Vec<Element>> {
        let mut arena = self.lock();
        let Some(entry) = arena.nodes.get(handle) else {
            return Err(BuildFailure::new(handle.to_string(), "not in the model").into());
        };
        if entry.open {
            return Ok(arena.children_of(handle));
        }
        let element = Element::new(handle.clone(), entry.info.clone());

        if let Some(flight) = arena.flights.get(handle) {
            if flight.builder == thread::current().id() {
                return Err(ModelError::ReentrantBuild {
                    element: handle.to_string(),
                });
            }
            let flight = Arc::clone(flight);
            drop(arena);
            tracing::debug!(element = %handle, "waiting for in-flight build");
            return flight.wait().map_err(ModelError::from);
        }

        let flight = Arc::new(Flight::new());
        arena.flights.insert(handle.clone(), Arc::clone(&flight));
        *arena.builds.entry(handle.clone()).or_insert(0) += 1;
        drop(arena);

        let mut guard = FlightGuard {
            cache: self,
            handle,
            flight: &flight,
            armed: true,
        };
        tracing::debug!(element = %handle, "building structure");
        let built = builder(&element);
        guard.armed = false;

        let outcome = self.finish(handle, &flight, built);
        flight.complete(outcome.clone());
        outcome.map_err(ModelError::from)
    }

    /// Install a finished build unless it went stale while running
    fn finish(
        &self,
        handle: &Handle,
        flight: &Arc<Flight>,
        built: Result<Vec<ElementSpec>, BuildFailure>,
    ) -> BuildOutcome {
        let mut arena = self.lock();
        let current = arena
            .flights
            .get(handle)
            .is_some_and(|f| Arc::ptr_eq(f, flight));
        if current {
            arena.flights.remove(handle);
        }

        let specs = match built {
            Ok(specs) => specs,
            Err(failure) => {
                tracing::debug!(element = %handle, reason = %failure.reason, "structure build failed");
                return Err(failure);
            }
        };

        if !current || !arena.nodes.contains_key(handle) {
            tracing::debug!(element = %handle, "discarding build of closed element");
            return Ok(specs
                .into_iter()
                .map(|spec| Element::new(spec.handle, spec.info))
                .collect());
        }

        let children = arena.install(handle, specs);
        if let Some(entry) = arena.nodes.get_mut(handle) {
            entry.children = children;
            entry.open = true;
        }
        Ok(arena.children_of(handle))
    }

    /// Close `handle`: descendants are dropped, the node itself stays cached.
    /// A build of the node or of any descendant that is still running will
    /// not be installed.
    pub fn close(&self, handle: &Handle) {
        self.lock().close(handle);
    }

    /// Remove `handle` and its subtree from the cache and from its parent's
    /// children
    pub fn forget(&self, handle: &Handle) {
        let mut arena = self.lock();
        let parent = arena.nodes.get(handle).and_then(|e| e.parent.clone());
        if let Some(parent) = parent.and_then(|p| arena.nodes.get_mut(&p)) {
            parent.children.retain(|c| c != handle);
        }
        arena.remove_subtree(handle);
    }

    /// Number of times the builder ran for `handle`
    pub fn build_count(&self, handle: &Handle) -> u64 {
        self.lock().builds.get(handle).copied().unwrap_or(0)
    }

    /// Indented dump of the cached tree below `handle`
    pub fn describe(&self, handle: &Handle) -> String {
        let arena = self.lock();
        let mut out = String::new();
        describe_node(&arena, handle, 0, &mut out);
        out
    }
}

fn describe_node(arena: &Arena, handle: &Handle, depth: usize, out: &mut String) {
    let Some(entry) = arena.nodes.get(handle) else {
        return;
    };
    let name = match handle.arity() {
        Some(arity) => format!("{}/{}", handle.name(), arity),
        None if handle.is_root() => "<root>".to_string(),
        None => handle.name().to_string(),
    };
    let _ = write!(out, "{}{} {}", "  ".repeat(depth), handle.kind().as_str(), name);
    if !entry.open {
        out.push_str(" (not open)");
    }
    out.push('\n');
    for child in &entry.children {
        describe_node(arena, child, depth + 1, out);
    }
}
