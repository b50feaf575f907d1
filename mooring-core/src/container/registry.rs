//! The dependency graph and its transition rules.
//!
//! Every decision happens under the container lock and produces [`Effects`]:
//! start/stop bodies to run and listener notifications to deliver, both
//! executed by the caller once the lock is released.
use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    sync::Arc,
};

use tracing::{debug, error, info};

use super::{
    inject::ErasedInjector,
    listener::{LifecycleEvent, Notification, ServiceListener},
    service::{ErasedService, ErasedValue},
    Mode, StartException, Substate,
};
use crate::ServiceName;

pub(crate) struct Dependency {
    pub(crate) name: ServiceName,
    pub(crate) optional: bool,
    pub(crate) injectors: Vec<Arc<dyn ErasedInjector>>,
}

pub(crate) struct Entry {
    pub(crate) id: u64,
    pub(crate) service: Arc<dyn ErasedService>,
    pub(crate) mode: Mode,
    pub(crate) substate: Substate,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) listeners: Vec<Arc<dyn ServiceListener>>,
    pub(crate) start_exception: Option<StartException>,
    pub(crate) value: Option<ErasedValue>,
    demanding: bool,
    ticket: u64,
}

impl Entry {
    pub(crate) fn new(
        id: u64,
        service: Arc<dyn ErasedService>,
        mode: Mode,
        dependencies: Vec<Dependency>,
        listeners: Vec<Arc<dyn ServiceListener>>,
    ) -> Self {
        Self {
            id,
            service,
            mode,
            substate: Substate::Down,
            dependencies,
            listeners,
            start_exception: None,
            value: None,
            demanding: false,
            ticket: 0,
        }
    }
}

pub(crate) enum Task {
    Start {
        name: ServiceName,
        ticket: u64,
        service: Arc<dyn ErasedService>,
        injections: Vec<(Arc<dyn ErasedInjector>, Option<ErasedValue>)>,
    },
    Stop {
        name: ServiceName,
        ticket: u64,
        service: Arc<dyn ErasedService>,
    },
}

#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) tasks: Vec<Task>,
    pub(crate) notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Satisfied,
    Pending,
    Problem,
}

#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) entries: HashMap<ServiceName, Entry>,
    // dependency name -> installed dependents, kept even while the dependency is absent
    dependents: HashMap<ServiceName, BTreeSet<ServiceName>>,
    pub(crate) listeners: Vec<Arc<dyn ServiceListener>>,
    pub(crate) shutdown: bool,
    next_id: u64,
    next_ticket: u64,
}

impl Registry {
    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn next_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    pub(crate) fn lookup(&self, name: &ServiceName, id: u64) -> Option<&Entry> {
        self.entries.get(name).filter(|e| e.id == id)
    }

    pub(crate) fn lookup_mut(&mut self, name: &ServiceName, id: u64) -> Option<&mut Entry> {
        self.entries.get_mut(name).filter(|e| e.id == id)
    }

    pub(crate) fn substate_of(&self, name: &ServiceName, id: u64) -> Substate {
        self.lookup(name, id)
            .map(|e| e.substate)
            .unwrap_or(Substate::Removed)
    }

    /// Returns the cycle `name -> .. -> name` that installing `name` with
    /// `dependencies` would close, if any.
    pub(crate) fn find_cycle(
        &self,
        name: &ServiceName,
        dependencies: &[ServiceName],
    ) -> Option<Vec<ServiceName>> {
        fn visit(
            registry: &Registry,
            current: &ServiceName,
            target: &ServiceName,
            path: &mut Vec<ServiceName>,
            seen: &mut HashSet<ServiceName>,
        ) -> bool {
            if current == target {
                return true;
            }
            if !seen.insert(current.clone()) {
                return false;
            }
            let Some(entry) = registry.entries.get(current) else {
                return false;
            };
            for dep in entry.dependencies.iter() {
                path.push(dep.name.clone());
                if visit(registry, &dep.name, target, path, seen) {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut seen = HashSet::new();
        for dep in dependencies {
            let mut path = vec![name.clone(), dep.clone()];
            if visit(self, dep, name, &mut path, &mut seen) {
                return Some(path);
            }
        }
        None
    }

    pub(crate) fn insert(&mut self, name: ServiceName, entry: Entry, fx: &mut Effects) {
        for dep in entry.dependencies.iter() {
            self.dependents
                .entry(dep.name.clone())
                .or_default()
                .insert(name.clone());
        }
        debug!(service = %name, mode = %entry.mode, "service installed");
        self.entries.insert(name.clone(), entry);
        let mut seeds = vec![name.clone()];
        seeds.extend(self.dependents_of(&name));
        self.evaluate(seeds, fx);
    }

    pub(crate) fn dependents_of(&self, name: &ServiceName) -> Vec<ServiceName> {
        self.dependents
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn unavailable_dependencies(&self, entry: &Entry) -> Vec<ServiceName> {
        entry
            .dependencies
            .iter()
            .filter(|dep| match self.entries.get(&dep.name) {
                None => !dep.optional,
                Some(d) => d.substate != Substate::Up,
            })
            .map(|dep| dep.name.clone())
            .collect()
    }

    pub(crate) fn set_mode(&mut self, name: &ServiceName, mode: Mode, fx: &mut Effects) {
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        let from = entry.mode;
        if from == mode {
            return;
        }
        entry.mode = mode;
        debug!(service = %name, %from, to = %mode, "mode changed");
        let listeners = self
            .listeners
            .iter()
            .chain(entry.listeners.iter())
            .cloned()
            .collect();
        fx.notifications.push(Notification {
            listeners,
            event: LifecycleEvent::ModeChanged {
                service: name.clone(),
                from,
                to: mode,
            },
        });
        self.evaluate([name.clone()], fx);
    }

    pub(crate) fn retry(&mut self, name: &ServiceName, fx: &mut Effects) {
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        if entry.substate != Substate::StartFailed {
            return;
        }
        entry.start_exception = None;
        self.set_substate(name, Substate::Down, fx);
        self.evaluate([name.clone()], fx);
    }

    /// Record the outcome of a start body. Returns false for a stale or
    /// duplicate signal.
    pub(crate) fn finish_start(
        &mut self,
        name: &ServiceName,
        ticket: u64,
        outcome: Result<Option<ErasedValue>, StartException>,
        fx: &mut Effects,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        if entry.ticket != ticket || entry.substate != Substate::Starting {
            return false;
        }
        match outcome {
            Ok(value) => {
                entry.value = value;
                entry.start_exception = None;
                info!(service = %name, "service started");
                self.set_substate(name, Substate::Up, fx);
            }
            Err(e) => {
                let e = e.for_service(name);
                error!("{e}");
                entry.value = None;
                entry.start_exception = Some(e);
                uninject(entry);
                self.set_substate(name, Substate::StartFailed, fx);
            }
        }
        let mut seeds = vec![name.clone()];
        seeds.extend(self.neighbors(name));
        self.evaluate(seeds, fx);
        true
    }

    pub(crate) fn finish_stop(&mut self, name: &ServiceName, ticket: u64, fx: &mut Effects) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        if entry.ticket != ticket || entry.substate != Substate::Stopping {
            return false;
        }
        entry.value = None;
        uninject(entry);
        info!(service = %name, "service stopped");
        self.set_substate(name, Substate::Down, fx);
        let mut seeds = vec![name.clone()];
        seeds.extend(self.neighbors(name));
        self.evaluate(seeds, fx);
        true
    }

    /// Re-evaluate `seeds` and everything their changes ripple to, until no
    /// controller changes any more.
    pub(crate) fn evaluate<I>(&mut self, seeds: I, fx: &mut Effects)
    where
        I: IntoIterator<Item = ServiceName>,
    {
        let mut queue = VecDeque::new();
        let mut queued = HashSet::new();
        for seed in seeds {
            if queued.insert(seed.clone()) {
                queue.push_back(seed);
            }
        }
        while let Some(name) = queue.pop_front() {
            queued.remove(&name);
            let neighbors = self.neighbors(&name);
            if self.evaluate_one(&name, fx) {
                for next in std::iter::once(name).chain(neighbors) {
                    if queued.insert(next.clone()) {
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    fn neighbors(&self, name: &ServiceName) -> Vec<ServiceName> {
        let mut out = self.dependents_of(name);
        if let Some(entry) = self.entries.get(name) {
            out.extend(entry.dependencies.iter().map(|d| d.name.clone()));
        }
        out
    }

    fn is_demanded(&self, name: &ServiceName) -> bool {
        self.dependents.get(name).is_some_and(|set| {
            set.iter()
                .any(|d| self.entries.get(d).is_some_and(|e| e.demanding))
        })
    }

    fn dependents_quiet(&self, name: &ServiceName) -> bool {
        self.dependents.get(name).map_or(true, |set| {
            set.iter().all(|d| {
                self.entries
                    .get(d)
                    .map_or(true, |e| !e.substate.is_active())
            })
        })
    }

    fn readiness(&self, entry: &Entry) -> Readiness {
        let mut readiness = Readiness::Satisfied;
        for dep in entry.dependencies.iter() {
            match self.entries.get(&dep.name) {
                None if dep.optional => {}
                None => return Readiness::Problem,
                Some(d) => match d.substate {
                    Substate::Up => {}
                    Substate::StartFailed | Substate::Problem => return Readiness::Problem,
                    _ => readiness = Readiness::Pending,
                },
            }
        }
        readiness
    }

    fn evaluate_one(&mut self, name: &ServiceName, fx: &mut Effects) -> bool {
        let demanded = self.is_demanded(name);
        let Some(entry) = self.entries.get(name) else {
            return false;
        };
        let mode = entry.mode;
        let substate = entry.substate;
        let wants_up = match mode {
            Mode::Active | Mode::Passive => true,
            Mode::OnDemand => demanded,
            Mode::Never | Mode::Remove => false,
        };
        let demanding = match mode {
            Mode::Active => true,
            Mode::OnDemand => demanded,
            _ => false,
        };
        let readiness = self.readiness(entry);

        let mut changed = false;
        if entry.demanding != demanding {
            if let Some(entry) = self.entries.get_mut(name) {
                entry.demanding = demanding;
            }
            changed = true;
        }

        match substate {
            Substate::Starting | Substate::Stopping | Substate::Removed => {}
            Substate::StartFailed => {
                if !wants_up {
                    self.set_substate(name, Substate::Down, fx);
                    changed = true;
                }
            }
            Substate::Down | Substate::Waiting | Substate::Problem => {
                if mode == Mode::Remove {
                    self.remove_entry(name, fx);
                    return true;
                }
                let target = match (wants_up, readiness) {
                    (false, _) => Substate::Down,
                    (true, Readiness::Satisfied) => Substate::Starting,
                    (true, Readiness::Pending) => Substate::Waiting,
                    (true, Readiness::Problem) => Substate::Problem,
                };
                if target == Substate::Starting {
                    self.begin_start(name, fx);
                    changed = true;
                } else if target != substate {
                    self.set_substate(name, target, fx);
                    changed = true;
                }
            }
            Substate::Up => {
                if !wants_up || readiness != Readiness::Satisfied {
                    self.set_substate(name, Substate::StopRequested, fx);
                    if self.dependents_quiet(name) {
                        self.begin_stop(name, fx);
                    }
                    changed = true;
                }
            }
            Substate::StopRequested => {
                if wants_up && readiness == Readiness::Satisfied {
                    self.set_substate(name, Substate::Up, fx);
                    changed = true;
                } else if self.dependents_quiet(name) {
                    self.begin_stop(name, fx);
                    changed = true;
                }
            }
        }
        changed
    }

    fn begin_start(&mut self, name: &ServiceName, fx: &mut Effects) {
        let ticket = self.next_ticket();
        let Some(entry) = self.entries.get(name) else {
            return;
        };
        let injections = entry
            .dependencies
            .iter()
            .flat_map(|dep| {
                let value = self.entries.get(&dep.name).and_then(|d| d.value.clone());
                dep.injectors
                    .iter()
                    .map(move |injector| (injector.clone(), value.clone()))
            })
            .collect();
        let service = entry.service.clone();
        if let Some(entry) = self.entries.get_mut(name) {
            entry.ticket = ticket;
        }
        self.set_substate(name, Substate::Starting, fx);
        fx.tasks.push(Task::Start {
            name: name.clone(),
            ticket,
            service,
            injections,
        });
    }

    fn begin_stop(&mut self, name: &ServiceName, fx: &mut Effects) {
        let ticket = self.next_ticket();
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        entry.ticket = ticket;
        let service = entry.service.clone();
        self.set_substate(name, Substate::Stopping, fx);
        fx.tasks.push(Task::Stop {
            name: name.clone(),
            ticket,
            service,
        });
    }

    fn remove_entry(&mut self, name: &ServiceName, fx: &mut Effects) {
        self.set_substate(name, Substate::Removed, fx);
        let Some(entry) = self.entries.remove(name) else {
            return;
        };
        for dep in entry.dependencies.iter() {
            if let Some(set) = self.dependents.get_mut(&dep.name) {
                set.remove(name);
                if set.is_empty() {
                    self.dependents.remove(&dep.name);
                }
            }
        }
        debug!(service = %name, "service removed");
    }

    fn set_substate(&mut self, name: &ServiceName, to: Substate, fx: &mut Effects) {
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        let from = entry.substate;
        if from == to {
            return;
        }
        entry.substate = to;
        debug!(service = %name, %from, %to, "transition");
        let listeners = self
            .listeners
            .iter()
            .chain(entry.listeners.iter())
            .cloned()
            .collect();
        fx.notifications.push(Notification {
            listeners,
            event: LifecycleEvent::Transition {
                service: name.clone(),
                from,
                to,
            },
        });
    }
}

fn uninject(entry: &Entry) {
    for dep in entry.dependencies.iter() {
        for injector in dep.injectors.iter() {
            injector.uninject();
        }
    }
}
