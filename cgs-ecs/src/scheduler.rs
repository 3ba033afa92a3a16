//! Staged system scheduler: PreUpdate -> Update -> PostUpdate -> FixedUpdate,
//! per-stage dependency graph, Kahn's-algorithm topological build.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};

use slog::{debug, Logger};

pub const DEFAULT_FIXED_TIME_STEP: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemStage {
    PreUpdate,
    Update,
    PostUpdate,
    FixedUpdate,
}

pub const STAGES: [SystemStage; 4] = [
    SystemStage::PreUpdate,
    SystemStage::Update,
    SystemStage::PostUpdate,
    SystemStage::FixedUpdate,
];

/// Declared component read/write sets for external tooling; the scheduler
/// itself does not use this for correctness since execution is serial.
#[derive(Debug, Default, Clone)]
pub struct SystemAccessInfo {
    pub reads: HashSet<TypeId>,
    pub writes: HashSet<TypeId>,
}

/// Capability set every system must implement.
pub trait System: Any {
    fn execute(&mut self, delta_time: f32);
    fn stage(&self) -> SystemStage;
    fn name(&self) -> &'static str;
    fn access_info(&self) -> SystemAccessInfo {
        SystemAccessInfo::default()
    }
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct SystemEntry {
    instance: Box<dyn System>,
    type_id: TypeId,
    stage: SystemStage,
    enabled: bool,
}

/// Registers, orders, and drives systems across the four fixed stages.
pub struct SystemScheduler {
    logger: Logger,
    entries: Vec<SystemEntry>,
    index_by_type: HashMap<TypeId, usize>,
    // dependency edges restricted to within a single stage: before -> {after}
    dependencies: HashMap<TypeId, HashSet<TypeId>>,
    execution_order: HashMap<SystemStage, Vec<usize>>,
    built: bool,
    last_error: Option<String>,
    fixed_time_step: f32,
    fixed_accumulator: f32,
}

impl SystemScheduler {
    pub fn new(logger: impl Into<Option<Logger>>) -> Self {
        let logger = logger.into().unwrap_or_else(default_logger);
        SystemScheduler {
            logger,
            entries: Vec::new(),
            index_by_type: HashMap::new(),
            dependencies: HashMap::new(),
            execution_order: HashMap::new(),
            built: false,
            last_error: None,
            fixed_time_step: DEFAULT_FIXED_TIME_STEP,
            fixed_accumulator: 0.0,
        }
    }

    /// Registers a system, idempotent per concrete type: re-registering
    /// returns the existing instance's index rather than constructing twice.
    pub fn register<T: System>(&mut self, instance: T) -> usize {
        let type_id = TypeId::of::<T>();
        if let Some(&idx) = self.index_by_type.get(&type_id) {
            return idx;
        }
        let stage = instance.stage();
        let idx = self.entries.len();
        self.entries.push(SystemEntry {
            instance: Box::new(instance),
            type_id,
            stage,
            enabled: true,
        });
        self.index_by_type.insert(type_id, idx);
        self.built = false;
        idx
    }

    fn index_of<T: System>(&self) -> Option<usize> {
        self.index_by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Records `before` must run before `after`. Both systems must already
    /// be registered and share a stage; cross-stage edges are silently
    /// rejected since stage ordering is already implicit.
    pub fn add_dependency<Before: System, After: System>(&mut self) {
        let (bi, ai) = match (self.index_of::<Before>(), self.index_of::<After>()) {
            (Some(bi), Some(ai)) => (bi, ai),
            _ => return,
        };
        if self.entries[bi].stage != self.entries[ai].stage {
            return;
        }
        let before_id = self.entries[bi].type_id;
        let after_id = self.entries[ai].type_id;
        self.dependencies.entry(before_id).or_default().insert(after_id);
        self.built = false;
    }

    pub fn set_enabled<T: System>(&mut self, enabled: bool) {
        if let Some(idx) = self.index_of::<T>() {
            self.entries[idx].enabled = enabled;
        }
    }

    pub fn is_enabled<T: System>(&self) -> bool {
        self.index_of::<T>().map(|i| self.entries[i].enabled).unwrap_or(false)
    }

    pub fn get<T: System>(&self) -> Option<&T> {
        self.index_of::<T>()
            .and_then(|i| self.entries[i].instance.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: System>(&mut self) -> Option<&mut T> {
        let idx = self.index_of::<T>()?;
        self.entries[idx].instance.as_any_mut().downcast_mut::<T>()
    }

    pub fn get_last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_fixed_time_step(&mut self, step: f32) {
        self.fixed_time_step = step;
    }

    pub fn fixed_time_step(&self) -> f32 {
        self.fixed_time_step
    }

    pub fn get_execution_order(&self, stage: SystemStage) -> Vec<&'static str> {
        self.execution_order
            .get(&stage)
            .map(|order| order.iter().map(|&i| self.entries[i].instance.name()).collect())
            .unwrap_or_default()
    }

    /// Builds the per-stage execution order via Kahn's algorithm. On a
    /// cycle, `last_error` names every system still left with a nonzero
    /// in-degree and `false` is returned.
    pub fn build(&mut self) -> bool {
        self.last_error = None;
        self.execution_order.clear();

        for &stage in STAGES.iter() {
            let stage_indices: Vec<usize> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.stage == stage)
                .map(|(i, _)| i)
                .collect();

            let mut in_degree: HashMap<usize, usize> =
                stage_indices.iter().map(|&i| (i, 0)).collect();
            let mut successors: HashMap<usize, Vec<usize>> =
                stage_indices.iter().map(|&i| (i, Vec::new())).collect();

            for &i in &stage_indices {
                let type_id = self.entries[i].type_id;
                if let Some(afters) = self.dependencies.get(&type_id) {
                    for &after_id in afters {
                        if let Some(&j) = self.index_by_type.get(&after_id) {
                            if self.entries[j].stage == stage {
                                successors.get_mut(&i).unwrap().push(j);
                                *in_degree.get_mut(&j).unwrap() += 1;
                            }
                        }
                    }
                }
            }

            let mut queue: VecDeque<usize> = stage_indices
                .iter()
                .copied()
                .filter(|i| in_degree[i] == 0)
                .collect();
            let mut order = Vec::with_capacity(stage_indices.len());

            while let Some(i) = queue.pop_front() {
                order.push(i);
                for &j in &successors[&i] {
                    let d = in_degree.get_mut(&j).unwrap();
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(j);
                    }
                }
            }

            if order.len() != stage_indices.len() {
                let stuck: Vec<&str> = stage_indices
                    .iter()
                    .filter(|i| in_degree[i] > 0)
                    .map(|&i| self.entries[i].instance.name())
                    .collect();
                self.last_error = Some(format!(
                    "dependency cycle detected in stage {:?} involving: {}",
                    stage,
                    stuck.join(", ")
                ));
                self.built = false;
                return false;
            }

            self.execution_order.insert(stage, order);
        }

        self.built = true;
        true
    }

    /// Runs PreUpdate, Update, PostUpdate once, then drains the fixed-step
    /// accumulator. Precondition: a successful `build()`.
    pub fn execute(&mut self, delta_time: f32) {
        debug_assert!(self.built, "SystemScheduler::execute called before a successful build()");
        if !self.built {
            return;
        }

        for &stage in &[SystemStage::PreUpdate, SystemStage::Update, SystemStage::PostUpdate] {
            self.run_stage_once(stage, delta_time);
        }

        self.fixed_accumulator += delta_time;
        while self.fixed_accumulator >= self.fixed_time_step {
            self.fixed_accumulator -= self.fixed_time_step;
            self.run_stage_once(SystemStage::FixedUpdate, self.fixed_time_step);
        }
    }

    fn run_stage_once(&mut self, stage: SystemStage, dt: f32) {
        let order = match self.execution_order.get(&stage).cloned() {
            Some(order) => order,
            None => return,
        };
        for idx in order {
            if self.entries[idx].enabled {
                debug!(self.logger, "executing system"; "name" => self.entries[idx].instance.name(), "stage" => ?stage);
                self.entries[idx].instance.execute(dt);
            }
        }
    }
}

fn default_logger() -> Logger {
    use slog::{o, Drain};
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingSystem {
        name: &'static str,
        stage: SystemStage,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl System for RecordingSystem {
        fn execute(&mut self, _dt: f32) {
            self.log.borrow_mut().push(self.name);
        }
        fn stage(&self) -> SystemStage {
            self.stage
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    macro_rules! make_system {
        ($ty:ident, $name:literal, $stage:expr) => {
            struct $ty(Rc<RefCell<Vec<&'static str>>>);
            impl System for $ty {
                fn execute(&mut self, _dt: f32) {
                    self.0.borrow_mut().push($name);
                }
                fn stage(&self) -> SystemStage {
                    $stage
                }
                fn name(&self) -> &'static str {
                    $name
                }
                fn as_any(&self) -> &dyn Any {
                    self
                }
                fn as_any_mut(&mut self) -> &mut dyn Any {
                    self
                }
            }
        };
    }

    make_system!(SysA, "A", SystemStage::Update);
    make_system!(SysB, "B", SystemStage::Update);
    make_system!(SysC, "C", SystemStage::Update);
    make_system!(SysD, "D", SystemStage::Update);

    #[test]
    fn s1_diamond_topo_order_respects_all_edges() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sched = SystemScheduler::new(None);
        sched.register(SysA(log.clone()));
        sched.register(SysB(log.clone()));
        sched.register(SysC(log.clone()));
        sched.register(SysD(log.clone()));
        sched.add_dependency::<SysA, SysB>();
        sched.add_dependency::<SysA, SysC>();
        sched.add_dependency::<SysB, SysD>();
        sched.add_dependency::<SysC, SysD>();

        assert!(sched.build());
        sched.execute(0.016);

        let order = log.borrow();
        let pos = |n: &str| order.iter().position(|x| *x == n).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("A") < pos("C"));
        assert!(pos("B") < pos("D"));
        assert!(pos("C") < pos("D"));
    }

    make_system!(CycA, "A", SystemStage::Update);
    make_system!(CycB, "B", SystemStage::Update);
    make_system!(CycC, "C", SystemStage::Update);

    #[test]
    fn s2_cycle_detection_names_all_implicated_systems() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sched = SystemScheduler::new(None);
        sched.register(CycA(log.clone()));
        sched.register(CycB(log.clone()));
        sched.register(CycC(log.clone()));
        sched.add_dependency::<CycA, CycB>();
        sched.add_dependency::<CycB, CycC>();
        sched.add_dependency::<CycC, CycA>();

        assert!(!sched.build());
        let err = sched.get_last_error().unwrap();
        assert!(err.contains('A'));
        assert!(err.contains('B'));
        assert!(err.contains('C'));
    }

    struct FixedCounter {
        count: u32,
        deltas: Vec<f32>,
    }

    impl System for FixedCounter {
        fn execute(&mut self, dt: f32) {
            self.count += 1;
            self.deltas.push(dt);
        }
        fn stage(&self) -> SystemStage {
            SystemStage::FixedUpdate
        }
        fn name(&self) -> &'static str {
            "FixedCounter"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn s3_fixed_step_accumulator_fires_expected_count_with_exact_delta() {
        let mut sched = SystemScheduler::new(None);
        sched.set_fixed_time_step(0.05);
        sched.register(FixedCounter { count: 0, deltas: Vec::new() });
        assert!(sched.build());

        for _ in 0..4 {
            sched.execute(0.03);
        }

        let counter = sched.get::<FixedCounter>().unwrap();
        assert_eq!(counter.count, 2);
        assert!(counter.deltas.iter().all(|&d| (d - 0.05).abs() < 1e-6));
    }

    #[test]
    fn cross_stage_dependency_is_silently_rejected() {
        struct PreSys;
        impl System for PreSys {
            fn execute(&mut self, _dt: f32) {}
            fn stage(&self) -> SystemStage {
                SystemStage::PreUpdate
            }
            fn name(&self) -> &'static str {
                "Pre"
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
        struct UpdSys;
        impl System for UpdSys {
            fn execute(&mut self, _dt: f32) {}
            fn stage(&self) -> SystemStage {
                SystemStage::Update
            }
            fn name(&self) -> &'static str {
                "Upd"
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
        let mut sched = SystemScheduler::new(None);
        sched.register(PreSys);
        sched.register(UpdSys);
        sched.add_dependency::<PreSys, UpdSys>();
        assert!(sched.build());
    }
}
