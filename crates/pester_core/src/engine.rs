use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::TriggerConfig;
use crate::error::ConfigResult;
use crate::events::{ActionKind, Event};
use crate::roll::{Chance, RollTarget, roll_targets};
use crate::scope::ScopeTree;
use crate::value::Value;

/// Decides which actions fire on each tick.
///
/// Pack globals (`pack_name`, `mood`, `ticks`, `fired`) live in the root of
/// [`TriggerEngine::globals`] so scripts can read them.
pub struct TriggerEngine {
    config: TriggerConfig,
    targets: Vec<(ActionKind, Chance)>,
    rng: StdRng,
    globals: ScopeTree,
    counts: HashMap<ActionKind, u64>,
    ticks: u64,
    elapsed: f64,
    panicked: bool,
}

/// Engine state to share outwardly at a point in time.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EngineSnapshot {
    pub ticks: u64,
    pub elapsed_secs: f64,
    pub fired: BTreeMap<String, u64>,
    pub panicked: bool,
    pub single_mode: bool,
    pub pack_name: String,
    pub mood: String,
}

impl TriggerEngine {
    /// Builds an engine from a validated config. `seed` makes rolls replayable.
    pub fn new(config: TriggerConfig, seed: Option<u64>) -> ConfigResult<Self> {
        config.validate()?;
        let targets = config.targets()?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let globals = HashMap::from([
            ("pack_name".to_string(), Value::from(config.pack_name.as_str())),
            ("mood".to_string(), Value::from(config.mood.as_str())),
            ("ticks".to_string(), Value::Number(0.0)),
            ("fired".to_string(), Value::table()),
        ]);

        Ok(Self {
            config,
            targets,
            rng,
            globals: ScopeTree::new(globals),
            counts: HashMap::new(),
            ticks: 0,
            elapsed: 0.0,
            panicked: false,
        })
    }

    /// Apply event and return the actions it fired.
    pub fn apply(&mut self, event: Event) -> Vec<ActionKind> {
        if self.panicked {
            debug!("Ignoring {:?} after panic", event);
            return Vec::new();
        }

        match event {
            Event::Tick { dt } => self.tick(dt),
            Event::Trigger { kind } => {
                self.record(kind);
                vec![kind]
            }
            Event::Reload(config) => {
                self.reload(config);
                Vec::new()
            }
            Event::Panic => {
                info!("Panic received, all triggers stopped");
                self.panicked = true;
                Vec::new()
            }
        }
    }

    fn tick(&mut self, dt: f64) -> Vec<ActionKind> {
        self.ticks += 1;
        self.elapsed += dt;
        self.set_global("ticks", Value::Number(self.ticks as f64));

        let fired = RefCell::new(Vec::new());
        let mut targets: Vec<RollTarget> = self
            .targets
            .iter()
            .map(|&(kind, chance)| {
                let fired = &fired;
                RollTarget::new(chance, move || fired.borrow_mut().push(kind))
            })
            .collect();
        roll_targets(&mut targets, self.config.mode(), &mut self.rng);
        drop(targets);

        let fired = fired.into_inner();
        for &kind in &fired {
            self.record(kind);
        }
        fired
    }

    fn record(&mut self, kind: ActionKind) {
        let count = self.counts.entry(kind).or_insert(0);
        *count += 1;
        let count = *count;
        info!("Firing {} (#{})", kind, count);

        let root = self.globals.root();
        if let Ok(Value::Table(table)) = self.globals.get(root, "fired") {
            table
                .borrow_mut()
                .insert(kind.as_str().to_string(), Value::Number(count as f64));
        }
    }

    fn reload(&mut self, config: TriggerConfig) {
        let targets = match config.validate().and_then(|()| config.targets()) {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Rejected config reload: {}", e);
                return;
            }
        };
        self.set_global("pack_name", Value::from(config.pack_name.as_str()));
        self.set_global("mood", Value::from(config.mood.as_str()));
        info!(
            "Reloaded config: pack={}, mood={}, single_mode={}",
            config.pack_name, config.mood, config.single_mode
        );
        self.targets = targets;
        self.config = config;
    }

    fn set_global(&mut self, name: &str, value: Value) {
        let root = self.globals.root();
        if let Err(e) = self.globals.assign(root, name, value) {
            warn!("Failed to update global {}: {}", name, e);
        }
    }

    /// Scope tree holding the pack globals.
    pub fn globals(&self) -> &ScopeTree {
        &self.globals
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn is_panicked(&self) -> bool {
        self.panicked
    }

    /// Retrieves the current engine snapshot.
    pub fn get_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            ticks: self.ticks,
            elapsed_secs: self.elapsed,
            fired: self
                .counts
                .iter()
                .map(|(kind, count)| (kind.as_str().to_string(), *count))
                .collect(),
            panicked: self.panicked,
            single_mode: self.config.single_mode,
            pack_name: self.config.pack_name.clone(),
            mood: self.config.mood.clone(),
        }
    }
}
