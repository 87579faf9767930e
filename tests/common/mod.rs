#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use mimic::capability::{
    Capabilities, CapabilityError, CapabilityResult, InputDevice, MouseButton, Point, Rect,
    TextRecognizer, Vision,
};
use mimic::config::EngineConfig;
use mimic::engine::{RunReport, run};
use mimic::script::parse_program;
use parking_lot::Mutex;

#[derive(Default)]
struct World {
    actions: Vec<String>,
    visible: BTreeSet<String>,
    /// Per-image answers consumed one per lookup before falling back to `visible`.
    sequences: BTreeMap<String, VecDeque<bool>>,
    lookups: BTreeMap<String, usize>,
    texts: BTreeSet<String>,
    failing_keys: BTreeSet<String>,
}

/// Recording input device that doubles as a scripted screen.
#[derive(Clone, Default)]
pub struct Mock {
    world: Arc<Mutex<World>>,
}

impl Mock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, image: &str) -> &Self {
        self.world.lock().visible.insert(image.to_string());
        self
    }

    pub fn show_text(&self, text: &str) -> &Self {
        self.world.lock().texts.insert(text.to_string());
        self
    }

    /// Answer the next lookups of `image` from `answers`, in order.
    pub fn sequence(&self, image: &str, answers: &[bool]) -> &Self {
        self.world
            .lock()
            .sequences
            .insert(image.to_string(), answers.iter().copied().collect());
        self
    }

    pub fn fail_key(&self, key: &str) -> &Self {
        self.world.lock().failing_keys.insert(key.to_string());
        self
    }

    pub fn actions(&self) -> Vec<String> {
        self.world.lock().actions.clone()
    }

    pub fn presses(&self, key: &str) -> usize {
        let wanted = format!("press {}", key);
        self.actions().iter().filter(|action| **action == wanted).count()
    }

    pub fn lookups(&self, image: &str) -> usize {
        self.world.lock().lookups.get(image).copied().unwrap_or_default()
    }

    /// Input and vision, no text recognizer.
    pub fn caps(&self) -> Capabilities {
        Capabilities::new(self.clone()).with_vision(self.clone())
    }

    /// Input, vision and text recognition.
    pub fn full_caps(&self) -> Capabilities {
        self.caps().with_text(self.clone())
    }

    fn record(&self, action: String) -> CapabilityResult<()> {
        self.world.lock().actions.push(action);
        Ok(())
    }
}

impl InputDevice for Mock {
    fn press_key(&self, key: &str) -> CapabilityResult<()> {
        if self.world.lock().failing_keys.contains(key) {
            return Err(CapabilityError::Failed(format!("key {} jammed", key)));
        }
        self.record(format!("press {}", key))
    }

    fn key_down(&self, key: &str) -> CapabilityResult<()> {
        self.record(format!("down {}", key))
    }

    fn key_up(&self, key: &str) -> CapabilityResult<()> {
        self.record(format!("up {}", key))
    }

    fn move_mouse(&self, at: Point) -> CapabilityResult<()> {
        self.record(format!("move {}", at))
    }

    fn click(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.record(format!("click {} {}", button, at))
    }

    fn mouse_down(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.record(format!("mouse down {} {}", button, at))
    }

    fn mouse_up(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.record(format!("mouse up {} {}", button, at))
    }
}

impl Vision for Mock {
    fn locate_image(&self, name: &str, _region: Option<Rect>) -> CapabilityResult<Option<Rect>> {
        let mut world = self.world.lock();
        *world.lookups.entry(name.to_string()).or_default() += 1;
        let scripted = world
            .sequences
            .get_mut(name)
            .and_then(|answers| answers.pop_front());
        let found = scripted.unwrap_or_else(|| world.visible.contains(name));
        Ok(found.then(|| Rect::new(10, 10, 4, 4)))
    }
}

impl TextRecognizer for Mock {
    fn contains(&self, text: &str) -> CapabilityResult<bool> {
        Ok(self.world.lock().texts.contains(text))
    }

    fn locate(&self, text: &str) -> CapabilityResult<Option<Point>> {
        Ok(self.world.lock().texts.contains(text).then(|| Point::new(5, 5)))
    }
}

/// Configuration with the execution trace enabled.
pub fn traced() -> EngineConfig {
    EngineConfig {
        record_trace: true,
        ..EngineConfig::default()
    }
}

/// Parse and run `source` on the virtual clock.
pub fn run_script(source: &str, caps: Capabilities, config: EngineConfig) -> RunReport {
    let program = parse_program("test", source).unwrap();
    run(program, caps, config).unwrap()
}
