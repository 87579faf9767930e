//! Providers that log instead of touching the machine.

use std::collections::{BTreeMap, BTreeSet};

use super::{CapabilityResult, InputDevice, MouseButton, Point, Rect, TextRecognizer, Vision};

/// Input provider that records every action through `tracing`.
#[derive(Debug, Default, Clone)]
pub struct DryRunInput {
    echo: bool,
}

impl DryRunInput {
    /// Create a provider that only emits tracing events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print each action to stdout.
    pub fn echoing() -> Self {
        Self { echo: true }
    }

    fn emit(&self, action: String) -> CapabilityResult<()> {
        tracing::info!(target: "mimic::dryrun", "{}", action);
        if self.echo {
            println!("{}", action);
        }
        Ok(())
    }
}

impl InputDevice for DryRunInput {
    fn press_key(&self, key: &str) -> CapabilityResult<()> {
        self.emit(format!("press {}", key))
    }

    fn key_down(&self, key: &str) -> CapabilityResult<()> {
        self.emit(format!("key down {}", key))
    }

    fn key_up(&self, key: &str) -> CapabilityResult<()> {
        self.emit(format!("key up {}", key))
    }

    fn move_mouse(&self, at: Point) -> CapabilityResult<()> {
        self.emit(format!("move {}", at))
    }

    fn click(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.emit(format!("click {} {}", button, at))
    }

    fn mouse_down(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.emit(format!("mouse down {} {}", button, at))
    }

    fn mouse_up(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.emit(format!("mouse up {} {}", button, at))
    }

    fn double_click(&self, at: Point) -> CapabilityResult<()> {
        self.emit(format!("double click {}", at))
    }

    fn scroll(&self, at: Point, delta: i32) -> CapabilityResult<()> {
        self.emit(format!("scroll {} by {}", at, delta))
    }
}

/// Vision provider answering from a fixed set of visible images.
#[derive(Debug, Default, Clone)]
pub struct PresetVision {
    visible: BTreeMap<String, Rect>,
}

impl PresetVision {
    /// Every listed image is reported at a placeholder rectangle.
    pub fn with_images<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let visible = names
            .into_iter()
            .map(|name| (name.into(), Rect::new(0, 0, 1, 1)))
            .collect();
        Self { visible }
    }

    /// Place an image at a specific rectangle.
    pub fn insert(&mut self, name: impl Into<String>, rect: Rect) {
        self.visible.insert(name.into(), rect);
    }
}

impl Vision for PresetVision {
    fn locate_image(&self, name: &str, _region: Option<Rect>) -> CapabilityResult<Option<Rect>> {
        Ok(self.visible.get(name).copied())
    }
}

/// Text provider answering from a fixed set of visible strings.
#[derive(Debug, Default, Clone)]
pub struct PresetText {
    visible: BTreeSet<String>,
}

impl PresetText {
    /// Every listed string counts as visible at the origin.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            visible: texts.into_iter().map(Into::into).collect(),
        }
    }
}

impl TextRecognizer for PresetText {
    fn contains(&self, text: &str) -> CapabilityResult<bool> {
        Ok(self.visible.contains(text))
    }

    fn locate(&self, text: &str) -> CapabilityResult<Option<Point>> {
        Ok(self.visible.contains(text).then_some(Point::new(0, 0)))
    }
}
