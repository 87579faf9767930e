//! Capability contracts consumed by the engine.
//!
//! Every effectful instruction (pressing a key, clicking, locating an image,
//! reading text) is delegated to a provider implementing one of the traits
//! below. Providers live outside the core; the engine only decides *when* to
//! call them and how to interpret the answer.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dry-run providers used by the CLI and for quick experiments.
pub mod dryrun;
/// Mutex-serialized wrapper for providers shared by concurrent cursors.
pub mod serialized;

pub use dryrun::{DryRunInput, PresetText, PresetVision};
pub use serialized::Serialized;

/// Screen coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position in pixels.
    pub x: i32,
    /// Vertical position in pixels.
    pub y: i32,
}

impl Point {
    /// Build a point.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Axis-aligned screen rectangle (a located image).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Build a rectangle.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, used as the target of image move/click instructions.
    pub fn center(&self) -> Point {
        Point {
            x: self.x + (self.width / 2) as i32,
            y: self.y + (self.height / 2) as i32,
        }
    }
}

/// Physical mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    /// Primary button.
    Left,
    /// Secondary button.
    Right,
    /// Wheel button.
    Middle,
}

impl MouseButton {
    /// Parse a button name as written in scripts (`left`, `右`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" | "l" | "左" => Some(Self::Left),
            "right" | "r" | "右" => Some(Self::Right),
            "middle" | "m" | "中" => Some(Self::Middle),
            _ => None,
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        };
        f.write_str(name)
    }
}

/// Errors reported by capability providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The provider exists but cannot serve requests (engine not installed, etc.).
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The provider tried and failed.
    #[error("capability failed: {0}")]
    Failed(String),
}

/// Convenience result alias for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Keyboard and mouse injection.
pub trait InputDevice: Send + Sync {
    /// Press and release a key.
    fn press_key(&self, key: &str) -> CapabilityResult<()>;
    /// Press a key without releasing it.
    fn key_down(&self, key: &str) -> CapabilityResult<()>;
    /// Release a previously pressed key.
    fn key_up(&self, key: &str) -> CapabilityResult<()>;
    /// Move the pointer.
    fn move_mouse(&self, at: Point) -> CapabilityResult<()>;
    /// Click a button at a position.
    fn click(&self, at: Point, button: MouseButton) -> CapabilityResult<()>;
    /// Press a button at a position without releasing it.
    fn mouse_down(&self, at: Point, button: MouseButton) -> CapabilityResult<()>;
    /// Release a button at a position.
    fn mouse_up(&self, at: Point, button: MouseButton) -> CapabilityResult<()>;

    /// Double click with the primary button.
    fn double_click(&self, at: Point) -> CapabilityResult<()> {
        self.click(at, MouseButton::Left)?;
        self.click(at, MouseButton::Left)
    }

    /// Rotate the wheel by `delta` notches at a position.
    fn scroll(&self, _at: Point, _delta: i32) -> CapabilityResult<()> {
        Err(CapabilityError::Unavailable("scroll wheel".into()))
    }
}

/// Template matching against the screen.
pub trait Vision: Send + Sync {
    /// Locate a named image, optionally restricted to a region.
    fn locate_image(&self, name: &str, region: Option<Rect>) -> CapabilityResult<Option<Rect>>;

    /// Locate the first of several images that is visible.
    fn locate_any(&self, names: &[String]) -> CapabilityResult<Option<(String, Rect)>> {
        for name in names {
            if let Some(rect) = self.locate_image(name, None)? {
                return Ok(Some((name.clone(), rect)));
            }
        }
        Ok(None)
    }
}

/// Text recognition on the screen.
///
/// Timeouts are not part of this contract: the engine turns `contains` into
/// bounded, cancellable waits by polling it.
pub trait TextRecognizer: Send + Sync {
    /// Whether the text is currently visible.
    fn contains(&self, text: &str) -> CapabilityResult<bool>;
    /// Position of the text, if visible.
    fn locate(&self, text: &str) -> CapabilityResult<Option<Point>>;
}

/// The set of providers a session runs against.
///
/// Input injection is mandatory; perception providers are optional.
#[derive(Clone)]
pub struct Capabilities {
    input: Arc<dyn InputDevice>,
    vision: Option<Arc<dyn Vision>>,
    text: Option<Arc<dyn TextRecognizer>>,
}

impl Capabilities {
    /// Create a capability set with only input injection.
    pub fn new(input: impl InputDevice + 'static) -> Self {
        Self::from_shared(Arc::new(input))
    }

    /// Create a capability set from an already shared input provider.
    pub fn from_shared(input: Arc<dyn InputDevice>) -> Self {
        Self {
            input,
            vision: None,
            text: None,
        }
    }

    /// Attach an image matcher.
    pub fn with_vision(mut self, vision: impl Vision + 'static) -> Self {
        self.vision = Some(Arc::new(vision));
        self
    }

    /// Attach a text recognizer.
    pub fn with_text(mut self, text: impl TextRecognizer + 'static) -> Self {
        self.text = Some(Arc::new(text));
        self
    }

    /// Input provider.
    pub fn input(&self) -> &dyn InputDevice {
        self.input.as_ref()
    }

    /// Image matcher, if registered.
    pub fn vision(&self) -> Option<&dyn Vision> {
        self.vision.as_deref()
    }

    /// Text recognizer, if registered.
    pub fn text(&self) -> Option<&dyn TextRecognizer> {
        self.text.as_deref()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("vision", &self.vision.is_some())
            .field("text", &self.text.is_some())
            .finish()
    }
}
