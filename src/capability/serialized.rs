//! Serializes physical actions issued by concurrent cursors.
//!
//! The scheduler interleaves logical steps only; two threads may still ask
//! for mouse movement back to back. Wrapping a provider in [`Serialized`]
//! guarantees that each physical call runs to completion before the next
//! one starts, even when a provider is shared between sessions running on
//! different OS threads.

use parking_lot::Mutex;

use super::{
    CapabilityResult, InputDevice, MouseButton, Point, Rect, TextRecognizer, Vision,
};

/// Provider wrapper that holds a lock for the duration of every call.
pub struct Serialized<T> {
    inner: T,
    gate: Mutex<()>,
}

impl<T> Serialized<T> {
    /// Wrap a provider.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }

    /// Access the wrapped provider.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn exclusive<R>(&self, call: impl FnOnce(&T) -> R) -> R {
        let _guard = self.gate.lock();
        call(&self.inner)
    }
}

impl<T: InputDevice> InputDevice for Serialized<T> {
    fn press_key(&self, key: &str) -> CapabilityResult<()> {
        self.exclusive(|input| input.press_key(key))
    }

    fn key_down(&self, key: &str) -> CapabilityResult<()> {
        self.exclusive(|input| input.key_down(key))
    }

    fn key_up(&self, key: &str) -> CapabilityResult<()> {
        self.exclusive(|input| input.key_up(key))
    }

    fn move_mouse(&self, at: Point) -> CapabilityResult<()> {
        self.exclusive(|input| input.move_mouse(at))
    }

    fn click(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.exclusive(|input| input.click(at, button))
    }

    fn mouse_down(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.exclusive(|input| input.mouse_down(at, button))
    }

    fn mouse_up(&self, at: Point, button: MouseButton) -> CapabilityResult<()> {
        self.exclusive(|input| input.mouse_up(at, button))
    }

    // A double click is one physical gesture; keep both clicks under one lock.
    fn double_click(&self, at: Point) -> CapabilityResult<()> {
        self.exclusive(|input| input.double_click(at))
    }

    fn scroll(&self, at: Point, delta: i32) -> CapabilityResult<()> {
        self.exclusive(|input| input.scroll(at, delta))
    }
}

impl<T: Vision> Vision for Serialized<T> {
    fn locate_image(&self, name: &str, region: Option<Rect>) -> CapabilityResult<Option<Rect>> {
        self.exclusive(|vision| vision.locate_image(name, region))
    }

    fn locate_any(&self, names: &[String]) -> CapabilityResult<Option<(String, Rect)>> {
        self.exclusive(|vision| vision.locate_any(names))
    }
}

impl<T: TextRecognizer> TextRecognizer for Serialized<T> {
    fn contains(&self, text: &str) -> CapabilityResult<bool> {
        self.exclusive(|ocr| ocr.contains(text))
    }

    fn locate(&self, text: &str) -> CapabilityResult<Option<Point>> {
        self.exclusive(|ocr| ocr.locate(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how many calls overlap; a serialized provider never sees two.
    #[derive(Default)]
    struct OverlapCheck {
        active: AtomicUsize,
        max_seen: AtomicUsize,
    }

    impl InputDevice for OverlapCheck {
        fn press_key(&self, _key: &str) -> CapabilityResult<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(1));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
        fn key_down(&self, _key: &str) -> CapabilityResult<()> {
            Ok(())
        }
        fn key_up(&self, _key: &str) -> CapabilityResult<()> {
            Ok(())
        }
        fn move_mouse(&self, _at: Point) -> CapabilityResult<()> {
            Ok(())
        }
        fn click(&self, _at: Point, _button: MouseButton) -> CapabilityResult<()> {
            Ok(())
        }
        fn mouse_down(&self, _at: Point, _button: MouseButton) -> CapabilityResult<()> {
            Ok(())
        }
        fn mouse_up(&self, _at: Point, _button: MouseButton) -> CapabilityResult<()> {
            Ok(())
        }
    }

    #[test]
    fn calls_never_overlap() {
        let shared = Arc::new(Serialized::new(OverlapCheck::default()));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        shared.press_key("a").unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(shared.inner().max_seen.load(Ordering::SeqCst), 1);
    }
}
