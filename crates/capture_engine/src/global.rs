//! Thread-local orchestrator for hosts that want one capture context per
//! process without threading it through every call.
//!
//! ```ignore
//! capture_engine::global::with(|capture| capture.set_endpoint_type_by_name("log"));
//! let cam = capture_engine::global::with(|capture| {
//!     capture.register_sensor(SensorDefinition::new("cam", "camera"))
//! })?;
//! ```
//!
//! Closures passed to [`with`] must not call [`with`] again.

use std::cell::RefCell;

use crate::capture::DatasetCapture;

thread_local! {
    static CAPTURE: RefCell<Option<DatasetCapture>> = const { RefCell::new(None) };
}

/// Install `capture`, returning the previous one
pub fn install(capture: DatasetCapture) -> Option<DatasetCapture> {
    CAPTURE.with(|slot| slot.borrow_mut().replace(capture))
}

/// Remove and return the installed orchestrator
pub fn take() -> Option<DatasetCapture> {
    CAPTURE.with(|slot| slot.borrow_mut().take())
}

pub fn is_installed() -> bool {
    CAPTURE.with(|slot| slot.borrow().is_some())
}

/// Run `f` against the installed orchestrator, installing a default one first
pub fn with<R>(f: impl FnOnce(&mut DatasetCapture) -> R) -> R {
    CAPTURE.with(|slot| {
        let mut slot = slot.borrow_mut();
        let capture = slot.get_or_insert_with(DatasetCapture::default);
        f(capture)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorDefinition;

    #[test]
    fn test_lazily_installs_default() {
        take();
        assert!(!is_installed());

        let configured = with(|capture| capture.set_endpoint_type_by_name("none"));
        assert!(configured);
        assert!(is_installed());

        let handle = with(|capture| capture.register_sensor(SensorDefinition::new("cam", "camera")))
            .unwrap();
        assert!(handle.is_valid());

        let previous = install(DatasetCapture::default());
        assert!(previous.is_some());
        assert!(!with(|capture| capture.is_valid("cam")));
        take();
    }
}
