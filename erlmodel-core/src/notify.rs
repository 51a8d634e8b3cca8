//! Element change notification
//!
//! Delivery is synchronous, on the calling thread, in subscription order.
//! A failing listener is reported and skipped; it never stops delivery to
//! the listeners after it.

use crate::error::ListenerFailure;
use crate::handle::Handle;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Receives a handle to the element whose subtree changed
pub trait ElementChangeListener: Send + Sync {
    /// Name used when reporting failures
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    fn element_changed(&self, element: &Handle) -> Result<(), String>;
}

/// Sink for listener failures
pub trait FailureReporter: Send + Sync {
    fn report(&self, failure: &ListenerFailure);
}

/// Logs listener failures at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, failure: &ListenerFailure) {
        tracing::error!(
            listener = %failure.listener,
            element = %failure.element,
            "change listener failed: {}",
            failure.message
        );
    }
}

/// Registry of change listeners
pub struct ChangeNotifier {
    listeners: Mutex<Vec<Arc<dyn ElementChangeListener>>>,
    reporter: Box<dyn FailureReporter>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(Box::new(TracingReporter))
    }
}

impl ChangeNotifier {
    pub fn new(reporter: Box<dyn FailureReporter>) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            reporter,
        }
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ElementChangeListener>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a listener; returns false if this instance is already registered
    pub fn subscribe(&self, listener: Arc<dyn ElementChangeListener>) -> bool {
        let mut listeners = self.listeners();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&self, listener: &Arc<dyn ElementChangeListener>) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners().is_empty()
    }

    /// Deliver `element` to every listener registered when delivery starts.
    ///
    /// Returns the number of listeners that failed.
    pub fn notify(&self, element: &Handle) -> usize {
        let snapshot: Vec<_> = self.listeners().clone();
        let mut failures = 0;

        for listener in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.element_changed(element)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(message)) => message,
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            failures += 1;
            self.reporter.report(&ListenerFailure {
                listener: listener.name(),
                element: element.to_string(),
                message,
            });
        }

        failures
    }
}

/// Listener identity is the allocation, not the vtable
fn same_listener(a: &Arc<dyn ElementChangeListener>, b: &Arc<dyn ElementChangeListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Handle>>,
    }

    impl ElementChangeListener for Recorder {
        fn element_changed(&self, element: &Handle) -> Result<(), String> {
            self.seen.lock().unwrap().push(element.clone());
            Ok(())
        }
    }

    struct Failing;

    impl ElementChangeListener for Failing {
        fn name(&self) -> String {
            "failing".to_string()
        }

        fn element_changed(&self, _element: &Handle) -> Result<(), String> {
            Err("cannot refresh".to_string())
        }
    }

    struct Panicking;

    impl ElementChangeListener for Panicking {
        fn element_changed(&self, _element: &Handle) -> Result<(), String> {
            panic!("listener exploded")
        }
    }

    #[derive(Default, Clone)]
    struct Collect(Arc<Mutex<Vec<ListenerFailure>>>);

    impl FailureReporter for Collect {
        fn report(&self, failure: &ListenerFailure) {
            self.0.lock().unwrap().push(failure.clone());
        }
    }

    fn handle() -> Handle {
        Handle::project("app").child("m", ElementKind::Module)
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let notifier = ChangeNotifier::default();
        let listener: Arc<dyn ElementChangeListener> = Arc::new(Recorder::default());
        assert!(notifier.subscribe(Arc::clone(&listener)));
        assert!(!notifier.subscribe(Arc::clone(&listener)));
        assert_eq!(notifier.len(), 1);

        assert!(notifier.unsubscribe(&listener));
        assert!(!notifier.unsubscribe(&listener));
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_failure_isolated_and_reported_once() {
        let reports = Collect::default();
        let notifier = ChangeNotifier::new(Box::new(reports.clone()));
        let first = Arc::new(Recorder::default());
        let third = Arc::new(Recorder::default());
        notifier.subscribe(first.clone());
        notifier.subscribe(Arc::new(Failing));
        notifier.subscribe(third.clone());

        assert_eq!(notifier.notify(&handle()), 1);
        assert_eq!(*first.seen.lock().unwrap(), vec![handle()]);
        assert_eq!(*third.seen.lock().unwrap(), vec![handle()]);

        let reports = reports.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].listener, "failing");
        assert_eq!(reports[0].message, "cannot refresh");
        assert_eq!(reports[0].element, handle().to_string());
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let reports = Collect::default();
        let notifier = ChangeNotifier::new(Box::new(reports.clone()));
        let after = Arc::new(Recorder::default());
        notifier.subscribe(Arc::new(Panicking));
        notifier.subscribe(after.clone());

        assert_eq!(notifier.notify(&handle()), 1);
        assert_eq!(after.seen.lock().unwrap().len(), 1);
        assert!(reports.0.lock().unwrap()[0]
            .message
            .contains("listener exploded"));
    }

    #[test]
    fn test_notify_without_listeners() {
        let notifier = ChangeNotifier::default();
        assert_eq!(notifier.notify(&Handle::root()), 0);
    }
}
