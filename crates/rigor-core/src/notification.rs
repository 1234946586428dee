//! In-process notification center and notification-driven expectations.

use crate::expectation::Expectation;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A named event posted to a [`NotificationCenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub name: String,

    /// Identifier of the sender, if any.
    pub object: Option<String>,

    pub user_info: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object: None,
            user_info: BTreeMap::new(),
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn with_user_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_info.insert(key.into(), value.into());
        self
    }
}

/// Handler deciding whether a matching notification fulfils its expectation.
pub type NotificationHandler = Box<dyn Fn(&Notification) -> bool + Send + Sync>;

type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Returned by [`NotificationCenter::add_observer`]; used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationToken(u64);

struct Registration {
    name: String,
    object: Option<String>,
    callback: Callback,
}

impl Registration {
    fn matches(&self, notification: &Notification) -> bool {
        self.name == notification.name
            && self
                .object
                .as_ref()
                .is_none_or(|object| notification.object.as_ref() == Some(object))
    }
}

/// Delivers posted notifications to observers, on the posting thread.
#[derive(Default)]
pub struct NotificationCenter {
    observers: Mutex<HashMap<NotificationToken, Registration>>,
    next_token: AtomicU64,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes notifications called `name`, optionally only from `object`.
    pub fn add_observer(
        &self,
        name: impl Into<String>,
        object: Option<&str>,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> NotificationToken {
        let token = self.allocate_token();
        self.register(token, name.into(), object.map(str::to_string), Arc::new(callback));
        token
    }

    /// Returns false if the observer was already gone.
    pub fn remove_observer(&self, token: NotificationToken) -> bool {
        self.observers.lock().remove(&token).is_some()
    }

    /// Calls every matching observer. Observers may remove themselves.
    pub fn post(&self, notification: &Notification) {
        let callbacks: Vec<Callback> = self
            .observers
            .lock()
            .values()
            .filter(|r| r.matches(notification))
            .map(|r| Arc::clone(&r.callback))
            .collect();

        tracing::trace!(
            name = %notification.name,
            observers = callbacks.len(),
            "posting notification"
        );
        for callback in callbacks {
            callback(notification);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    fn allocate_token(&self) -> NotificationToken {
        NotificationToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    fn register(
        &self,
        token: NotificationToken,
        name: String,
        object: Option<String>,
        callback: Callback,
    ) {
        self.observers.lock().insert(
            token,
            Registration {
                name,
                object,
                callback,
            },
        );
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("observers", &self.observer_count())
            .finish()
    }
}

pub(crate) fn notification_description(name: &str, object: Option<&str>) -> String {
    format!(
        "Expect notification '{name}' from {}",
        object.unwrap_or("any object")
    )
}

/// Wires `expectation` to fulfil on the first accepted notification.
///
/// The observer is removed once it fires, or when the expectation is
/// cleaned up after a wait or at the end of its test case.
pub(crate) fn observe_notification(
    center: &Arc<NotificationCenter>,
    expectation: &Expectation,
    name: &str,
    object: Option<&str>,
    handler: Option<NotificationHandler>,
) {
    let token = center.allocate_token();
    let weak: Weak<NotificationCenter> = Arc::downgrade(center);
    let target = expectation.clone();
    let fired = AtomicBool::new(false);

    let callback = move |notification: &Notification| {
        if target.is_fulfilled() || fired.load(Ordering::Acquire) {
            return;
        }
        if let Some(handler) = &handler
            && !handler(notification)
        {
            return;
        }
        if fired.swap(true, Ordering::AcqRel) {
            return;
        }
        target.fulfill();
        if let Some(center) = weak.upgrade() {
            center.remove_observer(token);
        }
    };
    center.register(
        token,
        name.to_string(),
        object.map(str::to_string),
        Arc::new(callback),
    );

    let weak = Arc::downgrade(center);
    expectation.on_cleanup(move || {
        if let Some(center) = weak.upgrade() {
            center.remove_observer(token);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_post_reaches_matching_observers_only() {
        let center = NotificationCenter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        center.add_observer("saved", Some("doc-1"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        center.post(&Notification::new("saved").with_object("doc-2"));
        center.post(&Notification::new("opened").with_object("doc-1"));
        center.post(&Notification::new("saved"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        center.post(&Notification::new("saved").with_object("doc-1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_without_object_accepts_any_sender() {
        let center = NotificationCenter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let token = center.add_observer("tick", None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        center.post(&Notification::new("tick"));
        center.post(&Notification::new("tick").with_object("clock"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(center.remove_observer(token));
        center.post(&Notification::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expectation_observer_removes_itself() {
        let center = Arc::new(NotificationCenter::new());
        let expectation = Expectation::new(notification_description("done", None));

        observe_notification(&center, &expectation, "done", None, None);
        assert_eq!(center.observer_count(), 1);

        center.post(&Notification::new("done"));
        assert!(expectation.is_fulfilled());
        assert_eq!(center.observer_count(), 0);
    }

    #[test]
    fn test_handler_can_reject() {
        let center = Arc::new(NotificationCenter::new());
        let expectation = Expectation::new("progress");
        let handler: NotificationHandler =
            Box::new(|n| n.user_info.get("percent").is_some_and(|p| p == "100"));

        observe_notification(&center, &expectation, "progress", None, Some(handler));

        center.post(&Notification::new("progress").with_user_info("percent", "50"));
        assert!(!expectation.is_fulfilled());
        center.post(&Notification::new("progress").with_user_info("percent", "100"));
        assert!(expectation.is_fulfilled());
    }

    #[test]
    fn test_cleanup_removes_unfired_observer() {
        let center = Arc::new(NotificationCenter::new());
        let expectation = Expectation::new("never");
        observe_notification(&center, &expectation, "never", Some("nobody"), None);
        assert_eq!(center.observer_count(), 1);

        expectation.clean_up();
        assert_eq!(center.observer_count(), 0);
    }

    #[test]
    fn test_description() {
        assert_eq!(
            notification_description("saved", Some("doc")),
            "Expect notification 'saved' from doc"
        );
        assert_eq!(
            notification_description("saved", None),
            "Expect notification 'saved' from any object"
        );
    }
}
