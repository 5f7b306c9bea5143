use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    value: T,
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
}

/// A value with change subscribers. Clones share the same value.
pub struct Observable<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Replace the value and notify every subscriber, in subscription order.
    /// Callbacks run with no borrow held, so they may read or subscribe.
    pub(crate) fn set(&self, value: T) {
        let (value, subscribers) = {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            let subscribers: Vec<Callback<T>> =
                inner.subscribers.iter().map(|(_, cb)| Rc::clone(cb)).collect();
            (inner.value.clone(), subscribers)
        };
        for callback in subscribers {
            callback(&value);
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription<T> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Rc::new(callback)));
        Subscription {
            id,
            target: Rc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub fn view(&self) -> ObservableView<'_, T> {
        ObservableView { source: self }
    }
}

/// Read side of an [`Observable`]: values can be read and watched but not replaced.
///
/// ```compile_fail
/// use handterm::activity::Activity;
/// use handterm::content::Catalog;
/// use handterm::location::Location;
/// use handterm::mediator::ActivityMediator;
/// use handterm::store::MemoryStore;
/// use std::rc::Rc;
///
/// let m = ActivityMediator::new(
///     &Location::parse("/normal"),
///     Rc::new(MemoryStore::new()),
///     Box::new(Catalog::embedded().unwrap()),
/// );
/// m.activity().set(Activity::Edit);
/// ```
pub struct ObservableView<'a, T> {
    source: &'a Observable<T>,
}

impl<T> Clone for ObservableView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ObservableView<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for ObservableView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.source, f)
    }
}

impl<T: Clone + 'static> ObservableView<'_, T> {
    pub fn get(&self) -> T {
        self.source.get()
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription<T> {
        self.source.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.source.subscriber_count()
    }
}

/// Handle returned by [`Observable::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription<T> {
    id: u64,
    target: Weak<RefCell<Inner<T>>>,
}

impl<T> Subscription<T> {
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.target.upgrade() {
            if let Ok(mut inner) = inner.try_borrow_mut() {
                inner.subscribers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
