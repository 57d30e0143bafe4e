// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A lightweight publish/subscribe channel for values that change at a high rate.
//!
//! Subscribers are called synchronously on every update, including updates that don't change
//! the value. Consumers that only care about changes should compare against the last value
//! they saw.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    current: T,
    next_id: u64,
    subscribers: HashMap<u64, Callback<T>>,
}

/// Holds the latest value and the set of subscribers to notify when it changes.
pub struct ProgressNotifier<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone + Send + 'static> ProgressNotifier<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: initial,
                next_id: 0,
                subscribers: HashMap::new(),
            })),
        }
    }

    /// Replaces the current value and invokes every subscriber with it.
    pub fn update(&self, value: T) {
        let subscribers: Vec<Callback<T>> = {
            let mut inner = self.inner.lock();
            inner.current = value.clone();
            inner.subscribers.values().cloned().collect()
        };

        // Called without the lock held so callbacks can subscribe or unsubscribe.
        for subscriber in subscribers {
            subscriber(&value);
        }
    }

    /// Returns the last published value.
    pub fn current(&self) -> T {
        self.inner.lock().current.clone()
    }

    /// Registers a callback. It stays registered until the returned subscription is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, Arc::new(callback));

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().subscribers.remove(&id);
                }
            })),
        }
    }

    /// The number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// Deregisters a subscriber when unsubscribed or dropped.
#[must_use = "the subscription is removed as soon as it is dropped"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
