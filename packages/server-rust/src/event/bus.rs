//! Hierarchy-aware publish/subscribe with isolated listener execution.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sos_core::TypeTag;
use tracing::{debug, info, warn};

use super::{Event, EventListener, EVENT};
use crate::service::config::EventDelivery;
use crate::service::worker::{BackgroundRunnable, BackgroundWorker};

type Delivery = (Arc<dyn Event>, Arc<dyn EventListener>);
type ListenerSet = Arc<[Arc<dyn EventListener>]>;

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Runs one listener on one event; failures and panics stop here.
fn deliver(event: &dyn Event, listener: &dyn EventListener) {
    match catch_unwind(AssertUnwindSafe(|| listener.handle(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            listener = listener.name(),
            event = event.event_type().name(),
            error = %e,
            "event listener failed"
        ),
        Err(_) => warn!(
            listener = listener.name(),
            event = event.event_type().name(),
            "event listener panicked"
        ),
    }
}

struct DeliveryRunnable;

#[async_trait]
impl BackgroundRunnable for DeliveryRunnable {
    type Task = Delivery;

    async fn run(&mut self, task: Delivery) {
        let (event, listener) = task;
        deliver(event.as_ref(), listener.as_ref());
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Delivers events to every listener subscribed to a tag in the event's
/// lineage.
///
/// Registration takes the listener write lock; firing only ever reads it,
/// and listeners run after it is released. The flattened lineage of each
/// event tag and the listener set resolved for it are cached; the latter is
/// cleared whenever the subscriptions change.
pub struct EventBus {
    delivery: EventDelivery,
    listeners: RwLock<HashMap<&'static TypeTag, Vec<Arc<dyn EventListener>>>>,
    hierarchy: RwLock<HashMap<&'static TypeTag, Arc<[&'static TypeTag]>>>,
    resolved: RwLock<HashMap<&'static TypeTag, ListenerSet>>,
    pool: OnceLock<Mutex<Vec<BackgroundWorker<DeliveryRunnable>>>>,
    next_worker: AtomicUsize,
}

impl EventBus {
    #[must_use]
    pub fn new(delivery: EventDelivery) -> Self {
        Self {
            delivery,
            listeners: RwLock::new(HashMap::new()),
            hierarchy: RwLock::new(HashMap::new()),
            resolved: RwLock::new(HashMap::new()),
            pool: OnceLock::new(),
            next_worker: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn delivery(&self) -> EventDelivery {
        self.delivery
    }

    /// Subscribes `listener` to the tags it declares.
    ///
    /// A listener without tags is logged and ignored. Registering the same
    /// listener twice has no further effect.
    pub fn register(&self, listener: Arc<dyn EventListener>) {
        let types = listener.types();
        if types.is_empty() {
            warn!(
                listener = listener.name(),
                "listener declares no event types; not registered"
            );
            return;
        }
        let mut listeners = self.listeners.write();
        for tag in &types {
            let subscribed = listeners.entry(*tag).or_default();
            if !subscribed.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                subscribed.push(Arc::clone(&listener));
            }
        }
        self.resolved.write().clear();
        debug!(
            listener = listener.name(),
            types = ?types.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "event listener registered"
        );
    }

    /// Removes every subscription of `listener`. Returns whether it had any.
    pub fn unregister(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut listeners = self.listeners.write();
        let mut removed = false;
        listeners.retain(|_, subscribed| {
            let before = subscribed.len();
            subscribed.retain(|l| !Arc::ptr_eq(l, listener));
            removed |= subscribed.len() != before;
            !subscribed.is_empty()
        });
        if removed {
            self.resolved.write().clear();
            debug!(listener = listener.name(), "event listener unregistered");
        }
        removed
    }

    /// Number of distinct registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let listeners = self.listeners.read();
        let mut distinct: Vec<&Arc<dyn EventListener>> = Vec::new();
        for listener in listeners.values().flatten() {
            if !distinct.iter().any(|l| Arc::ptr_eq(l, listener)) {
                distinct.push(listener);
            }
        }
        distinct.len()
    }

    pub fn fire<E: Event>(&self, event: E) {
        self.fire_arc(Arc::new(event));
    }

    /// Delivers `event` to each matching listener exactly once.
    ///
    /// Never fails: an event nobody listens to is logged at debug level and
    /// dropped.
    pub fn fire_arc(&self, event: Arc<dyn Event>) {
        let listeners = self.listeners_for(event.event_type());
        if listeners.is_empty() {
            debug!(event = event.event_type().name(), "no listeners for event");
            return;
        }
        for listener in listeners.iter() {
            self.dispatch(&event, listener);
        }
    }

    /// Stops the asynchronous delivery pool after it drains. Later events
    /// are delivered synchronously.
    pub async fn shutdown(&self) {
        let Some(pool) = self.pool.get() else {
            return;
        };
        let workers = std::mem::take(&mut *pool.lock());
        if workers.is_empty() {
            return;
        }
        info!(workers = workers.len(), "stopping event delivery pool");
        for mut worker in workers {
            worker.stop().await;
        }
    }

    fn dispatch(&self, event: &Arc<dyn Event>, listener: &Arc<dyn EventListener>) {
        if let EventDelivery::Asynchronous { workers } = self.delivery {
            if let Err((event, listener)) =
                self.submit((Arc::clone(event), Arc::clone(listener)), workers)
            {
                deliver(event.as_ref(), listener.as_ref());
            }
            return;
        }
        deliver(event.as_ref(), listener.as_ref());
    }

    /// Hands `task` to the pool, starting it on first use. Gives the task
    /// back when there is no runtime, no worker, or no queue space.
    fn submit(&self, task: Delivery, workers: usize) -> Result<(), Delivery> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(task);
        }
        let pool = self.pool.get_or_init(|| {
            let size = workers.max(1);
            info!(workers = size, "starting event delivery pool");
            Mutex::new(
                (0..size)
                    .map(|_| BackgroundWorker::start(DeliveryRunnable))
                    .collect(),
            )
        });
        let pool = pool.lock();
        if pool.is_empty() {
            return Err(task);
        }
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % pool.len();
        pool[index].try_submit(task).map_err(|(task, reason)| {
            debug!(%reason, "event pool unavailable; delivering synchronously");
            task
        })
    }

    fn listeners_for(&self, tag: &'static TypeTag) -> ListenerSet {
        let registered = self.listeners.read();
        let cached = self.resolved.read().get(tag).cloned();
        if let Some(hit) = cached {
            return hit;
        }
        let mut collected: Vec<Arc<dyn EventListener>> = Vec::new();
        for ancestor in self.hierarchy_of(tag).iter() {
            for listener in registered.get(ancestor).into_iter().flatten() {
                if !collected.iter().any(|l| Arc::ptr_eq(l, listener)) {
                    collected.push(Arc::clone(listener));
                }
            }
        }
        let collected: ListenerSet = collected.into();
        self.resolved.write().insert(tag, Arc::clone(&collected));
        collected
    }

    fn hierarchy_of(&self, tag: &'static TypeTag) -> Arc<[&'static TypeTag]> {
        let cached = self.hierarchy.read().get(tag).cloned();
        if let Some(hit) = cached {
            return hit;
        }
        let mut hierarchy = self.hierarchy.write();
        Arc::clone(
            hierarchy
                .entry(tag)
                .or_insert_with(|| tag.lineage_within(&EVENT).into()),
        )
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventDelivery::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::event::events::{
        CodecReloadEvent, ExceptionEvent, SettingsChangeEvent, CONFIGURATION_EVENT,
        EXCEPTION_EVENT,
    };
    use sos_core::ExceptionReport;

    static AUDIT_EVENT: TypeTag = TypeTag::new("AuditEvent", &[&EVENT]);
    static AUDITED_FAULT: TypeTag = TypeTag::new("AuditedFault", &[&EXCEPTION_EVENT, &AUDIT_EVENT]);

    #[derive(Debug)]
    struct AuditedFault;

    impl Event for AuditedFault {
        fn event_type(&self) -> &'static TypeTag {
            &AUDITED_FAULT
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Recorder {
        types: Vec<&'static TypeTag>,
        seen: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn arc(types: Vec<&'static TypeTag>) -> Arc<Self> {
            Arc::new(Self {
                types,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<&'static str> {
            self.seen.lock().clone()
        }
    }

    impl EventListener for Recorder {
        fn types(&self) -> Vec<&'static TypeTag> {
            self.types.clone()
        }

        fn handle(&self, event: &dyn Event) -> anyhow::Result<()> {
            self.seen.lock().push(event.event_type().name());
            Ok(())
        }
    }

    struct Failing {
        panic: bool,
    }

    impl EventListener for Failing {
        fn types(&self) -> Vec<&'static TypeTag> {
            vec![&EVENT]
        }

        fn handle(&self, _event: &dyn Event) -> anyhow::Result<()> {
            if self.panic {
                panic!("listener blew up");
            }
            anyhow::bail!("listener refused")
        }
    }

    fn settings_change() -> SettingsChangeEvent {
        SettingsChangeEvent {
            key: "service.url".into(),
            old: None,
            new: Some("http://localhost/service".into()),
        }
    }

    fn exception_event() -> ExceptionEvent {
        ExceptionEvent {
            binding: "kvp",
            report: ExceptionReport::new(),
        }
    }

    #[test]
    fn listeners_receive_descendant_events() {
        let bus = EventBus::default();
        let config = Recorder::arc(vec![&CONFIGURATION_EVENT]);
        let all = Recorder::arc(vec![&EVENT]);
        bus.register(config.clone());
        bus.register(all.clone());

        bus.fire(settings_change());
        bus.fire(CodecReloadEvent {
            decoders: 2,
            encoders: 1,
        });
        bus.fire(exception_event());

        assert_eq!(config.seen(), ["SettingsChangeEvent", "CodecReloadEvent"]);
        assert_eq!(
            all.seen(),
            ["SettingsChangeEvent", "CodecReloadEvent", "ExceptionEvent"]
        );
    }

    #[test]
    fn listener_matching_several_ancestors_is_called_once() {
        let bus = EventBus::default();
        let both = Recorder::arc(vec![&EXCEPTION_EVENT, &AUDIT_EVENT, &EVENT]);
        let audit = Recorder::arc(vec![&AUDIT_EVENT]);
        bus.register(both.clone());
        bus.register(audit.clone());

        bus.fire(AuditedFault);

        assert_eq!(both.seen(), ["AuditedFault"]);
        assert_eq!(audit.seen(), ["AuditedFault"]);
    }

    #[test]
    fn listener_without_types_is_ignored() {
        let bus = EventBus::default();
        bus.register(Recorder::arc(Vec::new()));
        assert_eq!(bus.listener_count(), 0);
        bus.fire(settings_change());
    }

    #[test]
    fn event_without_listeners_is_dropped() {
        let bus = EventBus::default();
        bus.register(Recorder::arc(vec![&EXCEPTION_EVENT]));
        // Returns normally with nobody subscribed to the configuration branch.
        bus.fire(settings_change());
    }

    #[test]
    fn failing_listeners_do_not_stop_delivery() {
        let bus = EventBus::default();
        bus.register(Arc::new(Failing { panic: false }));
        bus.register(Arc::new(Failing { panic: true }));
        let after = Recorder::arc(vec![&EVENT]);
        bus.register(after.clone());

        bus.fire(exception_event());
        bus.fire(exception_event());

        assert_eq!(after.seen(), ["ExceptionEvent", "ExceptionEvent"]);
    }

    #[test]
    fn registration_changes_invalidate_resolved_listeners() {
        let bus = EventBus::default();
        let first = Recorder::arc(vec![&EVENT]);
        bus.register(first.clone());
        bus.fire(exception_event());

        let second = Recorder::arc(vec![&EXCEPTION_EVENT]);
        bus.register(second.clone());
        bus.fire(exception_event());
        assert_eq!(first.seen().len(), 2);
        assert_eq!(second.seen().len(), 1);

        let first_dyn: Arc<dyn EventListener> = first.clone();
        assert!(bus.unregister(&first_dyn));
        assert!(!bus.unregister(&first_dyn));
        bus.fire(exception_event());
        assert_eq!(first.seen().len(), 2);
        assert_eq!(second.seen().len(), 2);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn duplicate_registration_delivers_once() {
        let bus = EventBus::default();
        let recorder = Recorder::arc(vec![&EVENT]);
        bus.register(recorder.clone());
        bus.register(recorder.clone());
        bus.fire(exception_event());
        assert_eq!(recorder.seen().len(), 1);
        assert_eq!(bus.listener_count(), 1);
    }

    #[tokio::test]
    async fn asynchronous_delivery_runs_on_the_pool() {
        let bus = EventBus::new(EventDelivery::DEFAULT_ASYNC);
        let recorder = Recorder::arc(vec![&EVENT]);
        bus.register(recorder.clone());
        bus.register(Arc::new(Failing { panic: false }));

        for _ in 0..10 {
            bus.fire(exception_event());
        }
        // Shutdown drains every queued delivery.
        bus.shutdown().await;
        assert_eq!(recorder.seen().len(), 10);

        // After shutdown delivery falls back to the caller.
        bus.fire(exception_event());
        assert_eq!(recorder.seen().len(), 11);
    }

    #[test]
    fn asynchronous_delivery_without_runtime_is_synchronous() {
        let bus = EventBus::new(EventDelivery::Asynchronous { workers: 2 });
        let recorder = Recorder::arc(vec![&EVENT]);
        bus.register(recorder.clone());
        bus.fire(settings_change());
        assert_eq!(recorder.seen(), ["SettingsChangeEvent"]);
    }

    #[test]
    fn events_downcast_to_their_concrete_type() {
        let event: Arc<dyn Event> = Arc::new(settings_change());
        let change = event.downcast_ref::<SettingsChangeEvent>().unwrap();
        assert_eq!(change.key, "service.url");
        assert!(event.downcast_ref::<ExceptionEvent>().is_none());
    }
}
