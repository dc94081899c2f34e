//! In-process event bus.
//!
//! Events carry a [`TypeTag`] below [`EVENT`]; listeners subscribe to tags
//! and receive every event whose tag lineage contains one of them.

pub mod bus;
pub mod events;

use std::any::Any;
use std::fmt;

use sos_core::TypeTag;

pub use bus::EventBus;
pub use events::{CodecReloadEvent, ExceptionEvent, SettingsChangeEvent};

/// Root of every event hierarchy.
pub static EVENT: TypeTag = TypeTag::root("Event");

/// A notification delivered through the [`EventBus`].
pub trait Event: fmt::Debug + Send + Sync + 'static {
    /// Concrete tag of this event; must descend from [`EVENT`].
    fn event_type(&self) -> &'static TypeTag;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Event {
    /// Typed view of the event, if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Receives events of the tags it declares, and of their descendants.
pub trait EventListener: Send + Sync + 'static {
    /// Tags this listener subscribes to. An empty set is rejected by
    /// [`EventBus::register`].
    fn types(&self) -> Vec<&'static TypeTag>;

    /// Handles one event. Errors are logged by the bus and go no further.
    ///
    /// # Errors
    ///
    /// Any error; the bus isolates it from other listeners and the caller.
    fn handle(&self, event: &dyn Event) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
