//! # Operation Bus
//!
//! Delivers atomic operations to subscribers. Emission depends on the
//! current mode:
//!
//! - **Idle**: every operation is delivered as soon as it is emitted
//! - **Collecting** (between `begin` and `end`): operations accumulate in a
//!   buffer and are delivered when `end` drains it
//!
//! `drain` closes the window without delivering. The caller hands the
//! operations to a [`Dispatcher`] once it no longer holds the document, so
//! subscribers may read the store from inside their callback.

use std::fmt;
use std::sync::Arc;
use tessera_common::{AtomicOperation, OperationType};

pub type OperationCallback = Arc<dyn Fn(&AtomicOperation) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    filter: Option<OperationType>,
    callback: OperationCallback,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}

#[derive(Debug, Default)]
enum EmitMode {
    #[default]
    Idle,
    Collecting(Vec<AtomicOperation>),
}

impl EmitMode {
    /// Route one operation: buffered while collecting, otherwise handed back
    /// for immediate delivery
    fn route(&mut self, op: AtomicOperation) -> Option<AtomicOperation> {
        match self {
            EmitMode::Idle => Some(op),
            EmitMode::Collecting(buffer) => {
                buffer.push(op);
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct OperationBus {
    mode: EmitMode,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl OperationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to operations, optionally only those of one type
    pub fn on_operation(
        &mut self,
        callback: OperationCallback,
        filter: Option<OperationType>,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber {
            id,
            filter,
            callback,
        });
        id
    }

    /// Returns false if the subscription was already gone
    pub fn off_operation(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.mode, EmitMode::Collecting(_))
    }

    /// Open a collection window, dropping anything buffered before
    pub fn begin(&mut self) {
        self.mode = EmitMode::Collecting(Vec::new());
    }

    /// Close the window, deliver the buffered operations and return them
    pub fn end(&mut self) -> Vec<AtomicOperation> {
        let buffered = self.drain();
        self.dispatcher().deliver(&buffered);
        buffered
    }

    /// Close the window and return the buffered operations undelivered
    pub fn drain(&mut self) -> Vec<AtomicOperation> {
        match std::mem::take(&mut self.mode) {
            EmitMode::Collecting(buffer) => buffer,
            EmitMode::Idle => Vec::new(),
        }
    }

    /// Snapshot of the current subscribers
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            targets: self
                .subscribers
                .iter()
                .map(|s| (s.filter, s.callback.clone()))
                .collect(),
        }
    }

    /// Drop buffered operations without delivering them
    pub fn discard(&mut self) {
        self.mode = EmitMode::Idle;
    }

    /// Operations buffered so far in the open window
    pub fn pending(&self) -> &[AtomicOperation] {
        match &self.mode {
            EmitMode::Collecting(buffer) => buffer,
            EmitMode::Idle => &[],
        }
    }

    pub fn emit(&mut self, op: AtomicOperation) {
        if let Some(op) = self.mode.route(op) {
            self.dispatch(&op);
        }
    }

    fn dispatch(&self, op: &AtomicOperation) {
        self.dispatcher().deliver(std::slice::from_ref(op));
    }
}

/// Subscribers captured at drain time, detached from the bus
#[derive(Default)]
pub struct Dispatcher {
    targets: Vec<(Option<OperationType>, OperationCallback)>,
}

impl Dispatcher {
    pub fn deliver(&self, operations: &[AtomicOperation]) {
        for op in operations {
            for (filter, callback) in &self.targets {
                if filter.map_or(true, |f| f == op.op_type) {
                    callback(op);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("targets", &self.targets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tessera_common::Node;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, OperationCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: OperationCallback = Arc::new(move |op: &AtomicOperation| {
            sink.lock().unwrap().push(format!("{}:{}", op.op_type, op.node_id));
        });
        (seen, callback)
    }

    #[test]
    fn test_idle_mode_delivers_immediately() {
        let mut bus = OperationBus::new();
        let (seen, callback) = recorder();
        bus.on_operation(callback, None);

        bus.emit(AtomicOperation::create(&Node::new("a", "text"), 1));
        assert_eq!(*seen.lock().unwrap(), vec!["create:a"]);
    }

    #[test]
    fn test_collecting_mode_buffers_until_end() {
        let mut bus = OperationBus::new();
        let (seen, callback) = recorder();
        bus.on_operation(callback, None);

        bus.begin();
        bus.emit(AtomicOperation::create(&Node::new("a", "text"), 1));
        bus.emit(AtomicOperation::delete("b", None, 2));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bus.pending().len(), 2);

        let drained = bus.end();
        assert_eq!(drained.len(), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["create:a", "delete:b"]);
        assert!(!bus.is_collecting());
        assert!(bus.end().is_empty());
    }

    #[test]
    fn test_drain_defers_delivery_to_dispatcher() {
        let mut bus = OperationBus::new();
        let (seen, callback) = recorder();
        bus.on_operation(callback, Some(OperationType::Create));

        bus.begin();
        bus.emit(AtomicOperation::create(&Node::new("a", "text"), 1));
        bus.emit(AtomicOperation::delete("a", None, 2));
        let drained = bus.drain();
        let dispatcher = bus.dispatcher();
        drop(bus);

        assert_eq!(drained.len(), 2);
        assert!(seen.lock().unwrap().is_empty());
        dispatcher.deliver(&drained);
        assert_eq!(*seen.lock().unwrap(), vec!["create:a"]);
    }

    #[test]
    fn test_filter_and_unsubscribe() {
        let mut bus = OperationBus::new();
        let (seen, callback) = recorder();
        let id = bus.on_operation(callback, Some(OperationType::Delete));

        bus.emit(AtomicOperation::create(&Node::new("a", "text"), 1));
        bus.emit(AtomicOperation::delete("a", None, 2));
        assert_eq!(*seen.lock().unwrap(), vec!["delete:a"]);

        assert!(bus.off_operation(id));
        assert!(!bus.off_operation(id));
        bus.emit(AtomicOperation::delete("b", None, 3));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_discard_drops_buffer() {
        let mut bus = OperationBus::new();
        let (seen, callback) = recorder();
        bus.on_operation(callback, None);

        bus.begin();
        bus.emit(AtomicOperation::delete("a", None, 1));
        bus.discard();

        assert!(bus.end().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }
}
