//! Events and their double-buffered queue.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::{fmt, mem};

use bumpalo::Bump;

use crate::entity::EntityId;
use crate::id::EventId;


/// A type that can be emitted as an event.
///
/// Usually implemented through `#[derive(Event)]`.
pub trait Event: 'static + Sized {}

/// Dispatched to a system when an entity starts matching its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnAppear;
impl Event for OnAppear {}

/// Dispatched to a system when an entity is about to stop matching its query.
///
/// The entity data can still be read while this event is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnDisappear;
impl Event for OnDisappear {}

/// Dispatched to a system for entities whose tracked components changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChange;
impl Event for OnChange {}

/// A type-erased reference to an event payload.
#[derive(Clone, Copy)]
pub struct EventRef<'a> {
    id:   EventId,
    name: &'static str,
    size: usize,
    data: NonNull<u8>,
    _ph:  PhantomData<&'a ()>,
}

impl<'a> EventRef<'a> {
    /// Borrows a typed event.
    pub fn new<E: Event>(event: &'a E) -> Self {
        Self {
            id:   EventId::of::<E>(),
            name: std::any::type_name::<E>(),
            size: mem::size_of::<E>(),
            data: NonNull::from(event).cast(),
            _ph:  PhantomData,
        }
    }

    /// The identity of the event type.
    pub fn id(&self) -> EventId { self.id }

    /// The type name of the event.
    pub fn name(&self) -> &'static str { self.name }

    /// The size of the payload in bytes.
    pub fn size(&self) -> usize { self.size }

    /// Whether the event is of type `E`.
    pub fn is<E: Event>(&self) -> bool { self.id == EventId::of::<E>() }

    /// Returns the payload if the event is of type `E`.
    pub fn downcast<E: Event>(&self) -> Option<&'a E> {
        // Safety: the id identifies the payload type.
        self.is::<E>().then(|| unsafe { self.data.cast::<E>().as_ref() })
    }
}

impl<'a> fmt::Debug for EventRef<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRef").field("id", &self.id).field("name", &self.name).finish()
    }
}

struct EventRecord {
    entity:  EntityId,
    id:      EventId,
    name:    &'static str,
    size:    usize,
    data:    NonNull<u8>,
    drop_fn: Option<unsafe fn(*mut u8)>,
}

impl EventRecord {
    fn event_ref(&self) -> EventRef<'_> {
        EventRef {
            id:   self.id,
            name: self.name,
            size: self.size,
            data: self.data,
            _ph:  PhantomData,
        }
    }
}

unsafe fn drop_event<E>(ptr: *mut u8) { ptr::drop_in_place(ptr.cast::<E>()) }

struct EventQueue {
    arena:   Bump,
    records: Vec<EventRecord>,
}

impl EventQueue {
    fn push<E: Event>(&mut self, entity: EntityId, event: E) {
        let data = NonNull::from(self.arena.alloc(event)).cast::<u8>();

        self.records.push(EventRecord {
            entity,
            id: EventId::of::<E>(),
            name: std::any::type_name::<E>(),
            size: mem::size_of::<E>(),
            data,
            drop_fn: mem::needs_drop::<E>().then_some(drop_event::<E> as unsafe fn(*mut u8)),
        });
    }

    fn clear(&mut self) {
        for record in self.records.drain(..) {
            if let Some(drop_fn) = record.drop_fn {
                // Safety: every payload is dropped exactly once, before its arena is reset.
                unsafe { drop_fn(record.data.as_ptr()) };
            }
        }
        self.arena.reset();
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) { self.clear(); }
}

/// Double-buffered storage of deferred events.
///
/// Events pushed while the queue is being processed are delivered in the next round,
/// so a chain of events can never keep one round running forever.
pub struct EventStorage {
    buffers:    [RefCell<EventQueue>; 2],
    current:    Cell<usize>,
    processing: Cell<bool>,
}

impl EventStorage {
    /// Creates empty buffers whose arenas start with `arena_chunk_size` bytes.
    pub fn new(arena_chunk_size: usize) -> Self {
        let queue = || {
            RefCell::new(EventQueue {
                arena:   Bump::with_capacity(arena_chunk_size),
                records: Vec::new(),
            })
        };
        Self { buffers: [queue(), queue()], current: Cell::new(0), processing: Cell::new(false) }
    }

    /// Queues an event targeting `entity`, or all entities if it is [`EntityId::INVALID`].
    pub fn push<E: Event>(&self, entity: EntityId, event: E) {
        self.buffers[self.current.get()].borrow_mut().push(entity, event);
    }

    /// The number of events waiting for the next round.
    pub fn len(&self) -> usize { self.buffers[self.current.get()].borrow().records.len() }

    /// Whether no event is waiting.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Delivers every queued event to `callback` in push order.
    ///
    /// The buffers are swapped first and the payloads of the previous round are dropped.
    /// Calling this from inside `callback` does nothing.
    pub fn process_events(&self, mut callback: impl FnMut(EntityId, EventRef<'_>)) {
        if self.processing.get() || self.is_empty() {
            return;
        }

        self.processing.set(true);
        let delivering = self.current.get();
        self.current.set(1 - delivering);
        self.buffers[1 - delivering].borrow_mut().clear();

        let queue = self.buffers[delivering].borrow();
        log::debug!("Delivering {} events", queue.records.len());
        for record in &queue.records {
            callback(record.entity, record.event_ref());
        }
        drop(queue);

        self.processing.set(false);
    }
}
