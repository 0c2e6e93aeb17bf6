// Lock-free input channel
// A device callback on another thread pushes raw events; the scheduling
// thread drains them between ticks.

use ringbuf::{HeapRb, traits::{Producer, Split}};

/// A raw performance event as delivered by an input device
pub type InputEvent = Vec<u8>;

pub type InputProducer = ringbuf::HeapProd<InputEvent>;
pub type InputConsumer = ringbuf::HeapCons<InputEvent>;

pub fn create_input_channel(capacity: usize) -> (InputProducer, InputConsumer) {
    let rb = HeapRb::<InputEvent>::new(capacity.max(1));
    rb.split()
}

/// Push without blocking. A full queue drops the event and returns false.
pub fn push_input(producer: &mut InputProducer, event: &[u8]) -> bool {
    if producer.try_push(event.to_vec()).is_err() {
        tracing::warn!(len = event.len(), "input queue full, event dropped");
        return false;
    }
    true
}
