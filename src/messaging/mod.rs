// Messaging between input threads and the scheduling thread

pub mod channels;

pub use channels::{InputConsumer, InputEvent, InputProducer, create_input_channel, push_input};
