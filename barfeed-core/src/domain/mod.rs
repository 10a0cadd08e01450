//! Domain types: bars, series, frequencies, events.

pub mod bar;
pub mod event;
pub mod frequency;
pub mod series;
pub mod timestamp;

pub use bar::BarRecord;
pub use event::{
    event_queue, Event, EventReceiver, EventSender, FillEvent, MarketEvent, OrderEvent, OrderKind,
    OrderSide, SignalDirection, SignalEvent,
};
pub use frequency::{Frequency, ParseFrequencyError};
pub use series::SymbolSeries;
