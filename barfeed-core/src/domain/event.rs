//! Event types carried on the shared event queue.
//!
//! Only `MarketEvent` is produced by this crate. The signal, order and fill
//! events are passive carriers for the strategy, portfolio and execution
//! collaborators that share the queue.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};

/// Producer half of the event queue.
pub type EventSender = Sender<Event>;

/// Consumer half of the event queue.
pub type EventReceiver = Receiver<Event>;

/// Create a FIFO event queue. Senders may be cloned across producers.
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::channel()
}

/// New bar data is available. Carries no payload: consumers re-query the
/// data source for the bars they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarketEvent;

/// Direction attached to a strategy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Long,
    Short,
    Exit,
}

/// Side of an order sent to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

/// Advice from a strategy, consumed by the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: String,
    pub datetime: NaiveDateTime,
    pub direction: SignalDirection,
    pub price: f64,
    pub quantity: Option<f64>,
    pub details: String,
}

/// A sized order produced by the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub symbol: String,
    pub datetime: NaiveDateTime,
    pub quantity: f64,
    pub side: OrderSide,
    pub signal_price: f64,
    pub kind: Option<OrderKind>,
    pub processed: bool,
    pub trade_price: Option<f64>,
}

/// A filled order as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub order: OrderEvent,
    pub commission: f64,
}

/// Everything that can travel on the event queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Market(MarketEvent),
    Signal(SignalEvent),
    Order(OrderEvent),
    Fill(FillEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Market(_) => "MARKET",
            Event::Signal(_) => "SIGNAL",
            Event::Order(_) => "ORDER",
            Event::Fill(_) => "FILL",
        }
    }

    pub fn is_market(&self) -> bool {
        matches!(self, Event::Market(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo() {
        let (tx, rx) = event_queue();
        tx.send(Event::Market(MarketEvent)).unwrap();
        let order = OrderEvent {
            symbol: "AAA".into(),
            datetime: chrono::NaiveDate::from_ymd_opt(2020, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            quantity: 10.0,
            side: OrderSide::Buy,
            signal_price: 1.0,
            kind: Some(OrderKind::Market),
            processed: false,
            trade_price: None,
        };
        tx.send(Event::Order(order)).unwrap();

        assert_eq!(rx.recv().unwrap().kind(), "MARKET");
        assert_eq!(rx.recv().unwrap().kind(), "ORDER");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cloned_senders_share_one_queue() {
        let (tx, rx) = event_queue();
        let tx2 = tx.clone();
        std::thread::spawn(move || tx2.send(Event::Market(MarketEvent)).unwrap())
            .join()
            .unwrap();
        tx.send(Event::Market(MarketEvent)).unwrap();
        assert_eq!(rx.try_iter().filter(Event::is_market).count(), 2);
    }
}
