use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, BoxStream, StreamExt};

use crate::mqtt::{InboundMessage, MessageStream};

pub type EventStream = BoxStream<'static, Result<Event, Infallible>>;

/// Wraps an event stream with the default keep-alive comments
pub fn sse(events: EventStream) -> Sse<EventStream> {
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub fn message_events(messages: MessageStream) -> EventStream {
    messages
        .map(|message| Ok::<_, Infallible>(message_event(&message)))
        .boxed()
}

/// A stream holding a single `error` event
pub fn error_events(reason: String) -> EventStream {
    let event = Event::default().event("error").data(line_data(&reason));
    stream::once(async move { Ok::<_, Infallible>(event) }).boxed()
}

/// SSE fields cannot carry `\r`; line breaks become `\n` so `data` splits them
/// into separate `data:` lines
fn line_data(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn message_event(message: &InboundMessage) -> Event {
    let event = Event::default()
        .event("message")
        .data(line_data(&message.text()));

    // SSE ids cannot span lines
    if message.topic.contains(['\n', '\r', '\0']) {
        event
    } else {
        event.id(message.topic.as_str())
    }
}
