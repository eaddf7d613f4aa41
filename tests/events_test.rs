//! Integration tests for EventHub delivery semantics.

use std::sync::{Arc, Mutex};

use lod_core::events::EventHub;

#[derive(Debug, Clone, PartialEq)]
struct Ping(u32);

fn recorder(hub: &EventHub<Ping>, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) {
    let log = log.clone();
    hub.subscribe(move |ping: &Ping| {
        log.lock().unwrap().push(format!("{tag}:{}", ping.0));
        Ok(())
    });
}

#[test]
fn test_publish_delivers_in_subscription_order() {
    let hub = EventHub::new("ping");
    let log = Arc::new(Mutex::new(Vec::new()));
    recorder(&hub, "first", &log);
    recorder(&hub, "second", &log);

    assert_eq!(hub.publish(&Ping(1)), 0);
    assert_eq!(hub.publish(&Ping(2)), 0);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:1", "second:1", "first:2", "second:2"]
    );
    assert_eq!(hub.name(), "ping");
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let hub = EventHub::new("ping");
    let log = Arc::new(Mutex::new(Vec::new()));
    recorder(&hub, "kept", &log);
    let sink = log.clone();
    let id = hub.subscribe(move |ping: &Ping| {
        sink.lock().unwrap().push(format!("dropped:{}", ping.0));
        Ok(())
    });

    hub.publish(&Ping(1));
    assert!(hub.unsubscribe(id));
    hub.publish(&Ping(2));

    assert_eq!(*log.lock().unwrap(), vec!["kept:1", "dropped:1", "kept:2"]);
    assert_eq!(hub.len(), 1);
}

#[test]
fn test_failures_are_counted_and_isolated() {
    let hub = EventHub::new("ping");
    let log = Arc::new(Mutex::new(Vec::new()));
    hub.subscribe(|_: &Ping| Err("handler error".into()));
    hub.subscribe(|ping: &Ping| {
        if ping.0 > 1 {
            panic!("handler panic");
        }
        Ok(())
    });
    recorder(&hub, "last", &log);

    assert_eq!(hub.publish(&Ping(1)), 1);
    assert_eq!(hub.publish(&Ping(2)), 2);
    assert_eq!(*log.lock().unwrap(), vec!["last:1", "last:2"]);
}

#[test]
fn test_handler_may_unsubscribe_itself() {
    let hub = Arc::new(EventHub::new("ping"));
    let calls = Arc::new(Mutex::new(0u32));
    let id_slot = Arc::new(Mutex::new(None));

    let (inner, counter, slot) = (hub.clone(), calls.clone(), id_slot.clone());
    let id = hub.subscribe(move |_: &Ping| {
        *counter.lock().unwrap() += 1;
        if let Some(id) = *slot.lock().unwrap() {
            inner.unsubscribe(id);
        }
        Ok(())
    });
    *id_slot.lock().unwrap() = Some(id);

    hub.publish(&Ping(1));
    hub.publish(&Ping(2));

    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(hub.is_empty());
}
