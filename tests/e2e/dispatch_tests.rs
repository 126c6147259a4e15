//! Receive-side behaviour: what listeners see, and when they stop seeing it.

use crate::common::{mock_handler, wait_until, Collector, TEST_READ_TIMEOUT};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serial_comms_handler::comms::{ByteListener, CommsHandler, ListenerId, ListenerRegistry};
use serial_comms_handler::port::{MockTransport, ReadStep};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

#[test]
fn test_empty_reads_are_not_dispatched() {
    let (handler, transport) = mock_handler();
    let collector = Collector::new();
    handler.add_shared_listener(collector.clone());
    transport.script([
        ReadStep::Empty,
        ReadStep::Data(vec![1, 2, 3, 4, 5]),
        ReadStep::Empty,
        ReadStep::Data(vec![6, 7, 8]),
    ]);

    handler.start("MOCK0", 57600).unwrap();
    collector.wait_for(2);
    wait_until(|| transport.pending_reads() == 0, "script drained");
    handler.stop().unwrap();

    assert_eq!(
        collector.chunks(),
        vec![vec![1, 2, 3, 4, 5], vec![6, 7, 8]]
    );
    let stats = handler.last_session_stats().unwrap();
    assert_eq!(stats.dispatches, 2);
    assert_eq!(stats.bytes_received, 8);
    assert!(stats.idle_reads >= 2);
}

#[test]
fn test_buffer_view_matches_each_read() {
    let (handler, transport) = mock_handler();
    let collector = Collector::new();
    handler.add_shared_listener(collector.clone());

    handler.start("MOCK0", 57600).unwrap();
    transport.enqueue_read(&[0xAA; 10]);
    collector.wait_for(1);
    transport.enqueue_read(&[0x55; 3]);
    collector.wait_for(2);
    handler.stop().unwrap();

    // the second view must not expose the tail of the first read
    assert_eq!(collector.chunks(), vec![vec![0xAA; 10], vec![0x55; 3]]);
}

#[test]
fn test_oversize_data_split_at_buffer_capacity() {
    let (handler, transport) = mock_handler();
    let collector = Collector::new();
    handler.add_shared_listener(collector.clone());
    let capacity = handler.settings().rx_buffer_size;
    let payload: Vec<u8> = (0..capacity + 10).map(|i| i as u8).collect();

    handler.start("MOCK0", 57600).unwrap();
    transport.enqueue_read(&payload);
    collector.wait_for(2);
    handler.stop().unwrap();

    let chunks = collector.chunks();
    assert_eq!(chunks[0].len(), capacity);
    assert_eq!(chunks[1].len(), 10);
    assert_eq!(chunks.concat(), payload);
}

#[test]
fn test_no_notification_after_stop_returns() {
    let (handler, transport) = mock_handler();
    let collector = Collector::new();
    handler.add_shared_listener(collector.clone());
    handler.start("MOCK0", 57600).unwrap();

    let injecting = Arc::new(AtomicBool::new(true));
    let injector = {
        let transport = transport.clone();
        let injecting = Arc::clone(&injecting);
        thread::spawn(move || {
            while injecting.load(Ordering::Relaxed) {
                transport.enqueue_read(b"noise");
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    collector.wait_for(3);
    handler.stop().unwrap();
    let seen_at_stop = collector.count();

    thread::sleep(TEST_READ_TIMEOUT * 4);
    injecting.store(false, Ordering::Relaxed);
    injector.join().unwrap();

    assert_eq!(collector.count(), seen_at_stop);
}

#[test]
fn test_read_errors_do_not_end_session() {
    let (handler, transport) = mock_handler();
    let collector = Collector::new();
    handler.add_shared_listener(collector.clone());
    transport.script([
        ReadStep::Fail(io::ErrorKind::BrokenPipe),
        ReadStep::Data(b"after".to_vec()),
    ]);

    handler.start("MOCK0", 57600).unwrap();
    collector.wait_for(1);
    assert!(handler.is_connected());
    handler.stop().unwrap();

    assert_eq!(collector.chunks(), vec![b"after".to_vec()]);
    assert_eq!(handler.last_session_stats().unwrap().read_errors, 1);
}

struct Panicker;

impl ByteListener for Panicker {
    fn on_bytes(&self, _bytes: &[u8]) {
        panic!("listener failure");
    }
}

#[test]
fn test_panicking_listener_does_not_starve_others() {
    let (handler, transport) = mock_handler();
    let before = Collector::new();
    let after = Collector::new();
    handler.add_shared_listener(before.clone());
    handler.add_listener(Panicker);
    handler.add_shared_listener(after.clone());

    handler.start("MOCK0", 57600).unwrap();
    transport.enqueue_read(b"one");
    after.wait_for(1);
    transport.enqueue_read(b"two");
    after.wait_for(2);
    handler.stop().unwrap();

    assert_eq!(before.chunks(), after.chunks());
    assert_eq!(handler.last_session_stats().unwrap().listener_panics, 2);
}

/// Removes itself from the registry on its first notification.
struct OneShot {
    registry: ListenerRegistry,
    id: Arc<OnceLock<ListenerId>>,
    calls: AtomicUsize,
}

impl ByteListener for OneShot {
    fn on_bytes(&self, _bytes: &[u8]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = self.id.get() {
            self.registry.remove(*id);
        }
    }
}

#[test]
fn test_listener_removes_itself_mid_stream() {
    let (handler, transport) = mock_handler();
    let id = Arc::new(OnceLock::new());
    let one_shot = Arc::new(OneShot {
        registry: handler.listeners(),
        id: Arc::clone(&id),
        calls: AtomicUsize::new(0),
    });
    let registered = handler.add_shared_listener(one_shot.clone());
    id.set(registered).unwrap();
    let collector = Collector::new();
    handler.add_shared_listener(collector.clone());

    handler.start("MOCK0", 57600).unwrap();
    transport.enqueue_read(b"first");
    collector.wait_for(1);
    transport.enqueue_read(b"second");
    collector.wait_for(2);
    handler.stop().unwrap();

    assert_eq!(one_shot.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler.listeners().len(), 1);
    assert_eq!(collector.count(), 2);
}

#[test]
fn test_listener_may_transmit_from_callback() {
    struct Echo {
        handler: Arc<OnceLock<Arc<CommsHandler<MockTransport>>>>,
    }

    impl ByteListener for Echo {
        fn on_bytes(&self, bytes: &[u8]) {
            if let Some(handler) = self.handler.get() {
                let _ = handler.transmit(bytes);
            }
        }
    }

    let (handler, transport) = mock_handler();
    let handler = Arc::new(handler);
    let slot = Arc::new(OnceLock::new());
    let echo = handler.add_listener(Echo {
        handler: Arc::clone(&slot),
    });
    let _ = slot.set(Arc::clone(&handler));

    handler.start("MOCK0", 57600).unwrap();
    transport.enqueue_read(b"ping");
    wait_until(|| !transport.writes().is_empty(), "echoed write");

    // break the listener -> handler cycle before stopping
    handler.remove_listener(echo);
    handler.stop().unwrap();

    assert_eq!(transport.writes(), vec![b"ping".to_vec()]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_every_listener_sees_every_chunk(
        listener_count in 1usize..6,
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..5),
    ) {
        let (handler, transport) = mock_handler();
        let collectors: Vec<_> = (0..listener_count).map(|_| Collector::new()).collect();
        for collector in &collectors {
            handler.add_shared_listener(collector.clone());
        }

        handler.start("MOCK0", 57600).unwrap();
        for chunk in &chunks {
            // one chunk per read: wait before queueing the next
            let expected = collectors[0].count() + 1;
            transport.enqueue_read(chunk);
            collectors[0].wait_for(expected);
        }
        handler.stop().unwrap();

        for collector in &collectors {
            prop_assert_eq!(collector.chunks(), chunks.clone());
        }
    }
}
