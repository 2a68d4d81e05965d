//! Integration tests for the blocking write protocol
//!
//! Tests cover the fill/drain cycle, suspension and resumption without
//! re-copying, cancellation under both reporting modes, the side channel
//! and direct views, and the alternative backing stores.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use cdata::{
    BackingType, CancelReporting, CdataError, ControlReply, Device, DeviceConfig,
    DeviceConfigBuilder, DrainSink, FrameBufferSink, ViewAccess, WriterSession,
};

/// Records every drain in order
#[derive(Default)]
struct RecordingSink {
    drains: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    fn drains(&self) -> Vec<Vec<u8>> {
        self.drains.lock().unwrap().clone()
    }
}

impl DrainSink for RecordingSink {
    fn drain(&self, bytes: &[u8]) {
        self.drains.lock().unwrap().push(bytes.to_vec());
    }
}

fn recording_device(config: DeviceConfig) -> (Device, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let device = Device::with_sink(config, Arc::clone(&sink) as Arc<dyn DrainSink>).unwrap();
    (device, sink)
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

fn long_delay() -> DeviceConfig {
    DeviceConfig::default().with_drain_delay(Duration::from_secs(10))
}

#[cfg(test)]
mod drain_buffer_tests {
    use super::*;

    /// Test: two small writes land side by side without blocking
    #[test]
    fn test_fill_without_drain() {
        let (device, sink) = recording_device(long_delay());
        let session = device.open().unwrap();

        assert_eq!(session.write(b"he").unwrap(), 2);
        assert_eq!(session.write(b"llo").unwrap(), 3);

        assert_eq!(session.idx(), 5);
        assert_eq!(session.snapshot().to_text(), "hello");
        assert!(!session.is_full());
        assert!(sink.drains().is_empty());
    }

    /// Test: filling exactly to the limit completes and leaves the buffer full
    #[test]
    fn test_exact_fill_does_not_suspend() {
        let (device, _sink) = recording_device(long_delay());
        let session = device.open().unwrap();

        assert_eq!(session.write(b"1234567").unwrap(), 7);
        assert!(session.is_full());
        assert_eq!(session.stats().suspensions, 0);
        assert!(!session.drain_armed());
    }

    /// Test: a write that crosses the limit suspends at the 8th byte and
    /// resumes after the drain without re-copying the first seven
    #[test]
    fn test_blocking_write_resumes_without_recopy() {
        let config = DeviceConfig::default().with_drain_delay(Duration::from_millis(5));
        let (device, sink) = recording_device(config);
        let session = device.open().unwrap();

        assert_eq!(session.write(b"abcdefghij").unwrap(), 10);

        assert_eq!(sink.drains(), vec![b"abcdefg".to_vec()]);
        assert_eq!(session.snapshot().as_bytes(), b"hij");

        let stats = session.stats();
        assert_eq!(stats.bytes_admitted, 10);
        assert_eq!(stats.suspensions, 1);
        assert_eq!(stats.drains, 1);
        assert_eq!(stats.timer_races, 0);
    }

    /// Test: a long write is split across several drains in order
    #[test]
    fn test_long_write_drains_in_order() {
        let config = DeviceConfig::default().with_drain_delay(Duration::from_millis(2));
        let (device, sink) = recording_device(config);
        let session = device.open().unwrap();

        let payload: Vec<u8> = (b'a'..=b'z').collect();
        assert_eq!(session.write(&payload).unwrap(), 26);

        let mut seen: Vec<u8> = sink.drains().concat();
        seen.extend_from_slice(session.snapshot().as_bytes());
        assert_eq!(seen, payload);
        assert!(sink.drains().iter().all(|d| d.len() == 7));
    }

    /// Test: interrupting a suspended writer returns Cancelled with the
    /// bytes admitted before suspension, and disarms the drain
    #[test]
    fn test_interrupt_suspended_writer_error() {
        let (device, sink) = recording_device(long_delay());
        let session = Arc::new(device.open().unwrap());

        let writer = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.write(b"0123456789"))
        };

        wait_until("writer to suspend", || session.waiting_writers() == 1);
        assert!(session.drain_armed());
        session.interrupt_handle().raise().unwrap();

        match writer.join().unwrap() {
            Err(CdataError::Cancelled { admitted }) => assert_eq!(admitted, 7),
            other => panic!("expected cancellation, got {:?}", other),
        }

        assert_eq!(session.snapshot().as_bytes(), b"0123456");
        assert!(!session.drain_armed());
        assert!(sink.drains().is_empty());
        assert_eq!(session.stats().cancelled_writes, 1);
    }

    /// Test: the same interrupt reported as a short write
    #[test]
    fn test_interrupt_suspended_writer_short_write() {
        let config = long_delay().with_cancel_reporting(CancelReporting::ShortWrite);
        let (device, _sink) = recording_device(config);
        let session = Arc::new(device.open().unwrap());

        let writer = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.write(b"0123456789"))
        };

        wait_until("writer to suspend", || session.waiting_writers() == 1);
        session.interrupt_handle().raise().unwrap();

        assert_eq!(writer.join().unwrap().unwrap(), 7);
        assert_eq!(session.idx(), 7);
    }

    /// Test: after a cancelled write the session drains and accepts the
    /// next writer normally
    #[test]
    fn test_cancelled_write_leaves_session_usable() {
        let config = DeviceConfig::default().with_drain_delay(Duration::from_millis(5));
        let (device, sink) = recording_device(config);
        let session = device.open().unwrap();

        session.interrupt_handle().raise().unwrap();
        match session.write(b"0123456789") {
            Err(CdataError::Cancelled { admitted }) => assert_eq!(admitted, 7),
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(!session.drain_armed());

        assert_eq!(session.write(b"xy").unwrap(), 2);
        assert_eq!(sink.drains(), vec![b"0123456".to_vec()]);
        assert_eq!(session.snapshot().to_text(), "xy");
    }

    /// Test: a withdrawn interrupt does not cancel the next suspension
    #[test]
    fn test_cleared_interrupt_is_not_consumed() {
        let config = DeviceConfig::default().with_drain_delay(Duration::from_millis(5));
        let (device, _sink) = recording_device(config);
        let session = device.open().unwrap();
        let interrupt = session.interrupt_handle();

        interrupt.raise().unwrap();
        assert!(interrupt.clear().unwrap());
        assert_eq!(session.write(b"abcdefghij").unwrap(), 10);
    }

    /// Test: side-channel reset empties the buffer without running the sink
    /// and without waking a suspended writer early
    #[test]
    fn test_side_reset_under_suspended_writer() {
        let config = DeviceConfig::default().with_drain_delay(Duration::from_millis(200));
        let (device, sink) = recording_device(config);
        let session = Arc::new(device.open().unwrap());
        let side = session.side_channel();

        let writer = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.write(b"abcdefghij"))
        };

        wait_until("writer to suspend", || session.waiting_writers() == 1);
        assert_eq!(side.reset().unwrap(), 7);
        assert_eq!(session.idx(), 0);

        assert_eq!(writer.join().unwrap().unwrap(), 10);
        assert_eq!(session.snapshot().as_bytes(), b"hij");
        assert!(sink.drains().iter().all(|d| d.is_empty()));
        assert_eq!(session.stats().side_resets, 1);
    }

    /// Test: numeric side-channel commands through ioctl
    #[test]
    fn test_ioctl_commands() {
        let (device, _sink) = recording_device(long_delay());
        let session = device.open().unwrap();
        let side = session.side_channel();

        assert_eq!(side.ioctl(2, b"abc").unwrap(), ControlReply::Appended(3));
        match side.ioctl(1, &[]).unwrap() {
            ControlReply::Inspect(snapshot) => assert_eq!(snapshot.as_bytes(), b"abc"),
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(side.ioctl(0, &[]).unwrap(), ControlReply::Reset { discarded: 3 });
        assert!(matches!(
            side.ioctl(42, &[]),
            Err(CdataError::UnknownCommand { code: 42 })
        ));
    }

    /// Test: side-channel append overflow keeps what fit and never blocks
    #[test]
    fn test_side_append_overflow() {
        let (device, _sink) = recording_device(long_delay());
        let session = device.open().unwrap();
        session.write(b"hello").unwrap();

        let err = session.side_channel().append(b"world").unwrap_err();
        assert_eq!(err.admitted(), Some(2));
        assert_eq!(session.snapshot().as_bytes(), b"hellowo");
        assert_eq!(session.waiting_writers(), 0);
    }

    /// Test: direct views see storage past the cursor and respect access
    #[test]
    fn test_direct_view_access() {
        let (device, _sink) = recording_device(long_delay());
        let session = device.open().unwrap();
        session.write(b"abc").unwrap();

        let rw = session.direct_view(ViewAccess::ReadWrite);
        rw.write(|storage| storage[5] = b'!').unwrap();
        assert_eq!(rw.read(|storage| storage[5]).unwrap(), b'!');
        assert_eq!(session.idx(), 3);

        let ro = session.direct_view(ViewAccess::ReadOnly);
        assert!(matches!(
            ro.write(|_| ()),
            Err(CdataError::PermissionDenied { .. })
        ));
    }

    /// Test: without a reserved terminator every slot is usable
    #[test]
    fn test_no_reserved_terminator() {
        let config = DeviceConfigBuilder::new("full-width")
            .capacity(4)
            .reserve_terminator(false)
            .drain_delay(Duration::from_millis(5))
            .build()
            .unwrap();
        let (device, sink) = recording_device(config);
        let session = device.open().unwrap();

        assert_eq!(session.write(b"abcd").unwrap(), 4);
        assert!(session.is_full());
        assert_eq!(session.write(b"ef").unwrap(), 2);
        assert_eq!(sink.drains(), vec![b"abcd".to_vec()]);
        assert_eq!(session.snapshot().as_bytes(), b"ef");
    }

    /// Test: zero delay drains as soon as the timer thread runs
    #[test]
    fn test_immediate_drain() {
        let config = DeviceConfigBuilder::new("immediate")
            .immediate_drain()
            .build()
            .unwrap();
        let (device, sink) = recording_device(config);
        let session = device.open().unwrap();

        assert_eq!(session.write(b"0123456789abcdef").unwrap(), 16);
        assert_eq!(sink.drains().len(), 2);
        assert_eq!(session.snapshot().as_bytes(), b"ef");
    }

    /// Test: anonymous mapped backing behaves like the heap backing
    #[test]
    fn test_anonymous_backing() {
        let config = DeviceConfig::default()
            .with_backing(BackingType::Anonymous)
            .with_drain_delay(Duration::from_millis(5));
        let (device, sink) = recording_device(config);
        let session = device.open().unwrap();
        assert_eq!(session.backing(), BackingType::Anonymous);

        assert_eq!(session.write(b"abcdefghij").unwrap(), 10);
        assert_eq!(sink.drains(), vec![b"abcdefg".to_vec()]);
        assert_eq!(session.snapshot().as_bytes(), b"hij");
    }

    /// Test: drained bytes land in a frame buffer at a rolling offset
    #[test]
    fn test_frame_buffer_sink() {
        let frame = Arc::new(FrameBufferSink::new(16).unwrap());
        let config = DeviceConfig::default().with_drain_delay(Duration::from_millis(5));
        let device = Device::with_sink(config, Arc::clone(&frame) as Arc<dyn DrainSink>).unwrap();
        let session = device.open().unwrap();

        assert_eq!(session.write(b"abcdefghijklmnop").unwrap(), 16);
        assert_eq!(frame.offset(), 14);
        assert_eq!(&frame.contents()[..14], b"abcdefghijklmn");
        assert_eq!(session.close().as_bytes(), b"op");
    }

    /// Test: closing a session disarms its drain and frees it
    #[test]
    fn test_close_with_armed_drain() {
        let (device, sink) = recording_device(long_delay());
        let session = device.open().unwrap();
        let view = session.direct_view(ViewAccess::ReadOnly);

        session.write(b"abc").unwrap();
        let snapshot = device.close(session);

        assert_eq!(snapshot.as_bytes(), b"abc");
        assert!(sink.drains().is_empty());
        assert!(matches!(view.snapshot(), Err(CdataError::SessionClosed)));
        assert_eq!(device.open_sessions(), 0);
    }

    /// Test: independent sessions never see each other's bytes
    #[test]
    fn test_sessions_are_isolated() {
        let (device, _sink) = recording_device(long_delay());
        let sessions: Vec<WriterSession> = (0..3).map(|_| device.open().unwrap()).collect();

        for (i, session) in sessions.iter().enumerate() {
            session.write(format!("s{}", i).as_bytes()).unwrap();
        }
        for (i, session) in sessions.iter().enumerate() {
            assert_eq!(session.snapshot().to_text(), format!("s{}", i));
        }
        assert_eq!(device.open_sessions(), 3);
    }
}
