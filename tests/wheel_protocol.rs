use std::time::Duration;

use filterwheel_lib::device::{DriverTiming, FilterWheel, MoveError, QueryError};
use filterwheel_lib::{ConnectionSettings, MockPort};

fn timing() -> DriverTiming {
    DriverTiming {
        move_timeout: Duration::from_millis(100),
        query_timeout: Duration::from_millis(50),
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
    }
}

fn connected_wheel(mock: &MockPort) -> FilterWheel {
    let settings = ConnectionSettings { port: "sim0".to_string(), baud_rate: 9600 };
    let mut wheel = FilterWheel::with_timing(settings, timing());
    wheel.connect_with(Box::new(mock.clone())).expect("connect to simulated wheel");
    wheel
}

#[test]
fn every_valid_slot_sends_exact_frame() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    for slot in 1..=8 {
        mock.queue_reply("OK\r\n");
        wheel.move_to(slot).unwrap_or_else(|e| panic!("slot {slot}: {e}"));
    }

    let expected: Vec<String> = (1..=8).map(|slot| format!("F{slot}\r\n")).collect();
    assert_eq!(mock.written_frames(), expected);
}

#[test]
fn out_of_range_slots_never_reach_the_wire() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    for slot in [0, 9, -1, 42, i32::MIN, i32::MAX] {
        match wheel.move_to(slot) {
            Err(MoveError::OutOfRange(rejected)) => assert_eq!(rejected, slot),
            other => panic!("slot {slot}: expected OutOfRange, got {other:?}"),
        }
    }
    assert!(mock.writes().is_empty());
}

#[test]
fn silence_is_a_timeout_and_connection_stays_open() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    mock.queue_silence();
    assert!(matches!(wheel.move_to(2), Err(MoveError::Timeout(_))));
    assert!(wheel.is_connected());

    mock.queue_silence();
    assert!(matches!(wheel.current_position(), Err(QueryError::Timeout(_))));
    assert!(wheel.is_connected());

    // still usable afterwards
    mock.queue_reply("F2\r\n");
    assert_eq!(wheel.current_position().unwrap(), 2);
}

#[test]
fn position_reports_tolerate_leading_noise() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    mock.queue_reply("F5\r\n");
    assert_eq!(wheel.current_position().unwrap(), 5);

    mock.queue_reply("GARBAGEF07\r\n");
    assert_eq!(wheel.current_position().unwrap(), 7);

    mock.queue_reply("NOPE\r\n");
    match wheel.current_position() {
        Err(QueryError::MalformedResponse(line)) => assert_eq!(line, "NOPE"),
        other => panic!("expected MalformedResponse, got {other:?}"),
    }

    assert_eq!(mock.written_frames(), vec!["F?\r\n"; 3]);
}

#[test]
fn acknowledgement_may_be_embedded() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    mock.queue_reply("F4 OK\r\n");
    wheel.move_to(4).unwrap();
}

#[test]
fn anything_but_ok_fails_a_move() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    mock.queue_reply("ERR BUSY\r\n");
    match wheel.move_to(5) {
        Err(MoveError::UnexpectedResponse(line)) => assert_eq!(line, "ERR BUSY"),
        other => panic!("expected UnexpectedResponse, got {other:?}"),
    }
}

#[test]
fn stale_input_is_cleared_before_each_command() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    // an old report sitting in the buffer must not be mistaken for the answer
    mock.inject_input("F8\r\n");
    mock.queue_reply("F1\r\n");
    assert_eq!(wheel.current_position().unwrap(), 1);

    mock.inject_input("OK\r\n");
    mock.queue_silence();
    assert!(matches!(wheel.move_to(3), Err(MoveError::Timeout(_))));
}

#[test]
fn blank_lines_before_reply_are_skipped() {
    let mock = MockPort::new().with_chunk_size(3);
    let mut wheel = connected_wheel(&mock);

    mock.queue_reply("\r\n\r\nF6\r\n");
    assert_eq!(wheel.current_position().unwrap(), 6);
}

#[test]
fn disconnect_twice_is_harmless() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    wheel.disconnect();
    wheel.disconnect();
    assert!(!wheel.is_connected());
}

#[test]
fn operations_after_disconnect_report_not_connected() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);
    wheel.disconnect();

    assert!(matches!(wheel.move_to(3), Err(MoveError::NotConnected)));
    // range is not even considered without a connection
    assert!(matches!(wheel.move_to(12), Err(MoveError::NotConnected)));
    assert!(matches!(wheel.current_position(), Err(QueryError::NotConnected)));
    assert!(mock.writes().is_empty());

    wheel.connect_with(Box::new(mock.clone())).unwrap();
    mock.queue_reply("OK\r\n");
    wheel.move_to(3).unwrap();
}

#[test]
fn move_then_query_reports_same_slot() {
    let mock = MockPort::new();
    let mut wheel = connected_wheel(&mock);

    mock.queue_reply("OK\r\n");
    wheel.move_to(3).unwrap();

    mock.queue_reply("F3\r\n");
    assert_eq!(wheel.current_position().unwrap(), 3);

    assert_eq!(mock.written_frames(), vec!["F3\r\n".to_string(), "F?\r\n".to_string()]);
}

#[test]
fn never_connected_wheel_refuses_commands() {
    let settings = ConnectionSettings { port: "sim0".to_string(), baud_rate: 9600 };
    let mut wheel = FilterWheel::new(settings);
    assert!(matches!(wheel.move_to(1), Err(MoveError::NotConnected)));
    assert!(matches!(wheel.current_position(), Err(QueryError::NotConnected)));
}
