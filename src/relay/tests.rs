//! Scenario tests for framing, rewriting and replay.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use super::*;
use crate::test_utils::{
    ManualClock, build_frame, current_frame, feed, power_off_frame, serial_frame, soc_frame,
    status_frame, temperature_frame, test_relay, uniform_cell_voltage_frame,
};
use crate::types::packet_type::{CURRENT, SERIAL, STATUS};

const SERIAL_FRAME: [u8; 10] = [0xFF, 0x55, 0xAA, 0x06, 0x01, 0x02, 0x03, 0x04, 0x02, 0x0E];

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

#[test]
fn unknown_bytes_pass_through() {
    init_tracing();
    let (mut relay, _clock) = test_relay();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = seen.clone();
    relay.add_unknown_data_callback(move |byte| observed.lock().unwrap().push(byte));

    feed(&mut relay, &[1, 2, 3]);
    assert_eq!(relay.poll(), 3);

    assert_eq!(relay.sink(), &vec![1, 2, 3]);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(relay.buffered_len(), 0);
    assert_eq!(relay.packet_tracker().global_stats().total_unknown_bytes_received, 3);
}

#[test]
fn broken_preamble_is_flushed_whole() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &[0xFF, 0x55, 0x00]);
    relay.poll();
    assert_eq!(relay.sink(), &vec![0xFF, 0x55, 0x00]);
    assert_eq!(relay.buffered_len(), 0);
}

#[test]
fn unframeable_type_is_flushed() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &[0xFF, 0x55, 0xAA, 0x01, 0x42]);
    relay.poll();
    assert_eq!(relay.sink(), &vec![0xFF, 0x55, 0xAA, 0x01, 0x42]);
    assert_eq!(relay.packet_tracker().global_stats().total_unknown_bytes_received, 5);
}

#[test]
fn partial_frame_stays_buffered_across_polls() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &SERIAL_FRAME[..6]);
    relay.poll();
    assert!(relay.sink().is_empty());
    assert_eq!(relay.buffered_len(), 6);

    feed(&mut relay, &SERIAL_FRAME[6..]);
    relay.poll();
    assert_eq!(relay.sink(), &SERIAL_FRAME.to_vec());
    assert_eq!(relay.buffered_len(), 0);
}

#[test]
fn resynchronizes_after_garbage() {
    let (mut relay, _clock) = test_relay();
    let mut bytes = vec![0x13, 0x37];
    bytes.extend_from_slice(&SERIAL_FRAME);
    feed(&mut relay, &bytes);
    relay.poll();

    assert_eq!(relay.sink(), &bytes);
    assert_eq!(relay.state().captured_serial(), Some(0x0102_0304));
    assert_eq!(relay.packet_tracker().global_stats().total_known_packets_received, 1);
}

#[test]
fn serial_is_captured_and_overridden() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &SERIAL_FRAME);
    relay.set_bms_serial_override(Some(0x0102_0309));
    relay.poll();

    assert_eq!(relay.sink(), &vec![0xFF, 0x55, 0xAA, 0x06, 0x01, 0x02, 0x03, 0x09, 0x02, 0x13]);
    assert_eq!(relay.state().captured_serial(), Some(0x0102_0304));
    assert_eq!(relay.state().serial_override(), Some(0x0102_0309));
}

#[test]
fn serial_override_with_next_preamble_pending() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &SERIAL_FRAME);
    relay.set_bms_serial_override(Some(0x0804_0201));
    feed(&mut relay, &PREAMBLE);
    relay.poll();

    assert_eq!(relay.state().captured_serial(), Some(0x0102_0304));
    assert_eq!(relay.sink(), &vec![0xFF, 0x55, 0xAA, 0x06, 0x08, 0x04, 0x02, 0x01, 0x02, 0x13]);
    assert_eq!(relay.buffered_len(), PREAMBLE.len());
}

#[test]
fn soc_frame_without_baseline_is_swallowed() {
    let (mut relay, _clock) = test_relay();
    let bytes = [0xFF, 0x55, 0xAA, 0x03, 0x2B, 0x02, 0x2C];
    assert!(Frame::new(&mut bytes.clone()).is_valid());

    feed(&mut relay, &bytes);
    relay.poll();
    assert!(relay.sink().is_empty());
    assert_eq!(relay.state().bms_soc_percent(), Some(0x2B));
    assert_eq!(relay.packet_tracker().global_stats().total_known_packets_received, 1);
}

#[test]
fn captured_serial_keeps_first_value() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &serial_frame(111));
    feed(&mut relay, &serial_frame(222));
    relay.poll();
    assert_eq!(relay.state().captured_serial(), Some(111));
}

#[test]
fn observers_see_raw_and_rewritten_frames() {
    let (mut relay, _clock) = test_relay();
    let received = Arc::new(Mutex::new(Vec::new()));
    let forwarded = Arc::new(Mutex::new(Vec::new()));
    let r = received.clone();
    relay.add_received_packet_callback(move |_, frame| r.lock().unwrap().push(frame.as_bytes().to_vec()));
    let f = forwarded.clone();
    relay.add_forwarded_packet_callback(move |_, frame| {
        assert!(Frame::new(&mut frame.as_bytes().to_vec()).is_valid());
        f.lock().unwrap().push(frame.as_bytes().to_vec());
    });

    relay.set_bms_serial_override(Some(0x0102_0309));
    feed(&mut relay, &SERIAL_FRAME);
    relay.poll();

    assert_eq!(*received.lock().unwrap(), vec![SERIAL_FRAME.to_vec()]);
    assert_eq!(*forwarded.lock().unwrap(), vec![serial_frame(0x0102_0309)]);
}

#[test]
fn corrupt_frame_is_forwarded_untouched() {
    let (mut relay, _clock) = test_relay();
    relay.set_bms_serial_override(Some(7));
    let mut corrupt = SERIAL_FRAME;
    corrupt[9] ^= 0x01;
    feed(&mut relay, &corrupt);
    relay.poll();

    assert_eq!(relay.sink(), &corrupt.to_vec());
    assert_eq!(relay.state().captured_serial(), None);
    assert_eq!(relay.packet_tracker().global_stats().total_packet_checksum_mismatches, 1);
    assert!(relay.packet_tracker().packet_stats(SERIAL).is_none());
}

#[test]
fn status_without_interesting_flags_is_suppressed() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &status_frame(0x00));
    feed(&mut relay, &status_frame(0x10));
    relay.poll();
    assert!(relay.sink().is_empty());

    feed(&mut relay, &status_frame(0x04));
    relay.poll();
    assert_eq!(relay.sink(), &status_frame(0x04));
    assert!(relay.state().is_battery_empty());
    assert!(!relay.state().is_charging());
}

#[test]
fn current_is_only_forwarded_while_charging() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &current_frame(-10));
    relay.poll();
    assert!(relay.sink().is_empty());
    assert_eq!(relay.state().current_milliamps(), -550);

    feed(&mut relay, &status_frame(0x20));
    feed(&mut relay, &current_frame(-10));
    relay.poll();

    let mut expected = status_frame(0x20);
    expected.extend(current_frame(-10));
    assert_eq!(relay.sink(), &expected);
    assert!(relay.state().is_charging());
    assert!(relay.fuel_gauge().is_charging());
}

#[test]
fn soc_is_suppressed_until_voltage_is_known() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &soc_frame(80));
    relay.poll();

    assert!(relay.sink().is_empty());
    assert_eq!(relay.state().bms_soc_percent(), Some(80));
    assert_eq!(relay.state().overridden_soc_percent(), None);
}

#[test]
fn soc_is_rewritten_from_the_gauge() {
    let (mut relay, _clock) = test_relay();
    let cells = uniform_cell_voltage_frame(3700);
    feed(&mut relay, &cells);
    feed(&mut relay, &soc_frame(80));
    relay.poll();

    let mut expected = cells.clone();
    expected.extend(soc_frame(43));
    assert_eq!(relay.sink(), &expected);
    assert_eq!(relay.state().bms_soc_percent(), Some(80));
    assert_eq!(relay.state().overridden_soc_percent(), Some(43));
    assert_eq!(relay.state().total_voltage_millivolts(), 3700 * 15);
    assert_eq!(relay.state().cell_millivolts()[14], 3700);
}

#[test]
fn restored_gauge_state_drives_soc() {
    let clock = ManualClock::new(0);
    let mut relay = BmsRelay::new(std::collections::VecDeque::<u8>::new(), Vec::<u8>::new(), clock)
        .with_fuel_gauge_state(FuelGaugeState {
            top_soc: 80,
            bottom_soc: 20,
            current_depth_mas: 500,
            bottom_depth_mas: 1000,
        });
    relay.source_mut().extend(uniform_cell_voltage_frame(3700));
    relay.source_mut().extend(soc_frame(99));
    relay.poll();

    assert_eq!(relay.state().overridden_soc_percent(), Some(50));
    assert!(relay.sink().ends_with(&soc_frame(50)));
}

#[test]
fn temperatures_are_averaged() {
    let (mut relay, _clock) = test_relay();
    feed(&mut relay, &temperature_frame([20, 21, 22, 23, -5]));
    relay.poll();

    assert_eq!(relay.state().temperatures_celsius(), &[20, 21, 22, 23, -5]);
    assert_eq!(relay.state().average_temperature_celsius(), 16);
    assert_eq!(relay.sink(), &temperature_frame([20, 21, 22, 23, -5]));
}

#[test]
fn stale_packets_are_replayed() {
    let (mut relay, clock) = test_relay();
    let mut frames = status_frame(0x20);
    frames.extend(current_frame(-10));
    feed(&mut relay, &frames);
    relay.poll();
    assert_eq!(relay.sink(), &frames);

    clock.set(499);
    assert_eq!(relay.poll(), 0);
    assert_eq!(relay.sink().len(), frames.len());

    clock.set(500);
    relay.poll();
    assert_eq!(&relay.sink()[frames.len()..], &frames[..]);
    assert_eq!(relay.packet_tracker().packet_stats(STATUS).map(|s| s.total_num), Some(2));
    assert_eq!(relay.packet_tracker().packet_stats(CURRENT).map(|s| s.last_packet_millis), Some(500));

    // Replays restart the silence window.
    clock.set(999);
    relay.poll();
    assert_eq!(relay.sink().len(), frames.len() * 2);
}

#[test]
fn slow_types_replay_after_three_seconds() {
    let (mut relay, clock) = test_relay();
    let temps = temperature_frame([1, 2, 3, 4, 5]);
    feed(&mut relay, &temps);
    relay.poll();

    clock.set(2999);
    relay.poll();
    assert_eq!(relay.sink(), &temps);

    clock.set(3000);
    relay.poll();
    assert_eq!(relay.sink().len(), temps.len() * 2);
}

#[test]
fn power_off_is_never_replayed() {
    let (mut relay, clock) = test_relay();
    let fired = Arc::new(Mutex::new(0));
    let counter = fired.clone();
    relay.add_power_off_callback(move || *counter.lock().unwrap() += 1);

    feed(&mut relay, &power_off_frame());
    relay.poll();
    assert_eq!(relay.sink(), &power_off_frame());

    clock.set(10_000);
    relay.poll();
    assert_eq!(relay.sink(), &power_off_frame());
    assert_eq!(relay.state().power_off_count(), 1);
    assert_eq!(*fired.lock().unwrap(), 1);
}

#[test]
fn snapshot_reflects_decoded_state() {
    let (mut relay, clock) = test_relay();
    clock.set(1234);
    feed(&mut relay, &serial_frame(42));
    feed(&mut relay, &temperature_frame([10, 10, 10, 10, 10]));
    feed(&mut relay, &[0x00]);
    relay.poll();

    let snapshot = relay.snapshot();
    assert_eq!(snapshot.taken_at_millis, 1234);
    assert_eq!(snapshot.captured_serial, Some(42));
    assert_eq!(snapshot.average_temperature_celsius, 10);
    assert_eq!(snapshot.global.total_known_packets_received, 2);
    assert_eq!(snapshot.global.total_unknown_bytes_received, 1);
    assert_eq!(
        snapshot.packets.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![crate::types::packet_type::TEMPERATURES, SERIAL]
    );

    let yaml = serde_yaml_ng::to_string(&snapshot).unwrap();
    assert!(yaml.contains("captured_serial: 42"));
}

#[test]
fn frames_of_unknown_but_framed_types_pass_through() {
    let (mut relay, _clock) = test_relay();
    // Type 7 is 13 bytes long and has no rewriter.
    let frame = build_frame(7, &[9; 7]);
    feed(&mut relay, &frame);
    relay.poll();
    assert_eq!(relay.sink(), &frame);
}

proptest! {
    #[test]
    fn prop_bytes_without_full_preamble_pass_through_in_order(
        bytes in prop::collection::vec(
            prop_oneof![Just(0xFFu8), Just(0x55), Just(0xAA), any::<u8>()],
            0..128,
        )
        .prop_map(|mut bytes| {
            for i in 2..bytes.len() {
                if bytes[i - 2..=i] == PREAMBLE {
                    bytes[i] = 0x00;
                }
            }
            bytes
        }),
        split in any::<prop::sample::Index>(),
    ) {
        let (mut relay, _clock) = test_relay();
        let split = split.index(bytes.len() + 1);
        feed(&mut relay, &bytes[..split]);
        relay.poll();
        feed(&mut relay, &bytes[split..]);
        relay.poll();

        // Only a trailing `FF` or `FF 55` may still wait for the rest of a preamble.
        let held = relay.buffered_len();
        prop_assert!(held < PREAMBLE.len());
        prop_assert_eq!(&bytes[bytes.len() - held..], &PREAMBLE[..held]);
        prop_assert_eq!(relay.sink().as_slice(), &bytes[..bytes.len() - held]);
        prop_assert_eq!(
            relay.packet_tracker().global_stats().total_unknown_bytes_received,
            relay.sink().len() as u64
        );
    }

    #[test]
    fn prop_power_off_fires_once_per_received_frame(
        steps in prop::collection::vec((0u8..4, 0u64..5000), 1..40)
    ) {
        let (mut relay, clock) = test_relay();
        let fired = Arc::new(Mutex::new(0u32));
        let counter = fired.clone();
        relay.add_power_off_callback(move || *counter.lock().unwrap() += 1);

        let mut sent = 0u32;
        for (kind, delay) in steps {
            clock.advance(delay);
            let frame = match kind {
                0 => status_frame(0x20),
                1 => current_frame(-20),
                2 => {
                    sent += 1;
                    power_off_frame()
                }
                _ => soc_frame(50),
            };
            feed(&mut relay, &frame);
            relay.poll();
        }

        prop_assert_eq!(relay.state().power_off_count(), sent);
        prop_assert_eq!(*fired.lock().unwrap(), sent);
    }

    #[test]
    fn prop_forwarded_frames_always_validate(
        serial in any::<u32>(),
        override_serial in any::<u32>(),
    ) {
        let (mut relay, _clock) = test_relay();
        relay.set_bms_serial_override(Some(override_serial));
        feed(&mut relay, &serial_frame(serial));
        relay.poll();

        let mut out = relay.sink().clone();
        prop_assert!(Frame::new(&mut out).is_valid());
        prop_assert_eq!(out, serial_frame(override_serial));
    }
}
