//! Pin registry admission and lifecycle tests

use std::sync::Arc;

use rust_vault_io::capture::Capture;
use rust_vault_io::config::{ConfigError, ExclusionSet, PinRange, PinRequest};
use rust_vault_io::hal::mock::{MockClock, MockGpio};
use rust_vault_io::pin::{InterruptEdge, PinMode, RESERVED_PINS};
use rust_vault_io::queue::EventQueue;
use rust_vault_io::registry::PinRegistry;
use rust_vault_io::store::MemoryStore;

const MODES: [&str; 5] = ["output", "input", "input_pullup", "analog", "interrupt"];

fn registry() -> (PinRegistry, Arc<MockGpio>) {
    let gpio = Arc::new(MockGpio::new());
    let capture = Capture::new(
        Arc::new(EventQueue::new().unwrap()),
        Arc::new(MockClock::new()),
    );
    let registry = PinRegistry::new(gpio.clone(), capture, Box::new(MemoryStore::new()));
    (registry, gpio)
}

fn exclude(registry: &mut PinRegistry, pins: Vec<u8>, ranges: Vec<PinRange>) {
    registry.set_exclusion(ExclusionSet { pins, ranges }, false);
}

#[test]
fn test_reserved_pins_rejected_for_every_mode() {
    let (mut reg, _) = registry();
    for &pin in RESERVED_PINS {
        for mode in MODES {
            let err = reg
                .configure(&PinRequest::new(pin, "t").with_mode(mode))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Reserved(p) if p == pin), "{} {}", pin, mode);
        }
        // Even with every other field broken
        let mut req = PinRequest::new(pin, "").with_mode("bogus");
        req.report_topic = None;
        assert!(matches!(reg.configure(&req), Err(ConfigError::Reserved(_))));
    }
    assert!(reg.is_empty());
}

#[test]
fn test_reserved_wins_over_exclusion() {
    let (mut reg, _) = registry();
    let pin = RESERVED_PINS[0];
    exclude(&mut reg, vec![pin], vec![PinRange { from: 0, to: 39 }]);
    assert!(matches!(
        reg.configure(&PinRequest::new(pin, "t")),
        Err(ConfigError::Reserved(_))
    ));
}

#[test]
fn test_excluded_pins_and_ranges() {
    let (mut reg, _) = registry();
    exclude(&mut reg, vec![2], vec![PinRange { from: 32, to: 35 }]);

    for pin in [2, 32, 33, 35] {
        assert!(
            matches!(reg.configure(&PinRequest::new(pin, "t")), Err(ConfigError::Excluded(p)) if p == pin),
            "GPIO{} should be excluded",
            pin
        );
    }
    assert!(reg.configure(&PinRequest::new(36, "t")).is_ok());
}

#[test]
fn test_unexcluded_pin_becomes_configurable() {
    let (mut reg, _) = registry();
    exclude(&mut reg, vec![4], vec![]);
    assert!(reg.configure(&PinRequest::new(4, "t")).is_err());

    exclude(&mut reg, vec![], vec![]);
    assert!(reg.configure(&PinRequest::new(4, "t")).is_ok());
}

#[test]
fn test_exclusion_does_not_evict_configured_pin() {
    let (mut reg, _) = registry();
    reg.configure(&PinRequest::new(4, "t")).unwrap();
    exclude(&mut reg, vec![4], vec![]);
    assert!(reg.lookup(4).is_some());
}

#[test]
fn test_missing_topic_for_every_mode() {
    let (mut reg, _) = registry();
    for mode in MODES {
        let err = reg
            .configure(&PinRequest::new(4, "").with_mode(mode))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingField("report_topic")),
            "mode {} accepted an empty topic",
            mode
        );
    }
    assert!(reg.lookup(4).is_none());
}

#[test]
fn test_invalid_enums_rejected_without_partial_state() {
    let (mut reg, gpio) = registry();

    let err = reg
        .configure(&PinRequest::new(4, "t").with_mode("pwm"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnum { field: "mode", .. }));

    let err = reg
        .configure(&PinRequest::new(4, "t").with_mode("interrupt").with_edge("both"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnum { field: "edge", .. }));

    assert!(reg.lookup(4).is_none());
    assert_eq!(gpio.mode(4), None);
    assert!(!gpio.has_interrupt(4));
}

#[test]
fn test_configure_applies_hardware_mode() {
    let (mut reg, gpio) = registry();
    reg.configure(&PinRequest::new(4, "t").with_mode("interrupt").with_edge("rising"))
        .unwrap();
    reg.configure(&PinRequest::new(34, "t").with_mode("analog"))
        .unwrap();

    assert_eq!(gpio.mode(4), Some(PinMode::Interrupt));
    assert!(gpio.has_interrupt(4));
    assert_eq!(reg.lookup(4).unwrap().edge, InterruptEdge::Rising);
    assert_eq!(gpio.mode(34), Some(PinMode::Analog));
    assert!(!gpio.has_interrupt(34));
}

#[test]
fn test_hardware_failure_reported() {
    let (mut reg, gpio) = registry();
    gpio.break_pin(4);
    let err = reg.configure(&PinRequest::new(4, "t")).unwrap_err();
    assert!(matches!(err, ConfigError::Hardware(_)));
    assert_eq!(err.code(), "E14");
    assert!(reg.lookup(4).is_none());
}

#[test]
fn test_reconfigure_replaces_and_resets_state() {
    let (mut reg, _) = registry();
    reg.configure(&PinRequest::new(4, "a").with_debounce(10))
        .unwrap();
    reg.configure(&PinRequest::new(4, "b").with_interval(500))
        .unwrap();

    let cfg = reg.lookup(4).unwrap();
    assert_eq!(cfg.report_topic, "b");
    assert_eq!(cfg.debounce_ms, 50);
    assert_eq!(cfg.report_interval_ms, 500);
    assert_eq!(cfg.last_value, None);
    assert_eq!(reg.len(), 1);
}
