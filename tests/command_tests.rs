//! MQTT command routing tests

use std::sync::Arc;

use rust_vault_io::commands::{handle, CommandError, Reply};
use rust_vault_io::hal::mock::{MockClock, MockGpio};
use rust_vault_io::publish::RecordingPublisher;
use rust_vault_io::service::IoService;
use rust_vault_io::store::MemoryStore;

const BASE: &str = "esp32vault/1a2b3c";

struct Rig {
    gpio: Arc<MockGpio>,
    publisher: Arc<RecordingPublisher>,
    service: IoService,
}

impl Rig {
    fn new() -> Self {
        let gpio = Arc::new(MockGpio::new());
        let clock = Arc::new(MockClock::new());
        let publisher = Arc::new(RecordingPublisher::with_clock(clock.clone()));
        let service = IoService::without_worker(
            gpio.clone(),
            clock,
            Box::new(MemoryStore::new()),
            publisher.clone(),
        )
        .unwrap();
        Self {
            gpio,
            publisher,
            service,
        }
    }

    fn send(&mut self, suffix: &str, payload: &str) -> Result<Reply, CommandError> {
        let topic = format!("{}/cmd/{}", BASE, suffix);
        handle(&mut self.service, BASE, &topic, payload.as_bytes())
    }

    fn statuses(&self) -> Vec<String> {
        self.publisher.values_for(&format!("{}/status", BASE))
    }

    fn output(&mut self, pin: u8) {
        let payload = format!(r#"{{"pin":{},"mode":"output","report_topic":"out/{}"}}"#, pin, pin);
        self.send("io/config", &payload).unwrap();
    }
}

#[test]
fn test_config_command() {
    let mut rig = Rig::new();
    let reply = rig
        .send(
            "io/config",
            r#"{"pin":4,"mode":"interrupt","edge":"falling","report_topic":"door","retain":true}"#,
        )
        .unwrap();

    assert_eq!(reply, Reply::Status("io_config_updated"));
    assert_eq!(rig.statuses(), vec!["io_config_updated"]);
    assert!(rig.gpio.has_interrupt(4));

    let status = rig
        .publisher
        .records()
        .into_iter()
        .find(|r| r.topic.ends_with("/status"))
        .unwrap();
    assert!(status.retained);
}

#[test]
fn test_config_failures() {
    let mut rig = Rig::new();

    let err = rig.send("io/config", "{not json").unwrap_err();
    assert!(matches!(err, CommandError::InvalidPayload(_)));
    assert_eq!(err.code(), "E02");

    let err = rig.send("io/config", r#"{"pin":6,"report_topic":"t"}"#).unwrap_err();
    assert_eq!(err.code(), "E10");

    let err = rig.send("io/config", r#"{"pin":4}"#).unwrap_err();
    assert_eq!(err.code(), "E12");

    let err = rig
        .send("io/config", r#"{"pin":4,"report_topic":"t","mode":"pwm"}"#)
        .unwrap_err();
    assert_eq!(err.code(), "E13");

    assert_eq!(rig.statuses(), vec!["io_config_failed"; 4]);
    assert!(rig.service.status().is_empty());
}

#[test]
fn test_remove_command() {
    let mut rig = Rig::new();
    rig.output(4);

    assert_eq!(
        rig.send("io/remove", r#"{"pin":4}"#).unwrap(),
        Reply::Status("io_remove_success")
    );
    let err = rig.send("io/remove", r#"{"pin":4}"#).unwrap_err();
    assert!(matches!(err, CommandError::NotConfigured(4)));
    assert_eq!(err.code(), "E04");

    assert_eq!(
        rig.statuses(),
        vec!["io_config_updated", "io_remove_success", "io_remove_failed"]
    );
}

#[test]
fn test_exclude_command() {
    let mut rig = Rig::new();
    assert_eq!(
        rig.send("io/exclude", r#"{"pins":[4],"ranges":[{"from":20,"to":23}]}"#)
            .unwrap(),
        Reply::Status("io_exclude_updated")
    );

    let err = rig.send("io/config", r#"{"pin":21,"report_topic":"t"}"#).unwrap_err();
    assert_eq!(err.code(), "E11");

    let err = rig.send("io/exclude", r#"{"pins":"all"}"#).unwrap_err();
    assert!(matches!(err, CommandError::InvalidPayload(_)));
    assert_eq!(rig.statuses().last().map(String::as_str), Some("io_exclude_failed"));
    assert_eq!(rig.service.exclusion().pins, vec![4]);
}

#[test]
fn test_trigger_payload_forms() {
    let mut rig = Rig::new();
    rig.output(4);

    rig.send("io/4/trigger", r#"{"action":"pulse","pulse":50}"#).unwrap();
    assert_eq!(rig.gpio.writes(4), vec![true, false]);

    rig.send("io/4/trigger", "").unwrap();
    rig.send("io/4/trigger", " toggle\n").unwrap();
    rig.send("io/4/trigger", r#"{"action":"toggle"}"#).unwrap();
    rig.send("io/4/trigger", r#"{}"#).unwrap();

    assert_eq!(rig.gpio.writes(4), vec![true, false, true, false, true, true]);
    assert_eq!(rig.publisher.values_for("out/4"), vec!["1", "0", "1", "0", "1", "1"]);
    assert_eq!(rig.statuses().last().map(String::as_str), Some("io_trigger_success"));
}

#[test]
fn test_trigger_failures() {
    let mut rig = Rig::new();
    rig.output(4);
    rig.send("io/config", r#"{"pin":5,"report_topic":"in/5"}"#).unwrap();

    let cases = [
        ("io/x/trigger", "set", "E03"),
        ("io/300/trigger", "set", "E03"),
        ("io/13/trigger", "set", "E20"),
        ("io/5/trigger", "set", "E21"),
        ("io/4/trigger", "blink", "E22"),
        ("io/4/trigger", r#"{"action":"set","colour":"red"}"#, "E02"),
    ];
    for (suffix, payload, code) in cases {
        let err = rig.send(suffix, payload).unwrap_err();
        assert_eq!(err.code(), code, "{} {}", suffix, payload);
        assert_eq!(rig.statuses().last().map(String::as_str), Some("io_trigger_failed"));
    }
    assert!(rig.gpio.writes(4).is_empty());
}

#[test]
fn test_status_command_publishes_config_document() {
    let mut rig = Rig::new();
    rig.output(4);
    rig.publisher.clear();

    let reply = rig.send("io/status", "").unwrap();
    let Reply::Config(doc) = reply.clone() else {
        panic!("expected config document, got {:?}", reply);
    };

    let published = rig.publisher.last().unwrap();
    assert_eq!(published.topic, format!("{}/config", BASE));
    assert_eq!(published.value, doc);
    assert!(published.retained);

    let doc: serde_json::Value = serde_json::from_str(&doc).unwrap();
    assert_eq!(doc["pins"][0]["report_topic"], "out/4");
    assert_eq!(doc["pins"][0]["mode"], "output");
}

#[test]
fn test_report_command() {
    let mut rig = Rig::new();
    rig.output(4);
    rig.send("io/config", r#"{"pin":5,"report_topic":"in/5"}"#).unwrap();
    rig.publisher.clear();

    assert_eq!(rig.send("io/report", "").unwrap(), Reply::Reported(2));
    assert_eq!(rig.publisher.values_for("out/4"), vec!["0"]);
    assert_eq!(rig.publisher.values_for("in/5"), vec!["0"]);
    assert!(rig.statuses().is_empty());
}

#[test]
fn test_restart_command_announces_before_reboot() {
    let mut rig = Rig::new();
    rig.output(4);
    rig.publisher.clear();

    assert_eq!(rig.send("restart", "").unwrap(), Reply::Restart);
    assert_eq!(rig.statuses(), vec!["restarting"]);
    assert!(rig.publisher.last().unwrap().retained);

    // Nothing is torn down before the reboot itself
    assert_eq!(rig.service.status().len(), 1);
    assert!(rig.send("restart/now", "").is_err());
}

#[test]
fn test_unknown_commands() {
    let mut rig = Rig::new();

    for suffix in ["io/nope", "io/config/extra", "io//trigger", "sys/reboot"] {
        let err = rig.send(suffix, "{}").unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand), "{}", suffix);
        assert_eq!(err.code(), "E01");
    }

    let err = handle(&mut rig.service, BASE, "other/device/cmd/io/config", b"{}").unwrap_err();
    assert!(matches!(err, CommandError::UnknownCommand));
    let err = handle(&mut rig.service, BASE, &format!("{}/status", BASE), b"").unwrap_err();
    assert!(matches!(err, CommandError::UnknownCommand));

    assert!(rig.publisher.records().is_empty());
}
