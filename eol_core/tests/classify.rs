use eol_core::{EolError, ErrorCategory, classify, map_hw_error};
use eol_hardware::error::HwError;
use eol_hardware::protocol::ProtocolError;
use eyre::WrapErr;
use rstest::rstest;

#[rstest]
#[case::not_connected(HwError::NotConnected { device: "mcu" }, ErrorCategory::Connection)]
#[case::closed(HwError::Closed, ErrorCategory::Connection)]
#[case::timeout(HwError::CommunicationTimeout { code: 0x04, attempts: 3 }, ErrorCategory::CommunicationTimeout)]
#[case::scpi_timeout(
    HwError::ResponseTimeout { device: "power_supply", command: "VOLT?".into() },
    ErrorCategory::CommunicationTimeout
)]
#[case::protocol(HwError::Protocol(ProtocolError::MissingFooter), ErrorCategory::Protocol)]
#[case::operation(HwError::operation("robot", "home_axis", "alarm"), ErrorCategory::Hardware)]
fn hardware_errors_map_to_typed_categories(#[case] hw: HwError, #[case] expected: ErrorCategory) {
    let boxed: eol_traits::DeviceError = Box::new(hw);
    let mapped = map_hw_error("mcu", "set_fan_speed", boxed.as_ref());
    assert_eq!(mapped.category(), expected, "{mapped:?}");
}

#[test]
fn operation_error_keeps_device_and_operation_of_origin() {
    let boxed: eol_traits::DeviceError = Box::new(HwError::operation("robot", "home_axis", "alarm"));
    match map_hw_error("whatever", "ignored", boxed.as_ref()) {
        EolError::HardwareOperation {
            device, operation, ..
        } => assert_eq!((device.as_str(), operation.as_str()), ("robot", "home_axis")),
        other => panic!("expected HardwareOperation, got {other:?}"),
    }
}

#[rstest]
#[case("read timed out", ErrorCategory::CommunicationTimeout)]
#[case("device not connected", ErrorCategory::Connection)]
#[case("servo alarm", ErrorCategory::Hardware)]
fn foreign_errors_fall_back_to_message(#[case] message: &str, #[case] expected: ErrorCategory) {
    let e = std::io::Error::other(message.to_string());
    assert_eq!(map_hw_error("robot", "move", &e).category(), expected);
}

#[test]
fn classify_finds_typed_error_under_context() {
    let report = Err::<(), _>(EolError::CommunicationTimeout("mcu set_test_mode".into()))
        .wrap_err("setup failed")
        .unwrap_err();
    let c = classify(&report, "setup");
    assert_eq!(c.category, ErrorCategory::CommunicationTimeout);
    assert!(c.retryable);
    assert_eq!(c.context, "setup");
}

#[test]
fn classify_reaches_hardware_cause() {
    let report = eyre::Report::new(HwError::NotConnected { device: "loadcell" }).wrap_err("measure");
    let c = classify(&report, "measure");
    assert_eq!(c.category, ErrorCategory::Connection);
    assert!(!c.retryable);
}

#[test]
fn classify_unknown_error() {
    let c = classify(&eyre::eyre!("something odd"), "teardown");
    assert_eq!(c.category, ErrorCategory::Unknown);
    assert_eq!(c.device, None);
}

#[test]
fn classified_error_serializes_category_in_snake_case() {
    let c = classify(
        &eyre::Report::new(EolError::MaxDurationExceeded(std::time::Duration::from_secs(300))),
        "measure",
    );
    let json = serde_json::to_value(&c).unwrap();
    assert_eq!(json["category"], "max_duration");
}
