use super::*;

#[test]
fn test_default_is_untouched_utf8() {
    let expect = StreamExpect::default();
    assert!(!expect.touched);
    assert!(expect.error.is_none());
    assert_eq!(expect.encoding, encoding_rs::UTF_8);
    assert_eq!(expect.capture, CapturePolicy::default());
}

#[test]
fn test_assertions_keep_registration_order() {
    let expect = StreamExpect::default()
        .has_lines(["a"])
        .has_line_count(1)
        .is_empty();
    assert_eq!(expect.assertions.len(), 3);
    assert!(expect.touched);
}

#[test]
fn test_charset_by_label() {
    let expect = StreamExpect::default().charset("latin1");
    assert_eq!(expect.encoding, encoding_rs::WINDOWS_1252);
    assert!(expect.error.is_none());
}

#[test]
fn test_unknown_charset_is_deferred() {
    let expect = StreamExpect::default().charset("no-such-charset");
    match &expect.error {
        Some(StartError::UnknownCharset(label)) => assert_eq!(label, "no-such-charset"),
        other => panic!("expected UnknownCharset, got {other:?}"),
    }
}

#[test]
fn test_bad_pattern_is_deferred_and_first_error_wins() {
    let expect = StreamExpect::default()
        .has_lines_matching(["(unclosed"])
        .charset("also-bad");
    match &expect.error {
        Some(StartError::BadPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
        other => panic!("expected BadPattern, got {other:?}"),
    }
}

#[test]
fn test_capture_policies() {
    assert_eq!(
        StreamExpect::default().capture(3, 7).capture,
        CapturePolicy::bounded(3, 7)
    );
    assert_eq!(
        StreamExpect::default().capture_all().capture,
        CapturePolicy::all()
    );
    assert_eq!(
        StreamExpect::default().capture_none().capture,
        CapturePolicy::none()
    );
}

#[test]
fn test_capture_and_charset_do_not_count_as_expectations() {
    let expect = StreamExpect::default().capture(1, 1).charset("utf-8");
    assert!(!expect.touched);
}

#[test]
fn test_awaits_returns_handle_and_registers_probe() {
    let (expect, _handle) =
        StreamExpect::default().awaits(crate::awaiter::line_matching(r"x(\d)"));
    assert_eq!(expect.probes.len(), 1);
    assert!(expect.touched);
    assert!(expect.error.is_none());
}

#[test]
fn test_awaits_with_bad_pattern_defers_error() {
    let (expect, _handle) =
        StreamExpect::default().awaits(crate::awaiter::line_matching("(broken"));
    assert!(matches!(expect.error, Some(StartError::BadPattern { .. })));
}

#[test]
fn test_null_mode() {
    let expect = StreamExpect::default().null();
    assert!(expect.null_device);
    assert!(expect.touched);
}
