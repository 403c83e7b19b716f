use super::*;

fn run(assert: &mut dyn LineAssert, lines: &[&str]) -> Vec<String> {
    for line in lines {
        assert.line(line);
    }
    let mut collector = Collector::new();
    assert.evaluate(Some(StreamTag::Stdout), &mut collector);
    match collector.render("cmd") {
        None => Vec::new(),
        Some(report) => report
            .lines()
            .filter(|l| l.starts_with("Failure"))
            .map(|l| l.split_once(": ").unwrap().1.to_string())
            .collect(),
    }
}

fn full_report(assert: &mut dyn LineAssert, lines: &[&str]) -> Option<String> {
    for line in lines {
        assert.line(line);
    }
    let mut collector = Collector::new();
    assert.evaluate(Some(StreamTag::Stdout), &mut collector);
    collector.render("cmd")
}

#[test]
fn test_has_lines_satisfied_in_any_order() {
    let mut a = HasLines::new(vec!["b".into(), "a".into()]);
    assert!(run(&mut a, &["a", "b"]).is_empty());
}

#[test]
fn test_has_lines_reports_each_missing_literal() {
    let mut a = HasLines::new(vec!["one".into(), "two".into()]);
    let failures = run(&mut a, &["one"]);
    assert_eq!(failures, vec!["Expected line \"two\" in stdout".to_string()]);
}

#[test]
fn test_has_lines_requires_whole_line_equality() {
    let mut a = HasLines::new(vec!["Hello".into()]);
    let failures = run(&mut a, &["Hello Joe"]);
    assert_eq!(failures.len(), 1);
}

#[test]
fn test_lacks_lines_quotes_whole_line_highlight() {
    let mut a = LacksLines::new(vec!["secret".into()]);
    let report = full_report(&mut a, &["ok", "secret", "ok"]).expect("failure");
    assert!(report.contains("Expected no line \"secret\" in stdout but found:"));
    assert!(report.contains("\n    >>secret<<"));
}

#[test]
fn test_has_substrings() {
    let mut a = HasSubstrings::new(vec!["Joe".into()], false);
    assert!(run(&mut a, &["Hello Joe"]).is_empty());

    let mut a = HasSubstrings::new(vec!["Dolly".into()], false);
    let failures = run(&mut a, &["Hello Joe"]);
    assert_eq!(
        failures,
        vec!["Expected line containing \"Dolly\" in stdout".to_string()]
    );
}

#[test]
fn test_has_substrings_ignore_case() {
    let mut a = HasSubstrings::new(vec!["HELLO".into()], true);
    assert!(run(&mut a, &["well, hello there"]).is_empty());

    let mut a = HasSubstrings::new(vec!["HELLO".into()], true);
    let failures = run(&mut a, &["goodbye"]);
    assert_eq!(
        failures,
        vec!["Expected line containing \"hello\" (ignoring case) in stdout".to_string()]
    );
}

#[test]
fn test_lacks_substrings_highlights_the_match() {
    let mut a = LacksSubstrings::new(vec!["err".into()], false);
    let report = full_report(&mut a, &["no problem", "an error occurred"]).expect("failure");
    assert!(report.contains("an >>err<<or occurred"), "got: {report}");
}

#[test]
fn test_lacks_substrings_ignore_case_highlights_original_text() {
    let mut a = LacksSubstrings::new(vec!["WARN".into()], true);
    let report = full_report(&mut a, &["[Warn] disk low"]).expect("failure");
    assert!(report.contains("[>>Warn<<] disk low"), "got: {report}");
}

#[test]
fn test_has_matches_uses_partial_match() {
    let mut a = HasMatches::new(vec![Regex::new(r"port: \d+").unwrap()]);
    assert!(run(&mut a, &["listening on port: 8080 now"]).is_empty());
}

#[test]
fn test_has_matches_reports_pattern() {
    let mut a = HasMatches::new(vec![Regex::new(r"^\d+$").unwrap()]);
    let failures = run(&mut a, &["abc"]);
    assert_eq!(
        failures,
        vec!["Expected line matching \"^\\d+$\" in stdout".to_string()]
    );
}

#[test]
fn test_lacks_matches_highlights_match_span() {
    let mut a = LacksMatches::new(vec![Regex::new(r"\d{3}").unwrap()]);
    let report = full_report(&mut a, &["code 404 seen"]).expect("failure");
    assert!(report.contains("code >>404<< seen"), "got: {report}");
}

#[test]
fn test_line_count_is() {
    let mut a = LineCountIs::new(2);
    assert!(run(&mut a, &["a", "b"]).is_empty());

    let mut a = LineCountIs::new(1);
    let failures = run(&mut a, &["a", "b", "c"]);
    assert_eq!(
        failures,
        vec!["Expected line count 1 in stdout but was 3".to_string()]
    );
}

#[test]
fn test_line_count_satisfies_expands_template() {
    let mut a = LineCountSatisfies::new(
        |n| n > 5,
        "Expected more than 5 lines in ${stream} but was ${actual}".into(),
    );
    let failures = run(&mut a, &["a", "b"]);
    assert_eq!(
        failures,
        vec!["Expected more than 5 lines in stdout but was 2".to_string()]
    );
}

#[test]
fn test_no_lines() {
    let mut a = NoLines::new();
    assert!(run(&mut a, &[]).is_empty());

    let mut a = NoLines::new();
    let failures = run(&mut a, &["oops"]);
    assert_eq!(
        failures,
        vec!["Expected no lines in stdout but found 1 line".to_string()]
    );
}

#[test]
fn test_log_lines_observes_everything_and_never_fails() {
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut a = LogLines::new(move |line: &str| sink.lock().unwrap().push(line.to_string()));
    assert!(run(&mut a, &["a", "b"]).is_empty());
    assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_byte_count_default_message() {
    let a = ByteCountAssert::new(10, None);
    let mut collector = Collector::new();
    a.evaluate(StreamTag::Stderr, 0, &mut collector);
    let report = collector.render("cmd").expect("failure");
    assert!(report.contains("Expected byte count 10 in stderr but was 0"));
}

#[test]
fn test_byte_count_satisfied_is_silent() {
    let a = ByteCountAssert::new(4, None);
    let mut collector = Collector::new();
    a.evaluate(StreamTag::Stdout, 4, &mut collector);
    assert!(collector.is_empty());
}

#[test]
fn test_byte_count_template() {
    let a = ByteCountAssert::new(1, Some("${stream} had ${actual} bytes".into()));
    let mut collector = Collector::new();
    a.evaluate(StreamTag::Stdout, 7, &mut collector);
    let report = collector.render("cmd").expect("failure");
    assert!(report.contains("stdout had 7 bytes"));
}

#[test]
fn test_highlight_helper() {
    assert_eq!(highlight("abcdef", 2, 4), "ab>>cd<<ef");
    assert_eq!(highlight("x", 0, 1), ">>x<<");
}

#[test]
fn test_find_case_insensitive_multibyte() {
    let (start, end) = find_case_insensitive("naïve TEXT here", "text").expect("span");
    assert_eq!(&"naïve TEXT here"[start..end], "TEXT");
}
