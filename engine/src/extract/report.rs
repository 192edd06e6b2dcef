//! Structured test-report extraction from artifact archives.
//!
//! Walks a downloaded artifact archive, parses every XML entry that
//! looks like a JUnit-shaped report, and turns each test case into an
//! outcome candidate. Malformed entries are skipped, never fatal.

use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{EngineError, EngineResult};
use crate::extract::patterns::{classify_framework, classify_test_type, infer_environment};
use crate::extract::Extraction;
use crate::models::test_outcome::{NewTestOutcome, TestStatus};

/// Extract outcomes from one artifact archive (zip bytes).
///
/// The first XML entry that parses into at least one test case wins;
/// later entries are not consulted. `run_name` feeds environment and
/// classification fallbacks.
pub fn outcomes_from_archive(data: &[u8], run_name: Option<&str>) -> Extraction {
    let mut archive = match zip::ZipArchive::new(Cursor::new(data)) {
        Ok(archive) => archive,
        Err(e) => {
            tracing::warn!("Artifact is not a readable archive: {e}");
            return Extraction::empty();
        }
    };

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(index, "Skipping unreadable archive entry: {e}");
                continue;
            }
        };
        if !entry.name().to_lowercase().ends_with(".xml") {
            continue;
        }

        let mut xml = String::new();
        if let Err(e) = entry.read_to_string(&mut xml) {
            tracing::debug!(entry = entry.name(), "Skipping non-UTF8 entry: {e}");
            continue;
        }

        match parse_report(&xml, run_name) {
            Ok(outcomes) if !outcomes.is_empty() => {
                return Extraction {
                    outcomes,
                    confident: true,
                };
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(entry = entry.name(), "Skipping malformed report: {e}");
                continue;
            }
        }
    }

    Extraction::empty()
}

/// Parse a JUnit-shaped XML document into outcome candidates.
pub fn parse_report(xml: &str, run_name: Option<&str>) -> EngineResult<Vec<NewTestOutcome>> {
    let environment = run_name.map(infer_environment).unwrap_or("default");

    // Best-effort classification: the report text itself, then the
    // workflow run name.
    let framework = classify_framework(xml).or_else(|| run_name.and_then(classify_framework));
    let test_type = framework
        .map(|(_, test_type)| test_type)
        .or_else(|| classify_test_type(xml))
        .or_else(|| run_name.and_then(classify_test_type));

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut outcomes = Vec::new();
    let mut suite_name = "unknown".to_string();
    let mut case: Option<PendingCase> = None;
    let mut in_stacktrace = false;

    loop {
        match reader.read_event() {
            // Self-closing elements arrive as `Empty` but carry the
            // same attribute surface as `Start`.
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                match e.name().as_ref() {
                    b"testsuite" => {
                        suite_name = attr(&e, b"name").unwrap_or_else(|| "unknown".to_string());
                    }
                    b"testcase" => {
                        // Flush a dangling case before opening the next.
                        if let Some(done) = case.take() {
                            outcomes.push(done.into_outcome(
                                environment,
                                framework.map(|(name, _)| name),
                                test_type,
                            ));
                        }
                        case = Some(PendingCase {
                            suite: suite_name.clone(),
                            duration_secs: attr(&e, b"time").and_then(|t| t.parse().ok()),
                            failure: None,
                        });
                    }
                    b"failure" | b"error" => {
                        if let Some(pending) = case.as_mut() {
                            pending.failure.get_or_insert_with(|| FailureDetail {
                                message: attr(&e, b"message"),
                                text: String::new(),
                                explicit_stack: None,
                            });
                        }
                    }
                    b"stacktrace" => {
                        in_stacktrace = case
                            .as_ref()
                            .map(|pending| pending.failure.is_some())
                            .unwrap_or(false);
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| EngineError::MalformedEvidence(e.to_string()))?;
                append_text(&mut case, &text, in_stacktrace);
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                append_text(&mut case, &text, in_stacktrace);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                // Self-closing cases have no End event; they are
                // flushed here when their suite closes, or when the
                // next case opens.
                b"testcase" | b"testsuite" => {
                    if let Some(done) = case.take() {
                        outcomes.push(done.into_outcome(
                            environment,
                            framework.map(|(name, _)| name),
                            test_type,
                        ));
                    }
                }
                b"stacktrace" => in_stacktrace = false,
                _ => {}
            },
            Ok(Event::Eof) => {
                if let Some(done) = case.take() {
                    outcomes.push(done.into_outcome(
                        environment,
                        framework.map(|(name, _)| name),
                        test_type,
                    ));
                }
                break;
            }
            Ok(_) => {}
            Err(e) => return Err(EngineError::MalformedEvidence(e.to_string())),
        }
    }

    Ok(outcomes)
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn append_text(case: &mut Option<PendingCase>, text: &str, in_stacktrace: bool) {
    if let Some(failure) = case.as_mut().and_then(|pending| pending.failure.as_mut()) {
        if in_stacktrace {
            let stack = failure.explicit_stack.get_or_insert_with(String::new);
            if !stack.is_empty() {
                stack.push('\n');
            }
            stack.push_str(text);
        } else {
            if !failure.text.is_empty() {
                failure.text.push('\n');
            }
            failure.text.push_str(text);
        }
    }
}

struct FailureDetail {
    message: Option<String>,
    text: String,
    explicit_stack: Option<String>,
}

struct PendingCase {
    suite: String,
    duration_secs: Option<f64>,
    failure: Option<FailureDetail>,
}

impl PendingCase {
    fn into_outcome(
        self,
        environment: &str,
        framework: Option<&'static str>,
        test_type: Option<&'static str>,
    ) -> NewTestOutcome {
        let (status, error_message, stack_trace) = match self.failure {
            None => (TestStatus::Passed, None, None),
            Some(failure) => {
                // Most specific failure text available: element body,
                // then message attribute, then a generic marker.
                let message = if !failure.text.trim().is_empty() {
                    failure.text.trim().to_string()
                } else {
                    failure
                        .message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "Test failed".to_string())
                };

                let stack = failure.explicit_stack.or_else(|| {
                    let frames: Vec<&str> = message
                        .lines()
                        .filter(|line| line.trim_start().starts_with("at "))
                        .collect();
                    if frames.is_empty() {
                        None
                    } else {
                        Some(frames.join("\n"))
                    }
                });

                (TestStatus::Failed, Some(message), stack)
            }
        };

        NewTestOutcome {
            suite: self.suite,
            test_type: test_type.map(str::to_string),
            framework: framework.map(str::to_string),
            status,
            duration_secs: self.duration_secs,
            coverage: None,
            error_message,
            stack_trace,
            environment: environment.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    const REPORT: &str = r#"<?xml version="1.0"?>
<testsuites>
  <testsuite name="math" tests="3">
    <testcase name="adds" time="0.004"/>
    <testcase name="subtracts" time="0.002"/>
    <testcase name="divides" time="0.110">
      <failure message="expected 2 but got 3">expected 2 but got 3
    at Object.divide (src/math.js:10:5)
    at run (src/index.js:3:1)</failure>
    </testcase>
  </testsuite>
</testsuites>"#;

    #[test]
    fn parses_cases_with_status_and_duration() {
        let outcomes = parse_report(REPORT, Some("Unit Tests")).unwrap();
        assert_eq!(outcomes.len(), 3);

        assert_eq!(outcomes[0].status, TestStatus::Passed);
        assert_eq!(outcomes[0].suite, "math");
        assert_eq!(outcomes[0].duration_secs, Some(0.004));
        assert_eq!(outcomes[0].environment, "test");

        let failed = &outcomes[2];
        assert_eq!(failed.status, TestStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap().contains("expected 2 but got 3"));
    }

    #[test]
    fn stack_trace_is_the_at_lines_of_the_failure_text() {
        let outcomes = parse_report(REPORT, None).unwrap();
        let stack = outcomes[2].stack_trace.as_deref().unwrap();
        assert_eq!(
            stack,
            "    at Object.divide (src/math.js:10:5)\n    at run (src/index.js:3:1)"
        );
    }

    #[test]
    fn failure_without_text_falls_back_to_message_attribute() {
        let xml = r#"<testsuites><testsuite name="s"><testcase name="t"><failure message="boom"/></testcase></testsuite></testsuites>"#;
        let outcomes = parse_report(xml, None).unwrap();
        assert_eq!(outcomes[0].error_message.as_deref(), Some("boom"));
        assert_eq!(outcomes[0].stack_trace, None);
    }

    #[test]
    fn error_element_counts_as_failure() {
        let xml = r#"<testsuites><testsuite name="s"><testcase name="t"><error message="setup crashed"/></testcase></testsuite></testsuites>"#;
        let outcomes = parse_report(xml, None).unwrap();
        assert_eq!(outcomes[0].status, TestStatus::Failed);
    }

    #[test]
    fn archive_skips_malformed_entries_and_uses_the_valid_one() {
        let data = zip_with(&[
            ("broken.xml", "<testsuites><unclosed"),
            ("results.xml", REPORT),
            ("notes.txt", "not xml"),
        ]);
        let extraction = outcomes_from_archive(&data, Some("Unit Tests"));
        assert!(extraction.confident);
        assert_eq!(extraction.outcomes.len(), 3);
    }

    #[test]
    fn non_archive_bytes_yield_nothing() {
        let extraction = outcomes_from_archive(b"definitely not a zip", None);
        assert!(!extraction.confident);
        assert!(extraction.outcomes.is_empty());
    }
}
