use std::{
    fs,
    io::{BufReader, Write},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use chrono::{DateTime, Utc};
use junit_ingest::junit::{
    capture::{CapturePolicy, DEFAULT_LIMIT_BYTES},
    codec,
    diagnostics::{Diagnostic, RecoverableDialectQuirk},
    parser::{self, MalformedReportError, ReportError, ReportParser, ReportShape},
    record::{CaseStatus, SuiteRecord},
};
use junit_mock::{JunitMock, Layout};
use pretty_assertions::assert_eq;
use quick_junit::{NonSuccessKind, Report, TestCaseStatus};
use tempfile::TempDir;

fn data_file<T: AsRef<Path>>(name: T) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

fn parse_one<T: AsRef<Path>>(path: T) -> SuiteRecord {
    let mut suites = parser::parse(path, false).unwrap();
    assert_eq!(suites.len(), 1);
    suites.pop().unwrap()
}

fn parse_str(xml: &str) -> Result<parser::ParsedReport, MalformedReportError> {
    ReportParser::new(CapturePolicy::new(true)).parse(BufReader::new(xml.as_bytes()))
}

#[test]
fn per_case_class_names_are_kept() {
    let suite = parse_one(data_file("junit-report-1233.xml"));

    let class_names: Vec<&str> = suite.cases().iter().map(|c| c.class_name()).collect();
    assert_eq!(
        class_names,
        vec![
            "test.foo.bar.DefaultIntegrationTest",
            "test.foo.bar.BundleResolverIntegrationTest",
            "test.foo.bar.BundleResolverIntegrationTest",
            "test.foo.bar.ProjectSettingsTest",
            "test.foo.bar.ProjectSettingsTest",
        ]
    );
    assert_eq!(suite.name(), "test.foo.bar.AllTests");
    assert_eq!(suite.duration(), Duration::from_millis(2_371));
    assert_eq!(
        suite.timestamp().map(|t| t.with_timezone(&Utc)),
        "2008-02-20T10:02:33Z".parse::<DateTime<Utc>>().ok()
    );
    assert_eq!(suite.stdout(), Some("Resolving bundles from local repository\n"));
    assert_eq!(suite.stderr(), Some(""));
}

#[test]
fn placeholder_suite_name_becomes_class_name() {
    let suite = parse_one(data_file("junit-report-1463.xml"));

    for case in suite.cases() {
        assert_eq!(
            case.class_name(),
            "WLI-FI-Tests-Fake",
            "class name of {}",
            case.display_name()
        );
    }
    let names: Vec<&str> = suite.cases().iter().map(|c| c.name()).collect();
    assert_eq!(
        names,
        vec![
            "IF_importTradeConfirmationToDwh",
            "IF_getAmartaDisbursements",
            "IF_importGLReconDataToDwh",
            "IF_importTradeInstructionsToDwh",
            "IF_getDeviationTradeInstructions",
            "IF_getDwhGLData",
        ]
    );
}

#[test]
fn concatenated_documents_yield_one_record_each() {
    let path = data_file("junit-report-1472.xml");
    let suites = parser::parse(&path, false).unwrap();

    assert!(suites.len() > 20);
    assert_eq!(suites[0].name(), "make_test.t_basic_lint_t");
    assert_eq!(suites[1].name(), "make_test.t_basic_meta_t");
    assert_ne!(suites[0].stdout(), suites[1].stdout());

    let report = parser::parse_with_policy(&path, CapturePolicy::default()).unwrap();
    assert_eq!(
        report.shape,
        ReportShape::Concatenated {
            documents: suites.len()
        }
    );
}

#[test]
fn single_suite_inside_wrapper() {
    let report =
        parser::parse_with_policy(data_file("junit-report-2874.xml"), CapturePolicy::default())
            .unwrap();
    assert_eq!(report.shape, ReportShape::MultiSuite);
    assert_eq!(report.suites.len(), 1);
    assert_eq!(report.suites[0].name(), "DummyTest");
    assert_eq!(report.suites[0].cases()[0].display_name(), "DummyTest.testNothing");
    assert!(report.diagnostics.is_empty());
}

#[test]
fn failure_message_becomes_error_details() {
    let suite = parse_one(data_file("junit-report-errror-details.xml"));

    for case in suite.cases() {
        assert_eq!(case.class_name(), "some.package.somewhere.WhooHoo");
    }
    assert_eq!(suite.cases()[0].status(), CaseStatus::Failed);
    assert_eq!(
        suite.cases()[0].error_details(),
        Some("this normally has the string like, expected mullet, but got bream")
    );
    assert_eq!(suite.cases()[1].status(), CaseStatus::Passed);
    assert_eq!(suite.cases()[1].error_details(), None);
    assert_eq!(suite.failed_count(), 1);
}

#[test]
fn suite_level_failures_are_synthesized_into_cases() {
    let suites = parser::parse(data_file("junit-report-suite-error.xml"), false).unwrap();
    let names: Vec<&str> = suites.iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        vec![
            "org.example.BrokenSetupTest",
            "org.example.DeclaredOnlyTest",
            "org.example.HealthyTest",
        ]
    );

    let broken = &suites[0];
    assert_eq!(broken.cases().len(), 1);
    assert_eq!(broken.cases()[0].name(), "<init>");
    assert_eq!(broken.cases()[0].class_name(), "org.example.BrokenSetupTest");
    assert_eq!(broken.cases()[0].status(), CaseStatus::Errored);
    assert!(
        broken.cases()[0]
            .error_details()
            .unwrap_or_default()
            .starts_with("java.lang.ExceptionInInitializerError\n\tat ")
    );

    let declared = &suites[1];
    assert_eq!(declared.cases().len(), 1);
    assert_eq!(declared.cases()[0].status(), CaseStatus::Failed);
    assert!(!declared.cases()[0].error_details().unwrap_or_default().is_empty());

    let healthy = &suites[2];
    assert_eq!(healthy.cases().len(), 2);
    assert_eq!(healthy.case("second").map(|c| c.status()), Some(CaseStatus::Skipped));
    assert_eq!(
        healthy.case("second").and_then(|c| c.skipped_message()),
        Some("not on this platform")
    );
}

#[test]
fn mixed_dialects_are_normalized() {
    let report =
        parser::parse_with_policy(data_file("junit-report-dialects.xml"), CapturePolicy::default())
            .unwrap();
    assert_eq!(report.shape, ReportShape::MultiSuite);

    let names: Vec<&str> = report.suites.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["com.example.ParserTest", "Inner", "Outer", "mixed"]);

    let parser_test = &report.suites[0];
    assert!(parser_test.timestamp().is_some());
    assert_eq!(parser_test.duration(), Duration::from_millis(1_250_500));

    let empty_input = &parser_test.cases()[0];
    assert_eq!(empty_input.name(), "parsesEmptyInput");
    assert_eq!(empty_input.class_name(), "com.example.ParserTest");
    assert_eq!(empty_input.duration(), Duration::from_millis(250));

    let garbage = &parser_test.cases()[1];
    assert_eq!(garbage.status(), CaseStatus::Errored);
    assert_eq!(garbage.duration(), Duration::ZERO);
    assert_eq!(garbage.class_name(), "com.example.ParserTest");
    assert!(
        garbage
            .error_details()
            .unwrap_or_default()
            .starts_with("java.lang.NullPointerException")
    );

    let ignored = &parser_test.cases()[2];
    assert_eq!(ignored.status(), CaseStatus::Skipped);
    assert_eq!(ignored.skipped_message(), None);

    let logs = &parser_test.cases()[3];
    assert_eq!(logs.stdout(), Some("line one & line two<more>"));

    assert_eq!(report.suites[1].cases()[0].name(), "deep");
    assert_eq!(report.suites[2].cases().len(), 1);
    assert_eq!(report.suites[2].cases()[0].name(), "shallow");
    assert_eq!(report.suites[3].cases()[0].display_name(), "com.example.Loose.loose");

    let quirks: Vec<&RecoverableDialectQuirk> =
        report.diagnostics.iter().map(|d| &d.quirk).collect();
    assert!(quirks.contains(&&RecoverableDialectQuirk::DurationUnparsable(
        "not-a-number".into()
    )));
    assert!(quirks.contains(&&RecoverableDialectQuirk::DuplicateDetail("failure")));
    assert!(quirks.contains(&&RecoverableDialectQuirk::ImplicitSuite));

    let duplicate = report
        .diagnostics
        .iter()
        .find(|d| d.quirk == RecoverableDialectQuirk::DuplicateDetail("failure"))
        .unwrap();
    assert_eq!((duplicate.suite, duplicate.case), (Some(0), Some(1)));
}

#[test]
fn declared_encodings_are_decoded() {
    let report =
        parser::parse_with_policy(data_file("junit-report-utf16.xml"), CapturePolicy::default())
            .unwrap();
    assert_eq!(report.shape, ReportShape::MultiSuite);
    let suite = &report.suites[0];
    assert_eq!(suite.name(), "Überprüfung");
    assert_eq!(suite.stdout(), Some("Ausgabe mit Umlauten: äöü"));
    let names: Vec<&str> = suite.cases().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["grüße", "größe"]);
    assert_eq!(suite.cases()[1].class_name(), "de.example.Überprüfung");
    assert_eq!(
        suite.cases()[1].error_details(),
        Some("AssertionError: erwartet 3, erhalten 4")
    );

    let report =
        parser::parse_with_policy(data_file("junit-report-latin1.xml"), CapturePolicy::default())
            .unwrap();
    assert_eq!(report.shape, ReportShape::SingleSuite);
    let suite = &report.suites[0];
    assert_eq!(suite.name(), "CaféTest");
    assert_eq!(suite.stderr(), Some("déjà vu"));
    assert_eq!(suite.cases()[0].name(), "crème");
    assert_eq!(suite.cases()[1].name(), "brûlée");
    assert_eq!(suite.cases()[1].error_details(), Some("attendu 90°, reçu 60°"));
}

#[test]
fn utf16_without_byte_order_mark() {
    let xml = "<?xml version=\"1.0\" encoding=\"UTF-16BE\"?>\n\
        <testsuite name=\"Größe\"><testcase name=\"t\" classname=\"C\"/></testsuite>";
    let bytes: Vec<u8> = xml.encode_utf16().flat_map(u16::to_be_bytes).collect();

    let report = ReportParser::new(CapturePolicy::default())
        .parse(bytes.as_slice())
        .unwrap();
    assert_eq!(report.shape, ReportShape::SingleSuite);
    assert_eq!(report.suites[0].name(), "Größe");
    assert_eq!(report.suites[0].cases()[0].display_name(), "C.t");
}

#[test]
fn attribute_syntax_errors_are_malformed() {
    assert!(matches!(
        parse_str("<testsuite name=S><testcase name=\"t\"/></testsuite>"),
        Err(MalformedReportError::Markup { .. })
    ));
    assert!(matches!(
        parse_str("<testsuite name=\"S\"><testcase name=\"t\" name=\"u\"/></testsuite>"),
        Err(MalformedReportError::Markup { .. })
    ));
}

#[test]
fn suites_wrapping_only_suites_are_not_emitted() {
    let report = parse_str(
        "<testsuite name=\"all\"><testsuite name=\"A\"><testcase name=\"t\"/></testsuite></testsuite>",
    )
    .unwrap();
    assert_eq!(report.shape, ReportShape::SingleSuite);
    let names: Vec<&str> = report.suites.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["A"]);
    assert!(
        report
            .diagnostics
            .contains(&Diagnostic::new(RecoverableDialectQuirk::ContainerSuite(
                "all".into()
            )))
    );

    let report = parse_str(
        r#"<testsuite name="all" failures="1">
             <testsuite name="A" failures="1">
               <testcase name="t" classname="A"><failure>boom</failure></testcase>
             </testsuite>
             <testsuite name="B"><testcase name="u" classname="B"/></testsuite>
           </testsuite>"#,
    )
    .unwrap();
    let names: Vec<&str> = report.suites.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(report.suites[0].cases().len(), 1);
    assert_eq!(report.suites[0].cases()[0].error_details(), Some("boom"));
}

#[test]
fn malformed_report_names_the_file() {
    let path = data_file("junit-report-malformed.xml");
    let err = parser::parse(&path, false).unwrap_err();

    assert!(matches!(
        err,
        ReportError::Malformed {
            source: MalformedReportError::Markup { .. },
            ..
        }
    ));
    assert!(err.to_string().contains("junit-report-malformed.xml"));
}

#[test]
fn missing_file_is_an_open_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.xml");
    let err = parser::parse(&path, false).unwrap_err();
    assert!(matches!(err, ReportError::Open { .. }));
    assert!(err.to_string().contains("missing.xml"));
}

#[test]
fn not_well_formed_input_is_rejected() {
    assert!(matches!(
        parse_str(""),
        Err(MalformedReportError::NoRootElement)
    ));
    assert!(matches!(
        parse_str("<?xml version=\"1.0\"?>\n<!-- nothing here -->\n"),
        Err(MalformedReportError::NoRootElement)
    ));
    assert!(matches!(
        parse_str("<testsuite name=\"open\"><testcase name=\"t\"/>"),
        Err(MalformedReportError::UnclosedElement(..) | MalformedReportError::Markup { .. })
    ));
    assert!(matches!(
        parse_str("<testsuite><testcase></testsuite>"),
        Err(MalformedReportError::Markup { .. })
    ));
}

#[test]
fn unrecognized_root_is_not_an_error() {
    let report = parse_str("<results><testsuite name=\"S\"/></results>").unwrap();
    assert_eq!(report.shape, ReportShape::Unrecognized);
    assert_eq!(report.suites.len(), 1);

    let report = parse_str("<coverage line-rate=\"0.5\"/>").unwrap();
    assert!(report.suites.is_empty());
}

#[test]
fn suite_stdio_is_trimmed() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stdio-trimming.xml");
    {
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "<testsuites name='x'>").unwrap();
        writeln!(file, "<testsuite failures='0' errors='0' tests='1' name='x'>").unwrap();
        writeln!(file, "<testcase name='x' classname='x'/>").unwrap();
        writeln!(file, "<system-out/>").unwrap();
        write!(file, "<system-err><![CDATA[").unwrap();
        writeln!(file, "First line is intact.").unwrap();
        for i in 0..100 {
            writeln!(file, "Line #{i} might be elided.").unwrap();
        }
        writeln!(file, "Last line is intact.").unwrap();
        writeln!(file, "]]></system-err>").unwrap();
        writeln!(file, "</testsuite>").unwrap();
        writeln!(file, "</testsuites>").unwrap();
    }

    let suite = parse_one(&path);
    let stderr = suite.stderr().unwrap();
    assert_eq!(stderr.len(), 1028);
    assert!(stderr.len() <= DEFAULT_LIMIT_BYTES);
    assert!(stderr.starts_with("First line is intact.\n"));
    assert!(stderr.ends_with("Last line is intact.\n"));
    assert_eq!(suite.stdout(), Some(""));

    let kept = parser::parse(&path, true).unwrap();
    assert_eq!(kept[0].stderr().map(str::len), Some(2633));
}

#[test]
fn suite_record_persistence() {
    let source = parse_one(data_file("junit-report-1233.xml"));

    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("suite-record.xml");
    codec::write_suite(&source, fs::File::create(&dest).unwrap()).unwrap();
    let result = codec::read_suite(BufReader::new(fs::File::open(&dest).unwrap())).unwrap();

    assert_eq!(result.name(), source.name());
    assert_eq!(result.timestamp(), source.timestamp());
    assert_eq!(result.duration(), source.duration());
    assert_eq!(result.stderr(), source.stderr());
    assert_eq!(result.stdout(), source.stdout());
    assert_eq!(result.cases().len(), source.cases().len());
    assert!(result.case("testGetBundle").is_some());
    assert_eq!(result, source);
}

fn mock_options(seed: u64, test_suite_count: usize, layout: Layout) -> junit_mock::Options {
    let mut options = junit_mock::Options::default();
    options.global.seed = Some(seed);
    options.global.timestamp = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").ok();
    options.report.report_layout = layout;
    options.test_suite.test_suite_random_count = test_suite_count;
    options.test_case.test_case_random_count = 5;
    options.test_case.test_case_duration_range =
        vec![Duration::from_secs(1).into(), Duration::from_secs(2).into()];
    options
}

fn generate_report(options: junit_mock::Options) -> Report {
    let mut jm = JunitMock::new(options);
    jm.generate_reports().remove(0)
}

fn parse_mock(report: &Report, layout: Layout) -> parser::ParsedReport {
    let xml = junit_mock::report_to_string(report, layout).unwrap();
    parse_str(&xml).unwrap()
}

#[test]
fn wrapped_mock_reports_keep_suite_order() {
    for seed in 0..8 {
        let suite_count = (seed as usize % 5) + 1;
        let mock = generate_report(mock_options(seed, suite_count, Layout::Wrapped));
        let report = parse_mock(&mock, Layout::Wrapped);

        assert_eq!(report.shape, ReportShape::MultiSuite, "seed {seed}");
        let expected: Vec<&str> = mock.test_suites.iter().map(|s| s.name.as_str()).collect();
        let actual: Vec<&str> = report.suites.iter().map(|s| s.name()).collect();
        assert_eq!(actual, expected, "seed {seed}");

        for (mock_suite, suite) in mock.test_suites.iter().zip(&report.suites) {
            assert_eq!(suite.cases().len(), mock_suite.test_cases.len());
            assert_eq!(
                suite.stdout(),
                mock_suite.system_out.as_ref().map(|out| out.as_str())
            );
            for (mock_case, case) in mock_suite.test_cases.iter().zip(suite.cases()) {
                assert_eq!(case.name(), mock_case.name.as_str());
                let expected_status = match &mock_case.status {
                    TestCaseStatus::Success { .. } => CaseStatus::Passed,
                    TestCaseStatus::Skipped { .. } => CaseStatus::Skipped,
                    TestCaseStatus::NonSuccess {
                        kind: NonSuccessKind::Failure,
                        ..
                    } => CaseStatus::Failed,
                    TestCaseStatus::NonSuccess {
                        kind: NonSuccessKind::Error,
                        ..
                    } => CaseStatus::Errored,
                };
                assert_eq!(case.status(), expected_status);
                if let TestCaseStatus::NonSuccess {
                    description: Some(description),
                    ..
                } = &mock_case.status
                {
                    assert_eq!(case.error_details(), Some(description.as_str()));
                }
            }
        }
    }
}

#[test]
fn mock_cases_without_class_names_use_the_suite_name() {
    let mut options = mock_options(42, 3, Layout::Wrapped);
    options.test_case.test_case_classname_percentage = 0;
    let mock = generate_report(options);
    let report = parse_mock(&mock, Layout::Wrapped);

    for suite in &report.suites {
        for case in suite.cases() {
            assert_eq!(case.class_name(), suite.name());
        }
    }
    assert!(
        report
            .diagnostics
            .iter()
            .all(|d| d.quirk == RecoverableDialectQuirk::ClassNameFromSuite)
    );
}

#[test]
fn concatenated_mock_documents_keep_their_own_stdout() {
    let mut options = mock_options(1472, 21, Layout::Concatenated);
    options.test_suite.test_suite_sys_out_percentage = 100;
    let mock = generate_report(options);
    let report = parse_mock(&mock, Layout::Concatenated);

    assert_eq!(report.shape, ReportShape::Concatenated { documents: 21 });
    assert_eq!(report.suites.len(), 21);
    for (mock_suite, suite) in mock.test_suites.iter().zip(&report.suites) {
        assert_eq!(suite.name(), mock_suite.name.as_str());
        assert_eq!(
            suite.stdout(),
            mock_suite.system_out.as_ref().map(|out| out.as_str())
        );
    }
    assert_ne!(report.suites[0].stdout(), report.suites[1].stdout());
}

#[test]
fn mock_suites_survive_persistence() {
    let mock = generate_report(mock_options(9, 4, Layout::Wrapped));
    for suite in parse_mock(&mock, Layout::Wrapped).suites {
        let xml = suite.to_xml_string().unwrap();
        assert_eq!(SuiteRecord::from_xml_str(&xml).unwrap(), suite);
    }
}

#[test]
fn parsing_is_thread_safe() {
    let files = [
        data_file("junit-report-1233.xml"),
        data_file("junit-report-1472.xml"),
        data_file("junit-report-suite-error.xml"),
    ];
    let expected: Vec<Vec<SuiteRecord>> = files
        .iter()
        .map(|path| parser::parse(path, false).unwrap())
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    files
                        .iter()
                        .map(|path| parser::parse(path, false).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
