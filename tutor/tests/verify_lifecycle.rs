//! Lifecycle tests for `verify` and `run`.
//!
//! These drive the orchestration with a scripted setup loader, verifier and
//! presenter over a scratch tutorial on disk, and check the ordering of side
//! effects a learner can observe: what is printed, when the teardown runs and
//! what ends up in the progress store.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use tutor::core::command::ModUseTrack;
use tutor::core::progress::Progress;
use tutor::core::types::{FailKind, Outcome, RunMode, VerifierEvent, VerifyOutcome};
use tutor::io::setup::SetupDescriptor;
use tutor::io::store::ProgressStore;
use tutor::io::verifier::CapturedOutput;
use tutor::test_support::{
    Event, EventLog, RecordingPresenter, ScriptedSetupLoader, ScriptedVerifier, TestTutorial,
};
use tutor::verify::{NoActiveProblemError, VerifyRequest, verify_current};

const PROBLEMS: [&str; 5] = [
    "Get Git",
    "Repository",
    "Commit To It",
    "Githubbin",
    "Remote Control",
];

fn verify_request() -> VerifyRequest {
    VerifyRequest {
        mode: RunMode::Verify,
        submission_file: None,
    }
}

/// Setup whose close callback leaves a `close` marker in `log`.
fn closing_setup(log: &EventLog) -> ScriptedSetupLoader {
    let log = log.clone();
    ScriptedSetupLoader::sync(move |_mode: RunMode| {
        let log = log.clone();
        Ok(SetupDescriptor {
            close: Some(Box::new(move || log.push(Event::Marker("close".to_string())))),
            ..SetupDescriptor::default()
        })
    })
}

fn index_of(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("event not found in {events:#?}"))
}

/// Five problems, three already completed, the fourth passes:
/// passed → solutions → progress (1 left) → close, and the store keeps all four.
#[test]
fn pass_records_completion_then_reports_remaining() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    for name in ["Get Git", "Repository", "Commit To It"] {
        tutorial.store.mark_completed(name).expect("seed completed");
    }
    tutorial.store.set_current("Githubbin").expect("set current");

    let log = EventLog::default();
    let loader = closing_setup(&log);
    let verifier = ScriptedVerifier::outcome(Outcome::Pass).with_log(log.clone());
    let mut presenter = RecordingPresenter::new(log.clone());

    let outcome = verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert_eq!(outcome, VerifyOutcome::Passed);

    let events = log.events();
    assert_eq!(
        events,
        vec![
            Event::Starting(RunMode::Verify, "Githubbin".to_string()),
            Event::VerifierStarted,
            Event::Passed("Githubbin".to_string()),
            Event::Solutions(vec!["solution.sh".to_string()]),
            Event::Progress(Progress::Remaining(1)),
            Event::Marker("close".to_string()),
        ]
    );

    let reopened = fixture.store().expect("reopen store");
    assert_eq!(
        reopened.completed(),
        vec!["Get Git", "Repository", "Commit To It", "Githubbin"]
    );
    assert_eq!(loader.loads(), vec![fixture.problem_dir("Githubbin")]);
}

#[test]
fn last_pass_reports_finished() {
    let fixture = TestTutorial::new(&["Only One"]).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Only One").expect("set current");

    let log = EventLog::default();
    let loader = ScriptedSetupLoader::sync(|_mode: RunMode| Ok(SetupDescriptor::default()));
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::new(log.clone());

    verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert!(log.events().contains(&Event::Progress(Progress::Finished)));
}

/// A fail tears down before the message and never touches `completed`.
#[test]
fn fail_closes_before_message_and_keeps_progress() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.mark_completed("Get Git").expect("seed");
    tutorial.store.set_current("Repository").expect("set current");

    let log = EventLog::default();
    let loader = closing_setup(&log);
    let verifier = ScriptedVerifier::outcome(Outcome::Fail);
    let mut presenter = RecordingPresenter::new(log.clone());

    let outcome = verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert_eq!(outcome, VerifyOutcome::Failed);

    let events = log.events();
    let close = index_of(&events, |e| matches!(e, Event::Marker(m) if m == "close"));
    let failed = index_of(&events, |e| {
        *e == Event::Failed("Repository".to_string(), FailKind::OutputMismatch)
    });
    assert!(close < failed, "close must run before the fail message");
    assert!(!events.iter().any(|e| matches!(e, Event::Passed(_) | Event::Progress(_))));
    assert_eq!(fixture.store().expect("store").completed(), vec!["Get Git"]);
}

#[test]
fn custom_comparator_changes_fail_message() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let log = EventLog::default();
    let loader = ScriptedSetupLoader::sync(|_mode: RunMode| {
        Ok(SetupDescriptor {
            verify: Some(Arc::new(|_a: &CapturedOutput, _b: &CapturedOutput| false)),
            ..SetupDescriptor::default()
        })
    });
    let verifier = ScriptedVerifier::outcome(Outcome::Fail);
    let mut presenter = RecordingPresenter::new(log.clone());

    verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert!(
        log.events()
            .contains(&Event::Failed("Get Git".to_string(), FailKind::Custom))
    );
    assert!(verifier.calls()[0].custom);
}

/// An asynchronous setup error is reported and nothing is executed.
#[test]
fn async_setup_error_runs_nothing() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let log = EventLog::default();
    let loader = ScriptedSetupLoader::failing("fixture server did not start");
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::new(log.clone());

    let outcome = verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert_eq!(outcome, VerifyOutcome::SetupFailed);
    assert!(verifier.calls().is_empty());
    assert_eq!(
        log.events(),
        vec![Event::SetupFailed("fixture server did not start".to_string())]
    );
    assert!(fixture.store().expect("store").completed().is_empty());
}

#[test]
fn deferred_setup_descriptor_is_used() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let loader = ScriptedSetupLoader::deferred(|_mode: RunMode| {
        Ok(SetupDescriptor {
            args: Some(vec!["--port".to_string(), "9000".to_string()]),
            ..SetupDescriptor::default()
        })
    });
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::default();

    let outcome = verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert_eq!(outcome, VerifyOutcome::Passed);
    let call = &verifier.calls()[0];
    assert_eq!(&call.submission.argv()[1..], ["--port", "9000"]);
    assert_eq!(&call.solution.argv()[1..], ["--port", "9000"]);
}

#[test]
fn sync_setup_error_is_fatal() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let loader = ScriptedSetupLoader::sync(|_mode: RunMode| Err(anyhow!("broken setup")));
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::default();

    let err = verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect_err("sync setup errors propagate");
    assert!(format!("{err:#}").contains("broken setup"));
    assert!(verifier.calls().is_empty());
}

#[test]
fn missing_setup_unit_is_an_error() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let loader = ScriptedSetupLoader::missing();
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::default();

    assert!(
        verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request()).is_err()
    );
}

/// No `current`: usage error, and neither setup nor store is touched.
#[test]
fn no_active_problem_is_a_usage_error() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");

    let loader = ScriptedSetupLoader::sync(|_mode: RunMode| Ok(SetupDescriptor::default()));
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let log = EventLog::default();
    let mut presenter = RecordingPresenter::new(log.clone());

    let err = verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect_err("no current problem");
    assert!(err.downcast_ref::<NoActiveProblemError>().is_some());
    assert!(loader.loads().is_empty());
    assert!(verifier.calls().is_empty());
    assert!(log.events().is_empty());

    let store = fixture.store().expect("store");
    assert_eq!(store.current(), None);
    assert!(store.completed().is_empty());
}

#[test]
fn hidden_solutions_still_record_completion() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let log = EventLog::default();
    let loader = ScriptedSetupLoader::sync(|_mode: RunMode| {
        Ok(SetupDescriptor {
            hide_solutions: true,
            ..SetupDescriptor::default()
        })
    });
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::new(log.clone());

    verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert!(!log.events().iter().any(|e| matches!(e, Event::Solutions(_))));
    assert_eq!(fixture.store().expect("store").completed(), vec!["Get Git"]);
}

#[test]
fn setup_stdin_reaches_the_session() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let loader = ScriptedSetupLoader::sync(|_mode: RunMode| {
        Ok(SetupDescriptor {
            stdin: Some(Box::new(Cursor::new(b"line one\nline two\n".to_vec()))),
            a: Some(Box::new(Cursor::new(b"precomputed".to_vec()))),
            ..SetupDescriptor::default()
        })
    });
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::default();

    verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert_eq!(verifier.stdin(), b"line one\nline two\n");
    let call = &verifier.calls()[0];
    assert!(call.supplied_a);
    assert!(!call.supplied_b);
}

/// Module tracking wins over exec wrapping for the submission.
#[test]
fn submission_wrapping_reaches_the_verifier() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let loader = ScriptedSetupLoader::sync(|_mode: RunMode| {
        Ok(SetupDescriptor {
            exec_wrap: Some(vec!["NODE_ENV=test".to_string()]),
            mod_use_track: Some(ModUseTrack {
                track_file: "/tmp/track.json".to_string(),
                modules: vec!["fs".to_string(), "http".to_string()],
            }),
            ..SetupDescriptor::default()
        })
    });
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::default();

    verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    let call = &verifier.calls()[0];
    let dir = fixture.problem_dir("Get Git");
    assert_eq!(
        call.submission.argv(),
        [
            "env".to_string(),
            "module-use-tracker".to_string(),
            "/tmp/track.json".to_string(),
            "fs,http".to_string(),
            dir.join("verify").to_string_lossy().into_owned(),
        ]
    );
    assert_eq!(
        call.solution.argv(),
        [dir.join("solution").to_string_lossy().into_owned()]
    );
}

/// In run mode the `End` signal also requests teardown; it still runs once.
#[test]
fn run_mode_closes_exactly_once() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let closes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closes);
    let loader = ScriptedSetupLoader::sync(move |_mode: RunMode| {
        let counter = Arc::clone(&counter);
        Ok(SetupDescriptor {
            close: Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..SetupDescriptor::default()
        })
    });
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let log = EventLog::default();
    let mut presenter = RecordingPresenter::new(log.clone());

    let request = VerifyRequest {
        mode: RunMode::Run,
        submission_file: Some("mine.sh".into()),
    };
    let outcome =
        verify_current(&tutorial, &loader, &verifier, &mut presenter, &request).expect("run");
    assert_eq!(outcome, VerifyOutcome::Passed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(verifier.calls()[0].mode, RunMode::Run);
    assert_eq!(verifier.calls()[0].submission.argv(), ["mine.sh".to_string()]);
    assert_eq!(
        log.events()[0],
        Event::Starting(RunMode::Run, "Get Git".to_string())
    );
}

#[test]
fn end_before_outcome_still_closes_in_run_mode() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let log = EventLog::default();
    let loader = closing_setup(&log);
    let verifier = ScriptedVerifier::new(vec![
        VerifierEvent::End,
        VerifierEvent::Completed(Outcome::Fail),
    ]);
    let mut presenter = RecordingPresenter::new(log.clone());

    let request = VerifyRequest {
        mode: RunMode::Run,
        submission_file: None,
    };
    let outcome =
        verify_current(&tutorial, &loader, &verifier, &mut presenter, &request).expect("run");
    assert_eq!(outcome, VerifyOutcome::Failed);
    let closes = log
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Marker(m) if m == "close"))
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn verifier_without_outcome_is_an_error() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Get Git").expect("set current");

    let log = EventLog::default();
    let loader = closing_setup(&log);
    let verifier = ScriptedVerifier::new(vec![VerifierEvent::End]);
    let mut presenter = RecordingPresenter::new(log.clone());

    assert!(
        verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request()).is_err()
    );
    assert!(fixture.store().expect("store").completed().is_empty());
    // The aborted attempt still tears down what setup started.
    assert_eq!(
        log.events()
            .iter()
            .filter(|e| matches!(e, Event::Marker(m) if m == "close"))
            .count(),
        1
    );
}

/// The close callback already sees the new `completed` document on disk.
#[test]
fn completion_is_persisted_before_close() {
    let fixture = TestTutorial::new(&PROBLEMS).expect("fixture");
    let tutorial = fixture.open().expect("open");
    tutorial.store.set_current("Repository").expect("set current");

    let log = EventLog::default();
    let close_log = log.clone();
    let data_dir = fixture.data_dir().to_path_buf();
    let loader = ScriptedSetupLoader::sync(move |_mode: RunMode| {
        let log = close_log.clone();
        let data_dir = data_dir.clone();
        Ok(SetupDescriptor {
            close: Some(Box::new(move || {
                let completed = ProgressStore::open(&data_dir)
                    .map(|store| store.completed())
                    .unwrap_or_default();
                log.push(Event::Marker(format!("close saw {}", completed.join(","))));
            })),
            ..SetupDescriptor::default()
        })
    });
    let verifier = ScriptedVerifier::outcome(Outcome::Pass);
    let mut presenter = RecordingPresenter::new(log.clone());

    verify_current(&tutorial, &loader, &verifier, &mut presenter, &verify_request())
        .expect("verify");
    assert!(log.marker("close saw Repository").is_some(), "{:#?}", log.events());
}
