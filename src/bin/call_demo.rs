use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use std::{env, process};

use rustycall::config::{AudioBackend, CallSettings, Config};
use rustycall::core::{CallController, CallNotice, Roster};
use rustycall::log::log_sink::LogSink;
use rustycall::log::logger::Logger;
use rustycall::media::{AudioFrame, CpalMediaDevices, FakeDevices, MediaDevices};
use rustycall::negotiation::LoopbackFactory;
use rustycall::signaling::{CandidateSet, MemoryStore, SignalingStore, paths::calls_collection};

const SESSION: &str = "s1";
const STUDENT: &str = "u-student";
const COUNSELLOR: &str = "u-counsellor";

fn main() {
    // --- Load config -------------------------------------------------------
    //
    //   cargo run --bin call_demo
    //      -> built-in defaults
    //
    //   cargo run --bin call_demo -- call_default.conf
    //      -> settings from the given file; `[Audio] device = cpal`
    //         captures the student's side from the default microphone
    let args: Vec<String> = env::args().collect();
    let settings = match args.get(1) {
        None => CallSettings::default(),
        Some(path) => match Config::load(path).and_then(|c| CallSettings::from_config(&c)) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[call_demo] {e}");
                process::exit(1);
            }
        },
    };

    // --- Start process logger ----------------------------------------------
    let logger = Logger::from_settings(&settings, 1024);
    let log: Arc<dyn LogSink> = Arc::new(logger.handle());
    eprintln!("[call_demo] logging to {}", logger.file_path().display());

    if let Err(e) = run(&settings, log) {
        eprintln!("[call_demo] {e}");
        process::exit(1);
    }
}

fn run(settings: &CallSettings, log: Arc<dyn LogSink>) -> Result<(), rustycall::call::CallError> {
    let store = Arc::new(MemoryStore::with_log(log.clone()));
    let factory = Arc::new(LoopbackFactory::new());
    let roster = Roster::new()
        .with(STUDENT, "Student")
        .with(COUNSELLOR, "Counsellor");

    let (frames_tx, frames_rx) = mpsc::channel();
    let mut student = CallController::new(
        SESSION,
        STUDENT,
        store.clone(),
        factory.clone(),
        student_devices(settings, &log, frames_tx),
        settings,
        log.clone(),
    )?;
    let mut counsellor = CallController::new(
        SESSION,
        COUNSELLOR,
        store.clone(),
        factory.clone(),
        Box::new(FakeDevices::granting()),
        settings,
        log,
    )?;

    let t0 = Instant::now();
    let call_id = student.start_call()?;
    pump(t0, &mut student, &mut counsellor);
    println!("student   : {:?}", student.view_at(t0, &roster));
    println!("counsellor: {:?}", counsellor.view_at(t0, &roster));

    counsellor.accept_call()?;
    pump(t0, &mut student, &mut counsellor);

    let t1 = t0 + Duration::from_secs(42);
    println!("student   : {:?}", student.view_at(t1, &roster));
    if let Some(stats) = factory.stats(&call_id) {
        println!("transport : {stats:?}");
    }
    println!("muted     : {}", student.toggle_mute());
    println!("muted     : {}", student.toggle_mute());
    if settings.audio.backend == AudioBackend::Cpal {
        std::thread::sleep(Duration::from_millis(500));
    }
    report_frames(&frames_rx);

    counsellor.end_call_at(t1)?;
    pump(t1, &mut student, &mut counsellor);
    let call_doc = calls_collection(SESSION).doc(&call_id);
    println!(
        "after end : record present = {}",
        store.get(&call_doc)?.is_some()
    );

    pump(t1 + settings.cleanup_grace, &mut student, &mut counsellor);
    let leftovers: usize = CandidateSet::ALL
        .iter()
        .map(|set| store.count(&set.under(&call_doc)))
        .sum();
    println!(
        "after grace: record present = {}, candidates left = {}",
        store.get(&call_doc)?.is_some(),
        leftovers
    );

    student.leave_session();
    counsellor.leave_session();
    Ok(())
}

fn student_devices(
    settings: &CallSettings,
    log: &Arc<dyn LogSink>,
    frames: Sender<AudioFrame>,
) -> Box<dyn MediaDevices> {
    match settings.audio.backend {
        AudioBackend::Fake => Box::new(FakeDevices::granting()),
        AudioBackend::Cpal => Box::new(CpalMediaDevices::new(log.clone()).with_frame_sink(frames)),
    }
}

fn report_frames(frames: &Receiver<AudioFrame>) {
    let captured: Vec<AudioFrame> = frames.try_iter().collect();
    if let Some(last) = captured.last() {
        println!(
            "captured  : {} frames of {} samples at {} Hz",
            captured.len(),
            last.samples,
            last.sample_rate
        );
    }
}

/// Polls both peers a few rounds so writes by one reach the other.
fn pump(at: Instant, a: &mut CallController, b: &mut CallController) {
    for _ in 0..3 {
        for n in a.poll_at(at) {
            print_notice(a.local_id(), &n);
        }
        for n in b.poll_at(at) {
            print_notice(b.local_id(), &n);
        }
    }
}

fn print_notice(who: &str, notice: &CallNotice) {
    println!("[{who}] {notice}");
}
