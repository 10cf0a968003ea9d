use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

const CAPTURE_SEED: u64 = 1;

const NORMAL_START: TranscriptProfile = TranscriptProfile {
    log_path: "transcripts/genset-normal-start.log",
    header: "Genset Sequencer Emulator start/stop transcript",
};

const FAILED_START: TranscriptProfile = TranscriptProfile {
    log_path: "transcripts/genset-failed-start.log",
    header: "Genset Sequencer Emulator failed start transcript",
};

const STOP_GUARD: TranscriptProfile = TranscriptProfile {
    log_path: "transcripts/genset-stop-guard.log",
    header: "Genset Sequencer Emulator stop guard transcript",
};

type Script = fn(&mut Session) -> io::Result<()>;

fn main() -> io::Result<()> {
    let captures: [(TranscriptProfile, Script); 3] = [
        (NORMAL_START, record_normal_start),
        (FAILED_START, record_failed_start),
        (STOP_GUARD, record_stop_guard),
    ];
    for (profile, script) in captures {
        let mut session = Session::new(profile, CAPTURE_SEED)?;
        script(&mut session)?;
    }
    Ok(())
}

fn run_all(session: &mut Session, lines: &[&str]) -> io::Result<()> {
    for line in lines {
        session.handle_command(line)?;
    }
    Ok(())
}

fn record_normal_start(session: &mut Session) -> io::Result<()> {
    session.handle_completion("st", 2)?;
    session.handle_completion("sim ", "sim ".len())?;
    session.handle_completion("config set m", "config set m".len())?;

    run_all(
        session,
        &[
            "status",
            "sim temp 16",
            "advance 3s",
            "advance 8s",
            "advance 3s",
            "status",
            "sim temp 21",
            "advance 60s",
            "advance 1s",
            "status",
            "log 10",
        ],
    )
}

fn record_failed_start(session: &mut Session) -> io::Result<()> {
    session.handle_completion("fault ", "fault ".len())?;
    session.handle_completion("fault relay ", "fault relay ".len())?;

    run_all(
        session,
        &[
            "auto off",
            "sim temp 15",
            "sim battery 14",
            "fault relay on",
            "start",
            "advance 11s",
            "status",
            "advance 32s",
            "status",
            "fault clear",
            "start",
            "advance 11s",
            "status",
        ],
    )
}

fn record_stop_guard(session: &mut Session) -> io::Result<()> {
    session.handle_completion("help ", "help ".len())?;

    run_all(
        session,
        &[
            "help stop",
            "config set min-runtime 20",
            "sim temp 16",
            "start",
            "advance 11s",
            "stop",
            "advance 10s",
            "stop",
            "advance 10s",
            "stop",
            "advance 1s",
            "stop",
            "config show",
        ],
    )
}
