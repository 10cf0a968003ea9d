mod session;

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process;

use crossterm::style::{Color, Stylize};
use genset_core::events::Severity;
use tracing_subscriber::EnvFilter;

use session::{CompletionResponse, ResponseLine, Session, TranscriptProfile};

const DEFAULT_SEED: u64 = 1;

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let seed = parse_seed().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: genset-emulator [--seed <n>]");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let colors = stdout.is_terminal();
    let mut writer = stdout.lock();
    let mut session = Session::new(TranscriptProfile::INTERACTIVE, seed)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Genset Sequencer Emulator ready (seed {seed}). Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let raw = line.trim_end_matches(['\r', '\n']);
        if let Some((buffer, _)) = raw.split_once('\t') {
            let response = session.handle_completion(buffer, buffer.len())?;
            write_completion(&mut writer, buffer, &response)?;
            continue;
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            write_response(&mut writer, &response, colors)?;
        }
    }

    Ok(())
}

fn write_response<W: Write>(writer: &mut W, response: &ResponseLine, colors: bool) -> io::Result<()> {
    match response.severity {
        Some(severity) if colors => {
            writeln!(writer, "{}", response.text.as_str().with(severity_color(severity)))
        }
        _ => writeln!(writer, "{}", response.text),
    }
}

fn write_completion<W: Write>(
    writer: &mut W,
    buffer: &str,
    response: &CompletionResponse,
) -> io::Result<()> {
    match response {
        CompletionResponse::NoMatches => writeln!(writer, "(no matches)"),
        CompletionResponse::Applied { replacement } => {
            let head = buffer.get(..replacement.start).unwrap_or(buffer);
            let space = if replacement.append_space { " " } else { "" };
            writeln!(writer, "{head}{}{space}", replacement.value)
        }
        CompletionResponse::Suggestions { options } => writeln!(writer, "{}", options.join("  ")),
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Cyan,
        Severity::Ok => Color::Green,
        Severity::Warn => Color::Yellow,
        Severity::Error => Color::Red,
    }
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_seed() -> Result<u64, String> {
    let mut args = env::args().skip(1);
    let Some(arg) = args.next() else {
        return Ok(DEFAULT_SEED);
    };

    let value = if let Some(value) = arg.strip_prefix("--seed=") {
        value.to_string()
    } else if arg == "--seed" {
        args.next()
            .ok_or_else(|| "Expected value after --seed".to_string())?
    } else {
        return Err(format!("Unknown argument `{arg}`"));
    };

    value
        .parse()
        .map_err(|err| format!("Invalid seed `{value}`: {err}"))
}
