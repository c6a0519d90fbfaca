use anyhow::{Context, Result, anyhow};
use pico_args::Arguments;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    env,
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicBool},
};

use tracetrial::clock::{Clock, MonotonicClock, SteppedClock};
use tracetrial::config::{self, Settings};
use tracetrial::feedback::LogFeedback;
use tracetrial::input::{EvdevInput, InputSource, ScriptedInput, TraceScript, discover_pointers};
use tracetrial::machine::TrialStateMachine;
use tracetrial::recorder::CsvRecorder;
use tracetrial::session::{self, Session};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    if env::args().len() == 1 || pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let settings_path: Option<PathBuf> = pargs.opt_value_from_str("--settings")?;
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("run") => {
            let out: Option<PathBuf> = pargs.opt_value_from_str("--out")?;
            let start: Option<usize> = pargs.opt_value_from_str("--start")?;
            let trials: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: tracetrial run <trials.csv> [--out DIR] [--start N]"))?;

            let (settings, _) = load_settings(settings_path.as_deref())?;
            let (w, h) = (settings.screen.width_px as f64, settings.screen.height_px as f64);
            let input = EvdevInput::open(settings.tablet, w, h)
                .context("no usable pointer device (try `tracetrial doctor`)")?;
            let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
            run_session(&settings, &trials, out, start, Box::new(input), clock)
        }

        Some("replay") => {
            let out: Option<PathBuf> = pargs.opt_value_from_str("--out")?;
            let start: Option<usize> = pargs.opt_value_from_str("--start")?;
            let usage = "usage: tracetrial replay <trials.csv> <trace.json> [--out DIR] [--start N]";
            let trials: PathBuf = pargs.free_from_str().map_err(|_| anyhow!(usage))?;
            let trace: PathBuf = pargs.free_from_str().map_err(|_| anyhow!(usage))?;

            let (settings, _) = load_settings(settings_path.as_deref())?;
            let script = TraceScript::load(&trace)
                .with_context(|| format!("failed to load trace {}", trace.display()))?;
            let clock: Arc<dyn Clock> = Arc::new(SteppedClock::new());
            let input = ScriptedInput::new(script, settings.coordinate_frame()?, Arc::clone(&clock))?;
            run_session(&settings, &trials, out, start, Box::new(input), clock)
        }

        Some("check") => {
            let trials: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: tracetrial check <trials.csv>"))?;
            let (settings, _) = load_settings(settings_path.as_deref())?;
            let rows = session::read_rows(&trials)?;
            let built = session::build_all(
                &rows,
                settings.trial.rect_velocity,
                settings.coordinate_frame()?,
                settings.trial_options(),
            );
            let report: Vec<serde_json::Value> = built
                .iter()
                .enumerate()
                .map(|(i, b)| match b {
                    Ok(cfg) => serde_json::json!({ "row": i, "trial": cfg }),
                    Err(e) => serde_json::json!({ "row": i, "error": e.to_string() }),
                })
                .collect();
            print_json(&serde_json::Value::Array(report));
            Ok(())
        }

        Some("devices") => {
            print_json(&serde_json::to_value(discover_pointers())?);
            Ok(())
        }

        Some("doctor") => {
            let path = match settings_path {
                Some(p) => Some(p),
                None => config::config_dir().ok().map(|d| d.join("settings.toml")),
            };
            print_json(&config::doctor_report(path.as_deref()));
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<(Settings, PathBuf)> {
    match path {
        Some(p) => {
            let s = Settings::load(p).with_context(|| format!("bad settings {}", p.display()))?;
            Ok((s, p.to_path_buf()))
        }
        None => Ok(Settings::load_or_install_default()?),
    }
}

fn run_session(
    settings: &Settings,
    trials: &Path,
    out: Option<PathBuf>,
    start: Option<usize>,
    input: Box<dyn InputSource>,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let abort = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&abort))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&abort))?;

    let rows = session::read_rows(trials)?;
    let mut recorder = CsvRecorder::new(out.unwrap_or_else(|| PathBuf::from("results")))?;
    let mut machine = TrialStateMachine::new(
        input,
        clock,
        Box::new(LogFeedback),
        settings.engine_options(),
    )
    .with_abort(Arc::clone(&abort));

    let mut session = Session {
        machine: &mut machine,
        frame: settings.coordinate_frame()?,
        options: settings.trial_options(),
        rect_velocity: settings.trial.rect_velocity,
        abort,
    };
    let report = session.run(
        &rows,
        start.unwrap_or(settings.trial.start_index),
        &mut recorder,
    )?;
    println!(
        "tracetrial: {}/{} trials succeeded, results in {}",
        report.succeeded,
        report.completed,
        recorder.dir().display()
    );
    Ok(())
}

fn print_help() {
    println!(
        r#"tracetrial: motor-control pointing trials

USAGE:
  tracetrial help [command]                        Show general or command-specific help
  tracetrial run <trials.csv> [--out DIR] [--start N]
                                                   Run trials with live pointer input
  tracetrial replay <trials.csv> <trace.json> [--out DIR] [--start N]
                                                   Run trials against a recorded trace
  tracetrial check <trials.csv>                    Parse trials and print the built regions
  tracetrial devices                               List pointer devices
  tracetrial doctor                                Diagnose permissions/devices

OPTIONS:
  --settings FILE    Use FILE instead of ~/.config/tracetrial/settings.toml

Set RUST_LOG=debug for per-trial pipeline statistics.
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: tracetrial run <trials.csv> [--out DIR] [--start N]\nRuns every row from N on using evdev tablets and mice. Results go to DIR (default ./results)."
        ),
        "replay" => println!(
            "usage: tracetrial replay <trials.csv> <trace.json> [--out DIR] [--start N]\nReplays a keyframe trace (centimeters, milliseconds) on a virtual clock."
        ),
        "check" => println!(
            "usage: tracetrial check <trials.csv>\nPrints each row's regions in device pixels, or why it is malformed."
        ),
        "devices" => println!("usage: tracetrial devices\nLists tablets and mice under /dev/input."),
        "doctor" => println!(
            "usage: tracetrial doctor\nChecks input group membership and lists pointer devices."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_json(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
