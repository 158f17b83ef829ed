//! ptydb CLI - コマンドラインインターフェース
//!
//! pty上で動く行指向デバッガ（pdbなど）を操作するREPLインターフェース

use anyhow::Result;
use clap::{Parser, Subcommand};
use ptydb_core::errors::ERR_NO_SESSION;
use ptydb_core::parse::{join_args, parse_location};
use ptydb_core::{
    builtin_profiles, render_stack, BreakpointToggle, Command, Debugger, Event, InterfaceProfile,
    ProfileConfig, SessionConfig, State, StepOutcome,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// ptydb - Line-oriented debugger driver
#[derive(Parser)]
#[command(name = "ptydb")]
#[command(version = "0.1.0")]
#[command(about = "Drive a line-oriented debugger REPL through a pseudoterminal", long_about = None)]
struct Cli {
    /// Additional interface profile (JSON file); may be given several times
    #[arg(long = "profile", global = true)]
    profiles: Vec<PathBuf>,

    /// Directory for the program output pipe
    #[arg(long, default_value = "/tmp", global = true)]
    pipe_dir: PathBuf,

    /// Milliseconds to wait before retrying a read that had no data
    #[arg(long, default_value_t = 100, global = true)]
    retry_ms: u64,

    /// Maximum nesting of commands sent by autoresponse rules
    #[arg(long, default_value_t = 16, global = true)]
    max_send_depth: usize,

    /// Write a debug log of the session to this file
    #[arg(long, global = true)]
    debug_log: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Launch a source file under its debugger
    Run {
        /// Path to the source file
        source: String,

        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the autoresponse rule table of a profile
    Rules {
        /// Profile name
        #[arg(long, default_value = "pdb")]
        name: String,
    },
}

/// REPLコマンドの後にループを続けるか
enum Flow {
    Continue,
    Quit,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug_log.as_ref())?;

    let profiles = load_profiles(&cli.profiles)?;
    let config = SessionConfig {
        pipe_dir: cli.pipe_dir.clone(),
        retry_delay: Duration::from_millis(cli.retry_ms),
        max_send_depth: cli.max_send_depth,
        ..SessionConfig::default()
    };

    match cli.command {
        CliCommand::Rules { name } => print_rules(&profiles, &name),
        CliCommand::Run { source, args } => {
            println!("ptydb - Line-oriented debugger driver");
            println!("Version 0.1.0");
            println!();

            let mut debugger = init_debugger(profiles, config, &source, &args)?;
            run_repl(&mut debugger)?;
            debugger.kill();
            Ok(())
        }
    }
}

/// ログの出力先を設定する
///
/// `--debug-log` が指定されていればdebugレベルでファイルへ、
/// そうでなければ `RUST_LOG`（デフォルトはwarn）に従って標準エラーへ出力します。
fn init_logging(debug_log: Option<&PathBuf>) -> Result<()> {
    match debug_log {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| anyhow::anyhow!("cannot create debug log {}: {}", path.display(), e))?;
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("debug"))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// ユーザー指定のプロファイルを組み込みプロファイルより優先して並べる
fn load_profiles(paths: &[PathBuf]) -> Result<Vec<Arc<InterfaceProfile>>> {
    let mut profiles = Vec::new();
    for path in paths {
        let profile = ProfileConfig::load(path)?.compile()?;
        tracing::info!("loaded profile '{}' from {}", profile.name(), path.display());
        profiles.push(Arc::new(profile));
    }
    profiles.extend(builtin_profiles()?);
    Ok(profiles)
}

fn print_rules(profiles: &[Arc<InterfaceProfile>], name: &str) -> Result<()> {
    let profile = profiles
        .iter()
        .find(|p| p.name() == name)
        .ok_or_else(|| anyhow::anyhow!("Unknown profile: {}", name))?;

    println!("Profile '{}' (prompt {:?}):", profile.name(), profile.prompt());
    for (i, rule) in profile.rules().iter().enumerate() {
        println!("  {:>2}. {}", i, rule.pattern());
        for action in rule.actions() {
            println!("        {:?}", action);
        }
    }
    Ok(())
}

/// デバッガを初期化してセッションを起動する
fn init_debugger(
    profiles: Vec<Arc<InterfaceProfile>>,
    config: SessionConfig,
    source: &str,
    args: &[String],
) -> Result<Debugger> {
    let source = std::fs::canonicalize(source)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| source.to_string());
    let mut debugger = Debugger::new(profiles, config);
    println!("Starting: {}", source);
    let report = debugger.start(&source, &join_args(args)?)?;
    println!("Session started with profile '{}'", report.profile);
    println!();
    print_events(&mut debugger);

    Ok(debugger)
}

/// REPLループを実行する
fn run_repl(debugger: &mut Debugger) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        // 子プロセスが入力を待っている間とコンソール表示中は、その行をそのまま渡す
        let state = debugger.state();
        let raw_input = state.is_some_and(State::routes_raw_input);
        let prompt = if raw_input {
            debugger
                .transcript()
                .map(|t| t.current().to_string())
                .unwrap_or_default()
        } else {
            "(ptydb) ".to_string()
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                if state == Some(State::Console) && line.trim().is_empty() {
                    debugger.focus_console(false);
                    println!("Left the console");
                    continue;
                }
                if raw_input {
                    if let Err(e) = send_raw(debugger, &line) {
                        eprintln!("Error: {}", e);
                    }
                    print_events(debugger);
                    continue;
                }

                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(debugger, line) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
                print_events(debugger);
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(debugger: &mut Debugger, line: &str) -> Result<Flow> {
    let Some(command) = Command::parse(line) else {
        println!("Unknown command: {}", line);
        println!("Type 'help' for available commands.");
        return Ok(Flow::Continue);
    };

    match command {
        Command::Help => print_help(),
        Command::Quit => {
            println!("Goodbye!");
            return Ok(Flow::Quit);
        }
        Command::Step => report_step(debugger.step_into()?),
        Command::Next => report_step(debugger.step_over()?),
        Command::Return => report_step(debugger.finish()?),
        Command::Continue => report_step(debugger.continue_execution()?),
        Command::Until(loc) => {
            let (file, line) = parse_location(&loc)?;
            report_step(debugger.run_until(&file, line)?);
        }
        Command::Break(loc) => handle_break(debugger, &loc)?,
        Command::Condition(loc, expression) => {
            let (file, line) = parse_location(&loc)?;
            debugger.set_breakpoint_condition(&file, line, &expression)?;
            if expression.is_empty() {
                println!("Breakpoint at {} is now unconditional", loc);
            } else {
                println!("Breakpoint at {} stops when {}", loc, expression);
            }
        }
        Command::Breakpoints => print_breakpoints(debugger),
        Command::Watch(expression) => {
            debugger.watches_mut().add(&expression);
            print_watches(debugger)?;
        }
        Command::Unwatch(n) => {
            let removed = debugger.watches_mut().remove(n - 1)?;
            println!("Removed watch: {}", removed);
        }
        Command::Watches => print_watches(debugger)?,
        Command::Print(expression) => println!("{}", debugger.evaluate(&expression)?),
        Command::Backtrace => print_backtrace(debugger),
        Command::Console => {
            print_console(debugger);
            debugger.focus_console(true);
        }
        Command::Raw(text) => send_raw(debugger, &text)?,
        Command::Restart => {
            let report = debugger.restart()?;
            println!("Session restarted with profile '{}'", report.profile);
            for key in report.dropped_breakpoints {
                println!("Breakpoint at {} could not be set and was removed", key);
            }
        }
        Command::Kill => {
            debugger.kill();
            println!("Session killed");
        }
    }

    Ok(Flow::Continue)
}

/// 行をそのまま子プロセスへ送り、応答を処理する
fn send_raw(debugger: &mut Debugger, text: &str) -> Result<()> {
    debugger.send_line(text)?;
    report_step(debugger.process()?);
    Ok(())
}

/// Breakコマンドを処理する
fn handle_break(debugger: &mut Debugger, loc: &str) -> Result<()> {
    let (file, line) = parse_location(loc)?;
    match debugger.toggle_breakpoint(&file, line)? {
        BreakpointToggle::Set(bp) => match bp.id {
            Some(id) => println!("Breakpoint {} set at {}", id, bp.key()),
            None => println!("Breakpoint set at {} (pending until the session starts)", bp.key()),
        },
        BreakpointToggle::Cleared(bp) => println!("Breakpoint at {} cleared", bp.key()),
        BreakpointToggle::Rejected => println!("Could not set breakpoint at {}:{}", file, line),
    }
    Ok(())
}

fn report_step(outcome: StepOutcome) {
    match outcome {
        StepOutcome::Refused(state) => {
            println!("Cannot step while the session is in {:?} state", state);
        }
        StepOutcome::Stopped | StepOutcome::Started | StepOutcome::Terminated => {}
    }
}

/// 溜まったイベントを表示する
fn print_events(debugger: &mut Debugger) {
    for event in debugger.drain_events() {
        match event {
            Event::Execution {
                file,
                line,
                result,
                error,
            } => {
                let text = debugger.source_line(&file, line);
                println!("=> {}:{}: {}", file, line, text.trim_end());
                if let Some(result) = result {
                    println!("   returned {}", result);
                }
                if let Some(error) = error {
                    println!("   error: {}", error);
                }
            }
            Event::ConsoleOutput(bytes) => {
                print!("{}", String::from_utf8_lossy(&bytes));
                let _ = std::io::stdout().flush();
            }
            Event::Error(message) => eprintln!("{}", message),
            Event::Autokill => {
                println!();
                println!("The program finished. Use 'restart' to run it again.");
            }
            Event::StackPush(frame) => tracing::debug!("push {}:{}", frame.file, frame.line),
            Event::StackPop => tracing::debug!("pop"),
            Event::BreakpointCaptured(_) => {}
        }
    }
}

fn print_breakpoints(debugger: &Debugger) {
    let breakpoints = debugger.breakpoints();
    if breakpoints.is_empty() {
        println!("No breakpoints");
        return;
    }

    println!("Breakpoints ({}):", breakpoints.count());
    for bp in breakpoints.all() {
        let id = bp.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        if bp.is_conditional() {
            println!("  {:>3}  {}  if {}", id, bp.key(), bp.condition);
        } else {
            println!("  {:>3}  {}", id, bp.key());
        }
    }
}

fn print_watches(debugger: &mut Debugger) -> Result<()> {
    if debugger.watches().is_empty() {
        println!("No watches");
        return Ok(());
    }

    for (i, (expression, value)) in debugger.evaluate_watches()?.into_iter().enumerate() {
        println!("  {}. {} = {}", i + 1, expression, value);
    }
    Ok(())
}

fn print_backtrace(debugger: &Debugger) {
    let frames = debugger.stack();
    if frames.is_empty() {
        println!("No frames");
        return;
    }
    for (i, row) in render_stack(frames).iter().enumerate().rev() {
        println!("#{:<2} {}", frames.len() - 1 - i, row);
    }
}

fn print_console(debugger: &Debugger) {
    for line in console_lines(debugger) {
        println!("{}", line);
    }
}

/// コンソールの記録（セッションが無ければそのメッセージ）
fn console_lines(debugger: &Debugger) -> Vec<String> {
    match debugger.transcript() {
        Some(transcript) => transcript.entries().to_vec(),
        None => vec![ERR_NO_SESSION.to_string()],
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help                   - Show this help message");
    println!("  quit/exit/q            - Exit the debugger");
    println!();
    println!("Execution:");
    println!("  step (s)               - Step into the next call");
    println!("  next (n)               - Run to the next line");
    println!("  return (r, finish)     - Run until the current function returns");
    println!("  continue (c)           - Continue execution");
    println!("  until (u) <file:line>  - Run to a location");
    println!("  restart                - Start the program again");
    println!("  kill                   - End the debug session");
    println!();
    println!("Breakpoints:");
    println!("  break (b) <file:line>  - Toggle a breakpoint");
    println!("  condition <file:line> [expr] - Set or clear a breakpoint condition");
    println!("  breakpoints            - List breakpoints");
    println!();
    println!("Inspection:");
    println!("  print (p) <expr>       - Evaluate an expression");
    println!("  watch (w) <expr>       - Add a watch expression");
    println!("  unwatch <n>            - Remove watch number n");
    println!("  watches                - Show watch values");
    println!("  backtrace (bt)         - Show the call stack");
    println!("  console                - Show the transcript and type to the debugger directly");
    println!("                           (an empty line returns to ptydb commands)");
    println!("  !<line>                - Send a line to the debugger as is");
    println!();
    println!("Examples:");
    println!("  break /tmp/a.py:10");
    println!("  until /tmp/a.py:20");
    println!("  watch len(items)");
}
