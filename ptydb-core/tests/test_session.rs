//! セッション（行の処理、自動応答、状態遷移、スタック）のテスト

mod common;

use common::{fast_config, pdb, scripted_session, ScriptedChannel, ScriptedOutput, PROMPT};
use ptydb_core::{Event, ProcessStatus, ProfileConfig, Session, SessionConfig, StackFrame, State};
use std::sync::Arc;

fn temp_source(name: &str, content: &str) -> String {
    let path = std::env::temp_dir().join(format!("ptydb-{}-{}.py", name, std::process::id()));
    std::fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_breakpoint_number_captured() {
    let channel = ScriptedChannel::new();
    channel.reply("break /tmp/a.py:10", &["Breakpoint 3 at /tmp/a.py:10"]);
    let mut session = scripted_session(&channel);

    session.clear_breakpoint_id();
    session.write_line("break /tmp/a.py:10").unwrap();
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);

    assert_eq!(session.breakpoint_id(), Some(3));
    assert_eq!(session.drain_events(), vec![Event::BreakpointCaptured(Some(3))]);
    assert_eq!(session.state(), State::Ready);
}

#[test]
fn test_call_pushes_frame_at_next_position() {
    let file = temp_source("call", "def foo():\n    return 1\n\nfoo()\n");
    let channel = ScriptedChannel::new();
    channel.push_lines(&["--Call--"]);
    channel.reply("next", &[&format!("> {}(2)foo()", file), "-> return 1"]);
    let mut session = scripted_session(&channel);

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);

    assert_eq!(channel.sent(), vec!["next"]);
    assert_eq!(
        session.drain_events(),
        vec![
            Event::Execution {
                file: file.clone(),
                line: 2,
                result: None,
                error: None,
            },
            Event::StackPush(StackFrame::new(file.clone(), 2, "    return 1")),
        ]
    );
    assert_eq!(session.stack().len(), 1);
    assert!(!session.frame_capture_armed());

    std::fs::remove_file(&file).unwrap();
}

#[test]
fn test_auto_send_reply_handled_before_queued_lines() {
    let channel = ScriptedChannel::new();
    channel.push_lines(&["--Call--", "> /tmp/ptydb-none.py(1)foo()", "-> def foo():"]);
    channel.reply("next", &["> /tmp/ptydb-none.py(2)foo()", "-> return 1"]);
    let mut session = scripted_session(&channel);

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);

    let lines: Vec<u32> = session
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Execution { line, .. } => Some(line),
            _ => None,
        })
        .collect();
    // 自動送信の応答（2行目）がキューに残っていた行（1行目）より先に処理される
    assert_eq!(lines, vec![2, 1]);
    assert_eq!(session.stack()[0].line, 2);
}

#[test]
fn test_error_line_sets_error_state() {
    let channel = ScriptedChannel::new();
    channel.push_lines(&["*** NameError: name 'x' is not defined"]);
    let mut session = scripted_session(&channel);

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(
        session.drain_events(),
        vec![Event::Error("NameError: name 'x' is not defined".to_string())]
    );
    assert_eq!(session.state(), State::Error);
    assert!(session.state().accepts_stepping());

    // ERRORは次の実行位置でも解除されない
    channel.push_lines(&["> /tmp/a.py(3)<module>()"]);
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(session.state(), State::Error);
}

#[test]
fn test_bare_exception_line_sets_error_state() {
    let channel = ScriptedChannel::new();
    channel.push_lines(&["NameError: name 'x' is not defined"]);
    let mut session = scripted_session(&channel);

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(
        session.drain_events(),
        vec![Event::Error("NameError: name 'x' is not defined".to_string())]
    );
    assert_eq!(session.state(), State::Error);
}

#[test]
fn test_return_on_empty_stack_is_ignored() {
    let channel = ScriptedChannel::new();
    channel.push_lines(&["--Call--"]);
    channel.reply("next", &["> /tmp/a.py(2)foo()"]);
    let mut session = scripted_session(&channel);
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(session.stack().len(), 1);
    session.drain_events();

    channel.push_lines(&["--Return--"]);
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(session.drain_events(), vec![Event::StackPop]);

    channel.push_lines(&["--Return--"]);
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert!(session.drain_events().is_empty());
    assert!(session.stack().is_empty());
}

#[test]
fn test_autokill_stops_processing() {
    let channel = ScriptedChannel::new();
    channel.push_lines(&[
        "The program finished and will be restarted",
        "> /tmp/a.py(1)<module>()",
    ]);
    let mut session = scripted_session(&channel);

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Autokill);
    assert_eq!(session.drain_events(), vec![Event::Autokill]);
    assert!(session.autokill());

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Autokill);
    assert!(session.drain_events().is_empty());
}

#[test]
fn test_auto_send_nesting_is_bounded() {
    let profile = ProfileConfig::from_json(
        r#"{
            "name": "echo",
            "exec": "cat %(SourceFile)s",
            "prompt": "(Pdb) ",
            "file_pattern": "\\.txt$",
            "rules": [
                {"pattern": "ping", "actions": [{"action": "send", "command": "ping"}]}
            ]
        }"#,
    )
    .unwrap()
    .compile()
    .unwrap();

    let channel = ScriptedChannel::new();
    channel.push_lines(&["ping"]);
    channel.reply("ping", &["ping"]);
    let config = SessionConfig {
        max_send_depth: 3,
        ..fast_config()
    };
    let mut session = Session::from_channels(Arc::new(profile), Box::new(channel.clone()), None, config);

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(channel.sent(), vec!["ping", "ping", "ping"]);
}

#[test]
fn test_evaluate_bypasses_rules() {
    let channel = ScriptedChannel::new();
    channel.push_lines(&["--Call--"]);
    channel.reply("next", &["> /tmp/a.py(2)foo()"]);
    let mut session = scripted_session(&channel);
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    session.drain_events();

    channel.reply("print x", &["--Return--", "*** NameError: trailing"]);
    assert_eq!(session.evaluate("x").unwrap(), "--Return--");
    assert_eq!(session.stack().len(), 1);
    assert_eq!(session.state(), State::Ready);

    // 応答の残りの行は捨てられている
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert!(session.drain_events().is_empty());
    assert_eq!(session.state(), State::Ready);

    channel.reply("print y", &["", "42"]);
    assert_eq!(session.evaluate("y").unwrap(), "42");
}

#[test]
fn test_prime_keeps_banner_for_first_process() {
    let channel = ScriptedChannel::new();
    channel.push_lines(&["> /tmp/a.py(1)<module>()", "-> import os"]);
    channel.reply("!setup", &["setup noise"]);
    let mut session = scripted_session(&channel);

    session.prime(&["!setup".to_string()]).unwrap();
    assert_eq!(channel.sent(), vec!["!setup"]);
    assert_eq!(
        session.pending_lines().collect::<Vec<_>>(),
        vec!["> /tmp/a.py(1)<module>()", "-> import os"]
    );

    // 評価は未処理の行に影響しない
    channel.reply("print x", &["5"]);
    assert_eq!(session.evaluate("x").unwrap(), "5");
    assert_eq!(session.pending_lines().count(), 2);

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(
        session.drain_events(),
        vec![Event::Execution {
            file: "/tmp/a.py".to_string(),
            line: 1,
            result: None,
            error: None,
        }]
    );
}

#[test]
fn test_program_output_forwarded() {
    let channel = ScriptedChannel::new();
    let output = ScriptedOutput::default();
    let mut session = Session::from_channels(
        pdb(),
        Box::new(channel.clone()),
        Some(Box::new(output.clone())),
        fast_config(),
    );

    output.push("hello\n");
    channel.push(PROMPT);
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(session.drain_events(), vec![Event::ConsoleOutput(b"hello\n".to_vec())]);
}

#[test]
fn test_input_state_follows_prompt() {
    let channel = ScriptedChannel::new();
    channel.push("What is your name? ");
    let mut session = scripted_session(&channel);

    assert!(!session.read_lines().unwrap());
    assert_eq!(session.state(), State::Input);
    assert!(!session.state().accepts_stepping());

    // 入力待ちの間はフォーカスで状態が変わらない
    session.focus_console(true);
    assert_eq!(session.state(), State::Input);

    channel.reply("bob", &["Hello bob"]);
    session.write_line("bob").unwrap();
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(session.state(), State::Ready);

    session.focus_console(true);
    assert_eq!(session.state(), State::Console);
    session.focus_console(false);
    assert_eq!(session.state(), State::Ready);
}

#[test]
fn test_transcript_records_commands_and_replies() {
    let channel = ScriptedChannel::new();
    channel.push(PROMPT);
    channel.reply("next", &["> /tmp/a.py(2)<module>()", "-> y = 2"]);
    let mut session = scripted_session(&channel);

    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(session.transcript().current(), PROMPT);

    session.write_line("next").unwrap();
    assert_eq!(session.process(false).unwrap(), ProcessStatus::Running);
    assert_eq!(
        session.transcript().entries(),
        &["(Pdb) next", "> /tmp/a.py(2)<module>()", "-> y = 2", "(Pdb) "]
    );
}
