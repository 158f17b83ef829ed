//! デバッガのメインロジック
//!
//! セッションの起動・再起動、ブレークポイントとウォッチの保持、ステップ実行の
//! 状態チェックをまとめたファサードです。UIはこの型だけを操作します。

use crate::breakpoint::{location_key, Breakpoint, BreakpointRegistry};
use crate::errors::{ERR_BREAKPOINT_NOT_FOUND, ERR_NOTHING_TO_RESTART, ERR_NO_PROFILE, ERR_NO_SESSION};
use crate::event::Event;
use crate::profile::{select_profile, InterfaceProfile};
use crate::session::{ProcessStatus, Session, SessionConfig};
use crate::stack::StackFrame;
use crate::state::State;
use crate::transcript::Transcript;
use crate::watch::{WatchList, NO_SESSION_REPLY};
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// ステップ系コマンドの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// コマンドを送り、応答を処理した
    Stopped,
    /// セッションが無かったので前回の設定で起動した
    Started,
    /// 現在の状態ではステップできない
    Refused(State),
    /// プログラムが終了し、セッションを破棄した
    Terminated,
}

/// ブレークポイントの切り替え結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointToggle {
    Set(Breakpoint),
    Cleared(Breakpoint),
    /// デバッガがブレークポイントを設定できなかった
    Rejected,
}

/// セッション起動の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// 使ったプロファイル名
    pub profile: String,
    /// 再設定できずに削除したブレークポイント
    pub dropped_breakpoints: Vec<String>,
}

/// 前回起動したときの設定
#[derive(Debug, Clone)]
struct LastRun {
    source_file: String,
    args: String,
}

/// デバッガ
pub struct Debugger {
    /// 利用可能なプロファイル（先頭から順に照合）
    profiles: Vec<Arc<InterfaceProfile>>,
    /// セッション設定
    config: SessionConfig,
    /// 現在のセッション
    session: Option<Session>,
    /// ブレークポイント管理
    breakpoints: BreakpointRegistry,
    /// ウォッチ式
    watches: WatchList,
    last_run: Option<LastRun>,
    /// 破棄したセッションから引き継いだイベント
    events: Vec<Event>,
}

impl Debugger {
    /// 新しいデバッガを作成する
    pub fn new(profiles: Vec<Arc<InterfaceProfile>>, config: SessionConfig) -> Self {
        Self {
            profiles,
            config,
            session: None,
            breakpoints: BreakpointRegistry::new(),
            watches: WatchList::new(),
            last_run: None,
            events: Vec::new(),
        }
    }

    /// セッションが存在するか
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn require_session(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!(ERR_NO_SESSION))
    }

    /// 現在の状態（セッションが無ければ `None`）
    pub fn state(&self) -> Option<State> {
        self.session.as_ref().map(Session::state)
    }

    /// ソースファイルを対象にセッションを起動する
    ///
    /// 既存のセッションは破棄します。登録済みのブレークポイントを再設定し、
    /// 初期停止位置を処理してから戻ります。
    pub fn start(&mut self, source_file: &str, args: &str) -> Result<StartReport> {
        self.kill();

        let profile = select_profile(&self.profiles, source_file)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{}: {}", ERR_NO_PROFILE, source_file))?;
        let session = Session::start(Arc::clone(&profile), source_file, args, self.config.clone())?;
        self.last_run = Some(LastRun {
            source_file: source_file.to_string(),
            args: args.to_string(),
        });

        let dropped_breakpoints = self.attach(session)?;
        Ok(StartReport {
            profile: profile.name().to_string(),
            dropped_breakpoints,
        })
    }

    /// 前回と同じ設定でセッションを起動し直す
    pub fn restart(&mut self) -> Result<StartReport> {
        let last = self
            .last_run
            .clone()
            .ok_or_else(|| anyhow::anyhow!(ERR_NOTHING_TO_RESTART))?;
        info!("restarting {}", last.source_file);
        self.start(&last.source_file, &last.args)
    }

    /// 作成済みのセッションを使う
    ///
    /// ブレークポイントを再設定して初期停止位置を処理します。
    /// 再設定できなかったブレークポイントの位置キーを返します。
    pub fn attach(&mut self, session: Session) -> Result<Vec<String>> {
        self.kill();
        self.session = Some(session);
        let dropped = self.replay_breakpoints()?;
        self.drive()?;
        Ok(dropped)
    }

    /// セッションを破棄する
    pub fn kill(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.events.extend(session.drain_events());
            session.kill();
            self.breakpoints.forget_ids();
        }
    }

    /// 応答を処理し、プログラムが終了していればセッションを破棄する
    fn drive(&mut self) -> Result<StepOutcome> {
        let Some(session) = self.session.as_mut() else {
            return Ok(StepOutcome::Terminated);
        };
        match session.process(false)? {
            ProcessStatus::Running => Ok(StepOutcome::Stopped),
            ProcessStatus::Autokill => {
                self.kill();
                Ok(StepOutcome::Terminated)
            }
        }
    }

    /// 登録済みのブレークポイントを現在のセッションに設定し直す
    pub fn replay_breakpoints(&mut self) -> Result<Vec<String>> {
        let mut dropped = Vec::new();
        for key in self.breakpoints.keys() {
            let Some(session) = self.session.as_mut() else {
                break;
            };
            session.clear_breakpoint_id();
            session.write_line(&format!("break {}", key))?;
            // 途中でプログラムが終了した場合、残りは次の起動まで保持する
            if self.drive()? == StepOutcome::Terminated {
                break;
            }

            match self.session.as_ref().and_then(Session::breakpoint_id) {
                Some(id) => {
                    let condition = match self.breakpoints.get_mut(&key) {
                        Some(bp) => {
                            bp.id = Some(id);
                            bp.condition.clone()
                        }
                        None => String::new(),
                    };
                    if !condition.is_empty() {
                        self.send_condition(id, &condition)?;
                    }
                }
                None => {
                    warn!("dropping breakpoint {}: debugger rejected it", key);
                    self.breakpoints.remove(&key);
                    dropped.push(key);
                }
            }
        }
        Ok(dropped)
    }

    fn send_condition(&mut self, id: u32, condition: &str) -> Result<()> {
        let command = format!("condition {} {}", id, condition);
        self.require_session()?.write_line(command.trim_end())?;
        self.drive()?;
        Ok(())
    }

    /// ブレークポイントを切り替える
    ///
    /// 既に登録されていれば解除し、無ければ設定します。セッションが無いときは
    /// レジストリだけを更新し、次の起動時に設定されます。
    pub fn toggle_breakpoint(&mut self, file: &str, line: u32) -> Result<BreakpointToggle> {
        let key = location_key(file, line);

        if let Some(breakpoint) = self.breakpoints.remove(&key) {
            if let Some(session) = self.session.as_mut() {
                session.write_line(&format!("clear {}", key))?;
                self.drive()?;
            }
            return Ok(BreakpointToggle::Cleared(breakpoint));
        }

        let Some(session) = self.session.as_mut() else {
            let breakpoint = Breakpoint::new(None, file, line);
            self.breakpoints.insert(breakpoint.clone());
            return Ok(BreakpointToggle::Set(breakpoint));
        };

        session.clear_breakpoint_id();
        session.write_line(&format!("break {}", key))?;
        self.drive()?;

        match self.session.as_ref().and_then(Session::breakpoint_id) {
            Some(id) => {
                let breakpoint = Breakpoint::new(Some(id), file, line);
                self.breakpoints.insert(breakpoint.clone());
                Ok(BreakpointToggle::Set(breakpoint))
            }
            None => {
                warn!("could not set breakpoint at {}", key);
                Ok(BreakpointToggle::Rejected)
            }
        }
    }

    /// ブレークポイントの条件を設定する（空文字列で無条件に戻す）
    pub fn set_breakpoint_condition(&mut self, file: &str, line: u32, condition: &str) -> Result<()> {
        let key = location_key(file, line);
        let breakpoint = self
            .breakpoints
            .get_mut(&key)
            .ok_or_else(|| anyhow::anyhow!("{}: {}", ERR_BREAKPOINT_NOT_FOUND, key))?;
        breakpoint.condition = condition.trim().to_string();
        let id = breakpoint.id;
        let condition = breakpoint.condition.clone();

        if let (Some(id), true) = (id, self.session.is_some()) {
            self.send_condition(id, &condition)?;
        }
        Ok(())
    }

    /// 全てのブレークポイントを取得する
    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    /// ステップ実行（関数の中に入る）
    pub fn step_into(&mut self) -> Result<StepOutcome> {
        self.step("step")
    }

    /// 次の行まで実行
    pub fn step_over(&mut self) -> Result<StepOutcome> {
        self.step("next")
    }

    /// 現在の関数から戻るまで実行
    pub fn finish(&mut self) -> Result<StepOutcome> {
        self.step("return")
    }

    /// 実行継続
    pub fn continue_execution(&mut self) -> Result<StepOutcome> {
        self.step("continue")
    }

    /// セッションが無ければ前回の起動内容で起動し直す
    ///
    /// 起動した場合は `Some(StepOutcome::Started)` を返します。
    fn start_if_needed(&mut self) -> Result<Option<StepOutcome>> {
        if self.session.is_some() {
            return Ok(None);
        }
        if self.last_run.is_none() {
            anyhow::bail!(ERR_NO_SESSION);
        }
        self.restart()?;
        Ok(Some(StepOutcome::Started))
    }

    fn step(&mut self, command: &str) -> Result<StepOutcome> {
        if let Some(outcome) = self.start_if_needed()? {
            return Ok(outcome);
        }

        let session = self.require_session()?;
        let state = session.state();
        if !state.accepts_stepping() {
            return Ok(StepOutcome::Refused(state));
        }
        session.write_line(command)?;
        self.drive()
    }

    /// 指定した位置まで実行する
    ///
    /// 一時的なブレークポイントを設定して実行を継続し、止まったら解除します。
    /// その位置に既にユーザーのブレークポイントがあれば、それをそのまま使います。
    pub fn run_until(&mut self, file: &str, line: u32) -> Result<StepOutcome> {
        if let Some(outcome) = self.start_if_needed()? {
            return Ok(outcome);
        }

        let key = location_key(file, line);
        let session = self.require_session()?;
        let state = session.state();
        if !state.accepts_stepping() {
            return Ok(StepOutcome::Refused(state));
        }

        let temporary = !self.breakpoints.contains(&key);
        if temporary {
            self.require_session()?.write_line(&format!("break {}", key))?;
            if self.drive()? == StepOutcome::Terminated {
                return Ok(StepOutcome::Terminated);
            }
        }

        self.require_session()?.write_line("continue")?;
        let outcome = self.drive()?;
        if outcome == StepOutcome::Terminated || !temporary {
            return Ok(outcome);
        }

        self.require_session()?.write_line(&format!("clear {}", key))?;
        self.drive()
    }

    /// 子プロセスへ1行そのまま送る
    pub fn send_line(&mut self, text: &str) -> Result<()> {
        self.require_session()?.write_line(text)
    }

    /// 子プロセスの出力を処理する（セッションが無ければ何もしない）
    pub fn process(&mut self) -> Result<StepOutcome> {
        self.drive()
    }

    /// UIのコンソール表示へのフォーカスを切り替える
    pub fn focus_console(&mut self, focused: bool) {
        if let Some(session) = self.session.as_mut() {
            session.focus_console(focused);
        }
    }

    /// ウォッチ式
    pub fn watches(&self) -> &WatchList {
        &self.watches
    }

    pub fn watches_mut(&mut self) -> &mut WatchList {
        &mut self.watches
    }

    /// 式を評価する
    ///
    /// セッションが無ければ評価せずに `NO_SESSION_REPLY` を返します。
    pub fn evaluate(&mut self, expression: &str) -> Result<String> {
        match self.session.as_mut() {
            Some(session) => session.evaluate(expression),
            None => Ok(NO_SESSION_REPLY.to_string()),
        }
    }

    /// 全てのウォッチ式を評価する
    ///
    /// 子プロセスが入力待ちの間は評価しません（空のリストを返します）。
    pub fn evaluate_watches(&mut self) -> Result<Vec<(String, String)>> {
        if self.state() == Some(State::Input) {
            return Ok(Vec::new());
        }
        let expressions: Vec<String> = self.watches.iter().map(str::to_string).collect();
        expressions
            .into_iter()
            .map(|expression| {
                let value = self.evaluate(&expression)?;
                Ok((expression, value))
            })
            .collect()
    }

    /// 溜まったイベントを取り出す
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = std::mem::take(&mut self.events);
        if let Some(session) = self.session.as_mut() {
            events.extend(session.drain_events());
        }
        events
    }

    /// コールスタック（セッションが無ければ空）
    pub fn stack(&self) -> &[StackFrame] {
        self.session.as_ref().map(Session::stack).unwrap_or(&[])
    }

    /// コンソールの記録
    pub fn transcript(&self) -> Option<&Transcript> {
        self.session.as_ref().map(Session::transcript)
    }

    /// ソースファイルの行を取得する（セッションが無ければ空）
    pub fn source_line(&mut self, file: &str, line: u32) -> String {
        self.session
            .as_mut()
            .map(|s| s.source_line(file, line))
            .unwrap_or_default()
    }
}
