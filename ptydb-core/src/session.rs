//! デバッガセッション
//!
//! 子プロセスとのやり取り、行の分割、自動応答ルールの適用、状態遷移、
//! スタック追跡をまとめて管理します。スレッドは使わず、呼び出し元が
//! `write_line` の後に `process` を呼んで応答を処理する同期モデルです。

use crate::event::Event;
use crate::line::LineBuffer;
use crate::profile::InterfaceProfile;
use crate::rule::{first_match, Effect};
use crate::source::SourceCache;
use crate::stack::{StackFrame, StackTracker};
use crate::state::State;
use crate::transcript::Transcript;
use crate::Result;
use ptydb_target::{Channel, OutputPipe, OutputSource, PtyProcess};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 1回の読み取りサイズ
const READ_CHUNK: usize = 4096;

/// セッションの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// 出力分離用パイプを作るディレクトリ
    pub pipe_dir: PathBuf,
    /// 「データ無し」のときに再試行するまでの待ち時間
    pub retry_delay: Duration,
    /// コマンド送信後の待ち時間
    pub write_settle: Duration,
    /// 自動送信の入れ子の上限
    pub max_send_depth: usize,
    /// 起動直後や autostart 後にプロンプトを待つ時間
    pub startup_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pipe_dir: PathBuf::from("/tmp"),
            retry_delay: Duration::from_millis(100),
            write_settle: Duration::from_millis(10),
            max_send_depth: 16,
            startup_timeout: Duration::from_secs(5),
        }
    }
}

/// `process` の結果
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// セッションは継続中
    Running,
    /// 子プロセスが終了・再起動しようとしている（呼び出し元がセッションを破棄する）
    Autokill,
}

/// デバッガセッション
pub struct Session {
    profile: Arc<InterfaceProfile>,
    config: SessionConfig,
    channel: Box<dyn Channel>,
    output: Option<Box<dyn OutputSource>>,
    lines: LineBuffer,
    transcript: Transcript,
    pending: VecDeque<String>,
    state: State,
    stack: StackTracker,
    sources: SourceCache,
    autokill: bool,
    breakpoint_id: Option<u32>,
    catch_reply: Option<String>,
    events: Vec<Event>,
}

impl Session {
    /// デバッガを起動してセッションを開始する
    ///
    /// 出力分離用のパイプを作成して読み取り側を開き、起動コマンドをpty上で実行し、
    /// autostartコマンドを送って応答を読み捨てます。起動時のバナー（初期停止位置）は
    /// 最初の `process` で処理されるように残しておきます。
    pub fn start(
        profile: Arc<InterfaceProfile>,
        source_file: &str,
        args: &str,
        config: SessionConfig,
    ) -> Result<Self> {
        let argv = profile.spawn_argv(source_file, args)?;

        let pipe_path = OutputPipe::path_for(&config.pipe_dir, std::process::id());
        let mut pipe = OutputPipe::create(&pipe_path)?;
        pipe.open_reader()?;

        let process = PtyProcess::spawn(&argv)?;
        info!(
            "started {} session for {} (pid {})",
            profile.name(),
            source_file,
            process.pid()
        );

        let autostart = profile.autostart_commands(&pipe_path);
        let mut session = Self::from_channels(profile, Box::new(process), Some(Box::new(pipe)), config);
        session.prime(&autostart)?;
        Ok(session)
    }

    /// 既存のチャネルからセッションを作成する
    ///
    /// プロセスの起動やautostartは行いません。
    pub fn from_channels(
        profile: Arc<InterfaceProfile>,
        channel: Box<dyn Channel>,
        output: Option<Box<dyn OutputSource>>,
        config: SessionConfig,
    ) -> Self {
        Self {
            profile,
            config,
            channel,
            output,
            lines: LineBuffer::new(),
            transcript: Transcript::new(),
            pending: VecDeque::new(),
            state: State::Ready,
            stack: StackTracker::new(),
            sources: SourceCache::new(),
            autokill: false,
            breakpoint_id: None,
            catch_reply: None,
            events: Vec::new(),
        }
    }

    /// 起動バナーを読み、autostartコマンドを送る
    pub fn prime(&mut self, autostart: &[String]) -> Result<()> {
        let banner = self.wait_for_prompt()?;
        self.pending.extend(banner);

        for command in autostart {
            self.write_line(command)?;
            let discarded = self.wait_for_prompt()?;
            if !discarded.is_empty() {
                debug!("discarded {} autostart line(s): {:?}", discarded.len(), discarded);
            }
        }
        Ok(())
    }

    /// プロンプトが出るまで（最大 `startup_timeout`）行を読む
    fn wait_for_prompt(&mut self) -> Result<Vec<String>> {
        let deadline = Instant::now() + self.config.startup_timeout;
        let mut lines = Vec::new();
        loop {
            lines.extend(self.collect_lines(true)?);
            if self.lines.partial_starts_with(self.profile.prompt()) {
                break;
            }
            if Instant::now() >= deadline {
                warn!("no '{}' prompt within {:?}", self.profile.prompt(), self.config.startup_timeout);
                break;
            }
        }
        Ok(lines)
    }

    /// プロファイルを取得する
    pub fn profile(&self) -> &Arc<InterfaceProfile> {
        &self.profile
    }

    /// 設定を取得する
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 現在の状態
    pub fn state(&self) -> State {
        self.state
    }

    /// UIのコンソール表示へのフォーカスを切り替える
    ///
    /// 子プロセスが入力待ち（INPUT）の間は状態を変えません。
    pub fn focus_console(&mut self, focused: bool) {
        match (focused, self.state) {
            (_, State::Input) => {}
            (true, _) => self.set_state(State::Console),
            (false, State::Console) => self.set_state(State::Ready),
            (false, _) => {}
        }
    }

    /// コールスタック
    pub fn stack(&self) -> &[StackFrame] {
        self.stack.frames()
    }

    /// 次の実行位置でフレームを積む予約があるか
    pub fn frame_capture_armed(&self) -> bool {
        self.stack.capture_armed()
    }

    /// コンソールの記録
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// まだ処理していない行
    pub fn pending_lines(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    /// 最後に取得したブレークポイント番号
    pub fn breakpoint_id(&self) -> Option<u32> {
        self.breakpoint_id
    }

    /// 記録したブレークポイント番号を消す（breakコマンドを送る前に呼ぶ）
    pub fn clear_breakpoint_id(&mut self) {
        self.breakpoint_id = None;
    }

    /// 最後にキャッチした応答
    pub fn catch_reply(&self) -> Option<&str> {
        self.catch_reply.as_deref()
    }

    /// 子プロセスが終了・再起動しようとしているか
    pub fn autokill(&self) -> bool {
        self.autokill
    }

    /// ソースファイルの行を取得する
    pub fn source_line(&mut self, file: &str, line: u32) -> String {
        self.sources.line(file, line)
    }

    /// 溜まったイベントを取り出す
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// 次の完全な行を読む
    ///
    /// データが無ければ `retry_delay` だけ待って一度だけ再試行し、それでも無ければ `None` を返します。
    pub fn read_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.try_read_line()? {
            return Ok(Some(line));
        }
        std::thread::sleep(self.config.retry_delay);
        self.try_read_line()
    }

    fn try_read_line(&mut self) -> Result<Option<String>> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.lines.next_line(&mut self.transcript) {
                debug!("<- {}", line);
                return Ok(Some(line));
            }
            let n = self.channel.read(&mut buf)?;
            if n == 0 {
                self.lines.flush_partial(&mut self.transcript);
                return Ok(None);
            }
            self.lines.feed(&buf[..n]);
        }
    }

    /// 読める行を全て未処理キューに入れる
    ///
    /// 未終端のバッファがプロンプトで始まっているかを返します。
    /// プロンプトでなければ子プロセスが別の入力を待っているとみなしてINPUT状態になり、
    /// INPUT状態でプロンプトが戻ればREADYに戻ります。
    pub fn read_lines(&mut self) -> Result<bool> {
        let lines = self.collect_lines(true)?;
        self.pending.extend(lines);
        Ok(self.lines.partial_starts_with(self.profile.prompt()))
    }

    fn collect_lines(&mut self, check_prompt: bool) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line()? {
            lines.push(line);
        }
        if check_prompt {
            self.check_prompt();
        }
        Ok(lines)
    }

    fn check_prompt(&mut self) {
        if !self.lines.partial_starts_with(self.profile.prompt()) {
            if self.state != State::Input {
                debug!("child is waiting for input: {:?}", String::from_utf8_lossy(self.lines.partial()));
            }
            self.set_state(State::Input);
        } else if self.state == State::Input {
            self.set_state(State::Ready);
        }
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            trace!("state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// 子プロセスへそのまま書き込む（改行は付けない）
    pub fn write(&mut self, text: &str) -> Result<()> {
        self.lines.discard_partial(&mut self.transcript);
        self.channel.write_all(text.as_bytes())?;
        self.transcript.append(text);
        debug!("-> {:?}", text);
        std::thread::sleep(self.config.write_settle);
        Ok(())
    }

    /// 子プロセスへ1行送る
    ///
    /// 未終端のバッファ（通常はプロンプト）は捨て、コンソール記録には送った行を追加します。
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        self.lines.discard_partial(&mut self.transcript);
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');
        self.channel.write_all(&data)?;
        self.transcript.append(text);
        self.transcript.close_entry();
        debug!("-> {}", text);
        std::thread::sleep(self.config.write_settle);
        Ok(())
    }

    /// 子プロセスの出力を処理する
    ///
    /// デバッグ対象プログラム自身の出力を転送してから行を読み、未処理キューを順に処理します。
    /// `catch` の場合はルールを適用せず、最初の空でない行を応答として記録して止まります
    /// （状態遷移も起きません）。
    pub fn process(&mut self, catch: bool) -> Result<ProcessStatus> {
        self.forward_program_output()?;

        let lines = self.collect_lines(!catch)?;
        self.pending.extend(lines);
        if self.autokill {
            return Ok(ProcessStatus::Autokill);
        }

        while let Some(line) = self.pending.pop_front() {
            if catch {
                if line.is_empty() {
                    continue;
                }
                self.catch_reply = Some(line);
                return Ok(ProcessStatus::Running);
            }

            self.dispatch(&line, 0)?;
            if self.autokill {
                return Ok(ProcessStatus::Autokill);
            }
        }
        Ok(ProcessStatus::Running)
    }

    /// 式を評価して応答を1行だけ返す
    ///
    /// 応答はルールを通さずにそのまま返します。応答の2行目以降は捨て、
    /// 評価前から未処理だった行は次の `process` のために残します。
    pub fn evaluate(&mut self, expression: &str) -> Result<String> {
        let earlier = std::mem::take(&mut self.pending);
        self.catch_reply = None;

        let command = self.profile.evaluate_command(expression);
        self.write_line(&command)?;
        let status = self.process(true);

        let rest = std::mem::replace(&mut self.pending, earlier);
        if !rest.is_empty() {
            debug!("discarded {} extra reply line(s) for '{}'", rest.len(), expression);
        }
        let _ = status?;
        Ok(self.catch_reply.clone().unwrap_or_default())
    }

    fn forward_program_output(&mut self) -> Result<()> {
        if let Some(output) = self.output.as_mut() {
            let bytes = output.read_available()?;
            if !bytes.is_empty() {
                trace!("program output: {} byte(s)", bytes.len());
                self.events.push(Event::ConsoleOutput(bytes));
            }
        }
        Ok(())
    }

    /// 1行にルールを適用する
    fn dispatch(&mut self, line: &str, depth: usize) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        let effects = match first_match(profile.rules(), line) {
            Some(m) => {
                trace!("rule #{} matched {:?}", m.index, line);
                m.rule.effects(&m.captures)
            }
            None => {
                trace!("unmatched line dropped: {:?}", line);
                return Ok(());
            }
        };

        for effect in effects {
            self.apply(effect, depth)?;
            if self.autokill {
                break;
            }
        }
        Ok(())
    }

    fn apply(&mut self, effect: Effect, depth: usize) -> Result<()> {
        match effect {
            Effect::SetState(state) => self.set_state(state),
            Effect::Send(command) => self.auto_send(&command, depth)?,
            Effect::PopStack => {
                if self.stack.pop().is_some() {
                    self.events.push(Event::StackPop);
                }
            }
            Effect::MarkCapture => self.stack.arm_capture(),
            Effect::CaptureBreakpointId(id) => {
                self.breakpoint_id = Some(id);
                self.events.push(Event::BreakpointCaptured(Some(id)));
            }
            Effect::ClearBreakpointId => {
                self.breakpoint_id = None;
                self.events.push(Event::BreakpointCaptured(None));
            }
            Effect::SetAutokill => {
                info!("program finished, session should be torn down");
                self.autokill = true;
                self.events.push(Event::Autokill);
            }
            Effect::Execution {
                file,
                line,
                result,
                error,
            } => self.show_execution(file, line, result, error),
            Effect::Error(message) => {
                warn!("{}", message);
                self.set_state(State::Error);
                self.events.push(Event::Error(message));
            }
        }
        Ok(())
    }

    /// 自動送信し、その応答を次のキュー行より先に処理する
    fn auto_send(&mut self, command: &str, depth: usize) -> Result<()> {
        if depth >= self.config.max_send_depth {
            warn!("suppressing auto-send of '{}': nesting depth {} reached", command, depth);
            return Ok(());
        }

        self.write_line(command)?;
        let lines = self.collect_lines(true)?;
        for line in lines {
            self.dispatch(&line, depth + 1)?;
            if self.autokill {
                break;
            }
        }
        Ok(())
    }

    fn show_execution(&mut self, file: String, line: u32, result: Option<String>, error: Option<String>) {
        if let Some(error) = &error {
            warn!("{}:{}: {}", file, line, error);
        }

        let capture = self.stack.take_capture();
        self.events.push(Event::Execution {
            file: file.clone(),
            line,
            result,
            error,
        });

        if capture {
            let text = self.sources.line(&file, line);
            let frame = StackFrame::new(file, line, text);
            self.stack.push(frame.clone());
            self.events.push(Event::StackPush(frame));
        }
    }

    /// セッションを終了する
    ///
    /// 子プロセスの終了、ptyのクローズ、パイプの削除はdropで行われます。
    pub fn kill(self) {
        info!("killing {} session", self.profile.name());
        drop(self);
    }
}
