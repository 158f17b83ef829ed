//! セッションのテスト用のスクリプト化されたデバッガ

#![allow(dead_code)]

use ptydb_core::{Channel, InterfaceProfile, OutputSource, Session, SessionConfig};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

pub const PROMPT: &str = "(Pdb) ";

/// スクリプトの状態（テストとセッションで共有する）
#[derive(Default)]
pub struct Script {
    /// セッションがまだ読んでいないバイト
    inbox: VecDeque<u8>,
    /// コマンドごとの応答
    replies: HashMap<String, String>,
    /// セッションが送ったコマンド
    sent: Vec<String>,
}

/// コマンドに決まった応答を返すチャネル
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    script: Rc<RefCell<Script>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 読み取り待ちのバイトを追加する
    pub fn push(&self, text: &str) {
        self.script.borrow_mut().inbox.extend(text.as_bytes());
    }

    /// `lines` を `\r\n` 区切りで、最後にプロンプトを付けて追加する
    pub fn push_lines(&self, lines: &[&str]) {
        self.push(&transcript_text(lines));
    }

    /// コマンドへの応答を登録する（応答の最後にはプロンプトが付く）
    pub fn reply(&self, command: &str, lines: &[&str]) {
        self.script
            .borrow_mut()
            .replies
            .insert(command.to_string(), transcript_text(lines));
    }

    /// 送られたコマンドの一覧
    pub fn sent(&self) -> Vec<String> {
        self.script.borrow().sent.clone()
    }
}

fn transcript_text(lines: &[&str]) -> String {
    let mut text: String = lines.iter().map(|l| format!("{}\r\n", l)).collect();
    text.push_str(PROMPT);
    text
}

impl Channel for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> ptydb_core::Result<usize> {
        let mut script = self.script.borrow_mut();
        let n = buf.len().min(script.inbox.len());
        for (slot, byte) in buf.iter_mut().zip(script.inbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> ptydb_core::Result<()> {
        let mut script = self.script.borrow_mut();
        let text = String::from_utf8_lossy(data);
        for command in text.lines() {
            script.sent.push(command.to_string());
            if let Some(reply) = script.replies.get(command).cloned() {
                script.inbox.extend(reply.as_bytes());
            }
        }
        Ok(())
    }
}

/// デバッグ対象プログラムの出力
#[derive(Clone, Default)]
pub struct ScriptedOutput {
    bytes: Rc<RefCell<VecDeque<u8>>>,
}

impl ScriptedOutput {
    pub fn push(&self, text: &str) {
        self.bytes.borrow_mut().extend(text.as_bytes());
    }
}

impl OutputSource for ScriptedOutput {
    fn read(&mut self, buf: &mut [u8]) -> ptydb_core::Result<usize> {
        let mut bytes = self.bytes.borrow_mut();
        let n = buf.len().min(bytes.len());
        for (slot, byte) in buf.iter_mut().zip(bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// 待ち時間の無い設定
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        retry_delay: Duration::ZERO,
        write_settle: Duration::ZERO,
        startup_timeout: Duration::from_millis(50),
        ..SessionConfig::default()
    }
}

pub fn pdb() -> Arc<InterfaceProfile> {
    Arc::new(InterfaceProfile::pdb().unwrap())
}

/// pdbプロファイルでスクリプト化されたセッションを作る
pub fn scripted_session(channel: &ScriptedChannel) -> Session {
    Session::from_channels(pdb(), Box::new(channel.clone()), None, fast_config())
}
