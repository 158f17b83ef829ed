//! UI層へ通知する構造化イベント

use crate::stack::StackFrame;

/// セッションが発行するイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// デバッグ対象が `file:line` で停止した
    Execution {
        file: String,
        line: u32,
        /// 関数の戻り値
        result: Option<String>,
        /// エラーメッセージ
        error: Option<String>,
    },
    /// コールスタックにフレームが積まれた
    StackPush(StackFrame),
    /// コールスタックからフレームが取り除かれた
    StackPop,
    /// ブレークポイント番号を取得した（`None` は取得できなかったことを表す）
    BreakpointCaptured(Option<u32>),
    /// 子プロセスが終了・再起動しようとしている
    Autokill,
    /// デバッグ対象プログラム自身の出力
    ConsoleOutput(Vec<u8>),
    /// デバッガが報告したエラー
    Error(String),
}
