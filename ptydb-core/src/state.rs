//! セッションの状態

use serde::{Deserialize, Serialize};

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// 次のステップ実行コマンドを受け付ける
    #[default]
    Ready,
    /// 直前の操作がエラーになった（ステップ実行は可能）
    Error,
    /// コンソール表示にフォーカスがある
    Console,
    /// 子プロセスがデバッガのプロンプト以外の入力を待っている
    Input,
}

impl State {
    /// ステップ実行コマンドを受け付けるかどうか
    pub fn accepts_stepping(self) -> bool {
        matches!(self, State::Ready | State::Error)
    }

    /// キー入力を行単位のコマンドではなくそのまま子プロセスへ送るべきか
    pub fn routes_raw_input(self) -> bool {
        matches!(self, State::Console | State::Input)
    }
}
