//! デバッガコマンド

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ブレークポイントを切り替え（`file:line`）
    Break(String),
    /// ブレークポイントの条件を設定（空なら解除）
    Condition(String, String),
    /// 実行継続
    Continue,
    /// ステップ実行
    Step,
    /// 次の行へ
    Next,
    /// 現在の関数から抜けるまで実行
    Return,
    /// 指定位置まで実行
    Until(String),
    /// ウォッチ式を追加
    Watch(String),
    /// ウォッチ式を削除（1始まり）
    Unwatch(usize),
    /// ウォッチ式の一覧と値を表示
    Watches,
    /// 式を評価して表示
    Print(String),
    /// バックトレース表示
    Backtrace,
    /// ブレークポイント一覧表示
    Breakpoints,
    /// コンソールの記録を表示
    Console,
    /// デバッガへそのまま送る
    Raw(String),
    /// 同じ設定で起動し直す
    Restart,
    /// セッションを終了
    Kill,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(raw) = input.strip_prefix('!') {
            return Some(Command::Raw(raw.trim_start().to_string()));
        }

        let (name, rest) = match input.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };
        let argument = |build: fn(String) -> Command| {
            if rest.is_empty() {
                None
            } else {
                Some(build(rest.to_string()))
            }
        };

        match name {
            "break" | "b" => argument(Command::Break),
            "condition" => {
                if rest.is_empty() {
                    return None;
                }
                let (location, expression) = match rest.split_once(char::is_whitespace) {
                    Some((location, expression)) => (location, expression.trim()),
                    None => (rest, ""),
                };
                Some(Command::Condition(location.to_string(), expression.to_string()))
            }
            "continue" | "c" => Some(Command::Continue),
            "step" | "s" => Some(Command::Step),
            "next" | "n" => Some(Command::Next),
            "return" | "r" | "finish" => Some(Command::Return),
            "until" | "u" => argument(Command::Until),
            "watch" | "w" => argument(Command::Watch),
            "unwatch" => rest.parse().ok().filter(|n| *n > 0).map(Command::Unwatch),
            "watches" => Some(Command::Watches),
            "print" | "p" => argument(Command::Print),
            "backtrace" | "bt" => Some(Command::Backtrace),
            "breakpoints" | "info" => Some(Command::Breakpoints),
            "console" => Some(Command::Console),
            "restart" => Some(Command::Restart),
            "kill" => Some(Command::Kill),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}
