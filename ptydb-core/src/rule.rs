//! 自動応答ルール
//!
//! ルールは (パターン, アクション列) の組です。パターンは行の先頭から照合され、
//! アクションは閉じた語彙の中から選ばれ、キャプチャグループを位置で参照します。
//! キャプチャしたテキストはコードとして評価されることはなく、型付きの引数として渡されます。

use crate::state::State;
use crate::Result;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// ルールのアクション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// 何もしない（プロンプトのエコーなどを読み捨てる）
    Noop,
    /// セッションの状態を遷移させる
    SetState { state: State },
    /// 子プロセスへ1行送る（`%N` はN番目のキャプチャグループに置き換えられる）
    Send { command: String },
    /// スタックフレームを1つ取り除く
    PopStack,
    /// 次の実行位置でフレームを積むよう予約する
    MarkCapture,
    /// ブレークポイント番号を記録する
    CaptureBreakpointId { group: usize },
    /// 記録したブレークポイント番号を消す
    ClearBreakpointId,
    /// 子プロセスが終了・再起動しようとしていることを記録する
    SetAutokill,
    /// 実行位置を通知する
    EmitExecution {
        file: usize,
        line: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<usize>,
    },
    /// エラーを通知する（状態はERRORになる）
    EmitError { message: usize },
}

/// キャプチャグループを解決した後のアクション
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SetState(State),
    Send(String),
    PopStack,
    MarkCapture,
    CaptureBreakpointId(u32),
    ClearBreakpointId,
    SetAutokill,
    Execution {
        file: String,
        line: u32,
        result: Option<String>,
        error: Option<String>,
    },
    Error(String),
}

impl Action {
    /// キャプチャグループを解決して実行可能な効果にする
    ///
    /// `Noop` の場合や、参照したグループが存在しない・数値でない場合は `None` を返します。
    pub fn resolve(&self, captures: &Captures) -> Option<Effect> {
        match self {
            Action::Noop => None,
            Action::SetState { state } => Some(Effect::SetState(*state)),
            Action::Send { command } => Some(Effect::Send(substitute_groups(command, captures))),
            Action::PopStack => Some(Effect::PopStack),
            Action::MarkCapture => Some(Effect::MarkCapture),
            Action::CaptureBreakpointId { group } => {
                number_group(captures, *group).map(Effect::CaptureBreakpointId)
            }
            Action::ClearBreakpointId => Some(Effect::ClearBreakpointId),
            Action::SetAutokill => Some(Effect::SetAutokill),
            Action::EmitExecution {
                file,
                line,
                result,
                error,
            } => Some(Effect::Execution {
                file: text_group(captures, *file)?.to_string(),
                line: number_group(captures, *line)?,
                result: result.and_then(|g| text_group(captures, g)).map(str::to_string),
                error: error.and_then(|g| text_group(captures, g)).map(str::to_string),
            }),
            Action::EmitError { message } => {
                text_group(captures, *message).map(|m| Effect::Error(m.to_string()))
            }
        }
    }
}

/// 自動応答ルール
#[derive(Debug, Clone)]
pub struct AutoresponseRule {
    source: String,
    pattern: Regex,
    actions: Vec<Action>,
}

impl AutoresponseRule {
    /// ルールを作成する
    ///
    /// パターンは行の先頭に固定して照合されます（`^(?:pattern)` としてコンパイル）。
    pub fn new(pattern: &str, actions: Vec<Action>) -> Result<Self> {
        let compiled = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| anyhow::anyhow!("invalid rule pattern '{}': {}", pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            pattern: compiled,
            actions,
        })
    }

    /// 元のパターン文字列
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// アクション列
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// 行に照合する
    pub fn captures<'l>(&self, line: &'l str) -> Option<Captures<'l>> {
        self.pattern.captures(line)
    }

    /// アクション列を解決する
    pub fn effects(&self, captures: &Captures) -> Vec<Effect> {
        self.actions
            .iter()
            .filter_map(|action| action.resolve(captures))
            .collect()
    }
}

/// ルール照合の結果
pub struct RuleMatch<'r, 'l> {
    /// ルール表の中での位置
    pub index: usize,
    pub rule: &'r AutoresponseRule,
    pub captures: Captures<'l>,
}

/// 表の順に照合し、最初にマッチしたルールを返す
pub fn first_match<'r, 'l>(rules: &'r [AutoresponseRule], line: &'l str) -> Option<RuleMatch<'r, 'l>> {
    rules.iter().enumerate().find_map(|(index, rule)| {
        rule.captures(line).map(|captures| RuleMatch {
            index,
            rule,
            captures,
        })
    })
}

/// `%N` をN番目のキャプチャグループ（末尾の空白を除く）に置き換える
///
/// `%1` と `%10` が衝突しないよう、番号の大きい方から置き換えます。
pub fn substitute_groups(template: &str, captures: &Captures) -> String {
    let mut out = template.to_string();
    for i in (0..captures.len()).rev() {
        let placeholder = format!("%{}", i);
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, text_group(captures, i).unwrap_or(""));
        }
    }
    out
}

fn text_group<'l>(captures: &Captures<'l>, group: usize) -> Option<&'l str> {
    let text = captures.get(group).map(|m| m.as_str().trim_end());
    if text.is_none() {
        warn!("rule references missing capture group {}", group);
    }
    text
}

fn number_group(captures: &Captures, group: usize) -> Option<u32> {
    let text = text_group(captures, group)?;
    match text.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("capture group {} is not a number: {:?}", group, text);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchored_at_line_start() {
        let rule = AutoresponseRule::new(r"\(Pdb\) .*", vec![Action::Noop]).unwrap();
        assert!(rule.captures("(Pdb) where").is_some());
        assert!(rule.captures("x (Pdb) where").is_none());
    }

    #[test]
    fn test_resolve_execution() {
        let rule = AutoresponseRule::new(
            r"^\s*> (.*)\((\d+)\).*\(\)",
            vec![Action::EmitExecution {
                file: 1,
                line: 2,
                result: None,
                error: None,
            }],
        )
        .unwrap();

        let captures = rule.captures("> /tmp/a.py(10)foo()").unwrap();
        assert_eq!(
            rule.effects(&captures),
            vec![Effect::Execution {
                file: "/tmp/a.py".to_string(),
                line: 10,
                result: None,
                error: None,
            }]
        );
    }

    #[test]
    fn test_missing_group_is_skipped() {
        let rule = AutoresponseRule::new(
            r"^Breakpoint (\d+)",
            vec![Action::CaptureBreakpointId { group: 2 }, Action::SetAutokill],
        )
        .unwrap();

        let captures = rule.captures("Breakpoint 4").unwrap();
        assert_eq!(rule.effects(&captures), vec![Effect::SetAutokill]);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            AutoresponseRule::new(r"^\s*Breakpoint (\d+) at", vec![Action::CaptureBreakpointId { group: 1 }]).unwrap(),
            AutoresponseRule::new(r"^\s*Breakpoint", vec![Action::ClearBreakpointId]).unwrap(),
        ];

        let m = first_match(&rules, "Breakpoint 3 at /tmp/a.py:10").unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.rule.effects(&m.captures), vec![Effect::CaptureBreakpointId(3)]);

        // 重なるルールの順序を入れ替えると結果が変わる
        let reversed: Vec<_> = rules.into_iter().rev().collect();
        let m = first_match(&reversed, "Breakpoint 3 at /tmp/a.py:10").unwrap();
        assert_eq!(m.rule.effects(&m.captures), vec![Effect::ClearBreakpointId]);

        assert!(first_match(&reversed, "unrelated output").is_none());
    }

    #[test]
    fn test_substitute_groups() {
        let regex = Regex::new(r"^(\w+) (\w+)   $").unwrap();
        let captures = regex.captures("alpha beta   ").unwrap();
        assert_eq!(substitute_groups("print %2 %1", &captures), "print beta alpha");
        assert_eq!(substitute_groups("next", &captures), "next");
    }

    #[test]
    fn test_action_from_json() {
        let json = r#"[
            {"action": "mark_capture"},
            {"action": "send", "command": "next"},
            {"action": "set_state", "state": "error"},
            {"action": "emit_execution", "file": 2, "line": 3, "error": 1}
        ]"#;
        let actions: Vec<Action> = serde_json::from_str(json).unwrap();
        assert_eq!(
            actions,
            vec![
                Action::MarkCapture,
                Action::Send {
                    command: "next".to_string()
                },
                Action::SetState { state: State::Error },
                Action::EmitExecution {
                    file: 2,
                    line: 3,
                    result: None,
                    error: Some(1),
                },
            ]
        );
    }
}
