//! インターフェースプロファイル
//!
//! 1種類のデバッガREPLを動かすための設定一式（起動コマンド、プロンプト、
//! 対象ファイルの判定、自動応答ルール表）です。セッション開始時に1つ選ばれ、以後変更されません。

use crate::rule::{Action, AutoresponseRule};
use crate::state::State;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// 起動テンプレートのソースファイル
pub const VAR_SOURCE_FILE: &str = "SourceFile";
/// 起動テンプレートの引数文字列
pub const VAR_ARGS: &str = "Args";
/// autostartコマンドの出力パイプのパス
pub const VAR_OUTPUT_PIPE: &str = "OutputPipe";
/// ウォッチコマンドの式
pub const VAR_EXPRESSION: &str = "Expression";

/// デフォルトのウォッチコマンド
const DEFAULT_EVALUATE: &str = "print %(Expression)s";

/// pdb用の出力分離シム
///
/// 呼び出し元フレームのファイル名を見て、デバッガ自身の書き込みは本来の標準出力へ、
/// それ以外（デバッグ対象プログラムの書き込み）は名前付きパイプへ送ります。
const PDB_OUTPUT_SHIM: &str = r#"!exec("import os, sys\nclass _PtydbSplit(object):\n\tdef __init__(self, debugout, processout):\n\t\tself.debugout = debugout\n\t\tself.processout = processout\n\tdef write(self, buf):\n\t\tif os.path.basename(sys._getframe(1).f_code.co_filename) in ('cmd.py', 'pdb.py', 'bdb.py', '<stdin>'):\n\t\t\tself.debugout.write(buf)\n\t\telse:\n\t\t\tself.processout.write(buf)\n\tdef flush(self):\n\t\tself.debugout.flush()\n\t\tself.processout.flush()\n")"#;

/// pdb用のstdout差し替え
const PDB_OUTPUT_REDIRECT: &str =
    "!sys.stdout = _PtydbSplit(sys.__stdout__, open('%(OutputPipe)s', 'w', 0))";

/// `%(Name)s` 形式のプレースホルダを置き換える
pub fn expand_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("%({})s", name), value)
    })
}

/// ルールの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl RuleConfig {
    /// ルール設定を作成する
    pub fn new(pattern: &str, actions: Vec<Action>) -> Self {
        Self {
            pattern: pattern.to_string(),
            actions,
        }
    }
}

/// プロファイルの設定（JSONから読み込める形）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    /// 起動コマンドのテンプレート（`%(SourceFile)s`, `%(Args)s`）
    pub exec: String,
    /// 起動直後に送るコマンド（`%(OutputPipe)s`）
    #[serde(default)]
    pub autostart: Vec<String>,
    /// アイドル時にデバッガが出すプロンプト
    pub prompt: String,
    /// 対象ファイルのパスに対する判定パターン
    pub file_pattern: String,
    /// ウォッチ評価コマンドのテンプレート（`%(Expression)s`）
    #[serde(default = "default_evaluate")]
    pub evaluate: String,
    pub rules: Vec<RuleConfig>,
}

fn default_evaluate() -> String {
    DEFAULT_EVALUATE.to_string()
}

impl ProfileConfig {
    /// JSON文字列から読み込む
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// JSONファイルから読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read profile {}: {}", path.display(), e))?;
        Self::from_json(&text)
    }

    /// パターンをコンパイルしてプロファイルを作成する
    pub fn compile(&self) -> Result<InterfaceProfile> {
        let file_pattern = Regex::new(&self.file_pattern)
            .map_err(|e| anyhow::anyhow!("invalid file pattern '{}': {}", self.file_pattern, e))?;
        let rules = self
            .rules
            .iter()
            .map(|r| AutoresponseRule::new(&r.pattern, r.actions.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(InterfaceProfile {
            name: self.name.clone(),
            exec: self.exec.clone(),
            autostart: self.autostart.clone(),
            prompt: self.prompt.clone(),
            file_pattern,
            evaluate: self.evaluate.clone(),
            rules,
        })
    }
}

/// インターフェースプロファイル
#[derive(Debug, Clone)]
pub struct InterfaceProfile {
    name: String,
    exec: String,
    autostart: Vec<String>,
    prompt: String,
    file_pattern: Regex,
    evaluate: String,
    rules: Vec<AutoresponseRule>,
}

impl InterfaceProfile {
    /// 組み込みのpdbプロファイル
    pub fn pdb() -> Result<Self> {
        pdb_config().compile()
    }

    /// プロファイル名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// プロンプト文字列
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// 自動応答ルール表
    pub fn rules(&self) -> &[AutoresponseRule] {
        &self.rules
    }

    /// このプロファイルが対象ファイルを扱えるか
    pub fn matches_file(&self, path: &str) -> bool {
        self.file_pattern.is_match(path)
    }

    /// 起動コマンドを展開してargvに分割する
    ///
    /// ソースファイルのパスはクォートしてから埋め込むので、空白を含んでいても1つの引数になります。
    /// 引数文字列はシェルと同じ規則で分割されます。
    pub fn spawn_argv(&self, source_file: &str, args: &str) -> Result<Vec<String>> {
        let quoted = shlex::try_quote(source_file)
            .map_err(|e| anyhow::anyhow!("cannot quote source file '{}': {}", source_file, e))?;
        let command = expand_template(&self.exec, &[(VAR_SOURCE_FILE, &*quoted), (VAR_ARGS, args)]);
        let argv = shlex::split(&command)
            .ok_or_else(|| anyhow::anyhow!("cannot tokenize command line: {}", command))?;
        if argv.is_empty() {
            anyhow::bail!("empty command line for profile '{}'", self.name);
        }
        Ok(argv)
    }

    /// 起動直後に送るコマンド列
    pub fn autostart_commands(&self, output_pipe: &Path) -> Vec<String> {
        let pipe = output_pipe.to_string_lossy();
        self.autostart
            .iter()
            .map(|c| expand_template(c, &[(VAR_OUTPUT_PIPE, &*pipe)]))
            .collect()
    }

    /// ウォッチ評価コマンド
    pub fn evaluate_command(&self, expression: &str) -> String {
        expand_template(&self.evaluate, &[(VAR_EXPRESSION, expression)])
    }
}

/// 組み込みのpdbプロファイルの設定
pub fn pdb_config() -> ProfileConfig {
    use Action::*;

    let execution = |result: Option<usize>, error: Option<usize>| EmitExecution {
        file: 1,
        line: 2,
        result,
        error,
    };
    let send = |command: &str| Send {
        command: command.to_string(),
    };

    ProfileConfig {
        name: "pdb".to_string(),
        exec: "/usr/bin/python -i -m pdb %(SourceFile)s %(Args)s".to_string(),
        autostart: vec![PDB_OUTPUT_SHIM.to_string(), PDB_OUTPUT_REDIRECT.to_string()],
        prompt: "(Pdb) ".to_string(),
        file_pattern: r"\.py$".to_string(),
        evaluate: DEFAULT_EVALUATE.to_string(),
        rules: vec![
            RuleConfig::new(r"\(Pdb\) .*", vec![Noop]),
            RuleConfig::new(r"^\s*> <string>\(1\)\?\(\)->None", vec![Noop]),
            RuleConfig::new(r"^\s*-> .*", vec![Noop]),
            RuleConfig::new(r"^\s*> <string>\((\d+)\).*", vec![send("next")]),
            RuleConfig::new(r"^\s*> (.*)\((\d+)\).*\(\)", vec![execution(None, None)]),
            RuleConfig::new(r"^\s*> (.*)\((\d+)\).*\(\)->\((.*)\)", vec![execution(Some(3), None)]),
            RuleConfig::new(r"^\s*--Return--", vec![PopStack]),
            RuleConfig::new(r"^\s*--Call--", vec![MarkCapture, send("next")]),
            RuleConfig::new(r"^\s*> <string>.*", vec![send("return")]),
            RuleConfig::new(r"^\s*Breakpoint (\d+) at (.*):(\d+)", vec![CaptureBreakpointId { group: 1 }]),
            RuleConfig::new(r"^\s*\*\*\* There are no breakpoints in .*", vec![Noop]),
            RuleConfig::new(r"^\s*\*\*\* There is no breakpoint at .*:\d+", vec![Noop]),
            RuleConfig::new(r"^\s*End of file", vec![ClearBreakpointId]),
            RuleConfig::new(r"^\s*\*\*\* Blank or comment", vec![ClearBreakpointId]),
            RuleConfig::new(r"^\s*Breakpoint (\d+) is now unconditional.", vec![CaptureBreakpointId { group: 1 }]),
            RuleConfig::new(r"^\s*The program finished and will be restarted", vec![SetAutokill]),
            RuleConfig::new(
                r"^\s*SyntaxError: \('(.*)', \('(.*)', (\d+), \d+, '(.*)'\)\)",
                vec![
                    SetState { state: State::Error },
                    EmitExecution {
                        file: 2,
                        line: 3,
                        result: None,
                        error: Some(1),
                    },
                ],
            ),
            RuleConfig::new(r"^\s*(?:\*\*\*)* ?(.*Error:.*)", vec![EmitError { message: 1 }]),
        ],
    }
}

/// 組み込みプロファイルの一覧
pub fn builtin_profiles() -> Result<Vec<Arc<InterfaceProfile>>> {
    Ok(vec![Arc::new(InterfaceProfile::pdb()?)])
}

/// 対象ファイルを扱える最初のプロファイルを選ぶ
pub fn select_profile<'a>(
    profiles: &'a [Arc<InterfaceProfile>],
    path: &str,
) -> Option<&'a Arc<InterfaceProfile>> {
    profiles.iter().find(|p| p.matches_file(path))
}
