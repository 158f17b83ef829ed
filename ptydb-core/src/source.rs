//! ソースファイルの行キャッシュ

use std::collections::HashMap;
use tracing::debug;

/// ソースファイルの行を読み込んでキャッシュする
#[derive(Debug, Default)]
pub struct SourceCache {
    files: HashMap<String, Option<Vec<String>>>,
}

impl SourceCache {
    /// 新しいキャッシュを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定した行（1始まり）のテキストを取得する
    ///
    /// ファイルが読めない場合や行が範囲外の場合は空文字列を返します。
    pub fn line(&mut self, file: &str, line: u32) -> String {
        let lines = self.files.entry(file.to_string()).or_insert_with(|| {
            match std::fs::read_to_string(file) {
                Ok(content) => Some(content.lines().map(str::to_string).collect()),
                Err(e) => {
                    debug!("cannot read source {}: {}", file, e);
                    None
                }
            }
        });

        lines
            .as_ref()
            .and_then(|lines| lines.get((line as usize).checked_sub(1)?))
            .cloned()
            .unwrap_or_default()
    }
}
