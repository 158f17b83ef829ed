//! ウォッチ式の管理

use crate::errors::ERR_WATCH_NOT_FOUND;
use crate::Result;

/// セッションが無いときに評価結果の代わりに返す文字列
pub const NO_SESSION_REPLY: &str = "Debug session not in progress";

/// ウォッチ式のリスト（表示順）
#[derive(Debug, Clone, Default)]
pub struct WatchList {
    expressions: Vec<String>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 式を末尾に追加し、その位置を返す
    pub fn add(&mut self, expression: &str) -> usize {
        self.expressions.push(expression.trim().to_string());
        self.expressions.len() - 1
    }

    /// 式を書き換える
    pub fn replace(&mut self, index: usize, expression: &str) -> Result<()> {
        let slot = self
            .expressions
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("{}: #{}", ERR_WATCH_NOT_FOUND, index + 1))?;
        *slot = expression.trim().to_string();
        Ok(())
    }

    /// 式を削除する
    pub fn remove(&mut self, index: usize) -> Result<String> {
        if index >= self.expressions.len() {
            anyhow::bail!("{}: #{}", ERR_WATCH_NOT_FOUND, index + 1);
        }
        Ok(self.expressions.remove(index))
    }

    /// 1つ上へ移動する（移動できたら `true`）
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.expressions.len() {
            return false;
        }
        self.expressions.swap(index - 1, index);
        true
    }

    /// 1つ下へ移動する（移動できたら `true`）
    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.expressions.len() {
            return false;
        }
        self.expressions.swap(index, index + 1);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.expressions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}
