//! ブレークポイント管理

use std::collections::BTreeMap;

/// ブレークポイントの位置キー（`file:line`）を作る
pub fn location_key(file: &str, line: u32) -> String {
    format!("{}:{}", file, line)
}

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// デバッガが割り当てた番号（セッションが無いときは `None`）
    pub id: Option<u32>,
    pub file: String,
    pub line: u32,
    /// 条件式（空なら無条件）
    pub condition: String,
}

impl Breakpoint {
    /// 新しいブレークポイントを作成する
    pub fn new(id: Option<u32>, file: impl Into<String>, line: u32) -> Self {
        Self {
            id,
            file: file.into(),
            line,
            condition: String::new(),
        }
    }

    /// 位置キー
    pub fn key(&self) -> String {
        location_key(&self.file, self.line)
    }

    pub fn is_conditional(&self) -> bool {
        !self.condition.is_empty()
    }
}

/// ブレークポイントレジストリ
///
/// セッションをまたいでユーザーのブレークポイントを保持します。
/// 再起動時に同じ順序で再設定できるよう、位置キーの順に並べて管理します。
#[derive(Debug, Clone, Default)]
pub struct BreakpointRegistry {
    breakpoints: BTreeMap<String, Breakpoint>,
}

impl BreakpointRegistry {
    /// 新しいブレークポイントレジストリを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// ブレークポイントを登録する（同じ位置のものは置き換える）
    pub fn insert(&mut self, breakpoint: Breakpoint) -> Option<Breakpoint> {
        self.breakpoints.insert(breakpoint.key(), breakpoint)
    }

    /// ブレークポイントを削除する
    pub fn remove(&mut self, key: &str) -> Option<Breakpoint> {
        self.breakpoints.remove(key)
    }

    /// ブレークポイントを取得する
    pub fn get(&self, key: &str) -> Option<&Breakpoint> {
        self.breakpoints.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Breakpoint> {
        self.breakpoints.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.breakpoints.contains_key(key)
    }

    /// 全ての位置キーを取得する
    pub fn keys(&self) -> Vec<String> {
        self.breakpoints.keys().cloned().collect()
    }

    /// 全てのブレークポイントを取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// 全てのデバッガ番号を消す（セッション終了時）
    pub fn forget_ids(&mut self) {
        for breakpoint in self.breakpoints.values_mut() {
            breakpoint.id = None;
        }
    }

    /// ブレークポイントの数を取得する
    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_keyed_by_location() {
        let mut registry = BreakpointRegistry::new();
        assert!(registry.insert(Breakpoint::new(Some(1), "/tmp/b.py", 3)).is_none());
        assert!(registry.insert(Breakpoint::new(Some(2), "/tmp/a.py", 10)).is_none());

        let replaced = registry.insert(Breakpoint::new(Some(3), "/tmp/a.py", 10));
        assert_eq!(replaced.and_then(|bp| bp.id), Some(2));
        assert_eq!(registry.count(), 2);

        // 位置キーの順に並ぶ
        assert_eq!(registry.keys(), vec!["/tmp/a.py:10", "/tmp/b.py:3"]);
    }

    #[test]
    fn test_forget_ids() {
        let mut registry = BreakpointRegistry::new();
        registry.insert(Breakpoint::new(Some(5), "/tmp/a.py", 1));
        registry.forget_ids();

        let bp = registry.get("/tmp/a.py:1").unwrap();
        assert_eq!(bp.id, None);
        assert!(!bp.is_conditional());
    }
}
