//! コンソールの記録
//!
//! 送信したコマンドと受信したテキストを順に記録し、端末風の表示を再構成できるようにします。

/// コンソールの記録（エントリの並び）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<String>,
}

impl Transcript {
    /// 空のエントリを1つ持つ記録を作成する
    pub fn new() -> Self {
        Self {
            entries: vec![String::new()],
        }
    }

    /// 現在のエントリにテキストを追加する
    pub fn append(&mut self, text: &str) {
        if let Some(last) = self.entries.last_mut() {
            last.push_str(text);
        }
    }

    /// 現在のエントリを閉じて新しいエントリを開く
    pub fn close_entry(&mut self) {
        self.entries.push(String::new());
    }

    /// 全てのエントリを取得する
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// 現在の（最後の）エントリ
    ///
    /// アイドル時はデバッガのプロンプトになっています。
    pub fn current(&self) -> &str {
        self.entries.last().map(String::as_str).unwrap_or("")
    }

    /// 全エントリを連結する
    pub fn concat(&self) -> String {
        self.entries.concat()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_close() {
        let mut transcript = Transcript::new();
        transcript.append("(Pdb) ");
        transcript.append("next");
        transcript.close_entry();
        transcript.append("> /tmp/a.py(2)<module>()");

        assert_eq!(transcript.entries(), &["(Pdb) next", "> /tmp/a.py(2)<module>()"]);
        assert_eq!(transcript.current(), "> /tmp/a.py(2)<module>()");
        assert_eq!(transcript.concat(), "(Pdb) next> /tmp/a.py(2)<module>()");
    }
}
