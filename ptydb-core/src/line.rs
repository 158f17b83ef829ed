//! ptyの生バイト列を行に分割するバッファ

use crate::transcript::Transcript;

/// 行区切り（ptyのONLCRにより `\r\n` で届く）
const LINE_DELIMITER: u8 = b'\r';

/// 行バッファ
///
/// 受信したバイトを溜め、`\r` で区切って行を取り出します。
/// `\r` の直後の `\n` は区切りの一部として捨てます（次の読み取りで届いた場合も同様）。
/// 未終端の部分がどこまでコンソール記録に書かれたかを覚えておき、二重に記録しません。
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    transcribed: usize,
    skip_lf: bool,
}

impl LineBuffer {
    /// 空のバッファを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信したバイトを追加する
    pub fn feed(&mut self, mut data: &[u8]) {
        if self.skip_lf && !data.is_empty() {
            self.skip_lf = false;
            if data[0] == b'\n' {
                data = &data[1..];
            }
        }
        self.pending.extend_from_slice(data);
    }

    /// 完全な行を1つ取り出す
    ///
    /// 行のうちまだ記録されていない部分を `transcript` に追加し、新しいエントリを開きます。
    pub fn next_line(&mut self, transcript: &mut Transcript) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == LINE_DELIMITER)?;

        let rest = self.pending.split_off(pos + 1);
        let mut raw = std::mem::replace(&mut self.pending, rest);
        raw.pop();

        match self.pending.first() {
            Some(b'\n') => {
                self.pending.remove(0);
            }
            Some(_) => {}
            None => self.skip_lf = true,
        }

        let tail = self.transcribed.min(raw.len());
        transcript.append(&String::from_utf8_lossy(&raw[tail..]));
        transcript.close_entry();
        self.transcribed = 0;

        Some(String::from_utf8_lossy(&raw).into_owned())
    }

    /// 未終端の部分のうち未記録のものを記録する
    ///
    /// マルチバイト文字の途中では区切らず、有効なUTF-8の範囲だけを記録します。
    pub fn flush_partial(&mut self, transcript: &mut Transcript) {
        let untranscribed = &self.pending[self.transcribed..];
        let valid = match std::str::from_utf8(untranscribed) {
            Ok(s) => s.len(),
            Err(e) => e.valid_up_to(),
        };
        if valid > 0 {
            transcript.append(&String::from_utf8_lossy(&untranscribed[..valid]));
            self.transcribed += valid;
        }
    }

    /// 未終端の部分を記録してから捨てる
    ///
    /// コマンドを送信する直前に呼ばれます（通常はプロンプトが残っている）。
    pub fn discard_partial(&mut self, transcript: &mut Transcript) {
        let untranscribed = &self.pending[self.transcribed..];
        if !untranscribed.is_empty() {
            transcript.append(&String::from_utf8_lossy(untranscribed));
        }
        self.pending.clear();
        self.transcribed = 0;
    }

    /// 未終端の部分
    pub fn partial(&self) -> &[u8] {
        &self.pending
    }

    /// 未終端の部分が指定したプロンプトで始まっているか
    pub fn partial_starts_with(&self, prompt: &str) -> bool {
        self.pending.starts_with(prompt.as_bytes())
    }
}
