//! 子プロセスとのバイトストリーム

use crate::Result;

/// デバッガとの双方向チャネル
///
/// 実装はノンブロッキングであること。読み取るデータがまだ無い場合は
/// エラーではなく `Ok(0)` を返します。
pub trait Channel {
    /// 読み取り可能なバイトを読む（データが無ければ `Ok(0)`）
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// 全バイトを書き込む
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
}

/// デバッグ対象プログラム自身の出力（読み取り専用）
pub trait OutputSource {
    /// 読み取り可能なバイトを読む（データが無ければ `Ok(0)`）
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// 現在読み取れるバイトをすべて読む
    fn read_available(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }
}
