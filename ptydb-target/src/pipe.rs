//! 出力分離用の名前付きパイプ
//!
//! デバッグ対象に注入したシムは、プログラム自身の標準出力をこのパイプへ書き込みます。
//! デバッガのプロンプトや診断メッセージはptyを通るので、2つのストリームが分離されます。

use crate::channel::OutputSource;
use crate::Result;
use nix::sys::stat::Mode;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// パイプのパーミッション（所有者は読み書き可能）
const PIPE_MODE: u32 = 0o644;

/// 名前付きパイプ（FIFO）の読み取り側
pub struct OutputPipe {
    path: PathBuf,
    reader: Option<File>,
}

impl OutputPipe {
    /// プロセスIDからパイプのパスを決める
    pub fn path_for(dir: &Path, pid: u32) -> PathBuf {
        dir.join(format!("ptydb-{}.out", pid))
    }

    /// パイプを作成する（既に存在すればそれを使う）
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            nix::unistd::mkfifo(&path, Mode::from_bits_truncate(PIPE_MODE))
                .map_err(|e| anyhow::anyhow!("mkfifo {}: {}", path.display(), e))?;
            debug!("created output pipe {}", path.display());
        }
        Ok(Self { path, reader: None })
    }

    /// パイプのパスを取得する
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 読み取り側をノンブロッキングで開く
    ///
    /// 書き込み側より先に開いておくことで、デバッグ対象の `open` がブロックしなくなります。
    pub fn open_reader(&mut self) -> Result<()> {
        if self.reader.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .custom_flags(nix::libc::O_NONBLOCK)
                .open(&self.path)
                .map_err(|e| anyhow::anyhow!("open {}: {}", self.path.display(), e))?;
            self.reader = Some(file);
        }
        Ok(())
    }

    /// パイプを閉じて削除する
    ///
    /// 既に閉じている・削除済みの場合も静かに成功します。
    pub fn remove(&mut self) {
        self.reader = None;
        if std::fs::remove_file(&self.path).is_ok() {
            debug!("removed output pipe {}", self.path.display());
        }
    }
}

impl OutputSource for OutputPipe {
    /// 書き込み側が無い（EOF）かデータが無い（WouldBlock）場合は `Ok(0)`
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return Ok(0),
        };
        match reader.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for OutputPipe {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ptydb-test-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_path_for() {
        let path = OutputPipe::path_for(Path::new("/tmp"), 1234);
        assert_eq!(path, PathBuf::from("/tmp/ptydb-1234.out"));
    }

    #[test]
    fn test_create_and_remove() {
        let path = test_path("remove");
        let mut pipe = OutputPipe::create(&path).unwrap();
        assert!(path.exists());

        pipe.remove();
        assert!(!path.exists());

        // 二度目の削除やdropでもエラーにならない
        pipe.remove();
        drop(pipe);
        assert!(!path.exists());
    }

    #[test]
    fn test_read_without_writer() {
        let path = test_path("nowriter");
        let mut pipe = OutputPipe::create(&path).unwrap();
        pipe.open_reader().unwrap();

        assert_eq!(pipe.read_available().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_read_written_bytes() {
        let path = test_path("written");
        let mut pipe = OutputPipe::create(&path).unwrap();
        pipe.open_reader().unwrap();

        // 読み取り側が開いているので書き込み側のopenはブロックしない
        let mut writer = OpenOptions::new().write(true).open(&path).unwrap();
        writer.write_all(b"hello\nworld\n").unwrap();

        assert_eq!(pipe.read_available().unwrap(), b"hello\nworld\n".to_vec());
        // 書き込み側が開いたままなのでWouldBlockになり、空で返る
        assert!(pipe.read_available().unwrap().is_empty());

        drop(writer);
        drop(pipe);
        assert!(!path.exists());
    }
}
