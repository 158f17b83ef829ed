//! 疑似端末上のデバッガプロセス

use crate::channel::Channel;
use crate::terminal::configure_debugger_terminal;
use crate::Result;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use std::convert::Infallible;
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// 書き込みがEAGAINで詰まった場合の最大リトライ回数（1msごと）
const WRITE_RETRY_LIMIT: u32 = 5000;

/// 終了処理でSIGTERM後に待つ回数（10msごと）
const TERMINATE_POLLS: u32 = 20;

/// openptyからforkまでを直列化する
///
/// 並行してforkした別の子に、close-on-exec設定前のpty fdが継承されないようにします。
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// プロセス起動の失敗
#[derive(Debug, Error)]
pub enum SpawnError {
    /// コマンドラインが空
    #[error("empty command line")]
    EmptyCommand,

    /// 引数にNULバイトが含まれている
    #[error("invalid argument {0:?}: contains a NUL byte")]
    InvalidArgument(String),

    /// ptyの確保に失敗
    #[error("failed to allocate pty: {0}")]
    Pty(#[source] Errno),

    /// forkに失敗
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),

    /// 子プロセスの準備またはexecに失敗
    #[error("failed to exec '{program}': {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// マスター側の設定に失敗
    #[error("failed to configure pty master: {0}")]
    Master(#[source] Errno),
}

/// 疑似端末に接続されたデバッガプロセス
pub struct PtyProcess {
    master: OwnedFd,
    pid: Pid,
    reaped: bool,
}

impl PtyProcess {
    /// コマンドを新しい疑似端末上で起動する
    ///
    /// 子プロセスではセッションを作成してスレーブ側を制御端末にし、
    /// エコー無効などの端末属性を設定してから `execvp` します。
    /// execの失敗はclose-on-execパイプ経由で親に伝えられ、`SpawnError::Exec` になります。
    /// 親側のマスターfdはノンブロッキングに設定されます。
    pub fn spawn(argv: &[String]) -> std::result::Result<Self, SpawnError> {
        let program = argv.first().ok_or(SpawnError::EmptyCommand)?;

        // fork前にCStringへ変換しておく
        let cstring_args = argv
            .iter()
            .map(|arg| CString::new(arg.as_str()).map_err(|_| SpawnError::InvalidArgument(arg.clone())))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let _guard = SPAWN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let pty = nix::pty::openpty(None, None).map_err(SpawnError::Pty)?;
        set_cloexec(&pty.master).map_err(SpawnError::Pty)?;
        set_cloexec(&pty.slave).map_err(SpawnError::Pty)?;
        let (status_read, status_write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(SpawnError::Pty)?;

        // Safety: 子プロセスはexecするか_exitするだけで、親のコードパスには戻らない
        match unsafe { unistd::fork() }.map_err(SpawnError::Fork)? {
            ForkResult::Child => {
                drop(status_read);
                // マスター側は子に不要。exec先に漏らさない
                drop(pty.master);
                let result = (|| -> nix::Result<Infallible> {
                    unistd::setsid()?;

                    // スレーブ側を制御端末にする
                    if unsafe { nix::libc::ioctl(pty.slave.as_raw_fd(), nix::libc::TIOCSCTTY as _, 0) } < 0 {
                        return Err(Errno::last());
                    }

                    configure_debugger_terminal(&pty.slave)?;

                    unistd::dup2(pty.slave.as_raw_fd(), nix::libc::STDIN_FILENO)?;
                    unistd::dup2(pty.slave.as_raw_fd(), nix::libc::STDOUT_FILENO)?;
                    unistd::dup2(pty.slave.as_raw_fd(), nix::libc::STDERR_FILENO)?;

                    // 標準入出力に複製したので元のfdは閉じる
                    if pty.slave.as_raw_fd() > nix::libc::STDERR_FILENO {
                        drop(pty.slave);
                    } else {
                        std::mem::forget(pty.slave);
                    }

                    unistd::execvp(&cstring_args[0], &cstring_args)
                })();

                // ここに来るのはexecより前に失敗した場合のみ
                let errno = match result {
                    Ok(never) => match never {},
                    Err(errno) => errno,
                };
                let _ = unistd::write(&status_write, &(errno as i32).to_ne_bytes());
                unsafe { nix::libc::_exit(127) };
            }
            ForkResult::Parent { child } => {
                drop(pty.slave);
                drop(status_write);

                if let Some(code) = read_exec_status(&status_read) {
                    // execに失敗した子を回収する
                    let _ = waitpid(child, None);
                    return Err(SpawnError::Exec {
                        program: program.clone(),
                        source: std::io::Error::from_raw_os_error(code),
                    });
                }

                let flags = fcntl(pty.master.as_raw_fd(), FcntlArg::F_GETFL).map_err(SpawnError::Master)?;
                let flags = OFlag::from_bits_truncate(flags);
                fcntl(pty.master.as_raw_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))
                    .map_err(SpawnError::Master)?;

                info!("spawned '{}' as pid {}", program, child);
                Ok(Self {
                    master: pty.master,
                    pid: child,
                    reaped: false,
                })
            }
        }
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// 子プロセスが生きているか
    ///
    /// `waitpid` で回収すると終了ステータスが失われるため、`kill(pid, 0)` で確認します。
    pub fn is_alive(&self) -> bool {
        !self.reaped && signal::kill(self.pid, None).is_ok()
    }

    /// 子プロセスを終了させて回収する
    ///
    /// 既に終了・回収済みでもエラーにはなりません。
    pub fn terminate(&mut self) {
        if self.reaped {
            return;
        }

        if matches!(
            waitpid(self.pid, Some(WaitPidFlag::WNOHANG)),
            Ok(WaitStatus::StillAlive)
        ) {
            let _ = signal::kill(self.pid, Signal::SIGTERM);
            for _ in 0..TERMINATE_POLLS {
                std::thread::sleep(Duration::from_millis(10));
                match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                    Ok(WaitStatus::StillAlive) => continue,
                    _ => {
                        self.reaped = true;
                        break;
                    }
                }
            }
            if !self.reaped {
                let _ = signal::kill(self.pid, Signal::SIGKILL);
                let _ = waitpid(self.pid, None);
            }
        }

        debug!("pid {} terminated", self.pid);
        self.reaped = true;
    }
}

impl Channel for PtyProcess {
    /// マスター側からノンブロッキングで読む
    ///
    /// EAGAINはデータ無し、EIOは子がスレーブを閉じた（終了した）ことを意味し、
    /// どちらも `Ok(0)` を返します。
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match unistd::read(self.master.as_raw_fd(), buf) {
            Ok(n) => Ok(n),
            Err(Errno::EAGAIN) | Err(Errno::EIO) | Err(Errno::EINTR) => Ok(0),
            Err(e) => Err(anyhow::anyhow!("pty read: {}", e)),
        }
    }

    /// マスター側へ全バイトを書き込む
    ///
    /// EAGAINの間は1msずつ待ってリトライし、約5秒で諦めます。
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        let mut retries = 0u32;
        while written < data.len() {
            match unistd::write(&self.master, &data[written..]) {
                Ok(n) => {
                    written += n;
                    retries = 0;
                }
                Err(Errno::EAGAIN) | Err(Errno::EINTR) => {
                    retries += 1;
                    if retries > WRITE_RETRY_LIMIT {
                        anyhow::bail!("pty write: buffer full after 5s of retries");
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => anyhow::bail!("pty write: {}", e),
            }
        }
        Ok(())
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.terminate();
        // マスターfdはOwnedFdのdropで閉じられる
    }
}

fn set_cloexec(fd: &OwnedFd) -> nix::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map(|_| ())
}

/// execステータスパイプを読む
///
/// execが成功するとパイプはclose-on-execで閉じられ、EOFになります。
/// 失敗した場合は子が書いたerrnoを返します。
fn read_exec_status(fd: &OwnedFd) -> Option<i32> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match unistd::read(fd.as_raw_fd(), &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
    (filled == buf.len()).then(|| i32::from_ne_bytes(buf))
}
