//! 端末属性の設定

use nix::sys::termios::{self, InputFlags, LocalFlags, SetArg};
use std::os::fd::AsFd;

/// デバッガ用に端末属性を設定する
///
/// エコーを無効にし、入力フラグはIGNBRKのみ残します。
/// fork後の子プロセスからも呼ぶため、エラーは `Errno` のまま返します。
pub fn configure_debugger_terminal<Fd: AsFd>(fd: Fd) -> nix::Result<()> {
    let mut attrs = termios::tcgetattr(&fd)?;
    attrs.local_flags.remove(LocalFlags::ECHO);
    attrs.input_flags &= InputFlags::IGNBRK;
    termios::tcsetattr(&fd, SetArg::TCSANOW, &attrs)?;
    Ok(())
}

/// エコーが有効かどうか
pub fn echo_enabled<Fd: AsFd>(fd: Fd) -> nix::Result<bool> {
    let attrs = termios::tcgetattr(&fd)?;
    Ok(attrs.local_flags.contains(LocalFlags::ECHO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::pty::openpty;

    #[test]
    fn test_configure_disables_echo() {
        let pty = openpty(None, None).unwrap();
        assert!(echo_enabled(&pty.slave).unwrap());

        configure_debugger_terminal(&pty.slave).unwrap();

        assert!(!echo_enabled(&pty.slave).unwrap());
        let attrs = termios::tcgetattr(&pty.slave).unwrap();
        assert!(!attrs.input_flags.contains(InputFlags::ICRNL));
    }
}
