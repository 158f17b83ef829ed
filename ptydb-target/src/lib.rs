//! ptydb ターゲットプロセス制御
//!
//! このクレートは、デバッガREPLを子プロセスとして動かすための低レベル機能を提供します。
//! 疑似端末(pty)の確保、端末属性の設定、fork/exec、出力分離用の名前付きパイプなどを行います。

pub mod channel;
pub mod pipe;
pub mod process;
pub mod terminal;

pub use channel::{Channel, OutputSource};
pub use pipe::OutputPipe;
pub use process::{PtyProcess, SpawnError};

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
