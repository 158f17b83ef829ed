//! ptydb デバッガのコア機能
//!
//! このクレートは、ptyの向こう側で動く行指向のデバッガREPLを操作するロジックを提供します。
//! 出力の行分割、自動応答ルール、セッションの状態遷移、スタック追跡、
//! ブレークポイントとウォッチの管理を統合します。

pub mod breakpoint;
pub mod command;
pub mod debugger;
pub mod errors;
pub mod event;
pub mod line;
pub mod parse;
pub mod profile;
pub mod rule;
pub mod session;
pub mod source;
pub mod stack;
pub mod state;
pub mod transcript;
pub mod watch;

pub use breakpoint::{location_key, Breakpoint, BreakpointRegistry};
pub use command::Command;
pub use debugger::{BreakpointToggle, Debugger, StartReport, StepOutcome};
pub use event::Event;
pub use profile::{builtin_profiles, InterfaceProfile, ProfileConfig};
pub use rule::{Action, AutoresponseRule};
pub use session::{ProcessStatus, Session, SessionConfig};
pub use stack::{render_stack, StackFrame};
pub use state::State;
pub use transcript::Transcript;
pub use watch::{WatchList, NO_SESSION_REPLY};

// 他のクレートから使用するために再エクスポート
pub use ptydb_target::{Channel, OutputSource, SpawnError};

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
