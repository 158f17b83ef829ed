//! エラーメッセージ定数

/// セッションが開始されていない場合のエラーメッセージ
pub const ERR_NO_SESSION: &str = "No debug session in progress";

/// 対象ファイルに合うプロファイルが無い場合のエラーメッセージ
pub const ERR_NO_PROFILE: &str = "Cannot find an interface profile for file";

/// 一度もセッションを開始していないのに再起動しようとした場合のエラーメッセージ
pub const ERR_NOTHING_TO_RESTART: &str = "No previous debug run to restart";

/// ブレークポイントが見つからない場合のエラーメッセージ
pub const ERR_BREAKPOINT_NOT_FOUND: &str = "Breakpoint not found";

/// ウォッチが見つからない場合のエラーメッセージ
pub const ERR_WATCH_NOT_FOUND: &str = "Watch not found";
