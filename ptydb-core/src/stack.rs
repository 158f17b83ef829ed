//! コールスタックの追跡

/// スタックフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    /// その行のソーステキスト
    pub text: String,
}

impl StackFrame {
    /// 新しいスタックフレームを作成する
    pub fn new(file: impl Into<String>, line: u32, text: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            text: text.into(),
        }
    }
}

/// スタックトラッカー
///
/// `--Call--` 通知でキャプチャを予約し、次の実行位置イベントでフレームを積みます。
/// `--Return--` 通知でフレームを1つ取り除きます。
#[derive(Debug, Clone, Default)]
pub struct StackTracker {
    frames: Vec<StackFrame>,
    capture_armed: bool,
}

impl StackTracker {
    /// 新しいスタックトラッカーを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の実行位置でフレームを積むよう予約する
    pub fn arm_capture(&mut self) {
        self.capture_armed = true;
    }

    /// キャプチャが予約されているか
    pub fn capture_armed(&self) -> bool {
        self.capture_armed
    }

    /// 予約されていればキャプチャを消費する
    ///
    /// 予約されていた場合は `true` を返し、予約を解除します。
    pub fn take_capture(&mut self) -> bool {
        std::mem::take(&mut self.capture_armed)
    }

    /// フレームを積む
    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    /// フレームを取り除く（空なら何もしない）
    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    /// 全てのフレームを取得する（底から順）
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// スタックの深さ
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// スタックが空かどうか
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// フレームを `file  line: text` の形式で整列して表示用に整形する
pub fn render_stack(frames: &[StackFrame]) -> Vec<String> {
    let file_width = frames.iter().map(|f| f.file.len()).max().unwrap_or(0);
    let line_width = frames
        .iter()
        .map(|f| f.line.to_string().len())
        .max()
        .unwrap_or(0);

    frames
        .iter()
        .map(|f| {
            format!(
                "{:<fw$} {:>lw$}: {}",
                f.file,
                f.line,
                f.text.trim_end(),
                fw = file_width + 3,
                lw = line_width
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_is_one_shot() {
        let mut tracker = StackTracker::new();
        assert!(!tracker.take_capture());

        tracker.arm_capture();
        assert!(tracker.capture_armed());
        assert!(tracker.take_capture());
        assert!(!tracker.take_capture());
    }

    #[test]
    fn test_pop_on_empty_stack() {
        let mut tracker = StackTracker::new();
        tracker.push(StackFrame::new("/tmp/a.py", 10, "def foo():"));

        assert!(tracker.pop().is_some());
        assert!(tracker.pop().is_none());
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_render_stack() {
        let frames = vec![
            StackFrame::new("/tmp/a.py", 10, "def foo():\n"),
            StackFrame::new("/tmp/bb.py", 7, "    return 1"),
        ];

        let rows = render_stack(&frames);
        assert_eq!(rows[0], "/tmp/a.py     10: def foo():");
        assert_eq!(rows[1], "/tmp/bb.py     7:     return 1");
    }
}
