//! パース関連のユーティリティ関数

use anyhow::Result;

/// `file:line` 形式の位置をパース
///
/// ファイル名に `:` が含まれていてもよいよう、最後の `:` で分割します。
///
/// # Examples
/// ```
/// use ptydb_core::parse::parse_location;
///
/// assert_eq!(parse_location("/tmp/a.py:10").unwrap(), ("/tmp/a.py".to_string(), 10));
/// ```
pub fn parse_location(s: &str) -> Result<(String, u32)> {
    let s = s.trim();
    let (file, line) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid location '{}': expected file:line", s))?;

    if file.is_empty() {
        anyhow::bail!("Invalid location '{}': missing file", s);
    }
    let line = line
        .parse::<u32>()
        .map_err(|e| anyhow::anyhow!("Invalid line number in '{}': {}", s, e))?;
    if line == 0 {
        anyhow::bail!("Invalid line number in '{}': lines start at 1", s);
    }

    Ok((file.to_string(), line))
}

/// 引数のリストをシェルの引数文字列にまとめる
///
/// # Examples
/// ```
/// use ptydb_core::parse::join_args;
///
/// let args = vec!["alpha".to_string(), "two words".to_string()];
/// let joined = join_args(&args).unwrap();
/// assert_eq!(shlex::split(&joined).unwrap(), args);
/// ```
pub fn join_args(args: &[String]) -> Result<String> {
    shlex::try_join(args.iter().map(String::as_str))
        .map_err(|e| anyhow::anyhow!("Cannot quote program arguments: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        assert_eq!(parse_location("a.py:3").unwrap(), ("a.py".to_string(), 3));
        assert_eq!(
            parse_location(" C:/work/a.py:42 ").unwrap(),
            ("C:/work/a.py".to_string(), 42)
        );
    }

    #[test]
    fn test_parse_location_invalid() {
        assert!(parse_location("a.py").is_err());
        assert!(parse_location(":3").is_err());
        assert!(parse_location("a.py:x").is_err());
        assert!(parse_location("a.py:0").is_err());
    }

    #[test]
    fn test_join_args_empty() {
        assert_eq!(join_args(&[]).unwrap(), "");
    }
}
