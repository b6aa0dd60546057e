use std::fmt::Display;

pub trait LogOnError<T> {
    /// 出错时打印日志并丢弃错误
    fn log_on_error(self) -> Option<T>;
}

impl<T, E: Display> LogOnError<T> for Result<T, E> {
    fn log_on_error(self) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("{:#}", e);
                None
            }
        }
    }
}

/// 截取字符串的前 n 个字符，用于日志输出
pub fn truncate(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
