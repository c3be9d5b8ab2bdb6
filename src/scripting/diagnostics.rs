//! 脚本错误报告
//!
//! 把运行时抛出的异常整理成 (文件, 行号, 消息, 调用栈)，
//! 并去掉原生、匿名以及桥接层内部的栈帧。

use std::fmt;

use rquickjs::{Ctx, Value};

use crate::config::DiagnosticsConfig;
use crate::scripting::stash::INTERNAL_PREFIX;

/// 调用栈中的一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub native: bool,
}

impl StackFrame {
    /// 是否属于运行时内部、匿名函数或桥接层
    pub fn is_internal(&self) -> bool {
        self.native
            || self.function == "<anonymous>"
            || self.function.starts_with(INTERNAL_PREFIX)
            || self
                .file
                .as_deref()
                .is_some_and(|file| file.starts_with(INTERNAL_PREFIX))
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}", self.function)?;
        if self.native {
            return write!(f, " (native)");
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " ({}:{})", file, line),
            (Some(file), None) => write!(f, " ({})", file),
            _ => Ok(()),
        }
    }
}

/// 解析运行时的调用栈文本
///
/// 识别 `at name (file:line[:col])`、`at file:line` 与 `at name (native)` 三种形式，
/// 其余行忽略。
pub fn parse_stack(text: &str) -> Vec<StackFrame> {
    text.lines().filter_map(parse_frame).collect()
}

fn parse_frame(line: &str) -> Option<StackFrame> {
    let rest = line.trim().strip_prefix("at ")?.trim();
    if rest.is_empty() {
        return None;
    }

    let (function, location) = match rest.strip_suffix(')').and_then(|r| r.rsplit_once(" (")) {
        Some((function, location)) => (function.trim().to_string(), location),
        None => (String::new(), rest),
    };

    if location == "native" {
        return Some(StackFrame {
            function,
            file: None,
            line: None,
            column: None,
            native: true,
        });
    }

    let (file, line, column) = parse_location(location);
    Some(StackFrame {
        function,
        file: Some(file.to_string()),
        line,
        column,
        native: false,
    })
}

fn split_number(text: &str) -> Option<(&str, u32)> {
    let (head, tail) = text.rsplit_once(':')?;
    tail.parse().ok().map(|n| (head, n))
}

fn parse_location(location: &str) -> (&str, Option<u32>, Option<u32>) {
    match split_number(location) {
        Some((head, last)) => match split_number(head) {
            Some((file, line)) => (file, Some(line), Some(last)),
            None => (head, Some(last), None),
        },
        None => (location, None, None),
    }
}

/// 脚本编译/运行错误
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptErrorReport {
    pub file: String,
    pub line: Option<u32>,
    pub message: String,
    /// 过滤后的调用栈文本
    pub stack: String,
    pub frames: Vec<StackFrame>,
}

impl ScriptErrorReport {
    /// 由消息和原始栈文本构造
    ///
    /// `chunk` 为正在执行的代码块名，给出时作为报告的文件名。
    pub fn new(message: impl Into<String>, raw_stack: &str, chunk: Option<&str>, config: &DiagnosticsConfig) -> Self {
        let mut frames = parse_stack(raw_stack);
        if config.filter_internal_frames {
            frames.retain(|frame| !frame.is_internal());
        }
        frames.truncate(config.max_stack_frames);

        let first = frames.first();
        let file = chunk
            .map(str::to_string)
            .or_else(|| first.and_then(|frame| frame.file.clone()))
            .unwrap_or_else(|| "<unknown>".to_string());
        let line = first.and_then(|frame| frame.line);
        let stack = frames
            .iter()
            .map(|frame| format!("    {}", frame))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            file,
            line,
            message: message.into(),
            stack,
            frames,
        }
    }

    /// 从捕获的异常值构造
    pub fn from_exception(exception: &Value<'_>, chunk: Option<&str>, config: &DiagnosticsConfig) -> Self {
        let Some(object) = exception.as_object() else {
            return Self::new(describe_thrown(exception), "", chunk, config);
        };

        let name = object.get::<_, Option<String>>("name").ok().flatten();
        let message = object
            .get::<_, Option<String>>("message")
            .ok()
            .flatten()
            .unwrap_or_default();
        let stack = object
            .get::<_, Option<String>>("stack")
            .ok()
            .flatten()
            .unwrap_or_default();

        let message = match name {
            Some(name) if !name.is_empty() => format!("{}: {}", name, message),
            _ => message,
        };
        Self::new(message, &stack, chunk, config)
    }

    /// 取出运行时中挂起的异常并生成报告
    pub fn catch(ctx: &Ctx<'_>, chunk: Option<&str>, config: &DiagnosticsConfig) -> Self {
        let exception = ctx.catch();
        Self::from_exception(&exception, chunk, config)
    }
}

fn describe_thrown(value: &Value<'_>) -> String {
    if let Some(s) = value.as_string() {
        return s.to_string().unwrap_or_default();
    }
    if let Some(n) = value.as_number() {
        return n.to_string();
    }
    if let Some(b) = value.as_bool() {
        return b.to_string();
    }
    if value.is_null() {
        return "null".to_string();
    }
    "uncaught exception".to_string()
}

impl fmt::Display for ScriptErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.file, line, self.message)?,
            None => write!(f, "{}: {}", self.file, self.message)?,
        }
        if !self.stack.is_empty() {
            write!(f, "\n{}", self.stack)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptErrorReport {}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "    at __engineConstruct (eval_script:40)\n\
                       \x20   at explode (level.js:12:5)\n\
                       \x20   at <anonymous> (level.js:3)\n\
                       \x20   at apply (native)\n\
                       \x20   at <eval> (level.js:20)\n";

    #[test]
    fn test_parse_stack_forms() {
        let frames = parse_stack(RAW);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[1].function, "explode");
        assert_eq!(frames[1].file.as_deref(), Some("level.js"));
        assert_eq!(frames[1].line, Some(12));
        assert_eq!(frames[1].column, Some(5));
        assert!(frames[3].native);

        let bare = parse_stack("at level.js:7");
        assert_eq!(bare[0].function, "");
        assert_eq!(bare[0].line, Some(7));
    }

    #[test]
    fn test_internal_frames_filtered() {
        let report = ScriptErrorReport::new("Error: boom", RAW, None, &DiagnosticsConfig::default());
        let names: Vec<&str> = report.frames.iter().map(|f| f.function.as_str()).collect();
        assert_eq!(names, vec!["explode", "<eval>"]);
        assert_eq!(report.file, "level.js");
        assert_eq!(report.line, Some(12));
        assert!(!report.stack.contains("native"));
        assert!(!report.stack.contains("__engine"));
    }

    #[test]
    fn test_filtering_can_be_disabled() {
        let config = DiagnosticsConfig {
            filter_internal_frames: false,
            max_stack_frames: 2,
        };
        let report = ScriptErrorReport::new("boom", RAW, Some("chunk"), &config);
        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.file, "chunk");
        assert_eq!(report.line, Some(40));
    }

    #[test]
    fn test_display() {
        let report = ScriptErrorReport::new("TypeError: nope", "at f (a.js:2)", None, &DiagnosticsConfig::default());
        assert_eq!(report.to_string(), "a.js:2: TypeError: nope\n    at f (a.js:2)");

        let report = ScriptErrorReport::new("boom", "", Some("init"), &DiagnosticsConfig::default());
        assert_eq!(report.to_string(), "init: boom");
    }
}
