//! Prompt templates for the toolbox operations

use crate::request::{MessagePair, OperationKind};

/// Appended to every system instruction.
pub const BASE: &str
  = "你总是使用中文回答。只提供最终内容，不要使用表情符号，不要解释任何内容。";

pub const CONTINUE: &str
  = "你是一个AI写作助手，会根据前文内容继续写作。请更重视后文内容而非开头部分。限制回复在500字符以内，但要确保句子完整。";
pub const IMPROVE: &str
  = "你是一个AI写作助手，会改进现有文本。限制回复在500字符以内，但要确保句子完整。";
pub const SHORTER: &str
  = "你是一个AI写作助手，会缩短现有文本。";
pub const LONGER: &str
  = "你是一个AI写作助手，会扩写现有文本。";
pub const FIX: &str
  = "你是一个AI写作助手，会修正现有文本的语法和拼写错误。限制回复在500字符以内，但要确保句子完整。";
pub const ZAP: &str
  = "你是一个AI写作助手，会根据用户输入和指令生成文本。";
pub const GENERATE_TITLE: &str
  = "你是一个AI写作助手，会根据小说章节内容拟定一个简洁的章节标题。只输出标题本身，不超过20个字符，不要使用引号。";

pub const USER_EXISTING: &str = "现有文本: {text}";
pub const USER_CONTINUE: &str = "前文: {text}\n续写要求: {command}";
pub const USER_COMMAND: &str
  = "对于这段文本: {text}，你必须遵守命令: {command}";
pub const USER_TITLE: &str = "章节内容: {text}";

/// Used for `continue` when the caller gave no command ("continue freely").
pub const DEFAULT_CONTINUE_COMMAND: &str = "自由续写";
/// Used for `zap` when the caller gave no command ("write freely").
pub const DEFAULT_ZAP_COMMAND: &str = "自由发挥";

/// System instruction and user template for an operation.
pub fn template(kind: OperationKind) -> (&'static str, &'static str)
{   match kind
    {   OperationKind::Continue => (CONTINUE, USER_CONTINUE)
      , OperationKind::Improve => (IMPROVE, USER_EXISTING)
      , OperationKind::Shorter => (SHORTER, USER_EXISTING)
      , OperationKind::Longer => (LONGER, USER_EXISTING)
      , OperationKind::Fix => (FIX, USER_EXISTING)
      , OperationKind::Zap => (ZAP, USER_COMMAND)
      , OperationKind::GenerateTitle => (GENERATE_TITLE, USER_TITLE)
    }
}

/// The command actually sent for `kind`, with blank commands replaced by
/// the operation's default where it has one.
pub fn effective_command(
  kind: OperationKind
, command: Option<&str>
) -> String
{   let given = command.map(str::trim).unwrap_or("");
    if !given.is_empty()
    {   return given.to_string();
    }
    match kind
    {   OperationKind::Continue => DEFAULT_CONTINUE_COMMAND.to_string()
      , OperationKind::Zap => DEFAULT_ZAP_COMMAND.to_string()
      , _ => String::new()
    }
}

/// Resolve an operation and its inputs into the message pair sent to the
/// provider.
pub fn resolve(
  kind: OperationKind
, text: &str
, command: Option<&str>
) -> MessagePair
{   let (system, user) = template(kind);
    let command = effective_command(kind, command);
    MessagePair
    {   system: format!("{} {}", system, BASE)
      , user: substitute(
          user,
          &[("text", text), ("command", command.as_str())]
        )
    }
}

/// Replace `{name}` placeholders in one pass. Values are inserted
/// verbatim, so braces inside them are never expanded; unknown names are
/// left untouched.
pub fn substitute(template: &str, values: &[(&str, &str)]) -> String
{   let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{')
    {   out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else
        {   out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match values.iter().find(|(key, _)| *key == name)
        {   Some((_, value)) => out.push_str(value)
          , None => out.push_str(&rest[open..open + close + 2])
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests
{   use super::*;

    fn has_placeholder(s: &str) -> bool
    {   s.contains("{text}") || s.contains("{command}")
    }

    #[test]
    fn every_operation_resolves_all_placeholders()
    {   for kind in OperationKind::ALL
        {   let pair = resolve(kind, "夜色很深", Some("写得紧张一点"));
            assert!(!has_placeholder(&pair.system), "{kind}");
            assert!(!has_placeholder(&pair.user), "{kind}");
            assert!(pair.system.ends_with(BASE));
            assert!(pair.user.contains("夜色很深"), "{kind}");
        }
    }

    #[test]
    fn blank_command_falls_back_for_continue_and_zap()
    {   let pair = resolve(OperationKind::Continue, "前文", Some("   "));
        assert!(pair.user.ends_with(DEFAULT_CONTINUE_COMMAND));

        let pair = resolve(OperationKind::Zap, "文本", None);
        assert!(pair.user.ends_with(DEFAULT_ZAP_COMMAND));

        assert_eq!(
          effective_command(OperationKind::Fix, None),
          ""
        );
    }

    #[test]
    fn given_command_is_trimmed_and_kept()
    {   let pair = resolve(OperationKind::Zap, "文本", Some(" 改成诗歌 "));
        assert_eq!(
          pair.user,
          "对于这段文本: 文本，你必须遵守命令: 改成诗歌"
        );
    }

    #[test]
    fn substituted_values_are_not_expanded_again()
    {   let out = substitute(
          "A {text} B {command}",
          &[("text", "{command}"), ("command", "x")]
        );
        assert_eq!(out, "A {command} B x");
    }

    #[test]
    fn unknown_and_unclosed_placeholders_stay_literal()
    {   assert_eq!(
          substitute("{who} said {text", &[("text", "hi")]),
          "{who} said {text"
        );
    }

    #[test]
    fn unknown_option_is_rejected()
    {   let err = "summarize".parse::<OperationKind>().unwrap_err();
        assert_eq!(
          err,
          crate::error::Error::InvalidOperation("summarize".to_string())
        );
        assert_eq!(
          "generate_title".parse::<OperationKind>().unwrap(),
          OperationKind::GenerateTitle
        );
    }
}
