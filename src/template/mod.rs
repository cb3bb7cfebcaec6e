//! Chat prompt rendering with the checkpoint's own Jinja template.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use minijinja::{context, Environment, UndefinedBehavior};
use minijinja_contrib::pycompat;
use serde::Serialize;

const TEMPLATE_NAME: &str = "chat";

/// Used when the checkpoint ships no `chat_template`. Same layout as Qwen3's for a
/// conversation without tools or system prompt.
pub const QWEN3_CHAT_TEMPLATE: &str = r#"{%- for message in messages %}
{{- '<|im_start|>' + message.role + '\n' + message.content + '<|im_end|>' + '\n' }}
{%- endfor %}
{%- if add_generation_prompt %}
{{- '<|im_start|>assistant\n' }}
{%- if enable_thinking is defined and enable_thinking is false %}
{{- '<think>\n\n</think>\n\n' }}
{%- endif %}
{%- endif %}"#;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

pub struct ChatTemplate {
    env: Environment<'static>,
}

impl ChatTemplate {
    pub fn new(source: &str) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        minijinja_contrib::add_to_environment(&mut env);
        env.set_unknown_method_callback(pycompat::unknown_method_callback);
        env.add_filter("tojson", minijinja::filters::tojson);
        env.add_template_owned(TEMPLATE_NAME, patch_python_syntax(source))
            .context("compiling chat template")?;

        Ok(Self { env })
    }

    /// Reads `chat_template` from `tokenizer_config.json`, falling back to the built-in
    /// Qwen3 layout.
    pub fn from_model_dir(dir: &Path) -> Result<Self> {
        let path = dir.join("tokenizer_config.json");
        if !path.exists() {
            tracing::warn!("no tokenizer_config.json in {:?}, using built-in chat template", dir);
            return Self::new(QWEN3_CHAT_TEMPLATE);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;

        match config.get("chat_template") {
            Some(serde_json::Value::String(source)) => Self::new(source),
            Some(_) => Err(anyhow!("unsupported chat_template format in {}", path.display())),
            None => {
                tracing::warn!("{} has no chat_template, using built-in", path.display());
                Self::new(QWEN3_CHAT_TEMPLATE)
            }
        }
    }

    pub fn render(&self, messages: &[Message], enable_thinking: bool) -> Result<String> {
        let rendered = self.env.get_template(TEMPLATE_NAME)?.render(context! {
            messages => messages,
            add_generation_prompt => true,
            enable_thinking => enable_thinking,
        })?;
        Ok(rendered)
    }
}

// minijinja has no Python slicing or negative indexing.
fn patch_python_syntax(source: &str) -> String {
    source
        .replace("messages[::-1]", "messages|reverse")
        .replace(
            "(messages|length - 1) - loop.index0",
            "((messages|length - 1)|int - loop.index0|int)",
        )
        .replace("messages[-1]", "messages[(messages|length - 1)]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_template_opens_assistant_turn() {
        let template = ChatTemplate::new(QWEN3_CHAT_TEMPLATE).unwrap();
        let prompt = template
            .render(&[Message::user("What is 2+2?")], true)
            .unwrap();
        assert_eq!(
            prompt,
            "<|im_start|>user\nWhat is 2+2?<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn builtin_template_closes_thinking_when_disabled() {
        let template = ChatTemplate::new(QWEN3_CHAT_TEMPLATE).unwrap();
        let prompt = template.render(&[Message::user("hi")], false).unwrap();
        assert!(prompt.ends_with("<|im_start|>assistant\n<think>\n\n</think>\n\n"));
    }

    #[test]
    fn python_slicing_is_rewritten() {
        let patched = patch_python_syntax("{% for m in messages[::-1] %}{{ messages[-1].role }}");
        assert_eq!(
            patched,
            "{% for m in messages|reverse %}{{ messages[(messages|length - 1)].role }}"
        );
    }

    #[test]
    fn template_is_read_from_tokenizer_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tokenizer_config.json"),
            r#"{"chat_template": "{% for m in messages %}[{{ m.role }}:{{ m.content|upper }}]{% endfor %}{% if enable_thinking %}+{% endif %}"}"#,
        )
        .unwrap();

        let template = ChatTemplate::from_model_dir(dir.path()).unwrap();
        let prompt = template.render(&[Message::user("ok")], true).unwrap();
        assert_eq!(prompt, "[user:OK]+");
    }

    #[test]
    fn python_string_methods_are_available() {
        let template = ChatTemplate::new(
            "{% for m in messages %}{{ m.content.strip() }}{% if m.content.startswith(' a') %}!{% endif %}{% endfor %}",
        )
        .unwrap();
        let prompt = template.render(&[Message::user(" a b ")], true).unwrap();
        assert_eq!(prompt, "a b!");
    }

    #[test]
    fn missing_tokenizer_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let template = ChatTemplate::from_model_dir(dir.path()).unwrap();
        let prompt = template.render(&[Message::user("x")], true).unwrap();
        assert!(prompt.starts_with("<|im_start|>user\nx<|im_end|>"));
    }
}
