/// A builder for rendering prompts with context.
pub struct PromptRenderer<'a> {
    template: &'a str,
    replacements: Vec<(&'a str, String)>,
}

impl<'a> PromptRenderer<'a> {
    pub fn new(template: &'a str) -> Self {
        Self {
            template,
            replacements: Vec::new(),
        }
    }

    pub fn set(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.replacements.push((key, value.into()));
        self
    }

    /// Substitutes placeholders in one pass over the template.
    /// Inserted values are never scanned again.
    pub fn render(self) -> String {
        let mut result = String::with_capacity(self.template.len());
        let mut rest = self.template;

        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let tail = &rest[start..];
            let Some(end) = tail.find("}}") else {
                rest = tail;
                break;
            };
            let placeholder = &tail[..end + 2];
            match self.replacements.iter().find(|(key, _)| *key == placeholder) {
                Some((_, value)) => result.push_str(value),
                None => {
                    tracing::error!("Unreplaced prompt placeholder: {}", placeholder);
                    result.push_str(placeholder);
                }
            }
            rest = &tail[end + 2..];
        }
        result.push_str(rest);
        result
    }
}

pub const INTERPRET_TEMPLATE: &str = include_str!("../../prompts/interpret.md");
pub const SCENE_TEMPLATE: &str = include_str!("../../prompts/scene.md");
pub const OPENING_TEMPLATE: &str = include_str!("../../prompts/opening.md");
pub const RETRY_HINT_TEMPLATE: &str = include_str!("../../prompts/retry_hint.md");

pub const EMPTY_HISTORY: &str = "(no previous turns)";

/// Full interpretation prompt for one gateway call.
pub fn interpret_prompt(
    working_root: &str,
    system_info: &str,
    scene: &str,
    history: &str,
    input: &str,
    hint: Option<&str>,
) -> String {
    let history = if history.trim().is_empty() {
        EMPTY_HISTORY
    } else {
        history
    };
    let hint = match hint {
        Some(reason) => PromptRenderer::new(RETRY_HINT_TEMPLATE)
            .set("{{REASON}}", reason)
            .render(),
        None => String::new(),
    };

    PromptRenderer::new(INTERPRET_TEMPLATE)
        .set("{{WORKING_ROOT}}", working_root)
        .set("{{SYSTEM_INFO}}", system_info)
        .set("{{SCENE}}", scene)
        .set("{{HISTORY}}", history)
        .set("{{INPUT}}", input)
        .set("{{HINT}}", hint)
        .render()
}

/// Role-play block for structured scenes.
pub fn scene_block(
    client_role: &str,
    user_role: &str,
    description: &str,
    max_steps: Option<u32>,
    style: Option<&str>,
) -> String {
    let mut constraints = Vec::new();
    if let Some(steps) = max_steps {
        constraints.push(format!("This conversation must resolve within {steps} turns."));
    }
    if let Some(style) = style {
        constraints.push(format!("Style: {style}"));
    }
    let constraints = if constraints.is_empty() {
        String::new()
    } else {
        format!("\n### Constraints\n{}\n", constraints.join("\n"))
    };

    PromptRenderer::new(SCENE_TEMPLATE)
        .set("{{CLIENT_ROLE}}", client_role)
        .set("{{USER_ROLE}}", user_role)
        .set("{{SCENE_DESCRIPTION}}", description)
        .set("{{CONSTRAINTS}}", constraints)
        .render()
}

pub fn opening_prompt(scene: &str) -> String {
    PromptRenderer::new(OPENING_TEMPLATE)
        .set("{{SCENE}}", scene.trim())
        .render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_replaces_all_keys() {
        let out = PromptRenderer::new("{{A}} and {{B}} and {{A}}")
            .set("{{A}}", "x")
            .set("{{B}}", "y")
            .render();
        assert_eq!(out, "x and y and x");
    }

    #[test]
    fn test_inserted_values_are_not_rescanned() {
        let out = PromptRenderer::new("[{{A}}] [{{B}}]")
            .set("{{A}}", "say {{B}}")
            .set("{{B}}", "{{A}}")
            .render();
        assert_eq!(out, "[say {{B}}] [{{A}}]");
    }

    #[test]
    fn test_unknown_and_unclosed_placeholders_stay() {
        let out = PromptRenderer::new("{{X}} and {{open").render();
        assert_eq!(out, "{{X}} and {{open");
    }

    #[test]
    fn test_user_text_with_placeholders_is_kept_verbatim() {
        let input = "explain what {{HINT}} and {{INPUT}} mean";
        let scene = "\n## Role-play\nThe clerk says {{HISTORY}}\n";
        let prompt = interpret_prompt("/w", "", scene, "", input, Some("bad reply"));
        assert!(prompt.contains(&format!("## Current user input\n{input}")));
        assert!(prompt.contains("The clerk says {{HISTORY}}"));
        assert!(prompt.contains(EMPTY_HISTORY));
        assert_eq!(prompt.matches("Your previous reply was rejected").count(), 1);
    }

    #[test]
    fn test_system_info_block_is_included() {
        let prompt = interpret_prompt("/w", "## Host\nOS: linux", "", "", "hi", None);
        assert!(prompt.contains("## Host\nOS: linux"));
    }

    #[test]
    fn test_interpret_prompt_sections() {
        let history = "User: hi\nAssistant: hello";
        let prompt = interpret_prompt("/home/me", "", "", history, "list files", None);
        assert!(prompt.contains("Working directory: /home/me"));
        assert!(prompt.contains("User: hi\nAssistant: hello"));
        assert!(prompt.contains("## Current user input\nlist files"));
        assert!(!prompt.contains("{{"));
        assert!(!prompt.contains("## Correction"));
    }

    #[test]
    fn test_interpret_prompt_with_hint_and_empty_history() {
        let prompt = interpret_prompt("/", "", "", "", "do it", Some("no JSON object found"));
        assert!(prompt.contains(EMPTY_HISTORY));
        assert!(prompt.contains("Your previous reply was rejected: no JSON object found"));
    }

    #[test]
    fn test_scene_block_constraints_are_optional() {
        let with = scene_block("Clerk", "Customer", "A shop.", Some(5), Some("terse"));
        assert!(with.contains("within 5 turns"));
        assert!(with.contains("Style: terse"));

        let without = scene_block("Clerk", "Customer", "A shop.", None, None);
        assert!(!without.contains("### Constraints"));
        assert!(!without.contains("{{"));
    }

    #[test]
    fn test_templates_have_no_stray_placeholders_after_render() {
        assert!(!opening_prompt("## Scene\nA library.").contains("{{"));
    }
}
