//! Prompt text for the agent and the code generator

/// System prompt for the agent loop
pub const SYSTEM_PROMPT: &str =
    "You build Manim animations by calling tools, and you fix the code until it renders.";

/// Sent when the model keeps answering in prose while a tool call is required
pub const CORRECTIVE_INSTRUCTION: &str = "Respond with a tool call only. Call generate_manim_code to write the scene, \
run_manim_code to render it, or get_manim_configuration to inspect the renderer.";

/// Recorded in place of an assistant turn with no text and no tool call
pub const EMPTY_RESPONSE: &str = "Error: No response content provided";

/// System prompt for the code generation request
pub const GENERATOR_SYSTEM_PROMPT: &str =
    "You write Manim Community Edition scenes. Reply with Python source only, no prose.";

/// Initial user instruction for a run
pub fn build_agent_prompt(request: &str, entry_point: &str) -> String {
    format!(
        "Produce a Manim scene that renders without errors.

Request:
{request}

Work in this order:
1. Call `generate_manim_code` with a description of the animation.
2. Call `run_manim_code` with the generated code and scene name `{entry_point}`.
3. If rendering fails, read the error output, then generate corrected code and run it again.
   Call `get_manim_configuration` when the failure looks like a renderer setting problem.
4. Stop once a render succeeds.

The code must define `class {entry_point}(Scene)` with a `construct(self)` method.
Give a short reason in the `reasoning` argument of every call."
    )
}

/// User prompt for one generation request
pub fn generation_prompt(description: &str, entry_point: &str) -> String {
    format!(
        "Write Manim code for this animation:

{description}

Requirements:
- `from manim import *` at the top
- exactly one scene: `class {entry_point}(Scene)` with a `construct(self)` method
- runnable as is, with no explanations, comments or Markdown around the code"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_prompt_names_scene_and_request() {
        let prompt = build_agent_prompt("draw a red circle", "circleScene");
        assert!(prompt.contains("draw a red circle"));
        assert!(prompt.contains("class circleScene(Scene)"));
        assert!(prompt.contains("run_manim_code"));
    }

    #[test]
    fn test_generation_prompt_names_entry_point() {
        let prompt = generation_prompt("a blue square", "SquareScene");
        assert!(prompt.contains("a blue square"));
        assert!(prompt.contains("class SquareScene(Scene)"));
    }
}
