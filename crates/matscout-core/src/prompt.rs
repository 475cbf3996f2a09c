//! System prompt assembly and task phrasing.
//!
//! The template teaches the Thought / Code / Observation cycle with two
//! worked examples and a fixed rule list. Two placeholders are filled in at
//! render time:
//!
//! - `<<tool_descriptions>>` with one entry per registered tool
//! - `<<authorized_imports>>` with the import allow-list

use matscout_contracts::tool::ToolDescriptor;

/// Prefix that asks reasoning-capable models to skip their thinking phase.
pub const DISABLE_THOUGHT: &str = "<|disable_thought|>";

pub const TOOLS_PLACEHOLDER: &str = "<<tool_descriptions>>";
pub const IMPORTS_PLACEHOLDER: &str = "<<authorized_imports>>";

pub const DEFAULT_TEMPLATE: &str = r#"You are an expert assistant who solves tasks by writing code. You will be given a task to solve as best you can.
You can call a set of tools from that code: they behave like Python functions.
To solve the task, plan ahead and proceed in a series of steps, cycling through 'Thought:', 'Code:', and 'Observation:' sequences.

At each step, in the 'Thought:' sequence, explain your reasoning and which tools you want to use.
Then in the 'Code:' sequence, write the code in simple Python. The code sequence must end with '<end_action>'.
During intermediate steps, use 'print()' to keep whatever information you will need next.
Printed output appears in the 'Observation:' field, which is available as input for the next step.
Finish by returning the answer with the `final_answer` tool.

Here are some examples:
---
Task: "You are tasked with designing a cutting board. It should be lightweight. What material would you recommend for this application?"

Thought: I will search the encyclopedia for materials commonly used in cutting boards.
Code:
```py
observation = wikipedia_search(query="common materials used in cutting boards")
print(observation)
```<end_action>
Observation: "A material commonly used in cutting boards is wood."

Thought: Now I will look wood up in the materials database.
Code:
```py
observation = search_by_material(material="wood")
print(observation)
```<end_action>
Observation: "[{'Material': 'Wood', 'Density min': 0.3, 'Density max': 1.3, 'Yield strength min': 30.0, 'Yield strength max': 100.0}]"

Thought: Wood is a lightweight material commonly used in cutting boards. I will return it.
Code:
```py
final_answer("wood")
```<end_action>
---
Task: "You are tasked with designing a cooking pan. It should have a high melting point. What material would you recommend for this application?"

Thought: I will search the encyclopedia for the properties a cooking pan needs.
Code:
```py
observation = wikipedia_search(query="necessary properties of cooking pans")
print(observation)
```<end_action>
Observation: "High performance cookware combines high thermal diffusivity with low reactivity, so heat spreads evenly and the vessel does not react with food."

Thought: I will search the materials database for a high melting temperature together with good thermal conductivity and strength.
Code:
```py
observation = search_by_property(properties={
    "Melting/glass temperature": {"min": 1500.0},
    "Thermal conductivity": {"min": 30.0},
    "Yield strength": {"min": 500.0},
})
print(observation)
```<end_action>
Observation: "Matching materials include medium carbon steels and low alloy steels."

Thought: I will check what research says about these steels in cookware.
Code:
```py
observation = arxiv_search(query="medium carbon steel and low alloy steel in cooking pans")
print(observation)
```<end_action>
Observation: "Both steels are used in cookware for their heat resistance, durability, and toughness at high temperatures."

Thought: Both steels meet the criteria. I will return them.
Code:
```py
final_answer("medium carbon steel or low alloy steel")
```<end_action>
---

On top of performing computations in the Python code you write, you have access to these tools and no others:
<<tool_descriptions>>

Here are the rules you should always follow to solve your task:
1. Always provide a 'Thought:' sequence and a 'Code:\n```py' sequence ending with '```<end_action>', else you will fail.
2. Use only variables that you have defined.
3. Always pass tool arguments directly, as in 'answer = wikipedia_search(query="steel")', never as a single dict.
4. Do not chain tool calls whose output format is unpredictable in the same code block: print the result and use it in the next block.
5. Call a tool only when needed, and never repeat a tool call with exactly the same arguments.
6. Do not name a variable after a tool: for instance, never name a variable 'final_answer'.
7. Never create notional variables in your code; they can derail you from the real values.
8. You can use imports in your code, but only from the following list of modules: <<authorized_imports>>
9. State persists between code executions: variables you define in one step remain available in later steps.
10. Don't give up! You are in charge of solving the task, not providing directions to solve it.

Now begin!"#;

/// Render one tool entry for the prompt.
pub fn describe_tool(descriptor: &ToolDescriptor) -> String {
    format!(
        "- {}: {}\n    Takes inputs: {}\n    Returns an output of type: {}",
        descriptor.name,
        descriptor.description,
        descriptor.inputs_summary(),
        descriptor.output_type.as_str()
    )
}

/// Fill the template's placeholders.
pub fn render_system_prompt<'a>(
    template: &str,
    tools: impl IntoIterator<Item = &'a ToolDescriptor>,
    authorized_imports: &[String],
    disable_thought: bool,
) -> String {
    let tool_text = tools
        .into_iter()
        .map(describe_tool)
        .collect::<Vec<_>>()
        .join("\n");
    let imports = if authorized_imports.is_empty() {
        "(none)".to_string()
    } else {
        authorized_imports.join(", ")
    };

    let body = template
        .replace(TOOLS_PLACEHOLDER, &tool_text)
        .replace(IMPORTS_PLACEHOLDER, &imports);

    if disable_thought {
        format!("{}{}", DISABLE_THOUGHT, body)
    } else {
        body
    }
}

/// Phrase a design question for the agent.
pub fn compile_question(design: &str, criterion: &str) -> String {
    format!(
        "You are a material science and design engineer expert.\n\
         You are tasked with designing a {}. The design should be {}.\n\
         What material would you recommend for this application?",
        design, criterion
    )
}

#[cfg(test)]
mod tests {
    use matscout_contracts::tool::{ParamSpec, ParamType};

    use super::*;

    fn lookup() -> ToolDescriptor {
        ToolDescriptor {
            name: "search_by_material".to_string(),
            description: "Find a material by name".to_string(),
            inputs: vec![ParamSpec::new("material", ParamType::String, "Material name")],
            output_type: ParamType::String,
            terminal: false,
        }
    }

    #[test]
    fn tool_entries_and_imports_are_substituted() {
        let prompt = render_system_prompt(
            DEFAULT_TEMPLATE,
            [&lookup()],
            &["math".to_string(), "statistics".to_string()],
            false,
        );
        assert!(!prompt.contains(TOOLS_PLACEHOLDER));
        assert!(!prompt.contains(IMPORTS_PLACEHOLDER));
        assert!(prompt.contains("- search_by_material: Find a material by name"));
        assert!(prompt.contains(r#"Takes inputs: {"material":{"type":"string","description":"Material name"}}"#));
        assert!(prompt.contains("modules: math, statistics"));
        assert!(prompt.contains("10. Don't give up!"));
    }

    #[test]
    fn disable_thought_prefixes_the_prompt() {
        let prompt = render_system_prompt(DEFAULT_TEMPLATE, Vec::<&ToolDescriptor>::new(), &[], true);
        assert!(prompt.starts_with(DISABLE_THOUGHT));
        assert!(prompt.contains("modules: (none)"));
    }

    #[test]
    fn question_names_design_and_criterion() {
        assert_eq!(
            compile_question("safety helmet", "lightweight"),
            "You are a material science and design engineer expert.\n\
             You are tasked with designing a safety helmet. The design should be lightweight.\n\
             What material would you recommend for this application?"
        );
    }
}
